//! Typed construction of parameterized `SELECT` / `INSERT` / `UPDATE` statements.
//!
//! ```ignore
//! let q = select("devices", ["devkey", "macaddr", "last_signal"])
//!     .filter(
//!         WhereClause::new("last_time", Op::Gt, 12345i64)
//!             .and("max_signal", Op::Gt, -40)
//!             .and("macaddr", Op::Like, "aa:bb:cc:%"),
//!     )
//!     .order_by("last_time")
//!     .limit(10);
//!
//! let i = insert("otherdevs", ["devkey", "packets", "data"], vec!["aa:bb:cc:dd:ee:ff".into(), 1234.into(), "some data".into()]);
//!
//! let u = update("update_target", ["last_time", "packets"], vec![now.into(), 15.into()])
//!     .filter(WhereClause::new("devkey", Op::Eq, "123456"));
//! ```
//!
//! Values are never spliced into the statement text; every condition renders
//! as `field op ?` and its value is returned in bind order by `binds()`.

use std::fmt;

use super::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl Op {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Op::Eq => "==",
            Op::Neq => "<>",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    And,
    Or,
}

impl Join {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Join::And => "AND",
            Join::Or => "OR",
        }
    }
}

/// `field op value`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub value: SqlValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WhereTerm {
    Condition(Condition),
    Join(Join),
}

/// Conditions joined by `AND` / `OR`, rendered in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    terms: Vec<WhereTerm>,
}

impl WhereClause {
    pub fn new(
        field: impl Into<String>,
        op: Op,
        value: impl Into<SqlValue>,
    ) -> Self {
        Self::default().push(Join::And, field, op, value)
    }

    pub fn and(
        self,
        field: impl Into<String>,
        op: Op,
        value: impl Into<SqlValue>,
    ) -> Self {
        self.push(Join::And, field, op, value)
    }

    pub fn or(
        self,
        field: impl Into<String>,
        op: Op,
        value: impl Into<SqlValue>,
    ) -> Self {
        self.push(Join::Or, field, op, value)
    }

    fn push(
        mut self,
        join: Join,
        field: impl Into<String>,
        op: Op,
        value: impl Into<SqlValue>,
    ) -> Self {
        if !self.terms.is_empty() {
            self.terms.push(WhereTerm::Join(join));
        }
        self.terms.push(WhereTerm::Condition(Condition {
            field: field.into(),
            op,
            value: value.into(),
        }));
        self
    }

    /// Append another clause; the joiner is only emitted when both sides are non-empty
    pub fn append(
        &mut self,
        join: Join,
        other: WhereClause,
    ) {
        if other.terms.is_empty() {
            return;
        }
        if !self.terms.is_empty() {
            self.terms.push(WhereTerm::Join(join));
        }
        self.terms.extend(other.terms);
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[WhereTerm] {
        &self.terms
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.terms.iter().filter_map(|t| match t {
            WhereTerm::Condition(c) => Some(c),
            WhereTerm::Join(_) => None,
        })
    }

    /// `OR`-separated groups of `AND`-ed conditions, i.e. the SQL precedence
    /// of the rendered text.
    pub fn groups(&self) -> Vec<Vec<&Condition>> {
        let mut groups = vec![Vec::new()];
        for term in &self.terms {
            match term {
                WhereTerm::Condition(c) => {
                    if let Some(group) = groups.last_mut() {
                        group.push(c);
                    }
                }
                WhereTerm::Join(Join::Or) => groups.push(Vec::new()),
                WhereTerm::Join(Join::And) => {}
            }
        }
        groups.retain(|g| !g.is_empty());
        groups
    }

    fn render(
        &self,
        out: &mut String,
    ) {
        if self.terms.is_empty() {
            return;
        }
        out.push_str(" WHERE (");
        for term in &self.terms {
            match term {
                WhereTerm::Condition(c) => {
                    out.push_str(&c.field);
                    out.push(' ');
                    out.push_str(c.op.as_sql());
                    out.push_str(" ?");
                }
                WhereTerm::Join(j) => {
                    out.push(' ');
                    out.push_str(j.as_sql());
                    out.push(' ');
                }
            }
        }
        out.push(')');
    }
}

/// Start a where clause with a single condition
pub fn where_(
    field: impl Into<String>,
    op: Op,
    value: impl Into<SqlValue>,
) -> WhereClause {
    WhereClause::new(field, op, value)
}

/// Rendered statement text plus its ordered bind parameters
pub trait Statement {
    fn to_sql(&self) -> String;

    fn binds(&self) -> Vec<&SqlValue>;
}

/// Statement text followed by one `bind_<type>(...)` line per parameter
fn fmt_statement(
    stmt: &impl Statement,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    writeln!(f, "{};", stmt.to_sql())?;
    for bind in stmt.binds() {
        writeln!(f, "  {bind}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    fields: Vec<String>,
    where_clause: WhereClause,
    order_by: Option<OrderBy>,
    limit: Option<u32>,
}

/// `SELECT fields FROM table`
pub fn select<I, S>(
    table: impl Into<String>,
    fields: I,
) -> SelectQuery
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    SelectQuery {
        table: table.into(),
        fields: fields.into_iter().map(Into::into).collect(),
        where_clause: WhereClause::default(),
        order_by: None,
        limit: None,
    }
}

impl SelectQuery {
    /// AND `clause` onto the current where clause
    pub fn filter(
        mut self,
        clause: WhereClause,
    ) -> Self {
        self.where_clause.append(Join::And, clause);
        self
    }

    /// OR `clause` onto the current where clause
    pub fn or_filter(
        mut self,
        clause: WhereClause,
    ) -> Self {
        self.where_clause.append(Join::Or, clause);
        self
    }

    pub fn order_by(
        mut self,
        field: impl Into<String>,
    ) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending: false,
        });
        self
    }

    pub fn order_by_desc(
        mut self,
        field: impl Into<String>,
    ) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending: true,
        });
        self
    }

    pub fn limit(
        mut self,
        limit: u32,
    ) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn where_clause(&self) -> &WhereClause {
        &self.where_clause
    }

    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn row_limit(&self) -> Option<u32> {
        self.limit
    }
}

impl Statement for SelectQuery {
    fn to_sql(&self) -> String {
        let mut out = format!("SELECT {} FROM {}", self.fields.join(", "), self.table);
        self.where_clause.render(&mut out);
        if let Some(order) = &self.order_by {
            out.push_str(" ORDER BY ");
            out.push_str(&order.field);
            if order.descending {
                out.push_str(" DESC");
            }
        }
        if let Some(limit) = self.limit {
            out.push_str(&format!(" LIMIT {limit}"));
        }
        out
    }

    fn binds(&self) -> Vec<&SqlValue> {
        self.where_clause.conditions().map(|c| &c.value).collect()
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt_statement(self, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    table: String,
    fields: Vec<String>,
    values: Vec<SqlValue>,
}

/// `INSERT INTO table (fields) VALUES (values)`
pub fn insert<I, S>(
    table: impl Into<String>,
    fields: I,
    values: Vec<SqlValue>,
) -> InsertQuery
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    InsertQuery {
        table: table.into(),
        fields: fields.into_iter().map(Into::into).collect(),
        values,
    }
}

impl InsertQuery {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

impl Statement for InsertQuery {
    fn to_sql(&self) -> String {
        let placeholders = vec!["?"; self.values.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.fields.join(", "),
            placeholders
        )
    }

    fn binds(&self) -> Vec<&SqlValue> {
        self.values.iter().collect()
    }
}

impl fmt::Display for InsertQuery {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt_statement(self, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    table: String,
    fields: Vec<String>,
    values: Vec<SqlValue>,
    where_clause: WhereClause,
}

/// `UPDATE table SET field = value, ...`; every row unless filtered
pub fn update<I, S>(
    table: impl Into<String>,
    fields: I,
    values: Vec<SqlValue>,
) -> UpdateQuery
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    UpdateQuery {
        table: table.into(),
        fields: fields.into_iter().map(Into::into).collect(),
        values,
        where_clause: WhereClause::default(),
    }
}

impl UpdateQuery {
    pub fn filter(
        mut self,
        clause: WhereClause,
    ) -> Self {
        self.where_clause.append(Join::And, clause);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn where_clause(&self) -> &WhereClause {
        &self.where_clause
    }
}

impl Statement for UpdateQuery {
    fn to_sql(&self) -> String {
        let assignments: Vec<String> = self.fields.iter().map(|f| format!("{f} = ?")).collect();
        let mut out = format!("UPDATE {} SET {}", self.table, assignments.join(", "));
        self.where_clause.render(&mut out);
        out
    }

    fn binds(&self) -> Vec<&SqlValue> {
        self.values
            .iter()
            .chain(self.where_clause.conditions().map(|c| &c.value))
            .collect()
    }
}

impl fmt::Display for UpdateQuery {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt_statement(self, f)
    }
}
