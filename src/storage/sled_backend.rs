use std::cmp::Ordering;
use std::path::Path;

use tracing::debug;
use tracing::warn;

use super::InsertQuery;
use super::Op;
use super::Rows;
use super::SelectQuery;
use super::SqlBackend;
use super::SqlValue;
use super::Statement;
use super::UpdateQuery;
use super::WhereClause;
use crate::convert::safe_kv;
use crate::Error;
use crate::Result;
use crate::StorageError;

/// Sled database tree namespaces
const SCHEMA_NAMESPACE: &str = "_schema";
const TABLE_NAMESPACE_PREFIX: &str = "table:";

/// Table store on top of sled.
///
/// Every table lives in its own tree keyed by a monotonically generated row id,
/// so a full scan yields rows in insertion order. Column lists are kept in the
/// `_schema` tree and rows are bincode-encoded value lists aligned with them.
#[derive(Clone)]
pub struct SledBackend {
    db: sled::Db,
    schema: sled::Tree,
}

impl std::fmt::Debug for SledBackend {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledBackend")
            .field("tables", &self.schema.len())
            .finish()
    }
}

impl SledBackend {
    pub fn open(db_path: impl AsRef<Path> + std::fmt::Debug) -> Result<Self> {
        debug!("open sled backend at path: {:?}", &db_path);

        let db = sled::Config::default()
            .path(db_path.as_ref())
            .cache_capacity(10 * 1024 * 1024) //10MB
            .flush_every_ms(Some(3))
            .use_compression(true)
            .compression_factor(1)
            .open()
            .map_err(|e| {
                warn!("Try to open DB at this location: {:?} and failed: {:?}", db_path, e);
                StorageError::IoError(std::io::Error::other(e))
            })?;
        Self::from_db(db)
    }

    /// In-memory store removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self> {
        let schema = db.open_tree(SCHEMA_NAMESPACE)?;
        Ok(Self { db, schema })
    }

    fn columns(
        &self,
        table: &str,
    ) -> Result<Option<Vec<String>>> {
        match self.schema.get(table.as_bytes())? {
            Some(ivec) => Ok(Some(bincode::deserialize(&ivec)?)),
            None => Ok(None),
        }
    }

    fn table_tree(
        &self,
        table: &str,
    ) -> Result<sled::Tree> {
        Ok(self.db.open_tree(format!("{TABLE_NAMESPACE_PREFIX}{table}"))?)
    }

    /// Column list of `table`, or a statement error naming the missing table
    fn require_table(
        &self,
        stmt: &impl Statement,
        table: &str,
    ) -> Result<Vec<String>> {
        self.columns(table)?
            .ok_or_else(|| statement_error(stmt.to_sql(), format!("no such table: {table}")))
    }

    fn scan(
        &self,
        tree: &sled::Tree,
    ) -> Result<Vec<(sled::IVec, Vec<SqlValue>)>> {
        let mut rows = Vec::new();
        for entry in tree.iter() {
            let (key, value) = entry?;
            rows.push((key, bincode::deserialize::<Vec<SqlValue>>(&value)?));
        }
        Ok(rows)
    }
}

impl SqlBackend for SledBackend {
    fn create_table(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<()> {
        if columns.is_empty() {
            return Err(statement_error(
                format!("CREATE TABLE IF NOT EXISTS {table} ()"),
                "empty column list",
            ));
        }
        if self.columns(table)?.is_none() {
            debug!(table, ?columns, "create table");
            self.schema.insert(table.as_bytes(), bincode::serialize(columns)?)?;
        }
        self.table_tree(table)?;
        Ok(())
    }

    fn prepare_select(
        &self,
        query: &SelectQuery,
    ) -> Result<Rows> {
        debug!("{}", query);

        if query.fields().is_empty() {
            return Err(statement_error(query.to_sql(), "empty field list"));
        }
        let columns = self.require_table(query, query.table())?;

        let select_all = query.fields().len() == 1 && query.fields()[0] == "*";
        let (names, projection): (Vec<String>, Vec<usize>) = if select_all {
            (columns.clone(), (0..columns.len()).collect())
        } else {
            let indices = query
                .fields()
                .iter()
                .map(|f| column_index(query, &columns, f))
                .collect::<Result<Vec<_>>>()?;
            (query.fields().to_vec(), indices)
        };

        let filter = compile_where(query, &columns, query.where_clause())?;
        let order = query
            .ordering()
            .map(|o| column_index(query, &columns, &o.field).map(|idx| (idx, o.descending)))
            .transpose()?;

        let tree = self.table_tree(query.table())?;
        let mut matched: Vec<Vec<SqlValue>> = self
            .scan(&tree)?
            .into_iter()
            .map(|(_, row)| row)
            .filter(|row| filter.matches(row))
            .collect();

        if let Some((idx, descending)) = order {
            matched.sort_by(|a, b| {
                let ord = cell(a, idx).sort_cmp(cell(b, idx));
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = query.row_limit() {
            matched.truncate(limit as usize);
        }

        let rows = matched
            .into_iter()
            .map(|row| projection.iter().map(|&i| cell(&row, i).clone()).collect())
            .collect();
        Ok(Rows::new(names, rows))
    }

    fn execute_insert(
        &self,
        query: &InsertQuery,
    ) -> Result<()> {
        debug!("{}", query);

        check_assignments(query, query.fields(), query.values())?;
        let columns = self.require_table(query, query.table())?;

        let mut row = vec![SqlValue::Null; columns.len()];
        for (field, value) in query.fields().iter().zip(query.values()) {
            row[column_index(query, &columns, field)?] = value.clone();
        }

        let tree = self.table_tree(query.table())?;
        let id = self.db.generate_id()?;
        tree.insert(safe_kv(id), bincode::serialize(&row)?)?;
        Ok(())
    }

    fn execute_update(
        &self,
        query: &UpdateQuery,
    ) -> Result<usize> {
        debug!("{}", query);

        check_assignments(query, query.fields(), query.values())?;
        let columns = self.require_table(query, query.table())?;
        let targets = query
            .fields()
            .iter()
            .map(|f| column_index(query, &columns, f))
            .collect::<Result<Vec<_>>>()?;
        let filter = compile_where(query, &columns, query.where_clause())?;

        let tree = self.table_tree(query.table())?;
        let matched: Vec<_> = self
            .scan(&tree)?
            .into_iter()
            .filter(|(_, row)| filter.matches(row))
            .collect();

        let changed = matched.len();
        for (key, mut row) in matched {
            row.resize(columns.len(), SqlValue::Null);
            for (&idx, value) in targets.iter().zip(query.values()) {
                row[idx] = value.clone();
            }
            tree.insert(key, bincode::serialize(&row)?)?;
        }
        Ok(changed)
    }

    fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }
}

fn statement_error(
    statement: String,
    message: impl Into<String>,
) -> Error {
    StorageError::Statement {
        statement,
        message: message.into(),
    }
    .into()
}

fn column_index(
    stmt: &impl Statement,
    columns: &[String],
    name: &str,
) -> Result<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| statement_error(stmt.to_sql(), format!("no such column: {name}")))
}

fn check_assignments(
    stmt: &impl Statement,
    fields: &[String],
    values: &[SqlValue],
) -> Result<()> {
    if fields.is_empty() {
        return Err(statement_error(stmt.to_sql(), "empty field list"));
    }
    if fields.len() != values.len() {
        return Err(statement_error(
            stmt.to_sql(),
            format!("{} values for {} columns", values.len(), fields.len()),
        ));
    }
    Ok(())
}

/// Rows written before a column existed read as NULL
fn cell(
    row: &[SqlValue],
    idx: usize,
) -> &SqlValue {
    row.get(idx).unwrap_or(&SqlValue::Null)
}

struct CompiledCondition {
    column: usize,
    op: Op,
    value: SqlValue,
}

/// Where clause with column names resolved to row indices
struct RowFilter {
    groups: Vec<Vec<CompiledCondition>>,
}

impl RowFilter {
    fn matches(
        &self,
        row: &[SqlValue],
    ) -> bool {
        self.groups.is_empty()
            || self.groups.iter().any(|group| {
                group
                    .iter()
                    .all(|c| compare(c.op, cell(row, c.column), &c.value))
            })
    }
}

fn compile_where(
    stmt: &impl Statement,
    columns: &[String],
    clause: &WhereClause,
) -> Result<RowFilter> {
    let groups = clause
        .groups()
        .into_iter()
        .map(|group| {
            group
                .into_iter()
                .map(|c| {
                    Ok(CompiledCondition {
                        column: column_index(stmt, columns, &c.field)?,
                        op: c.op,
                        value: c.value.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RowFilter { groups })
}

/// Comparisons involving NULL never match
fn compare(
    op: Op,
    lhs: &SqlValue,
    rhs: &SqlValue,
) -> bool {
    if matches!(lhs, SqlValue::Null) || matches!(rhs, SqlValue::Null) {
        return false;
    }
    match op {
        Op::Eq => lhs.sort_cmp(rhs) == Ordering::Equal,
        Op::Neq => lhs.sort_cmp(rhs) != Ordering::Equal,
        Op::Lt => lhs.sort_cmp(rhs) == Ordering::Less,
        Op::Le => lhs.sort_cmp(rhs) != Ordering::Greater,
        Op::Gt => lhs.sort_cmp(rhs) == Ordering::Greater,
        Op::Ge => lhs.sort_cmp(rhs) != Ordering::Less,
        Op::Like => like(&lhs.as_text(), &rhs.as_text()),
    }
}

/// `LIKE` matching: `%` is any run, `_` any single char, ASCII case-insensitive.
pub(crate) fn like(
    text: &str,
    pattern: &str,
) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut ti, mut pi) = (0, 0);
    // position of the last `%` seen and the text offset it is currently absorbing up to
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pi < pattern.len() && pattern[pi] == '%' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < pattern.len() && (pattern[pi] == '_' || pattern[pi] == text[ti]) {
            ti += 1;
            pi += 1;
        } else if let Some((star, absorbed)) = backtrack {
            pi = star + 1;
            ti = absorbed + 1;
            backtrack = Some((star, absorbed + 1));
        } else {
            return false;
        }
    }
    pattern[pi..].iter().all(|&c| c == '%')
}
