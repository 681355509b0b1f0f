//! Persistence collaborator seam: executes typed statements against some store.

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use super::FromColumn;
use super::InsertQuery;
use super::SelectQuery;
use super::SqlValue;
use super::UpdateQuery;
use crate::Result;
use crate::StorageError;

#[cfg_attr(test, automock)]
pub trait SqlBackend: Send + Sync + 'static {
    /// Create `table` with the given columns; a no-op when it already exists
    fn create_table(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<()>;

    fn prepare_select(
        &self,
        query: &SelectQuery,
    ) -> Result<Rows>;

    fn execute_insert(
        &self,
        query: &InsertQuery,
    ) -> Result<()>;

    /// Returns the number of rows changed
    fn execute_update(
        &self,
        query: &UpdateQuery,
    ) -> Result<usize>;

    /// Synchronously flushes dirty buffers; returns bytes flushed
    fn flush(&self) -> Result<usize>;
}

/// One result row; columns follow the select's field order
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(
        &self,
        index: usize,
    ) -> Result<&SqlValue> {
        self.values.get(index).ok_or_else(|| {
            StorageError::ColumnOutOfRange {
                index,
                len: self.values.len(),
            }
            .into()
        })
    }

    pub fn get<T: FromColumn>(
        &self,
        index: usize,
    ) -> Result<T> {
        self.value(index).map(T::from_column)
    }

    pub fn get_named<T: FromColumn>(
        &self,
        column: &str,
    ) -> Result<T> {
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| StorageError::UnknownColumn(column.to_string()))?;
        self.get(index)
    }
}

/// Forward-only result cursor
#[derive(Debug)]
pub struct Rows {
    columns: Arc<[String]>,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
}

impl Rows {
    pub fn new(
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
    ) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next().map(|values| Row {
            columns: self.columns.clone(),
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}
