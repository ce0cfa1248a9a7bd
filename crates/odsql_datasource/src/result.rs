//! Buffered result sets.

use crate::error::{DatasourceError, DatasourceResult};
use crate::value::SqlValue;

/// A fully buffered query result.
///
/// Column lookup is case-insensitive, mirroring how SQL engines report
/// aliases back in varying case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    /// Creates a result set from column names and rows.
    ///
    /// Every row must have one value per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> DatasourceResult<Self> {
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(DatasourceError::invalid_operation(format!(
                "row has {} values for {} columns",
                bad.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Returns the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over the rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row {
            columns: &self.columns,
            values,
        })
    }

    fn column_index(columns: &[String], alias: &str) -> Option<usize> {
        columns.iter().position(|c| c.eq_ignore_ascii_case(alias))
    }
}

/// A positioned row of a [`ResultSet`].
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [SqlValue],
}

impl<'a> Row<'a> {
    /// Returns the value stored under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasourceError::ColumnNotFound`] if the alias is not part
    /// of the result set.
    pub fn get(&self, alias: &str) -> DatasourceResult<&'a SqlValue> {
        ResultSet::column_index(self.columns, alias)
            .map(|i| &self.values[i])
            .ok_or_else(|| DatasourceError::ColumnNotFound {
                column: alias.to_string(),
            })
    }

    /// Returns the raw bytes stored under `alias`, or `None` for `NULL`.
    ///
    /// Text columns are returned as their UTF-8 bytes.
    pub fn get_bytes(&self, alias: &str) -> DatasourceResult<Option<Vec<u8>>> {
        match self.get(alias)? {
            SqlValue::Null => Ok(None),
            SqlValue::Bytes(b) => Ok(Some(b.clone())),
            SqlValue::Text(t) => Ok(Some(t.as_bytes().to_vec())),
            other => Err(DatasourceError::TypeMismatch {
                column: alias.to_string(),
                expected: "bytes",
                actual: other.type_name(),
            }),
        }
    }

    /// Returns the value of the first column.
    pub fn first(&self) -> Option<&'a SqlValue> {
        self.values.first()
    }
}
