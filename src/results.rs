use std::sync::Arc;

use crate::types::RowValues;

/// Raw rows returned by a connection provider.
///
/// Every row is a positional tuple matching `column_names`. The loader turns
/// these tuples into caller-visible [`ResultValue`](crate::transform::ResultValue)s.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// Column names shared by all rows
    column_names: Arc<Vec<String>>,
    /// The rows returned by the query, in engine order
    rows: Vec<Vec<RowValues>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            column_names: Arc::new(Vec::new()),
            rows: Vec::with_capacity(capacity),
        }
    }

    /// Build a result set from column names and rows in one go.
    #[must_use]
    pub fn from_rows(column_names: Vec<String>, rows: Vec<Vec<RowValues>>) -> ResultSet {
        ResultSet {
            column_names: Arc::new(column_names),
            rows,
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_names = column_names;
    }

    #[must_use]
    pub fn column_names(&self) -> &Arc<Vec<String>> {
        &self.column_names
    }

    /// Add a row to the result set
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        self.rows.push(row_values);
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<RowValues>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep at most `max_rows` rows from the front, then drop the first `skip`.
    ///
    /// Mirrors a max-rows directive followed by advancing the cursor past
    /// rows the SQL itself could not offset.
    pub fn apply_window(&mut self, max_rows: Option<usize>, skip: usize) {
        if let Some(max) = max_rows {
            self.rows.truncate(max);
        }
        if skip > 0 {
            let skip = skip.min(self.rows.len());
            self.rows.drain(..skip);
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Vec<RowValues>> {
        self.rows
    }
}
