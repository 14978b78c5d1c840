//! Pagination strategies. A limit handler decides how `first_row`/`max_rows`
//! reach the engine: as SQL plus bind parameters, or as a max-rows directive
//! with the leading rows skipped after execution.

use std::fmt::Debug;

use crate::error::LoaderError;
use crate::parameters::RowSelection;
use crate::statement::BoundStatement;
use crate::types::RowValues;

static NOOP: NoopLimitHandler = NoopLimitHandler;

pub trait LimitHandler: Debug + Send + Sync {
    /// Whether the SQL can carry a row limit at all.
    fn supports_limit(&self) -> bool;

    /// Whether the SQL can also carry an offset.
    fn supports_limit_offset(&self) -> bool;

    /// Whether limit parameters come before the ordinary parameters.
    fn bind_limit_parameters_first(&self) -> bool {
        false
    }

    /// Whether the bound limit is `first_row + max_rows` rather than `max_rows`.
    fn use_max_for_limit(&self) -> bool {
        false
    }

    /// Rewrite `sql` to carry the limit clause.
    fn process_sql(&self, sql: &str, selection: &RowSelection) -> String;

    /// Bind limit parameters at `index`, returning how many were bound.
    ///
    /// The limit is bound first and the offset second, matching `limit ? offset ?`.
    ///
    /// # Errors
    /// Propagates statement binding failures.
    fn bind_limit_parameters(
        &self,
        selection: &RowSelection,
        statement: &mut BoundStatement,
        index: usize,
    ) -> Result<usize, LoaderError> {
        let Some(max_rows) = selection.max_rows.filter(|m| *m > 0) else {
            return Ok(0);
        };
        let first_row = selection.first_row_value();
        let limit = if self.use_max_for_limit() {
            first_row.saturating_add(max_rows)
        } else {
            max_rows
        };
        let has_first_row = self.supports_limit_offset() && first_row > 0;
        statement.set_value(index, RowValues::Int(to_i64(limit)))?;
        if has_first_row {
            statement.set_value(index + 1, RowValues::Int(to_i64(first_row)))?;
            Ok(2)
        } else {
            Ok(1)
        }
    }

    /// # Errors
    /// Propagates statement binding failures.
    fn bind_limit_parameters_at_start_of_query(
        &self,
        selection: &RowSelection,
        statement: &mut BoundStatement,
        index: usize,
    ) -> Result<usize, LoaderError> {
        if self.bind_limit_parameters_first() {
            self.bind_limit_parameters(selection, statement, index)
        } else {
            Ok(0)
        }
    }

    /// # Errors
    /// Propagates statement binding failures.
    fn bind_limit_parameters_at_end_of_query(
        &self,
        selection: &RowSelection,
        statement: &mut BoundStatement,
        index: usize,
    ) -> Result<usize, LoaderError> {
        if self.bind_limit_parameters_first() {
            Ok(0)
        } else {
            self.bind_limit_parameters(selection, statement, index)
        }
    }

    /// Apply a max-rows directive to the statement. Handlers that put the
    /// limit in the SQL leave the statement untouched.
    fn set_max_rows(&self, _selection: &RowSelection, _statement: &mut BoundStatement) {}

    /// Rows the executor must discard because the SQL does not offset them.
    fn rows_to_skip(&self, selection: &RowSelection) -> usize {
        if self.supports_limit_offset() {
            0
        } else {
            selection.first_row_value()
        }
    }
}

/// Choose the handler for one execution: the dialect's own handler when it
/// can express the requested limit, otherwise [`NoopLimitHandler`].
#[must_use]
pub fn resolve<'a>(handler: &'a dyn LimitHandler, selection: &RowSelection) -> &'a dyn LimitHandler {
    if handler.supports_limit() && selection.has_max_rows() {
        handler
    } else {
        &NOOP
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Leaves the SQL alone and limits through the max-rows directive.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLimitHandler;

impl LimitHandler for NoopLimitHandler {
    fn supports_limit(&self) -> bool {
        false
    }

    fn supports_limit_offset(&self) -> bool {
        false
    }

    fn process_sql(&self, sql: &str, _selection: &RowSelection) -> String {
        sql.to_string()
    }

    fn bind_limit_parameters(
        &self,
        _selection: &RowSelection,
        _statement: &mut BoundStatement,
        _index: usize,
    ) -> Result<usize, LoaderError> {
        Ok(0)
    }

    fn set_max_rows(&self, selection: &RowSelection, statement: &mut BoundStatement) {
        if let Some(max_rows) = selection.max_rows.filter(|m| *m > 0) {
            statement.set_max_rows(Some(max_rows.saturating_add(selection.first_row_value())));
        }
    }
}

/// `... limit ?` / `... limit ? offset ?` appended to the query.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitOffsetLimitHandler;

impl LimitHandler for LimitOffsetLimitHandler {
    fn supports_limit(&self) -> bool {
        true
    }

    fn supports_limit_offset(&self) -> bool {
        true
    }

    fn process_sql(&self, sql: &str, selection: &RowSelection) -> String {
        if selection.has_first_row() {
            format!("{sql} limit ? offset ?")
        } else {
            format!("{sql} limit ?")
        }
    }
}

/// `select top(?) ...`: limit bound ahead of every other parameter, no offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopLimitHandler;

impl LimitHandler for TopLimitHandler {
    fn supports_limit(&self) -> bool {
        true
    }

    fn supports_limit_offset(&self) -> bool {
        false
    }

    fn bind_limit_parameters_first(&self) -> bool {
        true
    }

    fn use_max_for_limit(&self) -> bool {
        true
    }

    fn process_sql(&self, sql: &str, _selection: &RowSelection) -> String {
        let lower = sql.to_ascii_lowercase();
        let trimmed_start = lower.len() - lower.trim_start().len();
        let mut insert_at = None;
        for keyword in ["select distinct", "select"] {
            if lower[trimmed_start..].starts_with(keyword) {
                insert_at = Some(trimmed_start + keyword.len());
                break;
            }
        }
        match insert_at {
            Some(at) => format!("{} top(?){}", &sql[..at], &sql[at..]),
            None => sql.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(first: Option<usize>, max: Option<usize>) -> RowSelection {
        RowSelection {
            first_row: first,
            max_rows: max,
            timeout: None,
        }
    }

    #[test]
    fn limit_offset_appends_clause_and_binds_limit_then_offset() {
        let sel = selection(Some(20), Some(10));
        let handler = LimitOffsetLimitHandler;
        let sql = handler.process_sql("select id from t", &sel);
        assert_eq!(sql, "select id from t limit ? offset ?");

        let mut st = BoundStatement::new(sql);
        assert_eq!(handler.bind_limit_parameters_at_start_of_query(&sel, &mut st, 1).unwrap(), 0);
        assert_eq!(handler.bind_limit_parameters_at_end_of_query(&sel, &mut st, 1).unwrap(), 2);
        assert_eq!(
            st.parameters().unwrap(),
            vec![RowValues::Int(10), RowValues::Int(20)]
        );
        assert_eq!(handler.rows_to_skip(&sel), 0);
    }

    #[test]
    fn top_handler_binds_first_and_uses_max_for_limit() {
        let sel = selection(Some(5), Some(10));
        let handler = TopLimitHandler;
        assert_eq!(
            handler.process_sql("SELECT DISTINCT a from t", &sel),
            "SELECT DISTINCT top(?) a from t"
        );
        let mut st = BoundStatement::new("select top(?) a from t");
        assert_eq!(handler.bind_limit_parameters_at_start_of_query(&sel, &mut st, 1).unwrap(), 1);
        assert_eq!(st.parameters().unwrap(), vec![RowValues::Int(15)]);
        assert_eq!(handler.rows_to_skip(&sel), 5);
    }

    #[test]
    fn noop_sets_max_rows_directive() {
        let sel = selection(Some(3), Some(4));
        let mut st = BoundStatement::new("select 1");
        NoopLimitHandler.set_max_rows(&sel, &mut st);
        assert_eq!(st.max_rows(), Some(7));
        assert_eq!(NoopLimitHandler.rows_to_skip(&sel), 3);
        assert_eq!(st.bound_parameter_count(), 0);
    }

    #[test]
    fn unbounded_page_past_the_first_row_saturates() {
        let sel = selection(Some(1), Some(usize::MAX));

        let mut st = BoundStatement::new("select 1");
        NoopLimitHandler.set_max_rows(&sel, &mut st);
        assert_eq!(st.max_rows(), Some(usize::MAX));

        let mut st = BoundStatement::new("select top(?) a from t");
        assert_eq!(TopLimitHandler.bind_limit_parameters_at_start_of_query(&sel, &mut st, 1).unwrap(), 1);
        assert_eq!(st.parameters().unwrap(), vec![RowValues::Int(i64::MAX)]);
    }

    #[test]
    fn resolve_falls_back_to_noop_without_max_rows() {
        let handler = LimitOffsetLimitHandler;
        let sel = selection(Some(3), None);
        assert!(!resolve(&handler, &sel).supports_limit());
        let sel = selection(None, Some(3));
        assert!(resolve(&handler, &sel).supports_limit());
    }
}
