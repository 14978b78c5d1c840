//! Binding of query parameters into a [`BoundStatement`].

use std::collections::BTreeMap;
use std::fmt::Debug;

use tracing::{debug, trace};

use crate::dialect::{Dialect, LimitHandler};
use crate::error::LoaderError;
use crate::parameters::QueryParameters;
use crate::statement::BoundStatement;
use crate::translation::{ParsedSql, parse_named_parameters};
use crate::types::{RowValues, TypedValue};

/// Loader-specific strategy for binding the ordinary parameter values.
pub trait ParameterBinder: Debug + Send + Sync {
    /// Bind the ordinary parameters starting at `start`, returning how many
    /// positions were consumed.
    ///
    /// # Errors
    /// Returns `LoaderError::BindingError` when a value cannot be bound.
    fn bind_parameter_values(
        &self,
        statement: &mut BoundStatement,
        parameters: &QueryParameters,
        start: usize,
    ) -> Result<usize, LoaderError>;

    /// The SQL the bound positions refer to, for a statement written as `sql`.
    ///
    /// # Errors
    /// Returns `LoaderError::BindingError` when this binder cannot bind `sql`.
    fn expand_sql<'a>(&'a self, sql: &'a str) -> Result<&'a str, LoaderError> {
        Ok(sql)
    }
}

/// Binds positional values one after another.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalParameterBinder;

impl ParameterBinder for PositionalParameterBinder {
    fn bind_parameter_values(
        &self,
        statement: &mut BoundStatement,
        parameters: &QueryParameters,
        start: usize,
    ) -> Result<usize, LoaderError> {
        for (offset, typed) in parameters.positional().iter().enumerate() {
            bind_typed(statement, start + offset, typed)?;
        }
        Ok(parameters.positional().len())
    }
}

/// Binds ordinal and named values at the slots recorded when the SQL was parsed.
///
/// Built for one statement. A named parameter may occupy several slots; each
/// receives the same value. The `?` of a leading `{? = call ...}` escape is
/// the out parameter [`bind_statement`] registers, so it is not a value slot.
#[derive(Debug, Clone, Default)]
pub struct NamedParameterBinder {
    original_sql: String,
    parsed_sql: String,
    ordinal_locations: Vec<usize>,
    named_locations: BTreeMap<String, Vec<usize>>,
    slot_count: usize,
    leading_out_parameter: bool,
}

impl NamedParameterBinder {
    #[must_use]
    pub fn from_sql(sql: &str) -> Self {
        let ParsedSql {
            sql: parsed_sql,
            mut ordinal_locations,
            mut named_locations,
        } = parse_named_parameters(sql);
        let leading_out_parameter =
            ordinal_locations.first() == Some(&0) && is_call_escape_with_result(sql);
        if leading_out_parameter {
            ordinal_locations.remove(0);
            for location in ordinal_locations
                .iter_mut()
                .chain(named_locations.values_mut().flatten())
            {
                *location -= 1;
            }
        }
        let slot_count =
            ordinal_locations.len() + named_locations.values().map(Vec::len).sum::<usize>();
        Self {
            original_sql: sql.to_string(),
            parsed_sql,
            ordinal_locations,
            named_locations,
            slot_count,
            leading_out_parameter,
        }
    }

    /// The statement with every named placeholder rewritten to `?`.
    #[must_use]
    pub fn parsed_sql(&self) -> &str {
        &self.parsed_sql
    }
}

impl ParameterBinder for NamedParameterBinder {
    fn bind_parameter_values(
        &self,
        statement: &mut BoundStatement,
        parameters: &QueryParameters,
        start: usize,
    ) -> Result<usize, LoaderError> {
        if self.leading_out_parameter && !parameters.is_callable() {
            return Err(LoaderError::BindingError {
                sql: statement.sql().to_string(),
                position: start,
                message: "statement returns a result set out parameter but the query is not callable"
                    .to_string(),
            });
        }
        if parameters.positional().len() != self.ordinal_locations.len() {
            return Err(LoaderError::BindingError {
                sql: statement.sql().to_string(),
                position: start,
                message: format!(
                    "expected {} positional values, got {}",
                    self.ordinal_locations.len(),
                    parameters.positional().len()
                ),
            });
        }
        for (typed, location) in parameters.positional().iter().zip(&self.ordinal_locations) {
            bind_typed(statement, start + location, typed)?;
        }
        for (name, locations) in &self.named_locations {
            let typed = parameters
                .named()
                .get(name)
                .ok_or_else(|| LoaderError::BindingError {
                    sql: statement.sql().to_string(),
                    position: start + locations.first().copied().unwrap_or(0),
                    message: format!("no value supplied for named parameter :{name}"),
                })?;
            for location in locations {
                bind_typed(statement, start + location, typed)?;
            }
        }
        Ok(self.slot_count)
    }

    fn expand_sql<'a>(&'a self, sql: &'a str) -> Result<&'a str, LoaderError> {
        if sql == self.original_sql || sql == self.parsed_sql {
            Ok(&self.parsed_sql)
        } else {
            Err(LoaderError::BindingError {
                sql: sql.to_string(),
                position: 0,
                message: format!("named parameters were parsed from a different statement: {}", self.original_sql),
            })
        }
    }
}

/// `{? = call ...}`, ignoring whitespace.
fn is_call_escape_with_result(sql: &str) -> bool {
    sql.trim_start()
        .strip_prefix('{')
        .is_some_and(|rest| rest.trim_start().starts_with('?'))
}

fn bind_typed(
    statement: &mut BoundStatement,
    position: usize,
    typed: &TypedValue,
) -> Result<(), LoaderError> {
    let value = typed
        .sql_type
        .coerce(&typed.value)
        .map_err(|message| LoaderError::BindingError {
            sql: statement.sql().to_string(),
            position,
            message,
        })?;
    statement.set_value(position, value)
}

/// Bind everything a query needs into `statement`, in engine order:
/// start-of-query limit values, the callable out parameter, the ordinary
/// values, end-of-query limit values, the max-rows directive and finally the
/// lock timeout.
///
/// Returns the next free position. Nothing is rolled back on failure; the
/// statement must be discarded.
///
/// # Errors
/// Returns `LoaderError::BindingError` when a value cannot be bound or the
/// dialect cannot register a callable out parameter.
pub fn bind_statement(
    statement: &mut BoundStatement,
    parameters: &QueryParameters,
    limit_handler: &dyn LimitHandler,
    dialect: &Dialect,
    binder: &dyn ParameterBinder,
) -> Result<usize, LoaderError> {
    let selection = parameters.row_selection();
    let mut col = 1;

    col += limit_handler.bind_limit_parameters_at_start_of_query(selection, statement, col)?;

    if parameters.is_callable() {
        if !dialect.supports_callable_out_parameter() {
            return Err(LoaderError::BindingError {
                sql: statement.sql().to_string(),
                position: col,
                message: format!(
                    "dialect {} cannot register a result set out parameter",
                    dialect.name()
                ),
            });
        }
        statement.set_callable(true);
        statement.register_result_set_out(col)?;
        col += 1;
    }

    col += binder.bind_parameter_values(statement, parameters, col)?;

    col += limit_handler.bind_limit_parameters_at_end_of_query(selection, statement, col)?;

    limit_handler.set_max_rows(selection, statement);

    if let Some(lock_options) = parameters.lock_options()
        && let Some(timeout) = lock_options.timeout.as_parameter()
    {
        if !dialect.supports_lock_timeouts() {
            debug!(
                lock_timeout = timeout,
                lock_mode = ?lock_options.lock_mode,
                dialect = dialect.name(),
                "Lock timeout requested but dialect reported to not support lock timeouts"
            );
        } else if dialect.is_lock_timeout_parameterized() {
            statement.set_value(col, RowValues::Int(timeout))?;
            col += 1;
        }
    }

    trace!(total = col - 1, "Bound parameters");

    Ok(col)
}

/// Bind onto a scratch statement and return the materialized values in
/// position order, out parameters excluded.
///
/// # Errors
/// Propagates binding failures.
pub fn to_parameter_array(
    sql: &str,
    parameters: &QueryParameters,
    dialect: &Dialect,
    binder: &dyn ParameterBinder,
) -> Result<Vec<RowValues>, LoaderError> {
    let mut scratch = BoundStatement::new(sql);
    let limit_handler =
        crate::dialect::limit::resolve(dialect.limit_handler(), parameters.row_selection());
    bind_statement(&mut scratch, parameters, limit_handler, dialect, binder)?;
    scratch.parameters()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlType;

    #[test]
    fn positional_values_advance_cursor_by_count() {
        let params = QueryParameters::new()
            .with_positional(vec![RowValues::Int(1), RowValues::Int(2), RowValues::Int(3)]);
        let mut st = BoundStatement::new("select ? , ?, ?");
        let next = bind_statement(
            &mut st,
            &params,
            &crate::dialect::NoopLimitHandler,
            &Dialect::sqlite(),
            &PositionalParameterBinder,
        )
        .unwrap();
        assert_eq!(next, 4);
        assert_eq!(st.bound_parameter_count(), 3);
    }

    #[test]
    fn named_values_fill_every_location() {
        let binder = NamedParameterBinder::from_sql("select * from t where a = :v or b = ? or c = :v");
        let params = QueryParameters::new()
            .with_positional(vec![RowValues::Text("b".into())])
            .with_named("v", RowValues::Int(7));
        assert_eq!(binder.parsed_sql(), "select * from t where a = ? or b = ? or c = ?");
        let mut st = BoundStatement::new(binder.parsed_sql());
        let bound = binder.bind_parameter_values(&mut st, &params, 1).unwrap();
        assert_eq!(bound, 3);
        assert_eq!(
            st.parameters().unwrap(),
            vec![RowValues::Int(7), RowValues::Text("b".into()), RowValues::Int(7)]
        );
    }

    #[test]
    fn missing_named_value_is_a_binding_error() {
        let binder = NamedParameterBinder::from_sql("select * from t where a = :missing");
        let mut st = BoundStatement::new(binder.parsed_sql());
        let err = binder
            .bind_parameter_values(&mut st, &QueryParameters::new(), 1)
            .unwrap_err();
        assert!(err.to_string().contains(":missing"));
    }

    #[test]
    fn type_mismatch_reports_position_and_sql() {
        let params = QueryParameters::new().with_typed_positional(vec![
            TypedValue::new(RowValues::Int(1), SqlType::Integer),
            TypedValue::new(RowValues::Text("nope".into()), SqlType::Integer),
        ]);
        let mut st = BoundStatement::new("select ?, ?");
        let err = bind_statement(
            &mut st,
            &params,
            &crate::dialect::NoopLimitHandler,
            &Dialect::sqlite(),
            &PositionalParameterBinder,
        )
        .unwrap_err();
        match err {
            LoaderError::BindingError { sql, position, .. } => {
                assert_eq!(position, 2);
                assert_eq!(sql, "select ?, ?");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn named_binder_leaves_the_call_result_slot_to_the_out_parameter() {
        let binder = NamedParameterBinder::from_sql("{? = call f(:a, ?)}");
        assert_eq!(binder.parsed_sql(), "{? = call f(?, ?)}");
        let params = QueryParameters::new()
            .with_positional(vec![RowValues::Text("x".into())])
            .with_named("a", RowValues::Int(5))
            .callable();
        let mut st = BoundStatement::new(binder.parsed_sql());

        let next = bind_statement(
            &mut st,
            &params,
            &crate::dialect::NoopLimitHandler,
            &Dialect::postgres(),
            &binder,
        )
        .unwrap();

        assert_eq!(next, 4);
        assert_eq!(st.out_parameter_positions(), vec![1]);
        assert_eq!(
            st.parameters().unwrap(),
            vec![RowValues::Int(5), RowValues::Text("x".into())]
        );

        let mut st = BoundStatement::new(binder.parsed_sql());
        let not_callable = QueryParameters::new()
            .with_positional(vec![RowValues::Text("x".into())])
            .with_named("a", RowValues::Int(5));
        assert!(matches!(
            binder.bind_parameter_values(&mut st, &not_callable, 1),
            Err(LoaderError::BindingError { .. })
        ));
    }

    #[test]
    fn named_binder_refuses_other_statements() {
        let binder = NamedParameterBinder::from_sql("select * from t where a = :a");
        assert_eq!(
            binder.expand_sql("select * from t where a = :a").unwrap(),
            "select * from t where a = ?"
        );
        assert!(binder.expand_sql("select 1").is_err());
        assert_eq!(PositionalParameterBinder.expand_sql("select 1").unwrap(), "select 1");
    }
}
