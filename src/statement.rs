use crate::error::LoaderError;
use crate::types::RowValues;

/// Slot in a bound statement.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Unbound,
    Value(RowValues),
    /// Result-set output parameter of a callable statement.
    ResultSetOut,
}

/// A statement being prepared for one execution.
///
/// Parameter positions are 1-based, like JDBC column indexes. The statement
/// is owned by a single execution and is not meant to be shared; binding
/// advances positions strictly in sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    sql: String,
    slots: Vec<Slot>,
    max_rows: Option<usize>,
    skip_rows: usize,
    callable: bool,
}

impl BoundStatement {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            slots: Vec::new(),
            max_rows: None,
            skip_rows: 0,
            callable: false,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn set_callable(&mut self, callable: bool) {
        self.callable = callable;
    }

    #[must_use]
    pub fn is_callable(&self) -> bool {
        self.callable
    }

    fn slot_mut(&mut self, position: usize) -> Result<&mut Slot, LoaderError> {
        if position == 0 {
            return Err(LoaderError::BindingError {
                sql: self.sql.clone(),
                position,
                message: "parameter positions start at 1".into(),
            });
        }
        if self.slots.len() < position {
            self.slots.resize(position, Slot::Unbound);
        }
        Ok(&mut self.slots[position - 1])
    }

    /// Bind `value` at 1-based `position`, replacing any earlier value.
    ///
    /// # Errors
    /// Returns `LoaderError::BindingError` for position 0.
    pub fn set_value(&mut self, position: usize, value: RowValues) -> Result<(), LoaderError> {
        *self.slot_mut(position)? = Slot::Value(value);
        Ok(())
    }

    /// Register a result-set output parameter at `position`.
    ///
    /// # Errors
    /// Returns `LoaderError::BindingError` for position 0.
    pub fn register_result_set_out(&mut self, position: usize) -> Result<(), LoaderError> {
        *self.slot_mut(position)? = Slot::ResultSetOut;
        Ok(())
    }

    /// Max-rows directive; not a bind parameter.
    pub fn set_max_rows(&mut self, max_rows: Option<usize>) {
        self.max_rows = max_rows;
    }

    #[must_use]
    pub fn max_rows(&self) -> Option<usize> {
        self.max_rows
    }

    /// Rows to discard from the front of the result because the SQL could not offset them.
    pub fn set_skip_rows(&mut self, skip_rows: usize) {
        self.skip_rows = skip_rows;
    }

    #[must_use]
    pub fn skip_rows(&self) -> usize {
        self.skip_rows
    }

    /// Number of parameter positions bound so far, out parameters included.
    #[must_use]
    pub fn bound_parameter_count(&self) -> usize {
        self.slots.iter().filter(|s| **s != Slot::Unbound).count()
    }

    #[must_use]
    pub fn out_parameter_positions(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == Slot::ResultSetOut)
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// Materialize the input parameter values in position order.
    ///
    /// Output parameter slots are skipped.
    ///
    /// # Errors
    /// Returns `LoaderError::BindingError` if a position below the highest bound
    /// one was never bound.
    pub fn parameters(&self) -> Result<Vec<RowValues>, LoaderError> {
        let mut values = Vec::with_capacity(self.slots.len());
        for (idx, slot) in self.slots.iter().enumerate() {
            match slot {
                Slot::Value(v) => values.push(v.clone()),
                Slot::ResultSetOut => {}
                Slot::Unbound => {
                    return Err(LoaderError::BindingError {
                        sql: self.sql.clone(),
                        position: idx + 1,
                        message: "no value bound".into(),
                    });
                }
            }
        }
        Ok(values)
    }
}
