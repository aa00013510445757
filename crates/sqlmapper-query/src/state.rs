//! Per-build query accumulator.

use sqlmapper_core::{Parameters, Value};

/// State threaded through the evaluators of one build.
///
/// With `emit_sql` off the SQL text is already cached: evaluators still walk
/// the chain and bind fresh parameters, but text appends are dropped.
#[derive(Debug)]
pub struct QueryState {
    where_parts: Vec<String>,
    current: Option<String>,
    distinct: bool,
    parameters: Parameters,
    next_parameter: usize,
    field_names: Vec<String>,
    emit_sql: bool,
}

impl QueryState {
    pub fn new(emit_sql: bool) -> Self {
        Self {
            where_parts: Vec::new(),
            current: None,
            distinct: false,
            parameters: Parameters::new(),
            next_parameter: 0,
            field_names: Vec::new(),
            emit_sql,
        }
    }

    pub fn emit_sql(&self) -> bool {
        self.emit_sql
    }

    /// Next auto-numbered parameter name: `p0`, `p1`, ...
    pub fn next_parameter(&mut self) -> String {
        let name = format!("p{}", self.next_parameter);
        self.next_parameter += 1;
        name
    }

    /// Bind a value under a fresh parameter name and return the name.
    pub fn bind(&mut self, value: Value) -> String {
        let name = self.next_parameter();
        self.parameters.add(name.clone(), value);
        name
    }

    /// Start the clause of one `where` operator.
    pub fn begin_where(&mut self) {
        self.current = Some(String::new());
    }

    /// Finish the current `where` clause.
    pub fn end_where(&mut self) {
        if let Some(part) = self.current.take() {
            if self.emit_sql {
                self.where_parts.push(part);
            }
        }
    }

    /// Append text to the current clause.
    pub fn push(&mut self, sql: &str) {
        if !self.emit_sql {
            return;
        }
        if let Some(part) = self.current.as_mut() {
            part.push_str(sql);
        }
    }

    pub fn set_distinct(&mut self) {
        self.distinct = true;
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Restrict the selected fields.
    pub fn set_fields(&mut self, fields: Vec<String>) {
        self.field_names = fields;
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// All `where` clauses joined with ` AND `, outermost first.
    pub fn where_clause(&self) -> Option<String> {
        if self.where_parts.is_empty() {
            None
        } else {
            Some(self.where_parts.join(" AND "))
        }
    }

    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn into_parameters(self) -> Parameters {
        self.parameters
    }
}

impl Default for QueryState {
    fn default() -> Self {
        Self::new(true)
    }
}
