//! Query identities.
//!
//! Every compiled artefact (deserializer, binder, combiner, generated SQL)
//! is cached under the identity of the call that produced it.

use sqlmapper_core::TypeTag;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Value-equality key of one query shape.
///
/// Immutable; the hash is computed once at construction.
#[derive(Clone)]
pub struct QueryIdentity {
    connection: String,
    sql: String,
    result: Option<TypeTag>,
    params: Option<TypeTag>,
    secondary: Option<TypeTag>,
    grid: usize,
    hash: u64,
}

impl QueryIdentity {
    pub fn new(
        connection: &str,
        sql: &str,
        result: Option<TypeTag>,
        params: Option<TypeTag>,
    ) -> Self {
        Self::build(connection.to_string(), sql.to_string(), result, params, None, 0)
    }

    /// Identity of a call taking a second parameter shape (`update_where`).
    pub fn with_secondary(
        connection: &str,
        sql: &str,
        result: Option<TypeTag>,
        params: Option<TypeTag>,
        secondary: Option<TypeTag>,
    ) -> Self {
        Self::build(
            connection.to_string(),
            sql.to_string(),
            result,
            params,
            secondary,
            0,
        )
    }

    /// Identity of grid `index` of a multi-result call, read as `result`.
    pub fn for_grid(&self, result: Option<TypeTag>, index: usize) -> Self {
        Self::build(
            self.connection.clone(),
            self.sql.clone(),
            result,
            self.params,
            None,
            index,
        )
    }

    fn build(
        connection: String,
        sql: String,
        result: Option<TypeTag>,
        params: Option<TypeTag>,
        secondary: Option<TypeTag>,
        grid: usize,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        grid.hash(&mut hasher);
        sql.hash(&mut hasher);
        connection.hash(&mut hasher);
        result.hash(&mut hasher);
        params.hash(&mut hasher);
        secondary.hash(&mut hasher);
        Self {
            connection,
            sql,
            result,
            params,
            secondary,
            grid,
            hash: hasher.finish(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn grid(&self) -> usize {
        self.grid
    }

    /// The precomputed hash.
    pub fn hash_code(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for QueryIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.grid == other.grid
            && self.sql == other.sql
            && self.connection == other.connection
            && self.result == other.result
            && self.params == other.params
            && self.secondary == other.secondary
    }
}

impl Eq for QueryIdentity {}

impl Hash for QueryIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for QueryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryIdentity")
            .field("connection", &self.connection)
            .field("sql", &self.sql)
            .field("result", &self.result.map(|t| t.name()))
            .field("params", &self.params.map(|t| t.name()))
            .field("secondary", &self.secondary.map(|t| t.name()))
            .field("grid", &self.grid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmapper_core::Params;

    fn identity(sql: &str) -> QueryIdentity {
        QueryIdentity::new(
            "sqlite://test",
            sql,
            Some(TypeTag::of::<i32>()),
            Some(TypeTag::of::<Params>()),
        )
    }

    #[test]
    fn test_equal_components_are_equal() {
        let a = identity("select 1");
        let b = identity("select 1");
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());
    }

    #[test]
    fn test_each_component_distinguishes() {
        let base = identity("select 1");
        assert_ne!(base, identity("select 2"));
        assert_ne!(
            base,
            QueryIdentity::new("sqlite://other", "select 1", Some(TypeTag::of::<i32>()), Some(TypeTag::of::<Params>()))
        );
        assert_ne!(
            base,
            QueryIdentity::new("sqlite://test", "select 1", Some(TypeTag::of::<i64>()), Some(TypeTag::of::<Params>()))
        );
        assert_ne!(
            base,
            QueryIdentity::new("sqlite://test", "select 1", Some(TypeTag::of::<i32>()), None)
        );
        assert_ne!(
            base,
            QueryIdentity::with_secondary(
                "sqlite://test",
                "select 1",
                Some(TypeTag::of::<i32>()),
                Some(TypeTag::of::<Params>()),
                Some(TypeTag::of::<Params>()),
            )
        );
    }

    #[test]
    fn test_for_grid() {
        let base = identity("select 1; select 2");
        let grid = base.for_grid(Some(TypeTag::of::<String>()), 1);
        assert_eq!(grid.grid(), 1);
        assert_eq!(grid.sql(), base.sql());
        assert_ne!(grid, base);
        assert_eq!(grid, base.for_grid(Some(TypeTag::of::<String>()), 1));
    }
}
