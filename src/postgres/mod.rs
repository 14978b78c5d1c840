// PostgreSQL backend
//
// - config: pool setup and the bb8 connection manager
// - params: `ToSql` for bound values
// - query: statement execution and result extraction

pub mod config;
pub mod params;
pub mod query;

pub use config::{PgManager, PostgresOptions};
pub use params::Params;
pub use query::{
    build_result_set_from_statement, callable_to_select, execute_batch, execute_select,
    postgres_extract_value,
};
