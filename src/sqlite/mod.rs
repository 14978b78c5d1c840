// SQLite backend
//
// - config: pool options and the bb8 connection manager
// - params: conversion of bound values into rusqlite values
// - query: statement execution and result extraction

pub mod config;
pub mod params;
pub mod query;

pub use config::{SqliteManager, SqliteOptions, SqliteOptionsBuilder};
pub use params::{Params, row_value_to_sqlite_value};
pub use query::{build_result_set, execute_batch, execute_select, sqlite_extract_value_sync};
