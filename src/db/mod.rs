//! Database access layer.
//!
//! This module provides:
//! - The connection adapter contract and one adapter per engine
//! - Buffered result sets and result collections
//! - Per-engine SQL text rules (literals, identifiers, pagination)
//! - Connection-scoped transactions
//! - The [`Database`] session tying them together

pub mod connection;
pub mod database;
pub mod dialect;
pub mod mssql;
pub mod mysql;
pub(crate) mod params;
pub mod postgres;
pub mod result;
pub mod scripted;
pub mod sqlite;
pub mod transaction;
pub mod types;

pub use connection::{ConnectionAdapter, Executed, NativeError};
pub use database::{CALL_LOG_TARGET, Database, create_adapter};
pub use dialect::escape_like;
pub use mssql::MssqlAdapter;
pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use result::{
    FieldData, OutputParameters, OwnedRow, ResultCollection, ResultRow, ResultSet, Row, RowCursor,
    RowShape,
};
pub use scripted::{ScriptLog, ScriptedAdapter};
pub use sqlite::SqliteAdapter;
pub use transaction::TransactionManager;
