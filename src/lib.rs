//! dbentity library
//!
//! An entity and constraint persistence layer for PostgreSQL, MySQL/MariaDB,
//! SQL Server and SQLite, with a stored-routine normalizer that hands every
//! routine result back as one result-collection shape.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod persistence;
pub mod routine;

pub use config::Config;
pub use db::{Database, ResultCollection, ResultSet};
pub use error::{DbError, DbResult, OperationStatus};
pub use persistence::{Accessor, SqlBuilder};
