//! Entity persistence.
//!
//! [`SqlBuilder`] turns an entity and a constraint into engine SQL;
//! [`Accessor`] runs those statements on a session and maps the outcome to
//! the status taxonomy.

pub mod accessor;
pub mod builder;

pub use accessor::{Accessor, SqlHooks, StatementKind};
pub use builder::{InsertSql, SqlBuilder};
