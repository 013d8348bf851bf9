//! Data models for the persistence layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod constraint;
pub mod entity;
pub mod routine;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionConfig, Engine, SessionOptions};
pub use constraint::{
    Comparison, Constraint, JoinEntry, JoinType, Operator, OrderBy, SortDirection, WhereField,
    Wildcard,
};
pub use entity::{
    Bucket, Entity, EntityBuilder, FieldDef, FieldType, FieldValidator, Operation, Operations,
};
pub use routine::{
    CallShape, DeclaredParam, Direction, Param, ParamKind, RoutineKind, RoutineSignature,
};
pub use value::Value;
