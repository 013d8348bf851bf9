//! Entity field registry.
//!
//! An [`Entity`] is a table name, its key fields and an ordered registry of
//! [`FieldDef`]s. Each field lives in exactly one bucket:
//! - writable fields are set by application code and written by add/update
//! - read-only fields are only populated by read/fetch
//! - computed fields are select-only, optionally backed by a SQL expression
//!
//! Which statements a field takes part in is controlled by its operation mask
//! over `c` (computed), `r` (read), `f` (fetch), `a` (add) and `u` (update).

use crate::error::{DbError, DbResult};
use crate::models::Value;
use std::str::FromStr;
use std::sync::Arc;

/// Bucket a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Writable,
    ReadOnly,
    Computed,
}

/// One capability in a field's operation mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Computed,
    Read,
    Fetch,
    Add,
    Update,
}

impl Operation {
    fn bit(self) -> u8 {
        match self {
            Self::Computed => 0b00001,
            Self::Read => 0b00010,
            Self::Fetch => 0b00100,
            Self::Add => 0b01000,
            Self::Update => 0b10000,
        }
    }

    fn letter(self) -> char {
        match self {
            Self::Computed => 'c',
            Self::Read => 'r',
            Self::Fetch => 'f',
            Self::Add => 'a',
            Self::Update => 'u',
        }
    }
}

const ALL_OPERATIONS: [Operation; 5] = [
    Operation::Computed,
    Operation::Read,
    Operation::Fetch,
    Operation::Add,
    Operation::Update,
];

/// Operation mask parsed from a capability string such as `"rfau"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Operations(u8);

impl Operations {
    pub fn contains(self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn with(self, op: Operation) -> Self {
        Self(self.0 | op.bit())
    }

    pub fn without(self, op: Operation) -> Self {
        Self(self.0 & !op.bit())
    }

    /// Default mask of a bucket.
    pub fn default_for(bucket: Bucket) -> Self {
        let mask = match bucket {
            Bucket::Writable => "rfau",
            Bucket::ReadOnly => "rf",
            Bucket::Computed => "crf",
        };
        // Literal masks above only use valid letters
        mask.parse().unwrap_or_default()
    }
}

impl FromStr for Operations {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars().try_fold(Self::default(), |ops, c| {
            ALL_OPERATIONS
                .iter()
                .find(|op| op.letter() == c.to_ascii_lowercase())
                .map(|op| ops.with(*op))
                .ok_or_else(|| {
                    DbError::invalid_definition(format!(
                        "Unknown field operation '{}' in '{}'",
                        c, s
                    ))
                })
        })
    }
}

impl std::fmt::Display for Operations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for op in ALL_OPERATIONS {
            if self.contains(op) {
                write!(f, "{}", op.letter())?;
            }
        }
        Ok(())
    }
}

/// Semantic type tag of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Bool,
    /// Numeric-looking text that must still be written as a literal number
    NoString,
    /// Optimistic-concurrency column
    RowVersion,
    Integer,
    Decimal,
    Date,
    Timestamp,
    Binary,
    /// Soft-delete flag; a false value makes `read` report an inactive record
    Active,
}

impl FromStr for FieldType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "text" => Ok(Self::Text),
            "bool" | "boolean" => Ok(Self::Bool),
            "nostring" => Ok(Self::NoString),
            "rowversion" => Ok(Self::RowVersion),
            "int" | "integer" => Ok(Self::Integer),
            "decimal" | "numeric" => Ok(Self::Decimal),
            "date" => Ok(Self::Date),
            "timestamp" | "datetime" => Ok(Self::Timestamp),
            "binary" => Ok(Self::Binary),
            "active" => Ok(Self::Active),
            other => Err(DbError::invalid_definition(format!(
                "Unknown field type '{}'",
                other
            ))),
        }
    }
}

/// Per-field validation callback, run by [`Entity::set`].
pub type FieldValidator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One registered field.
#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub bucket: Bucket,
    pub operations: Operations,
    pub field_type: FieldType,
    /// SQL expression backing a computed field
    pub expression: Option<String>,
    pub validator: Option<FieldValidator>,
    pub value: Value,
}

impl FieldDef {
    fn new(name: &str, bucket: Bucket, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            bucket,
            operations: Operations::default_for(bucket),
            field_type,
            expression: None,
            validator: None,
            value: Value::Null,
        }
    }

    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(op)
    }
}

impl std::fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("bucket", &self.bucket)
            .field("operations", &self.operations.to_string())
            .field("field_type", &self.field_type)
            .field("expression", &self.expression)
            .field("has_validator", &self.validator.is_some())
            .field("value", &self.value)
            .finish()
    }
}

/// A typed record mapped to a table.
#[derive(Debug, Clone)]
pub struct Entity {
    table: String,
    key_fields: Vec<String>,
    id_field: Option<String>,
    fields: Vec<FieldDef>,
}

impl Entity {
    /// Start building an entity for `table`.
    pub fn builder(table: impl Into<String>) -> EntityBuilder {
        EntityBuilder::new(table)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    /// Identity column filled in by the engine on insert.
    pub fn id_field(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Fields whose mask includes `op`, in registry order.
    pub fn fields_with(&self, op: Operation) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(move |f| f.allows(op))
    }

    pub fn rowversion_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.field_type == FieldType::RowVersion)
            .map(|f| f.name.as_str())
    }

    pub fn active_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.field_type == FieldType::Active)
            .map(|f| f.name.as_str())
    }

    /// True when a read-back is needed to see engine-populated values.
    pub fn has_generated_fields(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.bucket != Bucket::Writable)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.field(name).map(|f| &f.value)
    }

    /// Set a writable field from application code.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> DbResult<()> {
        let value = value.into();
        let table = self.table.clone();
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                DbError::invalid_definition(format!("Field '{}' is not defined on '{}'", name, table))
            })?;

        match field.bucket {
            Bucket::Writable => {}
            Bucket::ReadOnly => {
                return Err(DbError::invalid_definition(format!(
                    "Field '{}' on '{}' is read-only",
                    name, table
                )));
            }
            Bucket::Computed => {
                return Err(DbError::invalid_definition(format!(
                    "Field '{}' on '{}' is computed",
                    name, table
                )));
            }
        }

        if let Some(validator) = &field.validator {
            if !value.is_null() && !validator(&value) {
                return Err(DbError::invalid_definition(format!(
                    "Value {} rejected for field '{}' on '{}'",
                    value, name, table
                )));
            }
        }

        field.value = value;
        Ok(())
    }

    /// Store a value read from the database into any bucket.
    ///
    /// Unknown names are ignored so wider projections load cleanly.
    pub fn load(&mut self, name: &str, value: Value) {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
            field.value = value;
        }
    }

    /// Load every column of a row into the matching fields.
    pub fn load_row(&mut self, row: &crate::db::Row) {
        for (name, value) in row.iter() {
            self.load(name, value.clone());
        }
    }

    /// Reset every field to null.
    pub fn clear(&mut self) {
        for field in &mut self.fields {
            field.value = Value::Null;
        }
    }
}

/// Builder for [`Entity`]; all checks run in [`EntityBuilder::build`].
pub struct EntityBuilder {
    table: String,
    key_fields: Vec<String>,
    id_field: Option<String>,
    fields: Vec<FieldDef>,
    pending_operations: Vec<(String, String)>,
    pending_validators: Vec<(String, FieldValidator)>,
}

impl EntityBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_fields: Vec::new(),
            id_field: None,
            fields: Vec::new(),
            pending_operations: Vec::new(),
            pending_validators: Vec::new(),
        }
    }

    /// Append a key field (order matters for predicates).
    pub fn key(mut self, name: &str) -> Self {
        self.key_fields.push(name.to_string());
        self
    }

    pub fn id_field(mut self, name: &str) -> Self {
        self.id_field = Some(name.to_string());
        self
    }

    /// Register a writable field.
    pub fn field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields
            .push(FieldDef::new(name, Bucket::Writable, field_type));
        self
    }

    /// Register a read-only field.
    pub fn read_only(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields
            .push(FieldDef::new(name, Bucket::ReadOnly, field_type));
        self
    }

    /// Register a computed field, optionally backed by a SQL expression.
    pub fn computed(mut self, name: &str, field_type: FieldType, expression: Option<&str>) -> Self {
        let mut def = FieldDef::new(name, Bucket::Computed, field_type);
        def.expression = expression.map(String::from);
        self.fields.push(def);
        self
    }

    /// Register the optimistic-concurrency column.
    pub fn rowversion(self, name: &str) -> Self {
        self.read_only(name, FieldType::RowVersion)
    }

    /// Override the operation mask of a field.
    pub fn operations(mut self, name: &str, mask: &str) -> Self {
        self.pending_operations
            .push((name.to_string(), mask.to_string()));
        self
    }

    pub fn validator<F>(mut self, name: &str, validator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.pending_validators
            .push((name.to_string(), Arc::new(validator)));
        self
    }

    pub fn build(self) -> DbResult<Entity> {
        let table = self.table;
        if table.trim().is_empty() {
            return Err(DbError::invalid_definition("Entity table name is empty"));
        }

        let mut fields = self.fields;
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(DbError::invalid_definition(format!(
                    "Field '{}' is registered twice on '{}'",
                    field.name, table
                )));
            }
        }

        for (name, mask) in self.pending_operations {
            let ops: Operations = mask.parse()?;
            let field = find_mut(&mut fields, &name, &table)?;
            field.operations = ops;
        }

        for (name, validator) in self.pending_validators {
            find_mut(&mut fields, &name, &table)?.validator = Some(validator);
        }

        let rowversions = fields
            .iter()
            .filter(|f| f.field_type == FieldType::RowVersion)
            .count();
        if rowversions > 1 {
            return Err(DbError::invalid_definition(format!(
                "'{}' declares {} rowversion fields, at most one is allowed",
                table, rowversions
            )));
        }

        for field in &mut fields {
            if field.field_type == FieldType::RowVersion {
                field.bucket = Bucket::ReadOnly;
                field.operations = Operations::default_for(Bucket::ReadOnly);
            }
        }

        for key in &self.key_fields {
            if !fields.iter().any(|f| &f.name == key) {
                return Err(DbError::invalid_definition(format!(
                    "Key field '{}' is not defined on '{}'",
                    key, table
                )));
            }
        }

        if let Some(id) = &self.id_field {
            if !fields.iter().any(|f| &f.name == id) {
                return Err(DbError::invalid_definition(format!(
                    "Id field '{}' is not defined on '{}'",
                    id, table
                )));
            }
        }

        Ok(Entity {
            table,
            key_fields: self.key_fields,
            id_field: self.id_field,
            fields,
        })
    }
}

fn find_mut<'a>(fields: &'a mut [FieldDef], name: &str, table: &str) -> DbResult<&'a mut FieldDef> {
    fields.iter_mut().find(|f| f.name == name).ok_or_else(|| {
        DbError::invalid_definition(format!("Field '{}' is not defined on '{}'", name, table))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationStatus;

    fn invoice() -> Entity {
        Entity::builder("invoice")
            .key("number")
            .field("number", FieldType::Integer)
            .field("description", FieldType::Text)
            .read_only("created_at", FieldType::Timestamp)
            .computed("label", FieldType::Text, Some("'#' || number"))
            .rowversion("version")
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_operations() {
        let e = invoice();
        assert_eq!(e.field("number").unwrap().operations.to_string(), "rfau");
        assert_eq!(e.field("created_at").unwrap().operations.to_string(), "rf");
        assert_eq!(e.field("label").unwrap().operations.to_string(), "crf");
        assert_eq!(e.rowversion_field(), Some("version"));
    }

    #[test]
    fn test_set_rejects_unknown_and_read_only() {
        let mut e = invoice();
        assert!(e.set("description", "Invoice 100").is_ok());
        assert_eq!(e.get("description"), Some(&Value::Text("Invoice 100".into())));

        let err = e.set("missing", 1).unwrap_err();
        assert_eq!(err.status(), OperationStatus::InvalidDefinition);
        assert!(e.set("created_at", "2024-01-01").is_err());
        assert!(e.set("label", "x").is_err());
        assert!(e.set("version", 3).is_err());
    }

    #[test]
    fn test_load_populates_read_only() {
        let mut e = invoice();
        e.load("version", Value::Int(7));
        e.load("not_a_field", Value::Int(1));
        assert_eq!(e.get("version"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_second_rowversion_rejected() {
        let result = Entity::builder("t")
            .rowversion("v1")
            .rowversion("v2")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rowversion_forced_read_only() {
        let e = Entity::builder("t")
            .field("v", FieldType::RowVersion)
            .operations("v", "rfau")
            .build()
            .unwrap();
        let v = e.field("v").unwrap();
        assert_eq!(v.bucket, Bucket::ReadOnly);
        assert_eq!(v.operations.to_string(), "rf");
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = Entity::builder("t")
            .field("a", FieldType::Text)
            .read_only("a", FieldType::Text)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_key_must_exist() {
        assert!(Entity::builder("t").key("id").build().is_err());
    }

    #[test]
    fn test_validator_runs_on_set() {
        let mut e = Entity::builder("t")
            .field("qty", FieldType::Integer)
            .validator("qty", |v| v.as_i64().is_some_and(|n| n > 0))
            .build()
            .unwrap();
        assert!(e.set("qty", 3).is_ok());
        assert!(e.set("qty", -1).is_err());
        assert_eq!(e.get("qty"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_operations_parse() {
        let ops: Operations = "fa".parse().unwrap();
        assert!(ops.contains(Operation::Fetch));
        assert!(!ops.contains(Operation::Update));
        assert!("rx".parse::<Operations>().is_err());
    }

    #[test]
    fn test_field_type_tags() {
        assert_eq!("rowversion".parse::<FieldType>().unwrap(), FieldType::RowVersion);
        assert_eq!("string".parse::<FieldType>().unwrap(), FieldType::Text);
        assert!("blob".parse::<FieldType>().is_err());
    }
}
