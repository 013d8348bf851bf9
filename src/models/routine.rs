//! Stored-routine call inputs and declared signatures.

use crate::models::Value;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Return pattern of a stored routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallShape {
    Scalar,
    SingleResultSet,
    MultiResultSet,
}

impl FromStr for CallShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "scalar" => Ok(Self::Scalar),
            "single" | "single_resultset" => Ok(Self::SingleResultSet),
            "multi" | "multi_resultset" => Ok(Self::MultiResultSet),
            other => Err(format!(
                "Unknown call shape '{}'. Use scalar, single or multi",
                other
            )),
        }
    }
}

/// Parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    In,
    Out,
    InOut,
}

impl Direction {
    /// True when the caller supplies a value.
    pub fn is_input(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    /// True when the routine hands a value back.
    pub fn is_output(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            "INOUT" | "IN/OUT" | "IN OUT" => Ok(Self::InOut),
            other => Err(format!("Unknown parameter direction '{}'", other)),
        }
    }
}

static NULL: Value = Value::Null;

/// What a call parameter carries.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Scalar(Value),
    /// Refcursor drained into an extra result set; the optional name is the
    /// portal name handed to the routine.
    Cursor(Option<String>),
    /// Row set bound to a declared structured table type.
    Table {
        type_name: String,
        rows: Vec<Vec<Value>>,
    },
}

/// One caller-supplied routine parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub kind: ParamKind,
    pub direction: Direction,
    /// Engine type name overriding the declared one
    pub sql_type: Option<String>,
}

impl Param {
    /// Positional IN value.
    pub fn input(value: impl Into<Value>) -> Self {
        Self {
            kind: ParamKind::Scalar(value.into()),
            direction: Direction::In,
            sql_type: None,
        }
    }

    pub fn output() -> Self {
        Self {
            kind: ParamKind::Scalar(Value::Null),
            direction: Direction::Out,
            sql_type: None,
        }
    }

    pub fn output_typed(sql_type: &str) -> Self {
        Self {
            sql_type: Some(sql_type.to_string()),
            ..Self::output()
        }
    }

    pub fn inout(value: impl Into<Value>) -> Self {
        Self {
            kind: ParamKind::Scalar(value.into()),
            direction: Direction::InOut,
            sql_type: None,
        }
    }

    /// OUT cursor whose portal name is chosen by the routine.
    pub fn cursor() -> Self {
        Self {
            kind: ParamKind::Cursor(None),
            direction: Direction::Out,
            sql_type: None,
        }
    }

    /// Cursor with a caller-chosen portal name.
    pub fn named_cursor(name: &str) -> Self {
        Self {
            kind: ParamKind::Cursor(Some(name.to_string())),
            direction: Direction::InOut,
            sql_type: None,
        }
    }

    pub fn table(type_name: &str, rows: Vec<Vec<Value>>) -> Self {
        Self {
            kind: ParamKind::Table {
                type_name: type_name.to_string(),
                rows,
            },
            direction: Direction::In,
            sql_type: None,
        }
    }

    pub fn with_type(mut self, sql_type: &str) -> Self {
        self.sql_type = Some(sql_type.to_string());
        self
    }

    pub fn is_cursor(&self) -> bool {
        matches!(self.kind, ParamKind::Cursor(_))
    }

    pub fn is_table(&self) -> bool {
        matches!(self.kind, ParamKind::Table { .. })
    }

    /// The scalar value, or null for cursors and tables.
    pub fn value(&self) -> &Value {
        match &self.kind {
            ParamKind::Scalar(v) => v,
            _ => &NULL,
        }
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Self::input(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineKind {
    Function,
    Procedure,
}

/// A parameter as declared by the routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredParam {
    /// Declared name without any `@` prefix
    pub name: String,
    /// Engine type name, already carrying length/precision where relevant
    pub data_type: String,
    pub direction: Direction,
    /// One-based position
    pub position: u32,
}

impl DeclaredParam {
    pub fn new(name: &str, data_type: &str, direction: Direction, position: u32) -> Self {
        Self {
            name: name.trim_start_matches('@').to_string(),
            data_type: data_type.to_string(),
            direction,
            position,
        }
    }

    pub fn is_cursor(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("refcursor")
    }
}

/// Declared signature of a routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineSignature {
    pub schema: Option<String>,
    pub name: String,
    pub kind: RoutineKind,
    pub params: Vec<DeclaredParam>,
}

impl RoutineSignature {
    pub fn new(name: &str, kind: RoutineKind, params: Vec<DeclaredParam>) -> Self {
        let (schema, name) = match name.rsplit_once('.') {
            Some((schema, name)) => (Some(schema.to_string()), name.to_string()),
            None => (None, name.to_string()),
        };
        Self {
            schema,
            name,
            kind,
            params,
        }
    }

    /// `schema.name` or `name`.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    /// Index of a declared parameter, case-insensitive, `@` ignored.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        let wanted = name.trim_start_matches('@');
        self.params
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_shape_parse() {
        assert_eq!("multi".parse::<CallShape>().unwrap(), CallShape::MultiResultSet);
        assert_eq!(
            "SINGLE_RESULTSET".parse::<CallShape>().unwrap(),
            CallShape::SingleResultSet
        );
        assert!("many".parse::<CallShape>().is_err());
    }

    #[test]
    fn test_direction_flags() {
        assert!(Direction::InOut.is_input() && Direction::InOut.is_output());
        assert!(!Direction::Out.is_input());
        assert_eq!("in out".parse::<Direction>().unwrap(), Direction::InOut);
    }

    #[test]
    fn test_signature_lookup() {
        let sig = RoutineSignature::new(
            "dbo.get_orders",
            RoutineKind::Procedure,
            vec![
                DeclaredParam::new("@CustomerId", "int", Direction::In, 1),
                DeclaredParam::new("@Total", "decimal(18,2)", Direction::InOut, 2),
            ],
        );
        assert_eq!(sig.schema.as_deref(), Some("dbo"));
        assert_eq!(sig.qualified_name(), "dbo.get_orders");
        assert_eq!(sig.position_of("customerid"), Some(0));
        assert_eq!(sig.position_of("@TOTAL"), Some(1));
        assert_eq!(sig.position_of("missing"), None);
    }

    #[test]
    fn test_param_constructors() {
        assert_eq!(Param::from(Value::Int(5)).direction, Direction::In);
        assert!(Param::cursor().is_cursor());
        assert_eq!(Param::output_typed("int").sql_type.as_deref(), Some("int"));
        assert_eq!(Param::inout("x").value(), &Value::Text("x".into()));
        assert!(Param::table("dbo.IdList", vec![]).is_table());
    }
}
