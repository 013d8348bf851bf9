//! Declarative filtering, ordering, projection, pagination and joins.
//!
//! A [`Constraint`] never holds SQL text; the persistence builder turns it into
//! engine SQL together with an [`Entity`].

use crate::error::{DbError, DbResult};
use crate::models::{Entity, Operation, Value};
use std::str::FromStr;

/// Plain comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// Where the `%` wildcards go around a LIKE value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wildcard {
    /// `%value%`
    Contains,
    /// `%value`, written `(%-)`
    EndsWith,
    /// `value%`, written `(-%)`
    StartsWith,
}

impl Wildcard {
    pub fn apply(self, escaped: &str) -> String {
        match self {
            Self::Contains => format!("%{}%", escaped),
            Self::EndsWith => format!("%{}", escaped),
            Self::StartsWith => format!("{}%", escaped),
        }
    }
}

/// A where-field operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Compare(Comparison),
    Like {
        wildcard: Wildcard,
        case_insensitive: bool,
        negated: bool,
    },
}

impl Default for Operator {
    fn default() -> Self {
        Self::Compare(Comparison::Eq)
    }
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = s.trim().to_lowercase();
        let compare = match op.as_str() {
            "" | "=" => Some(Comparison::Eq),
            "!=" | "<>" => Some(Comparison::Ne),
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Ge),
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Le),
            _ => None,
        };
        if let Some(c) = compare {
            return Ok(Self::Compare(c));
        }

        let invalid = || DbError::invalid_definition(format!("Unknown operator '{}'", s));

        let (base, wildcard) = if let Some(base) = op.strip_suffix("(%-)") {
            (base, Wildcard::EndsWith)
        } else if let Some(base) = op.strip_suffix("(-%)") {
            (base, Wildcard::StartsWith)
        } else {
            (op.as_str(), Wildcard::Contains)
        };

        let (negated, rest) = match base.strip_prefix('n') {
            Some(rest) => (true, rest),
            None => (false, base),
        };
        let case_insensitive = match rest {
            "like" => false,
            "ilike" => true,
            _ => return Err(invalid()),
        };

        Ok(Self::Like {
            wildcard,
            case_insensitive,
            negated,
        })
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compare(Comparison::Ne) => write!(f, "!="),
            Self::Compare(c) => write!(f, "{}", c.as_sql()),
            Self::Like {
                wildcard,
                case_insensitive,
                negated,
            } => {
                let suffix = match wildcard {
                    Wildcard::Contains => "",
                    Wildcard::EndsWith => "(%-)",
                    Wildcard::StartsWith => "(-%)",
                };
                write!(
                    f,
                    "{}{}like{}",
                    if *negated { "n" } else { "" },
                    if *case_insensitive { "i" } else { "" },
                    suffix
                )
            }
        }
    }
}

/// One filter entry.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereField {
    /// Field name; `table.field` addresses a joined entity
    pub field: String,
    pub operator: Operator,
    /// Literal to compare with; `None` takes the entity's current value
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

/// A validated join between two entities.
///
/// Construction checks every mapped and projected field, so an invalid join
/// can never reach SQL generation.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEntry {
    left_table: String,
    right_table: String,
    mapping: Vec<(String, String)>,
    projection: Vec<String>,
    join_type: JoinType,
    right_fields: Vec<String>,
}

impl JoinEntry {
    pub fn new(
        left: &Entity,
        right: &Entity,
        mapping: &[(&str, &str)],
        projection: &[&str],
        join_type: JoinType,
    ) -> DbResult<Self> {
        if mapping.is_empty() {
            return Err(DbError::invalid_definition(format!(
                "Join {} -> {} has no field mapping",
                left.table(),
                right.table()
            )));
        }

        for (lf, rf) in mapping {
            if !left.has_field(lf) {
                return Err(DbError::invalid_definition(format!(
                    "Join field '{}' is not defined on '{}'",
                    lf,
                    left.table()
                )));
            }
            if !right.has_field(rf) {
                return Err(DbError::invalid_definition(format!(
                    "Join field '{}' is not defined on '{}'",
                    rf,
                    right.table()
                )));
            }
        }

        for field in projection {
            if !left.has_field(field) {
                return Err(DbError::invalid_definition(format!(
                    "Projected field '{}' is not defined on '{}'",
                    field,
                    left.table()
                )));
            }
        }

        Ok(Self {
            left_table: left.table().to_string(),
            right_table: right.table().to_string(),
            mapping: mapping
                .iter()
                .map(|(l, r)| (l.to_string(), r.to_string()))
                .collect(),
            projection: projection.iter().map(|f| f.to_string()).collect(),
            join_type,
            right_fields: right.fields().map(|f| f.name.clone()).collect(),
        })
    }

    pub fn left_table(&self) -> &str {
        &self.left_table
    }

    pub fn right_table(&self) -> &str {
        &self.right_table
    }

    pub fn mapping(&self) -> &[(String, String)] {
        &self.mapping
    }

    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn has_right_field(&self, name: &str) -> bool {
        self.right_fields.iter().any(|f| f == name)
    }
}

/// Filter, ordering, projection, pagination window and joins for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraint {
    /// First row of the window (zero based)
    pub start_row: u64,
    /// End of the window, exclusive; zero means unbounded
    pub end_row: u64,
    pub where_fields: Vec<WhereField>,
    pub order_by: Vec<OrderBy>,
    pub select_fields: Vec<String>,
    pub joins: Vec<JoinEntry>,
}

impl Constraint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter `field = <entity value>`.
    pub fn filter(self, field: &str) -> Self {
        self.where_op(field, Operator::default(), None)
    }

    /// Filter `field = value`.
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.where_op(field, Operator::default(), Some(value.into()))
    }

    pub fn where_op(mut self, field: &str, operator: Operator, value: Option<Value>) -> Self {
        self.where_fields.push(WhereField {
            field: field.to_string(),
            operator,
            value,
        });
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by.push(OrderBy {
            field: field.to_string(),
            direction: SortDirection::Asc,
        });
        self
    }

    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.order_by.push(OrderBy {
            field: field.to_string(),
            direction: SortDirection::Desc,
        });
        self
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select_fields
            .extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Row window `[start_row, end_row)`; `end_row == 0` removes the limit.
    pub fn window(mut self, start_row: u64, end_row: u64) -> Self {
        self.start_row = start_row;
        self.end_row = end_row;
        self
    }

    pub fn join(mut self, join: JoinEntry) -> Self {
        self.joins.push(join);
        self
    }

    /// Number of rows in the window, `None` when unbounded.
    pub fn window_width(&self) -> Option<u64> {
        (self.end_row != 0).then(|| self.end_row.saturating_sub(self.start_row))
    }

    /// Check every referenced name against `entity` and the joins.
    pub fn validate(&self, entity: &Entity) -> DbResult<()> {
        if self.end_row != 0 && self.start_row > self.end_row {
            return Err(DbError::invalid_definition(format!(
                "Row window start {} is past end {}",
                self.start_row, self.end_row
            )));
        }

        for join in &self.joins {
            if join.left_table() != entity.table() {
                return Err(DbError::invalid_definition(format!(
                    "Join starts at '{}' but the entity is '{}'",
                    join.left_table(),
                    entity.table()
                )));
            }
        }

        for w in &self.where_fields {
            self.check_reference(entity, &w.field, "Filter")?;
        }
        for o in &self.order_by {
            self.check_reference(entity, &o.field, "Order")?;
        }
        for s in &self.select_fields {
            self.check_reference(entity, s, "Selected")?;
            if !s.contains('.') {
                let fetchable = entity
                    .field(s)
                    .is_some_and(|f| f.allows(Operation::Fetch) || f.allows(Operation::Read));
                if !fetchable {
                    return Err(DbError::invalid_definition(format!(
                        "Selected field '{}' is not fetchable on '{}'",
                        s,
                        entity.table()
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_reference(&self, entity: &Entity, name: &str, what: &str) -> DbResult<()> {
        let known = match name.rsplit_once('.') {
            Some((table, field)) if table == entity.table() => entity.has_field(field),
            Some((table, field)) => self
                .joins
                .iter()
                .any(|j| j.right_table() == table && j.has_right_field(field)),
            None => entity.has_field(name),
        };
        if known {
            Ok(())
        } else {
            Err(DbError::invalid_definition(format!(
                "{} field '{}' is not defined on '{}'",
                what,
                name,
                entity.table()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldType;

    fn invoice() -> Entity {
        Entity::builder("invoice")
            .key("numero")
            .field("numero", FieldType::Integer)
            .field("cliente", FieldType::Text)
            .build()
            .unwrap()
    }

    fn items() -> Entity {
        Entity::builder("invoice_items")
            .key("item_id")
            .field("item_id", FieldType::Integer)
            .field("factura_nro", FieldType::Integer)
            .field("producto", FieldType::Text)
            .field("cantidad", FieldType::Integer)
            .build()
            .unwrap()
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!("".parse::<Operator>().unwrap(), Operator::Compare(Comparison::Eq));
        assert_eq!("!=".parse::<Operator>().unwrap(), Operator::Compare(Comparison::Ne));
        assert_eq!(
            "nilike(-%)".parse::<Operator>().unwrap(),
            Operator::Like {
                wildcard: Wildcard::StartsWith,
                case_insensitive: true,
                negated: true
            }
        );
        assert_eq!(
            "like(%-)".parse::<Operator>().unwrap(),
            Operator::Like {
                wildcard: Wildcard::EndsWith,
                case_insensitive: false,
                negated: false
            }
        );
        assert!("between".parse::<Operator>().is_err());
        assert!("nxlike".parse::<Operator>().is_err());
    }

    #[test]
    fn test_operator_display_parses_back() {
        for op in [
            "=", "!=", ">", ">=", "<", "<=", "like", "ilike", "like(%-)", "like(-%)",
            "ilike(%-)", "ilike(-%)", "nlike", "nilike", "nlike(%-)", "nlike(-%)",
            "nilike(%-)", "nilike(-%)",
        ] {
            let parsed: Operator = op.parse().unwrap();
            assert_eq!(parsed.to_string(), op);
        }
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(Wildcard::Contains.apply("ab"), "%ab%");
        assert_eq!(Wildcard::EndsWith.apply("ab"), "%ab");
        assert_eq!(Wildcard::StartsWith.apply("ab"), "ab%");
    }

    #[test]
    fn test_join_rejects_unknown_mapping() {
        let err = JoinEntry::new(
            &items(),
            &invoice(),
            &[("factura_nro", "missing")],
            &[],
            JoinType::Inner,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing"));

        assert!(JoinEntry::new(
            &items(),
            &invoice(),
            &[("factura_nro", "numero")],
            &["nope"],
            JoinType::Inner,
        )
        .is_err());
    }

    #[test]
    fn test_validate_window() {
        let c = Constraint::new().window(10, 5);
        assert!(c.validate(&invoice()).is_err());
        let c = Constraint::new().window(10, 0);
        assert!(c.validate(&invoice()).is_ok());
        assert_eq!(c.window_width(), None);
        assert_eq!(Constraint::new().window(5, 15).window_width(), Some(10));
    }

    #[test]
    fn test_validate_references() {
        let join = JoinEntry::new(
            &items(),
            &invoice(),
            &[("factura_nro", "numero")],
            &["item_id"],
            JoinType::Inner,
        )
        .unwrap();
        let c = Constraint::new()
            .join(join)
            .where_eq("factura_nro", 200)
            .select(&["invoice.cliente"]);
        assert!(c.validate(&items()).is_ok());

        let bad = c.clone().where_eq("invoice.total", 1);
        assert!(bad.validate(&items()).is_err());
        assert!(Constraint::new().order_by("nope").validate(&invoice()).is_err());
    }
}
