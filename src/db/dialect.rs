//! Per-engine SQL text rules.
//!
//! Literal and identifier quoting, pagination clauses and transaction
//! statements. Everything here is a pure function of the [`Engine`].

use crate::error::{DbError, DbResult};
use crate::models::value::is_numeric_text;
use crate::models::{Engine, Value};

impl Engine {
    /// Render a value as an inline SQL literal.
    pub fn escape(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.bool_literal(*b).to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) if v.is_finite() => v.to_string(),
            Value::Float(v) => self.quote_str(&v.to_string()),
            Value::Decimal(s) if is_numeric_text(s) => s.trim().to_string(),
            Value::Decimal(s) | Value::Text(s) => self.quote_str(s),
            Value::Bytes(b) => self.bytes_literal(b),
            Value::Json(v) => self.quote_str(&v.to_string()),
            Value::Date(d) => self.quote_str(&d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => self.quote_str(&t.format("%H:%M:%S%.f").to_string()),
            Value::DateTime(dt) => {
                self.quote_str(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
        }
    }

    pub fn bool_literal(&self, value: bool) -> &'static str {
        match (self, value) {
            (Self::PostgreSQL | Self::MySQL, true) => "TRUE",
            (Self::PostgreSQL | Self::MySQL, false) => "FALSE",
            (Self::SqlServer | Self::SQLite, true) => "1",
            (Self::SqlServer | Self::SQLite, false) => "0",
        }
    }

    /// Quote a string literal.
    pub fn quote_str(&self, s: &str) -> String {
        match self {
            Self::MySQL => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\'' => out.push_str("''"),
                        '\\' => out.push_str("\\\\"),
                        '\0' => out.push_str("\\0"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\x1a' => out.push_str("\\Z"),
                        c => out.push(c),
                    }
                }
                out.push('\'');
                out
            }
            Self::SqlServer => format!("N'{}'", s.replace('\'', "''")),
            Self::PostgreSQL | Self::SQLite => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        match self {
            Self::PostgreSQL => format!("'\\x{}'::bytea", hex),
            Self::MySQL | Self::SQLite => format!("X'{}'", hex),
            Self::SqlServer => format!("0x{}", hex),
        }
    }

    /// Quote an identifier; dotted names are quoted part by part.
    pub fn escape_identifier(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_ident_part(part.trim()))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn quote_ident_part(&self, part: &str) -> String {
        if part == "*" {
            return part.to_string();
        }
        match self {
            Self::PostgreSQL | Self::SQLite => format!("\"{}\"", part.replace('"', "\"\"")),
            Self::MySQL => format!("`{}`", part.replace('`', "``")),
            Self::SqlServer => format!("[{}]", part.replace(']', "]]")),
        }
    }

    /// Row-limiting clause for `[start_row, end_row)`.
    ///
    /// Returns an empty string when `end_row == 0`. `has_order` tells SQL
    /// Server whether an ORDER BY already precedes the clause.
    pub fn limit_clause(&self, start_row: u64, end_row: u64, has_order: bool) -> DbResult<String> {
        if end_row == 0 {
            return Ok(String::new());
        }
        if start_row > end_row {
            return Err(DbError::invalid_definition(format!(
                "Row window start {} is past end {}",
                start_row, end_row
            )));
        }
        let width = end_row - start_row;
        Ok(match self {
            Self::PostgreSQL | Self::SQLite => format!("LIMIT {} OFFSET {}", width, start_row),
            Self::MySQL => format!("LIMIT {}, {}", start_row, width),
            Self::SqlServer => {
                let order = if has_order { "" } else { "ORDER BY (SELECT NULL) " };
                format!(
                    "{}OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                    order, start_row, width
                )
            }
        })
    }

    pub fn begin_sql(&self) -> &'static str {
        match self {
            Self::PostgreSQL | Self::SQLite => "BEGIN",
            Self::MySQL => "START TRANSACTION",
            Self::SqlServer => "BEGIN TRANSACTION",
        }
    }

    pub fn commit_sql(&self) -> &'static str {
        match self {
            Self::SqlServer => "COMMIT TRANSACTION",
            _ => "COMMIT",
        }
    }

    pub fn rollback_sql(&self) -> &'static str {
        match self {
            Self::SqlServer => "ROLLBACK TRANSACTION",
            _ => "ROLLBACK",
        }
    }

    pub fn savepoint_sql(&self, name: &str) -> String {
        match self {
            Self::SqlServer => format!("SAVE TRANSACTION {}", self.escape_identifier(name)),
            _ => format!("SAVEPOINT {}", self.escape_identifier(name)),
        }
    }

    pub fn rollback_to_sql(&self, name: &str) -> String {
        match self {
            Self::SqlServer => format!("ROLLBACK TRANSACTION {}", self.escape_identifier(name)),
            _ => format!("ROLLBACK TO SAVEPOINT {}", self.escape_identifier(name)),
        }
    }

    /// SQL Server keeps savepoints until the transaction ends.
    pub fn release_sql(&self, name: &str) -> Option<String> {
        match self {
            Self::SqlServer => None,
            _ => Some(format!("RELEASE SAVEPOINT {}", self.escape_identifier(name))),
        }
    }

    /// Generic text type used for untyped OUT parameters.
    pub fn generic_text_type(&self) -> &'static str {
        match self {
            Self::SqlServer => "NVARCHAR(MAX)",
            Self::MySQL => "TEXT",
            Self::PostgreSQL | Self::SQLite => "text",
        }
    }
}

/// Escape LIKE wildcards with `!` so the value matches literally.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '!' | '%' | '_' | '[') {
            out.push('!');
        }
        out.push(c);
    }
    out
}
