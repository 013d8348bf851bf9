//! Routine signatures from `information_schema`.
//!
//! Signatures are looked up once per session and kept in a [`RoutineCache`]
//! owned by that session.

use crate::db::result::RowCursor;
use crate::error::{DbError, DbResult};
use crate::models::{DeclaredParam, Direction, Engine, RoutineKind, RoutineSignature, Value};
use std::collections::HashMap;

/// Per-session cache of routine signatures, keyed by lower-cased name.
#[derive(Debug, Default)]
pub struct RoutineCache {
    entries: HashMap<String, RoutineSignature>,
}

impl RoutineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&RoutineSignature> {
        self.entries.get(&name.to_lowercase())
    }

    /// Cache `signature` under `requested` and its qualified name.
    pub fn insert(&mut self, requested: &str, signature: RoutineSignature) {
        let qualified = signature.qualified_name().to_lowercase();
        let requested = requested.to_lowercase();
        if requested != qualified {
            self.entries.insert(requested, signature.clone());
        }
        self.entries.insert(qualified, signature);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// SQL Server types whose declaration carries a length. `xml`, `text` and
/// friends report CHARACTER_MAXIMUM_LENGTH too but reject one.
const MSSQL_SIZED_TYPES: &str =
    "'char', 'varchar', 'nchar', 'nvarchar', 'binary', 'varbinary'";

/// Introspection query for `name` (optionally `schema.name`).
///
/// Columns, in order: schema, name, routine type, specific name, parameter
/// name, parameter mode, data type, ordinal position.
pub fn signature_query(engine: Engine, name: &str) -> DbResult<String> {
    let (schema, routine) = match name.rsplit_once('.') {
        Some((schema, routine)) => (Some(schema), routine),
        None => (None, name),
    };
    let schema_filter = |column: &str| match schema {
        Some(s) => format!(" AND {} = {}", column, engine.escape(&Value::from(s))),
        None => String::new(),
    };
    let routine = engine.escape(&Value::from(routine));

    match engine {
        Engine::PostgreSQL => Ok(format!(
            "SELECT r.routine_schema, r.routine_name, r.routine_type, r.specific_name, \
             p.parameter_name, p.parameter_mode, \
             CASE WHEN p.data_type = 'USER-DEFINED' THEN p.udt_name ELSE p.data_type END AS data_type, \
             p.ordinal_position \
             FROM information_schema.routines r \
             LEFT JOIN information_schema.parameters p \
             ON p.specific_schema = r.specific_schema AND p.specific_name = r.specific_name \
             AND p.ordinal_position > 0 \
             WHERE r.routine_name = {}{} \
             AND r.routine_schema NOT IN ('pg_catalog', 'information_schema') \
             ORDER BY r.specific_name, p.ordinal_position",
            routine,
            schema_filter("r.routine_schema")
        )),
        Engine::MySQL => {
            let schema_clause = if schema.is_some() {
                schema_filter("r.routine_schema")
            } else {
                " AND r.routine_schema = DATABASE()".to_string()
            };
            // Aliases keep column names lower-case on MySQL 8
            Ok(format!(
                "SELECT r.routine_schema AS routine_schema, r.routine_name AS routine_name, \
                 r.routine_type AS routine_type, r.specific_name AS specific_name, \
                 p.parameter_name AS parameter_name, p.parameter_mode AS parameter_mode, \
                 p.data_type AS data_type, p.ordinal_position AS ordinal_position \
                 FROM information_schema.routines r \
                 LEFT JOIN information_schema.parameters p \
                 ON p.specific_schema = r.routine_schema AND p.specific_name = r.specific_name \
                 AND p.routine_type = r.routine_type AND p.ordinal_position > 0 \
                 WHERE r.routine_name = {}{} \
                 ORDER BY r.specific_name, p.ordinal_position",
                routine, schema_clause
            ))
        }
        Engine::SqlServer => Ok(format!(
            "SELECT r.ROUTINE_SCHEMA, r.ROUTINE_NAME, r.ROUTINE_TYPE, r.SPECIFIC_NAME, \
             p.PARAMETER_NAME, p.PARAMETER_MODE, \
             p.DATA_TYPE + CASE \
             WHEN p.DATA_TYPE IN ({sized}) AND p.CHARACTER_MAXIMUM_LENGTH = -1 THEN '(MAX)' \
             WHEN p.DATA_TYPE IN ({sized}) AND p.CHARACTER_MAXIMUM_LENGTH IS NOT NULL \
             THEN '(' + CAST(p.CHARACTER_MAXIMUM_LENGTH AS VARCHAR(10)) + ')' \
             WHEN p.DATA_TYPE IN ('decimal', 'numeric') \
             THEN '(' + CAST(p.NUMERIC_PRECISION AS VARCHAR(10)) + ',' \
             + CAST(p.NUMERIC_SCALE AS VARCHAR(10)) + ')' \
             ELSE '' END AS DATA_TYPE, \
             p.ORDINAL_POSITION \
             FROM INFORMATION_SCHEMA.ROUTINES r \
             LEFT JOIN INFORMATION_SCHEMA.PARAMETERS p \
             ON p.SPECIFIC_SCHEMA = r.SPECIFIC_SCHEMA AND p.SPECIFIC_NAME = r.SPECIFIC_NAME \
             AND p.ORDINAL_POSITION > 0 \
             WHERE r.ROUTINE_NAME = {routine}{filter} \
             ORDER BY r.SPECIFIC_NAME, p.ORDINAL_POSITION",
            sized = MSSQL_SIZED_TYPES,
            routine = routine,
            filter = schema_filter("r.ROUTINE_SCHEMA")
        )),
        Engine::SQLite => Err(DbError::call_mismatch(name, "SQLite has no stored routines")),
    }
}

/// Build a signature from the rows of [`signature_query`].
///
/// Only the first specific routine is used when the name is overloaded.
pub fn parse_signature(cursor: &RowCursor) -> Option<RoutineSignature> {
    let first = cursor.get(0)?;
    let schema = text(first.first())?;
    let name = text(first.get(1))?;
    let kind = match text(first.get(2)).as_deref().map(str::to_uppercase).as_deref() {
        Some("PROCEDURE") => RoutineKind::Procedure,
        _ => RoutineKind::Function,
    };
    let specific = text(first.get(3));

    let mut params = Vec::new();
    for index in 0..cursor.len() {
        let Some(row) = cursor.get(index) else { break };
        if text(row.get(3)) != specific {
            break;
        }
        // Routines without parameters still produce one row from the outer join
        let Some(param_name) = text(row.get(4)) else {
            continue;
        };
        let direction = text(row.get(5))
            .and_then(|mode| mode.parse::<Direction>().ok())
            .unwrap_or_default();
        let data_type = text(row.get(6)).unwrap_or_default();
        let position = row
            .get(7)
            .and_then(integer)
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(0);
        params.push(DeclaredParam::new(&param_name, &data_type, direction, position));
    }

    Some(RoutineSignature::new(
        &format!("{}.{}", schema, name),
        kind,
        params,
    ))
}

/// Catalog columns may arrive as text, bytes or numbers depending on the engine.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::Text(s) | Value::Decimal(s) => Some(s.clone()),
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        other => Some(other.to_string()),
    }
}

fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_str()?.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::scripted::cursor;

    fn catalog_row(specific: &str, param: Option<(&str, &str, &str, i64)>) -> Vec<Value> {
        let mut row = vec![
            Value::from("public"),
            Value::from("invoice_report"),
            Value::from("FUNCTION"),
            Value::from(specific),
        ];
        match param {
            Some((name, mode, data_type, position)) => row.extend([
                Value::from(name),
                Value::from(mode),
                Value::from(data_type),
                Value::Int(position),
            ]),
            None => row.extend([Value::Null, Value::Null, Value::Null, Value::Null]),
        }
        row
    }

    const COLUMNS: [&str; 8] = [
        "routine_schema",
        "routine_name",
        "routine_type",
        "specific_name",
        "parameter_name",
        "parameter_mode",
        "data_type",
        "ordinal_position",
    ];

    #[test]
    fn test_parse_signature_in_order() {
        let rows = vec![
            catalog_row("invoice_report_1", Some(("year", "IN", "integer", 1))),
            catalog_row("invoice_report_1", Some(("headers", "OUT", "refcursor", 2))),
            catalog_row("invoice_report_2", Some(("other", "IN", "text", 1))),
        ];
        let sig = parse_signature(&cursor(&COLUMNS, rows)).unwrap();
        assert_eq!(sig.qualified_name(), "public.invoice_report");
        assert_eq!(sig.kind, RoutineKind::Function);
        assert_eq!(sig.params.len(), 2);
        assert_eq!(sig.params[1].direction, Direction::Out);
        assert!(sig.params[1].is_cursor());
    }

    #[test]
    fn test_parse_signature_without_params() {
        let sig = parse_signature(&cursor(&COLUMNS, vec![catalog_row("r_1", None)])).unwrap();
        assert!(sig.params.is_empty());
        assert!(parse_signature(&cursor(&COLUMNS, vec![])).is_none());
    }

    #[test]
    fn test_queries_escape_names() {
        let sql = signature_query(Engine::PostgreSQL, "sales.o'x").unwrap();
        assert!(sql.contains("r.routine_name = 'o''x'"));
        assert!(sql.contains("r.routine_schema = 'sales'"));

        let sql = signature_query(Engine::MySQL, "close_invoice").unwrap();
        assert!(sql.contains("routine_schema = DATABASE()"));

        let sql = signature_query(Engine::SqlServer, "dbo.save_order").unwrap();
        assert!(sql.contains("r.ROUTINE_NAME = N'save_order'"));
        assert!(signature_query(Engine::SQLite, "x").is_err());
    }

    #[test]
    fn test_sqlserver_length_suffix_only_for_sized_types() {
        let sql = signature_query(Engine::SqlServer, "save_order").unwrap();
        assert!(sql.contains(
            "WHEN p.DATA_TYPE IN ('char', 'varchar', 'nchar', 'nvarchar', 'binary', 'varbinary') \
             AND p.CHARACTER_MAXIMUM_LENGTH = -1 THEN '(MAX)'"
        ));
        assert!(!sql.contains("WHEN p.CHARACTER_MAXIMUM_LENGTH"));
    }

    #[test]
    fn test_cache_keys_are_case_insensitive() {
        let mut cache = RoutineCache::new();
        let sig = RoutineSignature::new("dbo.Save_Order", RoutineKind::Procedure, vec![]);
        cache.insert("save_order", sig);
        assert!(cache.get("SAVE_ORDER").is_some());
        assert!(cache.get("dbo.save_order").is_some());
        assert_eq!(cache.len(), 2);
    }
}
