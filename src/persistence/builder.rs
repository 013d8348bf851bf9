//! Deterministic SQL text for entity operations.
//!
//! Every statement is a pure function of the engine, the entity's
//! definition and current values, and the [`Constraint`]. Values are
//! rendered as escaped inline literals so the same input always yields the
//! same text.

use crate::db::escape_like;
use crate::error::{DbError, DbResult};
use crate::models::value::is_numeric_text;
use crate::models::{
    Comparison, Constraint, Engine, Entity, FieldDef, FieldType, Operation, Operator,
    SortDirection, Value, WhereField,
};

/// Column list and statement for an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSql {
    pub sql: String,
    /// Identity field whose value comes back from the engine
    pub returned_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectMode {
    Rows,
    Count,
}

/// Builds entity statements for one engine.
#[derive(Debug, Clone, Copy)]
pub struct SqlBuilder {
    engine: Engine,
}

impl SqlBuilder {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// `SELECT` for a fetch, joins included.
    ///
    /// Qualified filters on a joined table need a literal value; use
    /// [`SqlBuilder::build_fetch_full_sql`] to take them from a related entity.
    pub fn build_fetch_sql(&self, entity: &Entity, constraint: &Constraint) -> DbResult<String> {
        self.select_sql(entity, &[], constraint, SelectMode::Rows)
    }

    /// `SELECT` for a joined fetch where every joined table has a related entity.
    pub fn build_fetch_full_sql(
        &self,
        entity: &Entity,
        refs: &[&Entity],
        constraint: &Constraint,
    ) -> DbResult<String> {
        for join in &constraint.joins {
            if !refs.iter().any(|r| r.table() == join.right_table()) {
                return Err(DbError::invalid_definition(format!(
                    "No related entity supplied for joined table '{}'",
                    join.right_table()
                )));
            }
        }
        self.select_sql(entity, refs, constraint, SelectMode::Rows)
    }

    /// `SELECT COUNT(*) AS total` over the same filter and joins as a fetch.
    pub fn count_sql(&self, entity: &Entity, constraint: &Constraint) -> DbResult<String> {
        self.select_sql(entity, &[], constraint, SelectMode::Count)
    }

    /// `SELECT` of the readable fields by key.
    pub fn read_sql(&self, entity: &Entity) -> DbResult<String> {
        let columns: Vec<String> = entity
            .fields_with(Operation::Read)
            .map(|f| self.select_item(entity, f, false))
            .collect();
        if columns.is_empty() {
            return Err(DbError::invalid_definition(format!(
                "No readable fields on '{}'",
                entity.table()
            )));
        }
        Ok(format!(
            "SELECT {} FROM {} WHERE {}",
            columns.join(", "),
            self.ident(entity.table()),
            self.key_predicate(entity, false)?
        ))
    }

    /// Existence probe by key only, ignoring the rowversion.
    pub fn exists_sql(&self, entity: &Entity) -> DbResult<String> {
        Ok(format!(
            "SELECT 1 AS found FROM {} WHERE {}",
            self.ident(entity.table()),
            self.key_predicate(entity, false)?
        ))
    }

    /// `INSERT` of every field allowing `a`.
    ///
    /// A null identity field is left out and read back from the engine.
    pub fn insert_sql(&self, entity: &Entity) -> DbResult<InsertSql> {
        let id_field = entity
            .id_field()
            .filter(|id| entity.get(id).is_none_or(Value::is_null));

        let mut columns = Vec::new();
        let mut values = Vec::new();
        for field in entity.fields_with(Operation::Add) {
            if Some(field.name.as_str()) == id_field {
                continue;
            }
            columns.push(self.ident(&field.name));
            values.push(self.field_literal(field));
        }

        let table = self.ident(entity.table());
        let returning = id_field.map(|id| self.ident(id));
        let sql = match self.engine {
            Engine::SqlServer => {
                let output = returning
                    .as_ref()
                    .map(|id| format!(" OUTPUT INSERTED.{}", id))
                    .unwrap_or_default();
                if columns.is_empty() {
                    format!("INSERT INTO {}{} DEFAULT VALUES", table, output)
                } else {
                    format!(
                        "INSERT INTO {} ({}){} VALUES ({})",
                        table,
                        columns.join(", "),
                        output,
                        values.join(", ")
                    )
                }
            }
            Engine::PostgreSQL | Engine::SQLite => {
                let mut sql = if columns.is_empty() {
                    format!("INSERT INTO {} DEFAULT VALUES", table)
                } else {
                    format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        table,
                        columns.join(", "),
                        values.join(", ")
                    )
                };
                if let Some(id) = &returning {
                    sql.push_str(" RETURNING ");
                    sql.push_str(id);
                }
                sql
            }
            Engine::MySQL => format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                values.join(", ")
            ),
        };

        Ok(InsertSql {
            sql,
            returned_id: id_field.map(str::to_string),
        })
    }

    /// `UPDATE` of every non-key field allowing `u`, guarded by key and rowversion.
    pub fn update_sql(&self, entity: &Entity) -> DbResult<String> {
        let assignments: Vec<String> = entity
            .fields_with(Operation::Update)
            .filter(|f| !entity.key_fields().contains(&f.name))
            .filter(|f| Some(f.name.as_str()) != entity.id_field())
            .map(|f| format!("{} = {}", self.ident(&f.name), self.field_literal(f)))
            .collect();
        if assignments.is_empty() {
            return Err(DbError::invalid_definition(format!(
                "No updatable fields on '{}'",
                entity.table()
            )));
        }
        Ok(format!(
            "UPDATE {} SET {} WHERE {}",
            self.ident(entity.table()),
            assignments.join(", "),
            self.key_predicate(entity, true)?
        ))
    }

    /// `DELETE` by key, guarded by the rowversion.
    pub fn delete_sql(&self, entity: &Entity) -> DbResult<String> {
        Ok(format!(
            "DELETE FROM {} WHERE {}",
            self.ident(entity.table()),
            self.key_predicate(entity, true)?
        ))
    }

    /// `DELETE` by an arbitrary filter; at least one filter is required.
    pub fn delete_full_sql(&self, entity: &Entity, constraint: &Constraint) -> DbResult<String> {
        constraint.validate(entity)?;
        if !constraint.joins.is_empty() {
            return Err(DbError::invalid_definition(format!(
                "Joins are not allowed when deleting from '{}'",
                entity.table()
            )));
        }
        if constraint.where_fields.is_empty() {
            return Err(DbError::invalid_definition(format!(
                "Refusing to delete from '{}' without a filter",
                entity.table()
            )));
        }
        Ok(format!(
            "DELETE FROM {}{}",
            self.ident(entity.table()),
            self.where_clause(entity, &[], &constraint.where_fields, false)?
        ))
    }

    fn select_sql(
        &self,
        entity: &Entity,
        refs: &[&Entity],
        constraint: &Constraint,
        mode: SelectMode,
    ) -> DbResult<String> {
        constraint.validate(entity)?;
        let joined = !constraint.joins.is_empty();

        let mut sql = String::from("SELECT ");
        match mode {
            SelectMode::Count => sql.push_str("COUNT(*) AS total"),
            SelectMode::Rows => {
                let columns = self.select_list(entity, constraint, joined)?;
                sql.push_str(&columns.join(", "));
            }
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.ident(entity.table()));

        for join in &constraint.joins {
            let on: Vec<String> = join
                .mapping()
                .iter()
                .map(|(left, right)| {
                    format!(
                        "{} = {}",
                        self.qualified(join.left_table(), left),
                        self.qualified(join.right_table(), right)
                    )
                })
                .collect();
            sql.push_str(&format!(
                " {} {} ON {}",
                join.join_type().as_sql(),
                self.ident(join.right_table()),
                on.join(" AND ")
            ));
        }

        sql.push_str(&self.where_clause(entity, refs, &constraint.where_fields, joined)?);

        if mode == SelectMode::Count {
            return Ok(sql);
        }

        if !constraint.order_by.is_empty() {
            let order: Vec<String> = constraint
                .order_by
                .iter()
                .map(|o| {
                    let direction = match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{} {}", self.column(entity, &o.field, joined), direction)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        let limit = self.engine.limit_clause(
            constraint.start_row,
            constraint.end_row,
            !constraint.order_by.is_empty(),
        )?;
        if !limit.is_empty() {
            sql.push(' ');
            sql.push_str(&limit);
        }
        Ok(sql)
    }

    /// Left-side fields first, then any `table.field` names from joined tables.
    fn select_list(
        &self,
        entity: &Entity,
        constraint: &Constraint,
        joined: bool,
    ) -> DbResult<Vec<String>> {
        let mut left: Vec<&str> = Vec::new();
        let mut right: Vec<(&str, &str)> = Vec::new();

        for join in &constraint.joins {
            for name in join.projection() {
                if !left.contains(&name.as_str()) {
                    left.push(name);
                }
            }
        }
        for name in &constraint.select_fields {
            match name.rsplit_once('.') {
                Some((table, field)) if table != entity.table() => right.push((table, field)),
                Some((_, field)) => push_unique(&mut left, field),
                None => push_unique(&mut left, name),
            }
        }

        let mut columns: Vec<String> = if left.is_empty() {
            entity
                .fields_with(Operation::Fetch)
                .map(|f| self.select_item(entity, f, joined))
                .collect()
        } else {
            left.iter()
                .filter_map(|name| entity.field(name))
                .map(|f| self.select_item(entity, f, joined))
                .collect()
        };

        let left_names: Vec<&str> = if left.is_empty() {
            entity
                .fields_with(Operation::Fetch)
                .map(|f| f.name.as_str())
                .collect()
        } else {
            left.clone()
        };
        for (table, field) in right {
            let column = self.qualified(table, field);
            // Keep joined columns from shadowing left-side names in the row
            if left_names.contains(&field) {
                columns.push(format!(
                    "{} AS {}",
                    column,
                    self.ident_part(&format!("{}_{}", table.replace('.', "_"), field))
                ));
            } else {
                columns.push(column);
            }
        }

        if columns.is_empty() {
            return Err(DbError::invalid_definition(format!(
                "No fetchable fields on '{}'",
                entity.table()
            )));
        }
        Ok(columns)
    }

    /// `nostring` fields hold numeric text written without quotes.
    fn field_literal(&self, field: &FieldDef) -> String {
        match &field.value {
            Value::Text(s) if field.field_type == FieldType::NoString && is_numeric_text(s) => {
                s.trim().to_string()
            }
            value => self.engine.escape(value),
        }
    }

    fn select_item(&self, entity: &Entity, field: &FieldDef, qualify: bool) -> String {
        match &field.expression {
            Some(expression) => format!("{} AS {}", expression, self.ident_part(&field.name)),
            None if qualify => self.qualified(entity.table(), &field.name),
            None => self.ident(&field.name),
        }
    }

    fn where_clause(
        &self,
        entity: &Entity,
        refs: &[&Entity],
        where_fields: &[WhereField],
        joined: bool,
    ) -> DbResult<String> {
        if where_fields.is_empty() {
            return Ok(String::new());
        }
        let mut predicates = Vec::with_capacity(where_fields.len());
        for w in where_fields {
            let value = resolve_value(entity, refs, w)?;
            let column = self.column(entity, &w.field, joined);
            predicates.push(self.predicate(&column, w.operator, &value));
        }
        Ok(format!(" WHERE {}", predicates.join(" AND ")))
    }

    fn predicate(&self, column: &str, operator: Operator, value: &Value) -> String {
        match operator {
            Operator::Compare(Comparison::Eq) if value.is_null() => format!("{} IS NULL", column),
            Operator::Compare(Comparison::Ne) if value.is_null() => {
                format!("{} IS NOT NULL", column)
            }
            Operator::Compare(c) => {
                format!("{} {} {}", column, c.as_sql(), self.engine.escape(value))
            }
            Operator::Like { negated, .. } if value.is_null() => {
                let not = if negated { " NOT" } else { "" };
                format!("{} IS{} NULL", column, not)
            }
            Operator::Like {
                wildcard,
                case_insensitive,
                negated,
            } => {
                let text = match value {
                    Value::Text(s) | Value::Decimal(s) => s.clone(),
                    other => other.to_string(),
                };
                let pattern = self.engine.quote_str(&wildcard.apply(&escape_like(&text)));
                let not = if negated { "NOT " } else { "" };
                match (case_insensitive, self.engine) {
                    (true, Engine::PostgreSQL) => {
                        format!("{} {}ILIKE {} ESCAPE '!'", column, not, pattern)
                    }
                    (true, _) => format!(
                        "LOWER({}) {}LIKE LOWER({}) ESCAPE '!'",
                        column, not, pattern
                    ),
                    (false, _) => format!("{} {}LIKE {} ESCAPE '!'", column, not, pattern),
                }
            }
        }
    }

    /// Key equality, plus rowversion equality when `with_rowversion` is set.
    fn key_predicate(&self, entity: &Entity, with_rowversion: bool) -> DbResult<String> {
        if entity.key_fields().is_empty() {
            return Err(DbError::invalid_definition(format!(
                "Entity '{}' has no key fields",
                entity.table()
            )));
        }
        let mut predicates = Vec::new();
        for key in entity.key_fields() {
            let value = entity.get(key).filter(|v| !v.is_null()).ok_or_else(|| {
                DbError::invalid_definition(format!(
                    "Key field '{}' on '{}' has no value",
                    key,
                    entity.table()
                ))
            })?;
            predicates.push(format!("{} = {}", self.ident(key), self.engine.escape(value)));
        }
        if with_rowversion {
            if let Some(rowversion) = entity.rowversion_field() {
                let value = entity.get(rowversion).cloned().unwrap_or_default();
                predicates.push(self.predicate(
                    &self.ident(rowversion),
                    Operator::default(),
                    &value,
                ));
            }
        }
        Ok(predicates.join(" AND "))
    }

    /// Column reference for a filter or sort name.
    fn column(&self, entity: &Entity, name: &str, qualify: bool) -> String {
        match name.rsplit_once('.') {
            Some((table, field)) => self.qualified(table, field),
            None => match entity.field(name).and_then(|f| f.expression.as_deref()) {
                Some(expression) => format!("({})", expression),
                None if qualify => self.qualified(entity.table(), name),
                None => self.ident(name),
            },
        }
    }

    fn qualified(&self, table: &str, field: &str) -> String {
        format!("{}.{}", self.ident(table), self.ident_part(field))
    }

    fn ident(&self, name: &str) -> String {
        self.engine.escape_identifier(name)
    }

    /// Quote a single name part, even when it contains a dot.
    fn ident_part(&self, name: &str) -> String {
        match self.engine {
            Engine::PostgreSQL | Engine::SQLite => format!("\"{}\"", name.replace('"', "\"\"")),
            Engine::MySQL => format!("`{}`", name.replace('`', "``")),
            Engine::SqlServer => format!("[{}]", name.replace(']', "]]")),
        }
    }
}

fn push_unique<'a>(names: &mut Vec<&'a str>, name: &'a str) {
    if !names.contains(&name) {
        names.push(name);
    }
}

/// The constraint literal, or the current value held by the owning entity.
fn resolve_value(entity: &Entity, refs: &[&Entity], w: &WhereField) -> DbResult<Value> {
    if let Some(value) = &w.value {
        return Ok(value.clone());
    }
    let value = match w.field.rsplit_once('.') {
        Some((table, field)) if table == entity.table() => entity.get(field),
        Some((table, field)) => refs
            .iter()
            .find(|r| r.table() == table)
            .and_then(|r| r.get(field)),
        None => entity.get(&w.field),
    };
    value.cloned().ok_or_else(|| {
        DbError::invalid_definition(format!("No value for filter field '{}'", w.field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JoinEntry, JoinType};

    fn invoice() -> Entity {
        Entity::builder("invoice")
            .key("number")
            .field("number", FieldType::Integer)
            .field("description", FieldType::Text)
            .build()
            .unwrap()
    }

    fn versioned() -> Entity {
        let mut e = Entity::builder("invoice")
            .key("number")
            .field("number", FieldType::Integer)
            .field("description", FieldType::Text)
            .rowversion("version")
            .build()
            .unwrap();
        e.set("number", 100).unwrap();
        e.set("description", "X").unwrap();
        e.load("version", Value::Int(3));
        e
    }

    fn items() -> Entity {
        Entity::builder("invoice_items")
            .key("item_id")
            .id_field("item_id")
            .field("item_id", FieldType::Integer)
            .field("factura_nro", FieldType::Integer)
            .field("producto", FieldType::Text)
            .field("cantidad", FieldType::Integer)
            .build()
            .unwrap()
    }

    fn header() -> Entity {
        Entity::builder("invoice")
            .key("numero")
            .field("numero", FieldType::Integer)
            .field("cliente", FieldType::Text)
            .build()
            .unwrap()
    }

    #[test]
    fn test_fetch_uses_entity_value_and_default_operator() {
        let mut entity = invoice();
        entity.set("number", 100).unwrap();
        let builder = SqlBuilder::new(Engine::PostgreSQL);
        let constraint = Constraint::new().filter("number");

        let sql = builder.build_fetch_sql(&entity, &constraint).unwrap();
        assert_eq!(
            sql,
            r#"SELECT "number", "description" FROM "invoice" WHERE "number" = 100"#
        );
        assert_eq!(sql, builder.build_fetch_sql(&entity, &constraint).unwrap());
    }

    #[test]
    fn test_fetch_pagination_per_engine() {
        let entity = invoice();
        let constraint = Constraint::new().order_by_desc("number").window(20, 30);

        let pg = SqlBuilder::new(Engine::PostgreSQL)
            .build_fetch_sql(&entity, &constraint)
            .unwrap();
        assert!(pg.ends_with(r#"ORDER BY "number" DESC LIMIT 10 OFFSET 20"#));

        let my = SqlBuilder::new(Engine::MySQL)
            .build_fetch_sql(&entity, &constraint)
            .unwrap();
        assert!(my.ends_with("ORDER BY `number` DESC LIMIT 20, 10"));

        let ms = SqlBuilder::new(Engine::SqlServer)
            .build_fetch_sql(&entity, &Constraint::new().window(0, 5))
            .unwrap();
        assert!(ms.ends_with("ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"));
    }

    #[test]
    fn test_like_operators() {
        let entity = invoice();
        let like = |op: &str, value: &str, engine: Engine| {
            let constraint = Constraint::new().where_op(
                "description",
                op.parse().unwrap(),
                Some(Value::from(value)),
            );
            SqlBuilder::new(engine)
                .build_fetch_sql(&entity, &constraint)
                .unwrap()
        };

        assert!(like("like", "10%", Engine::PostgreSQL)
            .ends_with(r#"WHERE "description" LIKE '%10!%%' ESCAPE '!'"#));
        assert!(like("nilike(-%)", "inv", Engine::PostgreSQL)
            .ends_with(r#"WHERE "description" NOT ILIKE 'inv%' ESCAPE '!'"#));
        assert!(like("ilike(%-)", "X", Engine::MySQL)
            .ends_with("WHERE LOWER(`description`) LIKE LOWER('%X') ESCAPE '!'"));
    }

    #[test]
    fn test_null_filters() {
        let entity = invoice();
        let builder = SqlBuilder::new(Engine::SQLite);
        let sql = builder
            .build_fetch_sql(&entity, &Constraint::new().filter("description"))
            .unwrap();
        assert!(sql.ends_with(r#"WHERE "description" IS NULL"#));

        let sql = builder
            .build_fetch_sql(
                &entity,
                &Constraint::new().where_op("description", "!=".parse().unwrap(), Some(Value::Null)),
            )
            .unwrap();
        assert!(sql.ends_with(r#"WHERE "description" IS NOT NULL"#));
    }

    #[test]
    fn test_invalid_constraint_fails_before_sql() {
        let entity = invoice();
        let err = SqlBuilder::new(Engine::PostgreSQL)
            .build_fetch_sql(&entity, &Constraint::new().where_eq("missing", 1))
            .unwrap_err();
        assert_eq!(err.status(), crate::error::OperationStatus::InvalidDefinition);
    }

    #[test]
    fn test_update_and_delete_guard_rowversion() {
        let entity = versioned();
        let builder = SqlBuilder::new(Engine::PostgreSQL);
        assert_eq!(
            builder.update_sql(&entity).unwrap(),
            r#"UPDATE "invoice" SET "description" = 'X' WHERE "number" = 100 AND "version" = 3"#
        );
        assert_eq!(
            builder.delete_sql(&entity).unwrap(),
            r#"DELETE FROM "invoice" WHERE "number" = 100 AND "version" = 3"#
        );
        assert_eq!(
            builder.exists_sql(&entity).unwrap(),
            r#"SELECT 1 AS found FROM "invoice" WHERE "number" = 100"#
        );
        assert_eq!(
            builder.read_sql(&entity).unwrap(),
            r#"SELECT "number", "description", "version" FROM "invoice" WHERE "number" = 100"#
        );
    }

    #[test]
    fn test_key_without_value_is_invalid() {
        let err = SqlBuilder::new(Engine::MySQL)
            .delete_sql(&invoice())
            .unwrap_err();
        assert_eq!(err.status(), crate::error::OperationStatus::InvalidDefinition);
    }

    #[test]
    fn test_insert_returns_identity_per_engine() {
        let mut entity = items();
        entity.set("factura_nro", 200).unwrap();
        entity.set("producto", "bolt").unwrap();
        entity.set("cantidad", 3).unwrap();

        let pg = SqlBuilder::new(Engine::PostgreSQL).insert_sql(&entity).unwrap();
        assert_eq!(
            pg.sql,
            r#"INSERT INTO "invoice_items" ("factura_nro", "producto", "cantidad") VALUES (200, 'bolt', 3) RETURNING "item_id""#
        );
        assert_eq!(pg.returned_id.as_deref(), Some("item_id"));

        let ms = SqlBuilder::new(Engine::SqlServer).insert_sql(&entity).unwrap();
        assert_eq!(
            ms.sql,
            "INSERT INTO [invoice_items] ([factura_nro], [producto], [cantidad]) OUTPUT INSERTED.[item_id] VALUES (200, N'bolt', 3)"
        );

        let my = SqlBuilder::new(Engine::MySQL).insert_sql(&entity).unwrap();
        assert!(!my.sql.contains("RETURNING"));
        assert_eq!(my.returned_id.as_deref(), Some("item_id"));

        entity.set("item_id", 7).unwrap();
        let explicit = SqlBuilder::new(Engine::PostgreSQL).insert_sql(&entity).unwrap();
        assert!(explicit.sql.starts_with(r#"INSERT INTO "invoice_items" ("item_id","#));
        assert_eq!(explicit.returned_id, None);
    }

    #[test]
    fn test_join_projection() {
        let left = items();
        let right = header();
        let join = JoinEntry::new(
            &left,
            &right,
            &[("factura_nro", "numero")],
            &["item_id", "producto", "cantidad"],
            JoinType::Inner,
        )
        .unwrap();
        let constraint = Constraint::new().join(join).where_eq("factura_nro", 200);

        let sql = SqlBuilder::new(Engine::PostgreSQL)
            .build_fetch_full_sql(&left, &[&right], &constraint)
            .unwrap();
        assert_eq!(
            sql,
            concat!(
                r#"SELECT "invoice_items"."item_id", "invoice_items"."producto", "invoice_items"."cantidad" "#,
                r#"FROM "invoice_items" INNER JOIN "invoice" ON "invoice_items"."factura_nro" = "invoice"."numero" "#,
                r#"WHERE "invoice_items"."factura_nro" = 200"#
            )
        );

        let missing = SqlBuilder::new(Engine::PostgreSQL)
            .build_fetch_full_sql(&left, &[], &constraint)
            .unwrap_err();
        assert_eq!(missing.status(), crate::error::OperationStatus::InvalidDefinition);
    }

    #[test]
    fn test_join_right_fields_and_ref_values() {
        let left = items();
        let mut right = header();
        right.set("cliente", "ACME").unwrap();
        let join = JoinEntry::new(&left, &right, &[("factura_nro", "numero")], &[], JoinType::Left)
            .unwrap();
        let constraint = Constraint::new()
            .join(join)
            .select(&["producto", "invoice.cliente"])
            .filter("invoice.cliente");

        let sql = SqlBuilder::new(Engine::SQLite)
            .build_fetch_full_sql(&left, &[&right], &constraint)
            .unwrap();
        assert!(sql.starts_with(r#"SELECT "invoice_items"."producto", "invoice"."cliente" FROM"#));
        assert!(sql.contains(" LEFT JOIN "));
        assert!(sql.ends_with(r#"WHERE "invoice"."cliente" = 'ACME'"#));
    }

    #[test]
    fn test_right_join() {
        let left = items();
        let right = header();
        let join = JoinEntry::new(
            &left,
            &right,
            &[("factura_nro", "numero")],
            &["producto"],
            JoinType::Right,
        )
        .unwrap();
        assert_eq!(join.join_type(), JoinType::Right);
        let constraint = Constraint::new().join(join);

        let sql = SqlBuilder::new(Engine::SqlServer)
            .build_fetch_full_sql(&left, &[&right], &constraint)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT [invoice_items].[producto] FROM [invoice_items] \
             RIGHT JOIN [invoice] ON [invoice_items].[factura_nro] = [invoice].[numero]"
        );
    }

    #[test]
    fn test_count_and_delete_full() {
        let entity = items();
        let constraint = Constraint::new().where_eq("factura_nro", 200).order_by("item_id");
        let builder = SqlBuilder::new(Engine::MySQL);
        assert_eq!(
            builder.count_sql(&entity, &constraint).unwrap(),
            "SELECT COUNT(*) AS total FROM `invoice_items` WHERE `factura_nro` = 200"
        );
        assert_eq!(
            builder.delete_full_sql(&entity, &constraint).unwrap(),
            "DELETE FROM `invoice_items` WHERE `factura_nro` = 200"
        );
        assert!(builder.delete_full_sql(&entity, &Constraint::new()).is_err());
    }

    #[test]
    fn test_nostring_written_bare() {
        let mut entity = Entity::builder("accounts")
            .key("code")
            .field("code", FieldType::NoString)
            .field("name", FieldType::Text)
            .build()
            .unwrap();
        entity.set("code", "00417").unwrap();
        entity.set("name", "00417").unwrap();
        let insert = SqlBuilder::new(Engine::SQLite).insert_sql(&entity).unwrap();
        assert_eq!(
            insert.sql,
            r#"INSERT INTO "accounts" ("code", "name") VALUES (00417, '00417')"#
        );
    }

    #[test]
    fn test_computed_expression() {
        let entity = Entity::builder("invoice_items")
            .key("item_id")
            .field("item_id", FieldType::Integer)
            .field("cantidad", FieldType::Integer)
            .computed("doble", FieldType::Integer, Some("cantidad * 2"))
            .build()
            .unwrap();
        let sql = SqlBuilder::new(Engine::PostgreSQL)
            .build_fetch_sql(&entity, &Constraint::new().where_eq("doble", 4))
            .unwrap();
        assert_eq!(
            sql,
            r#"SELECT "item_id", "cantidad", cantidad * 2 AS "doble" FROM "invoice_items" WHERE (cantidad * 2) = 4"#
        );
    }
}
