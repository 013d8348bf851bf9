//! Entity operations over one [`Database`] session.

use super::builder::SqlBuilder;
use crate::db::{Database, ResultSet};
use crate::error::{DbError, DbResult};
use crate::models::{Constraint, Entity, Value};
use tracing::{debug, warn};

/// Which accessor operation produced a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Add,
    Read,
    Update,
    Delete,
    DeleteFull,
    Fetch,
    FetchFull,
    Count,
}

/// Application hook for named suboperations.
///
/// When an operation is called with a suboperation name, the generated SQL
/// is offered to [`SqlHooks::rewrite`] before it is sent.
pub trait SqlHooks: Send + Sync {
    /// Replacement SQL, or `None` to keep the generated statement.
    fn rewrite(&self, kind: StatementKind, suboperation: &str, sql: &str) -> Option<String>;
}

/// Runs entity add/read/update/delete/fetch against one session.
pub struct Accessor {
    db: Database,
    builder: SqlBuilder,
    hooks: Option<Box<dyn SqlHooks>>,
}

impl Accessor {
    pub fn new(db: Database) -> Self {
        let builder = SqlBuilder::new(db.engine());
        Self {
            db,
            builder,
            hooks: None,
        }
    }

    pub fn with_hooks(mut self, hooks: impl SqlHooks + 'static) -> Self {
        self.hooks = Some(Box::new(hooks));
        self
    }

    pub fn builder(&self) -> &SqlBuilder {
        &self.builder
    }

    pub fn database(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn into_database(self) -> Database {
        self.db
    }

    /// Insert the entity, then load engine-generated values back into it.
    pub async fn add(&mut self, entity: &mut Entity, suboperation: Option<&str>) -> DbResult<()> {
        let insert = self.builder.insert_sql(entity)?;
        let sql = self.rewrite(StatementKind::Add, suboperation, insert.sql);
        let executed = self.db.execute(&sql, &[]).await?;

        if let Some(id_field) = &insert.returned_id {
            let returned = executed
                .result_sets
                .first()
                .and_then(|cursor| cursor.get(0))
                .and_then(|row| row.first())
                .cloned()
                .or_else(|| executed.last_insert_id.map(Value::Int));
            match returned {
                Some(id) => entity.load(id_field, id),
                None => warn!(table = %entity.table(), "Insert returned no identity value"),
            }
        }
        debug!(table = %entity.table(), rows = executed.rows_affected, "Entity added");

        if entity.has_generated_fields() {
            self.reload(entity).await?;
        }
        Ok(())
    }

    /// Load the entity by key; an inactive row is reported as such.
    pub async fn read(&mut self, entity: &mut Entity) -> DbResult<()> {
        self.reload(entity).await?;
        if let Some(active) = entity.active_field() {
            if entity.get(active).and_then(Value::as_bool) == Some(false) {
                return Err(DbError::record_inactive(entity.table()));
            }
        }
        Ok(())
    }

    /// Update by key and rowversion, then re-read the entity.
    pub async fn update(&mut self, entity: &mut Entity) -> DbResult<()> {
        let sql = self.builder.update_sql(entity)?;
        let sql = self.rewrite(StatementKind::Update, None, sql);
        let affected = self.db.execute_write(&sql, &[]).await?;
        if affected == 0 {
            return Err(self.missing_or_modified(entity).await?);
        }
        debug!(table = %entity.table(), rows = affected, "Entity updated");
        self.reload(entity).await
    }

    /// Delete by key and rowversion.
    pub async fn delete(&mut self, entity: &Entity) -> DbResult<()> {
        let sql = self.builder.delete_sql(entity)?;
        let sql = self.rewrite(StatementKind::Delete, None, sql);
        let affected = self.db.execute_write(&sql, &[]).await?;
        if affected == 0 {
            return Err(self.missing_or_modified(entity).await?);
        }
        debug!(table = %entity.table(), rows = affected, "Entity deleted");
        Ok(())
    }

    /// Delete every row matching `constraint`; returns the number removed.
    pub async fn delete_full(&mut self, entity: &Entity, constraint: &Constraint) -> DbResult<u64> {
        let sql = self.builder.delete_full_sql(entity, constraint)?;
        let sql = self.rewrite(StatementKind::DeleteFull, None, sql);
        let affected = self.db.execute_write(&sql, &[]).await?;
        debug!(table = %entity.table(), rows = affected, "Rows deleted by constraint");
        Ok(affected)
    }

    pub async fn fetch(
        &mut self,
        entity: &Entity,
        constraint: &Constraint,
        suboperation: Option<&str>,
    ) -> DbResult<ResultSet> {
        let sql = self.builder.build_fetch_sql(entity, constraint)?;
        let sql = self.rewrite(StatementKind::Fetch, suboperation, sql);
        self.db.query(&sql, &[]).await
    }

    /// Joined fetch; `refs` supplies one entity per joined table.
    pub async fn fetch_full(
        &mut self,
        entity: &Entity,
        refs: &[&Entity],
        constraint: &Constraint,
        suboperation: Option<&str>,
    ) -> DbResult<ResultSet> {
        let sql = self.builder.build_fetch_full_sql(entity, refs, constraint)?;
        let sql = self.rewrite(StatementKind::FetchFull, suboperation, sql);
        self.db.query(&sql, &[]).await
    }

    /// Number of rows a fetch with `constraint` would return without its window.
    pub async fn count(&mut self, entity: &Entity, constraint: &Constraint) -> DbResult<u64> {
        let sql = self.builder.count_sql(entity, constraint)?;
        let sql = self.rewrite(StatementKind::Count, None, sql);
        let mut set = self.db.query(&sql, &[]).await?;
        let total = set
            .row_array(0)
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Read by key without the active check.
    async fn reload(&mut self, entity: &mut Entity) -> DbResult<()> {
        let sql = self.builder.read_sql(entity)?;
        let sql = self.rewrite(StatementKind::Read, None, sql);
        let mut set = self.db.query(&sql, &[]).await?;
        let row = set
            .row_object(0)
            .cloned()
            .ok_or_else(|| DbError::record_not_found(entity.table()))?;
        entity.load_row(&row);
        Ok(())
    }

    /// Tell a stale rowversion apart from a missing row after zero rows changed.
    async fn missing_or_modified(&mut self, entity: &Entity) -> DbResult<DbError> {
        if entity.rowversion_field().is_none() {
            return Ok(DbError::record_not_found(entity.table()));
        }
        let sql = self.builder.exists_sql(entity)?;
        let mut probe = self.db.query(&sql, &[]).await?;
        if probe.num_rows() > 0 {
            warn!(table = %entity.table(), "Row changed since it was read");
            Ok(DbError::record_modified(entity.table()))
        } else {
            Ok(DbError::record_not_found(entity.table()))
        }
    }

    fn rewrite(&self, kind: StatementKind, suboperation: Option<&str>, sql: String) -> String {
        let (Some(hooks), Some(name)) = (&self.hooks, suboperation) else {
            return sql;
        };
        match hooks.rewrite(kind, name, &sql) {
            Some(replacement) => {
                debug!(?kind, suboperation = name, "Statement replaced by hook");
                replacement
            }
            None => sql,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ScriptedAdapter;
    use crate::db::scripted::cursor;
    use crate::error::OperationStatus;
    use crate::models::{Engine, FieldType, SessionOptions};

    fn invoice() -> Entity {
        Entity::builder("invoice")
            .key("number")
            .field("number", FieldType::Integer)
            .field("description", FieldType::Text)
            .rowversion("version")
            .build()
            .unwrap()
    }

    async fn accessor(adapter: ScriptedAdapter) -> Accessor {
        let db = Database::open(Box::new(adapter), SessionOptions::default())
            .await
            .ok()
            .unwrap();
        Accessor::new(db)
    }

    #[tokio::test]
    async fn test_update_reports_modified_when_key_exists() {
        let adapter = ScriptedAdapter::new(Engine::PostgreSQL)
            .respond_affected("UPDATE", 0)
            .respond_sets("SELECT 1 AS found", vec![cursor(&["found"], vec![vec![Value::Int(1)]])]);
        let log = adapter.log();
        let mut accessor = accessor(adapter).await;

        let mut entity = invoice();
        entity.set("number", 100).unwrap();
        entity.set("description", "X").unwrap();
        entity.load("version", Value::Int(1));

        let result = accessor.update(&mut entity).await;
        assert_eq!(OperationStatus::of(&result), OperationStatus::RecordModified);
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_reports_not_found_when_key_missing() {
        let adapter = ScriptedAdapter::new(Engine::MySQL).respond_affected("DELETE", 0);
        let mut accessor = accessor(adapter).await;

        let mut entity = invoice();
        entity.set("number", 7).unwrap();
        let result = accessor.delete(&entity).await;
        assert_eq!(OperationStatus::of(&result), OperationStatus::RecordNotFound);
    }

    #[tokio::test]
    async fn test_add_loads_identity_and_rereads() {
        let entity_def = || {
            Entity::builder("orders")
                .key("id")
                .id_field("id")
                .field("id", FieldType::Integer)
                .field("customer", FieldType::Text)
                .read_only("created_at", FieldType::Timestamp)
                .build()
                .unwrap()
        };
        let adapter = ScriptedAdapter::new(Engine::PostgreSQL)
            .respond_sets("INSERT", vec![cursor(&["id"], vec![vec![Value::Int(42)]])])
            .respond_sets(
                "SELECT",
                vec![cursor(
                    &["id", "customer", "created_at"],
                    vec![vec![
                        Value::Int(42),
                        Value::from("ACME"),
                        Value::from("2026-01-01 10:00:00"),
                    ]],
                )],
            );
        let log = adapter.log();
        let mut accessor = accessor(adapter).await;

        let mut entity = entity_def();
        entity.set("customer", "ACME").unwrap();
        accessor.add(&mut entity, None).await.unwrap();

        assert_eq!(entity.get("id"), Some(&Value::Int(42)));
        assert_eq!(entity.get("created_at"), Some(&Value::from("2026-01-01 10:00:00")));
        let sql = log.sql();
        assert!(sql[0].ends_with(r#"RETURNING "id""#));
        assert!(sql[1].ends_with(r#"WHERE "id" = 42"#));
    }

    #[tokio::test]
    async fn test_read_inactive_row() {
        let adapter = ScriptedAdapter::new(Engine::SQLite).respond_sets(
            "SELECT",
            vec![cursor(
                &["code", "enabled"],
                vec![vec![Value::from("A1"), Value::Int(0)]],
            )],
        );
        let mut accessor = accessor(adapter).await;
        let mut entity = Entity::builder("products")
            .key("code")
            .field("code", FieldType::Text)
            .field("enabled", FieldType::Active)
            .build()
            .unwrap();
        entity.set("code", "A1").unwrap();

        let result = accessor.read(&mut entity).await;
        assert_eq!(OperationStatus::of(&result), OperationStatus::RecordInactive);
    }

    struct Archived;

    impl SqlHooks for Archived {
        fn rewrite(&self, kind: StatementKind, suboperation: &str, sql: &str) -> Option<String> {
            (kind == StatementKind::Fetch && suboperation == "archived")
                .then(|| sql.replace("\"invoice\"", "\"invoice_archive\""))
        }
    }

    #[tokio::test]
    async fn test_hook_rewrites_named_suboperation() {
        let adapter = ScriptedAdapter::new(Engine::PostgreSQL);
        let log = adapter.log();
        let mut accessor = accessor(adapter).await.with_hooks(Archived);
        let entity = invoice();

        accessor
            .fetch(&entity, &Constraint::new(), Some("archived"))
            .await
            .unwrap();
        accessor.fetch(&entity, &Constraint::new(), None).await.unwrap();

        let sql = log.sql();
        assert!(sql[0].contains(r#"FROM "invoice_archive""#));
        assert!(sql[1].contains(r#"FROM "invoice""#));
    }
}
