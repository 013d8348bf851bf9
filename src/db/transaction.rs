//! Connection-scoped transaction state.
//!
//! One native transaction per connection. Nested `begin` calls either open an
//! automatic savepoint or, in unique-transaction mode, only count depth so the
//! whole session stays inside the outer transaction.

use crate::db::connection::ConnectionAdapter;
use crate::error::{DbError, DbResult};
use tracing::{debug, info, warn};

const AUTO_SAVEPOINT_PREFIX: &str = "dbentity_sp";

#[derive(Debug, Default)]
pub struct TransactionManager {
    depth: usize,
    dirty: bool,
    unique: bool,
    /// Automatic savepoints of nested levels, innermost last
    savepoints: Vec<String>,
}

impl TransactionManager {
    pub fn new(unique: bool) -> Self {
        Self {
            unique,
            ..Default::default()
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// `false` once a statement failed inside the current transaction.
    pub fn status(&self) -> bool {
        !self.dirty
    }

    /// Record a failed statement. No effect outside a transaction.
    pub fn mark_dirty(&mut self) {
        if self.in_transaction() {
            self.dirty = true;
        }
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub async fn begin(&mut self, conn: &mut dyn ConnectionAdapter) -> DbResult<()> {
        let engine = conn.engine();
        if self.depth == 0 {
            conn.execute(engine.begin_sql(), &[]).await?;
            self.depth = 1;
            self.dirty = false;
            info!(engine = %engine, "Transaction started");
            return Ok(());
        }
        if !self.unique {
            let name = format!("{}{}", AUTO_SAVEPOINT_PREFIX, self.depth);
            conn.execute(&engine.savepoint_sql(&name), &[]).await?;
            self.savepoints.push(name);
        }
        self.depth += 1;
        debug!(depth = self.depth, unique = self.unique, "Nested transaction level");
        Ok(())
    }

    /// Create a named rollback point inside the current transaction.
    pub async fn savepoint(
        &mut self,
        conn: &mut dyn ConnectionAdapter,
        name: &str,
    ) -> DbResult<()> {
        if !self.in_transaction() {
            return Err(DbError::transaction(format!(
                "Cannot create savepoint '{}' outside a transaction",
                name
            )));
        }
        let sql = conn.engine().savepoint_sql(name);
        conn.execute(&sql, &[]).await?;
        debug!(savepoint = %name, "Savepoint created");
        Ok(())
    }

    pub async fn commit(&mut self, conn: &mut dyn ConnectionAdapter) -> DbResult<()> {
        self.require_active("commit")?;
        let engine = conn.engine();
        if self.depth == 1 {
            let result = conn.execute(engine.commit_sql(), &[]).await;
            self.reset();
            result?;
            info!(engine = %engine, "Transaction committed");
            return Ok(());
        }
        if !self.unique {
            if let Some(name) = self.savepoints.pop() {
                if let Some(sql) = engine.release_sql(&name) {
                    conn.execute(&sql, &[]).await?;
                }
            }
        }
        self.depth -= 1;
        Ok(())
    }

    /// Roll back to `savepoint`, or the current level when `None`.
    ///
    /// Rolling back to a named savepoint keeps the transaction open and clears
    /// the dirty flag.
    pub async fn rollback(
        &mut self,
        conn: &mut dyn ConnectionAdapter,
        savepoint: Option<&str>,
    ) -> DbResult<()> {
        self.require_active("rollback")?;
        let engine = conn.engine();

        if let Some(name) = savepoint {
            conn.execute(&engine.rollback_to_sql(name), &[]).await?;
            self.dirty = false;
            debug!(savepoint = %name, "Rolled back to savepoint");
            return Ok(());
        }

        if self.depth == 1 {
            let result = conn.execute(engine.rollback_sql(), &[]).await;
            self.reset();
            result?;
            info!(engine = %engine, "Transaction rolled back");
            return Ok(());
        }

        if self.unique {
            // The outer transaction must not commit work this level abandoned
            self.dirty = true;
        } else if let Some(name) = self.savepoints.pop() {
            conn.execute(&engine.rollback_to_sql(&name), &[]).await?;
            if let Some(sql) = engine.release_sql(&name) {
                conn.execute(&sql, &[]).await?;
            }
            self.dirty = false;
        }
        self.depth -= 1;
        Ok(())
    }

    /// Commit when clean, roll back when dirty. Returns the status the level
    /// ended with.
    pub async fn complete(&mut self, conn: &mut dyn ConnectionAdapter) -> DbResult<bool> {
        if !self.in_transaction() {
            return Ok(true);
        }
        if self.dirty {
            warn!(depth = self.depth, "Rolling back transaction after a failed statement");
            self.rollback(conn, None).await?;
            Ok(false)
        } else {
            self.commit(conn).await?;
            Ok(true)
        }
    }

    fn require_active(&self, action: &str) -> DbResult<()> {
        if self.in_transaction() {
            Ok(())
        } else {
            Err(DbError::transaction(format!("Cannot {} without an active transaction", action)))
        }
    }

    fn reset(&mut self) {
        self.depth = 0;
        self.dirty = false;
        self.savepoints.clear();
    }
}
