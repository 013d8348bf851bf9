//! Scripted adapter for exercising sessions without a live server.
//!
//! Responses are registered against a SQL fragment. Each `execute` consumes
//! the first pending response whose fragment occurs in the statement text;
//! statements with no matching response succeed with an empty result.
//! Every statement is recorded in a [`ScriptLog`] shared with the caller.

use crate::db::connection::{ConnectionAdapter, Executed, NativeError};
use crate::db::result::{FieldData, RowCursor};
use crate::error::{DbError, DbResult};
use crate::models::{Engine, Value};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// A statement seen by a [`ScriptedAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedStatement {
    pub sql: String,
    pub binds: Vec<Value>,
}

/// Shared record of every statement sent to a [`ScriptedAdapter`].
#[derive(Debug, Clone, Default)]
pub struct ScriptLog(Arc<Mutex<Vec<LoggedStatement>>>);

impl ScriptLog {
    fn lock(&self) -> MutexGuard<'_, Vec<LoggedStatement>> {
        // A panicking test thread cannot leave the log half-written
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn statements(&self) -> Vec<LoggedStatement> {
        self.lock().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.lock().iter().map(|s| s.sql.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, sql: &str, binds: &[Value]) {
        self.lock().push(LoggedStatement {
            sql: sql.to_string(),
            binds: binds.to_vec(),
        });
    }
}

/// Build a result cursor from column names and rows.
pub fn cursor(columns: &[&str], rows: Vec<Vec<Value>>) -> RowCursor {
    let columns = columns
        .iter()
        .map(|name| FieldData::new(*name, "text"))
        .collect();
    RowCursor::new(columns, rows)
}

pub struct ScriptedAdapter {
    engine: Engine,
    open: bool,
    refuse_open: bool,
    responses: VecDeque<(String, DbResult<Executed>)>,
    log: ScriptLog,
    last_error: Option<NativeError>,
}

impl ScriptedAdapter {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            open: false,
            refuse_open: false,
            responses: VecDeque::new(),
            log: ScriptLog::default(),
            last_error: None,
        }
    }

    /// Make `open()` fail.
    pub fn refuse_open(mut self) -> Self {
        self.refuse_open = true;
        self
    }

    /// Respond to the next statement containing `fragment`.
    pub fn respond(mut self, fragment: impl Into<String>, executed: Executed) -> Self {
        self.responses.push_back((fragment.into(), Ok(executed)));
        self
    }

    /// Respond with result sets only.
    pub fn respond_sets(self, fragment: impl Into<String>, sets: Vec<RowCursor>) -> Self {
        self.respond(
            fragment,
            Executed {
                result_sets: sets,
                ..Default::default()
            },
        )
    }

    /// Respond with an affected-row count only.
    pub fn respond_affected(self, fragment: impl Into<String>, rows: u64) -> Self {
        self.respond(
            fragment,
            Executed {
                rows_affected: rows,
                ..Default::default()
            },
        )
    }

    /// Fail the next statement containing `fragment`.
    pub fn fail(mut self, fragment: impl Into<String>, error: DbError) -> Self {
        self.responses.push_back((fragment.into(), Err(error)));
        self
    }

    pub fn log(&self) -> ScriptLog {
        self.log.clone()
    }

    fn take_response(&mut self, sql: &str) -> DbResult<Executed> {
        let index = self
            .responses
            .iter()
            .position(|(fragment, _)| sql.contains(fragment.as_str()));
        match index.and_then(|i| self.responses.remove(i)) {
            Some((_, response)) => response,
            None => Ok(Executed::default()),
        }
    }
}

#[async_trait]
impl ConnectionAdapter for ScriptedAdapter {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn open(&mut self) -> bool {
        if self.refuse_open {
            let err = DbError::connection("scripted connection refused", "none");
            self.last_error = Some(NativeError::from(&err));
            return false;
        }
        self.open = true;
        true
    }

    async fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn execute(&mut self, sql: &str, binds: &[Value]) -> DbResult<Executed> {
        if !self.open {
            return Err(crate::db::connection::not_open(self.engine));
        }
        self.log.push(sql, binds);
        let result = self.take_response(sql);
        self.last_error = result.as_ref().err().map(NativeError::from);
        result
    }

    fn error(&self) -> Option<&NativeError> {
        self.last_error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_responses_match_by_fragment() {
        let mut adapter = ScriptedAdapter::new(Engine::PostgreSQL)
            .respond_sets("SELECT id", vec![cursor(&["id"], vec![vec![Value::Int(1)]])])
            .respond_affected("DELETE", 2);
        let log = adapter.log();
        assert!(adapter.open().await);

        let done = adapter.execute("DELETE FROM items", &[]).await.unwrap();
        assert_eq!(done.rows_affected, 2);

        let begin = adapter.execute("BEGIN", &[]).await.unwrap();
        assert!(begin.result_sets.is_empty());

        let select = adapter.execute("SELECT id FROM items", &[]).await.unwrap();
        assert_eq!(select.result_sets[0].len(), 1);

        // Consumed responses do not repeat
        let again = adapter.execute("SELECT id FROM items", &[]).await.unwrap();
        assert!(again.result_sets.is_empty());
        assert_eq!(log.len(), 4);
        assert_eq!(log.sql()[1], "BEGIN");
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let mut adapter = ScriptedAdapter::new(Engine::MySQL)
            .fail("CALL", DbError::server(Some("1305".into()), "PROCEDURE x does not exist"));
        adapter.open().await;
        assert!(adapter.execute("CALL x()", &[]).await.is_err());
        assert_eq!(adapter.error().and_then(|e| e.code.as_deref()), Some("1305"));
    }

    #[tokio::test]
    async fn test_refused_open() {
        let mut adapter = ScriptedAdapter::new(Engine::SqlServer).refuse_open();
        assert!(!adapter.open().await);
        assert!(adapter.error().is_some());
        assert!(adapter.execute("SELECT 1", &[]).await.is_err());
    }
}
