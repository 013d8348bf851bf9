//! SQLite adapter (sqlx). No stored routines.

use crate::db::connection::{
    ConnectionAdapter, Executed, NativeError, SegmentCollector, connection_suggestion, not_open,
};
use crate::db::params::bind_sqlite_param;
use crate::db::types::RowDecode;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, Engine, Value};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Either, Executor};
use std::str::FromStr;
use tracing::{info, warn};

pub struct SqliteAdapter {
    config: ConnectionConfig,
    conn: Option<SqliteConnection>,
    last_error: Option<NativeError>,
}

impl SqliteAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            conn: None,
            last_error: None,
        }
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let path = self.config.database.as_deref().unwrap_or(":memory:");
        if path == ":memory:" {
            return SqliteConnectOptions::from_str("sqlite::memory:").map_err(DbError::from);
        }
        Ok(SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .read_only(false))
    }
}

#[async_trait]
impl ConnectionAdapter for SqliteAdapter {
    fn engine(&self) -> Engine {
        Engine::SQLite
    }

    async fn open(&mut self) -> bool {
        if self.conn.is_some() {
            return true;
        }
        info!(target_db = %self.config.describe(), "Opening SQLite database");
        let connected = match self.connect_options() {
            Ok(options) => SqliteConnection::connect_with(&options)
                .await
                .map_err(DbError::from),
            Err(e) => Err(e),
        };
        match connected {
            Ok(conn) => {
                self.conn = Some(conn);
                self.last_error = None;
                true
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Failed to open database");
                let err = DbError::connection(
                    message.clone(),
                    connection_suggestion(Engine::SQLite, &message),
                );
                self.last_error = Some(NativeError::from(&err));
                false
            }
        }
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Error while closing SQLite connection");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    async fn execute(&mut self, sql: &str, binds: &[Value]) -> DbResult<Executed> {
        let conn = self.conn.as_mut().ok_or_else(|| not_open(Engine::SQLite))?;
        let result = run(conn, sql, binds).await;
        self.last_error = result.as_ref().err().map(NativeError::from);
        result
    }

    fn error(&self) -> Option<&NativeError> {
        self.last_error.as_ref()
    }
}

async fn run(conn: &mut SqliteConnection, sql: &str, binds: &[Value]) -> DbResult<Executed> {
    let mut stream = if binds.is_empty() {
        conn.fetch_many(sql)
    } else {
        let query = binds.iter().fold(sqlx::query(sql), bind_sqlite_param);
        conn.fetch_many(query)
    };

    let mut collector = SegmentCollector::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => {
                let id = (done.rows_affected() > 0).then(|| done.last_insert_rowid());
                collector.complete(done.rows_affected(), id);
            }
            Either::Right(row) => collector.row(|| row.field_data(), row.values()),
        }
    }
    Ok(collector.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_memory() -> SqliteAdapter {
        let mut adapter = SqliteAdapter::new(ConnectionConfig::sqlite_memory());
        assert!(adapter.open().await);
        adapter
    }

    #[tokio::test]
    async fn test_open_and_select() {
        let mut adapter = open_memory().await;
        let done = adapter.execute("SELECT 1 AS one, 'x' AS two", &[]).await.unwrap();
        let cursor = done.into_first();
        assert_eq!(cursor.len(), 1);
        assert_eq!(cursor.columns()[0].name, "one");
    }

    #[tokio::test]
    async fn test_batch_yields_one_cursor_per_statement() {
        let mut adapter = open_memory().await;
        adapter
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        let done = adapter
            .execute(
                "INSERT INTO t (name) VALUES ('a'); SELECT id, name FROM t; SELECT COUNT(*) AS n FROM t",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(done.result_sets.len(), 3);
        assert!(done.result_sets[0].is_empty());
        assert_eq!(done.result_sets[1].len(), 1);
        assert_eq!(done.result_sets[2].columns()[0].name, "n");
        assert_eq!(done.last_insert_id, Some(1));
    }

    #[tokio::test]
    async fn test_binds_and_error_tracking() {
        let mut adapter = open_memory().await;
        let done = adapter
            .execute("SELECT ? AS a, ? AS b", &[Value::Int(7), Value::Text("x".into())])
            .await
            .unwrap();
        assert_eq!(done.result_sets[0].len(), 1);

        assert!(adapter.execute("SELECT * FROM missing_table", &[]).await.is_err());
        let native = adapter.error().expect("error recorded");
        assert!(native.message.contains("missing_table"));

        adapter.execute("SELECT 1", &[]).await.unwrap();
        assert!(adapter.error().is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut adapter = open_memory().await;
        adapter.close().await;
        adapter.close().await;
        assert!(!adapter.is_open());
    }
}
