//! PostgreSQL adapter (sqlx).

use crate::db::connection::{
    ConnectionAdapter, Executed, NativeError, SegmentCollector, connection_suggestion, not_open,
};
use crate::db::params::bind_postgres_param;
use crate::db::types::RowDecode;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, Engine, Value};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Either, Executor};
use tracing::{info, warn};

pub struct PostgresAdapter {
    config: ConnectionConfig,
    conn: Option<PgConnection>,
    last_error: Option<NativeError>,
}

impl PostgresAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            conn: None,
            last_error: None,
        }
    }

    fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port_or_default());
        if let Some(user) = &self.config.user {
            options = options.username(user);
        }
        if let Some(password) = &self.config.password {
            options = options.password(password);
        }
        if let Some(database) = &self.config.database {
            options = options.database(database);
        }
        if let Some(charset) = &self.config.charset {
            options = options.options([("client_encoding", charset.as_str())]);
        }
        if self.config.collation.is_some() {
            warn!("Collation is fixed per database on PostgreSQL; ignoring the configured value");
        }
        options
    }
}

#[async_trait]
impl ConnectionAdapter for PostgresAdapter {
    fn engine(&self) -> Engine {
        Engine::PostgreSQL
    }

    async fn open(&mut self) -> bool {
        if self.conn.is_some() {
            return true;
        }
        info!(target_db = %self.config.describe(), "Connecting to PostgreSQL");
        match PgConnection::connect_with(&self.connect_options()).await {
            Ok(conn) => {
                info!("Connected successfully");
                self.conn = Some(conn);
                self.last_error = None;
                true
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Failed to connect");
                let err = DbError::connection(
                    message.clone(),
                    connection_suggestion(Engine::PostgreSQL, &message),
                );
                self.last_error = Some(NativeError::from(&err));
                false
            }
        }
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Error while closing PostgreSQL connection");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    async fn execute(&mut self, sql: &str, binds: &[Value]) -> DbResult<Executed> {
        let conn = self.conn.as_mut().ok_or_else(|| not_open(Engine::PostgreSQL))?;
        let result = run(conn, sql, binds).await;
        self.last_error = result.as_ref().err().map(NativeError::from);
        result
    }

    fn error(&self) -> Option<&NativeError> {
        self.last_error.as_ref()
    }
}

async fn run(conn: &mut PgConnection, sql: &str, binds: &[Value]) -> DbResult<Executed> {
    // Without binds the simple protocol runs multi-statement batches
    let mut stream = if binds.is_empty() {
        conn.fetch_many(sql)
    } else {
        let query = binds
            .iter()
            .fold(sqlx::query(sql), bind_postgres_param);
        conn.fetch_many(query)
    };

    let mut collector = SegmentCollector::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => collector.complete(done.rows_affected(), None),
            Either::Right(row) => collector.row(|| row.field_data(), row.values()),
        }
    }
    Ok(collector.finish())
}
