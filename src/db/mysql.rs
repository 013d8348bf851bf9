//! MySQL / MariaDB adapter (sqlx).

use crate::db::connection::{
    ConnectionAdapter, Executed, NativeError, SegmentCollector, connection_suggestion, not_open,
};
use crate::db::params::bind_mysql_param;
use crate::db::types::RowDecode;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, Engine, Value};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Either, Executor};
use tracing::{info, warn};

const DEFAULT_CHARSET: &str = "utf8mb4";

pub struct MySqlAdapter {
    config: ConnectionConfig,
    conn: Option<MySqlConnection>,
    last_error: Option<NativeError>,
}

impl MySqlAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            conn: None,
            last_error: None,
        }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port_or_default())
            .charset(self.config.charset.as_deref().unwrap_or(DEFAULT_CHARSET));
        if let Some(collation) = &self.config.collation {
            options = options.collation(collation);
        }
        if let Some(user) = &self.config.user {
            options = options.username(user);
        }
        if let Some(password) = &self.config.password {
            options = options.password(password);
        }
        if let Some(database) = &self.config.database {
            options = options.database(database);
        }
        options
    }
}

#[async_trait]
impl ConnectionAdapter for MySqlAdapter {
    fn engine(&self) -> Engine {
        Engine::MySQL
    }

    async fn open(&mut self) -> bool {
        if self.conn.is_some() {
            return true;
        }
        info!(target_db = %self.config.describe(), "Connecting to MySQL");
        match MySqlConnection::connect_with(&self.connect_options()).await {
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
                    connection_suggestion(Engine::MySQL, &message),
                );
                self.last_error = Some(NativeError::from(&err));
                false
            }
        }
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Error while closing MySQL connection");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    async fn execute(&mut self, sql: &str, binds: &[Value]) -> DbResult<Executed> {
        let conn = self.conn.as_mut().ok_or_else(|| not_open(Engine::MySQL))?;
        let result = run(conn, sql, binds).await;
        self.last_error = result.as_ref().err().map(NativeError::from);
        result
    }

    fn error(&self) -> Option<&NativeError> {
        self.last_error.as_ref()
    }
}

/// Every OK packet closes one result, so a `CALL` yields one cursor per
/// procedure result plus a trailing status cursor.
async fn run(conn: &mut MySqlConnection, sql: &str, binds: &[Value]) -> DbResult<Executed> {
    let mut stream = if binds.is_empty() {
        conn.fetch_many(sql)
    } else {
        let query = binds.iter().fold(sqlx::query(sql), bind_mysql_param);
        conn.fetch_many(query)
    };

    let mut collector = SegmentCollector::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => {
                let id = done.last_insert_id();
                let id = (id != 0).then(|| i64::try_from(id).ok()).flatten();
                collector.complete(done.rows_affected(), id);
            }
            Either::Right(row) => collector.row(|| row.field_data(), row.values()),
        }
    }
    Ok(collector.finish())
}
