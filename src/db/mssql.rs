//! SQL Server adapter (tiberius over a tokio TCP stream).

use crate::db::connection::{
    ConnectionAdapter, Executed, NativeError, SegmentCollector, connection_suggestion, not_open,
};
use crate::db::params::bind_mssql_param;
use crate::db::result::FieldData;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, Engine, Value};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::TryStreamExt;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, QueryItem, QueryStream};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{info, warn};

type TdsClient = Client<Compat<TcpStream>>;

pub struct MssqlAdapter {
    config: ConnectionConfig,
    client: Option<TdsClient>,
    last_error: Option<NativeError>,
}

impl MssqlAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: None,
            last_error: None,
        }
    }

    fn tds_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port_or_default());
        if let Some(database) = &self.config.database {
            config.database(database);
        }
        if let Some(user) = &self.config.user {
            let password = self.config.password.as_deref().unwrap_or_default();
            config.authentication(AuthMethod::sql_server(user, password));
        }
        if self.config.trust_cert {
            config.trust_cert();
        }
        if self.config.charset.is_some() || self.config.collation.is_some() {
            warn!("SQL Server negotiates charset and collation per column; ignoring configured values");
        }
        config
    }

    async fn connect(&self) -> DbResult<TdsClient> {
        let config = self.tds_config();
        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true)?;
        Ok(Client::connect(config, tcp.compat_write()).await?)
    }

    fn record<T>(&mut self, result: &DbResult<T>) {
        self.last_error = result.as_ref().err().map(NativeError::from);
    }
}

#[async_trait]
impl ConnectionAdapter for MssqlAdapter {
    fn engine(&self) -> Engine {
        Engine::SqlServer
    }

    async fn open(&mut self) -> bool {
        if self.client.is_some() {
            return true;
        }
        info!(target_db = %self.config.describe(), "Connecting to SQL Server");
        match self.connect().await {
            Ok(client) => {
                info!("Connected successfully");
                self.client = Some(client);
                self.last_error = None;
                true
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Failed to connect");
                let err = DbError::connection(
                    message.clone(),
                    connection_suggestion(Engine::SqlServer, &message),
                );
                self.last_error = Some(NativeError::from(&err));
                false
            }
        }
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                warn!(error = %e, "Error while closing SQL Server connection");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    async fn execute(&mut self, sql: &str, binds: &[Value]) -> DbResult<Executed> {
        let client = self.client.as_mut().ok_or_else(|| not_open(Engine::SqlServer))?;
        let result = run(client, sql, binds).await;
        self.record(&result);
        result
    }

    async fn execute_write(&mut self, sql: &str, binds: &[Value]) -> DbResult<Executed> {
        let client = self.client.as_mut().ok_or_else(|| not_open(Engine::SqlServer))?;
        let result = run_counted(client, sql, binds).await;
        self.record(&result);
        result
    }

    fn error(&self) -> Option<&NativeError> {
        self.last_error.as_ref()
    }
}

async fn run(client: &mut TdsClient, sql: &str, binds: &[Value]) -> DbResult<Executed> {
    let stream = if binds.is_empty() {
        client.simple_query(sql).await?
    } else {
        let mut query = tiberius::Query::new(sql);
        for value in binds {
            bind_mssql_param(&mut query, value);
        }
        query.query(client).await?
    };
    collect(stream).await
}

/// A new result starts at every metadata token, including empty ones.
async fn collect(mut stream: QueryStream<'_>) -> DbResult<Executed> {
    let mut collector = SegmentCollector::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) => {
                let columns = meta
                    .columns()
                    .iter()
                    .map(|col| FieldData::new(col.name(), format!("{:?}", col.column_type())))
                    .collect();
                collector.begin(columns);
            }
            QueryItem::Row(row) => {
                let values = row.into_iter().map(decode_column).collect();
                collector.row(Vec::new, values);
            }
        }
    }
    Ok(collector.finish())
}

async fn run_counted(client: &mut TdsClient, sql: &str, binds: &[Value]) -> DbResult<Executed> {
    let done = if binds.is_empty() {
        client.execute(sql, &[]).await?
    } else {
        let mut query = tiberius::Query::new(sql);
        for value in binds {
            bind_mssql_param(&mut query, value);
        }
        query.execute(client).await?
    };
    let mut collector = SegmentCollector::new();
    collector.add_rows_affected(done.total());
    Ok(collector.finish())
}

fn decode_column(data: ColumnData<'static>) -> Value {
    match data {
        ColumnData::U8(v) => v.map(|v| Value::Int(i64::from(v))).unwrap_or_default(),
        ColumnData::I16(v) => v.map(|v| Value::Int(i64::from(v))).unwrap_or_default(),
        ColumnData::I32(v) => v.map(|v| Value::Int(i64::from(v))).unwrap_or_default(),
        ColumnData::I64(v) => v.map(Value::Int).unwrap_or_default(),
        ColumnData::F32(v) => v.map(|v| Value::Float(f64::from(v))).unwrap_or_default(),
        ColumnData::F64(v) => v.map(Value::Float).unwrap_or_default(),
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or_default(),
        ColumnData::String(v) => v.map(|s| Value::Text(s.into_owned())).unwrap_or_default(),
        ColumnData::Guid(v) => v.map(|g| Value::Text(g.to_string())).unwrap_or_default(),
        ColumnData::Binary(v) => v.map(|b| Value::Bytes(b.into_owned())).unwrap_or_default(),
        ColumnData::Numeric(v) => v.map(|n| Value::Decimal(n.to_string())).unwrap_or_default(),
        ColumnData::Xml(v) => v
            .map(|x| Value::Text(x.into_owned().into_string()))
            .unwrap_or_default(),
        other => decode_temporal(&other),
    }
}

fn decode_temporal(data: &ColumnData<'static>) -> Value {
    if let Ok(Some(v)) = NaiveDateTime::from_sql(data) {
        return Value::DateTime(v);
    }
    if let Ok(Some(v)) = NaiveDate::from_sql(data) {
        return Value::Date(v);
    }
    if let Ok(Some(v)) = NaiveTime::from_sql(data) {
        return Value::Time(v);
    }
    if let Ok(Some(v)) = DateTime::<FixedOffset>::from_sql(data) {
        return Value::Text(v.to_rfc3339());
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_column(ColumnData::I32(Some(7))), Value::Int(7));
        assert_eq!(decode_column(ColumnData::I32(None)), Value::Null);
        assert_eq!(decode_column(ColumnData::Bit(Some(true))), Value::Bool(true));
        assert_eq!(
            decode_column(ColumnData::String(Some(Cow::Borrowed("abc")))),
            Value::Text("abc".into())
        );
        assert_eq!(
            decode_column(ColumnData::Binary(Some(Cow::Owned(vec![1, 2])))),
            Value::Bytes(vec![1, 2])
        );
    }

    #[tokio::test]
    async fn test_execute_before_open_fails() {
        let mut adapter = MssqlAdapter::new(ConnectionConfig::new(Engine::SqlServer, "localhost"));
        assert!(adapter.execute_write("DELETE FROM t", &[]).await.is_err());
        assert!(!adapter.is_open());
    }

    #[test]
    fn test_escape_uses_engine_rules() {
        let adapter = MssqlAdapter::new(ConnectionConfig::new(Engine::SqlServer, "localhost"));
        assert_eq!(adapter.escape(&Value::Text("x".into())), "N'x'");
        assert_eq!(adapter.escape_identifier("dbo.t"), "[dbo].[t]");
    }
}
