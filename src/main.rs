//! dbentity - Main entry point.
//!
//! Opens one session from a connection URL, runs a single command and prints
//! its outcome as JSON on stdout. Logs go to stderr.

use dbentity::config::{Command, Config, parse_param};
use dbentity::db::Database;
use dbentity::error::{DbError, DbResult};
use dbentity::models::{CallShape, Param};
use serde_json::{Value as JsonValue, json};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(db: &mut Database, command: &Command) -> DbResult<JsonValue> {
    match command {
        Command::Ping => Ok(json!({
            "status": "OPERATION_OK",
            "engine": db.engine().to_string(),
        })),
        Command::Sql { sql } => {
            let mut collection = db.query_all(sql, &[]).await?;
            Ok(collection.to_json())
        }
        Command::Call {
            name,
            shape,
            params,
        } => {
            let shape = CallShape::from(*shape);
            let parsed = params
                .iter()
                .map(|spec| parse_param(spec))
                .collect::<Result<Vec<_>, String>>()
                .map_err(DbError::invalid_definition)?;

            let named = parsed.iter().filter(|(n, _)| n.is_some()).count();
            let mut collection = if named == 0 {
                let positional: Vec<Param> = parsed.into_iter().map(|(_, p)| p).collect();
                db.execute_stored_procedure(name, shape, positional).await?
            } else if named == parsed.len() {
                let by_name: Vec<(String, Param)> = parsed
                    .into_iter()
                    .filter_map(|(n, p)| n.map(|n| (n, p)))
                    .collect();
                db.execute_callable(name, shape, by_name).await?
            } else {
                return Err(DbError::invalid_definition(
                    "Name every parameter or none of them",
                ));
            };
            Ok(collection.to_json())
        }
    }
}

fn error_json(e: &DbError) -> JsonValue {
    let status = e.status();
    json!({
        "status": status.name(),
        "code": status.code(),
        "message": e.to_string(),
        "native_code": e.native_code(),
        "suggestion": e.suggestion(),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    let conn_config = config.connection_config()?;
    info!(
        engine = %conn_config.engine,
        connection = %conn_config.describe(),
        "Starting dbentity v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut db = match Database::connect(conn_config).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Connection failed");
            println!("{}", serde_json::to_string_pretty(&error_json(&e))?);
            std::process::exit(e.status().code());
        }
    };

    let outcome = run(&mut db, &config.command).await;
    let closed = db.close().await;

    match outcome.and_then(|json| closed.map(|_| json)) {
        Ok(json) => {
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            println!("{}", serde_json::to_string_pretty(&error_json(&e))?);
            std::process::exit(e.status().code());
        }
    }
}
