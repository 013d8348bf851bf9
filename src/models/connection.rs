//! Connection-related data models.
//!
//! This module defines the supported engines and the per-connection settings.

use serde::{Deserialize, Serialize};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    /// Microsoft SQL Server
    SqlServer,
    SQLite,
}

impl Engine {
    /// Parse the engine from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("mssql://") || lower.starts_with("sqlserver://") {
            Some(Self::SqlServer)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this engine.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SqlServer => "SQL Server",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this engine.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SqlServer => Some(1433),
            Self::SQLite => None,
        }
    }

    /// Whether the engine exposes stored routines at all.
    pub fn supports_routines(&self) -> bool {
        !matches!(self, Self::SQLite)
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Behavior switches of one database session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Log every statement at info level on the `dbentity::calls` target.
    #[serde(default)]
    pub log_calls: bool,
    /// Run the whole session inside one implicit outer transaction; nested
    /// `trans_begin` calls become no-ops.
    #[serde(default)]
    pub unique_transaction: bool,
}

/// Configuration for a database connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub engine: Engine,
    #[serde(default)]
    pub host: String,
    /// Default: the engine's well-known port
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name; for SQLite the file path or `:memory:`
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default)]
    pub collation: Option<String>,
    /// SQL Server only: accept the server certificate without validation
    #[serde(default)]
    pub trust_cert: bool,
    #[serde(default)]
    pub options: SessionOptions,
}

impl ConnectionConfig {
    /// Create a configuration for a network engine.
    pub fn new(engine: Engine, host: impl Into<String>) -> Self {
        Self {
            engine,
            host: host.into(),
            port: None,
            database: None,
            user: None,
            password: None,
            charset: None,
            collation: None,
            trust_cert: false,
            options: SessionOptions::default(),
        }
    }

    /// Create a configuration for an in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        let mut config = Self::new(Engine::SQLite, "");
        config.database = Some(":memory:".to_string());
        config
    }

    /// Create a configuration for an on-disk SQLite database.
    pub fn sqlite_file(path: impl Into<String>) -> Self {
        let mut config = Self::new(Engine::SQLite, "");
        config.database = Some(path.into());
        config
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Effective port (explicit or the engine default).
    pub fn port_or_default(&self) -> u16 {
        self.port
            .or_else(|| self.engine.default_port())
            .unwrap_or_default()
    }

    /// Display-safe description of the target (no credentials).
    pub fn describe(&self) -> String {
        match self.engine {
            Engine::SQLite => format!(
                "sqlite:{}",
                self.database.as_deref().unwrap_or(":memory:")
            ),
            _ => format!(
                "{}@{}:{}/{}",
                self.user.as_deref().unwrap_or(""),
                self.host,
                self.port_or_default(),
                self.database.as_deref().unwrap_or("")
            ),
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("charset", &self.charset)
            .field("collation", &self.collation)
            .field("trust_cert", &self.trust_cert)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_connection_string() {
        assert_eq!(
            Engine::from_connection_string("postgres://localhost/db"),
            Some(Engine::PostgreSQL)
        );
        assert_eq!(
            Engine::from_connection_string("mariadb://localhost/db"),
            Some(Engine::MySQL)
        );
        assert_eq!(
            Engine::from_connection_string("sqlserver://localhost"),
            Some(Engine::SqlServer)
        );
        assert_eq!(
            Engine::from_connection_string("sqlite::memory:"),
            Some(Engine::SQLite)
        );
        assert_eq!(Engine::from_connection_string("oracle://x"), None);
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(Engine::SqlServer.default_port(), Some(1433));
        assert_eq!(Engine::SQLite.default_port(), None);
        let config = ConnectionConfig::new(Engine::MySQL, "db.local");
        assert_eq!(config.port_or_default(), 3306);
    }

    #[test]
    fn test_debug_masks_password() {
        let config = ConnectionConfig::new(Engine::PostgreSQL, "localhost")
            .with_credentials("app", "secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("****"));
        assert!(!config.describe().contains("secret"));
    }
}
