// Connection Configuration
// Adapter/pool settings, dialect detection and driver-specific connection string handling

use crate::db::traits::{DatabaseError, DatabaseType};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tiberius::{AuthMethod, Config, EncryptionLevel};
use url::Url;

/// Pool sizing shared by every adapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolConfig {
    pub max_size: u32,
    pub min_idle: Option<u32>,
    pub connection_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: Some(1),
            connection_timeout_secs: 30,
        }
    }
}

impl PoolConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

/// Everything needed to construct an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    /// Detected from the connection string when absent
    #[serde(default)]
    pub dialect: Option<DatabaseType>,
    #[serde(skip_serializing)] // Carries credentials
    pub connection_string: String,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl AdapterConfig {
    pub fn new(dialect: DatabaseType, connection_string: impl Into<String>) -> Self {
        Self {
            dialect: Some(dialect),
            connection_string: connection_string.into(),
            pool: PoolConfig::default(),
        }
    }

    /// Config whose dialect is detected from the connection string
    pub fn detect(connection_string: impl Into<String>) -> Self {
        Self {
            dialect: None,
            connection_string: connection_string.into(),
            pool: PoolConfig::default(),
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.connection_string.trim().is_empty() {
            return Err(DatabaseError::InvalidConfig(
                "connection string is required".to_string(),
            ));
        }
        if self.pool.max_size == 0 {
            return Err(DatabaseError::InvalidConfig(
                "pool maxSize must be at least 1".to_string(),
            ));
        }
        if let Some(min_idle) = self.pool.min_idle {
            if min_idle > self.pool.max_size {
                return Err(DatabaseError::InvalidConfig(format!(
                    "pool minIdle ({}) exceeds maxSize ({})",
                    min_idle, self.pool.max_size
                )));
            }
        }
        Ok(())
    }

    pub fn resolve_dialect(&self) -> Result<DatabaseType, DatabaseError> {
        match self.dialect {
            Some(dialect) => Ok(dialect),
            None => detect_dialect(&self.connection_string),
        }
    }

    /// Connection string with the password masked, for logs
    pub fn redacted(&self) -> String {
        redact_connection_string(&self.connection_string)
    }
}

/// Work out the dialect from a connection string's scheme
pub fn detect_dialect(connection_string: &str) -> Result<DatabaseType, DatabaseError> {
    let lowered = connection_string.trim().to_lowercase();

    if lowered.starts_with("postgres://") || lowered.starts_with("postgresql://") {
        Ok(DatabaseType::Postgresql)
    } else if lowered.starts_with("mysql://") {
        Ok(DatabaseType::Mysql)
    } else if lowered.starts_with("mssql://")
        || lowered.starts_with("sqlserver://")
        || lowered.starts_with("jdbc:sqlserver://")
        || is_ado_string(&lowered)
    {
        Ok(DatabaseType::Mssql)
    } else {
        Err(DatabaseError::DialectDetection)
    }
}

/// ADO.NET style `Server=...;Database=...` strings are SQL Server's native format
fn is_ado_string(lowered: &str) -> bool {
    !lowered.contains("://")
        && lowered
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .any(|(key, _)| matches!(key.trim(), "server" | "data source" | "address" | "addr"))
}

/// Mask the password in URL, `key=value;` or libpq `key=value key=value` connection strings
pub fn redact_connection_string(connection_string: &str) -> String {
    if let Ok(mut url) = Url::parse(connection_string) {
        if url.password().is_some() && url.set_password(Some("***")).is_ok() {
            return url.to_string();
        }
        if url.has_host() {
            return url.to_string();
        }
    }

    if connection_string.contains(';') {
        return connection_string
            .split(';')
            .map(redact_pair)
            .collect::<Vec<_>>()
            .join(";");
    }

    // libpq keyword form: pairs separated by whitespace, values may be 'single quoted'
    let mut redacted = String::with_capacity(connection_string.len());
    let mut rest = connection_string;
    while !rest.is_empty() {
        let gap = rest.len() - rest.trim_start().len();
        redacted.push_str(&rest[..gap]);
        rest = &rest[gap..];

        let mut quoted = false;
        let mut escaped = false;
        let end = rest
            .char_indices()
            .find(|&(_, ch)| {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '\'' {
                    quoted = !quoted;
                } else if ch.is_whitespace() && !quoted {
                    return true;
                }
                false
            })
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        redacted.push_str(&redact_pair(&rest[..end]));
        rest = &rest[end..];
    }
    redacted
}

fn redact_pair(pair: &str) -> String {
    match pair.split_once('=') {
        Some((key, _)) if matches!(key.trim().to_lowercase().as_str(), "password" | "pwd") => {
            format!("{}=***", key)
        }
        _ => pair.to_string(),
    }
}

/// Build a tiberius Config from `mssql://`/`sqlserver://` URLs, JDBC strings or ADO.NET strings
pub fn tiberius_config(connection_string: &str) -> Result<Config, DatabaseError> {
    let trimmed = connection_string.trim();
    let lowered = trimmed.to_lowercase();

    if lowered.starts_with("jdbc:sqlserver://") {
        return Config::from_jdbc_string(trimmed)
            .map_err(|e| DatabaseError::InvalidConfig(e.to_string()));
    }
    if !lowered.starts_with("mssql://") && !lowered.starts_with("sqlserver://") {
        return Config::from_ado_string(trimmed)
            .map_err(|e| DatabaseError::InvalidConfig(e.to_string()));
    }

    let url = Url::parse(trimmed).map_err(|e| DatabaseError::InvalidConfig(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| DatabaseError::InvalidConfig("Host is required".to_string()))?;
    let username = decode(url.username())?;
    let password = decode(url.password().unwrap_or_default())?;

    let mut config = Config::new();
    config.host(host);
    config.port(url.port().unwrap_or_else(|| DatabaseType::Mssql.default_port()));

    let database = url.path().trim_start_matches('/');
    if !database.is_empty() {
        config.database(decode(database)?);
    }
    if !username.is_empty() {
        config.authentication(AuthMethod::sql_server(&username, &password));
    }

    let mut encrypt = false;
    let mut trust_certificate = true;
    for (key, value) in url.query_pairs() {
        let enabled = matches!(value.to_lowercase().as_str(), "true" | "yes" | "1");
        match key.to_lowercase().as_str() {
            "encrypt" => encrypt = enabled,
            "trustservercertificate" | "trust_server_certificate" => trust_certificate = enabled,
            _ => log::debug!("[Config] Ignoring unknown SQL Server option '{}'", key),
        }
    }

    if trust_certificate {
        config.trust_cert();
    }
    config.encryption(if encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });

    Ok(config)
}

fn decode(component: &str) -> Result<String, DatabaseError> {
    urlencoding::decode(component)
        .map(|s| s.into_owned())
        .map_err(|e| DatabaseError::InvalidConfig(e.to_string()))
}
