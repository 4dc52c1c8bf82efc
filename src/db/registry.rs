// Adapter Registry
// Maps database types to adapter constructors and builds adapters from connection settings

use crate::db::connection::AdapterConfig;
use crate::db::drivers::{MssqlAdapter, MysqlAdapter, PostgresAdapter};
use crate::db::traits::{DatabaseAdapter, DatabaseError, DatabaseType};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use crate::db::connection::detect_dialect;

/// Builds an unconnected adapter from validated configuration
pub type AdapterConstructor =
    Arc<dyn Fn(AdapterConfig) -> Result<Box<dyn DatabaseAdapter>, DatabaseError> + Send + Sync>;

/// Registry for managing adapter constructors
pub struct AdapterRegistry {
    constructors: RwLock<HashMap<DatabaseType, AdapterConstructor>>,
}

impl AdapterRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the PostgreSQL, MySQL and SQL Server adapters
    pub async fn with_default_adapters() -> Self {
        let registry = Self::new();
        for db_type in DatabaseType::ALL {
            registry
                .register(
                    db_type,
                    Arc::new(move |config: AdapterConfig| build_adapter(db_type, config)),
                )
                .await;
        }
        registry
    }

    /// Register (or replace) the constructor for a database type
    pub async fn register(&self, db_type: DatabaseType, constructor: AdapterConstructor) {
        let mut constructors = self.constructors.write().await;
        constructors.insert(db_type, constructor);
        log::debug!("[Registry] Registered adapter for: {}", db_type);
    }

    /// Remove a constructor (useful for testing or dynamic unloading)
    pub async fn unregister(&self, db_type: DatabaseType) {
        let mut constructors = self.constructors.write().await;
        if constructors.remove(&db_type).is_some() {
            log::debug!("[Registry] Unregistered adapter for: {}", db_type);
        }
    }

    /// Check if an adapter is registered for a given database type
    pub async fn has_adapter(&self, db_type: DatabaseType) -> bool {
        let constructors = self.constructors.read().await;
        constructors.contains_key(&db_type)
    }

    /// Registered database types in declaration order
    pub async fn supported_types(&self) -> Vec<DatabaseType> {
        let constructors = self.constructors.read().await;
        DatabaseType::ALL
            .into_iter()
            .filter(|t| constructors.contains_key(t))
            .collect()
    }

    /// Build an adapter for the configured (or detected) dialect
    pub async fn create(&self, config: AdapterConfig) -> Result<Box<dyn DatabaseAdapter>, DatabaseError> {
        let db_type = config.resolve_dialect()?;
        let constructor = {
            let constructors = self.constructors.read().await;
            constructors.get(&db_type).cloned()
        };

        match constructor {
            Some(constructor) => {
                let config = AdapterConfig {
                    dialect: Some(db_type),
                    ..config
                };
                constructor(config)
            }
            None => Err(DatabaseError::UnsupportedDialect {
                name: db_type.to_string(),
                allowed: self
                    .supported_types()
                    .await
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_adapter(
    db_type: DatabaseType,
    config: AdapterConfig,
) -> Result<Box<dyn DatabaseAdapter>, DatabaseError> {
    Ok(match db_type {
        DatabaseType::Postgresql => Box::new(PostgresAdapter::from_config(config)?),
        DatabaseType::Mysql => Box::new(MysqlAdapter::from_config(config)?),
        DatabaseType::Mssql => Box::new(MssqlAdapter::from_config(config)?),
    })
}

/// Build an unconnected adapter for a dialect name (`postgresql`, `postgres`, `mysql`, `mssql`)
pub fn create_adapter(
    dialect_name: &str,
    connection_string: &str,
) -> Result<Box<dyn DatabaseAdapter>, DatabaseError> {
    let db_type: DatabaseType = dialect_name.parse()?;
    build_adapter(db_type, AdapterConfig::new(db_type, connection_string))
}

/// Build an unconnected adapter, detecting the dialect when the config omits it
pub fn create_adapter_from_config(config: AdapterConfig) -> Result<Box<dyn DatabaseAdapter>, DatabaseError> {
    let db_type = config.resolve_dialect()?;
    log::debug!("[Registry] Creating {} adapter for {}", db_type, config.redacted());
    build_adapter(
        db_type,
        AdapterConfig {
            dialect: Some(db_type),
            ..config
        },
    )
}
