// Database Module
// Dialect-independent adapter contract plus PostgreSQL, MySQL and SQL Server implementations

pub mod connection;
pub mod dialect;
pub mod drivers;
pub mod query;
pub mod registry;
pub mod traits;
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{detect_dialect, redact_connection_string, AdapterConfig, PoolConfig};
pub use dialect::{Dialect, MssqlDialect, MysqlDialect, PostgresDialect, Statement};
pub use drivers::{MssqlAdapter, MssqlPool, MysqlAdapter, PostgresAdapter, PostgresPool};
pub use query::{QueryOptions, SortOrder, SortSpec};
pub use registry::{create_adapter, create_adapter_from_config, AdapterConstructor, AdapterRegistry};
pub use traits::{
    CellValue, ColumnInfo, DatabaseAdapter, DatabaseError, DatabaseType, Record, RecordSet,
};
pub use types::{map_column_type, CanonicalType};
