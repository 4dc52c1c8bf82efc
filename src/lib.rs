// Multi-dialect database adapters for admin panel CRUD
// Schema introspection, filtered/paginated listing and primary-key-aware record operations
// over PostgreSQL, MySQL and Microsoft SQL Server behind one async trait.

pub mod db;

pub use db::{
    create_adapter, create_adapter_from_config, detect_dialect, map_column_type, AdapterConfig,
    AdapterRegistry, CanonicalType, CellValue, ColumnInfo, DatabaseAdapter, DatabaseError,
    DatabaseType, PoolConfig, QueryOptions, Record, RecordSet, SortOrder,
};
