// Database Adapters (PostgreSQL, MySQL, SQL Server)
// One DatabaseAdapter implementation per supported dialect

pub mod mssql;
pub mod mysql;
pub mod postgres;

// Re-export adapters
pub use mssql::{MssqlAdapter, MssqlPool};
pub use mysql::MysqlAdapter;
pub use postgres::{PostgresAdapter, PostgresPool};

use crate::db::query::primary_key_column;
use crate::db::traits::{CellValue, ColumnInfo, DatabaseAdapter, DatabaseError, Record};

/// Read back a freshly inserted row for dialects without `RETURNING`.
///
/// Looks the row up by the generated identity when the database produced one,
/// otherwise by the primary key value the caller supplied. When neither is
/// available the inserted values are returned as-is.
pub(crate) async fn fetch_inserted<A>(
    adapter: &A,
    table_name: &str,
    columns: &[ColumnInfo],
    generated: Option<CellValue>,
    data: Record,
) -> Result<Record, DatabaseError>
where
    A: DatabaseAdapter + ?Sized,
{
    let key = primary_key_column(columns);
    let id = generated.or_else(|| data.get(&key).filter(|v| !v.is_null()).cloned());

    let Some(id) = id else {
        log::debug!("[{}] No key to re-read inserted row in {}", adapter.driver_name(), table_name);
        return Ok(data);
    };

    let select = adapter.database_type().dialect().select_by_key(table_name, &key, &id);
    let row = adapter
        .fetch_rows("create record", table_name, &select)
        .await?
        .into_iter()
        .next();
    Ok(row.unwrap_or(data))
}
