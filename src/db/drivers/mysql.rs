// MySQL Adapter
// Implements DatabaseAdapter for MySQL using mysql_async's built-in pool

use crate::db::connection::AdapterConfig;
use crate::db::dialect::Statement;
use crate::db::drivers::fetch_inserted;
use crate::db::query::{coerce_record, require_columns};
use crate::db::traits::{
    CellValue, ColumnInfo, DatabaseAdapter, DatabaseError, DatabaseType, QueryContext, Record,
};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, Row, Value};
use tokio::sync::RwLock;

/// Charset id MySQL reports for binary (non-text) columns
const BINARY_CHARSET: u16 = 63;

const LIST_TABLES_SQL: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR)
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

const TABLE_COLUMNS_SQL: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR),
        CAST(COLUMN_TYPE AS CHAR),
        CAST(IS_NULLABLE AS CHAR),
        CAST(COLUMN_KEY = 'PRI' AS SIGNED)
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

/// MySQL adapter
pub struct MysqlAdapter {
    config: AdapterConfig,
    pool: RwLock<Option<Pool>>,
}

impl MysqlAdapter {
    /// Create an adapter for a `mysql://` connection string (not connected yet)
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            config: AdapterConfig::new(DatabaseType::Mysql, connection_string),
            pool: RwLock::new(None),
        }
    }

    pub fn from_config(config: AdapterConfig) -> Result<Self, DatabaseError> {
        config.validate()?;
        Ok(Self {
            config,
            pool: RwLock::new(None),
        })
    }

    /// Wrap a pool owned by the caller; the adapter starts out connected.
    /// The pool should be built with `client_found_rows` so unchanged updates still match.
    pub fn with_pool(pool: Pool) -> Self {
        Self {
            config: AdapterConfig::new(DatabaseType::Mysql, String::new()),
            pool: RwLock::new(Some(pool)),
        }
    }

    /// Driver options for a configuration
    pub fn pool_opts(config: &AdapterConfig) -> Result<Opts, DatabaseError> {
        let opts = Opts::from_url(&config.connection_string)
            .map_err(|e| DatabaseError::InvalidConfig(e.to_string()))?;

        let min = config.pool.min_idle.unwrap_or(0) as usize;
        let max = config.pool.max_size as usize;
        let constraints = PoolConstraints::new(min, max).ok_or_else(|| {
            DatabaseError::InvalidConfig(format!("invalid pool bounds {}..{}", min, max))
        })?;

        Ok(OptsBuilder::from_opts(opts)
            // Report matched rows, not changed rows, for UPDATE
            .client_found_rows(true)
            .pool_opts(PoolOpts::default().with_constraints(constraints))
            .into())
    }

    async fn pool(&self) -> Result<Pool, DatabaseError> {
        self.pool.read().await.clone().ok_or(DatabaseError::NotConnected)
    }

    async fn conn(&self) -> Result<Conn, DatabaseError> {
        self.pool()
            .await?
            .get_conn()
            .await
            .map_err(|e| DatabaseError::PoolError(e.to_string()))
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MysqlAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mysql
    }

    async fn connect(&self) -> Result<(), DatabaseError> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let pool = Pool::new(Self::pool_opts(&self.config)?);
        let checkout = tokio::time::timeout(self.config.pool.connection_timeout(), pool.get_conn()).await;
        match checkout {
            Ok(Ok(_conn)) => {}
            Ok(Err(e)) => {
                let _ = pool.disconnect().await;
                return Err(DatabaseError::ConnectionFailed(e.to_string()));
            }
            Err(_) => {
                let _ = pool.disconnect().await;
                return Err(DatabaseError::ConnectionFailed(format!(
                    "timed out after {}s",
                    self.config.pool.connection_timeout_secs
                )));
            }
        }

        log::info!("[MySQL] Connected to {}", self.config.redacted());
        *guard = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DatabaseError> {
        let pool = self.pool.write().await.take();
        if let Some(pool) = pool {
            pool.disconnect()
                .await
                .map_err(|e| DatabaseError::PoolError(e.to_string()))?;
            log::info!("[MySQL] Disconnected");
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.pool.read().await.is_some()
    }

    async fn fetch_rows(
        &self,
        operation: &'static str,
        table: &str,
        statement: &Statement,
    ) -> Result<Vec<Record>, DatabaseError> {
        let mut conn = self.conn().await?;

        log::debug!("[MySQL] {}: {}", operation, statement.sql);
        let rows: Vec<Row> = conn
            .exec(statement.sql.as_str(), to_params(&statement.params))
            .await
            .query_context(operation, table)?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn execute_statement(
        &self,
        operation: &'static str,
        table: &str,
        statement: &Statement,
    ) -> Result<u64, DatabaseError> {
        let mut conn = self.conn().await?;

        log::debug!("[MySQL] {}: {}", operation, statement.sql);
        conn.exec_drop(statement.sql.as_str(), to_params(&statement.params))
            .await
            .query_context(operation, table)?;
        Ok(conn.affected_rows())
    }

    async fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let mut conn = self.conn().await?;
        conn.exec(LIST_TABLES_SQL, ())
            .await
            .query_context("list tables", "information_schema.TABLES")
    }

    async fn get_table_columns(&self, table_name: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let mut conn = self.conn().await?;
        let rows: Vec<(String, String, String, i64)> = conn
            .exec(TABLE_COLUMNS_SQL, (table_name,))
            .await
            .query_context("describe table", table_name)?;

        Ok(rows
            .into_iter()
            .map(|(name, column_type, nullable, primary)| {
                ColumnInfo::new(name, column_type, nullable == "YES", primary != 0)
            })
            .collect())
    }

    async fn create_record(&self, table_name: &str, data: &Record) -> Result<Record, DatabaseError> {
        if data.is_empty() {
            return Err(DatabaseError::Validation(format!(
                "no values supplied to insert into {}",
                table_name
            )));
        }
        let columns = self.get_table_columns(table_name).await?;
        require_columns(table_name, &columns)?;
        let data = coerce_record(table_name, &columns, data)?;

        let insert = self.database_type().dialect().insert(table_name, &data);
        let mut conn = self.conn().await?;
        log::debug!("[MySQL] create record: {}", insert.sql);
        conn.exec_drop(insert.sql.as_str(), to_params(&insert.params))
            .await
            .query_context("create record", table_name)?;

        // LAST_INSERT_ID is per connection, read it before the connection goes back
        let generated = conn
            .last_insert_id()
            .filter(|id| *id != 0)
            .and_then(|id| i64::try_from(id).ok())
            .map(CellValue::Int);
        drop(conn);

        fetch_inserted(self, table_name, &columns, generated, data).await
    }
}

fn to_params(params: &[CellValue]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(to_value).collect())
    }
}

fn to_value(value: &CellValue) -> Value {
    match value {
        CellValue::Null => Value::NULL,
        CellValue::Bool(v) => Value::Int(*v as i64),
        CellValue::Int(v) => Value::Int(*v),
        CellValue::Float(v) => Value::Double(*v),
        CellValue::String(v) | CellValue::DateTime(v) => Value::Bytes(v.as_bytes().to_vec()),
        CellValue::Json(v) => Value::Bytes(v.to_string().into_bytes()),
        CellValue::Binary(v) => Value::Bytes(v.clone()),
    }
}

fn record_from_row(row: &Row) -> Record {
    row.columns_ref()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = row
                .as_ref(idx)
                .map(|v| {
                    column_value(
                        v,
                        column.column_type(),
                        column.character_set(),
                        column.column_length(),
                    )
                })
                .unwrap_or(CellValue::Null);
            (column.name_str().into_owned(), value)
        })
        .collect()
}

/// `TINYINT(1)` is how MySQL spells BOOLEAN, so those values come back as `Bool`
fn column_value(
    value: &Value,
    column_type: ColumnType,
    charset: u16,
    display_length: u32,
) -> CellValue {
    match cell_value(value, column_type, charset) {
        CellValue::Int(v) if column_type == ColumnType::MYSQL_TYPE_TINY && display_length == 1 => {
            CellValue::Bool(v != 0)
        }
        other => other,
    }
}

/// Convert a binary-protocol value using the column metadata
fn cell_value(value: &Value, column_type: ColumnType, charset: u16) -> CellValue {
    match value {
        Value::NULL => CellValue::Null,
        Value::Int(v) => CellValue::Int(*v),
        Value::UInt(v) => i64::try_from(*v)
            .map(CellValue::Int)
            .unwrap_or_else(|_| CellValue::String(v.to_string())),
        Value::Float(v) => CellValue::Float(*v as f64),
        Value::Double(v) => CellValue::Float(*v),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let date = format!("{:04}-{:02}-{:02}", year, month, day);
            if column_type == ColumnType::MYSQL_TYPE_DATE {
                CellValue::DateTime(date)
            } else if *micros > 0 {
                CellValue::DateTime(format!(
                    "{} {:02}:{:02}:{:02}.{:06}",
                    date, hour, minute, second, micros
                ))
            } else {
                CellValue::DateTime(format!("{} {:02}:{:02}:{:02}", date, hour, minute, second))
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = *days as u64 * 24 + *hours as u64;
            let sign = if *negative { "-" } else { "" };
            let mut time = format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds);
            if *micros > 0 {
                time.push_str(&format!(".{:06}", micros));
            }
            CellValue::String(time)
        }
        Value::Bytes(bytes) => bytes_value(bytes, column_type, charset),
    }
}

fn bytes_value(bytes: &[u8], column_type: ColumnType, charset: u16) -> CellValue {
    match column_type {
        ColumnType::MYSQL_TYPE_NEWDECIMAL | ColumnType::MYSQL_TYPE_DECIMAL => {
            let text = String::from_utf8_lossy(bytes);
            text.parse::<f64>()
                .map(CellValue::Float)
                .unwrap_or_else(|_| CellValue::String(text.into_owned()))
        }
        ColumnType::MYSQL_TYPE_JSON => serde_json::from_slice(bytes)
            .map(CellValue::Json)
            .unwrap_or_else(|_| CellValue::String(String::from_utf8_lossy(bytes).into_owned())),
        _ if charset == BINARY_CHARSET => CellValue::Binary(bytes.to_vec()),
        _ => match std::str::from_utf8(bytes) {
            Ok(text) => CellValue::String(text.to_string()),
            Err(_) => CellValue::Binary(bytes.to_vec()),
        },
    }
}
