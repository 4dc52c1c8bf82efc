// SQL Server Adapter
// Implements DatabaseAdapter for Microsoft SQL Server using tiberius behind a bb8 pool

use crate::db::connection::{tiberius_config, AdapterConfig};
use crate::db::dialect::{Statement, MSSQL_IDENTITY_ALIAS};
use crate::db::drivers::fetch_inserted;
use crate::db::query::{coerce_record, require_columns};
use crate::db::traits::{
    CellValue, ColumnInfo, DatabaseAdapter, DatabaseError, DatabaseType, QueryContext, Record,
};
use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::borrow::Cow;
use tiberius::{ColumnData, ColumnType, Row, ToSql};
use tokio::sync::RwLock;

pub type MssqlPool = Pool<ConnectionManager>;

const LIST_TABLES_SQL: &str = r#"
    SELECT t.name AS table_name
    FROM sys.tables t
    JOIN sys.schemas s ON t.schema_id = s.schema_id
    WHERE s.name = SCHEMA_NAME() AND t.is_ms_shipped = 0
    ORDER BY t.name
"#;

const TABLE_COLUMNS_SQL: &str = r#"
    SELECT
        c.name AS column_name,
        ty.name AS data_type,
        c.is_nullable,
        CAST(CASE WHEN pk.column_id IS NULL THEN 0 ELSE 1 END AS BIT) AS is_primary_key
    FROM sys.columns c
    JOIN sys.types ty ON c.user_type_id = ty.user_type_id
    JOIN sys.tables tbl ON c.object_id = tbl.object_id
    JOIN sys.schemas s ON tbl.schema_id = s.schema_id
    LEFT JOIN (
        SELECT ic.object_id, ic.column_id
        FROM sys.indexes i
        JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
        WHERE i.is_primary_key = 1
    ) pk ON pk.object_id = c.object_id AND pk.column_id = c.column_id
    WHERE s.name = SCHEMA_NAME() AND tbl.name = @P1
    ORDER BY c.column_id
"#;

/// SQL Server adapter
pub struct MssqlAdapter {
    config: AdapterConfig,
    pool: RwLock<Option<MssqlPool>>,
}

impl MssqlAdapter {
    /// Create an adapter from a `mssql://`, JDBC or ADO.NET connection string (not connected yet)
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            config: AdapterConfig::new(DatabaseType::Mssql, connection_string),
            pool: RwLock::new(None),
        }
    }

    pub fn from_config(config: AdapterConfig) -> Result<Self, DatabaseError> {
        config.validate()?;
        tiberius_config(&config.connection_string)?;
        Ok(Self {
            config,
            pool: RwLock::new(None),
        })
    }

    /// Wrap a pool owned by the caller; the adapter starts out connected
    pub fn with_pool(pool: MssqlPool) -> Self {
        Self {
            config: AdapterConfig::new(DatabaseType::Mssql, String::new()),
            pool: RwLock::new(Some(pool)),
        }
    }

    /// Build a pool from configuration without attaching it to an adapter
    pub async fn build_pool(config: &AdapterConfig) -> Result<MssqlPool, DatabaseError> {
        let tiberius_config = tiberius_config(&config.connection_string)?;
        let manager = ConnectionManager::build(tiberius_config)
            .map_err(|e| DatabaseError::InvalidConfig(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool.max_size)
            .min_idle(config.pool.min_idle)
            .connection_timeout(config.pool.connection_timeout())
            .build(manager)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        pool.get()
            .await
            .map(|_| ())
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(pool)
    }

    async fn pool(&self) -> Result<MssqlPool, DatabaseError> {
        self.pool.read().await.clone().ok_or(DatabaseError::NotConnected)
    }

    /// Run a batch and collect every result set it produced
    async fn query_results(
        &self,
        operation: &'static str,
        table: &str,
        statement: &Statement,
    ) -> Result<Vec<Vec<Row>>, DatabaseError> {
        let pool = self.pool().await?;
        let mut connection = pool
            .get()
            .await
            .map_err(|e| DatabaseError::PoolError(e.to_string()))?;
        let params = param_refs(&statement.params);

        log::debug!("[MSSQL] {}: {}", operation, statement.sql);
        let stream = connection
            .query(statement.sql.as_str(), &params)
            .await
            .query_context(operation, table)?;
        stream.into_results().await.query_context(operation, table)
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MssqlAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mssql
    }

    async fn connect(&self) -> Result<(), DatabaseError> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let pool = Self::build_pool(&self.config).await?;
        log::info!("[MSSQL] Connected to {}", self.config.redacted());
        *guard = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DatabaseError> {
        if self.pool.write().await.take().is_some() {
            log::info!("[MSSQL] Disconnected");
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
        let result_sets = self.query_results(operation, table, statement).await?;
        Ok(result_sets
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(record_from_row)
            .collect())
    }

    async fn execute_statement(
        &self,
        operation: &'static str,
        table: &str,
        statement: &Statement,
    ) -> Result<u64, DatabaseError> {
        let pool = self.pool().await?;
        let mut connection = pool
            .get()
            .await
            .map_err(|e| DatabaseError::PoolError(e.to_string()))?;
        let params = param_refs(&statement.params);

        log::debug!("[MSSQL] {}: {}", operation, statement.sql);
        let result = connection
            .execute(statement.sql.as_str(), &params)
            .await
            .query_context(operation, table)?;
        Ok(result.total())
    }

    async fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let statement = Statement::new(LIST_TABLES_SQL, Vec::new());
        let result_sets = self.query_results("list tables", "sys.tables", &statement).await?;

        Ok(result_sets
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .filter_map(|row| row.get::<&str, _>(0).map(str::to_string))
            .collect())
    }

    async fn get_table_columns(&self, table_name: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let statement = Statement::new(TABLE_COLUMNS_SQL, vec![CellValue::from(table_name)]);
        let result_sets = self.query_results("describe table", table_name, &statement).await?;

        Ok(result_sets
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(|row| {
                ColumnInfo::new(
                    row.get::<&str, _>(0).unwrap_or(""),
                    row.get::<&str, _>(1).unwrap_or(""),
                    row.get::<bool, _>(2).unwrap_or(true),
                    row.get::<bool, _>(3).unwrap_or(false),
                )
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

        // The batch ends with SELECT SCOPE_IDENTITY(), NULL for tables without an identity column
        let insert = self.database_type().dialect().insert(table_name, &data);
        let result_sets = self.query_results("create record", table_name, &insert).await?;
        let generated = result_sets
            .iter()
            .rev()
            .find_map(|rows| rows.first())
            .and_then(|row| row.try_get::<i64, _>(MSSQL_IDENTITY_ALIAS).ok().flatten())
            .map(CellValue::Int);

        fetch_inserted(self, table_name, &columns, generated, data).await
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            CellValue::Null => ColumnData::String(None),
            CellValue::Bool(v) => ColumnData::Bit(Some(*v)),
            CellValue::Int(v) => ColumnData::I64(Some(*v)),
            CellValue::Float(v) => ColumnData::F64(Some(*v)),
            CellValue::String(v) | CellValue::DateTime(v) => {
                ColumnData::String(Some(Cow::Borrowed(v.as_str())))
            }
            CellValue::Json(v) => ColumnData::String(Some(Cow::Owned(v.to_string()))),
            CellValue::Binary(v) => ColumnData::Binary(Some(Cow::Borrowed(v.as_slice()))),
        }
    }
}

fn param_refs(params: &[CellValue]) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p as &dyn ToSql).collect()
}

fn record_from_row(row: &Row) -> Record {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| (column.name().to_string(), cell_value_from_row(row, idx)))
        .collect()
}

/// Extract cell value from row
fn cell_value_from_row(row: &Row, idx: usize) -> CellValue {
    let col_type = row
        .columns()
        .get(idx)
        .map(|c| c.column_type())
        .unwrap_or(ColumnType::Null);

    let value = match col_type {
        ColumnType::Null => None,

        // Integer types; nullable columns report Intn whatever their width
        ColumnType::Int1 => row.try_get::<u8, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)),
        ColumnType::Int2 => row.try_get::<i16, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)),
        ColumnType::Int4 => row.try_get::<i32, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)),
        ColumnType::Int8 => row.try_get::<i64, _>(idx).ok().flatten().map(CellValue::Int),
        ColumnType::Intn => row
            .try_get::<i64, _>(idx)
            .ok()
            .flatten()
            .or_else(|| row.try_get::<i32, _>(idx).ok().flatten().map(i64::from))
            .or_else(|| row.try_get::<i16, _>(idx).ok().flatten().map(i64::from))
            .or_else(|| row.try_get::<u8, _>(idx).ok().flatten().map(i64::from))
            .map(CellValue::Int),

        // Float types
        ColumnType::Float4 => row.try_get::<f32, _>(idx).ok().flatten().map(|v| CellValue::Float(v as f64)),
        ColumnType::Float8 | ColumnType::Money | ColumnType::Money4 => {
            row.try_get::<f64, _>(idx).ok().flatten().map(CellValue::Float)
        }
        ColumnType::Floatn => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .or_else(|| row.try_get::<f32, _>(idx).ok().flatten().map(f64::from))
            .map(CellValue::Float),

        ColumnType::Decimaln | ColumnType::Numericn => row
            .try_get::<tiberius::numeric::Numeric, _>(idx)
            .ok()
            .flatten()
            .map(|n| CellValue::Float(f64::from(n))),

        ColumnType::Bit | ColumnType::Bitn => row.try_get::<bool, _>(idx).ok().flatten().map(CellValue::Bool),

        // String types
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText => row
            .try_get::<&str, _>(idx)
            .ok()
            .flatten()
            .map(|s| CellValue::String(s.to_string())),

        // Date/Time types
        ColumnType::Datetime
        | ColumnType::Datetime2
        | ColumnType::Datetimen
        | ColumnType::Datetime4 => row
            .try_get::<NaiveDateTime, _>(idx)
            .ok()
            .flatten()
            .map(|dt| CellValue::DateTime(dt.to_string())),
        ColumnType::DatetimeOffsetn => row
            .try_get::<DateTime<Utc>, _>(idx)
            .ok()
            .flatten()
            .map(|dt| CellValue::DateTime(dt.to_rfc3339())),
        ColumnType::Daten => row
            .try_get::<NaiveDate, _>(idx)
            .ok()
            .flatten()
            .map(|d| CellValue::DateTime(d.to_string())),
        ColumnType::Timen => row
            .try_get::<NaiveTime, _>(idx)
            .ok()
            .flatten()
            .map(|t| CellValue::String(t.to_string())),

        // Binary types
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => row
            .try_get::<&[u8], _>(idx)
            .ok()
            .flatten()
            .map(|b| CellValue::Binary(b.to_vec())),

        ColumnType::Guid => row
            .try_get::<tiberius::Uuid, _>(idx)
            .ok()
            .flatten()
            .map(|u| CellValue::String(u.to_string())),

        ColumnType::Xml => row
            .try_get::<&tiberius::xml::XmlData, _>(idx)
            .ok()
            .flatten()
            .map(|xml| CellValue::String(xml.to_owned().into_string())),

        other => {
            log::warn!("[MSSQL] Unsupported column type {:?}, returning NULL", other);
            None
        }
    };

    value.unwrap_or(CellValue::Null)
}
