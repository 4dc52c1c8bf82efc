// SQL Dialects
// Identifier quoting, placeholder syntax and statement building per database type.
// Values travel as bound parameters; only quoted identifiers and the NULL keyword reach the SQL text.

use crate::db::query::ListPlan;
use crate::db::traits::{CellValue, DatabaseType, Record};

/// SQL text plus the values bound to its placeholders, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<CellValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<CellValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Bind a value and return the placeholder that refers to it
    fn bind<D: Dialect + ?Sized>(&mut self, dialect: &D, value: CellValue) -> String {
        self.params.push(value);
        dialect.placeholder(self.params.len())
    }

    /// Stored values: NULL is written as the keyword so the server never has to
    /// convert a typed NULL parameter (SQL Server rejects nvarchar NULL into varbinary)
    fn bind_value<D: Dialect + ?Sized>(&mut self, dialect: &D, value: &CellValue) -> String {
        if value.is_null() {
            "NULL".to_string()
        } else {
            self.bind(dialect, value.clone())
        }
    }
}

/// Syntax rules of one SQL dialect
pub trait Dialect: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    /// Quote an identifier, doubling any embedded closing quote
    fn quote_ident(&self, name: &str) -> String;

    /// Placeholder for the 1-based parameter `index`
    fn placeholder(&self, index: usize) -> String;

    /// Row window clause appended after ORDER BY
    fn pagination_clause(&self, limit: &str, offset: &str) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }

    /// Text appended to INSERT so the new row (or its identity) comes back
    fn insert_suffix(&self) -> Option<&'static str> {
        None
    }

    fn where_clause(&self, statement: &mut Statement, filters: &[(String, CellValue)]) -> String {
        if filters.is_empty() {
            return String::new();
        }
        let predicates: Vec<String> = filters
            .iter()
            .map(|(column, value)| {
                let placeholder = statement.bind(self, value.clone());
                format!("{} = {}", self.quote_ident(column), placeholder)
            })
            .collect();
        format!(" WHERE {}", predicates.join(" AND "))
    }

    /// `SELECT COUNT(*)` over the filtered table
    fn count(&self, table: &str, filters: &[(String, CellValue)]) -> Statement {
        let mut statement = Statement::new("", Vec::new());
        let where_sql = self.where_clause(&mut statement, filters);
        statement.sql = format!(
            "SELECT COUNT(*) AS {} FROM {}{}",
            self.quote_ident("total"),
            self.quote_ident(table),
            where_sql
        );
        statement
    }

    /// One page of the filtered, sorted table
    fn select_page(&self, table: &str, plan: &ListPlan) -> Statement {
        let mut statement = Statement::new("", Vec::new());
        let where_sql = self.where_clause(&mut statement, &plan.filters);
        let limit = i64::try_from(plan.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(plan.offset).unwrap_or(i64::MAX);
        let limit = statement.bind(self, CellValue::Int(limit));
        let offset = statement.bind(self, CellValue::Int(offset));
        statement.sql = format!(
            "SELECT * FROM {}{} ORDER BY {} {} {}",
            self.quote_ident(table),
            where_sql,
            self.quote_ident(&plan.sort_field),
            plan.order.as_sql(),
            self.pagination_clause(&limit, &offset)
        );
        statement
    }

    fn insert(&self, table: &str, data: &Record) -> Statement {
        let mut statement = Statement::new("", Vec::new());
        let mut columns = Vec::with_capacity(data.len());
        let mut placeholders = Vec::with_capacity(data.len());
        for (column, value) in data {
            columns.push(self.quote_ident(column));
            placeholders.push(statement.bind_value(self, value));
        }
        statement.sql = format!(
            "INSERT INTO {} ({}) VALUES ({}){}",
            self.quote_ident(table),
            columns.join(", "),
            placeholders.join(", "),
            self.insert_suffix().unwrap_or_default()
        );
        statement
    }

    fn update(&self, table: &str, key: &str, id: &CellValue, data: &Record) -> Statement {
        let mut statement = Statement::new("", Vec::new());
        let assignments: Vec<String> = data
            .iter()
            .map(|(column, value)| {
                let placeholder = statement.bind_value(self, value);
                format!("{} = {}", self.quote_ident(column), placeholder)
            })
            .collect();
        let key_placeholder = statement.bind(self, id.clone());
        statement.sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.quote_ident(table),
            assignments.join(", "),
            self.quote_ident(key),
            key_placeholder
        );
        statement
    }

    fn delete(&self, table: &str, key: &str, id: &CellValue) -> Statement {
        let mut statement = Statement::new("", Vec::new());
        let placeholder = statement.bind(self, id.clone());
        statement.sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote_ident(table),
            self.quote_ident(key),
            placeholder
        );
        statement
    }

    fn select_by_key(&self, table: &str, key: &str, id: &CellValue) -> Statement {
        let mut statement = Statement::new("", Vec::new());
        let placeholder = statement.bind(self, id.clone());
        statement.sql = format!(
            "SELECT * FROM {} WHERE {} = {}",
            self.quote_ident(table),
            self.quote_ident(key),
            placeholder
        );
        statement
    }
}

/// PostgreSQL: `"ident"`, `$n`, `RETURNING *`
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgresql
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn insert_suffix(&self) -> Option<&'static str> {
        Some(" RETURNING *")
    }
}

/// MySQL: `` `ident` ``, `?`
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mysql
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}

/// Column alias carrying SCOPE_IDENTITY() back from an MSSQL insert batch
pub const MSSQL_IDENTITY_ALIAS: &str = "__inserted_id";

/// SQL Server: `[ident]`, `@Pn`, OFFSET/FETCH paging
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl Dialect for MssqlDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mssql
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn pagination_clause(&self, limit: &str, offset: &str) -> String {
        format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
    }

    fn insert_suffix(&self) -> Option<&'static str> {
        Some("; SELECT CAST(SCOPE_IDENTITY() AS BIGINT) AS [__inserted_id]")
    }
}

static POSTGRES: PostgresDialect = PostgresDialect;
static MYSQL: MysqlDialect = MysqlDialect;
static MSSQL: MssqlDialect = MssqlDialect;

pub(crate) fn for_type(database_type: DatabaseType) -> &'static dyn Dialect {
    match database_type {
        DatabaseType::Postgresql => &POSTGRES,
        DatabaseType::Mysql => &MYSQL,
        DatabaseType::Mssql => &MSSQL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::query::SortOrder;

    fn plan() -> ListPlan {
        ListPlan {
            filters: vec![
                ("age".to_string(), CellValue::Int(30)),
                ("name".to_string(), CellValue::from("Ann")),
            ],
            sort_field: "name".to_string(),
            order: SortOrder::Desc,
            limit: 10,
            offset: 20,
        }
    }

    fn payload() -> Record {
        let mut data = Record::new();
        data.insert("name".to_string(), CellValue::from("Ann"));
        data.insert("age".to_string(), CellValue::Int(30));
        data
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(PostgresDialect.quote_ident("users"), "\"users\"");
        assert_eq!(PostgresDialect.quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(MysqlDialect.quote_ident("we`ird"), "`we``ird`");
        assert_eq!(MssqlDialect.quote_ident("we]ird"), "[we]]ird]");
    }

    #[test]
    fn test_injected_identifier_stays_quoted() {
        let quoted = MysqlDialect.quote_ident("id`; DROP TABLE users; --");
        assert_eq!(quoted, "`id``; DROP TABLE users; --`");
    }

    #[test]
    fn test_postgres_select_page() {
        let statement = PostgresDialect.select_page("users", &plan());
        assert_eq!(
            statement.sql,
            r#"SELECT * FROM "users" WHERE "age" = $1 AND "name" = $2 ORDER BY "name" DESC LIMIT $3 OFFSET $4"#
        );
        assert_eq!(
            statement.params,
            vec![CellValue::Int(30), CellValue::from("Ann"), CellValue::Int(10), CellValue::Int(20)]
        );
    }

    #[test]
    fn test_mysql_select_page() {
        let statement = MysqlDialect.select_page("users", &plan());
        assert_eq!(
            statement.sql,
            "SELECT * FROM `users` WHERE `age` = ? AND `name` = ? ORDER BY `name` DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(statement.params[2], CellValue::Int(10));
        assert_eq!(statement.params[3], CellValue::Int(20));
    }

    #[test]
    fn test_mssql_select_page() {
        let statement = MssqlDialect.select_page("users", &plan());
        assert_eq!(
            statement.sql,
            "SELECT * FROM [users] WHERE [age] = @P1 AND [name] = @P2 ORDER BY [name] DESC OFFSET @P4 ROWS FETCH NEXT @P3 ROWS ONLY"
        );
        assert_eq!(statement.params[2], CellValue::Int(10));
        assert_eq!(statement.params[3], CellValue::Int(20));
    }

    #[test]
    fn test_count_without_filters() {
        let statement = MssqlDialect.count("users", &[]);
        assert_eq!(statement.sql, "SELECT COUNT(*) AS [total] FROM [users]");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_insert_per_dialect() {
        let pg = PostgresDialect.insert("users", &payload());
        assert_eq!(pg.sql, r#"INSERT INTO "users" ("name", "age") VALUES ($1, $2) RETURNING *"#);
        assert_eq!(pg.params, vec![CellValue::from("Ann"), CellValue::Int(30)]);

        let my = MysqlDialect.insert("users", &payload());
        assert_eq!(my.sql, "INSERT INTO `users` (`name`, `age`) VALUES (?, ?)");

        let ms = MssqlDialect.insert("users", &payload());
        assert_eq!(
            ms.sql,
            format!(
                "INSERT INTO [users] ([name], [age]) VALUES (@P1, @P2); SELECT CAST(SCOPE_IDENTITY() AS BIGINT) AS [{}]",
                MSSQL_IDENTITY_ALIAS
            )
        );
    }

    #[test]
    fn test_update_binds_key_last() {
        let statement = MssqlDialect.update("users", "id", &CellValue::Int(7), &payload());
        assert_eq!(statement.sql, "UPDATE [users] SET [name] = @P1, [age] = @P2 WHERE [id] = @P3");
        assert_eq!(statement.params.last(), Some(&CellValue::Int(7)));
    }

    #[test]
    fn test_null_values_are_written_as_keyword() {
        let mut data = Record::new();
        data.insert("avatar".to_string(), CellValue::Null);
        data.insert("name".to_string(), CellValue::from("Ann"));

        let update = MssqlDialect.update("users", "id", &CellValue::Int(1), &data);
        assert_eq!(update.sql, "UPDATE [users] SET [avatar] = NULL, [name] = @P1 WHERE [id] = @P2");
        assert_eq!(update.params, vec![CellValue::from("Ann"), CellValue::Int(1)]);

        let insert = PostgresDialect.insert("users", &data);
        assert_eq!(
            insert.sql,
            r#"INSERT INTO "users" ("avatar", "name") VALUES (NULL, $1) RETURNING *"#
        );
        assert_eq!(insert.params, vec![CellValue::from("Ann")]);
    }

    #[test]
    fn test_delete_and_select_by_key() {
        let delete = MysqlDialect.delete("users", "id", &CellValue::Int(7));
        assert_eq!(delete.sql, "DELETE FROM `users` WHERE `id` = ?");
        assert_eq!(delete.params, vec![CellValue::Int(7)]);

        let select = PostgresDialect.select_by_key("users", "id", &CellValue::Int(7));
        assert_eq!(select.sql, r#"SELECT * FROM "users" WHERE "id" = $1"#);
    }

    #[test]
    fn test_for_type() {
        for database_type in DatabaseType::ALL {
            assert_eq!(for_type(database_type).database_type(), database_type);
        }
    }
}
