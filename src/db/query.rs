// Query Options and Listing Plans
// Paging/sorting/filtering options for record listing, validated against real table columns

use crate::db::traits::{CellValue, ColumnInfo, DatabaseError, Record};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Column used for sorting when the caller does not choose one
pub const DEFAULT_SORT_FIELD: &str = "id";
/// Primary key assumed when the catalog reports none
pub const DEFAULT_PRIMARY_KEY: &str = "id";

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            _ => Err(DatabaseError::Validation(format!(
                "sort order must be ASC or DESC, got '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: DEFAULT_SORT_FIELD.to_string(),
            order: SortOrder::Asc,
        }
    }
}

/// Options for `get_records`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    pub page: u32,
    pub per_page: u32,
    pub sort: SortSpec,
    /// Equality filters; null values are ignored
    pub filter: IndexMap<String, CellValue>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
            sort: SortSpec::default(),
            filter: IndexMap::new(),
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = SortSpec {
            field: field.into(),
            order,
        };
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    /// Build options from URL query pairs: `page`, `perPage`, `sortField`,
    /// `sortOrder` and any number of `filter.<field>=<value>`.
    /// Filter values stay textual and are typed later against the column.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Result<Self, DatabaseError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "page" => options.page = parse_positive(key, value)?,
                "perPage" => options.per_page = parse_positive(key, value)?,
                "sortField" => options.sort.field = value.to_string(),
                "sortOrder" => options.sort.order = value.parse()?,
                _ => {
                    if let Some(field) = key.strip_prefix("filter.") {
                        let cell = if value.is_empty() {
                            CellValue::Null
                        } else {
                            CellValue::String(value.to_string())
                        };
                        options.filter.insert(field.to_string(), cell);
                    }
                }
            }
        }
        Ok(options)
    }

    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.per_page as u64
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u32, DatabaseError> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            DatabaseError::Validation(format!("{} must be a positive integer, got '{}'", key, value))
        })
}

/// Validated listing request, safe to render into SQL
#[derive(Debug, Clone, PartialEq)]
pub struct ListPlan {
    pub filters: Vec<(String, CellValue)>,
    pub sort_field: String,
    pub order: SortOrder,
    pub limit: u64,
    pub offset: u64,
}

pub(crate) fn require_columns(table: &str, columns: &[ColumnInfo]) -> Result<(), DatabaseError> {
    if columns.is_empty() {
        return Err(DatabaseError::Validation(format!(
            "table '{}' does not exist or has no columns",
            table
        )));
    }
    Ok(())
}

fn find_column<'a>(columns: &'a [ColumnInfo], name: &str) -> Option<&'a ColumnInfo> {
    columns.iter().find(|c| c.name == name)
}

/// Primary key column of a table, `id` when the catalog marks none
pub fn primary_key_column(columns: &[ColumnInfo]) -> String {
    columns
        .iter()
        .find(|c| c.is_primary_key)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string())
}

/// Check a listing request against the table's columns and build its plan.
/// Sort and filter fields must name real columns since they end up in SQL text.
pub fn plan_listing(
    table: &str,
    columns: &[ColumnInfo],
    options: &QueryOptions,
) -> Result<ListPlan, DatabaseError> {
    require_columns(table, columns)?;

    if options.page == 0 {
        return Err(DatabaseError::Validation("page must be at least 1".to_string()));
    }
    if options.per_page == 0 {
        return Err(DatabaseError::Validation("perPage must be greater than 0".to_string()));
    }
    // LIMIT/OFFSET are bound as signed 64-bit integers
    if options.offset() > i64::MAX as u64 {
        return Err(DatabaseError::Validation(format!(
            "page {} is out of range for perPage {}",
            options.page, options.per_page
        )));
    }

    let sort_field = match find_column(columns, &options.sort.field) {
        Some(column) => column.name.clone(),
        None if options.sort.field == DEFAULT_SORT_FIELD => {
            let fallback = columns
                .iter()
                .find(|c| c.is_primary_key)
                .unwrap_or(&columns[0])
                .name
                .clone();
            log::warn!(
                "[Query] {} has no '{}' column, sorting by '{}'",
                table,
                DEFAULT_SORT_FIELD,
                fallback
            );
            fallback
        }
        None => {
            return Err(DatabaseError::Validation(format!(
                "cannot sort {} by unknown column '{}'",
                table, options.sort.field
            )))
        }
    };

    let mut filters = Vec::with_capacity(options.filter.len());
    for (field, value) in &options.filter {
        if value.is_null() {
            continue;
        }
        let column = find_column(columns, field).ok_or_else(|| {
            DatabaseError::Validation(format!("cannot filter {} by unknown column '{}'", table, field))
        })?;
        filters.push((column.name.clone(), value.clone().coerce_to(column.column_type)));
    }

    Ok(ListPlan {
        filters,
        sort_field,
        order: options.sort.order,
        limit: options.per_page as u64,
        offset: options.offset(),
    })
}

/// Validate a mutation payload and type its textual values per column
pub fn coerce_record(
    table: &str,
    columns: &[ColumnInfo],
    data: &Record,
) -> Result<Record, DatabaseError> {
    if data.is_empty() {
        return Err(DatabaseError::Validation(format!("no values supplied for {}", table)));
    }

    let mut coerced = Record::with_capacity(data.len());
    for (field, value) in data {
        let column = find_column(columns, field).ok_or_else(|| {
            DatabaseError::Validation(format!("{} has no column '{}'", table, field))
        })?;
        coerced.insert(column.name.clone(), value.clone().coerce_to(column.column_type));
    }
    Ok(coerced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("id", "integer", false, true),
            ColumnInfo::new("name", "text", true, false),
            ColumnInfo::new("age", "integer", true, false),
            ColumnInfo::new("active", "boolean", false, false),
        ]
    }

    #[test]
    fn test_defaults() {
        let options = QueryOptions::default();
        assert_eq!(options.page, 1);
        assert_eq!(options.per_page, 10);
        assert_eq!(options.sort.field, "id");
        assert_eq!(options.sort.order, SortOrder::Asc);
        assert!(options.filter.is_empty());
        assert_eq!(options.offset(), 0);
    }

    #[test]
    fn test_offset() {
        assert_eq!(QueryOptions::default().with_page(3, 25).offset(), 50);
    }

    #[test]
    fn test_from_query_pairs() {
        let options = QueryOptions::from_query_pairs(vec![
            ("page", "2"),
            ("perPage", "5"),
            ("sortField", "name"),
            ("sortOrder", "desc"),
            ("filter.age", "30"),
            ("filter.name", ""),
            ("unrelated", "x"),
        ])
        .unwrap();

        assert_eq!(options.page, 2);
        assert_eq!(options.per_page, 5);
        assert_eq!(options.sort, SortSpec { field: "name".to_string(), order: SortOrder::Desc });
        assert_eq!(options.filter.get("age"), Some(&CellValue::from("30")));
        assert_eq!(options.filter.get("name"), Some(&CellValue::Null));
    }

    #[test]
    fn test_from_query_pairs_rejects_bad_numbers() {
        assert!(QueryOptions::from_query_pairs(vec![("page", "0")]).is_err());
        assert!(QueryOptions::from_query_pairs(vec![("perPage", "ten")]).is_err());
        assert!(QueryOptions::from_query_pairs(vec![("sortOrder", "sideways")]).is_err());
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let options: QueryOptions = serde_json::from_str(
            r#"{"page": 2, "perPage": 20, "sort": {"field": "age", "order": "DESC"}, "filter": {"age": 30}}"#,
        )
        .unwrap();
        assert_eq!(options.per_page, 20);
        assert_eq!(options.sort.order, SortOrder::Desc);
        assert_eq!(options.filter.get("age"), Some(&CellValue::Int(30)));

        let partial: QueryOptions = serde_json::from_str(r#"{"page": 4}"#).unwrap();
        assert_eq!(partial.per_page, DEFAULT_PER_PAGE);
    }

    #[test]
    fn test_plan_listing() {
        let options = QueryOptions::default()
            .with_page(2, 10)
            .with_sort("age", SortOrder::Desc)
            .with_filter("age", "30")
            .with_filter("active", "true")
            .with_filter("name", CellValue::Null);

        let plan = plan_listing("users", &users(), &options).unwrap();
        assert_eq!(plan.sort_field, "age");
        assert_eq!(plan.order, SortOrder::Desc);
        assert_eq!(plan.limit, 10);
        assert_eq!(plan.offset, 10);
        assert_eq!(
            plan.filters,
            vec![
                ("age".to_string(), CellValue::Int(30)),
                ("active".to_string(), CellValue::Bool(true)),
            ]
        );
    }

    #[test]
    fn test_plan_rejects_injected_sort_field() {
        let options = QueryOptions::default().with_sort("id; DROP TABLE users", SortOrder::Asc);
        let err = plan_listing("users", &users(), &options).unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));
    }

    #[test]
    fn test_plan_rejects_unknown_filter() {
        let options = QueryOptions::default().with_filter("1=1 OR name", "x");
        assert!(plan_listing("users", &users(), &options).is_err());
    }

    #[test]
    fn test_plan_rejects_zero_paging() {
        let options = QueryOptions::default().with_page(0, 10);
        assert!(plan_listing("users", &users(), &options).is_err());
        let options = QueryOptions::default().with_page(1, 0);
        assert!(plan_listing("users", &users(), &options).is_err());
    }

    #[test]
    fn test_plan_rejects_offset_overflow() {
        let options = QueryOptions::default().with_page(u32::MAX, u32::MAX);
        assert!(options.offset() > i64::MAX as u64);
        let err = plan_listing("users", &users(), &options).unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));
        assert_eq!(err.status_code(), 400);

        // Large but representable pages still plan
        let options = QueryOptions::default().with_page(u32::MAX, 1000);
        assert!(plan_listing("users", &users(), &options).is_ok());
    }

    #[test]
    fn test_plan_keeps_decimal_filters_textual() {
        let columns = vec![
            ColumnInfo::new("id", "integer", false, true),
            ColumnInfo::new("price", "numeric(10,2)", false, false),
        ];
        let options = QueryOptions::from_query_pairs([("filter.price", "19.99")]).unwrap();
        let plan = plan_listing("items", &columns, &options).unwrap();
        assert_eq!(plan.filters, vec![("price".to_string(), CellValue::from("19.99"))]);
    }

    #[test]
    fn test_default_sort_falls_back_to_primary_key() {
        let columns = vec![
            ColumnInfo::new("name", "text", true, false),
            ColumnInfo::new("code", "varchar(8)", false, true),
        ];
        let plan = plan_listing("countries", &columns, &QueryOptions::default()).unwrap();
        assert_eq!(plan.sort_field, "code");
    }

    #[test]
    fn test_primary_key_column() {
        assert_eq!(primary_key_column(&users()), "id");
        let columns = vec![ColumnInfo::new("sku", "text", false, true)];
        assert_eq!(primary_key_column(&columns), "sku");
        let columns = vec![ColumnInfo::new("name", "text", false, false)];
        assert_eq!(primary_key_column(&columns), "id");
    }

    #[test]
    fn test_coerce_record() {
        let mut data = Record::new();
        data.insert("name".to_string(), CellValue::from("Ann"));
        data.insert("age".to_string(), CellValue::from("30"));
        let coerced = coerce_record("users", &users(), &data).unwrap();
        assert_eq!(coerced.get("age"), Some(&CellValue::Int(30)));
        assert_eq!(coerced.get("name"), Some(&CellValue::from("Ann")));

        assert!(coerce_record("users", &users(), &Record::new()).is_err());

        let mut bad = Record::new();
        bad.insert("nope".to_string(), CellValue::Int(1));
        assert!(coerce_record("users", &users(), &bad).is_err());
    }
}
