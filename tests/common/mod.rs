// Shared live-database scenario for the adapter integration tests.
// Each dialect test supplies its own DDL and a connection URL from the environment;
// the test is skipped when the variable is unset.

#![allow(dead_code)]

use admin_db_adapters::{
    CanonicalType, CellValue, DatabaseAdapter, DatabaseError, QueryOptions, Record, SortOrder,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Connection URL from `var`, or `None` (with a note on stderr) when unset
pub fn database_url(var: &str) -> Option<String> {
    init_logging();
    match std::env::var(var) {
        Ok(url) if !url.trim().is_empty() => Some(url),
        _ => {
            eprintln!("skipping: {} is not set", var);
            None
        }
    }
}

/// DDL for a throwaway table, dropped and recreated by each scenario
pub struct ScratchTable {
    pub name: &'static str,
    pub create_sql: String,
    pub drop_sql: String,
}

pub fn record(pairs: &[(&str, CellValue)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub async fn reset_table(adapter: &dyn DatabaseAdapter, table: &ScratchTable) {
    adapter.query(&table.drop_sql, &[]).await.unwrap();
    adapter.query(&table.create_sql, &[]).await.unwrap();
}

pub async fn drop_table(adapter: &dyn DatabaseAdapter, table: &ScratchTable) {
    adapter.query(&table.drop_sql, &[]).await.unwrap();
}

/// Introspection, paging, filtering and CRUD against a freshly created table with
/// `id` (generated primary key), `name` (not null), `age` (nullable int), `active` (boolean, default true)
pub async fn users_scenario(adapter: &dyn DatabaseAdapter, table: &ScratchTable) {
    reset_table(adapter, table).await;
    let name = table.name;

    // Schema introspection
    let tables = adapter.list_tables().await.unwrap();
    assert!(tables.iter().any(|t| t == name), "{} missing from {:?}", name, tables);

    let columns = adapter.get_table_columns(name).await.unwrap();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "age", "active"]);
    assert!(columns[0].is_primary_key);
    assert!(!columns[1].is_primary_key);
    assert_eq!(columns[0].column_type, CanonicalType::Number);
    assert_eq!(columns[1].column_type, CanonicalType::String);
    assert_eq!(columns[3].column_type, CanonicalType::Boolean);
    assert!(!columns[1].is_nullable);
    assert!(columns[2].is_nullable);

    assert!(adapter.get_table_columns("nonexistent_table").await.unwrap().is_empty());

    // Create returns the stored row including the generated key
    let ann = adapter
        .create_record(name, &record(&[("name", "Ann".into()), ("age", 30.into())]))
        .await
        .unwrap();
    assert_eq!(ann.get("name"), Some(&CellValue::from("Ann")));
    assert_eq!(ann.get("age"), Some(&CellValue::Int(30)));
    let ann_id = ann.get("id").cloned().unwrap();
    assert!(ann_id.as_i64().is_some());

    for (person, age) in [("Bob", 25), ("Cy", 30)] {
        adapter
            .create_record(name, &record(&[("name", person.into()), ("age", age.into())]))
            .await
            .unwrap();
    }

    // Fetched row is a superset of what was created
    let fetched = adapter.get_record_by_id(name, &ann_id).await.unwrap();
    for (column, value) in &ann {
        assert_eq!(fetched.get(column), Some(value), "column {}", column);
    }
    // Boolean columns read back as booleans, whatever the dialect stores
    assert_eq!(fetched.get("active"), Some(&CellValue::Bool(true)));

    // Paging does not change the filtered total
    let first_page = QueryOptions::default()
        .with_page(1, 1)
        .with_sort("name", SortOrder::Asc)
        .with_filter("age", 30);
    let page = adapter.get_records(name, &first_page).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].get("name"), Some(&CellValue::from("Ann")));

    let second_page = first_page.clone().with_page(2, 1);
    let page = adapter.get_records(name, &second_page).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].get("name"), Some(&CellValue::from("Cy")));

    // Textual filters are typed against the column
    let textual = QueryOptions::from_query_pairs([("filter.age", "25")]).unwrap();
    let page = adapter.get_records(name, &textual).await.unwrap();
    assert_eq!(page.total, 1);

    let everyone = adapter
        .get_records(name, &QueryOptions::default().with_page(1, 50))
        .await
        .unwrap();
    assert_eq!(everyone.total, 3);
    assert!(everyone.data.len() <= 50);

    // A page past the end is empty but still reports the total
    let beyond = adapter
        .get_records(name, &QueryOptions::default().with_page(99, 10))
        .await
        .unwrap();
    assert!(beyond.data.is_empty());
    assert_eq!(beyond.total, 3);

    // Update returns the stored row; repeating an identical update still matches
    let changes = record(&[("age", 31.into())]);
    let updated = adapter.update_record(name, &ann_id, &changes).await.unwrap();
    assert_eq!(updated.get("age"), Some(&CellValue::Int(31)));
    let again = adapter.update_record(name, &ann_id, &changes).await.unwrap();
    assert_eq!(again.get("age"), Some(&CellValue::Int(31)));

    let missing = CellValue::Int(987_654);
    let err = adapter.update_record(name, &missing, &changes).await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound { .. }), "{}", err);

    // Sort fields are validated against real columns
    let injected = QueryOptions::default().with_sort("id; DROP TABLE users", SortOrder::Desc);
    let err = adapter.get_records(name, &injected).await.unwrap_err();
    assert!(matches!(err, DatabaseError::Validation(_)), "{}", err);

    // Delete, then the row is gone
    adapter.delete_record(name, &ann_id).await.unwrap();
    let err = adapter.get_record_by_id(name, &ann_id).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    let err = adapter.delete_record(name, &ann_id).await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound { .. }));

    drop_table(adapter, table).await;
}

/// Decimal filters and clearing a binary column, against a freshly created table with
/// `id` (generated primary key), `price` (decimal(10,2), not null), `avatar` (nullable binary)
pub async fn decimal_scenario(adapter: &dyn DatabaseAdapter, table: &ScratchTable) {
    reset_table(adapter, table).await;
    let name = table.name;

    let columns = adapter.get_table_columns(name).await.unwrap();
    assert_eq!(columns[1].column_type, CanonicalType::Number);

    let cheap = adapter
        .create_record(
            name,
            &record(&[("price", "19.99".into()), ("avatar", CellValue::Binary(vec![1, 2, 3]))]),
        )
        .await
        .unwrap();
    assert_eq!(cheap.get("price"), Some(&CellValue::Float(19.99)));
    assert_eq!(cheap.get("avatar"), Some(&CellValue::Binary(vec![1, 2, 3])));

    adapter
        .create_record(name, &record(&[("price", CellValue::Float(5.25))]))
        .await
        .unwrap();

    // Query-string filters on a decimal column match exactly
    let by_text = QueryOptions::from_query_pairs([("filter.price", "19.99")]).unwrap();
    let page = adapter.get_records(name, &by_text).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].get("price"), Some(&CellValue::Float(19.99)));

    let by_float = QueryOptions::default().with_filter("price", 5.25);
    assert_eq!(adapter.get_records(name, &by_float).await.unwrap().total, 1);

    // Decimal payloads on update are stored without binary rounding
    let id = cheap.get("id").cloned().unwrap();
    let repriced = adapter
        .update_record(name, &id, &record(&[("price", "0.10".into())]))
        .await
        .unwrap();
    assert_eq!(repriced.get("price"), Some(&CellValue::Float(0.1)));

    // NULL into a binary column
    let cleared = adapter
        .update_record(name, &id, &record(&[("avatar", CellValue::Null)]))
        .await
        .unwrap();
    assert_eq!(cleared.get("avatar"), Some(&CellValue::Null));

    drop_table(adapter, table).await;
}

/// Connect, detect the dialect from the URL, and close twice
pub async fn connection_lifecycle(adapter: &dyn DatabaseAdapter) {
    assert!(!adapter.is_connected().await);
    adapter.connect().await.unwrap();
    // Connecting again keeps the existing pool
    adapter.connect().await.unwrap();
    assert!(adapter.is_connected().await);
    assert!(adapter.get_table_columns("nonexistent_table").await.unwrap().is_empty());

    adapter.disconnect().await.unwrap();
    adapter.disconnect().await.unwrap();
    assert!(!adapter.is_connected().await);
    assert!(matches!(adapter.list_tables().await, Err(DatabaseError::NotConnected)));
}
