//! Tests for tables and filter expressions

use super::*;
use arrow::datatypes::DataType;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use test_case::test_case;

fn cities() -> Table {
    Table::from_records(vec![
        json!({"city": "Paris", "population": 2100000, "country": "FR", "capital": true}),
        json!({"city": "Lyon", "population": 513000, "country": "FR", "capital": false}),
        json!({"city": "Berlin", "population": 3600000, "country": "DE", "capital": true}),
        json!({"city": "Hamburg", "population": 1800000.5, "country": "DE"}),
    ])
    .unwrap()
}

fn city_names(table: &Table) -> Vec<String> {
    table
        .column("city")
        .unwrap()
        .into_iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Table
// ============================================================================

#[test]
fn test_from_records_columns_in_first_seen_order() {
    let table = Table::from_records(vec![json!({"b": 1, "a": 2}), json!({"c": 3, "a": 4})]).unwrap();
    assert_eq!(table.columns(), &["b", "a", "c"]);
    assert_eq!(table.shape(), (2, 3));
    assert_eq!(table.column("b").unwrap(), vec![&json!(1), &Value::Null]);
    assert!(table.column("missing").is_none());
}

#[test]
fn test_from_records_rejects_scalars() {
    let err = Table::from_records(vec![json!({"a": 1}), json!(2)]).unwrap_err();
    assert!(err.to_string().contains("record 1"));
}

#[test]
fn test_from_rows() {
    let table = Table::from_rows(
        vec!["id".into(), "name".into()],
        vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]],
    )
    .unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(
        table.into_records(),
        vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})]
    );

    assert!(Table::from_rows(vec!["id".into()], vec![vec![]]).is_err());
}

#[test_case(0, Some(2), &["Paris", "Lyon"] ; "first page")]
#[test_case(2, Some(10), &["Berlin", "Hamburg"] ; "limit past end")]
#[test_case(1, None, &["Lyon", "Berlin", "Hamburg"] ; "no limit")]
#[test_case(10, Some(2), &[] ; "offset past end")]
#[test_case(0, Some(0), &[] ; "zero limit")]
fn test_slice(offset: usize, limit: Option<usize>, expected: &[&str]) {
    let table = cities();
    let slice = table.slice(offset, limit);
    assert_eq!(slice.columns(), table.columns());
    assert_eq!(city_names(&slice), expected);
}

#[test]
fn test_query() {
    let table = cities().query("country == 'FR' and population > 1000000").unwrap();
    assert_eq!(city_names(&table), vec!["Paris"]);
}

// ============================================================================
// Filter expressions
// ============================================================================

#[test_case("country == 'DE'", &["Berlin", "Hamburg"] ; "equality")]
#[test_case("country != 'DE'", &["Paris", "Lyon"] ; "inequality")]
#[test_case("population >= 1800000", &["Paris", "Berlin", "Hamburg"] ; "numeric ge")]
#[test_case("population < 1800001", &["Lyon", "Hamburg"] ; "mixed int float")]
#[test_case("city in ['Paris', 'Berlin']", &["Paris", "Berlin"] ; "in list")]
#[test_case("city not in ['Paris', 'Berlin']", &["Lyon", "Hamburg"] ; "not in list")]
#[test_case("capital", &["Paris", "Berlin"] ; "truthy column")]
#[test_case("~capital", &["Lyon", "Hamburg"] ; "negated missing is true")]
#[test_case("country == 'FR' | city == 'Berlin'", &["Paris", "Lyon", "Berlin"] ; "symbol or")]
#[test_case("not (country == 'FR' or capital == true)", &["Hamburg"] ; "grouping")]
#[test_case("capital == None", &["Hamburg"] ; "null literal")]
#[test_case("'Lyon' == city", &["Lyon"] ; "literal on the left")]
fn test_filter_expressions(expression: &str, expected: &[&str]) {
    let table = cities().query(expression).unwrap();
    assert_eq!(city_names(&table), expected);
}

#[test]
fn test_and_binds_tighter_than_or() {
    let expr = Expr::parse("a == 1 or b == 2 and c == 3").unwrap();
    assert!(matches!(expr, Expr::Or(_, _)));
}

#[test]
fn test_backticked_and_nested_identifiers() {
    let table = Table::from_records(vec![
        json!({"country code": "FR", "user": {"name": "ann"}}),
        json!({"country code": "DE", "user": {"name": "bob"}}),
    ])
    .unwrap();

    let filtered = table.clone().query("`country code` == \"FR\"").unwrap();
    assert_eq!(filtered.len(), 1);

    let filtered = table.query("user.name == 'bob'").unwrap();
    assert_eq!(filtered.rows()[0]["country code"], json!("DE"));
}

#[test]
fn test_negative_numbers_and_escapes() {
    let expr = Expr::parse("delta > -2.5 and name == 'O\\'Brien'").unwrap();
    let row = json!({"delta": -1, "name": "O'Brien"});
    assert!(expr.evaluate(row.as_object().unwrap()));
}

#[test]
fn test_mismatched_types_never_order() {
    let expr = Expr::parse("age > 'ten'").unwrap();
    assert!(!expr.evaluate(json!({"age": 12}).as_object().unwrap()));
}

#[test_case("" ; "empty")]
#[test_case("city ==" ; "missing operand")]
#[test_case("(city == 'a'" ; "unclosed paren")]
#[test_case("city == 'a" ; "unterminated string")]
#[test_case("city = 'a'" ; "single equals")]
#[test_case("city in [a]" ; "column in list")]
#[test_case("a == 1 b" ; "trailing tokens")]
fn test_parse_errors(expression: &str) {
    let err = Expr::parse(expression).unwrap_err();
    assert!(matches!(err, crate::Error::Filter { .. }), "{err}");
}

#[test]
fn test_nesting_limit() {
    let deep_parens = format!("{}a == 1{}", "(".repeat(200_000), ")".repeat(200_000));
    let err = Expr::parse(&deep_parens).unwrap_err();
    assert!(err.to_string().contains("nested too deeply"), "{err}");

    let deep_not = format!("{}flag", "not ".repeat(100_000));
    let err = Expr::parse(&deep_not).unwrap_err();
    assert!(err.to_string().contains("nested too deeply"), "{err}");

    let long_chain = vec!["a == 1"; 100_000].join(" or ");
    let err = Expr::parse(&long_chain).unwrap_err();
    assert!(err.to_string().contains("nested too deeply"), "{err}");

    let shallow = format!("{}a == 1{}", "(".repeat(100), ")".repeat(100));
    assert!(Expr::parse(&shallow).is_ok());

    let chain = vec!["a == 1"; 200].join(" and ");
    let expr = Expr::parse(&chain).unwrap();
    assert!(expr.evaluate(json!({"a": 1}).as_object().unwrap()));
}

#[test]
fn test_to_mongo() {
    let expr = Expr::parse("city == 'Paris' and (age >= 18 or role in ['admin'])").unwrap();
    assert_eq!(
        expr.to_mongo().unwrap(),
        json!({"$and": [
            {"city": {"$eq": "Paris"}},
            {"$or": [{"age": {"$gte": 18}}, {"role": {"$in": ["admin"]}}]}
        ]})
    );
}

#[test]
fn test_to_mongo_flips_and_negates() {
    assert_eq!(
        Expr::parse("18 < age").unwrap().to_mongo().unwrap(),
        json!({"age": {"$gt": 18}})
    );
    assert_eq!(
        Expr::parse("not active").unwrap().to_mongo().unwrap(),
        json!({"$nor": [{"active": {"$eq": true}}]})
    );
    assert_eq!(
        Expr::parse("start < end").unwrap().to_mongo().unwrap(),
        json!({"$expr": {"$lt": ["$start", "$end"]}})
    );
    assert!(Expr::parse("'a' in tags").unwrap().to_mongo().is_err());
}

// ============================================================================
// Arrow / Parquet
// ============================================================================

#[test]
fn test_record_batch_types_follow_columns() {
    let batch = table_to_record_batch(&cities()).unwrap();
    let schema = batch.schema();
    let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names, vec!["city", "population", "country", "capital"]);
    assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
    assert_eq!(schema.field(1).data_type(), &DataType::Float64);
    assert_eq!(schema.field(3).data_type(), &DataType::Boolean);
    assert_eq!(batch.num_rows(), 4);
}

#[test]
fn test_record_batch_nested_values_as_text() {
    let table = Table::from_records(vec![json!({"tags": ["a", "b"], "n": null})]).unwrap();
    let batch = table_to_record_batch(&table).unwrap();
    assert_eq!(batch.schema().field(0).data_type(), &DataType::Utf8);
    assert_eq!(batch.schema().field(1).data_type(), &DataType::Null);
}

#[test]
fn test_write_parquet() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out/cities.parquet");

    let rows = write_parquet(&cities(), &path).unwrap();
    assert_eq!(rows, 4);
    assert!(path.exists());

    let file = std::fs::File::open(&path).unwrap();
    let reader = parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap();
    let total: usize = reader.map(|b| b.unwrap().num_rows()).sum();
    assert_eq!(total, 4);
}

#[test]
fn test_write_parquet_reports_unwritable_path() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("taken");
    std::fs::write(&blocker, "not a directory").unwrap();

    let path = blocker.join("cities.parquet");
    let err = write_parquet(&cities(), &path).unwrap_err();
    assert!(err.to_string().contains("taken"), "{err}");
}

#[test]
fn test_record_batch_keeps_rows_without_columns() {
    let table = Table::from_records(vec![json!({}), json!({}), json!({})]).unwrap();
    assert!(table.columns().is_empty());

    let batch = table_to_record_batch(&table).unwrap();
    assert_eq!(batch.num_columns(), 0);
    assert_eq!(batch.num_rows(), 3);
}

#[test]
fn test_empty_table_batch() {
    let batch = table_to_record_batch(&Table::new()).unwrap();
    assert_eq!(batch.num_rows(), 0);
    assert_eq!(batch.num_columns(), 0);
}
