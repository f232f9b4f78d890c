use super::*;
use serde_json::json;

fn rows_from(value: Value) -> Vec<Map<String, Value>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => row,
                _ => panic!("expected object row"),
            })
            .collect(),
        _ => panic!("expected array"),
    }
}

#[test]
fn parses_a_plain_json_array() {
    let rows = parse_table_rows(r#"[{"Company": "Acme", "Revenue": 12.5}]"#).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Company"], json!("Acme"));
    assert_eq!(rows[0]["Revenue"], json!(12.5));
}

#[test]
fn parses_a_fenced_json_array() {
    let fenced = "```json\n[{\"Metric\": \"EPS\", \"Value\": 3.1}]\n```";
    let rows = parse_table_rows(fenced).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Metric"], json!("EPS"));
}

#[test]
fn rejects_non_array_replies() {
    assert!(matches!(
        parse_table_rows(r#"{"Company": "Acme"}"#),
        Err(WebRagError::Llm(_))
    ));
}

#[test]
fn rejects_empty_arrays() {
    assert!(matches!(parse_table_rows("[]"), Err(WebRagError::Llm(_))));
}

#[test]
fn rejects_arrays_of_non_objects() {
    assert!(matches!(
        parse_table_rows("[1, 2, 3]"),
        Err(WebRagError::Llm(_))
    ));
}

#[test]
fn rejects_unparseable_text() {
    assert!(matches!(
        parse_table_rows("here is your table: | a | b |"),
        Err(WebRagError::Llm(_))
    ));
}

#[test]
fn builds_a_valid_xlsx_file() {
    let rows = rows_from(json!([
        {"Company": "Acme", "Revenue": 12.5, "Public": true},
        {"Company": "Globex", "Revenue": 8.25, "Public": false}
    ]));

    let encoded = build_excel_base64(&rows).unwrap();
    let bytes = BASE64.decode(encoded).unwrap();
    // xlsx files are zip archives; check the magic.
    assert_eq!(&bytes[..2], b"PK");
}

#[test]
fn strips_markdown_bold_from_headers() {
    let rows = rows_from(json!([{"**Revenue**": 1.0}]));
    // The cleaned header must not error out and the file must still build.
    assert!(build_excel_base64(&rows).is_ok());
}

#[test]
fn handles_missing_cells_across_rows() {
    let rows = rows_from(json!([
        {"Company": "Acme", "Revenue": 12.5},
        {"Company": "Globex", "Employees": 300}
    ]));
    assert!(build_excel_base64(&rows).is_ok());
}

#[test]
fn column_order_follows_first_appearance() {
    let rows = rows_from(json!([
        {"B": 1, "A": 2},
        {"C": 3, "A": 4}
    ]));
    assert_eq!(column_order(&rows), vec!["B", "A", "C"]);
}
