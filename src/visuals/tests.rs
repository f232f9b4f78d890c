use super::*;

fn sample_spec(kind: ChartKind) -> ChartSpec {
    ChartSpec {
        task: "Compare market caps".to_string(),
        kind,
        title: "Market Cap by Company".to_string(),
        x_label: "Company".to_string(),
        y_label: "Market Cap (T)".to_string(),
        labels: vec!["Acme".to_string(), "Globex".to_string(), "Initech".to_string()],
        values: vec![3.94, 2.1, 0.8],
    }
}

#[test]
fn parses_a_full_spec() {
    let raw = r#"{
        "task": "Compare market caps",
        "kind": "bar",
        "title": "Market Cap by Company",
        "x_label": "Company",
        "y_label": "Market Cap (T)",
        "labels": ["Acme", "Globex"],
        "values": [3.94, 2.1]
    }"#;

    let spec = parse_chart_spec(raw).unwrap();
    assert_eq!(spec.kind, ChartKind::Bar);
    assert_eq!(spec.labels.len(), 2);
    assert_eq!(spec.values, vec![3.94, 2.1]);
}

#[test]
fn parses_a_fenced_spec_with_defaults() {
    let raw = "```json\n{\"kind\": \"pie\", \"labels\": [\"A\"], \"values\": [1.0]}\n```";
    let spec = parse_chart_spec(raw).unwrap();
    assert_eq!(spec.kind, ChartKind::Pie);
    assert_eq!(spec.task, "Visualization");
    assert_eq!(spec.title, "");
}

#[test]
fn rejects_unknown_chart_kinds() {
    let raw = r#"{"kind": "scatter3d", "labels": ["A"], "values": [1.0]}"#;
    assert!(matches!(parse_chart_spec(raw), Err(WebRagError::Llm(_))));
}

#[test]
fn rejects_non_json_replies() {
    assert!(matches!(
        parse_chart_spec("here is your chart!"),
        Err(WebRagError::Llm(_))
    ));
}

#[test]
fn validation_rejects_mismatched_lengths() {
    let spec = ChartSpec {
        values: vec![1.0],
        ..sample_spec(ChartKind::Bar)
    };
    assert!(spec.validate().is_err());
}

#[test]
fn validation_rejects_empty_data() {
    let spec = ChartSpec {
        labels: Vec::new(),
        values: Vec::new(),
        ..sample_spec(ChartKind::Bar)
    };
    assert!(spec.validate().is_err());
}

#[test]
fn validation_rejects_non_finite_values() {
    let spec = ChartSpec {
        values: vec![1.0, f64::NAN, 2.0],
        ..sample_spec(ChartKind::Line)
    };
    assert!(spec.validate().is_err());
}

#[test]
fn validation_rejects_non_positive_pie_slices() {
    let spec = ChartSpec {
        values: vec![3.0, 0.0, 1.0],
        ..sample_spec(ChartKind::Pie)
    };
    assert!(spec.validate().is_err());
}

#[test]
fn negative_values_are_fine_outside_pie_charts() {
    let spec = ChartSpec {
        values: vec![3.0, -1.5, 1.0],
        ..sample_spec(ChartKind::Bar)
    };
    assert!(spec.validate().is_ok());
}

#[test]
fn renders_bar_charts_to_png() {
    let png = render_chart_png(&sample_spec(ChartKind::Bar)).unwrap();
    assert_eq!(&png[..4], b"\x89PNG");
}

#[test]
fn renders_line_charts_to_png() {
    let png = render_chart_png(&sample_spec(ChartKind::Line)).unwrap();
    assert_eq!(&png[..4], b"\x89PNG");
}

#[test]
fn renders_pie_charts_to_png() {
    let png = render_chart_png(&sample_spec(ChartKind::Pie)).unwrap();
    assert_eq!(&png[..4], b"\x89PNG");
}

#[test]
fn single_point_line_chart_does_not_panic() {
    let spec = ChartSpec {
        labels: vec!["Only".to_string()],
        values: vec![5.0],
        ..sample_spec(ChartKind::Line)
    };
    assert!(render_chart_png(&spec).is_ok());
}

#[test]
fn y_range_spans_zero_with_headroom() {
    let (min, max) = y_range(&[2.0, 8.0]);
    assert_eq!(min, 0.0);
    assert!(max > 8.0);

    let (min, max) = y_range(&[-4.0, 8.0]);
    assert!(min < -4.0);
    assert!(max > 8.0);
}
