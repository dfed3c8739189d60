//! Plan documents built into frame DAGs

use relframe_ir::{DataType, IrError, LogicalOp, PlanDocument};

const SALES_BY_CITY: &str = include_str!("../../../demos/sales_by_city.json");

#[test]
fn test_demo_document_schema() {
    let document = PlanDocument::from_json(SALES_BY_CITY).unwrap();
    let root = document.build().unwrap();

    assert_eq!(root.table_cols(), vec!["name", "decade", "amount sum", "amount mean"]);
    let dtypes: Vec<_> = root.schema().fields.iter().map(|f| f.data_type).collect();
    assert_eq!(
        dtypes,
        vec![DataType::String, DataType::Int64, DataType::Float64, DataType::Float64]
    );

    let sources: Vec<_> = root
        .collect_frames()
        .iter()
        .map(|f| match f.op() {
            LogicalOp::Scan(scan) => scan.table.clone(),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(sources, vec!["sales", "cities"]);
}

#[test]
fn test_demo_join_suffixes_conflicting_columns() {
    let root = PlanDocument::from_json(SALES_BY_CITY).unwrap().build().unwrap();

    let mut joined = None;
    root.walk_dfs(&mut |f| {
        if matches!(f.op(), LogicalOp::Join(_)) {
            joined = Some(f.table_cols().iter().map(|c| c.to_string()).collect::<Vec<_>>());
        }
    });
    assert_eq!(
        joined.unwrap(),
        vec!["city_id", "year_x", "amount", "name", "year_y"]
    );
}

#[test]
fn test_unknown_root() {
    let text = r#"{
        "frames": [
            { "name": "t", "op": "scan", "table": "t", "columns": [{ "name": "a", "data_type": "Int64" }] }
        ],
        "root": "missing"
    }"#;
    let err = PlanDocument::from_json(text).unwrap().build().unwrap_err();
    assert!(matches!(err, IrError::UnknownFrame(ref name) if name == "missing"));
}
