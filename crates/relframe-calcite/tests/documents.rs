use relframe_calcite::{fingerprint, to_json, to_request, BuildOptions};
use relframe_ir::PlanDocument;
use serde_json::json;

const SALES_BY_CITY: &str = include_str!("../../../demos/sales_by_city.json");

fn compile_demo() -> Vec<serde_json::Value> {
    let root = PlanDocument::from_json(SALES_BY_CITY).unwrap().build().unwrap();
    let json = to_json(&root, &BuildOptions::default()).unwrap();
    json["rels"].as_array().unwrap().clone()
}

#[test]
fn test_demo_plan_shape() {
    let rels = compile_demo();
    let ops: Vec<_> = rels.iter().map(|r| r["relOp"].as_str().unwrap()).collect();
    assert_eq!(
        ops,
        vec![
            "EnumerableTableScan",
            "LogicalFilter",
            "EnumerableTableScan",
            "LogicalJoin",
            "LogicalProject",
            "LogicalProject",
            "LogicalProject",
            "LogicalAggregate",
            "LogicalSort",
        ]
    );
}

#[test]
fn test_demo_join_reads_past_filtered_row_identity() {
    let rels = compile_demo();

    assert_eq!(rels[1]["condition"]["operands"][1]["operands"][0], json!({ "input": 3 }));
    assert_eq!(rels[1]["condition"]["operands"][1]["operands"][1]["literal"], 1000);

    assert_eq!(rels[3]["inputs"], json!(["1", "2"]));
    assert_eq!(
        rels[3]["condition"]["operands"],
        json!([{ "input": 0 }, { "input": 4 }])
    );
    assert_eq!(
        rels[4]["fields"],
        json!(["city_id", "year_x", "amount", "name", "year_y"])
    );
    assert_eq!(
        rels[4]["exprs"],
        json!([{ "input": 0 }, { "input": 1 }, { "input": 2 }, { "input": 5 }, { "input": 6 }])
    );
}

#[test]
fn test_demo_transform_literals_and_types() {
    let rels = compile_demo();
    let project = &rels[5];
    assert_eq!(project["fields"], json!(["name", "decade", "amount"]));

    let decade = &project["exprs"][1];
    assert_eq!(decade["op"], "FLOOR");
    assert_eq!(decade["type"], json!({ "type": "DECIMAL", "nullable": true, "scale": 0 }));
    assert_eq!(decade["operands"][0]["op"], "/");
    assert_eq!(decade["operands"][0]["operands"][1]["target_type"], "BIGINT");

    let scaled = &project["exprs"][2]["operands"][1];
    assert_eq!(scaled["literal"], 125);
    assert_eq!(scaled["scale"], 2);
    assert_eq!(scaled["precision"], 3);
    assert_eq!(project["exprs"][2]["type"], json!({ "type": "DOUBLE", "nullable": true }));
}

#[test]
fn test_demo_groupby() {
    let rels = compile_demo();
    assert_eq!(
        rels[7]["fields"],
        json!(["name", "decade", "amount sum", "amount mean"])
    );
    assert_eq!(rels[7]["group"], json!([0, 1]));
    assert_eq!(
        rels[8]["collation"],
        json!([
            { "field": 0, "direction": "ASCENDING", "nulls": "LAST" },
            { "field": 1, "direction": "ASCENDING", "nulls": "LAST" }
        ])
    );
}

#[test]
fn test_rebuilt_documents_share_fingerprints() {
    let options = BuildOptions::default();
    let first = PlanDocument::from_json(SALES_BY_CITY).unwrap().build().unwrap();
    let second = PlanDocument::from_json(SALES_BY_CITY).unwrap().build().unwrap();
    assert_ne!(first.id(), second.id());

    let a = to_request(&first, &options).unwrap();
    let b = to_request(&second, &options).unwrap();
    assert_eq!(fingerprint(&a), fingerprint(&b));

    let other = BuildOptions {
        database: "warehouse".to_string(),
    };
    assert_ne!(fingerprint(&a), fingerprint(&to_request(&first, &other).unwrap()));
}
