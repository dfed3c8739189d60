//! Calcite relational algebra → JSON request
//!
//! Literal encodings follow the consuming engine's conventions exactly,
//! including the "not applicable" scale marker [`UNSET_SCALE`].

use relframe_ir::{AggregateExpr, DataType, Expr, OpExpr, OpKind, Value};
use serde_json::{json, Map, Value as Json};

use crate::algebra::{Collation, NodeId, Plan, RelNode};
use crate::error::CompileError;

/// Scale and type scale of literals without a decimal scale
pub const UNSET_SCALE: i32 = i32::MIN;

/// Stateless serializer producing `{"rels": [...]}`
#[derive(Debug, Default, Clone, Copy)]
pub struct CalciteSerializer;

impl CalciteSerializer {
    pub fn serialize(&self, plan: &Plan) -> Result<Json, CompileError> {
        let mut rels = Vec::with_capacity(plan.len());
        let mut prev: Option<NodeId> = None;
        for node in plan.iter() {
            rels.push(self.serialize_node(node, prev)?);
            prev = Some(node.id());
        }
        Ok(json!({ "rels": rels }))
    }

    pub fn serialize_node(&self, node: &RelNode, prev: Option<NodeId>) -> Result<Json, CompileError> {
        let mut obj = Map::new();
        obj.insert("id".into(), json!(node.id().to_string()));
        obj.insert("relOp".into(), json!(node.rel_op()));

        // Single-input nodes read the previous node unless told otherwise
        let implicit_input = |obj: &mut Map<String, Json>, input: NodeId| {
            if prev != Some(input) {
                obj.insert("inputs".into(), json!([input.to_string()]));
            }
        };

        match node {
            RelNode::Scan(scan) => {
                obj.insert("table".into(), json!(scan.table));
                obj.insert("fieldNames".into(), json!(scan.field_names));
                obj.insert("inputs".into(), json!([]));
            }
            RelNode::Project(project) => {
                implicit_input(&mut obj, project.input);
                obj.insert("fields".into(), json!(project.fields));
                let exprs = project
                    .exprs
                    .iter()
                    .map(|e| self.serialize_expr(e))
                    .collect::<Result<Vec<_>, _>>()?;
                obj.insert("exprs".into(), Json::Array(exprs));
            }
            RelNode::Filter(filter) => {
                implicit_input(&mut obj, filter.input);
                obj.insert("condition".into(), self.serialize_expr(&filter.condition)?);
            }
            RelNode::Aggregate(agg) => {
                implicit_input(&mut obj, agg.input);
                obj.insert("fields".into(), json!(agg.fields));
                obj.insert("group".into(), json!(agg.group));
                let aggs = agg
                    .aggs
                    .iter()
                    .map(|a| self.serialize_aggregate(a))
                    .collect::<Result<Vec<_>, _>>()?;
                obj.insert("aggs".into(), Json::Array(aggs));
            }
            RelNode::Sort(sort) => {
                implicit_input(&mut obj, sort.input);
                let collation: Vec<Json> = sort.collation.iter().map(serialize_collation).collect();
                obj.insert("collation".into(), Json::Array(collation));
            }
            RelNode::Join(join) => {
                obj.insert(
                    "inputs".into(),
                    json!([join.inputs[0].to_string(), join.inputs[1].to_string()]),
                );
                obj.insert("joinType".into(), json!(join.join_type.as_str()));
                obj.insert("condition".into(), self.serialize_expr(&join.condition)?);
            }
            RelNode::Union(union) => {
                let inputs: Vec<String> = union.inputs.iter().map(NodeId::to_string).collect();
                obj.insert("inputs".into(), json!(inputs));
                obj.insert("all".into(), json!(union.all));
            }
        }

        Ok(Json::Object(obj))
    }

    pub fn serialize_expr(&self, expr: &Expr) -> Result<Json, CompileError> {
        match expr {
            Expr::Literal(value) => self.serialize_literal(value),
            Expr::InputRef { index, .. } => Ok(json!({ "input": index })),
            Expr::InputIdx { index, .. } => Ok(json!(index)),
            Expr::Op(op) => self.serialize_op(op),
            Expr::Aggregate(agg) => self.serialize_aggregate(agg),
            Expr::Column(col) => Err(CompileError::Serialization(format!(
                "Can not serialize unresolved column reference {:?}",
                col
            ))),
        }
    }

    fn serialize_op(&self, op: &OpExpr) -> Result<Json, CompileError> {
        let operands = op
            .operands
            .iter()
            .map(|e| self.serialize_expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({
            "op": op.op.as_str(),
            "operands": operands,
            "type": self.serialize_dtype(op.dtype, op.op == OpKind::Floor)?,
        }))
    }

    fn serialize_aggregate(&self, agg: &AggregateExpr) -> Result<Json, CompileError> {
        let operands = agg
            .operands
            .iter()
            .map(|e| self.serialize_expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({
            "agg": agg.func.calcite_name(),
            "operands": operands,
            "distinct": agg.distinct,
            "type": self.serialize_dtype(aggregate_dtype(agg.dtype), false)?,
        }))
    }

    /// Engine type of an expression result.
    ///
    /// Integral FLOOR results are typed as zero-scale DECIMAL.
    pub fn serialize_dtype(&self, dtype: DataType, force_decimal: bool) -> Result<Json, CompileError> {
        if force_decimal && dtype.is_integer() {
            return Ok(json!({ "type": "DECIMAL", "nullable": true, "scale": 0 }));
        }
        Ok(json!({ "type": type_name(dtype)?, "nullable": true }))
    }

    pub fn serialize_literal(&self, value: &Value) -> Result<Json, CompileError> {
        match value {
            Value::Null => Ok(json!({
                "literal": null,
                "type": "NULL",
                "target_type": "BIGINT",
                "scale": 0,
                "precision": 19,
                "type_scale": 0,
                "type_precision": 19,
            })),
            Value::String(s) => {
                let len = s.chars().count();
                Ok(json!({
                    "literal": s,
                    "type": "CHAR",
                    "target_type": "CHAR",
                    "scale": UNSET_SCALE,
                    "precision": len,
                    "type_scale": UNSET_SCALE,
                    "type_precision": len,
                }))
            }
            Value::Int8(v) => Ok(int_literal(i64::from(*v), DataType::Int8)),
            Value::Int16(v) => Ok(int_literal(i64::from(*v), DataType::Int16)),
            Value::Int32(v) => Ok(int_literal(i64::from(*v), DataType::Int32)),
            Value::Int64(v) => Ok(int_literal(*v, DataType::Int64)),
            Value::Float32(v) => float_literal(v.to_string(), v.is_finite()),
            Value::Float64(v) => float_literal(v.to_string(), v.is_finite()),
            Value::Bool(b) => Ok(json!({
                "literal": b,
                "type": "BOOLEAN",
                "target_type": "BOOLEAN",
                "scale": UNSET_SCALE,
                "precision": 1,
                "type_scale": UNSET_SCALE,
                "type_precision": 1,
            })),
            other => Err(CompileError::Serialization(format!(
                "Can not serialize {} literal",
                other.kind()
            ))),
        }
    }
}

fn serialize_collation(collation: &Collation) -> Json {
    json!({
        "field": collation.field,
        "direction": Collation::DIRECTION,
        "nulls": Collation::NULLS,
    })
}

/// Engine type name of a column or expression type
pub fn type_name(dtype: DataType) -> Result<&'static str, CompileError> {
    match dtype {
        DataType::Int8 => Ok("TINYINT"),
        DataType::Int16 => Ok("SMALLINT"),
        DataType::Int32 => Ok("INTEGER"),
        DataType::Int64 => Ok("BIGINT"),
        DataType::Bool => Ok("BOOLEAN"),
        DataType::Float32 | DataType::Float64 => Ok("DOUBLE"),
        other => Err(CompileError::Serialization(format!(
            "Unsupported column type {}",
            other
        ))),
    }
}

/// Aggregates over columns the engine has no type name for are typed as
/// BIGINT; the engine infers the actual result type from the column.
fn aggregate_dtype(dtype: DataType) -> DataType {
    if type_name(dtype).is_ok() {
        dtype
    } else {
        DataType::Int64
    }
}

/// Target type and its precision for each integer width
fn int_target(dtype: DataType) -> (&'static str, u32) {
    match dtype {
        DataType::Int8 => ("TINYINT", 3),
        DataType::Int16 => ("SMALLINT", 5),
        DataType::Int32 => ("INTEGER", 10),
        _ => ("BIGINT", 19),
    }
}

fn int_literal(value: i64, dtype: DataType) -> Json {
    let (target_type, type_precision) = int_target(dtype);
    json!({
        "literal": value,
        "type": "DECIMAL",
        "target_type": target_type,
        "scale": 0,
        "precision": value.to_string().len(),
        "type_scale": 0,
        "type_precision": type_precision,
    })
}

/// DECIMAL literal from the shortest decimal rendering of a float.
///
/// Precision counts the printed characters other than the point, sign included.
fn float_literal(mut text: String, finite: bool) -> Result<Json, CompileError> {
    if !finite {
        return Err(CompileError::Serialization(format!(
            "Can not serialize non-finite float {}",
            text
        )));
    }
    if !text.contains('.') {
        text.push_str(".0");
    }

    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let negative = whole.starts_with('-');
    let digits = format!("{}{}", whole.trim_start_matches('-'), fraction);

    let unscaled: i64 = digits.parse().map_err(|_| {
        CompileError::Serialization(format!("Float {} does not fit a 64-bit decimal", text))
    })?;

    Ok(json!({
        "literal": if negative { -unscaled } else { unscaled },
        "type": "DECIMAL",
        "target_type": "DOUBLE",
        "scale": fraction.len(),
        "precision": digits.len() + usize::from(negative),
        "type_scale": UNSET_SCALE,
        "type_precision": 15,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn literal(value: impl Into<Value>) -> Json {
        CalciteSerializer.serialize_literal(&value.into()).unwrap()
    }

    #[test]
    fn test_null_literal() {
        assert_eq!(
            literal(Value::Null),
            json!({
                "literal": null,
                "type": "NULL",
                "target_type": "BIGINT",
                "scale": 0,
                "precision": 19,
                "type_scale": 0,
                "type_precision": 19
            })
        );
    }

    #[test]
    fn test_string_literal_uses_unset_scale() {
        let json = literal("héllo");
        assert_eq!(json["type"], "CHAR");
        assert_eq!(json["precision"], 5);
        assert_eq!(json["type_precision"], 5);
        assert_eq!(json["scale"], json!(-2147483648i64));
        assert_eq!(json["type_scale"], json!(-2147483648i64));
    }

    #[test]
    fn test_int_literal_widths() {
        let json = literal(42i32);
        assert_eq!(json["literal"], 42);
        assert_eq!(json["type"], "DECIMAL");
        assert_eq!(json["target_type"], "INTEGER");
        assert_eq!(json["scale"], 0);
        assert_eq!(json["precision"], 2);
        assert_eq!(json["type_precision"], 10);

        assert_eq!(literal(-7i8)["target_type"], "TINYINT");
        assert_eq!(literal(-7i8)["type_precision"], 3);
        assert_eq!(literal(-7i8)["precision"], 2);
        assert_eq!(literal(-7i64)["precision"], 2);
        assert_eq!(literal(300i16)["target_type"], "SMALLINT");
        assert_eq!(literal(1i64 << 40)["type_precision"], 19);
    }

    #[test]
    fn test_float_literal() {
        let json = literal(12.5f64);
        assert_eq!(json["literal"], 125);
        assert_eq!(json["scale"], 1);
        assert_eq!(json["precision"], 3);
        assert_eq!(json["target_type"], "DOUBLE");
        assert_eq!(json["type_scale"], json!(UNSET_SCALE));
        assert_eq!(json["type_precision"], 15);

        let whole = literal(3.0f64);
        assert_eq!((whole["literal"].clone(), whole["scale"].clone()), (json!(30), json!(1)));

        let negative = literal(-0.25f64);
        assert_eq!(negative["literal"], -25);
        assert_eq!(negative["scale"], 2);
        assert_eq!(negative["precision"], 4);

        let negative = literal(-12.5f64);
        assert_eq!(negative["literal"], -125);
        assert_eq!(negative["precision"], 4);
    }

    #[test]
    fn test_float_literal_rejects_non_finite() {
        let err = CalciteSerializer.serialize_literal(&Value::Float64(f64::NAN)).unwrap_err();
        assert!(matches!(err, CompileError::Serialization(_)));
        assert!(CalciteSerializer.serialize_literal(&Value::Float64(1e300)).is_err());
    }

    #[test]
    fn test_bool_literal() {
        let json = literal(true);
        assert_eq!(json["literal"], true);
        assert_eq!(json["type"], "BOOLEAN");
        assert_eq!(json["precision"], 1);
        assert_eq!(json["scale"], json!(UNSET_SCALE));
    }

    #[test]
    fn test_unsupported_literals() {
        for value in [Value::UInt64(1), Value::Bytes(vec![1]), Value::Timestamp("2020-01-01".into())] {
            assert!(matches!(
                CalciteSerializer.serialize_literal(&value),
                Err(CompileError::Serialization(_))
            ));
        }
    }

    #[test]
    fn test_floor_forces_decimal() {
        let s = CalciteSerializer;
        assert_eq!(
            s.serialize_dtype(DataType::Int64, true).unwrap(),
            json!({ "type": "DECIMAL", "nullable": true, "scale": 0 })
        );
        assert_eq!(
            s.serialize_dtype(DataType::Float64, true).unwrap(),
            json!({ "type": "DOUBLE", "nullable": true })
        );
        assert!(s.serialize_dtype(DataType::String, false).is_err());
        assert_eq!(
            s.serialize_dtype(DataType::Float32, false).unwrap(),
            json!({ "type": "DOUBLE", "nullable": true })
        );
    }

    #[test]
    fn test_aggregate_over_untyped_column_falls_back_to_bigint() {
        assert_eq!(aggregate_dtype(DataType::String), DataType::Int64);
        assert_eq!(aggregate_dtype(DataType::UInt32), DataType::Int64);
        assert_eq!(aggregate_dtype(DataType::Float64), DataType::Float64);
    }
}
