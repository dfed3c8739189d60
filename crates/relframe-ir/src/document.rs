//! JSON plan documents
//!
//! A document names a list of frames, each defined in terms of frames listed
//! before it, and designates one of them as the root:
//!
//! ```json
//! {
//!   "frames": [
//!     {"name": "t", "op": "scan", "table": "t",
//!      "columns": [{"name": "a", "data_type": "Int64"}, {"name": "c", "data_type": "Int64"}]},
//!     {"name": "g", "op": "group_by", "input": "t", "by": ["a"], "agg": {"c": ["sum", "mean"]}}
//!   ],
//!   "root": "g"
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expr::{Expr, ExprRef, OpKind, Value};
use crate::frame::{
    AggRequest, Frame, GroupByOptions, JoinOptions, JoinType, RowPositions, RowSelection,
};
use crate::{DataType, FieldType, IrError, Schema};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub frames: Vec<FrameDoc>,
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameDoc {
    pub name: String,
    #[serde(flatten)]
    pub op: OpDoc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpDoc {
    Scan {
        table: String,
        columns: Vec<FieldType>,
    },
    Mask {
        input: String,
        rows: RowsDoc,
    },
    GroupBy {
        input: String,
        by: Vec<String>,
        agg: IndexMap<String, AggRequest>,
        #[serde(default = "default_sort")]
        sort: bool,
    },
    Transform {
        input: String,
        exprs: IndexMap<String, ExprDoc>,
        #[serde(default)]
        fold: bool,
    },
    Join {
        left: String,
        right: String,
        #[serde(default)]
        how: JoinType,
        #[serde(default)]
        on: Option<Vec<String>>,
        #[serde(default)]
        sort: bool,
        #[serde(default)]
        suffixes: Option<(String, String)>,
    },
    Union {
        inputs: Vec<String>,
    },
}

fn default_sort() -> bool {
    GroupByOptions::default().sort
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowsDoc {
    Single(i64),
    List(Vec<i64>),
    Range { start: i64, stop: i64 },
    Labels { labels: Vec<serde_json::Value> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExprDoc {
    /// Column of the transform input, or of the named frame
    Column {
        col: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame: Option<String>,
    },
    Literal {
        lit: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dtype: Option<DataType>,
    },
    Op {
        op: OpKind,
        operands: Vec<ExprDoc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dtype: Option<DataType>,
    },
}

impl PlanDocument {
    pub fn from_json(json: &str) -> Result<Self, IrError> {
        serde_json::from_str(json).map_err(|e| IrError::Document(e.to_string()))
    }

    /// Build the frames in order and return the root frame
    pub fn build(&self) -> Result<Arc<Frame>, IrError> {
        let mut frames: HashMap<String, Arc<Frame>> = HashMap::new();

        for doc in &self.frames {
            let frame = doc.op.build(&frames)?;
            if frames.insert(doc.name.clone(), frame).is_some() {
                return Err(IrError::DuplicateFrame(doc.name.clone()));
            }
        }

        lookup(&frames, &self.root).map(Arc::clone)
    }
}

fn lookup<'a>(frames: &'a HashMap<String, Arc<Frame>>, name: &str) -> Result<&'a Arc<Frame>, IrError> {
    frames
        .get(name)
        .ok_or_else(|| IrError::UnknownFrame(name.to_string()))
}

impl OpDoc {
    fn build(&self, frames: &HashMap<String, Arc<Frame>>) -> Result<Arc<Frame>, IrError> {
        match self {
            OpDoc::Scan { table, columns } => {
                Ok(Frame::scan(table.clone(), Schema::new(columns.clone())))
            }
            OpDoc::Mask { input, rows } => {
                Ok(Frame::mask(lookup(frames, input)?, rows.to_selection()?))
            }
            OpDoc::GroupBy { input, by, agg, sort } => Frame::groupby_agg(
                lookup(frames, input)?,
                by.clone(),
                agg.clone(),
                GroupByOptions { sort: *sort },
            ),
            OpDoc::Transform { input, exprs, fold } => {
                let base = lookup(frames, input)?;
                let exprs = exprs
                    .iter()
                    .map(|(name, doc)| Ok((name.clone(), doc.build(base, frames)?)))
                    .collect::<Result<IndexMap<_, _>, IrError>>()?;
                Frame::transform(base, exprs, *fold)
            }
            OpDoc::Join { left, right, how, on, sort, suffixes } => {
                let mut options = JoinOptions {
                    how: *how,
                    on: on.clone(),
                    sort: *sort,
                    ..JoinOptions::default()
                };
                if let Some(suffixes) = suffixes {
                    options.suffixes = suffixes.clone();
                }
                Ok(Frame::join(lookup(frames, left)?, lookup(frames, right)?, options))
            }
            OpDoc::Union { inputs } => {
                let inputs = inputs
                    .iter()
                    .map(|name| lookup(frames, name).map(Arc::clone))
                    .collect::<Result<Vec<_>, _>>()?;
                Frame::union(inputs)
            }
        }
    }
}

impl RowsDoc {
    fn to_selection(&self) -> Result<RowSelection, IrError> {
        Ok(match self {
            RowsDoc::Single(pos) => RowSelection::Positions(RowPositions::Single(*pos)),
            RowsDoc::List(list) => RowSelection::Positions(RowPositions::List(list.clone())),
            RowsDoc::Range { start, stop } => {
                RowSelection::Positions(RowPositions::Range(*start..*stop))
            }
            RowsDoc::Labels { labels } => RowSelection::Labels(
                labels
                    .iter()
                    .map(|v| value_from_json(v, None))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

impl ExprDoc {
    fn build(
        &self,
        base: &Arc<Frame>,
        frames: &HashMap<String, Arc<Frame>>,
    ) -> Result<ExprRef, IrError> {
        match self {
            ExprDoc::Column { col, frame } => {
                let frame = match frame {
                    Some(name) => lookup(frames, name)?,
                    None => base,
                };
                Expr::column(frame, col)
            }
            ExprDoc::Literal { lit, dtype } => Ok(Expr::literal(value_from_json(lit, *dtype)?)),
            ExprDoc::Op { op, operands, dtype } => {
                let operands = operands
                    .iter()
                    .map(|doc| doc.build(base, frames))
                    .collect::<Result<Vec<_>, _>>()?;
                match dtype {
                    Some(dtype) => {
                        // Same arity check, explicit result type
                        let expr = Expr::apply(*op, operands)?;
                        Ok(Expr::op(*op, expr.operands().to_vec(), *dtype))
                    }
                    None => Expr::apply(*op, operands),
                }
            }
        }
    }
}

/// Convert a JSON scalar into a literal, optionally forcing its dtype
pub fn value_from_json(json: &serde_json::Value, dtype: Option<DataType>) -> Result<Value, IrError> {
    use serde_json::Value as Json;

    let invalid = || IrError::Document(format!("cannot read {} as {:?}", json, dtype));

    let value = match (json, dtype) {
        (Json::Null, _) => Value::Null,
        (Json::Bool(b), None | Some(DataType::Bool)) => Value::Bool(*b),
        (Json::String(s), None | Some(DataType::String)) => Value::String(s.clone()),
        (Json::String(s), Some(DataType::Timestamp)) => Value::Timestamp(s.clone()),
        (Json::Number(n), Some(DataType::Int8)) => {
            Value::Int8(n.as_i64().and_then(|v| i8::try_from(v).ok()).ok_or_else(invalid)?)
        }
        (Json::Number(n), Some(DataType::Int16)) => {
            Value::Int16(n.as_i64().and_then(|v| i16::try_from(v).ok()).ok_or_else(invalid)?)
        }
        (Json::Number(n), Some(DataType::Int32)) => {
            Value::Int32(n.as_i64().and_then(|v| i32::try_from(v).ok()).ok_or_else(invalid)?)
        }
        (Json::Number(n), Some(DataType::Int64)) => Value::Int64(n.as_i64().ok_or_else(invalid)?),
        (Json::Number(n), Some(DataType::UInt64)) => Value::UInt64(n.as_u64().ok_or_else(invalid)?),
        (Json::Number(n), Some(DataType::Float32)) => {
            Value::Float32(n.as_f64().ok_or_else(invalid)? as f32)
        }
        (Json::Number(n), Some(DataType::Float64)) => {
            Value::Float64(n.as_f64().ok_or_else(invalid)?)
        }
        (Json::Number(n), None) => match n.as_i64() {
            Some(v) => Value::Int64(v),
            None => Value::Float64(n.as_f64().ok_or_else(invalid)?),
        },
        _ => return Err(invalid()),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogicalOp;

    #[test]
    fn test_build_document() {
        let doc = PlanDocument::from_json(
            r#"{
                "frames": [
                    {"name": "l", "op": "scan", "table": "left",
                     "columns": [{"name": "a", "data_type": "Int64"}, {"name": "b", "data_type": "Float64"}]},
                    {"name": "r", "op": "scan", "table": "right",
                     "columns": [{"name": "a", "data_type": "Int64"}, {"name": "d", "data_type": "Int64"}]},
                    {"name": "j", "op": "join", "left": "l", "right": "r", "on": ["a"], "how": "left"},
                    {"name": "t", "op": "transform", "input": "j",
                     "exprs": {"a": {"col": "a"}, "x": {"op": "add", "operands": [{"col": "b"}, {"lit": 1.5}]}}},
                    {"name": "m", "op": "mask", "input": "l", "rows": {"start": 0, "stop": 2}}
                ],
                "root": "t"
            }"#,
        )
        .unwrap();

        let root = doc.build().unwrap();
        assert_eq!(root.table_cols(), vec!["a", "x"]);
        assert_eq!(root.schema().fields[1].data_type, DataType::Float64);

        let LogicalOp::Join(join) = root.inputs()[0].op() else {
            panic!("expected join input");
        };
        assert_eq!(join.options.how, JoinType::Left);
        assert_eq!(join.options.suffixes, ("_x".to_string(), "_y".to_string()));
    }

    #[test]
    fn test_unknown_and_duplicate_frames() {
        let unknown = PlanDocument::from_json(
            r#"{"frames": [{"name": "u", "op": "union", "inputs": ["nope"]}], "root": "u"}"#,
        )
        .unwrap();
        assert!(matches!(unknown.build(), Err(IrError::UnknownFrame(name)) if name == "nope"));

        let duplicate = PlanDocument::from_json(
            r#"{"frames": [
                {"name": "s", "op": "scan", "table": "t", "columns": []},
                {"name": "s", "op": "scan", "table": "t", "columns": []}
            ], "root": "s"}"#,
        )
        .unwrap();
        assert!(matches!(duplicate.build(), Err(IrError::DuplicateFrame(_))));
    }

    #[test]
    fn test_value_from_json() {
        use serde_json::json;

        assert_eq!(value_from_json(&json!(42), None).unwrap(), Value::Int64(42));
        assert_eq!(value_from_json(&json!(42), Some(DataType::Int32)).unwrap(), Value::Int32(42));
        assert_eq!(value_from_json(&json!(12.5), None).unwrap(), Value::Float64(12.5));
        assert_eq!(value_from_json(&json!(null), None).unwrap(), Value::Null);
        assert!(value_from_json(&json!(300), Some(DataType::Int8)).is_err());
        assert!(value_from_json(&json!([1]), None).is_err());
    }
}
