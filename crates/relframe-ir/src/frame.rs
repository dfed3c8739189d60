//! DataFrame algebra: frames and the logical operators producing them
//!
//! A [`Frame`] is an immutable relation identified by its [`FrameId`], not by
//! its contents. Every logical operation produces a new frame whose operator
//! holds its input frames, so a query is a DAG rooted at the result frame.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expr::{ExprRef, Value};
use crate::fold::translate_exprs_to_base;
use crate::{DataType, FieldType, IrError, Schema};

/// Pseudo-column addressing the row position of a scanned frame
pub const ROWID_COLUMN: &str = "__rowid__";

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u64);

impl FrameId {
    fn next() -> Self {
        FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

pub struct Frame {
    id: FrameId,
    schema: Schema,
    op: LogicalOp,
}

/// Logical operator producing a frame
#[derive(Debug, Clone)]
pub enum LogicalOp {
    Scan(ScanOp),
    Mask(MaskOp),
    GroupByAgg(GroupByAggOp),
    Transform(TransformOp),
    Join(JoinOp),
    Union(UnionOp),
}

/// Source relation materialized in the engine under `table`
#[derive(Debug, Clone)]
pub struct ScanOp {
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct MaskOp {
    pub input: Arc<Frame>,
    pub rows: RowSelection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowSelection {
    /// Select by index label values
    Labels(Vec<Value>),
    /// Select by row position
    Positions(RowPositions),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowPositions {
    Single(i64),
    Range(Range<i64>),
    List(Vec<i64>),
}

#[derive(Debug, Clone)]
pub struct GroupByAggOp {
    pub input: Arc<Frame>,
    pub by: Vec<String>,
    pub agg: IndexMap<String, AggRequest>,
    pub options: GroupByOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupByOptions {
    pub sort: bool,
}

impl Default for GroupByOptions {
    fn default() -> Self {
        Self { sort: true }
    }
}

/// Aggregates requested for one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggRequest {
    /// Output keeps the column name
    Single(AggFunc),
    /// One output per function, named "`column` `function`"
    Multi(Vec<AggFunc>),
}

impl AggRequest {
    /// Output field names paired with their aggregate functions
    pub fn outputs<'a>(&'a self, column: &'a str) -> Vec<(String, AggFunc)> {
        match self {
            AggRequest::Single(func) => vec![(column.to_string(), *func)],
            AggRequest::Multi(funcs) => funcs
                .iter()
                .map(|func| (format!("{} {}", column, func.name()), *func))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Sum,
    Mean,
    Max,
    Min,
    Size,
    Count,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Max => "max",
            AggFunc::Min => "min",
            AggFunc::Size => "size",
            AggFunc::Count => "count",
        }
    }

    /// Aggregate name in the engine's relational algebra
    pub fn calcite_name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "SUM",
            AggFunc::Mean => "AVG",
            AggFunc::Max => "MAX",
            AggFunc::Min => "MIN",
            AggFunc::Size | AggFunc::Count => "COUNT",
        }
    }

    /// `size` counts rows and takes no column argument
    pub fn takes_argument(&self) -> bool {
        !matches!(self, AggFunc::Size)
    }

    pub fn result_dtype(&self, input: DataType) -> DataType {
        match self {
            AggFunc::Size | AggFunc::Count => DataType::of::<i64>(),
            AggFunc::Mean => DataType::of::<f64>(),
            AggFunc::Sum if !input.is_numeric() => DataType::of::<i64>(),
            AggFunc::Sum | AggFunc::Max | AggFunc::Min => input,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformOp {
    pub input: Arc<Frame>,
    /// Output column name to defining expression, in output order
    pub exprs: IndexMap<String, ExprRef>,
}

#[derive(Debug, Clone)]
pub struct JoinOp {
    /// Left and right operands
    pub inputs: [Arc<Frame>; 2],
    pub options: JoinOptions,
}

impl JoinOp {
    pub fn left(&self) -> &Arc<Frame> {
        &self.inputs[0]
    }

    pub fn right(&self) -> &Arc<Frame> {
        &self.inputs[1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Outer => "outer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOptions {
    #[serde(default)]
    pub how: JoinType,
    #[serde(default)]
    pub on: Option<Vec<String>>,
    #[serde(default)]
    pub sort: bool,
    #[serde(default = "default_suffixes")]
    pub suffixes: (String, String),
}

fn default_suffixes() -> (String, String) {
    ("_x".to_string(), "_y".to_string())
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            how: JoinType::default(),
            on: None,
            sort: false,
            suffixes: default_suffixes(),
        }
    }
}

impl JoinOptions {
    pub fn on<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            on: Some(keys.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

/// Concatenation by rows; inputs are expected to be column-aligned
#[derive(Debug, Clone)]
pub struct UnionOp {
    pub inputs: Vec<Arc<Frame>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

/// One output column of a join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinField {
    pub name: String,
    pub side: JoinSide,
    /// Column name in the operand it is taken from
    pub source: String,
    pub data_type: DataType,
    pub is_key: bool,
}

/// Output layout of an equi-join on `on`.
///
/// All left columns come first in their original order, followed by the
/// right columns minus the keys. Non-key names present on both sides get the
/// matching suffix; keys are never suffixed and appear once, from the left.
pub fn join_layout(
    left: &Schema,
    right: &Schema,
    on: &[String],
    suffixes: &(String, String),
) -> Vec<JoinField> {
    let is_key = |name: &str| on.iter().any(|k| k == name);
    let conflicting: HashSet<&str> = left
        .names()
        .filter(|name| right.contains(name) && !is_key(name))
        .collect();

    let mut fields = Vec::with_capacity(left.len() + right.len());
    for field in &left.fields {
        let suffix = if conflicting.contains(field.name.as_str()) {
            suffixes.0.as_str()
        } else {
            ""
        };
        fields.push(JoinField {
            name: format!("{}{}", field.name, suffix),
            side: JoinSide::Left,
            source: field.name.clone(),
            data_type: field.data_type,
            is_key: is_key(&field.name),
        });
    }

    for field in right.fields.iter().filter(|f| !is_key(&f.name)) {
        let suffix = if conflicting.contains(field.name.as_str()) {
            suffixes.1.as_str()
        } else {
            ""
        };
        fields.push(JoinField {
            name: format!("{}{}", field.name, suffix),
            side: JoinSide::Right,
            source: field.name.clone(),
            data_type: field.data_type,
            is_key: false,
        });
    }

    fields
}

impl LogicalOp {
    pub fn kind(&self) -> &'static str {
        match self {
            LogicalOp::Scan(_) => "Scan",
            LogicalOp::Mask(_) => "Mask",
            LogicalOp::GroupByAgg(_) => "GroupByAgg",
            LogicalOp::Transform(_) => "Transform",
            LogicalOp::Join(_) => "Join",
            LogicalOp::Union(_) => "Union",
        }
    }

    /// Frames whose columns this operator's expressions may reference
    pub fn inputs(&self) -> &[Arc<Frame>] {
        match self {
            LogicalOp::Scan(_) => &[],
            LogicalOp::Mask(op) => std::slice::from_ref(&op.input),
            LogicalOp::GroupByAgg(op) => std::slice::from_ref(&op.input),
            LogicalOp::Transform(op) => std::slice::from_ref(&op.input),
            LogicalOp::Join(op) => &op.inputs,
            LogicalOp::Union(op) => &op.inputs,
        }
    }
}

impl Frame {
    fn new(schema: Schema, op: LogicalOp) -> Arc<Self> {
        Arc::new(Self {
            id: FrameId::next(),
            schema,
            op,
        })
    }

    /// Source frame backed by an engine table
    pub fn scan(table: impl Into<String>, schema: Schema) -> Arc<Self> {
        Self::new(schema, LogicalOp::Scan(ScanOp { table: table.into() }))
    }

    pub fn mask(base: &Arc<Frame>, rows: RowSelection) -> Arc<Self> {
        Self::new(
            base.schema.clone(),
            LogicalOp::Mask(MaskOp {
                input: Arc::clone(base),
                rows,
            }),
        )
    }

    pub fn groupby_agg(
        base: &Arc<Frame>,
        by: Vec<String>,
        agg: IndexMap<String, AggRequest>,
        options: GroupByOptions,
    ) -> Result<Arc<Self>, IrError> {
        let mut fields = Vec::with_capacity(by.len() + agg.len());
        for key in &by {
            fields.push(base.field(key)?.clone());
        }
        for (column, request) in &agg {
            let input = base.field(column)?.data_type;
            for (name, func) in request.outputs(column) {
                fields.push(FieldType::new(name, func.result_dtype(input)));
            }
        }

        Ok(Self::new(
            Schema::new(fields),
            LogicalOp::GroupByAgg(GroupByAggOp {
                input: Arc::clone(base),
                by,
                agg,
                options,
            }),
        ))
    }

    /// Column transformation of `base`.
    ///
    /// With `fold` set and `base` itself a transform, the new node is attached
    /// to `base`'s input and `exprs` are rewritten in terms of it.
    pub fn transform(
        base: &Arc<Frame>,
        exprs: IndexMap<String, ExprRef>,
        fold: bool,
    ) -> Result<Arc<Self>, IrError> {
        let (input, exprs) = match base.op() {
            LogicalOp::Transform(parent) if fold => {
                let exprs = translate_exprs_to_base(&exprs, &parent.input)?;
                (Arc::clone(&parent.input), exprs)
            }
            _ => (Arc::clone(base), exprs),
        };

        let schema = exprs
            .iter()
            .map(|(name, expr)| FieldType::new(name.clone(), expr.dtype()))
            .collect();

        Ok(Self::new(schema, LogicalOp::Transform(TransformOp { input, exprs })))
    }

    /// Merge of `left` and `right`.
    ///
    /// Keys are validated when the join is compiled; here the layout is
    /// derived from whatever keys are present.
    pub fn join(left: &Arc<Frame>, right: &Arc<Frame>, options: JoinOptions) -> Arc<Self> {
        let on = options.on.as_deref().unwrap_or(&[]);
        let schema = join_layout(&left.schema, &right.schema, on, &options.suffixes)
            .into_iter()
            .map(|f| FieldType {
                nullable: f.side == JoinSide::Right || !matches!(options.how, JoinType::Inner),
                name: f.name,
                data_type: f.data_type,
            })
            .collect();

        Self::new(
            schema,
            LogicalOp::Join(JoinOp {
                inputs: [Arc::clone(left), Arc::clone(right)],
                options,
            }),
        )
    }

    pub fn union(frames: Vec<Arc<Frame>>) -> Result<Arc<Self>, IrError> {
        let schema = frames.first().ok_or(IrError::EmptyUnion)?.schema.clone();
        Ok(Self::new(schema, LogicalOp::Union(UnionOp { inputs: frames })))
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn op(&self) -> &LogicalOp {
        &self.op
    }

    pub fn inputs(&self) -> &[Arc<Frame>] {
        self.op.inputs()
    }

    /// Declared column names, in order
    pub fn table_cols(&self) -> Vec<&str> {
        self.schema.names().collect()
    }

    pub fn is_scan(&self) -> bool {
        matches!(self.op, LogicalOp::Scan(_))
    }

    pub fn field(&self, name: &str) -> Result<&FieldType, IrError> {
        self.schema
            .find_field(name)
            .ok_or_else(|| IrError::ColumnNotFound {
                frame: self.id,
                column: name.to_string(),
            })
    }

    /// Depth-first walk, inputs before the frame itself.
    ///
    /// Frames shared by several consumers are visited once per path.
    pub fn walk_dfs<F: FnMut(&Frame)>(&self, cb: &mut F) {
        for input in self.inputs() {
            input.walk_dfs(cb);
        }
        cb(self);
    }

    /// Source frames reachable from this one, deduplicated by identity
    pub fn collect_frames(self: &Arc<Self>) -> Vec<Arc<Frame>> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        collect_sources(self, &mut seen, &mut order);
        order
    }

    /// Indented textual rendering of the logical tree
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.print(&mut out, "");
        out
    }

    fn print(&self, out: &mut String, prefix: &str) {
        use std::fmt::Write;

        match &self.op {
            LogicalOp::Scan(op) => {
                let _ = writeln!(out, "{}Scan {} ({}) {:?}", prefix, op.table, self.id, self.table_cols());
                return;
            }
            LogicalOp::Mask(op) => {
                let _ = writeln!(out, "{}Mask ({})", prefix, self.id);
                let _ = writeln!(out, "{}  rows: {:?}", prefix, op.rows);
            }
            LogicalOp::GroupByAgg(op) => {
                let _ = writeln!(out, "{}GroupByAgg ({})", prefix, self.id);
                let _ = writeln!(out, "{}  by: {:?}", prefix, op.by);
                for (col, request) in &op.agg {
                    let _ = writeln!(out, "{}  agg {}: {:?}", prefix, col, request);
                }
                let _ = writeln!(out, "{}  sort: {}", prefix, op.options.sort);
            }
            LogicalOp::Transform(op) => {
                let _ = writeln!(out, "{}Transform ({})", prefix, self.id);
                for (name, expr) in &op.exprs {
                    let _ = writeln!(out, "{}  {}: {}", prefix, name, expr);
                }
            }
            LogicalOp::Join(op) => {
                let _ = writeln!(out, "{}Join ({})", prefix, self.id);
                let _ = writeln!(out, "{}  how: {}", prefix, op.options.how.as_str());
                let _ = writeln!(out, "{}  on: {:?}", prefix, op.options.on);
                let _ = writeln!(out, "{}  sort: {}", prefix, op.options.sort);
                let _ = writeln!(out, "{}  suffixes: {:?}", prefix, op.options.suffixes);
            }
            LogicalOp::Union(_) => {
                let _ = writeln!(out, "{}Union ({})", prefix, self.id);
            }
        }

        let child_prefix = format!("{}    ", prefix);
        for (i, input) in self.inputs().iter().enumerate() {
            let _ = writeln!(out, "{}  input[{}]:", prefix, i);
            input.print(out, &child_prefix);
        }
    }
}

fn collect_sources(
    frame: &Arc<Frame>,
    seen: &mut BTreeSet<FrameId>,
    order: &mut Vec<Arc<Frame>>,
) {
    if !seen.insert(frame.id) {
        return;
    }
    if frame.is_scan() {
        order.push(Arc::clone(frame));
    }
    for input in frame.inputs() {
        collect_sources(input, seen, order);
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("kind", &self.op.kind())
            .field("columns", &self.table_cols())
            .finish()
    }
}
