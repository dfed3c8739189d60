//! Typed scalar expressions
//!
//! Expressions are immutable trees shared through [`ExprRef`]. Rewrites are
//! copy-on-write: a node is rebuilt only when one of its operands changed, and
//! untouched subtrees are returned as the very same `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::frame::{AggFunc, Frame, FrameId, ROWID_COLUMN};
use crate::{DataType, IrError};

pub type ExprRef = Arc<Expr>;

/// Literal payload
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(String), // ISO format
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            // Untyped nulls are materialized as 64-bit integers
            Value::Null => DataType::Int64,
            Value::Bool(_) => DataType::Bool,
            Value::Int8(_) => DataType::Int8,
            Value::Int16(_) => DataType::Int16,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::UInt64(_) => DataType::UInt64,
            Value::Float32(_) => DataType::Float32,
            Value::Float64(_) => DataType::Float64,
            Value::String(_) => DataType::String,
            Value::Bytes(_) => DataType::Binary,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Operator names understood by the consuming engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    Not,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Floor,
    // Null tests
    IsNull,
    IsNotNull,
    Cast,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Eq => "=",
            OpKind::Ne => "<>",
            OpKind::Lt => "<",
            OpKind::Le => "<=",
            OpKind::Gt => ">",
            OpKind::Ge => ">=",
            OpKind::And => "AND",
            OpKind::Or => "OR",
            OpKind::Not => "NOT",
            OpKind::Add => "+",
            OpKind::Sub => "-",
            OpKind::Mul => "*",
            OpKind::Div => "/",
            OpKind::Floor => "FLOOR",
            OpKind::IsNull => "IS NULL",
            OpKind::IsNotNull => "IS NOT NULL",
            OpKind::Cast => "CAST",
        }
    }

    /// Exact operand count, or `None` for variadic operators
    fn arity(&self) -> Option<usize> {
        match self {
            OpKind::And | OpKind::Or => None,
            OpKind::Not | OpKind::Floor | OpKind::IsNull | OpKind::IsNotNull | OpKind::Cast => {
                Some(1)
            }
            _ => Some(2),
        }
    }
}

/// Reference to a named column of a frame
#[derive(Clone)]
pub struct ColumnRef {
    pub frame: Arc<Frame>,
    pub column: String,
    pub dtype: DataType,
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.frame.id() == other.frame.id() && self.column == other.column
    }
}

impl fmt::Debug for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.frame.id(), self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpExpr {
    pub op: OpKind,
    pub operands: Vec<ExprRef>,
    pub dtype: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggFunc,
    /// Empty for functions that take no argument (`size`)
    pub operands: Vec<ExprRef>,
    pub dtype: DataType,
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(ColumnRef),
    /// Resolved positional reference, serialized as an input object
    InputRef { index: usize, dtype: DataType },
    /// Resolved positional reference, serialized as a bare index
    InputIdx { index: usize, dtype: DataType },
    Op(OpExpr),
    Aggregate(AggregateExpr),
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> ExprRef {
        Arc::new(Expr::Literal(value.into()))
    }

    /// Reference `name` in `frame`.
    ///
    /// The row identity pseudo-column is accepted for every frame here; it is
    /// only resolvable against scanned frames at compile time.
    pub fn column(frame: &Arc<Frame>, name: &str) -> Result<ExprRef, IrError> {
        let dtype = if name == ROWID_COLUMN {
            DataType::Int64
        } else {
            frame
                .schema()
                .find_field(name)
                .map(|f| f.data_type)
                .ok_or_else(|| IrError::ColumnNotFound {
                    frame: frame.id(),
                    column: name.to_string(),
                })?
        };

        Ok(Arc::new(Expr::Column(ColumnRef {
            frame: Arc::clone(frame),
            column: name.to_string(),
            dtype,
        })))
    }

    pub fn op(op: OpKind, operands: Vec<ExprRef>, dtype: DataType) -> ExprRef {
        Arc::new(Expr::Op(OpExpr { op, operands, dtype }))
    }

    /// Build `op` over `operands`, checking arity and inferring the result type
    pub fn apply(op: OpKind, operands: Vec<ExprRef>) -> Result<ExprRef, IrError> {
        match op.arity() {
            Some(expected) if expected != operands.len() => {
                return Err(IrError::Arity {
                    op: op.as_str(),
                    expected,
                    actual: operands.len(),
                })
            }
            None if operands.is_empty() => {
                return Err(IrError::Arity {
                    op: op.as_str(),
                    expected: 1,
                    actual: 0,
                })
            }
            _ => {}
        }

        let dtype = match op {
            OpKind::Eq
            | OpKind::Ne
            | OpKind::Lt
            | OpKind::Le
            | OpKind::Gt
            | OpKind::Ge
            | OpKind::And
            | OpKind::Or
            | OpKind::Not
            | OpKind::IsNull
            | OpKind::IsNotNull => DataType::of::<bool>(),
            OpKind::Div => DataType::of::<f64>(),
            OpKind::Add | OpKind::Sub | OpKind::Mul => {
                operands[0].dtype().common_numeric(operands[1].dtype())
            }
            OpKind::Floor | OpKind::Cast => operands[0].dtype(),
        };

        Ok(Self::op(op, operands, dtype))
    }

    pub fn equal(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Self::op(OpKind::Eq, vec![lhs, rhs], DataType::of::<bool>())
    }

    pub fn not_equal(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Self::op(OpKind::Ne, vec![lhs, rhs], DataType::of::<bool>())
    }

    pub fn less(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Self::op(OpKind::Lt, vec![lhs, rhs], DataType::of::<bool>())
    }

    pub fn less_eq(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Self::op(OpKind::Le, vec![lhs, rhs], DataType::of::<bool>())
    }

    pub fn greater(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Self::op(OpKind::Gt, vec![lhs, rhs], DataType::of::<bool>())
    }

    pub fn greater_eq(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Self::op(OpKind::Ge, vec![lhs, rhs], DataType::of::<bool>())
    }

    pub fn and(operands: Vec<ExprRef>) -> ExprRef {
        Self::op(OpKind::And, operands, DataType::of::<bool>())
    }

    pub fn or(operands: Vec<ExprRef>) -> ExprRef {
        Self::op(OpKind::Or, operands, DataType::of::<bool>())
    }

    pub fn not(operand: ExprRef) -> ExprRef {
        Self::op(OpKind::Not, vec![operand], DataType::of::<bool>())
    }

    pub fn is_null(operand: ExprRef) -> ExprRef {
        Self::op(OpKind::IsNull, vec![operand], DataType::of::<bool>())
    }

    pub fn add(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        let dtype = lhs.dtype().common_numeric(rhs.dtype());
        Self::op(OpKind::Add, vec![lhs, rhs], dtype)
    }

    pub fn sub(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        let dtype = lhs.dtype().common_numeric(rhs.dtype());
        Self::op(OpKind::Sub, vec![lhs, rhs], dtype)
    }

    pub fn mul(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        let dtype = lhs.dtype().common_numeric(rhs.dtype());
        Self::op(OpKind::Mul, vec![lhs, rhs], dtype)
    }

    pub fn div(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Self::op(OpKind::Div, vec![lhs, rhs], DataType::of::<f64>())
    }

    /// Round towards negative infinity, typed as `dtype` (usually an integer)
    pub fn floor(operand: ExprRef, dtype: DataType) -> ExprRef {
        Self::op(OpKind::Floor, vec![operand], dtype)
    }

    pub fn cast(operand: ExprRef, dtype: DataType) -> ExprRef {
        Self::op(OpKind::Cast, vec![operand], dtype)
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Expr::Literal(value) => value.data_type(),
            Expr::Column(col) => col.dtype,
            Expr::InputRef { dtype, .. } | Expr::InputIdx { dtype, .. } => *dtype,
            Expr::Op(op) => op.dtype,
            Expr::Aggregate(agg) => agg.dtype,
        }
    }

    pub fn operands(&self) -> &[ExprRef] {
        match self {
            Expr::Op(op) => &op.operands,
            Expr::Aggregate(agg) => &agg.operands,
            _ => &[],
        }
    }

    fn with_operands(&self, operands: Vec<ExprRef>) -> Expr {
        match self {
            Expr::Op(op) => Expr::Op(OpExpr {
                operands,
                ..op.clone()
            }),
            Expr::Aggregate(agg) => Expr::Aggregate(AggregateExpr {
                operands,
                ..agg.clone()
            }),
            leaf => leaf.clone(),
        }
    }

    /// Rewrite column references with `f`.
    ///
    /// `f` returns `Some(replacement)` to substitute a reference or `None` to
    /// keep it. Replacements are not rewritten again. Nodes whose operands
    /// are all unchanged are shared with the input tree.
    pub fn rewrite_columns<E, F>(self: &Arc<Self>, f: &mut F) -> Result<ExprRef, E>
    where
        F: FnMut(&ColumnRef) -> Result<Option<ExprRef>, E>,
    {
        if let Expr::Column(col) = self.as_ref() {
            return Ok(f(col)?.unwrap_or_else(|| Arc::clone(self)));
        }

        let operands = self.operands();
        let mut rewritten: Option<Vec<ExprRef>> = None;
        for (i, operand) in operands.iter().enumerate() {
            let new_operand = operand.rewrite_columns(f)?;
            if !Arc::ptr_eq(&new_operand, operand) {
                rewritten.get_or_insert_with(|| operands.to_vec())[i] = new_operand;
            }
        }

        Ok(match rewritten {
            Some(operands) => Arc::new(self.with_operands(operands)),
            None => Arc::clone(self),
        })
    }

    /// Collect every frame referenced by this expression, keyed by identity
    pub fn collect_frames(&self, frames: &mut BTreeMap<FrameId, Arc<Frame>>) {
        match self {
            Expr::Column(col) => {
                frames
                    .entry(col.frame.id())
                    .or_insert_with(|| Arc::clone(&col.frame));
            }
            other => {
                for operand in other.operands() {
                    operand.collect_frames(frames);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::Null) => write!(f, "null"),
            Expr::Literal(Value::String(s)) => write!(f, "{:?}", s),
            Expr::Literal(value) => write!(f, "{:?}", value),
            Expr::Column(col) => write!(f, "{:?}", col),
            Expr::InputRef { index, .. } => write!(f, "${}", index),
            Expr::InputIdx { index, .. } => write!(f, "#{}", index),
            Expr::Op(op) => {
                write!(f, "({}", op.op.as_str())?;
                for operand in &op.operands {
                    write!(f, " {}", operand)?;
                }
                write!(f, ")")
            }
            Expr::Aggregate(agg) => {
                write!(f, "{}(", agg.func.calcite_name())?;
                for (i, operand) in agg.operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
        }
    }
}
