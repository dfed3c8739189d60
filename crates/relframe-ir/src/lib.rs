//! relframe Intermediate Representation (IR)
//!
//! DataFrame algebra consumed by the relational-algebra compiler: immutable
//! [`Frame`]s produced by logical operators, typed [`Expr`] trees referencing
//! frame columns, and base rewriting of transform chains.

use thiserror::Error;

mod document;
mod expr;
mod fold;
mod frame;
mod types;

pub use document::{value_from_json, ExprDoc, FrameDoc, OpDoc, PlanDocument, RowsDoc};
pub use expr::{AggregateExpr, ColumnRef, Expr, ExprRef, OpExpr, OpKind, Value};
pub use fold::{translate_exprs_to_base, MAX_FOLD_ITERATIONS};
pub use frame::*;
pub use types::*;

#[derive(Debug, Error)]
pub enum IrError {
    #[error("Column '{column}' not found in {frame}")]
    ColumnNotFound { frame: FrameId, column: String },

    #[error("Cannot fold through {kind} node {frame}: only transform chains can be rewritten")]
    FoldThroughNonTransform { frame: FrameId, kind: &'static str },

    #[error("Transform folding did not converge after {0} iterations")]
    FoldLimitExceeded(usize),

    #[error("Union requires at least one input frame")]
    EmptyUnion,

    #[error("Operator '{op}' expects {expected} operand(s), got {actual}")]
    Arity {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown frame '{0}' in plan document")]
    UnknownFrame(String),

    #[error("Duplicate frame '{0}' in plan document")]
    DuplicateFrame(String),

    #[error("Invalid plan document: {0}")]
    Document(String),
}
