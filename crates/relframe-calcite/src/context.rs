//! Reference resolution for one operator being compiled
//!
//! An [`InputContext`] flattens the columns of an operator's compiled inputs
//! into a single positional address space. Each input frame starts at the
//! offset reached by the inputs before it. A compiled input is as wide as the
//! physical node it compiled to, so scanned frames, and filters over them,
//! occupy one extra slot for the row identity column.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use relframe_ir::{DataType, Expr, ExprRef, Frame, FrameId, ROWID_COLUMN};
use tracing::trace;

use crate::algebra::NodeId;
use crate::error::CompileError;

/// Physical node an input frame compiled to, with its output width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledInput {
    pub node: NodeId,
    pub width: usize,
}

pub struct InputContext {
    /// Kind of the operator being compiled, for diagnostics
    node: &'static str,
    frames: Vec<Arc<Frame>>,
    input_nodes: Vec<NodeId>,
    offsets: HashMap<FrameId, usize>,
    replacements: HashMap<FrameId, Vec<String>>,
    /// Frames appearing more than once among the inputs
    ambiguous: HashSet<FrameId>,
}

impl InputContext {
    /// Context over `frames`, compiled into `inputs` (same order).
    ///
    /// Offsets add up the width of each compiled input rather than the
    /// declared column count plus one for scans. The two agree except for a
    /// masked scan: its Filter still carries the scan's `rowid` slot, so it is
    /// one column wider than its frame declares.
    pub fn new(node: &'static str, frames: &[Arc<Frame>], inputs: &[CompiledInput]) -> Self {
        let mut offsets = HashMap::with_capacity(frames.len());
        let mut ambiguous = HashSet::new();

        let mut offset = 0;
        for (frame, input) in frames.iter().zip(inputs) {
            if offsets.contains_key(&frame.id()) {
                ambiguous.insert(frame.id());
            } else {
                offsets.insert(frame.id(), offset);
            }
            offset += input.width;
        }

        trace!(node, inputs = frames.len(), width = offset, "Input context");

        Self {
            node,
            frames: frames.to_vec(),
            input_nodes: inputs.iter().map(|i| i.node).collect(),
            offsets,
            replacements: HashMap::new(),
            ambiguous,
        }
    }

    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    pub fn input_ids(&self) -> &[NodeId] {
        &self.input_nodes
    }

    /// Compiled node of the single input
    pub fn input_node(&self) -> Result<NodeId, CompileError> {
        match self.input_nodes.as_slice() {
            [id] => Ok(*id),
            ids => Err(CompileError::invalid(
                self.node,
                format!("expected one input, found {}", ids.len()),
            )),
        }
    }

    /// Address `frame` through `columns` for the rest of this context.
    ///
    /// Used once the operator has projected its input into a new layout.
    pub fn replace_input_columns(&mut self, frame: &Frame, columns: Vec<String>) {
        self.replacements.insert(frame.id(), columns);
    }

    /// Flattened position of `column` in `frame`
    pub fn index_of(&self, frame: &Frame, column: &str) -> Result<usize, CompileError> {
        if self.ambiguous.contains(&frame.id()) {
            return Err(CompileError::unsupported(
                self.node,
                format!("{} is used as more than one input, column '{}' is ambiguous", frame.id(), column),
            ));
        }

        let offset = *self.offsets.get(&frame.id()).ok_or_else(|| {
            CompileError::invalid(
                self.node,
                format!("{} is not an input, cannot resolve column '{}'", frame.id(), column),
            )
        })?;

        if let Some(columns) = self.replacements.get(&frame.id()) {
            return columns
                .iter()
                .position(|c| c == column)
                .map(|pos| offset + pos)
                .ok_or_else(|| missing_column(self.node, frame, column));
        }

        if column == ROWID_COLUMN {
            if !frame.is_scan() {
                return Err(CompileError::unsupported(
                    self.node,
                    format!(
                        "row identity is only available on scanned frames, {} is a {}",
                        frame.id(),
                        frame.op().kind()
                    ),
                ));
            }
            return Ok(offset + frame.schema().len());
        }

        frame
            .schema()
            .index_of(column)
            .map(|pos| offset + pos)
            .ok_or_else(|| missing_column(self.node, frame, column))
    }

    /// Positional reference to `column` in `frame`
    pub fn input_ref(&self, frame: &Frame, column: &str) -> Result<ExprRef, CompileError> {
        let index = self.index_of(frame, column)?;
        Ok(Arc::new(Expr::InputRef {
            index,
            dtype: column_dtype(frame, column),
        }))
    }

    /// Bare positional index, as aggregate operands are written
    pub fn input_idx(&self, frame: &Frame, column: &str) -> Result<ExprRef, CompileError> {
        let index = self.index_of(frame, column)?;
        Ok(Arc::new(Expr::InputIdx {
            index,
            dtype: column_dtype(frame, column),
        }))
    }

    /// Replace every column reference in `expr` by its position
    pub fn translate(&self, expr: &ExprRef) -> Result<ExprRef, CompileError> {
        expr.rewrite_columns(&mut |col| self.input_ref(&col.frame, &col.column).map(Some))
    }
}

fn column_dtype(frame: &Frame, column: &str) -> DataType {
    frame
        .schema()
        .find_field(column)
        .map(|f| f.data_type)
        .unwrap_or(DataType::Int64)
}

fn missing_column(node: &'static str, frame: &Frame, column: &str) -> CompileError {
    CompileError::invalid(node, format!("column '{}' not found in {}", column, frame.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use relframe_ir::{FieldType, Schema};

    fn scan(cols: &[&str]) -> Arc<Frame> {
        Frame::scan(
            "t",
            Schema::new(cols.iter().map(|c| FieldType::new(*c, DataType::Int64)).collect()),
        )
    }

    /// Inputs as the builder would report them, numbered from zero
    fn compiled(frames: &[Arc<Frame>]) -> Vec<CompiledInput> {
        frames
            .iter()
            .enumerate()
            .map(|(i, f)| CompiledInput {
                node: NodeId(i as u32),
                width: f.schema().len() + usize::from(f.is_scan()),
            })
            .collect()
    }

    fn context(node: &'static str, frames: &[Arc<Frame>]) -> InputContext {
        InputContext::new(node, frames, &compiled(frames))
    }

    #[test]
    fn test_offsets_include_rowid_for_scans() {
        let a = scan(&["x", "y"]);
        let b = scan(&["z"]);
        let ctx = context("Join", &[a.clone(), b.clone()]);

        assert_eq!(ctx.index_of(&a, "x").unwrap(), 0);
        assert_eq!(ctx.index_of(&a, ROWID_COLUMN).unwrap(), 2);
        // two declared columns plus the row identity slot
        assert_eq!(ctx.index_of(&b, "z").unwrap(), 3);
        assert_eq!(ctx.index_of(&b, ROWID_COLUMN).unwrap(), 4);
    }

    #[test]
    fn test_offsets_without_rowid_for_derived_frames() {
        let base = scan(&["x"]);
        let derived = Frame::transform(
            &base,
            IndexMap::from([
                ("p".to_string(), Expr::column(&base, "x").unwrap()),
                ("q".to_string(), Expr::literal(1i64)),
            ]),
            false,
        )
        .unwrap();
        let other = scan(&["r"]);

        let ctx = context("Union", &[derived.clone(), other.clone()]);
        assert_eq!(ctx.index_of(&other, "r").unwrap(), 2);

        let err = ctx.index_of(&derived, ROWID_COLUMN).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_replacement_layout_wins() {
        let a = scan(&["x", "y", "k"]);
        let mut ctx = context("GroupByAgg", &[a.clone()]);
        assert_eq!(ctx.index_of(&a, "k").unwrap(), 2);

        ctx.replace_input_columns(&a, vec!["k".into(), "x".into(), "y".into()]);
        assert_eq!(ctx.index_of(&a, "k").unwrap(), 0);
        assert_eq!(ctx.index_of(&a, "y").unwrap(), 2);
    }

    #[test]
    fn test_unknown_frame_and_column() {
        let a = scan(&["x"]);
        let stranger = scan(&["x"]);
        let ctx = context("Mask", &[a.clone()]);

        assert!(matches!(ctx.index_of(&stranger, "x"), Err(CompileError::InvalidPlan { .. })));
        assert!(matches!(ctx.index_of(&a, "nope"), Err(CompileError::InvalidPlan { .. })));
        assert_eq!(ctx.input_node().unwrap(), NodeId(0));
    }

    #[test]
    fn test_same_frame_twice_is_ambiguous() {
        let a = scan(&["x"]);
        let ctx = context("Join", &[a.clone(), a.clone()]);
        assert!(matches!(ctx.index_of(&a, "x"), Err(CompileError::UnsupportedOperation { .. })));
    }

    #[test]
    fn test_translate_is_copy_on_write() {
        let a = scan(&["x", "y"]);
        let ctx = context("Transform", &[a.clone()]);

        let constant = Expr::add(Expr::literal(1i64), Expr::literal(2i64));
        let expr = Expr::mul(Expr::column(&a, "y").unwrap(), constant.clone());

        let translated = ctx.translate(&expr).unwrap();
        assert_eq!(translated.to_string(), "(* $1 (+ Int64(1) Int64(2)))");
        assert!(Arc::ptr_eq(&translated.operands()[1], &constant));

        let same = ctx.translate(&constant).unwrap();
        assert!(Arc::ptr_eq(&same, &constant));
    }
}
