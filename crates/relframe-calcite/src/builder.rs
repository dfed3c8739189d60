//! DataFrame algebra → Calcite relational algebra

use std::collections::HashMap;
use std::sync::Arc;

use relframe_ir::{
    join_layout, AggregateExpr, Expr, ExprRef, Frame, FrameId, GroupByAggOp, JoinOp, JoinSide,
    JoinType, LogicalOp, MaskOp, RowSelection, ScanOp, TransformOp, UnionOp, ROWID_COLUMN,
};
use tracing::debug;

use crate::algebra::{
    AggregateNode, Collation, FilterNode, IdSequence, JoinNode, Plan, ProjectNode,
    RelNode, ScanNode, SortNode, UnionNode,
};
use crate::context::{CompiledInput, InputContext};
use crate::error::CompileError;
use crate::predicate::row_predicate;

/// Name of the row identity column in scan field lists
pub const SCAN_ROWID_FIELD: &str = "rowid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Schema qualifying every scanned table
    pub database: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            database: "omnisci".to_string(),
        }
    }
}

/// Compiles one logical tree into a [`Plan`].
///
/// A builder is consumed by [`CalciteBuilder::build`], so node ids always
/// start from zero and concurrent compilations never share state.
pub struct CalciteBuilder {
    options: BuildOptions,
    ids: IdSequence,
    nodes: Vec<RelNode>,
    compiled: HashMap<FrameId, CompiledInput>,
}

impl CalciteBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            ids: IdSequence::default(),
            nodes: Vec::new(),
            compiled: HashMap::new(),
        }
    }

    pub fn build(mut self, root: &Arc<Frame>) -> Result<Plan, CompileError> {
        self.compile_frame(root)?;
        debug!(root = %root.id(), nodes = self.nodes.len(), "Compiled plan");
        Ok(Plan { nodes: self.nodes })
    }

    /// Compile `frame` after its inputs; frames reached twice compile once
    fn compile_frame(&mut self, frame: &Arc<Frame>) -> Result<CompiledInput, CompileError> {
        if let Some(compiled) = self.compiled.get(&frame.id()) {
            return Ok(*compiled);
        }
        if let LogicalOp::Join(op) = frame.op() {
            join_keys(op)?;
        }

        let inputs = frame.inputs();
        let mut compiled_inputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            compiled_inputs.push(self.compile_frame(input)?);
        }

        let ctx = InputContext::new(frame.op().kind(), inputs, &compiled_inputs);
        let compiled = match frame.op() {
            LogicalOp::Scan(op) => self.process_scan(frame, op),
            LogicalOp::Mask(op) => self.process_mask(op, &ctx, &compiled_inputs)?,
            LogicalOp::GroupByAgg(op) => self.process_groupby(op, ctx)?,
            LogicalOp::Transform(op) => self.process_transform(op, &ctx)?,
            LogicalOp::Join(op) => self.process_join(op, &ctx, &compiled_inputs)?,
            LogicalOp::Union(op) => self.process_union(op, &ctx, &compiled_inputs),
        };

        self.compiled.insert(frame.id(), compiled);
        Ok(compiled)
    }

    fn push(&mut self, node: RelNode, width: usize) -> CompiledInput {
        let id = node.id();
        debug!(id = %id, rel_op = node.rel_op(), width, "Emitted node");
        self.nodes.push(node);
        CompiledInput { node: id, width }
    }

    fn process_scan(&mut self, frame: &Frame, op: &ScanOp) -> CompiledInput {
        let mut field_names: Vec<String> = frame.table_cols().into_iter().map(String::from).collect();
        field_names.push(SCAN_ROWID_FIELD.to_string());
        let width = field_names.len();

        let node = RelNode::Scan(ScanNode {
            id: self.ids.next_id(),
            table: vec![self.options.database.clone(), op.table.clone()],
            field_names,
        });
        self.push(node, width)
    }

    fn process_mask(
        &mut self,
        op: &MaskOp,
        ctx: &InputContext,
        inputs: &[CompiledInput],
    ) -> Result<CompiledInput, CompileError> {
        let rows = match &op.rows {
            RowSelection::Positions(rows) => rows,
            RowSelection::Labels(_) => {
                return Err(CompileError::unsupported(
                    "Mask",
                    "masking by index labels is not supported, select rows by position",
                ))
            }
        };

        let rowid = ctx.input_ref(&op.input, ROWID_COLUMN)?;
        let condition = row_predicate(&rowid, rows);

        let input = ctx.input_node()?;
        let width = inputs.first().map_or(0, |i| i.width);
        let node = RelNode::Filter(FilterNode {
            id: self.ids.next_id(),
            input,
            condition,
        });
        Ok(self.push(node, width))
    }

    fn process_groupby(
        &mut self,
        op: &GroupByAggOp,
        mut ctx: InputContext,
    ) -> Result<CompiledInput, CompileError> {
        let frame = &op.input;

        // Aggregate addresses its keys by position: project them first
        let mut proj_cols = op.by.clone();
        for col in frame.table_cols() {
            if !op.by.iter().any(|key| key == col) {
                proj_cols.push(col.to_string());
            }
        }
        let exprs = proj_cols
            .iter()
            .map(|col| ctx.input_ref(frame, col))
            .collect::<Result<Vec<_>, _>>()?;

        let proj = RelNode::Project(ProjectNode {
            id: self.ids.next_id(),
            input: ctx.input_node()?,
            fields: proj_cols.clone(),
            exprs,
        });
        let proj = self.push(proj, proj_cols.len());

        ctx.replace_input_columns(frame, proj_cols);

        let mut fields = op.by.clone();
        let group = op
            .by
            .iter()
            .map(|key| ctx.index_of(frame, key))
            .collect::<Result<Vec<_>, _>>()?;

        let mut aggs = Vec::new();
        for (col, request) in &op.agg {
            let input_dtype = frame.field(col)?.data_type;
            for (name, func) in request.outputs(col) {
                let operands = if func.takes_argument() {
                    vec![ctx.input_idx(frame, col)?]
                } else {
                    vec![]
                };
                fields.push(name);
                aggs.push(AggregateExpr {
                    func,
                    operands,
                    dtype: func.result_dtype(input_dtype),
                    distinct: false,
                });
            }
        }

        let width = fields.len();
        let node = RelNode::Aggregate(AggregateNode {
            id: self.ids.next_id(),
            input: proj.node,
            fields,
            group,
            aggs,
        });
        let agg = self.push(node, width);

        if !op.options.sort || op.by.is_empty() {
            return Ok(agg);
        }

        // Keys lead the aggregate output in group order
        let collation = (0..op.by.len()).map(Collation::ascending).collect();
        let node = RelNode::Sort(SortNode {
            id: self.ids.next_id(),
            input: agg.node,
            collation,
        });
        Ok(self.push(node, width))
    }

    fn process_transform(
        &mut self,
        op: &TransformOp,
        ctx: &InputContext,
    ) -> Result<CompiledInput, CompileError> {
        let fields: Vec<String> = op.exprs.keys().cloned().collect();
        let exprs = op
            .exprs
            .values()
            .map(|expr| ctx.translate(expr))
            .collect::<Result<Vec<_>, _>>()?;

        let width = fields.len();
        let node = RelNode::Project(ProjectNode {
            id: self.ids.next_id(),
            input: ctx.input_node()?,
            fields,
            exprs,
        });
        Ok(self.push(node, width))
    }

    fn process_join(
        &mut self,
        op: &JoinOp,
        ctx: &InputContext,
        inputs: &[CompiledInput],
    ) -> Result<CompiledInput, CompileError> {
        let (left, right) = (op.left(), op.right());
        let on = join_keys(op)?;

        // Equi-join only
        let mut cmps = on
            .iter()
            .map(|key| Ok(Expr::equal(ctx.input_ref(left, key)?, ctx.input_ref(right, key)?)))
            .collect::<Result<Vec<ExprRef>, CompileError>>()?;
        let condition = if cmps.len() == 1 {
            cmps.remove(0)
        } else {
            Expr::and(cmps)
        };

        let [left_id, right_id] = match ctx.input_ids() {
            [l, r] => [*l, *r],
            ids => {
                return Err(CompileError::invalid(
                    "Join",
                    format!("expected two inputs, found {}", ids.len()),
                ))
            }
        };

        let join_width = inputs.iter().map(|i| i.width).sum();
        let node = RelNode::Join(JoinNode {
            id: self.ids.next_id(),
            inputs: [left_id, right_id],
            join_type: op.options.how,
            condition,
        });
        let join = self.push(node, join_width);

        let layout = join_layout(left.schema(), right.schema(), on, &op.options.suffixes);
        let mut fields = Vec::with_capacity(layout.len());
        let mut exprs = Vec::with_capacity(layout.len());
        for field in &layout {
            let frame = match field.side {
                JoinSide::Left => left,
                JoinSide::Right => right,
            };
            exprs.push(ctx.input_ref(frame, &field.source)?);
            fields.push(field.name.clone());
        }

        let width = fields.len();
        let node = RelNode::Project(ProjectNode {
            id: self.ids.next_id(),
            input: join.node,
            fields,
            exprs,
        });
        let proj = self.push(node, width);

        if !op.options.sort {
            return Ok(proj);
        }

        // Positions of the keys in the projected layout, not the raw join
        let collation = on
            .iter()
            .filter_map(|key| layout.iter().position(|f| f.is_key && &f.source == key))
            .map(Collation::ascending)
            .collect();
        let node = RelNode::Sort(SortNode {
            id: self.ids.next_id(),
            input: proj.node,
            collation,
        });
        Ok(self.push(node, width))
    }

    fn process_union(
        &mut self,
        _op: &UnionOp,
        ctx: &InputContext,
        inputs: &[CompiledInput],
    ) -> CompiledInput {
        let width = inputs.first().map_or(0, |i| i.width);
        let node = RelNode::Union(UnionNode {
            id: self.ids.next_id(),
            inputs: ctx.input_ids().to_vec(),
            all: true,
        });
        self.push(node, width)
    }
}

/// Validated key columns of `op`, checked before any of its inputs compile
fn join_keys(op: &JoinOp) -> Result<&[String], CompileError> {
    let on = match op.options.on.as_deref() {
        Some(on) if !on.is_empty() => on,
        _ => {
            return Err(CompileError::invalid(
                "Join",
                "merge without explicit 'on' columns is not supported",
            ))
        }
    };

    if matches!(op.options.how, JoinType::Right | JoinType::Outer) {
        return Err(CompileError::unsupported(
            "Join",
            format!("'{}' joins are not supported", op.options.how.as_str()),
        ));
    }

    for key in on {
        for (side, frame) in [("left", op.left()), ("right", op.right())] {
            if !frame.schema().contains(key) {
                return Err(CompileError::invalid(
                    "Join",
                    format!("key column '{}' is missing in the {} operand {}", key, side, frame.id()),
                ));
            }
        }
    }

    Ok(on)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relframe_ir::{DataType, FieldType, JoinOptions};

    fn scan(table: &str) -> Arc<Frame> {
        Frame::scan(table, vec![FieldType::new("a", DataType::Int64)].into_iter().collect())
    }

    #[test]
    fn test_keyless_join_emits_nothing() {
        let joined = Frame::join(&scan("l"), &scan("r"), JoinOptions::default());

        let mut builder = CalciteBuilder::new(BuildOptions::default());
        assert!(builder.compile_frame(&joined).is_err());
        assert!(builder.nodes.is_empty());
    }

    #[test]
    fn test_shared_input_compiles_once() {
        let base = scan("t");
        let unioned = Frame::union(vec![base.clone(), base]).unwrap();

        let mut builder = CalciteBuilder::new(BuildOptions::default());
        let compiled = builder.compile_frame(&unioned).unwrap();
        assert_eq!(builder.nodes.len(), 2);
        assert_eq!(compiled.width, 2);
    }
}
