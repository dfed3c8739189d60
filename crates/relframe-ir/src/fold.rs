//! Base rewriting of transform chains
//!
//! Expressions defined over a chain of column transforms are rewritten to
//! reference a single ancestor frame by substituting, one level per pass,
//! each transform column with its defining expression.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::expr::ExprRef;
use crate::frame::{Frame, FrameId, LogicalOp};
use crate::IrError;

/// Upper bound on substitution passes; a valid chain needs one per level.
pub const MAX_FOLD_ITERATIONS: usize = 1024;

/// Rewrite `exprs` so that they only reference `base`.
///
/// Every other frame reachable from the expressions must be produced by a
/// transform; folding through joins, aggregations or masks is rejected.
pub fn translate_exprs_to_base(
    exprs: &IndexMap<String, ExprRef>,
    base: &Arc<Frame>,
) -> Result<IndexMap<String, ExprRef>, IrError> {
    let mut new_exprs = exprs.clone();

    let mut frames = BTreeMap::new();
    for expr in new_exprs.values() {
        expr.collect_frames(&mut frames);
    }
    frames.remove(&base.id());

    let mut iterations = 0;
    while !frames.is_empty() {
        iterations += 1;
        if iterations > MAX_FOLD_ITERATIONS {
            return Err(IrError::FoldLimitExceeded(MAX_FOLD_ITERATIONS));
        }

        let mut next = {
            let mut mappers: HashMap<FrameId, &IndexMap<String, ExprRef>> = HashMap::new();
            for frame in frames.values() {
                match frame.op() {
                    LogicalOp::Transform(op) => {
                        mappers.insert(frame.id(), &op.exprs);
                    }
                    other => {
                        return Err(IrError::FoldThroughNonTransform {
                            frame: frame.id(),
                            kind: other.kind(),
                        })
                    }
                }
            }

            let mut next = BTreeMap::new();
            for expr in new_exprs.values_mut() {
                let rewritten = expr.rewrite_columns(&mut |col| match mappers.get(&col.frame.id()) {
                    Some(defs) => defs
                        .get(&col.column)
                        .map(|def| Some(Arc::clone(def)))
                        .ok_or_else(|| IrError::ColumnNotFound {
                            frame: col.frame.id(),
                            column: col.column.clone(),
                        }),
                    None => Ok(None),
                })?;
                rewritten.collect_frames(&mut next);
                *expr = rewritten;
            }
            next
        };
        next.remove(&base.id());
        frames = next;
    }

    Ok(new_exprs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataType, Expr, FieldType, Frame, JoinOptions, Schema};

    fn base() -> Arc<Frame> {
        Frame::scan(
            "t",
            Schema::new(vec![
                FieldType::new("a", DataType::Int64),
                FieldType::new("b", DataType::Int64),
            ]),
        )
    }

    fn step(input: &Arc<Frame>, name: &str, expr: ExprRef) -> Arc<Frame> {
        Frame::transform(input, IndexMap::from([(name.to_string(), expr)]), false).unwrap()
    }

    #[test]
    fn test_fold_chain_to_base() {
        let t0 = base();
        let t1 = step(&t0, "x", Expr::add(Expr::column(&t0, "a").unwrap(), Expr::literal(1i64)));
        let t2 = step(&t1, "y", Expr::mul(Expr::column(&t1, "x").unwrap(), Expr::literal(2i64)));
        let t3 = step(&t2, "z", Expr::sub(Expr::column(&t2, "y").unwrap(), Expr::literal(3i64)));

        let exprs = IndexMap::from([("out".to_string(), Expr::column(&t3, "z").unwrap())]);
        let folded = translate_exprs_to_base(&exprs, &t0).unwrap();

        assert_eq!(
            folded["out"].to_string(),
            format!("(- (* (+ {}.a Int64(1)) Int64(2)) Int64(3))", t0.id())
        );

        let mut frames = BTreeMap::new();
        folded["out"].collect_frames(&mut frames);
        assert_eq!(frames.keys().copied().collect::<Vec<_>>(), vec![t0.id()]);
    }

    #[test]
    fn test_fold_keeps_order_and_base_refs() {
        let t0 = base();
        let t1 = step(&t0, "x", Expr::column(&t0, "b").unwrap());

        let exprs = IndexMap::from([
            ("second".to_string(), Expr::column(&t1, "x").unwrap()),
            ("first".to_string(), Expr::column(&t0, "a").unwrap()),
        ]);
        let folded = translate_exprs_to_base(&exprs, &t0).unwrap();

        assert_eq!(folded.keys().collect::<Vec<_>>(), vec!["second", "first"]);
        assert!(Arc::ptr_eq(&folded["first"], &exprs["first"]));
    }

    #[test]
    fn test_fold_through_join_is_rejected() {
        let left = base();
        let right = base();
        let joined = Frame::join(&left, &right, JoinOptions::on(["a"]));

        let exprs = IndexMap::from([("v".to_string(), Expr::column(&joined, "a").unwrap())]);
        let err = translate_exprs_to_base(&exprs, &left).unwrap_err();
        assert!(matches!(err, IrError::FoldThroughNonTransform { kind: "Join", .. }));
    }
}
