//! Row-position predicates for positional masks

use std::ops::Range;

use relframe_ir::{Expr, ExprRef, RowPositions};

/// Boolean condition over `rowid` selecting `rows`.
///
/// The shape depends only on the selected set: one row is an equality, a
/// run of consecutive rows is a half-open bounds check and anything else is
/// a disjunction of equalities. Selecting nothing yields `false`.
pub fn row_predicate(rowid: &ExprRef, rows: &RowPositions) -> ExprRef {
    match rows {
        RowPositions::Single(row) => row_equals(rowid, *row),
        RowPositions::Range(range) => range_predicate(rowid, range.clone()),
        RowPositions::List(list) => match list.as_slice() {
            [] => Expr::literal(false),
            [row] => row_equals(rowid, *row),
            [first, ..] if is_consecutive(list) => {
                range_predicate(rowid, *first..first + list.len() as i64)
            }
            _ => Expr::or(list.iter().map(|row| row_equals(rowid, *row)).collect()),
        },
    }
}

fn range_predicate(rowid: &ExprRef, range: Range<i64>) -> ExprRef {
    if range.is_empty() {
        return Expr::literal(false);
    }
    if range.end - range.start == 1 {
        return row_equals(rowid, range.start);
    }
    Expr::and(vec![
        Expr::greater_eq(rowid.clone(), Expr::literal(range.start)),
        Expr::less(rowid.clone(), Expr::literal(range.end)),
    ])
}

fn row_equals(rowid: &ExprRef, row: i64) -> ExprRef {
    Expr::equal(rowid.clone(), Expr::literal(row))
}

fn is_consecutive(list: &[i64]) -> bool {
    list.windows(2).all(|w| w[1] == w[0] + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relframe_ir::DataType;
    use std::sync::Arc;

    fn rowid() -> ExprRef {
        Arc::new(Expr::InputRef {
            index: 3,
            dtype: DataType::Int64,
        })
    }

    #[test]
    fn test_single_row() {
        let pred = row_predicate(&rowid(), &RowPositions::Single(4));
        assert_eq!(pred.to_string(), "(= $3 Int64(4))");
    }

    #[test]
    fn test_range_and_consecutive_list_agree() {
        let from_range = row_predicate(&rowid(), &RowPositions::Range(2..5));
        let from_list = row_predicate(&rowid(), &RowPositions::List(vec![2, 3, 4]));
        assert_eq!(from_range.to_string(), "(AND (>= $3 Int64(2)) (< $3 Int64(5)))");
        assert_eq!(from_range, from_list);
    }

    #[test]
    fn test_scattered_rows() {
        let pred = row_predicate(&rowid(), &RowPositions::List(vec![0, 5, 2]));
        assert_eq!(
            pred.to_string(),
            "(OR (= $3 Int64(0)) (= $3 Int64(5)) (= $3 Int64(2)))"
        );
    }

    #[test]
    fn test_empty_selection() {
        assert_eq!(
            *row_predicate(&rowid(), &RowPositions::List(vec![])),
            Expr::Literal(false.into())
        );
        assert_eq!(
            *row_predicate(&rowid(), &RowPositions::Range(3..3)),
            Expr::Literal(false.into())
        );
        assert_eq!(
            row_predicate(&rowid(), &RowPositions::Range(3..4)).to_string(),
            "(= $3 Int64(3))"
        );
    }
}
