//! Physical relational-algebra nodes
//!
//! Nodes reference each other by [`NodeId`] only. A compiled [`Plan`] is a
//! flat sequence in topological order where every referenced id appears
//! before the node referring to it.

use std::fmt;

use relframe_ir::{AggregateExpr, ExprRef, JoinType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out node ids for one compilation, starting from zero
#[derive(Debug, Default)]
pub struct IdSequence {
    next: u32,
}

impl IdSequence {
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelNode {
    Scan(ScanNode),
    Project(ProjectNode),
    Filter(FilterNode),
    Aggregate(AggregateNode),
    Sort(SortNode),
    Join(JoinNode),
    Union(UnionNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanNode {
    pub id: NodeId,
    /// Schema-qualified table path
    pub table: Vec<String>,
    /// Declared columns followed by the row identity column
    pub field_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectNode {
    pub id: NodeId,
    pub input: NodeId,
    pub fields: Vec<String>,
    pub exprs: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub id: NodeId,
    pub input: NodeId,
    pub condition: ExprRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    pub id: NodeId,
    pub input: NodeId,
    pub fields: Vec<String>,
    /// Positions of the group key columns in the input
    pub group: Vec<usize>,
    pub aggs: Vec<AggregateExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortNode {
    pub id: NodeId,
    pub input: NodeId,
    pub collation: Vec<Collation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub id: NodeId,
    /// Left and right inputs
    pub inputs: [NodeId; 2],
    pub join_type: JoinType,
    pub condition: ExprRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionNode {
    pub id: NodeId,
    pub inputs: Vec<NodeId>,
    pub all: bool,
}

/// Ascending, nulls-last ordering on one input position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collation {
    pub field: usize,
}

impl Collation {
    pub const DIRECTION: &'static str = "ASCENDING";
    pub const NULLS: &'static str = "LAST";

    pub fn ascending(field: usize) -> Self {
        Self { field }
    }
}

impl RelNode {
    pub fn id(&self) -> NodeId {
        match self {
            RelNode::Scan(n) => n.id,
            RelNode::Project(n) => n.id,
            RelNode::Filter(n) => n.id,
            RelNode::Aggregate(n) => n.id,
            RelNode::Sort(n) => n.id,
            RelNode::Join(n) => n.id,
            RelNode::Union(n) => n.id,
        }
    }

    pub fn rel_op(&self) -> &'static str {
        match self {
            RelNode::Scan(_) => "EnumerableTableScan",
            RelNode::Project(_) => "LogicalProject",
            RelNode::Filter(_) => "LogicalFilter",
            RelNode::Aggregate(_) => "LogicalAggregate",
            RelNode::Sort(_) => "LogicalSort",
            RelNode::Join(_) => "LogicalJoin",
            RelNode::Union(_) => "LogicalUnion",
        }
    }

    /// Ids of the nodes this one reads from
    pub fn input_ids(&self) -> Vec<NodeId> {
        match self {
            RelNode::Scan(_) => vec![],
            RelNode::Project(n) => vec![n.input],
            RelNode::Filter(n) => vec![n.input],
            RelNode::Aggregate(n) => vec![n.input],
            RelNode::Sort(n) => vec![n.input],
            RelNode::Join(n) => n.inputs.to_vec(),
            RelNode::Union(n) => n.inputs.clone(),
        }
    }
}

/// Compiled plan: physical nodes in emission order, the last one is the root
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub nodes: Vec<RelNode>,
}

impl Plan {
    pub fn root(&self) -> Option<&RelNode> {
        self.nodes.last()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelNode> {
        self.nodes.iter()
    }
}
