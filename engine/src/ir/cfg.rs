use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{EngineError, EngineResult};
use crate::ir::module::{Block, Terminator};
use crate::ir::value::BlockId;

/// A representation of CFG edges
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum Edge {
    Goto,
    Branch(bool),
    Switch(BTreeSet<Option<i128>>),
}

/// The control-flow graph of one function
///
/// Block payloads stay in the function body; the graph only records the
/// edge structure so predecessor/successor queries stay cheap.
pub struct ControlFlowGraph {
    graph: DiGraph<BlockId, Edge>,
    block_to_index: BTreeMap<BlockId, NodeIndex>,
}

impl ControlFlowGraph {
    pub fn build(blocks: &[Block]) -> EngineResult<Self> {
        let mut graph = DiGraph::new();
        let mut block_to_index = BTreeMap::new();
        for (i, _) in blocks.iter().enumerate() {
            let label = BlockId(i);
            let index = graph.add_node(label);
            block_to_index.insert(label, index);
        }

        let check_target = |label: &BlockId| -> EngineResult<NodeIndex> {
            block_to_index.get(label).copied().ok_or_else(|| {
                EngineError::InvariantViolation(format!("edge to unknown block {}", label))
            })
        };

        let mut edges: BTreeMap<(BlockId, BlockId), Edge> = BTreeMap::new();
        for (i, block) in blocks.iter().enumerate() {
            let src = BlockId(i);
            match &block.terminator {
                Terminator::Goto { target } => {
                    check_target(target)?;
                    if edges.insert((src, *target), Edge::Goto).is_some() {
                        return Err(EngineError::InvariantViolation(
                            "duplicated edge in CFG".into(),
                        ));
                    }
                }
                Terminator::Branch {
                    cond: _,
                    on_true,
                    on_false,
                } => {
                    check_target(on_true)?;
                    check_target(on_false)?;
                    if on_true == on_false {
                        return Err(EngineError::InvariantViolation(
                            "branch with identical targets".into(),
                        ));
                    }
                    if edges.insert((src, *on_true), Edge::Branch(true)).is_some()
                        || edges.insert((src, *on_false), Edge::Branch(false)).is_some()
                    {
                        return Err(EngineError::InvariantViolation(
                            "duplicated edge in CFG".into(),
                        ));
                    }
                }
                Terminator::Switch {
                    cond: _,
                    cases,
                    default,
                } => {
                    for (case_id, case_block) in cases {
                        check_target(case_block)?;
                        let edge = edges
                            .entry((src, *case_block))
                            .or_insert_with(|| Edge::Switch(BTreeSet::new()));
                        match edge {
                            Edge::Switch(set) => {
                                if !set.insert(Some(*case_id)) {
                                    return Err(EngineError::InvariantViolation(
                                        "duplicated switch case in CFG".into(),
                                    ));
                                }
                            }
                            Edge::Goto | Edge::Branch(..) => {
                                return Err(EngineError::InvariantViolation(
                                    "unexpected edge type for switch statement".into(),
                                ));
                            }
                        }
                    }
                    if let Some(default_block) = default {
                        check_target(default_block)?;
                        let edge = edges
                            .entry((src, *default_block))
                            .or_insert_with(|| Edge::Switch(BTreeSet::new()));
                        match edge {
                            Edge::Switch(set) => {
                                if !set.insert(None) {
                                    return Err(EngineError::InvariantViolation(
                                        "duplicated switch default in CFG".into(),
                                    ));
                                }
                            }
                            Edge::Goto | Edge::Branch(..) => {
                                return Err(EngineError::InvariantViolation(
                                    "unexpected edge type for switch statement".into(),
                                ));
                            }
                        }
                    }
                }
                Terminator::Return { .. } | Terminator::Unreachable => (),
            }
        }

        for ((src, dst), edge) in edges {
            let src_index = *block_to_index.get(&src).unwrap();
            let dst_index = *block_to_index.get(&dst).unwrap();
            graph.add_edge(src_index, dst_index, edge);
        }

        Ok(Self {
            graph,
            block_to_index,
        })
    }

    pub fn predecessors(&self, label: BlockId) -> Vec<BlockId> {
        self.neighbors(label, Direction::Incoming)
    }

    pub fn successors(&self, label: BlockId) -> Vec<BlockId> {
        self.neighbors(label, Direction::Outgoing)
    }

    fn neighbors(&self, label: BlockId, dir: Direction) -> Vec<BlockId> {
        match self.block_to_index.get(&label) {
            None => vec![],
            Some(index) => {
                let mut result: Vec<_> = self
                    .graph
                    .neighbors_directed(*index, dir)
                    .map(|n| *self.graph.node_weight(n).unwrap())
                    .collect();
                result.sort();
                result
            }
        }
    }

    /// The edge annotation between two blocks, if one exists
    pub fn edge(&self, src: BlockId, dst: BlockId) -> Option<&Edge> {
        let src_index = *self.block_to_index.get(&src)?;
        let dst_index = *self.block_to_index.get(&dst)?;
        self.graph
            .find_edge(src_index, dst_index)
            .and_then(|e| self.graph.edge_weight(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::value::ValueId;

    fn block(terminator: Terminator) -> Block {
        Block {
            phis: vec![],
            stmts: vec![],
            terminator,
        }
    }

    #[test]
    fn diamond_edges_and_neighbors() {
        let blocks = vec![
            block(Terminator::Branch {
                cond: ValueId(0),
                on_true: BlockId(1),
                on_false: BlockId(2),
            }),
            block(Terminator::Goto { target: BlockId(3) }),
            block(Terminator::Goto { target: BlockId(3) }),
            block(Terminator::Return { value: None }),
        ];
        let cfg = ControlFlowGraph::build(&blocks).unwrap();
        assert_eq!(cfg.successors(BlockId(0)), vec![BlockId(1), BlockId(2)]);
        assert_eq!(cfg.predecessors(BlockId(3)), vec![BlockId(1), BlockId(2)]);
        assert_eq!(cfg.edge(BlockId(0), BlockId(1)), Some(&Edge::Branch(true)));
        assert_eq!(cfg.edge(BlockId(0), BlockId(3)), None);
    }

    #[test]
    fn branch_to_the_same_target_is_rejected() {
        let blocks = vec![
            block(Terminator::Branch {
                cond: ValueId(0),
                on_true: BlockId(1),
                on_false: BlockId(1),
            }),
            block(Terminator::Return { value: None }),
        ];
        assert!(ControlFlowGraph::build(&blocks).is_err());
    }

    #[test]
    fn switch_cases_collapse_onto_one_edge() {
        let blocks = vec![
            block(Terminator::Switch {
                cond: ValueId(0),
                cases: vec![(1, BlockId(1)), (2, BlockId(1))],
                default: Some(BlockId(2)),
            }),
            block(Terminator::Return { value: None }),
            block(Terminator::Return { value: None }),
        ];
        let cfg = ControlFlowGraph::build(&blocks).unwrap();
        match cfg.edge(BlockId(0), BlockId(1)) {
            Some(Edge::Switch(set)) => assert_eq!(set.len(), 2),
            other => panic!("expected a switch edge, got {:?}", other),
        }
        assert_eq!(
            cfg.edge(BlockId(0), BlockId(2)),
            Some(&Edge::Switch([None].into_iter().collect()))
        );
    }
}
