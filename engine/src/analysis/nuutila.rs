use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::graph::{ConstraintGraph, OpIndex};
use crate::ir::value::ValueId;

/// Strongly-connected components of the constraint graph, in an order fit
/// for the solver
///
/// The traversal follows def-use edges (a value flows into the sinks of the
/// operations consuming it). The use map is supplied by the caller so the
/// symbolic-bound edges can be folded in: a sigma waiting on a future bound
/// must land in or after the bound's component, otherwise the constraint
/// would be materialized before the bound settles.
pub struct Nuutila {
    components: BTreeMap<ValueId, BTreeSet<ValueId>>,
    /// representatives in completion order (consumers before producers)
    worklist: Vec<ValueId>,
}

impl Nuutila {
    pub fn compute(
        graph: &ConstraintGraph,
        use_map: &BTreeMap<ValueId, BTreeSet<OpIndex>>,
    ) -> Self {
        let mut state = State {
            graph,
            use_map,
            dfs: BTreeMap::new(),
            root: BTreeMap::new(),
            in_component: BTreeSet::new(),
            scc_stack: vec![],
            counter: 0,
            components: BTreeMap::new(),
            worklist: vec![],
        };
        let entries: Vec<ValueId> = graph.vars().map(|(value, _)| *value).collect();
        for value in entries {
            if !state.dfs.contains_key(&value) {
                state.visit(value);
            }
        }
        Self {
            components: state.components,
            worklist: state.worklist,
        }
    }

    /// Components in producers-before-consumers order
    pub fn components_in_order(&self) -> impl Iterator<Item = &BTreeSet<ValueId>> {
        self.worklist
            .iter()
            .rev()
            .map(move |rep| &self.components[rep])
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }
}

struct State<'a> {
    graph: &'a ConstraintGraph,
    use_map: &'a BTreeMap<ValueId, BTreeSet<OpIndex>>,
    dfs: BTreeMap<ValueId, usize>,
    root: BTreeMap<ValueId, ValueId>,
    in_component: BTreeSet<ValueId>,
    scc_stack: Vec<ValueId>,
    counter: usize,
    components: BTreeMap<ValueId, BTreeSet<ValueId>>,
    worklist: Vec<ValueId>,
}

impl<'a> State<'a> {
    fn successors(&self, value: ValueId) -> Vec<ValueId> {
        match self.use_map.get(&value) {
            None => vec![],
            Some(ops) => ops.iter().map(|op| self.graph.op(*op).sink()).collect(),
        }
    }

    /// Nuutila's one-stack variant, converted to an explicit frame stack so
    /// deep graphs cannot exhaust the call stack
    fn visit(&mut self, start: ValueId) {
        let mut frames: Vec<(ValueId, Vec<ValueId>, usize)> = vec![];
        self.enter(start);
        frames.push((start, self.successors(start), 0));

        while let Some(frame) = frames.last_mut() {
            let (value, succs, cursor) = (frame.0, &frame.1, frame.2);
            if cursor < succs.len() {
                let next = succs[cursor];
                frame.2 += 1;
                if self.dfs.contains_key(&next) {
                    self.merge_root(value, next);
                } else {
                    self.enter(next);
                    frames.push((next, self.successors(next), 0));
                }
            } else {
                frames.pop();
                self.finish(value);
                if let Some(parent) = frames.last() {
                    self.merge_root(parent.0, value);
                }
            }
        }
    }

    fn enter(&mut self, value: ValueId) {
        self.dfs.insert(value, self.counter);
        self.counter += 1;
        self.root.insert(value, value);
    }

    fn merge_root(&mut self, value: ValueId, via: ValueId) {
        if self.in_component.contains(&via) {
            return;
        }
        let root_v = self.root[&value];
        let root_w = self.root[&via];
        if self.dfs[&root_v] >= self.dfs[&root_w] {
            self.root.insert(value, root_w);
        }
    }

    fn finish(&mut self, value: ValueId) {
        if self.root[&value] != value {
            self.scc_stack.push(value);
            return;
        }
        self.in_component.insert(value);
        let mut component = BTreeSet::from([value]);
        while let Some(&top) = self.scc_stack.last() {
            if self.dfs[&top] <= self.dfs[&value] {
                break;
            }
            self.scc_stack.pop();
            self.in_component.insert(top);
            component.insert(top);
        }
        self.components.insert(value, component);
        self.worklist.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ops::BasicOp;
    use crate::analysis::range::{Range, ValueRange};

    fn node(graph: &mut ConstraintGraph, id: usize) {
        graph.add_var_node(ValueId(id), ValueRange::Scalar(Range::unknown(32)));
    }

    fn unary(graph: &mut ConstraintGraph, source: usize, sink: usize) {
        graph.add_op(BasicOp::Phi {
            sink: ValueId(sink),
            sources: vec![ValueId(source)],
            bits: 32,
        });
    }

    #[test]
    fn chain_yields_singletons_in_producer_order() {
        let mut graph = ConstraintGraph::new();
        for id in 0..3 {
            node(&mut graph, id);
        }
        unary(&mut graph, 0, 1);
        unary(&mut graph, 1, 2);

        let scc = Nuutila::compute(&graph, &graph.symbolic_use_map());
        assert_eq!(scc.component_count(), 3);
        let order: Vec<_> = scc
            .components_in_order()
            .map(|c| *c.iter().next().unwrap())
            .collect();
        assert_eq!(order, vec![ValueId(0), ValueId(1), ValueId(2)]);
    }

    #[test]
    fn cycle_collapses_into_one_component() {
        let mut graph = ConstraintGraph::new();
        for id in 0..4 {
            node(&mut graph, id);
        }
        // 0 -> 1 -> 2 -> 1 (loop), 2 -> 3
        unary(&mut graph, 0, 1);
        unary(&mut graph, 1, 2);
        unary(&mut graph, 2, 1);
        unary(&mut graph, 2, 3);

        let scc = Nuutila::compute(&graph, &graph.symbolic_use_map());
        assert_eq!(scc.component_count(), 3);
        let components: Vec<_> = scc.components_in_order().collect();
        assert_eq!(components[0], &BTreeSet::from([ValueId(0)]));
        assert_eq!(components[1], &BTreeSet::from([ValueId(1), ValueId(2)]));
        assert_eq!(components[2], &BTreeSet::from([ValueId(3)]));
    }

    #[test]
    fn symbolic_edge_orders_bound_before_sigma() {
        use crate::analysis::ops::Intersect;
        use crate::ir::module::CmpPred;

        let mut graph = ConstraintGraph::new();
        for id in 0..3 {
            node(&mut graph, id);
        }
        // 0 is the sigma source, 2 is the future bound
        graph.add_op(BasicOp::Sigma {
            sink: ValueId(1),
            source: ValueId(0),
            intersect: Intersect::Symb {
                bound: ValueId(2),
                pred: CmpPred::Slt,
            },
            bits: 32,
            unresolved: false,
        });

        let scc = Nuutila::compute(&graph, &graph.symbolic_use_map());
        let order: Vec<_> = scc
            .components_in_order()
            .map(|c| *c.iter().next().unwrap())
            .collect();
        let pos = |v: ValueId| order.iter().position(|x| *x == v).unwrap();
        assert!(pos(ValueId(2)) < pos(ValueId(1)));
        assert!(pos(ValueId(0)) < pos(ValueId(1)));
    }
}
