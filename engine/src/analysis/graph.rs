use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::analysis::ops::{BasicOp, Intersect};
use crate::analysis::range::ValueRange;
use crate::ir::module::Module;
use crate::ir::value::{FuncId, ValueId};

/// Index of an operation in the graph arena
pub type OpIndex = usize;

/// One node of the constraint graph
///
/// The abstract state is the sign summary the solver stores between its two
/// phases: '-' (only the lower bound is finite), '+' (only the upper), '0'
/// (both infinite) or '?' (not yet classified).
#[derive(Clone, Debug)]
pub struct VarNode {
    value: ValueId,
    range: ValueRange,
    state: char,
}

impl VarNode {
    fn new(value: ValueId, range: ValueRange) -> Self {
        Self {
            value,
            range,
            state: '?',
        }
    }

    pub fn value(&self) -> ValueId {
        self.value
    }

    pub fn range(&self) -> &ValueRange {
        &self.range
    }

    pub fn state(&self) -> char {
        self.state
    }
}

/// A call site recorded during construction, consumed by the binder
#[derive(Clone, Debug)]
pub struct CallSite {
    pub callee: FuncId,
    pub args: Vec<ValueId>,
    pub result: Option<ValueId>,
}

/// The whole-program constraint graph
///
/// Operations live in one arena; the def map points from a value to the
/// single operation defining it, the use map from a value to every
/// operation consuming it. The symbolic-use map additionally points from a
/// future-bound value to the sigma operations constrained by it, so the
/// SCC phase can order a sigma after the bound it waits on.
pub struct ConstraintGraph {
    vars: BTreeMap<ValueId, VarNode>,
    oprs: Vec<BasicOp>,
    def_map: BTreeMap<ValueId, OpIndex>,
    use_map: BTreeMap<ValueId, BTreeSet<OpIndex>>,
    symb_map: BTreeMap<ValueId, BTreeSet<OpIndex>>,
    calls: Vec<CallSite>,
    returns: BTreeMap<FuncId, Vec<ValueId>>,
}

impl Default for ConstraintGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintGraph {
    pub fn new() -> Self {
        Self {
            vars: BTreeMap::new(),
            oprs: vec![],
            def_map: BTreeMap::new(),
            use_map: BTreeMap::new(),
            symb_map: BTreeMap::new(),
            calls: vec![],
            returns: BTreeMap::new(),
        }
    }

    /// Register a node, keeping the existing one on re-registration
    pub fn add_var_node(&mut self, value: ValueId, init: ValueRange) {
        self.vars
            .entry(value)
            .or_insert_with(|| VarNode::new(value, init));
    }

    pub fn has_var_node(&self, value: ValueId) -> bool {
        self.vars.contains_key(&value)
    }

    pub fn var(&self, value: ValueId) -> &VarNode {
        self.vars.get(&value).unwrap()
    }

    pub fn range(&self, value: ValueId) -> &ValueRange {
        &self.vars.get(&value).unwrap().range
    }

    pub fn set_range(&mut self, value: ValueId, range: ValueRange) {
        self.vars.get_mut(&value).unwrap().range = range;
    }

    pub fn set_state(&mut self, value: ValueId, state: char) {
        self.vars.get_mut(&value).unwrap().state = state;
    }

    pub fn vars(&self) -> impl Iterator<Item = (&ValueId, &VarNode)> {
        self.vars.iter()
    }

    /// Append an operation, indexing its sink and sources
    pub fn add_op(&mut self, op: BasicOp) -> OpIndex {
        let index = self.oprs.len();
        self.def_map.insert(op.sink(), index);
        for source in op.sources() {
            self.use_map.entry(source).or_default().insert(index);
        }
        if let BasicOp::Sigma {
            intersect: Intersect::Symb { bound, .. },
            ..
        } = &op
        {
            self.symb_map.entry(*bound).or_default().insert(index);
        }
        self.oprs.push(op);
        index
    }

    pub fn op(&self, index: OpIndex) -> &BasicOp {
        &self.oprs[index]
    }

    pub fn op_mut(&mut self, index: OpIndex) -> &mut BasicOp {
        &mut self.oprs[index]
    }

    pub fn op_count(&self) -> usize {
        self.oprs.len()
    }

    pub fn defining_op(&self, value: ValueId) -> Option<OpIndex> {
        self.def_map.get(&value).copied()
    }

    pub fn uses(&self, value: ValueId) -> Option<&BTreeSet<OpIndex>> {
        self.use_map.get(&value)
    }

    pub fn record_call(&mut self, site: CallSite) {
        self.calls.push(site);
    }

    pub fn calls(&self) -> &[CallSite] {
        &self.calls
    }

    pub fn record_return(&mut self, func: FuncId, value: ValueId) {
        self.returns.entry(func).or_default().push(value);
    }

    pub fn returns_of(&self, func: FuncId) -> &[ValueId] {
        self.returns.get(&func).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The use map with symbolic-bound edges folded in, consumed read-only
    /// by the SCC phase so a sigma lands in (or after) the component of the
    /// bound it waits on
    pub fn symbolic_use_map(&self) -> BTreeMap<ValueId, BTreeSet<OpIndex>> {
        let mut map = self.use_map.clone();
        for (bound, ops) in &self.symb_map {
            map.entry(*bound).or_default().extend(ops.iter().copied());
        }
        map
    }

    /// For one strongly-connected component: which operations (defined in
    /// the component) consume each of its values
    pub fn component_use_map(
        &self,
        component: &BTreeSet<ValueId>,
    ) -> BTreeMap<ValueId, BTreeSet<OpIndex>> {
        let mut map: BTreeMap<ValueId, BTreeSet<OpIndex>> = BTreeMap::new();
        for (index, op) in self.oprs.iter().enumerate() {
            if !component.contains(&op.sink()) {
                continue;
            }
            for source in op.sources() {
                if component.contains(&source) {
                    map.entry(source).or_default().insert(index);
                }
            }
        }
        map
    }

    /// Graphviz rendering, mainly for debugging reduced test programs
    pub fn dump_dot(&self, module: &Module) -> String {
        let name_of = |v: ValueId| -> String {
            if v.0 < module.values.len() {
                match &module.value(v).name {
                    Some(name) => format!("{} ({})", v, name),
                    None => format!("{}", v),
                }
            } else {
                format!("loc{}", v.0 - module.values.len())
            }
        };
        let mut out = String::new();
        let _ = writeln!(out, "digraph constraints {{");
        for (value, node) in &self.vars {
            let _ = writeln!(
                out,
                "  v{} [label=\"{}\\n{}\"];",
                value.0,
                name_of(*value),
                node.range
            );
        }
        for (index, op) in self.oprs.iter().enumerate() {
            let _ = writeln!(out, "  op{} [shape=box, label=\"{}\"];", index, op.label());
            for source in op.sources() {
                let _ = writeln!(out, "  v{} -> op{};", source.0, index);
            }
            let _ = writeln!(out, "  op{} -> v{};", index, op.sink().0);
        }
        let _ = writeln!(out, "}}");
        out
    }
}
