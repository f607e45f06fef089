use std::collections::BTreeMap;

use log::debug;
use num_bigint::BigInt;

use crate::analysis::graph::{CallSite, ConstraintGraph};
use crate::analysis::ops::{BasicOp, Intersect};
use crate::analysis::range::{AnalysisContext, Range, RealRange, ValueRange};
use crate::error::EngineResult;
use crate::ir::module::{CmpPred, Module, StmtKind, Terminator, UnaryKind};
use crate::ir::typing::Type;
use crate::ir::value::{BlockId, FuncId, Literal, LocationId, ValueId};

/// Pseudo value standing for the contents of one storage location
pub fn location_value(module: &Module, loc: LocationId) -> ValueId {
    ValueId(module.values.len() + loc.0)
}

/// Pseudo value carrying a location's initializer contents
fn location_init_value(module: &Module, loc: LocationId) -> ValueId {
    ValueId(module.values.len() + module.locations.len() + loc.0)
}

/// Build the whole-program constraint graph
pub fn build(module: &Module, ctx: &AnalysisContext) -> EngineResult<ConstraintGraph> {
    let mut builder = GraphBuilder {
        module,
        ctx,
        graph: ConstraintGraph::new(),
        stored: BTreeMap::new(),
        store_escapes: false,
    };
    for func in module.reachable_functions() {
        builder.build_function(func)?;
    }
    builder.finish_locations();
    Ok(builder.graph)
}

/// Give every node that ended up with no defining operation (root-function
/// parameters, unsupported statements, unresolvable loads) the full span of
/// its type; runs after the interprocedural bindings are in place
pub fn finalize_undefined(graph: &mut ConstraintGraph, module: &Module, ctx: &AnalysisContext) {
    let undefined: Vec<ValueId> = graph
        .vars()
        .filter(|(value, node)| node.range().is_unknown() && graph.defining_op(**value).is_none())
        .map(|(value, _)| *value)
        .collect();
    for value in undefined {
        let full = full_range_of(module, value, ctx);
        graph.set_range(value, full);
    }
}

fn type_of(module: &Module, value: ValueId) -> &Type {
    if value.0 < module.values.len() {
        &module.value(value).ty
    } else {
        let loc = (value.0 - module.values.len()) % module.locations.len().max(1);
        &module.locations[loc].ty
    }
}

fn full_range_of(module: &Module, value: ValueId, ctx: &AnalysisContext) -> ValueRange {
    let ty = type_of(module, value);
    match ty.float_fields() {
        Some((_, exponent, fraction)) => ValueRange::Real(RealRange::full(exponent, fraction, ctx)),
        None => ValueRange::Scalar(Range::full_set(ty.bit_width(), ctx)),
    }
}

struct GraphBuilder<'a> {
    module: &'a Module,
    ctx: &'a AnalysisContext,
    graph: ConstraintGraph,
    /// values stored into each location, across all functions
    stored: BTreeMap<LocationId, Vec<ValueId>>,
    /// a store through an unresolvable pointer invalidates every location
    store_escapes: bool,
}

impl<'a> GraphBuilder<'a> {
    fn value_bits(&self, value: ValueId) -> u32 {
        type_of(self.module, value).bit_width()
    }

    /// Register the node for a value, seeded from its literal if it has one
    fn ensure_node(&mut self, value: ValueId) {
        if self.graph.has_var_node(value) {
            return;
        }
        let init = if value.0 < self.module.values.len() {
            let info = self.module.value(value);
            match (&info.literal, &info.ty) {
                (Some(Literal::Int(i)), ty) => {
                    ValueRange::Scalar(Range::constant(ty.bit_width(), BigInt::from(*i)))
                }
                (
                    Some(Literal::Float {
                        sign,
                        exponent,
                        fraction,
                    }),
                    ty,
                ) => match ty.float_fields() {
                    Some((_, e, f)) => {
                        ValueRange::Real(RealRange::from_literal(*sign, *exponent, *fraction, e, f))
                    }
                    None => ValueRange::Scalar(Range::unknown(ty.bit_width())),
                },
                (None, Type::Float { exponent, fraction }) => {
                    ValueRange::Real(RealRange::unknown(*exponent, *fraction))
                }
                (None, ty) => ValueRange::Scalar(Range::unknown(ty.bit_width())),
            }
        } else {
            let ty = type_of(self.module, value);
            match ty.float_fields() {
                Some((_, e, f)) => ValueRange::Real(RealRange::unknown(e, f)),
                None => ValueRange::Scalar(Range::unknown(ty.bit_width())),
            }
        };
        self.graph.add_var_node(value, init);
    }

    fn build_function(&mut self, func: FuncId) -> EngineResult<()> {
        let function = self.module.function(func);
        debug!("building constraints for function {}", function.name);

        for param in &function.params {
            self.ensure_node(*param);
        }

        // defining statement of each value in this function
        let mut defs: BTreeMap<ValueId, &StmtKind> = BTreeMap::new();
        for block in &function.blocks {
            for stmt in &block.stmts {
                if let Some(result) = stmt.result {
                    defs.insert(result, &stmt.kind);
                }
            }
        }

        let refinements = self.collect_refinements(func, &defs)?;

        for (bi, block) in function.blocks.iter().enumerate() {
            let label = BlockId(bi);
            for phi in &block.phis {
                self.ensure_node(phi.result);
                let sources: Vec<ValueId> = phi.incoming.iter().map(|(v, _)| *v).collect();
                for source in &sources {
                    self.ensure_node(*source);
                }
                self.graph.add_op(BasicOp::Phi {
                    sink: phi.result,
                    sources,
                    bits: self.value_bits(phi.result),
                });
            }
            for stmt in &block.stmts {
                self.build_statement(label, stmt.result, &stmt.kind, &refinements);
            }
            if let Terminator::Return { value: Some(value) } = &block.terminator {
                self.ensure_node(*value);
                self.graph.record_return(func, *value);
            }
        }
        Ok(())
    }

    fn build_statement(
        &mut self,
        label: BlockId,
        result: Option<ValueId>,
        kind: &StmtKind,
        refinements: &BTreeMap<(BlockId, ValueId), Intersect>,
    ) {
        match kind {
            StmtKind::Unary { op, operand } => {
                if let Some(sink) = result {
                    self.ensure_node(sink);
                    self.ensure_node(*operand);
                    let ty = type_of(self.module, sink).clone();
                    self.graph.add_op(BasicOp::Unary {
                        sink,
                        source: *operand,
                        op: *op,
                        ty,
                    });
                }
            }
            StmtKind::Binary { op, lhs, rhs } => {
                if let Some(sink) = result {
                    self.ensure_node(sink);
                    self.ensure_node(*lhs);
                    self.ensure_node(*rhs);
                    self.graph.add_op(BasicOp::Binary {
                        sink,
                        lhs: *lhs,
                        rhs: *rhs,
                        op: *op,
                        bits: self.value_bits(sink),
                    });
                }
            }
            StmtKind::Cmp { pred, lhs, rhs } => {
                if let Some(sink) = result {
                    self.ensure_node(sink);
                    self.ensure_node(*lhs);
                    self.ensure_node(*rhs);
                    self.graph.add_op(BasicOp::Cmp {
                        sink,
                        lhs: *lhs,
                        rhs: *rhs,
                        pred: *pred,
                        bits: self.value_bits(sink),
                    });
                }
            }
            StmtKind::Sigma { operand } => {
                if let Some(sink) = result {
                    self.ensure_node(sink);
                    self.ensure_node(*operand);
                    let bits = self.value_bits(sink);
                    let intersect = refinements
                        .get(&(label, *operand))
                        .cloned()
                        .unwrap_or_else(|| Intersect::Basic(Range::full_set(bits, self.ctx)));
                    self.graph.add_op(BasicOp::Sigma {
                        sink,
                        source: *operand,
                        intersect,
                        bits,
                        unresolved: false,
                    });
                }
            }
            StmtKind::Select {
                cond,
                on_true,
                on_false,
            } => {
                if let Some(sink) = result {
                    self.ensure_node(sink);
                    self.ensure_node(*cond);
                    self.ensure_node(*on_true);
                    self.ensure_node(*on_false);
                    self.graph.add_op(BasicOp::Ternary {
                        sink,
                        cond: *cond,
                        on_true: *on_true,
                        on_false: *on_false,
                        bits: self.value_bits(sink),
                    });
                }
            }
            StmtKind::Load { pointer } => {
                if let Some(sink) = result {
                    self.ensure_node(sink);
                    match &self.module.value(*pointer).points_to {
                        Some(targets) if !targets.is_empty() => {
                            let sources: Vec<ValueId> = targets
                                .iter()
                                .map(|loc| location_value(self.module, *loc))
                                .collect();
                            for source in &sources {
                                self.ensure_node(*source);
                            }
                            self.graph.add_op(BasicOp::Phi {
                                sink,
                                sources,
                                bits: self.value_bits(sink),
                            });
                        }
                        // unresolvable load: the sink stays undefined and is
                        // finalized to the full span of its type
                        _ => debug!("load through unresolvable pointer {}", pointer),
                    }
                }
            }
            StmtKind::Store { pointer, value } => {
                self.ensure_node(*value);
                match &self.module.value(*pointer).points_to {
                    Some(targets) if !targets.is_empty() => {
                        for loc in targets {
                            self.stored.entry(*loc).or_default().push(*value);
                        }
                    }
                    _ => {
                        debug!("store through unresolvable pointer {}", pointer);
                        self.store_escapes = true;
                    }
                }
            }
            StmtKind::Call { callee, args } => {
                for arg in args {
                    self.ensure_node(*arg);
                }
                if let Some(sink) = result {
                    self.ensure_node(sink);
                }
                self.graph.record_call(CallSite {
                    callee: *callee,
                    args: args.clone(),
                    result,
                });
            }
            StmtKind::Unsupported { opcode } => {
                debug!("skipping unsupported opcode: {}", opcode);
                if let Some(sink) = result {
                    self.ensure_node(sink);
                }
            }
        }
    }

    /// Map each (branch target, constrained value) pair to the interval the
    /// dominating condition imposes there
    fn collect_refinements(
        &mut self,
        func: FuncId,
        defs: &BTreeMap<ValueId, &StmtKind>,
    ) -> EngineResult<BTreeMap<(BlockId, ValueId), Intersect>> {
        let function = self.module.function(func);
        let mut refinements = BTreeMap::new();
        for block in &function.blocks {
            match &block.terminator {
                Terminator::Branch {
                    cond,
                    on_true,
                    on_false,
                } => {
                    if let Some(StmtKind::Cmp { pred, lhs, rhs }) = defs.get(cond) {
                        for (constrained, bound, pred) in
                            [(*lhs, *rhs, *pred), (*rhs, *lhs, pred.swapped())]
                        {
                            for (target, pred) in [(*on_true, pred), (*on_false, pred.inverse())] {
                                self.record_refinement(
                                    defs,
                                    &mut refinements,
                                    target,
                                    constrained,
                                    pred,
                                    bound,
                                )?;
                            }
                        }
                    }
                }
                Terminator::Switch {
                    cond,
                    cases,
                    default,
                } => {
                    let bits = self.value_bits(*cond);
                    let mut per_target: BTreeMap<BlockId, Range> = BTreeMap::new();
                    for (case, target) in cases {
                        let constant = Range::constant(bits, BigInt::from(*case));
                        per_target
                            .entry(*target)
                            .and_modify(|r| *r = r.union_with(&constant, self.ctx))
                            .or_insert(constant);
                    }
                    for (target, range) in per_target {
                        refinements.insert((target, *cond), Intersect::Basic(range));
                    }
                    if let Some(default) = default {
                        // a single-case switch gives the default edge an
                        // exact complement
                        if let [(case, _)] = cases.as_slice() {
                            let hole = Range::anti(
                                bits,
                                BigInt::from(*case),
                                BigInt::from(*case),
                                self.ctx,
                            );
                            refinements.insert((*default, *cond), Intersect::Basic(hole));
                        }
                    }
                }
                _ => (),
            }
        }
        Ok(refinements)
    }

    fn record_refinement(
        &mut self,
        defs: &BTreeMap<ValueId, &StmtKind>,
        refinements: &mut BTreeMap<(BlockId, ValueId), Intersect>,
        target: BlockId,
        constrained: ValueId,
        pred: CmpPred,
        bound: ValueId,
    ) -> EngineResult<()> {
        if type_of(self.module, constrained).is_float() {
            return Ok(());
        }
        // follow widening casts so the refinement reaches the narrow value
        // the sigma statements actually copy
        let mut chain = vec![constrained];
        let mut cursor = constrained;
        while let Some(StmtKind::Unary {
            op: UnaryKind::SignExtend | UnaryKind::ZeroExtend,
            operand,
        }) = defs.get(&cursor)
        {
            chain.push(*operand);
            cursor = *operand;
        }
        for value in chain {
            let bits = self.value_bits(value);
            let intersect = match self.module.literal(bound) {
                Some(Literal::Int(c)) => {
                    let constant = Range::constant(self.value_bits(bound), BigInt::from(*c));
                    let region =
                        Range::make_satisfying_cmp_region(pred, &constant, bits, self.ctx)?;
                    Intersect::Basic(region)
                }
                Some(Literal::Float { .. }) => continue,
                None => {
                    self.ensure_node(bound);
                    Intersect::Symb { bound, pred }
                }
            };
            refinements.insert((target, value), intersect);
        }
        Ok(())
    }

    /// Wire each storage location: a phi over every stored value plus the
    /// initializer contents
    fn finish_locations(&mut self) {
        if self.store_escapes {
            // every location stays undefined and finalizes to full
            return;
        }
        let stored = std::mem::take(&mut self.stored);
        for li in 0..self.module.locations.len() {
            let loc = LocationId(li);
            let node = location_value(self.module, loc);
            self.ensure_node(node);
            let mut sources = stored.get(&loc).cloned().unwrap_or_default();
            if let Some(init) = self.initial_contents(loc) {
                if sources.is_empty() {
                    self.graph.set_range(node, init);
                    continue;
                }
                let init_id = location_init_value(self.module, loc);
                self.graph.add_var_node(init_id, init);
                sources.push(init_id);
            }
            if !sources.is_empty() {
                let bits = self.value_bits(node);
                self.graph.add_op(BasicOp::Phi {
                    sink: node,
                    sources,
                    bits,
                });
            }
        }
    }

    /// Union of a location's initializer literals, if they are uniform
    fn initial_contents(&self, loc: LocationId) -> Option<ValueRange> {
        let location = &self.module.locations[loc.0];
        if location.initial.is_empty() {
            return None;
        }
        let bits = location.ty.bit_width();
        let fields = location.ty.float_fields();
        let mut acc: Option<ValueRange> = None;
        for literal in &location.initial {
            let one = match (literal, fields) {
                (Literal::Int(i), None) => ValueRange::Scalar(Range::constant(bits, BigInt::from(*i))),
                (
                    Literal::Float {
                        sign,
                        exponent,
                        fraction,
                    },
                    Some((_, e, f)),
                ) => ValueRange::Real(RealRange::from_literal(*sign, *exponent, *fraction, e, f)),
                _ => return None,
            };
            acc = Some(match acc {
                None => one,
                Some(prev) => prev.union_with(&one, self.ctx),
            });
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::module::{Block, Function, PhiStmt, Statement};
    use crate::ir::value::ValueInfo;

    fn int_value() -> ValueInfo {
        ValueInfo {
            ty: Type::Int { bits: 32 },
            literal: None,
            name: None,
            points_to: None,
        }
    }

    fn const_value(c: i128) -> ValueInfo {
        ValueInfo {
            ty: Type::Int { bits: 32 },
            literal: Some(Literal::Int(c)),
            name: None,
            points_to: None,
        }
    }

    /// while (i < 10) i = i + 1, in e-SSA form:
    ///   bb0: goto bb1
    ///   bb1: i = phi(0 from bb0, i2 from bb2); c = i < 10; br c, bb2, bb3
    ///   bb2: i1 = sigma(i); i2 = i1 + 1; goto bb1
    ///   bb3: i3 = sigma(i); return i3
    fn loop_module() -> Module {
        let values = vec![
            const_value(0),  // %0
            const_value(10), // %1
            const_value(1),  // %2
            int_value(),     // %3 = i
            ValueInfo {
                ty: Type::Bool,
                literal: None,
                name: None,
                points_to: None,
            }, // %4 = c
            int_value(),     // %5 = i1
            int_value(),     // %6 = i2
            int_value(),     // %7 = i3
        ];
        let blocks = vec![
            Block {
                phis: vec![],
                stmts: vec![],
                terminator: Terminator::Goto { target: BlockId(1) },
            },
            Block {
                phis: vec![PhiStmt {
                    result: ValueId(3),
                    incoming: vec![(ValueId(0), BlockId(0)), (ValueId(6), BlockId(2))],
                }],
                stmts: vec![Statement {
                    result: Some(ValueId(4)),
                    kind: StmtKind::Cmp {
                        pred: CmpPred::Slt,
                        lhs: ValueId(3),
                        rhs: ValueId(1),
                    },
                }],
                terminator: Terminator::Branch {
                    cond: ValueId(4),
                    on_true: BlockId(2),
                    on_false: BlockId(3),
                },
            },
            Block {
                phis: vec![],
                stmts: vec![
                    Statement {
                        result: Some(ValueId(5)),
                        kind: StmtKind::Sigma {
                            operand: ValueId(3),
                        },
                    },
                    Statement {
                        result: Some(ValueId(6)),
                        kind: StmtKind::Binary {
                            op: crate::ir::module::BinaryKind::Add,
                            lhs: ValueId(5),
                            rhs: ValueId(2),
                        },
                    },
                ],
                terminator: Terminator::Goto { target: BlockId(1) },
            },
            Block {
                phis: vec![],
                stmts: vec![Statement {
                    result: Some(ValueId(7)),
                    kind: StmtKind::Sigma {
                        operand: ValueId(3),
                    },
                }],
                terminator: Terminator::Return {
                    value: Some(ValueId(7)),
                },
            },
        ];
        Module {
            functions: vec![Function {
                name: "loop".into(),
                params: vec![],
                ret: Some(Type::Int { bits: 32 }),
                blocks,
            }],
            locations: vec![],
            values,
        }
    }

    #[test]
    fn loop_sigma_gets_branch_refinement() {
        let module = loop_module();
        module.validate().unwrap();
        let ctx = AnalysisContext::new(32).unwrap();
        let graph = build(&module, &ctx).unwrap();

        // phi, cmp, two sigmas, one add
        assert_eq!(graph.op_count(), 5);

        let sigma = graph.defining_op(ValueId(5)).unwrap();
        match graph.op(sigma) {
            BasicOp::Sigma {
                intersect: Intersect::Basic(region),
                ..
            } => {
                assert_eq!(region.upper(), &BigInt::from(9));
            }
            other => panic!("expected a constrained sigma, got {:?}", other),
        }
        let exit = graph.defining_op(ValueId(7)).unwrap();
        match graph.op(exit) {
            BasicOp::Sigma {
                intersect: Intersect::Basic(region),
                ..
            } => {
                assert_eq!(region.lower(), &BigInt::from(10));
            }
            other => panic!("expected a constrained sigma, got {:?}", other),
        }
    }

    #[test]
    fn stores_feed_location_phis_and_loads_read_them() {
        let mut values = vec![
            const_value(42), // %0
            ValueInfo {
                ty: Type::Pointer,
                literal: None,
                name: None,
                points_to: Some([LocationId(0)].into_iter().collect()),
            }, // %1
            int_value(), // %2 = load
        ];
        values[2].name = Some("out".into());
        let module = Module {
            functions: vec![Function {
                name: "mem".into(),
                params: vec![],
                ret: None,
                blocks: vec![Block {
                    phis: vec![],
                    stmts: vec![
                        Statement {
                            result: None,
                            kind: StmtKind::Store {
                                pointer: ValueId(1),
                                value: ValueId(0),
                            },
                        },
                        Statement {
                            result: Some(ValueId(2)),
                            kind: StmtKind::Load {
                                pointer: ValueId(1),
                            },
                        },
                    ],
                    terminator: Terminator::Return { value: None },
                }],
            }],
            locations: vec![crate::ir::module::MemoryLocation {
                ty: Type::Int { bits: 32 },
                initial: vec![Literal::Int(7)],
            }],
            values,
        };
        module.validate().unwrap();
        let ctx = AnalysisContext::new(32).unwrap();
        let graph = build(&module, &ctx).unwrap();

        let node = location_value(&module, LocationId(0));
        // the location joins the store with its initializer
        let loc_phi = graph.defining_op(node).unwrap();
        assert_eq!(graph.op(loc_phi).sources().len(), 2);
        // the load joins over the pointed-to locations
        let load = graph.defining_op(ValueId(2)).unwrap();
        assert_eq!(graph.op(load).sources(), vec![node]);
    }
}
