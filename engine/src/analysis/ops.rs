use crate::analysis::graph::ConstraintGraph;
use crate::analysis::range::{AnalysisContext, Range, RealRange, ValueRange};
use crate::ir::module::{BinaryKind, CmpPred, UnaryKind};
use crate::ir::typing::Type;
use crate::ir::value::ValueId;

/// The constraining interval attached to a sigma operation
///
/// A symbolic intersect references a bound that is itself being analyzed
/// (`x < n` where `n` is not a constant); it is materialized into a basic
/// interval once the bound's range settles.
#[derive(Clone, Debug)]
pub enum Intersect {
    Basic(Range),
    Symb { bound: ValueId, pred: CmpPred },
}

/// One operation of the constraint graph
///
/// Every variant has exactly one sink; evaluation reads the current ranges
/// of the sources out of the graph and produces the sink's new candidate.
#[derive(Clone, Debug)]
pub enum BasicOp {
    Unary {
        sink: ValueId,
        source: ValueId,
        op: UnaryKind,
        ty: Type,
    },
    Sigma {
        sink: ValueId,
        source: ValueId,
        intersect: Intersect,
        bits: u32,
        /// set by the solver when the symbolic bound never settled and the
        /// constraint had to be dropped
        unresolved: bool,
    },
    Binary {
        sink: ValueId,
        lhs: ValueId,
        rhs: ValueId,
        op: BinaryKind,
        bits: u32,
    },
    Cmp {
        sink: ValueId,
        lhs: ValueId,
        rhs: ValueId,
        pred: CmpPred,
        bits: u32,
    },
    /// select: the condition picks one side when its range is conclusive
    Ternary {
        sink: ValueId,
        cond: ValueId,
        on_true: ValueId,
        on_false: ValueId,
        bits: u32,
    },
    /// control-flow join; also models loads (join over storage locations)
    /// and the interprocedural parameter/return bindings
    Phi {
        sink: ValueId,
        sources: Vec<ValueId>,
        bits: u32,
    },
}

impl BasicOp {
    pub fn sink(&self) -> ValueId {
        match self {
            Self::Unary { sink, .. }
            | Self::Sigma { sink, .. }
            | Self::Binary { sink, .. }
            | Self::Cmp { sink, .. }
            | Self::Ternary { sink, .. }
            | Self::Phi { sink, .. } => *sink,
        }
    }

    pub fn sources(&self) -> Vec<ValueId> {
        match self {
            Self::Unary { source, .. } | Self::Sigma { source, .. } => vec![*source],
            Self::Binary { lhs, rhs, .. } | Self::Cmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            Self::Ternary {
                cond,
                on_true,
                on_false,
                ..
            } => vec![*cond, *on_true, *on_false],
            Self::Phi { sources, .. } => sources.clone(),
        }
    }

    pub fn bits(&self) -> u32 {
        match self {
            Self::Unary { ty, .. } => ty.bit_width(),
            Self::Sigma { bits, .. }
            | Self::Binary { bits, .. }
            | Self::Cmp { bits, .. }
            | Self::Ternary { bits, .. }
            | Self::Phi { bits, .. } => *bits,
        }
    }

    /// Evaluate the operation against the current graph state
    pub fn eval(&self, graph: &ConstraintGraph, ctx: &AnalysisContext) -> ValueRange {
        match self {
            Self::Unary {
                source, op, ty, ..
            } => eval_unary(*op, graph.range(*source), ty, ctx),
            Self::Sigma {
                source,
                intersect,
                bits,
                unresolved,
                ..
            } => eval_sigma(graph, *source, intersect, *bits, *unresolved, ctx),
            Self::Binary {
                lhs, rhs, op, bits, ..
            } => eval_binary(*op, graph.range(*lhs), graph.range(*rhs), *bits, ctx),
            Self::Cmp {
                lhs,
                rhs,
                pred,
                bits,
                ..
            } => eval_cmp(*pred, graph.range(*lhs), graph.range(*rhs), *bits, ctx),
            Self::Ternary {
                cond,
                on_true,
                on_false,
                bits,
                ..
            } => eval_ternary(graph, *cond, *on_true, *on_false, *bits, ctx),
            Self::Phi { sources, bits, .. } => eval_phi(graph, sources, *bits, ctx),
        }
    }

    /// Short description used by the dot dump
    pub fn label(&self) -> String {
        match self {
            Self::Unary { op, .. } => format!("{:?}", op),
            Self::Sigma {
                intersect: Intersect::Basic(r),
                ..
            } => format!("sigma {}", r),
            Self::Sigma {
                intersect: Intersect::Symb { bound, pred },
                ..
            } => format!("sigma {:?} {}", pred, bound),
            Self::Binary { op, .. } => format!("{:?}", op),
            Self::Cmp { pred, .. } => format!("cmp {:?}", pred),
            Self::Ternary { .. } => "select".into(),
            Self::Phi { .. } => "phi".into(),
        }
    }
}

fn scalar_or_full(range: &ValueRange, bits: u32, ctx: &AnalysisContext) -> Range {
    match range.as_scalar() {
        Some(r) => r.clone(),
        None => Range::full_set(bits, ctx),
    }
}

fn eval_unary(op: UnaryKind, source: &ValueRange, ty: &Type, ctx: &AnalysisContext) -> ValueRange {
    let bits = ty.bit_width();
    match op {
        UnaryKind::Trunc => {
            ValueRange::Scalar(scalar_or_full(source, bits, ctx).truncate(bits, ctx))
        }
        UnaryKind::SignExtend => {
            ValueRange::Scalar(scalar_or_full(source, bits, ctx).sext_or_trunc(bits, ctx))
        }
        UnaryKind::ZeroExtend => {
            ValueRange::Scalar(scalar_or_full(source, bits, ctx).zext_or_trunc(bits, ctx))
        }
        UnaryKind::Neg => ValueRange::Scalar(scalar_or_full(source, bits, ctx).neg(ctx)),
        UnaryKind::Abs => ValueRange::Scalar(scalar_or_full(source, bits, ctx).abs(ctx)),
        UnaryKind::BitcastToFloat => match ty.float_fields() {
            // the bit pattern crosses domains; only the field widths survive
            Some((_, exponent, fraction)) => {
                if source.is_unknown() {
                    ValueRange::Real(RealRange::unknown(exponent, fraction))
                } else {
                    ValueRange::Real(RealRange::full(exponent, fraction, ctx))
                }
            }
            None => ValueRange::Scalar(Range::full_set(bits, ctx)),
        },
        UnaryKind::BitcastToInt => {
            if source.is_unknown() {
                ValueRange::Scalar(Range::unknown(bits))
            } else {
                ValueRange::Scalar(Range::full_set(bits, ctx))
            }
        }
    }
}

fn eval_sigma(
    graph: &ConstraintGraph,
    source: ValueId,
    intersect: &Intersect,
    bits: u32,
    unresolved: bool,
    ctx: &AnalysisContext,
) -> ValueRange {
    let incoming = graph.range(source);
    if incoming.is_unknown() {
        return incoming.clone();
    }
    let incoming = scalar_or_full(incoming, bits, ctx);
    let constraint = match intersect {
        Intersect::Basic(r) => Some(r.clone()),
        Intersect::Symb { bound, pred } => {
            if unresolved {
                None
            } else {
                match graph.range(*bound).as_scalar() {
                    Some(bound_range) if bound_range.is_regular() => {
                        Range::make_reachable_cmp_region(*pred, bound_range, bits, ctx).ok()
                    }
                    _ => None,
                }
            }
        }
    };
    match constraint {
        Some(region) => ValueRange::Scalar(incoming.intersect_with(&region, ctx)),
        None => ValueRange::Scalar(incoming),
    }
}

fn eval_binary(
    op: BinaryKind,
    lhs: &ValueRange,
    rhs: &ValueRange,
    bits: u32,
    ctx: &AnalysisContext,
) -> ValueRange {
    let a = match lhs.as_scalar() {
        Some(r) => r,
        None => return ValueRange::Scalar(Range::full_set(bits, ctx)),
    };
    let b = match rhs.as_scalar() {
        Some(r) => r,
        None => return ValueRange::Scalar(Range::full_set(bits, ctx)),
    };
    let result = match op {
        BinaryKind::Add => a.add(b, ctx),
        BinaryKind::Sub => a.sub(b, ctx),
        BinaryKind::Mul => a.mul(b, ctx),
        BinaryKind::UDiv => a.udiv(b, ctx),
        BinaryKind::SDiv => a.sdiv(b, ctx),
        BinaryKind::URem => a.urem(b, ctx),
        BinaryKind::SRem => a.srem(b, ctx),
        BinaryKind::Shl => a.shl(b, ctx),
        BinaryKind::LShr => a.lshr(b, ctx),
        BinaryKind::AShr => a.ashr(b, ctx),
        BinaryKind::And => a.and(b, ctx),
        BinaryKind::Or => a.or(b, ctx),
        BinaryKind::Xor => a.xor(b, ctx),
    };
    ValueRange::Scalar(result)
}

fn eval_cmp(
    pred: CmpPred,
    lhs: &ValueRange,
    rhs: &ValueRange,
    bits: u32,
    ctx: &AnalysisContext,
) -> ValueRange {
    match (lhs.as_scalar(), rhs.as_scalar()) {
        (Some(a), Some(b)) => ValueRange::Scalar(a.cmp(pred, b, bits, ctx)),
        // float comparisons stay undecided
        _ => {
            if lhs.is_unknown() || rhs.is_unknown() {
                ValueRange::Scalar(Range::unknown(bits))
            } else {
                ValueRange::Scalar(Range::boolean(None))
            }
        }
    }
}

fn eval_ternary(
    graph: &ConstraintGraph,
    cond: ValueId,
    on_true: ValueId,
    on_false: ValueId,
    bits: u32,
    ctx: &AnalysisContext,
) -> ValueRange {
    let cond_range = graph.range(cond);
    if cond_range.is_unknown() {
        return ValueRange::Scalar(Range::unknown(bits));
    }
    if let Some(c) = cond_range.as_scalar() {
        if c.is_constant() {
            let picked = if c.lower() == &num_bigint::BigInt::from(0) {
                on_false
            } else {
                on_true
            };
            return graph.range(picked).clone();
        }
    }
    let t = tightened_arm(graph, cond, on_true, true, bits, ctx);
    let f = tightened_arm(graph, cond, on_false, false, bits, ctx);
    t.union_with(&f, ctx)
}

/// A select arm, tightened by the condition when the condition compares a
/// value against a constant and the arm either is that value or is computed
/// from it by a single unary or binary operation (the abs idiom)
fn tightened_arm(
    graph: &ConstraintGraph,
    cond: ValueId,
    arm: ValueId,
    taken: bool,
    bits: u32,
    ctx: &AnalysisContext,
) -> ValueRange {
    let base = graph.range(arm).clone();
    if base.is_unknown() {
        return base;
    }
    let index = match graph.defining_op(cond) {
        Some(index) => index,
        None => return base,
    };
    let (pred, lhs, rhs) = match graph.op(index) {
        BasicOp::Cmp { pred, lhs, rhs, .. } => (*pred, *lhs, *rhs),
        _ => return base,
    };
    let constant = |value: ValueId| {
        graph
            .range(value)
            .as_scalar()
            .map_or(false, |r| r.is_constant())
    };
    let (var, bound, pred) = if constant(rhs) {
        (lhs, rhs, pred)
    } else if constant(lhs) {
        (rhs, lhs, pred.swapped())
    } else {
        return base;
    };
    let bound_range = match graph.range(bound).as_scalar() {
        Some(range) => range.clone(),
        None => return base,
    };
    let pred = if taken { pred } else { pred.inverse() };
    let region = match Range::make_satisfying_cmp_region(pred, &bound_range, bits, ctx) {
        Ok(region) => region,
        Err(_) => return base,
    };
    if arm == var {
        return match base.as_scalar() {
            Some(range) => ValueRange::Scalar(range.intersect_with(&region, ctx)),
            None => base,
        };
    }
    // the arm may be a direct computation over the compared value; if so,
    // re-evaluate its defining operation with the refined operand
    let refined = match graph.range(var).as_scalar() {
        Some(range) => ValueRange::Scalar(range.intersect_with(&region, ctx)),
        None => return base,
    };
    let tightened = match graph.defining_op(arm).map(|i| graph.op(i)) {
        Some(BasicOp::Unary { source, op, ty, .. }) if *source == var => {
            eval_unary(*op, &refined, ty, ctx)
        }
        Some(BasicOp::Binary {
            lhs: a,
            rhs: b,
            op,
            bits: op_bits,
            ..
        }) => {
            if *a == var && *b != var {
                eval_binary(*op, &refined, graph.range(*b), *op_bits, ctx)
            } else if *b == var && *a != var {
                eval_binary(*op, graph.range(*a), &refined, *op_bits, ctx)
            } else {
                return base;
            }
        }
        _ => return base,
    };
    match (tightened.as_scalar(), base.as_scalar()) {
        (Some(t), Some(b)) => ValueRange::Scalar(t.intersect_with(b, ctx)),
        _ => base,
    }
}

fn eval_phi(
    graph: &ConstraintGraph,
    sources: &[ValueId],
    bits: u32,
    ctx: &AnalysisContext,
) -> ValueRange {
    let mut acc = ValueRange::Scalar(Range::empty(bits));
    let mut all_unknown = !sources.is_empty();
    for source in sources {
        let range = graph.range(*source);
        if range.is_unknown() {
            continue;
        }
        all_unknown = false;
        acc = acc.union_with(range, ctx);
    }
    if all_unknown {
        return ValueRange::Scalar(Range::unknown(bits));
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn ctx() -> AnalysisContext {
        AnalysisContext::new(32).unwrap()
    }

    fn graph_with(pairs: &[(usize, Range)]) -> ConstraintGraph {
        let mut graph = ConstraintGraph::new();
        for (id, range) in pairs {
            graph.add_var_node(ValueId(*id), ValueRange::Scalar(range.clone()));
        }
        graph
    }

    #[test]
    fn sigma_applies_basic_intersect() {
        let ctx = ctx();
        let graph = graph_with(&[(
            0,
            Range::regular(32, BigInt::from(-100), BigInt::from(100)),
        )]);
        let op = BasicOp::Sigma {
            sink: ValueId(1),
            source: ValueId(0),
            intersect: Intersect::Basic(Range::regular(32, BigInt::from(0), BigInt::from(9))),
            bits: 32,
            unresolved: false,
        };
        let out = op.eval(&graph, &ctx);
        assert_eq!(
            out.as_scalar().unwrap(),
            &Range::regular(32, BigInt::from(0), BigInt::from(9))
        );
    }

    #[test]
    fn sigma_with_unsettled_symbolic_bound_passes_through() {
        let ctx = ctx();
        let mut graph = graph_with(&[(0, Range::regular(32, BigInt::from(0), BigInt::from(50)))]);
        graph.add_var_node(ValueId(2), ValueRange::Scalar(Range::unknown(32)));
        let op = BasicOp::Sigma {
            sink: ValueId(1),
            source: ValueId(0),
            intersect: Intersect::Symb {
                bound: ValueId(2),
                pred: CmpPred::Slt,
            },
            bits: 32,
            unresolved: false,
        };
        let out = op.eval(&graph, &ctx);
        assert_eq!(
            out.as_scalar().unwrap(),
            &Range::regular(32, BigInt::from(0), BigInt::from(50))
        );
    }

    #[test]
    fn sigma_with_settled_symbolic_bound_constrains() {
        let ctx = ctx();
        let mut graph = graph_with(&[(0, Range::regular(32, BigInt::from(0), BigInt::from(50)))]);
        graph.add_var_node(
            ValueId(2),
            ValueRange::Scalar(Range::constant(32, BigInt::from(10))),
        );
        let op = BasicOp::Sigma {
            sink: ValueId(1),
            source: ValueId(0),
            intersect: Intersect::Symb {
                bound: ValueId(2),
                pred: CmpPred::Slt,
            },
            bits: 32,
            unresolved: false,
        };
        let out = op.eval(&graph, &ctx);
        assert_eq!(
            out.as_scalar().unwrap(),
            &Range::regular(32, BigInt::from(0), BigInt::from(9))
        );
    }

    #[test]
    fn phi_ignores_unknown_sources() {
        let ctx = ctx();
        let mut graph = graph_with(&[(0, Range::constant(32, BigInt::from(0)))]);
        graph.add_var_node(ValueId(1), ValueRange::Scalar(Range::unknown(32)));
        let op = BasicOp::Phi {
            sink: ValueId(2),
            sources: vec![ValueId(0), ValueId(1)],
            bits: 32,
        };
        let out = op.eval(&graph, &ctx);
        assert_eq!(
            out.as_scalar().unwrap(),
            &Range::constant(32, BigInt::from(0))
        );
    }

    #[test]
    fn phi_of_only_unknowns_stays_unknown() {
        let ctx = ctx();
        let mut graph = ConstraintGraph::new();
        graph.add_var_node(ValueId(0), ValueRange::Scalar(Range::unknown(32)));
        let op = BasicOp::Phi {
            sink: ValueId(1),
            sources: vec![ValueId(0)],
            bits: 32,
        };
        assert!(op.eval(&graph, &ctx).is_unknown());
    }

    #[test]
    fn select_picks_a_side_on_constant_condition() {
        let ctx = ctx();
        let graph = graph_with(&[
            (0, Range::constant(1, BigInt::from(1))),
            (1, Range::constant(32, BigInt::from(7))),
            (2, Range::constant(32, BigInt::from(9))),
        ]);
        let op = BasicOp::Ternary {
            sink: ValueId(3),
            cond: ValueId(0),
            on_true: ValueId(1),
            on_false: ValueId(2),
            bits: 32,
        };
        let out = op.eval(&graph, &ctx);
        assert_eq!(
            out.as_scalar().unwrap(),
            &Range::constant(32, BigInt::from(7))
        );
    }

    #[test]
    fn select_arm_tightened_by_its_own_comparison() {
        // min(x, 10) as select(x < 10, x, 10)
        let ctx = ctx();
        let mut graph = graph_with(&[
            (0, Range::full_set(32, &ctx)),
            (1, Range::constant(32, BigInt::from(10))),
            (2, Range::boolean(None)),
        ]);
        graph.add_var_node(ValueId(3), ValueRange::Scalar(Range::unknown(32)));
        graph.add_op(BasicOp::Cmp {
            sink: ValueId(2),
            lhs: ValueId(0),
            rhs: ValueId(1),
            pred: CmpPred::Slt,
            bits: 1,
        });
        let op = BasicOp::Ternary {
            sink: ValueId(3),
            cond: ValueId(2),
            on_true: ValueId(0),
            on_false: ValueId(1),
            bits: 32,
        };
        let out = op.eval(&graph, &ctx);
        let out = out.as_scalar().unwrap();
        assert_eq!(out.upper(), &BigInt::from(10));
        assert!(ctx.is_min_bound(out.lower()));
    }

    #[test]
    fn select_abs_pattern_tightens_the_computed_arm() {
        // |x| as select(x > 0, x, 0 - x) over the full 8-bit span
        let ctx = ctx();
        let mut graph = graph_with(&[
            (0, Range::full_set(8, &ctx)),
            (1, Range::constant(8, BigInt::from(0))),
            (2, Range::boolean(None)),
        ]);
        graph.add_var_node(ValueId(3), ValueRange::Scalar(Range::unknown(8)));
        graph.add_var_node(ValueId(4), ValueRange::Scalar(Range::unknown(8)));
        graph.add_op(BasicOp::Cmp {
            sink: ValueId(2),
            lhs: ValueId(0),
            rhs: ValueId(1),
            pred: CmpPred::Sgt,
            bits: 1,
        });
        graph.add_op(BasicOp::Binary {
            sink: ValueId(3),
            lhs: ValueId(1),
            rhs: ValueId(0),
            op: BinaryKind::Sub,
            bits: 8,
        });
        // by this point the fixpoint would have settled 0 - x to the full span
        graph.set_range(ValueId(3), ValueRange::Scalar(Range::full_set(8, &ctx)));
        let op = BasicOp::Ternary {
            sink: ValueId(4),
            cond: ValueId(2),
            on_true: ValueId(0),
            on_false: ValueId(3),
            bits: 8,
        };
        let out = op.eval(&graph, &ctx);
        let out = out.as_scalar().unwrap();
        assert_eq!(out.lower(), &BigInt::from(0));
        assert!(ctx.is_max_bound(out.upper()));
    }

    #[test]
    fn bitcast_erases_to_the_target_domain() {
        let ctx = ctx();
        let graph = graph_with(&[(0, Range::constant(32, BigInt::from(0x3f80_0000u32 as i64)))]);
        let op = BasicOp::Unary {
            sink: ValueId(1),
            source: ValueId(0),
            op: UnaryKind::BitcastToFloat,
            ty: Type::Float {
                exponent: 8,
                fraction: 23,
            },
        };
        match op.eval(&graph, &ctx) {
            ValueRange::Real(r) => assert!(!r.is_unknown()),
            ValueRange::Scalar(_) => panic!("expected a float decomposition"),
        }
    }
}
