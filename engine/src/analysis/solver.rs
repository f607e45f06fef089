use std::collections::{BTreeSet, VecDeque};

use log::{debug, trace};
use num_bigint::BigInt;

use crate::analysis::graph::{ConstraintGraph, OpIndex};
use crate::analysis::nuutila::Nuutila;
use crate::analysis::ops::{BasicOp, Intersect};
use crate::analysis::range::{AnalysisContext, Range, RealRange, ValueRange};
use crate::ir::value::ValueId;

/// Meet operator used by the refinement phase
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MeetStrategy {
    /// jump-set widening, then cropping guided by the abstract states
    Crop,
    /// plain widening to the sentinels, then classic narrowing
    Cousot,
}

/// Cap on refinement steps per component, in units of component size
const NARROW_ROUNDS: usize = 16;

/// Run the two-phase fixpoint over the whole constraint graph
///
/// Components are processed in producers-before-consumers order; inside a
/// component the first phase grows ranges with widening, the second phase
/// pulls the widened bounds back in.
pub fn solve(graph: &mut ConstraintGraph, ctx: &AnalysisContext, strategy: MeetStrategy) {
    let use_map = graph.symbolic_use_map();
    let scc = Nuutila::compute(graph, &use_map);
    debug!("solving {} components", scc.component_count());
    let components: Vec<BTreeSet<ValueId>> = scc.components_in_order().cloned().collect();
    for component in components {
        solve_component(graph, ctx, strategy, &component);
    }
}

fn solve_component(
    graph: &mut ConstraintGraph,
    ctx: &AnalysisContext,
    strategy: MeetStrategy,
    component: &BTreeSet<ValueId>,
) {
    fix_intersects(graph, ctx, component);

    let comp_ops: Vec<OpIndex> = (0..graph.op_count())
        .filter(|index| component.contains(&graph.op(*index).sink()))
        .collect();

    let trivial = component.len() == 1 && {
        let value = *component.iter().next().unwrap();
        comp_ops
            .iter()
            .all(|index| !graph.op(*index).sources().contains(&value))
    };
    if trivial {
        for index in &comp_ops {
            let new = graph.op(*index).eval(graph, ctx);
            let sink = graph.op(*index).sink();
            trace!("  {} <- {}", sink, new);
            graph.set_range(sink, new);
        }
        let value = *component.iter().next().unwrap();
        if graph.range(value).is_unknown() {
            let full = full_of_shape(graph.range(value), ctx);
            graph.set_range(value, full);
        }
        return;
    }

    let use_map = graph.component_use_map(component);
    let jumps = match strategy {
        MeetStrategy::Crop => jump_set(graph, &comp_ops),
        MeetStrategy::Cousot => BTreeSet::new(),
    };

    // phase 1: growth until the widened ranges stabilize
    let mut worklist: VecDeque<OpIndex> = comp_ops.iter().copied().collect();
    let mut queued: BTreeSet<OpIndex> = worklist.iter().copied().collect();
    while let Some(index) = worklist.pop_front() {
        queued.remove(&index);
        let candidate = graph.op(index).eval(graph, ctx);
        let sink = graph.op(index).sink();
        let widened = widen(graph.range(sink), &candidate, &jumps, ctx);
        if &widened != graph.range(sink) {
            trace!("  grow {} <- {}", sink, widened);
            graph.set_range(sink, widened);
            if let Some(users) = use_map.get(&sink) {
                for user in users {
                    if queued.insert(*user) {
                        worklist.push_back(*user);
                    }
                }
            }
        }
    }

    // anything still unknown sits on a cycle with no entry; it can hold any
    // value of its type
    let stuck: Vec<ValueId> = component
        .iter()
        .filter(|value| graph.range(**value).is_unknown())
        .copied()
        .collect();
    for value in stuck {
        let full = full_of_shape(graph.range(value), ctx);
        graph.set_range(value, full);
    }

    store_abstract_states(graph, ctx, component);

    // phase 2: bounded refinement with the chosen meet operator
    let mut budget = component.len().saturating_mul(NARROW_ROUNDS);
    let mut worklist: VecDeque<OpIndex> = comp_ops.iter().copied().collect();
    let mut queued: BTreeSet<OpIndex> = worklist.iter().copied().collect();
    while let Some(index) = worklist.pop_front() {
        queued.remove(&index);
        if budget == 0 {
            break;
        }
        budget -= 1;
        let candidate = graph.op(index).eval(graph, ctx);
        let sink = graph.op(index).sink();
        let state = graph.var(sink).state();
        let refined = match strategy {
            MeetStrategy::Crop => crop(graph.range(sink), &candidate, state, ctx),
            MeetStrategy::Cousot => narrow(graph.range(sink), &candidate, ctx),
        };
        if &refined != graph.range(sink) {
            trace!("  refine {} <- {}", sink, refined);
            graph.set_range(sink, refined);
            if let Some(users) = use_map.get(&sink) {
                for user in users {
                    if queued.insert(*user) {
                        worklist.push_back(*user);
                    }
                }
            }
        }
    }
}

/// The full range matching the shape (scalar or float triple) of a stored
/// range
fn full_of_shape(range: &ValueRange, ctx: &AnalysisContext) -> ValueRange {
    match range {
        ValueRange::Scalar(r) => ValueRange::Scalar(Range::full_set(r.bits(), ctx)),
        ValueRange::Real(r) => ValueRange::Real(RealRange::full(
            r.exponent.bits(),
            r.fraction.bits(),
            ctx,
        )),
    }
}

/// Materialize symbolic sigma constraints whose bound lies outside the
/// component and has therefore already settled; bounds that never produced
/// a usable interval mark the sigma unresolved so evaluation passes its
/// source through untouched
fn fix_intersects(graph: &mut ConstraintGraph, ctx: &AnalysisContext, component: &BTreeSet<ValueId>) {
    for index in 0..graph.op_count() {
        let (bound, pred, bits) = match graph.op(index) {
            BasicOp::Sigma {
                sink,
                intersect: Intersect::Symb { bound, pred },
                bits,
                ..
            } if component.contains(sink) && !component.contains(bound) => {
                (*bound, *pred, *bits)
            }
            _ => continue,
        };
        let materialized = match graph.range(bound).as_scalar() {
            Some(range) if range.is_regular() => {
                Range::make_reachable_cmp_region(pred, range, bits, ctx).ok()
            }
            _ => None,
        };
        if let BasicOp::Sigma {
            intersect,
            unresolved,
            ..
        } = graph.op_mut(index)
        {
            match materialized {
                Some(region) => *intersect = Intersect::Basic(region),
                None => {
                    debug!("sigma constraint dropped, bound never settled");
                    *unresolved = true;
                }
            }
        }
    }
}

/// Landing points for widening: the finite bounds of the constraining
/// intervals in the component, plus constants feeding its arithmetic
fn jump_set(graph: &ConstraintGraph, comp_ops: &[OpIndex]) -> BTreeSet<BigInt> {
    let mut jumps = BTreeSet::new();
    for index in comp_ops {
        match graph.op(*index) {
            BasicOp::Sigma {
                intersect: Intersect::Basic(range),
                ..
            } => {
                if range.is_regular() || range.is_anti() {
                    jumps.insert(range.lower().clone());
                    jumps.insert(range.upper().clone());
                }
            }
            BasicOp::Binary { lhs, rhs, .. } => {
                for operand in [lhs, rhs] {
                    if let Some(range) = graph.range(*operand).as_scalar() {
                        if range.is_constant() {
                            jumps.insert(range.lower().clone());
                        }
                    }
                }
            }
            _ => (),
        }
    }
    jumps
}

/// Classify each node by which of its bounds escaped to a sentinel during
/// growth; the crop phase only moves the escaped sides
fn store_abstract_states(
    graph: &mut ConstraintGraph,
    ctx: &AnalysisContext,
    component: &BTreeSet<ValueId>,
) {
    let states: Vec<(ValueId, char)> = component
        .iter()
        .map(|value| {
            let state = match graph.range(*value).as_scalar() {
                Some(range) if range.is_regular() => {
                    let lo = ctx.is_min_bound(range.lower());
                    let hi = ctx.is_max_bound(range.upper());
                    match (lo, hi) {
                        (true, true) => '0',
                        (true, false) => '-',
                        (false, true) => '+',
                        (false, false) => '?',
                    }
                }
                _ => '?',
            };
            (*value, state)
        })
        .collect();
    for (value, state) in states {
        graph.set_state(value, state);
    }
}

fn widen(
    old: &ValueRange,
    new: &ValueRange,
    jumps: &BTreeSet<BigInt>,
    ctx: &AnalysisContext,
) -> ValueRange {
    match (old, new) {
        (ValueRange::Scalar(a), ValueRange::Scalar(b)) => {
            ValueRange::Scalar(widen_scalar(a, b, jumps, ctx))
        }
        (ValueRange::Real(a), ValueRange::Real(b)) => {
            let none = BTreeSet::new();
            ValueRange::Real(RealRange {
                sign: widen_scalar(&a.sign, &b.sign, &none, ctx),
                exponent: widen_scalar(&a.exponent, &b.exponent, &none, ctx),
                fraction: widen_scalar(&a.fraction, &b.fraction, &none, ctx),
            })
        }
        _ => new.clone(),
    }
}

fn widen_scalar(
    old: &Range,
    new: &Range,
    jumps: &BTreeSet<BigInt>,
    ctx: &AnalysisContext,
) -> Range {
    if old.is_unknown() || old.is_empty() {
        return new.clone();
    }
    if new.is_unknown() || new.is_empty() {
        return old.clone();
    }
    let bits = old.bits().max(new.bits());
    if old.is_anti() || new.is_anti() {
        if old == new {
            return old.clone();
        }
        return Range::full_set(bits, ctx);
    }
    let lower = if new.lower() < old.lower() {
        jumps
            .range(..=new.lower().clone())
            .next_back()
            .cloned()
            .unwrap_or_else(|| ctx.min().clone())
    } else {
        old.lower().clone()
    };
    let upper = if new.upper() > old.upper() {
        jumps
            .range(new.upper().clone()..)
            .next()
            .cloned()
            .unwrap_or_else(|| ctx.max().clone())
    } else {
        old.upper().clone()
    };
    Range::regular(bits, lower, upper)
}

fn narrow(old: &ValueRange, new: &ValueRange, ctx: &AnalysisContext) -> ValueRange {
    match (old, new) {
        (ValueRange::Scalar(a), ValueRange::Scalar(b)) => {
            ValueRange::Scalar(narrow_scalar(a, b, ctx))
        }
        (ValueRange::Real(a), ValueRange::Real(b)) => ValueRange::Real(RealRange {
            sign: narrow_scalar(&a.sign, &b.sign, ctx),
            exponent: narrow_scalar(&a.exponent, &b.exponent, ctx),
            fraction: narrow_scalar(&a.fraction, &b.fraction, ctx),
        }),
        _ => old.clone(),
    }
}

/// Classic narrowing: only bounds that escaped to a sentinel may be pulled
/// back in
fn narrow_scalar(old: &Range, new: &Range, ctx: &AnalysisContext) -> Range {
    if old.is_unknown() {
        return new.clone();
    }
    if !old.is_regular() || !new.is_regular() {
        return old.clone();
    }
    let bits = old.bits().max(new.bits());
    let lower = if ctx.is_min_bound(old.lower()) {
        new.lower().clone()
    } else {
        old.lower().clone()
    };
    let upper = if ctx.is_max_bound(old.upper()) {
        new.upper().clone()
    } else {
        old.upper().clone()
    };
    if lower > upper {
        return old.clone();
    }
    Range::regular(bits, lower, upper)
}

fn crop(old: &ValueRange, new: &ValueRange, state: char, ctx: &AnalysisContext) -> ValueRange {
    match (old, new) {
        (ValueRange::Scalar(a), ValueRange::Scalar(b)) => {
            ValueRange::Scalar(crop_scalar(a, b, state, ctx))
        }
        (ValueRange::Real(a), ValueRange::Real(b)) => ValueRange::Real(RealRange {
            sign: crop_scalar(&a.sign, &b.sign, state, ctx),
            exponent: crop_scalar(&a.exponent, &b.exponent, state, ctx),
            fraction: crop_scalar(&a.fraction, &b.fraction, state, ctx),
        }),
        _ => old.clone(),
    }
}

/// Crop: a side may only move inward, and only if growth classified it as
/// having escaped ('-' lower, '+' upper, '0' both)
fn crop_scalar(old: &Range, new: &Range, state: char, _ctx: &AnalysisContext) -> Range {
    if old.is_unknown() {
        return new.clone();
    }
    if !old.is_regular() || !new.is_regular() {
        return old.clone();
    }
    let bits = old.bits().max(new.bits());
    let mut lower = old.lower().clone();
    let mut upper = old.upper().clone();
    if (state == '-' || state == '0') && new.lower() > &lower {
        lower = new.lower().clone();
    }
    if (state == '+' || state == '0') && new.upper() < &upper {
        upper = new.upper().clone();
    }
    if lower > upper {
        return old.clone();
    }
    Range::regular(bits, lower, upper)
}
