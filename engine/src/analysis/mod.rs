use std::io::Write;

use log::info;
use num_bigint::BigInt;

use crate::analysis::graph::ConstraintGraph;
use crate::analysis::range::{AnalysisContext, Range, ValueRange};
use crate::analysis::solver::MeetStrategy;
use crate::error::EngineResult;
use crate::ir::module::Module;
use crate::ir::typing::Type;
use crate::ir::value::{Literal, ValueId};

pub mod binder;
pub mod builder;
pub mod graph;
pub mod nuutila;
pub mod ops;
pub mod range;
pub mod solver;

/// The solved analysis over one module
pub struct RangeAnalysis {
    graph: ConstraintGraph,
    ctx: AnalysisContext,
}

impl RangeAnalysis {
    /// Run the full pipeline: constraint construction, interprocedural
    /// binding, and the two-phase fixpoint
    pub fn run(module: &Module, strategy: MeetStrategy) -> EngineResult<Self> {
        module.validate()?;
        let ctx = AnalysisContext::new(module.max_bit_width())?;
        let mut graph = builder::build(module, &ctx)?;
        binder::bind(&mut graph, module)?;
        builder::finalize_undefined(&mut graph, module, &ctx);
        info!(
            "constraint graph: {} nodes, {} operations",
            graph.vars().count(),
            graph.op_count()
        );
        solver::solve(&mut graph, &ctx, strategy);
        Ok(Self { graph, ctx })
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.ctx
    }

    pub fn graph(&self) -> &ConstraintGraph {
        &self.graph
    }

    /// The solved range of a value, clamped to the representable span of
    /// its declared type; a value the analysis never touched reports its
    /// literal if it has one, and stays unknown otherwise
    pub fn range_of(&self, module: &Module, value: ValueId) -> ValueRange {
        if self.graph.has_var_node(value) {
            return clamp_report(self.graph.range(value), &module.value(value).ty);
        }
        let ty = &module.value(value).ty;
        if let Some(Literal::Int(i)) = module.literal(value) {
            return ValueRange::Scalar(Range::constant(ty.bit_width(), BigInt::from(*i)));
        }
        match ty.float_fields() {
            Some((_, e, f)) => ValueRange::Real(range::RealRange::unknown(e, f)),
            None => ValueRange::Scalar(Range::unknown(ty.bit_width())),
        }
    }

    /// Print `name = range` for every named non-pointer value, sorted
    pub fn dump(&self, module: &Module, out: &mut dyn Write) -> std::io::Result<()> {
        let mut lines = vec![];
        for (index, info) in module.values.iter().enumerate() {
            let name = match &info.name {
                Some(name) => name,
                None => continue,
            };
            if info.ty.is_pointer() {
                continue;
            }
            lines.push(format!(
                "{} = {}",
                name,
                self.range_of(module, ValueId(index))
            ));
        }
        lines.sort();
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }
}

/// Clamp a solved range to what the value's type can actually hold
fn clamp_report(range: &ValueRange, ty: &Type) -> ValueRange {
    match range {
        ValueRange::Real(r) => ValueRange::Real(r.clone()),
        ValueRange::Scalar(r) => {
            if !r.is_regular() {
                return ValueRange::Scalar(r.clone());
            }
            let (lower, upper) = if ty.is_signed() {
                r.signed_view()
            } else {
                r.unsigned_view()
            };
            ValueRange::Scalar(Range::regular(r.bits(), lower, upper))
        }
    }
}
