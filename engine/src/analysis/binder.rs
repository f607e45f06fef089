use std::collections::BTreeMap;

use log::debug;

use crate::analysis::graph::ConstraintGraph;
use crate::analysis::ops::BasicOp;
use crate::error::{EngineError, EngineResult};
use crate::ir::module::Module;
use crate::ir::value::ValueId;

/// Wire the call sites into the constraint graph
///
/// Each formal parameter becomes the sink of a phi over the actuals of
/// every recorded call site, and each call result becomes the sink of a phi
/// over the callee's returned values. Ranges then flow across function
/// boundaries with no further special casing in the solver.
pub fn bind(graph: &mut ConstraintGraph, module: &Module) -> EngineResult<()> {
    let calls = graph.calls().to_vec();
    let mut formal_sources: BTreeMap<ValueId, Vec<ValueId>> = BTreeMap::new();

    for site in &calls {
        let callee = module.function(site.callee);
        if site.args.len() != callee.params.len() {
            return Err(EngineError::InvariantViolation(format!(
                "call to {} with {} arguments, expected {}",
                callee.name,
                site.args.len(),
                callee.params.len()
            )));
        }
        for (formal, actual) in callee.params.iter().zip(site.args.iter()) {
            formal_sources.entry(*formal).or_default().push(*actual);
        }
    }

    for (formal, sources) in formal_sources {
        let bits = module.value(formal).ty.bit_width();
        debug!("binding {} call-site values into parameter {}", sources.len(), formal);
        graph.add_op(BasicOp::Phi {
            sink: formal,
            sources,
            bits,
        });
    }

    for site in &calls {
        let result = match site.result {
            Some(result) => result,
            None => continue,
        };
        let returns = graph.returns_of(site.callee).to_vec();
        if returns.is_empty() {
            // the callee never returns a value; the result is finalized to
            // the full span of its type
            continue;
        }
        let bits = module.value(result).ty.bit_width();
        graph.add_op(BasicOp::Phi {
            sink: result,
            sources: returns,
            bits,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::builder;
    use crate::analysis::range::AnalysisContext;
    use crate::analysis::solver::{solve, MeetStrategy};
    use crate::ir::module::{
        BinaryKind, Block, Function, Statement, StmtKind, Terminator,
    };
    use crate::ir::typing::Type;
    use crate::ir::value::{FuncId, Literal, ValueInfo};
    use num_bigint::BigInt;

    fn int_value(literal: Option<i128>) -> ValueInfo {
        ValueInfo {
            ty: Type::Int { bits: 32 },
            literal: literal.map(Literal::Int),
            name: None,
            points_to: None,
        }
    }

    /// main calls double(3) and double(7); double(x) returns x + x
    fn two_site_module() -> Module {
        let values = vec![
            int_value(Some(3)), // %0
            int_value(Some(7)), // %1
            int_value(None),    // %2 = double(3)
            int_value(None),    // %3 = double(7)
            int_value(None),    // %4 = x (formal)
            int_value(None),    // %5 = x + x
        ];
        let main = Function {
            name: "main".into(),
            params: vec![],
            ret: None,
            blocks: vec![Block {
                phis: vec![],
                stmts: vec![
                    Statement {
                        result: Some(ValueId(2)),
                        kind: StmtKind::Call {
                            callee: FuncId(1),
                            args: vec![ValueId(0)],
                        },
                    },
                    Statement {
                        result: Some(ValueId(3)),
                        kind: StmtKind::Call {
                            callee: FuncId(1),
                            args: vec![ValueId(1)],
                        },
                    },
                ],
                terminator: Terminator::Return { value: None },
            }],
        };
        let double = Function {
            name: "double".into(),
            params: vec![ValueId(4)],
            ret: Some(Type::Int { bits: 32 }),
            blocks: vec![Block {
                phis: vec![],
                stmts: vec![Statement {
                    result: Some(ValueId(5)),
                    kind: StmtKind::Binary {
                        op: BinaryKind::Add,
                        lhs: ValueId(4),
                        rhs: ValueId(4),
                    },
                }],
                terminator: Terminator::Return {
                    value: Some(ValueId(5)),
                },
            }],
        };
        Module {
            functions: vec![main, double],
            locations: vec![],
            values,
        }
    }

    #[test]
    fn actuals_flow_into_formals_and_back() {
        let module = two_site_module();
        module.validate().unwrap();
        let ctx = AnalysisContext::new(32).unwrap();
        let mut graph = builder::build(&module, &ctx).unwrap();
        bind(&mut graph, &module).unwrap();
        builder::finalize_undefined(&mut graph, &module, &ctx);
        solve(&mut graph, &ctx, MeetStrategy::Crop);

        let formal = graph.range(ValueId(4)).as_scalar().unwrap().clone();
        assert_eq!(formal.lower(), &BigInt::from(3));
        assert_eq!(formal.upper(), &BigInt::from(7));
        // both results see the union over every call site
        let result = graph.range(ValueId(2)).as_scalar().unwrap().clone();
        assert_eq!(result.lower(), &BigInt::from(6));
        assert_eq!(result.upper(), &BigInt::from(14));
    }

    #[test]
    fn arity_mismatch_is_fatal() {
        let mut module = two_site_module();
        // corrupt the first call site
        if let StmtKind::Call { args, .. } = &mut module.functions[0].blocks[0].stmts[0].kind {
            args.push(ValueId(1));
        }
        let ctx = AnalysisContext::new(32).unwrap();
        let mut graph = builder::build(&module, &ctx).unwrap();
        assert!(bind(&mut graph, &module).is_err());
    }
}
