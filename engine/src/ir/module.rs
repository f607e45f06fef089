use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult, Unsupported};
use crate::ir::cfg::ControlFlowGraph;
use crate::ir::typing::Type;
use crate::ir::value::{BlockId, FuncId, Literal, ValueId, ValueInfo};

/// Unary statement tags
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub enum UnaryKind {
    Trunc,
    SignExtend,
    ZeroExtend,
    Neg,
    Abs,
    /// reinterpret an integer bit pattern as a float
    BitcastToFloat,
    /// reinterpret a float bit pattern as an integer
    BitcastToInt,
}

/// Binary statement tags
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
}

/// Comparison predicates
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub enum CmpPred {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl CmpPred {
    /// The predicate satisfied exactly when `self` is refuted
    pub fn inverse(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Ult => Self::Uge,
            Self::Ule => Self::Ugt,
            Self::Ugt => Self::Ule,
            Self::Uge => Self::Ult,
            Self::Slt => Self::Sge,
            Self::Sle => Self::Sgt,
            Self::Sgt => Self::Sle,
            Self::Sge => Self::Slt,
        }
    }

    /// The predicate with its operands exchanged (`a < b` becomes `b > a`)
    pub fn swapped(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Ult => Self::Ugt,
            Self::Ule => Self::Uge,
            Self::Ugt => Self::Ult,
            Self::Uge => Self::Ule,
            Self::Slt => Self::Sgt,
            Self::Sle => Self::Sge,
            Self::Sgt => Self::Slt,
            Self::Sge => Self::Sle,
        }
    }
}

/// An ordinary (non-phi) statement
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub enum StmtKind {
    Unary {
        op: UnaryKind,
        operand: ValueId,
    },
    Binary {
        op: BinaryKind,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cmp {
        pred: CmpPred,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// e-SSA copy inserted at a branch target; its constraining interval is
    /// recovered from the dominating terminator during graph construction
    Sigma {
        operand: ValueId,
    },
    Select {
        cond: ValueId,
        on_true: ValueId,
        on_false: ValueId,
    },
    Load {
        pointer: ValueId,
    },
    Store {
        pointer: ValueId,
        value: ValueId,
    },
    Call {
        callee: FuncId,
        args: Vec<ValueId>,
    },
    /// anything the operator set does not cover; carried for diagnostics
    Unsupported {
        opcode: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct Statement {
    /// defined value, absent for void statements (stores, void calls)
    #[serde(default)]
    pub result: Option<ValueId>,
    pub kind: StmtKind,
}

/// A phi statement at the head of a block
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct PhiStmt {
    pub result: ValueId,
    pub incoming: Vec<(ValueId, BlockId)>,
}

/// Block terminators
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub enum Terminator {
    Goto {
        target: BlockId,
    },
    Branch {
        cond: ValueId,
        on_true: BlockId,
        on_false: BlockId,
    },
    Switch {
        cond: ValueId,
        cases: Vec<(i128, BlockId)>,
        #[serde(default)]
        default: Option<BlockId>,
    },
    Return {
        #[serde(default)]
        value: Option<ValueId>,
    },
    Unreachable,
}

/// A basic block: phis first, then ordinary statements, then the terminator
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct Block {
    #[serde(default)]
    pub phis: Vec<PhiStmt>,
    #[serde(default)]
    pub stmts: Vec<Statement>,
    pub terminator: Terminator,
}

/// A function with a body
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<ValueId>,
    #[serde(default)]
    pub ret: Option<Type>,
    /// blocks in program order; index 0 is the entry block
    pub blocks: Vec<Block>,
}

/// A statically-initialized storage location, as exposed by the aliasing
/// oracle; loads and stores resolve to sets of these
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct MemoryLocation {
    pub ty: Type,
    /// initializer contents (one literal per element)
    #[serde(default)]
    pub initial: Vec<Literal>,
}

/// A whole program in single-assignment form
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct Module {
    pub functions: Vec<Function>,
    #[serde(default)]
    pub locations: Vec<MemoryLocation>,
    /// module-wide value table; every operand/result indexes into this
    pub values: Vec<ValueInfo>,
}

impl Module {
    pub fn value(&self, id: ValueId) -> &ValueInfo {
        &self.values[id.0]
    }

    pub fn literal(&self, id: ValueId) -> Option<&Literal> {
        self.values[id.0].literal.as_ref()
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0]
    }

    /// The widest scalar bit-width appearing anywhere in the program; seeds
    /// the analysis context
    pub fn max_bit_width(&self) -> u32 {
        let from_values = self.values.iter().map(|v| v.ty.bit_width());
        let from_locations = self.locations.iter().map(|l| l.ty.bit_width());
        from_values.chain(from_locations).max().unwrap_or(1)
    }

    /// Functions with no call site anywhere in the module
    pub fn root_functions(&self) -> Vec<FuncId> {
        let mut called = BTreeSet::new();
        for func in &self.functions {
            for block in &func.blocks {
                for stmt in &block.stmts {
                    if let StmtKind::Call { callee, .. } = &stmt.kind {
                        called.insert(*callee);
                    }
                }
            }
        }
        (0..self.functions.len())
            .map(FuncId)
            .filter(|f| !called.contains(f))
            .collect()
    }

    /// Functions reachable from the roots, in BFS order
    pub fn reachable_functions(&self) -> Vec<FuncId> {
        let mut order = vec![];
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<_> = self.root_functions().into();
        seen.extend(queue.iter().copied());
        while let Some(func) = queue.pop_front() {
            order.push(func);
            for block in &self.function(func).blocks {
                for stmt in &block.stmts {
                    if let StmtKind::Call { callee, .. } = &stmt.kind {
                        if seen.insert(*callee) {
                            queue.push_back(*callee);
                        }
                    }
                }
            }
        }
        order
    }

    /// Build the CFG of one function
    pub fn cfg(&self, func: FuncId) -> EngineResult<ControlFlowGraph> {
        ControlFlowGraph::build(&self.function(func).blocks)
    }

    /// Structural validation of the whole module
    pub fn validate(&self) -> EngineResult<()> {
        for value in &self.values {
            value.ty.validate()?;
            if let Some(points_to) = &value.points_to {
                if !value.ty.is_pointer() {
                    return Err(EngineError::InvalidAssumption(
                        "points-to set on a non-pointer value".into(),
                    ));
                }
                for loc in points_to {
                    if loc.0 >= self.locations.len() {
                        return Err(EngineError::InvariantViolation(format!(
                            "points-to set references unknown location {}",
                            loc.0
                        )));
                    }
                }
            }
        }

        let check_value = |id: &ValueId| -> EngineResult<()> {
            if id.0 >= self.values.len() {
                return Err(EngineError::InvariantViolation(format!(
                    "reference to unknown value {}",
                    id
                )));
            }
            Ok(())
        };

        let mut defined: BTreeMap<ValueId, usize> = BTreeMap::new();
        for (fi, func) in self.functions.iter().enumerate() {
            if func.blocks.is_empty() {
                return Err(EngineError::InvalidAssumption(format!(
                    "a function must have at least one basic block: {}",
                    func.name
                )));
            }
            let mut record_def = |id: ValueId| -> EngineResult<()> {
                check_value(&id)?;
                if self.literal(id).is_some() {
                    return Err(EngineError::InvariantViolation(format!(
                        "literal value {} used as a definition",
                        id
                    )));
                }
                if defined.insert(id, fi).is_some() {
                    return Err(EngineError::InvariantViolation(format!(
                        "value {} defined more than once",
                        id
                    )));
                }
                Ok(())
            };
            for param in &func.params {
                record_def(*param)?;
            }
            for block in &func.blocks {
                for phi in &block.phis {
                    record_def(phi.result)?;
                    for (value, _) in &phi.incoming {
                        check_value(value)?;
                    }
                }
                for stmt in &block.stmts {
                    if let Some(result) = stmt.result {
                        record_def(result)?;
                    }
                    // arithmetic over floats must arrive as Unsupported
                    // statements; over pointers it is not modeled at all
                    if let StmtKind::Binary { lhs, rhs, .. } = &stmt.kind {
                        for operand in [lhs, rhs] {
                            check_value(operand)?;
                            let ty = &self.value(*operand).ty;
                            if ty.is_float() {
                                return Err(EngineError::NotSupportedYet(
                                    Unsupported::FloatingArithmetic,
                                ));
                            }
                            if ty.is_pointer() {
                                return Err(EngineError::NotSupportedYet(
                                    Unsupported::PointerArithmetic,
                                ));
                            }
                        }
                    }
                    if let StmtKind::Call { callee, args } = &stmt.kind {
                        if callee.0 >= self.functions.len() {
                            return Err(EngineError::InvariantViolation(format!(
                                "call to unknown function {}",
                                callee.0
                            )));
                        }
                        if args.len() != self.function(*callee).params.len() {
                            return Err(EngineError::InvalidAssumption(format!(
                                "argument count mismatch calling {}",
                                self.function(*callee).name
                            )));
                        }
                        if stmt.result.is_some() != self.function(*callee).ret.is_some() {
                            return Err(EngineError::InvalidAssumption(format!(
                                "return-value expectation mismatch calling {}",
                                self.function(*callee).name
                            )));
                        }
                    }
                }
            }
            // CFG construction performs the edge-level checks
            ControlFlowGraph::build(&func.blocks)?;
        }
        Ok(())
    }
}
