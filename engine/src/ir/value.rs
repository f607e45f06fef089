use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ir::typing::Type;

/// Index of a value in the module-wide value table
#[derive(
    Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default,
)]
#[serde(transparent)]
pub struct ValueId(pub usize);

/// Index of a basic block within its function
#[derive(
    Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default,
)]
#[serde(transparent)]
pub struct BlockId(pub usize);

/// Index of a function in the module
#[derive(
    Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default,
)]
#[serde(transparent)]
pub struct FuncId(pub usize);

/// Index of a storage location in the module
#[derive(
    Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default,
)]
#[serde(transparent)]
pub struct LocationId(pub usize);

impl Display for ValueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// An exact literal value, as reported by the constant-value oracle
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub enum Literal {
    /// wide integer (also used for booleans, 0 or 1)
    Int(i128),
    /// raw IEEE bit pattern, already split into its fields
    Float { sign: u8, exponent: u64, fraction: u128 },
}

/// One entry of the module-wide value table
///
/// A value is either SSA-defined by a statement, a function parameter, or a
/// literal; the distinction is recoverable from `literal` plus the def-map
/// the graph builder computes.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct ValueInfo {
    /// declared type (the bit-width oracle)
    pub ty: Type,
    /// literal payload, if the value is a constant
    #[serde(default)]
    pub literal: Option<Literal>,
    /// source-level name, if any survived lowering
    #[serde(default)]
    pub name: Option<String>,
    /// for pointer values: the statically-resolved points-to set, if the
    /// aliasing oracle could bound it (absent means "unresolvable")
    #[serde(default)]
    pub points_to: Option<BTreeSet<LocationId>>,
}
