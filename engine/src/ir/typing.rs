use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Maximum scalar bit-width the analysis accepts
pub const MAX_SCALAR_BITS: u32 = 128;

/// A scalar type in the synthesis IR
///
/// The type doubles as the bit-width oracle of the host compiler: every
/// value carries one of these, and the analysis derives widths, signedness
/// and the floating-point decomposition from it.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub enum Type {
    /// single-bit logical value
    Bool,
    /// signed two's-complement integer
    Int { bits: u32 },
    /// unsigned integer
    UInt { bits: u32 },
    /// IEEE-754-style float described by its exponent/fraction field widths
    Float { exponent: u32, fraction: u32 },
    /// opaque pointer into statically-resolved storage
    Pointer,
}

impl Type {
    /// Total storage width in bits
    pub fn bit_width(&self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::Int { bits } | Self::UInt { bits } => *bits,
            Self::Float { exponent, fraction } => 1 + exponent + fraction,
            // pointers never enter the numeric domain; width is nominal
            Self::Pointer => MAX_SCALAR_BITS,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Int { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer)
    }

    /// Field widths of the sign/exponent/fraction decomposition
    pub fn float_fields(&self) -> Option<(u32, u32, u32)> {
        match self {
            Self::Float { exponent, fraction } => Some((1, *exponent, *fraction)),
            _ => None,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        let bits = self.bit_width();
        if bits == 0 || bits > MAX_SCALAR_BITS {
            return Err(EngineError::InvariantViolation(format!(
                "bit-width out of range: {}",
                bits
            )));
        }
        Ok(())
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int { bits } => write!(f, "i{}", bits),
            Self::UInt { bits } => write!(f, "u{}", bits),
            Self::Float { exponent, fraction } => write!(f, "f<{},{}>", exponent, fraction),
            Self::Pointer => write!(f, "ptr"),
        }
    }
}
