use std::error::Error;
use std::fmt::{Display, Formatter};

/// A list of IR constructs the analysis does not model
#[derive(Debug, Clone)]
pub enum Unsupported {
    FloatingArithmetic,
    PointerArithmetic,
}

impl Display for Unsupported {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FloatingArithmetic => {
                write!(f, "floating-point arithmetic")
            }
            Self::PointerArithmetic => {
                write!(f, "pointer arithmetic")
            }
        }
    }
}

/// A custom error message for the analysis engine
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Error during the loading of a serialized IR module
    ModuleLoadingError(String),
    /// Invalid assumption made about the program
    InvalidAssumption(String),
    /// Operation not supported yet
    NotSupportedYet(Unsupported),
    /// Invariant violation
    InvariantViolation(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModuleLoadingError(msg) => {
                write!(f, "[varan::loading] {}", msg)
            }
            Self::InvalidAssumption(msg) => {
                write!(f, "[varan::assumption] {}", msg)
            }
            Self::NotSupportedYet(item) => {
                write!(f, "[varan::unsupported] {}", item)
            }
            Self::InvariantViolation(msg) => {
                write!(f, "[varan::invariant] {}", msg)
            }
        }
    }
}

impl Error for EngineError {}
