use std::path::Path;

pub use analysis::solver::MeetStrategy;
pub use analysis::RangeAnalysis;
pub use error::EngineError;

use crate::error::EngineResult;
use crate::ir::module::Module;

pub mod analysis;
pub mod error;
pub mod ir;

/// Main entrypoint: load a module from disk and solve it
pub fn analyze(input: &Path, strategy: MeetStrategy) -> EngineResult<(Module, RangeAnalysis)> {
    let module = ir::load(input)?;
    let analysis = RangeAnalysis::run(&module, strategy)?;
    Ok((module, analysis))
}
