use std::fs;
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::ir::module::Module;

pub mod cfg;
pub mod module;
pub mod typing;
pub mod value;

/// Load a serialized IR module from disk and validate it
pub fn load(path: &Path) -> EngineResult<Module> {
    let content = fs::read_to_string(path)
        .map_err(|e| EngineError::ModuleLoadingError(format!("unable to read module: {}", e)))?;
    let module: Module = serde_json::from_str(&content)
        .map_err(|e| EngineError::ModuleLoadingError(format!("unable to parse module: {}", e)))?;
    module.validate()?;
    Ok(module)
}
