use std::env;
use std::path::PathBuf;

use lazy_static::lazy_static;

// common configurations
lazy_static! {
    /// Disables the depth-tracked tracer (its indentation is meaningless
    /// when multiple analyses interleave their output)
    pub static ref PARALLEL: bool = matches!(env::var("VARAN_PARALLEL"), Ok(val) if val == "1");

    /// Root of the repository checkout
    pub static ref PATH_ROOT: PathBuf = {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        assert!(path.pop());
        path
    };

    /// Where analysis artifacts (range listings, graph dumps) land by default
    pub static ref PATH_STUDIO: PathBuf = PATH_ROOT.join("studio");
}
