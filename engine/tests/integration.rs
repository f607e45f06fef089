use std::fs;
use std::path::Path;

use anyhow::anyhow;
use datatest_stable::{harness, Result};

use varan_engine::{analyze, MeetStrategy};

/// Each corpus entry is a serialized module next to an `.expected` file
/// holding the `name = range` dump; both meet strategies must agree on
/// these programs.
fn run_test(path_expected: &Path) -> Result<()> {
    let expected = fs::read_to_string(path_expected)?;
    let path_input = path_expected.with_extension("json");

    for strategy in [MeetStrategy::Crop, MeetStrategy::Cousot] {
        let (module, analysis) = analyze(&path_input, strategy).map_err(|e| anyhow!("{}", e))?;
        let mut buffer = vec![];
        analysis.dump(&module, &mut buffer)?;
        let obtained = String::from_utf8(buffer)?;
        if obtained.trim() != expected.trim() {
            return Err(anyhow!(
                "mismatch under {:?}:\n{}\n<- expected vs obtained ->\n{}",
                strategy,
                expected,
                obtained
            )
            .into());
        }
    }
    Ok(())
}

harness!(run_test, "tests/corpus", r"expected$");
