use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use structopt::StructOpt;

use varan_engine::{analyze, MeetStrategy};
use varan_shared::config::PATH_STUDIO;
use varan_shared::logging;

#[derive(StructOpt)]
#[structopt(
    name = "varan-engine",
    about = "Static value-range analysis over synthesis IR",
    rename_all = "kebab-case"
)]
struct Args {
    /// Verbosity
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Meet strategy for the refinement phase
    #[structopt(short, long, default_value = "crop")]
    strategy: Strategy,

    /// Dump the constraint graph in dot format under the studio directory
    #[structopt(long)]
    dump_graph: bool,

    /// Workspace for analysis artifacts
    #[structopt(short = "w", long)]
    studio: Option<PathBuf>,

    /// Write the solved ranges here instead of stdout
    #[structopt(short, long)]
    output: Option<PathBuf>,

    /// Module to analyze, in JSON form
    input: PathBuf,
}

struct Strategy(MeetStrategy);

impl FromStr for Strategy {
    type Err = &'static str;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let strategy = match s {
            "crop" => MeetStrategy::Crop,
            "cousot" => MeetStrategy::Cousot,
            _ => return Err("invalid meet strategy"),
        };
        Ok(Self(strategy))
    }
}

fn main() -> Result<()> {
    let args = Args::from_args();
    let Args {
        verbose,
        strategy,
        dump_graph,
        studio,
        output,
        input,
    } = args;

    // setup logging
    logging::setup(Some(verbose))?;

    // load and solve
    let (module, analysis) = analyze(&input, strategy.0)?;

    if dump_graph {
        let studio = studio.as_ref().unwrap_or(&PATH_STUDIO);
        fs::create_dir_all(studio)?;
        let path = studio.join("graph.dot");
        fs::write(&path, analysis.graph().dump_dot(&module))?;
    }

    // report
    match output {
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            analysis.dump(&module, &mut handle)?;
            handle.flush()?;
        }
        Some(path) => {
            let mut file = fs::File::create(path)?;
            analysis.dump(&module, &mut file)?;
        }
    }
    Ok(())
}
