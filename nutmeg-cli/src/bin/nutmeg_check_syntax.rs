//! nutmeg-check-syntax: validate a parsed tree, reporting every
//! diagnostic before failing.

use anyhow::Result;
use clap::Parser;
use nutmeg_cli::{init_tracing, StageArgs};
use nutmeg_core::checker::Checker;

#[derive(Parser, Debug)]
#[command(version, about = "Syntax checker for the Nutmeg programming language")]
struct Cli {
    #[command(flatten)]
    stage: StageArgs,

    /// Enable debug output on stderr.
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let unit = cli.stage.read_tree()?;
    let mut checker = Checker::new();
    if !checker.check(&unit) {
        checker.report(&mut std::io::stderr())?;
        std::process::exit(1);
    }
    cli.stage.write_tree(&unit)
}
