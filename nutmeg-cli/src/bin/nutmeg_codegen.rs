//! nutmeg-codegen: lower resolved functions to instruction streams.

use anyhow::Result;
use clap::Parser;
use nutmeg_cli::{init_tracing, StageArgs};
use nutmeg_core::codegen::CodeGenerator;

#[derive(Parser, Debug)]
#[command(version, about = "Code generator for the Nutmeg programming language")]
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

    let mut unit = cli.stage.read_tree()?;
    CodeGenerator::new().generate(&mut unit)?;
    cli.stage.write_tree(&unit)
}
