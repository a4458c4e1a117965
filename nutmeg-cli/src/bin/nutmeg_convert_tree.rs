//! nutmeg-convert-tree: re-render a JSON tree in another format.

use anyhow::Result;
use clap::Parser;
use nutmeg_cli::{init_tracing, StageArgs};

#[derive(Parser, Debug)]
#[command(version, about = "Tree format converter for the Nutmeg toolchain")]
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
    cli.stage.write_tree(&unit)
}
