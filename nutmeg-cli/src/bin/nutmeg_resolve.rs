//! nutmeg-resolve: annotate identifiers, realise closures, lift lambdas.

use anyhow::Result;
use clap::Parser;
use nutmeg_cli::{init_tracing, StageArgs};
use nutmeg_core::resolve::Resolver;

#[derive(Parser, Debug)]
#[command(version, about = "Identifier resolver for the Nutmeg programming language")]
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
    Resolver::new().resolve(&mut unit)?;
    cli.stage.write_tree(&unit)
}
