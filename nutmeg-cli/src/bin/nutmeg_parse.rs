//! nutmeg-parse: a JSON token stream to the initial tree.

use anyhow::{Context, Result};
use clap::Parser;
use nutmeg_cli::{init_tracing, StageArgs};
use nutmeg_core::parser::parse_unit;
use nutmeg_core::token::Token;

#[derive(Parser, Debug)]
#[command(version, about = "Parser for the Nutmeg programming language")]
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

    let input = cli.stage.read_input()?;
    let tokens = input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<Token>(line).context("failed to decode token line"))
        .collect::<Result<Vec<_>>>()?;

    let unit = parse_unit(tokens, &cli.stage.src_path)?;
    cli.stage.write_tree(&unit)
}
