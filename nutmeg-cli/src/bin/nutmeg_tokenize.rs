//! nutmeg-tokenize: source text to a JSON token stream, one per line.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nutmeg_cli::{init_tracing, StageArgs};
use nutmeg_core::compiler::tokenize_source;

#[derive(Parser, Debug)]
#[command(version, about = "Tokenizer for the Nutmeg programming language")]
struct Cli {
    #[command(flatten)]
    stage: StageArgs,

    /// YAML file containing tokenizer rules.
    #[arg(long)]
    token_rules: Option<PathBuf>,

    /// Enable debug output on stderr.
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let source = cli.stage.read_input()?;
    let tokens = tokenize_source(&source, cli.token_rules.as_deref())?;

    let mut output = cli.stage.open_output()?;
    for token in &tokens {
        let line = serde_json::to_string(token).context("failed to serialize token")?;
        writeln!(output, "{line}")?;
    }
    Ok(())
}
