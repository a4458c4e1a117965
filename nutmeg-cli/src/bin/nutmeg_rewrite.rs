//! nutmeg-rewrite: apply rewrite passes to a tree until it stops
//! changing.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use nutmeg_cli::{init_tracing, StageArgs};
use nutmeg_core::compiler::load_rewriter;
use nutmeg_core::rewrite::DEFAULT_REWRITE_RULES;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Tree rewriter for the Nutmeg programming language")]
struct Cli {
    #[command(flatten)]
    stage: StageArgs,

    /// YAML file containing rewrite rules (defaults to the built-in set).
    #[arg(long)]
    rewrite_rules: Option<PathBuf>,

    /// Maximum number of rewrite iterations (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    max_rewrites: u32,

    /// Enable debug output on stderr.
    #[arg(long)]
    debug: bool,

    /// Skip optional rewrite passes.
    #[arg(long)]
    skip_optional: bool,

    /// Print the built-in rewrite rules and exit.
    #[arg(long)]
    make_rewrite_rules: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if cli.make_rewrite_rules {
        print!("{DEFAULT_REWRITE_RULES}");
        return Ok(());
    }

    let rewriter = load_rewriter(cli.rewrite_rules.as_deref(), cli.skip_optional)?;
    let mut unit = cli.stage.read_tree()?;

    // Repeat the whole pass list until a fixed point, bounded by the
    // caller-supplied iteration limit.
    let mut iteration = 0u32;
    loop {
        iteration += 1;
        if cli.max_rewrites > 0 && iteration > cli.max_rewrites {
            warn!(limit = cli.max_rewrites, "stopped before a fixed point");
            break;
        }
        let (rewritten, changed) = rewriter.rewrite(unit, cli.max_rewrites)?;
        unit = rewritten;
        if !changed {
            debug!(iteration, "fixed point reached");
            break;
        }
    }

    cli.stage.write_tree(&unit)
}
