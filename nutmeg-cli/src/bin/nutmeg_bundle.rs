//! nutmeg-bundle: upsert a generated unit into a bundle store.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use nutmeg_cli::{init_tracing, StageArgs};
use nutmeg_core::bundle::Bundler;

#[derive(Parser, Debug)]
#[command(version, about = "Bundler for the Nutmeg programming language")]
struct Cli {
    #[command(flatten)]
    stage: StageArgs,

    /// Bundle store path (required).
    #[arg(long)]
    bundle: PathBuf,

    /// Migrate an existing out-of-date store instead of refusing it.
    #[arg(long)]
    migrate: bool,

    /// Enable debug output on stderr.
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let unit = cli.stage.read_tree()?;
    let store_exists = cli.bundle.exists();
    let mut bundler = Bundler::open(&cli.bundle)?;

    if !bundler.is_up_to_date() {
        // A fresh store migrates automatically; an existing one only when
        // asked to.
        if !store_exists || cli.migrate {
            bundler.migrate();
        } else {
            bail!("bundle schema is not up to date; pass --migrate to upgrade it");
        }
    }

    bundler.process_unit(&unit)?;
    bundler.save()?;
    Ok(())
}
