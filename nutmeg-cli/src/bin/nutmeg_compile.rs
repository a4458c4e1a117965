//! nutmeg-compile: the integrated toolchain. Tokenizes, parses, checks,
//! rewrites, resolves, generates code, and bundles in memory.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use nutmeg_cli::init_tracing;
use nutmeg_core::bundle::Bundler;
use nutmeg_core::compiler::{compile_source, CompileOptions};

#[derive(Parser, Debug)]
#[command(version, about = "Integrated Nutmeg compiler toolchain")]
struct Cli {
    /// Input source file (required; also recorded as the unit's source
    /// path).
    #[arg(short, long)]
    input: PathBuf,

    /// Bundle store path (required).
    #[arg(long)]
    bundle: PathBuf,

    /// YAML file containing tokenizer rules.
    #[arg(long)]
    token_rules: Option<PathBuf>,

    /// YAML file containing rewrite rules.
    #[arg(long)]
    rewrite_rules: Option<PathBuf>,

    /// Maximum number of rewrite iterations (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    max_rewrites: u32,

    /// Skip optional rewrite passes.
    #[arg(long)]
    skip_optional: bool,

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
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read input file {}", cli.input.display()))?;
    let src_path = cli.input.to_string_lossy().to_string();

    let options = CompileOptions {
        token_rules: cli.token_rules.clone(),
        rewrite_rules: cli.rewrite_rules.clone(),
        max_rewrites: cli.max_rewrites,
        skip_optional: cli.skip_optional,
    };
    let artifact = compile_source(&source, &src_path, &options, &mut std::io::stderr())?;

    let store_exists = cli.bundle.exists();
    let mut bundler = Bundler::open(&cli.bundle)?;
    if !bundler.is_up_to_date() {
        if !store_exists || cli.migrate {
            bundler.migrate();
        } else {
            bail!("bundle schema is not up to date; pass --migrate to upgrade it");
        }
    }
    bundler.process_unit(&artifact.unit)?;
    bundler.record_source(&src_path, &source);
    bundler.save()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutmeg_core::bundle::Bundler;
    use tempfile::tempdir;

    fn cli(input: &std::path::Path, bundle: &std::path::Path) -> Cli {
        Cli {
            input: input.to_path_buf(),
            bundle: bundle.to_path_buf(),
            token_rules: None,
            rewrite_rules: None,
            max_rewrites: 0,
            skip_optional: false,
            migrate: false,
            debug: false,
        }
    }

    #[test]
    fn compiles_a_source_file_into_a_bundle() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("demo.nutmeg");
        fs::write(&input, "def f(x) =>> x + 1 end").expect("write input");
        let bundle = dir.path().join("demo.bundle");

        execute(cli(&input, &bundle)).expect("compile succeeds");

        let bundler = Bundler::open(&bundle).expect("open bundle");
        assert!(bundler.is_up_to_date());
        assert!(bundler.store().bindings.contains_key("f"));
        assert!(bundler
            .store()
            .source_files
            .keys()
            .any(|k| k.ends_with("demo.nutmeg")));
    }

    #[test]
    fn reuses_an_existing_bundle_store() {
        let dir = tempdir().expect("tempdir");
        let bundle = dir.path().join("demo.bundle");

        let first = dir.path().join("first.nutmeg");
        fs::write(&first, "def f(x) =>> x end").expect("write input");
        execute(cli(&first, &bundle)).expect("first compile");

        let second = dir.path().join("second.nutmeg");
        fs::write(&second, "def g(y) =>> y end").expect("write input");
        execute(cli(&second, &bundle)).expect("second compile");

        let bundler = Bundler::open(&bundle).expect("open bundle");
        assert!(bundler.store().bindings.contains_key("f"));
        assert!(bundler.store().bindings.contains_key("g"));
    }

    #[test]
    fn reports_source_errors_with_nonzero_result() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("broken.nutmeg");
        fs::write(&input, "def f(1) =>> 0 end").expect("write input");
        let bundle = dir.path().join("demo.bundle");

        let err = execute(cli(&input, &bundle)).unwrap_err();
        assert!(err.to_string().contains("syntax errors"), "got: {err}");
        assert!(!bundle.exists(), "failed compiles must not write a bundle");
    }

    #[test]
    fn rejects_a_redeclared_constant() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("redeclare.nutmeg");
        fs::write(&input, "const x := 1\nx := 2").expect("write input");
        let bundle = dir.path().join("demo.bundle");

        let err = execute(cli(&input, &bundle)).unwrap_err();
        assert!(
            err.to_string()
                .contains("trying to re-declare protected identifier: x"),
            "got: {err}"
        );
    }
}
