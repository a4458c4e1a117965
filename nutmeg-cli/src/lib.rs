//! Shared plumbing for the stage drivers.
//!
//! Every stage binary accepts the same IO and formatting flags; the
//! per-stage binaries add their own. Trees travel between stages as JSON
//! over stdin/stdout so drivers can be piped together.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use nutmeg_core::node::Node;
use nutmeg_core::output::{print_tree, read_tree_json, Format, PrintOptions};

/// Flags common to every stage driver.
#[derive(Args, Debug)]
pub struct StageArgs {
    /// Input file (defaults to stdin).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output file (defaults to stdout).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format: JSON, XML, YAML, MERMAID, ASCIITREE, DOT.
    #[arg(short, long, default_value = "JSON")]
    pub format: String,

    /// Source path recorded on the unit node.
    #[arg(long, default_value = "")]
    pub src_path: String,

    /// Trim displayed token values to this many characters (0 = off).
    #[arg(long, default_value_t = 0)]
    pub trim: usize,

    /// Suppress span information in the output.
    #[arg(long)]
    pub no_spans: bool,
}

impl StageArgs {
    pub fn read_input(&self) -> Result<String> {
        match &self.input {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read input file {}", path.display())),
            None => {
                let mut buffer = String::new();
                io::stdin()
                    .read_to_string(&mut buffer)
                    .context("failed to read stdin")?;
                Ok(buffer)
            }
        }
    }

    pub fn read_tree(&self) -> Result<Node> {
        let text = self.read_input()?;
        read_tree_json(text.as_bytes()).context("failed to decode input tree")
    }

    pub fn open_output(&self) -> Result<Box<dyn Write>> {
        match &self.output {
            Some(path) => {
                let file = fs::File::create(path)
                    .with_context(|| format!("failed to create output file {}", path.display()))?;
                Ok(Box::new(file))
            }
            None => Ok(Box::new(io::stdout())),
        }
    }

    pub fn print_options(&self) -> PrintOptions {
        PrintOptions {
            include_spans: !self.no_spans,
            trim: self.trim,
            ..PrintOptions::default()
        }
    }

    pub fn write_tree(&self, node: &Node) -> Result<()> {
        let format: Format = self
            .format
            .parse()
            .with_context(|| format!("unknown format {}", self.format))?;
        let mut output = self.open_output()?;
        print_tree(node, format, &self.print_options(), &mut output)
            .context("failed to write tree")?;
        Ok(())
    }
}

/// Route `tracing` output to stderr; `--debug` raises the filter.
pub fn init_tracing(debug: bool) {
    let filter = if debug { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        stage: StageArgs,
    }

    #[test]
    fn stage_flags_parse_with_defaults() {
        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.stage.format, "JSON");
        assert_eq!(cli.stage.trim, 0);
        assert!(!cli.stage.no_spans);
    }

    #[test]
    fn stage_flags_accept_overrides() {
        let cli = TestCli::parse_from([
            "test",
            "--input",
            "in.json",
            "--output",
            "out.xml",
            "--format",
            "xml",
            "--trim",
            "12",
            "--no-spans",
        ]);
        assert_eq!(cli.stage.input.as_deref().unwrap().to_str(), Some("in.json"));
        assert_eq!(cli.stage.format, "xml");
        assert_eq!(cli.stage.trim, 12);
        assert!(cli.stage.no_spans);
    }

    #[test]
    fn write_tree_respects_format_and_output_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.xml");
        let cli = TestCli::parse_from([
            "test",
            "--output",
            path.to_str().unwrap(),
            "--format",
            "XML",
        ]);
        let mut node = Node::new("unit");
        node.add_child(Node::new("bind"));
        cli.stage.write_tree(&node).expect("write");
        let text = fs::read_to_string(&path).expect("read back");
        assert!(text.contains("<unit>"));
    }
}
