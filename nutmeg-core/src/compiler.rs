//! The integrated in-memory pipeline.
//!
//! Drivers that want the whole toolchain in one call use
//! [`compile_source`]: tokenize, parse, check, rewrite, resolve, generate.
//! Each stage is also available separately so the per-stage binaries can
//! pipe JSON trees between processes instead.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::bundle::instruction::FunctionObject;
use crate::bundle::fn_to_function_object;
use crate::checker::Checker;
use crate::codegen::CodeGenerator;
use crate::error::CoreError;
use crate::node::{Node, NAME_BIND, OPTION_NAME};
use crate::parser::parse_unit;
use crate::resolve::Resolver;
use crate::rewrite::{config, Rewriter};
use crate::token::Token;
use crate::tokenizer::{load_rules_file, Tokenizer, TokenizerRules};

#[derive(Debug, Default, Clone)]
pub struct CompileOptions {
    /// YAML tokenizer rules; the built-in table when absent.
    pub token_rules: Option<PathBuf>,
    /// YAML rewrite rules; the built-in document when absent.
    pub rewrite_rules: Option<PathBuf>,
    /// Bound on rewrite fixed-point iteration; 0 means unlimited.
    pub max_rewrites: u32,
    /// Drop rewrite passes marked optional.
    pub skip_optional: bool,
}

/// The result of compiling one unit: the final tree plus each binding's
/// function object in bundle layout.
#[derive(Debug, PartialEq)]
pub struct CompilationArtifact {
    pub unit: Node,
    pub functions: Vec<(String, FunctionObject)>,
}

/// Tokenize source text, honouring an optional rules file.
pub fn tokenize_source(
    source: &str,
    token_rules: Option<&Path>,
) -> Result<Vec<Token>, CoreError> {
    let rules = match token_rules {
        Some(path) => TokenizerRules::with_overrides(&load_rules_file(path)?)?,
        None => TokenizerRules::default_rules(),
    };
    Tokenizer::with_rules(source, rules).tokenize()
}

/// Build the rewriter from an optional rules file.
pub fn load_rewriter(
    rewrite_rules: Option<&Path>,
    skip_optional: bool,
) -> Result<Rewriter, CoreError> {
    let rewrite_config = match rewrite_rules {
        Some(path) => config::load_rewrite_config(path)?,
        None => config::load_rewrite_config_from_str(crate::rewrite::DEFAULT_REWRITE_RULES)?,
    };
    Rewriter::with_options(&rewrite_config, skip_optional)
}

/// Run the full pipeline over one source text. Checker diagnostics are
/// written to `diagnostics` before the unit is rejected.
pub fn compile_source(
    source: &str,
    src_path: &str,
    options: &CompileOptions,
    diagnostics: &mut dyn Write,
) -> Result<CompilationArtifact, CoreError> {
    let tokens = tokenize_source(source, options.token_rules.as_deref())?;
    let unit = parse_unit(tokens, src_path)?;

    let mut checker = Checker::new();
    if !checker.check(&unit) {
        checker.report(diagnostics)?;
        return Err(CoreError::SyntaxRejected);
    }

    let rewriter = load_rewriter(options.rewrite_rules.as_deref(), options.skip_optional)?;
    let (mut unit, _) = rewriter.rewrite(unit, options.max_rewrites)?;

    Resolver::new().resolve(&mut unit)?;
    CodeGenerator::new().generate(&mut unit)?;

    let mut functions = Vec::new();
    for child in &unit.children {
        if child.name == NAME_BIND {
            let name = child.children[0]
                .option(OPTION_NAME)
                .unwrap_or_default()
                .to_string();
            functions.push((name, fn_to_function_object(&child.children[1])?));
        }
    }
    Ok(CompilationArtifact { unit, functions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::instruction::Instruction;

    fn compile(source: &str) -> CompilationArtifact {
        let mut diagnostics = Vec::new();
        let artifact = compile_source(source, "test.nutmeg", &CompileOptions::default(), &mut diagnostics);
        assert!(
            diagnostics.is_empty(),
            "unexpected diagnostics: {}",
            String::from_utf8_lossy(&diagnostics)
        );
        artifact.expect("compilation succeeds")
    }

    #[test]
    fn compiles_the_increment_function_end_to_end() {
        let artifact = compile("def f(x) =>> x + 1 end");
        assert_eq!(artifact.functions.len(), 1);
        let (name, function) = &artifact.functions[0];
        assert_eq!(name, "f");
        assert_eq!(function.nparams, 1);
        assert_eq!(function.nlocals, 1);
        assert_eq!(
            function.instructions,
            vec![
                Instruction::pop_local(0),
                Instruction::push_local(0),
                Instruction::push_int(1),
                Instruction::syscall_counted("+", 2),
                Instruction::ret(),
            ]
        );
    }

    #[test]
    fn lifts_inner_lambdas_into_separate_functions() {
        let artifact = compile("def g() =>> fn(x) =>> x end end");
        assert_eq!(artifact.functions.len(), 2);
        let (lifted_name, lifted) = &artifact.functions[0];
        assert!(lifted_name.starts_with("tmp-"));
        assert_eq!(
            lifted.instructions,
            vec![
                Instruction::pop_local(0),
                Instruction::push_local(0),
                Instruction::ret(),
            ]
        );
    }

    #[test]
    fn captured_closures_compile_through_partapply() {
        let artifact = compile("def h(x) =>> fn(y) =>> x + y end end");
        let (_, h) = artifact
            .functions
            .iter()
            .find(|(name, _)| name == "h")
            .expect("h compiled");
        // h pushes its local x, the lifted closure, then builds the
        // partial application.
        let kinds: Vec<&str> = h.instructions.iter().map(|i| i.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "pop.local",
                "push.local",
                "push.global",
                "syscall.counted",
                "return"
            ]
        );
        let partapply = &h.instructions[3];
        assert_eq!(partapply.name.as_deref(), Some("partapply"));
        assert_eq!(partapply.index, Some(2));
    }

    #[test]
    fn dot_calls_pass_the_receiver_as_the_first_argument() {
        let artifact = compile("def m(x) =>> x.f(1) end");
        let (_, m) = &artifact.functions[0];
        let kinds: Vec<&str> = m.instructions.iter().map(|i| i.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "pop.local",
                "stack.length",
                "push.local",
                "push.int",
                "call.global.counted",
                "return",
            ]
        );
        assert_eq!(m.instructions[4].name.as_deref(), Some("f"));
    }

    #[test]
    fn checker_diagnostics_reach_the_sink() {
        let mut diagnostics = Vec::new();
        let err = compile_source(
            "def f(1) =>> 0 end",
            "",
            &CompileOptions::default(),
            &mut diagnostics,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::SyntaxRejected));
        let report = String::from_utf8(diagnostics).unwrap();
        assert!(report.contains("Errors found in the source code:"));
    }

    #[test]
    fn conditional_pipeline_matches_the_query_scheme() {
        let artifact = compile("def f(p) =>> if p then 1 else 2 end end");
        let (_, f) = &artifact.functions[0];
        let kinds: Vec<&str> = f.instructions.iter().map(|i| i.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "pop.local",
                "stack.length",
                "push.local",
                "check.bool",
                "if.not",
                "push.int",
                "goto",
                "label",
                "push.int",
                "label",
                "return",
            ]
        );
    }
}
