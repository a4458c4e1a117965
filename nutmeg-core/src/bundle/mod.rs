//! Bundling: persisting compiled units.
//!
//! The bundle store keeps tables for entry points, dependency edges,
//! bindings (id-name, lazy flag, serialized value, source filename), source
//! files, and annotations, plus a linear migration history. A fresh store
//! is migrated automatically; an out-of-date existing store is refused
//! until migration is requested explicitly. The store persists as a single
//! JSON document.

pub mod instruction;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::node::{
    Node, NAME_ANNOTATIONS, NAME_BIND, NAME_FN, NAME_IDENTIFIER, NAME_UNIT, OPTION_LAZY,
    OPTION_NAME, OPTION_NLOCALS, OPTION_NPARAMS, OPTION_SRC,
};

use self::instruction::{FunctionObject, Instruction};

/// The linear migration history. New schema revisions append here.
const MIGRATIONS: &[&str] = &["202511250001"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub lazy: bool,
    /// The bound value as serialized tree JSON.
    pub value: String,
    pub file_name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BundleStore {
    #[serde(default)]
    pub migrations: Vec<String>,
    #[serde(default)]
    pub entry_points: BTreeSet<String>,
    #[serde(default)]
    pub depends_on: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub bindings: BTreeMap<String, Binding>,
    #[serde(default)]
    pub source_files: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, BTreeMap<String, String>>,
}

/// Writes compiled units into a bundle store.
pub struct Bundler {
    path: PathBuf,
    store: BundleStore,
    /// Annotations seen since the last bind; attached to the next one.
    pending_annotations: Vec<String>,
}

impl Bundler {
    /// Open a store file, loading its contents when it already exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Bundler, CoreError> {
        let path = path.as_ref().to_path_buf();
        let store = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)
                .map_err(|e| CoreError::Bundle(format!("failed to read bundle store: {e}")))?
        } else {
            BundleStore::default()
        };
        Ok(Bundler {
            path,
            store,
            pending_annotations: Vec::new(),
        })
    }

    /// Whether the store schema matches the latest migration.
    pub fn is_up_to_date(&self) -> bool {
        self.store.migrations.last().map(String::as_str) == MIGRATIONS.last().copied()
    }

    /// Apply any missing migrations, in order.
    pub fn migrate(&mut self) {
        for migration in MIGRATIONS {
            if !self.store.migrations.iter().any(|m| m == migration) {
                self.store.migrations.push(migration.to_string());
            }
        }
    }

    /// Upsert the contents of a compiled unit.
    pub fn process_unit(&mut self, unit: &Node) -> Result<(), CoreError> {
        if unit.name != NAME_UNIT {
            return Err(CoreError::Bundle(format!(
                "expected unit node, got {}",
                unit.name
            )));
        }
        let src_path = unit.option(OPTION_SRC).unwrap_or("").to_string();
        for child in &unit.children {
            match child.name.as_str() {
                NAME_ANNOTATIONS => self.collect_annotations(child),
                NAME_BIND => self.process_bind(child, &src_path)?,
                other => {
                    return Err(CoreError::Bundle(format!(
                        "unexpected top-level node: {other}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn record_source(&mut self, file_name: &str, contents: &str) {
        self.store
            .source_files
            .insert(file_name.to_string(), contents.to_string());
    }

    pub fn store(&self) -> &BundleStore {
        &self.store
    }

    /// Write the store back to disk.
    pub fn save(&self) -> Result<(), CoreError> {
        let text = serde_json::to_string_pretty(&self.store)
            .map_err(|e| CoreError::Bundle(format!("failed to serialize bundle store: {e}")))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    fn collect_annotations(&mut self, node: &Node) {
        for child in &node.children {
            if child.name == NAME_IDENTIFIER {
                if let Some(key) = child.option(OPTION_NAME) {
                    self.pending_annotations.push(key.to_string());
                }
            }
        }
    }

    fn process_bind(&mut self, bind: &Node, src_path: &str) -> Result<(), CoreError> {
        if bind.children.len() != 2 {
            return Err(CoreError::Bundle(
                "bind node must have exactly 2 children".to_string(),
            ));
        }
        let id = &bind.children[0];
        if id.name != NAME_IDENTIFIER {
            return Err(CoreError::Bundle(format!(
                "expected id node, got {}",
                id.name
            )));
        }
        let id_name = id
            .option(OPTION_NAME)
            .ok_or_else(|| CoreError::Bundle("id node missing name option".to_string()))?
            .to_string();
        let value = serde_json::to_string(&bind.children[1])
            .map_err(|e| CoreError::Bundle(format!("failed to serialize value node: {e}")))?;

        self.store.bindings.insert(
            id_name.clone(),
            Binding {
                lazy: bind.option_is_true(OPTION_LAZY),
                value,
                file_name: src_path.to_string(),
            },
        );

        for key in self.pending_annotations.drain(..) {
            self.store
                .annotations
                .entry(id_name.clone())
                .or_default()
                .insert(key, String::new());
        }
        Ok(())
    }
}

/// Convert a generated `fn` node to a [`FunctionObject`].
pub fn fn_to_function_object(fn_node: &Node) -> Result<FunctionObject, CoreError> {
    if fn_node.name != NAME_FN {
        return Err(CoreError::Bundle(format!(
            "expected fn node, got {}",
            fn_node.name
        )));
    }
    let nparams = parse_count(fn_node, OPTION_NPARAMS)?;
    let nlocals = parse_count(fn_node, OPTION_NLOCALS)?;
    let mut instructions = Vec::new();
    for child in &fn_node.children {
        collect_instructions(child, &mut instructions)?;
    }
    Ok(FunctionObject {
        nlocals,
        nparams,
        instructions,
    })
}

fn parse_count(node: &Node, key: &str) -> Result<usize, CoreError> {
    match node.option(key) {
        None => Ok(0),
        Some(text) => text
            .parse()
            .map_err(|_| CoreError::Bundle(format!("invalid {key} value: {text}"))),
    }
}

fn collect_instructions(node: &Node, out: &mut Vec<Instruction>) -> Result<(), CoreError> {
    let offset = |key: &str| -> Result<i64, CoreError> {
        let text = node
            .option(key)
            .ok_or_else(|| CoreError::Bundle(format!("{} missing {key} option", node.name)))?;
        text.parse()
            .map_err(|_| CoreError::Bundle(format!("{} has invalid {key}: {text}", node.name)))
    };
    let option = |key: &str| -> Result<&str, CoreError> {
        node.option(key)
            .ok_or_else(|| CoreError::Bundle(format!("{} missing {key} option", node.name)))
    };

    let instruction = match node.name.as_str() {
        "push.int" => Some(Instruction::push_int(offset("decimal")?)),
        "push.bool" => Some(Instruction::push_bool(option("value")?)),
        "push.string" => Some(Instruction::push_string(option("value")?)),
        "push.local" => Some(Instruction::push_local(offset("offset")?)),
        "pop.local" => Some(Instruction::pop_local(offset("offset")?)),
        "push.global" => Some(Instruction::push_global(option("name")?)),
        "stack.length" => Some(Instruction::stack_length(offset("offset")?)),
        "syscall.counted" => Some(Instruction::syscall_counted(
            option("name")?,
            offset("offset")?,
        )),
        "call.global.counted" => Some(Instruction::call_global_counted(
            option("name")?,
            offset("offset")?,
        )),
        "return" => Some(Instruction::ret()),
        "erase" => Some(Instruction::erase()),
        "check.bool" => Some(Instruction::check_bool(offset("offset")?)),
        "label" => Some(Instruction::label(option("value")?)),
        "goto" => Some(Instruction::goto(option("value")?)),
        "if.not" => Some(Instruction::if_not(option("value")?)),
        "if.so" => Some(Instruction::if_so(option("value")?)),
        "if.not.return" => Some(Instruction::if_not_return()),
        "if.so.return" => Some(Instruction::if_so_return()),
        "if.then.else" => Some(Instruction::if_then_else(
            option("name")?,
            option("value")?,
        )),
        "done" => Some(Instruction::done()),
        "in.progress" => Some(Instruction::in_progress()),
        _ => None,
    };

    match instruction {
        Some(instruction) => out.push(instruction),
        None => {
            // Container nodes flatten; unknown leaves are skipped.
            for child in &node.children {
                collect_instructions(child, out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::CodeGenerator;
    use crate::parser::parse_unit;
    use crate::resolve::Resolver;
    use crate::rewrite::Rewriter;
    use crate::tokenizer::tokenize;

    fn compile(input: &str, src: &str) -> Node {
        let unit = parse_unit(tokenize(input).expect("tokenize"), src).expect("parse");
        let rewriter = Rewriter::default_rules().expect("compile rules");
        let (mut unit, _) = rewriter.rewrite(unit, 0).expect("rewrite");
        Resolver::new().resolve(&mut unit).expect("resolve");
        CodeGenerator::new().generate(&mut unit).expect("generate");
        unit
    }

    #[test]
    fn converts_a_generated_fn_to_a_function_object() {
        let unit = compile("def f(x) =>> x + 1 end", "");
        let function = fn_to_function_object(&unit.children[0].children[1]).expect("convert");
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
    fn bundles_bindings_with_lazy_flags_and_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.bundle");
        let unit = compile("def f(x) =>> x + 1 end\ny := 2", "demo.nutmeg");

        let mut bundler = Bundler::open(&path).expect("open");
        assert!(!bundler.is_up_to_date(), "fresh store needs migration");
        bundler.migrate();
        assert!(bundler.is_up_to_date());
        bundler.process_unit(&unit).expect("process");
        bundler.save().expect("save");

        let reopened = Bundler::open(&path).expect("reopen");
        assert!(reopened.is_up_to_date());
        let f = &reopened.store().bindings["f"];
        assert!(!f.lazy);
        assert_eq!(f.file_name, "demo.nutmeg");
        let y = &reopened.store().bindings["y"];
        assert!(y.lazy, "non-function binds are lazy");

        // The serialized value round-trips as tree JSON.
        let value: Node = serde_json::from_str(&f.value).expect("value json");
        assert_eq!(value.name, NAME_FN);
    }

    #[test]
    fn upserts_replace_existing_bindings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.bundle");
        let mut bundler = Bundler::open(&path).expect("open");
        bundler.migrate();
        bundler
            .process_unit(&compile("x := 1", "first.nutmeg"))
            .expect("process");
        bundler
            .process_unit(&compile("x := 2", "second.nutmeg"))
            .expect("process again");
        assert_eq!(bundler.store().bindings.len(), 1);
        assert_eq!(bundler.store().bindings["x"].file_name, "second.nutmeg");
    }
}
