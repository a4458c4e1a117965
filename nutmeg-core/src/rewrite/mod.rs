//! The rule-driven tree rewriter.
//!
//! A configuration is a list of passes; each pass has an ordered downwards
//! rule sequence (applied on entry to a node) and an upwards sequence
//! (applied on exit). Rules in a sequence run as a tiny state machine over
//! an integer program counter, with `onSuccess`/`onFailure` jumps, repeat,
//! and break flags. A pass iterates to a fixed point unless flagged
//! `singlePass`.
//!
//! Two optimizations are applied when a configuration is compiled: a
//! name-keyed start index so a node skips straight to the first rule that
//! could match it, and jump-target advancement past rules whose fixed name
//! constraint cannot match the node an action produces.

pub mod action;
pub mod config;
pub mod pattern;
pub mod rules;

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::CoreError;
use crate::node::{Node, Options};

use self::action::Action;
use self::config::{PassConfig, RewriteConfig, RuleConfig};
use self::pattern::Pattern;
pub use self::rules::DEFAULT_REWRITE_RULES;

/// The constraint-relevant fields of a parent node, snapshotted before its
/// children are rewritten. Children own themselves exclusively, so parent
/// context travels as data rather than as a live reference.
#[derive(Debug, Clone)]
pub struct ParentMeta {
    pub name: String,
    pub options: Options,
    pub child_count: usize,
}

impl ParentMeta {
    fn of(node: &Node) -> ParentMeta {
        ParentMeta {
            name: node.name.clone(),
            options: node.options.clone(),
            child_count: node.children.len(),
        }
    }
}

/// The path from the root to the current node, innermost first.
#[derive(Debug)]
pub struct PathCtx<'a> {
    pub sibling_position: usize,
    pub meta: &'a ParentMeta,
    pub outer: Option<&'a PathCtx<'a>>,
}

#[derive(Debug)]
struct Rule {
    name: String,
    pattern: Pattern,
    action: Action,
    on_success: usize,
    on_failure: usize,
    break_on_success: bool,
    break_on_failure: bool,
}

#[derive(Debug)]
struct RewriterPass {
    name: String,
    single_pass: bool,
    downwards: Vec<Rule>,
    upwards: Vec<Rule>,
    downwards_start: HashMap<String, usize>,
    upwards_start: HashMap<String, usize>,
}

/// A compiled rewrite configuration.
#[derive(Debug)]
pub struct Rewriter {
    pub name: String,
    passes: Vec<RewriterPass>,
}

impl Rewriter {
    pub fn new(config: &RewriteConfig) -> Result<Rewriter, CoreError> {
        Rewriter::with_options(config, false)
    }

    /// Compile a configuration, optionally dropping optional passes.
    pub fn with_options(config: &RewriteConfig, skip_optional: bool) -> Result<Rewriter, CoreError> {
        let mut passes = Vec::new();
        for pass_config in &config.passes {
            if skip_optional && pass_config.optional {
                debug!(pass = %pass_config.name, "skipping optional pass");
                continue;
            }
            passes.push(compile_pass(pass_config)?);
        }
        Ok(Rewriter {
            name: config.name.clone(),
            passes,
        })
    }

    /// Compile the built-in default rules.
    pub fn default_rules() -> Result<Rewriter, CoreError> {
        let config = config::load_rewrite_config_from_str(DEFAULT_REWRITE_RULES)?;
        Rewriter::new(&config)
    }

    /// Run every pass in order, iterating each non-`singlePass` pass to a
    /// fixed point bounded by `max_iterations` (0 means unlimited). Returns
    /// the rewritten tree and whether anything changed.
    pub fn rewrite(&self, mut node: Node, max_iterations: u32) -> Result<(Node, bool), CoreError> {
        let mut changed = false;
        for pass in &self.passes {
            node = pass.run(node, max_iterations, &mut changed)?;
        }
        Ok((node, changed))
    }
}

fn compile_pass(config: &PassConfig) -> Result<RewriterPass, CoreError> {
    let downwards = compile_rules(&config.downwards, &config.name, "downwards")?;
    let upwards = compile_rules(&config.upwards, &config.name, "upwards")?;
    let downwards_start = build_start_index(&downwards);
    let upwards_start = build_start_index(&upwards);
    let mut pass = RewriterPass {
        name: config.name.clone(),
        single_pass: config.single_pass,
        downwards,
        upwards,
        downwards_start,
        upwards_start,
    };
    optimize_rule_jumps(&mut pass.downwards);
    optimize_rule_jumps(&mut pass.upwards);
    Ok(pass)
}

fn compile_rules(
    configs: &[RuleConfig],
    pass_name: &str,
    direction: &str,
) -> Result<Vec<Rule>, CoreError> {
    let mut name_to_index = HashMap::new();
    for (index, rule) in configs.iter().enumerate() {
        name_to_index.insert(rule.name.clone(), index);
    }
    let mut rules = Vec::with_capacity(configs.len());
    for (index, rule_config) in configs.iter().enumerate() {
        let in_rule = |e: CoreError| {
            CoreError::Config(format!(
                "error in {direction} rule \"{pass_name}/{}\": {e}",
                rule_config.name
            ))
        };
        rule_config
            .pattern
            .validate(&rule_config.name)
            .map_err(in_rule)?;
        let mut pattern = rule_config.pattern.clone();
        pattern.compile().map_err(in_rule)?;
        let action = rule_config.action.to_action().map_err(in_rule)?;

        let mut on_success = index + 1;
        if rule_config.repeat_on_success {
            on_success = index;
        } else if let Some(target) = &rule_config.on_success {
            on_success = *name_to_index.get(target).ok_or_else(|| {
                CoreError::Config(format!(
                    "error in {direction} rule \"{pass_name}/{}\": onSuccess refers to unknown rule \"{target}\"",
                    rule_config.name
                ))
            })?;
        }
        let mut on_failure = index + 1;
        if let Some(target) = &rule_config.on_failure {
            on_failure = *name_to_index.get(target).ok_or_else(|| {
                CoreError::Config(format!(
                    "error in {direction} rule \"{pass_name}/{}\": onFailure refers to unknown rule \"{target}\"",
                    rule_config.name
                ))
            })?;
        }
        rules.push(Rule {
            name: rule_config.name.clone(),
            pattern,
            action,
            on_success,
            on_failure,
            break_on_success: rule_config.break_on_success,
            break_on_failure: rule_config.break_on_failure,
        });
    }
    Ok(rules)
}

/// Optimization 1: map a node name to the first rule that could match it.
/// The empty key holds the position of the first wildcard rule (one with no
/// fixed `self.name` constraint).
fn build_start_index(rules: &[Rule]) -> HashMap<String, usize> {
    let mut start_index: HashMap<String, usize> = HashMap::new();
    let mut wildcard_index = rules.len();
    for (index, rule) in rules.iter().enumerate() {
        let fixed_name = rule.pattern.self_.as_ref().and_then(|s| s.name.as_deref());
        match fixed_name {
            Some(name) => {
                start_index.entry(name.to_string()).or_insert(index);
            }
            None => {
                if wildcard_index == rules.len() {
                    wildcard_index = index;
                }
            }
        }
    }
    // A named node may still be matched by an earlier wildcard rule.
    for index in start_index.values_mut() {
        *index = (*index).min(wildcard_index);
    }
    start_index.insert(String::new(), wildcard_index);
    debug!(rules = rules.len(), wildcard_index, "built rule start index");
    start_index
}

fn start_for(name: &str, start_index: &HashMap<String, usize>, default: usize) -> usize {
    if let Some(index) = start_index.get(name) {
        return *index;
    }
    start_index.get("").copied().unwrap_or(default)
}

/// Optimization 2: advance success jumps past rules whose fixed name
/// constraint cannot match the node the action produces.
fn optimize_rule_jumps(rules: &mut [Rule]) {
    let mut optimized = 0;
    for index in 0..rules.len() {
        let Some(self_pattern) = &rules[index].pattern.self_ else {
            continue;
        };
        let matched_name = self_pattern.name.clone();
        let (changes, new_name, definite) = rules[index].action.name_effect();
        let expected = if changes {
            match (definite, new_name) {
                (true, Some(name)) => Some(name),
                _ => continue,
            }
        } else {
            matched_name
        };
        let Some(expected) = expected else {
            // The post-action name is unknown; any named rule could match.
            continue;
        };
        let target = advance_jump(rules[index].on_success, rules, &expected);
        if target != rules[index].on_success {
            trace!(
                rule = %rules[index].name,
                from = rules[index].on_success,
                to = target,
                "optimized onSuccess jump"
            );
            rules[index].on_success = target;
            optimized += 1;
        }
    }
    debug!(optimized, "optimized jump targets");
}

fn advance_jump(mut target: usize, rules: &[Rule], expected: &str) -> usize {
    while target < rules.len() {
        let Some(self_pattern) = &rules[target].pattern.self_ else {
            break;
        };
        match &self_pattern.name {
            None => break,
            Some(name) if name == expected => break,
            Some(_) => target += 1,
        }
    }
    target
}

impl RewriterPass {
    fn run(&self, mut node: Node, max_iterations: u32, changed: &mut bool) -> Result<Node, CoreError> {
        let mut iteration = 0u32;
        loop {
            iteration += 1;
            let mut pass_changed = false;
            node = self.rewrite_node(node, None, &mut pass_changed)?;
            if pass_changed {
                *changed = true;
            }
            if self.single_pass || !pass_changed {
                break;
            }
            if max_iterations > 0 && iteration >= max_iterations {
                debug!(
                    pass = %self.name,
                    iteration, "stopped before fixed point: iteration limit reached"
                );
                break;
            }
        }
        trace!(pass = %self.name, iteration, "pass complete");
        Ok(node)
    }

    fn rewrite_node(
        &self,
        mut node: Node,
        ctx: Option<&PathCtx<'_>>,
        changed: &mut bool,
    ) -> Result<Node, CoreError> {
        node = apply_rules(node, ctx, &self.downwards, &self.downwards_start, changed)?;
        let meta = ParentMeta::of(&node);
        for index in 0..node.children.len() {
            let child = std::mem::take(&mut node.children[index]);
            let child_ctx = PathCtx {
                sibling_position: index,
                meta: &meta,
                outer: ctx,
            };
            node.children[index] = self.rewrite_node(child, Some(&child_ctx), changed)?;
        }
        node = apply_rules(node, ctx, &self.upwards, &self.upwards_start, changed)?;
        Ok(node)
    }
}

fn apply_rules(
    mut node: Node,
    ctx: Option<&PathCtx<'_>>,
    rules: &[Rule],
    start_index: &HashMap<String, usize>,
    changed: &mut bool,
) -> Result<Node, CoreError> {
    let mut current = start_for(&node.name, start_index, rules.len());
    while let Some(rule) = rules.get(current) {
        match rule.pattern.matches(&node, ctx) {
            Some(matched) => {
                let modified = rule.action.apply(&rule.pattern, matched.child, &mut node, ctx)?;
                if modified {
                    *changed = true;
                }
                trace!(rule = %rule.name, modified, next = rule.on_success, "rule matched");
                if rule.break_on_success {
                    break;
                }
                current = rule.on_success;
            }
            None => {
                if rule.break_on_failure {
                    break;
                }
                current = rule.on_failure;
            }
        }
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{
        NAME_APPLY, NAME_ARGUMENTS, NAME_BIND, NAME_FN, NAME_IDENTIFIER, NAME_IF, NAME_NUMBER,
        NAME_SYSCALL, OPTION_CONST, OPTION_NAME, OPTION_PROTECTED, OPTION_SIGN, OPTION_VAR,
    };
    use crate::parser::parse_unit;
    use crate::tokenizer::tokenize;

    fn rewrite(input: &str) -> Node {
        let unit = parse_unit(tokenize(input).expect("tokenize"), "").expect("parse");
        let rewriter = Rewriter::default_rules().expect("compile default rules");
        let (node, _) = rewriter.rewrite(unit, 0).expect("rewrite");
        node
    }

    #[test]
    fn default_rules_compile() {
        Rewriter::default_rules().expect("default rules must compile");
    }

    #[test]
    fn def_becomes_a_bind_of_fn() {
        let unit = rewrite("def f(x) =>> x + 1 end");
        let bind = &unit.children[0];
        assert_eq!(bind.name, NAME_BIND);
        assert!(bind.options.is_empty(), "bind options are cleared");
        let id = &bind.children[0];
        assert_eq!(id.name, NAME_IDENTIFIER);
        assert_eq!(id.option(OPTION_NAME), Some("f"));
        assert_eq!(id.option(OPTION_PROTECTED), Some("true"));
        let fn_node = &bind.children[1];
        assert_eq!(fn_node.name, NAME_FN);
        assert_eq!(fn_node.children[0].name, NAME_ARGUMENTS);
        let body = &fn_node.children[1];
        assert_eq!(body.name, NAME_SYSCALL);
        assert_eq!(body.option(OPTION_NAME), Some("+"));
    }

    #[test]
    fn dot_calls_apply_the_function_with_the_receiver_first() {
        let unit = rewrite("x.f(1)");
        let apply = &unit.children[0];
        assert_eq!(apply.name, NAME_APPLY);
        assert_eq!(apply.children[0].option(OPTION_NAME), Some("f"));
        let args = &apply.children[1];
        assert_eq!(args.name, NAME_ARGUMENTS);
        assert_eq!(args.children[0].option(OPTION_NAME), Some("x"));
    }

    #[test]
    fn infix_operators_become_syscalls() {
        let unit = rewrite("1 + 2");
        let syscall = &unit.children[0];
        assert_eq!(syscall.name, NAME_SYSCALL);
        assert_eq!(syscall.option(OPTION_NAME), Some("+"));
        assert_eq!(syscall.children.len(), 2);
    }

    #[test]
    fn unary_minus_folds_into_the_literal() {
        let unit = rewrite("-5");
        let number = &unit.children[0];
        assert_eq!(number.name, NAME_NUMBER);
        assert_eq!(number.option(OPTION_SIGN), Some("-"));
    }

    #[test]
    fn if_then_else_collapses_to_three_children() {
        let unit = rewrite("if p then a else b end");
        let if_node = &unit.children[0];
        assert_eq!(if_node.name, NAME_IF);
        assert_eq!(if_node.children.len(), 3);
        assert_eq!(if_node.children[0].option(OPTION_NAME), Some("p"));
        assert_eq!(if_node.children[1].option(OPTION_NAME), Some("a"));
        assert_eq!(if_node.children[2].option(OPTION_NAME), Some("b"));
    }

    #[test]
    fn if_without_else_gains_an_empty_else_branch() {
        let unit = rewrite("if p then a end");
        let if_node = &unit.children[0];
        assert_eq!(if_node.name, NAME_IF);
        assert_eq!(if_node.children.len(), 3);
        assert!(if_node.children[2].children.is_empty());
    }

    #[test]
    fn elseif_chains_nest_into_inner_ifs() {
        let unit = rewrite("if p then a elseif q then b else c end");
        let outer = &unit.children[0];
        assert_eq!(outer.name, NAME_IF);
        assert_eq!(outer.children.len(), 3);
        let inner = &outer.children[2];
        assert_eq!(inner.name, NAME_IF);
        assert_eq!(inner.children.len(), 3);
        assert_eq!(inner.children[0].option(OPTION_NAME), Some("q"));
    }

    #[test]
    fn qualifiers_propagate_onto_the_identifier() {
        let unit = rewrite("const x := 1");
        let bind = &unit.children[0];
        assert_eq!(bind.name, NAME_BIND);
        let id = &bind.children[0];
        assert_eq!(id.option(OPTION_VAR), Some("false"));
        assert_eq!(id.option(OPTION_CONST), Some("true"));
        assert_eq!(bind.children[1].name, NAME_NUMBER);
    }

    #[test]
    fn assignment_operators_are_renamed() {
        let unit = rewrite("x := 1\ny <- 2\nz <-- 3");
        let names: Vec<&str> = unit.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["bind", "assign", "update"]);
    }

    #[test]
    fn default_rules_are_idempotent() {
        let once = rewrite("def f(x) =>> x + 1 end\nif p then a else b end");
        let rewriter = Rewriter::default_rules().expect("compile");
        let (twice, _) = rewriter.rewrite(once.clone(), 0).expect("rewrite again");
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_on_success_target_is_a_load_error() {
        let config = config::load_rewrite_config_from_str(
            "passes:\n  - name: p\n    downwards:\n      - name: r\n        match:\n          self:\n            name: seq\n        action:\n          inlineChild: true\n        onSuccess: missing\n",
        )
        .expect("parse config");
        let err = Rewriter::new(&config).unwrap_err();
        assert!(
            err.to_string()
                .contains("onSuccess refers to unknown rule \"missing\""),
            "got: {err}"
        );
    }

    #[test]
    fn fail_action_aborts_with_the_node_span() {
        let tokens = tokenize("val 3").expect("tokenize");
        let unit = parse_unit(tokens, "").expect("parse");
        let rewriter = Rewriter::default_rules().expect("compile");
        let err = rewriter.rewrite(unit, 0).unwrap_err();
        assert!(
            err.to_string().contains("Qualifier was not followed"),
            "got: {err}"
        );
    }

    #[test]
    fn skip_optional_drops_optional_passes() {
        let config = config::load_rewrite_config_from_str(
            "passes:\n  - name: extra\n    optional: true\n    downwards:\n      - name: r\n        match:\n          self:\n            name: unit\n        action:\n          replaceValue:\n            key: touched\n            with: \"true\"\n",
        )
        .expect("parse config");
        let rewriter = Rewriter::with_options(&config, true).expect("compile");
        let (node, changed) = rewriter
            .rewrite(Node::new("unit"), 0)
            .expect("rewrite");
        assert!(!changed);
        assert!(!node.has_option("touched"));
    }

    #[test]
    fn repeat_on_success_reapplies_the_same_rule() {
        let config = config::load_rewrite_config_from_str(
            "passes:\n  - name: p\n    singlePass: true\n    downwards:\n      - name: inline\n        match:\n          self:\n            name: seq\n          child:\n            name: seq\n        action:\n          inlineChild: true\n        repeatOnSuccess: true\n",
        )
        .expect("parse config");
        let rewriter = Rewriter::new(&config).expect("compile");

        let mut inner = Node::new("seq");
        inner.add_child(Node::new("a"));
        let mut middle = Node::new("seq");
        middle.add_child(inner);
        middle.add_child(Node::new("seq"));
        let mut outer = Node::new("seq");
        outer.add_child(middle);

        let (node, changed) = rewriter.rewrite(outer, 0).expect("rewrite");
        assert!(changed);
        // Every level of nesting was spliced in a single visit.
        let names: Vec<&str> = node.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }
}
