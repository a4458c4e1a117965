//! The closed action vocabulary.
//!
//! Actions mutate the current node in place or replace it wholesale. Apart
//! from `fail` and `assert`, every action is infallible: an action that
//! cannot apply (bad index, nothing to merge) reports "not modified" and
//! rule sequencing falls through.

use tracing::debug;

use crate::error::CoreError;
use crate::node::{Node, Options};
use crate::rewrite::pattern::{NodePattern, Pattern};
use crate::rewrite::PathCtx;

#[derive(Debug, Clone)]
pub enum Action {
    ReplaceValue {
        key: String,
        with: String,
    },
    ReplaceValueFrom {
        key: String,
        src: String,
        from: String,
    },
    ReplaceNameWith {
        with: String,
    },
    ReplaceNameFrom {
        src: String,
        from: String,
    },
    ReplaceByChild {
        index: usize,
    },
    InlineChild,
    RotateOption {
        key: String,
        values: Vec<String>,
        initial: String,
    },
    RemoveOption {
        key: String,
    },
    RenameOption {
        from: String,
        to: String,
    },
    ClearOptions,
    Sequence {
        actions: Vec<Action>,
    },
    ChildAction {
        action: Box<Action>,
    },
    RemoveChild,
    RemoveChildren,
    MergeChildWithNext {
        next_takes_priority: bool,
    },
    NewNodeChild {
        name: String,
        key: Option<String>,
        value: Option<String>,
        offset: i64,
        length: Option<i64>,
    },
    PermuteChildren {
        cycle: Vec<usize>,
    },
    /// No-op with a failure result; rule sequencing falls through.
    Continue,
    Fail {
        message: String,
    },
    Assert {
        pattern: Box<Pattern>,
    },
}

impl Action {
    /// Apply the action. Returns whether the node was modified. The node is
    /// mutated in place; whole-node replacement overwrites `*node`.
    pub fn apply(
        &self,
        pattern: &Pattern,
        child_pos: Option<usize>,
        node: &mut Node,
        ctx: Option<&PathCtx<'_>>,
    ) -> Result<bool, CoreError> {
        match self {
            Action::ReplaceValue { key, with } => {
                let modified = node.option(key) != Some(with);
                node.set_option(key, with);
                Ok(modified)
            }
            Action::ReplaceValueFrom { key, src, from } => {
                let value = fetch_from_source(from, src, pattern, child_pos, node, ctx);
                let modified = node.option(key) != Some(value.as_str());
                node.set_option(key, &value);
                Ok(modified)
            }
            Action::ReplaceNameWith { with } => {
                let modified = node.name != *with;
                node.name = with.clone();
                Ok(modified)
            }
            Action::ReplaceNameFrom { src, from } => {
                let name = fetch_from_source(from, src, pattern, child_pos, node, ctx);
                let modified = node.name != name;
                node.name = name;
                Ok(modified)
            }
            Action::ReplaceByChild { index } => {
                if *index >= node.children.len() {
                    debug!(index, "replaceByChild: invalid child index");
                    return Ok(false);
                }
                let child = std::mem::take(&mut node.children[*index]);
                *node = child;
                Ok(true)
            }
            Action::InlineChild => {
                let Some(position) = child_pos else {
                    debug!("inlineChild: no matched child");
                    return Ok(false);
                };
                if position >= node.children.len() {
                    return Ok(false);
                }
                let matched = std::mem::take(&mut node.children[position]);
                node.children
                    .splice(position..=position, matched.children);
                Ok(true)
            }
            Action::RotateOption {
                key,
                values,
                initial,
            } => {
                if node.option(key).unwrap_or("").is_empty() {
                    node.set_option(key, initial);
                }
                let current = node.option(key).unwrap_or("").to_string();
                match values.iter().position(|v| *v == current) {
                    Some(index) => {
                        let next = &values[(index + 1) % values.len()];
                        node.set_option(key, next);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            Action::RemoveOption { key } => Ok(node.options.remove(key).is_some()),
            Action::RenameOption { from, to } => match node.options.remove(from) {
                Some(value) => {
                    node.options.insert(to.clone(), value);
                    Ok(true)
                }
                None => Ok(false),
            },
            Action::ClearOptions => {
                let modified = !node.options.is_empty();
                node.options.clear();
                Ok(modified)
            }
            Action::Sequence { actions } => {
                let mut any_modified = false;
                for action in actions {
                    if action.apply(pattern, child_pos, node, ctx)? {
                        any_modified = true;
                    }
                }
                Ok(any_modified)
            }
            Action::ChildAction { action } => {
                let Some(position) = child_pos else {
                    return Ok(false);
                };
                if position >= node.children.len() {
                    return Ok(false);
                }
                let mut child = std::mem::take(&mut node.children[position]);
                let modified = action.apply(pattern, None, &mut child, None)?;
                node.children[position] = child;
                Ok(modified)
            }
            Action::RemoveChild => {
                let Some(position) = child_pos else {
                    return Ok(false);
                };
                if position >= node.children.len() {
                    return Ok(false);
                }
                node.children.remove(position);
                Ok(true)
            }
            Action::RemoveChildren => {
                if node.children.is_empty() {
                    return Ok(false);
                }
                node.clear_children();
                Ok(true)
            }
            Action::MergeChildWithNext { next_takes_priority } => {
                let Some(position) = child_pos else {
                    return Ok(false);
                };
                if position + 1 >= node.children.len() {
                    return Ok(false);
                }
                let next = node.children.remove(position + 1);
                let child = &mut node.children[position];
                child.span = child.span.to_span(&next.span);
                child.options =
                    merge_options(&child.options, &next.options, *next_takes_priority);
                child.children.extend(next.children);
                Ok(true)
            }
            Action::NewNodeChild {
                name,
                key,
                value,
                offset,
                length,
            } => {
                let base = child_pos.map(|p| p as i64).unwrap_or(-1).max(0);
                let start = (base + offset).clamp(0, node.children.len() as i64) as usize;
                let available = node.children.len() - start;
                let take = match length {
                    Some(length) => (*length).max(0).min(available as i64) as usize,
                    None => available,
                };
                let mut wrapper = Node::new(name);
                if let (Some(key), Some(value)) = (key, value) {
                    wrapper.set_option(key, value);
                }
                wrapper.children = node.children.drain(start..start + take).collect();
                wrapper.update_span();
                node.children.insert(start, wrapper);
                Ok(true)
            }
            Action::PermuteChildren { cycle } => {
                if cycle.len() < 2 {
                    return Ok(false);
                }
                if cycle.iter().any(|&index| index >= node.children.len()) {
                    debug!("permuteChildren: invalid index in cycle");
                    return Ok(false);
                }
                for window in cycle.windows(2) {
                    node.children.swap(window[0], window[1]);
                }
                Ok(true)
            }
            Action::Continue => Ok(false),
            Action::Fail { message } => Err(CoreError::rewrite(message.clone(), node.span)),
            Action::Assert { pattern } => {
                if pattern.matches(node, ctx).is_none() {
                    return Err(CoreError::rewrite(
                        format!("assertion failed on node '{}'", node.name),
                        node.span,
                    ));
                }
                Ok(false)
            }
        }
    }

    /// What this action does to the node's name, for jump optimization:
    /// (may change, definite new name, prediction is reliable).
    pub(crate) fn name_effect(&self) -> (bool, Option<String>, bool) {
        match self {
            Action::ReplaceNameWith { with } => (true, Some(with.clone()), true),
            Action::ReplaceNameFrom { .. } => (true, None, false),
            Action::ReplaceByChild { .. } => (true, None, false),
            Action::Sequence { actions } => {
                let mut changes = false;
                let mut final_name = None;
                let mut definite = true;
                for action in actions {
                    let (change, name, reliable) = action.name_effect();
                    if change {
                        changes = true;
                        final_name = name;
                        if !reliable {
                            definite = false;
                        }
                    }
                }
                (changes, final_name, definite)
            }
            _ => (false, None, true),
        }
    }
}

fn merge_options(first: &Options, second: &Options, next_takes_priority: bool) -> Options {
    let mut merged = first.clone();
    for (key, value) in second {
        if next_takes_priority || !merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn fetch_from(from: &str, key: Option<&String>, name: &str, options: &Options) -> String {
    match from {
        "value" => key
            .and_then(|k| options.get(k))
            .cloned()
            .unwrap_or_default(),
        "key" => key.cloned().unwrap_or_default(),
        "name" => name.to_string(),
        _ => String::new(),
    }
}

fn pattern_key(constraint: &Option<NodePattern>) -> Option<&String> {
    constraint.as_ref().and_then(|c| c.key.as_ref())
}

fn fetch_from_source(
    from: &str,
    source: &str,
    pattern: &Pattern,
    child_pos: Option<usize>,
    node: &Node,
    ctx: Option<&PathCtx<'_>>,
) -> String {
    match source {
        "self" => fetch_from(from, pattern_key(&pattern.self_), &node.name, &node.options),
        "parent" => match ctx {
            Some(ctx) => fetch_from(
                from,
                pattern_key(&pattern.parent),
                &ctx.meta.name,
                &ctx.meta.options,
            ),
            None => String::new(),
        },
        "child" => match child_pos {
            Some(position) if position < node.children.len() => {
                let child = &node.children[position];
                fetch_from(
                    from,
                    pattern_key(&pattern.child),
                    &child.name,
                    &child.options,
                )
            }
            _ => String::new(),
        },
        _ => String::new(),
    }
}
