//! Rule patterns: positional node constraints.
//!
//! A pattern constrains up to five positions: the current node, its parent,
//! one of its children, and the siblings either side of the matched child.
//! Each position is a [`NodePattern`]; an empty constraint matches anything.

use regex::Regex;
use serde::Deserialize;

use crate::error::CoreError;
use crate::node::{Node, Options};
use crate::rewrite::PathCtx;

/// A constraint on a single node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodePattern {
    pub name: Option<String>,
    #[serde(rename = "name.regexp")]
    pub name_regexp: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    #[serde(rename = "value.regexp")]
    pub value_regexp: Option<String>,
    /// Inverts the value comparison when false. Defaults to true.
    pub cmp: Option<bool>,
    pub count: Option<usize>,
    #[serde(rename = "siblingPosition")]
    pub sibling_position: Option<i64>,

    #[serde(skip)]
    name_re: Option<Regex>,
    #[serde(skip)]
    value_re: Option<Regex>,
}

/// The view of a node that constraint matching needs: its own fields plus,
/// when known, its position among its siblings and their count.
pub(crate) struct NodeView<'a> {
    pub name: &'a str,
    pub options: &'a Options,
    pub child_count: usize,
    pub position: Option<(usize, usize)>,
}

impl<'a> NodeView<'a> {
    pub fn of(node: &'a Node, ctx: Option<&PathCtx<'_>>) -> NodeView<'a> {
        NodeView {
            name: &node.name,
            options: &node.options,
            child_count: node.children.len(),
            position: ctx.map(|c| (c.sibling_position, c.meta.child_count)),
        }
    }

    pub fn of_child(parent: &'a Node, index: usize) -> NodeView<'a> {
        let child = &parent.children[index];
        NodeView {
            name: &child.name,
            options: &child.options,
            child_count: child.children.len(),
            position: Some((index, parent.children.len())),
        }
    }
}

impl NodePattern {
    /// Compile the anchored regexes. Called once at configuration load.
    pub fn compile(&mut self) -> Result<(), CoreError> {
        if let Some(pattern) = &self.name_regexp {
            self.name_re = Some(anchored(pattern, "name.regexp")?);
        }
        if let Some(pattern) = &self.value_regexp {
            self.value_re = Some(anchored(pattern, "value.regexp")?);
        }
        Ok(())
    }

    fn cmp_expected(&self) -> bool {
        self.cmp.unwrap_or(true)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.name_regexp.is_none()
            && self.key.is_none()
            && self.value.is_none()
            && self.value_regexp.is_none()
            && self.count.is_none()
            && self.sibling_position.is_none()
    }

    pub(crate) fn matches(&self, view: &NodeView<'_>) -> bool {
        if self.is_empty() {
            return true;
        }
        if let Some(name) = &self.name {
            if view.name != name {
                return false;
            }
        }
        if let Some(re) = &self.name_re {
            if !re.is_match(view.name) {
                return false;
            }
        }
        if let Some(key) = &self.key {
            let Some(value) = view.options.get(key) else {
                return false;
            };
            if let Some(expected) = &self.value {
                if (value == expected) != self.cmp_expected() {
                    return false;
                }
            }
            if let Some(re) = &self.value_re {
                if re.is_match(value) != self.cmp_expected() {
                    return false;
                }
            }
        }
        if let Some(count) = self.count {
            if view.child_count != count {
                return false;
            }
        }
        if let Some(wanted) = self.sibling_position {
            if let Some((position, arity)) = view.position {
                if arity == 0 || position != wanted.rem_euclid(arity as i64) as usize {
                    return false;
                }
            }
        }
        true
    }
}

fn anchored(pattern: &str, field: &str) -> Result<Regex, CoreError> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| CoreError::Config(format!("invalid regexp in '{field}': {e}")))
}

/// A full rule pattern across the five positions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pattern {
    pub parent: Option<NodePattern>,
    #[serde(rename = "self")]
    pub self_: Option<NodePattern>,
    pub child: Option<NodePattern>,
    #[serde(rename = "previousChild")]
    pub previous_child: Option<NodePattern>,
    #[serde(rename = "nextChild")]
    pub next_child: Option<NodePattern>,
}

/// The result of a successful match: the index of the matched child, when a
/// child constraint was present.
#[derive(Debug, Clone, Copy)]
pub struct Match {
    pub child: Option<usize>,
}

impl Pattern {
    pub fn compile(&mut self) -> Result<(), CoreError> {
        for constraint in [
            &mut self.parent,
            &mut self.self_,
            &mut self.child,
            &mut self.previous_child,
            &mut self.next_child,
        ]
        .into_iter()
        .flatten()
        {
            constraint.compile()?;
        }
        Ok(())
    }

    /// Configuration-time validation: a pattern must constrain something.
    pub fn validate(&self, rule_name: &str) -> Result<(), CoreError> {
        if self.self_.is_none()
            && self.parent.is_none()
            && self.child.is_none()
            && self.previous_child.is_none()
            && self.next_child.is_none()
        {
            return Err(CoreError::Config(format!(
                "pattern has no conditions: {rule_name}"
            )));
        }
        Ok(())
    }

    pub(crate) fn matches(&self, node: &Node, ctx: Option<&PathCtx<'_>>) -> Option<Match> {
        if let Some(self_pattern) = &self.self_ {
            if !self_pattern.matches(&NodeView::of(node, ctx)) {
                return None;
            }
        }
        if let Some(parent_pattern) = &self.parent {
            let ctx = ctx?;
            let view = NodeView {
                name: &ctx.meta.name,
                options: &ctx.meta.options,
                child_count: ctx.meta.child_count,
                position: ctx.outer.map(|o| (o.sibling_position, o.meta.child_count)),
            };
            if !parent_pattern.matches(&view) {
                return None;
            }
        }
        let mut matched_child = None;
        if let Some(child_pattern) = &self.child {
            matched_child = (0..node.children.len())
                .find(|&index| child_pattern.matches(&NodeView::of_child(node, index)));
            matched_child?;
        }
        if let Some(previous_pattern) = &self.previous_child {
            if let Some(index) = matched_child {
                if index >= 1 && !previous_pattern.matches(&NodeView::of_child(node, index - 1)) {
                    return None;
                }
            }
        }
        if let Some(next_pattern) = &self.next_child {
            if let Some(index) = matched_child {
                if index + 1 < node.children.len()
                    && !next_pattern.matches(&NodeView::of_child(node, index + 1))
                {
                    return None;
                }
            }
        }
        Some(Match {
            child: matched_child,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NAME_APPLY, NAME_ARGUMENTS, NAME_IDENTIFIER, NAME_OPERATOR};

    fn pattern(yaml: &str) -> Pattern {
        let mut pattern: Pattern = serde_yaml::from_str(yaml).expect("parse pattern");
        pattern.compile().expect("compile pattern");
        pattern
    }

    fn apply_node() -> Node {
        let mut apply = Node::new(NAME_APPLY);
        let mut op = Node::new(NAME_OPERATOR);
        op.set_option("name", ".");
        op.add_child(Node::new(NAME_IDENTIFIER));
        op.add_child(Node::new(NAME_IDENTIFIER));
        apply.add_child(op);
        let mut args = Node::new(NAME_ARGUMENTS);
        args.set_option("kind", "parentheses");
        apply.add_child(args);
        apply
    }

    #[test]
    fn empty_constraint_matches_anything() {
        let p = pattern("self: {}");
        assert!(p.matches(&apply_node(), None).is_some());
    }

    #[test]
    fn name_and_count_constraints() {
        let p = pattern("self:\n  name: apply\n  count: 2");
        assert!(p.matches(&apply_node(), None).is_some());
        let p = pattern("self:\n  name: apply\n  count: 3");
        assert!(p.matches(&apply_node(), None).is_none());
    }

    #[test]
    fn child_match_yields_the_index() {
        let p = pattern("self:\n  name: apply\nchild:\n  name: arguments");
        let matched = p.matches(&apply_node(), None).expect("match");
        assert_eq!(matched.child, Some(1));
    }

    #[test]
    fn next_child_constrains_the_matched_childs_successor() {
        let p = pattern(
            "self:\n  name: apply\nchild:\n  name: operator\n  key: name\n  value: \".\"\nnextChild:\n  name: arguments\n  key: kind\n  value: parentheses",
        );
        assert!(p.matches(&apply_node(), None).is_some());

        let p = pattern(
            "self:\n  name: apply\nchild:\n  name: operator\nnextChild:\n  name: operator",
        );
        assert!(p.matches(&apply_node(), None).is_none());
    }

    #[test]
    fn value_comparison_inverts_with_cmp_false() {
        let mut node = Node::new("part");
        node.set_option("keyword", "then");
        let p = pattern("self:\n  key: keyword\n  value: else\n  cmp: false");
        assert!(p.matches(&node, None).is_some());
        node.set_option("keyword", "else");
        assert!(p.matches(&node, None).is_none());
    }

    #[test]
    fn missing_key_never_matches() {
        let node = Node::new("part");
        let p = pattern("self:\n  key: keyword\n  value: else\n  cmp: false");
        assert!(p.matches(&node, None).is_none());
    }

    #[test]
    fn regexps_are_anchored() {
        let mut node = Node::new(NAME_OPERATOR);
        node.set_option("name", "+");
        node.add_child(Node::new(NAME_IDENTIFIER));
        node.add_child(Node::new(NAME_IDENTIFIER));
        let p = pattern("self:\n  name: operator\n  key: name\n  value.regexp: \"[-+*/<>]|==|<=|>=\"\n  count: 2");
        assert!(p.matches(&node, None).is_some());
        node.set_option("name", "++x");
        assert!(p.matches(&node, None).is_none());
    }

    #[test]
    fn negative_sibling_position_counts_from_the_end() {
        let mut parent = Node::new("if");
        for keyword in ["if", "then", "else"] {
            let mut part = Node::new("part");
            part.set_option("keyword", keyword);
            parent.add_child(part);
        }
        let p = pattern("self:\n  name: if\nchild:\n  name: part\n  key: keyword\n  value: else\n  siblingPosition: -1");
        assert!(p.matches(&parent, None).is_some());
        let p = pattern("self:\n  name: if\nchild:\n  name: part\n  key: keyword\n  value: if\n  siblingPosition: -1");
        assert!(p.matches(&parent, None).is_none());
    }

    #[test]
    fn pattern_without_conditions_is_rejected() {
        let p = Pattern::default();
        let err = p.validate("bad rule").unwrap_err();
        assert!(err.to_string().contains("pattern has no conditions"));
    }
}
