//! The universal tree node.
//!
//! One node type flows through every stage of the pipeline: the parser
//! builds nodes, the rewriter, resolver and code generator transform them in
//! place, and the bundler serializes them. A node is a name tag, an option
//! map of short string pairs, a source span, and an exclusively-owned list
//! of children.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::span::Span;

// Node names shared across the pipeline.
pub const NAME_UNIT: &str = "unit";
pub const NAME_FORM: &str = "form";
pub const NAME_PART: &str = "part";
pub const NAME_APPLY: &str = "apply";
pub const NAME_ARGUMENTS: &str = "arguments";
pub const NAME_DELIMITED: &str = "delimited";
pub const NAME_IDENTIFIER: &str = "id";
pub const NAME_NUMBER: &str = "number";
pub const NAME_STRING: &str = "string";
pub const NAME_BOOLEAN: &str = "boolean";
pub const NAME_OPERATOR: &str = "operator";
pub const NAME_JOIN: &str = "join";
pub const NAME_JOIN_LINES: &str = "joinlines";
pub const NAME_BIND: &str = "bind";
pub const NAME_ASSIGN: &str = "assign";
pub const NAME_UPDATE: &str = "update";
pub const NAME_DEF: &str = "def";
pub const NAME_FN: &str = "fn";
pub const NAME_LET: &str = "let";
pub const NAME_IF: &str = "if";
pub const NAME_FOR: &str = "for";
pub const NAME_SEQ: &str = "seq";
pub const NAME_SYSCALL: &str = "syscall";
pub const NAME_PART_APPLY: &str = "partapply";
pub const NAME_ANNOTATIONS: &str = "annotations";

// Instruction names emitted by the code generator (closed vocabulary).
pub const NAME_PUSH_INT: &str = "push.int";
pub const NAME_PUSH_BOOL: &str = "push.bool";
pub const NAME_PUSH_STRING: &str = "push.string";
pub const NAME_PUSH_LOCAL: &str = "push.local";
pub const NAME_POP_LOCAL: &str = "pop.local";
pub const NAME_PUSH_GLOBAL: &str = "push.global";
pub const NAME_STACK_LENGTH: &str = "stack.length";
pub const NAME_SYSCALL_COUNTED: &str = "syscall.counted";
pub const NAME_CALL_GLOBAL_COUNTED: &str = "call.global.counted";
pub const NAME_RETURN: &str = "return";
pub const NAME_ERASE: &str = "erase";
pub const NAME_CHECK_BOOL: &str = "check.bool";
pub const NAME_LABEL: &str = "label";
pub const NAME_GOTO: &str = "goto";
pub const NAME_IF_NOT: &str = "if.not";
pub const NAME_IF_SO: &str = "if.so";
pub const NAME_IF_NOT_RETURN: &str = "if.not.return";
pub const NAME_IF_SO_RETURN: &str = "if.so.return";
pub const NAME_IF_THEN_ELSE: &str = "if.then.else";
pub const NAME_DONE: &str = "done";
pub const NAME_IN_PROGRESS: &str = "in.progress";

// Option keys.
pub const OPTION_VALUE: &str = "value";
pub const OPTION_NAME: &str = "name";
pub const OPTION_KIND: &str = "kind";
pub const OPTION_SEPARATOR: &str = "separator";
pub const OPTION_KEYWORD: &str = "keyword";
pub const OPTION_SYNTAX: &str = "syntax";
pub const OPTION_QUOTE: &str = "quote";
pub const OPTION_QUALIFIER: &str = "qualifier";
pub const OPTION_SRC: &str = "src";
pub const OPTION_SCOPE: &str = "scope";
pub const OPTION_SERIAL_NO: &str = "no";
pub const OPTION_VAR: &str = "var";
pub const OPTION_CONST: &str = "const";
pub const OPTION_PROTECTED: &str = "protected";
pub const OPTION_LAZY: &str = "lazy";
pub const OPTION_LAST: &str = "last";
pub const OPTION_OFFSET: &str = "offset";
pub const OPTION_DECIMAL: &str = "decimal";
pub const OPTION_MANTISSA: &str = "mantissa";
pub const OPTION_FRACTION: &str = "fraction";
pub const OPTION_EXPONENT: &str = "exponent";
pub const OPTION_BASE: &str = "base";
pub const OPTION_SIGN: &str = "sign";
pub const OPTION_NPARAMS: &str = "nparams";
pub const OPTION_NLOCALS: &str = "nlocals";
pub const OPTION_IFTYPE: &str = "iftype";

// Common option values.
pub const VALUE_TRUE: &str = "true";
pub const VALUE_FALSE: &str = "false";
pub const VALUE_PARENTHESES: &str = "parentheses";
pub const VALUE_BRACKETS: &str = "brackets";
pub const VALUE_BRACES: &str = "braces";
pub const VALUE_INFIX: &str = "infix";
pub const VALUE_PREFIX: &str = "prefix";
pub const VALUE_POSTFIX: &str = "postfix";
pub const VALUE_SURROUND: &str = "surround";
pub const VALUE_COMMA: &str = "comma";
pub const VALUE_SEMICOLON: &str = "semicolon";
pub const VALUE_INNER: &str = "inner";
pub const VALUE_OUTER: &str = "outer";
pub const VALUE_GLOBAL: &str = "global";

/// Option maps are small and key-sorted so output is deterministic.
pub type Options = BTreeMap<String, String>;

/// The universal AST value (§ data model): a name, an option map, a span,
/// and exclusively-owned children.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default, skip_serializing_if = "span_is_empty")]
    pub span: Span,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: Options,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

fn span_is_empty(span: &Span) -> bool {
    *span == Span::default()
}

impl Node {
    /// A node with no options, no children, and an empty span.
    pub fn new(name: &str) -> Node {
        Node {
            name: name.to_string(),
            ..Node::default()
        }
    }

    pub fn with_span(name: &str, span: Span) -> Node {
        Node {
            name: name.to_string(),
            span,
            ..Node::default()
        }
    }

    /// Leaf instruction or literal node carrying the given options.
    pub fn with_options(name: &str, options: &[(&str, &str)]) -> Node {
        let mut node = Node::new(name);
        for (key, value) in options {
            node.set_option(key, value);
        }
        node
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn set_option(&mut self, key: &str, value: &str) {
        self.options.insert(key.to_string(), value.to_string());
    }

    pub fn has_option(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// True when the option is present with the literal value `true`.
    pub fn option_is_true(&self, key: &str) -> bool {
        self.option(key) == Some(VALUE_TRUE)
    }

    /// The `name` option, used by identifier and operator nodes.
    pub fn ident_name(&self) -> Option<&str> {
        self.option(OPTION_NAME)
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    pub fn clear_children(&mut self) {
        self.children.clear();
    }

    /// Recompute this node's span as the union of its children's spans.
    pub fn update_span(&mut self) {
        if let Some((first, rest)) = self.children.split_first() {
            let mut span = first.span;
            for child in rest {
                span = span.merge(&child.span);
            }
            self.span = span;
        }
    }

    /// For a `number` node: the signed decimal integer text, or `None` when
    /// the literal is not a plain base-10 integer.
    pub fn to_integer(&self) -> Option<String> {
        if self.name != NAME_NUMBER {
            return None;
        }
        if self.option(OPTION_BASE).unwrap_or("10") != "10" {
            return None;
        }
        if !self.option(OPTION_FRACTION).unwrap_or("").is_empty() {
            return None;
        }
        if self.option(OPTION_EXPONENT).unwrap_or("0") != "0" {
            return None;
        }
        let mantissa = self.option(OPTION_MANTISSA)?;
        let digits: String = mantissa.chars().filter(|c| *c != '_').collect();
        if self.option(OPTION_SIGN) == Some("-") {
            Some(format!("-{digits}"))
        } else {
            Some(digits)
        }
    }
}

/// Trim an option value for display. Only values under the `value` key are
/// trimmed; over-long values end in a Unicode ellipsis.
pub fn trim_value(key: &str, value: &str, trim_length: usize) -> String {
    if key != OPTION_VALUE || trim_length == 0 || value.chars().count() <= trim_length {
        return value.to_string();
    }
    if trim_length >= 2 {
        let kept: String = value.chars().take(trim_length - 1).collect();
        format!("{kept}\u{2026}")
    } else {
        value.chars().take(trim_length).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_span_covers_all_children() {
        let mut node = Node::new(NAME_SEQ);
        node.add_child(Node::with_span(NAME_NUMBER, Span::new(1, 1, 1, 2)));
        node.add_child(Node::with_span(NAME_NUMBER, Span::new(2, 4, 2, 7)));
        node.update_span();
        assert_eq!(node.span, Span::new(1, 1, 2, 7));
    }

    #[test]
    fn integer_extraction_honours_sign_and_shape() {
        let mut number = Node::with_options(
            NAME_NUMBER,
            &[
                (OPTION_BASE, "10"),
                (OPTION_MANTISSA, "1_024"),
                (OPTION_FRACTION, ""),
                (OPTION_EXPONENT, "0"),
                (OPTION_SIGN, "-"),
            ],
        );
        assert_eq!(number.to_integer().as_deref(), Some("-1024"));

        number.set_option(OPTION_FRACTION, "5");
        assert_eq!(number.to_integer(), None);

        number.set_option(OPTION_FRACTION, "");
        number.set_option(OPTION_BASE, "16");
        assert_eq!(number.to_integer(), None);
    }

    #[test]
    fn trims_only_value_options() {
        assert_eq!(trim_value(OPTION_VALUE, "abcdefgh", 5), "abcd\u{2026}");
        assert_eq!(trim_value(OPTION_NAME, "abcdefgh", 5), "abcdefgh");
        assert_eq!(trim_value(OPTION_VALUE, "abc", 5), "abc");
    }

    #[test]
    fn json_round_trips_and_omits_empty_fields() {
        let mut unit = Node::with_span(NAME_UNIT, Span::new(1, 1, 1, 6));
        let mut bind = Node::with_span(NAME_BIND, Span::new(1, 1, 1, 6));
        let mut id = Node::with_span(NAME_IDENTIFIER, Span::new(1, 1, 1, 2));
        id.set_option(OPTION_NAME, "x");
        bind.add_child(id);
        bind.add_child(Node::with_options(
            NAME_NUMBER,
            &[(OPTION_MANTISSA, "1"), (OPTION_BASE, "10")],
        ));
        unit.add_child(bind);

        let json = serde_json::to_string(&unit).expect("serialize");
        assert!(!json.contains("\"options\":{}"), "empty options serialized");
        let back: Node = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, unit);
    }
}
