//! Structural validation of parser output.
//!
//! The checker is the one stage that accumulates diagnostics instead of
//! failing fast. It distinguishes **bugs** (shapes the parser is supposed
//! to guarantee; seeing one means the parser is faulty) from **issues**
//! (shapes the parser accepts but the language rejects, such as a malformed
//! `def` pattern). All diagnostics carry the offending node's span and are
//! reported together.

use std::io::Write;

use crate::node::{
    Node, NAME_APPLY, NAME_ARGUMENTS, NAME_DELIMITED, NAME_FORM, NAME_IDENTIFIER, NAME_JOIN,
    NAME_JOIN_LINES, NAME_NUMBER, NAME_OPERATOR, NAME_PART, NAME_STRING, NAME_UNIT, OPTION_KEYWORD,
    OPTION_KIND, OPTION_NAME, VALUE_BRACES, VALUE_BRACKETS, VALUE_PARENTHESES,
};
use crate::span::Span;

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
}

/// Validates a parsed unit before rewriting.
#[derive(Debug, Default)]
pub struct Checker {
    /// Internal-consistency failures: the parser broke its own guarantees.
    pub bugs: Vec<Diagnostic>,
    /// User-facing validation failures.
    pub issues: Vec<Diagnostic>,
}

impl Checker {
    pub fn new() -> Checker {
        Checker::default()
    }

    /// Validate the unit, accumulating diagnostics. Returns true when the
    /// tree is clean.
    pub fn check(&mut self, node: &Node) -> bool {
        if node.name != NAME_UNIT {
            self.issue("expected unit node as root", node);
            return false;
        }
        self.validate_children(node);
        self.bugs.is_empty() && self.issues.is_empty()
    }

    /// Render every accumulated diagnostic, bugs first.
    pub fn report(&self, output: &mut dyn Write) -> std::io::Result<()> {
        if !self.bugs.is_empty() {
            writeln!(
                output,
                "Bug in parser detected; the output of the parser is faulty:"
            )?;
            for (count, bug) in self.bugs.iter().enumerate() {
                writeln!(
                    output,
                    "  [{}]. {}, at line {}, column {}",
                    count + 1,
                    bug.message,
                    bug.span.start_line,
                    bug.span.start_col
                )?;
            }
        }
        if !self.issues.is_empty() {
            writeln!(output, "Errors found in the source code:")?;
            for (count, issue) in self.issues.iter().enumerate() {
                writeln!(
                    output,
                    "  [{}]. {}, at line {}, column {}",
                    count + 1,
                    issue.message,
                    issue.span.start_line,
                    issue.span.start_col
                )?;
            }
        }
        Ok(())
    }

    fn validate_children(&mut self, node: &Node) {
        for child in &node.children {
            self.validate(child);
        }
    }

    fn validate(&mut self, node: &Node) {
        match node.name.as_str() {
            NAME_APPLY => self.validate_apply(node),
            NAME_DELIMITED => self.validate_delimited(node),
            NAME_FORM => self.validate_form(node),
            NAME_IDENTIFIER => self.validate_identifier(node),
            NAME_NUMBER | NAME_STRING => self.fact_arity(0, node),
            NAME_JOIN | NAME_JOIN_LINES => self.validate_children(node),
            NAME_OPERATOR => self.validate_operator(node),
            NAME_PART => self.bug("misplaced part", node),
            other => self.bug(&format!("unexpected node type: {other}"), node),
        }
    }

    fn validate_operator(&mut self, node: &Node) {
        if !node.has_option(OPTION_NAME) {
            self.bug("operator node missing name option", node);
        }
        self.validate_children(node);
    }

    fn validate_apply(&mut self, node: &Node) {
        if node.children.len() != 2 {
            self.bug("apply node must have exactly two children", node);
            return;
        }
        self.validate(&node.children[0]);
        let rhs = &node.children[1];
        if rhs.name != NAME_ARGUMENTS {
            self.bug("invalid apply arguments node", rhs);
            return;
        }
        self.validate_children(rhs);
    }

    fn validate_delimited(&mut self, node: &Node) {
        match node.option(OPTION_KIND) {
            None => {
                self.bug("delimited node missing kind option", node);
                return;
            }
            Some(VALUE_PARENTHESES) | Some(VALUE_BRACKETS) | Some(VALUE_BRACES) => {}
            Some(kind) => self.bug(&format!("unexpected delimited kind: {kind}"), node),
        }
        self.validate_children(node);
    }

    fn validate_identifier(&mut self, node: &Node) {
        if !node.has_option(OPTION_NAME) {
            self.bug("identifier node missing name option", node);
        }
        if !node.children.is_empty() {
            self.bug("identifier node should not have children", node);
        }
    }

    fn validate_form(&mut self, node: &Node) {
        if node.children.is_empty() {
            self.bug("form node must have at least one child", node);
            return;
        }
        for part in &node.children {
            if part.name != NAME_PART {
                self.bug("form node children must be part nodes", part);
                return;
            }
            if !part.has_option(OPTION_KEYWORD) {
                self.bug("part node missing keyword option", part);
            }
        }
        let first = &node.children[0];
        match first.option(OPTION_KEYWORD).unwrap_or("") {
            "def" => self.validate_form_def(node),
            "fn" => self.validate_form_fn(node),
            "if" | "ifnot" | "switch" | "let" => self.validate_grand_children(node),
            "for" => self.validate_form_for(node),
            "var" | "val" | "const" => self.validate_form_qualifier(node),
            "return" | "yield" => self.validate_grand_children(node),
            keyword => self.issue(&format!("unexpected form keyword: {keyword}"), first),
        }
    }

    fn validate_form_def(&mut self, form: &Node) {
        if !self.fact_arity_checked(2, form) {
            return;
        }
        let first_part = &form.children[0];
        if !self.fact_arity_checked(1, first_part) {
            return;
        }
        self.validate_def_pattern(&first_part.children[0]);
        self.validate_children(&form.children[1]);
    }

    /// A definition pattern is the application of an identifier to zero or
    /// more identifiers, possibly dotted or parenthesized.
    fn validate_def_pattern(&mut self, node: &Node) {
        match node.name.as_str() {
            NAME_OPERATOR => self.validate_def_dot(node),
            NAME_APPLY => self.validate_def_apply(node),
            NAME_DELIMITED => {
                if node.option(OPTION_KIND) != Some(VALUE_PARENTHESES) {
                    self.issue("invalid delimited kind in def pattern", node);
                    return;
                }
                if !self.expect_arity(1, node) {
                    return;
                }
                self.validate_def_pattern(&node.children[0]);
            }
            _ => self.issue("invalid node in def pattern", node),
        }
    }

    fn validate_def_apply(&mut self, node: &Node) {
        if !self.fact_arity_checked(2, node) {
            return;
        }
        let lhs = &node.children[0];
        match lhs.name.as_str() {
            NAME_IDENTIFIER => self.validate_identifier(lhs),
            NAME_OPERATOR => self.validate_def_dot(lhs),
            _ => self.issue("invalid lhs in def pattern apply", node),
        }
        self.validate_def_args(&node.children[1]);
    }

    fn validate_def_dot(&mut self, node: &Node) {
        if node.option(OPTION_NAME) != Some(".") {
            self.issue("invalid operator in def pattern", node);
            return;
        }
        if !self.fact_arity_checked(2, node) {
            return;
        }
        self.validate_def_arg(&node.children[0]);
        self.validate_def_fn(&node.children[1]);
    }

    fn validate_def_args(&mut self, node: &Node) {
        if node.name != NAME_ARGUMENTS {
            self.issue("args must be an arguments node", node);
            return;
        }
        if node.option(OPTION_KIND) != Some(VALUE_PARENTHESES) {
            self.issue("invalid brackets for function parameters", node);
            return;
        }
        for child in &node.children {
            self.validate_def_arg(child);
        }
    }

    fn validate_def_arg(&mut self, node: &Node) {
        match node.name.as_str() {
            NAME_IDENTIFIER => self.validate_identifier(node),
            NAME_DELIMITED => {
                if !self.expect_arity(1, node) {
                    return;
                }
                self.validate_def_arg(&node.children[0]);
            }
            _ => self.issue("invalid parameter", node),
        }
    }

    fn validate_def_fn(&mut self, node: &Node) {
        match node.name.as_str() {
            NAME_IDENTIFIER => self.validate_identifier(node),
            NAME_DELIMITED => {
                if !self.expect_arity(1, node) {
                    return;
                }
                self.validate_def_fn(&node.children[0]);
            }
            _ => self.issue("invalid fn in def pattern", node),
        }
    }

    fn validate_form_fn(&mut self, form: &Node) {
        if !self.fact_arity_checked(2, form) {
            return;
        }
        let params_part = &form.children[0];
        if !self.fact_arity_checked(1, params_part) {
            return;
        }
        let params = &params_part.children[0];
        match params.name.as_str() {
            NAME_DELIMITED => {
                if params.option(OPTION_KIND) != Some(VALUE_PARENTHESES) {
                    self.issue("invalid brackets for function parameters", params);
                } else {
                    for child in &params.children {
                        self.validate_def_arg(child);
                    }
                }
            }
            NAME_IDENTIFIER => self.validate_identifier(params),
            _ => {
                self.issue("fn parameters must be delimited or identifier", form);
                return;
            }
        }
        self.validate_children(&form.children[1]);
    }

    fn validate_form_for(&mut self, form: &Node) {
        if !self.fact_arity_checked(2, form) {
            return;
        }
        let query_part = &form.children[0];
        if !self.fact_arity_checked(1, query_part) {
            return;
        }
        self.validate_query(&query_part.children[0]);
        self.validate_children(&form.children[1]);
    }

    fn validate_query(&mut self, query: &Node) {
        if query.name != NAME_OPERATOR {
            self.issue("invalid query node", query);
            return;
        }
        match query.option(OPTION_NAME) {
            Some("in") => {
                if !self.fact_arity_checked(2, query) {
                    return;
                }
                self.validate_identifier(&query.children[0]);
                self.validate(&query.children[1]);
            }
            Some(name) => self.issue(&format!("invalid query operator: {name}"), query),
            None => self.bug("operator node missing name option", query),
        }
    }

    fn validate_form_qualifier(&mut self, form: &Node) {
        if !self.fact_arity_checked(1, form) {
            return;
        }
        let part = &form.children[0];
        if !self.expect_arity(1, part) {
            return;
        }
        self.validate(&part.children[0]);
    }

    fn validate_grand_children(&mut self, form: &Node) {
        for part in &form.children {
            self.validate_children(part);
        }
    }

    fn fact_arity(&mut self, arity: usize, node: &Node) {
        self.fact_arity_checked(arity, node);
    }

    fn fact_arity_checked(&mut self, arity: usize, node: &Node) -> bool {
        if node.children.len() != arity {
            self.bug(
                &format!("expected {arity} children, got {}", node.children.len()),
                node,
            );
            return false;
        }
        true
    }

    fn expect_arity(&mut self, arity: usize, node: &Node) -> bool {
        if node.children.len() != arity {
            self.issue(
                &format!("expected {arity} children, got {}", node.children.len()),
                node,
            );
            return false;
        }
        true
    }

    // A bug means the parser was supposed to guarantee the condition.
    fn bug(&mut self, message: &str, node: &Node) {
        self.bugs.push(Diagnostic {
            message: message.to_string(),
            span: node.span,
        });
    }

    // An issue means the user wrote something the parser accepts but the
    // language rejects.
    fn issue(&mut self, message: &str, node: &Node) {
        self.issues.push(Diagnostic {
            message: message.to_string(),
            span: node.span,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unit;
    use crate::tokenizer::tokenize;

    fn check(input: &str) -> Checker {
        let unit = parse_unit(tokenize(input).expect("tokenize"), "").expect("parse");
        let mut checker = Checker::new();
        checker.check(&unit);
        checker
    }

    #[test]
    fn accepts_well_formed_definitions() {
        let checker = check("def f(x) =>> x + 1 end");
        assert!(checker.bugs.is_empty(), "bugs: {:?}", checker.bugs);
        assert!(checker.issues.is_empty(), "issues: {:?}", checker.issues);
    }

    #[test]
    fn accepts_conditionals_and_qualifiers() {
        let checker = check("if p then a else b end\nconst x := 1");
        assert!(checker.bugs.is_empty(), "bugs: {:?}", checker.bugs);
        assert!(checker.issues.is_empty(), "issues: {:?}", checker.issues);
    }

    #[test]
    fn flags_malformed_def_patterns() {
        let checker = check("def 1(x) =>> x end");
        assert!(
            checker.issues.iter().any(|d| d.message.contains("def pattern")),
            "issues: {:?}",
            checker.issues
        );
    }

    #[test]
    fn flags_non_identifier_parameters() {
        let checker = check("def f(1) =>> 0 end");
        assert!(
            checker.issues.iter().any(|d| d.message == "invalid parameter"),
            "issues: {:?}",
            checker.issues
        );
    }

    #[test]
    fn reports_accumulate_rather_than_fail_fast() {
        let checker = check("def f(1) =>> 0 end\ndef g(2) =>> 0 end");
        assert_eq!(checker.issues.len(), 2);
    }

    #[test]
    fn report_lists_diagnostics_with_spans() {
        let checker = check("def f(1) =>> 0 end");
        let mut out = Vec::new();
        checker.report(&mut out).expect("report");
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Errors found in the source code:"));
        assert!(text.contains("at line 1, column"));
    }
}
