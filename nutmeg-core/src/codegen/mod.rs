//! Lowering of resolved function bodies to flat instruction streams.
//!
//! The generator walks the unit and compiles each top-level `bind`. A
//! non-function bound value is wrapped in a zero-argument function and the
//! bind marked `lazy=true`. Within one function the generator keeps an
//! append-only instruction list, a serial-number to stack-offset map, a
//! high-water mark for `nlocals`, a LIFO free list of temporaries, and a
//! label counter.
//!
//! Conditionals lower through a query-compilation scheme: a query is
//! compiled against a (success, failure) label pair, and the pair selects
//! one of nine branch shapes.

pub mod label;

use std::collections::HashMap;

use crate::error::CoreError;
use crate::node::{
    Node, NAME_APPLY, NAME_ARGUMENTS, NAME_BIND, NAME_BOOLEAN, NAME_CALL_GLOBAL_COUNTED,
    NAME_CHECK_BOOL, NAME_ERASE, NAME_FN, NAME_GOTO, NAME_IDENTIFIER, NAME_IF, NAME_IF_NOT,
    NAME_IF_NOT_RETURN, NAME_IF_SO, NAME_IF_SO_RETURN, NAME_IF_THEN_ELSE, NAME_LABEL, NAME_NUMBER,
    NAME_PART_APPLY, NAME_POP_LOCAL, NAME_PUSH_BOOL, NAME_PUSH_GLOBAL, NAME_PUSH_INT,
    NAME_PUSH_LOCAL, NAME_PUSH_STRING, NAME_RETURN, NAME_SEQ, NAME_STACK_LENGTH, NAME_STRING,
    NAME_SYSCALL, NAME_SYSCALL_COUNTED, NAME_UNIT, OPTION_DECIMAL, OPTION_LAZY, OPTION_NAME,
    OPTION_NLOCALS, OPTION_NPARAMS, OPTION_OFFSET, OPTION_SCOPE, OPTION_SERIAL_NO, OPTION_VALUE,
    VALUE_GLOBAL, VALUE_INNER, VALUE_OUTER, VALUE_TRUE,
};

use self::label::Label;

/// Per-run code generator. Holds no global state; per-function counters
/// live in [`FnState`].
#[derive(Debug, Default)]
pub struct CodeGenerator {}

impl CodeGenerator {
    pub fn new() -> CodeGenerator {
        CodeGenerator::default()
    }

    /// Compile every top-level bind of the unit in place.
    pub fn generate(&self, root: &mut Node) -> Result<(), CoreError> {
        if root.name != NAME_UNIT {
            return Err(CoreError::Codegen("expected unit node as root".to_string()));
        }
        for child in &mut root.children {
            match child.name.as_str() {
                NAME_BIND => self.generate_bind(child)?,
                other => {
                    return Err(CoreError::Codegen(format!(
                        "unimplemented top-level node: {other}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn generate_bind(&self, bind: &mut Node) -> Result<(), CoreError> {
        if bind.children.len() != 2 {
            return Err(CoreError::Codegen(
                "bind node must have exactly 2 children".to_string(),
            ));
        }
        if bind.children[1].name != NAME_FN {
            // Wrap plain values in a zero-argument function, forced lazily.
            bind.set_option(OPTION_LAZY, VALUE_TRUE);
            let value = std::mem::take(&mut bind.children[1]);
            let mut wrapper = Node::with_span(NAME_FN, value.span);
            wrapper.add_child(Node::with_span(NAME_ARGUMENTS, value.span));
            wrapper.add_child(value);
            bind.children[1] = wrapper;
        }
        let mut state = FnState::new();
        state.compile_fn(&mut bind.children[1])
    }
}

#[derive(Debug)]
struct Temporary {
    offset: usize,
}

/// Compilation state for a single function body.
#[derive(Debug, Default)]
pub struct FnState {
    instructions: Vec<Node>,
    local_offsets: HashMap<String, usize>,
    max_offset: usize,
    free_temporaries: Vec<Temporary>,
    label_counter: usize,
}

impl FnState {
    fn new() -> FnState {
        FnState::default()
    }

    /// Stack offset for an identifier serial number, allocated on first
    /// use.
    fn offset(&mut self, serial: &str) -> usize {
        if let Some(offset) = self.local_offsets.get(serial) {
            return *offset;
        }
        let offset = self.max_offset;
        self.local_offsets.insert(serial.to_string(), offset);
        self.max_offset += 1;
        offset
    }

    fn allocate_temporary(&mut self) -> Temporary {
        if let Some(temporary) = self.free_temporaries.pop() {
            return temporary;
        }
        let offset = self.max_offset;
        self.max_offset += 1;
        Temporary { offset }
    }

    fn free_temporary(&mut self, temporary: Temporary) {
        self.free_temporaries.push(temporary);
    }

    fn allocate_label(&mut self) -> Label {
        let label = Label::simple(format!("L{}", self.label_counter));
        self.label_counter += 1;
        label
    }

    fn emit(&mut self, name: &str, options: &[(&str, &str)]) {
        self.instructions.push(Node::with_options(name, options));
    }

    /// Compile a function node: prologue pops, body, epilogue return. The
    /// node's children are replaced by the flat instruction list.
    fn compile_fn(&mut self, node: &mut Node) -> Result<(), CoreError> {
        let nparams = node
            .children
            .first()
            .filter(|child| child.name == NAME_ARGUMENTS)
            .map(|arguments| arguments.children.len())
            .ok_or_else(|| {
                CoreError::Codegen("fn node must start with an arguments node".to_string())
            })?;
        node.set_option(OPTION_NPARAMS, &nparams.to_string());

        self.plant_pop_arguments(&node.children[0])?;
        for index in 1..node.children.len() {
            let body = std::mem::take(&mut node.children[index]);
            self.plant_instructions(&body)?;
        }
        self.emit(NAME_RETURN, &[]);

        node.set_option(OPTION_NLOCALS, &self.max_offset.to_string());
        node.clear_children();
        node.children = std::mem::take(&mut self.instructions);
        Ok(())
    }

    /// Parameters are popped in reverse declaration order: the last
    /// argument is on top of the stack.
    fn plant_pop_arguments(&mut self, arguments: &Node) -> Result<(), CoreError> {
        for parameter in arguments.children.iter().rev() {
            let serial = parameter.option(OPTION_SERIAL_NO).ok_or_else(|| {
                CoreError::Codegen("parameter is missing its serial number".to_string())
            })?;
            let offset = self.offset(serial);
            self.emit(NAME_POP_LOCAL, &[(OPTION_OFFSET, &offset.to_string())]);
        }
        Ok(())
    }

    pub fn plant_instructions(&mut self, node: &Node) -> Result<(), CoreError> {
        match node.name.as_str() {
            NAME_SYSCALL => {
                self.plant_children(node)?;
                let name = node
                    .option(OPTION_NAME)
                    .ok_or_else(|| {
                        CoreError::Codegen("syscall node missing name option".to_string())
                    })?
                    .to_string();
                self.emit(
                    NAME_SYSCALL_COUNTED,
                    &[
                        (OPTION_NAME, &name),
                        (OPTION_OFFSET, &node.children.len().to_string()),
                    ],
                );
                Ok(())
            }
            NAME_IDENTIFIER => match node.option(OPTION_SCOPE) {
                Some(VALUE_INNER) | Some(VALUE_OUTER) => {
                    let serial = node.option(OPTION_SERIAL_NO).ok_or_else(|| {
                        CoreError::Codegen("identifier missing serial number".to_string())
                    })?;
                    let offset = self.offset(serial);
                    self.emit(NAME_PUSH_LOCAL, &[(OPTION_OFFSET, &offset.to_string())]);
                    Ok(())
                }
                Some(VALUE_GLOBAL) => {
                    let name = node.option(OPTION_NAME).ok_or_else(|| {
                        CoreError::Codegen("identifier missing name option".to_string())
                    })?;
                    self.emit(NAME_PUSH_GLOBAL, &[(OPTION_NAME, name)]);
                    Ok(())
                }
                other => Err(CoreError::Codegen(format!(
                    "unknown identifier scope: {}",
                    other.unwrap_or("")
                ))),
            },
            NAME_NUMBER => match node.to_integer() {
                Some(decimal) => {
                    self.emit(NAME_PUSH_INT, &[(OPTION_DECIMAL, &decimal)]);
                    Ok(())
                }
                None => Err(CoreError::Codegen(
                    "non-integer numbers not implemented".to_string(),
                )),
            },
            NAME_STRING => {
                let value = node.option(OPTION_VALUE).ok_or_else(|| {
                    CoreError::Codegen("string node missing string value option".to_string())
                })?;
                self.emit(NAME_PUSH_STRING, &[(OPTION_VALUE, value)]);
                Ok(())
            }
            NAME_BOOLEAN => {
                let value = node.option(OPTION_VALUE).ok_or_else(|| {
                    CoreError::Codegen("boolean node missing value option".to_string())
                })?;
                self.emit(NAME_PUSH_BOOL, &[(OPTION_VALUE, value)]);
                Ok(())
            }
            // Sequences and argument lists are transparent containers.
            NAME_SEQ | NAME_ARGUMENTS => self.plant_children(node),
            NAME_APPLY => {
                if node.children.len() != 2 {
                    return Err(CoreError::Codegen(
                        "apply with != 2 children not implemented".to_string(),
                    ));
                }
                let temporary = self.plant_stack_length();
                self.plant_children(&node.children[1])?;
                self.plant_call(&node.children[0], &temporary)?;
                self.free_temporary(temporary);
                Ok(())
            }
            NAME_PART_APPLY => {
                if node.children.len() != 2 {
                    return Err(CoreError::Codegen(
                        "partapply node must have exactly 2 children".to_string(),
                    ));
                }
                let arguments = &node.children[1];
                self.plant_children(arguments)?;
                self.plant_instructions(&node.children[0])?;
                self.emit(
                    NAME_SYSCALL_COUNTED,
                    &[
                        (OPTION_NAME, NAME_PART_APPLY),
                        (OPTION_OFFSET, &(arguments.children.len() + 1).to_string()),
                    ],
                );
                Ok(())
            }
            NAME_IF => {
                if node.children.len() != 3 {
                    return Err(CoreError::Codegen(
                        "if node must have exactly three children".to_string(),
                    ));
                }
                self.plant_if(&node.children[0], &node.children[1], &node.children[2])
            }
            other => Err(CoreError::Codegen(format!(
                "unimplemented node type: {other}"
            ))),
        }
    }

    fn plant_children(&mut self, node: &Node) -> Result<(), CoreError> {
        for child in &node.children {
            self.plant_instructions(child)?;
        }
        Ok(())
    }

    fn plant_call(&mut self, target: &Node, temporary: &Temporary) -> Result<(), CoreError> {
        if target.name != NAME_IDENTIFIER {
            return Err(CoreError::Codegen(format!(
                "unimplemented call target node: {}",
                target.name
            )));
        }
        match target.option(OPTION_SCOPE) {
            Some(VALUE_GLOBAL) => {
                let name = target.option(OPTION_NAME).ok_or_else(|| {
                    CoreError::Codegen("identifier missing name option".to_string())
                })?;
                self.emit(
                    NAME_CALL_GLOBAL_COUNTED,
                    &[
                        (OPTION_NAME, name),
                        (OPTION_OFFSET, &temporary.offset.to_string()),
                    ],
                );
                Ok(())
            }
            Some(VALUE_INNER) | Some(VALUE_OUTER) => Err(CoreError::Codegen(format!(
                "cannot call local function: {}",
                target.option(OPTION_NAME).unwrap_or("")
            ))),
            other => Err(CoreError::Codegen(format!(
                "unknown identifier scope in call: {}",
                other.unwrap_or("")
            ))),
        }
    }

    fn plant_stack_length(&mut self) -> Temporary {
        let temporary = self.allocate_temporary();
        self.emit(
            NAME_STACK_LENGTH,
            &[(OPTION_OFFSET, &temporary.offset.to_string())],
        );
        temporary
    }

    /// Lower `if pred then-branch else-branch`.
    fn plant_if(
        &mut self,
        predicate: &Node,
        then_branch: &Node,
        else_branch: &Node,
    ) -> Result<(), CoreError> {
        let else_label = self.allocate_label();
        let end_label = self.allocate_label();
        self.plant_query(predicate, Label::Continue, else_label.clone())?;
        self.plant_instructions(then_branch)?;
        self.plant_goto(&end_label);
        self.plant_label(&else_label);
        self.plant_instructions(else_branch)?;
        self.plant_label(&end_label);
        Ok(())
    }

    /// Compile a query: record the stack height, evaluate the predicate,
    /// check exactly one boolean was pushed, then branch according to the
    /// (success, failure) label pair.
    pub fn plant_query(
        &mut self,
        query: &Node,
        success: Label,
        failure: Label,
    ) -> Result<(), CoreError> {
        let temporary = self.plant_stack_length();
        self.plant_instructions(query)?;
        self.emit(
            NAME_CHECK_BOOL,
            &[(OPTION_OFFSET, &temporary.offset.to_string())],
        );
        match (success, failure) {
            (Label::Continue, Label::Continue) => self.emit(NAME_ERASE, &[]),
            (Label::Continue, Label::Simple(fail)) => self.plant_if_not(&Label::Simple(fail)),
            (Label::Continue, Label::Return) => self.emit(NAME_IF_NOT_RETURN, &[]),
            (Label::Simple(ok), Label::Continue) => self.plant_if_so(&Label::Simple(ok)),
            (Label::Simple(ok), Label::Simple(fail)) => {
                self.emit(
                    NAME_IF_THEN_ELSE,
                    &[(OPTION_NAME, &ok), (OPTION_VALUE, &fail)],
                );
            }
            (Label::Simple(ok), Label::Return) => {
                self.plant_if_so(&Label::Simple(ok));
                self.emit(NAME_RETURN, &[]);
            }
            (Label::Return, Label::Continue) => self.emit(NAME_IF_SO_RETURN, &[]),
            (Label::Return, Label::Simple(fail)) => {
                self.plant_if_not(&Label::Simple(fail));
                self.emit(NAME_RETURN, &[]);
            }
            (Label::Return, Label::Return) => self.emit(NAME_RETURN, &[]),
        }
        self.free_temporary(temporary);
        Ok(())
    }

    fn plant_if_not(&mut self, label: &Label) {
        if let Label::Simple(text) = label {
            self.emit(NAME_IF_NOT, &[(OPTION_VALUE, text)]);
        }
    }

    fn plant_if_so(&mut self, label: &Label) {
        if let Label::Simple(text) = label {
            self.emit(NAME_IF_SO, &[(OPTION_VALUE, text)]);
        }
    }

    fn plant_goto(&mut self, label: &Label) {
        if let Label::Simple(text) = label {
            self.emit(NAME_GOTO, &[(OPTION_VALUE, text)]);
        }
    }

    fn plant_label(&mut self, label: &Label) {
        if let Label::Simple(text) = label {
            self.emit(NAME_LABEL, &[(OPTION_VALUE, text)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unit;
    use crate::resolve::Resolver;
    use crate::rewrite::Rewriter;
    use crate::tokenizer::tokenize;

    fn true_node() -> Node {
        Node::with_options(NAME_BOOLEAN, &[(OPTION_VALUE, VALUE_TRUE)])
    }

    fn number_node(mantissa: &str) -> Node {
        Node::with_options(
            NAME_NUMBER,
            &[
                ("mantissa", mantissa),
                ("fraction", ""),
                ("exponent", "0"),
                ("base", "10"),
            ],
        )
    }

    fn names(state: &FnState) -> Vec<&str> {
        state.instructions.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn label_allocation_counts_upwards() {
        let mut state = FnState::new();
        assert_eq!(state.allocate_label(), Label::simple("L0"));
        assert_eq!(state.allocate_label(), Label::simple("L1"));
        assert_eq!(state.allocate_label(), Label::simple("L2"));
        assert_eq!(state.label_counter, 3);
    }

    #[test]
    fn label_counters_are_per_function() {
        let mut first = FnState::new();
        let mut second = FnState::new();
        assert_eq!(first.allocate_label(), Label::simple("L0"));
        assert_eq!(second.allocate_label(), Label::simple("L0"));
        assert_eq!(first.allocate_label(), Label::simple("L1"));
    }

    #[test]
    fn temporaries_are_reused_lifo() {
        let mut state = FnState::new();
        let first = state.allocate_temporary();
        let first_offset = first.offset;
        state.free_temporary(first);
        let again = state.allocate_temporary();
        assert_eq!(again.offset, first_offset);
        let second = state.allocate_temporary();
        assert_eq!(second.offset, first_offset + 1);
    }

    #[test]
    fn query_lowering_selects_one_of_nine_shapes() {
        let cases: Vec<(Label, Label, Vec<&str>)> = vec![
            (
                Label::Continue,
                Label::Continue,
                vec![NAME_STACK_LENGTH, NAME_PUSH_BOOL, NAME_CHECK_BOOL, NAME_ERASE],
            ),
            (
                Label::Continue,
                Label::simple("L0"),
                vec![NAME_STACK_LENGTH, NAME_PUSH_BOOL, NAME_CHECK_BOOL, NAME_IF_NOT],
            ),
            (
                Label::Continue,
                Label::Return,
                vec![
                    NAME_STACK_LENGTH,
                    NAME_PUSH_BOOL,
                    NAME_CHECK_BOOL,
                    NAME_IF_NOT_RETURN,
                ],
            ),
            (
                Label::simple("L1"),
                Label::Continue,
                vec![NAME_STACK_LENGTH, NAME_PUSH_BOOL, NAME_CHECK_BOOL, NAME_IF_SO],
            ),
            (
                Label::simple("L2"),
                Label::simple("L3"),
                vec![
                    NAME_STACK_LENGTH,
                    NAME_PUSH_BOOL,
                    NAME_CHECK_BOOL,
                    NAME_IF_THEN_ELSE,
                ],
            ),
            (
                Label::simple("L4"),
                Label::Return,
                vec![
                    NAME_STACK_LENGTH,
                    NAME_PUSH_BOOL,
                    NAME_CHECK_BOOL,
                    NAME_IF_SO,
                    NAME_RETURN,
                ],
            ),
            (
                Label::Return,
                Label::Continue,
                vec![
                    NAME_STACK_LENGTH,
                    NAME_PUSH_BOOL,
                    NAME_CHECK_BOOL,
                    NAME_IF_SO_RETURN,
                ],
            ),
            (
                Label::Return,
                Label::simple("L5"),
                vec![
                    NAME_STACK_LENGTH,
                    NAME_PUSH_BOOL,
                    NAME_CHECK_BOOL,
                    NAME_IF_NOT,
                    NAME_RETURN,
                ],
            ),
            (
                Label::Return,
                Label::Return,
                vec![NAME_STACK_LENGTH, NAME_PUSH_BOOL, NAME_CHECK_BOOL, NAME_RETURN],
            ),
        ];
        for (success, failure, expected) in cases {
            let mut state = FnState::new();
            state
                .plant_query(&true_node(), success.clone(), failure.clone())
                .expect("query compiles");
            assert_eq!(
                names(&state),
                expected,
                "case ({success:?}, {failure:?})"
            );
        }
    }

    #[test]
    fn if_then_else_query_carries_both_labels() {
        let mut state = FnState::new();
        state
            .plant_query(
                &true_node(),
                Label::simple("SUCCESS"),
                Label::simple("FAILURE"),
            )
            .expect("query compiles");
        let branch = state
            .instructions
            .iter()
            .find(|i| i.name == NAME_IF_THEN_ELSE)
            .expect("if.then.else emitted");
        assert_eq!(branch.option(OPTION_NAME), Some("SUCCESS"));
        assert_eq!(branch.option(OPTION_VALUE), Some("FAILURE"));
    }

    #[test]
    fn if_lowering_produces_consistent_labels() {
        let mut state = FnState::new();
        let mut if_node = Node::new(NAME_IF);
        if_node.add_child(true_node());
        if_node.add_child(number_node("1"));
        if_node.add_child(number_node("2"));
        state.plant_instructions(&if_node).expect("if compiles");

        let expected = vec![
            NAME_STACK_LENGTH,
            NAME_PUSH_BOOL,
            NAME_CHECK_BOOL,
            NAME_IF_NOT,
            NAME_PUSH_INT,
            NAME_GOTO,
            NAME_LABEL,
            NAME_PUSH_INT,
            NAME_LABEL,
        ];
        assert_eq!(names(&state), expected);

        let else_target = state.instructions[3].option(OPTION_VALUE).unwrap();
        let end_target = state.instructions[5].option(OPTION_VALUE).unwrap();
        assert_eq!(state.instructions[6].option(OPTION_VALUE), Some(else_target));
        assert_eq!(state.instructions[8].option(OPTION_VALUE), Some(end_target));
        assert_ne!(else_target, end_target);
    }

    #[test]
    fn if_with_two_children_is_rejected() {
        let mut state = FnState::new();
        let mut if_node = Node::new(NAME_IF);
        if_node.add_child(true_node());
        if_node.add_child(number_node("1"));
        let err = state.plant_instructions(&if_node).unwrap_err();
        assert!(err.to_string().contains("three children"));
    }

    #[test]
    fn goto_and_label_share_the_value_option() {
        let mut state = FnState::new();
        let label = Label::simple("TEST_LABEL");
        state.plant_goto(&label);
        state.plant_label(&label);
        assert_eq!(names(&state), vec![NAME_GOTO, NAME_LABEL]);
        assert_eq!(state.instructions[0].option(OPTION_VALUE), Some("TEST_LABEL"));
        assert_eq!(state.instructions[1].option(OPTION_VALUE), Some("TEST_LABEL"));
    }

    fn compile(input: &str) -> Node {
        let unit = parse_unit(tokenize(input).expect("tokenize"), "").expect("parse");
        let rewriter = Rewriter::default_rules().expect("compile rules");
        let (mut unit, _) = rewriter.rewrite(unit, 0).expect("rewrite");
        Resolver::new().resolve(&mut unit).expect("resolve");
        CodeGenerator::new()
            .generate(&mut unit)
            .expect("generate code");
        unit
    }

    #[test]
    fn end_to_end_increment_function() {
        let unit = compile("def f(x) =>> x + 1 end");
        let bind = &unit.children[0];
        let fn_node = &bind.children[1];
        assert_eq!(fn_node.option(OPTION_NPARAMS), Some("1"));
        assert_eq!(fn_node.option(OPTION_NLOCALS), Some("1"));

        let instruction_names: Vec<&str> =
            fn_node.children.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            instruction_names,
            vec![
                NAME_POP_LOCAL,
                NAME_PUSH_LOCAL,
                NAME_PUSH_INT,
                NAME_SYSCALL_COUNTED,
                NAME_RETURN,
            ]
        );
        assert_eq!(fn_node.children[0].option(OPTION_OFFSET), Some("0"));
        assert_eq!(fn_node.children[1].option(OPTION_OFFSET), Some("0"));
        assert_eq!(fn_node.children[2].option(OPTION_DECIMAL), Some("1"));
        assert_eq!(fn_node.children[3].option(OPTION_NAME), Some("+"));
    }

    #[test]
    fn non_function_binds_become_lazy_thunks() {
        let unit = compile("x := 1");
        let bind = &unit.children[0];
        assert_eq!(bind.option(OPTION_LAZY), Some("true"));
        let thunk = &bind.children[1];
        assert_eq!(thunk.name, NAME_FN);
        assert_eq!(thunk.option(OPTION_NPARAMS), Some("0"));
        let instruction_names: Vec<&str> = thunk.children.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(instruction_names, vec![NAME_PUSH_INT, NAME_RETURN]);
    }

    #[test]
    fn every_compiled_fn_ends_with_one_return() {
        let unit = compile("def f(x) =>> x + 1 end\ny := 2\ndef g() =>> f(3) end");
        for bind in &unit.children {
            let fn_node = &bind.children[1];
            let returns = fn_node
                .children
                .iter()
                .filter(|i| i.name == NAME_RETURN)
                .count();
            assert_eq!(returns, 1);
            assert_eq!(fn_node.children.last().unwrap().name, NAME_RETURN);
            let nparams: usize = fn_node.option(OPTION_NPARAMS).unwrap().parse().unwrap();
            let nlocals: usize = fn_node.option(OPTION_NLOCALS).unwrap().parse().unwrap();
            assert!(nlocals >= nparams);
        }
    }

    #[test]
    fn calls_snapshot_the_stack_into_a_temporary() {
        let unit = compile("def g(x) =>> f(x, 2) end");
        let fn_node = &unit.children[0].children[1];
        let instruction_names: Vec<&str> =
            fn_node.children.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            instruction_names,
            vec![
                NAME_POP_LOCAL,
                NAME_STACK_LENGTH,
                NAME_PUSH_LOCAL,
                NAME_PUSH_INT,
                NAME_CALL_GLOBAL_COUNTED,
                NAME_RETURN,
            ]
        );
        let call = &fn_node.children[4];
        assert_eq!(call.option(OPTION_NAME), Some("f"));
        // The call's offset names the stack-length temporary.
        let snapshot = &fn_node.children[1];
        assert_eq!(call.option(OPTION_OFFSET), snapshot.option(OPTION_OFFSET));
        // x occupies offset 0, so the temporary sits above it.
        assert_eq!(snapshot.option(OPTION_OFFSET), Some("1"));
    }

    #[test]
    fn calling_a_local_function_is_rejected() {
        let unit = parse_unit(
            tokenize("def g(f) =>> f(1) end").expect("tokenize"),
            "",
        )
        .expect("parse");
        let rewriter = Rewriter::default_rules().expect("compile rules");
        let (mut unit, _) = rewriter.rewrite(unit, 0).expect("rewrite");
        Resolver::new().resolve(&mut unit).expect("resolve");
        let err = CodeGenerator::new().generate(&mut unit).unwrap_err();
        assert!(
            err.to_string().contains("cannot call local function: f"),
            "got: {err}"
        );
    }

    #[test]
    fn non_integer_literals_are_rejected() {
        let unit = parse_unit(tokenize("def f() =>> 1.5 end").expect("tokenize"), "")
            .expect("parse");
        let rewriter = Rewriter::default_rules().expect("compile rules");
        let (mut unit, _) = rewriter.rewrite(unit, 0).expect("rewrite");
        Resolver::new().resolve(&mut unit).expect("resolve");
        let err = CodeGenerator::new().generate(&mut unit).unwrap_err();
        assert!(err.to_string().contains("non-integer numbers"));
    }

    #[test]
    fn negated_literals_push_signed_integers() {
        let unit = compile("def f() =>> -5 end");
        let fn_node = &unit.children[0].children[1];
        assert_eq!(fn_node.children[0].option(OPTION_DECIMAL), Some("-5"));
    }

    #[test]
    fn conditional_inside_function_compiles_with_labels() {
        let unit = compile("def f(p) =>> if p then 1 else 2 end end");
        let fn_node = &unit.children[0].children[1];
        let instruction_names: Vec<&str> =
            fn_node.children.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            instruction_names,
            vec![
                NAME_POP_LOCAL,
                NAME_STACK_LENGTH,
                NAME_PUSH_LOCAL,
                NAME_CHECK_BOOL,
                NAME_IF_NOT,
                NAME_PUSH_INT,
                NAME_GOTO,
                NAME_LABEL,
                NAME_PUSH_INT,
                NAME_LABEL,
                NAME_RETURN,
            ]
        );
    }
}
