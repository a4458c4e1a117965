//! Identifier resolution, closure realisation, and lambda lifting.
//!
//! Four passes over the rewritten tree:
//!
//! 1. *Traversal* builds the scope structure, assigns every identifier a
//!    unique serial number, classifies references, and infers capture sets.
//! 2. *Annotation* writes `var`/`const`/`scope` onto identifier nodes,
//!    marks final references with `last=true`, and checks bind/assign
//!    integrity.
//! 3. *Closure realisation* turns each capturing `fn` into a `partapply`
//!    of a rewritten `fn` (captured variables become trailing parameters
//!    with fresh serial numbers) and an `arguments` node naming the
//!    captured outer variables.
//! 4. *Lambda lifting* hoists every remaining non-top-level `fn` into a
//!    fresh top-level `bind` and replaces it with a global reference.
//!
//! Node bookkeeping uses deterministic preorder counters instead of node
//! pointers, so the tree stays exclusively owned.

pub mod scope;

use std::collections::HashMap;

use crate::error::CoreError;
use crate::node::{
    Node, NAME_ARGUMENTS, NAME_ASSIGN, NAME_BIND, NAME_FN, NAME_FOR, NAME_IDENTIFIER, NAME_IF,
    NAME_LET, NAME_PART_APPLY, NAME_UNIT, OPTION_CONST, OPTION_LAST, OPTION_NAME, OPTION_PROTECTED,
    OPTION_SCOPE, OPTION_SERIAL_NO, OPTION_VAR, VALUE_TRUE,
};
use crate::span::Span;

use self::scope::{IdentInfo, Scope, ScopeKind};

pub struct Resolver {
    scopes: Vec<Scope>,
    next_id: u64,
    info: HashMap<u64, IdentInfo>,
    /// Preorder counter over identifier nodes, shared by passes 1 and 2.
    ident_counter: usize,
    /// Preorder counter over `fn` nodes, shared by passes 1 and 3.
    fn_counter: usize,
    /// Capture set per `fn` preorder index, in stable insertion order.
    captures: HashMap<usize, Vec<u64>>,
}

impl Default for Resolver {
    fn default() -> Resolver {
        Resolver::new()
    }
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver {
            scopes: vec![Scope::global()],
            next_id: 0,
            info: HashMap::new(),
            ident_counter: 0,
            fn_counter: 0,
            captures: HashMap::new(),
        }
    }

    /// Run all four passes over the unit.
    pub fn resolve(&mut self, root: &mut Node) -> Result<(), CoreError> {
        self.traverse(root)?;
        self.ident_counter = 0;
        self.annotate(root)?;
        self.fn_counter = 0;
        self.realise_closures(root)?;
        self.lift_lambdas(root)?;
        Ok(())
    }

    pub fn info(&self, unique_id: u64) -> Option<&IdentInfo> {
        self.info.get(&unique_id)
    }

    // -----------------------------------------------------------------
    // Pass 1: traversal
    // -----------------------------------------------------------------

    fn traverse(&mut self, node: &mut Node) -> Result<(), CoreError> {
        match node.name.as_str() {
            NAME_BIND => self.traverse_bind(node),
            NAME_FN => self.traverse_fn(node),
            NAME_LET | NAME_IF | NAME_FOR => self.traverse_lexical(node),
            NAME_IDENTIFIER => self.reference_identifier(node),
            _ => {
                for child in &mut node.children {
                    self.traverse(child)?;
                }
                Ok(())
            }
        }
    }

    fn traverse_bind(&mut self, node: &mut Node) -> Result<(), CoreError> {
        let mut children = node.children.iter_mut();
        if let Some(first) = children.next() {
            if first.name == NAME_IDENTIFIER {
                self.define_identifier(first)?;
            } else {
                self.traverse(first)?;
            }
        }
        for child in children {
            self.traverse(child)?;
        }
        Ok(())
    }

    fn traverse_fn(&mut self, node: &mut Node) -> Result<(), CoreError> {
        let fn_index = self.fn_counter;
        self.fn_counter += 1;

        let child_scope = self
            .scopes
            .last()
            .expect("scope stack is never empty")
            .child(true, Some(fn_index));
        self.scopes.push(child_scope);

        let mut children = node.children.iter_mut();
        let Some(arguments) = children.next() else {
            return Err(CoreError::resolve("invalid function node", node.span));
        };
        if arguments.name != NAME_ARGUMENTS {
            return Err(CoreError::resolve(
                "invalid function arguments node",
                arguments.span,
            ));
        }
        for param in &mut arguments.children {
            if param.name == NAME_IDENTIFIER {
                self.define_identifier(param)?;
            }
        }
        for child in children {
            self.traverse(child)?;
        }

        let scope = self.scopes.pop().expect("fn scope is on the stack");
        if !scope.captured.is_empty() {
            self.captures
                .insert(fn_index, scope.captured.keys().copied().collect());
        }
        Ok(())
    }

    fn traverse_lexical(&mut self, node: &mut Node) -> Result<(), CoreError> {
        let child_scope = self
            .scopes
            .last()
            .expect("scope stack is never empty")
            .child(false, None);
        self.scopes.push(child_scope);
        for child in &mut node.children {
            self.traverse(child)?;
        }
        self.scopes.pop();
        Ok(())
    }

    /// Define a new identifier in the innermost scope. Fails when the name
    /// would re-declare or shadow a protected definition.
    fn define_identifier(&mut self, node: &mut Node) -> Result<(), CoreError> {
        // Defining occurrences advance the identifier counter but never
        // become "last references".
        self.next_ident_position();
        let name = node
            .ident_name()
            .ok_or_else(|| CoreError::resolve("invalid identifier node", node.span))?
            .to_string();

        for scope in self.scopes.iter().rev() {
            if let Some(existing) = scope.names.get(&name) {
                if self.info[existing].is_protected {
                    return Err(CoreError::resolve(
                        format!("trying to re-declare protected identifier: {name}"),
                        node.span,
                    ));
                }
                break;
            }
        }

        let scope = self.scopes.last().expect("scope stack is never empty");
        let unique_id = self.next_id;
        self.next_id += 1;
        let is_assignable = node.option_is_true(OPTION_VAR);
        let is_const =
            node.option_is_true(OPTION_CONST) || (scope.dynamic_level == 0 && !is_assignable);
        let info = IdentInfo {
            name: name.clone(),
            unique_id,
            def_dyn_level: scope.dynamic_level,
            scope_kind: if self.scopes.len() == 1 {
                ScopeKind::Global
            } else {
                ScopeKind::Inner
            },
            is_assignable,
            is_const,
            is_protected: node.option_is_true(OPTION_PROTECTED) || node.option_is_true(OPTION_CONST),
            last_reference: None,
        };
        self.info.insert(unique_id, info);
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .names
            .insert(name, unique_id);
        node.set_option(OPTION_SERIAL_NO, &unique_id.to_string());
        Ok(())
    }

    /// Resolve a reference, reclassifying and registering captures when the
    /// definition lives in an outer dynamic scope.
    fn reference_identifier(&mut self, node: &mut Node) -> Result<(), CoreError> {
        let position = self.next_ident_position();
        let name = node
            .ident_name()
            .ok_or_else(|| CoreError::resolve("invalid identifier node", node.span))?
            .to_string();

        let found = self
            .scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, scope)| scope.names.get(&name).map(|id| (index, *id)));

        let unique_id = match found {
            Some((def_index, unique_id)) => {
                let def_level = self.info[&unique_id].def_dyn_level;
                let ref_level = self
                    .scopes
                    .last()
                    .expect("scope stack is never empty")
                    .dynamic_level;
                if def_level != 0 && def_level != ref_level {
                    self.info
                        .get_mut(&unique_id)
                        .expect("resolved identifier has metadata")
                        .scope_kind = ScopeKind::Outer;
                    for scope in &mut self.scopes[def_index + 1..] {
                        if scope.is_dynamic {
                            scope.captured.insert(unique_id, ());
                        }
                    }
                }
                unique_id
            }
            None => self.define_undefined_global(&name),
        };

        self.info
            .get_mut(&unique_id)
            .expect("resolved identifier has metadata")
            .last_reference = Some(position);
        node.set_option(OPTION_SERIAL_NO, &unique_id.to_string());
        Ok(())
    }

    /// An unresolved name becomes an implicit global.
    fn define_undefined_global(&mut self, name: &str) -> u64 {
        let unique_id = self.next_id;
        self.next_id += 1;
        self.info.insert(
            unique_id,
            IdentInfo {
                name: name.to_string(),
                unique_id,
                def_dyn_level: 0,
                scope_kind: ScopeKind::Global,
                is_assignable: false,
                is_const: false,
                is_protected: false,
                last_reference: None,
            },
        );
        self.scopes[0].names.insert(name.to_string(), unique_id);
        unique_id
    }

    fn next_ident_position(&mut self) -> usize {
        let position = self.ident_counter;
        self.ident_counter += 1;
        position
    }

    // -----------------------------------------------------------------
    // Pass 2: annotation
    // -----------------------------------------------------------------

    fn annotate(&mut self, node: &mut Node) -> Result<(), CoreError> {
        if node.name == NAME_IDENTIFIER {
            let position = self.next_ident_position();
            if let Some(info) = self.node_info(node) {
                let info = info.clone();
                node.set_option(OPTION_VAR, bool_str(info.is_assignable));
                node.set_option(OPTION_CONST, bool_str(info.is_const));
                node.set_option(OPTION_SCOPE, info.scope_kind.as_str());
                if info.last_reference == Some(position) {
                    node.set_option(OPTION_LAST, VALUE_TRUE);
                }
            }
        }
        for child in &mut node.children {
            self.annotate(child)?;
        }
        self.check_integrity(node)?;
        Ok(())
    }

    /// Upwards bind/assign integrity checks.
    fn check_integrity(&self, node: &Node) -> Result<(), CoreError> {
        match node.name.as_str() {
            NAME_BIND => {
                if node.children.len() != 2 {
                    return Err(CoreError::resolve(
                        "bind node must have exactly two children",
                        node.span,
                    ));
                }
                Ok(())
            }
            NAME_ASSIGN => {
                if node.children.len() != 2 {
                    return Err(CoreError::resolve(
                        "assign node must have exactly two children",
                        node.span,
                    ));
                }
                let target = &node.children[0];
                if target.name != NAME_IDENTIFIER {
                    return Err(CoreError::resolve(
                        "assignment target must be an identifier",
                        target.span,
                    ));
                }
                match self.node_info(target) {
                    Some(info) if info.is_assignable => Ok(()),
                    Some(info) => Err(CoreError::resolve(
                        format!("cannot assign to non-assignable identifier: {}", info.name),
                        target.span,
                    )),
                    None => Err(CoreError::resolve(
                        "assignment target was not resolved",
                        target.span,
                    )),
                }
            }
            _ => Ok(()),
        }
    }

    fn node_info(&self, node: &Node) -> Option<&IdentInfo> {
        let no = node.option(OPTION_SERIAL_NO)?.parse::<u64>().ok()?;
        self.info.get(&no)
    }

    // -----------------------------------------------------------------
    // Pass 3: closure realisation
    // -----------------------------------------------------------------

    fn realise_closures(&mut self, node: &mut Node) -> Result<(), CoreError> {
        if node.name == NAME_FN {
            let fn_index = self.fn_counter;
            self.fn_counter += 1;
            for child in &mut node.children {
                self.realise_closures(child)?;
            }
            if let Some(captured) = self.captures.remove(&fn_index) {
                self.realise_one(node, &captured)?;
            }
            return Ok(());
        }
        for child in &mut node.children {
            self.realise_closures(child)?;
        }
        Ok(())
    }

    /// Rewrite one capturing `fn` into `partapply(fn, arguments)`.
    fn realise_one(&mut self, node: &mut Node, captured: &[u64]) -> Result<(), CoreError> {
        let span = node.span;
        let mut outer_arguments = Node::with_span(NAME_ARGUMENTS, span);
        let mut remap: HashMap<u64, u64> = HashMap::new();

        for &original in captured {
            let original_info = self.info[&original].clone();
            outer_arguments.add_child(self.make_ident(&original_info, original, span));

            let fresh = self.next_id;
            self.next_id += 1;
            let fresh_info = IdentInfo {
                unique_id: fresh,
                scope_kind: ScopeKind::Inner,
                last_reference: None,
                ..original_info
            };
            let parameter = self.make_ident(&fresh_info, fresh, span);
            self.info.insert(fresh, fresh_info);
            remap.insert(original, fresh);

            let parameters = node
                .children
                .first_mut()
                .ok_or_else(|| CoreError::resolve("invalid function node", span))?;
            parameters.add_child(parameter);
        }

        for body in node.children.iter_mut().skip(1) {
            self.remap_references(body, &remap);
        }

        let inner = std::mem::take(node);
        let mut partapply = Node::with_span(NAME_PART_APPLY, span);
        partapply.add_child(inner);
        partapply.add_child(outer_arguments);
        *node = partapply;
        Ok(())
    }

    fn make_ident(&self, info: &IdentInfo, unique_id: u64, span: Span) -> Node {
        let mut ident = Node::with_span(NAME_IDENTIFIER, span);
        ident.set_option(OPTION_NAME, &info.name);
        ident.set_option(OPTION_SERIAL_NO, &unique_id.to_string());
        ident.set_option(OPTION_SCOPE, info.scope_kind.as_str());
        ident.set_option(OPTION_VAR, bool_str(info.is_assignable));
        ident.set_option(OPTION_CONST, bool_str(info.is_const));
        ident
    }

    fn remap_references(&self, node: &mut Node, remap: &HashMap<u64, u64>) {
        if node.name == NAME_IDENTIFIER {
            if let Some(original) = node.option(OPTION_SERIAL_NO).and_then(|v| v.parse().ok()) {
                if let Some(&fresh) = remap.get(&original) {
                    let info = &self.info[&fresh];
                    node.set_option(OPTION_SERIAL_NO, &fresh.to_string());
                    node.set_option(OPTION_SCOPE, info.scope_kind.as_str());
                }
            }
        }
        for child in &mut node.children {
            self.remap_references(child, remap);
        }
    }

    // -----------------------------------------------------------------
    // Pass 4: lambda lifting
    // -----------------------------------------------------------------

    fn lift_lambdas(&mut self, root: &mut Node) -> Result<(), CoreError> {
        if root.name != NAME_UNIT {
            return Err(CoreError::resolve("expected unit node as root", root.span));
        }
        let mut lifted: Vec<Node> = Vec::new();
        for child in &mut root.children {
            // A fn that is already the second child of a top-level bind
            // stays put; everything beneath it is still fair game.
            if child.name == NAME_BIND
                && child.children.len() == 2
                && child.children[1].name == NAME_FN
            {
                let value = &mut child.children[1];
                for grandchild in &mut value.children {
                    self.lift_walk(grandchild, &mut lifted);
                }
            } else {
                self.lift_walk(child, &mut lifted);
            }
        }
        root.children.splice(0..0, lifted);
        Ok(())
    }

    fn lift_walk(&mut self, node: &mut Node, lifted: &mut Vec<Node>) {
        for child in &mut node.children {
            self.lift_walk(child, lifted);
        }
        if node.name == NAME_FN {
            let replacement = self.lift_one(node, lifted);
            *node = replacement;
        }
    }

    /// Hoist one `fn` to a fresh top-level binding and return the global
    /// reference that takes its place.
    fn lift_one(&mut self, node: &mut Node, lifted: &mut Vec<Node>) -> Node {
        let unique_id = self.next_id;
        self.next_id += 1;
        let name = format!("tmp-{unique_id}");
        let info = IdentInfo {
            name: name.clone(),
            unique_id,
            def_dyn_level: 0,
            scope_kind: ScopeKind::Global,
            is_assignable: false,
            is_const: true,
            is_protected: true,
            last_reference: None,
        };

        let span = node.span;
        let fn_node = std::mem::take(node);
        let mut bind = Node::with_span(NAME_BIND, span);
        bind.add_child(self.make_ident(&info, unique_id, span));
        bind.add_child(fn_node);
        lifted.push(bind);

        let reference = self.make_ident(&info, unique_id, span);
        self.info.insert(unique_id, info);
        reference
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
