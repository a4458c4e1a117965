//! Scopes and identifier metadata.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::node::{VALUE_GLOBAL, VALUE_INNER, VALUE_OUTER};

/// The scope class annotated onto identifier nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    /// Defined in an enclosing dynamic scope and captured.
    Outer,
    /// Defined in the referring dynamic scope.
    Inner,
}

impl ScopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Global => VALUE_GLOBAL,
            ScopeKind::Outer => VALUE_OUTER,
            ScopeKind::Inner => VALUE_INNER,
        }
    }
}

/// Everything the resolver knows about one identifier, keyed by its unique
/// serial number.
#[derive(Debug, Clone)]
pub struct IdentInfo {
    pub name: String,
    pub unique_id: u64,
    /// Dynamic nesting level of the defining scope.
    pub def_dyn_level: usize,
    pub scope_kind: ScopeKind,
    pub is_assignable: bool,
    pub is_const: bool,
    pub is_protected: bool,
    /// Preorder position (over identifier nodes) of the final textual
    /// reference; positions stand in for node pointers.
    pub last_reference: Option<usize>,
}

/// One level of the scope stack.
#[derive(Debug)]
pub struct Scope {
    /// Counts only dynamic scopes; the global scope is level 0.
    pub dynamic_level: usize,
    /// Dynamic scopes (`fn`) count toward the dynamic level; lexical
    /// scopes (`let`, `if`, `for`, the global scope) do not.
    pub is_dynamic: bool,
    pub names: HashMap<String, u64>,
    /// Identifiers captured from outer dynamic scopes. Insertion-ordered
    /// so closure parameter order is reproducible.
    pub captured: IndexMap<u64, ()>,
    /// Preorder index of the `fn` node that introduced this scope.
    pub fn_index: Option<usize>,
}

impl Scope {
    pub fn global() -> Scope {
        Scope {
            dynamic_level: 0,
            is_dynamic: false,
            names: HashMap::new(),
            captured: IndexMap::new(),
            fn_index: None,
        }
    }

    pub fn child(&self, is_dynamic: bool, fn_index: Option<usize>) -> Scope {
        Scope {
            dynamic_level: self.dynamic_level + if is_dynamic { 1 } else { 0 },
            is_dynamic,
            names: HashMap::new(),
            captured: IndexMap::new(),
            fn_index,
        }
    }
}
