//! Instruction objects in the bundle's wire layout.
//!
//! Each instruction is adjacently tagged: a `type` field plus whichever of
//! `index`, `value`, and `name` that instruction kind uses. Unused fields
//! are omitted from the serialized form.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(rename = "type")]
    pub kind: String,

    /// Stack offsets and immediate integers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,

    /// String immediates, global names, and label texts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Call targets and secondary labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A compiled function: its frame metadata and flat instruction list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionObject {
    pub nlocals: usize,
    pub nparams: usize,
    pub instructions: Vec<Instruction>,
}

fn plain(kind: &str) -> Instruction {
    Instruction {
        kind: kind.to_string(),
        index: None,
        value: None,
        name: None,
    }
}

fn indexed(kind: &str, index: i64) -> Instruction {
    Instruction {
        index: Some(index),
        ..plain(kind)
    }
}

fn valued(kind: &str, value: &str) -> Instruction {
    Instruction {
        value: Some(value.to_string()),
        ..plain(kind)
    }
}

impl Instruction {
    pub fn push_int(value: i64) -> Instruction {
        indexed("push.int", value)
    }

    pub fn push_bool(value: &str) -> Instruction {
        valued("push.bool", value)
    }

    pub fn push_string(value: &str) -> Instruction {
        valued("push.string", value)
    }

    pub fn push_local(offset: i64) -> Instruction {
        indexed("push.local", offset)
    }

    pub fn pop_local(offset: i64) -> Instruction {
        indexed("pop.local", offset)
    }

    pub fn push_global(name: &str) -> Instruction {
        valued("push.global", name)
    }

    pub fn stack_length(offset: i64) -> Instruction {
        indexed("stack.length", offset)
    }

    pub fn syscall_counted(name: &str, nargs: i64) -> Instruction {
        Instruction {
            name: Some(name.to_string()),
            ..indexed("syscall.counted", nargs)
        }
    }

    pub fn call_global_counted(name: &str, offset: i64) -> Instruction {
        Instruction {
            name: Some(name.to_string()),
            ..indexed("call.global.counted", offset)
        }
    }

    pub fn ret() -> Instruction {
        plain("return")
    }

    pub fn erase() -> Instruction {
        plain("erase")
    }

    pub fn check_bool(offset: i64) -> Instruction {
        indexed("check.bool", offset)
    }

    pub fn label(text: &str) -> Instruction {
        valued("label", text)
    }

    pub fn goto(text: &str) -> Instruction {
        valued("goto", text)
    }

    pub fn if_not(text: &str) -> Instruction {
        valued("if.not", text)
    }

    pub fn if_so(text: &str) -> Instruction {
        valued("if.so", text)
    }

    pub fn if_not_return() -> Instruction {
        plain("if.not.return")
    }

    pub fn if_so_return() -> Instruction {
        plain("if.so.return")
    }

    pub fn if_then_else(then_label: &str, else_label: &str) -> Instruction {
        Instruction {
            name: Some(then_label.to_string()),
            ..valued("if.then.else", else_label)
        }
    }

    // Reserved by the virtual machine; never emitted by the generator.

    pub fn done() -> Instruction {
        plain("done")
    }

    pub fn in_progress() -> Instruction {
        plain("in.progress")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_only_the_relevant_fields() {
        let json = serde_json::to_string(&Instruction::push_int(42)).expect("serialize");
        assert_eq!(json, r#"{"type":"push.int","index":42}"#);

        let json = serde_json::to_string(&Instruction::ret()).expect("serialize");
        assert_eq!(json, r#"{"type":"return"}"#);

        let json =
            serde_json::to_string(&Instruction::syscall_counted("+", 2)).expect("serialize");
        assert!(json.contains(r#""name":"+""#));
        assert!(json.contains(r#""index":2"#));
    }

    #[test]
    fn function_objects_round_trip() {
        let function = FunctionObject {
            nlocals: 1,
            nparams: 1,
            instructions: vec![
                Instruction::pop_local(0),
                Instruction::push_local(0),
                Instruction::push_int(1),
                Instruction::syscall_counted("+", 2),
                Instruction::ret(),
            ],
        };
        let json = serde_json::to_string(&function).expect("serialize");
        let back: FunctionObject = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, function);
    }
}
