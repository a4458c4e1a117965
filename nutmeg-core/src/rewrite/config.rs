//! YAML rewrite configuration.
//!
//! The configuration layer deserializes the rule document into plain
//! structs and validates them at load time: every action descriptor must
//! name exactly one action, every pattern must constrain something, and
//! every `onSuccess`/`onFailure` target must name a rule in the same
//! sequence. Validated configurations compile into a [`Rewriter`].
//!
//! [`Rewriter`]: crate::rewrite::Rewriter

use std::path::Path;

use serde::Deserialize;

use crate::error::CoreError;
use crate::rewrite::action::Action;
use crate::rewrite::pattern::Pattern;

#[derive(Debug, Default, Deserialize)]
pub struct RewriteConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub passes: Vec<PassConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PassConfig {
    #[serde(default)]
    pub name: String,
    /// When true the pass runs once instead of iterating to a fixed point.
    #[serde(default, rename = "singlePass")]
    pub single_pass: bool,
    /// Optional passes are dropped under `--skip-optional`.
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub downwards: Vec<RuleConfig>,
    #[serde(default)]
    pub upwards: Vec<RuleConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "match")]
    pub pattern: Pattern,
    pub action: ActionConfig,
    #[serde(default, rename = "onSuccess")]
    pub on_success: Option<String>,
    #[serde(default, rename = "onFailure")]
    pub on_failure: Option<String>,
    #[serde(default, rename = "repeatOnSuccess")]
    pub repeat_on_success: bool,
    #[serde(default, rename = "breakOnSuccess")]
    pub break_on_success: bool,
    #[serde(default, rename = "breakOnFailure")]
    pub break_on_failure: bool,
}

/// One action descriptor. Exactly one field may be set.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionConfig {
    #[serde(default, rename = "replaceValue")]
    pub replace_value: Option<ReplaceValueConfig>,
    #[serde(default, rename = "replaceName")]
    pub replace_name: Option<ReplaceNameConfig>,
    #[serde(default, rename = "replaceByChild")]
    pub replace_by_child: Option<usize>,
    #[serde(default, rename = "inlineChild")]
    pub inline_child: bool,
    #[serde(default, rename = "rotateOption")]
    pub rotate_option: Option<RotateOptionConfig>,
    #[serde(default, rename = "removeOption")]
    pub remove_option: Option<RemoveOptionConfig>,
    #[serde(default, rename = "renameOption")]
    pub rename_option: Option<RenameOptionConfig>,
    #[serde(default, rename = "clearOptions")]
    pub clear_options: bool,
    #[serde(default)]
    pub sequence: Vec<ActionConfig>,
    #[serde(default, rename = "childAction")]
    pub child_action: Option<Box<ActionConfig>>,
    #[serde(default, rename = "removeChild")]
    pub remove_child: bool,
    #[serde(default, rename = "removeChildren")]
    pub remove_children: bool,
    #[serde(default, rename = "mergeChildWithNext")]
    pub merge_child_with_next: Option<bool>,
    #[serde(default, rename = "newNodeChild")]
    pub new_node_child: Option<NewNodeChildConfig>,
    #[serde(default, rename = "permuteChildren")]
    pub permute_children: Vec<usize>,
    #[serde(default, rename = "continue")]
    pub continue_: bool,
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(default)]
    pub assert: Option<Pattern>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceValueConfig {
    pub key: Option<String>,
    #[serde(default)]
    pub with: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceNameConfig {
    #[serde(default)]
    pub with: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RotateOptionConfig {
    pub key: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub initial: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveOptionConfig {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameOptionConfig {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct NewNodeChildConfig {
    pub name: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub length: Option<i64>,
}

pub fn load_rewrite_config(path: &Path) -> Result<RewriteConfig, CoreError> {
    let text =
        std::fs::read_to_string(path).map_err(|_| CoreError::MissingRules(path.to_path_buf()))?;
    load_rewrite_config_from_str(&text)
}

pub fn load_rewrite_config_from_str(text: &str) -> Result<RewriteConfig, CoreError> {
    Ok(serde_yaml::from_str(text)?)
}

impl ActionConfig {
    fn count_set(&self) -> usize {
        let flags = [
            self.replace_value.is_some(),
            self.replace_name.is_some(),
            self.replace_by_child.is_some(),
            self.inline_child,
            self.rotate_option.is_some(),
            self.remove_option.is_some(),
            self.rename_option.is_some(),
            self.clear_options,
            !self.sequence.is_empty(),
            self.child_action.is_some(),
            self.remove_child,
            self.remove_children,
            self.merge_child_with_next.is_some(),
            self.new_node_child.is_some(),
            !self.permute_children.is_empty(),
            self.continue_,
            self.fail.is_some(),
            self.assert.is_some(),
        ];
        flags.into_iter().filter(|set| *set).count()
    }

    /// Convert a validated descriptor into the executable action.
    pub fn to_action(&self) -> Result<Action, CoreError> {
        match self.count_set() {
            0 => {
                return Err(CoreError::Config(
                    "no action specified in action descriptor".to_string(),
                ));
            }
            1 => {}
            _ => {
                return Err(CoreError::Config(
                    "multiple actions specified in action descriptor; only one allowed"
                        .to_string(),
                ));
            }
        }

        if let Some(config) = &self.replace_value {
            let key = config.key.clone().ok_or_else(|| {
                CoreError::Config("invalid replaceValue: 'key' must be set".to_string())
            })?;
            return match (&config.with, &config.src, &config.from) {
                (Some(with), _, _) => Ok(Action::ReplaceValue {
                    key,
                    with: with.clone(),
                }),
                (None, Some(src), Some(from)) => Ok(Action::ReplaceValueFrom {
                    key,
                    src: src.clone(),
                    from: from.clone(),
                }),
                _ => Err(CoreError::Config(
                    "invalid replaceValue: either 'with' or both 'src' and 'from' must be set"
                        .to_string(),
                )),
            };
        }
        if let Some(config) = &self.replace_name {
            return match (&config.with, &config.src, &config.from) {
                (Some(with), _, _) => Ok(Action::ReplaceNameWith { with: with.clone() }),
                (None, Some(src), Some(from)) => Ok(Action::ReplaceNameFrom {
                    src: src.clone(),
                    from: from.clone(),
                }),
                _ => Err(CoreError::Config(
                    "invalid replaceName: either 'with' or both 'src' and 'from' must be set"
                        .to_string(),
                )),
            };
        }
        if let Some(index) = self.replace_by_child {
            return Ok(Action::ReplaceByChild { index });
        }
        if self.inline_child {
            return Ok(Action::InlineChild);
        }
        if let Some(config) = &self.rotate_option {
            if config.key.is_empty() || config.values.len() < 2 {
                return Err(CoreError::Config(
                    "invalid rotateOption: key must be set and at least two values are required"
                        .to_string(),
                ));
            }
            let initial = config
                .initial
                .clone()
                .unwrap_or_else(|| config.values[0].clone());
            return Ok(Action::RotateOption {
                key: config.key.clone(),
                values: config.values.clone(),
                initial,
            });
        }
        if let Some(config) = &self.remove_option {
            if config.key.is_empty() {
                return Err(CoreError::Config(
                    "invalid removeOption: key must be set".to_string(),
                ));
            }
            return Ok(Action::RemoveOption {
                key: config.key.clone(),
            });
        }
        if let Some(config) = &self.rename_option {
            return Ok(Action::RenameOption {
                from: config.from.clone(),
                to: config.to.clone(),
            });
        }
        if self.clear_options {
            return Ok(Action::ClearOptions);
        }
        if !self.sequence.is_empty() {
            let actions = self
                .sequence
                .iter()
                .enumerate()
                .map(|(index, sub)| {
                    sub.to_action().map_err(|e| {
                        CoreError::Config(format!(
                            "error in nested sequence action, position {index}: {e}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Action::Sequence { actions });
        }
        if let Some(config) = &self.child_action {
            let action = config
                .to_action()
                .map_err(|e| CoreError::Config(format!("error in nested child action: {e}")))?;
            return Ok(Action::ChildAction {
                action: Box::new(action),
            });
        }
        if self.remove_child {
            return Ok(Action::RemoveChild);
        }
        if self.remove_children {
            return Ok(Action::RemoveChildren);
        }
        if let Some(next_takes_priority) = self.merge_child_with_next {
            return Ok(Action::MergeChildWithNext { next_takes_priority });
        }
        if let Some(config) = &self.new_node_child {
            return Ok(Action::NewNodeChild {
                name: config.name.clone(),
                key: config.key.clone(),
                value: config.value.clone(),
                offset: config.offset,
                length: config.length,
            });
        }
        if !self.permute_children.is_empty() {
            return Ok(Action::PermuteChildren {
                cycle: self.permute_children.clone(),
            });
        }
        if self.continue_ {
            return Ok(Action::Continue);
        }
        if let Some(message) = &self.fail {
            return Ok(Action::Fail {
                message: message.clone(),
            });
        }
        if let Some(pattern) = &self.assert {
            let mut pattern = pattern.clone();
            pattern.compile()?;
            return Ok(Action::Assert {
                pattern: Box::new(pattern),
            });
        }
        Err(CoreError::Config(
            "no valid action found in action descriptor".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(yaml: &str) -> Result<Action, CoreError> {
        let config: ActionConfig = serde_yaml::from_str(yaml).expect("parse action");
        config.to_action()
    }

    #[test]
    fn rejects_empty_action_descriptors() {
        let err = action("{}").unwrap_err();
        assert!(err.to_string().contains("no action specified"));
    }

    #[test]
    fn rejects_ambiguous_action_descriptors() {
        let err = action("inlineChild: true\nremoveChild: true").unwrap_err();
        assert!(err.to_string().contains("only one allowed"));
    }

    #[test]
    fn replace_value_requires_with_or_src_and_from() {
        assert!(action("replaceValue:\n  key: scope\n  with: global").is_ok());
        assert!(action("replaceValue:\n  key: scope\n  src: child\n  from: value").is_ok());
        let err = action("replaceValue:\n  key: scope\n  src: child").unwrap_err();
        assert!(err.to_string().contains("replaceValue"));
    }

    #[test]
    fn rotate_option_requires_two_values() {
        let err = action("rotateOption:\n  key: sign\n  values: [\"+\"]").unwrap_err();
        assert!(err.to_string().contains("two values"));
    }

    #[test]
    fn sequences_convert_recursively() {
        let converted = action(
            "sequence:\n  - replaceName:\n      with: bind\n  - inlineChild: true",
        )
        .expect("convert");
        match converted {
            Action::Sequence { actions } => assert_eq!(actions.len(), 2),
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn nested_sequence_errors_carry_their_position() {
        let err = action("sequence:\n  - replaceName:\n      with: bind\n  - {}").unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }
}
