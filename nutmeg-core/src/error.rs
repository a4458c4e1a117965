use std::path::PathBuf;

use thiserror::Error;

use crate::span::Span;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("failed to decode tree JSON: {0}")]
    TreeJson(#[from] serde_json::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown output format: {0}")]
    UnknownFormat(String),
    #[error("rewrite rules file was not found at {0}")]
    MissingRules(PathBuf),
    #[error("invalid rewrite configuration: {0}")]
    Config(String),
    #[error("invalid token rules: {0}")]
    TokenRules(String),
    #[error("{message} at line {}, column {}", span.start_line, span.start_col)]
    Lex { message: String, span: Span },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{message} at line {}, column {}", span.start_line, span.start_col)]
    Rewrite { message: String, span: Span },
    #[error("{message} at line {}, column {}", span.start_line, span.start_col)]
    Resolve { message: String, span: Span },
    #[error("code generation failed: {0}")]
    Codegen(String),
    #[error("syntax errors were reported")]
    SyntaxRejected,
    #[error("bundle error: {0}")]
    Bundle(String),
    #[error("bundle schema is not up to date; run migration explicitly")]
    BundleOutOfDate,
}

impl CoreError {
    pub fn rewrite(message: impl Into<String>, span: Span) -> CoreError {
        CoreError::Rewrite {
            message: message.into(),
            span,
        }
    }

    pub fn resolve(message: impl Into<String>, span: Span) -> CoreError {
        CoreError::Resolve {
            message: message.into(),
            span,
        }
    }

    pub fn lex(message: impl Into<String>, span: Span) -> CoreError {
        CoreError::Lex {
            message: message.into(),
            span,
        }
    }
}
