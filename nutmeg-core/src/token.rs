//! The canonical token type used on the tokenizer/parser boundary.
//!
//! Tokens travel between stages as one JSON object per line. Only the
//! fields relevant to a token's class are populated; everything else is
//! omitted from the serialized form.

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Token class tags, serialized as the historical single-character codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// Numeric literals with radix support.
    #[serde(rename = "n")]
    Number,
    /// String literals with quotes and escapes.
    #[serde(rename = "s")]
    String,
    /// Multi-line string literals.
    #[serde(rename = "m")]
    MultiLineString,
    /// Interpolated string literals, e.g. `` `Hello, \(name)!` ``.
    #[serde(rename = "i")]
    InterpolatedString,
    /// Embedded expression fragments inside interpolated strings.
    #[serde(rename = "e")]
    Expression,
    /// Form start tokens (`def`, `if`, `let`, ...).
    #[serde(rename = "S")]
    Start,
    /// Form end tokens (`end`, `endif`, ...).
    #[serde(rename = "E")]
    End,
    /// Bridge tokens (`=>>`, `then`, `else`, ...).
    #[serde(rename = "B")]
    Bridge,
    /// Prefix statement tokens (`return`, `var`, `const`, ...).
    #[serde(rename = "P")]
    Prefix,
    /// Variable identifiers.
    #[serde(rename = "V")]
    Variable,
    /// Infix/prefix/postfix operators.
    #[serde(rename = "O")]
    Operator,
    /// Opening brackets, braces, and parentheses.
    #[serde(rename = "[")]
    OpenDelimiter,
    /// Closing brackets, braces, and parentheses.
    #[serde(rename = "]")]
    CloseDelimiter,
    /// Punctuation marks (commas, semicolons).
    #[serde(rename = "M")]
    Mark,
    /// Tokens the rule table does not classify.
    #[serde(rename = "U")]
    Unclassified,
    /// Invalid constructs, carrying a reason.
    #[serde(rename = "X")]
    Exception,
}

/// How many expressions a form part expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Arity {
    Zero,
    One,
    Many,
}

impl From<u8> for Arity {
    fn from(value: u8) -> Arity {
        match value {
            0 => Arity::Zero,
            1 => Arity::One,
            _ => Arity::Many,
        }
    }
}

impl From<Arity> for u8 {
    fn from(value: Arity) -> u8 {
        match value {
            Arity::Zero => 0,
            Arity::One => 1,
            Arity::Many => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub span: Span,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// The classification alias for wildcard bridge tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    // String token fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtokens: Option<Vec<Token>>,

    // Numeric token fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mantissa: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exponent: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balanced: Option<bool>,

    // Start, bridge, and delimiter fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expecting: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#in: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arity: Option<Arity>,

    /// `[prefix, infix, postfix]` precedence for operator tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedence: Option<[u32; 3]>,

    // Open-delimiter fields.
    #[serde(default, rename = "infix", skip_serializing_if = "Option::is_none")]
    pub infix_precedence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<bool>,

    /// Explanation carried by exception tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    // Newline tracking.
    #[serde(default, rename = "ln_before", skip_serializing_if = "Option::is_none")]
    pub ln_before: Option<bool>,
    #[serde(default, rename = "ln_after", skip_serializing_if = "Option::is_none")]
    pub ln_after: Option<bool>,
}

impl Token {
    pub fn new(text: impl Into<String>, token_type: TokenType, span: Span) -> Token {
        Token {
            text: text.into(),
            span,
            token_type,
            alias: None,
            quote: None,
            value: None,
            subtokens: None,
            radix: None,
            base: None,
            mantissa: None,
            fraction: None,
            exponent: None,
            balanced: None,
            expecting: None,
            r#in: None,
            closed_by: None,
            arity: None,
            precedence: None,
            infix_precedence: None,
            prefix: None,
            reason: None,
            ln_before: None,
            ln_after: None,
        }
    }

    pub fn string(text: impl Into<String>, value: impl Into<String>, span: Span) -> Token {
        let mut token = Token::new(text, TokenType::String, span);
        token.value = Some(value.into());
        token
    }

    pub fn number(
        text: impl Into<String>,
        radix: &str,
        base: u32,
        mantissa: &str,
        fraction: &str,
        exponent: i32,
        span: Span,
    ) -> Token {
        let mut token = Token::new(text, TokenType::Number, span);
        token.radix = Some(radix.to_string());
        token.base = Some(base);
        token.mantissa = Some(mantissa.to_string());
        if !fraction.is_empty() {
            token.fraction = Some(fraction.to_string());
        }
        if exponent != 0 {
            token.exponent = Some(exponent);
        }
        token
    }

    pub fn start(
        text: impl Into<String>,
        expecting: Vec<String>,
        closed_by: Vec<String>,
        arity: Arity,
        span: Span,
    ) -> Token {
        let mut token = Token::new(text, TokenType::Start, span);
        token.expecting = Some(expecting);
        token.closed_by = Some(closed_by);
        token.arity = Some(arity);
        token
    }

    pub fn bridge(
        text: impl Into<String>,
        expecting: Vec<String>,
        r#in: Vec<String>,
        arity: Arity,
        span: Span,
    ) -> Token {
        let mut token = Token::new(text, TokenType::Bridge, span);
        token.expecting = Some(expecting);
        token.r#in = Some(r#in);
        token.arity = Some(arity);
        token
    }

    pub fn operator(text: impl Into<String>, precedence: [u32; 3], span: Span) -> Token {
        let mut token = Token::new(text, TokenType::Operator, span);
        if precedence.iter().any(|p| *p > 0) {
            token.precedence = Some(precedence);
        }
        token
    }

    pub fn open_delimiter(
        text: impl Into<String>,
        closed_by: Vec<String>,
        infix: u32,
        prefix: bool,
        span: Span,
    ) -> Token {
        let mut token = Token::new(text, TokenType::OpenDelimiter, span);
        token.closed_by = Some(closed_by);
        token.infix_precedence = Some(infix);
        token.prefix = Some(prefix);
        token
    }

    pub fn exception(text: impl Into<String>, reason: impl Into<String>, span: Span) -> Token {
        let mut token = Token::new(text, TokenType::Exception, span);
        token.reason = Some(reason.into());
        token
    }

    pub fn set_quote(&mut self, quote: char) {
        let name = match quote {
            '\'' => "single".to_string(),
            '"' => "double".to_string(),
            '`' => "backtick".to_string(),
            other => other.to_string(),
        };
        self.quote = Some(name);
    }

    pub fn infix_prec(&self) -> u32 {
        if let Some(infix) = self.infix_precedence {
            return infix;
        }
        self.precedence.map(|p| p[1]).unwrap_or(0)
    }

    pub fn prefix_prec(&self) -> u32 {
        self.precedence.map(|p| p[0]).unwrap_or(0)
    }

    pub fn postfix_prec(&self) -> u32 {
        self.precedence.map(|p| p[2]).unwrap_or(0)
    }

    pub fn starts_on_new_line(&self) -> bool {
        self.ln_before == Some(true)
    }

    /// Bracket text rendered as a delimiter kind option value.
    pub fn to_kind(&self) -> &str {
        match self.text.as_str() {
            "[" | "]" => "brackets",
            "{" | "}" => "braces",
            "(" | ")" => "parentheses",
            _ => self.text.as_str(),
        }
    }

    pub fn to_separator(&self) -> &str {
        match self.text.as_str() {
            "," => "comma",
            ";" => "semicolon",
            _ => "unknown",
        }
    }

    /// `expecting` joined for error messages, excluding one alternative.
    pub fn expecting_message(&self, excluding: &str) -> String {
        match &self.expecting {
            Some(expecting) => expecting
                .iter()
                .filter(|x| x.as_str() != excluding)
                .cloned()
                .collect::<Vec<_>>()
                .join("/"),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_type_tags_as_single_characters() {
        let token = Token::new("x", TokenType::Variable, Span::new(1, 1, 1, 2));
        let json = serde_json::to_string(&token).expect("serialize");
        assert!(json.contains("\"type\":\"V\""));
        let back: Token = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, token);
    }

    #[test]
    fn omits_unused_fields() {
        let token = Token::new(";", TokenType::Mark, Span::default());
        let json = serde_json::to_string(&token).expect("serialize");
        assert!(!json.contains("mantissa"));
        assert!(!json.contains("expecting"));
    }

    #[test]
    fn number_constructor_drops_empty_fraction_and_zero_exponent() {
        let token = Token::number("42", "", 10, "42", "", 0, Span::default());
        assert_eq!(token.fraction, None);
        assert_eq!(token.exponent, None);
    }

    #[test]
    fn precedence_helpers_cover_operator_and_delimiter_tokens() {
        let op = Token::operator("+", [1024, 3024, 0], Span::default());
        assert_eq!(op.prefix_prec(), 1024);
        assert_eq!(op.infix_prec(), 3024);
        assert_eq!(op.postfix_prec(), 0);

        let open = Token::open_delimiter("(", vec![")".into()], 3010, true, Span::default());
        assert_eq!(open.infix_prec(), 3010);
        assert_eq!(open.to_kind(), "parentheses");
    }

    #[test]
    fn expecting_message_excludes_the_given_text() {
        let token = Token::start(
            "if",
            vec!["then".into(), "end".into()],
            vec!["end".into()],
            Arity::One,
            Span::default(),
        );
        assert_eq!(token.expecting_message("end"), "then");
    }
}
