//! Tokenization of Nutmeg source text.
//!
//! The scanner classifies words and symbol runs through a rule table: form
//! start/end tokens, bridge tokens, prefix tokens, operators, delimiters,
//! punctuation marks, and wildcards. The table ships with built-in defaults
//! and can be overridden from a YAML rules file; construction fails on
//! conflicting token definitions.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::error::CoreError;
use crate::span::{LineCol, Span};
use crate::token::{Arity, Token, TokenType};

pub const LOOSE: u32 = 9999;
pub const TIGHT: u32 = 100;

/// Infix precedence used by `(` and `[` in call position: looser than `.`
/// so that `x.f(y)` applies the dot chain, tighter than every other infix
/// operator so that `1 + f(x)` applies `f` first.
const DELIMITER_INFIX: u32 = 3010;

// ---------------------------------------------------------------------
// YAML rules file
// ---------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub bracket: Vec<BracketRule>,
    #[serde(default)]
    pub prefix: Vec<PrefixRule>,
    #[serde(default)]
    pub start: Vec<StartRule>,
    #[serde(default)]
    pub bridge: Vec<BridgeRule>,
    #[serde(default)]
    pub wildcard: Vec<WildcardRule>,
    #[serde(default)]
    pub operator: Vec<OperatorRule>,
    #[serde(default)]
    pub mark: Vec<MarkRule>,
}

#[derive(Debug, Deserialize)]
pub struct BracketRule {
    pub text: String,
    pub closed_by: Vec<String>,
    #[serde(default)]
    pub infix: u32,
    #[serde(default)]
    pub prefix: bool,
}

#[derive(Debug, Deserialize)]
pub struct PrefixRule {
    pub text: String,
    pub precedence: u32,
}

#[derive(Debug, Deserialize)]
pub struct StartRule {
    pub text: String,
    pub closed_by: Vec<String>,
    #[serde(default)]
    pub expecting: Vec<String>,
    #[serde(default)]
    pub single: bool,
}

#[derive(Debug, Deserialize)]
pub struct BridgeRule {
    pub text: String,
    #[serde(default)]
    pub expecting: Vec<String>,
    #[serde(default)]
    pub r#in: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct WildcardRule {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct OperatorRule {
    pub text: String,
    pub precedence: [u32; 3],
}

#[derive(Debug, Deserialize)]
pub struct MarkRule {
    pub text: String,
}

pub fn load_rules_file(path: &std::path::Path) -> Result<RulesFile, CoreError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

// ---------------------------------------------------------------------
// Compiled rule table
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StartData {
    pub expecting: Vec<String>,
    pub closed_by: Vec<String>,
    pub arity: Arity,
}

#[derive(Debug, Clone)]
pub struct BridgeData {
    pub expecting: Vec<String>,
    pub r#in: Vec<String>,
    pub arity: Arity,
}

#[derive(Debug, Clone)]
pub struct PrefixData {
    pub precedence: u32,
    pub arity: Arity,
}

#[derive(Debug, Clone)]
pub struct DelimiterData {
    pub closed_by: Vec<String>,
    pub infix: u32,
    pub prefix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Wildcard,
    Start,
    End,
    Bridge,
    Prefix,
    Operator,
    OpenDelimiter,
    CloseDelimiter,
    Mark,
}

#[derive(Debug, Clone)]
pub struct TokenizerRules {
    start: HashMap<String, StartData>,
    bridge: HashMap<String, BridgeData>,
    prefix: HashMap<String, PrefixData>,
    delimiters: HashMap<String, DelimiterData>,
    wildcards: HashSet<String>,
    operators: HashMap<String, [u32; 3]>,
    marks: HashSet<String>,
    lookup: HashMap<String, RuleKind>,
}

impl TokenizerRules {
    /// The built-in rule table.
    pub fn default_rules() -> TokenizerRules {
        let mut rules = TokenizerRules {
            start: default_start_tokens(),
            bridge: default_bridge_tokens(),
            prefix: default_prefix_tokens(),
            delimiters: default_delimiters(),
            wildcards: [":".to_string()].into_iter().collect(),
            operators: default_operator_precedences(),
            marks: [",".to_string(), ";".to_string()].into_iter().collect(),
            lookup: HashMap::new(),
        };
        rules
            .build_lookup()
            .expect("built-in token rules are conflict-free");
        rules
    }

    /// Overlay a YAML rules file onto the defaults. Each non-empty section
    /// replaces the corresponding default table wholesale, except operators
    /// which are merged.
    pub fn with_overrides(file: &RulesFile) -> Result<TokenizerRules, CoreError> {
        let mut rules = TokenizerRules::default_rules();
        if !file.bracket.is_empty() {
            rules.delimiters = file
                .bracket
                .iter()
                .map(|r| {
                    (
                        r.text.clone(),
                        DelimiterData {
                            closed_by: r.closed_by.clone(),
                            infix: r.infix,
                            prefix: r.prefix,
                        },
                    )
                })
                .collect();
        }
        if !file.prefix.is_empty() {
            rules.prefix = file
                .prefix
                .iter()
                .map(|r| {
                    (
                        r.text.clone(),
                        PrefixData {
                            precedence: r.precedence,
                            arity: Arity::One,
                        },
                    )
                })
                .collect();
        }
        if !file.mark.is_empty() {
            rules.marks = file.mark.iter().map(|r| r.text.clone()).collect();
        }
        if !file.start.is_empty() {
            rules.start = file
                .start
                .iter()
                .map(|r| {
                    (
                        r.text.clone(),
                        StartData {
                            expecting: r.expecting.clone(),
                            closed_by: r.closed_by.clone(),
                            arity: if r.single { Arity::One } else { Arity::Many },
                        },
                    )
                })
                .collect();
        }
        if !file.bridge.is_empty() {
            rules.bridge = file
                .bridge
                .iter()
                .map(|r| {
                    (
                        r.text.clone(),
                        BridgeData {
                            expecting: r.expecting.clone(),
                            r#in: r.r#in.clone(),
                            arity: Arity::Many,
                        },
                    )
                })
                .collect();
        }
        if !file.wildcard.is_empty() {
            rules.wildcards = file.wildcard.iter().map(|r| r.text.clone()).collect();
        }
        for rule in &file.operator {
            rules.operators.insert(rule.text.clone(), rule.precedence);
        }
        rules.build_lookup()?;
        Ok(rules)
    }

    /// Precompute the token classification map, rejecting tokens defined by
    /// more than one rule family. Close-delimiter and end tokens are derived
    /// and may legitimately be named by several rules.
    fn build_lookup(&mut self) -> Result<(), CoreError> {
        self.lookup.clear();
        let mut sources: HashMap<String, &'static str> = HashMap::new();
        let mut add = |lookup: &mut HashMap<String, RuleKind>,
                       text: &str,
                       kind: RuleKind,
                       family: &'static str|
         -> Result<(), CoreError> {
            if let Some(existing) = sources.get(text) {
                return Err(CoreError::TokenRules(format!(
                    "token '{text}' is defined in both {existing} and {family} rules"
                )));
            }
            sources.insert(text.to_string(), family);
            lookup.insert(text.to_string(), kind);
            Ok(())
        };

        for text in &self.wildcards {
            add(&mut self.lookup, text, RuleKind::Wildcard, "wildcard")?;
        }
        for text in self.start.keys() {
            add(&mut self.lookup, text, RuleKind::Start, "start")?;
        }
        for text in self.bridge.keys() {
            add(&mut self.lookup, text, RuleKind::Bridge, "bridge")?;
        }
        for text in self.prefix.keys() {
            add(&mut self.lookup, text, RuleKind::Prefix, "prefix")?;
        }
        for text in &self.marks {
            add(&mut self.lookup, text, RuleKind::Mark, "mark")?;
        }
        for text in self.operators.keys() {
            add(&mut self.lookup, text, RuleKind::Operator, "operator")?;
        }
        for text in self.delimiters.keys() {
            add(&mut self.lookup, text, RuleKind::OpenDelimiter, "bracket")?;
        }
        for data in self.delimiters.values() {
            for closer in &data.closed_by {
                self.lookup
                    .entry(closer.clone())
                    .or_insert(RuleKind::CloseDelimiter);
            }
        }
        for data in self.start.values() {
            for end in &data.closed_by {
                self.lookup.entry(end.clone()).or_insert(RuleKind::End);
            }
        }
        Ok(())
    }
}

fn default_start_tokens() -> HashMap<String, StartData> {
    let start = |expecting: &[&str], closed_by: &[&str], arity: Arity| StartData {
        expecting: expecting.iter().map(|s| s.to_string()).collect(),
        closed_by: closed_by.iter().map(|s| s.to_string()).collect(),
        arity,
    };
    [
        ("def", start(&["=>>"], &["end", "enddef"], Arity::One)),
        (
            "let",
            start(&["end", "endlet", "do"], &["end", "endlet"], Arity::Many),
        ),
        (
            "switch",
            start(&["case", "else"], &["end", "endswitch"], Arity::One),
        ),
        ("if", start(&["then"], &["end", "endif"], Arity::One)),
        ("ifnot", start(&["then"], &["end", "endifnot"], Arity::One)),
        ("fn", start(&["=>>"], &["end", "endfn"], Arity::One)),
        ("class", start(&[], &["end", "endclass"], Arity::One)),
        ("for", start(&["do"], &["end", "endfor"], Arity::One)),
        (
            "try",
            start(&["catch", "else"], &["end", "endtry"], Arity::Many),
        ),
        (
            "transaction",
            start(&["catch", "else"], &["end", "endtransaction"], Arity::Many),
        ),
    ]
    .into_iter()
    .map(|(text, data)| (text.to_string(), data))
    .collect()
}

fn default_bridge_tokens() -> HashMap<String, BridgeData> {
    let bridge = |expecting: &[&str], r#in: &[&str], arity: Arity| BridgeData {
        expecting: expecting.iter().map(|s| s.to_string()).collect(),
        r#in: r#in.iter().map(|s| s.to_string()).collect(),
        arity,
    };
    [
        ("case", bridge(&["then"], &["switch"], Arity::One)),
        (
            "=>>",
            bridge(&["end", "enddef", "endfn"], &["def", "fn"], Arity::Many),
        ),
        (
            "do",
            bridge(&["end", "endfor", "endlet"], &["for", "let"], Arity::Many),
        ),
        (
            "then",
            bridge(
                &[
                    "case",
                    "elseif",
                    "elseifnot",
                    "else",
                    "end",
                    "endif",
                    "endifnot",
                    "endswitch",
                    "endcase",
                ],
                &["if", "ifnot", "switch"],
                Arity::Many,
            ),
        ),
        ("elseif", bridge(&["then"], &["if", "ifnot"], Arity::One)),
        (
            "elseifnot",
            bridge(&["then"], &["if", "ifnot"], Arity::Many),
        ),
        (
            "else",
            bridge(
                &["end", "endif", "endifnot", "endswitch", "endcase"],
                &["if", "ifnot", "switch"],
                Arity::Many,
            ),
        ),
        (
            "endcase",
            bridge(&["end", "endswitch"], &["switch"], Arity::Zero),
        ),
        ("catch", bridge(&[], &["try"], Arity::One)),
    ]
    .into_iter()
    .map(|(text, data)| (text.to_string(), data))
    .collect()
}

fn default_prefix_tokens() -> HashMap<String, PrefixData> {
    [
        ("return", LOOSE),
        ("yield", LOOSE),
        ("const", TIGHT),
        ("var", TIGHT),
        ("val", TIGHT),
    ]
    .into_iter()
    .map(|(text, precedence)| {
        (
            text.to_string(),
            PrefixData {
                precedence,
                arity: Arity::One,
            },
        )
    })
    .collect()
}

fn default_delimiters() -> HashMap<String, DelimiterData> {
    [
        ("(", (")", DELIMITER_INFIX, true)),
        ("[", ("]", DELIMITER_INFIX, true)),
        ("{", ("}", 0, true)),
    ]
    .into_iter()
    .map(|(open, (close, infix, prefix))| {
        (
            open.to_string(),
            DelimiterData {
                closed_by: vec![close.to_string()],
                infix,
                prefix,
            },
        )
    })
    .collect()
}

fn default_operator_precedences() -> HashMap<String, [u32; 3]> {
    let mut operators = HashMap::new();
    for text in [
        ".", "*", "/", "+", "-", "<", ">", "<=", ">=", "==", "..<", "..=", ":=", "<-", "<--",
    ] {
        operators.insert(text.to_string(), calculate_operator_precedence(text));
    }
    operators.insert("in".to_string(), [0, 3000, 0]);
    operators
}

fn base_operator_precedence(c: char) -> Option<u32> {
    match c {
        '.' => Some(0),
        '*' | '/' | '%' => Some(16),
        '+' | '-' => Some(24),
        '<' | '>' => Some(32),
        '=' | '!' => Some(40),
        '&' => Some(48),
        '^' => Some(52),
        '|' => Some(56),
        ':' => Some(64),
        '?' => Some(80),
        _ => None,
    }
}

/// Precedence bands: tight 0-999, prefix 1000-1999, infix 3000-3999. A
/// doubled first character binds one step tighter. Only `-` and `+` are
/// prefix-capable; no operator is postfix-capable.
pub fn calculate_operator_precedence(operator: &str) -> [u32; 3] {
    let mut chars = operator.chars();
    let Some(first) = chars.next() else {
        return [0, 0, 0];
    };
    let mut base = match base_operator_precedence(first) {
        Some(offset) => offset + 1000,
        None => 1999,
    };
    if chars.next() == Some(first) {
        base -= 1;
    }
    if first == '-' || first == '+' {
        [base, base + 2000, 0]
    } else {
        [0, base + 2000, 0]
    }
}

// ---------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------

/// A form frame the scanner tracks so that wildcard tokens can stand in for
/// the bridge the enclosing form expects.
struct FormFrame {
    closed_by: Vec<String>,
    expecting: Vec<String>,
}

pub struct Tokenizer {
    chars: Vec<char>,
    index: usize,
    line: u32,
    col: u32,
    rules: TokenizerRules,
    forms: Vec<FormFrame>,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, CoreError> {
    Tokenizer::new(input).tokenize()
}

impl Tokenizer {
    pub fn new(input: &str) -> Tokenizer {
        Tokenizer::with_rules(input, TokenizerRules::default_rules())
    }

    pub fn with_rules(input: &str, rules: TokenizerRules) -> Tokenizer {
        Tokenizer {
            chars: input.chars().collect(),
            index: 0,
            line: 1,
            col: 1,
            rules,
            forms: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            let newline_before = self.skip_trivia();
            let Some(c) = self.peek() else {
                break;
            };
            let mut token = if c.is_ascii_digit() {
                self.scan_number()
            } else if c == '\'' || c == '"' || c == '`' {
                self.scan_string()?
            } else if is_word_start(c) {
                let start = self.here();
                let word = self.scan_while(is_word_continue);
                self.classify(word, start)
            } else if is_symbol_char(c) {
                self.scan_symbol_run()
            } else {
                // Delimiters and punctuation marks are single characters
                // outside the symbol set; anything else is unclassified.
                let start = self.here();
                self.advance();
                let text = c.to_string();
                if self.rules.lookup.contains_key(text.as_str()) {
                    self.classify(text, start)
                } else {
                    Token::new(text, TokenType::Unclassified, start.span_to(self.here()))
                }
            };
            if newline_before {
                token.ln_before = Some(true);
                if let Some(previous) = tokens.last_mut() {
                    previous.ln_after = Some(true);
                }
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn here(&self) -> LineCol {
        LineCol::new(self.line, self.col)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    /// Skip whitespace and `#` comments; report whether a newline was seen.
    fn skip_trivia(&mut self) -> bool {
        let mut newline = false;
        while let Some(c) = self.peek() {
            if c == '\n' {
                newline = true;
                self.advance();
            } else if c.is_whitespace() {
                self.advance();
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
        newline
    }

    fn scan_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !keep(c) {
                break;
            }
            text.push(c);
            self.advance();
        }
        text
    }

    fn classify(&mut self, text: String, start: LineCol) -> Token {
        let span = start.span_to(self.here());
        match self.rules.lookup.get(text.as_str()).copied() {
            Some(RuleKind::Start) => {
                let data = self.rules.start[&text].clone();
                self.forms.push(FormFrame {
                    closed_by: data.closed_by.clone(),
                    expecting: data.expecting.clone(),
                });
                Token::start(text, data.expecting, data.closed_by, data.arity, span)
            }
            Some(RuleKind::End) => {
                if let Some(top) = self.forms.last() {
                    if top.closed_by.contains(&text) {
                        self.forms.pop();
                    }
                }
                Token::new(text, TokenType::End, span)
            }
            Some(RuleKind::Bridge) => {
                let data = self.rules.bridge[&text].clone();
                if let Some(top) = self.forms.last_mut() {
                    top.expecting = data.expecting.clone();
                }
                Token::bridge(text, data.expecting, data.r#in, data.arity, span)
            }
            Some(RuleKind::Wildcard) => self.wildcard_bridge(text, span),
            Some(RuleKind::Prefix) => {
                let data = &self.rules.prefix[&text];
                let mut token = Token::new(text, TokenType::Prefix, span);
                token.arity = Some(data.arity);
                token.precedence = Some([data.precedence, 0, 0]);
                token
            }
            Some(RuleKind::Operator) => {
                let precedence = self.rules.operators[&text];
                Token::operator(text, precedence, span)
            }
            Some(RuleKind::OpenDelimiter) => {
                let data = self.rules.delimiters[&text].clone();
                Token::open_delimiter(text, data.closed_by, data.infix, data.prefix, span)
            }
            Some(RuleKind::CloseDelimiter) => Token::new(text, TokenType::CloseDelimiter, span),
            Some(RuleKind::Mark) => Token::new(text, TokenType::Mark, span),
            None => Token::new(text, TokenType::Variable, span),
        }
    }

    /// A wildcard stands in for the bridge the innermost open form expects.
    /// With no expectation to alias, it falls through as unclassified.
    fn wildcard_bridge(&mut self, text: String, span: Span) -> Token {
        let alias = self
            .forms
            .last()
            .and_then(|frame| frame.expecting.first().cloned())
            .filter(|expected| self.rules.bridge.contains_key(expected));
        match alias {
            Some(expected) => {
                let data = self.rules.bridge[&expected].clone();
                if let Some(top) = self.forms.last_mut() {
                    top.expecting = data.expecting.clone();
                }
                let mut token = Token::bridge(text, data.expecting, data.r#in, data.arity, span);
                token.alias = Some(expected);
                token
            }
            None => Token::new(text, TokenType::Unclassified, span),
        }
    }

    fn scan_symbol_run(&mut self) -> Token {
        let start = self.here();
        let run = self.scan_while(is_symbol_char);
        // Longest-match decomposition was already done greedily by taking
        // the whole run; fall back to the longest known prefix and push the
        // rest back for the next call.
        if self.rules.lookup.contains_key(run.as_str()) {
            return self.classify(run, start);
        }
        let mut chars: Vec<char> = run.chars().collect();
        let mut keep = chars.len();
        while keep > 1 {
            let prefix: String = chars[..keep].iter().collect();
            if self.rules.lookup.contains_key(prefix.as_str()) {
                break;
            }
            keep -= 1;
        }
        let surplus = chars.split_off(keep);
        self.push_back(&surplus);
        let text: String = chars.into_iter().collect();
        if self.rules.lookup.contains_key(text.as_str()) {
            self.classify(text, start)
        } else {
            Token::new(text, TokenType::Unclassified, start.span_to(self.here()))
        }
    }

    /// Rewind the scanner by the given trailing characters. Symbol runs
    /// never contain newlines, so only the column moves.
    fn push_back(&mut self, surplus: &[char]) {
        self.index -= surplus.len();
        self.col -= surplus.len() as u32;
    }

    fn scan_number(&mut self) -> Token {
        let start = self.here();
        let mut text = String::new();

        let (radix, base, balanced) = if self.peek() == Some('0') {
            match self.peek_at(1) {
                Some('x') => ("0x", 16, false),
                Some('o') => ("0o", 8, false),
                Some('b') => ("0b", 2, false),
                Some('t') => ("0t", 3, true),
                _ => ("", 10, false),
            }
        } else {
            ("", 10, false)
        };
        if !radix.is_empty() {
            text.push(self.advance().expect("radix digit"));
            text.push(self.advance().expect("radix letter"));
        }

        let digit_ok = |c: char| is_radix_digit(c, base, balanced) || c == '_';
        let mantissa = self.scan_while(digit_ok);
        text.push_str(&mantissa);
        if mantissa.chars().all(|c| c == '_') && !radix.is_empty() {
            return Token::exception(text, "invalid literal", start.span_to(self.here()));
        }

        let mut fraction = String::new();
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| is_radix_digit(c, base, balanced)) {
            text.push(self.advance().expect("dot"));
            fraction = self.scan_while(digit_ok);
            text.push_str(&fraction);
        }

        let mut exponent = 0i32;
        if base == 10 && matches!(self.peek(), Some('e') | Some('E')) {
            let offset = if matches!(self.peek_at(1), Some('+') | Some('-')) {
                2
            } else {
                1
            };
            if self.peek_at(offset).is_some_and(|c| c.is_ascii_digit()) {
                let marker = self.advance().expect("exponent marker");
                text.push(marker);
                let mut exponent_text = String::new();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    let sign = self.advance().expect("exponent sign");
                    text.push(sign);
                    exponent_text.push(sign);
                }
                let digits = self.scan_while(|c| c.is_ascii_digit());
                text.push_str(&digits);
                exponent_text.push_str(&digits);
                exponent = exponent_text.parse().unwrap_or(0);
            }
        }

        let span = start.span_to(self.here());
        let mantissa = if mantissa.is_empty() {
            "0".to_string()
        } else {
            mantissa
        };
        let mut token = Token::number(text, radix, base, &mantissa, &fraction, exponent, span);
        if balanced {
            token.balanced = Some(true);
        }
        token
    }

    fn scan_string(&mut self) -> Result<Token, CoreError> {
        let start = self.here();
        let quote = self.advance().expect("opening quote");
        let mut text = String::from(quote);
        let mut value = String::new();
        loop {
            let Some(c) = self.advance() else {
                return Err(CoreError::lex(
                    "unterminated string literal",
                    start.span_to(self.here()),
                ));
            };
            text.push(c);
            if c == quote {
                break;
            }
            if c == '\n' {
                return Err(CoreError::lex(
                    "unterminated string literal",
                    start.span_to(self.here()),
                ));
            }
            if c == '\\' {
                let Some(escaped) = self.advance() else {
                    return Err(CoreError::lex(
                        "unterminated escape sequence",
                        start.span_to(self.here()),
                    ));
                };
                text.push(escaped);
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            } else {
                value.push(c);
            }
        }
        let mut token = Token::string(text, value, start.span_to(self.here()));
        token.set_quote(quote);
        Ok(token)
    }
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_symbol_char(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '*' | '/' | '<' | '>' | '=' | ':' | '.' | '!' | '?' | '&' | '|' | '^' | '%' | '~' | '@'
    )
}

fn is_radix_digit(c: char, base: u32, balanced: bool) -> bool {
    if balanced && base == 3 && c == 'T' {
        return true;
    }
    c.to_digit(36).is_some_and(|d| d < base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenType> {
        tokenize(input)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn classifies_a_def_form() {
        let tokens = tokenize("def f(x) =>> x + 1 end").expect("tokenize");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["def", "f", "(", "x", ")", "=>>", "x", "+", "1", "end"]
        );
        assert_eq!(tokens[0].token_type, TokenType::Start);
        assert_eq!(tokens[5].token_type, TokenType::Bridge);
        assert_eq!(tokens[9].token_type, TokenType::End);
    }

    #[test]
    fn splits_symbol_runs_on_longest_match() {
        let tokens = tokenize("x:=1").expect("tokenize");
        assert_eq!(tokens[1].text, ":=");
        assert_eq!(tokens[1].token_type, TokenType::Operator);

        let tokens = tokenize("a<--b").expect("tokenize");
        assert_eq!(tokens[1].text, "<--");
    }

    #[test]
    fn scans_numbers_with_radix_fraction_and_exponent() {
        let token = &tokenize("0x1F").expect("tokenize")[0];
        assert_eq!(token.base, Some(16));
        assert_eq!(token.mantissa.as_deref(), Some("1F"));

        let token = &tokenize("3.25e-2").expect("tokenize")[0];
        assert_eq!(token.mantissa.as_deref(), Some("3"));
        assert_eq!(token.fraction.as_deref(), Some("25"));
        assert_eq!(token.exponent, Some(-2));

        let token = &tokenize("1_000").expect("tokenize")[0];
        assert_eq!(token.mantissa.as_deref(), Some("1_000"));
    }

    #[test]
    fn scans_strings_with_escapes() {
        let token = &tokenize("\"a\\nb\"").expect("tokenize")[0];
        assert_eq!(token.token_type, TokenType::String);
        assert_eq!(token.value.as_deref(), Some("a\nb"));
        assert_eq!(token.quote.as_deref(), Some("double"));
    }

    #[test]
    fn rejects_unterminated_strings() {
        let err = tokenize("\"abc").unwrap_err();
        assert!(matches!(err, CoreError::Lex { .. }));
    }

    #[test]
    fn records_newlines_around_tokens() {
        let tokens = tokenize("a\nb").expect("tokenize");
        assert_eq!(tokens[0].ln_after, Some(true));
        assert_eq!(tokens[1].ln_before, Some(true));
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            kinds("x # a comment\ny"),
            vec![TokenType::Variable, TokenType::Variable]
        );
    }

    #[test]
    fn wildcard_stands_in_for_the_expected_bridge() {
        let tokens = tokenize("def f(x): x end").expect("tokenize");
        let colon = tokens.iter().find(|t| t.text == ":").expect("colon token");
        assert_eq!(colon.token_type, TokenType::Bridge);
        assert_eq!(colon.alias.as_deref(), Some("=>>"));
    }

    #[test]
    fn rejects_conflicting_rule_overrides() {
        let file: RulesFile = serde_yaml::from_str(
            "start:\n  - text: while\n    closed_by: [end]\n    expecting: [do]\nbridge:\n  - text: while\n    expecting: [end]\n    in: [while]\n",
        )
        .expect("parse rules");
        let err = TokenizerRules::with_overrides(&file).unwrap_err();
        assert!(matches!(err, CoreError::TokenRules(_)));
    }

    #[test]
    fn operator_precedence_bands() {
        let dot = calculate_operator_precedence(".");
        let add = calculate_operator_precedence("+");
        let less = calculate_operator_precedence("<");
        assert!(dot[1] < add[1]);
        assert!(add[1] < less[1]);
        assert_eq!(add[0], 1024, "unary plus is prefix-capable");
        assert_eq!(less[0], 0, "comparison is not prefix-capable");
    }
}
