//! Parsing of token streams into the uniform tree.
//!
//! The parser is precedence-climbing over a peekable token queue. At
//! statement level it is "fragile" (a newline ends the expression); inside
//! delimiters it is not. Keyword forms become `form` nodes whose children
//! are `part` nodes, one per keyword segment; everything downstream of the
//! parser is expressed in terms of those shapes.

use crate::error::CoreError;
use crate::node::{
    Node, NAME_APPLY, NAME_ARGUMENTS, NAME_DELIMITED, NAME_FORM, NAME_IDENTIFIER, NAME_JOIN,
    NAME_JOIN_LINES, NAME_NUMBER, NAME_OPERATOR, NAME_PART, NAME_STRING, NAME_UNIT, OPTION_BASE,
    OPTION_EXPONENT, OPTION_FRACTION, OPTION_KEYWORD, OPTION_KIND, OPTION_MANTISSA, OPTION_NAME,
    OPTION_QUOTE, OPTION_SEPARATOR, OPTION_SIGN, OPTION_SRC, OPTION_SYNTAX, OPTION_VALUE,
    VALUE_INFIX, VALUE_POSTFIX, VALUE_PREFIX, VALUE_SURROUND,
};
use crate::token::{Arity, Token, TokenType};

pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
    fragile: bool,
}

/// Parse a full compilation unit: top-level expressions separated by
/// semicolons or line breaks, wrapped in a `unit` node.
pub fn parse_unit(tokens: Vec<Token>, src_path: &str) -> Result<Node, CoreError> {
    let mut parser = Parser::new(tokens, true);
    let mut unit = Node::new(NAME_UNIT);
    if !src_path.is_empty() {
        unit.set_option(OPTION_SRC, src_path);
    }
    while let Some(node) = parser.try_read_expr()? {
        if unit.children.is_empty() {
            unit.span = node.span;
        } else {
            unit.span = unit.span.to_span(&node.span);
        }
        unit.add_child(node);
        if !parser.try_read_separator() {
            if let Some(token) = parser.peek_token() {
                return Err(CoreError::Parse(format!(
                    "unexpected token at end of expression '{}' at line {}, column {}",
                    token.text, token.span.start_line, token.span.start_col
                )));
            }
            break;
        }
    }
    if let Some(token) = parser.peek_token() {
        return Err(CoreError::Parse(format!(
            "unexpected token '{}' at line {}, column {}",
            token.text, token.span.start_line, token.span.start_col
        )));
    }
    Ok(unit)
}

impl Parser {
    pub fn new(tokens: Vec<Token>, fragile: bool) -> Parser {
        Parser {
            tokens,
            index: 0,
            fragile,
        }
    }

    pub fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn drop_peeked_token(&mut self) {
        self.index += 1;
    }

    fn get_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn must_read_token(&mut self, token_type: TokenType, text: &str) -> Result<Token, CoreError> {
        match self.get_token() {
            None => Err(CoreError::Parse(format!(
                "found end of input while expecting '{text}'"
            ))),
            Some(token) if token.token_type == token_type && token.text == text => Ok(token),
            Some(token) => Err(CoreError::Parse(format!(
                "found '{}' while expecting '{text}' at line {}, column {}",
                token.text, token.span.start_line, token.span.start_col
            ))),
        }
    }

    fn try_read_token(&mut self, token_type: TokenType, text: &str) -> Option<Token> {
        let token = self.peek_token()?;
        if token.token_type == token_type && token.text == text {
            self.get_token()
        } else {
            None
        }
    }

    fn try_read_one_of(&mut self, token_type: TokenType, texts: &[String]) -> Option<Token> {
        let token = self.peek_token()?;
        if token.token_type == token_type && texts.contains(&token.text) {
            self.get_token()
        } else {
            None
        }
    }

    /// A semicolon, or a line break before the next token.
    fn try_read_separator(&mut self) -> bool {
        if self.try_read_token(TokenType::Mark, ";").is_some() {
            return true;
        }
        self.peek_token().is_some_and(Token::starts_on_new_line)
    }

    pub fn try_read_expr(&mut self) -> Result<Option<Node>, CoreError> {
        self.do_read_expr_prec(u32::MAX, true)
    }

    pub fn must_read_expr(&mut self) -> Result<Node, CoreError> {
        Ok(self
            .do_read_expr_prec(u32::MAX, false)?
            .expect("non-optional read yields a node"))
    }

    fn try_read_expr_prec(&mut self, outer_prec: u32) -> Result<Option<Node>, CoreError> {
        self.do_read_expr_prec(outer_prec, true)
    }

    fn do_read_expr_prec(
        &mut self,
        outer_prec: u32,
        optional: bool,
    ) -> Result<Option<Node>, CoreError> {
        let Some(mut lhs) = self.do_read_primary_expr(optional)? else {
            return Ok(None);
        };
        loop {
            let Some(op) = self.peek_token() else {
                return Ok(Some(lhs));
            };
            if self.fragile && op.starts_on_new_line() {
                return Ok(Some(lhs));
            }
            let op = op.clone();
            let prec = op.infix_prec();
            if prec > 0 && prec <= outer_prec {
                self.drop_peeked_token();
                match op.token_type {
                    TokenType::OpenDelimiter => {
                        let mut args = self.read_delimited(&op)?;
                        args.name = NAME_ARGUMENTS.to_string();
                        let mut apply = Node::with_span(NAME_APPLY, lhs.span.to_span(&args.span));
                        apply.set_option(OPTION_KIND, op.to_kind());
                        apply.add_child(lhs);
                        apply.add_child(args);
                        lhs = apply;
                    }
                    TokenType::Operator => match self.try_read_expr_prec(prec)? {
                        Some(rhs) => {
                            let mut operator =
                                Node::with_span(NAME_OPERATOR, lhs.span.to_span(&rhs.span));
                            operator.set_option(OPTION_NAME, &op.text);
                            operator.set_option(OPTION_SYNTAX, VALUE_INFIX);
                            operator.add_child(lhs);
                            operator.add_child(rhs);
                            lhs = operator;
                        }
                        None => match self.read_postfix(&op, outer_prec, lhs, true) {
                            (node, true) => lhs = node,
                            (_, false) => {
                                return Err(CoreError::Parse(format!(
                                    "expected expression after operator '{}' at line {}, column {}",
                                    op.text, op.span.start_line, op.span.start_col
                                )));
                            }
                        },
                    },
                    _ => {
                        return Err(CoreError::Parse(format!(
                            "unexpected token at start of an expression '{}' at line {}, column {}",
                            op.text, op.span.start_line, op.span.start_col
                        )));
                    }
                }
            } else {
                let (node, progressed) = self.read_postfix(&op, outer_prec, lhs, false);
                lhs = node;
                if !progressed {
                    return Ok(Some(lhs));
                }
            }
        }
    }

    fn read_postfix(
        &mut self,
        op: &Token,
        outer_prec: u32,
        lhs: Node,
        dropped: bool,
    ) -> (Node, bool) {
        let prec = op.postfix_prec();
        if prec > 0 && prec <= outer_prec {
            if !dropped {
                self.drop_peeked_token();
            }
            let mut operator = Node::with_span(NAME_OPERATOR, lhs.span.to_span(&op.span));
            operator.set_option(OPTION_NAME, &op.text);
            operator.set_option(OPTION_SYNTAX, VALUE_POSTFIX);
            operator.add_child(lhs);
            (operator, true)
        } else {
            (lhs, false)
        }
    }

    fn do_read_primary_expr(&mut self, optional: bool) -> Result<Option<Node>, CoreError> {
        let Some(token) = self.peek_token() else {
            if optional {
                return Ok(None);
            }
            return Err(CoreError::Parse(
                "unexpected end of input while reading expression".to_string(),
            ));
        };
        let token = token.clone();
        match token.token_type {
            TokenType::String
            | TokenType::InterpolatedString
            | TokenType::MultiLineString
            | TokenType::Expression => {
                self.drop_peeked_token();
                convert_string_token(&token).map(Some)
            }
            TokenType::Number => {
                self.drop_peeked_token();
                Ok(Some(read_number(&token)))
            }
            TokenType::Variable => {
                self.drop_peeked_token();
                Ok(Some(read_id(&token)))
            }
            TokenType::OpenDelimiter => {
                if token.prefix == Some(true) {
                    self.drop_peeked_token();
                    Ok(Some(self.read_delimited(&token)?))
                } else {
                    Err(CoreError::Parse(format!(
                        "unexpected start of expression, token '{}' at line {}, column {}",
                        token.text, token.span.start_line, token.span.start_col
                    )))
                }
            }
            TokenType::Prefix => {
                self.drop_peeked_token();
                self.read_prefix_form(&token).map(Some)
            }
            TokenType::Start => {
                self.drop_peeked_token();
                self.read_surround_form(&token).map(Some)
            }
            TokenType::End => {
                if optional {
                    Ok(None)
                } else {
                    Err(CoreError::Parse(format!(
                        "unexpected end token '{}' at line {}, column {}",
                        token.text, token.span.start_line, token.span.start_col
                    )))
                }
            }
            TokenType::Operator if token.prefix_prec() > 0 => {
                self.drop_peeked_token();
                let arg = self
                    .try_read_expr_prec(token.prefix_prec())?
                    .ok_or_else(|| {
                        CoreError::Parse(format!(
                            "unexpected end of input while parsing argument for operator '{}'",
                            token.text
                        ))
                    })?;
                let mut operator = Node::with_span(NAME_OPERATOR, token.span.to_span(&arg.span));
                operator.set_option(OPTION_NAME, &token.text);
                operator.set_option(OPTION_SYNTAX, VALUE_PREFIX);
                operator.add_child(arg);
                Ok(Some(operator))
            }
            TokenType::Mark if optional => Ok(None),
            TokenType::Mark => Err(CoreError::Parse(format!(
                "misplaced punctuation mark '{}' at line {}, column {}",
                token.text, token.span.start_line, token.span.start_col
            ))),
            TokenType::Unclassified => Err(CoreError::Parse(format!(
                "invalid token '{}' found at line {}, column {}",
                token.text, token.span.start_line, token.span.start_col
            ))),
            TokenType::Exception => Err(CoreError::Parse(format!(
                "{} '{}' found at line {}, column {}",
                token.reason.as_deref().unwrap_or("invalid construct"),
                token.text,
                token.span.start_line,
                token.span.start_col
            ))),
            _ if optional => Ok(None),
            _ => Err(CoreError::Parse(format!(
                "unexpected token '{}' at line {}, column {}",
                token.text, token.span.start_line, token.span.start_col
            ))),
        }
    }

    fn read_surround_form(&mut self, start: &Token) -> Result<Node, CoreError> {
        let saved = std::mem::replace(&mut self.fragile, true);
        let result = self.do_read_surround_form(start);
        self.fragile = saved;
        result
    }

    fn do_read_surround_form(&mut self, start: &Token) -> Result<Node, CoreError> {
        let mut form = Node::new(NAME_FORM);
        form.set_option(OPTION_SYNTAX, VALUE_SURROUND);

        let mut part = Node::with_span(NAME_PART, start.span);
        part.set_option(OPTION_KEYWORD, &start.text);
        self.read_part_expressions(&mut part, start.arity)?;
        form.add_child(part);

        let mut expecting = start.expecting.clone().unwrap_or_default();
        let closed_by = start.closed_by.clone().unwrap_or_default();
        loop {
            let Some(next) = self.peek_token() else {
                return Err(CoreError::Parse(format!(
                    "unexpected end of input inside '{}' on line {}, column {}",
                    start.text, start.span.start_line, start.span.start_col
                )));
            };
            let next = next.clone();

            if next.token_type == TokenType::End && closed_by.contains(&next.text) {
                if expecting.contains(&next.text) {
                    self.drop_peeked_token();
                    form.span = start.span.to_span(&next.span);
                    return Ok(form);
                }
                return Err(CoreError::Parse(format!(
                    "encountered '{}' unexpectedly early at line {}, column {}, while parsing '{}'",
                    next.text, next.span.start_line, next.span.start_col, start.text
                )));
            }

            if next.token_type == TokenType::Bridge {
                let text = next.alias.clone().unwrap_or_else(|| next.text.clone());
                if !expecting.contains(&text) {
                    return Err(CoreError::Parse(format!(
                        "unexpected token '{}' at line {}, column {}, but expecting {}",
                        next.text,
                        next.span.start_line,
                        next.span.start_col,
                        start.expecting_message(&next.text)
                    )));
                }
                if let Some(valid_in) = &next.r#in {
                    if !valid_in.contains(&start.text) {
                        return Err(CoreError::Parse(format!(
                            "misplaced token '{}' is not valid inside '{}' at line {}, column {}",
                            next.text, start.text, next.span.start_line, next.span.start_col
                        )));
                    }
                }
                self.drop_peeked_token();

                let mut part = Node::with_span(NAME_PART, next.span);
                part.set_option(OPTION_KEYWORD, &text);
                self.read_part_expressions(&mut part, next.arity)?;
                form.add_child(part);

                expecting = next.expecting.clone().unwrap_or_default();
            } else {
                return Err(CoreError::Parse(format!(
                    "found '{}' at line {}, column {} but expecting {}",
                    next.text,
                    next.span.start_line,
                    next.span.start_col,
                    start.expecting_message(&next.text)
                )));
            }
        }
    }

    fn read_part_expressions(
        &mut self,
        part: &mut Node,
        arity: Option<Arity>,
    ) -> Result<(), CoreError> {
        match arity.unwrap_or(Arity::Zero) {
            Arity::Zero => {}
            Arity::One => {
                let expr = self.must_read_expr()?;
                part.add_child(expr);
            }
            Arity::Many => loop {
                let Some(next) = self.peek_token() else {
                    break;
                };
                if matches!(next.token_type, TokenType::Bridge | TokenType::End) {
                    break;
                }
                let Some(expr) = self.try_read_expr()? else {
                    break;
                };
                part.add_child(expr);
                if !self.try_read_separator() {
                    match self.peek_token() {
                        Some(next)
                            if !matches!(next.token_type, TokenType::Bridge | TokenType::End) =>
                        {
                            return Err(CoreError::Parse(format!(
                                "found '{}' but expected semicolon between expressions at line {}, column {}",
                                next.text, next.span.start_line, next.span.start_col
                            )));
                        }
                        _ => break,
                    }
                }
            },
        }
        if let Some(last) = part.children.last() {
            part.span = part.span.to_span(&last.span);
        }
        Ok(())
    }

    fn read_prefix_form(&mut self, token: &Token) -> Result<Node, CoreError> {
        let mut form = Node::with_span(NAME_FORM, token.span);
        form.set_option(OPTION_SYNTAX, VALUE_PREFIX);
        let mut part = Node::with_span(NAME_PART, token.span);
        part.set_option(OPTION_KEYWORD, &token.text);
        if token.arity == Some(Arity::One) {
            let limit = if token.prefix_prec() > 0 {
                token.prefix_prec()
            } else {
                u32::MAX
            };
            let operand = self.try_read_expr_prec(limit)?.ok_or_else(|| {
                CoreError::Parse(format!(
                    "expected expression after prefix operator '{}' at line {}, column {}",
                    token.text, token.span.start_line, token.span.start_col
                ))
            })?;
            part.span = token.span.to_span(&operand.span);
            form.span = part.span;
            part.add_child(operand);
        }
        form.add_child(part);
        Ok(form)
    }

    fn read_delimited(&mut self, open: &Token) -> Result<Node, CoreError> {
        let saved = std::mem::replace(&mut self.fragile, false);
        let result = self.do_read_delimited(open);
        self.fragile = saved;
        result
    }

    fn do_read_delimited(&mut self, open: &Token) -> Result<Node, CoreError> {
        let closed_by = open.closed_by.clone().unwrap_or_default();
        let mut result = Node::new(NAME_DELIMITED);
        result.set_option(OPTION_KIND, open.to_kind());
        loop {
            if let Some(close) = self.try_read_one_of(TokenType::CloseDelimiter, &closed_by) {
                result.span = open.span.to_span(&close.span);
                return Ok(result);
            }
            if !result.children.is_empty() {
                let comma = self.must_read_token(TokenType::Mark, ",")?;
                result.set_option(OPTION_SEPARATOR, comma.to_separator());
            }
            let node = self.try_read_expr()?.ok_or_else(|| {
                CoreError::Parse(format!(
                    "expected expression in delimited starting at line {}, column {}",
                    open.span.start_line, open.span.start_col
                ))
            })?;
            result.add_child(node);
        }
    }
}

fn read_number(token: &Token) -> Node {
    let mut node = Node::with_span(NAME_NUMBER, token.span);
    node.set_option(OPTION_BASE, &token.base.unwrap_or(10).to_string());
    node.set_option(OPTION_MANTISSA, token.mantissa.as_deref().unwrap_or("0"));
    node.set_option(OPTION_FRACTION, token.fraction.as_deref().unwrap_or(""));
    node.set_option(OPTION_EXPONENT, &token.exponent.unwrap_or(0).to_string());
    node.set_option(OPTION_SIGN, "+");
    node
}

fn read_id(token: &Token) -> Node {
    let mut node = Node::with_span(NAME_IDENTIFIER, token.span);
    node.set_option(OPTION_NAME, &token.text);
    node
}

fn convert_string_token(token: &Token) -> Result<Node, CoreError> {
    match token.token_type {
        TokenType::String => {
            let mut node = Node::with_span(NAME_STRING, token.span);
            node.set_option(OPTION_VALUE, token.value.as_deref().unwrap_or(""));
            Ok(node)
        }
        TokenType::MultiLineString => convert_compound_string(token, NAME_JOIN_LINES),
        TokenType::InterpolatedString => convert_compound_string(token, NAME_JOIN),
        TokenType::Expression => {
            // Embedded expression fragments are re-tokenized and parsed as
            // stand-alone expressions.
            let text = token.value.as_deref().unwrap_or("");
            let tokens = crate::tokenizer::tokenize(text).map_err(|e| {
                CoreError::Parse(format!(
                    "error tokenizing interpolated string at line {}, column {}: {e}",
                    token.span.start_line, token.span.start_col
                ))
            })?;
            Parser::new(tokens, true).must_read_expr()
        }
        _ => Err(CoreError::Parse(format!(
            "internal error, malformed string token at line {}, column {}",
            token.span.start_line, token.span.start_col
        ))),
    }
}

fn convert_compound_string(token: &Token, name: &str) -> Result<Node, CoreError> {
    let mut node = Node::with_span(name, token.span);
    if let Some(quote) = &token.quote {
        node.set_option(OPTION_QUOTE, quote);
    }
    if let Some(subtokens) = &token.subtokens {
        for subtoken in subtokens {
            node.add_child(convert_string_token(subtoken)?);
        }
    }
    Ok(node)
}
