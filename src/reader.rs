//! Character stream to expression conversion.
//!
//! The [`Reader`] pulls characters one at a time and produces one expression per
//! [`Reader::read`] call. Nested lists are tracked with an explicit stack of
//! partially read levels instead of recursion, so nesting depth is limited only by
//! memory.
//!
//! A bare atom read at the top level is resolved immediately against the global
//! environment, while atoms inside a list are returned as plain symbols and numbers
//! for the evaluator to resolve later.

use std::iter::Peekable;
use std::str::Chars;

use nom::{
    IResult, Parser,
    character::complete::{digit1, one_of},
    combinator::{all_consuming, opt, recognize},
    sequence::pair,
};

use crate::ast::{Expr, NumberType};
use crate::diagnostics::Diagnostics;
use crate::environment::Environment;
use crate::evaluator;
use crate::{Error, ParseError, ParseErrorKind};

const COMMENT_START: char = ';';

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')' || c == COMMENT_START
}

/// Recognize an integer literal: optional sign followed by decimal digits
fn integer_literal(input: &str) -> IResult<&str, &str> {
    all_consuming(recognize(pair(opt(one_of("+-")), digit1))).parse(input)
}

/// Classify a complete token as a number or a symbol
fn classify_atom(token: &str) -> Result<Expr, ParseErrorKind> {
    match integer_literal(token) {
        Ok((_, digits)) => digits
            .parse::<NumberType>()
            .map(Expr::Number)
            .map_err(|_| ParseErrorKind::ImplementationLimit),
        Err(_) => Ok(Expr::symbol(token)),
    }
}

/// Stateful scanner over a character stream
pub struct Reader<I: Iterator<Item = char>> {
    chars: Peekable<I>,
    /// Text consumed by the current `read` call, used as error context
    consumed: String,
}

impl<'a> From<&'a str> for Reader<Chars<'a>> {
    fn from(input: &'a str) -> Self {
        Reader::new(input.chars())
    }
}

impl<I: Iterator<Item = char>> Reader<I> {
    pub fn new(chars: I) -> Self {
        Reader {
            chars: chars.peekable(),
            consumed: String::new(),
        }
    }

    /// Read the next expression.
    ///
    /// Returns `Ok(None)` once the input holds nothing but whitespace and comments.
    /// A parse failure inside a list discards the rest of that list, so the next
    /// call starts at a fresh top-level expression.
    pub fn read(
        &mut self,
        global: &Environment,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<Expr>, Error> {
        self.consumed.clear();
        self.skip_atmosphere();

        match self.chars.peek().copied() {
            None => Ok(None),
            Some('(') => {
                self.bump();
                self.read_list(diagnostics).map(Some)
            }
            Some(')') => {
                self.bump();
                Err(self.error(
                    ParseErrorKind::InvalidSyntax,
                    "Unexpected ')' with no open list",
                    Some(")".into()),
                ))
            }
            Some(_) => {
                let token = self.read_token();
                self.resolve_top_level_atom(&token, global, diagnostics)
                    .map(Some)
            }
        }
    }

    /// Read the rest of a list whose opening parenthesis was just consumed
    fn read_list(&mut self, diagnostics: &mut Diagnostics) -> Result<Expr, Error> {
        // One entry per open parenthesis; the length is the nesting depth
        let mut levels: Vec<Vec<Expr>> = vec![Vec::new()];

        loop {
            self.skip_atmosphere();
            match self.bump() {
                None => {
                    return Err(self.error(
                        ParseErrorKind::Incomplete,
                        format!(
                            "Unexpected end of input: {} unclosed list(s)",
                            levels.len()
                        ),
                        None,
                    ));
                }
                Some('(') => levels.push(Vec::new()),
                Some(')') => {
                    let Some(elements) = levels.pop() else {
                        return Err(self.error(
                            ParseErrorKind::InvalidSyntax,
                            "Unbalanced ')'",
                            Some(")".into()),
                        ));
                    };
                    let list = Expr::list(elements);
                    diagnostics.trace(format_args!("reader: list {list}"));
                    match levels.last_mut() {
                        Some(parent) => parent.push(list),
                        None => return Ok(list),
                    }
                }
                Some(first) => {
                    let token = self.read_list_token(first);
                    let atom = match classify_atom(&token) {
                        Ok(atom) => atom,
                        Err(kind) => {
                            let err = self.error(
                                kind,
                                "Integer literal out of range",
                                Some(token),
                            );
                            self.discard_open_lists(levels.len());
                            return Err(err);
                        }
                    };
                    if let Some(level) = levels.last_mut() {
                        level.push(atom);
                    }
                }
            }
        }
    }

    /// Resolve a bare atom read at the top level.
    ///
    /// A token bound in the global environment yields its bound value, evaluated;
    /// otherwise an integer token yields the number and anything else is unbound.
    fn resolve_top_level_atom(
        &self,
        token: &str,
        global: &Environment,
        diagnostics: &mut Diagnostics,
    ) -> Result<Expr, Error> {
        if let Some(bound) = global.get(token) {
            return evaluator::eval(&bound, global, diagnostics);
        }

        match classify_atom(token) {
            Ok(number @ Expr::Number(_)) => Ok(number),
            Ok(_) => Err(Error::UnboundVariable(token.to_owned())),
            Err(kind) => Err(self.error(
                kind,
                "Integer literal out of range",
                Some(token.to_owned()),
            )),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.consumed.push(c);
        Some(c)
    }

    /// Consume characters up to the next delimiter
    fn read_token(&mut self) -> String {
        let mut token = String::new();
        while let Some(&c) = self.chars.peek() {
            if is_delimiter(c) {
                break;
            }
            token.push(c);
            self.bump();
        }
        token
    }

    /// Consume the rest of a token inside a list. Only whitespace and parentheses
    /// end it; a comment is skipped and the token continues on the next line.
    fn read_list_token(&mut self, first: char) -> String {
        let mut token = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c == COMMENT_START {
                self.skip_comment();
            } else if c.is_whitespace() || c == '(' || c == ')' {
                break;
            } else {
                token.push(c);
                self.bump();
            }
        }
        token
    }

    /// Skip whitespace and line comments
    fn skip_atmosphere(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == COMMENT_START {
                self.skip_comment();
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Discard a comment up to and including the newline
    fn skip_comment(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    /// Consume input until `depth` open lists are closed or the input ends
    fn discard_open_lists(&mut self, mut depth: usize) {
        while depth > 0 {
            match self.chars.peek().copied() {
                None => break,
                Some(COMMENT_START) => self.skip_comment(),
                Some(c) => {
                    self.bump();
                    match c {
                        '(' => depth += 1,
                        ')' => depth -= 1,
                        _ => {}
                    }
                }
            }
        }
    }

    fn error(
        &self,
        kind: ParseErrorKind,
        message: impl Into<String>,
        found: Option<String>,
    ) -> Error {
        ParseError::with_context(kind, message, &self.consumed, found).into()
    }
}
