//! minilisp - a small LISP-family expression evaluator
//!
//! This crate provides a dynamically typed evaluator for a minimal LISP dialect:
//! integers, symbols, immutable cons lists, lexically scoped closures, a handful of
//! special forms and numeric/boolean primitives. Source text is turned into
//! expressions by a hand-written reader.
//!
//! ```text
//! (define (square x) (* x x))        ; function definition
//! (square 5)                         ; => 25
//! (define (make-adder n) (lambda (x) (+ x n)))
//! ((make-adder 3) 4)                 ; => 7, closures capture their defining scope
//! (< 1 2 3)                          ; => #t, comparisons chain
//! (if #t 1 (/ 1 0))                  ; => 1, only the selected branch is evaluated
//! ```
//!
//! ## Truthiness
//!
//! Every value is true except the symbol `#f`. `0` and `()` are true.
//!
//! ## Modules
//!
//! - `ast`: the expression model and its textual rendering
//! - `environment`: chained scope frames
//! - `evaluator`: the evaluation protocol and special forms
//! - `builtinops`: built-in arithmetic, comparison and boolean procedures
//! - `reader`: character stream to expression conversion
//! - `interpreter`: the entry points used by a REPL or embedding host
//! - `diagnostics`: the explicit diagnostics sink passed into every call

use thiserror::Error;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Input ended before the expression was complete (unclosed parens)
    Incomplete,
    /// Invalid or unexpected syntax (e.g. a closing paren with no open list)
    InvalidSyntax,
    /// Implementation-imposed limit exceeded (integer literal overflow)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a ParseError carrying the tail of the text consumed so far.
    ///
    /// The reader works on a character stream, so the only context available is
    /// what it has already scanned; the last 100 characters are kept.
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        consumed: &str,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let total = consumed.chars().count();
        let skip = total.saturating_sub(MAX_CONTEXT);
        let mut display_context = String::new();
        if skip > 0 {
            display_context.push_str("[...]");
        }
        display_context.extend(consumed.chars().skip(skip));

        // Replace newlines with visible markers for better error display
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    ParseError(ParseError),
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("{}", fmt_arity(.expected, .got, .expression))]
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow in {0}")]
    Overflow(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
}

fn fmt_arity(expected: &usize, got: &usize, expression: &Option<String>) -> String {
    match expression {
        Some(expr) => format!(
            "ArityError: expression {expr}: expected at least {expected} arguments, got {got}"
        ),
        None => format!("ArityError: expected at least {expected} arguments but got {got}"),
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::ParseError(err)
    }
}

pub mod ast;
pub mod builtinops;
pub mod diagnostics;
pub mod environment;
pub mod evaluator;
pub mod interpreter;
pub mod reader;
mod stack;

pub use ast::Expr;
pub use diagnostics::{Diagnostics, LogLevel};
pub use environment::Environment;
pub use interpreter::{Interpreter, InterpreterConfig};
pub use reader::Reader;
