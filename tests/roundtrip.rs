//! Property tests: rendering a list of numbers and symbols and reading it back
//! reproduces an equal structure.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use minilisp::{Expr, Interpreter, InterpreterConfig, LogLevel, Reader};
use proptest::prelude::*;

/// Symbols that never read back as integers and contain no delimiters
fn symbol_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z*+<>=!?/-][a-z0-9*+<>=!?/-]{0,8}")
        .unwrap()
        .prop_filter("reads as an integer", |s| s.parse::<i64>().is_err())
}

fn atom_strategy() -> impl Strategy<Value = Expr> {
    prop_oneof![
        any::<i64>().prop_map(Expr::number),
        symbol_strategy().prop_map(|name| Expr::symbol(&name)),
    ]
}

fn expr_strategy() -> impl Strategy<Value = Expr> {
    atom_strategy().prop_recursive(4, 64, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Expr::list)
    })
}

/// Top-level values are lists, so the reader returns them without evaluation
fn list_strategy() -> impl Strategy<Value = Expr> {
    prop::collection::vec(expr_strategy(), 0..8).prop_map(Expr::list)
}

fn reread(text: &str) -> Expr {
    let interp = Interpreter::with_config(InterpreterConfig {
        log_level: LogLevel::None,
    });
    let mut diagnostics = interp.diagnostics();
    let mut reader = Reader::from(text);
    interp.read(&mut reader, &mut diagnostics).unwrap().unwrap()
}

proptest! {
    #[test]
    fn render_then_read_is_identity(list in list_strategy()) {
        let text = list.to_string();
        prop_assert_eq!(reread(&text), list);
    }

    #[test]
    fn rendering_is_stable(list in list_strategy()) {
        let text = list.to_string();
        prop_assert_eq!(reread(&text).to_string(), text);
    }
}
