//! Entry points for a REPL or an embedding host.
//!
//! An [`Interpreter`] owns the global environment. It seeds the built-ins on
//! construction and releases the reference cycle between the global frame and
//! the procedures stored in it when dropped.

use crate::Error;
use crate::ast::Expr;
use crate::diagnostics::{Diagnostics, LogLevel};
use crate::environment::Environment;
use crate::evaluator::{self, create_global_env_with};
use crate::reader::Reader;

/// Settings an interpreter is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterpreterConfig {
    /// Level for sinks handed out by [`Interpreter::diagnostics`]
    pub log_level: LogLevel,
}

pub struct Interpreter {
    global: Environment,
    config: InterpreterConfig,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        let mut diagnostics = Diagnostics::new(config.log_level);
        let global = create_global_env_with(&mut diagnostics);
        diagnostics.trace(format_args!(
            "global environment ready: {} bindings",
            global.get_all_bindings().len()
        ));
        Interpreter { global, config }
    }

    pub fn config(&self) -> InterpreterConfig {
        self.config
    }

    /// A fresh diagnostics sink at the configured level
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::new(self.config.log_level)
    }

    pub fn global(&self) -> &Environment {
        &self.global
    }

    /// Parse the next expression from `reader`. `Ok(None)` means end of input.
    pub fn read<I: Iterator<Item = char>>(
        &self,
        reader: &mut Reader<I>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<Expr>, Error> {
        reader.read(&self.global, diagnostics)
    }

    /// Evaluate `expr` in the global environment
    #[tracing::instrument(level = "debug", skip_all, fields(expr = %expr))]
    pub fn try_eval(&self, expr: &Expr, diagnostics: &mut Diagnostics) -> Result<Expr, Error> {
        evaluator::eval(expr, &self.global, diagnostics)
    }

    /// Evaluate `expr`, reporting a failure to `diagnostics` and yielding no result
    pub fn eval(&self, expr: &Expr, diagnostics: &mut Diagnostics) -> Option<Expr> {
        self.try_eval(expr, diagnostics)
            .map_err(|err| diagnostics.report(&err))
            .ok()
    }

    /// Read and evaluate every expression in `input`, returning the last value.
    ///
    /// The first read or evaluation failure aborts the rest of the snippet. Input
    /// with no expressions evaluates to the empty list.
    pub fn try_eval_str(
        &self,
        input: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Expr, Error> {
        let mut reader = Reader::from(input);
        let mut last = Expr::Empty;
        while let Some(expr) = self.read(&mut reader, diagnostics)? {
            last = self.try_eval(&expr, diagnostics)?;
        }
        Ok(last)
    }

    pub fn eval_str(&self, input: &str, diagnostics: &mut Diagnostics) -> Option<Expr> {
        self.try_eval_str(input, diagnostics)
            .map_err(|err| diagnostics.report(&err))
            .ok()
    }

    /// Canonical textual form of `expr`
    pub fn render(&self, expr: &Expr) -> String {
        expr.to_string()
    }

    /// Bind or rebind `name` in the global environment
    pub fn bind(&self, name: impl Into<String>, value: Expr) {
        self.global.bind(name, value);
    }

    pub fn lookup(&self, name: &str) -> Result<Expr, Error> {
        self.global.lookup(name)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        let mut diagnostics = self.diagnostics();
        diagnostics.trace(format_args!("releasing global environment"));
        self.global.break_procedure_references();
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    #[test]
    fn test_eval_str_returns_last_value() {
        let interp = Interpreter::new();
        let mut diagnostics = interp.diagnostics();
        assert_eq!(
            interp.eval_str("(define a 2) (define b 3) (* a b)", &mut diagnostics),
            Some(val(6))
        );
        assert_eq!(interp.eval_str("", &mut diagnostics), Some(Expr::Empty));
        assert!(diagnostics.reported().is_empty());
    }

    #[test]
    fn test_failure_yields_no_result_and_is_reported() {
        let interp = Interpreter::with_config(InterpreterConfig {
            log_level: LogLevel::None,
        });
        let mut diagnostics = interp.diagnostics();
        assert_eq!(interp.eval_str("(/ 1 0)", &mut diagnostics), None);
        assert_eq!(diagnostics.last_error(), Some(&Error::DivisionByZero));

        assert_eq!(interp.eval_str("(+ 1", &mut diagnostics), None);
        assert!(matches!(
            diagnostics.last_error(),
            Some(Error::ParseError(_))
        ));
        assert_eq!(diagnostics.reported().len(), 2);
    }

    #[test]
    fn test_failed_snippet_keeps_earlier_definitions() {
        let interp = Interpreter::new();
        let mut diagnostics = interp.diagnostics();
        assert_eq!(
            interp.eval_str(
                "(define kept 1) (car kept) (define lost 2)",
                &mut diagnostics
            ),
            None
        );
        assert_eq!(interp.lookup("kept").unwrap(), val(1));
        assert!(interp.lookup("lost").is_err());
    }

    #[test]
    fn test_bind_and_render() {
        let interp = Interpreter::new();
        let mut diagnostics = interp.diagnostics();
        interp.bind("seven", val(7));
        assert_eq!(interp.eval_str("(+ seven 1)", &mut diagnostics), Some(val(8)));

        let expr = interp
            .eval_str("(lambda (x y) (+ x y))", &mut diagnostics)
            .unwrap();
        assert_eq!(interp.render(&expr), "(lambda (x y) (+ x y))");
        assert_eq!(interp.render(&val(vec![sym("a"), val(1)])), "(a 1)");
    }

    #[test]
    fn test_read_then_eval() {
        let interp = Interpreter::new();
        let mut diagnostics = interp.diagnostics();
        let mut reader = Reader::from("(+ 1 2) (* 2 3)");
        let mut results = Vec::new();
        while let Some(expr) = interp.read(&mut reader, &mut diagnostics).unwrap() {
            results.push(interp.eval(&expr, &mut diagnostics).unwrap());
        }
        assert_eq!(results, vec![val(3), val(6)]);
    }

    #[test]
    fn test_config_level_reaches_diagnostics() {
        let interp = Interpreter::with_config(InterpreterConfig {
            log_level: LogLevel::Debug,
        });
        assert_eq!(interp.config().log_level, LogLevel::Debug);
        let mut diagnostics = interp.diagnostics();
        assert!(diagnostics.is_debug());
        assert_eq!(
            interp.eval_str("((lambda (x) x) 5)", &mut diagnostics),
            Some(val(5))
        );
    }

    #[test]
    fn test_teardown_at_every_level() {
        for log_level in [LogLevel::None, LogLevel::Error, LogLevel::Debug] {
            let interp = Interpreter::with_config(InterpreterConfig { log_level });
            let mut diagnostics = interp.diagnostics();
            let square = interp
                .eval_str("(define (square x) (* x x))", &mut diagnostics)
                .unwrap();
            let global = interp.global().clone();
            drop(interp);

            let Expr::Procedure(procedure) = &square else {
                panic!("expected procedure");
            };
            let result = evaluator::apply(procedure, &val([2]), &global, &mut diagnostics);
            assert!(
                matches!(result, Err(Error::EvalError(_))),
                "{log_level:?}: closure should be released"
            );
            assert!(diagnostics.reported().is_empty());
        }
    }

    #[test]
    fn test_drop_releases_global_frame() {
        let interp = Interpreter::new();
        let mut diagnostics = interp.diagnostics();
        interp.eval_str("(define (f x) (lambda (y) (+ x y)))", &mut diagnostics);
        let global = interp.global().clone();
        drop(interp);
        // Built-ins no longer hold the frame; only our handle does
        let released = global.lookup("f").unwrap();
        let Expr::Procedure(procedure) = &released else {
            panic!("expected procedure");
        };
        let result = evaluator::apply(procedure, &val([1]), &global, &mut diagnostics);
        assert!(matches!(result, Err(Error::EvalError(_))));
    }
}
