//! Built-in operations registry.
//!
//! Every built-in procedure the interpreter installs in the global environment is
//! described once here, with its identifier, its kind and its minimum arity.
//!
//! ## Special Forms vs Primitives
//!
//! - **Special forms** (`define`, `lambda`, `if`) receive their operands
//!   unevaluated, together with the caller's environment, and decide themselves
//!   what to evaluate. Their implementations live in the evaluator.
//! - **Primitives** (`+ - * /`, `< > =`, `and`, `or`) receive operands already
//!   evaluated left to right in the caller's environment.
//!
//! ## Numeric operands
//!
//! Arithmetic and comparison share [`expect_number`]: a symbol where a number is
//! required is reported as an unbound variable (an evaluated argument that is still
//! a symbol almost always means a name that was never defined), any other
//! non-number as a type error. Arithmetic is checked: results that do not fit the
//! fixed-width integer are an overflow error.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the [`PrimitiveFn`] or [`SpecialFormFn`] signature
//! 2. **Add to BUILTIN_OPS** with its identifier and arity
//! 3. **Bind it** in `create_global_env` if it is not already installed in registry order

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Expr, FALSE_SYMBOL, NumberType, TRUE_SYMBOL};
use crate::diagnostics::Diagnostics;
use crate::environment::Environment;
use crate::evaluator::{eval_define, eval_if, eval_lambda};

/// Applicative primitive: evaluated arguments and the environment the primitive captured.
pub type PrimitiveFn = fn(&[Expr], &Environment, &mut Diagnostics) -> Result<Expr, Error>;

/// Special form: the unevaluated operand list, the caller's environment and the
/// environment the form captured.
pub type SpecialFormFn =
    fn(&Expr, &Environment, &Environment, &mut Diagnostics) -> Result<Expr, Error>;

/// Represents the implementation of a built-in operation
#[derive(Clone, Copy)]
pub enum OpKind {
    SpecialForm(SpecialFormFn),
    Primitive(PrimitiveFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
            OpKind::Primitive(_) => write!(f, "Primitive(<fn>)"),
        }
    }
}

/// Minimum number of operands an operation accepts. Surplus operands are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity(pub usize);

impl Arity {
    pub fn validate(self, got: usize) -> Result<(), Error> {
        if got < self.0 {
            return Err(Error::arity_error(self.0, got));
        }
        Ok(())
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    pub id: &'static str,
    pub kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.kind, OpKind::SpecialForm(_))
    }
}

/// Extract the integer from a numeric operand.
///
/// A bare symbol is reported as unbound, anything else that is not a number as a
/// type error.
pub fn expect_number(expr: &Expr) -> Result<NumberType, Error> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Symbol(name) => Err(Error::UnboundVariable(name.to_string())),
        other => Err(Error::TypeError(format!("{other} is not a number"))),
    }
}

/// The value bound to `#t` or `#f` in the primitive's environment
fn boolean(env: &Environment, value: bool) -> Result<Expr, Error> {
    env.lookup(if value { TRUE_SYMBOL } else { FALSE_SYMBOL })
}

/// Left fold over two or more numbers: seed with the first operand, then validate
/// and combine with each following operand in turn.
fn fold_arithmetic(
    args: &[Expr],
    name: &str,
    validate: fn(NumberType, NumberType) -> Result<(), Error>,
    combine: fn(NumberType, NumberType) -> Option<NumberType>,
) -> Result<Expr, Error> {
    let [first, rest @ ..] = args else {
        return Err(Error::arity_error(2, 0));
    };

    let mut acc = expect_number(first)?;
    for arg in rest {
        let n = expect_number(arg)?;
        validate(acc, n)?;
        acc = combine(acc, n).ok_or_else(|| Error::Overflow(name.to_owned()))?;
    }
    Ok(Expr::Number(acc))
}

fn any_pair(_: NumberType, _: NumberType) -> Result<(), Error> {
    Ok(())
}

fn nonzero_divisor(_: NumberType, right: NumberType) -> Result<(), Error> {
    if right == 0 {
        return Err(Error::DivisionByZero);
    }
    Ok(())
}

// Macro to generate arithmetic folds
macro_rules! arithmetic {
    ($name:ident, $label:expr, $validate:expr, $checked:ident) => {
        fn $name(
            args: &[Expr],
            _env: &Environment,
            _diagnostics: &mut Diagnostics,
        ) -> Result<Expr, Error> {
            fold_arithmetic(args, $label, $validate, NumberType::$checked)
        }
    };
}

arithmetic!(builtin_add, "addition", any_pair, checked_add);
arithmetic!(builtin_sub, "subtraction", any_pair, checked_sub);
arithmetic!(builtin_mul, "multiplication", any_pair, checked_mul);
arithmetic!(builtin_div, "division", nonzero_divisor, checked_div);

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(
            args: &[Expr],
            env: &Environment,
            _diagnostics: &mut Diagnostics,
        ) -> Result<Expr, Error> {
            let [first, rest @ ..] = args else {
                return Err(Error::arity_error(2, 0));
            };

            // Chain comparisons: all adjacent pairs must satisfy the comparison.
            // Every operand is type-checked even after a pair fails.
            let mut prev = expect_number(first)?;
            let mut holds = true;
            for arg in rest {
                let current = expect_number(arg)?;
                holds = holds && (prev $op current);
                prev = current;
            }

            boolean(env, holds)
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_eq, ==);

fn builtin_and(args: &[Expr], env: &Environment, _: &mut Diagnostics) -> Result<Expr, Error> {
    boolean(env, args.iter().all(Expr::is_truthy))
}

fn builtin_or(args: &[Expr], env: &Environment, _: &mut Diagnostics) -> Result<Expr, Error> {
    boolean(env, args.iter().any(Expr::is_truthy))
}

/// Global registry of all built-in operations, in installation order.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        // Special forms
        BuiltinOp {
            id: "define",
            kind: OpKind::SpecialForm(eval_define),
            arity: Arity(2),
        },
        BuiltinOp {
            id: "lambda",
            kind: OpKind::SpecialForm(eval_lambda),
            arity: Arity(2),
        },
        BuiltinOp {
            id: "if",
            kind: OpKind::SpecialForm(eval_if),
            arity: Arity(3),
        },
        // Boolean aggregates
        BuiltinOp {
            id: "and",
            kind: OpKind::Primitive(builtin_and),
            arity: Arity(1),
        },
        BuiltinOp {
            id: "or",
            kind: OpKind::Primitive(builtin_or),
            arity: Arity(1),
        },
        // Comparison operations
        BuiltinOp {
            id: "<",
            kind: OpKind::Primitive(builtin_lt),
            arity: Arity(2),
        },
        BuiltinOp {
            id: ">",
            kind: OpKind::Primitive(builtin_gt),
            arity: Arity(2),
        },
        BuiltinOp {
            id: "=",
            kind: OpKind::Primitive(builtin_eq),
            arity: Arity(2),
        },
        // Arithmetic operations
        BuiltinOp {
            id: "+",
            kind: OpKind::Primitive(builtin_add),
            arity: Arity(2),
        },
        BuiltinOp {
            id: "*",
            kind: OpKind::Primitive(builtin_mul),
            arity: Arity(2),
        },
        BuiltinOp {
            id: "-",
            kind: OpKind::Primitive(builtin_sub),
            arity: Arity(2),
        },
        BuiltinOp {
            id: "/",
            kind: OpKind::Primitive(builtin_div),
            arity: Arity(2),
        },
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations in installation order
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its identifier
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}
