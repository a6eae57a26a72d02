//! This module defines the expression model every other component manipulates.
//! The main enum, [`Expr`], is a closed sum over numbers, symbols, immutable cons
//! lists and procedures. Lists are persistent: a [`Pair`] is shared by reference
//! and never mutated, so building a new list on top of an old tail is never
//! observable through the old list. Procedures are one [`Procedure`] sum type
//! covering special forms, applicative primitives and user closures.
//!
//! Ergonomic helper functions such as [`val`], [`sym`] and [`nil`] are provided for
//! convenient construction in code and tests, together with `From` conversions from
//! Rust integers, arrays and vectors.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::builtinops::{BuiltinOp, OpKind};
use crate::environment::Environment;

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Name of the only false value
pub const FALSE_SYMBOL: &str = "#f";

/// Name of the canonical true value
pub const TRUE_SYMBOL: &str = "#t";

/// Core expression type.
///
/// Cloning an `Expr` is cheap: compound variants are reference counted.
#[derive(Clone)]
pub enum Expr {
    /// Fixed-width signed integer, self-evaluating
    Number(NumberType),
    /// Identifier, evaluated by environment lookup
    Symbol(Rc<str>),
    /// Cons cell; the tail is always another `Pair` or `Empty`
    Pair(Rc<Pair>),
    /// The unique empty list terminating every well-formed list
    Empty,
    /// Special forms, primitives and closures
    Procedure(Rc<Procedure>),
}

/// A cons cell. Only constructed through [`Expr::cons`] and [`Expr::list`], which
/// keep the tail a proper list.
pub struct Pair {
    head: Expr,
    tail: Expr,
}

impl Pair {
    pub fn head(&self) -> &Expr {
        &self.head
    }

    pub fn tail(&self) -> &Expr {
        &self.tail
    }

    /// Move both halves out, leaving empty lists behind
    fn take_parts(&mut self) -> [Expr; 2] {
        [
            std::mem::replace(&mut self.head, Expr::Empty),
            std::mem::replace(&mut self.tail, Expr::Empty),
        ]
    }
}

// Long or deeply nested lists would otherwise be freed by one native call per
// cell. Uniquely owned cells are unlinked onto a work stack instead; shared
// cells are left to their other owners.
impl Drop for Pair {
    fn drop(&mut self) {
        if !matches!(self.head, Expr::Pair(_)) && !matches!(self.tail, Expr::Pair(_)) {
            return;
        }

        let mut pending = Vec::from(self.take_parts());
        while let Some(expr) = pending.pop() {
            if let Expr::Pair(cell) = expr
                && let Some(mut cell) = Rc::into_inner(cell)
            {
                pending.extend(cell.take_parts());
            }
        }
    }
}

/// Captured defining environment of a procedure.
///
/// `None` only after [`Environment::break_procedure_references`] ran at teardown.
pub(crate) type CapturedEnv = RefCell<Option<Environment>>;

/// Callable values.
///
/// Built-ins are either special forms, which receive their operands unevaluated
/// together with the caller's environment, or primitives, which receive operands
/// evaluated left to right in the caller's environment; the registry entry's
/// [`OpKind`] tells which. Closures always receive evaluated operands.
pub enum Procedure {
    Builtin(Builtin),
    /// User-defined procedure created by `lambda`
    Closure(Closure),
}

/// A built-in operation bound to the environment it was created in (the global
/// frame for every built-in installed by the interpreter).
pub struct Builtin {
    op: &'static BuiltinOp,
    env: CapturedEnv,
}

impl Builtin {
    pub fn op(&self) -> &'static BuiltinOp {
        self.op
    }

    /// The environment this built-in captured at creation.
    pub fn env(&self) -> Result<Environment, Error> {
        captured(&self.env, self.op.id)
    }
}

/// User-defined procedure: parameter names, body and the defining environment.
pub struct Closure {
    params: Vec<String>,
    body: Expr,
    env: CapturedEnv,
}

impl Closure {
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    /// The environment active when the closure was created.
    pub fn env(&self) -> Result<Environment, Error> {
        captured(&self.env, "lambda")
    }
}

fn captured(env: &CapturedEnv, name: &str) -> Result<Environment, Error> {
    env.borrow().clone().ok_or_else(|| {
        Error::EvalError(format!(
            "procedure {name} was released from its environment"
        ))
    })
}

impl Procedure {
    pub fn builtin(op: &'static BuiltinOp, env: Environment) -> Procedure {
        Procedure::Builtin(Builtin {
            op,
            env: RefCell::new(Some(env)),
        })
    }

    pub fn closure(params: Vec<String>, body: Expr, env: Environment) -> Procedure {
        Procedure::Closure(Closure {
            params,
            body,
            env: RefCell::new(Some(env)),
        })
    }

    /// Drop the captured environment reference. Used once at interpreter teardown.
    pub(crate) fn clear_env(&self) {
        let env = match self {
            Procedure::Builtin(b) => &b.env,
            Procedure::Closure(c) => &c.env,
        };
        env.borrow_mut().take();
    }

    pub fn is_special_form(&self) -> bool {
        matches!(self, Procedure::Builtin(b) if matches!(b.op.kind, OpKind::SpecialForm(_)))
    }
}

impl Expr {
    pub fn number(n: NumberType) -> Expr {
        Expr::Number(n)
    }

    pub fn symbol(name: &str) -> Expr {
        Expr::Symbol(Rc::from(name))
    }

    /// Prepend `head` to the list `tail`.
    pub fn cons(head: Expr, tail: Expr) -> Result<Expr, Error> {
        if !tail.is_list() {
            return Err(Error::TypeError(format!(
                "cons requires a list as tail, got {tail}"
            )));
        }
        Ok(Expr::Pair(Rc::new(Pair { head, tail })))
    }

    /// Build a proper list from an ordered sequence of elements.
    pub fn list<I>(elements: I) -> Expr
    where
        I: IntoIterator<Item = Expr>,
        I::IntoIter: DoubleEndedIterator,
    {
        elements.into_iter().rev().fold(Expr::Empty, |tail, head| {
            Expr::Pair(Rc::new(Pair { head, tail }))
        })
    }

    pub fn procedure(procedure: Procedure) -> Expr {
        Expr::Procedure(Rc::new(procedure))
    }

    /// Every value is true except the symbol `#f`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Expr::Symbol(name) if &**name == FALSE_SYMBOL)
    }

    /// True for `Pair` and `Empty`
    pub fn is_list(&self) -> bool {
        matches!(self, Expr::Pair(_) | Expr::Empty)
    }

    pub fn is_empty_list(&self) -> bool {
        matches!(self, Expr::Empty)
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self, Expr::Procedure(_))
    }

    /// Split a non-empty list into head and tail.
    pub fn decompose(&self) -> Option<(&Expr, &Expr)> {
        match self {
            Expr::Pair(pair) => Some((&pair.head, &pair.tail)),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<NumberType> {
        match self {
            Expr::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Symbol(name) => Some(name.as_ref()),
            _ => None,
        }
    }

    pub fn as_procedure(&self) -> Option<&Rc<Procedure>> {
        match self {
            Expr::Procedure(procedure) => Some(procedure),
            _ => None,
        }
    }

    /// Iterate over the elements of a list. Atoms and procedures yield nothing.
    pub fn iter(&self) -> ListIter<'_> {
        ListIter { current: self }
    }

    /// Number of elements of a list (0 for non-lists)
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        !matches!(self, Expr::Pair(_))
    }
}

/// Borrowing iterator over list elements
pub struct ListIter<'a> {
    current: &'a Expr,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Expr;

    fn next(&mut self) -> Option<Self::Item> {
        match self.current {
            Expr::Pair(pair) => {
                self.current = &pair.tail;
                Some(&pair.head)
            }
            _ => None,
        }
    }
}

impl std::iter::FusedIterator for ListIter<'_> {}

impl<'a> IntoIterator for &'a Expr {
    type Item = &'a Expr;
    type IntoIter = ListIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "Number({n})"),
            Expr::Symbol(s) => write!(f, "Symbol({s})"),
            Expr::Pair(_) => {
                write!(f, "List(")?;
                for (i, v) in self.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Expr::Empty => write!(f, "Empty"),
            Expr::Procedure(procedure) => match &**procedure {
                Procedure::Builtin(b) => write!(f, "Builtin({}, {:?})", b.op.id, b.op.kind),
                Procedure::Closure(c) => {
                    write!(f, "Closure(params={:?}, body={:?})", c.params, c.body)
                }
            },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Symbol(s) => write!(f, "{s}"),
            Expr::Pair(_) | Expr::Empty => {
                write!(f, "(")?;
                for (i, elem) in self.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Expr::Procedure(procedure) => write!(f, "{procedure}"),
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Builtin(b) => match b.op.kind {
                OpKind::SpecialForm(_) => write!(f, "#<special-form:{}>", b.op.id),
                OpKind::Primitive(_) => write!(f, "#<primitive:{}>", b.op.id),
            },
            Procedure::Closure(c) => {
                write!(f, "(lambda (")?;
                for (i, param) in c.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") {})", c.body)
            }
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::Number(a), Expr::Number(b)) => a == b,
            // Symbol identity is by name
            (Expr::Symbol(a), Expr::Symbol(b)) => a == b,
            (Expr::Empty, Expr::Empty) => true,
            (Expr::Pair(_), Expr::Pair(_)) => self.iter().eq(other.iter()),
            // Procedures compare by identity
            (Expr::Procedure(a), Expr::Procedure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::symbol(name)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Expr {
            fn from(n: $int_type) -> Self {
                Expr::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Expr>> From<Vec<T>> for Expr {
    fn from(v: Vec<T>) -> Self {
        Expr::list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Expr>, const N: usize> From<[T; N]> for Expr {
    fn from(arr: [T; N]) -> Self {
        Expr::list(arr.into_iter().map(Into::into))
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Expr {
    Expr::symbol(name.as_ref())
}

/// Helper function for creating expressions from anything convertible.
/// Note that `&str` converts to a symbol: the language has no strings.
pub fn val<T: Into<Expr>>(value: T) -> Expr {
    value.into()
}

/// Helper function for creating the empty list
pub fn nil() -> Expr {
    Expr::Empty
}
