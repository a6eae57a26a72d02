use crate::Error;
use crate::ast::{Closure, Expr, FALSE_SYMBOL, Procedure, TRUE_SYMBOL, sym};
use crate::builtinops::{OpKind, get_builtin_ops};
use crate::diagnostics::{Diagnostics, LogLevel};
use crate::environment::Environment;
use crate::stack::ensure_sufficient_stack;

/// Evaluate an expression in `env`.
///
/// Numbers, the empty list and procedures evaluate to themselves; symbols are
/// looked up; a non-empty list is an application of its head. Evaluation is
/// plain recursion without tail-call elimination, so each nested call consumes
/// stack; the stack is grown on demand.
pub fn eval(expr: &Expr, env: &Environment, diagnostics: &mut Diagnostics) -> Result<Expr, Error> {
    ensure_sufficient_stack(|| match expr {
        Expr::Number(_) | Expr::Empty | Expr::Procedure(_) => Ok(expr.clone()),

        // Variable lookup
        Expr::Symbol(name) => env.lookup(name),

        Expr::Pair(pair) => eval_list(expr, pair.head(), pair.tail(), env, diagnostics)
            .map_err(|err| add_context(err, expr)),
    })
}

/// Attach the failing expression to arity errors that do not carry one yet
fn add_context(error: Error, expr: &Expr) -> Error {
    match error {
        Error::ArityError {
            expected,
            got,
            expression: None,
        } => Error::arity_error_with_expr(expected, got, expr.to_string()),
        other => other,
    }
}

/// Evaluate a list expression (procedure application)
fn eval_list(
    expr: &Expr,
    head: &Expr,
    operands: &Expr,
    env: &Environment,
    diagnostics: &mut Diagnostics,
) -> Result<Expr, Error> {
    diagnostics.trace(format_args!("list eval: {expr}"));

    // A symbol in operator position is resolved once by lookup; it decides
    // whether this is a special form, a primitive or a closure call.
    let operator = match head {
        Expr::Symbol(name) => env.lookup(name)?,
        other => eval(other, env, diagnostics)?,
    };

    match &operator {
        Expr::Procedure(procedure) => apply(procedure, operands, env, diagnostics),
        // Lists whose head is not a procedure are data and evaluate to themselves
        _ => Ok(expr.clone()),
    }
}

/// Apply a procedure to the operand list of a call made in `env`.
///
/// Special forms get the operands unevaluated. Everything else gets them evaluated
/// left to right in `env`, stopping at the first failure, and then runs in its own
/// captured environment.
pub fn apply(
    procedure: &Procedure,
    operands: &Expr,
    env: &Environment,
    diagnostics: &mut Diagnostics,
) -> Result<Expr, Error> {
    match procedure {
        Procedure::Builtin(builtin) => {
            let op = builtin.op();
            match op.kind {
                OpKind::SpecialForm(form) => {
                    op.arity.validate(operands.len())?;
                    form(operands, env, &builtin.env()?, diagnostics)
                }
                OpKind::Primitive(func) => {
                    let args = eval_args(operands, env, diagnostics)?;
                    op.arity.validate(args.len())?;
                    func(&args, &builtin.env()?, diagnostics)
                }
            }
        }
        Procedure::Closure(closure) => {
            let args = eval_args(operands, env, diagnostics)?;
            apply_closure(closure, &args, diagnostics)
        }
    }
}

/// Helper function to evaluate a list of argument expressions
fn eval_args(
    operands: &Expr,
    env: &Environment,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Expr>, Error> {
    operands
        .iter()
        .map(|arg| eval(arg, env, diagnostics))
        .collect()
}

/// Call a closure: bind the arguments in a new frame under the closure's defining
/// environment, ignoring the caller's, and evaluate the body there.
#[tracing::instrument(level = "trace", skip_all, fields(params = ?closure.params()))]
fn apply_closure(
    closure: &Closure,
    args: &[Expr],
    diagnostics: &mut Diagnostics,
) -> Result<Expr, Error> {
    let closure_env = closure.env()?;
    diagnostics.trace(format_args!("lambda eval: body: {}", closure.body()));

    let frame = Environment::new_child_frame(
        &closure_env,
        closure.params(),
        args,
        &closure_env,
        diagnostics,
    )?;
    let result = eval(closure.body(), &frame, diagnostics)?;

    diagnostics.trace(format_args!(" result: {result}"));
    Ok(result)
}

/// Collect parameter names from a `lambda` parameter list
fn param_names(param_list: &Expr) -> Result<Vec<String>, Error> {
    if !param_list.is_list() {
        return Err(Error::TypeError(format!(
            "lambda parameters must be a list, got {param_list}"
        )));
    }
    param_list
        .iter()
        .map(|param| match param {
            Expr::Symbol(name) => Ok(name.to_string()),
            other => Err(Error::TypeError(format!(
                "lambda parameters must be symbols, got {other}"
            ))),
        })
        .collect()
}

/// Evaluate lambda special form: `(lambda (params...) body)`
///
/// Neither the parameters nor the body are evaluated; the closure captures the
/// environment of the call site. Operands after the body are ignored.
pub(crate) fn eval_lambda(
    operands: &Expr,
    env: &Environment,
    _captured: &Environment,
    _diagnostics: &mut Diagnostics,
) -> Result<Expr, Error> {
    let mut items = operands.iter();
    let (Some(param_list), Some(body)) = (items.next(), items.next()) else {
        return Err(Error::arity_error(2, operands.len()));
    };

    let params = param_names(param_list)?;
    Ok(Expr::procedure(Procedure::closure(
        params,
        body.clone(),
        env.clone(),
    )))
}

/// Evaluate define special form
///
/// `(define name expr)` binds the value of `expr`; `(define (name params...) body)`
/// binds the value of `(lambda (params...) body)` evaluated in the calling environment.
/// The binding always goes to the environment `define` captured, the global frame.
pub(crate) fn eval_define(
    operands: &Expr,
    env: &Environment,
    captured: &Environment,
    diagnostics: &mut Diagnostics,
) -> Result<Expr, Error> {
    let mut items = operands.iter();
    let (Some(target), Some(body)) = (items.next(), items.next()) else {
        return Err(Error::arity_error(2, operands.len()));
    };

    let (name, value) = match target {
        Expr::Symbol(name) => (name.to_string(), eval(body, env, diagnostics)?),
        Expr::Pair(signature) => {
            let Expr::Symbol(name) = signature.head() else {
                return Err(Error::TypeError(format!(
                    "define expects a name, got {}",
                    signature.head()
                )));
            };
            let lambda = Expr::list([sym("lambda"), signature.tail().clone(), body.clone()]);
            (name.to_string(), eval(&lambda, env, diagnostics)?)
        }
        other => {
            return Err(Error::TypeError(format!(
                "define expects a name, got {other}"
            )));
        }
    };

    diagnostics.trace(format_args!("define {name} = {value}"));
    captured.bind(name, value.clone());
    Ok(value)
}

/// Evaluate if special form: `(if test then else)`
///
/// Exactly one branch is evaluated.
pub(crate) fn eval_if(
    operands: &Expr,
    env: &Environment,
    _captured: &Environment,
    diagnostics: &mut Diagnostics,
) -> Result<Expr, Error> {
    let mut items = operands.iter();
    let (Some(test), Some(then_expr), Some(else_expr)) = (items.next(), items.next(), items.next())
    else {
        return Err(Error::arity_error(3, operands.len()));
    };

    if eval(test, env, diagnostics)?.is_truthy() {
        eval(then_expr, env, diagnostics)
    } else {
        eval(else_expr, env, diagnostics)
    }
}

/// `(define not (lambda (x) (if x #f #t)))`
fn not_definition() -> Expr {
    Expr::list([
        sym("define"),
        sym("not"),
        Expr::list([
            sym("lambda"),
            Expr::list([sym("x")]),
            Expr::list([sym("if"), sym("x"), sym(FALSE_SYMBOL), sym(TRUE_SYMBOL)]),
        ]),
    ])
}

/// Create a global environment with all built-ins, using a silent diagnostics sink
pub fn create_global_env() -> Environment {
    create_global_env_with(&mut Diagnostics::new(LogLevel::None))
}

/// Create a global environment with all built-ins.
///
/// Special forms come first, then the literals `#t` and `#f` (bound to themselves),
/// then `not`, defined in the language itself, then the primitives. Every built-in
/// captures the returned environment.
pub fn create_global_env_with(diagnostics: &mut Diagnostics) -> Environment {
    let env = Environment::new();

    let (forms, primitives): (Vec<_>, Vec<_>) = get_builtin_ops()
        .iter()
        .partition(|op| op.is_special_form());

    for op in forms {
        env.bind(op.id, Expr::procedure(Procedure::builtin(op, env.clone())));
    }

    env.bind(TRUE_SYMBOL, sym(TRUE_SYMBOL));
    env.bind(FALSE_SYMBOL, sym(FALSE_SYMBOL));

    if let Err(error) = eval(&not_definition(), &env, diagnostics) {
        diagnostics.report(&error);
    }

    for op in primitives {
        env.bind(op.id, Expr::procedure(Procedure::builtin(op, env.clone())));
    }

    env
}
