//! Chained scope frames.
//!
//! An [`Environment`] is a cheap, reference-counted handle to one frame. Each frame
//! owns its bindings and holds an optional handle to its parent; the global frame
//! has none. Frames stay alive as long as a closure, a pending evaluation or a child
//! frame refers to them.
//!
//! Built-in procedures capture the global frame while the global frame stores
//! them, so the two form a reference cycle. [`Environment::break_procedure_references`]
//! breaks it explicitly at interpreter teardown.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::Expr;
use crate::diagnostics::Diagnostics;
use crate::evaluator;

/// Environment for variable bindings
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

struct Frame {
    bindings: RefCell<HashMap<String, Expr>>,
    parent: Option<Environment>,
}

impl Environment {
    /// Create a root frame with no parent
    pub fn new() -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    /// Create an empty frame whose parent is `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        }))
    }

    /// Insert or overwrite a binding in this frame only.
    pub fn bind(&self, name: impl Into<String>, value: Expr) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Value bound to `name` in the nearest enclosing frame.
    pub fn lookup(&self, name: &str) -> Result<Expr, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
    }

    pub fn get(&self, name: &str) -> Option<Expr> {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if let Some(value) = env.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            frame = env.0.parent.as_ref();
        }
        None
    }

    /// Whether `name` is bound in this frame itself, ignoring parents
    pub fn is_bound_locally(&self, name: &str) -> bool {
        self.0.bindings.borrow().contains_key(name)
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// The outermost frame of this chain
    pub fn root(&self) -> &Environment {
        let mut env = self;
        while let Some(parent) = env.parent() {
            env = parent;
        }
        env
    }

    /// Two handles denote the same frame
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Build the frame for a closure call.
    ///
    /// Each argument expression is evaluated in `eval_context`, left to right, and
    /// bound to the parameter at the same position in a fresh frame under `parent`.
    /// Fewer arguments than parameters is an arity error; surplus arguments are
    /// ignored and never evaluated.
    pub fn new_child_frame(
        parent: &Environment,
        params: &[String],
        args: &[Expr],
        eval_context: &Environment,
        diagnostics: &mut Diagnostics,
    ) -> Result<Environment, Error> {
        if args.len() < params.len() {
            return Err(Error::arity_error(params.len(), args.len()));
        }

        let frame = Environment::with_parent(parent);
        for (param, arg) in params.iter().zip(args) {
            let value = evaluator::eval(arg, eval_context, diagnostics)?;
            diagnostics.trace(format_args!("environment binding {param} to {value}"));
            frame.bind(param.clone(), value);
        }
        Ok(frame)
    }

    /// Clear the captured environment of every procedure bound directly in this frame.
    ///
    /// Called exactly once, on the global frame, when the interpreter shuts down.
    /// Procedures released this way fail if they are ever applied again.
    pub fn break_procedure_references(&self) {
        // Collect first: releasing a captured frame may drop values while we
        // would otherwise still hold the bindings borrow.
        let procedures: Vec<Expr> = self
            .0
            .bindings
            .borrow()
            .values()
            .filter(|value| value.is_procedure())
            .cloned()
            .collect();

        for value in &procedures {
            if let Some(procedure) = value.as_procedure() {
                procedure.clear_env();
            }
        }
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Expr)> {
        let mut bindings = HashMap::new();

        // Start with parent bindings (so they can be overridden by local bindings)
        if let Some(parent) = self.parent() {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    // Names only: values may refer back to this frame.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("parent", &self.0.parent)
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};
    use crate::evaluator::create_global_env;

    #[test]
    fn test_bind_and_lookup_walks_chain() {
        let global = Environment::new();
        global.bind("x", val(1));
        global.bind("y", val(2));

        let child = Environment::with_parent(&global);
        child.bind("x", val(10));

        assert_eq!(child.lookup("x").unwrap(), val(10));
        assert_eq!(child.lookup("y").unwrap(), val(2));
        assert_eq!(global.lookup("x").unwrap(), val(1));
        assert!(matches!(
            child.lookup("z"),
            Err(Error::UnboundVariable(name)) if name == "z"
        ));
    }

    #[test]
    fn test_bind_targets_this_frame_only() {
        let global = Environment::new();
        let child = Environment::with_parent(&global);
        child.bind("local", val(1));
        assert!(child.is_bound_locally("local"));
        assert!(global.get("local").is_none());

        // Later parent bindings are visible to existing children
        global.bind("late", val(7));
        assert_eq!(child.lookup("late").unwrap(), val(7));

        // Last bind wins
        global.bind("late", val(8));
        assert_eq!(child.lookup("late").unwrap(), val(8));
    }

    #[test]
    fn test_new_child_frame_binds_in_order() {
        let global = create_global_env();
        let mut diagnostics = Diagnostics::default();
        let params = vec!["a".to_owned(), "b".to_owned()];
        let args = vec![val(1), val(2), val(3)];

        let frame =
            Environment::new_child_frame(&global, &params, &args, &global, &mut diagnostics)
                .unwrap();
        assert_eq!(frame.lookup("a").unwrap(), val(1));
        assert_eq!(frame.lookup("b").unwrap(), val(2));
        assert!(frame.parent().unwrap().ptr_eq(&global));
        assert!(frame.root().ptr_eq(&global));
    }

    #[test]
    fn test_new_child_frame_evaluates_in_context() {
        let global = create_global_env();
        let context = Environment::with_parent(&global);
        context.bind("v", val(42));
        let mut diagnostics = Diagnostics::default();

        let frame = Environment::new_child_frame(
            &global,
            &["p".to_owned()],
            &[val(vec![sym("+"), sym("v"), val(1)])],
            &context,
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(frame.lookup("p").unwrap(), val(43));
        // The new frame hangs off `parent`, not the evaluation context
        assert!(frame.lookup("v").is_err());
    }

    #[test]
    fn test_new_child_frame_too_few_arguments() {
        let global = create_global_env();
        let mut diagnostics = Diagnostics::default();
        let result = Environment::new_child_frame(
            &global,
            &["a".to_owned(), "b".to_owned()],
            &[val(1)],
            &global,
            &mut diagnostics,
        );
        assert!(matches!(
            result,
            Err(Error::ArityError {
                expected: 2,
                got: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_break_procedure_references_releases_global_cycle() {
        let global = create_global_env();
        let weak = Rc::downgrade(&global.0);
        global.break_procedure_references();
        drop(global);
        assert!(weak.upgrade().is_none(), "global frame should be reclaimed");
    }

    #[test]
    fn test_global_frame_leaks_without_teardown() {
        let global = create_global_env();
        let weak = Rc::downgrade(&global.0);
        drop(global);
        // The primitives still hold the frame
        let leaked = weak.upgrade();
        assert!(leaked.is_some());
        if let Some(frame) = leaked {
            Environment(frame).break_procedure_references();
        }
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_get_all_bindings_prefers_inner_frames() {
        let global = Environment::new();
        global.bind("a", val(1));
        global.bind("b", val(2));
        let child = Environment::with_parent(&global);
        child.bind("a", val(3));

        let all = child.get_all_bindings();
        assert_eq!(
            all,
            vec![("a".to_owned(), val(3)), ("b".to_owned(), val(2))]
        );
    }
}
