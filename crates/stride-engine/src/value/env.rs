//! Lexical environments.
//!
//! Bindings are name-addressed at runtime so that frame evaluators can run
//! arbitrary expressions against a live scope.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use super::Value;

/// Shared handle to an environment record.
pub type EnvRef = Rc<RefCell<Env>>;

/// One binding in an environment.
#[derive(Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

/// An environment record: ordered bindings plus a parent link.
pub struct Env {
    pub vars: IndexMap<SmolStr, Binding>,
    pub parent: Option<EnvRef>,
}

impl Env {
    /// Creates a root environment.
    #[must_use]
    pub fn root() -> EnvRef {
        Rc::new(RefCell::new(Env {
            vars: IndexMap::new(),
            parent: None,
        }))
    }

    /// Creates a child environment.
    #[must_use]
    pub fn child(parent: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Env {
            vars: IndexMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Declares (or redeclares) a binding in this exact environment.
    pub fn declare(env: &EnvRef, name: SmolStr, value: Value, mutable: bool) {
        env.borrow_mut().vars.insert(name, Binding { value, mutable });
    }

    /// Resolves a name through the chain.
    #[must_use]
    pub fn lookup(env: &EnvRef, name: &str) -> Option<Value> {
        let mut cursor = Rc::clone(env);
        loop {
            if let Some(binding) = cursor.borrow().vars.get(name) {
                return Some(binding.value.clone());
            }
            let parent = cursor.borrow().parent.clone();
            match parent {
                Some(next) => cursor = next,
                None => return None,
            }
        }
    }

    /// Assigns through the chain. Returns `None` when the name is unbound,
    /// `Some(false)` when the binding is immutable.
    #[must_use]
    pub fn assign(env: &EnvRef, name: &str, value: Value) -> Option<bool> {
        let mut cursor = Rc::clone(env);
        loop {
            {
                let mut borrowed = cursor.borrow_mut();
                if let Some(binding) = borrowed.vars.get_mut(name) {
                    if !binding.mutable {
                        return Some(false);
                    }
                    binding.value = value;
                    return Some(true);
                }
            }
            let parent = cursor.borrow().parent.clone();
            match parent {
                Some(next) => cursor = next,
                None => return None,
            }
        }
    }
}
