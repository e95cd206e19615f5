//! Hierarchical variable namespaces.
//!
//! An executor keeps one root scope and gives each device a child scope for its local tensors.
//! Children are owned by their parent; a child only holds a weak back-reference.

mod variable;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

pub use variable::{VarKind, VarValue, Variable};

/// Named variables plus the child scopes created from this one.
#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<Weak<Scope>>,
    vars: RwLock<HashMap<String, Arc<Variable>>>,
    kids: Mutex<Vec<Arc<Scope>>>,
}

impl Scope {
    /// Creates a root scope.
    pub fn new_root() -> Arc<Scope> {
        Arc::new(Scope::default())
    }

    /// Creates a child scope whose lifetime is tied to `self`.
    pub fn new_child_scope(self: &Arc<Self>) -> Arc<Scope> {
        let child = Arc::new(Scope {
            parent: Some(Arc::downgrade(self)),
            vars: RwLock::new(HashMap::new()),
            kids: Mutex::new(Vec::new()),
        });
        self.kids
            .lock()
            .expect("scope children poisoned")
            .push(Arc::clone(&child));
        child
    }

    /// Returns the variable bound to `name`, creating an empty one if absent.
    pub fn var(&self, name: &str) -> Arc<Variable> {
        if let Some(existing) = self.find_var(name) {
            return existing;
        }
        let mut vars = self.vars.write().expect("scope variables poisoned");
        Arc::clone(
            vars.entry(name.to_string())
                .or_insert_with(|| Arc::new(Variable::new(name))),
        )
    }

    /// Looks `name` up in this scope only.
    pub fn find_var(&self, name: &str) -> Option<Arc<Variable>> {
        self.vars
            .read()
            .expect("scope variables poisoned")
            .get(name)
            .cloned()
    }

    /// Looks `name` up here, then in each ancestor.
    pub fn find_var_recursive(&self, name: &str) -> Option<Arc<Variable>> {
        if let Some(var) = self.find_var(name) {
            return Some(var);
        }
        self.parent()?.find_var_recursive(name)
    }

    /// Parent scope, if this is a child whose parent is still alive.
    pub fn parent(&self) -> Option<Arc<Scope>> {
        self.parent.as_ref()?.upgrade()
    }

    pub fn children(&self) -> Vec<Arc<Scope>> {
        self.kids.lock().expect("scope children poisoned").clone()
    }

    /// Sorted names of the variables declared directly in this scope.
    pub fn local_var_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vars
            .read()
            .expect("scope variables poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Releases every child scope.
    pub fn drop_kids(&self) {
        self.kids.lock().expect("scope children poisoned").clear();
    }
}
