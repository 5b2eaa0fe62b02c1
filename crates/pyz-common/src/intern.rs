//! Interning for fully qualified names.
//!
//! Every class, module, function and type parameter in the analyzer is
//! identified by its fully qualified dotted name (`builtins.int`,
//! `mymod.MyClass.T`). Names are interned once and compared as `u32` ids
//! afterwards; interned strings live for the lifetime of the process.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::cell::RefCell;

/// Unique identifier for an interned fully qualified name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Name(pub u32);

/// String interner for fully qualified names.
///
/// Interning goes through `&self` so the interner can be shared freely by
/// the arenas and services that need to mint names mid-analysis.
pub struct NameInterner {
    map: RefCell<FxHashMap<&'static str, Name>>,
    names: RefCell<Vec<&'static str>>,
}

impl NameInterner {
    pub fn new() -> Self {
        NameInterner {
            map: RefCell::new(FxHashMap::default()),
            names: RefCell::new(Vec::new()),
        }
    }

    /// Intern a name, returning its id. Idempotent.
    pub fn intern(&self, text: &str) -> Name {
        if let Some(&name) = self.map.borrow().get(text) {
            return name;
        }
        let leaked: &'static str = Box::leak(text.to_owned().into_boxed_str());
        let name = Name(self.names.borrow().len() as u32);
        self.names.borrow_mut().push(leaked);
        self.map.borrow_mut().insert(leaked, name);
        name
    }

    /// Resolve an id back to its text.
    pub fn resolve(&self, name: Name) -> &'static str {
        self.names.borrow()[name.0 as usize]
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.names.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.borrow().is_empty()
    }
}
