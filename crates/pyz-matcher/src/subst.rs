//! Substitutions: the result of one-way unification.
//!
//! A substitution maps type-parameter full names to variables collecting
//! their candidate values. Lookups resolve renamed parameters through a
//! union-find alias map shared by all copies of a substitution (renames
//! are global facts about the classes involved, not per-snapshot state).
//!
//! Substitutions are copy-on-write at call boundaries: a function that
//! updates one returns a new one, and callers never observe mutation of
//! their input. The variables *inside* a substitution are shared and
//! grow by pasting, like every other variable in the program.

use ena::unify::{InPlaceUnificationTable, UnifyKey};
use indexmap::IndexMap;
use pyz_abstract::{Ctx, NodeId, VarId};
use pyz_common::Name;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct AliasKey(u32);

impl UnifyKey for AliasKey {
    type Value = ();

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(index: u32) -> Self {
        AliasKey(index)
    }

    fn tag() -> &'static str {
        "AliasKey"
    }
}

/// Union-find over type-parameter full names, tracking renamed
/// parameters. Cheap to share; all lookups go through `&self`.
pub struct AliasMap {
    table: RefCell<InPlaceUnificationTable<AliasKey>>,
    keys: RefCell<FxHashMap<Name, AliasKey>>,
    reps: RefCell<FxHashMap<AliasKey, Name>>,
}

impl Default for AliasMap {
    fn default() -> Self {
        AliasMap::new()
    }
}

impl AliasMap {
    pub fn new() -> Self {
        AliasMap {
            table: RefCell::new(InPlaceUnificationTable::new()),
            keys: RefCell::new(FxHashMap::default()),
            reps: RefCell::new(FxHashMap::default()),
        }
    }

    fn key(&self, name: Name) -> AliasKey {
        if let Some(&key) = self.keys.borrow().get(&name) {
            return key;
        }
        let key = self.table.borrow_mut().new_key(());
        self.keys.borrow_mut().insert(name, key);
        self.reps.borrow_mut().insert(key, name);
        key
    }

    /// Record that `a` and `b` name the same parameter. The first name's
    /// representative wins for the merged set.
    pub fn alias(&self, a: Name, b: Name) {
        let ka = self.key(a);
        let kb = self.key(b);
        let mut table = self.table.borrow_mut();
        let old_root = table.find(ka);
        let rep = self.reps.borrow().get(&old_root).copied().unwrap_or(a);
        table.union(ka, kb);
        let root = table.find(ka);
        self.reps.borrow_mut().insert(root, rep);
    }

    /// The representative name for `name`.
    pub fn canonical(&self, name: Name) -> Name {
        let Some(&key) = self.keys.borrow().get(&name) else {
            return name;
        };
        let root = self.table.borrow_mut().find(key);
        self.reps.borrow().get(&root).copied().unwrap_or(name)
    }
}

/// A substitution: type-parameter full name -> variable of candidates.
#[derive(Clone)]
pub struct Subst {
    entries: IndexMap<Name, VarId>,
    aliases: Rc<AliasMap>,
}

impl Subst {
    pub fn new() -> Self {
        Subst {
            entries: IndexMap::new(),
            aliases: Rc::new(AliasMap::new()),
        }
    }

    pub fn with_aliases(aliases: Rc<AliasMap>) -> Self {
        Subst {
            entries: IndexMap::new(),
            aliases,
        }
    }

    pub fn aliases(&self) -> &Rc<AliasMap> {
        &self.aliases
    }

    pub fn get(&self, name: Name) -> Option<VarId> {
        self.entries.get(&self.aliases.canonical(name)).copied()
    }

    pub fn contains(&self, name: Name) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: Name, var: VarId) {
        self.entries.insert(self.aliases.canonical(name), var);
    }

    /// Iterate over (canonical name, variable) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Name, VarId)> + '_ {
        self.entries.iter().map(|(&name, &var)| (name, var))
    }

    pub fn names(&self) -> impl Iterator<Item = Name> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Subst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

/// Merge substitutions: copy `base`, then install or paste every entry
/// of every incoming substitution (set union over bindings).
pub fn merge_substs(ctx: &Ctx, node: NodeId, base: &Subst, new_substs: &[Subst]) -> Subst {
    let mut subst = base.clone();
    for new_subst in new_substs {
        for (name, var) in new_subst.iter() {
            match subst.get(name) {
                None => subst.insert(name, var),
                Some(existing) if existing != var => {
                    ctx.program.paste_variable(existing, var, node);
                }
                Some(_) => {}
            }
        }
    }
    subst
}
