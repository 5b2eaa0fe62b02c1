//! Program variables, bindings and views.
//!
//! A `Variable` collects every value an expression may have at a
//! program point, one `Binding` per possibility. A `View` fixes one
//! binding per variable: a specific world in which matching is
//! evaluated. The `Program` owns all variables and mints control-flow
//! nodes.

use crate::ids::{BindingRef, NodeId, ValueId, VarId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};

/// One possible value of a variable, with provenance.
#[derive(Clone, Debug)]
pub struct Binding {
    pub value: ValueId,
    /// The bindings this one was derived from.
    pub sources: SmallVec<[BindingRef; 2]>,
    /// The node at which this binding was created.
    pub node: NodeId,
}

/// A program-wide variable: a set of bindings.
#[derive(Clone, Debug, Default)]
pub struct Variable {
    pub bindings: Vec<Binding>,
}

/// Owner of all variables and control-flow nodes.
///
/// All operations go through `&self`; variables grow monotonically
/// (bindings are added and pasted, never removed).
pub struct Program {
    vars: RefCell<Vec<Variable>>,
    next_node: Cell<u32>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            vars: RefCell::new(Vec::new()),
            next_node: Cell::new(0),
        }
    }

    pub fn new_node(&self) -> NodeId {
        let id = NodeId(self.next_node.get());
        self.next_node.set(id.0 + 1);
        id
    }

    /// Create a fresh variable with no bindings.
    pub fn new_variable(&self) -> VarId {
        let mut vars = self.vars.borrow_mut();
        let id = VarId(vars.len() as u32);
        vars.push(Variable::default());
        id
    }

    /// Create a variable holding the given values, without provenance.
    pub fn new_variable_with(&self, values: &[ValueId], node: NodeId) -> VarId {
        let var = self.new_variable();
        for &value in values {
            self.add_binding(var, value, &[], node);
        }
        var
    }

    /// Add a binding unless an identical value is already bound.
    pub fn add_binding(&self, var: VarId, value: ValueId, sources: &[BindingRef], node: NodeId) {
        let mut vars = self.vars.borrow_mut();
        let variable = &mut vars[var.0 as usize];
        if variable.bindings.iter().any(|b| b.value == value) {
            return;
        }
        variable.bindings.push(Binding {
            value,
            sources: SmallVec::from_slice(sources),
            node,
        });
    }

    /// Copy all of `src`'s bindings into `dst`.
    pub fn paste_variable(&self, dst: VarId, src: VarId, node: NodeId) {
        let src_bindings = self.bindings(src);
        for (i, binding) in src_bindings.iter().enumerate() {
            self.add_binding(dst, binding.value, &[BindingRef::new(src, i)], node);
        }
    }

    /// Copy one binding into `dst`.
    pub fn paste_binding(&self, dst: VarId, binding: BindingRef, node: NodeId) {
        let b = self.binding(binding);
        self.add_binding(dst, b.value, &[binding], node);
    }

    /// A new variable with the same values, sourced from the old bindings.
    pub fn assign_to_new_variable(&self, src: VarId, node: NodeId) -> VarId {
        let var = self.new_variable();
        self.paste_variable(var, src, node);
        var
    }

    pub fn bindings(&self, var: VarId) -> Vec<Binding> {
        self.vars.borrow()[var.0 as usize].bindings.clone()
    }

    pub fn binding(&self, binding: BindingRef) -> Binding {
        self.vars.borrow()[binding.var.0 as usize].bindings[binding.index as usize].clone()
    }

    pub fn binding_count(&self, var: VarId) -> usize {
        self.vars.borrow()[var.0 as usize].bindings.len()
    }

    /// The values of all bindings, in binding order.
    pub fn data(&self, var: VarId) -> Vec<ValueId> {
        self.vars.borrow()[var.0 as usize]
            .bindings
            .iter()
            .map(|b| b.value)
            .collect()
    }

    pub fn var_count(&self) -> usize {
        self.vars.borrow().len()
    }
}

/// A choice of exactly one binding per variable in scope.
#[derive(Clone, Debug, Default)]
pub struct View {
    choices: FxHashMap<VarId, u32>,
}

impl View {
    pub fn new() -> Self {
        View::default()
    }

    pub fn get(&self, var: VarId) -> Option<BindingRef> {
        self.choices.get(&var).map(|&index| BindingRef { var, index })
    }

    pub fn set(&mut self, var: VarId, index: usize) {
        self.choices.insert(var, index as u32);
    }

    pub fn contains(&self, var: VarId) -> bool {
        self.choices.contains_key(&var)
    }

    /// Copy `other`'s entries in; on conflict, `other` wins. Used to
    /// overlay an outer view onto a freshly enumerated inner one.
    pub fn update_from(&mut self, other: &View) {
        for (&var, &index) in &other.choices {
            self.choices.insert(var, index);
        }
    }

    /// The chosen binding for `var`, falling back to a sole binding when
    /// the view does not fix the variable.
    pub fn binding_for(&self, program: &Program, var: VarId) -> Option<BindingRef> {
        if let Some(b) = self.get(var) {
            return Some(b);
        }
        if program.binding_count(var) == 1 {
            return Some(BindingRef::new(var, 0));
        }
        None
    }

    pub fn bindings(&self) -> impl Iterator<Item = BindingRef> + '_ {
        self.choices
            .iter()
            .map(|(&var, &index)| BindingRef { var, index })
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}
