//! Function signatures.
//!
//! A signature is the formal interface of one function overload:
//! positional parameter names, per-name annotations, defaults, and an
//! optional return annotation. The matcher consumes signatures when
//! matching function values against callable types and when matching
//! protocol methods.

use crate::ids::{SigId, ValueId};
use indexmap::{IndexMap, IndexSet};
use pyz_common::Name;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// A function or method signature.
#[derive(Clone, Debug, Serialize)]
pub struct Signature {
    pub name: Name,
    /// Positional parameter names, in declaration order.
    pub param_names: Vec<Name>,
    /// Annotations per parameter name. Unannotated parameters are
    /// simply absent (treated as "any" by consumers).
    pub annotations: IndexMap<Name, ValueId>,
    /// Return annotation, when present.
    pub ret: Option<ValueId>,
    /// Parameters that carry a default value.
    pub defaults: IndexSet<Name>,
    pub varargs_name: Option<Name>,
    pub kwargs_name: Option<Name>,
}

impl Signature {
    pub fn new(name: Name) -> Self {
        Signature {
            name,
            param_names: Vec::new(),
            annotations: IndexMap::new(),
            ret: None,
            defaults: IndexSet::new(),
            varargs_name: None,
            kwargs_name: None,
        }
    }

    /// Number of parameters a call must supply.
    pub fn mandatory_param_count(&self) -> usize {
        self.param_names
            .iter()
            .filter(|name| !self.defaults.contains(*name))
            .count()
    }

    /// Maximum number of positional arguments, `None` when unbounded
    /// (the signature has `*args`).
    pub fn maximum_param_count(&self) -> Option<usize> {
        if self.varargs_name.is_some() {
            None
        } else {
            Some(self.param_names.len())
        }
    }

    /// The signature with its first positional parameter removed
    /// (dropping `self` when converting methods to callables).
    pub fn drop_first_parameter(&self) -> Signature {
        let mut sig = self.clone();
        if !sig.param_names.is_empty() {
            let first = sig.param_names.remove(0);
            sig.annotations.shift_remove(&first);
            sig.defaults.shift_remove(&first);
        }
        sig
    }
}

/// All signatures of a function-like value, as seen by a caller.
///
/// Bound methods and classmethods report their underlying signatures
/// with the receiver parameter dropped; static methods report them
/// unchanged; overloaded functions report one signature per overload.
pub fn get_signatures(ctx: &crate::ctx::Ctx, func: ValueId) -> Vec<SigId> {
    use crate::value::Value;
    match &*ctx.values.get(func) {
        Value::Function(f) => f.sigs.clone(),
        Value::NativeFunction(f) => f.sig.into_iter().collect(),
        Value::BoundMethod(bm) => get_signatures(ctx, bm.underlying)
            .into_iter()
            .map(|sig| ctx.sigs.alloc(ctx.sigs.get(sig).drop_first_parameter()))
            .collect(),
        Value::ClassMethod(wrapper) => get_signatures(ctx, wrapper.method)
            .into_iter()
            .map(|sig| ctx.sigs.alloc(ctx.sigs.get(sig).drop_first_parameter()))
            .collect(),
        Value::StaticMethod(wrapper) => get_signatures(ctx, wrapper.method),
        Value::Property(p) => get_signatures(ctx, p.fget),
        _ => Vec::new(),
    }
}

/// Whether a value is function-like (has signatures to match).
pub fn is_callable(ctx: &crate::ctx::Ctx, value: ValueId) -> bool {
    use crate::value::Value;
    matches!(
        &*ctx.values.get(value),
        Value::Function(_)
            | Value::NativeFunction(_)
            | Value::BoundMethod(_)
            | Value::ClassMethod(_)
            | Value::StaticMethod(_)
    )
}

/// A synthesized method value with the given unannotated parameters.
/// Used for sequence-protocol emulation (`__iter__` via `__getitem__`).
pub fn dummy_method(ctx: &crate::ctx::Ctx, name: &str, params: &[&str]) -> ValueId {
    use crate::value::{FunctionValue, Value};
    let mut sig = Signature::new(ctx.intern(name));
    for param in params {
        sig.param_names.push(ctx.intern(param));
    }
    let sig_id = ctx.sigs.alloc(sig);
    ctx.values.alloc(Value::Function(Box::new(FunctionValue {
        name: ctx.intern(name),
        sigs: vec![sig_id],
    })))
}

/// Append-only arena of signatures.
pub struct Sigs {
    list: RefCell<Vec<Rc<Signature>>>,
}

impl Sigs {
    pub fn new() -> Self {
        Sigs {
            list: RefCell::new(Vec::new()),
        }
    }

    pub fn alloc(&self, sig: Signature) -> SigId {
        let mut list = self.list.borrow_mut();
        let id = SigId(list.len() as u32);
        list.push(Rc::new(sig));
        id
    }

    pub fn get(&self, id: SigId) -> Rc<Signature> {
        Rc::clone(&self.list.borrow()[id.0 as usize])
    }

    pub fn len(&self) -> usize {
        self.list.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.borrow().is_empty()
    }
}
