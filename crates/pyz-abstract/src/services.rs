//! The narrow interfaces the matcher consumes from the enclosing
//! analyzer.
//!
//! Only the capabilities actually used are specified here; a full
//! analyzer implements these against its control-flow graph, attribute
//! machinery and interpreter. `crate::host::TableHost` is a
//! self-contained implementation backed by the class attribute tables.

use crate::ctx::Ctx;
use crate::ids::{BindingRef, NodeId, ValueId, VarId};
use pyz_common::Name;

/// Control-flow reachability queries.
pub trait Reachability {
    /// Whether the given bindings are jointly reachable at `node`.
    fn has_combination(&self, ctx: &Ctx, node: NodeId, bindings: &[BindingRef]) -> bool {
        let _ = (ctx, node, bindings);
        true
    }

    /// Whether any binding of `var` is visible at `node`.
    fn is_visible(&self, ctx: &Ctx, node: NodeId, var: VarId) -> bool {
        let _ = node;
        ctx.program.binding_count(var) > 0
    }
}

/// Attribute lookup on values and classes.
pub trait AttributeLookup {
    /// Look up `name` on `value`, returning the attribute variable if
    /// the attribute exists. `valself` carries the value the lookup was
    /// made through, when different from `value` (class-level lookups).
    fn get_attribute(
        &self,
        ctx: &Ctx,
        node: NodeId,
        value: ValueId,
        name: Name,
        valself: Option<ValueId>,
    ) -> Option<VarId>;
}

/// The slice of the interpreter the matcher needs: binding and calling
/// functions while resolving property descriptors.
pub trait Vm {
    /// Bind `func` against `self_var`, producing a bound-method variable.
    fn bind_method(&self, ctx: &Ctx, node: NodeId, func: ValueId, self_var: VarId) -> VarId;

    /// Call every function in `func_var` with no arguments and return
    /// the merged result variable, or `None` if nothing was callable.
    fn call_function(&self, ctx: &Ctx, node: NodeId, func_var: VarId) -> Option<VarId>;
}

/// Everything the matcher needs from its embedder.
pub trait Host: Reachability + AttributeLookup + Vm {}

impl<T: Reachability + AttributeLookup + Vm> Host for T {}
