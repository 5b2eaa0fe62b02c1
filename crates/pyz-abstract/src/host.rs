//! A self-contained host backed by the class attribute tables.
//!
//! `TableHost` implements the analyzer services against the data already
//! in the arenas: attribute lookup walks the MRO and the member tables,
//! method binding wraps functions, and calling a function resolves to
//! its declared return annotation. A full analyzer substitutes its own
//! implementations; this one is enough for library consumers and tests.

use crate::class::MroEntry;
use crate::convert;
use crate::ctx::Ctx;
use crate::ids::{NodeId, ValueId, VarId};
use crate::services::{AttributeLookup, Reachability, Vm};
use crate::signature::get_signatures;
use crate::value::{BoundMethodValue, Value};
use pyz_common::Name;

/// Host implementation backed by class and module member tables.
#[derive(Clone, Copy, Debug, Default)]
pub struct TableHost;

impl Reachability for TableHost {}

impl AttributeLookup for TableHost {
    fn get_attribute(
        &self,
        ctx: &Ctx,
        node: NodeId,
        value: ValueId,
        name: Name,
        _valself: Option<ValueId>,
    ) -> Option<VarId> {
        match &*ctx.values.get(value) {
            Value::Class(cls) => lookup_on_class(ctx, node, *cls, name),
            Value::Instance(instance) => lookup_on_class(ctx, node, instance.cls, name),
            Value::Tuple(t) => lookup_on_class(ctx, node, t.cls, name),
            Value::Dict(d) => lookup_on_class(ctx, node, d.cls, name),
            Value::Module(module) => module.members.get(&name).copied(),
            Value::Unknown | Value::Unsolvable => {
                Some(convert::to_variable(ctx, ctx.primitives.unsolvable, node))
            }
            _ => None,
        }
    }
}

impl Vm for TableHost {
    fn bind_method(&self, ctx: &Ctx, node: NodeId, func: ValueId, self_var: VarId) -> VarId {
        let name = match &*ctx.values.get(func) {
            Value::Function(f) => f.name,
            Value::NativeFunction(f) => f.name,
            _ => ctx.intern("<bound>"),
        };
        let bound = ctx.values.alloc(Value::BoundMethod(Box::new(BoundMethodValue {
            name,
            underlying: func,
            callself: self_var,
        })));
        convert::to_variable(ctx, bound, node)
    }

    fn call_function(&self, ctx: &Ctx, node: NodeId, func_var: VarId) -> Option<VarId> {
        let result = ctx.program.new_variable();
        let mut called = false;
        for func in ctx.program.data(func_var) {
            let sigs = get_signatures(ctx, func);
            if sigs.is_empty() {
                continue;
            }
            called = true;
            for sig in sigs {
                let ret = ctx
                    .sigs
                    .get(sig)
                    .ret
                    .unwrap_or(ctx.primitives.unsolvable);
                let instance = convert::instantiate(ctx, ret, None, node);
                ctx.program.paste_variable(result, instance, node);
            }
        }
        if called { Some(result) } else { None }
    }
}

fn lookup_on_class(ctx: &Ctx, _node: NodeId, cls: crate::ids::ClassId, name: Name) -> Option<VarId> {
    for entry in ctx.classes.get(cls).mro.clone() {
        match entry {
            MroEntry::Class(mro_cls) => {
                let base = ctx.classes.base_cls(mro_cls);
                if let Some(&var) = ctx.classes.get(base).own_attributes.get(&name) {
                    return Some(var);
                }
            }
            MroEntry::Ambiguous => {
                return Some(convert::to_variable(
                    ctx,
                    ctx.primitives.unsolvable,
                    ctx.root_node,
                ));
            }
            MroEntry::Empty => continue,
        }
    }
    None
}
