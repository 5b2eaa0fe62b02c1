//! Fixture builders shared by the analyzer's test suites.
//!
//! These wrap the arena APIs into the handful of shapes tests build over
//! and over: plain classes, generic classes, protocols, methods with
//! annotated signatures, parameterized applications, and typed dicts.

use crate::class::{ClassDef, ClassFlags, ClassKind, TypedDictProps};
use crate::convert;
use crate::ctx::Ctx;
use crate::ids::{ClassId, ValueId, VarId};
use crate::signature::Signature;
use crate::value::{FunctionValue, InstanceValue, UnionValue, Value};
use indexmap::{IndexMap, IndexSet};
use pyz_common::Name;

/// Define a plain class.
pub fn class(ctx: &Ctx, full_name: &str, parents: &[ClassId]) -> ClassId {
    ctx.classes
        .define(ClassDef::new(ctx.intern(full_name)), parents)
}

/// Define a generic class with the given short parameter names.
pub fn generic_class(
    ctx: &Ctx,
    full_name: &str,
    parents: &[ClassId],
    params: &[&str],
) -> ClassId {
    let name = ctx.intern(full_name);
    let mut def = ClassDef::new(name);
    for short in params {
        def.template
            .push(ctx.new_type_param(name, ctx.intern(short), None, Vec::new()));
    }
    ctx.classes.define(def, parents)
}

/// Define a class with attributes (methods or plain values).
pub fn class_with_attrs(
    ctx: &Ctx,
    full_name: &str,
    parents: &[ClassId],
    attrs: &[(&str, ValueId)],
) -> ClassId {
    let mut def = ClassDef::new(ctx.intern(full_name));
    for &(attr_name, value) in attrs {
        def.own_attributes
            .insert(ctx.intern(attr_name), var_of(ctx, value));
    }
    ctx.classes.define(def, parents)
}

/// Define a protocol whose required attributes are `attrs`.
pub fn protocol(ctx: &Ctx, full_name: &str, attrs: &[(&str, ValueId)]) -> ClassId {
    let mut def = ClassDef::new(ctx.intern(full_name));
    def.flags = ClassFlags::PROTOCOL | ClassFlags::PROTOCOL_BASE;
    for &(attr_name, value) in attrs {
        let name = ctx.intern(attr_name);
        def.protocol_attributes.insert(name);
        def.own_attributes.insert(name, var_of(ctx, value));
    }
    ctx.classes.define(def, &[ctx.primitives.protocol])
}

/// A function value with one signature: `name(params) -> ret`.
/// Parameters with `None` annotations are unannotated.
pub fn method(
    ctx: &Ctx,
    name: &str,
    params: &[(&str, Option<ValueId>)],
    ret: Option<ValueId>,
) -> ValueId {
    let func_name = ctx.intern(name);
    let mut sig = Signature::new(func_name);
    for &(param_name, annot) in params {
        let param = ctx.intern(param_name);
        sig.param_names.push(param);
        if let Some(annot) = annot {
            sig.annotations.insert(param, annot);
        }
    }
    sig.ret = ret;
    let sig_id = ctx.sigs.alloc(sig);
    ctx.values.alloc(Value::Function(Box::new(FunctionValue {
        name: func_name,
        sigs: vec![sig_id],
    })))
}

/// A parameterized application `base[args]`, positionally matching the
/// base template.
pub fn parameterized(ctx: &Ctx, base: ClassId, args: &[ValueId]) -> ClassId {
    let def = ctx.classes.get(base);
    debug_assert_eq!(def.template.len(), args.len());
    let mut params = IndexMap::new();
    for (&template_param, &arg) in def.template.iter().zip(args) {
        let template_value = ctx.values.get(template_param);
        let Value::TypeParameter(p) = &*template_value else {
            continue;
        };
        params.insert(p.name, arg);
    }
    ctx.classes.parameterize(base, params)
}

/// `list[element]` as a formal type, where `element` is a class.
pub fn list_of(ctx: &Ctx, element: ClassId) -> ClassId {
    let element_value = ctx.values.alloc(Value::Class(element));
    parameterized(ctx, ctx.primitives.list, &[element_value])
}

/// Define a typed dict class.
pub fn typed_dict(
    ctx: &Ctx,
    full_name: &str,
    fields: &[(&str, ValueId)],
    required: &[&str],
) -> ClassId {
    let mut field_map = IndexMap::new();
    for &(key, typ) in fields {
        field_map.insert(key.to_string(), typ);
    }
    let required_set: IndexSet<String> = required.iter().map(|k| k.to_string()).collect();
    let mut def = ClassDef::new(ctx.intern(full_name));
    def.kind = ClassKind::TypedDict(Box::new(TypedDictProps {
        base: ctx.primitives.dict,
        fields: field_map,
        required: required_set,
    }));
    ctx.classes.define(def, &[ctx.primitives.dict])
}

/// A plain instance of `cls`.
pub fn instance(ctx: &Ctx, cls: ClassId) -> ValueId {
    convert::instance_of(ctx, cls)
}

/// An instance of `cls` with instance parameters, keyed by full
/// parameter name.
pub fn instance_with_params(ctx: &Ctx, cls: ClassId, params: &[(Name, &[ValueId])]) -> ValueId {
    let mut inst = InstanceValue::new(cls);
    for &(full_name, values) in params {
        inst.type_params
            .insert(full_name, ctx.program.new_variable_with(values, ctx.root_node));
    }
    ctx.values.alloc(Value::Instance(Box::new(inst)))
}

/// An instance of `list[element_cls]`.
pub fn list_instance(ctx: &Ctx, element_cls: ClassId) -> ValueId {
    let full = ctx.full_param_name(ctx.intern("builtins.list"), ctx.well.t);
    let element = convert::instance_of(ctx, element_cls);
    instance_with_params(ctx, ctx.primitives.list, &[(full, &[element])])
}

/// A union value over `options`.
pub fn union(ctx: &Ctx, options: &[ValueId]) -> ValueId {
    ctx.values.alloc(Value::Union(Box::new(UnionValue {
        options: options.to_vec(),
        recursive: false,
    })))
}

/// A variable holding just `value`, at the root node.
pub fn var_of(ctx: &Ctx, value: ValueId) -> VarId {
    ctx.program.new_variable_with(&[value], ctx.root_node)
}

/// The class `cls` used as a value.
pub fn class_value(ctx: &Ctx, cls: ClassId) -> ValueId {
    ctx.values.alloc(Value::Class(cls))
}
