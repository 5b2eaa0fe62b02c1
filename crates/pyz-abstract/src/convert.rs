//! Conversion between classes, values and variables.
//!
//! This is the Convert service consumed by the matcher: building
//! instances of formal types, merging values into unions, collapsing
//! concrete values, and converting signatures to callable classes.
//! Everything here is a free function over `&Ctx`.

use crate::class::ClassKind;
use crate::ctx::Ctx;
use crate::ids::{ClassId, NodeId, ValueId, VarId};
use crate::signature::Signature;
use crate::value::{DictValue, InstanceValue, ParamOwner, PyVal, TupleValue, Value};
use indexmap::IndexMap;
use pyz_common::limits;
use tracing::warn;

/// A variable holding just `value`.
pub fn to_variable(ctx: &Ctx, value: ValueId, node: NodeId) -> VarId {
    ctx.program.new_variable_with(&[value], node)
}

/// A plain instance of `cls` with no instance parameters.
pub fn instance_of(ctx: &Ctx, cls: ClassId) -> ValueId {
    ctx.values
        .alloc(Value::Instance(Box::new(InstanceValue::new(cls))))
}

/// Instantiate a formal type into a variable of instances.
///
/// `container` threads the owner for embedded type parameters: a type
/// parameter instantiated with a container becomes a
/// `TypeParameterInstance` attached to it; without one it widens to its
/// constraints, bound, or "any".
pub fn instantiate(ctx: &Ctx, value: ValueId, container: Option<&ParamOwner>, node: NodeId) -> VarId {
    instantiate_inner(ctx, value, container, node, limits::MAX_INSTANTIATE_DEPTH)
}

fn instantiate_inner(
    ctx: &Ctx,
    value: ValueId,
    container: Option<&ParamOwner>,
    node: NodeId,
    depth: usize,
) -> VarId {
    if depth == 0 {
        warn!("instantiation depth exceeded");
        return to_variable(ctx, ctx.primitives.unsolvable, node);
    }
    match &*ctx.values.get(value) {
        Value::Class(cls) => {
            let instance = class_instance(ctx, *cls, container, node, depth - 1);
            to_variable(ctx, instance, node)
        }
        Value::TypeParameter(param) => {
            if let Some(owner) = container {
                let instance = ctx
                    .values
                    .alloc(Value::TypeParameterInstance(Box::new(
                        crate::value::TypeParamInstanceValue {
                            param: value,
                            owner: owner.clone(),
                        },
                    )));
                to_variable(ctx, instance, node)
            } else {
                let var = ctx.program.new_variable();
                for &constraint in &param.constraints {
                    let inst = instantiate_inner(ctx, constraint, None, node, depth - 1);
                    ctx.program.paste_variable(var, inst, node);
                }
                if let Some(bound) = param.bound {
                    let inst = instantiate_inner(ctx, bound, None, node, depth - 1);
                    ctx.program.paste_variable(var, inst, node);
                }
                if ctx.program.binding_count(var) == 0 {
                    ctx.program
                        .add_binding(var, ctx.primitives.unsolvable, &[], node);
                }
                var
            }
        }
        Value::Union(union) => {
            let var = ctx.program.new_variable();
            for &option in &union.options {
                let inst = instantiate_inner(ctx, option, container, node, depth - 1);
                ctx.program.paste_variable(var, inst, node);
            }
            var
        }
        Value::FinalAnnotation(inner) => instantiate_inner(ctx, *inner, container, node, depth - 1),
        // Runtime values and the singleton tokens instantiate to themselves.
        _ => to_variable(ctx, value, node),
    }
}

/// One instance of `cls`, recursing into its formal parameters.
pub fn class_instance(
    ctx: &Ctx,
    cls: ClassId,
    container: Option<&ParamOwner>,
    node: NodeId,
    depth: usize,
) -> ValueId {
    if depth == 0 {
        warn!("instantiation depth exceeded");
        return ctx.primitives.unsolvable;
    }
    let def = ctx.classes.get(cls);
    match &def.kind {
        ClassKind::Simple => instance_of(ctx, cls),
        ClassKind::Parameterized(parameterized) => {
            let mut instance = InstanceValue::new(parameterized.base);
            for (&short, &formal) in &parameterized.formal_params {
                let full = ctx.full_param_name(def.full_name, short);
                let var = instantiate_inner(ctx, formal, container, node, depth - 1);
                instance.type_params.insert(full, var);
            }
            ctx.values.alloc(Value::Instance(Box::new(instance)))
        }
        ClassKind::Tuple(tuple) => {
            let elements = tuple
                .elements
                .iter()
                .map(|&element| instantiate_inner(ctx, element, container, node, depth - 1))
                .collect();
            ctx.values
                .alloc(Value::Tuple(Box::new(TupleValue { cls, elements })))
        }
        ClassKind::Callable(callable) => {
            let mut instance = InstanceValue::new(cls);
            let args = args_union(ctx, cls);
            let args_var = instantiate_inner(ctx, args, container, node, depth - 1);
            let ret_var = instantiate_inner(ctx, callable.ret, container, node, depth - 1);
            let args_full = ctx.full_param_name(ctx.well.callable, ctx.well.args);
            let ret_full = ctx.full_param_name(ctx.well.callable, ctx.well.ret);
            instance.type_params.insert(args_full, args_var);
            instance.type_params.insert(ret_full, ret_var);
            ctx.values.alloc(Value::Instance(Box::new(instance)))
        }
        ClassKind::Literal(literal) => literal.value,
        ClassKind::TypedDict(props) => {
            let entries = props
                .fields
                .iter()
                .map(|(key, &field)| {
                    (
                        key.clone(),
                        instantiate_inner(ctx, field, container, node, depth - 1),
                    )
                })
                .collect();
            ctx.values.alloc(Value::Dict(Box::new(DictValue {
                cls,
                entries,
                type_params: IndexMap::new(),
            })))
        }
    }
}

/// The union of a callable class's argument types (`_ARGS`), "any" when
/// the arguments are unspecified.
pub fn args_union(ctx: &Ctx, callable: ClassId) -> ValueId {
    match &ctx.classes.get(callable).kind {
        ClassKind::Callable(c) => match &c.params {
            Some(params) => merge_values(ctx, params),
            None => ctx.primitives.unsolvable,
        },
        _ => ctx.primitives.unsolvable,
    }
}

/// Merge values into one: empty -> the bottom type, one -> itself,
/// several -> a union (flattened, deduplicated).
pub fn merge_values(ctx: &Ctx, values: &[ValueId]) -> ValueId {
    let mut options: Vec<ValueId> = Vec::new();
    let mut flatten = |value: ValueId, options: &mut Vec<ValueId>| {
        match &*ctx.values.get(value) {
            Value::Union(union) => {
                for &option in &union.options {
                    if !options.contains(&option) {
                        options.push(option);
                    }
                }
            }
            _ => {
                if !options.contains(&value) {
                    options.push(value);
                }
            }
        }
    };
    for &value in values {
        flatten(value, &mut options);
    }
    match options.len() {
        0 => ctx.primitives.empty,
        1 => options[0],
        n if n > limits::MAX_UNION_OPTIONS => ctx.primitives.unsolvable,
        _ => ctx.values.alloc(Value::Union(Box::new(crate::value::UnionValue {
            options,
            recursive: false,
        }))),
    }
}

/// The type of a value, as an annotation-shaped value: instances map to
/// their (possibly parameterized) class, constants to their class,
/// classes to `type`, functions to `function`. Values with no useful
/// type (e.g. in-flight type parameter instances) yield `None`.
pub fn to_type(ctx: &Ctx, value: ValueId) -> Option<ValueId> {
    match &*ctx.values.get(value) {
        Value::Instance(instance) => {
            let def = ctx.classes.get(instance.cls);
            if def.template.is_empty() {
                return Some(ctx.values.alloc(Value::Class(instance.cls)));
            }
            // If the instance provides non-empty values for all of its
            // class's parameters, reconstruct the parameterized class so
            // the parameter values are considered in matching.
            let mut params = IndexMap::new();
            for &template_param in &def.template {
                let template_value = ctx.values.get(template_param);
                let Value::TypeParameter(p) = &*template_value else {
                    return Some(ctx.values.alloc(Value::Class(instance.cls)));
                };
                let Some(&var) = instance.type_params.get(&p.full_name) else {
                    return Some(ctx.values.alloc(Value::Class(instance.cls)));
                };
                let types: Vec<ValueId> = ctx
                    .program
                    .data(var)
                    .into_iter()
                    .filter_map(|v| to_type(ctx, v))
                    .collect();
                if types.is_empty() {
                    return Some(ctx.values.alloc(Value::Class(instance.cls)));
                }
                params.insert(p.name, merge_values(ctx, &types));
            }
            Some(ctx.values.alloc(Value::Class(
                ctx.classes.parameterize(instance.cls, params),
            )))
        }
        Value::Tuple(t) => Some(ctx.values.alloc(Value::Class(t.cls))),
        Value::Dict(d) => Some(ctx.values.alloc(Value::Class(d.cls))),
        Value::ConcreteValue(c) => Some(ctx.values.alloc(Value::Class(c.cls))),
        Value::Class(_) => Some(ctx.values.alloc(Value::Class(ctx.primitives.type_))),
        Value::Function(_) | Value::NativeFunction(_) | Value::BoundMethod(_) => {
            Some(ctx.values.alloc(Value::Class(ctx.primitives.function)))
        }
        Value::Module(_) => Some(ctx.values.alloc(Value::Class(ctx.primitives.module))),
        Value::Union(union) => {
            let types: Vec<ValueId> = union
                .options
                .iter()
                .filter_map(|&option| to_type(ctx, option))
                .collect();
            if types.is_empty() {
                None
            } else {
                Some(merge_values(ctx, &types))
            }
        }
        Value::TypeParameter(_) => Some(value),
        Value::Unknown => Some(ctx.primitives.unknown),
        Value::Unsolvable => Some(ctx.primitives.unsolvable),
        Value::Empty => Some(ctx.primitives.empty),
        _ => None,
    }
}

/// Merge the types of the given values (used when substituting matched
/// type parameters back into annotations).
pub fn merge_classes(ctx: &Ctx, values: &[ValueId]) -> ValueId {
    let types: Vec<ValueId> = values.iter().filter_map(|&v| to_type(ctx, v)).collect();
    merge_values(ctx, &types)
}

/// Collapse a concrete value to the abstract instance that should stand
/// in for it in a substitution: literals become plain instances of
/// their class; everything else is kept.
pub fn get_maybe_abstract_instance(ctx: &Ctx, value: ValueId) -> ValueId {
    match &*ctx.values.get(value) {
        Value::ConcreteValue(c) => instance_of(ctx, c.cls),
        _ => value,
    }
}

/// Convert a signature to a callable class.
///
/// Signatures with starred parameters lose their argument types (the
/// callable keeps only the return); simple signatures become a fully
/// parameterized callable.
pub fn signature_to_callable(ctx: &Ctx, sig: &Signature) -> ClassId {
    let ret = sig.ret.unwrap_or(ctx.primitives.unsolvable);
    if sig.varargs_name.is_some() || sig.kwargs_name.is_some() {
        return ctx.classes.callable_class(ctx.primitives.callable, None, ret);
    }
    let params: Vec<ValueId> = sig
        .param_names
        .iter()
        .map(|name| {
            sig.annotations
                .get(name)
                .copied()
                .unwrap_or(ctx.primitives.unsolvable)
        })
        .collect();
    ctx.classes
        .callable_class(ctx.primitives.callable, Some(params), ret)
}

// =============================================================================
// Constants
// =============================================================================

pub fn constant_str(ctx: &Ctx, value: &str) -> ValueId {
    ctx.values.alloc(Value::ConcreteValue(Box::new(
        crate::value::ConcreteValue {
            cls: ctx.primitives.str_,
            pyval: PyVal::Str(value.to_string()),
        },
    )))
}

pub fn constant_int(ctx: &Ctx, value: i64) -> ValueId {
    ctx.values.alloc(Value::ConcreteValue(Box::new(
        crate::value::ConcreteValue {
            cls: ctx.primitives.int,
            pyval: PyVal::Int(value),
        },
    )))
}

pub fn constant_bool(ctx: &Ctx, value: bool) -> ValueId {
    ctx.values.alloc(Value::ConcreteValue(Box::new(
        crate::value::ConcreteValue {
            cls: ctx.primitives.bool_,
            pyval: PyVal::Bool(value),
        },
    )))
}

pub fn constant_float(ctx: &Ctx, value: f64) -> ValueId {
    ctx.values.alloc(Value::ConcreteValue(Box::new(
        crate::value::ConcreteValue {
            cls: ctx.primitives.float,
            pyval: PyVal::Float(value),
        },
    )))
}

pub fn constant_none(ctx: &Ctx) -> ValueId {
    ctx.values.alloc(Value::ConcreteValue(Box::new(
        crate::value::ConcreteValue {
            cls: ctx.primitives.none_type,
            pyval: PyVal::None,
        },
    )))
}

/// Build a concrete dict value. Dicts larger than `MAX_DICT_KEYS`
/// collapse to a plain `dict[Union[key types], Union[value types]]`
/// instance instead of tracking each entry.
pub fn dict_literal(ctx: &Ctx, entries: Vec<(String, ValueId)>, node: NodeId) -> ValueId {
    if entries.len() > limits::MAX_DICT_KEYS {
        let value_types: Vec<ValueId> = entries
            .iter()
            .filter_map(|&(_, v)| to_type(ctx, v))
            .collect();
        let mut instance = InstanceValue::new(ctx.primitives.dict);
        let k_full = ctx.full_param_name(ctx.intern("builtins.dict"), ctx.well.k);
        let v_full = ctx.full_param_name(ctx.intern("builtins.dict"), ctx.well.v);
        let key_instance = instance_of(ctx, ctx.primitives.str_);
        instance
            .type_params
            .insert(k_full, to_variable(ctx, key_instance, node));
        let values_union = merge_values(ctx, &value_types);
        instance
            .type_params
            .insert(v_full, instantiate(ctx, values_union, None, node));
        return ctx.values.alloc(Value::Instance(Box::new(instance)));
    }
    let mut map = IndexMap::new();
    for (key, value) in entries {
        map.insert(key, to_variable(ctx, value, node));
    }
    ctx.values.alloc(Value::Dict(Box::new(DictValue {
        cls: ctx.primitives.dict,
        entries: map,
        type_params: IndexMap::new(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::TableHost;
    use crate::testing;
    use pyz_common::NameInterner;

    static HOST: TableHost = TableHost;

    #[test]
    fn test_instantiate_parameterized_class() {
        let names = NameInterner::new();
        let ctx = Ctx::new(&names, &HOST);
        let formal = testing::list_of(&ctx, ctx.primitives.int);
        let formal_value = testing::class_value(&ctx, formal);
        let var = instantiate(&ctx, formal_value, None, ctx.root_node);
        let data = ctx.program.data(var);
        assert_eq!(data.len(), 1);
        let instance_value = ctx.values.get(data[0]);
        let Value::Instance(instance) = &*instance_value else {
            panic!("expected an instance");
        };
        assert_eq!(instance.cls, ctx.primitives.list);
        let t_full = ctx.full_param_name(ctx.intern("builtins.list"), ctx.well.t);
        let element = instance.type_params.get(&t_full).copied().expect("element var");
        let element_data = ctx.program.data(element);
        assert!(matches!(
            &*ctx.values.get(element_data[0]),
            Value::Instance(i) if i.cls == ctx.primitives.int
        ));
    }

    #[test]
    fn test_instantiate_union_pastes_all_options() {
        let names = NameInterner::new();
        let ctx = Ctx::new(&names, &HOST);
        let union = testing::union(
            &ctx,
            &[
                testing::class_value(&ctx, ctx.primitives.int),
                testing::class_value(&ctx, ctx.primitives.str_),
            ],
        );
        let var = instantiate(&ctx, union, None, ctx.root_node);
        assert_eq!(ctx.program.data(var).len(), 2);
    }

    #[test]
    fn test_merge_values_flattens_and_dedups() {
        let names = NameInterner::new();
        let ctx = Ctx::new(&names, &HOST);
        let int_instance = instance_of(&ctx, ctx.primitives.int);
        let str_instance = instance_of(&ctx, ctx.primitives.str_);
        let inner = merge_values(&ctx, &[int_instance, str_instance]);
        let merged = merge_values(&ctx, &[inner, int_instance]);
        let merged_value = ctx.values.get(merged);
        let Value::Union(union) = &*merged_value else {
            panic!("expected a union");
        };
        assert_eq!(union.options.len(), 2);
        assert!(matches!(&*ctx.values.get(merge_values(&ctx, &[])), Value::Empty));
        assert_eq!(merge_values(&ctx, &[int_instance]), int_instance);
    }

    #[test]
    fn test_signature_to_callable() {
        let names = NameInterner::new();
        let ctx = Ctx::new(&names, &HOST);
        let int_class = testing::class_value(&ctx, ctx.primitives.int);
        let mut sig = Signature::new(ctx.intern("f"));
        let x = ctx.intern("x");
        sig.param_names.push(x);
        sig.annotations.insert(x, int_class);
        sig.ret = Some(int_class);
        let callable = signature_to_callable(&ctx, &sig);
        let def = ctx.classes.get(callable);
        let ClassKind::Callable(c) = &def.kind else {
            panic!("expected a callable class");
        };
        assert_eq!(c.params.as_deref(), Some(&[int_class][..]));
        assert_eq!(c.ret, int_class);
        // Starred parameters drop the argument list.
        sig.varargs_name = Some(ctx.intern("args"));
        let callable = signature_to_callable(&ctx, &sig);
        let def = ctx.classes.get(callable);
        let ClassKind::Callable(c) = &def.kind else {
            panic!("expected a callable class");
        };
        assert!(c.params.is_none());
    }

    #[test]
    fn test_get_maybe_abstract_instance_collapses_literals() {
        let names = NameInterner::new();
        let ctx = Ctx::new(&names, &HOST);
        let literal = constant_int(&ctx, 7);
        let collapsed = get_maybe_abstract_instance(&ctx, literal);
        assert!(matches!(
            &*ctx.values.get(collapsed),
            Value::Instance(i) if i.cls == ctx.primitives.int
        ));
        let int_instance = instance_of(&ctx, ctx.primitives.int);
        assert_eq!(get_maybe_abstract_instance(&ctx, int_instance), int_instance);
    }

    #[test]
    fn test_large_dict_literal_collapses() {
        let names = NameInterner::new();
        let ctx = Ctx::new(&names, &HOST);
        let entries: Vec<(String, ValueId)> = (0..=limits::MAX_DICT_KEYS)
            .map(|i| (format!("k{i}"), constant_int(&ctx, i as i64)))
            .collect();
        let value = dict_literal(&ctx, entries, ctx.root_node);
        assert!(matches!(&*ctx.values.get(value), Value::Instance(i) if i.cls == ctx.primitives.dict));
    }
}
