//! Annotation utilities: type-parameter discovery and substitution.
//!
//! These walk annotation-shaped values only. Instances are leaves here:
//! a runtime instance never contributes formal type parameters, even
//! when its own parameter variables hold in-flight values.

use crate::class::ClassKind;
use crate::convert;
use crate::ctx::Ctx;
use crate::ids::{ClassId, NodeId, ValueId, VarId};
use crate::value::Value;
use pyz_common::limits;
use pyz_common::Name;
use rustc_hash::FxHashSet;

/// All type parameters embedded in an annotation, deduplicated by full
/// name, in first-seen order.
pub fn get_type_parameters(ctx: &Ctx, annot: ValueId) -> Vec<ValueId> {
    let mut seen_values = FxHashSet::default();
    let mut seen_classes = FxHashSet::default();
    let mut seen_names = FxHashSet::default();
    let mut out = Vec::new();
    collect_params(
        ctx,
        annot,
        &mut seen_values,
        &mut seen_classes,
        &mut seen_names,
        &mut out,
    );
    out
}

/// Whether an annotation contains at least one type parameter.
pub fn is_formal(ctx: &Ctx, annot: ValueId) -> bool {
    !get_type_parameters(ctx, annot).is_empty()
}

fn collect_params(
    ctx: &Ctx,
    value: ValueId,
    seen_values: &mut FxHashSet<ValueId>,
    seen_classes: &mut FxHashSet<ClassId>,
    seen_names: &mut FxHashSet<Name>,
    out: &mut Vec<ValueId>,
) {
    if !seen_values.insert(value) {
        return;
    }
    match &*ctx.values.get(value) {
        Value::TypeParameter(param) => {
            if seen_names.insert(param.full_name) {
                out.push(value);
            }
        }
        Value::Union(union) => {
            for &option in &union.options {
                collect_params(ctx, option, seen_values, seen_classes, seen_names, out);
            }
        }
        Value::FinalAnnotation(inner) => {
            collect_params(ctx, *inner, seen_values, seen_classes, seen_names, out);
        }
        Value::FieldInstance(field) => {
            collect_params(ctx, field.typ, seen_values, seen_classes, seen_names, out);
        }
        Value::Class(cls) => {
            collect_class_params(ctx, *cls, seen_values, seen_classes, seen_names, out);
        }
        _ => {}
    }
}

fn collect_class_params(
    ctx: &Ctx,
    cls: ClassId,
    seen_values: &mut FxHashSet<ValueId>,
    seen_classes: &mut FxHashSet<ClassId>,
    seen_names: &mut FxHashSet<Name>,
    out: &mut Vec<ValueId>,
) {
    if !seen_classes.insert(cls) {
        return;
    }
    match &ctx.classes.get(cls).kind {
        ClassKind::Parameterized(p) => {
            for &formal in p.formal_params.values() {
                collect_params(ctx, formal, seen_values, seen_classes, seen_names, out);
            }
        }
        ClassKind::Tuple(t) => {
            for &element in &t.elements {
                collect_params(ctx, element, seen_values, seen_classes, seen_names, out);
            }
        }
        ClassKind::Callable(c) => {
            if let Some(params) = &c.params {
                for &param in params {
                    collect_params(ctx, param, seen_values, seen_classes, seen_names, out);
                }
            }
            collect_params(ctx, c.ret, seen_values, seen_classes, seen_names, out);
        }
        ClassKind::Simple | ClassKind::Literal(_) | ClassKind::TypedDict(_) => {}
    }
}

/// Whether this annotation is a self-referential one whose expansion the
/// matcher must cycle-break.
pub fn is_recursive_annotation(ctx: &Ctx, annot: ValueId) -> bool {
    match &*ctx.values.get(annot) {
        Value::Union(union) => union.recursive,
        Value::Class(cls) => ctx
            .classes
            .get(*cls)
            .flags
            .contains(crate::class::ClassFlags::RECURSIVE),
        _ => false,
    }
}

/// Substitute type parameters inside an annotation.
///
/// Every embedded `TypeParameter` whose full name `lookup` resolves is
/// replaced by the merged *types* of the resolved variable's values;
/// unresolved parameters are left in place. The result shares structure
/// with the input wherever nothing changed.
pub fn sub_one_annotation(
    ctx: &Ctx,
    node: NodeId,
    annot: ValueId,
    lookup: &dyn Fn(Name) -> Option<VarId>,
) -> ValueId {
    sub_inner(ctx, node, annot, lookup, limits::MAX_ANNOTATION_DEPTH)
}

fn sub_inner(
    ctx: &Ctx,
    node: NodeId,
    annot: ValueId,
    lookup: &dyn Fn(Name) -> Option<VarId>,
    depth: usize,
) -> ValueId {
    if depth == 0 {
        return annot;
    }
    match &*ctx.values.get(annot) {
        Value::TypeParameter(param) => match lookup(param.full_name) {
            Some(var) => {
                let data = ctx.program.data(var);
                if data.is_empty() {
                    ctx.primitives.empty
                } else {
                    convert::merge_classes(ctx, &data)
                }
            }
            None => annot,
        },
        Value::Union(union) => {
            let options: Vec<ValueId> = union
                .options
                .iter()
                .map(|&option| sub_inner(ctx, node, option, lookup, depth - 1))
                .collect();
            if options == union.options {
                annot
            } else {
                convert::merge_values(ctx, &options)
            }
        }
        Value::FinalAnnotation(inner) => {
            let new_inner = sub_inner(ctx, node, *inner, lookup, depth - 1);
            if new_inner == *inner {
                annot
            } else {
                ctx.values.alloc(Value::FinalAnnotation(new_inner))
            }
        }
        Value::Class(cls) => {
            let new_cls = sub_class(ctx, node, *cls, lookup, depth - 1);
            if new_cls == *cls {
                annot
            } else {
                ctx.values.alloc(Value::Class(new_cls))
            }
        }
        _ => annot,
    }
}

fn sub_class(
    ctx: &Ctx,
    node: NodeId,
    cls: ClassId,
    lookup: &dyn Fn(Name) -> Option<VarId>,
    depth: usize,
) -> ClassId {
    if depth == 0 {
        return cls;
    }
    match &ctx.classes.get(cls).kind {
        ClassKind::Parameterized(p) => {
            let mut changed = false;
            let mut params = indexmap::IndexMap::new();
            for (&short, &formal) in &p.formal_params {
                let new_formal = sub_inner(ctx, node, formal, lookup, depth - 1);
                changed |= new_formal != formal;
                params.insert(short, new_formal);
            }
            if changed {
                ctx.classes.parameterize(p.base, params)
            } else {
                cls
            }
        }
        ClassKind::Tuple(t) => {
            let elements: Vec<ValueId> = t
                .elements
                .iter()
                .map(|&element| sub_inner(ctx, node, element, lookup, depth - 1))
                .collect();
            if elements == t.elements {
                cls
            } else {
                ctx.classes.tuple_class(t.base, elements)
            }
        }
        ClassKind::Callable(c) => {
            let new_params = c.params.as_ref().map(|params| {
                params
                    .iter()
                    .map(|&param| sub_inner(ctx, node, param, lookup, depth - 1))
                    .collect::<Vec<_>>()
            });
            let new_ret = sub_inner(ctx, node, c.ret, lookup, depth - 1);
            if new_params == c.params && new_ret == c.ret {
                cls
            } else {
                ctx.classes.callable_class(c.base, new_params, new_ret)
            }
        }
        ClassKind::Simple | ClassKind::Literal(_) | ClassKind::TypedDict(_) => cls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::TableHost;
    use crate::testing;

    static HOST: TableHost = TableHost;

    #[test]
    fn test_get_type_parameters_walks_annotations() {
        let names = pyz_common::NameInterner::new();
        let ctx = Ctx::new(&names, &HOST);
        let scope = ctx.intern("m.f");
        let t = ctx.new_type_param(scope, ctx.intern("T"), None, Vec::new());
        let list_of_t = testing::parameterized(&ctx, ctx.primitives.list, &[t]);
        let annot = testing::union(
            &ctx,
            &[
                testing::class_value(&ctx, ctx.primitives.int),
                testing::class_value(&ctx, list_of_t),
            ],
        );
        let params = get_type_parameters(&ctx, annot);
        assert_eq!(params, vec![t]);
        assert!(is_formal(&ctx, annot));
        assert!(!is_formal(&ctx, testing::class_value(&ctx, ctx.primitives.int)));
    }

    #[test]
    fn test_instances_are_leaves() {
        let names = pyz_common::NameInterner::new();
        let ctx = Ctx::new(&names, &HOST);
        let instance = testing::list_instance(&ctx, ctx.primitives.int);
        assert!(get_type_parameters(&ctx, instance).is_empty());
    }

    #[test]
    fn test_sub_one_annotation_replaces_params_with_types() {
        let names = pyz_common::NameInterner::new();
        let ctx = Ctx::new(&names, &HOST);
        let scope = ctx.intern("m.f");
        let t = ctx.new_type_param(scope, ctx.intern("T"), None, Vec::new());
        let t_full = ctx.intern("m.f.T");
        let list_of_t = testing::class_value(&ctx, testing::parameterized(&ctx, ctx.primitives.list, &[t]));
        let int_instance = convert::instance_of(&ctx, ctx.primitives.int);
        let var = convert::to_variable(&ctx, int_instance, ctx.root_node);
        let subbed = sub_one_annotation(&ctx, ctx.root_node, list_of_t, &|n| {
            (n == t_full).then_some(var)
        });
        // list[T] became list[int].
        let subbed_value = ctx.values.get(subbed);
        let Value::Class(cls) = &*subbed_value else {
            panic!("expected a class");
        };
        let def = ctx.classes.get(*cls);
        let ClassKind::Parameterized(p) = &def.kind else {
            panic!("expected a parameterized class");
        };
        let arg = p.formal_params[&ctx.intern("T")];
        assert!(matches!(&*ctx.values.get(arg), Value::Class(c) if *c == ctx.primitives.int));
        // Unresolved parameters stay in place.
        let unchanged = sub_one_annotation(&ctx, ctx.root_node, list_of_t, &|_| None);
        assert_eq!(unchanged, list_of_t);
    }

    #[test]
    fn test_recursive_annotation_flag() {
        let names = pyz_common::NameInterner::new();
        let ctx = Ctx::new(&names, &HOST);
        let recursive = ctx.values.alloc(Value::Union(Box::new(
            crate::value::UnionValue {
                options: vec![testing::class_value(&ctx, ctx.primitives.int)],
                recursive: true,
            },
        )));
        assert!(is_recursive_annotation(&ctx, recursive));
        let plain = testing::union(&ctx, &[testing::class_value(&ctx, ctx.primitives.int)]);
        assert!(!is_recursive_annotation(&ctx, plain));
    }
}
