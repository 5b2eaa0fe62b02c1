//! Substitution policies and guard rules.
//!
//! These decide when a set of values accumulated for one type parameter
//! is still coherent: the single-type policy for constrained
//! parameters, the common-superclass policy for unconstrained ones, the
//! non-iterable-str guard, and the single-TypeVar short-circuit used in
//! callable matching.

use crate::instance::value_class;
use crate::matcher::AbstractMatcher;
use crate::subst::{merge_substs, Subst};
use pyz_abstract::class::ClassKind;
use pyz_abstract::{annotations, convert};
use pyz_abstract::{ClassId, MroEntry, Value, ValueId};
use pyz_common::Name;
use rustc_hash::{FxHashMap, FxHashSet};

impl<'a, 'n> AbstractMatcher<'a, 'n> {
    /// Filter out values whose type is ambiguous: the any/unknown/empty
    /// tokens, in-flight type parameter instances, and unions.
    pub(crate) fn discard_ambiguous_values(&self, values: &[ValueId]) -> Vec<ValueId> {
        values
            .iter()
            .copied()
            .filter(|&v| {
                !matches!(
                    &*self.ctx.values.get(v),
                    Value::Unknown
                        | Value::Unsolvable
                        | Value::Empty
                        | Value::NoReturn
                        | Value::Union(_)
                        | Value::TypeParameterInstance(_)
                )
            })
            .collect()
    }

    /// Enforce that the values contain only one concrete type. No
    /// subtyping: all occurrences must be of the same class, except that
    /// a compatible-builtin pair counts as one.
    pub(crate) fn satisfies_single_type(&self, values: &[ValueId]) -> bool {
        let ctx = self.ctx;
        let mut class_names: FxHashSet<Name> = values
            .iter()
            .filter_map(|&v| value_class(ctx, v))
            .map(|cls| ctx.classes.full_name(cls))
            .collect();
        for &(compat, name) in ctx.compat.pairs() {
            if class_names.contains(&compat) && class_names.contains(&name) {
                class_names.remove(&compat);
            }
        }
        class_names.len() <= 1
    }

    /// Enforce that the values share a superclass below the universal
    /// roots (`object`, the generic base, the protocol base). When
    /// `object` itself is one of the values, the root filtering is
    /// disabled.
    pub(crate) fn satisfies_common_superclass(&self, values: &[ValueId]) -> bool {
        let ctx = self.ctx;
        let mut common_classes: Option<FxHashSet<Name>> = None;
        let mut object_in_values = false;
        for &value in values {
            let Some(cls) = value_class(ctx, value) else {
                continue;
            };
            object_in_values |= cls == ctx.primitives.object;
            let mut superclasses: FxHashSet<Name> = ctx
                .classes
                .get(cls)
                .mro
                .iter()
                .filter_map(|entry| match entry {
                    MroEntry::Class(mro_cls) => {
                        Some(ctx.classes.full_name(ctx.classes.base_cls(*mro_cls)))
                    }
                    MroEntry::Ambiguous | MroEntry::Empty => None,
                })
                .collect();
            for &(compat, name) in ctx.compat.pairs() {
                if superclasses.contains(&compat) {
                    superclasses.insert(name);
                }
            }
            common_classes = Some(match common_classes {
                None => superclasses,
                Some(common) => common.intersection(&superclasses).copied().collect(),
            });
        }
        let ignored: FxHashSet<Name> = if object_in_values {
            FxHashSet::default()
        } else {
            [ctx.well.object, ctx.well.generic, ctx.well.protocol]
                .into_iter()
                .collect()
        };
        if let Some(common) = common_classes {
            if !values.is_empty() && common.iter().all(|name| ignored.contains(name)) {
                return false;
            }
        }
        true
    }

    /// Enforce that a `str` is not matched against a conflicting
    /// iterable of strings. The conflicting-type list is closed: only
    /// the four typing containers and the two string types participate.
    pub(crate) fn satisfies_noniterable_str(&self, left: ClassId, other_type: ClassId) -> bool {
        let ctx = self.ctx;
        let conflicting = [
            ctx.well.iterable,
            ctx.well.sequence,
            ctx.well.collection,
            ctx.well.container,
        ];
        let str_types = [ctx.well.str_, ctx.well.unicode];

        let other_name = ctx.classes.full_name(other_type);
        let left_name = ctx.classes.full_name(left);
        if !conflicting.contains(&other_name) || !str_types.contains(&left_name) {
            // Not a combination this rule is interested in.
            return true;
        }
        if let ClassKind::Parameterized(p) = &ctx.classes.get(other_type).kind {
            if let Some(&formal) = p.formal_params.get(&ctx.well.t) {
                let formal_name = match &*ctx.values.get(formal) {
                    Value::Class(cls) => Some(ctx.classes.full_name(*cls)),
                    Value::TypeParameter(param) => Some(param.full_name),
                    _ => None,
                };
                if let Some(name) = formal_name {
                    return !str_types.contains(&name);
                }
            }
            return true;
        }
        // Don't enforce against an unparameterized iterable.
        true
    }

    /// Fill in empty values for every type parameter `typ` mentions that
    /// the substitution does not bind yet.
    pub(crate) fn subst_with_type_parameters_from(&self, subst: Subst, typ: ValueId) -> Subst {
        let ctx = self.ctx;
        let mut subst = subst;
        for param in annotations::get_type_parameters(ctx, typ) {
            let param_value = ctx.values.get(param);
            let Value::TypeParameter(p) = &*param_value else {
                continue;
            };
            if !subst.contains(p.full_name) {
                let var = ctx
                    .program
                    .new_variable_with(&[ctx.primitives.empty], self.node);
                subst.insert(p.full_name, var);
            }
        }
        subst
    }

    /// Bind every given parameter to `value` (used when an ambiguous
    /// left matches a formal type wholesale).
    pub(crate) fn mutate_type_parameters(
        &self,
        params: &[ValueId],
        value: ValueId,
        subst: Subst,
    ) -> Subst {
        let ctx = self.ctx;
        let mut extra = Subst::with_aliases(subst.aliases().clone());
        for &param in params {
            if let Value::TypeParameter(p) = &*ctx.values.get(param) {
                extra.insert(p.full_name, convert::to_variable(ctx, value, self.node));
            }
        }
        merge_substs(ctx, self.node, &subst, &[extra])
    }

    /// Occurrence counts of type parameters across a callable's
    /// signature, for the single-TypeVar rule. Argument parameters are
    /// counted once per position; the `Args` pseudo-parameter (the union
    /// of all arguments) is never counted, so a parameter appearing in
    /// exactly one argument and nowhere else has count 1.
    pub(crate) fn single_typevar_counts(&self, callable: ClassId) -> FxHashMap<Name, usize> {
        let ctx = self.ctx;
        let mut counts = FxHashMap::default();
        let def = ctx.classes.get(callable);
        match &def.kind {
            ClassKind::Callable(c) => {
                if let Some(params) = &c.params {
                    for &param in params {
                        count_params(ctx, param, &mut counts);
                    }
                }
                count_params(ctx, c.ret, &mut counts);
            }
            ClassKind::Parameterized(p) => {
                for &formal in p.formal_params.values() {
                    count_params(ctx, formal, &mut counts);
                }
            }
            _ => {}
        }
        counts
    }

    /// The single-TypeVar short-circuit: a bare type variable on the
    /// left matches a bare type variable that occurs exactly once in
    /// the callable, recording the right's name with an empty
    /// placeholder. This keeps `g(f: Callable[[T], Any], x: T)` from
    /// forcing the argument type open when a polymorphic `f` is passed.
    pub(crate) fn single_typevar_match(
        &self,
        left: ValueId,
        right: ValueId,
        counts: &FxHashMap<Name, usize>,
        subst: &Subst,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        if !matches!(&*ctx.values.get(left), Value::TypeParameter(_)) {
            return None;
        }
        let right_value = ctx.values.get(right);
        let Value::TypeParameter(right_param) = &*right_value else {
            return None;
        };
        if !right_param.constraints.is_empty()
            || right_param.bound.is_some()
            || counts.get(&right_param.full_name) != Some(&1)
        {
            return None;
        }
        let mut subst = subst.clone();
        // A TypeVar matched a TypeVar: there is nothing concrete to
        // record, but the binding must be marked as made.
        let var = ctx
            .program
            .new_variable_with(&[ctx.primitives.empty], self.node);
        subst.insert(right_param.full_name, var);
        Some(subst)
    }
}

/// Count type-parameter occurrences in an annotation. Unlike
/// `annotations::get_type_parameters`, repeated occurrences count; only
/// class cycles are broken.
fn count_params(ctx: &pyz_abstract::Ctx, annot: ValueId, counts: &mut FxHashMap<Name, usize>) {
    let mut seen_classes = FxHashSet::default();
    count_params_inner(ctx, annot, counts, &mut seen_classes, 0);
}

fn count_params_inner(
    ctx: &pyz_abstract::Ctx,
    annot: ValueId,
    counts: &mut FxHashMap<Name, usize>,
    seen_classes: &mut FxHashSet<ClassId>,
    depth: usize,
) {
    if depth > pyz_common::limits::MAX_ANNOTATION_DEPTH {
        return;
    }
    match &*ctx.values.get(annot) {
        Value::TypeParameter(param) => {
            *counts.entry(param.full_name).or_insert(0) += 1;
        }
        Value::Union(union) => {
            for &option in &union.options {
                count_params_inner(ctx, option, counts, seen_classes, depth + 1);
            }
        }
        Value::FinalAnnotation(inner) => {
            count_params_inner(ctx, *inner, counts, seen_classes, depth + 1);
        }
        Value::Class(cls) => {
            if !seen_classes.insert(*cls) {
                return;
            }
            match &ctx.classes.get(*cls).kind {
                ClassKind::Parameterized(p) => {
                    for &formal in p.formal_params.values() {
                        count_params_inner(ctx, formal, counts, seen_classes, depth + 1);
                    }
                }
                ClassKind::Tuple(t) => {
                    for &element in &t.elements {
                        count_params_inner(ctx, element, counts, seen_classes, depth + 1);
                    }
                }
                ClassKind::Callable(c) => {
                    if let Some(params) = &c.params {
                        for &param in params {
                            count_params_inner(ctx, param, counts, seen_classes, depth + 1);
                        }
                    }
                    count_params_inner(ctx, c.ret, counts, seen_classes, depth + 1);
                }
                _ => {}
            }
        }
        _ => {}
    }
}
