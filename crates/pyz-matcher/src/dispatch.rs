//! One-way unification of a value against every kind of formal type.
//!
//! This is the matcher's central case analysis: given one binding of a
//! variable and a formal type, produce an extended substitution or
//! report no match. Ordering of the cases is load-bearing and follows
//! the type system's rules, not convenience.

use crate::matcher::AbstractMatcher;
use crate::subst::{merge_substs, Subst};
use pyz_abstract::value::TypeParamValue;
use pyz_abstract::{annotations, convert};
use pyz_abstract::{BindingRef, ParamOwner, Value, ValueId, View};
use pyz_common::Name;
use rustc_hash::FxHashMap;
use tracing::error;

impl<'a, 'n> AbstractMatcher<'a, 'n> {
    /// Unwrap `Final[T] -> T`.
    fn unwrap_final(&self, value: ValueId) -> ValueId {
        match &*self.ctx.values.get(value) {
            // Final type created via an annotation in the current module.
            Value::FinalAnnotation(inner) => *inner,
            // Final types loaded from a type stub arrive as an instance
            // of the `Final` sentinel class holding T as its parameter.
            Value::Instance(instance)
                if self.ctx.classes.full_name(instance.cls) == self.ctx.well.final_ =>
            {
                let full = self
                    .ctx
                    .full_param_name(self.ctx.well.final_, self.ctx.well.t);
                if let Some(&var) = instance.type_params.get(&full) {
                    let data = self.ctx.program.data(var);
                    if data.len() == 1 {
                        return data[0];
                    }
                }
                value
            }
            _ => value,
        }
    }

    /// One-way unify one binding into a formal type given a
    /// substitution. Returns a new (or the unmodified input)
    /// substitution if the matching succeeded.
    pub(crate) fn match_value_against_type(
        &mut self,
        value: BindingRef,
        other_type: ValueId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let raw_left = ctx.program.binding(value).value;

        let mut left = self.unwrap_final(raw_left);
        let other_type = self.unwrap_final(other_type);

        // Make sure we don't recurse infinitely on recursive types.
        if annotations::is_recursive_annotation(ctx, other_type) {
            let key = (left, other_type);
            if self.recursive_annots_cache.contains(&key) {
                return Some(subst);
            }
            self.recursive_annots_cache.insert(key);
        }

        if annotations::is_formal(ctx, left) {
            // `left` contains a type parameter: the analyzed code is
            // doing runtime processing of annotations. Replace every
            // parameter with `object` so the value can't masquerade as
            // a concrete type but still matches things like `Any`.
            let params = annotations::get_type_parameters(ctx, left);
            let obj_var =
                convert::to_variable(ctx, ctx.primitives.object_instance, self.node);
            let map: FxHashMap<Name, _> = params
                .iter()
                .filter_map(|&p| match &*ctx.values.get(p) {
                    Value::TypeParameter(tp) => Some((tp.full_name, obj_var)),
                    _ => None,
                })
                .collect();
            left = annotations::sub_one_annotation(ctx, self.node, left, &|n| {
                map.get(&n).copied()
            });
        }
        debug_assert!(!annotations::is_formal(ctx, left));

        // A type parameter attached to a callable or signature needs
        // variance-aware handling before anything else.
        if let Value::TypeParameterInstance(tpi) = &*ctx.values.get(left) {
            match &tpi.owner {
                ParamOwner::CallableArgs(_) | ParamOwner::SignatureRet(_) | ParamOwner::Dummy => {
                    let param = tpi.param;
                    let arg_side = matches!(tpi.owner, ParamOwner::CallableArgs(_));
                    if let Value::TypeParameter(right_param) = &*ctx.values.get(other_type) {
                        return self.match_tpi_against_type_param(
                            param,
                            other_type,
                            right_param,
                            subst,
                            view,
                        );
                    } else if arg_side {
                        // Argument side of a callable: the operands were
                        // flipped for contravariance, but a formal type
                        // on the right still needs to land in subst.
                        return self.instantiate_and_match(other_type, param, subst, view, None);
                    } else {
                        // Return side: the right is not a parameter, so
                        // widen the left to its upper bound.
                        return self.instantiate_and_match(param, other_type, subst, view, None);
                    }
                }
                ParamOwner::Value(_) => {}
            }
        }

        if let Value::TypeParameter(param) = &*ctx.values.get(other_type) {
            let param = param.clone();
            return self.match_against_type_param(value, left, other_type, &param, subst, view);
        }

        let left_val = ctx.values.get(left);
        let other_val = ctx.values.get(other_type);

        if matches!(&*other_val, Value::NoReturn) || matches!(&*left_val, Value::NoReturn) {
            // `NoReturn` only matches itself or an ambiguous value.
            let both_noreturn =
                matches!(&*left_val, Value::NoReturn) && matches!(&*other_val, Value::NoReturn);
            if both_noreturn
                || matches!(&*other_val, Value::Unsolvable)
                || matches!(&*left_val, Value::Unsolvable)
            {
                return Some(subst);
            }
            return None;
        }

        match &*other_val {
            Value::Class(_) => {
                // Accumulate substitutions in subst, or break on error.
                self.match_type_against_type(left, other_type, subst, view)
            }
            Value::Union(union) => {
                self.match_against_union(value, other_type, &union.options, subst, view)
            }
            Value::Unknown | Value::Unsolvable => Some(subst),
            _ if matches!(&*left_val, Value::Unknown | Value::Unsolvable) => Some(subst),
            Value::Empty => self.match_type_against_type(left, other_type, subst, view),
            _ => {
                error!("invalid formal type");
                None
            }
        }
    }

    /// A `TypeParameterInstance` from a callable/signature matched
    /// against a bare `TypeParameter` on the right.
    fn match_tpi_against_type_param(
        &mut self,
        left_param: ValueId,
        other_type: ValueId,
        right_param: &TypeParamValue,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        match self.match_type_param_against_type_param(left_param, right_param, subst.clone(), view)
        {
            Some(mut new_subst) => {
                // There might be something more precise to record here,
                // but an empty variable marks the binding as made.
                new_subst.insert(right_param.full_name, self.ctx.program.new_variable());
                Some(new_subst)
            }
            None => {
                let left_dummy = convert::instantiate(
                    self.ctx,
                    left_param,
                    Some(&ParamOwner::Dummy),
                    self.ctx.root_node,
                );
                let right_dummy = convert::instantiate(
                    self.ctx,
                    left_param,
                    Some(&ParamOwner::Dummy),
                    self.ctx.root_node,
                );
                let left_full = match &*self.ctx.values.get(left_param) {
                    Value::TypeParameter(p) => p.full_name,
                    _ => return None,
                };
                let mut extra = Subst::with_aliases(subst.aliases().clone());
                extra.insert(left_full, left_dummy);
                extra.insert(right_param.full_name, right_dummy);
                self.error_subst =
                    Some(merge_substs(self.ctx, self.node, &subst, &[extra]));
                None
            }
        }
    }

    /// Match a TypeVar against another TypeVar.
    ///
    /// The right side may have constraints or a bound, never both. We
    /// only check the left's constraints against the right's, not its
    /// bound: all subtypes of a bound cannot be known, so they cannot be
    /// verified against a constraint set.
    pub(crate) fn match_type_param_against_type_param(
        &mut self,
        t1: ValueId,
        t2: &TypeParamValue,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let t1_value = self.ctx.values.get(t1);
        let Value::TypeParameter(t1) = &*t1_value else {
            return None;
        };
        if !t2.constraints.is_empty() {
            debug_assert!(t2.bound.is_none());
            if t1.constraints.is_empty() {
                // t1 is unconstrained, t2 has constraints.
                return None;
            }
            if t1.constraints.iter().any(|c| !t2.constraints.contains(c)) {
                // t1 is more permissive than t2.
                return None;
            }
        } else if let Some(t2_bound) = t2.bound {
            if let Some(t1_bound) = t1.bound {
                if let Some(new_subst) =
                    self.instantiate_and_match(t1_bound, t2_bound, subst.clone(), view, None)
                {
                    return Some(new_subst);
                }
            }
            // Even without a bound, t1 may be constrained to subtypes
            // of t2's bound.
            if t1.constraints.is_empty() {
                return None;
            }
            for &constraint in &t1.constraints {
                if self
                    .instantiate_and_match(constraint, t2_bound, subst.clone(), view, None)
                    .is_none()
                {
                    // A constraint option isn't allowed by the bound.
                    return None;
                }
            }
        }
        Some(subst)
    }

    /// `TypeParameter` on the right: this is where substitutions are
    /// built.
    fn match_against_type_param(
        &mut self,
        value: BindingRef,
        left: ValueId,
        _other_type: ValueId,
        param: &TypeParamValue,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;

        // A constrained parameter requires the value to match at least
        // one constraint. The check does not extend the substitution.
        if !param.constraints.is_empty() {
            let matched = param.constraints.iter().any(|&constraint| {
                self.match_value_against_type(value, constraint, subst.clone(), view)
                    .is_some()
            });
            if !matched {
                self.error_subst = Some(subst);
                return None;
            }
        }
        // A bounded parameter requires the value to match the bound; a
        // failure records the bound as the expected type.
        if let Some(bound) = param.bound {
            if self
                .match_value_against_type(value, bound, subst.clone(), view)
                .is_none()
            {
                let bound_instance =
                    convert::instantiate(ctx, bound, Some(&ParamOwner::Dummy), self.node);
                let mut extra = Subst::with_aliases(subst.aliases().clone());
                extra.insert(param.full_name, bound_instance);
                self.error_subst = Some(merge_substs(ctx, self.node, &subst, &[extra]));
                return None;
            }
        }

        // Resolve or extend the substitution entry for this parameter.
        let new_var = if let Some(existing) = subst.get(param.full_name) {
            // Merge the two variables.
            let var = ctx.program.assign_to_new_variable(existing, self.node);
            ctx.program.add_binding(var, left, &[], self.node);
            var
        } else {
            let new_left = convert::get_maybe_abstract_instance(ctx, left);
            let var = ctx.program.new_variable();
            ctx.program.add_binding(var, new_left, &[value], self.node);
            var
        };

        // Every sibling binding with this type key produces the same
        // match result, so fold them all in rather than matching each
        // separately.
        let type_key = ctx.values.type_key(left);
        let siblings = ctx.program.bindings(value.var);
        for (index, binding) in siblings.iter().enumerate() {
            if index != value.index as usize && ctx.values.type_key(binding.value) == type_key {
                ctx.program.add_binding(
                    new_var,
                    binding.value,
                    &[BindingRef::new(value.var, index)],
                    self.node,
                );
            }
        }

        let mut subst = subst;
        let mut new_var = new_var;
        let has_error;
        if !param.constraints.is_empty() {
            let new_values = self.discard_ambiguous_values(&ctx.program.data(new_var));
            has_error = !self.satisfies_single_type(&new_values);
            if !has_error
                && !new_values.is_empty()
                && new_values.len() < ctx.program.binding_count(new_var)
            {
                // The single concrete type allowed for this variable is
                // known, so the ambiguous values can be dropped.
                new_var = ctx.program.new_variable_with(&new_values, self.node);
            }
        } else if let Some(existing) = subst.get(param.full_name) {
            let mut error = false;
            let old_values = ctx.program.data(existing);
            // A bounded parameter may accumulate any mix of values; each
            // one already matched the bound individually.
            if param.bound.is_none()
                && !old_values.is_empty()
                && !self.discard_ambiguous_values(&[left]).is_empty()
            {
                let old_concrete = self.discard_ambiguous_values(&old_values);
                // If any of the previous values were ambiguous the
                // match is a success; otherwise `left` has to fit with
                // at least one of them.
                if old_values.len() == old_concrete.len() {
                    error = true;
                    for &old_value in &old_concrete {
                        if self.satisfies_common_superclass(&[left, old_value]) {
                            error = false;
                        } else if let Some(old_cls) = ctx.values.class_of(old_value) {
                            if ctx.classes.get(old_cls).is_protocol() {
                                if let Some(new_subst) = self.match_protocol_tracked(
                                    left,
                                    old_cls,
                                    subst.clone(),
                                    view,
                                ) {
                                    error = false;
                                    subst = new_subst;
                                }
                            }
                        }
                        if !error {
                            break;
                        }
                    }
                }
            }
            has_error = error;
        } else {
            let concrete = self.discard_ambiguous_values(&ctx.program.data(new_var));
            has_error = param.bound.is_none() && !self.satisfies_common_superclass(&concrete);
        }

        if has_error {
            self.error_subst = Some(subst);
            return None;
        }
        subst.insert(param.full_name, new_var);
        Some(subst)
    }

    /// Union on the right.
    ///
    /// Options without type parameters are tried first: if `None`
    /// matches `Optional[T]`, `None` must not become a valid
    /// substitution for `T`. On the first non-formal match we stop, but
    /// fill the substitution domain for every parameter the union
    /// mentions so downstream substitution sees it fully defined.
    fn match_against_union(
        &mut self,
        value: BindingRef,
        other_type: ValueId,
        options: &[ValueId],
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        // Sort by (formal, original index): non-formal options first,
        // original order otherwise preserved.
        let mut ordered: Vec<(usize, ValueId, bool)> = options
            .iter()
            .enumerate()
            .map(|(index, &option)| (index, option, annotations::is_formal(ctx, option)))
            .collect();
        ordered.sort_by_key(|&(index, _, formal)| (formal, index));

        let value_is_ambiguous = {
            let raw = ctx.program.binding(value).value;
            ctx.values.get(raw).is_ambiguous_or_empty()
        };

        let mut matched = false;
        let mut subst = subst;
        for (_, option, formal) in ordered {
            let Some(new_subst) =
                self.match_value_against_type(value, option, subst.clone(), view)
            else {
                continue;
            };
            matched = true;
            subst = new_subst;
            if value_is_ambiguous || formal {
                continue;
            }
            // A non-formal option cannot have modified subst, so stop
            // after the first match instead of finding all of them.
            subst = self.subst_with_type_parameters_from(subst, other_type);
            break;
        }
        if matched { Some(subst) } else { None }
    }
}
