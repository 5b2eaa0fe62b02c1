//! The abstract matcher: driver entry points and per-call state.
//!
//! One `AbstractMatcher` performs one-way unification of abstract values
//! against formal types at a fixed control-flow node. Type variables on
//! the formal side get bound into a substitution; type variables on the
//! value side are concrete placeholders.
//!
//! The matcher is split across several files, all `impl AbstractMatcher`:
//! - `matcher` (this file) - entry points, per-call caches, MRO search
//! - `dispatch` - the value-against-formal-type case analysis
//! - `instance` - class/instance matching and specializations
//! - `protocol` - structural protocol and typed-dict matching
//! - `policy` - substitution policies and guard rules

use crate::errors::{BadParam, ErrorDetails, NonIterableStrError, ProtocolError, TypedDictError};
use crate::subst::{AliasMap, Subst};
use crate::views::Views;
use pyz_abstract::class::ClassKind;
use pyz_abstract::{annotations, convert};
use pyz_abstract::{BindingRef, ClassId, Ctx, MroEntry, NodeId, Value, ValueId, VarId, View};
use pyz_common::Name;
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;
use tracing::trace;

/// Matcher for abstract values.
pub struct AbstractMatcher<'a, 'n> {
    pub(crate) node: NodeId,
    pub(crate) ctx: &'a Ctx<'n>,
    /// `(left class, protocol)` pairs currently being matched, to break
    /// protocol cycles. Snapshot/restored around each protocol match.
    pub(crate) protocol_cache: FxHashSet<(ClassId, ClassId)>,
    /// `(left, formal)` pairs seen while expanding recursive annotations.
    pub(crate) recursive_annots_cache: FxHashSet<(ValueId, ValueId)>,
    pub(crate) protocol_error: Option<ProtocolError>,
    pub(crate) noniterable_str_error: Option<NonIterableStrError>,
    pub(crate) typed_dict_error: Option<TypedDictError>,
    /// The substitution at the point of failure, for rendering the
    /// expected type in error messages.
    pub(crate) error_subst: Option<Subst>,
}

impl<'a, 'n> AbstractMatcher<'a, 'n> {
    pub fn new(node: NodeId, ctx: &'a Ctx<'n>) -> Self {
        AbstractMatcher {
            node,
            ctx,
            protocol_cache: FxHashSet::default(),
            recursive_annots_cache: FxHashSet::default(),
            protocol_error: None,
            noniterable_str_error: None,
            typed_dict_error: None,
            error_subst: None,
        }
    }

    fn reset(&mut self) {
        self.protocol_cache.clear();
        self.recursive_annots_cache.clear();
        self.protocol_error = None;
        self.noniterable_str_error = None;
        self.typed_dict_error = None;
        self.error_subst = None;
    }

    /// Package up additional error details.
    pub(crate) fn error_details(&self) -> ErrorDetails {
        ErrorDetails {
            protocol: self.protocol_error.clone(),
            noniterable_str: self.noniterable_str_error.clone(),
            typed_dict: self.typed_dict_error.clone(),
        }
    }

    /// Compute information about type parameters using one-way
    /// unification.
    ///
    /// Given the arguments of a function call, try to find a
    /// substitution that matches them against the formal parameters.
    /// Returns the substitution on success, or the first bad parameter
    /// on failure.
    pub fn compute_subst(
        &mut self,
        formal_args: &[(Name, ValueId)],
        arg_dict: &FxHashMap<Name, BindingRef>,
        view: &View,
        alias_map: Option<Rc<AliasMap>>,
    ) -> (Option<Subst>, Option<BadParam>) {
        self.reset();
        if arg_dict.is_empty() {
            // A call with no arguments always succeeds.
            debug_assert!(formal_args.is_empty());
            return (Some(Subst::new()), None);
        }
        let mut subst = match alias_map {
            Some(aliases) => Subst::with_aliases(aliases),
            None => Subst::new(),
        };
        let mut self_subst = None;
        for &(name, formal) in formal_args {
            let Some(&actual) = arg_dict.get(&name) else {
                debug_assert!(false, "missing argument binding");
                continue;
            };
            match self.match_value_against_type(actual, formal, subst, view) {
                Some(new_subst) => subst = new_subst,
                None => {
                    // Reconstruct the expected type under the partial
                    // substitution so the error shows concrete types.
                    let error_subst = self.error_subst.clone();
                    let expected =
                        annotations::sub_one_annotation(self.ctx, self.node, formal, &|n| {
                            error_subst.as_ref().and_then(|s| s.get(n))
                        });
                    return (
                        None,
                        Some(BadParam {
                            name,
                            expected,
                            error_details: self.error_details(),
                        }),
                    );
                }
            }
            if name == self.ctx.well.self_ {
                self_subst = Some(subst.clone());
            }
        }
        if let Some(self_subst) = self_subst {
            // Type parameters matched from a `self` arg are class
            // parameters whose values were declared by the user; keep
            // them rather than widening to a union with later values.
            for (name, var) in self_subst.iter() {
                let has_value = self
                    .ctx
                    .program
                    .data(var)
                    .iter()
                    .any(|&v| !matches!(&*self.ctx.values.get(v), Value::Empty));
                if has_value {
                    subst.insert(name, var);
                }
            }
        }
        (Some(subst), None)
    }

    /// Match a variable against a type and return the views that do not
    /// match (and are actually reachable).
    pub fn bad_matches(&mut self, var: VarId, other_type: ValueId) -> Vec<(View, ErrorDetails)> {
        self.reset();
        self.bad_matches_inner(var, other_type)
    }

    /// `bad_matches` without resetting the per-call caches; used when
    /// re-entered from typed-dict matching so in-progress cycle breaking
    /// survives.
    pub(crate) fn bad_matches_inner(
        &mut self,
        var: VarId,
        other_type: ValueId,
    ) -> Vec<(View, ErrorDetails)> {
        let mut bad = Vec::new();
        let data = self.ctx.program.data(var);
        let var_is_any = data.len() == 1
            && matches!(&*self.ctx.values.get(data[0]), Value::Unsolvable);
        if var_is_any || matches!(&*self.ctx.values.get(other_type), Value::Unsolvable) {
            // An unsolvable matches everything; no substitutions are
            // needed here, so return immediately.
            return bad;
        }
        let mut views = Views::new(self.ctx, &[var]);
        let mut skip = None;
        while let Some(view) = views.next_view(skip) {
            self.protocol_error = None;
            self.noniterable_str_error = None;
            if self
                .match_var_against_type(var, other_type, &Subst::new(), &view)
                .is_none()
            {
                let bindings: Vec<BindingRef> = view.bindings().collect();
                if self
                    .ctx
                    .host
                    .has_combination(self.ctx, self.node, &bindings)
                {
                    bad.push((view, self.error_details()));
                }
                // To get complete error messages we need all bad views,
                // so no sibling can be skipped.
                skip = Some(false);
            } else {
                skip = Some(true);
            }
        }
        bad
    }

    /// Checks a type's MRO for a match for a formal type.
    ///
    /// `allow_compat_builtins` lets the compatible-builtin pairs match
    /// (e.g. `int` against `float`).
    pub fn match_from_mro(
        &self,
        left: ClassId,
        other_type: ClassId,
        allow_compat_builtins: bool,
    ) -> Option<MroEntry> {
        let other_def = self.ctx.classes.get(other_type);
        let other_base = self.ctx.classes.base_cls(other_type);
        let other_is_parameterized = !matches!(other_def.kind, ClassKind::Simple);
        for &entry in self.ctx.classes.get(left).mro.iter() {
            match entry {
                MroEntry::Class(base) => {
                    let base_cls = self.ctx.classes.base_cls(base);
                    let base_name = self.ctx.classes.full_name(base_cls);
                    if other_def.full_name == base_name
                        || (other_is_parameterized && other_base == base_cls)
                        || (allow_compat_builtins
                            && self.ctx.compat.matches(base_name, other_def.full_name))
                    {
                        return Some(entry);
                    }
                }
                MroEntry::Ambiguous => {
                    // Unlike declared subtyping, an instance of, say,
                    // `class Foo(Any)` should match against everything.
                    return Some(entry);
                }
                MroEntry::Empty => continue,
            }
        }
        None
    }

    /// Match a variable against a type under a view.
    pub fn match_var_against_type(
        &mut self,
        var: VarId,
        other_type: ValueId,
        subst: &Subst,
        view: &View,
    ) -> Option<Subst> {
        if self.ctx.program.binding_count(var) > 0 {
            let Some(binding) = view.binding_for(&self.ctx.program, var) else {
                trace!("variable not fixed by view");
                return None;
            };
            return self.match_value_against_type(binding, other_type, subst.clone(), view);
        }
        // Empty set of values: the "nothing" type matches anything, but
        // type parameters mentioned on the right must still be bound.
        let mut other = other_type;
        if let Value::Class(cls) = &*self.ctx.values.get(other) {
            if let ClassKind::Tuple(tuple) = &self.ctx.classes.get(*cls).kind {
                other = convert::merge_values(self.ctx, &tuple.elements);
            }
        }
        let options: Vec<ValueId> = match &*self.ctx.values.get(other) {
            Value::Union(union) => union.options.clone(),
            _ => vec![other],
        };
        let mut subst = subst.clone();
        for option in options {
            if let Value::TypeParameter(param) = &*self.ctx.values.get(option) {
                // A union like "K | V" matched against nothing fills in
                // both K and V.
                if !subst.contains(param.full_name) {
                    subst.insert(param.full_name, self.ctx.program.new_variable());
                }
            }
        }
        Some(subst)
    }

    /// Instantiate a formal value and match the resulting instances.
    pub(crate) fn instantiate_and_match(
        &mut self,
        left: ValueId,
        other_type: ValueId,
        subst: Subst,
        view: &View,
        container: Option<&pyz_abstract::ParamOwner>,
    ) -> Option<Subst> {
        let instance = convert::instantiate(self.ctx, left, container, self.node);
        self.match_all_bindings(instance, other_type, subst, view)
    }

    /// Match all of a variable's bindings against `other_type`.
    pub(crate) fn match_all_bindings(
        &mut self,
        var: VarId,
        other_type: ValueId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let mut new_substs = Vec::new();
        let mut views = Views::new(self.ctx, &[var]);
        while let Some(mut new_view) = views.next_view(None) {
            // Entries the outer view already fixes win over the fresh
            // enumeration.
            new_view.update_from(view);
            if let Some(new_subst) =
                self.match_var_against_type(var, other_type, &subst, &new_view)
            {
                new_substs.push(new_subst);
            }
        }
        if !new_substs.is_empty() {
            Some(crate::subst::merge_substs(
                self.ctx,
                self.node,
                &subst,
                &new_substs,
            ))
        } else if self.ctx.host.is_visible(self.ctx, self.node, var) {
            // Visibility filtering is expensive, so it only runs when a
            // failed match needs it.
            None
        } else {
            // No visible matches at all: assume success and fill in the
            // substitution domain manually.
            Some(self.subst_with_type_parameters_from(subst, other_type))
        }
    }
}
