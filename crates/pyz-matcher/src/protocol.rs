//! Structural matching: protocols, callback protocols, signatures
//! against callables, and typed dicts.

use crate::errors::{
    BadKeyMatch, ProtocolError, ProtocolMissingAttributesError, ProtocolTypeError, TypedDictError,
};
use crate::instance::value_class;
use crate::matcher::AbstractMatcher;
use crate::subst::{merge_substs, Subst};
use crate::views::Views;
use indexmap::IndexSet;
use pyz_abstract::class::ClassKind;
use pyz_abstract::signature::{dummy_method, get_signatures, is_callable};
use pyz_abstract::{annotations, convert};
use pyz_abstract::{ClassId, MroEntry, SigId, Value, ValueId, VarId, View};
use pyz_common::Name;
use tracing::warn;

impl<'a, 'n> AbstractMatcher<'a, 'n> {
    /// Protocol matching with the in-progress cache snapshotted and
    /// restored, so sibling protocol attempts don't see each other's
    /// partial markers.
    ///
    /// Some protocols have methods returning the protocol itself (e.g.
    /// `Iterator.__next__`); the cache breaks the resulting cycle.
    pub(crate) fn match_protocol_tracked(
        &mut self,
        left: ValueId,
        other_cls: ClassId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let snapshot = self.protocol_cache.clone();
        let result = self.match_against_protocol(left, other_cls, subst, view);
        self.protocol_cache = snapshot;
        result
    }

    /// Checks whether a type is compatible with a protocol.
    fn match_against_protocol(
        &mut self,
        left: ValueId,
        other_cls: ClassId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let Some(left_cls) = value_class(ctx, left) else {
            return Some(subst);
        };
        if ctx.classes.get(left_cls).is_dynamic() {
            let other_value = ctx.values.alloc(Value::Class(other_cls));
            return Some(self.subst_with_type_parameters_from(subst, other_value));
        }
        let left_attributes = self.attribute_names(left);
        let missing: Vec<Name> = ctx
            .classes
            .get(other_cls)
            .protocol_attributes
            .iter()
            .filter(|name| !left_attributes.contains(*name))
            .copied()
            .collect();
        if !missing.is_empty() {
            // Not all protocol attributes are implemented by `left`.
            self.protocol_error = Some(ProtocolError::MissingAttributes(
                ProtocolMissingAttributesError {
                    left_type: left_cls,
                    other_type: other_cls,
                    missing,
                },
            ));
            return None;
        }
        let key = (left_cls, other_cls);
        if self.protocol_cache.contains(&key) {
            return Some(subst);
        }
        self.protocol_cache.insert(key);
        let attributes: Vec<Name> = ctx
            .classes
            .get(other_cls)
            .protocol_attributes
            .iter()
            .copied()
            .collect();
        let mut new_substs = Vec::new();
        for attribute in attributes {
            // On failure the protocol error was already recorded.
            let new_subst =
                self.match_protocol_attribute(left, other_cls, attribute, &subst, view)?;
            new_substs.push(new_subst);
        }
        Some(merge_substs(ctx, self.node, &subst, &new_substs))
    }

    /// The attributes implemented (or implicit) on a value.
    fn attribute_names(&self, left: ValueId) -> IndexSet<Name> {
        let ctx = self.ctx;
        let mut attributes = IndexSet::new();
        match &*ctx.values.get(left) {
            Value::Instance(instance) => {
                attributes.extend(instance.members.keys().copied());
            }
            Value::Module(module) => {
                attributes.extend(module.members.keys().copied());
            }
            _ => {}
        }
        if let Some(cls) = value_class(ctx, left) {
            for &entry in ctx.classes.get(cls).mro.iter() {
                if let MroEntry::Class(mro_cls) = entry {
                    let base = ctx.classes.base_cls(mro_cls);
                    attributes.extend(ctx.classes.get(base).own_attributes.keys().copied());
                }
            }
        }
        if attributes.contains(&ctx.well.getitem_method)
            && !attributes.contains(&ctx.well.iter_method)
        {
            // A class with __getitem__ implicitly has __iter__: the
            // runtime emulates iteration by calling __getitem__ with
            // increasing integers until IndexError.
            attributes.insert(ctx.well.iter_method);
        }
        attributes
    }

    /// Attribute lookup for protocol matching: on the class (not the
    /// instance) so methods come back unbound, with property
    /// descriptors resolved by calling their getter.
    fn attribute_for_protocol_matching(
        &self,
        cls: ClassId,
        name: Name,
        instance: Option<ValueId>,
    ) -> Option<VarId> {
        let ctx = self.ctx;
        let cls_value = ctx.values.alloc(Value::Class(cls));
        let attribute =
            ctx.host
                .get_attribute(ctx, self.node, cls_value, name, Some(cls_value))?;
        let has_property = ctx
            .program
            .data(attribute)
            .iter()
            .any(|&v| matches!(&*ctx.values.get(v), Value::Property(_)));
        if has_property {
            self.resolve_property_attribute(cls, attribute, instance)
        } else {
            Some(attribute)
        }
    }

    fn resolve_property_attribute(
        &self,
        cls: ClassId,
        attribute: VarId,
        instance: Option<ValueId>,
    ) -> Option<VarId> {
        let ctx = self.ctx;
        let instance = instance.unwrap_or_else(|| convert::instance_of(ctx, cls));
        let instance_var = convert::to_variable(ctx, instance, self.node);
        let resolved = ctx.program.new_variable();
        for (index, binding) in ctx.program.bindings(attribute).iter().enumerate() {
            if let Value::Property(property) = &*ctx.values.get(binding.value) {
                let fget = ctx.host.bind_method(ctx, self.node, property.fget, instance_var);
                if let Some(result) = ctx.host.call_function(ctx, self.node, fget) {
                    ctx.program.paste_variable(resolved, result, self.node);
                }
            } else {
                ctx.program.paste_binding(
                    resolved,
                    pyz_abstract::BindingRef::new(attribute, index),
                    self.node,
                );
            }
        }
        Some(resolved)
    }

    /// The formal types a protocol attribute contributes: the attribute
    /// type itself, or one callable class per signature, with the
    /// protocol's own parameters substituted in.
    fn attribute_types(&self, other_cls: ClassId, attribute: ValueId) -> Vec<ValueId> {
        let ctx = self.ctx;
        if !is_callable(ctx, attribute) {
            return convert::to_type(ctx, attribute).into_iter().collect();
        }
        let mut out = Vec::new();
        for sig in get_signatures(ctx, attribute) {
            let signature = ctx.sigs.get(sig);
            let callable = convert::signature_to_callable(ctx, &signature);
            // Keep the matcher from enforcing contravariance on `self`.
            let callable = match &ctx.classes.get(callable).kind {
                ClassKind::Callable(c) => match &c.params {
                    Some(params) if !params.is_empty() => {
                        let mut params = params.clone();
                        params[0] = ctx.primitives.unsolvable;
                        ctx.classes.callable_class(c.base, Some(params), c.ret)
                    }
                    _ => callable,
                },
                _ => callable,
            };
            let mut value = ctx.values.alloc(Value::Class(callable));
            if let ClassKind::Parameterized(p) = &ctx.classes.get(other_cls).kind {
                // Substitute the protocol's parameter values into the
                // attribute's signature, resolving renames through the
                // base class's alias pairs.
                let other_def = ctx.classes.get(other_cls);
                let aliases = crate::subst::AliasMap::new();
                for (a, b) in &ctx.classes.get(ctx.classes.base_cls(other_cls)).param_aliases {
                    aliases.alias(*a, *b);
                }
                let mut annotation_subst: Vec<(Name, VarId)> = Vec::new();
                for (&short, &formal) in &p.formal_params {
                    let full = ctx.full_param_name(other_def.full_name, short);
                    let instance = convert::instantiate(
                        ctx,
                        formal,
                        Some(&pyz_abstract::ParamOwner::Dummy),
                        self.node,
                    );
                    annotation_subst.push((aliases.canonical(full), instance));
                }
                value = annotations::sub_one_annotation(ctx, self.node, value, &|n| {
                    let canonical = aliases.canonical(n);
                    annotation_subst
                        .iter()
                        .find(|&&(name, _)| name == canonical)
                        .map(|&(_, var)| var)
                });
            }
            out.push(value);
        }
        out
    }

    /// Checks whether `left` and a protocol are compatible in one
    /// attribute. Every binding of the left attribute must match at
    /// least one binding of the protocol attribute.
    fn match_protocol_attribute(
        &mut self,
        left: ValueId,
        other_cls: ClassId,
        attribute: Name,
        subst: &Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let left_cls = value_class(ctx, left)?;
        let left_attribute = match self.attribute_for_protocol_matching(left_cls, attribute, Some(left))
        {
            Some(var) => var,
            None => {
                if attribute == ctx.well.iter_method {
                    // The attribute-set computation synthesized an
                    // implicit __iter__ backed by __getitem__.
                    let method = dummy_method(ctx, "__iter__", &["self"]);
                    convert::to_variable(ctx, method, self.node)
                } else {
                    match ctx.host.get_attribute(ctx, self.node, left, attribute, None) {
                        Some(var) => var,
                        None => {
                            warn!("protocol attribute vanished between checks");
                            return None;
                        }
                    }
                }
            }
        };
        let Some(protocol_attribute_var) =
            self.attribute_for_protocol_matching(other_cls, attribute, None)
        else {
            warn!("protocol does not define its own attribute");
            return None;
        };

        let protocol_data = ctx.program.data(protocol_attribute_var);
        let mut new_substs = Vec::new();
        let mut views = Views::new(ctx, &[left_attribute]);
        while let Some(mut new_view) = views.next_view(None) {
            new_view.update_from(view);
            let mut bad: Vec<(ValueId, ValueId)> = Vec::new();
            let mut matched = false;
            for &protocol_attribute in &protocol_data {
                // For this binding of the left attribute to match this
                // binding of the protocol attribute, *all* of the
                // attribute's types must match.
                let types = self.attribute_types(other_cls, protocol_attribute);
                let mut all_ok = true;
                for attribute_type in types {
                    match self.match_var_against_type(
                        left_attribute,
                        attribute_type,
                        subst,
                        &new_view,
                    ) {
                        None => {
                            let chosen = new_view
                                .binding_for(&ctx.program, left_attribute)
                                .map(|b| ctx.program.binding(b).value)
                                .unwrap_or(ctx.primitives.unsolvable);
                            bad.push((chosen, protocol_attribute));
                            all_ok = false;
                            break;
                        }
                        Some(new_subst) => new_substs.push(new_subst),
                    }
                }
                if all_ok {
                    matched = true;
                    break;
                }
            }
            if !matched {
                let (bad_left, bad_right): (Vec<ValueId>, Vec<ValueId>) =
                    bad.into_iter().unzip();
                self.protocol_error = Some(ProtocolError::Type(ProtocolTypeError {
                    left_type: left_cls,
                    other_type: other_cls,
                    attribute,
                    actual: convert::merge_values(ctx, &bad_left),
                    expected: convert::merge_values(ctx, &bad_right),
                }));
                return None;
            }
        }
        Some(merge_substs(ctx, self.node, subst, &new_substs))
    }

    /// Callback protocols: a protocol whose only obligation is
    /// `__call__` accepts any value matching that method's signature.
    pub(crate) fn match_type_against_callback_protocol(
        &mut self,
        left: ValueId,
        other_cls: ClassId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let cls_value = ctx.values.alloc(Value::Class(other_cls));
        let method_var =
            ctx.host
                .get_attribute(ctx, self.node, cls_value, ctx.well.call_method, None)?;
        let methods = ctx.program.data(method_var);
        if methods.is_empty() || methods.iter().any(|&v| !is_callable(ctx, v)) {
            return None;
        }
        let mut new_substs = Vec::new();
        for expected_method in methods {
            let mut matched = false;
            for sig in get_signatures(ctx, expected_method) {
                // Drop `self` before converting to a callable.
                let signature = ctx.sigs.get(sig).drop_first_parameter();
                let callable = convert::signature_to_callable(ctx, &signature);
                let expected = ctx.values.alloc(Value::Class(callable));
                if let Some(new_subst) =
                    self.match_type_against_type(left, expected, subst.clone(), view)
                {
                    // For a set of overloaded signatures, only one
                    // needs to match.
                    new_substs.push(new_subst);
                    matched = true;
                    break;
                }
            }
            if !matched {
                // Every binding of the protocol method must have a
                // matching signature.
                return None;
            }
        }
        Some(merge_substs(ctx, self.node, &subst, &new_substs))
    }

    /// Match a function signature against a parameterized callable.
    pub(crate) fn match_signature_against_callable(
        &mut self,
        sig: SigId,
        other_cls: ClassId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let signature = ctx.sigs.get(sig);
        // The special single-TypeVar matcher takes priority over normal
        // matching for every parameter pair, including the return.
        let counts = self.single_typevar_counts(other_cls);
        let ret_type = signature.ret.unwrap_or(ctx.primitives.unsolvable);
        let (other_ret, other_args) = match &ctx.classes.get(other_cls).kind {
            ClassKind::Callable(c) => (c.ret, c.params.clone()),
            ClassKind::Parameterized(p) => (
                p.formal_params
                    .get(&ctx.well.ret)
                    .copied()
                    .unwrap_or(ctx.primitives.unsolvable),
                None,
            ),
            _ => (ctx.primitives.unsolvable, None),
        };
        let mut subst = match self.single_typevar_match(ret_type, other_ret, &counts, &subst) {
            Some(new_subst) => new_subst,
            None => self.instantiate_and_match(
                ret_type,
                other_ret,
                subst,
                view,
                Some(&pyz_abstract::ParamOwner::SignatureRet(sig)),
            )?,
        };
        let Some(other_args) = other_args else {
            // The callable does not specify argument types, so any
            // arguments are fine.
            return Some(subst);
        };
        if signature.mandatory_param_count() > other_args.len() {
            return None;
        }
        if let Some(max) = signature.maximum_param_count() {
            if max < other_args.len() {
                return None;
            }
        }
        for (name, &expected_arg) in signature.param_names.iter().zip(&other_args) {
            let actual_arg = signature
                .annotations
                .get(name)
                .copied()
                .unwrap_or(ctx.primitives.unsolvable);
            match self.single_typevar_match(actual_arg, expected_arg, &counts, &subst) {
                Some(new_subst) => subst = new_subst,
                None => {
                    // Flip actual and expected: argument types are
                    // contravariant.
                    subst = self.instantiate_and_match(
                        expected_arg,
                        actual_arg,
                        subst,
                        view,
                        Some(&pyz_abstract::ParamOwner::CallableArgs(other_cls)),
                    )?;
                }
            }
        }
        Some(subst)
    }

    /// Structural typed-dict matching. Returns whether the match
    /// succeeded; on failure the typed-dict error is recorded.
    pub(crate) fn match_dict_against_typed_dict(
        &mut self,
        left: ValueId,
        other_cls: ClassId,
    ) -> bool {
        let ctx = self.ctx;
        self.typed_dict_error = None;
        let entries = match &*ctx.values.get(left) {
            Value::Dict(dict) => dict.entries.clone(),
            _ => return false,
        };
        let other_def = ctx.classes.get(other_cls);
        let ClassKind::TypedDict(props) = &other_def.kind else {
            debug_assert!(false, "typed-dict match against non-typed-dict class");
            return false;
        };
        let (missing, extra) = props.check_keys(entries.keys().map(|k| k.as_str()));
        let mut bad = Vec::new();
        for (key, &value_var) in &entries {
            let Some(&declared) = props.fields.get(key) else {
                continue;
            };
            let bad_views = self.bad_matches_inner(value_var, declared);
            if !bad_views.is_empty() {
                bad.push(BadKeyMatch {
                    key: key.clone(),
                    value: value_var,
                    expected: declared,
                    details: bad_views.into_iter().map(|(_, details)| details).collect(),
                });
            }
        }
        if !missing.is_empty() || !extra.is_empty() || !bad.is_empty() {
            self.typed_dict_error = Some(TypedDictError {
                bad,
                extra,
                missing,
            });
            return false;
        }
        true
    }
}
