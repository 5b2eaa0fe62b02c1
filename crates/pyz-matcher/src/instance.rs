//! Matching class-like values and instances against formal types.
//!
//! `match_type_against_type` dispatches on what the left-hand value is
//! (class, module, function, method wrapper, union, ...);
//! `match_instance_against_type` handles instance-left matching: literal
//! classes, typed dicts, the non-iterable-str guard, the MRO walk and
//! the tuple/callable/parameterized specializations.

use crate::matcher::AbstractMatcher;
use crate::subst::{merge_substs, Subst};
use pyz_abstract::class::ClassKind;
use pyz_abstract::signature::get_signatures;
use pyz_abstract::value::BoundMethodValue;
use pyz_abstract::{annotations, convert};
use pyz_abstract::{ClassId, Ctx, MroEntry, ParamOwner, Value, ValueId, View};
use tracing::{error, warn};

/// The class of a value, for matching purposes.
pub(crate) fn value_class(ctx: &Ctx, value: ValueId) -> Option<ClassId> {
    match &*ctx.values.get(value) {
        Value::Instance(instance) => Some(instance.cls),
        Value::Tuple(tuple) => Some(tuple.cls),
        Value::Dict(dict) => Some(dict.cls),
        Value::ConcreteValue(concrete) => Some(concrete.cls),
        Value::Module(_) => Some(ctx.primitives.module),
        Value::Function(_) | Value::NativeFunction(_) | Value::BoundMethod(_) => {
            Some(ctx.primitives.function)
        }
        Value::Class(_) => Some(ctx.primitives.type_),
        Value::ClassMethod(_) => Some(ctx.primitives.classmethod),
        Value::StaticMethod(_) => Some(ctx.primitives.staticmethod),
        _ => None,
    }
}

fn is_function_like(value: &Value) -> bool {
    matches!(
        value,
        Value::Function(_) | Value::NativeFunction(_) | Value::BoundMethod(_) | Value::Property(_)
    )
}

impl<'a, 'n> AbstractMatcher<'a, 'n> {
    /// Whether a class is a callback protocol (a protocol requiring
    /// `__call__`).
    pub(crate) fn is_callback_protocol(&self, cls: ClassId) -> bool {
        let def = self.ctx.classes.get(cls);
        def.is_protocol() && def.protocol_attributes.contains(&self.ctx.well.call_method)
    }

    /// Checks whether a type is compatible with a (formal) type.
    ///
    /// `other_value` is the formal type as a value: a class or the
    /// bottom type.
    pub(crate) fn match_type_against_type(
        &mut self,
        left: ValueId,
        other_value: ValueId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let left_val = ctx.values.get(left);
        let other_val = ctx.values.get(other_value);

        let other_cls = match &*other_val {
            Value::Class(cls) => Some(*cls),
            _ => None,
        };
        let other_name = other_cls.map(|cls| ctx.classes.full_name(cls));

        if matches!(&*left_val, Value::Empty) && matches!(&*other_val, Value::Empty) {
            return Some(subst);
        }
        if left_val.is_ambiguous_or_empty() {
            let params = annotations::get_type_parameters(ctx, other_value);
            let value = if matches!(&*left_val, Value::Empty) {
                ctx.primitives.empty
            } else {
                ctx.primitives.unsolvable
            };
            return Some(self.mutate_type_parameters(&params, value, subst));
        }

        match &*left_val {
            Value::Class(left_cls) => {
                let left_cls = *left_cls;
                let Some(other_cls) = other_cls else {
                    return None;
                };
                if left_cls == other_cls {
                    return Some(subst);
                }
                let other_def = ctx.classes.get(other_cls);
                if other_name == Some(ctx.well.type_) {
                    if let ClassKind::Parameterized(p) = &other_def.kind {
                        // Match a class against `type[T]` by instantiating T.
                        if let Some(&inner) = p.formal_params.get(&ctx.well.t) {
                            return self.instantiate_and_match(left, inner, subst, view, None);
                        }
                    }
                }
                if other_name == Some(ctx.well.callable) {
                    if let ClassKind::Callable(c) = &other_def.kind {
                        // Match the constructed instance against the
                        // callable's return type.
                        // TODO: also check the constructor against the
                        // callable's parameter types.
                        let ret = c.ret;
                        return self.instantiate_and_match(left, ret, subst, view, None);
                    }
                }
                if matches!(other_def.kind, ClassKind::Simple)
                    && (other_name == Some(ctx.well.type_)
                        || other_name == Some(ctx.well.object)
                        || other_name == Some(ctx.well.callable)
                        || other_name == Some(ctx.well.hashable))
                {
                    return Some(subst);
                }
                if self.is_callback_protocol(other_cls) {
                    return self.match_type_against_callback_protocol(
                        left, other_cls, subst, view,
                    );
                }
                self.match_instance_against_type(left, other_cls, subst, view)
            }
            Value::Module(_) => {
                if other_name == Some(ctx.well.module)
                    || other_name == Some(ctx.well.object)
                    || other_name == Some(ctx.well.module_type)
                    || other_name == Some(ctx.well.hashable)
                {
                    return Some(subst);
                }
                match other_cls {
                    Some(cls) if ctx.classes.get(cls).has_protocol_base() => {
                        self.match_instance_against_type(left, cls, subst, view)
                    }
                    _ => None,
                }
            }
            value if is_function_like(value) => {
                if other_name == Some(ctx.well.object) {
                    return Some(subst);
                }
                if let Some(other_cls) = other_cls.filter(|_| other_name == Some(ctx.well.callable)) {
                    if !matches!(ctx.classes.get(other_cls).kind, ClassKind::Callable(_)) {
                        // The callable has no parameters; any function
                        // matches it.
                        return Some(subst);
                    }
                    if matches!(value, Value::NativeFunction(_)) {
                        // Opaque functions aren't introspected; their
                        // magic-method shims are hardly ever passed as
                        // arguments anyway.
                        return Some(subst);
                    }
                    let mut new_substs = Vec::new();
                    for sig in get_signatures(ctx, left) {
                        if let Some(new_subst) = self.match_signature_against_callable(
                            sig,
                            other_cls,
                            subst.clone(),
                            view,
                        ) {
                            new_substs.push(new_subst);
                        }
                    }
                    return if new_substs.is_empty() {
                        None
                    } else {
                        Some(merge_substs(ctx, self.node, &subst, &new_substs))
                    };
                }
                if let Some(cls) = other_cls {
                    if self.is_callback_protocol(cls) {
                        return self.match_type_against_callback_protocol(left, cls, subst, view);
                    }
                }
                let as_instance = convert::instance_of(ctx, ctx.primitives.function);
                self.match_type_against_type(as_instance, other_value, subst, view)
            }
            Value::FieldInstance(field) => match field.default {
                Some(default) => self.match_all_bindings(default, other_value, subst, view),
                None => self.instantiate_and_match(field.typ, other_value, subst, view, None),
            },
            Value::Instance(_) | Value::Tuple(_) | Value::Dict(_) | Value::ConcreteValue(_) => {
                match other_cls {
                    Some(cls) => self.match_instance_against_type(left, cls, subst, view),
                    None => None,
                }
            }
            Value::SuperInstance(super_instance) => {
                let instance = super_instance
                    .super_obj
                    .unwrap_or_else(|| convert::instance_of(ctx, super_instance.super_cls));
                match other_cls {
                    Some(cls) => self.match_instance_against_type(instance, cls, subst, view),
                    None => None,
                }
            }
            Value::ClassMethod(wrapper) => {
                if other_name == Some(ctx.well.classmethod) || other_name == Some(ctx.well.object) {
                    return Some(subst);
                }
                let bound = self.to_bound_function(wrapper.method);
                self.match_type_against_type(bound, other_value, subst, view)
            }
            Value::StaticMethod(wrapper) => {
                if other_name == Some(ctx.well.staticmethod)
                    || other_name == Some(ctx.well.object)
                {
                    return Some(subst);
                }
                self.match_type_against_type(wrapper.method, other_value, subst, view)
            }
            Value::Union(union) => {
                let options = union.options.clone();
                for option in options {
                    if let Some(new_subst) =
                        self.match_type_against_type(option, other_value, subst.clone(), view)
                    {
                        return Some(new_subst);
                    }
                }
                None
            }
            Value::TypeParameterInstance(tpi) => {
                let param = tpi.param;
                if let ParamOwner::Value(owner) = &tpi.owner {
                    let owner = *owner;
                    let full_name = match &*ctx.values.get(param) {
                        Value::TypeParameter(p) => p.full_name,
                        _ => return None,
                    };
                    if let Value::Instance(instance) = &*ctx.values.get(owner) {
                        if let Some(&var) = instance.type_params.get(&full_name) {
                            let data = ctx.program.data(var);
                            // A parameter that resolves to itself would
                            // recurse forever; fall through to the
                            // upper-bound instantiation instead.
                            if !data.is_empty() && !data.contains(&left) {
                                return self.match_all_bindings(var, other_value, subst, view);
                            }
                        }
                    }
                }
                self.instantiate_and_match(param, other_value, subst, view, None)
            }
            _ => {
                error!("matching not implemented for this value kind");
                None
            }
        }
    }

    fn to_bound_function(&self, method: ValueId) -> ValueId {
        let ctx = self.ctx;
        let name = match &*ctx.values.get(method) {
            Value::Function(f) => f.name,
            Value::NativeFunction(f) => f.name,
            _ => ctx.intern("<bound>"),
        };
        let callself = ctx
            .program
            .new_variable_with(&[ctx.primitives.unsolvable], self.node);
        ctx.values.alloc(Value::BoundMethod(Box::new(BoundMethodValue {
            name,
            underlying: method,
            callself,
        })))
    }

    /// Checks whether an instance of a type is compatible with a formal
    /// type.
    pub(crate) fn match_instance_against_type(
        &mut self,
        left: ValueId,
        other_cls: ClassId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let other_def = ctx.classes.get(other_cls);

        if let ClassKind::Literal(literal) = &other_def.kind {
            return self.match_against_literal(left, literal.value, subst);
        }
        if matches!(other_def.kind, ClassKind::TypedDict(_)) {
            if !self.match_dict_against_typed_dict(left, other_cls) {
                return None;
            }
            return Some(subst);
        }

        let Some(left_cls) = value_class(ctx, left) else {
            warn!("instance match on value without a class");
            return None;
        };
        if !self.satisfies_noniterable_str(left_cls, other_cls) {
            self.noniterable_str_error = Some(crate::errors::NonIterableStrError {
                left_type: left_cls,
                other_type: other_cls,
            });
            return None;
        }
        match self.match_from_mro(left_cls, other_cls, true) {
            None => {
                if other_def.is_protocol() {
                    self.match_protocol_tracked(left, other_cls, subst, view)
                } else if other_def.has_protocol_base() {
                    // A protocol with no attributes to check: everything
                    // matches.
                    Some(subst)
                } else {
                    None
                }
            }
            Some(MroEntry::Ambiguous) | Some(MroEntry::Empty) => {
                // An ambiguous base class matches everything; the
                // parameterized path puts the right names in subst.
                if !matches!(other_def.kind, ClassKind::Simple) {
                    let other_value = ctx.values.alloc(Value::Class(other_cls));
                    Some(self.subst_with_type_parameters_from(subst, other_value))
                } else {
                    Some(subst)
                }
            }
            Some(MroEntry::Class(base)) => {
                self.match_instance(base, left, other_cls, subst, view)
            }
        }
    }

    fn match_against_literal(
        &mut self,
        left: ValueId,
        literal_value: ValueId,
        subst: Subst,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        match (&*ctx.values.get(left), &*ctx.values.get(literal_value)) {
            (Value::ConcreteValue(left_concrete), Value::ConcreteValue(other_concrete)) => {
                if left_concrete.pyval == other_concrete.pyval {
                    Some(subst)
                } else {
                    None
                }
            }
            (Value::Instance(left_instance), Value::Instance(other_instance))
                if ctx.classes.get(left_instance.cls).is_enum()
                    && ctx.classes.get(other_instance.cls).is_enum() =>
            {
                let names_match = left_instance.enum_member == other_instance.enum_member
                    && left_instance.enum_member.is_some();
                let clses_match = left_instance.cls == other_instance.cls;
                if names_match && clses_match {
                    Some(subst)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// One successfully matched MRO entry; do any remaining matching
    /// special to the formal type.
    fn match_instance(
        &mut self,
        base: ClassId,
        instance: ValueId,
        other_cls: ClassId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let base_is_tuple = matches!(ctx.classes.get(base).kind, ClassKind::Tuple(_));
        let other_is_tuple = matches!(ctx.classes.get(other_cls).kind, ClassKind::Tuple(_));
        let instance_is_tuple = matches!(&*ctx.values.get(instance), Value::Tuple(_));
        if base_is_tuple || instance_is_tuple || other_is_tuple {
            return self.match_heterogeneous_tuple_instance(base, instance, other_cls, subst, view);
        }
        let base_is_callable = matches!(ctx.classes.get(base).kind, ClassKind::Callable(_));
        let other_is_callable = matches!(ctx.classes.get(other_cls).kind, ClassKind::Callable(_));
        if base_is_callable || other_is_callable {
            return self.match_callable_instance(base, instance, other_cls, subst, view);
        }
        self.match_maybe_parameterized_instance(base, instance, other_cls, subst, view)
    }

    /// General parameterized-class matching: walk the template and
    /// recurse into each formal parameter.
    pub(crate) fn match_maybe_parameterized_instance(
        &mut self,
        base: ClassId,
        instance: ValueId,
        other_cls: ClassId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let other_def = ctx.classes.get(other_cls);
        let ClassKind::Parameterized(other_params) = &other_def.kind else {
            return Some(subst);
        };

        // Parameterized classes can rename type parameters, so the
        // template for lookup comes from the instance side when it is
        // itself parameterized; otherwise the names in the formal type
        // are safe to use.
        let lookup_cls = match &ctx.classes.get(base).kind {
            ClassKind::Parameterized(_) => base,
            _ => other_cls,
        };
        let lookup_def = ctx.classes.get(lookup_cls);
        for (name, alias) in &lookup_def.param_aliases {
            subst.aliases().alias(*name, *alias);
        }

        let mut subst = subst;
        let mut view = view.clone();
        for &template_param in &lookup_def.template {
            let template_value = ctx.values.get(template_param);
            let Value::TypeParameter(param) = &*template_value else {
                continue;
            };
            let class_param = other_params
                .formal_params
                .get(&param.name)
                .copied()
                .unwrap_or(ctx.primitives.unsolvable);
            let mut instance_param =
                self.instance_type_parameter(instance, param.full_name);
            let instance_type_param = ctx
                .classes
                .formal_type_parameter(lookup_cls, param.name);
            if self.ctx.program.binding_count(instance_param) == 0 {
                if let Some(renamed) = instance_type_param {
                    if let Value::TypeParameter(renamed_param) = &*ctx.values.get(renamed) {
                        if renamed_param.name != param.name {
                            // This type parameter was renamed!
                            instance_param =
                                self.instance_type_parameter(instance, renamed_param.full_name);
                        }
                    }
                }
            }
            // Parameter variables the outer view does not fix are pinned
            // to their sole binding; ambiguous ones stay unfixed and are
            // handled by the view enumeration above us.
            if ctx.program.binding_count(instance_param) == 1 && !view.contains(instance_param) {
                view.set(instance_param, 0);
            }
            subst = self.match_var_against_type(instance_param, class_param, &subst, &view)?;
        }
        Some(subst)
    }

    /// The instance's variable for a type parameter, an empty variable
    /// when the instance does not track it.
    pub(crate) fn instance_type_parameter(
        &self,
        instance: ValueId,
        full_name: pyz_common::Name,
    ) -> pyz_abstract::VarId {
        let ctx = self.ctx;
        match &*ctx.values.get(instance) {
            Value::Instance(inst) => inst
                .type_params
                .get(&full_name)
                .copied()
                .unwrap_or_else(|| ctx.program.new_variable()),
            Value::Dict(dict) => dict
                .type_params
                .get(&full_name)
                .copied()
                .unwrap_or_else(|| ctx.program.new_variable()),
            _ => ctx.program.new_variable(),
        }
    }

    /// Fixed-arity tuple matching.
    fn match_heterogeneous_tuple_instance(
        &mut self,
        base: ClassId,
        instance: ValueId,
        other_cls: ClassId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let other_def = ctx.classes.get(other_cls);
        if let Value::Tuple(tuple) = &*ctx.values.get(instance) {
            let mut subst = subst;
            match &other_def.kind {
                ClassKind::Tuple(other_tuple) => {
                    if tuple.elements.len() != other_tuple.elements.len() {
                        return None;
                    }
                    for (&element, &formal) in tuple.elements.iter().zip(&other_tuple.elements) {
                        subst = self.match_var_against_type(element, formal, &subst, view)?;
                    }
                }
                ClassKind::Parameterized(p) => {
                    let class_param = p
                        .formal_params
                        .get(&ctx.well.t)
                        .copied()
                        .unwrap_or(ctx.primitives.unsolvable);
                    // Copying parameters directly preserves literal
                    // values. Substituting a concrete tuple into an
                    // abstract one typically happens during iteration,
                    // when values are indeed preserved.
                    let base_t_full =
                        ctx.full_param_name(ctx.classes.full_name(base), ctx.well.t);
                    let copy_target = match &*ctx.values.get(class_param) {
                        Value::TypeParameter(cp) if cp.full_name == base_t_full => {
                            Some(cp.full_name)
                        }
                        _ => None,
                    };
                    // Merging the new results prematurely would trip the
                    // common-superclass policy, so collect them all first.
                    let mut new_substs = Vec::new();
                    for &element in &tuple.elements {
                        if let Some(full) = copy_target.filter(|_| ctx.program.binding_count(element) > 0) {
                            let mut direct = Subst::with_aliases(subst.aliases().clone());
                            let chosen = view.binding_for(&ctx.program, element);
                            let var = ctx.program.new_variable();
                            match chosen {
                                Some(binding) => {
                                    ctx.program.paste_binding(var, binding, self.node)
                                }
                                None => ctx.program.paste_variable(var, element, self.node),
                            }
                            direct.insert(full, var);
                            new_substs.push(direct);
                        } else {
                            let new_subst =
                                self.match_var_against_type(element, class_param, &subst, view)?;
                            new_substs.push(new_subst);
                        }
                    }
                    if !new_substs.is_empty() {
                        subst = merge_substs(ctx, self.node, &subst, &new_substs);
                    }
                }
                _ => {}
            }
            if tuple.elements.is_empty() {
                // Puts the right parameter names (with empty values)
                // into subst.
                subst = self
                    .match_maybe_parameterized_instance(base, instance, other_cls, subst, view)?;
            }
            Some(subst)
        } else if matches!(ctx.classes.get(base).kind, ClassKind::Tuple(_)) {
            // An instance of a subclass of a fixed tuple type.
            let base_value = ctx.values.alloc(Value::Class(base));
            let other_value = ctx.values.alloc(Value::Class(other_cls));
            self.instantiate_and_match(base_value, other_value, subst, view, None)
        } else {
            debug_assert!(matches!(other_def.kind, ClassKind::Tuple(_)));
            let ClassKind::Tuple(other_tuple) = &other_def.kind else {
                return Some(subst);
            };
            let mut subst = subst;
            let tuple_t_full = ctx.full_param_name(ctx.well.tuple_, ctx.well.t);
            let instance_param = self.instance_type_parameter(instance, tuple_t_full);
            for &formal in &other_tuple.elements {
                subst = self.match_var_against_type(instance_param, formal, &subst, view)?;
            }
            Some(subst)
        }
    }

    /// Callable-instance matching: return type first, then exact arg
    /// count, then pairwise contravariant argument types.
    fn match_callable_instance(
        &mut self,
        base: ClassId,
        instance: ValueId,
        other_cls: ClassId,
        subst: Subst,
        view: &View,
    ) -> Option<Subst> {
        let ctx = self.ctx;
        let other_def = ctx.classes.get(other_cls);
        let instance_is_simple = matches!(
            &*ctx.values.get(instance),
            Value::Instance(_) | Value::Dict(_) | Value::Tuple(_)
        );
        let other_parameterized = !matches!(other_def.kind, ClassKind::Simple);
        if !instance_is_simple || !other_parameterized {
            return Some(subst);
        }
        let ret_full = ctx.full_param_name(ctx.well.callable, ctx.well.ret);
        let instance_ret = self.instance_type_parameter(instance, ret_full);
        let other_ret = match &other_def.kind {
            ClassKind::Callable(c) => c.ret,
            ClassKind::Parameterized(p) => p
                .formal_params
                .get(&ctx.well.ret)
                .copied()
                .unwrap_or(ctx.primitives.unsolvable),
            _ => ctx.primitives.unsolvable,
        };
        let mut subst = self.match_var_against_type(instance_ret, other_ret, &subst, view)?;

        let left_args = match &ctx.classes.get(base).kind {
            ClassKind::Callable(c) => c.params.clone(),
            _ => None,
        };
        let right_args = match &other_def.kind {
            ClassKind::Callable(c) => c.params.clone(),
            _ => None,
        };
        let (Some(left_args), Some(right_args)) = (left_args, right_args) else {
            // One side doesn't specify arg types; nothing left to check.
            return Some(subst);
        };
        if left_args.len() != right_args.len() {
            return None;
        }
        let counts = self.single_typevar_counts(other_cls);
        for (&left_arg, &right_arg) in left_args.iter().zip(&right_args) {
            if let Some(new_subst) =
                self.single_typevar_match(left_arg, right_arg, &counts, &subst)
            {
                subst = new_subst;
            } else {
                // Flip actual and expected to enforce contravariance of
                // argument types.
                subst = self.instantiate_and_match(
                    right_arg,
                    left_arg,
                    subst,
                    view,
                    Some(&ParamOwner::CallableArgs(other_cls)),
                )?;
            }
        }
        Some(subst)
    }
}
