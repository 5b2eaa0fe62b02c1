//! End-to-end matching through the public surface: `compute_subst`,
//! `bad_matches` and `match_from_mro` against the table-backed host.

use pyz_abstract::{convert, testing, BindingRef, Ctx, MroEntry, TableHost, Value, View};
use pyz_common::NameInterner;
use pyz_matcher::{AbstractMatcher, Subst};
use rustc_hash::FxHashMap;

static HOST: TableHost = TableHost;

fn new_ctx(names: &NameInterner) -> Ctx<'_> {
    Ctx::new(names, &HOST)
}

fn single_binding(ctx: &Ctx, value: pyz_abstract::ValueId) -> BindingRef {
    let var = testing::var_of(ctx, value);
    BindingRef::new(var, 0)
}

#[test]
fn test_instance_matches_its_own_class() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let c = testing::class(&ctx, "m.C", &[ctx.primitives.object]);
    let instance = testing::instance(&ctx, c);
    let var = testing::var_of(&ctx, instance);
    let formal = testing::class_value(&ctx, c);
    assert!(matcher.bad_matches(var, formal).is_empty());
}

#[test]
fn test_class_matches_itself_as_a_type() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let c = testing::class(&ctx, "m.C", &[ctx.primitives.object]);
    let c_value = testing::class_value(&ctx, c);
    let var = testing::var_of(&ctx, c_value);
    // C against type[C].
    let mut params = indexmap::IndexMap::new();
    params.insert(ctx.well.t, c_value);
    let type_of_c = ctx.classes.parameterize(ctx.primitives.type_, params);
    assert!(matcher.bad_matches(var, testing::class_value(&ctx, type_of_c)).is_empty());
    // And against itself.
    assert!(matcher.bad_matches(var, c_value).is_empty());
}

#[test]
fn test_int_matches_float_via_compat_builtins() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let int_instance = convert::instance_of(&ctx, ctx.primitives.int);
    let var = testing::var_of(&ctx, int_instance);
    let float_class = testing::class_value(&ctx, ctx.primitives.float);
    assert!(matcher.bad_matches(var, float_class).is_empty());
    // But not the other way around.
    let float_instance = convert::instance_of(&ctx, ctx.primitives.float);
    let var = testing::var_of(&ctx, float_instance);
    let int_class = testing::class_value(&ctx, ctx.primitives.int);
    assert_eq!(matcher.bad_matches(var, int_class).len(), 1);
}

#[test]
fn test_str_against_iterable_str_reports_noniterable_str() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let str_instance = convert::instance_of(&ctx, ctx.primitives.str_);
    let var = testing::var_of(&ctx, str_instance);
    let iterable_str = testing::parameterized(
        &ctx,
        ctx.primitives.iterable,
        &[testing::class_value(&ctx, ctx.primitives.str_)],
    );
    let bad = matcher.bad_matches(var, testing::class_value(&ctx, iterable_str));
    assert_eq!(bad.len(), 1);
    let details = &bad[0].1;
    let err = details.noniterable_str.as_ref().expect("noniterable-str error");
    assert_eq!(err.left_type, ctx.primitives.str_);
    assert_eq!(err.other_type, iterable_str);
}

#[test]
fn test_list_of_int_matches_list_of_int() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let value = testing::list_instance(&ctx, ctx.primitives.int);
    let var = testing::var_of(&ctx, value);
    let formal = testing::class_value(&ctx, testing::list_of(&ctx, ctx.primitives.int));
    assert!(matcher.bad_matches(var, formal).is_empty());
    // list[int] does not match list[str].
    let wrong = testing::class_value(&ctx, testing::list_of(&ctx, ctx.primitives.str_));
    assert_eq!(matcher.bad_matches(var, wrong).len(), 1);
}

#[test]
fn test_unsolvable_short_circuits() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let var = testing::var_of(&ctx, ctx.primitives.unsolvable);
    let int_class = testing::class_value(&ctx, ctx.primitives.int);
    assert!(matcher.bad_matches(var, int_class).is_empty());
    let int_instance = convert::instance_of(&ctx, ctx.primitives.int);
    let var = testing::var_of(&ctx, int_instance);
    assert!(matcher.bad_matches(var, ctx.primitives.unsolvable).is_empty());
}

#[test]
fn test_match_from_mro_is_idempotent() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let first = matcher.match_from_mro(ctx.primitives.bool_, ctx.primitives.int, true);
    let second = matcher.match_from_mro(ctx.primitives.bool_, ctx.primitives.int, true);
    assert_eq!(first, second);
    assert_eq!(first, Some(MroEntry::Class(ctx.primitives.int)));
    // The compat flag is honored.
    assert_eq!(
        matcher.match_from_mro(ctx.primitives.int, ctx.primitives.float, false),
        None
    );
}

#[test]
fn test_compute_subst_empty_args_succeeds() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let (subst, bad) = matcher.compute_subst(&[], &FxHashMap::default(), &View::new(), None);
    assert!(bad.is_none());
    assert!(subst.expect("empty call succeeds").is_empty());
}

#[test]
fn test_compute_subst_unconstrained_rejects_mixed_types() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let t = ctx.new_type_param(names.intern("m.f"), names.intern("T"), None, Vec::new());
    let x = names.intern("x");
    let y = names.intern("y");
    let mut args = FxHashMap::default();
    args.insert(x, single_binding(&ctx, convert::instance_of(&ctx, ctx.primitives.int)));
    args.insert(y, single_binding(&ctx, convert::instance_of(&ctx, ctx.primitives.str_)));
    let (subst, bad) = matcher.compute_subst(&[(x, t), (y, t)], &args, &View::new(), None);
    assert!(subst.is_none());
    // The common-superclass policy rejects the pair at `y`.
    assert_eq!(bad.expect("bad param").name, y);
}

#[test]
fn test_compute_subst_constrained_rejects_mixed_types() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let constraints = vec![
        testing::class_value(&ctx, ctx.primitives.int),
        testing::class_value(&ctx, ctx.primitives.str_),
    ];
    let t = ctx.new_type_param(names.intern("m.f"), names.intern("T"), None, constraints);
    let x = names.intern("x");
    let y = names.intern("y");
    let mut args = FxHashMap::default();
    args.insert(x, single_binding(&ctx, convert::instance_of(&ctx, ctx.primitives.int)));
    args.insert(y, single_binding(&ctx, convert::instance_of(&ctx, ctx.primitives.str_)));
    let (subst, bad) = matcher.compute_subst(&[(x, t), (y, t)], &args, &View::new(), None);
    // The single-type policy rejects int and str both bound to T.
    assert!(subst.is_none());
    assert!(bad.is_some());
}

#[test]
fn test_compute_subst_bounded_accumulates_union() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let bound = testing::class_value(&ctx, ctx.primitives.object);
    let t = ctx.new_type_param(names.intern("m.f"), names.intern("T"), Some(bound), Vec::new());
    let t_full = names.intern("m.f.T");
    let x = names.intern("x");
    let y = names.intern("y");
    let mut args = FxHashMap::default();
    args.insert(x, single_binding(&ctx, convert::instance_of(&ctx, ctx.primitives.int)));
    args.insert(y, single_binding(&ctx, convert::instance_of(&ctx, ctx.primitives.str_)));
    let (subst, bad) = matcher.compute_subst(&[(x, t), (y, t)], &args, &View::new(), None);
    assert!(bad.is_none());
    let subst = subst.expect("object-bounded T accepts the pair");
    // T := Union[int, str]
    let data = ctx.program.data(subst.get(t_full).unwrap());
    assert_eq!(data.len(), 2);
}

#[test]
fn test_compute_subst_failure_renders_expected_type() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let bound = testing::class_value(&ctx, ctx.primitives.int);
    let t = ctx.new_type_param(names.intern("m.f"), names.intern("T"), Some(bound), Vec::new());
    let x = names.intern("x");
    let mut args = FxHashMap::default();
    args.insert(x, single_binding(&ctx, convert::instance_of(&ctx, ctx.primitives.str_)));
    let (subst, bad) = matcher.compute_subst(&[(x, t)], &args, &View::new(), None);
    assert!(subst.is_none());
    let bad = bad.expect("bad param");
    assert_eq!(bad.name, x);
    // The expected type was reconstructed through the error
    // substitution: the bound's class, not a bare type variable.
    assert!(matches!(
        &*ctx.values.get(bad.expected),
        Value::Class(cls) if *cls == ctx.primitives.int
    ));
}

#[test]
fn test_substitution_monotonicity() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let t = ctx.new_type_param(names.intern("m.f"), names.intern("T"), None, Vec::new());
    let t_full = names.intern("m.f.T");
    let int_instance = convert::instance_of(&ctx, ctx.primitives.int);
    let bool_instance = convert::instance_of(&ctx, ctx.primitives.bool_);
    let var = testing::var_of(&ctx, int_instance);
    let subst = matcher
        .match_var_against_type(var, t, &Subst::new(), &View::new())
        .expect("T binds int");
    let before = ctx.program.data(subst.get(t_full).unwrap());
    let var2 = testing::var_of(&ctx, bool_instance);
    let subst2 = matcher
        .match_var_against_type(var2, t, &subst, &View::new())
        .expect("bool shares int with the previous value");
    let after = ctx.program.data(subst2.get(t_full).unwrap());
    for value in before {
        assert!(after.contains(&value), "old bindings are never dropped");
    }
}

#[test]
fn test_module_matches_module_type() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let module = ctx.values.alloc(Value::Module(Box::new(
        pyz_abstract::value::ModuleValue {
            name: names.intern("m.sys"),
            members: indexmap::IndexMap::new(),
        },
    )));
    let var = testing::var_of(&ctx, module);
    let module_class = testing::class_value(&ctx, ctx.primitives.module);
    assert!(matcher.bad_matches(var, module_class).is_empty());
    let int_class = testing::class_value(&ctx, ctx.primitives.int);
    assert_eq!(matcher.bad_matches(var, int_class).len(), 1);
}

#[test]
fn test_tuple_matching() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let int_instance = convert::instance_of(&ctx, ctx.primitives.int);
    let str_instance = convert::instance_of(&ctx, ctx.primitives.str_);
    let tuple_value = ctx.values.alloc(Value::Tuple(Box::new(
        pyz_abstract::value::TupleValue {
            cls: ctx.classes.tuple_class(
                ctx.primitives.tuple,
                vec![
                    testing::class_value(&ctx, ctx.primitives.int),
                    testing::class_value(&ctx, ctx.primitives.str_),
                ],
            ),
            elements: vec![
                testing::var_of(&ctx, int_instance),
                testing::var_of(&ctx, str_instance),
            ],
        },
    )));
    let var = testing::var_of(&ctx, tuple_value);
    // Exact arity and element types match.
    let formal = ctx.classes.tuple_class(
        ctx.primitives.tuple,
        vec![
            testing::class_value(&ctx, ctx.primitives.int),
            testing::class_value(&ctx, ctx.primitives.str_),
        ],
    );
    assert!(matcher.bad_matches(var, testing::class_value(&ctx, formal)).is_empty());
    // Wrong arity fails.
    let short = ctx.classes.tuple_class(
        ctx.primitives.tuple,
        vec![testing::class_value(&ctx, ctx.primitives.int)],
    );
    assert_eq!(matcher.bad_matches(var, testing::class_value(&ctx, short)).len(), 1);
    // Wrong element type fails.
    let wrong = ctx.classes.tuple_class(
        ctx.primitives.tuple,
        vec![
            testing::class_value(&ctx, ctx.primitives.str_),
            testing::class_value(&ctx, ctx.primitives.str_),
        ],
    );
    assert_eq!(matcher.bad_matches(var, testing::class_value(&ctx, wrong)).len(), 1);
}
