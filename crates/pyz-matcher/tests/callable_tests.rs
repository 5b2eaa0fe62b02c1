//! Function and callable matching: arity, contravariant arguments, and
//! the single-TypeVar short-circuit.

use pyz_abstract::{convert, testing, Ctx, TableHost, Value};
use pyz_common::NameInterner;
use pyz_matcher::AbstractMatcher;

static HOST: TableHost = TableHost;

fn new_ctx(names: &NameInterner) -> Ctx<'_> {
    Ctx::new(names, &HOST)
}

fn callable(
    ctx: &Ctx,
    params: Option<Vec<pyz_abstract::ValueId>>,
    ret: pyz_abstract::ValueId,
) -> pyz_abstract::ValueId {
    testing::class_value(ctx, ctx.classes.callable_class(ctx.primitives.callable, params, ret))
}

#[test]
fn test_any_function_matches_bare_callable() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let func = testing::method(&ctx, "f", &[("x", None), ("y", None)], None);
    let var = testing::var_of(&ctx, func);
    let bare = testing::class_value(&ctx, ctx.primitives.callable);
    assert!(matcher.bad_matches(var, bare).is_empty());
}

#[test]
fn test_arity_must_fit() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let int_class = testing::class_value(&ctx, ctx.primitives.int);
    let func = testing::method(&ctx, "f", &[("x", Some(int_class)), ("y", Some(int_class))], None);
    let var = testing::var_of(&ctx, func);
    // Two mandatory parameters cannot satisfy a one-argument callable.
    let unary = callable(&ctx, Some(vec![int_class]), ctx.primitives.unsolvable);
    assert_eq!(matcher.bad_matches(var, unary).len(), 1);
    let binary = callable(&ctx, Some(vec![int_class, int_class]), ctx.primitives.unsolvable);
    assert!(matcher.bad_matches(var, binary).is_empty());
}

#[test]
fn test_argument_contravariance() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let int_class = testing::class_value(&ctx, ctx.primitives.int);
    let object_class = testing::class_value(&ctx, ctx.primitives.object);
    // f(x: object) satisfies Callable[[int], Any]: the declared
    // parameter may be wider than the expected one.
    let wide = testing::method(&ctx, "f", &[("x", Some(object_class))], None);
    let var = testing::var_of(&ctx, wide);
    let expects_int = callable(&ctx, Some(vec![int_class]), ctx.primitives.unsolvable);
    assert!(matcher.bad_matches(var, expects_int).is_empty());
    // f(x: int) does not satisfy Callable[[object], Any].
    let narrow = testing::method(&ctx, "f", &[("x", Some(int_class))], None);
    let var = testing::var_of(&ctx, narrow);
    let expects_object = callable(&ctx, Some(vec![object_class]), ctx.primitives.unsolvable);
    assert_eq!(matcher.bad_matches(var, expects_object).len(), 1);
}

#[test]
fn test_return_type_is_covariant() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let int_class = testing::class_value(&ctx, ctx.primitives.int);
    let float_class = testing::class_value(&ctx, ctx.primitives.float);
    // f() -> int satisfies Callable[[], float] (compat builtins).
    let func = testing::method(&ctx, "f", &[], Some(int_class));
    let var = testing::var_of(&ctx, func);
    let wants_float = callable(&ctx, Some(vec![]), float_class);
    assert!(matcher.bad_matches(var, wants_float).is_empty());
    // f() -> float does not satisfy Callable[[], int].
    let func = testing::method(&ctx, "f", &[], Some(float_class));
    let var = testing::var_of(&ctx, func);
    let wants_int = callable(&ctx, Some(vec![]), int_class);
    assert_eq!(matcher.bad_matches(var, wants_int).len(), 1);
}

#[test]
fn test_single_typevar_short_circuit_one_shot() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    // def f(x: S) -> S matched against Callable[[T], Any]: T occurs
    // once, so the polymorphic argument is accepted as-is.
    let s = ctx.new_type_param(names.intern("m.f"), names.intern("S"), None, Vec::new());
    let t = ctx.new_type_param(names.intern("m.g"), names.intern("T"), None, Vec::new());
    let t_full = names.intern("m.g.T");
    let func = testing::method(&ctx, "f", &[("x", Some(s))], Some(s));
    let var = testing::var_of(&ctx, func);
    let one_shot = callable(&ctx, Some(vec![t]), ctx.primitives.unsolvable);
    let subst = matcher
        .match_var_against_type(var, one_shot, &pyz_matcher::Subst::new(), &pyz_abstract::View::new())
        .expect("polymorphic f matches Callable[[T], Any]");
    // T is bound to an empty placeholder, not forced open.
    let data = ctx.program.data(subst.get(t_full).unwrap());
    assert_eq!(data.len(), 1);
    assert!(matches!(&*ctx.values.get(data[0]), Value::Empty));
}

#[test]
fn test_single_typevar_repeated_occurrence_uses_normal_matching() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    // Callable[[T], T]: T occurs twice, so the short-circuit must not
    // fire; matching still succeeds through TypeVar-vs-TypeVar rules.
    let s = ctx.new_type_param(names.intern("m.f"), names.intern("S"), None, Vec::new());
    let t = ctx.new_type_param(names.intern("m.g"), names.intern("T"), None, Vec::new());
    let func = testing::method(&ctx, "f", &[("x", Some(s))], Some(s));
    let var = testing::var_of(&ctx, func);
    let repeated = callable(&ctx, Some(vec![t]), t);
    assert!(matcher.bad_matches(var, repeated).is_empty());
}

#[test]
fn test_constrained_left_typevar_respects_bound_target() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    // AnyStr is constrained to str|bytes; a callable expecting a
    // T bounded by int cannot accept it.
    let constraints = vec![
        testing::class_value(&ctx, ctx.primitives.str_),
        testing::class_value(&ctx, ctx.primitives.bytes),
    ];
    let anystr = ctx.new_type_param(names.intern("m.f"), names.intern("AnyStr"), None, constraints);
    let bound = testing::class_value(&ctx, ctx.primitives.int);
    let t = ctx.new_type_param(names.intern("m.g"), names.intern("T"), Some(bound), Vec::new());
    let func = testing::method(&ctx, "f", &[("x", Some(anystr))], None);
    let var = testing::var_of(&ctx, func);
    let expects = callable(&ctx, Some(vec![t]), t);
    assert_eq!(matcher.bad_matches(var, expects).len(), 1);
}

#[test]
fn test_callable_instance_contravariance() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let int_class = testing::class_value(&ctx, ctx.primitives.int);
    let object_class = testing::class_value(&ctx, ctx.primitives.object);
    // A value of type Callable[[object], int] matches the formal
    // Callable[[int], int] but not vice versa.
    let wide_cls = ctx.classes.callable_class(
        ctx.primitives.callable,
        Some(vec![object_class]),
        int_class,
    );
    let wide_value = {
        let var = convert::instantiate(
            &ctx,
            testing::class_value(&ctx, wide_cls),
            None,
            ctx.root_node,
        );
        ctx.program.data(var)[0]
    };
    let var = testing::var_of(&ctx, wide_value);
    let narrow = callable(&ctx, Some(vec![int_class]), int_class);
    assert!(matcher.bad_matches(var, narrow).is_empty());

    let narrow_cls = ctx.classes.callable_class(
        ctx.primitives.callable,
        Some(vec![int_class]),
        int_class,
    );
    let narrow_value = {
        let var = convert::instantiate(
            &ctx,
            testing::class_value(&ctx, narrow_cls),
            None,
            ctx.root_node,
        );
        ctx.program.data(var)[0]
    };
    let var = testing::var_of(&ctx, narrow_value);
    let wide = callable(&ctx, Some(vec![object_class]), int_class);
    assert_eq!(matcher.bad_matches(var, wide).len(), 1);
}
