//! Structural protocol matching: success, attribute-type mismatches,
//! missing attributes, cycles, callback protocols.

use pyz_abstract::class::ClassFlags;
use pyz_abstract::{convert, testing, Ctx, TableHost};
use pyz_common::NameInterner;
use pyz_matcher::{AbstractMatcher, ProtocolError};

static HOST: TableHost = TableHost;

fn new_ctx(names: &NameInterner) -> Ctx<'_> {
    Ctx::new(names, &HOST)
}

/// A protocol with a single method `foo(self) -> <ret>`.
fn foo_protocol(ctx: &Ctx, ret: pyz_abstract::ClassId) -> pyz_abstract::ClassId {
    let foo = testing::method(
        ctx,
        "foo",
        &[("self", None)],
        Some(testing::class_value(ctx, ret)),
    );
    testing::protocol(ctx, "m.HasFoo", &[("foo", foo)])
}

#[test]
fn test_protocol_match_succeeds() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let protocol = foo_protocol(&ctx, ctx.primitives.int);
    let foo = testing::method(
        &ctx,
        "foo",
        &[("self", None)],
        Some(testing::class_value(&ctx, ctx.primitives.int)),
    );
    let c = testing::class_with_attrs(&ctx, "m.C", &[ctx.primitives.object], &[("foo", foo)]);
    let var = testing::var_of(&ctx, testing::instance(&ctx, c));
    assert!(matcher
        .bad_matches(var, testing::class_value(&ctx, protocol))
        .is_empty());
}

#[test]
fn test_protocol_attribute_type_mismatch() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let protocol = foo_protocol(&ctx, ctx.primitives.int);
    // C.foo returns str instead of int.
    let foo = testing::method(
        &ctx,
        "foo",
        &[("self", None)],
        Some(testing::class_value(&ctx, ctx.primitives.str_)),
    );
    let c = testing::class_with_attrs(&ctx, "m.C", &[ctx.primitives.object], &[("foo", foo)]);
    let var = testing::var_of(&ctx, testing::instance(&ctx, c));
    let bad = matcher.bad_matches(var, testing::class_value(&ctx, protocol));
    assert_eq!(bad.len(), 1);
    match bad[0].1.protocol.as_ref().expect("protocol error") {
        ProtocolError::Type(err) => {
            assert_eq!(err.left_type, c);
            assert_eq!(err.other_type, protocol);
            assert_eq!(names.resolve(err.attribute), "foo");
        }
        other => panic!("expected a type error, got {other:?}"),
    }
}

#[test]
fn test_protocol_missing_attributes() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let protocol = foo_protocol(&ctx, ctx.primitives.int);
    let c = testing::class(&ctx, "m.C", &[ctx.primitives.object]);
    let var = testing::var_of(&ctx, testing::instance(&ctx, c));
    let bad = matcher.bad_matches(var, testing::class_value(&ctx, protocol));
    assert_eq!(bad.len(), 1);
    match bad[0].1.protocol.as_ref().expect("protocol error") {
        ProtocolError::MissingAttributes(err) => {
            assert_eq!(err.missing.len(), 1);
            assert_eq!(names.resolve(err.missing[0]), "foo");
        }
        other => panic!("expected missing attributes, got {other:?}"),
    }
}

#[test]
fn test_self_returning_protocol_terminates() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    // P.clone() -> P, C.clone() -> C: matching must terminate.
    let placeholder_method = testing::method(&ctx, "clone", &[("self", None)], None);
    let protocol = testing::protocol(&ctx, "m.Cloneable", &[("clone", placeholder_method)]);
    let clone_p = testing::method(
        &ctx,
        "clone",
        &[("self", None)],
        Some(testing::class_value(&ctx, protocol)),
    );
    let mut patched = (*ctx.classes.get(protocol)).clone();
    patched
        .own_attributes
        .insert(names.intern("clone"), testing::var_of(&ctx, clone_p));
    ctx.classes.replace(protocol, patched);

    let c = testing::class(&ctx, "m.C", &[ctx.primitives.object]);
    let clone_c = testing::method(
        &ctx,
        "clone",
        &[("self", None)],
        Some(testing::class_value(&ctx, c)),
    );
    let mut c_def = (*ctx.classes.get(c)).clone();
    c_def
        .own_attributes
        .insert(names.intern("clone"), testing::var_of(&ctx, clone_c));
    ctx.classes.replace(c, c_def);

    let var = testing::var_of(&ctx, testing::instance(&ctx, c));
    assert!(matcher
        .bad_matches(var, testing::class_value(&ctx, protocol))
        .is_empty());
}

#[test]
fn test_empty_protocol_matches_everything() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let mut def = pyz_abstract::ClassDef::new(names.intern("m.Empty"));
    def.flags = ClassFlags::PROTOCOL_BASE;
    let empty_protocol = ctx.classes.define(def, &[ctx.primitives.protocol]);
    let int_instance = convert::instance_of(&ctx, ctx.primitives.int);
    let var = testing::var_of(&ctx, int_instance);
    assert!(matcher
        .bad_matches(var, testing::class_value(&ctx, empty_protocol))
        .is_empty());
}

#[test]
fn test_dynamic_class_matches_protocol() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let protocol = foo_protocol(&ctx, ctx.primitives.int);
    let mut def = pyz_abstract::ClassDef::new(names.intern("m.Dyn"));
    def.flags = ClassFlags::DYNAMIC;
    let dynamic = ctx.classes.define(def, &[ctx.primitives.object]);
    let var = testing::var_of(&ctx, testing::instance(&ctx, dynamic));
    assert!(matcher
        .bad_matches(var, testing::class_value(&ctx, protocol))
        .is_empty());
}

#[test]
fn test_getitem_implies_iter() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    let iter_method = testing::method(&ctx, "__iter__", &[("self", None)], None);
    let protocol = testing::protocol(&ctx, "m.CanIter", &[("__iter__", iter_method)]);
    // C only defines __getitem__; the sequence protocol fills in
    // __iter__.
    let getitem = testing::method(&ctx, "__getitem__", &[("self", None), ("index", None)], None);
    let c = testing::class_with_attrs(
        &ctx,
        "m.Seq",
        &[ctx.primitives.object],
        &[("__getitem__", getitem)],
    );
    let var = testing::var_of(&ctx, testing::instance(&ctx, c));
    assert!(matcher
        .bad_matches(var, testing::class_value(&ctx, protocol))
        .is_empty());
}

#[test]
fn test_callback_protocol() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    // class Adder(Protocol): def __call__(self, x: int) -> int
    let call = testing::method(
        &ctx,
        "__call__",
        &[
            ("self", None),
            ("x", Some(testing::class_value(&ctx, ctx.primitives.int))),
        ],
        Some(testing::class_value(&ctx, ctx.primitives.int)),
    );
    let adder = testing::protocol(&ctx, "m.Adder", &[("__call__", call)]);
    // A matching function value.
    let good = testing::method(
        &ctx,
        "add_one",
        &[("x", Some(testing::class_value(&ctx, ctx.primitives.int)))],
        Some(testing::class_value(&ctx, ctx.primitives.int)),
    );
    let var = testing::var_of(&ctx, good);
    assert!(matcher
        .bad_matches(var, testing::class_value(&ctx, adder))
        .is_empty());
    // A function with the wrong return type fails.
    let wrong = testing::method(
        &ctx,
        "stringify",
        &[("x", Some(testing::class_value(&ctx, ctx.primitives.int)))],
        Some(testing::class_value(&ctx, ctx.primitives.str_)),
    );
    let var = testing::var_of(&ctx, wrong);
    assert_eq!(
        matcher
            .bad_matches(var, testing::class_value(&ctx, adder))
            .len(),
        1
    );
}

#[test]
fn test_protocol_with_plain_attribute() {
    let names = NameInterner::new();
    let ctx = new_ctx(&names);
    let mut matcher = AbstractMatcher::new(ctx.root_node, &ctx);
    // class HasName(Protocol): name: str
    let str_instance = convert::instance_of(&ctx, ctx.primitives.str_);
    let protocol = testing::protocol(&ctx, "m.HasName", &[("name", str_instance)]);
    let good = testing::class_with_attrs(
        &ctx,
        "m.Named",
        &[ctx.primitives.object],
        &[("name", convert::instance_of(&ctx, ctx.primitives.str_))],
    );
    let var = testing::var_of(&ctx, testing::instance(&ctx, good));
    assert!(matcher
        .bad_matches(var, testing::class_value(&ctx, protocol))
        .is_empty());
    let wrong = testing::class_with_attrs(
        &ctx,
        "m.Misnamed",
        &[ctx.primitives.object],
        &[("name", convert::instance_of(&ctx, ctx.primitives.int))],
    );
    let var = testing::var_of(&ctx, testing::instance(&ctx, wrong));
    assert_eq!(
        matcher
            .bad_matches(var, testing::class_value(&ctx, protocol))
            .len(),
        1
    );
}
