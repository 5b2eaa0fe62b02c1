//! The shared analysis context.
//!
//! `Ctx` bundles the arenas (classes, values, signatures), the variable
//! program, the interner, the builtin/typing primitives and the host
//! services behind one shared reference, the way the rest of the
//! analyzer expects to consume them.

use crate::class::{ClassDef, ClassFlags, Classes};
use crate::ids::{ClassId, NodeId, ValueId};
use crate::services::Host;
use crate::signature::Sigs;
use crate::value::{InstanceValue, TypeParamValue, Value, Values};
use crate::variable::Program;
use pyz_common::{CompatTable, Name, NameInterner};

/// Interned names the analyzer refers to by identity.
#[derive(Clone, Copy, Debug)]
pub struct WellKnown {
    pub object: Name,
    pub type_: Name,
    pub module: Name,
    pub module_type: Name,
    pub classmethod: Name,
    pub staticmethod: Name,
    pub function: Name,
    pub str_: Name,
    pub unicode: Name,
    pub tuple_: Name,
    pub callable: Name,
    pub hashable: Name,
    pub generic: Name,
    pub protocol: Name,
    pub final_: Name,
    pub literal: Name,
    pub iterable: Name,
    pub sequence: Name,
    pub collection: Name,
    pub container: Name,
    /// Synthesized parameter short names.
    pub t: Name,
    pub k: Name,
    pub v: Name,
    pub args: Name,
    pub ret: Name,
    /// The `return` annotation key.
    pub ret_annot: Name,
    pub self_: Name,
    pub call_method: Name,
    pub iter_method: Name,
    pub getitem_method: Name,
}

impl WellKnown {
    fn new(names: &NameInterner) -> Self {
        WellKnown {
            object: names.intern("builtins.object"),
            type_: names.intern("builtins.type"),
            module: names.intern("builtins.module"),
            module_type: names.intern("types.ModuleType"),
            classmethod: names.intern("builtins.classmethod"),
            staticmethod: names.intern("builtins.staticmethod"),
            function: names.intern("builtins.function"),
            str_: names.intern("builtins.str"),
            unicode: names.intern("builtins.unicode"),
            tuple_: names.intern("builtins.tuple"),
            callable: names.intern("typing.Callable"),
            hashable: names.intern("typing.Hashable"),
            generic: names.intern("typing.Generic"),
            protocol: names.intern("typing.Protocol"),
            final_: names.intern("typing.Final"),
            literal: names.intern("typing.Literal"),
            iterable: names.intern("typing.Iterable"),
            sequence: names.intern("typing.Sequence"),
            collection: names.intern("typing.Collection"),
            container: names.intern("typing.Container"),
            t: names.intern("_T"),
            k: names.intern("_K"),
            v: names.intern("_V"),
            args: names.intern("_ARGS"),
            ret: names.intern("_RET"),
            ret_annot: names.intern("return"),
            self_: names.intern("self"),
            call_method: names.intern("__call__"),
            iter_method: names.intern("__iter__"),
            getitem_method: names.intern("__getitem__"),
        }
    }
}

/// The builtin and typing classes plus the singleton values every
/// analysis needs.
#[derive(Clone, Copy, Debug)]
pub struct Primitives {
    pub object: ClassId,
    pub type_: ClassId,
    pub int: ClassId,
    pub float: ClassId,
    pub complex: ClassId,
    pub bool_: ClassId,
    pub str_: ClassId,
    pub bytes: ClassId,
    pub bytearray: ClassId,
    pub memoryview: ClassId,
    pub none_type: ClassId,
    pub function: ClassId,
    pub module: ClassId,
    pub classmethod: ClassId,
    pub staticmethod: ClassId,
    pub list: ClassId,
    pub dict: ClassId,
    pub set: ClassId,
    pub tuple: ClassId,
    pub generic: ClassId,
    pub protocol: ClassId,
    pub callable: ClassId,
    pub hashable: ClassId,
    pub iterable: ClassId,
    pub sequence: ClassId,
    pub collection: ClassId,
    pub container: ClassId,
    /// Canonical `object()` instance used for formal-value rewriting.
    pub object_instance: ValueId,
    pub none_instance: ValueId,
    pub unsolvable: ValueId,
    pub unknown: ValueId,
    pub empty: ValueId,
    pub no_return: ValueId,
}

/// The shared analysis context.
pub struct Ctx<'a> {
    pub names: &'a NameInterner,
    pub compat: CompatTable,
    pub well: WellKnown,
    pub classes: Classes,
    pub values: Values,
    pub sigs: Sigs,
    pub program: Program,
    pub primitives: Primitives,
    pub root_node: NodeId,
    pub host: &'a dyn Host,
}

impl<'a> Ctx<'a> {
    pub fn new(names: &'a NameInterner, host: &'a dyn Host) -> Self {
        let compat = CompatTable::new(names);
        let well = WellKnown::new(names);
        let classes = Classes::new();
        let values = Values::new();
        let sigs = Sigs::new();
        let program = Program::new();
        let root_node = program.new_node();
        let primitives = build_primitives(names, &well, &classes, &values);
        Ctx {
            names,
            compat,
            well,
            classes,
            values,
            sigs,
            program,
            primitives,
            root_node,
            host,
        }
    }

    pub fn intern(&self, text: &str) -> Name {
        self.names.intern(text)
    }

    pub fn str_of(&self, name: Name) -> &'static str {
        self.names.resolve(name)
    }

    /// The full name of a type parameter declared in `scope`
    /// (`builtins.list` + `_T` -> `builtins.list._T`).
    pub fn full_param_name(&self, scope: Name, short: Name) -> Name {
        let text = format!("{}.{}", self.str_of(scope), self.str_of(short));
        self.names.intern(&text)
    }

    /// Allocate a fresh type parameter value.
    pub fn new_type_param(
        &self,
        scope: Name,
        short: Name,
        bound: Option<ValueId>,
        constraints: Vec<ValueId>,
    ) -> ValueId {
        debug_assert!(bound.is_none() || constraints.is_empty());
        let full_name = self.full_param_name(scope, short);
        self.values.alloc(Value::TypeParameter(Box::new(TypeParamValue {
            name: short,
            full_name,
            bound,
            constraints,
        })))
    }
}

fn generic_class(
    names: &NameInterner,
    classes: &Classes,
    values: &Values,
    name: Name,
    parents: &[ClassId],
    param_shorts: &[Name],
) -> ClassId {
    let mut def = ClassDef::new(name);
    for &short in param_shorts {
        let full_text = format!("{}.{}", names.resolve(name), names.resolve(short));
        let full = names.intern(&full_text);
        def.template
            .push(values.alloc(Value::TypeParameter(Box::new(TypeParamValue {
                name: short,
                full_name: full,
                bound: None,
                constraints: Vec::new(),
            }))));
    }
    classes.define(def, parents)
}

fn build_primitives(
    names: &NameInterner,
    well: &WellKnown,
    classes: &Classes,
    values: &Values,
) -> Primitives {
    let simple = |name: Name, parents: &[ClassId]| -> ClassId {
        classes.define(ClassDef::new(name), parents)
    };

    let object = simple(well.object, &[]);
    let type_ = simple(well.type_, &[object]);
    let int = simple(names.intern("builtins.int"), &[object]);
    let float = simple(names.intern("builtins.float"), &[object]);
    let complex = simple(names.intern("builtins.complex"), &[object]);
    let bool_ = simple(names.intern("builtins.bool"), &[int]);
    let str_ = simple(well.str_, &[object]);
    let bytes = simple(names.intern("builtins.bytes"), &[object]);
    let bytearray = simple(names.intern("builtins.bytearray"), &[object]);
    let memoryview = simple(names.intern("builtins.memoryview"), &[object]);
    let none_type = simple(names.intern("builtins.NoneType"), &[object]);
    let function = simple(well.function, &[object]);
    let module = simple(well.module, &[object]);
    let classmethod = simple(well.classmethod, &[object]);
    let staticmethod = simple(well.staticmethod, &[object]);

    let generic = simple(well.generic, &[object]);
    let mut protocol_def = ClassDef::new(well.protocol);
    protocol_def.flags = ClassFlags::PROTOCOL_BASE;
    let protocol = classes.define(protocol_def, &[generic]);

    let list = generic_class(names, classes, values, names.intern("builtins.list"), &[generic], &[well.t]);
    let dict = generic_class(names, classes, values, names.intern("builtins.dict"), &[generic], &[well.k, well.v]);
    let set = generic_class(names, classes, values, names.intern("builtins.set"), &[generic], &[well.t]);
    let tuple = generic_class(names, classes, values, well.tuple_, &[generic], &[well.t]);
    let callable = generic_class(names, classes, values, well.callable, &[generic], &[well.args, well.ret]);
    let hashable = simple(well.hashable, &[object]);
    let iterable = generic_class(names, classes, values, well.iterable, &[generic], &[well.t]);
    let sequence = generic_class(names, classes, values, well.sequence, &[iterable], &[well.t]);
    let collection = generic_class(names, classes, values, well.collection, &[iterable], &[well.t]);
    let container = generic_class(names, classes, values, well.container, &[generic], &[well.t]);

    let object_instance = values.alloc(Value::Instance(Box::new(InstanceValue::new(object))));
    let none_instance = values.alloc(Value::Instance(Box::new(InstanceValue::new(none_type))));
    let unsolvable = values.alloc(Value::Unsolvable);
    let unknown = values.alloc(Value::Unknown);
    let empty = values.alloc(Value::Empty);
    let no_return = values.alloc(Value::NoReturn);

    Primitives {
        object,
        type_,
        int,
        float,
        complex,
        bool_,
        str_,
        bytes,
        bytearray,
        memoryview,
        none_type,
        function,
        module,
        classmethod,
        staticmethod,
        list,
        dict,
        set,
        tuple,
        generic,
        protocol,
        callable,
        hashable,
        iterable,
        sequence,
        collection,
        container,
        object_instance,
        none_instance,
        unsolvable,
        unknown,
        empty,
        no_return,
    }
}
