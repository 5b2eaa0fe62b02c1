//! Core value definitions for the abstract interpreter.
//!
//! This module contains the main `Value` enum and all variant structs.
//! A `Value` is the analyzer's knowledge about one thing at one program
//! point: an instance, a class used as a value, a function, a symbolic
//! type parameter, or one of the ambiguity tokens.

use crate::ids::{ClassId, NodeId, SigId, ValueId, VarId};
use indexmap::IndexMap;
use pyz_common::Name;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

// =============================================================================
// Literal Values
// =============================================================================

/// A concrete Python constant carried by a `ConcreteValue`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum PyVal {
    Str(String),
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl PyVal {
    /// A stable rendering used for type keys. Floats render through their
    /// bit pattern so NaN values still fold.
    pub fn key_string(&self) -> String {
        match self {
            PyVal::Str(s) => format!("s:{s}"),
            PyVal::Bytes(b) => format!("b:{b:?}"),
            PyVal::Int(i) => format!("i:{i}"),
            PyVal::Float(f) => format!("f:{:x}", f.to_bits()),
            PyVal::Bool(b) => format!("o:{b}"),
            PyVal::None => "n".to_string(),
        }
    }
}

// =============================================================================
// Value Variants
// =============================================================================

/// An instance of a class, with its per-instance type parameter values.
///
/// `type_params` is keyed by the *full* parameter name
/// (`builtins.list._T`) and holds one variable per parameter collecting
/// the values seen for it.
#[derive(Clone, Debug, Serialize)]
pub struct InstanceValue {
    pub cls: ClassId,
    pub type_params: IndexMap<Name, VarId>,
    /// Attributes set directly on the instance (`self.x = ...`).
    pub members: IndexMap<Name, VarId>,
    /// For enum instances, the member name (`Color.RED` carries `RED`).
    pub enum_member: Option<Name>,
}

impl InstanceValue {
    pub fn new(cls: ClassId) -> Self {
        InstanceValue {
            cls,
            type_params: IndexMap::new(),
            members: IndexMap::new(),
            enum_member: None,
        }
    }
}

/// A concrete heterogeneous tuple: one variable per element.
#[derive(Clone, Debug, Serialize)]
pub struct TupleValue {
    pub cls: ClassId,
    pub elements: Vec<VarId>,
}

/// A concrete dict: one variable per known key, plus the instance-level
/// key/value parameters kept for matching against `dict[K, V]`.
#[derive(Clone, Debug, Serialize)]
pub struct DictValue {
    pub cls: ClassId,
    pub entries: IndexMap<String, VarId>,
    pub type_params: IndexMap<Name, VarId>,
}

/// A function defined in the analyzed program, with its signatures
/// (more than one for overloads).
#[derive(Clone, Debug, Serialize)]
pub struct FunctionValue {
    pub name: Name,
    pub sigs: Vec<SigId>,
}

/// A function whose implementation the analyzer cannot see (extension
/// module, magic method shim). Opaque except for an optional signature.
#[derive(Clone, Debug, Serialize)]
pub struct NativeFunctionValue {
    pub name: Name,
    pub sig: Option<SigId>,
}

/// A function bound to a receiver.
#[derive(Clone, Debug, Serialize)]
pub struct BoundMethodValue {
    pub name: Name,
    pub underlying: ValueId,
    pub callself: VarId,
}

/// `classmethod`/`staticmethod` wrappers around an underlying method.
#[derive(Clone, Debug, Serialize)]
pub struct MethodWrapperValue {
    pub method: ValueId,
}

/// A property descriptor; only the getter matters for matching.
#[derive(Clone, Debug, Serialize)]
pub struct PropertyValue {
    pub fget: ValueId,
}

/// The result of a `super()` lookup.
#[derive(Clone, Debug, Serialize)]
pub struct SuperInstanceValue {
    pub super_cls: ClassId,
    pub super_obj: Option<ValueId>,
}

/// An imported module with its member table.
#[derive(Clone, Debug, Serialize)]
pub struct ModuleValue {
    pub name: Name,
    pub members: IndexMap<Name, VarId>,
}

/// A symbolic type variable. `bound` and `constraints` are mutually
/// exclusive by construction.
#[derive(Clone, Debug, Serialize)]
pub struct TypeParamValue {
    /// Short name (`T`).
    pub name: Name,
    /// Fully qualified name (`mymod.f.T`), unique per declaration site.
    pub full_name: Name,
    pub bound: Option<ValueId>,
    pub constraints: Vec<ValueId>,
}

/// Who a `TypeParameterInstance` belongs to. The owner decides how the
/// matcher treats the instance: callable-argument owners are matched
/// contravariantly, signature-return owners are widened to the
/// parameter's upper bound.
#[derive(Clone, Debug, Serialize)]
pub enum ParamOwner {
    /// Bound to a concrete container instance.
    Value(ValueId),
    /// Came from the argument side of a parameterized callable.
    CallableArgs(ClassId),
    /// Came from the return side of a function signature.
    SignatureRet(SigId),
    /// Placeholder owner used when instantiating for error rendering.
    Dummy,
}

/// A type parameter attached to a particular owner.
#[derive(Clone, Debug, Serialize)]
pub struct TypeParamInstanceValue {
    pub param: ValueId,
    pub owner: ParamOwner,
}

/// A union of values. `recursive` marks annotations that refer to
/// themselves (the matcher uses it to break cycles).
#[derive(Clone, Debug, Serialize)]
pub struct UnionValue {
    pub options: Vec<ValueId>,
    pub recursive: bool,
}

/// A literal constant together with its class.
#[derive(Clone, Debug, Serialize)]
pub struct ConcreteValue {
    pub cls: ClassId,
    pub pyval: PyVal,
}

/// A dataclass field wrapper; carries the declared type and, when
/// present, the default value.
#[derive(Clone, Debug, Serialize)]
pub struct FieldInstanceValue {
    pub typ: ValueId,
    pub default: Option<VarId>,
}

// =============================================================================
// Value Enum
// =============================================================================

/// All possible value variants.
/// Large variants are boxed to keep the enum size small.
#[derive(Clone, Debug, Serialize)]
pub enum Value {
    Instance(Box<InstanceValue>),
    Tuple(Box<TupleValue>),
    Dict(Box<DictValue>),
    Class(ClassId),
    Function(Box<FunctionValue>),
    NativeFunction(Box<NativeFunctionValue>),
    BoundMethod(Box<BoundMethodValue>),
    ClassMethod(Box<MethodWrapperValue>),
    StaticMethod(Box<MethodWrapperValue>),
    Property(Box<PropertyValue>),
    SuperInstance(Box<SuperInstanceValue>),
    Module(Box<ModuleValue>),
    TypeParameter(Box<TypeParamValue>),
    TypeParameterInstance(Box<TypeParamInstanceValue>),
    Union(Box<UnionValue>),
    ConcreteValue(Box<ConcreteValue>),
    FieldInstance(Box<FieldInstanceValue>),
    /// `Final[T]` wrapper created from an annotation in the current module.
    FinalAnnotation(ValueId),
    /// An unknown value: ambiguous, but something specific at runtime.
    Unknown,
    /// "Any": matches and is matched by everything.
    Unsolvable,
    /// The bottom type: no possible runtime value.
    Empty,
    /// `typing.NoReturn`; only matches itself or an ambiguous value.
    NoReturn,
}

impl Value {
    /// Whether this value is one of the ambiguity tokens
    /// (`Unknown`/`Unsolvable`) or the bottom type.
    pub fn is_ambiguous_or_empty(&self) -> bool {
        matches!(self, Value::Unknown | Value::Unsolvable | Value::Empty)
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Value::Unknown | Value::Unsolvable)
    }
}

// =============================================================================
// Type Keys
// =============================================================================

/// A grouping key for values: two values with the same type key produce
/// the same result when matched against any formal type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// Plain instance of a class with no instance parameters.
    Class(ClassId),
    /// A literal constant, keyed by class and rendered value.
    Concrete(ClassId, String),
    /// One of the singleton tokens.
    Singleton(u8),
    /// Anything else groups only with itself.
    Value(ValueId),
}

// =============================================================================
// Value Arena
// =============================================================================

/// Append-only arena of values. Allocation and lookup go through `&self`
/// so the arena can be shared by the services that build values.
pub struct Values {
    list: RefCell<Vec<Rc<Value>>>,
}

impl Values {
    pub fn new() -> Self {
        Values {
            list: RefCell::new(Vec::new()),
        }
    }

    pub fn alloc(&self, value: Value) -> ValueId {
        let mut list = self.list.borrow_mut();
        let id = ValueId(list.len() as u32);
        list.push(Rc::new(value));
        id
    }

    pub fn get(&self, id: ValueId) -> Rc<Value> {
        Rc::clone(&self.list.borrow()[id.0 as usize])
    }

    /// Replace the value stored at `id`.
    ///
    /// Only used while tying the knot on recursive annotations: a
    /// placeholder is allocated first, referenced by its own options,
    /// then replaced. Handles taken before the replacement keep the old
    /// value.
    pub fn replace(&self, id: ValueId, value: Value) {
        self.list.borrow_mut()[id.0 as usize] = Rc::new(value);
    }

    pub fn len(&self) -> usize {
        self.list.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.borrow().is_empty()
    }

    /// The class of a value, when it has one.
    pub fn class_of(&self, id: ValueId) -> Option<ClassId> {
        match &*self.get(id) {
            Value::Instance(inst) => Some(inst.cls),
            Value::Tuple(t) => Some(t.cls),
            Value::Dict(d) => Some(d.cls),
            Value::ConcreteValue(c) => Some(c.cls),
            _ => None,
        }
    }

    /// Grouping key for substitution folding.
    pub fn type_key(&self, id: ValueId) -> TypeKey {
        match &*self.get(id) {
            Value::Instance(inst)
                if inst.type_params.is_empty()
                    && inst.members.is_empty()
                    && inst.enum_member.is_none() =>
            {
                TypeKey::Class(inst.cls)
            }
            Value::ConcreteValue(c) => TypeKey::Concrete(c.cls, c.pyval.key_string()),
            Value::Unknown => TypeKey::Singleton(0),
            Value::Unsolvable => TypeKey::Singleton(1),
            Value::Empty => TypeKey::Singleton(2),
            Value::NoReturn => TypeKey::Singleton(3),
            _ => TypeKey::Value(id),
        }
    }
}
