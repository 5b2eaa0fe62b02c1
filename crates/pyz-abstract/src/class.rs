//! Class definitions for the abstract value model.
//!
//! Classes cover everything a user annotation can name: plain (possibly
//! generic) classes, parameterized applications (`list[int]`),
//! fixed-arity tuple classes, callable classes, literal classes, typed
//! dicts, and protocols. The matcher never subclasses; every shape is a
//! `ClassKind` variant on one `ClassDef`.

use crate::ids::{ClassId, ValueId, VarId};
use bitflags::bitflags;
use indexmap::{IndexMap, IndexSet};
use pyz_common::Name;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

bitflags! {
    /// Boolean class properties.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ClassFlags: u32 {
        /// Matched structurally; has at least one attribute to check.
        const PROTOCOL = 1 << 0;
        /// Inherits from the protocol base class (may still have zero
        /// attributes to check).
        const PROTOCOL_BASE = 1 << 1;
        /// Declared dynamic/opaque: attribute checks are skipped.
        const DYNAMIC = 1 << 2;
        /// An enum class; instances carry a member name.
        const ENUM = 1 << 3;
        /// A self-referential annotation (recursion is broken on it).
        const RECURSIVE = 1 << 4;
    }
}

impl Serialize for ClassFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

/// One entry in a method resolution order.
///
/// Union bases and other invalid base classes reach the MRO as
/// `Ambiguous`/`Empty` entries; an ambiguous entry matches everything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MroEntry {
    Class(ClassId),
    Ambiguous,
    Empty,
}

/// A generic class applied to type arguments (`list[int]`, `type[T]`).
///
/// `formal_params` is keyed by the *short* parameter name declared in
/// the base class's template.
#[derive(Clone, Debug, Serialize)]
pub struct ParameterizedClass {
    pub base: ClassId,
    pub formal_params: IndexMap<Name, ValueId>,
}

/// A fixed-arity heterogeneous tuple class (`tuple[int, str]`).
#[derive(Clone, Debug, Serialize)]
pub struct TupleClass {
    pub base: ClassId,
    pub elements: Vec<ValueId>,
}

/// A callable class (`Callable[[A, B], R]`).
///
/// `params` is `None` for `Callable[..., R]`: the arguments are
/// unspecified and anything callable with the right return matches.
#[derive(Clone, Debug, Serialize)]
pub struct CallableClass {
    pub base: ClassId,
    pub params: Option<Vec<ValueId>>,
    pub ret: ValueId,
}

impl CallableClass {
    pub fn num_args(&self) -> usize {
        self.params.as_ref().map_or(0, |p| p.len())
    }
}

/// A literal class (`Literal[3]`, `Literal[Color.RED]`); wraps the value.
#[derive(Clone, Debug, Serialize)]
pub struct LiteralClass {
    pub value: ValueId,
}

/// Field declarations of a typed dict.
#[derive(Clone, Debug, Serialize)]
pub struct TypedDictProps {
    pub base: ClassId,
    pub fields: IndexMap<String, ValueId>,
    pub required: IndexSet<String>,
}

impl TypedDictProps {
    /// Split the present keys into (missing required, extra undeclared).
    pub fn check_keys<'k>(
        &self,
        present: impl Iterator<Item = &'k str> + Clone,
    ) -> (Vec<String>, Vec<String>) {
        let missing = self
            .required
            .iter()
            .filter(|req| !present.clone().any(|k| k == req.as_str()))
            .cloned()
            .collect();
        let extra = present
            .filter(|k| !self.fields.contains_key(*k))
            .map(|k| k.to_string())
            .collect();
        (missing, extra)
    }
}

/// The shape of a class.
#[derive(Clone, Debug, Serialize)]
pub enum ClassKind {
    Simple,
    Parameterized(Box<ParameterizedClass>),
    Tuple(Box<TupleClass>),
    Callable(Box<CallableClass>),
    Literal(Box<LiteralClass>),
    TypedDict(Box<TypedDictProps>),
}

/// A class definition.
#[derive(Clone, Debug, Serialize)]
pub struct ClassDef {
    /// Fully qualified name. Parameterized applications report their
    /// base's name.
    pub full_name: Name,
    pub kind: ClassKind,
    pub flags: ClassFlags,
    /// Linearized ancestors, self first.
    pub mro: Vec<MroEntry>,
    /// Declared type parameters (`TypeParameter` values), in order.
    pub template: Vec<ValueId>,
    /// Attributes defined directly on this class.
    pub own_attributes: IndexMap<Name, VarId>,
    /// For protocols: the attribute names a match must provide.
    pub protocol_attributes: IndexSet<Name>,
    /// Pairs of aliased type parameter full names (a subclass renaming
    /// its base's parameter).
    pub param_aliases: Vec<(Name, Name)>,
}

impl ClassDef {
    pub fn new(full_name: Name) -> Self {
        ClassDef {
            full_name,
            kind: ClassKind::Simple,
            flags: ClassFlags::empty(),
            mro: Vec::new(),
            template: Vec::new(),
            own_attributes: IndexMap::new(),
            protocol_attributes: IndexSet::new(),
            param_aliases: Vec::new(),
        }
    }

    pub fn is_protocol(&self) -> bool {
        self.flags.contains(ClassFlags::PROTOCOL)
    }

    pub fn has_protocol_base(&self) -> bool {
        self.flags
            .intersects(ClassFlags::PROTOCOL | ClassFlags::PROTOCOL_BASE)
    }

    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(ClassFlags::DYNAMIC)
    }

    pub fn is_enum(&self) -> bool {
        self.flags.contains(ClassFlags::ENUM)
    }
}

// =============================================================================
// Class Arena
// =============================================================================

/// Append-only arena of class definitions.
pub struct Classes {
    list: RefCell<Vec<Rc<ClassDef>>>,
}

impl Classes {
    pub fn new() -> Self {
        Classes {
            list: RefCell::new(Vec::new()),
        }
    }

    pub fn alloc(&self, def: ClassDef) -> ClassId {
        let mut list = self.list.borrow_mut();
        let id = ClassId(list.len() as u32);
        list.push(Rc::new(def));
        id
    }

    pub fn get(&self, id: ClassId) -> Rc<ClassDef> {
        Rc::clone(&self.list.borrow()[id.0 as usize])
    }

    /// Replace a definition in place (used to tie recursive annotations).
    pub fn replace(&self, id: ClassId, def: ClassDef) {
        self.list.borrow_mut()[id.0 as usize] = Rc::new(def);
    }

    pub fn len(&self) -> usize {
        self.list.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.borrow().is_empty()
    }

    /// The underlying plain class: strips parameterization.
    pub fn base_cls(&self, id: ClassId) -> ClassId {
        match &self.get(id).kind {
            ClassKind::Parameterized(p) => p.base,
            ClassKind::Tuple(t) => t.base,
            ClassKind::Callable(c) => c.base,
            ClassKind::TypedDict(t) => t.base,
            ClassKind::Simple | ClassKind::Literal(_) => id,
        }
    }

    pub fn full_name(&self, id: ClassId) -> Name {
        self.get(id).full_name
    }

    /// Look up a formal type parameter by short name.
    ///
    /// For parameterized classes this reads the argument map; for tuple
    /// and callable classes the synthesized parameters (element union,
    /// args union, return) are handled by the callers that know the
    /// relevant names.
    pub fn formal_type_parameter(&self, id: ClassId, name: Name) -> Option<ValueId> {
        match &self.get(id).kind {
            ClassKind::Parameterized(p) => p.formal_params.get(&name).copied(),
            _ => None,
        }
    }

    /// Build a parameterized application of `base`.
    ///
    /// The new class shares the base's name, template, flags and
    /// attribute metadata; its MRO is the base's with itself substituted
    /// at the front.
    pub fn parameterize(&self, base: ClassId, formal_params: IndexMap<Name, ValueId>) -> ClassId {
        let base_def = self.get(base);
        let mut def = ClassDef::new(base_def.full_name);
        def.kind = ClassKind::Parameterized(Box::new(ParameterizedClass {
            base,
            formal_params,
        }));
        def.flags = base_def.flags;
        def.template = base_def.template.clone();
        def.protocol_attributes = base_def.protocol_attributes.clone();
        def.param_aliases = base_def.param_aliases.clone();
        self.alloc_derived(def, &base_def.mro)
    }

    /// Build a fixed-arity tuple class over `tuple_base`.
    pub fn tuple_class(&self, tuple_base: ClassId, elements: Vec<ValueId>) -> ClassId {
        let base_def = self.get(tuple_base);
        let mut def = ClassDef::new(base_def.full_name);
        def.kind = ClassKind::Tuple(Box::new(TupleClass {
            base: tuple_base,
            elements,
        }));
        def.template = base_def.template.clone();
        self.alloc_derived(def, &base_def.mro)
    }

    /// Build a callable class over `callable_base`.
    pub fn callable_class(
        &self,
        callable_base: ClassId,
        params: Option<Vec<ValueId>>,
        ret: ValueId,
    ) -> ClassId {
        let base_def = self.get(callable_base);
        let mut def = ClassDef::new(base_def.full_name);
        def.kind = ClassKind::Callable(Box::new(CallableClass {
            base: callable_base,
            params,
            ret,
        }));
        def.template = base_def.template.clone();
        self.alloc_derived(def, &base_def.mro)
    }

    /// Build a literal class wrapping `value`.
    pub fn literal_class(&self, literal_name: Name, value: ValueId) -> ClassId {
        let mut def = ClassDef::new(literal_name);
        def.kind = ClassKind::Literal(Box::new(LiteralClass { value }));
        self.alloc_derived(def, &[])
    }

    /// Define a class with the given parents, computing a linearized MRO
    /// (self first, then each parent's MRO in order, deduplicated). Any
    /// MRO already present on `def` is replaced.
    pub fn define(&self, mut def: ClassDef, parents: &[ClassId]) -> ClassId {
        let id = ClassId(self.list.borrow().len() as u32);
        let mut mro = vec![MroEntry::Class(id)];
        for &parent in parents {
            for entry in self.get(parent).mro.iter() {
                if !mro.contains(entry) {
                    mro.push(*entry);
                }
            }
        }
        def.mro = mro;
        let allocated = self.alloc(def);
        debug_assert_eq!(allocated, id);
        allocated
    }

    fn alloc_derived(&self, mut def: ClassDef, base_mro: &[MroEntry]) -> ClassId {
        let id = ClassId(self.list.borrow().len() as u32);
        let mut mro = Vec::with_capacity(base_mro.len().max(1));
        mro.push(MroEntry::Class(id));
        mro.extend(base_mro.iter().skip(1).copied());
        def.mro = mro;
        let allocated = self.alloc(def);
        debug_assert_eq!(allocated, id);
        allocated
    }
}
