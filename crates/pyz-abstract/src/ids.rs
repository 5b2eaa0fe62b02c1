//! Id newtypes for the abstract value arenas.
//!
//! Everything in the value model is identified by a dense `u32` id into
//! its owning arena. Ids are cheap to copy and hash; the arenas hand out
//! shared references to the underlying data.

use serde::Serialize;

/// Unique identifier for a value in the value arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ValueId(pub u32);

/// Unique identifier for a class definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClassId(pub u32);

/// Unique identifier for a program variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VarId(pub u32);

/// Unique identifier for a function signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SigId(pub u32);

/// Unique identifier for a control-flow node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// A reference to one binding of one variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct BindingRef {
    pub var: VarId,
    pub index: u32,
}

impl BindingRef {
    pub fn new(var: VarId, index: usize) -> Self {
        BindingRef {
            var,
            index: index as u32,
        }
    }
}
