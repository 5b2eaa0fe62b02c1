//! Abstract value model for the pyz analyzer.
//!
//! This crate defines what the analyzer knows about the program under
//! analysis - values, classes, variables and signatures - plus the
//! services the matcher consumes:
//!
//! - `value` / `class` - the closed variant enumerations of values and
//!   class shapes
//! - `variable` - bindings, views and the variable program
//! - `signature` - function signatures and signature extraction
//! - `convert` - instantiation, merging, constants
//! - `annotations` - type-parameter discovery and substitution
//! - `services` / `host` - the narrow host interfaces and a
//!   table-backed default implementation
//! - `ctx` - the shared analysis context bundling all of the above
//! - `testing` - fixture builders shared by the analyzer's test suites

pub mod annotations;
pub mod class;
pub mod convert;
pub mod ctx;
pub mod host;
pub mod ids;
pub mod services;
pub mod signature;
pub mod testing;
pub mod value;
pub mod variable;

pub use class::{ClassDef, ClassFlags, ClassKind, Classes, MroEntry, TypedDictProps};
pub use ctx::{Ctx, Primitives, WellKnown};
pub use host::TableHost;
pub use ids::{BindingRef, ClassId, NodeId, SigId, ValueId, VarId};
pub use services::{AttributeLookup, Host, Reachability, Vm};
pub use signature::{Signature, Sigs};
pub use value::{ParamOwner, PyVal, TypeKey, Value, Values};
pub use variable::{Binding, Program, Variable, View};
