//! Matching logic for abstract values.
//!
//! The matcher answers one question: does a value satisfy a formal
//! type, and if so, under what substitution of type variables? It is a
//! one-way unification engine - type variables on the formal side get
//! bound, type variables on the value side are concrete placeholders.
//!
//! Public surface:
//! - [`AbstractMatcher::compute_subst`] - match named arguments against
//!   formal parameters and produce a substitution or the first bad
//!   parameter
//! - [`AbstractMatcher::bad_matches`] - enumerate the views of a
//!   variable that fail to match a type
//! - [`AbstractMatcher::match_from_mro`] - search a class's MRO for a
//!   formal type
//!
//! Everything else is an implementation detail of the engine.

mod dispatch;
pub mod errors;
mod instance;
mod matcher;
mod policy;
mod protocol;
pub mod subst;
mod views;

pub use errors::{
    BadKeyMatch, BadParam, ErrorDetails, NonIterableStrError, ProtocolError,
    ProtocolMissingAttributesError, ProtocolTypeError, TypedDictError,
};
pub use matcher::AbstractMatcher;
pub use subst::{merge_substs, AliasMap, Subst};

#[cfg(test)]
mod tests;
