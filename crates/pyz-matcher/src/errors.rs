//! Structured match-failure records.
//!
//! Every failure the matcher can explain is plain data surfaced through
//! return values; nothing here is an exception. The caller renders the
//! expected type itself, using the partial substitution the matcher
//! captured at the point of failure.

use pyz_abstract::{ClassId, ValueId, VarId};
use pyz_common::Name;
use serde::Serialize;

/// `str` was matched against a conflicting iterable of strings
/// (`Iterable[str]`, `Sequence[str]`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NonIterableStrError {
    pub left_type: ClassId,
    pub other_type: ClassId,
}

/// The left class does not implement all of a protocol's attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProtocolMissingAttributesError {
    pub left_type: ClassId,
    pub other_type: ClassId,
    pub missing: Vec<Name>,
}

/// A protocol attribute exists on the left class but its type does not
/// match the protocol's declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProtocolTypeError {
    pub left_type: ClassId,
    pub other_type: ClassId,
    pub attribute: Name,
    pub actual: ValueId,
    pub expected: ValueId,
}

/// A structural protocol failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ProtocolError {
    MissingAttributes(ProtocolMissingAttributesError),
    Type(ProtocolTypeError),
}

/// One typed-dict key whose value failed to match the declared type.
#[derive(Clone, Debug, Serialize)]
pub struct BadKeyMatch {
    pub key: String,
    pub value: VarId,
    pub expected: ValueId,
    pub details: Vec<ErrorDetails>,
}

/// A concrete dict did not satisfy a typed-dict declaration.
#[derive(Clone, Debug, Serialize)]
pub struct TypedDictError {
    pub bad: Vec<BadKeyMatch>,
    pub extra: Vec<String>,
    pub missing: Vec<String>,
}

/// Additional detail collected during one match call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ErrorDetails {
    pub protocol: Option<ProtocolError>,
    pub noniterable_str: Option<NonIterableStrError>,
    pub typed_dict: Option<TypedDictError>,
}

impl ErrorDetails {
    pub fn is_empty(&self) -> bool {
        self.protocol.is_none() && self.noniterable_str.is_none() && self.typed_dict.is_none()
    }
}

/// The first argument that failed in `compute_subst`, with the expected
/// type reconstructed under the partial substitution.
#[derive(Clone, Debug, Serialize)]
pub struct BadParam {
    pub name: Name,
    pub expected: ValueId,
    pub error_details: ErrorDetails,
}
