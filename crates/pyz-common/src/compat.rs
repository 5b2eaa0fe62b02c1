//! The compatible-builtin pair table.
//!
//! The typing PEPs special-case a handful of builtin pairs for which a
//! value of the first type satisfies an annotation of the second (`int`
//! where `float` is expected, and so on). The list is closed; matching
//! code must not extend it with user types.

use crate::intern::{Name, NameInterner};
use serde::Serialize;

/// `(compatible, builtin)` pairs: a value of the first full name
/// satisfies an annotation of the second.
pub const COMPAT_ITEMS: &[(&str, &str)] = &[
    ("builtins.int", "builtins.float"),
    ("builtins.int", "builtins.complex"),
    ("builtins.float", "builtins.complex"),
    ("builtins.bytearray", "builtins.bytes"),
    ("builtins.memoryview", "builtins.bytes"),
];

/// `COMPAT_ITEMS` resolved against an interner, for id-based lookups.
#[derive(Debug, Clone, Serialize)]
pub struct CompatTable {
    pairs: Vec<(Name, Name)>,
}

impl CompatTable {
    pub fn new(names: &NameInterner) -> Self {
        CompatTable {
            pairs: COMPAT_ITEMS
                .iter()
                .map(|&(compat, builtin)| (names.intern(compat), names.intern(builtin)))
                .collect(),
        }
    }

    /// Whether `left` is listed as compatible with `builtin`.
    pub fn matches(&self, left: Name, builtin: Name) -> bool {
        self.pairs.iter().any(|&(c, b)| c == left && b == builtin)
    }

    /// All `(compatible, builtin)` pairs.
    pub fn pairs(&self) -> &[(Name, Name)] {
        &self.pairs
    }
}
