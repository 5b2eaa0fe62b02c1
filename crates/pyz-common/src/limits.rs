//! Centralized limits and thresholds for the pyz analyzer.
//!
//! This module provides shared constants for recursion depths and
//! capacity limits used throughout the codebase. Centralizing these
//! values prevents duplicate definitions with inconsistent values and
//! documents the rationale for each limit.

// =============================================================================
// Recursion Depth Limits
// =============================================================================
// The matcher itself terminates through its per-call caches; these caps
// protect the surrounding conversion and substitution walks, which
// traverse user-shaped value graphs.

/// Maximum depth when instantiating a formal type into instances.
///
/// Instantiation recurses through parameterized classes, unions and
/// callables. Annotations deeper than this are almost certainly
/// degenerate; beyond the cap we produce an ambiguous instance instead.
pub const MAX_INSTANTIATE_DEPTH: usize = 20;

/// Maximum depth when substituting type parameters inside an annotation.
///
/// Recursive annotations are cycle-broken by the matcher before
/// substitution is invoked, so this only guards pathological nesting.
pub const MAX_ANNOTATION_DEPTH: usize = 50;

// =============================================================================
// Capacity Limits
// =============================================================================

/// Maximum number of keys a concrete dict value keeps individually.
///
/// Beyond this, constant conversion collapses the dict to
/// `dict[Union[key types], Union[value types]]` rather than tracking
/// every entry.
pub const MAX_DICT_KEYS: usize = 64;

/// Maximum number of options kept when merging values into a union.
/// Larger merges collapse to an ambiguous value.
pub const MAX_UNION_OPTIONS: usize = 64;
