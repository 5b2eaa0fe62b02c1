//! Common types and utilities shared across the pyz analyzer crates.
//!
//! This crate is dependency-light on purpose: it holds the pieces every
//! other crate needs without pulling in the value model or the matcher.
//!
//! - `intern` - fully qualified name interning (`Name`)
//! - `compat` - the compatible-builtin pair table
//! - `limits` - centralized recursion and capacity limits

pub mod compat;
pub mod intern;
pub mod limits;

pub use compat::CompatTable;
pub use intern::{Name, NameInterner};
