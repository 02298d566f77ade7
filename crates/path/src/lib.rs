//! Interned tokens and namespace path keys for the strata layer store.
//!
//! Every location a layer can store data at is identified by a [`PathKey`]:
//! an immutable, cheaply-clonable absolute path through the prim/property
//! namespace, including variant selections and relationship/connection
//! targets. Field names and prim names are [`Token`]s, interned once per
//! process so comparison and hashing are index operations.

/// Absolute namespace path keys.
pub mod path;
/// Process-wide string interning.
pub mod token;

pub use path::{
	PathKey, PathParseError, PathPart, is_valid_identifier, is_valid_namespaced_identifier,
	is_valid_variant_identifier,
};
pub use token::Token;
