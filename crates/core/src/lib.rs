//! Layer data store and composition core for the strata scene-description
//! database.
//!
//! A [`Layer`](layer::Layer) is a path-addressed store of typed specs
//! (prim/property/relationship/variant records). List-valued fields carry
//! [`ListOp`](listop::ListOp) merge semantics so multiple layers' opinions
//! can be combined algebraically; all mutations report through a global
//! change manager that coalesces notification per
//! [`ChangeBlock`](change::ChangeBlock) scope.
//!
//! File-format codecs, asset resolution, and the composition engine that
//! orders layer stacks are collaborators outside this crate; they speak to
//! it through the [`Layer`](layer::Layer) API and the
//! [`FileFormat`](format::FileFormat) boundary trait.

/// Change coalescing: change lists, the change manager, and change blocks.
pub mod change;
/// Generic child-spec machinery parameterized by child policies.
pub mod children;
/// Pluggable spec/field storage backing a layer.
pub mod data;
/// Error types shared across the crate.
pub mod error;
/// File-format boundary traits and the process-wide format registry.
pub mod format;
/// Spec-handle identity arena, stable across renames.
pub mod identity;
/// The layer store, mute machinery, and the process-wide layer registry.
pub mod layer;
/// The six-vector list-edit representation and its merge algebra.
pub mod listop;
/// Batched namespace-edit descriptions.
pub mod namespace_edit;
/// Field schema: spec definitions, required fields, fallbacks.
pub mod schema;
/// The closed value union stored in fields.
pub mod value;

pub use change::{ChangeBlock, ChangeList, ChangeManager};
pub use error::{LayerError, ListOpError, Result};
pub use identity::SpecHandle;
pub use layer::{Layer, LayerHandle, LayerId, ReloadResult, WeakLayerHandle};
pub use listop::{ListOp, ListOpKind};
pub use schema::{Schema, SpecType};
pub use strata_path::{PathKey, Token};
pub use value::Value;
