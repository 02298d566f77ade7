use strata_path::{PathKey, PathParseError, Token};

use crate::listop::ListOpKind;
use crate::schema::SpecType;

/// Crate-wide result alias over [`LayerError`].
pub type Result<T, E = LayerError> = std::result::Result<T, E>;

/// Errors from list-op editing entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListOpError {
	/// `replace_operations` was given a range outside the item vector.
	#[error("invalid range [{index}, {index}+{count}) for {kind:?} items of length {len}")]
	InvalidRange {
		kind: ListOpKind,
		index: usize,
		count: usize,
		len: usize,
	},
}

/// Errors reported by layer and children operations.
///
/// These are all recoverable: the operation aborts with no partial mutation
/// (aggregate operations collect and report omissions instead, see
/// [`LayerError::UnrecognizedSpecTypes`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
	/// The layer does not permit editing.
	#[error("layer {identifier:?}: permission to edit denied")]
	PermissionDenied { identifier: String },
	/// A path was structurally unsuited to the operation.
	#[error("invalid path {path:?}: {reason}")]
	InvalidPath { path: PathKey, reason: &'static str },
	#[error(transparent)]
	PathParse(#[from] PathParseError),
	/// A malformed or colliding layer identifier.
	#[error("invalid identifier {identifier:?}: {reason}")]
	InvalidIdentifier {
		identifier: String,
		reason: &'static str,
	},
	/// An invalid child name or key under a children policy.
	#[error("invalid name {name:?}: {reason}")]
	InvalidName { name: String, reason: &'static str },
	/// No spec exists at the path the operation requires.
	#[error("no spec at {path:?}")]
	NoSpec { path: PathKey },
	/// A spec already occupies the destination path.
	#[error("spec already exists at {path:?}")]
	SpecExists { path: PathKey },
	/// Schema-based rejection of a field/spec-type pair.
	#[error("schema does not allow field {field} on {spec_type:?} specs")]
	Validation { spec_type: SpecType, field: Token },
	/// Unrecognized spec types omitted during a bulk content transfer,
	/// collected and reported once.
	#[error("omitted unrecognized spec types setting data on {identifier:?}: {details}")]
	UnrecognizedSpecTypes { identifier: String, details: String },
	/// A batch namespace edit failed precondition validation; nothing was
	/// applied.
	#[error("namespace edit rejected: {0}")]
	NamespaceEdit(String),
	#[error(transparent)]
	ListOp(#[from] ListOpError),
	/// Time sample keys must be finite or infinite, never NaN.
	#[error("time code must not be NaN")]
	InvalidTimeCode,
	/// Read or timestamp failure from a file-format collaborator.
	#[error("I/O failure on layer {identifier:?}: {message}")]
	Io { identifier: String, message: String },
}
