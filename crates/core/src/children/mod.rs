//! Children policies: the typed bridge between parent specs and the
//! children fields that enumerate their child specs.
//!
//! Each kind of parent/child relationship (prims under prims, properties
//! under prims, variants under variant sets, targets under relationships)
//! is described by a [`ChildPolicy`]: which field holds the child keys, how
//! a key maps to a child path and back, and what makes a key valid. The
//! generic operations in [`utils`] keep the children field and the child
//! specs consistent under one change block.

pub mod utils;

#[cfg(test)]
mod tests;

use strata_path::{
	PathKey, PathPart, Token, is_valid_identifier, is_valid_namespaced_identifier,
	is_valid_variant_identifier,
};

use crate::error::{LayerError, Result};
use crate::layer::Layer;
use crate::schema::{SpecType, children_keys};
use crate::value::Value;

pub trait ChildPolicy {
	/// Key type stored in the children field: a name token or, for
	/// targets, the target path itself.
	type Key: Clone + PartialEq + std::fmt::Debug;

	fn children_field() -> Token;

	/// Spec types a child under this policy may have.
	fn spec_types() -> &'static [SpecType];

	fn is_valid_parent(owner: &PathKey) -> bool;

	fn is_valid_key(key: &Self::Key) -> bool;

	fn child_path(owner: &PathKey, key: &Self::Key) -> Option<PathKey>;

	fn key_for_path(path: &PathKey) -> Option<Self::Key>;

	fn key_display(key: &Self::Key) -> String;

	fn keys_to_value(keys: Vec<Self::Key>) -> Value;

	fn keys_from_value(value: &Value) -> Vec<Self::Key>;
}

/// Prim specs named in `primChildren` under the pseudo-root, a prim, or a
/// variant.
pub struct PrimChildren;

impl ChildPolicy for PrimChildren {
	type Key = Token;

	fn children_field() -> Token {
		children_keys().prim_children
	}

	fn spec_types() -> &'static [SpecType] {
		&[SpecType::Prim]
	}

	fn is_valid_parent(owner: &PathKey) -> bool {
		owner.is_root() || owner.is_prim_or_variant_path()
	}

	fn is_valid_key(key: &Self::Key) -> bool {
		is_valid_identifier(key.as_str())
	}

	fn child_path(owner: &PathKey, key: &Self::Key) -> Option<PathKey> {
		owner.append_child(*key)
	}

	fn key_for_path(path: &PathKey) -> Option<Self::Key> {
		match path.last_part()? {
			PathPart::Prim(name) => Some(*name),
			_ => None,
		}
	}

	fn key_display(key: &Self::Key) -> String {
		key.as_str().to_owned()
	}

	fn keys_to_value(keys: Vec<Self::Key>) -> Value {
		Value::TokenVec(keys)
	}

	fn keys_from_value(value: &Value) -> Vec<Self::Key> {
		value.as_token_vec().cloned().unwrap_or_default()
	}
}

/// Attribute and relationship specs named in `propertyChildren` under a
/// prim, a variant, or a relationship target.
pub struct PropertyChildren;

impl ChildPolicy for PropertyChildren {
	type Key = Token;

	fn children_field() -> Token {
		children_keys().property_children
	}

	fn spec_types() -> &'static [SpecType] {
		&[SpecType::Attribute, SpecType::Relationship]
	}

	fn is_valid_parent(owner: &PathKey) -> bool {
		owner.is_prim_or_variant_path() || owner.is_target_path()
	}

	fn is_valid_key(key: &Self::Key) -> bool {
		is_valid_namespaced_identifier(key.as_str())
	}

	fn child_path(owner: &PathKey, key: &Self::Key) -> Option<PathKey> {
		owner.append_property(*key)
	}

	fn key_for_path(path: &PathKey) -> Option<Self::Key> {
		match path.last_part()? {
			PathPart::Property(name) => Some(*name),
			_ => None,
		}
	}

	fn key_display(key: &Self::Key) -> String {
		key.as_str().to_owned()
	}

	fn keys_to_value(keys: Vec<Self::Key>) -> Value {
		Value::TokenVec(keys)
	}

	fn keys_from_value(value: &Value) -> Vec<Self::Key> {
		value.as_token_vec().cloned().unwrap_or_default()
	}
}

/// Variant set specs named in `variantSetChildren` under a prim or
/// variant. A variant set's own spec path selects the empty variant:
/// `/Prim{set=}`.
pub struct VariantSetChildren;

impl ChildPolicy for VariantSetChildren {
	type Key = Token;

	fn children_field() -> Token {
		children_keys().variant_set_children
	}

	fn spec_types() -> &'static [SpecType] {
		&[SpecType::VariantSet]
	}

	fn is_valid_parent(owner: &PathKey) -> bool {
		owner.is_prim_or_variant_path()
	}

	fn is_valid_key(key: &Self::Key) -> bool {
		is_valid_identifier(key.as_str())
	}

	fn child_path(owner: &PathKey, key: &Self::Key) -> Option<PathKey> {
		owner.append_variant_selection(*key, Token::empty())
	}

	fn key_for_path(path: &PathKey) -> Option<Self::Key> {
		match path.last_part()? {
			PathPart::VariantSelection(set, variant) if variant.is_empty() => Some(*set),
			_ => None,
		}
	}

	fn key_display(key: &Self::Key) -> String {
		key.as_str().to_owned()
	}

	fn keys_to_value(keys: Vec<Self::Key>) -> Value {
		Value::TokenVec(keys)
	}

	fn keys_from_value(value: &Value) -> Vec<Self::Key> {
		value.as_token_vec().cloned().unwrap_or_default()
	}
}

/// Variant specs named in `variantChildren` under a variant set. The owner
/// is the variant set path `/Prim{set=}`; the child replaces the empty
/// variant with its own name.
pub struct VariantChildren;

impl ChildPolicy for VariantChildren {
	type Key = Token;

	fn children_field() -> Token {
		children_keys().variant_children
	}

	fn spec_types() -> &'static [SpecType] {
		&[SpecType::Variant]
	}

	fn is_valid_parent(owner: &PathKey) -> bool {
		matches!(
			owner.last_part(),
			Some(PathPart::VariantSelection(_, variant)) if variant.is_empty()
		)
	}

	fn is_valid_key(key: &Self::Key) -> bool {
		is_valid_variant_identifier(key.as_str())
	}

	fn child_path(owner: &PathKey, key: &Self::Key) -> Option<PathKey> {
		match owner.last_part()? {
			PathPart::VariantSelection(set, variant) if variant.is_empty() => {
				owner.parent().append_variant_selection(*set, *key)
			}
			_ => None,
		}
	}

	fn key_for_path(path: &PathKey) -> Option<Self::Key> {
		match path.last_part()? {
			PathPart::VariantSelection(_, variant) if !variant.is_empty() => Some(*variant),
			_ => None,
		}
	}

	fn key_display(key: &Self::Key) -> String {
		key.as_str().to_owned()
	}

	fn keys_to_value(keys: Vec<Self::Key>) -> Value {
		Value::TokenVec(keys)
	}

	fn keys_from_value(value: &Value) -> Vec<Self::Key> {
		value.as_token_vec().cloned().unwrap_or_default()
	}
}

/// Relationship target specs keyed by target path in
/// `relationshipTargetChildren` under a relationship property.
pub struct RelationshipTargetChildren;

impl ChildPolicy for RelationshipTargetChildren {
	type Key = PathKey;

	fn children_field() -> Token {
		children_keys().relationship_target_children
	}

	fn spec_types() -> &'static [SpecType] {
		&[SpecType::RelationshipTarget]
	}

	fn is_valid_parent(owner: &PathKey) -> bool {
		owner.is_property_path()
	}

	fn is_valid_key(_key: &Self::Key) -> bool {
		true
	}

	fn child_path(owner: &PathKey, key: &Self::Key) -> Option<PathKey> {
		owner.append_target(key.clone())
	}

	fn key_for_path(path: &PathKey) -> Option<Self::Key> {
		match path.last_part()? {
			PathPart::Target(target) => Some(target.clone()),
			_ => None,
		}
	}

	fn key_display(key: &Self::Key) -> String {
		key.to_string()
	}

	fn keys_to_value(keys: Vec<Self::Key>) -> Value {
		Value::PathVec(keys)
	}

	fn keys_from_value(value: &Value) -> Vec<Self::Key> {
		value.as_path_vec().cloned().unwrap_or_default()
	}
}

/// Connection specs keyed by source path in `connectionChildren` under an
/// attribute property.
pub struct ConnectionChildren;

impl ChildPolicy for ConnectionChildren {
	type Key = PathKey;

	fn children_field() -> Token {
		children_keys().connection_children
	}

	fn spec_types() -> &'static [SpecType] {
		&[SpecType::Connection]
	}

	fn is_valid_parent(owner: &PathKey) -> bool {
		owner.is_property_path()
	}

	fn is_valid_key(_key: &Self::Key) -> bool {
		true
	}

	fn child_path(owner: &PathKey, key: &Self::Key) -> Option<PathKey> {
		owner.append_target(key.clone())
	}

	fn key_for_path(path: &PathKey) -> Option<Self::Key> {
		match path.last_part()? {
			PathPart::Target(target) => Some(target.clone()),
			_ => None,
		}
	}

	fn key_display(key: &Self::Key) -> String {
		key.to_string()
	}

	fn keys_to_value(keys: Vec<Self::Key>) -> Value {
		Value::PathVec(keys)
	}

	fn keys_from_value(value: &Value) -> Vec<Self::Key> {
		value.as_path_vec().cloned().unwrap_or_default()
	}
}

/// Where a child path lands in the policy space: its owner spec and key.
enum Dispatch {
	Prim { owner: PathKey, key: Token },
	Property { owner: PathKey, key: Token },
	VariantSet { owner: PathKey, key: Token },
	Variant { owner: PathKey, key: Token },
	Target { owner: PathKey, key: PathKey },
}

fn classify(path: &PathKey) -> Result<Dispatch> {
	let Some(last) = path.last_part() else {
		return Err(LayerError::InvalidPath {
			path: path.clone(),
			reason: "the pseudo-root has no children policy",
		});
	};
	match last {
		PathPart::Prim(name) => Ok(Dispatch::Prim {
			owner: path.parent(),
			key: *name,
		}),
		PathPart::Property(name) => Ok(Dispatch::Property {
			owner: path.parent(),
			key: *name,
		}),
		PathPart::VariantSelection(set, variant) if variant.is_empty() => {
			Ok(Dispatch::VariantSet {
				owner: path.parent(),
				key: *set,
			})
		}
		PathPart::VariantSelection(set, variant) => {
			let owner = path
				.parent()
				.append_variant_selection(*set, Token::empty())
				.ok_or_else(|| LayerError::InvalidPath {
					path: path.clone(),
					reason: "variant path has no enclosing variant set",
				})?;
			Ok(Dispatch::Variant {
				owner,
				key: *variant,
			})
		}
		PathPart::Target(target) => Ok(Dispatch::Target {
			owner: path.parent(),
			key: target.clone(),
		}),
	}
}

/// Creates the spec at `path` plus its entry in the owner's children list.
pub(crate) fn create_spec_at_path(
	layer: &Layer,
	path: &PathKey,
	spec_type: SpecType,
	inert: bool,
) -> Result<PathKey> {
	match classify(path)? {
		Dispatch::Prim { owner, key } => {
			utils::create_spec::<PrimChildren>(layer, &owner, &key, spec_type, inert)
		}
		Dispatch::Property { owner, key } => {
			utils::create_spec::<PropertyChildren>(layer, &owner, &key, spec_type, inert)
		}
		Dispatch::VariantSet { owner, key } => {
			utils::create_spec::<VariantSetChildren>(layer, &owner, &key, spec_type, inert)
		}
		Dispatch::Variant { owner, key } => {
			utils::create_spec::<VariantChildren>(layer, &owner, &key, spec_type, inert)
		}
		Dispatch::Target { owner, key } => match spec_type {
			SpecType::RelationshipTarget => {
				if layer.spec_type(&owner) != SpecType::Relationship {
					return Err(LayerError::InvalidPath {
						path: path.clone(),
						reason: "relationship targets require a relationship owner",
					});
				}
				utils::create_spec::<RelationshipTargetChildren>(
					layer, &owner, &key, spec_type, inert,
				)
			}
			SpecType::Connection => {
				if layer.spec_type(&owner) != SpecType::Attribute {
					return Err(LayerError::InvalidPath {
						path: path.clone(),
						reason: "connections require an attribute owner",
					});
				}
				utils::create_spec::<ConnectionChildren>(layer, &owner, &key, spec_type, inert)
			}
			_ => Err(LayerError::InvalidPath {
				path: path.clone(),
				reason: "target paths hold relationship target or connection specs",
			}),
		},
	}
}

/// Creates the spec at `path` and places its children-list entry at
/// `index`, clamped past the end. One change block covers both steps.
pub(crate) fn insert_spec_at_path(
	layer: &Layer,
	path: &PathKey,
	spec_type: SpecType,
	inert: bool,
	index: usize,
) -> Result<PathKey> {
	let _block = crate::change::ChangeBlock::new();
	let child = create_spec_at_path(layer, path, spec_type, inert)?;
	place_child_at(layer, &child, index)?;
	Ok(child)
}

/// Deletes the spec subtree at `path` and its entry in the owner's
/// children list.
pub(crate) fn remove_spec_at_path(layer: &Layer, path: &PathKey) -> Result<()> {
	if path.is_root() {
		return Err(LayerError::InvalidPath {
			path: path.clone(),
			reason: "the pseudo-root cannot be deleted",
		});
	}
	if !layer.has_spec(path) {
		return Err(LayerError::NoSpec { path: path.clone() });
	}
	match classify(path)? {
		Dispatch::Prim { owner, key } => utils::remove_child::<PrimChildren>(layer, &owner, &key),
		Dispatch::Property { owner, key } => {
			utils::remove_child::<PropertyChildren>(layer, &owner, &key)
		}
		Dispatch::VariantSet { owner, key } => {
			utils::remove_child::<VariantSetChildren>(layer, &owner, &key)
		}
		Dispatch::Variant { owner, key } => {
			utils::remove_child::<VariantChildren>(layer, &owner, &key)
		}
		Dispatch::Target { owner, key } => match layer.spec_type(path) {
			SpecType::Connection => utils::remove_child::<ConnectionChildren>(layer, &owner, &key),
			_ => utils::remove_child::<RelationshipTargetChildren>(layer, &owner, &key),
		},
	}
}

/// Moves the spec subtree at `old_path` to `new_path`, keeping both
/// owners' children lists consistent. A same-owner move is a rename and
/// keeps the child's list position.
pub(crate) fn move_spec_between_paths(
	layer: &Layer,
	old_path: &PathKey,
	new_path: &PathKey,
) -> Result<()> {
	if old_path == new_path {
		return Ok(());
	}
	if old_path.is_root() || new_path.is_root() {
		return Err(LayerError::InvalidPath {
			path: old_path.clone(),
			reason: "the pseudo-root cannot be moved",
		});
	}
	if !layer.has_spec(old_path) {
		return Err(LayerError::NoSpec {
			path: old_path.clone(),
		});
	}
	if layer.has_spec(new_path) {
		return Err(LayerError::SpecExists {
			path: new_path.clone(),
		});
	}
	if new_path.has_prefix(old_path) {
		return Err(LayerError::InvalidPath {
			path: new_path.clone(),
			reason: "a spec cannot move into its own subtree",
		});
	}
	let spec_type = layer.spec_type(old_path);
	match (classify(old_path)?, classify(new_path)?) {
		(
			Dispatch::Prim {
				owner: old_owner,
				key: old_key,
			},
			Dispatch::Prim {
				owner: new_owner,
				key: new_key,
			},
		) => move_or_rename::<PrimChildren>(layer, &old_owner, &old_key, &new_owner, &new_key),
		(
			Dispatch::Property {
				owner: old_owner,
				key: old_key,
			},
			Dispatch::Property {
				owner: new_owner,
				key: new_key,
			},
		) => move_or_rename::<PropertyChildren>(layer, &old_owner, &old_key, &new_owner, &new_key),
		(
			Dispatch::VariantSet {
				owner: old_owner,
				key: old_key,
			},
			Dispatch::VariantSet {
				owner: new_owner,
				key: new_key,
			},
		) => {
			move_or_rename::<VariantSetChildren>(layer, &old_owner, &old_key, &new_owner, &new_key)
		}
		(
			Dispatch::Variant {
				owner: old_owner,
				key: old_key,
			},
			Dispatch::Variant {
				owner: new_owner,
				key: new_key,
			},
		) => move_or_rename::<VariantChildren>(layer, &old_owner, &old_key, &new_owner, &new_key),
		(
			Dispatch::Target {
				owner: old_owner,
				key: old_key,
			},
			Dispatch::Target {
				owner: new_owner,
				key: new_key,
			},
		) => {
			if spec_type == SpecType::Connection {
				move_or_rename::<ConnectionChildren>(
					layer, &old_owner, &old_key, &new_owner, &new_key,
				)
			} else {
				move_or_rename::<RelationshipTargetChildren>(
					layer, &old_owner, &old_key, &new_owner, &new_key,
				)
			}
		}
		_ => Err(LayerError::InvalidPath {
			path: new_path.clone(),
			reason: "a move must preserve the path form",
		}),
	}
}

fn move_or_rename<P: ChildPolicy>(
	layer: &Layer,
	old_owner: &PathKey,
	old_key: &P::Key,
	new_owner: &PathKey,
	new_key: &P::Key,
) -> Result<()> {
	if old_owner == new_owner {
		utils::rename_child::<P>(layer, old_owner, old_key, new_key)
	} else {
		utils::move_child::<P>(layer, old_owner, old_key, new_owner, new_key, None)
	}
}

/// The spec path that owns `path`'s children-list entry: the parent spec
/// for prims and properties, the variant set spec for variants.
pub(crate) fn owner_of(path: &PathKey) -> Option<PathKey> {
	match classify(path).ok()? {
		Dispatch::Prim { owner, .. }
		| Dispatch::Property { owner, .. }
		| Dispatch::VariantSet { owner, .. }
		| Dispatch::Variant { owner, .. }
		| Dispatch::Target { owner, .. } => Some(owner),
	}
}

/// Moves `path`'s entry to `index` in its owner's children list, clamping
/// past-the-end indices.
pub(crate) fn place_child_at(layer: &Layer, path: &PathKey, index: usize) -> Result<()> {
	match classify(path)? {
		Dispatch::Prim { owner, key } => place::<PrimChildren>(layer, &owner, &key, index),
		Dispatch::Property { owner, key } => place::<PropertyChildren>(layer, &owner, &key, index),
		Dispatch::VariantSet { owner, key } => {
			place::<VariantSetChildren>(layer, &owner, &key, index)
		}
		Dispatch::Variant { owner, key } => place::<VariantChildren>(layer, &owner, &key, index),
		Dispatch::Target { owner, key } => {
			if layer.spec_type(path) == SpecType::Connection {
				place::<ConnectionChildren>(layer, &owner, &key, index)
			} else {
				place::<RelationshipTargetChildren>(layer, &owner, &key, index)
			}
		}
	}
}

fn place<P: ChildPolicy>(layer: &Layer, owner: &PathKey, key: &P::Key, index: usize) -> Result<()> {
	let mut keys = utils::get_children::<P>(layer, owner);
	let Some(position) = keys.iter().position(|k| k == key) else {
		return Ok(());
	};
	let key = keys.remove(position);
	let index = index.min(keys.len());
	keys.insert(index, key);
	utils::reorder_children::<P>(layer, owner, &keys)
}

/// Child spec paths enumerated by one children field opinion, used by
/// children-driven traversal.
pub(crate) fn child_paths_for_field(field: Token, owner: &PathKey, value: &Value) -> Vec<PathKey> {
	let keys = children_keys();
	if field == keys.prim_children {
		expand::<PrimChildren>(owner, value)
	} else if field == keys.property_children {
		expand::<PropertyChildren>(owner, value)
	} else if field == keys.variant_set_children {
		expand::<VariantSetChildren>(owner, value)
	} else if field == keys.variant_children {
		expand::<VariantChildren>(owner, value)
	} else if field == keys.relationship_target_children {
		expand::<RelationshipTargetChildren>(owner, value)
	} else if field == keys.connection_children {
		expand::<ConnectionChildren>(owner, value)
	} else {
		Vec::new()
	}
}

fn expand<P: ChildPolicy>(owner: &PathKey, value: &Value) -> Vec<PathKey> {
	P::keys_from_value(value)
		.iter()
		.filter_map(|key| P::child_path(owner, key))
		.collect()
}
