//! Generic children operations, parameterized by [`ChildPolicy`].
//!
//! Every operation validates fully before mutating, then performs the spec
//! edit and the children-field edit under one change block so observers see
//! a single consistent notice.

use strata_path::PathKey;

use crate::change::ChangeBlock;
use crate::children::ChildPolicy;
use crate::error::{LayerError, Result};
use crate::layer::Layer;
use crate::schema::SpecType;

fn read_keys<P: ChildPolicy>(layer: &Layer, owner: &PathKey) -> Vec<P::Key> {
	layer
		.get_stored_field(owner, P::children_field())
		.map(|value| P::keys_from_value(&value))
		.unwrap_or_default()
}

fn write_keys<P: ChildPolicy>(layer: &Layer, owner: &PathKey, keys: Vec<P::Key>) {
	let value = if keys.is_empty() {
		None
	} else {
		Some(P::keys_to_value(keys))
	};
	layer.prim_set_field(owner, P::children_field(), value);
}

fn child_path_checked<P: ChildPolicy>(owner: &PathKey, key: &P::Key) -> Result<PathKey> {
	P::child_path(owner, key).ok_or_else(|| LayerError::InvalidPath {
		path: owner.clone(),
		reason: "key does not form a child path under this owner",
	})
}

/// The child keys currently listed under `owner`, in authored order.
pub fn get_children<P: ChildPolicy>(layer: &Layer, owner: &PathKey) -> Vec<P::Key> {
	read_keys::<P>(layer, owner)
}

/// Creates a child spec and appends its key to the owner's children list.
pub fn create_spec<P: ChildPolicy>(
	layer: &Layer,
	owner: &PathKey,
	key: &P::Key,
	spec_type: SpecType,
	inert: bool,
) -> Result<PathKey> {
	if !P::spec_types().contains(&spec_type) {
		return Err(LayerError::InvalidPath {
			path: owner.clone(),
			reason: "spec type does not match the children policy for this path",
		});
	}
	if !P::is_valid_parent(owner) {
		return Err(LayerError::InvalidPath {
			path: owner.clone(),
			reason: "owner path cannot hold children of this kind",
		});
	}
	if !layer.has_spec(owner) {
		return Err(LayerError::NoSpec {
			path: owner.clone(),
		});
	}
	if !P::is_valid_key(key) {
		return Err(LayerError::InvalidName {
			name: P::key_display(key),
			reason: "invalid child name",
		});
	}
	let child = child_path_checked::<P>(owner, key)?;
	if layer.has_spec(&child) {
		return Err(LayerError::SpecExists { path: child });
	}

	let _block = ChangeBlock::new();
	layer.prim_create_spec(&child, spec_type, inert);
	let mut keys = read_keys::<P>(layer, owner);
	keys.push(key.clone());
	write_keys::<P>(layer, owner, keys);
	Ok(child)
}

/// Deletes the child spec subtree and its entry in the owner's list.
pub fn remove_child<P: ChildPolicy>(layer: &Layer, owner: &PathKey, key: &P::Key) -> Result<()> {
	let child = child_path_checked::<P>(owner, key)?;
	if !layer.has_spec(&child) {
		return Err(LayerError::NoSpec { path: child });
	}
	let _block = ChangeBlock::new();
	let mut keys = read_keys::<P>(layer, owner);
	keys.retain(|k| k != key);
	write_keys::<P>(layer, owner, keys);
	layer.prim_delete_subtree(&child);
	Ok(())
}

/// Validation half of [`rename_child`], usable as a dry run.
pub fn can_rename_child<P: ChildPolicy>(
	layer: &Layer,
	owner: &PathKey,
	old_key: &P::Key,
	new_key: &P::Key,
) -> Result<(PathKey, PathKey)> {
	if !P::is_valid_key(new_key) {
		return Err(LayerError::InvalidName {
			name: P::key_display(new_key),
			reason: "invalid child name",
		});
	}
	let old_child = child_path_checked::<P>(owner, old_key)?;
	let new_child = child_path_checked::<P>(owner, new_key)?;
	if !layer.has_spec(&old_child) {
		return Err(LayerError::NoSpec { path: old_child });
	}
	if old_child != new_child && layer.has_spec(&new_child) {
		return Err(LayerError::SpecExists { path: new_child });
	}
	Ok((old_child, new_child))
}

/// Renames a child in place, keeping its position in the children list.
pub fn rename_child<P: ChildPolicy>(
	layer: &Layer,
	owner: &PathKey,
	old_key: &P::Key,
	new_key: &P::Key,
) -> Result<()> {
	let (old_child, new_child) = can_rename_child::<P>(layer, owner, old_key, new_key)?;
	if old_child == new_child {
		return Ok(());
	}
	let _block = ChangeBlock::new();
	layer.prim_move_subtree(&old_child, &new_child);
	let mut keys = read_keys::<P>(layer, owner);
	for slot in &mut keys {
		if slot == old_key {
			*slot = new_key.clone();
		}
	}
	write_keys::<P>(layer, owner, keys);
	Ok(())
}

/// Validation half of [`move_child`].
pub fn can_move_child<P: ChildPolicy>(
	layer: &Layer,
	old_owner: &PathKey,
	old_key: &P::Key,
	new_owner: &PathKey,
	new_key: &P::Key,
) -> Result<(PathKey, PathKey)> {
	if !P::is_valid_key(new_key) {
		return Err(LayerError::InvalidName {
			name: P::key_display(new_key),
			reason: "invalid child name",
		});
	}
	if !P::is_valid_parent(new_owner) {
		return Err(LayerError::InvalidPath {
			path: new_owner.clone(),
			reason: "owner path cannot hold children of this kind",
		});
	}
	if !layer.has_spec(new_owner) {
		return Err(LayerError::NoSpec {
			path: new_owner.clone(),
		});
	}
	let old_child = child_path_checked::<P>(old_owner, old_key)?;
	let new_child = child_path_checked::<P>(new_owner, new_key)?;
	if !layer.has_spec(&old_child) {
		return Err(LayerError::NoSpec { path: old_child });
	}
	if layer.has_spec(&new_child) {
		return Err(LayerError::SpecExists { path: new_child });
	}
	if new_child.has_prefix(&old_child) {
		return Err(LayerError::InvalidPath {
			path: new_child,
			reason: "a spec cannot move into its own subtree",
		});
	}
	Ok((old_child, new_child))
}

/// Reparents a child under a new owner, inserting its key at `index` in
/// the new owner's list (appended when `None` or out of range).
pub fn move_child<P: ChildPolicy>(
	layer: &Layer,
	old_owner: &PathKey,
	old_key: &P::Key,
	new_owner: &PathKey,
	new_key: &P::Key,
	index: Option<usize>,
) -> Result<()> {
	let (old_child, new_child) =
		can_move_child::<P>(layer, old_owner, old_key, new_owner, new_key)?;
	let _block = ChangeBlock::new();
	let mut old_keys = read_keys::<P>(layer, old_owner);
	old_keys.retain(|k| k != old_key);
	write_keys::<P>(layer, old_owner, old_keys);
	layer.prim_move_subtree(&old_child, &new_child);
	let mut new_keys = read_keys::<P>(layer, new_owner);
	match index {
		Some(index) if index < new_keys.len() => new_keys.insert(index, new_key.clone()),
		_ => new_keys.push(new_key.clone()),
	}
	write_keys::<P>(layer, new_owner, new_keys);
	Ok(())
}

/// Reorders the owner's children list. `order` must be a permutation of
/// the current keys; the specs themselves are untouched.
pub fn reorder_children<P: ChildPolicy>(
	layer: &Layer,
	owner: &PathKey,
	order: &[P::Key],
) -> Result<()> {
	let existing = read_keys::<P>(layer, owner);
	let permutation = existing.len() == order.len()
		&& existing.iter().all(|k| order.contains(k))
		&& order.iter().all(|k| existing.contains(k));
	if !permutation {
		return Err(LayerError::InvalidName {
			name: format!("{order:?}"),
			reason: "reorder requires a permutation of the existing children",
		});
	}
	if existing == order {
		return Ok(());
	}
	let _block = ChangeBlock::new();
	write_keys::<P>(layer, owner, order.to_vec());
	layer.notify(|list| list.did_reorder_children(owner));
	Ok(())
}

/// One requested child for [`set_children`]: a key under the owner (kept
/// if a child spec exists, created inert otherwise), or an existing spec
/// elsewhere in the layer to reparent under the owner.
#[derive(Debug, Clone)]
pub enum ChildValue<K> {
	Key(K),
	Spec(PathKey),
}

/// Replaces the owner's children with exactly `values`, in the given
/// order: children not listed are deleted, listed keys without a spec get
/// an inert spec of `spec_type`, and `Spec` entries whose current parent
/// differs are moved under the owner.
pub fn set_children<P: ChildPolicy>(
	layer: &Layer,
	owner: &PathKey,
	values: &[ChildValue<P::Key>],
	spec_type: SpecType,
) -> Result<()> {
	if !P::spec_types().contains(&spec_type) {
		return Err(LayerError::InvalidPath {
			path: owner.clone(),
			reason: "spec type does not match the children policy for this path",
		});
	}
	if !layer.has_spec(owner) {
		return Err(LayerError::NoSpec {
			path: owner.clone(),
		});
	}

	// Resolve every value to its key and, for reparented specs, the path
	// the subtree moves in from.
	let mut keys: Vec<P::Key> = Vec::with_capacity(values.len());
	let mut moves: Vec<(PathKey, PathKey)> = Vec::new();
	for value in values {
		let key = match value {
			ChildValue::Key(key) => key.clone(),
			ChildValue::Spec(source) => {
				let key = P::key_for_path(source).ok_or_else(|| LayerError::InvalidPath {
					path: source.clone(),
					reason: "path does not name a child under this policy",
				})?;
				if !layer.has_spec(source) {
					return Err(LayerError::NoSpec {
						path: source.clone(),
					});
				}
				if !P::spec_types().contains(&layer.spec_type(source)) {
					return Err(LayerError::InvalidPath {
						path: source.clone(),
						reason: "spec type does not match the children policy for this path",
					});
				}
				let destination = child_path_checked::<P>(owner, &key)?;
				if *source != destination {
					if destination.has_prefix(source) {
						return Err(LayerError::InvalidPath {
							path: destination,
							reason: "a spec cannot move into its own subtree",
						});
					}
					if layer.has_spec(&destination) {
						return Err(LayerError::SpecExists { path: destination });
					}
					moves.push((source.clone(), destination));
				}
				key
			}
		};
		if !P::is_valid_key(&key) {
			return Err(LayerError::InvalidName {
				name: P::key_display(&key),
				reason: "invalid child name",
			});
		}
		if keys.contains(&key) {
			return Err(LayerError::InvalidName {
				name: P::key_display(&key),
				reason: "duplicate child name",
			});
		}
		keys.push(key);
	}

	let existing = read_keys::<P>(layer, owner);
	let doomed: Vec<PathKey> = existing
		.iter()
		.filter(|k| !keys.contains(k))
		.map(|k| child_path_checked::<P>(owner, k))
		.collect::<Result<_>>()?;
	for (source, _) in &moves {
		if doomed.iter().any(|d| source.has_prefix(d)) {
			return Err(LayerError::InvalidPath {
				path: source.clone(),
				reason: "cannot reparent out of a subtree being replaced",
			});
		}
	}

	let _block = ChangeBlock::new();
	for child in &doomed {
		layer.prim_delete_subtree(child);
	}
	for (source, destination) in &moves {
		if let Some(source_owner) = super::owner_of(source)
			&& let Some(source_key) = P::key_for_path(source)
		{
			let mut source_keys = read_keys::<P>(layer, &source_owner);
			source_keys.retain(|k| k != &source_key);
			write_keys::<P>(layer, &source_owner, source_keys);
		}
		layer.prim_move_subtree(source, destination);
	}
	for key in &keys {
		let child = child_path_checked::<P>(owner, key)?;
		if !layer.has_spec(&child) {
			layer.prim_create_spec(&child, spec_type, true);
		}
	}
	let reordered = moves.is_empty()
		&& existing.len() == keys.len()
		&& existing.iter().all(|k| keys.contains(k))
		&& existing != keys;
	write_keys::<P>(layer, owner, keys);
	if reordered {
		layer.notify(|list| list.did_reorder_children(owner));
	}
	Ok(())
}
