//! Batch namespace edits: renames, reparents and removals validated as a
//! group before anything mutates.
//!
//! Each edit is validated against a simulated namespace that reflects the
//! edits before it, so a batch can rename a prim and then move a child of
//! the renamed prim. Validation failures report every offending edit and
//! leave the layer untouched; application runs under one change block.

use rustc_hash::FxHashSet;
use strata_path::{PathKey, PathPart, Token};

use crate::change::ChangeBlock;
use crate::children;
use crate::error::{LayerError, Result};
use crate::layer::Layer;

/// Where a moved child lands in its new owner's children list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditIndex {
	/// Keep the position a same-owner rename preserves; appended when the
	/// owner changes.
	#[default]
	Same,
	AtEnd,
	At(usize),
}

/// One rename, reparent, or removal.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceEdit {
	pub current_path: PathKey,
	/// `None` removes the spec subtree.
	pub new_path: Option<PathKey>,
	pub index: EditIndex,
}

impl NamespaceEdit {
	/// Renames the spec at `path` in place.
	pub fn rename(path: PathKey, new_name: Token) -> Option<NamespaceEdit> {
		let new_path = match path.last_part()? {
			PathPart::Prim(_) => path.parent().append_child(new_name),
			PathPart::Property(_) => path.parent().append_property(new_name),
			PathPart::VariantSelection(_, variant) if variant.is_empty() => {
				path.parent().append_variant_selection(new_name, Token::empty())
			}
			PathPart::VariantSelection(set, _) => {
				path.parent().append_variant_selection(*set, new_name)
			}
			PathPart::Target(_) => None,
		}?;
		Some(NamespaceEdit {
			current_path: path,
			new_path: Some(new_path),
			index: EditIndex::Same,
		})
	}

	/// Moves the spec at `path` under `new_parent`, keeping its name.
	pub fn reparent(path: PathKey, new_parent: PathKey, index: EditIndex) -> Option<NamespaceEdit> {
		let new_path = match path.last_part()? {
			PathPart::Prim(name) => new_parent.append_child(*name),
			PathPart::Property(name) => new_parent.append_property(*name),
			PathPart::VariantSelection(set, variant) => {
				new_parent.append_variant_selection(*set, *variant)
			}
			PathPart::Target(target) => new_parent.append_target(target.clone()),
		}?;
		Some(NamespaceEdit {
			current_path: path,
			new_path: Some(new_path),
			index,
		})
	}

	/// Removes the spec subtree at `path`.
	pub fn remove(path: PathKey) -> NamespaceEdit {
		NamespaceEdit {
			current_path: path,
			new_path: None,
			index: EditIndex::Same,
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct BatchNamespaceEdit {
	edits: Vec<NamespaceEdit>,
}

impl BatchNamespaceEdit {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, edit: NamespaceEdit) -> &mut Self {
		self.edits.push(edit);
		self
	}

	pub fn edits(&self) -> &[NamespaceEdit] {
		&self.edits
	}
}

/// One rejected edit and why it was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceEditDetail {
	pub edit: NamespaceEdit,
	pub reason: String,
}

fn same_form(a: &PathKey, b: &PathKey) -> bool {
	match (a.last_part(), b.last_part()) {
		(Some(PathPart::Prim(_)), Some(PathPart::Prim(_)))
		| (Some(PathPart::Property(_)), Some(PathPart::Property(_)))
		| (Some(PathPart::Target(_)), Some(PathPart::Target(_))) => true,
		(
			Some(PathPart::VariantSelection(_, v1)),
			Some(PathPart::VariantSelection(_, v2)),
		) => v1.is_empty() == v2.is_empty(),
		_ => false,
	}
}

/// Validates `edit` against the simulated namespace and, on success,
/// updates the simulation.
fn simulate(namespace: &mut FxHashSet<PathKey>, edit: &NamespaceEdit) -> std::result::Result<(), String> {
	if !namespace.contains(&edit.current_path) {
		return Err(format!("no spec at {}", edit.current_path));
	}
	if edit.current_path.is_root() {
		return Err("the pseudo-root cannot be edited".to_owned());
	}
	let Some(new_path) = &edit.new_path else {
		namespace.retain(|p| !p.has_prefix(&edit.current_path));
		return Ok(());
	};
	if !same_form(&edit.current_path, new_path) {
		return Err(format!(
			"{} and {} have different path forms",
			edit.current_path, new_path
		));
	}
	if new_path != &edit.current_path && namespace.contains(new_path) {
		return Err(format!("a spec already exists at {new_path}"));
	}
	if new_path.has_prefix(&edit.current_path) && new_path != &edit.current_path {
		return Err(format!(
			"{} cannot move into its own subtree",
			edit.current_path
		));
	}
	match children::owner_of(new_path) {
		Some(owner) if namespace.contains(&owner) => {}
		_ => {
			return Err(format!("no owner spec for destination {new_path}"));
		}
	}
	let moved: Vec<PathKey> = namespace
		.iter()
		.filter(|p| p.has_prefix(&edit.current_path))
		.cloned()
		.collect();
	for path in moved {
		namespace.remove(&path);
		namespace.insert(path.replace_prefix(&edit.current_path, new_path));
	}
	Ok(())
}

impl Layer {
	/// Checks whether `batch` would apply cleanly, without mutating
	/// anything. Returns every rejected edit on failure.
	pub fn can_apply_namespace_edits(
		&self,
		batch: &BatchNamespaceEdit,
	) -> std::result::Result<(), Vec<NamespaceEditDetail>> {
		let mut namespace: FxHashSet<PathKey> = self.spec_paths().into_iter().collect();
		let mut rejected = Vec::new();
		for edit in batch.edits() {
			if let Err(reason) = simulate(&mut namespace, edit) {
				rejected.push(NamespaceEditDetail {
					edit: edit.clone(),
					reason,
				});
			}
		}
		if rejected.is_empty() {
			Ok(())
		} else {
			Err(rejected)
		}
	}

	/// Applies `batch` in order under one change block. Nothing is applied
	/// unless every edit validates.
	pub fn apply_namespace_edits(&self, batch: &BatchNamespaceEdit) -> Result<()> {
		if let Err(rejected) = self.can_apply_namespace_edits(batch) {
			let details: Vec<String> = rejected
				.iter()
				.map(|d| format!("{}: {}", d.edit.current_path, d.reason))
				.collect();
			return Err(LayerError::NamespaceEdit(details.join("; ")));
		}
		let _block = ChangeBlock::new();
		for edit in batch.edits() {
			match &edit.new_path {
				None => self.delete_spec(&edit.current_path)?,
				Some(new_path) => {
					self.move_spec(&edit.current_path, new_path)?;
					match edit.index {
						EditIndex::Same => {}
						EditIndex::AtEnd => {
							children::place_child_at(self, new_path, usize::MAX)?;
						}
						EditIndex::At(index) => {
							children::place_child_at(self, new_path, index)?;
						}
					}
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use strata_path::PathKey;

	use super::*;
	use crate::layer::LayerHandle;
	use crate::schema::{SpecType, children_keys};

	fn layer() -> LayerHandle {
		let layer = Layer::create_anonymous("nsedit-test");
		for path in ["/A", "/A/Inner", "/B", "/C"] {
			layer.create_spec(&p(path), SpecType::Prim, false).unwrap();
		}
		layer
	}

	fn p(s: &str) -> PathKey {
		s.parse().unwrap()
	}

	#[test]
	fn test_rename_edit() {
		let layer = layer();
		let mut batch = BatchNamespaceEdit::new();
		batch.add(NamespaceEdit::rename(p("/A"), Token::new("Z")).unwrap());
		layer.apply_namespace_edits(&batch).unwrap();
		assert!(layer.has_spec(&p("/Z/Inner")));
		assert!(!layer.has_spec(&p("/A")));
	}

	#[test]
	fn test_later_edit_sees_earlier_rename() {
		let layer = layer();
		let mut batch = BatchNamespaceEdit::new();
		batch
			.add(NamespaceEdit::rename(p("/A"), Token::new("Z")).unwrap())
			.add(NamespaceEdit::remove(p("/Z/Inner")));
		layer.apply_namespace_edits(&batch).unwrap();
		assert!(layer.has_spec(&p("/Z")));
		assert!(!layer.has_spec(&p("/Z/Inner")));
	}

	#[test]
	fn test_invalid_batch_applies_nothing() {
		let layer = layer();
		let mut batch = BatchNamespaceEdit::new();
		batch
			.add(NamespaceEdit::rename(p("/A"), Token::new("Z")).unwrap())
			.add(NamespaceEdit::remove(p("/DoesNotExist")));

		let rejected = layer.can_apply_namespace_edits(&batch).unwrap_err();
		assert_eq!(rejected.len(), 1);
		assert_eq!(rejected[0].edit.current_path, p("/DoesNotExist"));

		assert!(layer.apply_namespace_edits(&batch).is_err());
		assert!(layer.has_spec(&p("/A")));
		assert!(!layer.has_spec(&p("/Z")));
	}

	#[test]
	fn test_reparent_with_index() {
		let layer = layer();
		layer.create_spec(&p("/B/First"), SpecType::Prim, false).unwrap();
		let mut batch = BatchNamespaceEdit::new();
		batch.add(NamespaceEdit::reparent(p("/A/Inner"), p("/B"), EditIndex::At(0)).unwrap());
		layer.apply_namespace_edits(&batch).unwrap();

		let children = layer
			.get_field(&p("/B"), children_keys().prim_children)
			.and_then(|v| v.as_token_vec().cloned())
			.unwrap();
		assert_eq!(children, vec![Token::new("Inner"), Token::new("First")]);
	}

	#[test]
	fn test_move_into_own_subtree_rejected() {
		let layer = layer();
		let mut batch = BatchNamespaceEdit::new();
		batch.add(NamespaceEdit::reparent(p("/A"), p("/A/Inner"), EditIndex::Same).unwrap());
		assert!(layer.can_apply_namespace_edits(&batch).is_err());
	}

	#[test]
	fn test_collision_rejected() {
		let layer = layer();
		let mut batch = BatchNamespaceEdit::new();
		batch.add(NamespaceEdit::rename(p("/B"), Token::new("C")).unwrap());
		let rejected = layer.can_apply_namespace_edits(&batch).unwrap_err();
		assert!(rejected[0].reason.contains("already exists"));
	}
}
