//! Bulk content replacement as a fine-grained diff.
//!
//! Replacing a layer's content wholesale would force every observer to
//! recompose from scratch. Instead the new store is diffed against the
//! current one: specs that vanish are deleted bottom-up, new specs are
//! created top-down, and individual fields are updated in place, each step
//! emitting its ordinary change notice. Only streaming stores are adopted
//! wholesale, with a single content-replaced notice.

use rustc_hash::FxHashSet;
use strata_path::PathKey;

use crate::change::ChangeBlock;
use crate::data::DataStore;
use crate::layer::Layer;
use crate::schema::{SpecType, field_keys};
use crate::value::{Specifier, Value};

impl Layer {
	pub(crate) fn set_data(&self, new_store: Box<dyn DataStore>) {
		let _block = ChangeBlock::new();
		if new_store.streams_data() || self.content.read().streams_data() {
			*self.content.write() = new_store;
			self.state.mark_dirty();
			self.notify(|list| list.did_replace_content(false));
			return;
		}
		self.state.begin_bulk_edit();
		self.apply_data_diff(&*new_store);
		self.state.end_bulk_edit();
	}

	fn apply_data_diff(&self, new_store: &dyn DataStore) {
		let old_paths = self.content.read().spec_paths();

		// Deletions, bottom-up. Non-required fields are stripped first so
		// each spec is inert by the time its removal notice goes out.
		let mut doomed: Vec<PathKey> = old_paths
			.iter()
			.filter(|path| {
				!new_store.has_spec(path)
					|| new_store.spec_type(path) != self.content.read().spec_type(path)
			})
			.cloned()
			.collect();
		doomed.sort();
		let doomed_set: FxHashSet<PathKey> = doomed.iter().cloned().collect();
		for path in doomed.iter().rev() {
			let (spec_type, fields) = {
				let content = self.content.read();
				(content.spec_type(path), content.list_fields(path))
			};
			let required = self.schema.required_fields(spec_type);
			for field in fields {
				if !required.contains(&field) {
					self.prim_set_field(path, field, None);
				}
			}
			let inert = spec_is_inert(&**self.content.read(), path);
			self.content.write().erase_spec(path);
			self.state.mark_dirty();
			self.notify(|list| list.did_remove_spec(path, inert));
		}
		for path in &doomed {
			// One arena sweep per subtree root; descendants are covered.
			if path.is_root() || !doomed_set.contains(&path.parent()) {
				self.identities.remove_subtree(path);
			}
		}

		// Creations, top-down.
		let mut created: Vec<PathKey> = new_store
			.spec_paths()
			.into_iter()
			.filter(|path| !self.content.read().has_spec(path))
			.collect();
		created.sort();
		for path in &created {
			let inert = spec_is_inert(new_store, path);
			self.prim_create_spec(path, new_store.spec_type(path), inert);
		}

		// Field updates for everything that survives.
		for path in new_store.spec_paths() {
			let old_fields = self.content.read().list_fields(&path);
			let new_fields = new_store.list_fields(&path);
			for field in old_fields {
				if !new_fields.contains(&field) {
					self.prim_set_field(&path, field, None);
				}
			}
			for field in new_fields {
				let value = new_store.get(&path, field);
				if self.content.read().get(&path, field) != value {
					self.prim_set_field(&path, field, value);
				}
			}
		}
	}
}

/// Whether the spec at `path` carries no opinions that would require
/// observers to recompose: an `over` prim without a type, or a non-custom
/// property shell.
pub(super) fn spec_is_inert(store: &dyn DataStore, path: &PathKey) -> bool {
	let keys = field_keys();
	match store.spec_type(path) {
		SpecType::Prim | SpecType::Variant => {
			let specifier = store
				.get(path, keys.specifier)
				.and_then(|v| v.as_specifier())
				.unwrap_or_default();
			let typed = matches!(store.get(path, keys.type_name), Some(Value::Token(t)) if !t.is_empty());
			specifier == Specifier::Over && !typed
		}
		SpecType::Attribute | SpecType::Relationship => !store
			.get(path, keys.custom)
			.and_then(|v| v.as_bool())
			.unwrap_or(false),
		_ => false,
	}
}
