use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use slab::Slab;
use strata_path::PathKey;

use crate::layer::{LayerHandle, WeakLayerHandle};
use crate::schema::SpecType;

/// Arena of spec identities for one layer.
///
/// Handles hold a stable integer id; the registry maps id → current path
/// and path → id. Moving or renaming a spec rewrites only the path side of
/// the mapping, so outstanding handles keep resolving to the spec after it
/// relocates. Identities are created lazily, on first external request.
#[derive(Default)]
pub struct IdentityRegistry {
	inner: Mutex<Identities>,
}

#[derive(Default)]
struct Identities {
	paths: Slab<PathKey>,
	ids: FxHashMap<PathKey, usize>,
}

impl IdentityRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// The identity id for `path`, created if not yet registered.
	pub(crate) fn identify(&self, path: &PathKey) -> usize {
		let mut inner = self.inner.lock();
		if let Some(&id) = inner.ids.get(path) {
			return id;
		}
		let id = inner.paths.insert(path.clone());
		inner.ids.insert(path.clone(), id);
		id
	}

	pub(crate) fn path_of(&self, id: usize) -> Option<PathKey> {
		self.inner.lock().paths.get(id).cloned()
	}

	/// Reindexes every registered identity under `old_prefix` to live under
	/// `new_prefix`. Ids are untouched; only the path side moves.
	pub(crate) fn move_subtree(&self, old_prefix: &PathKey, new_prefix: &PathKey) {
		let mut inner = self.inner.lock();
		let moved: Vec<usize> = inner
			.ids
			.iter()
			.filter(|(path, _)| path.has_prefix(old_prefix))
			.map(|(_, &id)| id)
			.collect();
		for id in moved {
			let old_path = inner.paths[id].clone();
			let new_path = old_path.replace_prefix(old_prefix, new_prefix);
			inner.ids.remove(&old_path);
			inner.ids.insert(new_path.clone(), id);
			inner.paths[id] = new_path;
		}
	}

	/// Drops identities for every registered path under `prefix`. Handles
	/// holding those ids resolve to `None` afterwards.
	pub(crate) fn remove_subtree(&self, prefix: &PathKey) {
		let mut inner = self.inner.lock();
		let removed: Vec<usize> = inner
			.ids
			.iter()
			.filter(|(path, _)| path.has_prefix(prefix))
			.map(|(_, &id)| id)
			.collect();
		for id in removed {
			let path = inner.paths.remove(id);
			inner.ids.remove(&path);
		}
	}
}

/// A movable reference to a spec in a layer.
///
/// Stays valid across renames and moves of the spec (or any ancestor); goes
/// stale only when the spec or its layer is dropped.
#[derive(Clone)]
pub struct SpecHandle {
	layer: WeakLayerHandle,
	id: usize,
}

impl SpecHandle {
	pub(crate) fn new(layer: WeakLayerHandle, id: usize) -> Self {
		SpecHandle { layer, id }
	}

	/// The spec's current path, if the layer is still alive and the spec
	/// still exists.
	pub fn path(&self) -> Option<PathKey> {
		let layer = self.layer.upgrade()?;
		let path = layer.identities().path_of(self.id)?;
		layer.has_spec(&path).then_some(path)
	}

	/// The layer the handle points into.
	pub fn layer(&self) -> Option<LayerHandle> {
		self.layer.upgrade()
	}

	/// The spec type at the handle's current location.
	pub fn spec_type(&self) -> SpecType {
		match (self.layer.upgrade(), self.path()) {
			(Some(layer), Some(path)) => layer.spec_type(&path),
			_ => SpecType::Unknown,
		}
	}

	/// True when the handle still resolves to a live spec.
	pub fn is_valid(&self) -> bool {
		self.path().is_some()
	}
}

impl std::fmt::Debug for SpecHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.path() {
			Some(path) => write!(f, "SpecHandle({path:?})"),
			None => write!(f, "SpecHandle(<stale>)"),
		}
	}
}
