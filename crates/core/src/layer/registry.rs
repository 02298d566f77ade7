use std::sync::LazyLock;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use rustc_hash::FxHashMap;

use crate::layer::{LayerHandle, WeakLayerHandle};

/// Process-wide table of live layers, keyed by identifier.
///
/// Holds weak handles: a layer unregisters itself when its last strong
/// reference drops, and lookups that find an expired entry clean it up in
/// place (a concurrent drop may already have removed it; removal is
/// idempotent). Layers are published here *before* their content loads so
/// concurrent opens of one identifier converge on a single instance; the
/// per-layer initialization gate handles the wait.
pub struct LayerRegistry {
	by_identifier: RwLock<FxHashMap<String, WeakLayerHandle>>,
}

static REGISTRY: LazyLock<LayerRegistry> = LazyLock::new(|| LayerRegistry {
	by_identifier: RwLock::new(FxHashMap::default()),
});

impl LayerRegistry {
	pub fn get() -> &'static LayerRegistry {
		&REGISTRY
	}

	/// Looks up a live layer. Takes a read lock and promotes the weak
	/// handle; on promotion failure the lock upgrades and the stale entry
	/// is removed.
	pub fn find(&self, identifier: &str) -> Option<LayerHandle> {
		let table = self.by_identifier.upgradable_read();
		let weak = table.get(identifier)?;
		match weak.upgrade() {
			Some(layer) => Some(layer),
			None => {
				let mut table = RwLockUpgradableReadGuard::upgrade(table);
				table.remove(identifier);
				None
			}
		}
	}

	/// Publishes `layer` under `identifier`. Fails (returning the existing
	/// instance) if a live layer already occupies the identifier; expired
	/// entries are displaced. The write lock spans the whole
	/// check-then-publish.
	pub fn try_insert(&self, identifier: &str, layer: &LayerHandle) -> Result<(), LayerHandle> {
		let mut table = self.by_identifier.write();
		if let Some(existing) = table.get(identifier).and_then(WeakLayerHandle::upgrade) {
			return Err(existing);
		}
		table.insert(identifier.to_owned(), LayerHandle::downgrade(layer));
		Ok(())
	}

	/// Unregisters `identifier` if it still maps to `layer` (or to an
	/// expired handle). Idempotent: a concurrent open may have displaced
	/// the entry already.
	pub fn remove(&self, identifier: &str, layer: *const crate::layer::Layer) {
		let mut table = self.by_identifier.write();
		let stale = table.get(identifier).is_some_and(|weak| {
			weak.upgrade()
				.map(|live| std::ptr::eq(LayerHandle::as_ptr(&live), layer))
				.unwrap_or(true)
		});
		if stale {
			table.remove(identifier);
		}
	}

	/// Re-keys `layer` from `old_identifier` to `new_identifier`. The
	/// caller has already validated that the new identifier is free.
	pub(crate) fn rekey(&self, old_identifier: &str, new_identifier: &str, layer: &LayerHandle) {
		let mut table = self.by_identifier.write();
		table.remove(old_identifier);
		table.insert(new_identifier.to_owned(), LayerHandle::downgrade(layer));
	}

	/// Identifiers of all currently-live layers.
	pub fn live_identifiers(&self) -> Vec<String> {
		self.by_identifier
			.read()
			.iter()
			.filter(|(_, weak)| weak.strong_count() > 0)
			.map(|(id, _)| id.clone())
			.collect()
	}
}
