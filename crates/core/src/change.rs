use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use slab::Slab;
use smallvec::SmallVec;
use strata_path::{PathKey, Token};

use crate::layer::{LayerHandle, LayerId, WeakLayerHandle};

bitflags::bitflags! {
	/// Coarse per-path change flags.
	///
	/// Deliberately imprecise: consumers recompute derived state from
	/// scratch on any touched path, so a fine-grained delta would cost
	/// complexity without buying anything.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
	pub struct ChangeFlags: u32 {
		const FIELD_CHANGED        = 1 << 0;
		const SPEC_ADDED           = 1 << 1;
		const SPEC_ADDED_INERT     = 1 << 2;
		const SPEC_REMOVED         = 1 << 3;
		const SPEC_REMOVED_INERT   = 1 << 4;
		const RENAMED              = 1 << 5;
		const CHILDREN_REORDERED   = 1 << 6;
		const CONTENT_REPLACED     = 1 << 7;
		const CONTENT_RELOADED     = 1 << 8;
		const IDENTIFIER_CHANGED   = 1 << 9;
	}
}

/// What happened at one path.
#[derive(Debug, Clone, Default)]
pub struct ChangeEntry {
	pub flags: ChangeFlags,
	/// Names of fields that changed at this path, deduplicated.
	pub changed_fields: SmallVec<[Token; 4]>,
	/// For renames, the path the spec moved from.
	pub old_path: Option<PathKey>,
}

/// Accumulated changes for one layer, in first-touch order, coalesced per
/// path.
#[derive(Debug, Clone, Default)]
pub struct ChangeList {
	entries: IndexMap<PathKey, ChangeEntry>,
}

impl ChangeList {
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn entry(&self, path: &PathKey) -> Option<&ChangeEntry> {
		self.entries.get(path)
	}

	pub fn entries(&self) -> impl Iterator<Item = (&PathKey, &ChangeEntry)> + '_ {
		self.entries.iter()
	}

	fn entry_mut(&mut self, path: &PathKey) -> &mut ChangeEntry {
		self.entries.entry(path.clone()).or_default()
	}

	pub(crate) fn did_change_field(&mut self, path: &PathKey, field: Token) {
		let entry = self.entry_mut(path);
		entry.flags |= ChangeFlags::FIELD_CHANGED;
		if !entry.changed_fields.contains(&field) {
			entry.changed_fields.push(field);
		}
	}

	pub(crate) fn did_add_spec(&mut self, path: &PathKey, inert: bool) {
		let entry = self.entry_mut(path);
		entry.flags |= if inert {
			ChangeFlags::SPEC_ADDED | ChangeFlags::SPEC_ADDED_INERT
		} else {
			ChangeFlags::SPEC_ADDED
		};
	}

	pub(crate) fn did_remove_spec(&mut self, path: &PathKey, inert: bool) {
		let entry = self.entry_mut(path);
		entry.flags |= if inert {
			ChangeFlags::SPEC_REMOVED | ChangeFlags::SPEC_REMOVED_INERT
		} else {
			ChangeFlags::SPEC_REMOVED
		};
	}

	pub(crate) fn did_move_spec(&mut self, old_path: &PathKey, new_path: &PathKey) {
		let entry = self.entry_mut(new_path);
		entry.flags |= ChangeFlags::RENAMED;
		entry.old_path.get_or_insert_with(|| old_path.clone());
	}

	pub(crate) fn did_reorder_children(&mut self, path: &PathKey) {
		self.entry_mut(path).flags |= ChangeFlags::CHILDREN_REORDERED;
	}

	pub(crate) fn did_replace_content(&mut self, reloaded: bool) {
		let root = PathKey::absolute_root();
		let entry = self.entry_mut(&root);
		entry.flags |= if reloaded {
			ChangeFlags::CONTENT_REPLACED | ChangeFlags::CONTENT_RELOADED
		} else {
			ChangeFlags::CONTENT_REPLACED
		};
	}

	pub(crate) fn did_change_identifier(&mut self) {
		self.entry_mut(&PathKey::absolute_root()).flags |= ChangeFlags::IDENTIFIER_CHANGED;
	}
}

type Subscriber = Arc<dyn Fn(&LayerHandle, &ChangeList) + Send + Sync>;

#[derive(Default)]
struct PendingState {
	/// Open change-block nesting depth. Global, not per-thread: block
	/// open/close therefore serializes change delivery.
	depth: usize,
	pending: IndexMap<LayerId, (WeakLayerHandle, ChangeList)>,
}

/// Process-wide collector that coalesces change notification.
///
/// While any [`ChangeBlock`] is open, per-layer [`ChangeList`]s accumulate;
/// when the outermost block closes, exactly one notice per touched layer is
/// delivered to subscribers, then the state clears. With no block open,
/// each mutation delivers immediately (an implicit one-mutation block).
pub struct ChangeManager {
	state: Mutex<PendingState>,
	subscribers: RwLock<Slab<Subscriber>>,
}

static MANAGER: LazyLock<ChangeManager> = LazyLock::new(|| ChangeManager {
	state: Mutex::new(PendingState::default()),
	subscribers: RwLock::new(Slab::new()),
});

impl ChangeManager {
	pub fn get() -> &'static ChangeManager {
		&MANAGER
	}

	/// Registers a notice callback; dropping the returned guard
	/// unregisters it.
	pub fn subscribe(
		&self,
		callback: impl Fn(&LayerHandle, &ChangeList) + Send + Sync + 'static,
	) -> Subscription {
		let key = self.subscribers.write().insert(Arc::new(callback));
		Subscription { key }
	}

	fn open_block(&self) {
		self.state.lock().depth += 1;
	}

	fn close_block(&self) {
		let delivered = {
			let mut state = self.state.lock();
			state.depth -= 1;
			if state.depth == 0 {
				std::mem::take(&mut state.pending)
			} else {
				return;
			}
		};
		self.deliver(delivered);
	}

	fn deliver(&self, pending: IndexMap<LayerId, (WeakLayerHandle, ChangeList)>) {
		if pending.is_empty() {
			return;
		}
		let subscribers: Vec<Subscriber> =
			self.subscribers.read().iter().map(|(_, s)| s.clone()).collect();
		for (_, (weak, list)) in pending {
			if list.is_empty() {
				continue;
			}
			let Some(layer) = weak.upgrade() else {
				continue;
			};
			tracing::debug!(layer = %layer.identifier(), paths = list.len(), "change notice");
			for subscriber in &subscribers {
				subscriber(&layer, &list);
			}
		}
	}

	/// Records changes for `layer` through `record`. With an open block the
	/// entries accumulate; otherwise they deliver immediately.
	pub(crate) fn with_list(&self, layer: &LayerHandle, record: impl FnOnce(&mut ChangeList)) {
		let immediate = {
			let mut state = self.state.lock();
			let slot = state
				.pending
				.entry(layer.id())
				.or_insert_with(|| (LayerHandle::downgrade(layer), ChangeList::default()));
			record(&mut slot.1);
			if state.depth == 0 {
				std::mem::take(&mut state.pending)
			} else {
				return;
			}
		};
		self.deliver(immediate);
	}

	fn unsubscribe(&self, key: usize) {
		self.subscribers.write().try_remove(key);
	}
}

/// Guard for a registered change subscriber.
pub struct Subscription {
	key: usize,
}

impl Drop for Subscription {
	fn drop(&mut self) {
		ChangeManager::get().unsubscribe(self.key);
	}
}

/// A scope that defers and coalesces change notification.
///
/// Blocks nest; only the outermost matters. Closing the outermost block
/// delivers one coalesced notice per touched layer.
#[must_use = "a change block coalesces notification only while it is held"]
pub struct ChangeBlock(());

impl ChangeBlock {
	pub fn new() -> ChangeBlock {
		ChangeManager::get().open_block();
		ChangeBlock(())
	}
}

impl Default for ChangeBlock {
	fn default() -> Self {
		Self::new()
	}
}

impl Drop for ChangeBlock {
	fn drop(&mut self) {
		ChangeManager::get().close_block();
	}
}
