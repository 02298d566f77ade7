use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::data::DataStore;
use crate::layer::registry::LayerRegistry;

/// Global mute table: the muted identifier set plus parked content for
/// dirty layers that were muted (swapped back in on unmute).
struct MutedState {
	identifiers: FxHashSet<String>,
	parked: FxHashMap<String, Box<dyn DataStore>>,
}

static MUTED: LazyLock<Mutex<MutedState>> = LazyLock::new(|| {
	Mutex::new(MutedState {
		identifiers: FxHashSet::default(),
		parked: FxHashMap::default(),
	})
});

/// Monotonic revision of the muted set. Layers cache the revision they
/// last checked against so `is_muted` on a hot path is one atomic load;
/// the check is therefore inherently racy with concurrent mute/unmute and
/// must not be used for synchronization.
static REVISION: AtomicU64 = AtomicU64::new(1);

pub(crate) fn revision() -> u64 {
	REVISION.load(Ordering::Acquire)
}

pub(crate) fn is_muted_identifier(identifier: &str) -> bool {
	MUTED.lock().identifiers.contains(identifier)
}

/// The currently muted identifiers, unordered.
pub fn muted_layers() -> Vec<String> {
	MUTED.lock().identifiers.iter().cloned().collect()
}

pub(crate) fn park_content(identifier: &str, store: Box<dyn DataStore>) {
	MUTED.lock().parked.insert(identifier.to_owned(), store);
}

pub(crate) fn take_parked_content(identifier: &str) -> Option<Box<dyn DataStore>> {
	MUTED.lock().parked.remove(identifier)
}

/// Mutes `identifier`. If a live layer currently carries it, the layer's
/// visible content swaps to empty (dirty content is parked for unmute).
pub fn add_to_muted_layers(identifier: &str) {
	let did_change = {
		let mut muted = MUTED.lock();
		REVISION.fetch_add(1, Ordering::AcqRel);
		muted.identifiers.insert(identifier.to_owned())
	};
	if did_change {
		tracing::debug!(identifier, "muting layer");
		if let Some(layer) = LayerRegistry::get().find(identifier) {
			layer.apply_mute();
		}
	}
}

/// Unmutes `identifier`, restoring parked content or reloading.
pub fn remove_from_muted_layers(identifier: &str) {
	let did_change = {
		let mut muted = MUTED.lock();
		REVISION.fetch_add(1, Ordering::AcqRel);
		muted.identifiers.remove(identifier)
	};
	if did_change {
		tracing::debug!(identifier, "unmuting layer");
		if let Some(layer) = LayerRegistry::get().find(identifier) {
			layer.apply_unmute();
		}
	}
}
