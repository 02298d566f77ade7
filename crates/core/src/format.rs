use std::sync::{Arc, LazyLock};
use std::time::SystemTime;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::data::{DataStore, MemoryStore};
use crate::error::Result;
use crate::layer::LayerHandle;

/// The boundary a file-format codec implements to load and save layers.
///
/// Formats populate a layer exclusively through its public spec/field API
/// and serialize by reading it back; they never touch the identity
/// registry or the change manager. This crate ships no codec; formats
/// register themselves at startup.
pub trait FileFormat: Send + Sync {
	/// Short identifier for diagnostics, e.g. a file extension.
	fn format_id(&self) -> &'static str;

	/// A fresh, empty store of the kind this format reads into. Streaming
	/// formats return a streaming store here.
	fn instantiate_store(&self) -> Box<dyn DataStore> {
		Box::new(MemoryStore::new())
	}

	/// Populates `layer` (already initialized, empty) from the asset at
	/// `resolved_path`.
	fn read(&self, layer: &LayerHandle, resolved_path: &str) -> Result<()>;

	/// Serializes `layer` to the asset at `resolved_path`.
	fn write(&self, layer: &LayerHandle, resolved_path: &str) -> Result<()>;

	/// Last-modified time of the backing asset, used for reload staleness
	/// checks. `None` means unknown (reload always proceeds when forced,
	/// is skipped otherwise).
	fn modification_time(&self, resolved_path: &str) -> Option<SystemTime> {
		let _ = resolved_path;
		None
	}
}

/// Process-wide table of file formats, keyed by file extension.
pub struct FormatRegistry {
	formats: RwLock<FxHashMap<String, Arc<dyn FileFormat>>>,
}

static REGISTRY: LazyLock<FormatRegistry> = LazyLock::new(|| FormatRegistry {
	formats: RwLock::new(FxHashMap::default()),
});

impl FormatRegistry {
	pub fn get() -> &'static FormatRegistry {
		&REGISTRY
	}

	/// Registers `format` for `extension` (without the leading dot),
	/// replacing any previous registration.
	pub fn register(&self, extension: &str, format: Arc<dyn FileFormat>) {
		tracing::debug!(extension, id = format.format_id(), "registering file format");
		self.formats.write().insert(extension.to_owned(), format);
	}

	pub fn find_by_extension(&self, extension: &str) -> Option<Arc<dyn FileFormat>> {
		self.formats.read().get(extension).cloned()
	}

	/// The format handling `layer_path`, chosen by its extension.
	pub fn find_for_path(&self, layer_path: &str) -> Option<Arc<dyn FileFormat>> {
		let extension = layer_path.rsplit_once('.').map(|(_, ext)| ext)?;
		self.find_by_extension(extension)
	}
}
