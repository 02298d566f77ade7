//! Layers: the unit of scene description storage.
//!
//! A [`Layer`] owns one [`DataStore`](crate::data::DataStore) of specs and
//! fields, an identity arena for movable spec references, a dirty-state
//! delegate and a registry entry keyed by identifier. Layers are only ever
//! handed out as [`LayerHandle`]s; the registry holds weak references and a
//! layer unregisters itself on drop.

mod diff;
mod mute;
pub mod identifier;
pub mod registry;
pub mod state_delegate;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::SystemTime;

use parking_lot::{Condvar, Mutex, RwLock};
use strata_path::{PathKey, Token};

use crate::change::{ChangeBlock, ChangeList, ChangeManager};
use crate::children;
use crate::data::{DataStore, MemoryStore};
use crate::error::{LayerError, Result};
use crate::format::{FileFormat, FormatRegistry};
use crate::identity::{IdentityRegistry, SpecHandle};
use crate::layer::identifier::{
	FormatArguments, generate_anonymous_identifier, is_anonymous_identifier, join_identifier,
	split_identifier,
};
use crate::layer::registry::LayerRegistry;
use crate::layer::state_delegate::{SimpleStateDelegate, StateDelegate};
use crate::listop::ListOp;
use crate::schema::{Schema, SpecType, field_keys, validation_enabled};
use crate::value::{TimeCode, TimeSampleMap, Value};

pub use mute::{add_to_muted_layers, muted_layers, remove_from_muted_layers};

/// Strong reference to a layer.
pub type LayerHandle = Arc<Layer>;
/// Weak reference to a layer, as held by the registry and change manager.
pub type WeakLayerHandle = Weak<Layer>;

/// Process-unique layer identity, stable for the layer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(u64);

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Outcome of [`Layer::reload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadResult {
	/// The layer was already current, nothing happened.
	Skipped,
	/// Content was replaced from the source of truth.
	Reloaded,
}

enum InitState {
	/// Being populated by the named thread; everyone else waits.
	Initializing(ThreadId),
	Done(bool),
}

/// One-shot gate published alongside a layer that is still being read in.
/// The opening thread passes through; all other API entry points block
/// until `finish` records success or failure.
struct InitGate {
	state: Mutex<InitState>,
	cond: Condvar,
}

impl InitGate {
	fn initializing() -> Self {
		InitGate {
			state: Mutex::new(InitState::Initializing(thread::current().id())),
			cond: Condvar::new(),
		}
	}

	fn done(success: bool) -> Self {
		InitGate {
			state: Mutex::new(InitState::Done(success)),
			cond: Condvar::new(),
		}
	}

	fn finish(&self, success: bool) {
		*self.state.lock() = InitState::Done(success);
		self.cond.notify_all();
	}

	fn wait(&self) -> bool {
		let mut state = self.state.lock();
		loop {
			match *state {
				InitState::Done(success) => return success,
				InitState::Initializing(owner) if owner == thread::current().id() => return true,
				InitState::Initializing(_) => self.cond.wait(&mut state),
			}
		}
	}

	fn result(&self) -> Option<bool> {
		match *self.state.lock() {
			InitState::Done(success) => Some(success),
			InitState::Initializing(_) => None,
		}
	}
}

struct LayerIdentity {
	/// Canonical identifier: layer path plus sorted format arguments.
	identifier: String,
	layer_path: String,
	format_args: FormatArguments,
	resolved_path: Option<String>,
	format: Option<Arc<dyn FileFormat>>,
	asset_mod_time: Option<SystemTime>,
}

struct MuteCache {
	revision: u64,
	muted: bool,
}

pub struct Layer {
	id: LayerId,
	self_weak: WeakLayerHandle,
	schema: &'static Schema,
	identity: Mutex<LayerIdentity>,
	content: RwLock<Box<dyn DataStore>>,
	identities: IdentityRegistry,
	state: Box<dyn StateDelegate>,
	permission_to_edit: AtomicBool,
	permission_to_save: AtomicBool,
	init: InitGate,
	mute_cache: Mutex<MuteCache>,
	registered: AtomicBool,
}

impl Layer {
	// -- construction ------------------------------------------------------

	fn new_handle(
		identity: LayerIdentity,
		store: Box<dyn DataStore>,
		init: InitGate,
		registered: bool,
	) -> LayerHandle {
		Arc::new_cyclic(|weak| Layer {
			id: LayerId(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed)),
			self_weak: weak.clone(),
			schema: Schema::get(),
			identity: Mutex::new(identity),
			content: RwLock::new(store),
			identities: IdentityRegistry::new(),
			state: Box::new(SimpleStateDelegate::new()),
			permission_to_edit: AtomicBool::new(true),
			permission_to_save: AtomicBool::new(true),
			init,
			mute_cache: Mutex::new(MuteCache {
				revision: 0,
				muted: false,
			}),
			registered: AtomicBool::new(registered),
		})
	}

	/// An empty store holding only the pseudo-root spec.
	fn empty_store() -> Box<dyn DataStore> {
		let mut store = Box::new(MemoryStore::new());
		store.create_spec(PathKey::absolute_root(), SpecType::PseudoRoot);
		store
	}

	/// Creates an in-memory layer with a generated `anon:` identifier.
	/// Anonymous layers are registered like any other but never resolve to
	/// an asset, so they cannot be saved or reloaded from disk.
	pub fn create_anonymous(tag: &str) -> LayerHandle {
		let identifier = generate_anonymous_identifier(tag);
		let layer = Self::new_handle(
			LayerIdentity {
				identifier: identifier.clone(),
				layer_path: identifier.clone(),
				format_args: FormatArguments::new(),
				resolved_path: None,
				format: None,
				asset_mod_time: None,
			},
			Self::empty_store(),
			InitGate::done(true),
			true,
		);
		// The serial in the identifier makes collision impossible.
		let _ = LayerRegistry::get().try_insert(&identifier, &layer);
		tracing::debug!(identifier, "created anonymous layer");
		layer
	}

	/// Creates a new empty layer registered under `identifier`.
	///
	/// Fails if the identifier is malformed, reserved, or already claimed by
	/// a live layer.
	pub fn create_new(identifier: &str) -> Result<LayerHandle> {
		if is_anonymous_identifier(identifier) {
			return Err(LayerError::InvalidIdentifier {
				identifier: identifier.to_owned(),
				reason: "anonymous identifiers are generated, use create_anonymous",
			});
		}
		let (layer_path, format_args) = split_identifier(identifier)?;
		let canonical = join_identifier(&layer_path, &format_args);
		let format = FormatRegistry::get().find_for_path(&layer_path);
		let layer = Self::new_handle(
			LayerIdentity {
				identifier: canonical.clone(),
				resolved_path: Some(layer_path.clone()),
				layer_path,
				format_args,
				format,
				asset_mod_time: None,
			},
			Self::empty_store(),
			InitGate::done(true),
			true,
		);
		LayerRegistry::get()
			.try_insert(&canonical, &layer)
			.map_err(|_| LayerError::InvalidIdentifier {
				identifier: canonical.clone(),
				reason: "a layer with this identifier already exists",
			})?;
		tracing::debug!(identifier = canonical, "created new layer");
		Ok(layer)
	}

	/// Finds an already-open layer by identifier. Waits out a concurrent
	/// open of the same identifier; returns `None` if that open failed.
	pub fn find(identifier: &str) -> Option<LayerHandle> {
		let (layer_path, format_args) = split_identifier(identifier).ok()?;
		let canonical = join_identifier(&layer_path, &format_args);
		let layer = LayerRegistry::get().find(&canonical)?;
		layer.init.wait().then_some(layer)
	}

	/// Returns the layer registered under `identifier`, opening it from its
	/// asset if no live layer carries it yet.
	///
	/// The layer is published in the registry before its content is read so
	/// that concurrent callers converge on one layer object; they block on
	/// the init gate until the read finishes. A failed read unregisters the
	/// layer and every waiter gets the error.
	pub fn find_or_open(identifier: &str) -> Result<LayerHandle> {
		let (layer_path, format_args) = split_identifier(identifier)?;
		let canonical = join_identifier(&layer_path, &format_args);
		if let Some(existing) = LayerRegistry::get().find(&canonical) {
			return Self::wait_for_other_open(existing, canonical);
		}

		let format = FormatRegistry::get().find_for_path(&layer_path).ok_or(
			LayerError::InvalidIdentifier {
				identifier: canonical.clone(),
				reason: "no file format registered for this extension",
			},
		)?;
		let mut store = format.instantiate_store();
		if !store.has_spec(&PathKey::absolute_root()) {
			store.create_spec(PathKey::absolute_root(), SpecType::PseudoRoot);
		}
		let layer = Self::new_handle(
			LayerIdentity {
				identifier: canonical.clone(),
				layer_path: layer_path.clone(),
				format_args,
				resolved_path: Some(layer_path.clone()),
				format: Some(format.clone()),
				asset_mod_time: None,
			},
			store,
			InitGate::initializing(),
			true,
		);
		if let Err(existing) = LayerRegistry::get().try_insert(&canonical, &layer) {
			// Lost the publish race; wait on the winner instead.
			layer.registered.store(false, Ordering::Release);
			layer.init.finish(false);
			return Self::wait_for_other_open(existing, canonical);
		}

		match format.read(&layer, &layer_path) {
			Ok(()) => {
				layer.identity.lock().asset_mod_time = format.modification_time(&layer_path);
				layer.state.mark_clean();
				layer.init.finish(true);
				tracing::debug!(identifier = canonical, "opened layer");
				Ok(layer)
			}
			Err(err) => {
				layer.init.finish(false);
				LayerRegistry::get().remove(&canonical, Arc::as_ptr(&layer));
				layer.registered.store(false, Ordering::Release);
				tracing::warn!(identifier = canonical, error = %err, "failed to open layer");
				Err(err)
			}
		}
	}

	fn wait_for_other_open(existing: LayerHandle, canonical: String) -> Result<LayerHandle> {
		if existing.init.wait() {
			Ok(existing)
		} else {
			Err(LayerError::Io {
				identifier: canonical,
				message: "layer initialization failed in another caller".to_owned(),
			})
		}
	}

	/// Unregistered scratch layer used as a read target during reloads.
	/// Its gate is finished unsuccessfully so it never emits notices.
	fn new_scratch(store: Box<dyn DataStore>) -> LayerHandle {
		Self::new_handle(
			LayerIdentity {
				identifier: generate_anonymous_identifier("scratch"),
				layer_path: String::new(),
				format_args: FormatArguments::new(),
				resolved_path: None,
				format: None,
				asset_mod_time: None,
			},
			store,
			InitGate::done(false),
			false,
		)
	}

	fn ensure_ready(&self) {
		let _ = self.init.wait();
	}

	// -- identity ----------------------------------------------------------

	pub fn id(&self) -> LayerId {
		self.id
	}

	pub fn identifier(&self) -> String {
		self.identity.lock().identifier.clone()
	}

	pub fn resolved_path(&self) -> Option<String> {
		self.identity.lock().resolved_path.clone()
	}

	pub fn format_arguments(&self) -> FormatArguments {
		self.identity.lock().format_args.clone()
	}

	pub fn is_anonymous(&self) -> bool {
		is_anonymous_identifier(&self.identity.lock().identifier)
	}

	/// Rebinds the layer to a new identifier, rekeying the registry entry.
	pub fn set_identifier(&self, identifier: &str) -> Result<()> {
		self.ensure_ready();
		let (layer_path, format_args) = split_identifier(identifier)?;
		let canonical = join_identifier(&layer_path, &format_args);
		let old = self.identifier();
		if canonical == old {
			return Ok(());
		}
		if LayerRegistry::get().find(&canonical).is_some() {
			return Err(LayerError::InvalidIdentifier {
				identifier: canonical,
				reason: "a layer with this identifier already exists",
			});
		}
		let handle = match self.handle() {
			Some(handle) => handle,
			None => return Ok(()),
		};
		LayerRegistry::get().rekey(&old, &canonical, &handle);
		{
			let mut identity = self.identity.lock();
			let anonymous = is_anonymous_identifier(&canonical);
			identity.identifier = canonical;
			identity.resolved_path = (!anonymous).then(|| layer_path.clone());
			identity.layer_path = layer_path.clone();
			identity.format_args = format_args;
			if identity.format.is_none() && !anonymous {
				identity.format = FormatRegistry::get().find_for_path(&layer_path);
			}
		}
		self.notify(|list| list.did_change_identifier());
		Ok(())
	}

	fn format_and_resolved_path(&self) -> Option<(Arc<dyn FileFormat>, String)> {
		let identity = self.identity.lock();
		match (&identity.format, &identity.resolved_path) {
			(Some(format), Some(path)) => Some((format.clone(), path.clone())),
			_ => None,
		}
	}

	// -- state -------------------------------------------------------------

	pub fn is_dirty(&self) -> bool {
		self.state.is_dirty()
	}

	/// True when no spec other than the bare pseudo-root exists.
	pub fn is_empty(&self) -> bool {
		self.ensure_ready();
		let content = self.content.read();
		content.spec_count() == 1 && content.list_fields(&PathKey::absolute_root()).is_empty()
	}

	pub fn permission_to_edit(&self) -> bool {
		self.permission_to_edit.load(Ordering::Acquire)
	}

	pub fn set_permission_to_edit(&self, allow: bool) {
		self.permission_to_edit.store(allow, Ordering::Release);
	}

	pub fn permission_to_save(&self) -> bool {
		self.permission_to_save.load(Ordering::Acquire)
	}

	pub fn set_permission_to_save(&self, allow: bool) {
		self.permission_to_save.store(allow, Ordering::Release);
	}

	/// Whether this layer's identifier is in the global muted set. Cached
	/// against the mute revision so repeated queries are cheap.
	pub fn is_muted(&self) -> bool {
		let revision = mute::revision();
		let mut cache = self.mute_cache.lock();
		if cache.revision != revision {
			cache.revision = revision;
			cache.muted = mute::is_muted_identifier(&self.identifier());
		}
		cache.muted
	}

	pub(crate) fn apply_mute(&self) {
		self.ensure_ready();
		let _block = ChangeBlock::new();
		if self.state.is_dirty() {
			// Park the unsaved edits so unmute can bring them back.
			let parked: Box<dyn DataStore> = {
				let content = self.content.read();
				let mut copy = Box::new(MemoryStore::new());
				copy.copy_from(&**content);
				copy
			};
			mute::park_content(&self.identifier(), parked);
			self.set_data(Self::empty_store());
		} else {
			self.set_data(Self::empty_store());
			self.state.mark_clean();
		}
	}

	pub(crate) fn apply_unmute(&self) {
		self.ensure_ready();
		let _block = ChangeBlock::new();
		if let Some(parked) = mute::take_parked_content(&self.identifier()) {
			self.set_data(parked);
		} else if !self.is_anonymous() {
			if let Err(err) = self.reload(true) {
				tracing::warn!(identifier = self.identifier(), error = %err, "reload on unmute failed");
			}
		}
	}

	// -- change plumbing ---------------------------------------------------

	fn handle(&self) -> Option<LayerHandle> {
		self.self_weak.upgrade()
	}

	fn should_notify(&self) -> bool {
		self.init.result() == Some(true)
	}

	pub(crate) fn notify(&self, record: impl FnOnce(&mut ChangeList)) {
		if !self.should_notify() {
			return;
		}
		if let Some(handle) = self.handle() {
			ChangeManager::get().with_list(&handle, record);
		}
	}

	fn check_edit_permission(&self) -> Result<()> {
		if self.permission_to_edit() {
			Ok(())
		} else {
			Err(LayerError::PermissionDenied {
				identifier: self.identifier(),
			})
		}
	}

	// -- spec queries ------------------------------------------------------

	pub fn has_spec(&self, path: &PathKey) -> bool {
		self.ensure_ready();
		self.content.read().has_spec(path)
	}

	pub fn spec_type(&self, path: &PathKey) -> SpecType {
		self.ensure_ready();
		self.content.read().spec_type(path)
	}

	pub fn spec_count(&self) -> usize {
		self.ensure_ready();
		self.content.read().spec_count()
	}

	pub fn spec_paths(&self) -> Vec<PathKey> {
		self.ensure_ready();
		self.content.read().spec_paths()
	}

	/// A movable reference to the spec at `path`: it tracks the spec across
	/// renames and reparents within this layer.
	pub fn spec_handle(&self, path: &PathKey) -> Option<SpecHandle> {
		self.ensure_ready();
		self.has_spec(path)
			.then(|| SpecHandle::new(self.self_weak.clone(), self.identities.identify(path)))
	}

	pub(crate) fn identities(&self) -> &IdentityRegistry {
		&self.identities
	}

	// -- field access ------------------------------------------------------

	/// Fields with opinions at `path`, in storage order, with any required
	/// fields of the spec type appended even when unauthored.
	pub fn list_fields(&self, path: &PathKey) -> Vec<Token> {
		self.ensure_ready();
		let (mut fields, spec_type) = {
			let content = self.content.read();
			(content.list_fields(path), content.spec_type(path))
		};
		for required in self.schema.required_fields(spec_type) {
			if !fields.contains(required) {
				fields.push(*required);
			}
		}
		fields
	}

	/// Field value at `path`; required fields fall back to their schema
	/// fallback when unauthored.
	pub fn get_field(&self, path: &PathKey, field: Token) -> Option<Value> {
		self.ensure_ready();
		let (stored, spec_type) = {
			let content = self.content.read();
			(content.get(path, field), content.spec_type(path))
		};
		stored.or_else(|| {
			let definition = self.schema.spec_definition(spec_type)?;
			if definition.is_required_field(field) {
				self.schema.fallback(field).cloned()
			} else {
				None
			}
		})
	}

	/// Typed convenience over [`Layer::get_field`].
	pub fn get_field_as<T: TryFrom<Value>>(&self, path: &PathKey, field: Token) -> Option<T> {
		self.get_field(path, field).and_then(|v| T::try_from(v).ok())
	}

	pub fn has_field(&self, path: &PathKey, field: Token) -> bool {
		self.get_field(path, field).is_some()
	}

	/// Stored opinion only, without required-field fallbacks.
	pub(crate) fn get_stored_field(&self, path: &PathKey, field: Token) -> Option<Value> {
		self.content.read().get(path, field)
	}

	pub fn set_field(&self, path: &PathKey, field: Token, value: impl Into<Value>) -> Result<()> {
		self.edit_field(path, field, Some(value.into()))
	}

	/// Removes the opinion for `field` at `path`. Erasing a required field
	/// resets it to its fallback rather than removing it from view.
	pub fn erase_field(&self, path: &PathKey, field: Token) -> Result<()> {
		self.edit_field(path, field, None)
	}

	fn edit_field(&self, path: &PathKey, field: Token, value: Option<Value>) -> Result<()> {
		self.ensure_ready();
		self.check_edit_permission()?;
		let spec_type = self.spec_type(path);
		if spec_type == SpecType::Unknown {
			return Err(LayerError::NoSpec { path: path.clone() });
		}
		if validation_enabled() {
			if !self.schema.is_valid_field_for_spec(spec_type, field) {
				tracing::warn!(
					path = %path,
					field = %field,
					?spec_type,
					"rejected field not allowed by schema"
				);
				return Err(LayerError::Validation { spec_type, field });
			}
			if let Some(value) = &value {
				self.check_field_items(spec_type, field, value)?;
			}
		}
		self.prim_set_field(path, field, value);
		Ok(())
	}

	/// Runs the per-item validator a children field declares, if any.
	fn check_field_items(&self, spec_type: SpecType, field: Token, value: &Value) -> Result<()> {
		let Some(validator) = self
			.schema
			.field_definition(field)
			.and_then(|def| def.item_validator)
		else {
			return Ok(());
		};
		let ok = match value {
			Value::TokenVec(items) => items.iter().all(|item| validator(item.as_str())),
			Value::StringVec(items) => items.iter().all(|item| validator(item)),
			_ => true,
		};
		if ok {
			Ok(())
		} else {
			Err(LayerError::Validation { spec_type, field })
		}
	}

	/// Lowest-level field write: no permission or schema checks, no-op
	/// detection, dirty marking and change notice.
	pub(crate) fn prim_set_field(&self, path: &PathKey, field: Token, value: Option<Value>) {
		let changed = {
			let mut content = self.content.write();
			match value {
				Some(value) => {
					if content.get(path, field).as_ref() == Some(&value) {
						false
					} else {
						content.set(path, field, value);
						true
					}
				}
				None => content.erase(path, field),
			}
		};
		if changed {
			self.state.mark_dirty();
			self.notify(|list| list.did_change_field(path, field));
		}
	}

	// -- time samples ------------------------------------------------------

	pub fn time_samples(&self, path: &PathKey) -> Option<TimeSampleMap> {
		self.ensure_ready();
		self.content.read().time_samples(path)
	}

	pub fn query_time_sample(&self, path: &PathKey, time: f64) -> Option<Value> {
		self.ensure_ready();
		let time = TimeCode::new(time)?;
		self.content.read().time_sample(path, time)
	}

	pub fn set_time_sample(
		&self,
		path: &PathKey,
		time: f64,
		value: impl Into<Value>,
	) -> Result<()> {
		self.ensure_ready();
		self.check_edit_permission()?;
		let time = TimeCode::new(time).ok_or(LayerError::InvalidTimeCode)?;
		if !self.has_spec(path) {
			return Err(LayerError::NoSpec { path: path.clone() });
		}
		self.content.write().set_time_sample(path, time, value.into());
		self.state.mark_dirty();
		self.notify(|list| list.did_change_field(path, field_keys().time_samples));
		Ok(())
	}

	pub fn erase_time_sample(&self, path: &PathKey, time: f64) -> Result<()> {
		self.ensure_ready();
		self.check_edit_permission()?;
		let time = TimeCode::new(time).ok_or(LayerError::InvalidTimeCode)?;
		if self.content.write().erase_time_sample(path, time) {
			self.state.mark_dirty();
			self.notify(|list| list.did_change_field(path, field_keys().time_samples));
		}
		Ok(())
	}

	/// The authored samples bracketing `time`, for interpolation. NaN has
	/// no bracket.
	pub fn bracketing_time_samples(
		&self,
		path: &PathKey,
		time: f64,
	) -> Option<(TimeCode, TimeCode)> {
		self.ensure_ready();
		let time = TimeCode::new(time)?;
		self.content.read().bracketing_time_samples(path, time)
	}

	// -- spec editing ------------------------------------------------------

	/// Creates a spec at `path` and records it in the parent's children
	/// list, atomically with respect to change notices.
	///
	/// `inert` marks specs that carry no opinions of their own (an `over`
	/// without a type, a non-custom property shell) so observers can skip
	/// recomposition.
	pub fn create_spec(&self, path: &PathKey, spec_type: SpecType, inert: bool) -> Result<()> {
		self.ensure_ready();
		self.check_edit_permission()?;
		children::create_spec_at_path(self, path, spec_type, inert)?;
		Ok(())
	}

	/// Like [`Layer::create_spec`], but inserts the children-list entry at
	/// `index` instead of appending (clamped to the list length).
	pub fn insert_spec(
		&self,
		path: &PathKey,
		spec_type: SpecType,
		inert: bool,
		index: usize,
	) -> Result<()> {
		self.ensure_ready();
		self.check_edit_permission()?;
		children::insert_spec_at_path(self, path, spec_type, inert, index)?;
		Ok(())
	}

	/// Deletes the spec at `path` and its whole subtree, removing the entry
	/// from the parent's children list.
	pub fn delete_spec(&self, path: &PathKey) -> Result<()> {
		self.ensure_ready();
		self.check_edit_permission()?;
		children::remove_spec_at_path(self, path)
	}

	/// Moves the spec subtree at `old_path` to `new_path`. Both paths must
	/// have the same form; a move within one parent is a rename and keeps
	/// the child's position in the children list.
	pub fn move_spec(&self, old_path: &PathKey, new_path: &PathKey) -> Result<()> {
		self.ensure_ready();
		self.check_edit_permission()?;
		children::move_spec_between_paths(self, old_path, new_path)
	}

	/// Creates the spec without touching any children list.
	pub(crate) fn prim_create_spec(&self, path: &PathKey, spec_type: SpecType, inert: bool) {
		self.content.write().create_spec(path.clone(), spec_type);
		self.state.mark_dirty();
		self.notify(|list| list.did_add_spec(path, inert));
	}

	/// Erases the spec at `root` and everything beneath it, bottom-up, and
	/// retires the subtree's identities.
	pub(crate) fn prim_delete_subtree(&self, root: &PathKey) {
		let mut doomed: Vec<PathKey> = {
			let content = self.content.read();
			content
				.spec_paths()
				.into_iter()
				.filter(|p| p.has_prefix(root))
				.collect()
		};
		doomed.sort();
		for path in doomed.iter().rev() {
			let inert = diff::spec_is_inert(&**self.content.read(), path);
			self.content.write().erase_spec(path);
			self.state.mark_dirty();
			self.notify(|list| list.did_remove_spec(path, inert));
		}
		self.identities.remove_subtree(root);
	}

	/// Moves the subtree at `old_root` to `new_root` spec by spec, rewrites
	/// path-valued fields inside the moved specs, and re-keys identities so
	/// spec handles survive the move.
	pub(crate) fn prim_move_subtree(&self, old_root: &PathKey, new_root: &PathKey) {
		let mut moving: Vec<PathKey> = {
			let content = self.content.read();
			content
				.spec_paths()
				.into_iter()
				.filter(|p| p.has_prefix(old_root))
				.collect()
		};
		moving.sort();
		{
			let mut content = self.content.write();
			for path in &moving {
				let target = path.replace_prefix(old_root, new_root);
				content.move_spec(path, target.clone());
				for field in content.list_fields(&target) {
					if let Some(value) = content.get(&target, field)
						&& let Some(rewritten) = rewrite_paths(&value, old_root, new_root)
					{
						content.set(&target, field, rewritten);
					}
				}
			}
		}
		self.identities.move_subtree(old_root, new_root);
		self.state.mark_dirty();
		self.notify(|list| list.did_move_spec(old_root, new_root));
	}

	// -- traversal ---------------------------------------------------------

	/// Visits `path` and every descendant reachable through the children
	/// fields its spec type declares, children before parents.
	pub fn traverse(&self, path: &PathKey, visitor: &mut dyn FnMut(&PathKey)) {
		self.ensure_ready();
		self.traverse_inner(path, visitor);
	}

	fn traverse_inner(&self, path: &PathKey, visitor: &mut dyn FnMut(&PathKey)) {
		let spec_type = self.content.read().spec_type(path);
		for field in self.schema.children_fields(spec_type) {
			if let Some(value) = self.get_stored_field(path, field) {
				for child in children::child_paths_for_field(field, path, &value) {
					self.traverse_inner(&child, visitor);
				}
			}
		}
		visitor(path);
	}

	/// Applies the root `primOrder` opinion, if any, to `names` as an
	/// ordered-only list operation.
	pub fn apply_root_prim_order(&self, names: &mut Vec<Token>) {
		self.ensure_ready();
		if let Some(Value::TokenVec(order)) =
			self.get_stored_field(&PathKey::absolute_root(), field_keys().prim_order)
		{
			let mut op = ListOp::new();
			op.set_ordered_items(order);
			op.apply_operations(names, None);
		}
	}

	// -- bulk content ------------------------------------------------------

	/// Replaces this layer's content with a copy of `source`'s, leaving
	/// this layer dirty. Diffed spec by spec so observers see fine-grained
	/// notices rather than one blanket invalidation.
	pub fn transfer_content(&self, source: &Layer) -> Result<()> {
		self.ensure_ready();
		source.ensure_ready();
		self.check_edit_permission()?;
		if std::ptr::eq(self, source) {
			return Ok(());
		}
		let copy: Box<dyn DataStore> = {
			let content = source.content.read();
			let mut copy = Box::new(MemoryStore::new());
			copy.copy_from(&**content);
			copy
		};
		if self.content_equals(&*copy) {
			return Ok(());
		}
		self.set_data(copy);
		Ok(())
	}

	/// Drops all content, leaving only the bare pseudo-root.
	pub fn clear(&self) -> Result<()> {
		self.ensure_ready();
		self.check_edit_permission()?;
		self.set_data(Self::empty_store());
		Ok(())
	}

	pub(crate) fn take_content(&self) -> Box<dyn DataStore> {
		std::mem::replace(&mut *self.content.write(), Box::new(MemoryStore::new()))
	}

	pub(crate) fn content_equals(&self, other: &dyn DataStore) -> bool {
		self.content.read().equals(other)
	}

	// -- persistence -------------------------------------------------------

	/// Writes the layer to its asset through its file format and marks it
	/// clean. No-op when clean unless `force`.
	pub fn save(&self, force: bool) -> Result<()> {
		self.ensure_ready();
		if self.is_anonymous() {
			return Err(LayerError::InvalidIdentifier {
				identifier: self.identifier(),
				reason: "anonymous layers cannot be saved",
			});
		}
		if !self.permission_to_save() || self.is_muted() {
			return Err(LayerError::PermissionDenied {
				identifier: self.identifier(),
			});
		}
		if !force && !self.is_dirty() {
			return Ok(());
		}
		let (format, resolved) =
			self.format_and_resolved_path()
				.ok_or_else(|| LayerError::Io {
					identifier: self.identifier(),
					message: "no file format associated with this layer".to_owned(),
				})?;
		let handle = match self.handle() {
			Some(handle) => handle,
			None => return Ok(()),
		};
		format.write(&handle, &resolved)?;
		self.identity.lock().asset_mod_time = format.modification_time(&resolved);
		self.state.mark_clean();
		tracing::debug!(identifier = self.identifier(), "saved layer");
		Ok(())
	}

	/// Re-reads the layer from its source of truth.
	///
	/// Clean file-backed layers whose asset timestamp is unchanged are
	/// skipped unless `force`. Anonymous layers have no source; `force`
	/// resets a dirty one to empty. A muted layer reloads as empty and
	/// discards any parked edits. On read failure the layer is left
	/// untouched.
	pub fn reload(&self, force: bool) -> Result<ReloadResult> {
		self.ensure_ready();
		self.check_edit_permission()?;
		let _block = ChangeBlock::new();

		if self.is_muted() {
			mute::take_parked_content(&self.identifier());
			self.set_data(Self::empty_store());
			self.state.mark_clean();
			self.notify(|list| list.did_replace_content(true));
			return Ok(ReloadResult::Reloaded);
		}

		if self.is_anonymous() {
			if !force || !self.is_dirty() {
				return Ok(ReloadResult::Skipped);
			}
			self.set_data(Self::empty_store());
			self.state.mark_clean();
			self.notify(|list| list.did_replace_content(true));
			return Ok(ReloadResult::Reloaded);
		}

		let (format, resolved) =
			self.format_and_resolved_path()
				.ok_or_else(|| LayerError::Io {
					identifier: self.identifier(),
					message: "no file format associated with this layer".to_owned(),
				})?;
		let mod_time = format.modification_time(&resolved);
		if !force && !self.is_dirty() {
			let cached = self.identity.lock().asset_mod_time;
			if mod_time.is_some() && mod_time == cached {
				return Ok(ReloadResult::Skipped);
			}
		}

		// Read into a scratch layer first so a failed read leaves this
		// layer's content intact, then diff the result in.
		let mut store = format.instantiate_store();
		if !store.has_spec(&PathKey::absolute_root()) {
			store.create_spec(PathKey::absolute_root(), SpecType::PseudoRoot);
		}
		let scratch = Self::new_scratch(store);
		format.read(&scratch, &resolved)?;
		self.set_data(scratch.take_content());
		self.identity.lock().asset_mod_time = mod_time;
		self.state.mark_clean();
		self.notify(|list| list.did_replace_content(true));
		tracing::debug!(identifier = self.identifier(), "reloaded layer");
		Ok(ReloadResult::Reloaded)
	}

	/// Rewrites references to the asset `old_asset` within this layer:
	/// sublayer entries and asset-path-valued fields. With an empty
	/// `new_asset` the sublayer entries are removed instead. Returns the
	/// number of rewritten opinions.
	pub fn update_external_reference(&self, old_asset: &str, new_asset: &str) -> Result<usize> {
		self.ensure_ready();
		self.check_edit_permission()?;
		let _block = ChangeBlock::new();
		let mut count = 0;

		let sub_layers = field_keys().sub_layers;
		let root = PathKey::absolute_root();
		if let Some(Value::StringVec(entries)) = self.get_stored_field(&root, sub_layers) {
			let updated: Vec<String> = if new_asset.is_empty() {
				entries.iter().filter(|e| *e != old_asset).cloned().collect()
			} else {
				entries
					.iter()
					.map(|e| {
						if e == old_asset {
							new_asset.to_owned()
						} else {
							e.clone()
						}
					})
					.collect()
			};
			if updated != entries {
				count += 1;
				self.prim_set_field(&root, sub_layers, Some(Value::StringVec(updated)));
			}
		}

		let mut rewrites: Vec<(PathKey, Token)> = Vec::new();
		{
			let content = self.content.read();
			for path in content.spec_paths() {
				for field in content.list_fields(&path) {
					if let Some(Value::AssetPath(asset)) = content.get(&path, field)
						&& asset == old_asset
					{
						rewrites.push((path.clone(), field));
					}
				}
			}
		}
		for (path, field) in rewrites {
			count += 1;
			let value = if new_asset.is_empty() {
				None
			} else {
				Some(Value::AssetPath(new_asset.to_owned()))
			};
			self.prim_set_field(&path, field, value);
		}
		Ok(count)
	}
}

impl Drop for Layer {
	fn drop(&mut self) {
		if self.registered.load(Ordering::Acquire) {
			let identifier = self.identity.lock().identifier.clone();
			LayerRegistry::get().remove(&identifier, self as *const Layer);
			// Parked mute content is keyed by identifier; drop it with
			// the layer rather than letting a future layer adopt it.
			mute::take_parked_content(&identifier);
		}
	}
}

impl std::fmt::Debug for Layer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Layer")
			.field("identifier", &self.identity.lock().identifier)
			.field("dirty", &self.state.is_dirty())
			.finish_non_exhaustive()
	}
}

/// Rewrites every path under `old_prefix` within a path-valued field,
/// returning the rewritten value only when something changed.
fn rewrite_paths(value: &Value, old_prefix: &PathKey, new_prefix: &PathKey) -> Option<Value> {
	match value {
		Value::Path(path) if path.has_prefix(old_prefix) => {
			Some(Value::Path(path.replace_prefix(old_prefix, new_prefix)))
		}
		Value::PathVec(paths) if paths.iter().any(|p| p.has_prefix(old_prefix)) => {
			Some(Value::PathVec(
				paths
					.iter()
					.map(|p| p.replace_prefix(old_prefix, new_prefix))
					.collect(),
			))
		}
		Value::PathListOp(op) => {
			let mut rewritten = op.clone();
			let changed = rewritten
				.modify_operations(|path| Some(path.replace_prefix(old_prefix, new_prefix)));
			changed.then_some(Value::PathListOp(rewritten))
		}
		Value::Dictionary(entries) => {
			let mut changed = false;
			let mut rewritten = entries.clone();
			for entry in rewritten.values_mut() {
				if let Some(new_value) = rewrite_paths(entry, old_prefix, new_prefix) {
					*entry = new_value;
					changed = true;
				}
			}
			changed.then_some(Value::Dictionary(rewritten))
		}
		_ => None,
	}
}
