use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use strata_path::{PathKey, Token};

use crate::schema::{SpecType, field_keys};
use crate::value::{TimeCode, TimeSampleMap, Value};

/// The raw spec/field substrate a layer stores into.
///
/// A store records which paths carry specs (with their spec type) and the
/// fields authored at each path. It knows nothing about schemas, required
/// fields, change tracking, or children invariants; the layer enforces all
/// of that above this interface.
///
/// Implementations that page content in on demand return `true` from
/// [`streams_data`](DataStore::streams_data); the layer then avoids
/// per-field diffing against such stores (a diff would force full
/// materialization) and falls back to whole-store adoption with a single
/// bulk-replace notice.
pub trait DataStore: Send + Sync {
	fn streams_data(&self) -> bool {
		false
	}

	fn has_spec(&self, path: &PathKey) -> bool;

	/// The spec type at `path`, or [`SpecType::Unknown`] when no spec
	/// exists there.
	fn spec_type(&self, path: &PathKey) -> SpecType;

	fn create_spec(&mut self, path: PathKey, spec_type: SpecType);

	fn erase_spec(&mut self, path: &PathKey) -> bool;

	/// Moves the single spec entry at `old_path` to `new_path`. Subtree
	/// recursion is the caller's job.
	fn move_spec(&mut self, old_path: &PathKey, new_path: PathKey) -> bool;

	fn get(&self, path: &PathKey, field: Token) -> Option<Value>;

	fn has(&self, path: &PathKey, field: Token) -> bool {
		self.get(path, field).is_some()
	}

	fn set(&mut self, path: &PathKey, field: Token, value: Value);

	fn erase(&mut self, path: &PathKey, field: Token) -> bool;

	/// The fields physically present at `path`, in storage (authoring)
	/// order.
	fn list_fields(&self, path: &PathKey) -> Vec<Token>;

	/// Calls `visitor` for every spec path until it returns `false`.
	fn visit_specs(&self, visitor: &mut dyn FnMut(&PathKey) -> bool);

	fn spec_count(&self) -> usize;

	fn is_empty(&self) -> bool {
		self.spec_count() == 0
	}

	fn time_samples(&self, path: &PathKey) -> Option<TimeSampleMap>;

	/// Exact-time lookup without materializing the whole sample map.
	fn time_sample(&self, path: &PathKey, time: TimeCode) -> Option<Value> {
		self.time_samples(path)?.get(time).cloned()
	}

	fn set_time_sample(&mut self, path: &PathKey, time: TimeCode, value: Value);

	fn erase_time_sample(&mut self, path: &PathKey, time: TimeCode) -> bool;

	/// Nearest-bracket lookup without materializing the whole sample map.
	fn bracketing_time_samples(
		&self,
		path: &PathKey,
		time: TimeCode,
	) -> Option<(TimeCode, TimeCode)>;

	/// Replaces this store's content with a copy of `other`'s.
	fn copy_from(&mut self, other: &dyn DataStore) {
		for path in self.spec_paths() {
			self.erase_spec(&path);
		}
		for path in other.spec_paths() {
			self.create_spec(path.clone(), other.spec_type(&path));
			for field in other.list_fields(&path) {
				if let Some(value) = other.get(&path, field) {
					self.set(&path, field, value);
				}
			}
		}
	}

	/// All spec paths, in visitation order.
	fn spec_paths(&self) -> Vec<PathKey> {
		let mut paths = Vec::with_capacity(self.spec_count());
		self.visit_specs(&mut |path| {
			paths.push(path.clone());
			true
		});
		paths
	}

	/// Full content equality: same spec set, types, and field values.
	fn equals(&self, other: &dyn DataStore) -> bool {
		if self.spec_count() != other.spec_count() {
			return false;
		}
		let mut equal = true;
		self.visit_specs(&mut |path| {
			if self.spec_type(path) != other.spec_type(path) {
				equal = false;
				return false;
			}
			let fields = self.list_fields(path);
			let mut other_fields = other.list_fields(path);
			if fields.len() != other_fields.len() {
				equal = false;
				return false;
			}
			// Field sets compare unordered: storage order is not content.
			other_fields.sort_by(|a, b| a.arbitrary_cmp(*b));
			for field in fields {
				if other_fields.binary_search_by(|f| f.arbitrary_cmp(field)).is_err()
					|| self.get(path, field) != other.get(path, field)
				{
					equal = false;
					return false;
				}
			}
			true
		});
		equal
	}
}

#[derive(Debug, Clone, Default)]
struct SpecEntry {
	spec_type: SpecType,
	fields: IndexMap<Token, Value>,
}

/// The default in-memory store: a hash table of per-path field maps.
/// Field maps preserve authoring order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	specs: FxHashMap<PathKey, SpecEntry>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn samples_mut(&mut self, path: &PathKey) -> Option<&mut TimeSampleMap> {
		let entry = self.specs.get_mut(path)?;
		match entry
			.fields
			.entry(field_keys().time_samples)
			.or_insert_with(|| Value::TimeSamples(TimeSampleMap::new()))
		{
			Value::TimeSamples(samples) => Some(samples),
			// A non-sample value under the timeSamples key is replaced.
			slot => {
				*slot = Value::TimeSamples(TimeSampleMap::new());
				match slot {
					Value::TimeSamples(samples) => Some(samples),
					_ => None,
				}
			}
		}
	}
}

impl DataStore for MemoryStore {
	fn has_spec(&self, path: &PathKey) -> bool {
		self.specs.contains_key(path)
	}

	fn spec_type(&self, path: &PathKey) -> SpecType {
		self.specs
			.get(path)
			.map(|entry| entry.spec_type)
			.unwrap_or_default()
	}

	fn create_spec(&mut self, path: PathKey, spec_type: SpecType) {
		let entry = self.specs.entry(path).or_default();
		entry.spec_type = spec_type;
	}

	fn erase_spec(&mut self, path: &PathKey) -> bool {
		self.specs.remove(path).is_some()
	}

	fn move_spec(&mut self, old_path: &PathKey, new_path: PathKey) -> bool {
		match self.specs.remove(old_path) {
			Some(entry) => {
				self.specs.insert(new_path, entry);
				true
			}
			None => false,
		}
	}

	fn get(&self, path: &PathKey, field: Token) -> Option<Value> {
		self.specs.get(path)?.fields.get(&field).cloned()
	}

	fn has(&self, path: &PathKey, field: Token) -> bool {
		self.specs
			.get(path)
			.is_some_and(|entry| entry.fields.contains_key(&field))
	}

	fn set(&mut self, path: &PathKey, field: Token, value: Value) {
		if let Some(entry) = self.specs.get_mut(path) {
			entry.fields.insert(field, value);
		}
	}

	fn erase(&mut self, path: &PathKey, field: Token) -> bool {
		self.specs
			.get_mut(path)
			.is_some_and(|entry| entry.fields.shift_remove(&field).is_some())
	}

	fn list_fields(&self, path: &PathKey) -> Vec<Token> {
		self.specs
			.get(path)
			.map(|entry| entry.fields.keys().copied().collect())
			.unwrap_or_default()
	}

	fn visit_specs(&self, visitor: &mut dyn FnMut(&PathKey) -> bool) {
		for path in self.specs.keys() {
			if !visitor(path) {
				return;
			}
		}
	}

	fn spec_count(&self) -> usize {
		self.specs.len()
	}

	fn time_samples(&self, path: &PathKey) -> Option<TimeSampleMap> {
		match self.specs.get(path)?.fields.get(&field_keys().time_samples) {
			Some(Value::TimeSamples(samples)) => Some(samples.clone()),
			_ => None,
		}
	}

	fn time_sample(&self, path: &PathKey, time: TimeCode) -> Option<Value> {
		match self.specs.get(path)?.fields.get(&field_keys().time_samples) {
			Some(Value::TimeSamples(samples)) => samples.get(time).cloned(),
			_ => None,
		}
	}

	fn set_time_sample(&mut self, path: &PathKey, time: TimeCode, value: Value) {
		if let Some(samples) = self.samples_mut(path) {
			samples.set(time, value);
		}
	}

	fn erase_time_sample(&mut self, path: &PathKey, time: TimeCode) -> bool {
		let Some(entry) = self.specs.get_mut(path) else {
			return false;
		};
		let key = field_keys().time_samples;
		let Some(Value::TimeSamples(samples)) = entry.fields.get_mut(&key) else {
			return false;
		};
		let erased = samples.erase(time);
		if samples.is_empty() {
			entry.fields.shift_remove(&key);
		}
		erased
	}

	fn bracketing_time_samples(
		&self,
		path: &PathKey,
		time: TimeCode,
	) -> Option<(TimeCode, TimeCode)> {
		match self.specs.get(path)?.fields.get(&field_keys().time_samples) {
			Some(Value::TimeSamples(samples)) => samples.bracketing(time),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn p(s: &str) -> PathKey {
		s.parse().unwrap()
	}

	#[test]
	fn test_spec_lifecycle() {
		let mut store = MemoryStore::new();
		assert!(store.is_empty());
		store.create_spec(p("/A"), SpecType::Prim);
		assert!(store.has_spec(&p("/A")));
		assert_eq!(store.spec_type(&p("/A")), SpecType::Prim);
		assert_eq!(store.spec_type(&p("/B")), SpecType::Unknown);
		assert!(store.erase_spec(&p("/A")));
		assert!(!store.erase_spec(&p("/A")));
	}

	#[test]
	fn test_fields_preserve_storage_order() {
		let mut store = MemoryStore::new();
		let path = p("/A");
		store.create_spec(path.clone(), SpecType::Prim);
		let (b, a) = (Token::new("bbb"), Token::new("aaa"));
		store.set(&path, b, Value::Int(1));
		store.set(&path, a, Value::Int(2));
		assert_eq!(store.list_fields(&path), vec![b, a]);
		assert!(store.erase(&path, b));
		assert_eq!(store.list_fields(&path), vec![a]);
	}

	#[test]
	fn test_set_requires_spec() {
		let mut store = MemoryStore::new();
		store.set(&p("/Nope"), Token::new("x"), Value::Bool(true));
		assert!(!store.has(&p("/Nope"), Token::new("x")));
	}

	#[test]
	fn test_move_spec_moves_fields() {
		let mut store = MemoryStore::new();
		store.create_spec(p("/A"), SpecType::Prim);
		store.set(&p("/A"), Token::new("x"), Value::Int(7));
		assert!(store.move_spec(&p("/A"), p("/B")));
		assert!(!store.has_spec(&p("/A")));
		assert_eq!(store.get(&p("/B"), Token::new("x")), Some(Value::Int(7)));
	}

	#[test]
	fn test_time_samples() {
		let mut store = MemoryStore::new();
		let path = p("/A.x");
		store.create_spec(path.clone(), SpecType::Attribute);
		let t = |v: f64| TimeCode::new(v).unwrap();
		store.set_time_sample(&path, t(1.0), Value::Double(10.0));
		store.set_time_sample(&path, t(2.0), Value::Double(20.0));
		assert_eq!(
			store.bracketing_time_samples(&path, t(1.5)),
			Some((t(1.0), t(2.0)))
		);
		assert!(store.erase_time_sample(&path, t(1.0)));
		assert!(store.erase_time_sample(&path, t(2.0)));
		// Erasing the last sample drops the field entirely.
		assert!(store.list_fields(&path).is_empty());
	}

	#[test]
	fn test_copy_and_equals() {
		let mut a = MemoryStore::new();
		a.create_spec(p("/A"), SpecType::Prim);
		a.set(&p("/A"), Token::new("x"), Value::Int(1));
		let mut b = MemoryStore::new();
		b.create_spec(p("/Old"), SpecType::Prim);
		b.copy_from(&a);
		assert!(b.equals(&a));
		assert!(!b.has_spec(&p("/Old")));
		b.set(&p("/A"), Token::new("x"), Value::Int(2));
		assert!(!b.equals(&a));
	}
}
