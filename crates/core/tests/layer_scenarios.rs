//! End-to-end scenarios across layers, formats, and change notification.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rustc_hash::{FxHashMap, FxHashSet};
use strata_core::change::{ChangeFlags, ChangeList};
use strata_core::format::{FileFormat, FormatRegistry};
use strata_core::schema::{SpecType, field_keys};
use strata_core::value::Specifier;
use strata_core::{
	ChangeBlock, ChangeManager, Layer, LayerError, LayerHandle, LayerId, PathKey, ReloadResult,
	Result, Token, Value,
};

fn p(s: &str) -> PathKey {
	s.parse().unwrap()
}

fn wait_until(mut cond: impl FnMut() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(5);
	while !cond() {
		assert!(Instant::now() < deadline, "condition not met in time");
		thread::sleep(Duration::from_millis(1));
	}
}

type BackingSpec = (String, SpecType, Vec<(Token, Value)>);

/// In-memory stand-in for a file format: "assets" live in a shared map
/// keyed by resolved path.
#[derive(Default)]
struct TestFormat {
	backing: Mutex<FxHashMap<String, Vec<BackingSpec>>>,
	failing: Mutex<FxHashSet<String>>,
	reads: AtomicUsize,
	writes: AtomicUsize,
	read_delay: Duration,
}

impl TestFormat {
	fn install(extension: &str) -> Arc<TestFormat> {
		let format = Arc::new(TestFormat::default());
		FormatRegistry::get().register(extension, format.clone());
		format
	}

	fn put(&self, resolved_path: &str, specs: Vec<BackingSpec>) {
		self.backing.lock().insert(resolved_path.to_owned(), specs);
	}

	fn fail_reads_for(&self, resolved_path: &str, failing: bool) {
		if failing {
			self.failing.lock().insert(resolved_path.to_owned());
		} else {
			self.failing.lock().remove(resolved_path);
		}
	}
}

impl FileFormat for TestFormat {
	fn format_id(&self) -> &'static str {
		"test"
	}

	fn read(&self, layer: &LayerHandle, resolved_path: &str) -> Result<()> {
		self.reads.fetch_add(1, Ordering::SeqCst);
		if !self.read_delay.is_zero() {
			thread::sleep(self.read_delay);
		}
		if self.failing.lock().contains(resolved_path) {
			return Err(LayerError::Io {
				identifier: resolved_path.to_owned(),
				message: "backing asset unavailable".to_owned(),
			});
		}
		let specs = self
			.backing
			.lock()
			.get(resolved_path)
			.cloned()
			.unwrap_or_default();
		for (path, spec_type, fields) in specs {
			let path: PathKey = path.parse()?;
			layer.create_spec(&path, spec_type, false)?;
			for (field, value) in fields {
				layer.set_field(&path, field, value)?;
			}
		}
		Ok(())
	}

	fn write(&self, _layer: &LayerHandle, _resolved_path: &str) -> Result<()> {
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

/// Collects delivered change lists for one layer.
struct NoticeLog {
	notices: Arc<Mutex<Vec<ChangeList>>>,
	_subscription: strata_core::change::Subscription,
}

impl NoticeLog {
	fn attach(layer: &Layer) -> NoticeLog {
		let id: LayerId = layer.id();
		let notices: Arc<Mutex<Vec<ChangeList>>> = Arc::default();
		let sink = notices.clone();
		let subscription = ChangeManager::get().subscribe(move |layer, list| {
			if layer.id() == id {
				sink.lock().push(list.clone());
			}
		});
		NoticeLog {
			notices,
			_subscription: subscription,
		}
	}

	fn snapshot(&self) -> Vec<ChangeList> {
		self.notices.lock().clone()
	}
}

#[test]
fn test_authoring_round_trip() {
	let layer = Layer::create_anonymous("scenario");
	layer.create_spec(&p("/Sphere"), SpecType::Prim, false).unwrap();
	layer
		.create_spec(&p("/Sphere.radius"), SpecType::Attribute, false)
		.unwrap();
	layer
		.set_field(&p("/Sphere.radius"), field_keys().default, 2.0)
		.unwrap();

	assert_eq!(
		layer.get_field_as::<f64>(&p("/Sphere.radius"), field_keys().default),
		Some(2.0)
	);
	let fields = layer.list_fields(&p("/Sphere.radius"));
	assert!(fields.contains(&field_keys().default));
	assert!(fields.contains(&field_keys().custom));

	layer.delete_spec(&p("/Sphere")).unwrap();
	assert!(!layer.has_spec(&p("/Sphere.radius")));
	assert!(layer.is_empty());
}

#[test]
fn test_change_block_coalesces_notices() {
	let layer = Layer::create_anonymous("coalesce");
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A.x"), SpecType::Attribute, false).unwrap();

	let log = NoticeLog::attach(&layer);
	{
		let _block = ChangeBlock::new();
		layer.set_field(&p("/A.x"), field_keys().documentation, "d").unwrap();
		layer.set_field(&p("/A.x"), field_keys().comment, "c").unwrap();
		layer.set_field(&p("/A.x"), field_keys().hidden, true).unwrap();
	}

	wait_until(|| {
		log.snapshot()
			.iter()
			.any(|list| list.entry(&p("/A.x")).is_some())
	});
	let with_entry: Vec<ChangeList> = log
		.snapshot()
		.into_iter()
		.filter(|list| list.entry(&p("/A.x")).is_some())
		.collect();
	assert_eq!(with_entry.len(), 1, "edits inside one block deliver once");
	let entry = with_entry[0].entry(&p("/A.x")).unwrap().clone();
	assert!(entry.flags.contains(ChangeFlags::FIELD_CHANGED));
	for field in [
		field_keys().documentation,
		field_keys().comment,
		field_keys().hidden,
	] {
		assert!(entry.changed_fields.contains(&field));
	}
}

#[test]
fn test_removal_notices_flag_inert_specs() {
	let layer = Layer::create_anonymous("remove-inertness");
	// An over with no typeName contributes nothing on its own; a def does.
	layer.create_spec(&p("/Shell"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/Solid"), SpecType::Prim, false).unwrap();
	layer
		.set_field(&p("/Solid"), field_keys().specifier, Specifier::Def)
		.unwrap();

	let log = NoticeLog::attach(&layer);
	layer.delete_spec(&p("/Shell")).unwrap();
	layer.delete_spec(&p("/Solid")).unwrap();

	wait_until(|| {
		let lists = log.snapshot();
		lists.iter().any(|l| l.entry(&p("/Shell")).is_some())
			&& lists.iter().any(|l| l.entry(&p("/Solid")).is_some())
	});
	let lists = log.snapshot();
	let flags_for = |path: &PathKey| {
		lists
			.iter()
			.find_map(|list| list.entry(path).map(|e| e.flags))
			.unwrap()
	};

	let shell = flags_for(&p("/Shell"));
	assert!(shell.contains(ChangeFlags::SPEC_REMOVED));
	assert!(shell.contains(ChangeFlags::SPEC_REMOVED_INERT));

	let solid = flags_for(&p("/Solid"));
	assert!(solid.contains(ChangeFlags::SPEC_REMOVED));
	assert!(!solid.contains(ChangeFlags::SPEC_REMOVED_INERT));
}

#[test]
fn test_transfer_content_is_fine_grained() {
	let source = Layer::create_anonymous("diff-source");
	source.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	source.set_field(&p("/A"), field_keys().documentation, "two").unwrap();
	source.create_spec(&p("/B"), SpecType::Prim, false).unwrap();

	let dest = Layer::create_anonymous("diff-dest");
	dest.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	dest.set_field(&p("/A"), field_keys().documentation, "one").unwrap();

	let log = NoticeLog::attach(&dest);
	dest.transfer_content(&source).unwrap();

	wait_until(|| {
		log.snapshot()
			.iter()
			.any(|list| list.entry(&p("/B")).is_some())
	});
	let list = log
		.snapshot()
		.into_iter()
		.find(|list| list.entry(&p("/B")).is_some())
		.unwrap();

	// The surviving spec sees a field-level change, not a remove/re-add.
	let a = list.entry(&p("/A")).unwrap();
	assert!(a.flags.contains(ChangeFlags::FIELD_CHANGED));
	assert!(!a.flags.contains(ChangeFlags::SPEC_REMOVED));
	assert!(!a.flags.contains(ChangeFlags::SPEC_ADDED));
	assert!(a.changed_fields.contains(&field_keys().documentation));

	let b = list.entry(&p("/B")).unwrap();
	assert!(b.flags.contains(ChangeFlags::SPEC_ADDED));

	assert_eq!(
		dest.get_field(&p("/A"), field_keys().documentation),
		Some(Value::String("two".to_owned()))
	);
	assert!(dest.has_spec(&p("/B")));
}

#[test]
fn test_find_or_open_reads_backing_asset() {
	let format = TestFormat::install("sopen");
	format.put(
		"model.sopen",
		vec![(
			"/Model".to_owned(),
			SpecType::Prim,
			vec![(field_keys().documentation, Value::String("from disk".to_owned()))],
		)],
	);

	let layer = Layer::find_or_open("model.sopen").unwrap();
	assert!(!layer.is_dirty());
	assert_eq!(
		layer.get_field(&p("/Model"), field_keys().documentation),
		Some(Value::String("from disk".to_owned()))
	);
	// A second call returns the already-open layer without rereading.
	let again = Layer::find_or_open("model.sopen").unwrap();
	assert!(std::ptr::eq(&*layer, &*again));
	assert_eq!(format.reads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_opens_converge() {
	let format = Arc::new(TestFormat {
		read_delay: Duration::from_millis(20),
		..TestFormat::default()
	});
	FormatRegistry::get().register("sconc", format.clone());
	format.put(
		"shared.sconc",
		vec![("/Shared".to_owned(), SpecType::Prim, Vec::new())],
	);

	let handles: Vec<_> = (0..4)
		.map(|_| thread::spawn(|| Layer::find_or_open("shared.sconc").unwrap()))
		.collect();
	let layers: Vec<LayerHandle> = handles.into_iter().map(|h| h.join().unwrap()).collect();

	for layer in &layers[1..] {
		assert!(std::ptr::eq(&*layers[0], &**layer));
	}
	assert_eq!(format.reads.load(Ordering::SeqCst), 1);
	assert!(layers[0].has_spec(&p("/Shared")));
}

#[test]
fn test_failed_open_unregisters() {
	let format = TestFormat::install("sfail");
	format.fail_reads_for("broken.sfail", true);

	assert!(Layer::find_or_open("broken.sfail").is_err());
	assert!(Layer::find("broken.sfail").is_none());

	// Once the asset is readable the identifier works again.
	format.fail_reads_for("broken.sfail", false);
	format.put(
		"broken.sfail",
		vec![("/Fixed".to_owned(), SpecType::Prim, Vec::new())],
	);
	let layer = Layer::find_or_open("broken.sfail").unwrap();
	assert!(layer.has_spec(&p("/Fixed")));
}

#[test]
fn test_reload_picks_up_backing_changes() {
	let format = TestFormat::install("srel");
	format.put(
		"doc.srel",
		vec![("/One".to_owned(), SpecType::Prim, Vec::new())],
	);
	let layer = Layer::find_or_open("doc.srel").unwrap();
	assert!(layer.has_spec(&p("/One")));

	format.put(
		"doc.srel",
		vec![("/Two".to_owned(), SpecType::Prim, Vec::new())],
	);
	assert_eq!(layer.reload(false).unwrap(), ReloadResult::Reloaded);
	assert!(layer.has_spec(&p("/Two")));
	assert!(!layer.has_spec(&p("/One")));
	assert!(!layer.is_dirty());
}

#[test]
fn test_save_writes_through_format() {
	let format = TestFormat::install("ssave");
	let layer = Layer::create_new("out.ssave").unwrap();
	layer.create_spec(&p("/Root"), SpecType::Prim, false).unwrap();
	assert!(layer.is_dirty());

	layer.save(false).unwrap();
	assert_eq!(format.writes.load(Ordering::SeqCst), 1);
	assert!(!layer.is_dirty());

	// Clean layers skip the write unless forced.
	layer.save(false).unwrap();
	assert_eq!(format.writes.load(Ordering::SeqCst), 1);
	layer.save(true).unwrap();
	assert_eq!(format.writes.load(Ordering::SeqCst), 2);
}

#[test]
fn test_identifier_with_format_arguments() {
	let layer = Layer::create_new("args.stargs:STRATA_FORMAT_ARGS:b=2;a=1").unwrap();
	// Arguments canonicalize into sorted order.
	assert_eq!(layer.identifier(), "args.stargs:STRATA_FORMAT_ARGS:a=1;b=2");
	let args = layer.format_arguments();
	assert_eq!(args.get("a").map(String::as_str), Some("1"));
	assert_eq!(args.get("b").map(String::as_str), Some("2"));

	let found = Layer::find("args.stargs:STRATA_FORMAT_ARGS:b=2;a=1").unwrap();
	assert!(std::ptr::eq(&*layer, &*found));
}
