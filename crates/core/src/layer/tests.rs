use pretty_assertions::assert_eq;
use strata_path::{PathKey, Token};

use crate::data::{DataStore, MemoryStore};
use crate::layer::{Layer, LayerHandle, ReloadResult};
use crate::schema::{SpecType, field_keys};
use crate::value::{Specifier, Value};

fn layer() -> LayerHandle {
	Layer::create_anonymous("layer-test")
}

fn p(s: &str) -> PathKey {
	s.parse().unwrap()
}

fn t(s: &str) -> Token {
	Token::new(s)
}

#[test]
fn test_anonymous_layer_has_pseudo_root() {
	let layer = layer();
	assert!(layer.is_anonymous());
	assert!(layer.is_empty());
	assert!(!layer.is_dirty());
	assert_eq!(layer.spec_type(&PathKey::absolute_root()), SpecType::PseudoRoot);
}

#[test]
fn test_find_by_identifier() {
	let layer = layer();
	let identifier = layer.identifier();
	let found = Layer::find(&identifier).unwrap();
	assert!(std::ptr::eq(&*layer, &*found));
	drop(found);
	drop(layer);
	assert!(Layer::find(&identifier).is_none());
}

#[test]
fn test_create_new_rejects_collision() {
	let a = Layer::create_new("collision-test.strata").unwrap();
	assert!(Layer::create_new("collision-test.strata").is_err());
	drop(a);
	// Dead entries are purged; the identifier is reusable.
	let _b = Layer::create_new("collision-test.strata").unwrap();
}

#[test]
fn test_required_field_fallbacks() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();

	// Unauthored required fields read as their fallback and list anyway.
	assert_eq!(
		layer.get_field(&p("/A"), field_keys().specifier),
		Some(Value::Specifier(Specifier::Over))
	);
	assert!(layer.list_fields(&p("/A")).contains(&field_keys().specifier));

	layer
		.set_field(&p("/A"), field_keys().specifier, Specifier::Def)
		.unwrap();
	assert_eq!(
		layer.get_field_as::<Specifier>(&p("/A"), field_keys().specifier),
		Some(Specifier::Def)
	);

	// Erasing a required field resets it to the fallback, it stays listed.
	layer.erase_field(&p("/A"), field_keys().specifier).unwrap();
	assert_eq!(
		layer.get_field(&p("/A"), field_keys().specifier),
		Some(Value::Specifier(Specifier::Over))
	);
	assert!(layer.has_field(&p("/A"), field_keys().specifier));
}

#[test]
fn test_set_field_requires_spec() {
	let layer = layer();
	assert!(layer.set_field(&p("/Nope"), t("radius"), 1.0).is_err());
}

#[test]
fn test_schema_rejects_prim_field_on_attribute() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A.x"), SpecType::Attribute, false).unwrap();
	assert!(
		layer
			.set_field(&p("/A.x"), field_keys().specifier, Specifier::Def)
			.is_err()
	);
}

#[test]
fn test_permission_to_edit() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.set_permission_to_edit(false);
	assert!(layer.set_field(&p("/A"), t("documentation"), "x").is_err());
	assert!(layer.create_spec(&p("/B"), SpecType::Prim, false).is_err());
	layer.set_permission_to_edit(true);
	assert!(layer.set_field(&p("/A"), t("documentation"), "x").is_ok());
}

#[test]
fn test_time_samples() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A.x"), SpecType::Attribute, false).unwrap();

	layer.set_time_sample(&p("/A.x"), 1.0, 10.0).unwrap();
	layer.set_time_sample(&p("/A.x"), 3.0, 30.0).unwrap();
	assert!(layer.set_time_sample(&p("/A.x"), f64::NAN, 0.0).is_err());

	assert_eq!(layer.query_time_sample(&p("/A.x"), 1.0), Some(Value::Double(10.0)));
	assert_eq!(layer.query_time_sample(&p("/A.x"), 2.0), None);

	let (lo, hi) = layer.bracketing_time_samples(&p("/A.x"), 2.0).unwrap();
	assert_eq!((lo.get(), hi.get()), (1.0, 3.0));

	layer.erase_time_sample(&p("/A.x"), 1.0).unwrap();
	assert_eq!(layer.query_time_sample(&p("/A.x"), 1.0), None);
}

#[test]
fn test_spec_handle_survives_move() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A/B"), SpecType::Prim, false).unwrap();
	let handle = layer.spec_handle(&p("/A/B")).unwrap();

	layer.move_spec(&p("/A"), &p("/Z")).unwrap();
	assert_eq!(handle.path(), Some(p("/Z/B")));
	assert_eq!(handle.spec_type(), SpecType::Prim);

	layer.delete_spec(&p("/Z")).unwrap();
	assert_eq!(handle.path(), None);
	assert!(!handle.is_valid());
}

#[test]
fn test_transfer_content() {
	let source = layer();
	source.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	source.set_field(&p("/A"), t("documentation"), "doc").unwrap();

	let dest = layer();
	dest.create_spec(&p("/Old"), SpecType::Prim, false).unwrap();
	dest.transfer_content(&source).unwrap();

	assert!(!dest.has_spec(&p("/Old")));
	assert_eq!(
		dest.get_field(&p("/A"), t("documentation")),
		Some(Value::String("doc".to_owned()))
	);
	assert!(dest.is_dirty());
}

#[test]
fn test_clear() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.clear().unwrap();
	assert!(layer.is_empty());
	assert!(layer.has_spec(&PathKey::absolute_root()));
}

#[test]
fn test_reload_anonymous() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();

	// Without force a dirty anonymous layer keeps its content.
	assert_eq!(layer.reload(false).unwrap(), ReloadResult::Skipped);
	assert!(layer.has_spec(&p("/A")));

	assert_eq!(layer.reload(true).unwrap(), ReloadResult::Reloaded);
	assert!(layer.is_empty());
	assert!(!layer.is_dirty());
}

#[test]
fn test_set_identifier_rekeys_registry() {
	let layer = Layer::create_new("rekey-before.strata").unwrap();
	layer.set_identifier("rekey-after.strata").unwrap();
	assert!(Layer::find("rekey-before.strata").is_none());
	let found = Layer::find("rekey-after.strata").unwrap();
	assert!(std::ptr::eq(&*layer, &*found));
}

#[test]
fn test_traverse_children_first() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A/B"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A.x"), SpecType::Attribute, false).unwrap();

	let mut visited = Vec::new();
	layer.traverse(&PathKey::absolute_root(), &mut |path| {
		visited.push(path.clone());
	});
	assert_eq!(
		visited,
		vec![p("/A/B"), p("/A.x"), p("/A"), PathKey::absolute_root()]
	);
}

#[test]
fn test_apply_root_prim_order() {
	let layer = layer();
	for name in ["A", "B", "C", "D"] {
		layer
			.create_spec(&p(&format!("/{name}")), SpecType::Prim, false)
			.unwrap();
	}
	layer
		.set_field(
			&PathKey::absolute_root(),
			field_keys().prim_order,
			vec![t("C"), t("A")],
		)
		.unwrap();

	let mut names = vec![t("A"), t("B"), t("C"), t("D")];
	layer.apply_root_prim_order(&mut names);
	assert_eq!(names, vec![t("B"), t("C"), t("A"), t("D")]);
}

#[test]
fn test_update_external_reference() {
	let layer = layer();
	let root = PathKey::absolute_root();
	layer
		.set_field(
			&root,
			field_keys().sub_layers,
			Value::StringVec(vec!["a.strata".to_owned(), "b.strata".to_owned()]),
		)
		.unwrap();

	let count = layer.update_external_reference("a.strata", "c.strata").unwrap();
	assert_eq!(count, 1);
	assert_eq!(
		layer.get_field(&root, field_keys().sub_layers),
		Some(Value::StringVec(vec!["c.strata".to_owned(), "b.strata".to_owned()]))
	);

	// Empty replacement removes the entry.
	layer.update_external_reference("b.strata", "").unwrap();
	assert_eq!(
		layer.get_field(&root, field_keys().sub_layers),
		Some(Value::StringVec(vec!["c.strata".to_owned()]))
	);
}

#[test]
fn test_mute_round_trip_preserves_dirty_content() {
	let layer = layer();
	layer.create_spec(&p("/Keep"), SpecType::Prim, false).unwrap();
	layer.set_field(&p("/Keep"), t("documentation"), "kept").unwrap();
	layer
		.create_spec(&p("/Keep.size"), SpecType::Attribute, false)
		.unwrap();
	layer.set_time_sample(&p("/Keep.size"), 1.0, 2.0).unwrap();
	assert!(layer.is_dirty());
	let identifier = layer.identifier();
	let snapshot = {
		let content = layer.content.read();
		let mut copy = MemoryStore::new();
		copy.copy_from(&**content);
		copy
	};

	crate::layer::add_to_muted_layers(&identifier);
	assert!(layer.is_muted());
	assert!(layer.is_empty());
	assert!(!layer.content_equals(&snapshot));

	crate::layer::remove_from_muted_layers(&identifier);
	assert!(!layer.is_muted());
	assert!(layer.content_equals(&snapshot));
	assert!(layer.is_dirty());
}

#[test]
fn test_save_rejected_for_anonymous() {
	let layer = layer();
	assert!(layer.save(true).is_err());
}
