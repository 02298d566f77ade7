use pretty_assertions::assert_eq;
use strata_path::{PathKey, Token};

use crate::children::utils::{self, ChildValue};
use crate::children::{self, PrimChildren};
use crate::error::LayerError;
use crate::layer::{Layer, LayerHandle};
use crate::schema::{SpecType, children_keys};
use crate::value::Value;

fn layer() -> LayerHandle {
	Layer::create_anonymous("children-test")
}

fn p(s: &str) -> PathKey {
	s.parse().unwrap()
}

fn t(s: &str) -> Token {
	Token::new(s)
}

fn prim_children(layer: &Layer, owner: &PathKey) -> Vec<Token> {
	layer
		.get_field(owner, children_keys().prim_children)
		.and_then(|v| v.as_token_vec().cloned())
		.unwrap_or_default()
}

#[test]
fn test_create_prim_updates_children_list() {
	let layer = layer();
	let root = PathKey::absolute_root();
	layer.create_spec(&p("/World"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/World/Child"), SpecType::Prim, false).unwrap();

	assert!(layer.has_spec(&p("/World/Child")));
	assert_eq!(prim_children(&layer, &root), vec![t("World")]);
	assert_eq!(prim_children(&layer, &p("/World")), vec![t("Child")]);
}

#[test]
fn test_create_requires_parent_spec() {
	let layer = layer();
	let err = layer
		.create_spec(&p("/Missing/Child"), SpecType::Prim, false)
		.unwrap_err();
	assert_eq!(
		err,
		LayerError::NoSpec {
			path: p("/Missing")
		}
	);
}

#[test]
fn test_create_rejects_duplicate() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	let err = layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap_err();
	assert_eq!(err, LayerError::SpecExists { path: p("/A") });
}

#[test]
fn test_create_rejects_mismatched_spec_type() {
	let layer = layer();
	assert!(layer.create_spec(&p("/A"), SpecType::Attribute, false).is_err());
	assert!(layer.create_spec(&p("/A"), SpecType::Prim, false).is_ok());
	assert!(layer.create_spec(&p("/A.x"), SpecType::Prim, false).is_err());
	assert!(layer.create_spec(&p("/A.x"), SpecType::Attribute, false).is_ok());
}

#[test]
fn test_property_children() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A.radius"), SpecType::Attribute, false).unwrap();
	layer.create_spec(&p("/A.material"), SpecType::Relationship, false).unwrap();

	let props = layer
		.get_field(&p("/A"), children_keys().property_children)
		.and_then(|v| v.as_token_vec().cloned())
		.unwrap();
	assert_eq!(props, vec![t("radius"), t("material")]);
	assert_eq!(layer.spec_type(&p("/A.material")), SpecType::Relationship);
}

#[test]
fn test_variant_sets_and_variants() {
	let layer = layer();
	layer.create_spec(&p("/Model"), SpecType::Prim, false).unwrap();
	layer
		.create_spec(&p("/Model{look=}"), SpecType::VariantSet, false)
		.unwrap();
	layer
		.create_spec(&p("/Model{look=red}"), SpecType::Variant, false)
		.unwrap();
	layer
		.create_spec(&p("/Model{look=red}/Inner"), SpecType::Prim, false)
		.unwrap();

	let sets = layer
		.get_field(&p("/Model"), children_keys().variant_set_children)
		.and_then(|v| v.as_token_vec().cloned())
		.unwrap();
	assert_eq!(sets, vec![t("look")]);
	let variants = layer
		.get_field(&p("/Model{look=}"), children_keys().variant_children)
		.and_then(|v| v.as_token_vec().cloned())
		.unwrap();
	assert_eq!(variants, vec![t("red")]);
	assert_eq!(prim_children(&layer, &p("/Model{look=red}")), vec![t("Inner")]);
}

#[test]
fn test_variant_requires_enclosing_set() {
	let layer = layer();
	layer.create_spec(&p("/Model"), SpecType::Prim, false).unwrap();
	// No VariantSet spec at /Model{look=} yet.
	assert!(
		layer
			.create_spec(&p("/Model{look=red}"), SpecType::Variant, false)
			.is_err()
	);
}

#[test]
fn test_relationship_targets() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/B"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A.rel"), SpecType::Relationship, false).unwrap();
	layer
		.create_spec(&p("/A.rel[/B]"), SpecType::RelationshipTarget, false)
		.unwrap();

	let targets = layer
		.get_field(&p("/A.rel"), children_keys().relationship_target_children)
		.and_then(|v| v.as_path_vec().cloned())
		.unwrap();
	assert_eq!(targets, vec![p("/B")]);

	// Connections need an attribute owner.
	assert!(
		layer
			.create_spec(&p("/A.rel[/B]"), SpecType::Connection, false)
			.is_err()
	);
}

#[test]
fn test_rename_preserves_list_position() {
	let layer = layer();
	for name in ["A", "B", "C"] {
		layer
			.create_spec(&p(&format!("/{name}")), SpecType::Prim, false)
			.unwrap();
	}
	layer.move_spec(&p("/B"), &p("/D")).unwrap();

	let root = PathKey::absolute_root();
	assert_eq!(prim_children(&layer, &root), vec![t("A"), t("D"), t("C")]);
	assert!(!layer.has_spec(&p("/B")));
	assert!(layer.has_spec(&p("/D")));
}

#[test]
fn test_rename_carries_subtree() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A/Child"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A/Child.attr"), SpecType::Attribute, false).unwrap();
	layer.move_spec(&p("/A"), &p("/Z")).unwrap();

	assert!(layer.has_spec(&p("/Z/Child.attr")));
	assert!(!layer.has_spec(&p("/A")));
	assert_eq!(prim_children(&layer, &p("/Z")), vec![t("Child")]);
}

#[test]
fn test_reparent_updates_both_owners() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/B"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A/Child"), SpecType::Prim, false).unwrap();
	layer.move_spec(&p("/A/Child"), &p("/B/Child")).unwrap();

	assert_eq!(prim_children(&layer, &p("/A")), Vec::<Token>::new());
	assert_eq!(prim_children(&layer, &p("/B")), vec![t("Child")]);
}

#[test]
fn test_move_into_own_subtree_rejected() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A/B"), SpecType::Prim, false).unwrap();
	assert!(layer.move_spec(&p("/A"), &p("/A/B/A")).is_err());
}

#[test]
fn test_move_rewrites_path_valued_fields() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A.rel"), SpecType::Relationship, false).unwrap();
	layer
		.create_spec(&p("/A.rel[/A]"), SpecType::RelationshipTarget, false)
		.unwrap();
	layer.move_spec(&p("/A"), &p("/Z")).unwrap();

	let targets = layer
		.get_field(&p("/Z.rel"), children_keys().relationship_target_children)
		.and_then(|v| v.as_path_vec().cloned())
		.unwrap();
	assert_eq!(targets, vec![p("/Z")]);
	assert!(layer.has_spec(&p("/Z.rel[/Z]")));
}

#[test]
fn test_delete_removes_list_entry_and_subtree() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A/B"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/C"), SpecType::Prim, false).unwrap();
	layer.delete_spec(&p("/A")).unwrap();

	let root = PathKey::absolute_root();
	assert_eq!(prim_children(&layer, &root), vec![t("C")]);
	assert!(!layer.has_spec(&p("/A/B")));
}

#[test]
fn test_set_children_replaces() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/B"), SpecType::Prim, false).unwrap();
	let root = PathKey::absolute_root();
	utils::set_children::<PrimChildren>(
		&layer,
		&root,
		&[ChildValue::Key(t("B")), ChildValue::Key(t("New"))],
		SpecType::Prim,
	)
	.unwrap();

	assert!(!layer.has_spec(&p("/A")));
	assert!(layer.has_spec(&p("/New")));
	assert_eq!(prim_children(&layer, &root), vec![t("B"), t("New")]);
}

#[test]
fn test_set_children_reparents_listed_specs() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A/Child"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A/Child/Inner"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/B"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/B/Old"), SpecType::Prim, false).unwrap();

	// /B ends up with the child moved over from /A plus a fresh one; /B/Old
	// is not listed and goes away.
	utils::set_children::<PrimChildren>(
		&layer,
		&p("/B"),
		&[
			ChildValue::Spec(p("/A/Child")),
			ChildValue::Key(t("Fresh")),
		],
		SpecType::Prim,
	)
	.unwrap();

	assert!(layer.has_spec(&p("/B/Child/Inner")));
	assert!(!layer.has_spec(&p("/A/Child")));
	assert!(!layer.has_spec(&p("/B/Old")));
	assert!(layer.has_spec(&p("/B/Fresh")));
	assert_eq!(prim_children(&layer, &p("/A")), Vec::<Token>::new());
	assert_eq!(prim_children(&layer, &p("/B")), vec![t("Child"), t("Fresh")]);
}

#[test]
fn test_set_children_rejects_colliding_reparent() {
	let layer = layer();
	layer.create_spec(&p("/A"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/A/Child"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/B"), SpecType::Prim, false).unwrap();
	layer.create_spec(&p("/B/Child"), SpecType::Prim, false).unwrap();

	// /B already has a listed child named Child; the foreign one collides.
	let err = utils::set_children::<PrimChildren>(
		&layer,
		&p("/B"),
		&[
			ChildValue::Key(t("Child")),
			ChildValue::Spec(p("/A/Child")),
		],
		SpecType::Prim,
	)
	.unwrap_err();
	assert!(matches!(err, LayerError::SpecExists { .. }));
	assert!(layer.has_spec(&p("/A/Child")));
	assert_eq!(prim_children(&layer, &p("/B")), vec![t("Child")]);
}

#[test]
fn test_insert_spec_places_entry_at_index() {
	let layer = layer();
	for name in ["A", "B"] {
		layer
			.create_spec(&p(&format!("/{name}")), SpecType::Prim, false)
			.unwrap();
	}
	layer.insert_spec(&p("/C"), SpecType::Prim, false, 0).unwrap();
	layer.insert_spec(&p("/D"), SpecType::Prim, false, 99).unwrap();

	let root = PathKey::absolute_root();
	assert_eq!(
		prim_children(&layer, &root),
		vec![t("C"), t("A"), t("B"), t("D")]
	);
	assert!(layer.has_spec(&p("/C")));
}

#[test]
fn test_reorder_children_requires_permutation() {
	let layer = layer();
	for name in ["A", "B", "C"] {
		layer
			.create_spec(&p(&format!("/{name}")), SpecType::Prim, false)
			.unwrap();
	}
	let root = PathKey::absolute_root();
	assert!(utils::reorder_children::<PrimChildren>(&layer, &root, &[t("C"), t("A")]).is_err());
	utils::reorder_children::<PrimChildren>(&layer, &root, &[t("C"), t("A"), t("B")]).unwrap();
	assert_eq!(prim_children(&layer, &root), vec![t("C"), t("A"), t("B")]);
}

#[test]
fn test_invalid_child_name_rejected() {
	let layer = layer();
	let err = layer
		.create_spec(&p("/Parent"), SpecType::Prim, false)
		.and_then(|_| {
			utils::create_spec::<PrimChildren>(
				&layer,
				&p("/Parent"),
				&t("not a name"),
				SpecType::Prim,
				false,
			)
			.map(|_| ())
		})
		.unwrap_err();
	assert!(matches!(err, LayerError::InvalidName { .. }));
}

#[test]
fn test_child_paths_for_field_expansion() {
	let owner = p("/A");
	let paths = children::child_paths_for_field(
		children_keys().prim_children,
		&owner,
		&Value::TokenVec(vec![t("X"), t("Y")]),
	);
	assert_eq!(paths, vec![p("/A/X"), p("/A/Y")]);

	let paths = children::child_paths_for_field(
		children_keys().variant_set_children,
		&owner,
		&Value::TokenVec(vec![t("look")]),
	);
	assert_eq!(paths, vec![p("/A{look=}")]);
}
