use std::sync::LazyLock;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use strata_path::{
	Token, is_valid_identifier, is_valid_namespaced_identifier, is_valid_variant_identifier,
};

use crate::listop::ListOp;
use crate::value::{Specifier, Value, Variability};

/// The closed set of spec types a layer can store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpecType {
	#[default]
	Unknown,
	Attribute,
	Connection,
	Expression,
	Mapper,
	MapperArg,
	Prim,
	PseudoRoot,
	Relationship,
	RelationshipTarget,
	Variant,
	VariantSet,
}

impl SpecType {
	pub const ALL: [SpecType; 12] = [
		SpecType::Unknown,
		SpecType::Attribute,
		SpecType::Connection,
		SpecType::Expression,
		SpecType::Mapper,
		SpecType::MapperArg,
		SpecType::Prim,
		SpecType::PseudoRoot,
		SpecType::Relationship,
		SpecType::RelationshipTarget,
		SpecType::Variant,
		SpecType::VariantSet,
	];
}

/// Interned field name constants.
pub struct FieldKeys {
	pub active: Token,
	pub allowed_tokens: Token,
	pub asset_info: Token,
	pub color_space: Token,
	pub comment: Token,
	pub connection_paths: Token,
	pub custom: Token,
	pub custom_data: Token,
	pub default: Token,
	pub default_prim: Token,
	pub display_group: Token,
	pub display_name: Token,
	pub display_unit: Token,
	pub documentation: Token,
	pub end_time_code: Token,
	pub expression: Token,
	pub frames_per_second: Token,
	pub hidden: Token,
	pub inherit_paths: Token,
	pub instanceable: Token,
	pub kind: Token,
	pub payload: Token,
	pub permission: Token,
	pub prim_order: Token,
	pub property_order: Token,
	pub references: Token,
	pub relocates: Token,
	pub specializes: Token,
	pub specifier: Token,
	pub start_time_code: Token,
	pub sub_layer_offsets: Token,
	pub sub_layers: Token,
	pub target_paths: Token,
	pub time_codes_per_second: Token,
	pub time_samples: Token,
	pub type_name: Token,
	pub value: Token,
	pub variability: Token,
	pub variant_selection: Token,
	pub variant_set_names: Token,
}

/// Interned children-list field name constants.
pub struct ChildrenKeys {
	pub connection_children: Token,
	pub expression_children: Token,
	pub mapper_arg_children: Token,
	pub mapper_children: Token,
	pub prim_children: Token,
	pub property_children: Token,
	pub relationship_target_children: Token,
	pub variant_children: Token,
	pub variant_set_children: Token,
}

static FIELD_KEYS: LazyLock<FieldKeys> = LazyLock::new(|| FieldKeys {
	active: Token::new("active"),
	allowed_tokens: Token::new("allowedTokens"),
	asset_info: Token::new("assetInfo"),
	color_space: Token::new("colorSpace"),
	comment: Token::new("comment"),
	connection_paths: Token::new("connectionPaths"),
	custom: Token::new("custom"),
	custom_data: Token::new("customData"),
	default: Token::new("default"),
	default_prim: Token::new("defaultPrim"),
	display_group: Token::new("displayGroup"),
	display_name: Token::new("displayName"),
	display_unit: Token::new("displayUnit"),
	documentation: Token::new("documentation"),
	end_time_code: Token::new("endTimeCode"),
	expression: Token::new("expression"),
	frames_per_second: Token::new("framesPerSecond"),
	hidden: Token::new("hidden"),
	inherit_paths: Token::new("inheritPaths"),
	instanceable: Token::new("instanceable"),
	kind: Token::new("kind"),
	payload: Token::new("payload"),
	permission: Token::new("permission"),
	prim_order: Token::new("primOrder"),
	property_order: Token::new("propertyOrder"),
	references: Token::new("references"),
	relocates: Token::new("relocates"),
	specializes: Token::new("specializes"),
	specifier: Token::new("specifier"),
	start_time_code: Token::new("startTimeCode"),
	sub_layer_offsets: Token::new("subLayerOffsets"),
	sub_layers: Token::new("subLayers"),
	target_paths: Token::new("targetPaths"),
	time_codes_per_second: Token::new("timeCodesPerSecond"),
	time_samples: Token::new("timeSamples"),
	type_name: Token::new("typeName"),
	value: Token::new("value"),
	variability: Token::new("variability"),
	variant_selection: Token::new("variantSelection"),
	variant_set_names: Token::new("variantSetNames"),
});

static CHILDREN_KEYS: LazyLock<ChildrenKeys> = LazyLock::new(|| ChildrenKeys {
	connection_children: Token::new("connectionChildren"),
	expression_children: Token::new("expressionChildren"),
	mapper_arg_children: Token::new("mapperArgChildren"),
	mapper_children: Token::new("mapperChildren"),
	prim_children: Token::new("primChildren"),
	property_children: Token::new("propertyChildren"),
	relationship_target_children: Token::new("relationshipTargetChildren"),
	variant_children: Token::new("variantChildren"),
	variant_set_children: Token::new("variantSetChildren"),
});

pub fn field_keys() -> &'static FieldKeys {
	&FIELD_KEYS
}

pub fn children_keys() -> &'static ChildrenKeys {
	&CHILDREN_KEYS
}

/// Per-field registration: the fallback value, whether the field is a
/// children list, and an optional validity rule for authored list items.
pub struct FieldDefinition {
	pub fallback: Value,
	pub children: bool,
	pub item_validator: Option<fn(&str) -> bool>,
}

/// Per-spec-type registration: which fields the spec type may carry and
/// which of those are required (always logically present).
pub struct SpecDefinition {
	fields: IndexMap<Token, bool>,
	required: Vec<Token>,
}

impl SpecDefinition {
	fn new() -> Self {
		SpecDefinition {
			fields: IndexMap::new(),
			required: Vec::new(),
		}
	}

	fn field(mut self, name: Token) -> Self {
		self.fields.insert(name, false);
		self
	}

	fn required_field(mut self, name: Token) -> Self {
		self.fields.insert(name, true);
		self.required.push(name);
		self
	}

	fn copy_from(mut self, other: &SpecDefinition) -> Self {
		for (&name, &required) in &other.fields {
			if required {
				self = self.required_field(name);
			} else {
				self = self.field(name);
			}
		}
		self
	}

	pub fn is_valid_field(&self, name: Token) -> bool {
		self.fields.contains_key(&name)
	}

	pub fn is_required_field(&self, name: Token) -> bool {
		self.fields.get(&name).copied().unwrap_or(false)
	}

	pub fn required_fields(&self) -> &[Token] {
		&self.required
	}

	pub fn fields(&self) -> impl Iterator<Item = Token> + '_ {
		self.fields.keys().copied()
	}
}

/// The field schema: fallbacks, required fields, and children declarations
/// for every spec type.
pub struct Schema {
	fields: FxHashMap<Token, FieldDefinition>,
	specs: FxHashMap<SpecType, SpecDefinition>,
}

static SCHEMA: LazyLock<Schema> = LazyLock::new(Schema::new_builtin);

impl Schema {
	/// The process-wide schema.
	pub fn get() -> &'static Schema {
		&SCHEMA
	}

	pub fn field_definition(&self, name: Token) -> Option<&FieldDefinition> {
		self.fields.get(&name)
	}

	pub fn spec_definition(&self, spec_type: SpecType) -> Option<&SpecDefinition> {
		self.specs.get(&spec_type)
	}

	pub fn required_fields(&self, spec_type: SpecType) -> &[Token] {
		self.spec_definition(spec_type)
			.map(SpecDefinition::required_fields)
			.unwrap_or(&[])
	}

	/// The schema fallback value for a field, if the field is registered.
	pub fn fallback(&self, name: Token) -> Option<&Value> {
		self.fields.get(&name).map(|def| &def.fallback)
	}

	pub fn is_children_field(&self, name: Token) -> bool {
		self.fields.get(&name).is_some_and(|def| def.children)
	}

	pub fn is_valid_field_for_spec(&self, spec_type: SpecType, name: Token) -> bool {
		self.spec_definition(spec_type)
			.is_some_and(|def| def.is_valid_field(name))
	}

	/// The children-list fields a spec of this type may carry, in
	/// declaration order. Drives generic subtree traversal.
	pub fn children_fields(&self, spec_type: SpecType) -> Vec<Token> {
		self.spec_definition(spec_type)
			.map(|def| {
				def.fields()
					.filter(|&name| self.is_children_field(name))
					.collect()
			})
			.unwrap_or_default()
	}

	fn register_field(&mut self, name: Token, fallback: Value) {
		self.fields.insert(
			name,
			FieldDefinition {
				fallback,
				children: false,
				item_validator: None,
			},
		);
	}

	fn register_children_field(
		&mut self,
		name: Token,
		fallback: Value,
		item_validator: fn(&str) -> bool,
	) {
		self.fields.insert(
			name,
			FieldDefinition {
				fallback,
				children: true,
				item_validator: Some(item_validator),
			},
		);
	}

	fn new_builtin() -> Schema {
		let f = field_keys();
		let c = children_keys();
		let mut schema = Schema {
			fields: FxHashMap::default(),
			specs: FxHashMap::default(),
		};

		schema.register_field(f.active, Value::Bool(true));
		schema.register_field(f.allowed_tokens, Value::TokenVec(Vec::new()));
		schema.register_field(f.asset_info, Value::Dictionary(Default::default()));
		schema.register_field(f.color_space, Value::Token(Token::empty()));
		schema.register_field(f.comment, Value::String(String::new()));
		schema.register_field(f.connection_paths, Value::PathListOp(ListOp::new()));
		schema.register_field(f.custom, Value::Bool(false));
		schema.register_field(f.custom_data, Value::Dictionary(Default::default()));
		schema.register_field(f.default, Value::Block);
		schema.register_field(f.default_prim, Value::Token(Token::empty()));
		schema.register_field(f.display_group, Value::String(String::new()));
		schema.register_field(f.display_name, Value::String(String::new()));
		schema.register_field(f.display_unit, Value::Token(Token::empty()));
		schema.register_field(f.documentation, Value::String(String::new()));
		schema.register_field(f.end_time_code, Value::Double(0.0));
		schema.register_field(f.expression, Value::String(String::new()));
		schema.register_field(f.frames_per_second, Value::Double(24.0));
		schema.register_field(f.hidden, Value::Bool(false));
		schema.register_field(f.inherit_paths, Value::PathListOp(ListOp::new()));
		schema.register_field(f.instanceable, Value::Bool(false));
		schema.register_field(f.kind, Value::Token(Token::empty()));
		schema.register_field(f.payload, Value::PathListOp(ListOp::new()));
		schema.register_field(f.permission, Value::Permission(Default::default()));
		schema.register_field(f.prim_order, Value::TokenVec(Vec::new()));
		schema.register_field(f.property_order, Value::TokenVec(Vec::new()));
		schema.register_field(f.references, Value::PathListOp(ListOp::new()));
		schema.register_field(f.relocates, Value::Dictionary(Default::default()));
		schema.register_field(f.specializes, Value::PathListOp(ListOp::new()));
		schema.register_field(f.specifier, Value::Specifier(Specifier::Over));
		schema.register_field(f.start_time_code, Value::Double(0.0));
		schema.register_field(f.sub_layer_offsets, Value::StringVec(Vec::new()));
		schema.register_field(f.sub_layers, Value::StringVec(Vec::new()));
		schema.register_field(f.target_paths, Value::PathListOp(ListOp::new()));
		schema.register_field(f.time_codes_per_second, Value::Double(24.0));
		schema.register_field(f.time_samples, Value::TimeSamples(Default::default()));
		schema.register_field(f.type_name, Value::Token(Token::empty()));
		schema.register_field(f.value, Value::Block);
		schema.register_field(f.variability, Value::Variability(Variability::Varying));
		schema.register_field(f.variant_selection, Value::Dictionary(Default::default()));
		schema.register_field(f.variant_set_names, Value::StringListOp(ListOp::new()));

		schema.register_children_field(c.connection_children, Value::PathVec(Vec::new()), |_| true);
		schema.register_children_field(
			c.expression_children,
			Value::TokenVec(Vec::new()),
			is_valid_identifier,
		);
		schema.register_children_field(
			c.mapper_arg_children,
			Value::TokenVec(Vec::new()),
			is_valid_identifier,
		);
		schema.register_children_field(c.mapper_children, Value::PathVec(Vec::new()), |_| true);
		schema.register_children_field(
			c.prim_children,
			Value::TokenVec(Vec::new()),
			is_valid_identifier,
		);
		schema.register_children_field(
			c.property_children,
			Value::TokenVec(Vec::new()),
			is_valid_namespaced_identifier,
		);
		schema.register_children_field(
			c.relationship_target_children,
			Value::PathVec(Vec::new()),
			|_| true,
		);
		schema.register_children_field(
			c.variant_children,
			Value::TokenVec(Vec::new()),
			is_valid_variant_identifier,
		);
		schema.register_children_field(
			c.variant_set_children,
			Value::TokenVec(Vec::new()),
			is_valid_identifier,
		);

		let pseudo_root = SpecDefinition::new()
			.field(f.comment)
			.field(f.documentation)
			.field(f.custom_data)
			.field(f.default_prim)
			.field(f.start_time_code)
			.field(f.end_time_code)
			.field(f.frames_per_second)
			.field(f.time_codes_per_second)
			.field(c.prim_children)
			.field(f.prim_order)
			.field(f.relocates)
			.field(f.sub_layers)
			.field(f.sub_layer_offsets);
		schema.specs.insert(SpecType::PseudoRoot, pseudo_root);

		let prim = SpecDefinition::new()
			.required_field(f.specifier)
			.field(f.active)
			.field(f.asset_info)
			.field(f.comment)
			.field(f.custom_data)
			.field(f.documentation)
			.field(f.hidden)
			.field(f.inherit_paths)
			.field(f.instanceable)
			.field(f.kind)
			.field(f.payload)
			.field(f.permission)
			.field(c.prim_children)
			.field(f.prim_order)
			.field(c.property_children)
			.field(f.property_order)
			.field(f.references)
			.field(f.relocates)
			.field(f.specializes)
			.field(f.type_name)
			.field(f.variant_selection)
			.field(c.variant_set_children)
			.field(f.variant_set_names);
		let variant = SpecDefinition::new().copy_from(&prim);
		schema.specs.insert(SpecType::Prim, prim);
		schema.specs.insert(SpecType::Variant, variant);

		let property = SpecDefinition::new()
			.required_field(f.custom)
			.required_field(f.variability)
			.field(f.asset_info)
			.field(f.comment)
			.field(f.custom_data)
			.field(f.default)
			.field(f.display_group)
			.field(f.display_name)
			.field(f.documentation)
			.field(f.hidden)
			.field(f.permission)
			.field(f.time_samples);

		let attribute = SpecDefinition::new()
			.copy_from(&property)
			.required_field(f.type_name)
			.field(c.connection_children)
			.field(f.connection_paths)
			.field(f.display_unit)
			.field(f.allowed_tokens)
			.field(f.color_space);
		schema.specs.insert(SpecType::Attribute, attribute);

		let relationship = SpecDefinition::new()
			.copy_from(&property)
			.field(c.relationship_target_children)
			.field(f.target_paths);
		schema.specs.insert(SpecType::Relationship, relationship);

		schema.specs.insert(SpecType::Connection, SpecDefinition::new());
		schema.specs.insert(
			SpecType::RelationshipTarget,
			SpecDefinition::new().field(c.property_children),
		);
		schema.specs.insert(
			SpecType::VariantSet,
			SpecDefinition::new().field(c.variant_children),
		);
		schema.specs.insert(
			SpecType::Mapper,
			SpecDefinition::new()
				.field(f.type_name)
				.field(c.mapper_arg_children),
		);
		schema
			.specs
			.insert(SpecType::MapperArg, SpecDefinition::new().field(f.value));
		schema.specs.insert(
			SpecType::Expression,
			SpecDefinition::new().field(f.expression),
		);

		schema
	}
}

/// Whether authoring-time schema validation is enabled. Read once from
/// `STRATA_VALIDATE_AUTHORING` (any value other than `0` enables it;
/// default enabled).
pub fn validation_enabled() -> bool {
	static ENABLED: LazyLock<bool> = LazyLock::new(|| {
		std::env::var("STRATA_VALIDATE_AUTHORING").map_or(true, |v| v != "0")
	});
	*ENABLED
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_required_fields() {
		let schema = Schema::get();
		let f = field_keys();
		assert_eq!(schema.required_fields(SpecType::Prim), &[f.specifier]);
		assert_eq!(
			schema.required_fields(SpecType::Attribute),
			&[f.custom, f.variability, f.type_name]
		);
		assert_eq!(
			schema.required_fields(SpecType::Relationship),
			&[f.custom, f.variability]
		);
		assert!(schema.required_fields(SpecType::PseudoRoot).is_empty());
	}

	#[test]
	fn test_fallbacks() {
		let schema = Schema::get();
		let f = field_keys();
		assert_eq!(
			schema.fallback(f.specifier),
			Some(&Value::Specifier(Specifier::Over))
		);
		assert_eq!(schema.fallback(f.custom), Some(&Value::Bool(false)));
		assert_eq!(schema.fallback(Token::new("noSuchField")), None);
	}

	#[test]
	fn test_children_fields() {
		let schema = Schema::get();
		let c = children_keys();
		let prim_children = schema.children_fields(SpecType::Prim);
		assert!(prim_children.contains(&c.prim_children));
		assert!(prim_children.contains(&c.property_children));
		assert!(prim_children.contains(&c.variant_set_children));
		assert!(schema.is_children_field(c.relationship_target_children));
		assert!(!schema.is_children_field(field_keys().references));
	}

	#[test]
	fn test_field_validity() {
		let schema = Schema::get();
		let f = field_keys();
		assert!(schema.is_valid_field_for_spec(SpecType::Prim, f.specifier));
		assert!(!schema.is_valid_field_for_spec(SpecType::Prim, f.target_paths));
		assert!(!schema.is_valid_field_for_spec(SpecType::Unknown, f.specifier));
	}
}
