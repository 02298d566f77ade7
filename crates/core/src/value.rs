use std::collections::BTreeMap;
use std::fmt;

use strata_path::{PathKey, Token};

use crate::listop::ListOp;

/// How a prim spec participates in composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Specifier {
	/// Defines a prim.
	Def,
	/// Overrides opinions on a prim defined elsewhere. The schema fallback.
	#[default]
	Over,
	/// Defines an abstract prim (inherited from, never imaged directly).
	Class,
}

/// Whether a property varies over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variability {
	#[default]
	Varying,
	Uniform,
}

/// Access permission recorded on a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
	#[default]
	Public,
	Private,
}

/// A finite-or-infinite sample time, totally ordered. NaN is rejected at
/// construction so [`TimeSampleMap`] keys always sort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeCode(f64);

impl TimeCode {
	/// Wraps a sample time; `None` for NaN.
	pub fn new(t: f64) -> Option<TimeCode> {
		(!t.is_nan()).then_some(TimeCode(t))
	}

	pub fn get(self) -> f64 {
		self.0
	}
}

impl Eq for TimeCode {}

impl PartialOrd for TimeCode {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for TimeCode {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.0.total_cmp(&other.0)
	}
}

impl fmt::Display for TimeCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Sorted time → value samples for one path.
///
/// Supports nearest-bracket lookup without materializing anything beyond the
/// sorted map itself. A [`Value::Block`] sample is a first-class entry,
/// distinct from "no sample at this time".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSampleMap {
	samples: BTreeMap<TimeCode, Value>,
}

impl TimeSampleMap {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.samples.is_empty()
	}

	pub fn len(&self) -> usize {
		self.samples.len()
	}

	pub fn set(&mut self, time: TimeCode, value: Value) {
		self.samples.insert(time, value);
	}

	pub fn erase(&mut self, time: TimeCode) -> bool {
		self.samples.remove(&time).is_some()
	}

	pub fn get(&self, time: TimeCode) -> Option<&Value> {
		self.samples.get(&time)
	}

	pub fn times(&self) -> impl Iterator<Item = TimeCode> + '_ {
		self.samples.keys().copied()
	}

	pub fn iter(&self) -> impl Iterator<Item = (TimeCode, &Value)> + '_ {
		self.samples.iter().map(|(t, v)| (*t, v))
	}

	/// The samples bracketing `time`: the nearest sample at-or-before and
	/// the nearest at-or-after. When `time` hits a sample exactly, both ends
	/// are that sample. One-sided when `time` lies outside the sampled
	/// range; `None` when there are no samples at all.
	pub fn bracketing(&self, time: TimeCode) -> Option<(TimeCode, TimeCode)> {
		if self.samples.is_empty() {
			return None;
		}
		let lower = self.samples.range(..=time).next_back().map(|(t, _)| *t);
		let upper = self.samples.range(time..).next().map(|(t, _)| *t);
		match (lower, upper) {
			(Some(lo), Some(hi)) => Some((lo, hi)),
			(Some(lo), None) => Some((lo, lo)),
			(None, Some(hi)) => Some((hi, hi)),
			(None, None) => None,
		}
	}
}

/// Discriminants of [`Value`], used by schema fallback declarations and
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
	Bool,
	Int,
	UInt,
	Double,
	String,
	Token,
	AssetPath,
	Path,
	StringVec,
	TokenVec,
	PathVec,
	IntListOp,
	StringListOp,
	TokenListOp,
	PathListOp,
	Dictionary,
	TimeSamples,
	Specifier,
	Permission,
	Variability,
	Block,
}

/// The closed union of values a field can hold.
///
/// Field types are schema-enumerated; there is no open/dynamic payload.
/// [`Value::Block`] is the sentinel that explicitly blocks a weaker value,
/// distinct from the absence of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Bool(bool),
	Int(i64),
	UInt(u64),
	Double(f64),
	String(String),
	Token(Token),
	AssetPath(String),
	Path(PathKey),
	StringVec(Vec<String>),
	TokenVec(Vec<Token>),
	PathVec(Vec<PathKey>),
	IntListOp(ListOp<i64>),
	StringListOp(ListOp<String>),
	TokenListOp(ListOp<Token>),
	PathListOp(ListOp<PathKey>),
	Dictionary(BTreeMap<String, Value>),
	TimeSamples(TimeSampleMap),
	Specifier(Specifier),
	Permission(Permission),
	Variability(Variability),
	Block,
}

impl Value {
	pub fn value_type(&self) -> ValueType {
		match self {
			Value::Bool(_) => ValueType::Bool,
			Value::Int(_) => ValueType::Int,
			Value::UInt(_) => ValueType::UInt,
			Value::Double(_) => ValueType::Double,
			Value::String(_) => ValueType::String,
			Value::Token(_) => ValueType::Token,
			Value::AssetPath(_) => ValueType::AssetPath,
			Value::Path(_) => ValueType::Path,
			Value::StringVec(_) => ValueType::StringVec,
			Value::TokenVec(_) => ValueType::TokenVec,
			Value::PathVec(_) => ValueType::PathVec,
			Value::IntListOp(_) => ValueType::IntListOp,
			Value::StringListOp(_) => ValueType::StringListOp,
			Value::TokenListOp(_) => ValueType::TokenListOp,
			Value::PathListOp(_) => ValueType::PathListOp,
			Value::Dictionary(_) => ValueType::Dictionary,
			Value::TimeSamples(_) => ValueType::TimeSamples,
			Value::Specifier(_) => ValueType::Specifier,
			Value::Permission(_) => ValueType::Permission,
			Value::Variability(_) => ValueType::Variability,
			Value::Block => ValueType::Block,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Value::Int(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_double(&self) -> Option<f64> {
		match self {
			Value::Double(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(v) | Value::AssetPath(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_token(&self) -> Option<Token> {
		match self {
			Value::Token(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_path(&self) -> Option<&PathKey> {
		match self {
			Value::Path(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_token_vec(&self) -> Option<&Vec<Token>> {
		match self {
			Value::TokenVec(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_path_vec(&self) -> Option<&Vec<PathKey>> {
		match self {
			Value::PathVec(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_specifier(&self) -> Option<Specifier> {
		match self {
			Value::Specifier(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_time_samples(&self) -> Option<&TimeSampleMap> {
		match self {
			Value::TimeSamples(v) => Some(v),
			_ => None,
		}
	}

	pub fn is_block(&self) -> bool {
		matches!(self, Value::Block)
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Double(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::String(v.to_owned())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::String(v)
	}
}

impl From<Token> for Value {
	fn from(v: Token) -> Self {
		Value::Token(v)
	}
}

impl From<PathKey> for Value {
	fn from(v: PathKey) -> Self {
		Value::Path(v)
	}
}

impl From<Specifier> for Value {
	fn from(v: Specifier) -> Self {
		Value::Specifier(v)
	}
}

impl From<Variability> for Value {
	fn from(v: Variability) -> Self {
		Value::Variability(v)
	}
}

impl From<Vec<Token>> for Value {
	fn from(v: Vec<Token>) -> Self {
		Value::TokenVec(v)
	}
}

impl From<Vec<PathKey>> for Value {
	fn from(v: Vec<PathKey>) -> Self {
		Value::PathVec(v)
	}
}

impl TryFrom<Value> for bool {
	type Error = Value;

	fn try_from(v: Value) -> Result<Self, Value> {
		v.as_bool().ok_or(v)
	}
}

impl TryFrom<Value> for i64 {
	type Error = Value;

	fn try_from(v: Value) -> Result<Self, Value> {
		v.as_int().ok_or(v)
	}
}

impl TryFrom<Value> for f64 {
	type Error = Value;

	fn try_from(v: Value) -> Result<Self, Value> {
		v.as_double().ok_or(v)
	}
}

impl TryFrom<Value> for Token {
	type Error = Value;

	fn try_from(v: Value) -> Result<Self, Value> {
		v.as_token().ok_or(v)
	}
}

impl TryFrom<Value> for String {
	type Error = Value;

	fn try_from(v: Value) -> Result<Self, Value> {
		match v {
			Value::String(s) | Value::AssetPath(s) => Ok(s),
			other => Err(other),
		}
	}
}

impl TryFrom<Value> for Specifier {
	type Error = Value;

	fn try_from(v: Value) -> Result<Self, Value> {
		v.as_specifier().ok_or(v)
	}
}

impl TryFrom<Value> for Vec<Token> {
	type Error = Value;

	fn try_from(v: Value) -> Result<Self, Value> {
		match v {
			Value::TokenVec(items) => Ok(items),
			other => Err(other),
		}
	}
}

impl TryFrom<Value> for Vec<PathKey> {
	type Error = Value;

	fn try_from(v: Value) -> Result<Self, Value> {
		match v {
			Value::PathVec(items) => Ok(items),
			other => Err(other),
		}
	}
}
