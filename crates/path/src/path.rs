use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::token::Token;

/// One step in a namespace path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum PathPart {
	/// A prim child step (`/Name`).
	Prim(Token),
	/// A variant selection step (`{set=variant}`), valid under a prim.
	VariantSelection(Token, Token),
	/// A property step (`.name`), valid under a prim or a target.
	Property(Token),
	/// A target step (`[/path]`), valid under a property.
	Target(PathKey),
}

impl PathPart {
	fn name(&self) -> Token {
		match self {
			PathPart::Prim(name) | PathPart::Property(name) => *name,
			PathPart::VariantSelection(_, variant) => *variant,
			PathPart::Target(_) => Token::empty(),
		}
	}
}

/// An immutable absolute namespace path.
///
/// Identifies a location in a layer's namespace tree: the pseudo-root, a
/// prim, a property, a variant selection, or a relationship/connection
/// target. Cheap to clone (shared storage) and structurally hashable.
///
/// The derived total order sorts a parent before all of its descendants,
/// which the store relies on for top-down/bottom-up traversal of sorted
/// path sets. [`PathKey::arbitrary_cmp`] is a faster comparator with no
/// meaningful order, for containers that only need *some* stable order.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey {
	parts: Arc<[PathPart]>,
}

/// Errors from parsing a path string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathParseError {
	#[error("empty path")]
	Empty,
	#[error("path must be absolute (start with '/'): {0:?}")]
	NotAbsolute(String),
	#[error("invalid identifier {ident:?} in path {path:?}")]
	InvalidIdentifier { path: String, ident: String },
	#[error("unexpected character {found:?} at offset {offset} in path {path:?}")]
	UnexpectedChar {
		path: String,
		found: char,
		offset: usize,
	},
	#[error("unterminated {what} in path {path:?}")]
	Unterminated { path: String, what: &'static str },
	#[error("{what} not allowed here in path {path:?}")]
	Misplaced { path: String, what: &'static str },
}

/// True if `s` is a legal prim or variant-set name: an ASCII identifier.
pub fn is_valid_identifier(s: &str) -> bool {
	let mut chars = s.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// True if `s` is a legal property name: identifier segments joined by `:`.
pub fn is_valid_namespaced_identifier(s: &str) -> bool {
	!s.is_empty() && s.split(':').all(is_valid_identifier)
}

/// True if `s` is a legal variant name. Variants additionally allow a
/// leading digit, `-`, and `.` (matching authored variant selections).
pub fn is_valid_variant_identifier(s: &str) -> bool {
	!s.is_empty()
		&& s.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

static ROOT: std::sync::LazyLock<PathKey> = std::sync::LazyLock::new(|| PathKey {
	parts: Arc::from(Vec::new()),
});

impl PathKey {
	/// The absolute root path, `/`.
	pub fn absolute_root() -> PathKey {
		ROOT.clone()
	}

	fn with_appended(&self, part: PathPart) -> PathKey {
		let mut parts = Vec::with_capacity(self.parts.len() + 1);
		parts.extend_from_slice(&self.parts);
		parts.push(part);
		PathKey {
			parts: parts.into(),
		}
	}

	/// Appends a prim child step. Valid on the root, a prim, or a variant
	/// selection; returns `None` elsewhere.
	pub fn append_child(&self, name: Token) -> Option<PathKey> {
		match self.parts.last() {
			None | Some(PathPart::Prim(_) | PathPart::VariantSelection(..)) => {
				Some(self.with_appended(PathPart::Prim(name)))
			}
			_ => None,
		}
	}

	/// Appends a property step. Valid on a prim, a variant selection, or a
	/// target (relational attributes); returns `None` elsewhere.
	pub fn append_property(&self, name: Token) -> Option<PathKey> {
		match self.parts.last() {
			Some(PathPart::Prim(_) | PathPart::VariantSelection(..) | PathPart::Target(_)) => {
				Some(self.with_appended(PathPart::Property(name)))
			}
			_ => None,
		}
	}

	/// Appends a variant selection step. Valid on a prim or another variant
	/// selection.
	pub fn append_variant_selection(&self, set: Token, variant: Token) -> Option<PathKey> {
		match self.parts.last() {
			Some(PathPart::Prim(_) | PathPart::VariantSelection(..)) => {
				Some(self.with_appended(PathPart::VariantSelection(set, variant)))
			}
			_ => None,
		}
	}

	/// Appends a target step. Valid on a property.
	pub fn append_target(&self, target: PathKey) -> Option<PathKey> {
		match self.parts.last() {
			Some(PathPart::Property(_)) => Some(self.with_appended(PathPart::Target(target))),
			_ => None,
		}
	}

	/// The parent path. The root is its own parent.
	pub fn parent(&self) -> PathKey {
		if self.parts.is_empty() {
			return self.clone();
		}
		PathKey {
			parts: self.parts[..self.parts.len() - 1].into(),
		}
	}

	/// The name of the final step: prim or property name, or the variant
	/// name of a variant selection. Empty for the root and for target steps.
	pub fn name_token(&self) -> Token {
		self.parts.last().map(PathPart::name).unwrap_or_default()
	}

	/// The final step, if any.
	pub fn last_part(&self) -> Option<&PathPart> {
		self.parts.last()
	}

	/// Number of steps from the root.
	pub fn depth(&self) -> usize {
		self.parts.len()
	}

	pub fn is_root(&self) -> bool {
		self.parts.is_empty()
	}

	pub fn is_prim_path(&self) -> bool {
		matches!(self.parts.last(), Some(PathPart::Prim(_)))
	}

	pub fn is_prim_variant_selection_path(&self) -> bool {
		matches!(self.parts.last(), Some(PathPart::VariantSelection(..)))
	}

	/// True for prim paths and variant selection paths (both can parent
	/// prims and properties).
	pub fn is_prim_or_variant_path(&self) -> bool {
		matches!(
			self.parts.last(),
			Some(PathPart::Prim(_) | PathPart::VariantSelection(..))
		)
	}

	pub fn is_property_path(&self) -> bool {
		matches!(self.parts.last(), Some(PathPart::Property(_)))
	}

	pub fn is_target_path(&self) -> bool {
		matches!(self.parts.last(), Some(PathPart::Target(_)))
	}

	/// True if `self` equals `prefix` or lies beneath it. The root is a
	/// prefix of every path.
	pub fn has_prefix(&self, prefix: &PathKey) -> bool {
		self.parts.len() >= prefix.parts.len() && self.parts[..prefix.parts.len()] == *prefix.parts
	}

	/// Rewrites `old_prefix` to `new_prefix`, both in the path itself and in
	/// any embedded target paths. Returns the path unchanged if no step
	/// matches.
	pub fn replace_prefix(&self, old_prefix: &PathKey, new_prefix: &PathKey) -> PathKey {
		let mut changed = false;
		let mut parts: Vec<PathPart> = if self.has_prefix(old_prefix) {
			changed = true;
			let mut parts = Vec::with_capacity(
				new_prefix.parts.len() + self.parts.len() - old_prefix.parts.len(),
			);
			parts.extend_from_slice(&new_prefix.parts);
			parts.extend_from_slice(&self.parts[old_prefix.parts.len()..]);
			parts
		} else {
			self.parts.to_vec()
		};
		for part in &mut parts {
			if let PathPart::Target(target) = part {
				let rewritten = target.replace_prefix(old_prefix, new_prefix);
				if rewritten != *target {
					*target = rewritten;
					changed = true;
				}
			}
		}
		if changed {
			PathKey {
				parts: parts.into(),
			}
		} else {
			self.clone()
		}
	}

	/// The longest prefix of this path that is a prim (or variant
	/// selection) path; the root for the root itself.
	pub fn prim_path(&self) -> PathKey {
		let mut end = self.parts.len();
		while end > 0 {
			match &self.parts[end - 1] {
				PathPart::Prim(_) | PathPart::VariantSelection(..) => break,
				_ => end -= 1,
			}
		}
		if end == self.parts.len() {
			self.clone()
		} else {
			PathKey {
				parts: self.parts[..end].into(),
			}
		}
	}

	/// Fast comparison in an arbitrary but stable (per-process) total order.
	pub fn arbitrary_cmp(&self, other: &PathKey) -> Ordering {
		fn part_cmp(a: &PathPart, b: &PathPart) -> Ordering {
			match (a, b) {
				(PathPart::Prim(x), PathPart::Prim(y)) => x.arbitrary_cmp(*y),
				(PathPart::Property(x), PathPart::Property(y)) => x.arbitrary_cmp(*y),
				(PathPart::VariantSelection(xs, xv), PathPart::VariantSelection(ys, yv)) => {
					xs.arbitrary_cmp(*ys).then(xv.arbitrary_cmp(*yv))
				}
				(PathPart::Target(x), PathPart::Target(y)) => x.arbitrary_cmp(y),
				_ => rank(a).cmp(&rank(b)),
			}
		}
		fn rank(p: &PathPart) -> u8 {
			match p {
				PathPart::Prim(_) => 0,
				PathPart::VariantSelection(..) => 1,
				PathPart::Property(_) => 2,
				PathPart::Target(_) => 3,
			}
		}
		let len = self.parts.len().min(other.parts.len());
		for i in 0..len {
			match part_cmp(&self.parts[i], &other.parts[i]) {
				Ordering::Equal => continue,
				other => return other,
			}
		}
		self.parts.len().cmp(&other.parts.len())
	}

	fn write_text(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.parts.is_empty() {
			return f.write_str("/");
		}
		for part in self.parts.iter() {
			match part {
				PathPart::Prim(name) => write!(f, "/{name}")?,
				PathPart::VariantSelection(set, variant) => write!(f, "{{{set}={variant}}}")?,
				PathPart::Property(name) => write!(f, ".{name}")?,
				PathPart::Target(target) => write!(f, "[{target}]")?,
			}
		}
		Ok(())
	}
}

impl fmt::Display for PathKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.write_text(f)
	}
}

impl fmt::Debug for PathKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<{self}>")
	}
}

struct Parser<'a> {
	input: &'a str,
	rest: &'a str,
}

impl<'a> Parser<'a> {
	fn error_at(&self, found: char) -> PathParseError {
		PathParseError::UnexpectedChar {
			path: self.input.to_owned(),
			found,
			offset: self.input.len() - self.rest.len(),
		}
	}

	fn take_identifier(&mut self, allow_namespaced: bool) -> Result<&'a str, PathParseError> {
		let end = self
			.rest
			.find(|c: char| {
				!(c.is_ascii_alphanumeric() || c == '_' || (allow_namespaced && c == ':'))
			})
			.unwrap_or(self.rest.len());
		let (ident, rest) = self.rest.split_at(end);
		let valid = if allow_namespaced {
			is_valid_namespaced_identifier(ident)
		} else {
			is_valid_identifier(ident)
		};
		if !valid {
			return Err(PathParseError::InvalidIdentifier {
				path: self.input.to_owned(),
				ident: ident.to_owned(),
			});
		}
		self.rest = rest;
		Ok(ident)
	}

	fn parse(mut self) -> Result<PathKey, PathParseError> {
		let mut path = PathKey::absolute_root();
		if self.rest == "/" {
			return Ok(path);
		}
		while let Some(c) = self.rest.chars().next() {
			match c {
				'/' => {
					self.rest = &self.rest[1..];
					let name = Token::new(self.take_identifier(false)?);
					path = path.append_child(name).ok_or(PathParseError::Misplaced {
						path: self.input.to_owned(),
						what: "prim step",
					})?;
				}
				'.' => {
					self.rest = &self.rest[1..];
					let name = Token::new(self.take_identifier(true)?);
					path = path
						.append_property(name)
						.ok_or(PathParseError::Misplaced {
							path: self.input.to_owned(),
							what: "property step",
						})?;
				}
				'{' => {
					self.rest = &self.rest[1..];
					let set = Token::new(self.take_identifier(false)?);
					if !self.rest.starts_with('=') {
						return Err(self.error_at(self.rest.chars().next().unwrap_or('}')));
					}
					self.rest = &self.rest[1..];
					let variant_end =
						self.rest
							.find('}')
							.ok_or_else(|| PathParseError::Unterminated {
								path: self.input.to_owned(),
								what: "variant selection",
							})?;
					let variant = &self.rest[..variant_end];
					if !variant.is_empty() && !is_valid_variant_identifier(variant) {
						return Err(PathParseError::InvalidIdentifier {
							path: self.input.to_owned(),
							ident: variant.to_owned(),
						});
					}
					self.rest = &self.rest[variant_end + 1..];
					path = path
						.append_variant_selection(set, Token::new(variant))
						.ok_or(PathParseError::Misplaced {
							path: self.input.to_owned(),
							what: "variant selection",
						})?;
				}
				'[' => {
					let target_end = self.find_matching_bracket()?;
					let target: PathKey = self.rest[1..target_end].parse()?;
					self.rest = &self.rest[target_end + 1..];
					path = path.append_target(target).ok_or(PathParseError::Misplaced {
						path: self.input.to_owned(),
						what: "target step",
					})?;
				}
				other => return Err(self.error_at(other)),
			}
		}
		Ok(path)
	}

	/// Offset of the `]` matching the `[` at the start of `rest`. Targets
	/// nest (`/a.rel[/b.rel[/c]]`), so track depth.
	fn find_matching_bracket(&self) -> Result<usize, PathParseError> {
		let mut depth = 0usize;
		for (i, c) in self.rest.char_indices() {
			match c {
				'[' => depth += 1,
				']' => {
					depth -= 1;
					if depth == 0 {
						return Ok(i);
					}
				}
				_ => {}
			}
		}
		Err(PathParseError::Unterminated {
			path: self.input.to_owned(),
			what: "target",
		})
	}
}

impl FromStr for PathKey {
	type Err = PathParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Err(PathParseError::Empty);
		}
		if !s.starts_with('/') {
			return Err(PathParseError::NotAbsolute(s.to_owned()));
		}
		Parser { input: s, rest: s }.parse()
	}
}
