use std::fmt;
use std::sync::LazyLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// A process-interned immutable string.
///
/// Tokens are `Copy` handles into a global interner. Equality and hashing
/// compare interner indices, so a `Token` is as cheap to use as an integer
/// while still printing as its string. Interned strings live for the rest of
/// the process.
///
/// The derived `Ord` on the index is *not* lexicographic; use [`Token::cmp_str`]
/// when alphabetic order matters and [`Token::arbitrary_cmp`] when any stable
/// total order will do (it is the faster of the two).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u32);

struct Interner {
	lookup: FxHashMap<&'static str, u32>,
	strings: Vec<&'static str>,
}

impl Interner {
	fn new() -> Self {
		let mut interner = Interner {
			lookup: FxHashMap::default(),
			strings: Vec::new(),
		};
		// Index 0 is reserved for the empty token.
		interner.intern("");
		interner
	}

	fn intern(&mut self, s: &str) -> u32 {
		if let Some(&idx) = self.lookup.get(s) {
			return idx;
		}
		let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
		let idx = u32::try_from(self.strings.len()).expect("token interner overflow");
		self.strings.push(leaked);
		self.lookup.insert(leaked, idx);
		idx
	}
}

static INTERNER: LazyLock<RwLock<Interner>> = LazyLock::new(|| RwLock::new(Interner::new()));

impl Token {
	/// Interns `s` and returns its token.
	pub fn new(s: &str) -> Self {
		if s.is_empty() {
			return Token(0);
		}
		{
			let interner = INTERNER.read();
			if let Some(&idx) = interner.lookup.get(s) {
				return Token(idx);
			}
		}
		Token(INTERNER.write().intern(s))
	}

	/// The empty token.
	pub const fn empty() -> Self {
		Token(0)
	}

	/// Returns the interned string.
	pub fn as_str(self) -> &'static str {
		INTERNER.read().strings[self.0 as usize]
	}

	/// True for the empty token.
	pub fn is_empty(self) -> bool {
		self.0 == 0
	}

	/// Lexicographic comparison on the underlying strings.
	pub fn cmp_str(self, other: Token) -> std::cmp::Ordering {
		if self == other {
			std::cmp::Ordering::Equal
		} else {
			self.as_str().cmp(other.as_str())
		}
	}

	/// Fast comparison in an arbitrary but stable (per-process) total order.
	///
	/// Distinct from lexicographic order; suitable for sorted containers
	/// where the particular order carries no meaning.
	pub fn arbitrary_cmp(self, other: Token) -> std::cmp::Ordering {
		self.0.cmp(&other.0)
	}
}

impl Default for Token {
	fn default() -> Self {
		Token::empty()
	}
}

impl PartialOrd for Token {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Token {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.cmp_str(*other)
	}
}

impl From<&str> for Token {
	fn from(s: &str) -> Self {
		Token::new(s)
	}
}

impl From<String> for Token {
	fn from(s: String) -> Self {
		Token::new(&s)
	}
}

impl fmt::Debug for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Token({:?})", self.as_str())
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
