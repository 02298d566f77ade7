use std::fmt;
use std::hash::Hash;

use crate::error::ListOpError;

/// Items a [`ListOp`] can carry.
pub trait ListOpItem: Clone + Eq + Hash + fmt::Debug {}

impl<T: Clone + Eq + Hash + fmt::Debug> ListOpItem for T {}

/// The six operation kinds of a [`ListOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListOpKind {
	Explicit,
	Added,
	Prepended,
	Appended,
	Deleted,
	Ordered,
}

impl ListOpKind {
	pub const ALL: [ListOpKind; 6] = [
		ListOpKind::Explicit,
		ListOpKind::Added,
		ListOpKind::Prepended,
		ListOpKind::Appended,
		ListOpKind::Deleted,
		ListOpKind::Ordered,
	];
}

/// Per-item callback threaded through [`ListOp::apply_operations`] and
/// [`ListOp::modify_operations`]. Returning `None` drops the candidate item;
/// returning a different value remaps it (mapped-to-duplicate results
/// collapse to the first occurrence).
pub type ItemCallback<'a, T> = &'a mut dyn FnMut(ListOpKind, &T) -> Option<T>;

/// A composed edit of an ordered list.
///
/// Either *explicit* (the list is exactly the explicit items) or a bundle of
/// incremental operations (add/prepend/append/delete/reorder) applied to a
/// weaker list. The two representations are mutually exclusive: setting any
/// incremental vector drops explicit mode and its items, and setting the
/// explicit items drops every incremental vector. Every setter enforces
/// this.
#[derive(Clone, PartialEq, Eq)]
pub struct ListOp<T> {
	explicit: bool,
	explicit_items: Vec<T>,
	added_items: Vec<T>,
	prepended_items: Vec<T>,
	appended_items: Vec<T>,
	deleted_items: Vec<T>,
	ordered_items: Vec<T>,
}

impl<T> Default for ListOp<T> {
	fn default() -> Self {
		ListOp {
			explicit: false,
			explicit_items: Vec::new(),
			added_items: Vec::new(),
			prepended_items: Vec::new(),
			appended_items: Vec::new(),
			deleted_items: Vec::new(),
			ordered_items: Vec::new(),
		}
	}
}

impl<T: fmt::Debug> fmt::Debug for ListOp<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.explicit {
			f.debug_struct("ListOp")
				.field("explicit", &self.explicit_items)
				.finish()
		} else {
			f.debug_struct("ListOp")
				.field("added", &self.added_items)
				.field("prepended", &self.prepended_items)
				.field("appended", &self.appended_items)
				.field("deleted", &self.deleted_items)
				.field("ordered", &self.ordered_items)
				.finish()
		}
	}
}

impl<T: ListOpItem> ListOp<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// An explicit list-op over `items`.
	pub fn new_explicit(items: Vec<T>) -> Self {
		let mut op = Self::default();
		op.set_explicit_items(items);
		op
	}

	pub fn is_explicit(&self) -> bool {
		self.explicit
	}

	/// True when this op expresses any opinion at all. Explicit mode is an
	/// opinion even with an empty item list (it pins the list to empty).
	pub fn has_keys(&self) -> bool {
		self.explicit
			|| !self.added_items.is_empty()
			|| !self.prepended_items.is_empty()
			|| !self.appended_items.is_empty()
			|| !self.deleted_items.is_empty()
			|| !self.ordered_items.is_empty()
	}

	pub fn items(&self, kind: ListOpKind) -> &[T] {
		match kind {
			ListOpKind::Explicit => &self.explicit_items,
			ListOpKind::Added => &self.added_items,
			ListOpKind::Prepended => &self.prepended_items,
			ListOpKind::Appended => &self.appended_items,
			ListOpKind::Deleted => &self.deleted_items,
			ListOpKind::Ordered => &self.ordered_items,
		}
	}

	pub fn has_item(&self, kind: ListOpKind, item: &T) -> bool {
		self.items(kind).contains(item)
	}

	pub fn item_count(&self) -> usize {
		ListOpKind::ALL.iter().map(|&k| self.items(k).len()).sum()
	}

	pub fn set_items(&mut self, kind: ListOpKind, items: Vec<T>) {
		match kind {
			ListOpKind::Explicit => self.set_explicit_items(items),
			ListOpKind::Added => self.set_added_items(items),
			ListOpKind::Prepended => self.set_prepended_items(items),
			ListOpKind::Appended => self.set_appended_items(items),
			ListOpKind::Deleted => self.set_deleted_items(items),
			ListOpKind::Ordered => self.set_ordered_items(items),
		}
	}

	pub fn set_explicit_items(&mut self, items: Vec<T>) {
		self.explicit = true;
		self.explicit_items = items;
		self.added_items.clear();
		self.prepended_items.clear();
		self.appended_items.clear();
		self.deleted_items.clear();
		self.ordered_items.clear();
	}

	fn leave_explicit_mode(&mut self) {
		if self.explicit {
			self.explicit = false;
			self.explicit_items.clear();
		}
	}

	pub fn set_added_items(&mut self, items: Vec<T>) {
		self.leave_explicit_mode();
		self.added_items = items;
	}

	pub fn set_prepended_items(&mut self, items: Vec<T>) {
		self.leave_explicit_mode();
		self.prepended_items = items;
	}

	pub fn set_appended_items(&mut self, items: Vec<T>) {
		self.leave_explicit_mode();
		self.appended_items = items;
	}

	pub fn set_deleted_items(&mut self, items: Vec<T>) {
		self.leave_explicit_mode();
		self.deleted_items = items;
	}

	pub fn set_ordered_items(&mut self, items: Vec<T>) {
		self.leave_explicit_mode();
		self.ordered_items = items;
	}

	/// Drops every opinion, leaving the default (non-explicit, empty) op.
	pub fn clear(&mut self) {
		*self = Self::default();
	}

	/// Switches to an explicit empty list (pins the composed result to
	/// empty).
	pub fn clear_and_make_explicit(&mut self) {
		self.set_explicit_items(Vec::new());
	}

	/// Applies this op to `result` in place.
	///
	/// Explicit mode replaces `result` with the (mapped, deduplicated)
	/// explicit items, ignoring the input entirely. Otherwise the
	/// incremental vectors apply in order: deleted, added, prepended,
	/// appended, ordered. See the per-step helpers for each vector's
	/// ordering contract.
	pub fn apply_operations(&self, result: &mut Vec<T>, mut callback: Option<ItemCallback<'_, T>>) {
		let mut map = |kind: ListOpKind, item: &T| -> Option<T> {
			match callback.as_mut() {
				Some(cb) => cb(kind, item),
				None => Some(item.clone()),
			}
		};

		if self.explicit {
			let mut out = Vec::with_capacity(self.explicit_items.len());
			for item in &self.explicit_items {
				if let Some(mapped) = map(ListOpKind::Explicit, item) {
					// First occurrence wins.
					if !out.contains(&mapped) {
						out.push(mapped);
					}
				}
			}
			*result = out;
			return;
		}

		for item in &self.deleted_items {
			if let Some(mapped) = map(ListOpKind::Deleted, item) {
				result.retain(|x| *x != mapped);
			}
		}

		// Added items are appended at the back if absent; items already in
		// the list keep their position (adds never reorder existing
		// content).
		for item in &self.added_items {
			if let Some(mapped) = map(ListOpKind::Added, item)
				&& !result.contains(&mapped)
			{
				result.push(mapped);
			}
		}

		// Prepended items end as a contiguous run at the front, in given
		// order (equivalent to inserting at the front in reverse iteration
		// order). An item already present anywhere is moved, not copied.
		let mut front = Vec::with_capacity(self.prepended_items.len());
		for item in &self.prepended_items {
			if let Some(mapped) = map(ListOpKind::Prepended, item)
				&& !front.contains(&mapped)
			{
				front.push(mapped);
			}
		}
		if !front.is_empty() {
			result.retain(|x| !front.contains(x));
			result.splice(0..0, front);
		}

		// Appended items end as a contiguous run at the back, forward
		// order, moving rather than copying.
		let mut back = Vec::with_capacity(self.appended_items.len());
		for item in &self.appended_items {
			if let Some(mapped) = map(ListOpKind::Appended, item)
				&& !back.contains(&mapped)
			{
				back.push(mapped);
			}
		}
		if !back.is_empty() {
			result.retain(|x| !back.contains(x));
			result.extend(back);
		}

		self.apply_ordered(result, &mut map);
	}

	/// Applies the ordered vector as a stable partial order.
	///
	/// Each ordered item that exists in the list is pulled out together with
	/// the unordered items immediately preceding it (its "run"); runs are
	/// re-emitted in the sequence the ordered vector dictates, and trailing
	/// unordered items keep their place at the end. Unmentioned items are
	/// never reordered relative to each other.
	fn apply_ordered(&self, result: &mut Vec<T>, map: &mut dyn FnMut(ListOpKind, &T) -> Option<T>) {
		if self.ordered_items.is_empty() || result.is_empty() {
			return;
		}
		let mut order = Vec::with_capacity(self.ordered_items.len());
		for item in &self.ordered_items {
			if let Some(mapped) = map(ListOpKind::Ordered, item)
				&& result.contains(&mapped)
				&& !order.contains(&mapped)
			{
				order.push(mapped);
			}
		}
		if order.is_empty() {
			return;
		}

		let mut runs: Vec<(usize, Vec<T>)> = Vec::with_capacity(order.len());
		let mut pending: Vec<T> = Vec::new();
		for item in result.drain(..) {
			if let Some(rank) = order.iter().position(|o| *o == item) {
				pending.push(item);
				runs.push((rank, std::mem::take(&mut pending)));
			} else {
				pending.push(item);
			}
		}
		runs.sort_by_key(|(rank, _)| *rank);
		for (_, run) in runs {
			result.extend(run);
		}
		result.extend(pending);
	}

	/// Composes `self` (stronger) over `weaker` into a single op when the
	/// combination is algebraically representable.
	///
	/// Representable cases: a stronger explicit op wins outright; a stronger
	/// op with empty added and ordered vectors composes over a weaker
	/// explicit op (by application) or over a weaker op that also has empty
	/// added and ordered vectors (by merging deleted/prepended/appended).
	/// Everything else returns `None`: the implied orderings conflict and
	/// callers must fall back to two-step application. This boundary is
	/// deliberately conservative and must not be widened; callers are
	/// written against it.
	pub fn apply_onto(&self, weaker: &ListOp<T>) -> Option<ListOp<T>> {
		if self.explicit {
			return Some(self.clone());
		}
		if !self.added_items.is_empty() || !self.ordered_items.is_empty() {
			return None;
		}

		if weaker.explicit {
			let mut items = weaker.explicit_items.clone();
			self.apply_operations(&mut items, None);
			return Some(ListOp::new_explicit(items));
		}
		if !weaker.added_items.is_empty() || !weaker.ordered_items.is_empty() {
			return None;
		}

		let mut deleted = weaker.deleted_items.clone();
		let mut prepended = weaker.prepended_items.clone();
		let mut appended = weaker.appended_items.clone();

		// Stronger deletes fall through the weaker edits: they cancel
		// weaker prepends/appends and join the delete set.
		for item in &self.deleted_items {
			prepended.retain(|x| x != item);
			appended.retain(|x| x != item);
			if !deleted.contains(item) {
				deleted.push(item.clone());
			}
		}
		// Stronger prepends/appends resurrect weaker-deleted items and
		// claim their spot on the respective end.
		for item in self.prepended_items.iter().chain(&self.appended_items) {
			deleted.retain(|x| x != item);
		}
		for item in &self.prepended_items {
			appended.retain(|x| x != item);
		}
		for item in &self.appended_items {
			prepended.retain(|x| x != item);
		}

		let mut pre_op = ListOp::new();
		pre_op.set_prepended_items(self.prepended_items.clone());
		pre_op.apply_operations(&mut prepended, None);

		let mut app_op = ListOp::new();
		app_op.set_appended_items(self.appended_items.clone());
		app_op.apply_operations(&mut appended, None);

		let mut composed = ListOp::new();
		composed.set_deleted_items(deleted);
		composed.set_prepended_items(prepended);
		composed.set_appended_items(appended);
		Some(composed)
	}

	/// Merges `stronger`'s items of one operation kind into this (weaker)
	/// op, in place. Used when layering two layers' opinions for the same
	/// field: explicit replaces wholly; added/deleted union; prepended and
	/// appended splice onto their end; ordered adds then reorders.
	pub fn compose_operations(&mut self, stronger: &ListOp<T>, kind: ListOpKind) {
		match kind {
			ListOpKind::Explicit => {
				self.set_explicit_items(stronger.explicit_items.clone());
			}
			ListOpKind::Added | ListOpKind::Deleted => {
				let mut items = self.items(kind).to_vec();
				for item in stronger.items(kind) {
					if !items.contains(item) {
						items.push(item.clone());
					}
				}
				self.set_items(kind, items);
			}
			ListOpKind::Prepended => {
				let mut items = self.prepended_items.clone();
				let mut op = ListOp::new();
				op.set_prepended_items(stronger.prepended_items.clone());
				op.apply_operations(&mut items, None);
				self.set_prepended_items(items);
			}
			ListOpKind::Appended => {
				let mut items = self.appended_items.clone();
				let mut op = ListOp::new();
				op.set_appended_items(stronger.appended_items.clone());
				op.apply_operations(&mut items, None);
				self.set_appended_items(items);
			}
			ListOpKind::Ordered => {
				let mut items = self.ordered_items.clone();
				let mut op = ListOp::new();
				op.set_added_items(stronger.ordered_items.to_vec());
				op.apply_operations(&mut items, None);
				let mut reorder = ListOp::new();
				reorder.set_ordered_items(stronger.ordered_items.clone());
				reorder.apply_operations(&mut items, None);
				self.set_ordered_items(items);
			}
		}
	}

	/// Rewrites every item vector through `callback` (`None` deletes,
	/// a changed value replaces; duplicates introduced by remapping
	/// collapse). Returns true if anything changed.
	pub fn modify_operations(
		&mut self,
		mut callback: impl FnMut(&T) -> Option<T>,
	) -> bool {
		let mut changed = false;
		for kind in ListOpKind::ALL {
			let old = self.items(kind);
			let mut new = Vec::with_capacity(old.len());
			for item in old {
				if let Some(mapped) = callback(item)
					&& !new.contains(&mapped)
				{
					new.push(mapped);
				}
			}
			if new != *old {
				changed = true;
				// Write the vector directly; modification never flips the
				// explicit flag.
				match kind {
					ListOpKind::Explicit => self.explicit_items = new,
					ListOpKind::Added => self.added_items = new,
					ListOpKind::Prepended => self.prepended_items = new,
					ListOpKind::Appended => self.appended_items = new,
					ListOpKind::Deleted => self.deleted_items = new,
					ListOpKind::Ordered => self.ordered_items = new,
				}
			}
		}
		changed
	}

	/// Replaces the range `[index, index + count)` of one operation vector
	/// with `new_items`. An out-of-range index reports failure and leaves
	/// the op untouched.
	pub fn replace_operations(
		&mut self,
		kind: ListOpKind,
		index: usize,
		count: usize,
		new_items: Vec<T>,
	) -> Result<(), ListOpError> {
		let len = self.items(kind).len();
		let end = index.checked_add(count).filter(|&end| end <= len);
		let Some(end) = end else {
			return Err(ListOpError::InvalidRange {
				kind,
				index,
				count,
				len,
			});
		};
		let mut items = self.items(kind).to_vec();
		items.splice(index..end, new_items);
		self.set_items(kind, items);
		Ok(())
	}
}
