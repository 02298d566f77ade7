use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Tracks a layer's dirty/clean state and brackets bulk edits.
///
/// Pluggable so hosts can hook dirtiness into undo stacks or defer
/// bookkeeping during bulk initial loads; the layer consults it rather
/// than keeping a dirty bit of its own.
pub trait StateDelegate: Send + Sync {
	/// A content mutation happened.
	fn mark_dirty(&self);

	/// The layer was saved or re-read; content matches its backing asset.
	fn mark_clean(&self);

	fn is_dirty(&self) -> bool;

	/// A bulk operation (initial load, content transfer) is starting;
	/// per-mutation bookkeeping may short-circuit until the matching
	/// [`end_bulk_edit`](StateDelegate::end_bulk_edit).
	fn begin_bulk_edit(&self) {}

	fn end_bulk_edit(&self) {}
}

/// The default delegate: one atomic dirty bit, bulk edits counted but
/// otherwise ignored.
#[derive(Default)]
pub struct SimpleStateDelegate {
	dirty: AtomicBool,
	bulk_depth: AtomicUsize,
}

impl SimpleStateDelegate {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StateDelegate for SimpleStateDelegate {
	fn mark_dirty(&self) {
		self.dirty.store(true, Ordering::Release);
	}

	fn mark_clean(&self) {
		self.dirty.store(false, Ordering::Release);
	}

	fn is_dirty(&self) -> bool {
		self.dirty.load(Ordering::Acquire)
	}

	fn begin_bulk_edit(&self) {
		self.bulk_depth.fetch_add(1, Ordering::AcqRel);
	}

	fn end_bulk_edit(&self) {
		self.bulk_depth.fetch_sub(1, Ordering::AcqRel);
	}
}
