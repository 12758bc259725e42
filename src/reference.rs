//! Process-wide memo for slowly changing reference data.

// self
use crate::_prelude::*;

/// Lazily populated snapshot guarded by a single async lock.
///
/// The lock is held across the presence check and the fetch, so concurrent first callers share
/// one upstream request and never observe a partially written snapshot. [`clear`](Self::clear)
/// takes the same lock and only resets the slot; the next reader refetches.
#[derive(Debug)]
pub struct ReferenceCache<T> {
	slot: AsyncMutex<Option<Arc<T>>>,
}
impl<T> ReferenceCache<T> {
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self { slot: AsyncMutex::new(None) }
	}

	/// Returns the snapshot, running `fetch` only when the slot is empty.
	///
	/// A failed fetch leaves the slot empty and is returned to the caller.
	pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Arc<T>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut slot = self.slot.lock().await;

		if let Some(snapshot) = slot.as_ref() {
			return Ok(snapshot.clone());
		}

		let snapshot = Arc::new(fetch().await?);

		*slot = Some(snapshot.clone());

		Ok(snapshot)
	}

	/// Current snapshot without fetching.
	pub async fn peek(&self) -> Option<Arc<T>> {
		self.slot.lock().await.clone()
	}

	/// Resets the slot to empty.
	pub async fn clear(&self) {
		self.slot.lock().await.take();
	}
}
impl<T> Default for ReferenceCache<T> {
	fn default() -> Self {
		Self::new()
	}
}
