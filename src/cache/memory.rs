//! In-process [`ResponseCache`] for local development and tests.
//!
//! Expired entries are evicted when read and swept on every write.

// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	cache::{CacheFuture, ResponseCache},
};

#[derive(Clone, Debug)]
struct Entry {
	value: String,
	expires_at: Instant,
}

type EntryMap = Arc<RwLock<HashMap<String, Entry>>>;

/// TTL map kept in process memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryCache(EntryMap);
impl MemoryCache {
	/// Number of entries, including expired ones not yet swept.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns true when no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn get_now(map: &EntryMap, key: &str) -> Option<String> {
		let now = Instant::now();

		{
			let guard = map.read();

			match guard.get(key) {
				Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		map.write().remove(key);

		None
	}
}
impl ResponseCache for MemoryCache {
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
		Box::pin(async move { Ok(Self::get_now(&self.0, key)) })
	}

	fn set_ex<'a>(&'a self, key: &'a str, value: &'a str, ttl: Duration) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			let now = Instant::now();
			let entry = Entry { value: value.to_owned(), expires_at: now + ttl };
			let mut map = self.0.write();

			map.retain(|_, stored| stored.expires_at > now);
			map.insert(key.to_owned(), entry);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().remove(key);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn entries_expire_after_ttl() {
		let cache = MemoryCache::default();

		cache
			.set_ex("/api/raiderio/us/illidan/foo", "{}", Duration::from_secs(300))
			.await
			.expect("Memory writes should not fail.");

		assert_eq!(
			cache.get("/api/raiderio/us/illidan/foo").await.expect("Read should succeed."),
			Some("{}".to_owned())
		);

		tokio::time::advance(Duration::from_secs(301)).await;

		assert_eq!(
			cache.get("/api/raiderio/us/illidan/foo").await.expect("Read should succeed."),
			None
		);
		assert!(cache.is_empty(), "Expired entries should be evicted on read.");
	}

	#[tokio::test(start_paused = true)]
	async fn writes_sweep_expired_entries() {
		let cache = MemoryCache::default();

		for key in ["/api/battlenet/us/realms", "/api/battlenet/eu/realms"] {
			cache.set_ex(key, "{}", Duration::from_secs(60)).await.expect("Write should succeed.");
		}

		tokio::time::advance(Duration::from_secs(61)).await;
		cache
			.set_ex("/api/battlenet/kr/realms", "{}", Duration::from_secs(60))
			.await
			.expect("Write should succeed.");

		assert_eq!(cache.len(), 1, "Never-read expired keys should be swept on write.");
	}

	#[tokio::test]
	async fn delete_removes_entry() {
		let cache = MemoryCache::default();

		cache.set_ex("key", "value", Duration::from_secs(60)).await.expect("Write should succeed.");
		cache.delete("key").await.expect("Delete should succeed.");

		assert_eq!(cache.len(), 0);
	}
}
