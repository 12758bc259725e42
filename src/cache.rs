//! Response cache contracts, key and TTL conventions, and the fail-open [`CacheGateway`].

pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use memory::MemoryCache;
#[cfg(feature = "redis")] pub use self::redis::RedisCache;

// crates.io
use tokio::runtime::Handle;
// self
use crate::{
	_prelude::*,
	obs,
	params::{CharacterRef, Region},
};

/// Boxed future returned by [`ResponseCache`] backends.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Key/value store holding serialized gateway responses.
pub trait ResponseCache
where
	Self: Send + Sync,
{
	/// Fetches the value stored under `key`, if present and not expired.
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>>;

	/// Stores `value` under `key` for `ttl`.
	fn set_ex<'a>(&'a self, key: &'a str, value: &'a str, ttl: Duration) -> CacheFuture<'a, ()>;

	/// Removes `key`.
	fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}

/// Error type produced by [`ResponseCache`] backends.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CacheError {
	/// Backend-level failure for the storage engine.
	#[error("Cache backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Expiry applied to each class of cached response.
#[derive(Clone, Copy, Debug)]
pub struct CacheTtl;
impl CacheTtl {
	/// Character-level data that changes during play.
	pub const LIVE: Duration = Duration::from_secs(5 * 60);
	/// Reference data such as realms and partitions.
	pub const REFERENCE: Duration = Duration::from_secs(12 * 60 * 60);
}

/// Cache key layout, mirroring the inbound route of each response.
#[derive(Clone, Copy, Debug)]
pub struct CacheKey;
impl CacheKey {
	/// Key of the current expansion's partition snapshot.
	pub const PARTITIONS: &'static str = "/api/warcraftlogs/partitions";

	/// Leaderboard profile of a character.
	pub fn leaderboard_profile(character: &CharacterRef) -> String {
		format!("/api/raiderio/{}/{}/{}", character.region, character.realm, character.name)
	}

	/// One account resource of a character.
	pub fn account_resource(character: &CharacterRef, resource: &str) -> String {
		format!(
			"/api/battlenet/{}/{}/{}/{resource}",
			character.region, character.realm, character.name
		)
	}

	/// Realm index of a region.
	pub fn realms(region: Region) -> String {
		format!("/api/battlenet/{region}/realms")
	}

	/// Ranked parses of a character for a zone and optional partition.
	pub fn character_parses(
		character: &CharacterRef,
		zone_id: i64,
		partition: Option<i64>,
	) -> String {
		let mut key = format!(
			"/api/warcraftlogs/{}/{}/{}/parses?zone_id={zone_id}",
			character.region, character.realm, character.name
		);

		if let Some(partition) = partition {
			key.push_str(&format!("&partition={partition}"));
		}

		key
	}
}

/// Default bound on a single background cache write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default bound on a single cache read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Fail-open front for an optional [`ResponseCache`].
///
/// Reads never fail: backend errors and reads slower than the read timeout are logged and
/// reported as misses. Writes and deletes run on spawned tasks so callers never wait on the store.
#[derive(Clone)]
pub struct CacheGateway {
	backend: Option<Arc<dyn ResponseCache>>,
	read_timeout: Duration,
	write_timeout: Duration,
}
impl CacheGateway {
	/// Wraps a backend.
	pub fn new(backend: Arc<dyn ResponseCache>) -> Self {
		Self {
			backend: Some(backend),
			read_timeout: DEFAULT_READ_TIMEOUT,
			write_timeout: DEFAULT_WRITE_TIMEOUT,
		}
	}

	/// Gateway that always misses and drops writes.
	pub fn disabled() -> Self {
		Self {
			backend: None,
			read_timeout: DEFAULT_READ_TIMEOUT,
			write_timeout: DEFAULT_WRITE_TIMEOUT,
		}
	}

	/// Connects to a Redis store, falling back to [`disabled`](Self::disabled) when it is
	/// unreachable.
	#[cfg(feature = "redis")]
	pub async fn connect(url: &str) -> Self {
		match tokio::time::timeout(DEFAULT_WRITE_TIMEOUT, RedisCache::connect(url)).await {
			Ok(Ok(cache)) => {
				tracing::info!("Connected to the response cache.");

				Self::new(Arc::new(cache))
			},
			Ok(Err(err)) => {
				tracing::error!(error = %err, "Response cache is unavailable; caching disabled.");

				Self::disabled()
			},
			Err(_) => {
				tracing::error!("Timed out connecting to the response cache; caching disabled.");

				Self::disabled()
			},
		}
	}

	/// Overrides the bound applied to reads.
	pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
		self.read_timeout = timeout;

		self
	}

	/// Overrides the bound applied to background writes.
	pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
		self.write_timeout = timeout;

		self
	}

	/// Returns true when a backend is attached.
	pub fn is_enabled(&self) -> bool {
		self.backend.is_some()
	}

	/// Looks up `key`, treating every failure as a miss.
	pub async fn get(&self, key: &str) -> Option<String> {
		let backend = self.backend.as_ref()?;
		let value = match tokio::time::timeout(self.read_timeout, backend.get(key)).await {
			Ok(Ok(value)) => value,
			Ok(Err(err)) => {
				tracing::error!(key = %key, error = %err, "Cache read failed.");

				None
			},
			Err(_) => {
				tracing::error!(key = %key, "Cache read timed out.");

				None
			},
		};

		if value.is_some() {
			tracing::debug!(key = %key, "Cache HIT.");
		} else {
			tracing::debug!(key = %key, "Cache MISS.");
		}

		obs::record_cache_lookup(value.is_some());

		value
	}

	/// Stores `value` under `key` in the background.
	pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
		let Some(backend) = self.backend.clone() else { return };
		let (key, value) = (key.into(), value.into());
		let timeout = self.write_timeout;
		let Some(runtime) = current_runtime(&key) else { return };

		runtime.spawn(async move {
			match tokio::time::timeout(timeout, backend.set_ex(&key, &value, ttl)).await {
				Ok(Ok(())) => tracing::debug!(key = %key, "Cache SET."),
				Ok(Err(err)) => tracing::error!(key = %key, error = %err, "Cache write failed."),
				Err(_) => tracing::error!(key = %key, "Cache write timed out."),
			}
		});
	}

	/// Removes `key` in the background.
	pub fn delete(&self, key: impl Into<String>) {
		let Some(backend) = self.backend.clone() else { return };
		let key = key.into();
		let timeout = self.write_timeout;
		let Some(runtime) = current_runtime(&key) else { return };

		runtime.spawn(async move {
			match tokio::time::timeout(timeout, backend.delete(&key)).await {
				Ok(Ok(())) => tracing::debug!(key = %key, "Cache DEL."),
				Ok(Err(err)) => tracing::error!(key = %key, error = %err, "Cache delete failed."),
				Err(_) => tracing::error!(key = %key, "Cache delete timed out."),
			}
		});
	}

	/// Returns the cached value for `key` or runs `fetch` and caches its output for `ttl`.
	pub async fn read_through<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<String>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<String>>,
	{
		if let Some(hit) = self.get(key).await {
			return Ok(hit);
		}

		let body = fetch().await?;

		self.set(key, body.clone(), ttl);

		Ok(body)
	}
}
impl Debug for CacheGateway {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheGateway")
			.field("enabled", &self.is_enabled())
			.field("read_timeout", &self.read_timeout)
			.field("write_timeout", &self.write_timeout)
			.finish()
	}
}

fn current_runtime(key: &str) -> Option<Handle> {
	match Handle::try_current() {
		Ok(runtime) => Some(runtime),
		Err(_) => {
			tracing::error!(key = %key, "No runtime available for a cache write; dropped.");

			None
		},
	}
}
