//! Redis-backed [`ResponseCache`] over a multiplexed, self-reconnecting connection.

// crates.io
use redis::{Client, RedisError, aio::ConnectionManager};
// self
use crate::{
	_prelude::*,
	cache::{CacheError, CacheFuture, ResponseCache},
};

/// Response cache stored in Redis with `SETEX` expiry.
#[derive(Clone)]
pub struct RedisCache {
	conn: ConnectionManager,
}
impl RedisCache {
	/// Opens a managed connection to the store at `url`.
	pub async fn connect(url: &str) -> Result<Self, CacheError> {
		let client = Client::open(url)?;
		let conn = ConnectionManager::new(client).await?;

		Ok(Self { conn })
	}
}
impl Debug for RedisCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RedisCache").finish_non_exhaustive()
	}
}
impl ResponseCache for RedisCache {
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			let value = redis::cmd("GET")
				.arg(key)
				.query_async::<_, Option<String>>(&mut conn)
				.await?;

			Ok(value)
		})
	}

	fn set_ex<'a>(&'a self, key: &'a str, value: &'a str, ttl: Duration) -> CacheFuture<'a, ()> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			// Redis rejects a zero expiry.
			let secs = ttl.as_secs().max(1);

			redis::cmd("SETEX").arg(key).arg(secs).arg(value).query_async::<_, ()>(&mut conn).await?;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			redis::cmd("DEL").arg(key).query_async::<_, i64>(&mut conn).await?;

			Ok(())
		})
	}
}

impl From<RedisError> for CacheError {
	fn from(e: RedisError) -> Self {
		Self::Backend { message: e.to_string() }
	}
}
