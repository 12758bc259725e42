//! Continuously refilling token buckets with cooperative waiting and punitive drains.

// crates.io
use tokio::time::Instant;
// self
use crate::{_prelude::*, admission::Admission, obs, upstream::UpstreamKind};

/// Dimensions of a single token bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
	/// Maximum number of tokens (the burst).
	pub capacity: u32,
	/// Window over which `capacity` tokens are replenished.
	pub window_secs: u64,
	/// How long a drained bucket stays empty before refilling resumes.
	pub drain_secs: u64,
}
impl BucketSpec {
	/// Account upstream short-window ceiling: 100 calls per second.
	pub const PER_SECOND: Self = Self { capacity: 100, window_secs: 1, drain_secs: 60 };
	/// Account upstream long-window ceiling: 36,000 calls per hour.
	pub const PER_HOUR: Self = Self { capacity: 36_000, window_secs: 3_600, drain_secs: 3_600 };
	/// Leaderboard upstream ceiling: 300 calls per minute.
	pub const PER_MINUTE: Self = Self { capacity: 300, window_secs: 60, drain_secs: 60 };

	/// Penalty applied by [`TokenBucket::drain`].
	pub fn drain_penalty(&self) -> Duration {
		Duration::from_secs(self.drain_secs)
	}

	fn refill_per_sec(&self) -> f64 {
		f64::from(self.capacity.max(1)) / self.window_secs.max(1) as f64
	}
}

#[derive(Debug)]
struct BucketState {
	tokens: f64,
	// Refill accrues only after this instant; a drain moves it into the future.
	refill_from: Instant,
}
impl BucketState {
	fn refill(&mut self, spec: &BucketSpec, now: Instant) {
		if now <= self.refill_from {
			return;
		}

		let elapsed = now.duration_since(self.refill_from).as_secs_f64();

		self.tokens =
			(self.tokens + elapsed * spec.refill_per_sec()).min(f64::from(spec.capacity));
		self.refill_from = now;
	}

	fn wait_for_token(&self, spec: &BucketSpec, now: Instant) -> Duration {
		let blocked = self.refill_from.saturating_duration_since(now);
		let missing = (1.0 - self.tokens).max(0.0);

		blocked + Duration::from_secs_f64(missing / spec.refill_per_sec())
	}
}

/// Token bucket whose capacity refills continuously at `capacity / window`.
#[derive(Debug)]
pub struct TokenBucket {
	spec: BucketSpec,
	state: Mutex<BucketState>,
}
impl TokenBucket {
	/// Creates a full bucket.
	pub fn new(spec: BucketSpec) -> Self {
		let state = BucketState { tokens: f64::from(spec.capacity), refill_from: Instant::now() };

		Self { spec, state: Mutex::new(state) }
	}

	/// Bucket dimensions.
	pub fn spec(&self) -> &BucketSpec {
		&self.spec
	}

	/// Whole tokens currently available.
	pub fn available(&self) -> u32 {
		let mut state = self.state.lock();

		state.refill(&self.spec, Instant::now());

		state.tokens.max(0.0).floor() as u32
	}

	/// Consumes a token if one is available, otherwise reports the wait.
	pub fn try_admit(&self) -> Admission {
		let now = Instant::now();
		let mut state = self.state.lock();

		state.refill(&self.spec, now);

		if state.tokens >= 1.0 {
			state.tokens -= 1.0;

			Admission::Allowed
		} else {
			Admission::Denied { retry_after: state.wait_for_token(&self.spec, now) }
		}
	}

	/// Suspends until a token is consumed.
	///
	/// Fails with the required wait when admission cannot happen before `deadline`. Dropping the
	/// future cancels the wait without consuming a token.
	pub async fn acquire(&self, deadline: Instant) -> Result<(), Duration> {
		loop {
			let retry_after = match self.try_admit() {
				Admission::Allowed => return Ok(()),
				Admission::Denied { retry_after } => retry_after,
			};

			if Instant::now() + retry_after > deadline {
				return Err(retry_after);
			}

			tokio::time::sleep(retry_after).await;
		}
	}

	/// Empties the bucket and suspends refilling for the drain penalty.
	pub fn drain(&self) {
		let mut state = self.state.lock();

		state.tokens = 0.0;
		state.refill_from = Instant::now() + self.spec.drain_penalty();
	}
}

/// Ordered set of buckets that must all admit a call.
///
/// A call takes one token from every bucket or from none, so a denial by one ceiling never spends
/// another. List the long-window ceiling first.
#[derive(Debug)]
pub struct TokenBudget {
	upstream: UpstreamKind,
	buckets: Vec<TokenBucket>,
}
impl TokenBudget {
	/// Creates a budget for `upstream` from the provided bucket specs.
	pub fn new(upstream: UpstreamKind, specs: impl IntoIterator<Item = BucketSpec>) -> Self {
		Self { upstream, buckets: specs.into_iter().map(TokenBucket::new).collect() }
	}

	/// Buckets in admission order.
	pub fn buckets(&self) -> &[TokenBucket] {
		&self.buckets
	}

	/// Non-blocking check across every bucket.
	pub fn try_admit(&self) -> Admission {
		let admission = self.admit_all();

		if !admission.is_allowed() {
			obs::record_admission_denied(self.upstream);
		}

		admission
	}

	/// Waits until every bucket admits at once, bounded by `deadline`.
	pub async fn acquire(&self, deadline: Instant) -> Result<()> {
		loop {
			let retry_after = match self.admit_all() {
				Admission::Allowed => return Ok(()),
				Admission::Denied { retry_after } => retry_after,
			};

			if Instant::now() + retry_after > deadline {
				obs::record_admission_denied(self.upstream);
				tracing::warn!(
					upstream = self.upstream.as_str(),
					retry_after_ms = retry_after.as_millis() as u64,
					"Admission wait would exceed the call deadline."
				);

				return Err(Error::RateLimited { upstream: self.upstream, retry_after });
			}

			tokio::time::sleep(retry_after).await;
		}
	}

	// Locks are always taken in declaration order.
	fn admit_all(&self) -> Admission {
		let now = Instant::now();
		let mut states = self.buckets.iter().map(|bucket| bucket.state.lock()).collect::<Vec<_>>();
		let mut wait = None;

		for (bucket, state) in self.buckets.iter().zip(states.iter_mut()) {
			state.refill(&bucket.spec, now);

			if state.tokens < 1.0 {
				let bucket_wait = state.wait_for_token(&bucket.spec, now);

				wait = Some(wait.map_or(bucket_wait, |longest: Duration| longest.max(bucket_wait)));
			}
		}

		if let Some(retry_after) = wait {
			return Admission::Denied { retry_after };
		}

		for state in &mut states {
			state.tokens -= 1.0;
		}

		Admission::Allowed
	}

	/// Drains every bucket and returns the longest penalty applied.
	pub fn drain(&self) -> Duration {
		let mut longest = Duration::ZERO;

		for bucket in &self.buckets {
			bucket.drain();

			longest = longest.max(bucket.spec().drain_penalty());
		}

		tracing::info!(
			upstream = self.upstream.as_str(),
			penalty_secs = longest.as_secs(),
			"Drained the local token budget."
		);

		longest
	}
}
