//! Hourly points budget mirrored from the analytics upstream.
//!
//! The upstream charges a variable number of points per query and reports the running total in
//! every response. The budget records those totals after each call, refuses new calls once the
//! allowance is spent, and resets itself on an hourly timer owned by the budget instance.

// crates.io
use tokio::{runtime::Handle, task::JoinHandle, time::Instant};
// self
use crate::{
	_prelude::*,
	admission::Admission,
	error::ConfigError,
	obs,
	upstream::UpstreamKind,
};

/// Length of one budget window.
pub const RESET_PERIOD: Duration = Duration::from_secs(3_600);
/// Allowance assumed until the upstream reports its own.
pub const DEFAULT_POINTS_PER_HOUR: u32 = 3_600;

/// Rate-limit figures embedded in every analytics response.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitData {
	/// Points allowed per hour.
	pub limit_per_hour: u32,
	/// Points spent in the current window; fractional costs are common.
	pub points_spent_this_hour: f64,
	/// Seconds until the upstream resets its window.
	pub points_reset_in: u64,
}
impl Default for RateLimitData {
	fn default() -> Self {
		Self {
			limit_per_hour: DEFAULT_POINTS_PER_HOUR,
			points_spent_this_hour: 0.,
			points_reset_in: RESET_PERIOD.as_secs(),
		}
	}
}

/// Point-in-time view of a [`PointBudget`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointSnapshot {
	/// Points allowed per hour.
	pub limit_per_hour: u32,
	/// Points spent in the current window.
	pub points_spent: f64,
	/// Time until the next reset.
	pub reset_in: Duration,
}

#[derive(Debug)]
struct PointState {
	limit_per_hour: u32,
	points_spent: f64,
	reset_at: Instant,
}
impl PointState {
	fn reset(&mut self, now: Instant) {
		self.points_spent = 0.;
		self.reset_at = now + RESET_PERIOD;
	}

	fn is_exhausted(&self) -> bool {
		!(self.points_spent.ceil() < f64::from(self.limit_per_hour))
	}
}

/// Points budget that fails fast once the hourly allowance is spent.
#[derive(Debug)]
pub struct PointBudget {
	state: Arc<RwLock<PointState>>,
	ticker: Option<JoinHandle<()>>,
}
impl PointBudget {
	/// Creates a budget whose resets are driven by explicit [`tick`](Self::tick) calls.
	pub fn manual(initial: RateLimitData) -> Self {
		let state = PointState {
			limit_per_hour: initial.limit_per_hour,
			points_spent: initial.points_spent_this_hour.max(0.),
			reset_at: Instant::now() + Duration::from_secs(initial.points_reset_in),
		};

		Self { state: Arc::new(RwLock::new(state)), ticker: None }
	}

	/// Creates a budget and spawns its hourly reset task on the current tokio runtime.
	///
	/// The first reset fires after `initial.points_reset_in`; each reset re-arms the timer for a
	/// full [`RESET_PERIOD`]. The task is aborted when the budget is dropped.
	pub fn start(initial: RateLimitData) -> Result<Self, ConfigError> {
		let runtime = Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?;
		let mut budget = Self::manual(initial);

		budget.ticker = Some(runtime.spawn(run_resets(budget.state.clone())));

		Ok(budget)
	}

	/// Non-blocking admission check.
	pub fn try_admit(&self) -> Admission {
		let state = self.state.read();

		if state.is_exhausted() {
			Admission::Denied { retry_after: state.reset_at.saturating_duration_since(Instant::now()) }
		} else {
			Admission::Allowed
		}
	}

	/// Fails with [`Error::RateLimited`] when `ceil(points_spent) >= limit_per_hour`.
	pub fn check(&self) -> Result<()> {
		match self.try_admit() {
			Admission::Allowed => Ok(()),
			Admission::Denied { retry_after } => {
				obs::record_admission_denied(UpstreamKind::Analytics);

				Err(Error::RateLimited { upstream: UpstreamKind::Analytics, retry_after })
			},
		}
	}

	/// Records the totals reported by the upstream, clamping spend to the allowance.
	pub fn record(&self, data: &RateLimitData) {
		let mut state = self.state.write();

		state.limit_per_hour = data.limit_per_hour;
		state.points_spent = data.points_spent_this_hour.clamp(0., f64::from(data.limit_per_hour));

		tracing::info!(
			limit = state.limit_per_hour,
			spent = state.points_spent,
			"Recorded analytics point spend."
		);
	}

	/// Marks the whole allowance as spent and returns the time until the next reset.
	pub fn spend_all(&self) -> Duration {
		let mut state = self.state.write();

		state.points_spent = f64::from(state.limit_per_hour);

		state.reset_at.saturating_duration_since(Instant::now())
	}

	/// Resets spend to zero and restores a full window.
	pub fn tick(&self) {
		self.state.write().reset(Instant::now());

		tracing::debug!("Analytics point budget reset.");
	}

	/// Current limit, spend, and time to reset.
	pub fn snapshot(&self) -> PointSnapshot {
		let state = self.state.read();

		PointSnapshot {
			limit_per_hour: state.limit_per_hour,
			points_spent: state.points_spent,
			reset_in: state.reset_at.saturating_duration_since(Instant::now()),
		}
	}
}
impl Drop for PointBudget {
	fn drop(&mut self) {
		if let Some(ticker) = self.ticker.take() {
			ticker.abort();
		}
	}
}

async fn run_resets(state: Arc<RwLock<PointState>>) {
	loop {
		let reset_at = state.read().reset_at;

		tokio::time::sleep_until(reset_at).await;

		let now = Instant::now();
		let mut guard = state.write();

		// A manual tick may have pushed the deadline while this task slept.
		if now >= guard.reset_at {
			guard.reset(now);

			tracing::debug!("Analytics point budget reset by timer.");
		}
	}
}
