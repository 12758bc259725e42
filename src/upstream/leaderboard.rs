//! Leaderboard upstream: unauthenticated REST with a per-minute bucket.

// crates.io
use serde_json::Value;
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	admission::TokenBudget,
	config::LeaderboardConfig,
	error::ConfigError,
	http::ReqwestHttpClient,
	obs::{self, CallOutcome, CallSpan},
	params::CharacterRef,
	upstream::{self, UpstreamKind},
};

/// Profile sections requested with every character lookup.
pub const PROFILE_FIELDS: &str = "mythic_plus_ranks,mythic_plus_recent_runs,mythic_plus_best_runs,mythic_plus_scores_by_season:current";

const PROFILE_ENDPOINT: &str = "character_profile";

/// Executor for the leaderboard upstream.
#[derive(Debug)]
pub struct LeaderboardClient {
	http: ReqwestHttpClient,
	endpoint: Url,
	budget: TokenBudget,
	timeout: Duration,
}
impl LeaderboardClient {
	/// Builds the client from its configuration section.
	pub fn new(config: &LeaderboardConfig, http: ReqwestHttpClient) -> Result<Self, ConfigError> {
		Ok(Self {
			http,
			endpoint: config.profile_endpoint()?,
			budget: TokenBudget::new(UpstreamKind::Leaderboard, [config.per_minute]),
			timeout: config.timeout(),
		})
	}

	/// Overrides the bound applied to each call.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Local admission budget.
	pub fn budget(&self) -> &TokenBudget {
		&self.budget
	}

	/// Mythic-plus profile of a character.
	pub async fn character_profile(&self, character: &CharacterRef) -> Result<Value> {
		let span = CallSpan::new(UpstreamKind::Leaderboard, PROFILE_ENDPOINT);

		obs::record_call_outcome(UpstreamKind::Leaderboard, CallOutcome::Attempt);

		let result = span
			.instrument(upstream::with_deadline(self.timeout, async {
				self.budget.acquire(Instant::now() + self.timeout).await?;

				let request = self.http.get(self.endpoint.clone()).query(&[
					("region", character.region.as_str()),
					("realm", character.realm.as_str()),
					("name", character.name.as_str()),
					("fields", PROFILE_FIELDS),
				]);
				let body = upstream::execute(
					UpstreamKind::Leaderboard,
					PROFILE_ENDPOINT,
					request,
					|| self.budget.drain(),
				)
				.await?;

				upstream::decode(UpstreamKind::Leaderboard, PROFILE_ENDPOINT, &body)
			}))
			.await;

		obs::record_call_outcome(UpstreamKind::Leaderboard, CallOutcome::of(&result));

		result
	}
}
