//! Analytics upstream: client-credentials GraphQL with an hourly points budget.
//!
//! Every query embeds the upstream's `rateLimitData`, and the client mirrors it into its
//! [`PointBudget`] after each success. The budget is checked before the service token is touched,
//! so an exhausted hour sends nothing upstream.

pub mod query;

pub use query::*;

// crates.io
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	admission::{PointBudget, PointSnapshot, RateLimitData},
	config::AnalyticsConfig,
	error::ConfigError,
	http::ReqwestHttpClient,
	oauth::ServiceTokenSource,
	obs::{self, CallOutcome, CallSpan},
	reference::ReferenceCache,
	upstream::{self, UpstreamKind},
};

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
	data: Option<T>,
	#[serde(default)]
	errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
	message: String,
}

/// Executor for the analytics upstream.
#[derive(Debug)]
pub struct AnalyticsClient {
	http: ReqwestHttpClient,
	endpoint: Url,
	tokens: ServiceTokenSource,
	budget: PointBudget,
	expansion: ReferenceCache<PartitionedExpansion>,
	timeout: Duration,
}
impl AnalyticsClient {
	/// Builds the client and starts its budget reset timer on the current runtime.
	pub fn new(config: &AnalyticsConfig, http: ReqwestHttpClient) -> Result<Self, ConfigError> {
		let budget = PointBudget::start(config.initial_budget)?;

		Self::with_budget(config, http, budget)
	}

	/// Builds the client around an existing budget.
	pub fn with_budget(
		config: &AnalyticsConfig,
		http: ReqwestHttpClient,
		budget: PointBudget,
	) -> Result<Self, ConfigError> {
		let tokens =
			ServiceTokenSource::new(UpstreamKind::Analytics, &config.credential()?, http.clone())?;

		Ok(Self {
			http,
			endpoint: config.endpoint()?,
			tokens,
			budget,
			expansion: ReferenceCache::new(),
			timeout: config.timeout(),
		})
	}

	/// Overrides the bound applied to each call.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Local points budget.
	pub fn budget(&self) -> &PointBudget {
		&self.budget
	}

	/// Current budget as mirrored locally.
	pub fn budget_snapshot(&self) -> PointSnapshot {
		self.budget.snapshot()
	}

	/// Runs `document` with `variables` and records the reported cost.
	pub async fn query<Q>(&self, document: &str, variables: Value) -> Result<Q>
	where
		Q: RatedQuery,
	{
		let span = CallSpan::new(UpstreamKind::Analytics, Q::OPERATION);

		obs::record_call_outcome(UpstreamKind::Analytics, CallOutcome::Attempt);

		let result = span
			.instrument(upstream::with_deadline(self.timeout, self.run::<Q>(document, variables)))
			.await;

		obs::record_call_outcome(UpstreamKind::Analytics, CallOutcome::of(&result));

		result
	}

	/// Fetches the budget from the upstream and records it.
	pub async fn rate_limit(&self) -> Result<RateLimitData> {
		let query: RateLimitQuery = self.query(RATE_LIMIT_DOCUMENT, Value::Null).await?;

		Ok(query.rate_limit_data)
	}

	/// Latest expansion with its zone partitions, fetched once and memoized.
	pub async fn expansion(&self) -> Result<Arc<PartitionedExpansion>> {
		self.expansion
			.get_or_fetch(|| async {
				let query: ExpansionEncountersQuery =
					self.query(EXPANSION_ENCOUNTERS_DOCUMENT, Value::Null).await?;

				PartitionedExpansion::latest(query.world_data).ok_or_else(|| Error::Upstream {
					upstream: UpstreamKind::Analytics,
					message: "The upstream reported no expansions".into(),
				})
			})
			.await
	}

	/// Default partition of `zone_id` in the memoized expansion, without fetching.
	pub async fn default_partition(&self, zone_id: i64) -> Option<i64> {
		self.expansion.peek().await?.default_partition(zone_id)
	}

	/// Zone rankings of a character.
	///
	/// The partition is the explicit one, else the zone's default, else `-1`.
	pub async fn character_parses(
		&self,
		request: &CharacterParsesRequest,
	) -> Result<CharacterParsesQuery> {
		let partition = match request.partition {
			Some(partition) => partition,
			None => self.default_partition(request.zone_id).await.unwrap_or(UNKNOWN_PARTITION),
		};

		self.query(CHARACTER_PARSES_DOCUMENT, request.variables(partition)).await
	}

	/// Drops the memoized expansion; the next reader refetches it.
	pub async fn clear_expansion(&self) {
		self.expansion.clear().await;

		tracing::info!(upstream = UpstreamKind::Analytics.as_str(), "Cleared expansion snapshot.");
	}

	/// Syncs the budget and loads the expansion snapshot.
	pub async fn prime(&self) -> Result<()> {
		self.rate_limit().await?;
		self.expansion().await?;

		Ok(())
	}

	async fn run<Q>(&self, document: &str, variables: Value) -> Result<Q>
	where
		Q: RatedQuery,
	{
		self.budget.check()?;

		let token = self.tokens.token().await?;
		let request = self
			.http
			.post(self.endpoint.clone())
			.header(AUTHORIZATION, token.authorization())
			.json(&serde_json::json!({ "query": document, "variables": variables }));
		let body = match upstream::execute(UpstreamKind::Analytics, Q::OPERATION, request, || {
			self.budget.spend_all()
		})
		.await
		{
			Err(err @ Error::UpstreamHttp { status: 401, .. }) => {
				self.tokens.invalidate().await;

				return Err(err);
			},
			result => result?,
		};
		let data = unwrap_envelope::<Q>(&body)?;

		self.budget.record(data.rate_limit());

		Ok(data)
	}
}

fn unwrap_envelope<Q>(body: &[u8]) -> Result<Q>
where
	Q: DeserializeOwned,
{
	let envelope: GraphQlResponse<Q> = upstream::decode(UpstreamKind::Analytics, "graphql", body)?;
	let message = envelope.errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ");

	match envelope.data {
		Some(data) => {
			if !message.is_empty() {
				tracing::warn!(
					upstream = UpstreamKind::Analytics.as_str(),
					errors = %message,
					"GraphQL response carried partial errors."
				);
			}

			Ok(data)
		},
		None => {
			let message =
				if message.is_empty() { "The response carried no data".to_owned() } else { message };

			tracing::error!(
				upstream = UpstreamKind::Analytics.as_str(),
				errors = %message,
				"GraphQL query failed."
			);

			Err(Error::Upstream { upstream: UpstreamKind::Analytics, message })
		},
	}
}
