//! Upstream request executors and the response classification they share.
//!
//! Every executor follows the same shape: admission first, then a bounded call, then status
//! classification. A `429` drains the caller's local budget and surfaces
//! [`Error::RateLimited`]; other non-success statuses surface [`Error::UpstreamHttp`] with a
//! truncated body. Nothing is retried here.

pub mod account;
pub mod analytics;
pub mod leaderboard;

pub use account::AccountClient;
pub use analytics::AnalyticsClient;
pub use leaderboard::LeaderboardClient;

// crates.io
use reqwest::{RequestBuilder, StatusCode, header::ACCEPT};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
	http::parse_retry_after,
};

/// Default bound applied to every upstream call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound applied to token validation calls.
pub const TOKEN_VALIDATION_TIMEOUT: Duration = Duration::from_secs(30);

const BODY_PREVIEW_LIMIT: usize = 256;

/// Upstream services fronted by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamKind {
	/// OAuth2 game-account API.
	Account,
	/// GraphQL combat-log analytics API.
	Analytics,
	/// REST leaderboard API.
	Leaderboard,
}
impl UpstreamKind {
	/// Returns a stable label suitable for span, metric, or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			UpstreamKind::Account => "account",
			UpstreamKind::Analytics => "analytics",
			UpstreamKind::Leaderboard => "leaderboard",
		}
	}
}
impl Display for UpstreamKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// How an endpoint treats an upstream 404.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotFoundPolicy {
	/// 404 is a failure like any other non-success status.
	Error,
	/// 404 means the resource is legitimately absent.
	Absent,
}

/// Result of an endpoint whose 404 is an expected outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetched<T> {
	/// Upstream returned the resource.
	Found(T),
	/// Upstream reported the resource as not present.
	NotFound,
}
impl<T> Fetched<T> {
	/// Returns true for [`Fetched::Found`].
	pub fn is_found(&self) -> bool {
		matches!(self, Fetched::Found(_))
	}

	/// Converts into an [`Option`].
	pub fn into_option(self) -> Option<T> {
		match self {
			Fetched::Found(value) => Some(value),
			Fetched::NotFound => None,
		}
	}

	/// Maps the found value.
	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
		match self {
			Fetched::Found(value) => Fetched::Found(f(value)),
			Fetched::NotFound => Fetched::NotFound,
		}
	}

	/// Applies `policy` to an executor result.
	pub fn from_result(policy: NotFoundPolicy, result: Result<T>) -> Result<Self> {
		match result {
			Ok(value) => Ok(Fetched::Found(value)),
			Err(err) if policy == NotFoundPolicy::Absent && err.is_not_found() =>
				Ok(Fetched::NotFound),
			Err(err) => Err(err),
		}
	}
}

/// Bounds `fut` by `timeout`, surfacing [`TransportError::Timeout`] when it elapses.
pub(crate) async fn with_deadline<T, Fut>(timeout: Duration, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	match tokio::time::timeout(timeout, fut).await {
		Ok(result) => result,
		Err(_) => Err(TransportError::Timeout { after: timeout }.into()),
	}
}

/// Sends `request` and classifies the response.
///
/// `on_throttle` runs on a `429`; it must drain the local budget and return the drain penalty,
/// which becomes the retry hint unless the upstream supplied a longer `Retry-After`.
pub(crate) async fn execute(
	upstream: UpstreamKind,
	endpoint: &str,
	request: RequestBuilder,
	on_throttle: impl FnOnce() -> Duration,
) -> Result<Vec<u8>> {
	let response = request
		.header(ACCEPT, "application/json")
		.send()
		.await
		.map_err(|err| map_reqwest_error(upstream, endpoint, err))?;
	let status = response.status();

	if status == StatusCode::TOO_MANY_REQUESTS {
		let hinted = parse_retry_after(response.headers());
		let penalty = on_throttle();
		let retry_after = hinted.map_or(penalty, |hint| hint.max(penalty));

		tracing::warn!(
			upstream = upstream.as_str(),
			endpoint,
			retry_after_secs = retry_after.as_secs(),
			"Upstream throttled the gateway; drained the local budget."
		);

		return Err(Error::RateLimited { upstream, retry_after });
	}

	let body = response.bytes().await.map_err(|err| map_reqwest_error(upstream, endpoint, err))?;

	classify_status(upstream, endpoint, status.as_u16(), &body)?;

	Ok(body.to_vec())
}

/// Maps a non-success status to [`Error::UpstreamHttp`], logging 404 at a lower severity.
pub(crate) fn classify_status(
	upstream: UpstreamKind,
	endpoint: &str,
	status: u16,
	body: &[u8],
) -> Result<()> {
	if (200..300).contains(&status) {
		return Ok(());
	}

	let body = body_preview(body);

	if status == 404 {
		tracing::warn!(
			upstream = upstream.as_str(),
			endpoint,
			status,
			body = %body,
			"Upstream returned 404."
		);
	} else {
		tracing::error!(
			upstream = upstream.as_str(),
			endpoint,
			status,
			body = %body,
			"Upstream returned a non-success status."
		);
	}

	Err(Error::UpstreamHttp { upstream, status, body })
}

/// Decodes a JSON payload, keeping the failing path for diagnostics.
pub(crate) fn decode<T>(upstream: UpstreamKind, endpoint: &str, body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
		tracing::error!(
			upstream = upstream.as_str(),
			endpoint,
			path = %source.path(),
			"Failed to decode upstream payload."
		);

		Error::Decode { upstream, source }
	})
}

fn map_reqwest_error(upstream: UpstreamKind, endpoint: &str, err: ReqwestError) -> Error {
	tracing::error!(
		upstream = upstream.as_str(),
		endpoint,
		error = %err,
		"Upstream request failed."
	);

	if err.is_builder() {
		return ConfigError::from(err).into();
	}

	TransportError::from(err).into()
}

fn body_preview(body: &[u8]) -> String {
	String::from_utf8_lossy(body).chars().take(BODY_PREVIEW_LIMIT).collect()
}
