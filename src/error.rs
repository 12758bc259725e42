//! Gateway-level error types shared across admission, executors, and the cache layer.

// self
use crate::{_prelude::*, upstream::UpstreamKind};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Caller input failed validation before any network call.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// User token or client credential problem.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Local admission budget is exhausted or was drained after an upstream throttle.
	#[error("The {upstream} rate budget is exhausted; retry in {}s.", retry_after.as_secs())]
	RateLimited {
		/// Upstream whose budget denied the call.
		upstream: UpstreamKind,
		/// Time until the budget is expected to admit again.
		retry_after: Duration,
	},
	/// Upstream answered with a non-success HTTP status.
	#[error("The {upstream} upstream returned an unexpected status {status}.")]
	UpstreamHttp {
		/// Upstream that produced the response.
		upstream: UpstreamKind,
		/// HTTP status code.
		status: u16,
		/// Truncated response body kept for diagnostics.
		body: String,
	},
	/// Upstream answered successfully at the HTTP level but reported a protocol failure.
	#[error("The {upstream} upstream reported a failure: {message}.")]
	Upstream {
		/// Upstream that produced the response.
		upstream: UpstreamKind,
		/// Upstream-supplied message.
		message: String,
	},
	/// Upstream payload could not be decoded.
	#[error("The {upstream} upstream returned a malformed payload.")]
	Decode {
		/// Upstream that produced the payload.
		upstream: UpstreamKind,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Gateway response could not be serialized.
	#[error("Failed to encode the gateway response.")]
	Encode(#[from] serde_json::Error),
}
impl Error {
	/// HTTP status the inbound surface should answer with for this failure.
	pub fn status_code(&self) -> u16 {
		match self {
			Error::Validation(_) => 400,
			Error::Auth(err) => err.status_code(),
			Error::RateLimited { .. } => 503,
			Error::Config(_)
			| Error::Transport(_)
			| Error::UpstreamHttp { .. }
			| Error::Upstream { .. }
			| Error::Decode { .. }
			| Error::Encode(_) => 500,
		}
	}

	/// Retry hint carried by [`Error::RateLimited`].
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Error::RateLimited { retry_after, .. } => Some(*retry_after),
			_ => None,
		}
	}

	/// Returns true when the upstream answered 404.
	pub fn is_not_found(&self) -> bool {
		matches!(self, Error::UpstreamHttp { status: 404, .. })
	}
}

/// Input validation failures raised before any upstream is contacted.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// Region is not one of the supported regions.
	#[error("Region `{region}` is not supported.")]
	UnsupportedRegion {
		/// Raw region input.
		region: String,
	},
	/// Required field was empty.
	#[error("The {field} must not be empty.")]
	Empty {
		/// Field label.
		field: &'static str,
	},
	/// Character name length is outside the accepted range.
	#[error("Character names must be between 2 and 12 characters, got {len}.")]
	CharacterNameLength {
		/// Observed character count.
		len: usize,
	},
}

/// Authentication and authorization failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthError {
	/// User token is empty or expired.
	#[error("The provided token is invalid.")]
	TokenInvalid,
	/// Token lacks a scope the gateway requires.
	#[error("The token is missing the required scope `{scope}`.")]
	MissingScope {
		/// Missing scope string.
		scope: String,
	},
	/// Provider rejected the grant (e.g., bad or reused code).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// OAuth callback state does not match the state issued for the session.
	#[error("Callback state does not match the issued state.")]
	StateMismatch,
}
impl AuthError {
	fn status_code(&self) -> u16 {
		match self {
			AuthError::TokenInvalid | AuthError::InvalidClient { .. } => 401,
			AuthError::MissingScope { .. }
			| AuthError::InvalidGrant { .. }
			| AuthError::StateMismatch => 400,
		}
	}
}

/// Configuration failures raised while building clients.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Endpoint URL cannot be parsed.
	#[error("Endpoint `{endpoint}` is not a valid URL.")]
	InvalidEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Required environment variable is not set.
	#[error("Environment variable `{name}` is not set.")]
	MissingEnv {
		/// Variable name.
		name: &'static str,
	},
	/// A background task was requested outside of a tokio runtime.
	#[error("A tokio runtime is required to start background tasks.")]
	MissingRuntime,
	/// Token endpoint returned an `expires_in` outside the supported range.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, deadline).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the upstream.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Call did not finish before its deadline.
	#[error("Upstream call timed out after {}ms.", after.as_millis())]
	Timeout {
		/// Deadline that elapsed.
		after: Duration,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the upstream.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
