//! Typed gateway configuration with defaults for every limit, timeout, and endpoint.
//!
//! The tree deserializes from any serde source. [`GatewayConfig::from_env`] fills the credential
//! fields from the process environment and keeps the defaults for everything else.

// self
use crate::{
	_prelude::*,
	admission::{BucketSpec, RateLimitData},
	auth::{TokenSecret, UpstreamCredential},
	error::ConfigError,
	upstream::{DEFAULT_TIMEOUT, TOKEN_VALIDATION_TIMEOUT},
};

/// Game-account client identifier.
pub const ENV_ACCOUNT_CLIENT_ID: &str = "BNET_CLIENT_ID";
/// Game-account client secret.
pub const ENV_ACCOUNT_CLIENT_SECRET: &str = "BNET_CLIENT_SECRET";
/// Redirect URL registered for the authorization-code flow.
pub const ENV_ACCOUNT_REDIRECT_URL: &str = "BNET_REDIRECT_URL";
/// Analytics client identifier.
pub const ENV_ANALYTICS_CLIENT_ID: &str = "WL_CLIENT_ID";
/// Analytics client secret.
pub const ENV_ANALYTICS_CLIENT_SECRET: &str = "WL_CLIENT_SECRET";
/// Response cache URL.
pub const ENV_CACHE_URL: &str = "REDIS_URL";

/// Root configuration for [`Gateway`](crate::gateway::Gateway).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
	/// Game-account upstream.
	pub account: AccountConfig,
	/// Analytics upstream.
	pub analytics: AnalyticsConfig,
	/// Leaderboard upstream.
	pub leaderboard: LeaderboardConfig,
	/// Response cache.
	pub cache: CacheConfig,
}
impl GatewayConfig {
	/// Loads credentials from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads credentials through `lookup`, failing on the first required variable it lacks.
	///
	/// `REDIS_URL` is optional; without it the cache stays disabled.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&'static str) -> Option<String>,
	{
		let require = |name: &'static str| {
			lookup(name).filter(|value| !value.is_empty()).ok_or(ConfigError::MissingEnv { name })
		};
		let mut config = Self::default();

		config.account.client_id = require(ENV_ACCOUNT_CLIENT_ID)?;
		config.account.client_secret = TokenSecret::new(require(ENV_ACCOUNT_CLIENT_SECRET)?);
		config.account.redirect_url = require(ENV_ACCOUNT_REDIRECT_URL)?;
		config.analytics.client_id = require(ENV_ANALYTICS_CLIENT_ID)?;
		config.analytics.client_secret = TokenSecret::new(require(ENV_ANALYTICS_CLIENT_SECRET)?);
		config.cache.url = lookup(ENV_CACHE_URL).filter(|value| !value.is_empty());

		Ok(config)
	}
}

/// Game-account upstream settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Redirect URL registered with the provider.
	pub redirect_url: String,
	/// OAuth host serving `/authorize`, `/token`, and the token introspection endpoints.
	pub oauth_base: String,
	/// API host template; `{region}` is replaced per call.
	pub api_base: String,
	/// Short-window bucket.
	pub per_second: BucketSpec,
	/// Long-window bucket.
	pub per_hour: BucketSpec,
	/// Bound on ordinary calls, in seconds.
	pub timeout_secs: u64,
	/// Bound on token validation calls, in seconds.
	pub validation_timeout_secs: u64,
}
impl AccountConfig {
	/// Client credential whose token endpoint is `{oauth_base}/token`.
	pub fn credential(&self) -> Result<UpstreamCredential, ConfigError> {
		let token_endpoint = join_endpoint("token", &self.oauth_base, "/token")?;

		Ok(UpstreamCredential::new(
			self.client_id.clone(),
			self.client_secret.expose(),
			token_endpoint,
		))
	}

	/// `{oauth_base}/authorize`.
	pub fn authorize_endpoint(&self) -> Result<Url, ConfigError> {
		join_endpoint("authorize", &self.oauth_base, "/authorize")
	}

	/// Parsed redirect URL.
	pub fn redirect(&self) -> Result<Url, ConfigError> {
		parse_endpoint("redirect", &self.redirect_url)
	}

	/// Bound on ordinary calls.
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}

	/// Bound on token validation calls.
	pub fn validation_timeout(&self) -> Duration {
		Duration::from_secs(self.validation_timeout_secs)
	}
}
impl Default for AccountConfig {
	fn default() -> Self {
		Self {
			client_id: String::new(),
			client_secret: TokenSecret::default(),
			redirect_url: String::new(),
			oauth_base: "https://oauth.battle.net".into(),
			api_base: "https://{region}.api.blizzard.com".into(),
			per_second: BucketSpec::PER_SECOND,
			per_hour: BucketSpec::PER_HOUR,
			timeout_secs: DEFAULT_TIMEOUT.as_secs(),
			validation_timeout_secs: TOKEN_VALIDATION_TIMEOUT.as_secs(),
		}
	}
}

/// Analytics upstream settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Client-credentials token endpoint.
	pub token_url: String,
	/// GraphQL endpoint.
	pub api_url: String,
	/// Budget assumed until the first response reports the real one.
	pub initial_budget: RateLimitData,
	/// Bound on each call, in seconds.
	pub timeout_secs: u64,
}
impl AnalyticsConfig {
	/// Client credential for the token endpoint.
	pub fn credential(&self) -> Result<UpstreamCredential, ConfigError> {
		Ok(UpstreamCredential::new(
			self.client_id.clone(),
			self.client_secret.expose(),
			parse_endpoint("token", &self.token_url)?,
		))
	}

	/// Parsed GraphQL endpoint.
	pub fn endpoint(&self) -> Result<Url, ConfigError> {
		parse_endpoint("graphql", &self.api_url)
	}

	/// Bound on each call.
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}
impl Default for AnalyticsConfig {
	fn default() -> Self {
		Self {
			client_id: String::new(),
			client_secret: TokenSecret::default(),
			token_url: "https://www.warcraftlogs.com/oauth/token".into(),
			api_url: "https://www.warcraftlogs.com/api/v2/client".into(),
			initial_budget: RateLimitData::default(),
			timeout_secs: DEFAULT_TIMEOUT.as_secs(),
		}
	}
}

/// Leaderboard upstream settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
	/// API host.
	pub base_url: String,
	/// Request bucket.
	pub per_minute: BucketSpec,
	/// Bound on each call, in seconds.
	pub timeout_secs: u64,
}
impl LeaderboardConfig {
	/// `{base_url}/api/v1/characters/profile`.
	pub fn profile_endpoint(&self) -> Result<Url, ConfigError> {
		join_endpoint("profile", &self.base_url, "/api/v1/characters/profile")
	}

	/// Bound on each call.
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}
impl Default for LeaderboardConfig {
	fn default() -> Self {
		Self {
			base_url: "https://raider.io".into(),
			per_minute: BucketSpec::PER_MINUTE,
			timeout_secs: DEFAULT_TIMEOUT.as_secs(),
		}
	}
}

/// Response cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Store URL; `None` disables caching.
	pub url: Option<String>,
	/// Bound on each read, in seconds.
	pub read_timeout_secs: u64,
	/// Bound on each background write, in seconds.
	pub write_timeout_secs: u64,
}
impl CacheConfig {
	/// Bound on each read.
	pub fn read_timeout(&self) -> Duration {
		Duration::from_secs(self.read_timeout_secs)
	}

	/// Bound on each background write.
	pub fn write_timeout(&self) -> Duration {
		Duration::from_secs(self.write_timeout_secs)
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			url: None,
			read_timeout_secs: crate::cache::DEFAULT_READ_TIMEOUT.as_secs(),
			write_timeout_secs: crate::cache::DEFAULT_WRITE_TIMEOUT.as_secs(),
		}
	}
}

pub(crate) fn parse_endpoint(endpoint: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { endpoint, source })
}

fn join_endpoint(endpoint: &'static str, base: &str, path: &str) -> Result<Url, ConfigError> {
	parse_endpoint(endpoint, &format!("{}{path}", base.trim_end_matches('/')))
}
