//! Upstream credentials plus the user and service token models.

pub mod secret;

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

/// Window before expiry during which a token is already treated as stale.
const EXPIRY_SKEW: Duration = Duration::from_secs(10);
/// Service tokens are refreshed this long before they expire.
const SERVICE_REFRESH_WINDOW: Duration = Duration::from_secs(60);

/// Process-wide client credential for one upstream, loaded once and shared read-only.
#[derive(Clone, Debug)]
pub struct UpstreamCredential {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Token endpoint used for client-credentials and code exchanges.
	pub token_endpoint: Url,
}
impl UpstreamCredential {
	/// Creates a credential for the provided token endpoint.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		token_endpoint: Url,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			token_endpoint,
		}
	}
}

/// End-user token obtained through the authorization-code flow.
///
/// The token belongs to the calling session and is never cached by the gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserToken {
	/// Bearer secret.
	pub access_token: TokenSecret,
	/// Token type reported by the provider (normally `bearer`).
	pub token_type: String,
	/// Absolute expiry, when the provider reported one.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub expiry: Option<OffsetDateTime>,
	/// Scopes granted to the token.
	#[serde(default)]
	pub scopes: ScopeSet,
}
impl UserToken {
	/// Creates a bearer token without expiry or scopes.
	pub fn bearer(access_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			token_type: "bearer".into(),
			expiry: None,
			scopes: ScopeSet::default(),
		}
	}

	/// Sets the absolute expiry.
	pub fn with_expiry(mut self, expiry: OffsetDateTime) -> Self {
		self.expiry = Some(expiry);

		self
	}

	/// Sets the granted scopes.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Returns true when the token is non-empty and not expired at `now`.
	pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
		if self.access_token.is_empty() {
			return false;
		}

		match self.expiry {
			Some(expiry) => now + EXPIRY_SKEW < expiry,
			None => true,
		}
	}

	/// Same as [`is_valid_at`](Self::is_valid_at) using the current UTC instant.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Value for the `Authorization` header.
	pub fn authorization(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}
}

/// Cached client-credentials token for an upstream.
#[derive(Clone, Debug)]
pub struct ServiceToken {
	/// Bearer secret.
	pub access_token: TokenSecret,
	/// Absolute expiry; `None` means the provider did not report a lifetime.
	pub expires_at: Option<OffsetDateTime>,
}
impl ServiceToken {
	/// Returns true when the token can still be used at `now`.
	pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
		match self.expires_at {
			Some(expires_at) => now + SERVICE_REFRESH_WINDOW < expires_at,
			None => true,
		}
	}

	/// Value for the `Authorization` header.
	pub fn authorization(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}
}
