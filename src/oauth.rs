//! OAuth2 facades over the `oauth2` crate for the two credentialed upstreams.
//!
//! [`AuthorizationCodeFacade`] drives the end-user flow for the game-account upstream and
//! [`ServiceTokenSource`] holds the process-wide client-credentials token for an upstream,
//! refreshing it on demand behind a singleflight lock. Token endpoint failures are folded into the
//! gateway [`Error`] taxonomy here so executors never see `oauth2` error types.

pub use oauth2;

// crates.io
use oauth2::{
	AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
	HttpClientError, RedirectUrl, RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponseType, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{REQUIRED_SCOPES, ScopeSet, ServiceToken, TokenSecret, UpstreamCredential, UserToken},
	error::{AuthError, ConfigError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	upstream::UpstreamKind,
};

/// Retry hint used when a token endpoint throttles without a `Retry-After` header.
pub const TOKEN_THROTTLE_BACKOFF: Duration = Duration::from_secs(60);

type CodeClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type CredentialsClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Authorization-code flow against the game-account provider.
pub struct AuthorizationCodeFacade {
	client: CodeClient,
	http: ReqwestHttpClient,
}
impl AuthorizationCodeFacade {
	/// Builds the facade from the provider credential, authorize endpoint, and redirect URL.
	pub fn new(
		credential: &UpstreamCredential,
		authorize_endpoint: &Url,
		redirect_url: &Url,
		http: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let auth_url = AuthUrl::new(authorize_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "authorize", source })?;
		let redirect_url = RedirectUrl::new(redirect_url.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "redirect", source })?;
		let client = BasicClient::new(ClientId::new(credential.client_id.clone()))
			.set_client_secret(ClientSecret::new(credential.client_secret.expose().to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url(credential)?)
			.set_redirect_uri(redirect_url);

		Ok(Self { client, http })
	}

	/// Authorization URL requesting the profile scopes, bound to `state`.
	pub fn authorize_url(&self, state: &str) -> Url {
		let state = state.to_owned();
		let (url, _) = self
			.client
			.authorize_url(move || CsrfToken::new(state))
			.add_scopes(REQUIRED_SCOPES.iter().map(|scope| Scope::new((*scope).to_owned())))
			.url();

		url
	}

	/// Exchanges an authorization code for a user token.
	pub async fn exchange_code(&self, code: &str) -> Result<UserToken> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http.instrumented(meta.clone());
		let response = self
			.client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(UpstreamKind::Account, meta.take(), err))?;
		let scopes = match response.scopes() {
			Some(scopes) => ScopeSet::new(scopes.iter().map(|scope| scope.as_str().to_owned()))
				.map_err(|err| Error::Upstream {
					upstream: UpstreamKind::Account,
					message: err.to_string(),
				})?,
			None => ScopeSet::default(),
		};
		let mut token = UserToken {
			access_token: TokenSecret::new(response.access_token().secret().to_owned()),
			token_type: AsRef::<str>::as_ref(response.token_type()).to_owned(),
			expiry: None,
			scopes,
		};

		if let Some(expiry) = expiry_from(&response)? {
			token = token.with_expiry(expiry);
		}

		tracing::info!(upstream = UpstreamKind::Account.as_str(), "Exchanged authorization code.");

		Ok(token)
	}
}
impl Debug for AuthorizationCodeFacade {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationCodeFacade").finish_non_exhaustive()
	}
}

/// Singleflight client-credentials token holder for one upstream.
///
/// Concurrent callers that find the cached token stale wait on the same lock, so at most one
/// token request is in flight per upstream.
pub struct ServiceTokenSource {
	upstream: UpstreamKind,
	client: CredentialsClient,
	http: ReqwestHttpClient,
	cached: AsyncMutex<Option<ServiceToken>>,
}
impl ServiceTokenSource {
	/// Builds a token source for `upstream` from its process-wide credential.
	pub fn new(
		upstream: UpstreamKind,
		credential: &UpstreamCredential,
		http: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let client = BasicClient::new(ClientId::new(credential.client_id.clone()))
			.set_client_secret(ClientSecret::new(credential.client_secret.expose().to_owned()))
			.set_token_uri(token_url(credential)?);

		Ok(Self { upstream, client, http, cached: AsyncMutex::new(None) })
	}

	/// Returns a fresh service token, requesting a new one when the cached token is stale.
	pub async fn token(&self) -> Result<ServiceToken> {
		let mut cached = self.cached.lock().await;

		if let Some(token) = cached.as_ref().filter(|t| t.is_fresh_at(OffsetDateTime::now_utc())) {
			return Ok(token.clone());
		}

		let token = self.request().await?;

		*cached = Some(token.clone());

		Ok(token)
	}

	/// Drops the cached token so the next call requests a new one.
	pub async fn invalidate(&self) {
		self.cached.lock().await.take();
	}

	async fn request(&self) -> Result<ServiceToken> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http.instrumented(meta.clone());
		let response = self
			.client
			.exchange_client_credentials()
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(self.upstream, meta.take(), err))?;
		let token = ServiceToken {
			access_token: TokenSecret::new(response.access_token().secret().to_owned()),
			expires_at: expiry_from(&response)?,
		};

		tracing::info!(upstream = self.upstream.as_str(), "Obtained service token.");

		Ok(token)
	}
}
impl Debug for ServiceTokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceTokenSource").field("upstream", &self.upstream).finish_non_exhaustive()
	}
}

fn token_url(credential: &UpstreamCredential) -> Result<TokenUrl, ConfigError> {
	TokenUrl::new(credential.token_endpoint.to_string())
		.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })
}

fn expiry_from(response: &BasicTokenResponse) -> Result<Option<OffsetDateTime>, ConfigError> {
	response
		.expires_in()
		.map(|ttl| {
			time::Duration::try_from(ttl)
				.ok()
				.and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl))
				.ok_or(ConfigError::ExpiresInOutOfRange)
		})
		.transpose()
}

fn map_request_error(
	upstream: UpstreamKind,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	if let Some(ResponseMetadata { status: Some(429), retry_after }) = meta {
		let retry_after = retry_after.unwrap_or(TOKEN_THROTTLE_BACKOFF);

		tracing::warn!(
			upstream = upstream.as_str(),
			retry_after_secs = retry_after.as_secs(),
			"Token endpoint throttled the gateway."
		);

		return Error::RateLimited { upstream, retry_after };
	}

	let status = meta.and_then(|meta| meta.status);

	match err {
		RequestTokenError::ServerResponse(response) => {
			let reason = response
				.error_description()
				.cloned()
				.unwrap_or_else(|| response.error().as_ref().to_owned());

			tracing::error!(
				upstream = upstream.as_str(),
				status,
				error = response.error().as_ref(),
				"Token endpoint rejected the request."
			);

			match response.error() {
				BasicErrorResponseType::InvalidGrant => AuthError::InvalidGrant { reason }.into(),
				BasicErrorResponseType::InvalidClient
				| BasicErrorResponseType::UnauthorizedClient =>
					AuthError::InvalidClient { reason }.into(),
				_ => Error::Upstream { upstream, message: reason },
			}
		},
		RequestTokenError::Request(err) => {
			tracing::error!(
				upstream = upstream.as_str(),
				status,
				error = %err,
				"Token endpoint request failed."
			);

			match err {
				HttpClientError::Reqwest(inner) if inner.is_builder() =>
					ConfigError::from(*inner).into(),
				HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
				HttpClientError::Http(inner) => ConfigError::from(inner).into(),
				HttpClientError::Io(inner) => TransportError::Io(inner).into(),
				HttpClientError::Other(message) => Error::Upstream { upstream, message },
				_ => Error::Upstream {
					upstream,
					message: "Token endpoint transport failed".into(),
				},
			}
		},
		RequestTokenError::Parse(source, _) => {
			tracing::error!(
				upstream = upstream.as_str(),
				status,
				path = %source.path(),
				"Token endpoint returned a malformed payload."
			);

			Error::Decode { upstream, source }
		},
		RequestTokenError::Other(message) => {
			tracing::error!(
				upstream = upstream.as_str(),
				status,
				message = %message,
				"Token endpoint returned an unexpected response."
			);

			Error::Upstream { upstream, message }
		},
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn credential() -> UpstreamCredential {
		UpstreamCredential::new(
			"client-id",
			"client-secret",
			Url::parse("https://oauth.example.com/token").expect("Token URL should parse."),
		)
	}

	fn http() -> ReqwestHttpClient {
		ReqwestHttpClient::build().expect("Default HTTP client should build.")
	}

	#[test]
	fn authorize_url_carries_scopes_and_state() {
		let facade = AuthorizationCodeFacade::new(
			&credential(),
			&Url::parse("https://oauth.example.com/authorize").expect("Authorize URL should parse."),
			&Url::parse("https://app.example.com/callback").expect("Redirect URL should parse."),
			http(),
		)
		.expect("Facade should build from valid endpoints.");
		let url = facade.authorize_url("opaque-state");
		let pairs = url.query_pairs().into_owned().collect::<HashMap<_, _>>();

		assert_eq!(url.path(), "/authorize");
		assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
		assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-id"));
		assert_eq!(pairs.get("state").map(String::as_str), Some("opaque-state"));
		assert_eq!(pairs.get("scope").map(String::as_str), Some("wow.profile openid"));
		assert_eq!(
			pairs.get("redirect_uri").map(String::as_str),
			Some("https://app.example.com/callback")
		);
	}

	#[test]
	fn throttled_token_endpoint_maps_to_rate_limited() {
		let err = map_request_error(
			UpstreamKind::Analytics,
			Some(ResponseMetadata { status: Some(429), retry_after: None }),
			RequestTokenError::Other("slow down".into()),
		);

		assert!(matches!(
			err,
			Error::RateLimited { upstream: UpstreamKind::Analytics, retry_after }
				if retry_after == TOKEN_THROTTLE_BACKOFF
		));
	}

	#[test]
	fn other_token_failures_map_to_upstream() {
		let err = map_request_error(
			UpstreamKind::Account,
			Some(ResponseMetadata { status: Some(502), retry_after: None }),
			RequestTokenError::Other("bad gateway".into()),
		);

		assert_eq!(err.status_code(), 500);
		assert!(matches!(err, Error::Upstream { upstream: UpstreamKind::Account, .. }));
	}
}
