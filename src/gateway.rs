//! Inbound triggers: one method per route, each returning the JSON body to answer with.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{self, UserToken},
	cache::{CacheGateway, CacheKey, CacheTtl},
	config::GatewayConfig,
	error::AuthError,
	http::ReqwestHttpClient,
	params::{CharacterRef, Region},
	upstream::{
		AccountClient, AnalyticsClient, Fetched, LeaderboardClient,
		account::{CharacterResource, TokenCheck, UserIdentity},
		analytics::CharacterParsesRequest,
	},
};

/// Field added to season payloads telling whether the character played it.
pub const PLAYED_SEASON_FIELD: &str = "character_played_season";

/// Redirect target and the state the callback must echo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationRequest {
	/// State to keep with the session.
	pub state: String,
	/// Provider authorization URL.
	pub url: Url,
}

/// Result of a completed login.
#[derive(Clone, Debug)]
pub struct AuthorizationOutcome {
	/// Exchanged user token.
	pub token: UserToken,
	/// Introspection of the token.
	pub check: TokenCheck,
	/// Owner of the token.
	pub identity: UserIdentity,
}

/// The three upstream executors and the response cache behind one facade.
#[derive(Debug)]
pub struct Gateway {
	account: AccountClient,
	analytics: AnalyticsClient,
	leaderboard: LeaderboardClient,
	cache: CacheGateway,
}
impl Gateway {
	/// Assembles a gateway from ready-made parts.
	pub fn new(
		account: AccountClient,
		analytics: AnalyticsClient,
		leaderboard: LeaderboardClient,
		cache: CacheGateway,
	) -> Self {
		Self { account, analytics, leaderboard, cache }
	}

	/// Builds every client from `config`, primes the analytics budget and expansion snapshot, and
	/// connects the cache when one is configured.
	pub async fn from_config(config: &GatewayConfig) -> Result<Self> {
		let http = ReqwestHttpClient::build()?;
		let account = AccountClient::new(&config.account, http.clone())?;
		let analytics = AnalyticsClient::new(&config.analytics, http.clone())?;
		let leaderboard = LeaderboardClient::new(&config.leaderboard, http)?;

		if let Err(err) = analytics.prime().await {
			tracing::error!(error = %err, "Failed to prime the analytics client.");

			return Err(err);
		}

		let cache = connect_cache(config).await;

		Ok(Self::new(account, analytics, leaderboard, cache))
	}

	/// Account executor.
	pub fn account(&self) -> &AccountClient {
		&self.account
	}

	/// Analytics executor.
	pub fn analytics(&self) -> &AnalyticsClient {
		&self.analytics
	}

	/// Leaderboard executor.
	pub fn leaderboard(&self) -> &LeaderboardClient {
		&self.leaderboard
	}

	/// Response cache.
	pub fn cache(&self) -> &CacheGateway {
		&self.cache
	}

	/// Starts a login with a fresh state.
	pub fn begin_authorization(&self) -> AuthorizationRequest {
		let state = auth::new_state();
		let url = self.account.authorization_url(&state);

		AuthorizationRequest { state, url }
	}

	/// Finishes a login: checks the state, exchanges the code, validates the token, and resolves
	/// its owner.
	pub async fn complete_authorization(
		&self,
		expected_state: &str,
		returned_state: &str,
		code: &str,
	) -> Result<AuthorizationOutcome> {
		if !auth::state_matches(expected_state, returned_state) {
			tracing::warn!("Authorization callback state mismatch.");

			return Err(AuthError::StateMismatch.into());
		}

		let token = self.account.exchange_code(code).await?;
		let check = self.account.validate_token(&token).await?;
		let identity = self.account.user_identity(&token).await?;

		tracing::info!(battletag = %identity.battletag, "Completed authorization.");

		Ok(AuthorizationOutcome { token, check, identity })
	}

	/// Account profile of the token owner. Never cached.
	pub async fn account_profile(&self, token: &UserToken, region: Region) -> Result<String> {
		encode(&self.account.account_profile(token, region).await?)
	}

	/// One account resource of a character.
	pub async fn character_resource(
		&self,
		resource: CharacterResource,
		character: &CharacterRef,
	) -> Result<String> {
		let key = CacheKey::account_resource(character, resource.as_str());

		self.cache
			.read_through(&key, CacheTtl::LIVE, || async {
				encode(&self.account.character(resource, character).await?)
			})
			.await
	}

	/// Mythic keystone season of a character, flagged with whether it was played.
	pub async fn mythic_keystone_season(
		&self,
		character: &CharacterRef,
		season_id: u32,
	) -> Result<String> {
		let key = CacheKey::account_resource(
			character,
			&format!("mythic-keystone-index/season/{season_id}"),
		);

		self.cache
			.read_through(&key, CacheTtl::LIVE, || async {
				let season = self.account.mythic_keystone_season(character, season_id).await?;

				encode(&played_season(season))
			})
			.await
	}

	/// Realm index of a region.
	pub async fn realms(&self, region: Region) -> Result<String> {
		self.cache
			.read_through(&CacheKey::realms(region), CacheTtl::REFERENCE, || async {
				encode(&self.account.realms(region).await?)
			})
			.await
	}

	/// Leaderboard profile of a character.
	pub async fn leaderboard_profile(&self, character: &CharacterRef) -> Result<String> {
		self.cache
			.read_through(&CacheKey::leaderboard_profile(character), CacheTtl::LIVE, || async {
				encode(&self.leaderboard.character_profile(character).await?)
			})
			.await
	}

	/// Latest expansion with its zone partitions.
	pub async fn partitions(&self) -> Result<String> {
		self.cache
			.read_through(CacheKey::PARTITIONS, CacheTtl::REFERENCE, || async {
				encode(&*self.analytics.expansion().await?)
			})
			.await
	}

	/// Ranked parses of a character for a zone.
	pub async fn character_parses(
		&self,
		character: &CharacterRef,
		zone_id: i64,
		partition: Option<i64>,
	) -> Result<String> {
		let key = CacheKey::character_parses(character, zone_id, partition);
		let request = CharacterParsesRequest::new(character, zone_id, partition);

		self.cache
			.read_through(&key, CacheTtl::LIVE, || async {
				let parses = self.analytics.character_parses(&request).await?;

				encode(&parses.character_data.character)
			})
			.await
	}

	/// Drops the reference snapshot and its cached copy.
	pub async fn clear_reference_data(&self) {
		self.analytics.clear_expansion().await;
		self.cache.delete(CacheKey::PARTITIONS);
	}
}

#[cfg(feature = "redis")]
async fn connect_cache(config: &GatewayConfig) -> CacheGateway {
	match config.cache.url.as_deref() {
		Some(url) => CacheGateway::connect(url)
			.await
			.with_read_timeout(config.cache.read_timeout())
			.with_write_timeout(config.cache.write_timeout()),
		None => {
			tracing::warn!("No cache URL configured; caching disabled.");

			CacheGateway::disabled()
		},
	}
}

#[cfg(not(feature = "redis"))]
async fn connect_cache(config: &GatewayConfig) -> CacheGateway {
	if config.cache.url.is_some() {
		tracing::warn!("Cache URL ignored without the redis feature; caching disabled.");
	}

	CacheGateway::disabled()
}

fn played_season(season: Fetched<Value>) -> Value {
	match season {
		Fetched::Found(Value::Object(mut map)) => {
			map.insert(PLAYED_SEASON_FIELD.into(), Value::Bool(true));

			Value::Object(map)
		},
		Fetched::Found(other) => serde_json::json!({ PLAYED_SEASON_FIELD: true, "season": other }),
		Fetched::NotFound => serde_json::json!({ PLAYED_SEASON_FIELD: false }),
	}
}

fn encode<T>(value: &T) -> Result<String>
where
	T: ?Sized + Serialize,
{
	Ok(serde_json::to_string(value)?)
}
