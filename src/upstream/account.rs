//! Game-account upstream: authorization-code login, token introspection, and profile data.

// crates.io
use reqwest::{RequestBuilder, header::AUTHORIZATION};
use serde_json::Value;
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	admission::TokenBudget,
	auth::{REQUIRED_SCOPES, ScopeSet, UserToken},
	config::AccountConfig,
	error::{AuthError, ConfigError},
	http::ReqwestHttpClient,
	oauth::{AuthorizationCodeFacade, ServiceTokenSource},
	obs::{self, CallOutcome, CallSpan},
	params::{CharacterRef, Region},
	upstream::{self, Fetched, NotFoundPolicy, UpstreamKind},
};

const LOCALE: &str = "en_US";
// Introspection endpoints are global and always addressed through the US region.
const INTROSPECTION_REGION: &str = "us";

/// Namespace category attached to every API call as `{category}-{region}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
	/// Character and account profiles.
	Profile,
	/// Realm and other live game data.
	Dynamic,
}
impl Namespace {
	/// Lowercase namespace prefix.
	pub const fn as_str(self) -> &'static str {
		match self {
			Namespace::Profile => "profile",
			Namespace::Dynamic => "dynamic",
		}
	}
}

/// Character resources served under `/profile/wow/character/{realm}/{name}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CharacterResource {
	/// Character summary.
	Summary,
	/// Character status.
	Status,
	/// Equipped items.
	Equipment,
	/// Render assets.
	Media,
	/// Combat statistics.
	Statistics,
	/// Dungeon encounter progress.
	DungeonEncounters,
	/// Raid encounter progress.
	RaidEncounters,
	/// Mythic keystone profile index.
	MythicKeystoneIndex,
}
impl CharacterResource {
	/// Every resource, in path order.
	pub const ALL: [Self; 8] = [
		Self::Summary,
		Self::Status,
		Self::Equipment,
		Self::Media,
		Self::Statistics,
		Self::DungeonEncounters,
		Self::RaidEncounters,
		Self::MythicKeystoneIndex,
	];

	/// Path suffix appended to the character path.
	pub const fn path_suffix(self) -> &'static str {
		match self {
			Self::Summary => "",
			Self::Status => "/status",
			Self::Equipment => "/equipment",
			Self::Media => "/character-media",
			Self::Statistics => "/statistics",
			Self::DungeonEncounters => "/encounters/dungeons",
			Self::RaidEncounters => "/encounters/raids",
			Self::MythicKeystoneIndex => "/mythic-keystone-profile",
		}
	}

	/// Stable label used in cache keys and log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Summary => "summary",
			Self::Status => "status",
			Self::Equipment => "equipment",
			Self::Media => "character-media",
			Self::Statistics => "statistics",
			Self::DungeonEncounters => "encounters-dungeons",
			Self::RaidEncounters => "encounters-raids",
			Self::MythicKeystoneIndex => "mythic-keystone-index",
		}
	}
}

/// Every endpoint of the account upstream, used for labels and the 404 policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountResource {
	/// Authorization code exchange.
	TokenExchange,
	/// Token introspection.
	CheckToken,
	/// Identity of the token owner.
	UserInfo,
	/// Account-wide profile summary.
	AccountProfile,
	/// One character resource.
	Character(CharacterResource),
	/// Mythic keystone season of a character.
	MythicKeystoneSeason,
	/// Realm index of a region.
	Realms,
}
impl AccountResource {
	/// Stable label used in spans and log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::TokenExchange => "token_exchange",
			Self::CheckToken => "check_token",
			Self::UserInfo => "user_info",
			Self::AccountProfile => "account_profile",
			Self::Character(resource) => resource.as_str(),
			Self::MythicKeystoneSeason => "mythic-keystone-season",
			Self::Realms => "realms",
		}
	}

	/// A season the character never played answers 404; everything else treats 404 as failure.
	pub const fn not_found_policy(self) -> NotFoundPolicy {
		match self {
			Self::MythicKeystoneSeason => NotFoundPolicy::Absent,
			_ => NotFoundPolicy::Error,
		}
	}
}

/// Introspection result for a user token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenCheck {
	/// Account name of the token owner, when reported.
	#[serde(default)]
	pub user_name: Option<String>,
	/// Client the token was issued to.
	#[serde(default)]
	pub client_id: Option<String>,
	/// Scopes granted to the token.
	#[serde(rename = "scope", default)]
	pub scopes: ScopeSet,
}

/// Identity of a user token's owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
	/// Numeric account id.
	pub id: u64,
	/// Public battle tag.
	pub battletag: String,
}

enum Credential<'a> {
	Service,
	User(&'a UserToken),
}
impl Credential<'_> {
	// Runs before admission.
	fn ensure_valid(&self) -> Result<()> {
		match self {
			Credential::User(token) if !token.is_valid() => Err(AuthError::TokenInvalid.into()),
			_ => Ok(()),
		}
	}
}

/// Executor for the game-account upstream.
///
/// Every call waits on a per-hour then a per-second bucket, bounded by the call timeout. A `429`
/// drains both buckets.
#[derive(Debug)]
pub struct AccountClient {
	http: ReqwestHttpClient,
	authorization: AuthorizationCodeFacade,
	service: ServiceTokenSource,
	budget: TokenBudget,
	oauth_base: String,
	api_base: String,
	timeout: Duration,
	validation_timeout: Duration,
}
impl AccountClient {
	/// Builds the client from its configuration section.
	pub fn new(config: &AccountConfig, http: ReqwestHttpClient) -> Result<Self, ConfigError> {
		let credential = config.credential()?;
		let authorization = AuthorizationCodeFacade::new(
			&credential,
			&config.authorize_endpoint()?,
			&config.redirect()?,
			http.clone(),
		)?;
		let service = ServiceTokenSource::new(UpstreamKind::Account, &credential, http.clone())?;

		Ok(Self {
			http,
			authorization,
			service,
			budget: TokenBudget::new(UpstreamKind::Account, [config.per_hour, config.per_second]),
			oauth_base: config.oauth_base.trim_end_matches('/').to_owned(),
			api_base: config.api_base.trim_end_matches('/').to_owned(),
			timeout: config.timeout(),
			validation_timeout: config.validation_timeout(),
		})
	}

	/// Overrides the bound applied to ordinary calls.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Local admission budget.
	pub fn budget(&self) -> &TokenBudget {
		&self.budget
	}

	/// Provider authorization URL bound to `state`.
	pub fn authorization_url(&self, state: &str) -> Url {
		self.authorization.authorize_url(state)
	}

	/// Exchanges an authorization code for a user token.
	pub async fn exchange_code(&self, code: &str) -> Result<UserToken> {
		let resource = AccountResource::TokenExchange;
		let span = CallSpan::new(UpstreamKind::Account, resource.as_str());

		obs::record_call_outcome(UpstreamKind::Account, CallOutcome::Attempt);

		let result = span
			.instrument(upstream::with_deadline(self.timeout, async {
				self.budget.acquire(Instant::now() + self.timeout).await?;
				self.authorization.exchange_code(code).await
			}))
			.await;

		obs::record_call_outcome(UpstreamKind::Account, CallOutcome::of(&result));

		result
	}

	/// Introspects `token` and requires the profile scopes.
	pub async fn validate_token(&self, token: &UserToken) -> Result<TokenCheck> {
		let resource = AccountResource::CheckToken;
		let request = self
			.http
			.post(format!("{}/oauth/check_token", self.oauth_base))
			.query(&[("region", INTROSPECTION_REGION), ("token", token.access_token.expose())]);
		let body = self
			.call(resource, request, Credential::User(token), self.validation_timeout)
			.await?;
		let check: TokenCheck = upstream::decode(UpstreamKind::Account, resource.as_str(), &body)?;

		check.scopes.require(REQUIRED_SCOPES)?;

		Ok(check)
	}

	/// Identity of the owner of `token`.
	pub async fn user_identity(&self, token: &UserToken) -> Result<UserIdentity> {
		let resource = AccountResource::UserInfo;
		let request = self
			.http
			.get(format!("{}/oauth/userinfo", self.oauth_base))
			.query(&[("region", INTROSPECTION_REGION)]);
		let body = self.call(resource, request, Credential::User(token), self.timeout).await?;

		upstream::decode(UpstreamKind::Account, resource.as_str(), &body)
	}

	/// Account-wide profile summary of the owner of `token`.
	pub async fn account_profile(&self, token: &UserToken, region: Region) -> Result<Value> {
		let resource = AccountResource::AccountProfile;
		let request = self.api_request(region, Namespace::Profile, "/profile/user/wow");
		let body = self.call(resource, request, Credential::User(token), self.timeout).await?;

		upstream::decode(UpstreamKind::Account, resource.as_str(), &body)
	}

	/// One resource of a character, fetched with the service credential.
	pub async fn character(
		&self,
		resource: CharacterResource,
		character: &CharacterRef,
	) -> Result<Value> {
		let path = format!("{}{}", character_path(character), resource.path_suffix());
		let request = self.api_request(character.region, Namespace::Profile, &path);
		let resource = AccountResource::Character(resource);
		let body = self.call(resource, request, Credential::Service, self.timeout).await?;

		upstream::decode(UpstreamKind::Account, resource.as_str(), &body)
	}

	/// Mythic keystone season of a character; a season never played is [`Fetched::NotFound`].
	pub async fn mythic_keystone_season(
		&self,
		character: &CharacterRef,
		season_id: u32,
	) -> Result<Fetched<Value>> {
		let resource = AccountResource::MythicKeystoneSeason;
		let path =
			format!("{}/mythic-keystone-profile/season/{season_id}", character_path(character));
		let request = self.api_request(character.region, Namespace::Profile, &path);
		let result = self.call(resource, request, Credential::Service, self.timeout).await;

		match Fetched::from_result(resource.not_found_policy(), result)? {
			Fetched::Found(body) =>
				upstream::decode(UpstreamKind::Account, resource.as_str(), &body).map(Fetched::Found),
			Fetched::NotFound => Ok(Fetched::NotFound),
		}
	}

	/// Realm index of `region`, tagged with a `region` field.
	pub async fn realms(&self, region: Region) -> Result<Value> {
		let resource = AccountResource::Realms;
		let request = self.api_request(region, Namespace::Dynamic, "/data/wow/realm/index");
		let body = self.call(resource, request, Credential::Service, self.timeout).await?;
		let mut realms: Value = upstream::decode(UpstreamKind::Account, resource.as_str(), &body)?;

		if let Value::Object(map) = &mut realms {
			map.insert("region".into(), Value::String(region.as_str().into()));
		}

		Ok(realms)
	}

	fn api_request(&self, region: Region, namespace: Namespace, path: &str) -> RequestBuilder {
		let base = self.api_base.replace("{region}", region.as_str());
		let namespace = format!("{}-{region}", namespace.as_str());

		self.http.get(format!("{base}{path}")).query(&[
			("region", region.as_str()),
			("namespace", namespace.as_str()),
			("locale", LOCALE),
		])
	}

	async fn call(
		&self,
		resource: AccountResource,
		request: RequestBuilder,
		credential: Credential<'_>,
		timeout: Duration,
	) -> Result<Vec<u8>> {
		let span = CallSpan::new(UpstreamKind::Account, resource.as_str());

		obs::record_call_outcome(UpstreamKind::Account, CallOutcome::Attempt);

		let result = span
			.instrument(upstream::with_deadline(timeout, async {
				credential.ensure_valid()?;
				self.budget.acquire(Instant::now() + timeout).await?;

				match credential {
					Credential::User(token) =>
						upstream::execute(
							UpstreamKind::Account,
							resource.as_str(),
							request.header(AUTHORIZATION, token.authorization()),
							|| self.budget.drain(),
						)
						.await,
					Credential::Service => self.send_with_service_token(resource, request).await,
				}
			}))
			.await;

		obs::record_call_outcome(UpstreamKind::Account, CallOutcome::of(&result));

		result
	}

	async fn send_with_service_token(
		&self,
		resource: AccountResource,
		request: RequestBuilder,
	) -> Result<Vec<u8>> {
		let token = self.service.token().await?;
		let result = upstream::execute(
			UpstreamKind::Account,
			resource.as_str(),
			request.header(AUTHORIZATION, token.authorization()),
			|| self.budget.drain(),
		)
		.await;

		if matches!(result, Err(Error::UpstreamHttp { status: 401, .. })) {
			self.service.invalidate().await;
		}

		result
	}
}

fn character_path(character: &CharacterRef) -> String {
	format!("/profile/wow/character/{}/{}", character.realm, character.name)
}
