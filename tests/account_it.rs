// crates.io
use httpmock::prelude::*;
// self
use armory_gateway::{
	_preludet::*,
	auth::UserToken,
	error::AuthError,
	params::{CharacterRef, Region},
	upstream::{AccountClient, Fetched, account::CharacterResource},
};

const SERVICE_TOKEN_BODY: &str =
	r#"{"access_token":"service-token","token_type":"bearer","expires_in":86399}"#;

fn client(server: &MockServer) -> AccountClient {
	let config = mock_config(&server.base_url());

	AccountClient::new(&config.account, test_http_client())
		.expect("Account client should build against the mock server.")
}

fn thrall() -> CharacterRef {
	CharacterRef::new(Region::Us, "Area-52", "Thrall").expect("Fixture character should be valid.")
}

async fn mock_service_token(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(SERVICE_TOKEN_BODY);
		})
		.await
}

#[tokio::test]
async fn character_resource_reuses_service_token() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let token = mock_service_token(&server).await;
	let media = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/profile/wow/character/area-52/thrall/character-media")
				.query_param("namespace", "profile-us")
				.query_param("locale", "en_US")
				.query_param("region", "us")
				.header("authorization", "Bearer service-token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"assets":[{"key":"avatar"}]}"#);
		})
		.await;
	let character = thrall();
	let first = client
		.character(CharacterResource::Media, &character)
		.await
		.expect("First media request should succeed.");
	let second = client
		.character(CharacterResource::Media, &character)
		.await
		.expect("Second media request should succeed.");

	assert_eq!(first["assets"][0]["key"], "avatar");
	assert_eq!(first, second);

	token.assert_calls_async(1).await;
	media.assert_calls_async(2).await;
}

#[tokio::test]
async fn unplayed_season_is_not_found() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let _token = mock_service_token(&server).await;
	let season = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/profile/wow/character/area-52/thrall/mythic-keystone-profile/season/12");
			then.status(404).body(r#"{"code":404,"type":"BLZWEBAPI00000404","detail":"Not Found"}"#);
		})
		.await;
	let fetched = client
		.mythic_keystone_season(&thrall(), 12)
		.await
		.expect("A season the character never played should not fail.");

	assert_eq!(fetched, Fetched::NotFound);

	season.assert_calls_async(1).await;
}

#[tokio::test]
async fn season_server_error_still_fails() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let _token = mock_service_token(&server).await;
	let _season = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/profile/wow/character/area-52/thrall/mythic-keystone-profile/season/12");
			then.status(500).body("upstream exploded");
		})
		.await;
	let err = client
		.mythic_keystone_season(&thrall(), 12)
		.await
		.expect_err("A 500 must surface even for season lookups.");

	assert!(matches!(
		err,
		Error::UpstreamHttp { status: 500, ref body, .. } if body == "upstream exploded"
	));
	assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn other_resources_treat_404_as_failure() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let _token = mock_service_token(&server).await;
	let _summary = server
		.mock_async(|when, then| {
			when.method(GET).path("/profile/wow/character/area-52/thrall");
			then.status(404).body("{}");
		})
		.await;
	let err = client
		.character(CharacterResource::Summary, &thrall())
		.await
		.expect_err("Missing characters should fail.");

	assert!(err.is_not_found());
	assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn throttled_call_drains_budget() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let _token = mock_service_token(&server).await;
	let status = server
		.mock_async(|when, then| {
			when.method(GET).path("/profile/wow/character/area-52/thrall/status");
			then.status(429).header("retry-after", "2");
		})
		.await;
	let character = thrall();
	let err = client
		.character(CharacterResource::Status, &character)
		.await
		.expect_err("Throttled call should fail.");

	assert!(matches!(err, Error::RateLimited { .. }));
	assert_eq!(err.status_code(), 503);
	assert!(err.retry_after().expect("Rate limits carry a hint.") >= Duration::from_secs(60));
	assert!(!client.budget().try_admit().is_allowed());

	let err = client
		.character(CharacterResource::Status, &character)
		.await
		.expect_err("Drained budget should refuse the next call.");

	assert!(matches!(err, Error::RateLimited { .. }));

	status.assert_calls_async(1).await;
}

#[tokio::test]
async fn unauthorized_service_call_refreshes_token() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let token = mock_service_token(&server).await;
	let _equipment = server
		.mock_async(|when, then| {
			when.method(GET).path("/profile/wow/character/area-52/thrall/equipment");
			then.status(401).body("{}");
		})
		.await;
	let character = thrall();

	for _ in 0..2 {
		let err = client
			.character(CharacterResource::Equipment, &character)
			.await
			.expect_err("Unauthorized calls should fail.");

		assert!(matches!(err, Error::UpstreamHttp { status: 401, .. }));
	}

	token.assert_calls_async(2).await;
}

#[tokio::test]
async fn empty_user_token_is_rejected_before_any_call() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/profile/user/wow");
			then.status(200).body("{}");
		})
		.await;
	let err = client
		.account_profile(&UserToken::bearer(""), Region::Eu)
		.await
		.expect_err("Empty tokens should be rejected.");

	assert!(matches!(err, Error::Auth(AuthError::TokenInvalid)));
	assert_eq!(err.status_code(), 401);

	profile.assert_calls_async(0).await;
}

#[tokio::test]
async fn validation_requires_profile_scope() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let check = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/check_token")
				.query_param("region", "us")
				.query_param("token", "user-token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"client_id":"gateway-client","scope":["openid"]}"#);
		})
		.await;
	let err = client
		.validate_token(&UserToken::bearer("user-token"))
		.await
		.expect_err("Tokens without the profile scope should be rejected.");

	assert!(matches!(
		err,
		Error::Auth(AuthError::MissingScope { ref scope }) if scope == "wow.profile"
	));
	assert_eq!(err.status_code(), 400);

	check.assert_calls_async(1).await;
}

#[tokio::test]
async fn realms_are_tagged_with_region() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let _token = mock_service_token(&server).await;
	let _realms = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/data/wow/realm/index")
				.query_param("namespace", "dynamic-eu");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"realms":[{"id":1,"slug":"silvermoon"}]}"#);
		})
		.await;
	let realms = client.realms(Region::Eu).await.expect("Realm index should load.");

	assert_eq!(realms["region"], "eu");
	assert_eq!(realms["realms"][0]["slug"], "silvermoon");
}

#[tokio::test]
async fn rejected_code_maps_to_invalid_grant() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_grant","error_description":"Code expired"}"#);
		})
		.await;
	let err = client.exchange_code("stale-code").await.expect_err("Stale codes should fail.");

	assert!(matches!(
		err,
		Error::Auth(AuthError::InvalidGrant { ref reason }) if reason == "Code expired"
	));
	assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn exchange_without_scope_grants_nothing() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("code=fresh-code");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"user-token","token_type":"bearer","expires_in":86399}"#);
		})
		.await;
	let token = client.exchange_code("fresh-code").await.expect("Exchange should succeed.");

	assert!(token.scopes.is_empty());
	assert!(!token.scopes.contains("wow.profile"));
}
