// crates.io
use httpmock::prelude::*;
// self
use armory_gateway::{
	_preludet::*,
	admission::BucketSpec,
	cache::{CacheKey, MemoryCache},
	error::AuthError,
	gateway::PLAYED_SEASON_FIELD,
	params::{CharacterRef, Region},
	upstream::{UpstreamKind, account::CharacterResource},
};

const SERVICE_TOKEN_BODY: &str =
	r#"{"access_token":"service-token","token_type":"bearer","expires_in":86399}"#;
const EXPANSION_BODY: &str = r#"{"data":{"worldData":{"expansions":[{"id":6,"name":"Dragonflight","zones":[{"id":38,"name":"Amirdrassil","partitions":[{"id":2,"name":"Fated","compactName":"S4","default":true}]}]}]},"rateLimitData":{"limitPerHour":3600,"pointsSpentThisHour":3.0,"pointsResetIn":1800}}}"#;

fn anduin() -> CharacterRef {
	CharacterRef::new(Region::Us, "Stormrage", "Anduin").expect("Fixture character should be valid.")
}

async fn settle(memory: &MemoryCache, expected: usize) {
	for _ in 0..100 {
		if memory.len() == expected {
			return;
		}

		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	panic!("Cache never reached {expected} entries.");
}

#[tokio::test]
async fn leaderboard_profile_is_served_from_cache_within_ttl() {
	let server = MockServer::start_async().await;
	let (gateway, memory) = build_test_gateway(&server.base_url());
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/characters/profile");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"name":"Anduin","region":"us"}"#);
		})
		.await;
	let character = anduin();
	let first = gateway.leaderboard_profile(&character).await.expect("First lookup should load.");

	settle(&memory, 1).await;

	let second = gateway.leaderboard_profile(&character).await.expect("Second lookup should hit.");

	assert_eq!(first, second);
	assert!(first.contains("\"name\":\"Anduin\""));

	profile.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_uncached_requests_respect_the_bucket() {
	let server = MockServer::start_async().await;
	let mut config = mock_config(&server.base_url());

	config.leaderboard.per_minute = BucketSpec { capacity: 1, window_secs: 60, drain_secs: 60 };
	config.leaderboard.timeout_secs = 1;

	let (gateway, _) = build_test_gateway_with(&config);
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/characters/profile");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"name":"Anduin","region":"us"}"#);
		})
		.await;
	let character = anduin();
	let (first, second) = tokio::join!(
		gateway.leaderboard_profile(&character),
		gateway.leaderboard_profile(&character)
	);
	let (served, refused) = match (first, second) {
		(Ok(body), Err(err)) | (Err(err), Ok(body)) => (body, err),
		other => panic!("Expected one served and one refused request, got {other:?}."),
	};

	assert!(served.contains("\"name\":\"Anduin\""));
	assert!(matches!(refused, Error::RateLimited { upstream: UpstreamKind::Leaderboard, .. }));
	assert_eq!(refused.status_code(), 503);

	profile.assert_calls_async(1).await;
}

#[tokio::test]
async fn failed_fetch_is_not_cached() {
	let server = MockServer::start_async().await;
	let (gateway, memory) = build_test_gateway(&server.base_url());
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/characters/profile");
			then.status(500).body("boom");
		})
		.await;
	let character = anduin();

	for _ in 0..2 {
		gateway.leaderboard_profile(&character).await.expect_err("Upstream failure should surface.");
	}

	assert!(memory.is_empty());

	profile.assert_calls_async(2).await;
}

#[tokio::test]
async fn unplayed_season_is_flagged_and_cached() {
	let server = MockServer::start_async().await;
	let (gateway, memory) = build_test_gateway(&server.base_url());
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(SERVICE_TOKEN_BODY);
		})
		.await;
	let season = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/profile/wow/character/stormrage/anduin/mythic-keystone-profile/season/11");
			then.status(404).body("{}");
		})
		.await;
	let character = anduin();
	let body = gateway
		.mythic_keystone_season(&character, 11)
		.await
		.expect("Unplayed seasons should not fail.");
	let body: serde_json::Value =
		serde_json::from_str(&body).expect("Gateway output should be JSON.");

	assert_eq!(body[PLAYED_SEASON_FIELD], false);

	settle(&memory, 1).await;
	gateway.mythic_keystone_season(&character, 11).await.expect("Cached season should load.");

	season.assert_calls_async(1).await;
}

#[tokio::test]
async fn character_resources_use_per_resource_keys() {
	let server = MockServer::start_async().await;
	let (gateway, memory) = build_test_gateway(&server.base_url());
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(SERVICE_TOKEN_BODY);
		})
		.await;
	let _summary = server
		.mock_async(|when, then| {
			when.method(GET).path("/profile/wow/character/stormrage/anduin");
			then.status(200).header("content-type", "application/json").body(r#"{"level":80}"#);
		})
		.await;
	let _statistics = server
		.mock_async(|when, then| {
			when.method(GET).path("/profile/wow/character/stormrage/anduin/statistics");
			then.status(200).header("content-type", "application/json").body(r#"{"health":1}"#);
		})
		.await;
	let character = anduin();
	let summary = gateway
		.character_resource(CharacterResource::Summary, &character)
		.await
		.expect("Summary should load.");
	let statistics = gateway
		.character_resource(CharacterResource::Statistics, &character)
		.await
		.expect("Statistics should load.");

	assert_eq!(summary, r#"{"level":80}"#);
	assert_eq!(statistics, r#"{"health":1}"#);

	settle(&memory, 2).await;

	assert_eq!(
		CacheKey::account_resource(&character, CharacterResource::Summary.as_str()),
		"/api/battlenet/us/stormrage/anduin/summary"
	);
}

#[tokio::test]
async fn clearing_reference_data_forces_refetch() {
	let server = MockServer::start_async().await;
	let (gateway, memory) = build_test_gateway(&server.base_url());
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body(SERVICE_TOKEN_BODY);
		})
		.await;
	let world = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/v2/client").body_includes("worldData");
			then.status(200).header("content-type", "application/json").body(EXPANSION_BODY);
		})
		.await;
	let partitions = gateway.partitions().await.expect("Partitions should load.");

	assert!(partitions.contains("\"compact_name\":\"S4\""));

	settle(&memory, 1).await;
	gateway.partitions().await.expect("Cached partitions should load.");
	world.assert_calls_async(1).await;

	gateway.clear_reference_data().await;
	settle(&memory, 0).await;
	gateway.partitions().await.expect("Cleared partitions should reload.");

	world.assert_calls_async(2).await;
}

#[tokio::test]
async fn authorization_round_trip() {
	let server = MockServer::start_async().await;
	let (gateway, _) = build_test_gateway(&server.base_url());
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("code=login-code");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"user-token","token_type":"bearer","expires_in":86399,"scope":"wow.profile openid"}"#,
			);
		})
		.await;
	let _check = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/check_token").query_param("token", "user-token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"user_name":"Anduin#1234","scope":["wow.profile","openid"]}"#);
		})
		.await;
	let _identity = server
		.mock_async(|when, then| {
			when.method(GET).path("/oauth/userinfo").header("authorization", "Bearer user-token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"id":42,"battletag":"Anduin#1234","sub":"42"}"#);
		})
		.await;
	let request = gateway.begin_authorization();
	let pairs = request.url.query_pairs().into_owned().collect::<HashMap<_, _>>();

	assert_eq!(pairs.get("state"), Some(&request.state));
	assert_eq!(pairs.get("redirect_uri").map(String::as_str), Some(TEST_REDIRECT_URL));
	assert!(pairs.get("scope").is_some_and(|scope| scope.contains("wow.profile")));

	let outcome = gateway
		.complete_authorization(&request.state, &request.state.to_ascii_uppercase(), "login-code")
		.await
		.expect("Matching states should complete the login.");

	assert_eq!(outcome.token.access_token.expose(), "user-token");
	assert_eq!(outcome.identity.id, 42);
	assert_eq!(outcome.check.user_name.as_deref(), Some("Anduin#1234"));

	exchange.assert_calls_async(1).await;
}

#[tokio::test]
async fn state_mismatch_stops_before_exchange() {
	let server = MockServer::start_async().await;
	let (gateway, _) = build_test_gateway(&server.base_url());
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).body("{}");
		})
		.await;
	let request = gateway.begin_authorization();
	let err = gateway
		.complete_authorization(&request.state, "forged-state", "login-code")
		.await
		.expect_err("Forged states should be rejected.");

	assert!(matches!(err, Error::Auth(AuthError::StateMismatch)));
	assert_eq!(err.status_code(), 400);

	exchange.assert_calls_async(0).await;
}
