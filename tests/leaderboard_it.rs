// crates.io
use httpmock::prelude::*;
// self
use armory_gateway::{
	_preludet::*,
	params::{CharacterRef, Region},
	upstream::{LeaderboardClient, UpstreamKind, leaderboard::PROFILE_FIELDS},
};

fn client(server: &MockServer) -> LeaderboardClient {
	let config = mock_config(&server.base_url());

	LeaderboardClient::new(&config.leaderboard, test_http_client())
		.expect("Leaderboard client should build against the mock server.")
}

fn sylvanas() -> CharacterRef {
	CharacterRef::new(Region::Kr, "Azshara", "Sylvanas").expect("Fixture character should be valid.")
}

#[tokio::test]
async fn profile_request_carries_character_and_fields() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let profile = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v1/characters/profile")
				.query_param("region", "kr")
				.query_param("realm", "azshara")
				.query_param("name", "sylvanas")
				.query_param("fields", PROFILE_FIELDS)
				.header("accept", "application/json");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"name":"Sylvanas","mythic_plus_scores_by_season":[{"season":"current"}]}"#);
		})
		.await;
	let body = client.character_profile(&sylvanas()).await.expect("Profile should load.");

	assert_eq!(body["name"], "Sylvanas");

	profile.assert_calls_async(1).await;
}

#[tokio::test]
async fn throttle_drains_the_minute_bucket() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/characters/profile");
			then.status(429);
		})
		.await;
	let character = sylvanas();
	let err = client.character_profile(&character).await.expect_err("Throttled call should fail.");

	assert!(matches!(
		err,
		Error::RateLimited { upstream: UpstreamKind::Leaderboard, retry_after }
			if retry_after == Duration::from_secs(60)
	));

	let err = client
		.character_profile(&character)
		.await
		.expect_err("Drained bucket should refuse the next call.");

	assert_eq!(err.status_code(), 503);

	profile.assert_calls_async(1).await;
}

#[tokio::test]
async fn malformed_payload_is_a_decode_failure() {
	let server = MockServer::start_async().await;
	let client = client(&server);
	let _profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/characters/profile");
			then.status(200).header("content-type", "application/json").body("not json");
		})
		.await;
	let err = client.character_profile(&sylvanas()).await.expect_err("Garbage should not decode.");

	assert!(matches!(err, Error::Decode { upstream: UpstreamKind::Leaderboard, .. }));
	assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn slow_upstream_times_out() {
	let server = MockServer::start_async().await;
	let client = client(&server).with_timeout(Duration::from_millis(100));
	let _profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/characters/profile");
			then.status(200).delay(Duration::from_secs(2)).body("{}");
		})
		.await;
	let err = client.character_profile(&sylvanas()).await.expect_err("Slow calls should time out.");

	assert!(matches!(err, Error::Transport(_)));
	assert_eq!(err.status_code(), 500);
}
