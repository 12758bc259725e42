//! Rate-limited gateway clients for game-account, combat-log analytics, and leaderboard APIs:
//! budget-aware admission, fail-open response caching, and typed upstream errors in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod admission;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod params;
pub mod reference;
pub mod upstream;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		admission::{PointBudget, RateLimitData},
		auth::TokenSecret,
		cache::{CacheGateway, MemoryCache},
		config::GatewayConfig,
		gateway::Gateway,
		http::ReqwestHttpClient,
		upstream::{AccountClient, AnalyticsClient, LeaderboardClient},
	};

	/// Client identifier used by every mocked upstream.
	pub const TEST_CLIENT_ID: &str = "gateway-client";
	/// Client secret used by every mocked upstream.
	pub const TEST_CLIENT_SECRET: &str = "gateway-secret";
	/// Redirect URL registered for the mocked authorization flow.
	pub const TEST_REDIRECT_URL: &str = "https://app.example.com/callback";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.danger_accept_invalid_certs(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Configuration whose upstreams all live under `base`.
	///
	/// Paths mirror the real services: `/token` and `/oauth/*` for the account host,
	/// `/oauth/token` and `/api/v2/client` for analytics, `/api/v1/characters/profile` for the
	/// leaderboard, and the account API paths directly under `base`.
	pub fn mock_config(base: &str) -> GatewayConfig {
		let base = base.trim_end_matches('/');
		let mut config = GatewayConfig::default();

		config.account.client_id = TEST_CLIENT_ID.into();
		config.account.client_secret = TokenSecret::new(TEST_CLIENT_SECRET);
		config.account.redirect_url = TEST_REDIRECT_URL.into();
		config.account.oauth_base = base.into();
		config.account.api_base = base.into();
		config.analytics.client_id = TEST_CLIENT_ID.into();
		config.analytics.client_secret = TokenSecret::new(TEST_CLIENT_SECRET);
		config.analytics.token_url = format!("{base}/oauth/token");
		config.analytics.api_url = format!("{base}/api/v2/client");
		config.leaderboard.base_url = base.into();

		config
	}

	/// Analytics client with a manually driven budget.
	pub fn test_analytics_client(
		config: &GatewayConfig,
		initial: RateLimitData,
	) -> AnalyticsClient {
		let budget = PointBudget::manual(initial);

		AnalyticsClient::with_budget(&config.analytics, test_http_client(), budget)
			.expect("Analytics client should build for tests.")
	}

	/// Gateway over mocked upstreams, backed by an in-memory cache.
	pub fn build_test_gateway(base: &str) -> (Gateway, MemoryCache) {
		build_test_gateway_with(&mock_config(base))
	}

	/// Gateway built from `config` without priming, backed by an in-memory cache.
	pub fn build_test_gateway_with(config: &GatewayConfig) -> (Gateway, MemoryCache) {
		let http = test_http_client();
		let account = AccountClient::new(&config.account, http.clone())
			.expect("Account client should build for tests.");
		let analytics = test_analytics_client(config, RateLimitData::default());
		let leaderboard = LeaderboardClient::new(&config.leaderboard, http)
			.expect("Leaderboard client should build for tests.");
		let memory = MemoryCache::default();
		let cache = CacheGateway::new(Arc::new(memory.clone()));

		(Gateway::new(account, analytics, leaderboard, cache), memory)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
