//! GraphQL documents and the typed payloads they decode into.

// crates.io
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::{_prelude::*, admission::RateLimitData, params::CharacterRef};

/// A query payload that reports the rate-limit cost the upstream observed for it.
pub trait RatedQuery
where
	Self: DeserializeOwned + Send,
{
	/// Label used in spans and log fields.
	const OPERATION: &'static str;

	/// Rate-limit figures returned alongside the data.
	fn rate_limit(&self) -> &RateLimitData;
}

/// Current budget only.
pub const RATE_LIMIT_DOCUMENT: &str = r#"query {
	rateLimitData { limitPerHour pointsSpentThisHour pointsResetIn }
}"#;

/// Every expansion with its zones and their ranking partitions.
pub const EXPANSION_ENCOUNTERS_DOCUMENT: &str = r#"query {
	worldData {
		expansions {
			id
			name
			zones { id name partitions { id name compactName default } }
		}
	}
	rateLimitData { limitPerHour pointsSpentThisHour pointsResetIn }
}"#;

/// Zone rankings of one character.
pub const CHARACTER_PARSES_DOCUMENT: &str = r#"query CharacterParses(
	$name: String
	$server_slug: String
	$server_region: String
	$zone_id: Int
	$partition: Int
) {
	characterData {
		character(name: $name, serverSlug: $server_slug, serverRegion: $server_region) {
			hidden
			zoneRankings(zoneID: $zone_id, partition: $partition)
		}
	}
	rateLimitData { limitPerHour pointsSpentThisHour pointsResetIn }
}"#;

/// Partition sent when neither the caller nor the reference snapshot names one.
pub const UNKNOWN_PARTITION: i64 = -1;

/// Response of [`RATE_LIMIT_DOCUMENT`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitQuery {
	/// Current budget.
	pub rate_limit_data: RateLimitData,
}
impl RatedQuery for RateLimitQuery {
	const OPERATION: &'static str = "rate_limit";

	fn rate_limit(&self) -> &RateLimitData {
		&self.rate_limit_data
	}
}

/// Response of [`EXPANSION_ENCOUNTERS_DOCUMENT`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionEncountersQuery {
	/// World data.
	pub world_data: WorldData,
	/// Budget after the query.
	pub rate_limit_data: RateLimitData,
}
impl RatedQuery for ExpansionEncountersQuery {
	const OPERATION: &'static str = "expansion_encounters";

	fn rate_limit(&self) -> &RateLimitData {
		&self.rate_limit_data
	}
}

/// `worldData` selection.
#[derive(Clone, Debug, Deserialize)]
pub struct WorldData {
	/// Every expansion known to the upstream.
	#[serde(default)]
	pub expansions: Vec<Expansion>,
}

/// One expansion as reported by the upstream.
#[derive(Clone, Debug, Deserialize)]
pub struct Expansion {
	/// Expansion id; newer expansions have higher ids.
	pub id: i64,
	/// Display name.
	pub name: String,
	/// Zones, possibly `null`.
	#[serde(default)]
	pub zones: Option<Vec<Zone>>,
}

/// One zone as reported by the upstream.
#[derive(Clone, Debug, Deserialize)]
pub struct Zone {
	/// Zone id.
	pub id: i64,
	/// Display name.
	pub name: String,
	/// Ranking partitions, `null` for zones without rankings.
	#[serde(default)]
	pub partitions: Option<Vec<Partition>>,
}

/// Ranking partition of a zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "snake_case", deserialize = "camelCase"))]
pub struct Partition {
	/// Partition id.
	pub id: i64,
	/// Display name.
	pub name: String,
	/// Short display name.
	pub compact_name: String,
	/// Whether rankings default to this partition.
	pub default: bool,
}

/// Latest expansion with every zone's partitions, served as reference data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionedExpansion {
	/// Expansion id.
	pub id: i64,
	/// Display name.
	pub name: String,
	/// Zones with their partitions.
	pub zones: Vec<PartitionedZone>,
}
impl PartitionedExpansion {
	/// Picks the expansion with the highest id.
	pub fn latest(world: WorldData) -> Option<Self> {
		let expansion = world.expansions.into_iter().max_by_key(|expansion| expansion.id)?;
		let zones = expansion
			.zones
			.unwrap_or_default()
			.into_iter()
			.map(|zone| PartitionedZone {
				id: zone.id,
				name: zone.name,
				partitions: zone.partitions.unwrap_or_default(),
			})
			.collect();

		Some(Self { id: expansion.id, name: expansion.name, zones })
	}

	/// Partition flagged as default for `zone_id`.
	pub fn default_partition(&self, zone_id: i64) -> Option<i64> {
		self.zones
			.iter()
			.find(|zone| zone.id == zone_id)?
			.partitions
			.iter()
			.find(|partition| partition.default)
			.map(|partition| partition.id)
	}
}

/// Zone entry of a [`PartitionedExpansion`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionedZone {
	/// Zone id.
	pub id: i64,
	/// Display name.
	pub name: String,
	/// Ranking partitions; empty for zones without rankings.
	pub partitions: Vec<Partition>,
}

/// Inputs of [`CHARACTER_PARSES_DOCUMENT`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharacterParsesRequest {
	/// Character name.
	pub name: String,
	/// Realm slug.
	pub server_slug: String,
	/// Region label.
	pub server_region: String,
	/// Zone to rank.
	pub zone_id: i64,
	/// Explicit partition; the zone default applies when `None`.
	pub partition: Option<i64>,
}
impl CharacterParsesRequest {
	/// Builds the request for a normalized character.
	pub fn new(character: &CharacterRef, zone_id: i64, partition: Option<i64>) -> Self {
		Self {
			name: character.name.clone(),
			server_slug: character.realm.clone(),
			server_region: character.region.as_str().to_owned(),
			zone_id,
			partition,
		}
	}

	pub(crate) fn variables(&self, partition: i64) -> Value {
		serde_json::json!({
			"name": self.name,
			"server_slug": self.server_slug,
			"server_region": self.server_region,
			"zone_id": self.zone_id,
			"partition": partition,
		})
	}
}

/// Response of [`CHARACTER_PARSES_DOCUMENT`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterParsesQuery {
	/// Character data.
	pub character_data: CharacterData,
	/// Budget after the query.
	pub rate_limit_data: RateLimitData,
}
impl RatedQuery for CharacterParsesQuery {
	const OPERATION: &'static str = "character_parses";

	fn rate_limit(&self) -> &RateLimitData {
		&self.rate_limit_data
	}
}

/// `characterData` selection.
#[derive(Clone, Debug, Deserialize)]
pub struct CharacterData {
	/// `null` when the upstream does not know the character.
	pub character: Option<CharacterParses>,
}

/// Ranking payload of one character.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "snake_case", deserialize = "camelCase"))]
pub struct CharacterParses {
	/// Whether the character hides its rankings.
	#[serde(default)]
	pub hidden: Option<bool>,
	/// Opaque zone rankings JSON.
	#[serde(default)]
	pub zone_rankings: Option<Value>,
}
