//! Normalized request parameters shared by every upstream executor.

// self
use crate::{_prelude::*, error::ValidationError};

/// Game region served by the upstream APIs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
	/// Americas.
	Us,
	/// Europe.
	Eu,
	/// Korea.
	Kr,
	/// Taiwan.
	Tw,
}
impl Region {
	/// Lowercase label used in URLs, namespaces, and cache keys.
	pub const fn as_str(self) -> &'static str {
		match self {
			Region::Us => "us",
			Region::Eu => "eu",
			Region::Kr => "kr",
			Region::Tw => "tw",
		}
	}
}
impl Display for Region {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Region {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"us" => Ok(Region::Us),
			"eu" => Ok(Region::Eu),
			"kr" => Ok(Region::Kr),
			"tw" => Ok(Region::Tw),
			_ => Err(ValidationError::UnsupportedRegion { region: s.to_owned() }),
		}
	}
}

/// Region, realm slug, and character name identifying one character.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CharacterRef {
	/// Character region.
	pub region: Region,
	/// Lowercased realm slug.
	pub realm: String,
	/// Lowercased character name.
	pub name: String,
}
impl CharacterRef {
	/// Shortest accepted character name.
	pub const MIN_NAME_LEN: usize = 2;
	/// Longest accepted character name.
	pub const MAX_NAME_LEN: usize = 12;

	/// Normalizes and validates the realm and name.
	pub fn new(
		region: Region,
		realm: impl AsRef<str>,
		name: impl AsRef<str>,
	) -> Result<Self, ValidationError> {
		let realm = realm.as_ref().trim().to_lowercase();

		if realm.is_empty() {
			return Err(ValidationError::Empty { field: "realm" });
		}

		let name = name.as_ref().trim().to_lowercase();
		let len = name.chars().count();

		if !(Self::MIN_NAME_LEN..=Self::MAX_NAME_LEN).contains(&len) {
			return Err(ValidationError::CharacterNameLength { len });
		}

		Ok(Self { region, realm, name })
	}

	/// Parses every component from raw path segments.
	pub fn parse(region: &str, realm: &str, name: &str) -> Result<Self, ValidationError> {
		Self::new(region.parse()?, realm, name)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn region_parses_case_insensitively() {
		assert_eq!("US".parse::<Region>(), Ok(Region::Us));
		assert_eq!("tw".parse::<Region>(), Ok(Region::Tw));
		assert!(matches!(
			"cn".parse::<Region>(),
			Err(ValidationError::UnsupportedRegion { region }) if region == "cn"
		));
	}

	#[test]
	fn character_ref_normalizes_and_validates() {
		let character = CharacterRef::parse("EU", "Twisting-Nether", "Ólafúr")
			.expect("Character fixture should be valid.");

		assert_eq!(character.region, Region::Eu);
		assert_eq!(character.realm, "twisting-nether");
		assert_eq!(character.name, "ólafúr");
		assert_eq!(
			CharacterRef::new(Region::Us, "illidan", "a"),
			Err(ValidationError::CharacterNameLength { len: 1 })
		);
		assert_eq!(
			CharacterRef::new(Region::Us, "illidan", "abcdefghijklm"),
			Err(ValidationError::CharacterNameLength { len: 13 })
		);
		assert_eq!(
			CharacterRef::new(Region::Us, "  ", "valid"),
			Err(ValidationError::Empty { field: "realm" })
		);
	}
}
