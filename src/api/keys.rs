//! Query keys and cache metadata for backend resources.

use crate::cache::{Cacheable, KeyError, QueryKey};
use crate::seasons::{self, Region};

use super::types::{
  Account, BuildGuide, CharacterProfile, CsrfToken, DungeonStats, LeaderboardPage, RecentRuns,
  TalentLoadouts,
};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for CharacterProfile {
  fn resource_kind() -> &'static str {
    "character_profile"
  }
}

impl Cacheable for TalentLoadouts {
  fn resource_kind() -> &'static str {
    "talent_loadouts"
  }
}

impl Cacheable for RecentRuns {
  fn resource_kind() -> &'static str {
    "recent_runs"
  }
}

impl Cacheable for DungeonStats {
  fn resource_kind() -> &'static str {
    "dungeon_stats"
  }
}

impl Cacheable for LeaderboardPage {
  fn resource_kind() -> &'static str {
    "leaderboard_page"
  }
}

impl Cacheable for BuildGuide {
  fn resource_kind() -> &'static str {
    "build_guide"
  }
}

impl Cacheable for CsrfToken {
  fn resource_kind() -> &'static str {
    "csrf_token"
  }

  fn persist() -> bool {
    false
  }
}

impl Cacheable for Account {
  fn resource_kind() -> &'static str {
    "account"
  }

  fn persist() -> bool {
    false
  }
}

// ============================================================================
// Query types
// ============================================================================

/// A request that cannot be issued. Rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidQuery {
  #[error("realm is empty")]
  EmptyRealm,
  #[error("character name is empty")]
  EmptyName,
  #[error("unknown season: {0}")]
  UnknownSeason(String),
  #[error("dungeon {dungeon} is not part of {season}")]
  DungeonNotInSeason { season: String, dungeon: String },
  #[error("unknown class: {0}")]
  UnknownClass(String),
  #[error("{class} has no {spec} specialization")]
  UnknownSpec { class: String, spec: String },
  #[error("invalid email address: {0:?}")]
  InvalidEmail(String),
  #[error("username is empty")]
  EmptyUsername,
  #[error(transparent)]
  Key(#[from] KeyError),
}

/// Semantic queries against the backend.
///
/// Constructors validate and normalize their inputs, so equal parameters
/// always produce equal keys regardless of how the user typed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiQuery {
  Character {
    region: Region,
    realm: String,
    name: String,
  },
  Talents {
    region: Region,
    realm: String,
    name: String,
  },
  Runs {
    region: Region,
    realm: String,
    name: String,
    season: &'static str,
  },
  DungeonStats {
    season: &'static str,
    region: Region,
  },
  Leaderboard {
    season: &'static str,
    region: Region,
    /// `None` for the all-dungeons leaderboard
    dungeon: Option<&'static str>,
    page: u32,
  },
  BuildGuide {
    class: &'static str,
    spec: &'static str,
  },
  CsrfToken,
  Account,
}

/// Path segments and query string of a GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
  pub segments: Vec<String>,
  pub query: Vec<(&'static str, String)>,
}

impl ApiQuery {
  pub fn character(region: Region, realm: &str, name: &str) -> Result<Self, InvalidQuery> {
    let (realm, name) = normalize_character(realm, name)?;
    Ok(Self::Character {
      region,
      realm,
      name,
    })
  }

  pub fn talents(region: Region, realm: &str, name: &str) -> Result<Self, InvalidQuery> {
    let (realm, name) = normalize_character(realm, name)?;
    Ok(Self::Talents {
      region,
      realm,
      name,
    })
  }

  pub fn runs(region: Region, realm: &str, name: &str, season: &str) -> Result<Self, InvalidQuery> {
    let (realm, name) = normalize_character(realm, name)?;
    Ok(Self::Runs {
      region,
      realm,
      name,
      season: lookup_season(season)?.slug,
    })
  }

  pub fn dungeon_stats(season: &str, region: Region) -> Result<Self, InvalidQuery> {
    Ok(Self::DungeonStats {
      season: lookup_season(season)?.slug,
      region,
    })
  }

  pub fn leaderboard(
    season: &str,
    region: Region,
    dungeon: Option<&str>,
    page: u32,
  ) -> Result<Self, InvalidQuery> {
    let season = lookup_season(season)?;
    let dungeon = match dungeon.map(|d| d.trim().to_lowercase()) {
      Some(slug) => Some(
        season
          .dungeon(&slug)
          .map(|d| d.slug)
          .ok_or_else(|| InvalidQuery::DungeonNotInSeason {
            season: season.slug.to_string(),
            dungeon: slug,
          })?,
      ),
      None => None,
    };

    Ok(Self::Leaderboard {
      season: season.slug,
      region,
      dungeon,
      page,
    })
  }

  pub fn build_guide(class: &str, spec: &str) -> Result<Self, InvalidQuery> {
    let class_slug = slugify(class);
    let class = seasons::find_class(&class_slug)
      .ok_or_else(|| InvalidQuery::UnknownClass(class.trim().to_string()))?;
    let spec_slug = slugify(spec);
    let spec = class
      .specs
      .iter()
      .copied()
      .find(|s| *s == spec_slug)
      .ok_or_else(|| InvalidQuery::UnknownSpec {
        class: class.name.to_string(),
        spec: spec.trim().to_string(),
      })?;

    Ok(Self::BuildGuide {
      class: class.slug,
      spec,
    })
  }

  /// Resource name of the cache key.
  pub fn resource(&self) -> &'static str {
    match self {
      Self::Character { .. } => "character",
      Self::Talents { .. } => "characterTalents",
      Self::Runs { .. } => "characterRuns",
      Self::DungeonStats { .. } => "dungeonStats",
      Self::Leaderboard { .. } => "leaderboard",
      Self::BuildGuide { .. } => "buildGuide",
      Self::CsrfToken => "csrfToken",
      Self::Account => "account",
    }
  }

  pub fn key(&self) -> Result<QueryKey, KeyError> {
    let params: Vec<String> = match self {
      Self::Character {
        region,
        realm,
        name,
      }
      | Self::Talents {
        region,
        realm,
        name,
      } => vec![region.to_string(), realm.clone(), name.clone()],
      Self::Runs {
        region,
        realm,
        name,
        season,
      } => vec![
        region.to_string(),
        realm.clone(),
        name.clone(),
        season.to_string(),
      ],
      Self::DungeonStats { season, region } => vec![season.to_string(), region.to_string()],
      Self::Leaderboard {
        season,
        region,
        dungeon,
        page,
      } => vec![
        season.to_string(),
        region.to_string(),
        dungeon.unwrap_or("all").to_string(),
        page.to_string(),
      ],
      Self::BuildGuide { class, spec } => vec![class.to_string(), spec.to_string()],
      Self::CsrfToken | Self::Account => Vec::new(),
    };

    QueryKey::new(self.resource(), params)
  }

  /// The GET request that answers this query.
  pub fn endpoint(&self) -> Endpoint {
    let path = |parts: &[&str]| -> Vec<String> {
      std::iter::once("api")
        .chain(parts.iter().copied())
        .map(String::from)
        .collect()
    };

    match self {
      Self::Character {
        region,
        realm,
        name,
      } => Endpoint {
        segments: path(&["characters", region.slug(), realm.as_str(), name.as_str()]),
        query: Vec::new(),
      },
      Self::Talents {
        region,
        realm,
        name,
      } => Endpoint {
        segments: path(&["characters", region.slug(), realm.as_str(), name.as_str(), "talents"]),
        query: Vec::new(),
      },
      Self::Runs {
        region,
        realm,
        name,
        season,
      } => Endpoint {
        segments: path(&["characters", region.slug(), realm.as_str(), name.as_str(), "runs"]),
        query: vec![("season", season.to_string())],
      },
      Self::DungeonStats { season, region } => Endpoint {
        segments: path(&["stats", "dungeons"]),
        query: vec![("season", season.to_string()), ("region", region.to_string())],
      },
      Self::Leaderboard {
        season,
        region,
        dungeon,
        page,
      } => Endpoint {
        segments: path(&["leaderboards", "mythic-plus"]),
        query: vec![
          ("season", season.to_string()),
          ("region", region.to_string()),
          ("dungeon", dungeon.unwrap_or("all").to_string()),
          ("page", page.to_string()),
        ],
      },
      Self::BuildGuide { class, spec } => Endpoint {
        segments: path(&["builds", *class, *spec]),
        query: Vec::new(),
      },
      Self::CsrfToken => Endpoint {
        segments: path(&["csrf-token"]),
        query: Vec::new(),
      },
      Self::Account => Endpoint {
        segments: path(&["account"]),
        query: Vec::new(),
      },
    }
  }
}

fn lookup_season(slug: &str) -> Result<&'static seasons::Season, InvalidQuery> {
  let slug = slug.trim().to_lowercase();
  seasons::find_season(&slug).ok_or(InvalidQuery::UnknownSeason(slug))
}

/// Normalize realm and character name the way the backend indexes them.
fn normalize_character(realm: &str, name: &str) -> Result<(String, String), InvalidQuery> {
  let realm = slugify(realm);
  if realm.is_empty() {
    return Err(InvalidQuery::EmptyRealm);
  }
  let name = name.trim().to_lowercase();
  if name.is_empty() {
    return Err(InvalidQuery::EmptyName);
  }
  Ok((realm, name))
}

/// "Area 52" -> "area-52", "Kel'Thuzad" -> "kelthuzad"
fn slugify(s: &str) -> String {
  s.split_whitespace()
    .map(|word| {
      word
        .chars()
        .filter(|c| !matches!(c, '\'' | '’'))
        .collect::<String>()
        .to_lowercase()
    })
    .filter(|word| !word.is_empty())
    .collect::<Vec<_>>()
    .join("-")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_session_resources_stay_in_memory() {
    assert!(!CsrfToken::persist());
    assert!(!Account::persist());
    assert!(DungeonStats::persist());
    assert!(CharacterProfile::persist());
  }

  #[test]
  fn test_character_input_is_normalized() {
    let a = ApiQuery::character(Region::Us, "Area 52", "Thrall").unwrap();
    let b = ApiQuery::character(Region::Us, "  area 52 ", "THRALL ").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.key().unwrap(), b.key().unwrap());
    assert_eq!(
      a.key().unwrap().params(),
      &["us".to_string(), "area-52".to_string(), "thrall".to_string()]
    );
  }

  #[test]
  fn test_slugify_drops_apostrophes() {
    assert_eq!(slugify("Kel'Thuzad"), "kelthuzad");
    assert_eq!(slugify("Beast Mastery"), "beast-mastery");
  }

  #[test]
  fn test_empty_character_fields_rejected() {
    assert_eq!(
      ApiQuery::character(Region::Eu, "  ", "jaina"),
      Err(InvalidQuery::EmptyRealm)
    );
    assert_eq!(
      ApiQuery::talents(Region::Eu, "kazzak", ""),
      Err(InvalidQuery::EmptyName)
    );
  }

  #[test]
  fn test_different_resources_get_different_keys() {
    let profile = ApiQuery::character(Region::Us, "illidan", "thrall").unwrap();
    let talents = ApiQuery::talents(Region::Us, "illidan", "thrall").unwrap();
    assert_ne!(profile.key().unwrap(), talents.key().unwrap());
  }

  #[test]
  fn test_dungeon_stats_key() {
    let query = ApiQuery::dungeon_stats("season-tww-2", Region::Us).unwrap();
    assert_eq!(
      query.key().unwrap(),
      QueryKey::new("dungeonStats", ["season-tww-2", "us"]).unwrap()
    );
  }

  #[test]
  fn test_unknown_season_rejected() {
    assert_eq!(
      ApiQuery::dungeon_stats("season-bc-1", Region::Us),
      Err(InvalidQuery::UnknownSeason("season-bc-1".to_string()))
    );
  }

  #[test]
  fn test_leaderboard_dungeon_must_be_in_season() {
    let ok = ApiQuery::leaderboard("season-tww-2", Region::Eu, Some("The-Rookery"), 0).unwrap();
    assert!(matches!(
      ok,
      ApiQuery::Leaderboard {
        dungeon: Some("the-rookery"),
        ..
      }
    ));

    let err = ApiQuery::leaderboard("season-tww-2", Region::Eu, Some("the-stonevault"), 0);
    assert!(matches!(err, Err(InvalidQuery::DungeonNotInSeason { .. })));
  }

  #[test]
  fn test_leaderboard_pages_are_distinct_keys() {
    let first = ApiQuery::leaderboard("season-tww-2", Region::Us, None, 0).unwrap();
    let second = ApiQuery::leaderboard("season-tww-2", Region::Us, None, 1).unwrap();
    assert_ne!(first.key().unwrap(), second.key().unwrap());
  }

  #[test]
  fn test_build_guide_validates_class_and_spec() {
    let query = ApiQuery::build_guide("Death Knight", "Frost").unwrap();
    assert_eq!(
      query,
      ApiQuery::BuildGuide {
        class: "death-knight",
        spec: "frost"
      }
    );

    assert!(matches!(
      ApiQuery::build_guide("bard", "lute"),
      Err(InvalidQuery::UnknownClass(_))
    ));
    assert!(matches!(
      ApiQuery::build_guide("mage", "holy"),
      Err(InvalidQuery::UnknownSpec { .. })
    ));
  }

  #[test]
  fn test_endpoints() {
    let runs = ApiQuery::runs(Region::Kr, "azshara", "hero", "season-tww-1").unwrap();
    let endpoint = runs.endpoint();
    assert_eq!(
      endpoint.segments,
      ["api", "characters", "kr", "azshara", "hero", "runs"]
    );
    assert_eq!(endpoint.query, vec![("season", "season-tww-1".to_string())]);

    let board = ApiQuery::leaderboard("season-tww-2", Region::Us, None, 2).unwrap();
    assert_eq!(board.endpoint().segments, ["api", "leaderboards", "mythic-plus"]);
    assert!(board
      .endpoint()
      .query
      .contains(&("dungeon", "all".to_string())));

    assert_eq!(ApiQuery::CsrfToken.endpoint().segments, ["api", "csrf-token"]);
  }

  #[test]
  fn test_parameterless_keys() {
    let key = ApiQuery::Account.key().unwrap();
    assert_eq!(key.resource(), "account");
    assert!(key.params().is_empty());
  }
}
