//! Serde types matching backend wire formats that differ from the domain types.
//!
//! Most endpoints return the domain shape directly. The leaderboard endpoint
//! nests its data the way the upstream rankings service does, so it is decoded
//! here and flattened into [`LeaderboardPage`].

use serde::{Deserialize, Serialize};

use super::types::{LeaderboardEntry, LeaderboardPage, RosterMember};

// ============================================================================
// Error and request bodies
// ============================================================================

/// JSON body of a non-success response
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub message: Option<String>,
  pub error: Option<String>,
}

impl ApiErrorBody {
  pub fn detail(&self) -> Option<&str> {
    self.message.as_deref().or(self.error.as_deref())
  }
}

#[derive(Debug, Serialize)]
pub struct UpdateEmailRequest<'a> {
  pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub struct UpdateUsernameRequest<'a> {
  pub username: &'a str,
}

// ============================================================================
// Leaderboard endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiNamed {
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiCharacterRef {
  pub name: String,
  pub realm: ApiNamed,
  pub class: ApiNamed,
  pub spec: ApiNamed,
}

#[derive(Debug, Deserialize)]
pub struct ApiRosterEntry {
  pub character: ApiCharacterRef,
  pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiDungeonRef {
  pub slug: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiRankedRun {
  pub dungeon: ApiDungeonRef,
  pub mythic_level: u32,
  pub clear_time_ms: u64,
  pub completed_at: String,
  #[serde(default)]
  pub roster: Vec<ApiRosterEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ApiRankedGroup {
  pub rank: u32,
  pub score: f32,
  pub run: ApiRankedRun,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiRankings {
  #[serde(default)]
  pub ranked_groups: Vec<ApiRankedGroup>,
}

#[derive(Debug, Deserialize)]
pub struct ApiLeaderboardResponse {
  #[serde(default)]
  pub rankings: ApiRankings,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiRosterEntry> for RosterMember {
  fn from(entry: ApiRosterEntry) -> Self {
    let c = entry.character;
    RosterMember {
      name: c.name,
      realm: c.realm.name,
      class: c.class.name,
      spec: c.spec.name,
      role: entry.role,
    }
  }
}

impl From<ApiRankedGroup> for LeaderboardEntry {
  fn from(group: ApiRankedGroup) -> Self {
    let run = group.run;
    LeaderboardEntry {
      rank: group.rank,
      score: group.score,
      dungeon: run.dungeon.slug,
      mythic_level: run.mythic_level,
      clear_time_ms: run.clear_time_ms,
      completed_at: run.completed_at,
      members: run.roster.into_iter().map(RosterMember::from).collect(),
    }
  }
}

impl ApiLeaderboardResponse {
  /// Flatten into a page, tagging it with the request it answered.
  pub fn into_page(
    self,
    season: &str,
    region: &str,
    dungeon: Option<&str>,
    page: u32,
  ) -> LeaderboardPage {
    LeaderboardPage {
      season: season.to_string(),
      region: region.to_string(),
      dungeon: dungeon.map(String::from),
      page,
      entries: self
        .rankings
        .ranked_groups
        .into_iter()
        .map(LeaderboardEntry::from)
        .collect(),
    }
  }
}
