//! Domain types returned by the backend client.
//!
//! These are what the cache stores and what the CLI renders. They serialize
//! back to the same shape they were decoded from, so persisted snapshots
//! hydrate without a separate wire format.

use serde::{Deserialize, Serialize};

/// Character profile summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterProfile {
  pub name: String,
  pub realm: String,
  pub region: String,
  pub race: String,
  pub class: String,
  pub active_spec_name: String,
  pub active_spec_role: Option<String>,
  pub faction: Option<String>,
  #[serde(default)]
  pub item_level: f32,
  #[serde(default)]
  pub mythic_plus_score: f32,
  pub guild: Option<String>,
  pub thumbnail_url: Option<String>,
  pub last_crawled_at: Option<String>,
}

/// One saved talent loadout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalentLoadout {
  pub spec_name: String,
  pub name: Option<String>,
  /// In-game import string
  pub export_string: String,
  #[serde(default)]
  pub is_active: bool,
}

/// Talent loadouts of a character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalentLoadouts {
  #[serde(default)]
  pub loadouts: Vec<TalentLoadout>,
}

/// A completed Mythic+ run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MythicPlusRun {
  pub dungeon: String,
  pub short_name: String,
  pub mythic_level: u32,
  #[serde(default)]
  pub score: f32,
  pub clear_time_ms: u64,
  pub par_time_ms: u64,
  /// 0 when the timer was missed
  #[serde(default)]
  pub num_keystone_upgrades: u8,
  pub completed_at: String,
}

impl MythicPlusRun {
  pub fn is_timed(&self) -> bool {
    self.num_keystone_upgrades > 0
  }
}

/// Best and recent runs of a character in one season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentRuns {
  pub season: String,
  #[serde(default)]
  pub best_runs: Vec<MythicPlusRun>,
  #[serde(default)]
  pub recent_runs: Vec<MythicPlusRun>,
}

/// Aggregate statistics for one dungeon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonStat {
  pub dungeon: String,
  pub short_name: String,
  pub total_runs: u64,
  pub timed_runs: u64,
  pub highest_level: u32,
  #[serde(default)]
  pub average_level: f32,
}

impl DungeonStat {
  /// Share of runs completed in time, 0.0 - 1.0.
  pub fn timed_rate(&self) -> f32 {
    if self.total_runs == 0 {
      return 0.0;
    }
    self.timed_runs as f32 / self.total_runs as f32
  }
}

/// Dungeon statistics for a season and region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonStats {
  pub season: String,
  pub region: String,
  #[serde(default)]
  pub dungeons: Vec<DungeonStat>,
  pub updated_at: Option<String>,
}

/// Member of a leaderboard group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterMember {
  pub name: String,
  pub realm: String,
  pub class: String,
  pub spec: String,
  pub role: String,
}

/// One ranked group on a leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
  pub rank: u32,
  pub score: f32,
  pub dungeon: String,
  pub mythic_level: u32,
  pub clear_time_ms: u64,
  pub completed_at: String,
  pub members: Vec<RosterMember>,
}

/// A page of the Mythic+ leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
  pub season: String,
  pub region: String,
  /// `None` for the all-dungeons leaderboard
  pub dungeon: Option<String>,
  pub page: u32,
  pub entries: Vec<LeaderboardEntry>,
}

/// A popular talent build for a spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularBuild {
  pub export_string: String,
  /// Share of sampled players using this build, 0.0 - 1.0
  pub popularity: f32,
}

/// Build guide for a class and spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildGuide {
  pub class: String,
  pub spec: String,
  #[serde(default)]
  pub stat_priority: Vec<String>,
  #[serde(default)]
  pub builds: Vec<PopularBuild>,
  pub updated_at: Option<String>,
}

/// Anti-forgery token required by account mutations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfToken {
  pub csrf_token: String,
}

/// The signed-in account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
  pub id: u64,
  pub username: String,
  pub email: String,
  #[serde(default)]
  pub email_verified: bool,
  pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_character_profile_decodes_camel_case() {
    let profile: CharacterProfile = serde_json::from_str(
      r#"{
        "name": "Thrall",
        "realm": "Illidan",
        "region": "us",
        "race": "Orc",
        "class": "Shaman",
        "activeSpecName": "Enhancement",
        "activeSpecRole": "DPS",
        "itemLevel": 639.5,
        "mythicPlusScore": 3120.4
      }"#,
    )
    .unwrap();

    assert_eq!(profile.active_spec_name, "Enhancement");
    assert_eq!(profile.item_level, 639.5);
    assert!(profile.guild.is_none());
  }

  #[test]
  fn test_timed_rate() {
    let stat = DungeonStat {
      dungeon: "the-rookery".to_string(),
      short_name: "ROOK".to_string(),
      total_runs: 200,
      timed_runs: 150,
      highest_level: 18,
      average_level: 11.2,
    };
    assert_eq!(stat.timed_rate(), 0.75);

    let empty = DungeonStat {
      total_runs: 0,
      timed_runs: 0,
      ..stat
    };
    assert_eq!(empty.timed_rate(), 0.0);
  }

  #[test]
  fn test_missing_collections_default_to_empty() {
    let runs: RecentRuns = serde_json::from_str(r#"{"season": "season-tww-2"}"#).unwrap();
    assert!(runs.best_runs.is_empty());
    assert!(runs.recent_runs.is_empty());
  }
}
