//! Plain-text rendering of query results.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::api::types::{
  Account, BuildGuide, CharacterProfile, DungeonStats, LeaderboardPage, RecentRuns,
  TalentLoadouts,
};
use crate::query::QueryResult;
use crate::seasons::{self, Season};

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Format a run duration as m:ss
pub fn clear_time(ms: u64) -> String {
  let secs = ms / 1000;
  format!("{}:{:02}", secs / 60, secs % 60)
}

/// "just now", "5m ago", "3h ago", "2d ago"
pub fn age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let secs = (now - at).num_seconds().max(0);
  match secs {
    0..=59 => "just now".to_string(),
    60..=3599 => format!("{}m ago", secs / 60),
    3600..=86_399 => format!("{}h ago", secs / 3600),
    _ => format!("{}d ago", secs / 86_400),
  }
}

/// One-line note about how current a result is, if there is anything to say.
pub fn freshness<T>(result: &QueryResult<T>, now: DateTime<Utc>) -> Option<String> {
  let updated = result.updated_at().map(|at| age(at, now));

  match (result.error(), result.data().is_some()) {
    (Some(err), true) => Some(format!(
      "showing cached data ({}), refresh failed: {}",
      updated.unwrap_or_else(|| "unknown age".to_string()),
      err
    )),
    _ if result.is_stale() => Some(format!(
      "cached {}, refreshing in the background",
      updated.unwrap_or_else(|| "earlier".to_string())
    )),
    _ => None,
  }
}

/// Display name of a dungeon slug, falling back to the slug itself.
fn dungeon_name(season: Option<&Season>, slug: &str) -> String {
  season
    .and_then(|s| s.dungeon(slug))
    .or_else(|| {
      seasons::SEASONS
        .iter()
        .find_map(|s| s.dungeon(slug))
    })
    .map(|d| d.name.to_string())
    .unwrap_or_else(|| slug.to_string())
}

pub fn profile(p: &CharacterProfile) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{} @ {} ({})", p.name, p.realm, p.region.to_uppercase());
  let _ = writeln!(
    out,
    "{} {} {}{}",
    p.race,
    p.active_spec_name,
    p.class,
    p.active_spec_role
      .as_deref()
      .map(|r| format!(" [{}]", r))
      .unwrap_or_default()
  );
  if let Some(guild) = &p.guild {
    let _ = writeln!(out, "<{}>", guild);
  }
  let _ = writeln!(out, "Item level:  {:.1}", p.item_level);
  let _ = write!(out, "M+ score:    {:.1}", p.mythic_plus_score);
  out
}

pub fn talents(t: &TalentLoadouts) -> String {
  if t.loadouts.is_empty() {
    return "No saved talent loadouts".to_string();
  }

  let mut lines = vec!["Talent loadouts:".to_string()];
  for loadout in &t.loadouts {
    let marker = if loadout.is_active { "*" } else { " " };
    lines.push(format!(
      "{} {:<14} {:<20} {}",
      marker,
      loadout.spec_name,
      truncate(loadout.name.as_deref().unwrap_or("-"), 20),
      truncate(&loadout.export_string, 40)
    ));
  }
  lines.join("\n")
}

pub fn runs(r: &RecentRuns) -> String {
  let season = seasons::find_season(&r.season);
  let mut lines = Vec::new();

  for (title, list) in [("Best runs", &r.best_runs), ("Recent runs", &r.recent_runs)] {
    lines.push(format!("{} ({}):", title, season.map_or(r.season.as_str(), |s| s.name)));
    if list.is_empty() {
      lines.push("  none".to_string());
      continue;
    }
    for run in list {
      let result = if run.is_timed() {
        format!("+{}", run.num_keystone_upgrades)
      } else {
        "depleted".to_string()
      };
      lines.push(format!(
        "  {:<32} {:>3} {:>9} {:>8} {:>7.1}",
        truncate(&dungeon_name(season, &run.dungeon), 32),
        run.mythic_level,
        result,
        clear_time(run.clear_time_ms),
        run.score
      ));
    }
  }
  lines.join("\n")
}

pub fn dungeon_stats(s: &DungeonStats) -> String {
  let season = seasons::find_season(&s.season);
  let mut lines = vec![format!(
    "{} / {}",
    season.map_or(s.season.as_str(), |s| s.name),
    s.region.to_uppercase()
  )];
  lines.push(format!(
    "{:<32} {:>8} {:>7} {:>7} {:>7}",
    "Dungeon", "Runs", "Timed", "Max", "Avg"
  ));

  for d in &s.dungeons {
    lines.push(format!(
      "{:<32} {:>8} {:>6.0}% {:>7} {:>7.1}",
      truncate(&dungeon_name(season, &d.dungeon), 32),
      d.total_runs,
      d.timed_rate() * 100.0,
      d.highest_level,
      d.average_level
    ));
  }
  if s.dungeons.is_empty() {
    lines.push("no runs recorded".to_string());
  }
  lines.join("\n")
}

pub fn leaderboard(page: &LeaderboardPage) -> String {
  let season = seasons::find_season(&page.season);
  let scope = page
    .dungeon
    .as_deref()
    .map(|d| dungeon_name(season, d))
    .unwrap_or_else(|| "All dungeons".to_string());
  let mut lines = vec![format!(
    "{} / {} / {} (page {})",
    season.map_or(page.season.as_str(), |s| s.name),
    page.region.to_uppercase(),
    scope,
    page.page + 1
  )];

  for entry in &page.entries {
    let members: Vec<String> = entry
      .members
      .iter()
      .map(|m| format!("{} ({} {})", m.name, m.spec, m.class))
      .collect();
    lines.push(format!(
      "{:>4}. {:>6.1} +{:<3} {:<8} {}",
      entry.rank,
      entry.score,
      entry.mythic_level,
      clear_time(entry.clear_time_ms),
      truncate(&members.join(", "), 100)
    ));
  }
  if page.entries.is_empty() {
    lines.push("no entries".to_string());
  }
  lines.join("\n")
}

pub fn build_guide(b: &BuildGuide) -> String {
  let class_name = seasons::find_class(&b.class).map_or(b.class.as_str(), |c| c.name);
  let mut lines = vec![format!("{} {}", b.spec, class_name)];
  if !b.stat_priority.is_empty() {
    lines.push(format!("Stats: {}", b.stat_priority.join(" > ")));
  }
  for (i, build) in b.builds.iter().enumerate() {
    lines.push(format!(
      "{}. {:>5.1}%  {}",
      i + 1,
      build.popularity * 100.0,
      build.export_string
    ));
  }
  lines.join("\n")
}

pub fn account(a: &Account) -> String {
  format!(
    "{} <{}>{}",
    a.username,
    a.email,
    if a.email_verified { "" } else { " (unverified)" }
  )
}

pub fn season_list() -> String {
  let current = seasons::current_season().slug;
  let mut lines = Vec::new();
  for season in seasons::SEASONS.iter().rev() {
    let marker = if season.slug == current { " (current)" } else { "" };
    lines.push(format!("{}  {}{}", season.slug, season.name, marker));
    for dungeon in season.dungeons {
      lines.push(format!("    {:<6} {}", dungeon.short_name, dungeon.slug));
    }
  }
  lines.join("\n")
}
