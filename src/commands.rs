//! Command-line subcommands.

use clap::Subcommand;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Show a character profile
  Character {
    /// Realm name, e.g. "Area 52"
    realm: String,
    /// Character name
    name: String,
    /// Also show saved talent loadouts
    #[arg(long)]
    talents: bool,
    /// Also show best and recent Mythic+ runs
    #[arg(long)]
    runs: bool,
    /// Season for --runs (defaults to the configured season)
    #[arg(long)]
    season: Option<String>,
  },
  /// Per-dungeon statistics for a season
  Dungeons {
    #[arg(long)]
    season: Option<String>,
  },
  /// Mythic+ leaderboard, optionally for a single dungeon
  Leaderboard {
    /// Dungeon slug, e.g. "the-rookery"
    dungeon: Option<String>,
    #[arg(long)]
    season: Option<String>,
    #[arg(long, default_value_t = 0)]
    page: u32,
  },
  /// Popular builds for a class and specialization
  Build { class: String, spec: String },
  /// List known seasons and their dungeons
  Seasons,
  /// Show the signed-in account
  Account,
  /// Change the account email
  SetEmail { email: String },
  /// Change the account username
  SetUsername { username: String },
  /// Keep dungeon statistics on screen, refreshing in the background
  Watch {
    #[arg(long)]
    season: Option<String>,
    /// Seconds between refresh checks
    #[arg(long, default_value_t = 30)]
    interval: u64,
  },
  /// Manage the local cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
  /// Delete all persisted snapshots
  Clear,
}

impl Command {
  /// Whether the command needs a configuration file.
  pub fn needs_config(&self) -> bool {
    !matches!(self, Command::Seasons)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    Cli::try_parse_from(std::iter::once("wowstat").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn test_character_flags() {
    assert_eq!(
      parse(&["character", "Area 52", "Thrall", "--runs"]),
      Command::Character {
        realm: "Area 52".to_string(),
        name: "Thrall".to_string(),
        talents: false,
        runs: true,
        season: None,
      }
    );
  }

  #[test]
  fn test_leaderboard_defaults() {
    assert_eq!(
      parse(&["leaderboard"]),
      Command::Leaderboard {
        dungeon: None,
        season: None,
        page: 0,
      }
    );
  }

  #[test]
  fn test_kebab_case_subcommands() {
    assert_eq!(
      parse(&["set-email", "a@b.co"]),
      Command::SetEmail {
        email: "a@b.co".to_string()
      }
    );
    assert_eq!(
      parse(&["cache", "clear"]),
      Command::Cache {
        action: CacheAction::Clear
      }
    );
  }

  #[test]
  fn test_only_seasons_runs_without_config() {
    assert!(!Command::Seasons.needs_config());
    assert!(Command::Account.needs_config());
  }
}
