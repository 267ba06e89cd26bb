use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use wowstat::commands::Command;
use wowstat::config::{Config, DefaultsConfig};
use wowstat::seasons::Region;
use wowstat::{app, logging, render};

#[derive(Parser, Debug)]
#[command(name = "wowstat")]
#[command(about = "Character profiles, Mythic+ leaderboards and dungeon statistics")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/wowstat/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Region to query (overrides defaults.region)
  #[arg(short, long, value_enum, ignore_case = true)]
  region: Option<Region>,

  /// Also log to stderr, at debug level
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.verbose)?;

  if !args.command.needs_config() {
    println!("{}", render::season_list());
    return Ok(());
  }

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override region if specified on command line
  let config = if let Some(region) = args.region {
    Config {
      defaults: DefaultsConfig {
        region,
        ..config.defaults
      },
      ..config
    }
  } else {
    config
  };

  let app = app::App::new(config)?;
  app.run(args.command).await?;

  Ok(())
}
