use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use futures::future::OptionFuture;
use std::time::Duration;
use tracing::{debug, info};

use crate::api::types::DungeonStats;
use crate::api::CachedApiClient;
use crate::cache::Subscription;
use crate::commands::{CacheAction, Command};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::query::QueryResult;
use crate::render;
use crate::seasons::Region;

/// How often unused cache entries are swept
const GC_INTERVAL: Duration = Duration::from_secs(60);

/// Runs one command against the cached backend client
pub struct App {
  config: Config,
  client: CachedApiClient,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let client = CachedApiClient::new(&config)?;
    Ok(Self { config, client })
  }

  fn region(&self) -> Region {
    self.config.defaults.region
  }

  fn season<'a>(&'a self, season: &'a Option<String>) -> &'a str {
    season
      .as_deref()
      .unwrap_or_else(|| self.config.defaults.season())
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    let gc = self.client.cache().spawn_gc(GC_INTERVAL);
    let result = self.dispatch(command).await;
    gc.abort();
    result
  }

  async fn dispatch(&self, command: Command) -> Result<()> {
    let client = &self.client;
    let region = self.region();

    match &command {
      Command::Character {
        realm,
        name,
        talents,
        runs,
        season,
      } => {
        let season = self.season(season);
        let (profile, talent_result, run_result) = tokio::join!(
          client.character(region, realm, name),
          OptionFuture::from(talents.then(|| client.talents(region, realm, name))),
          OptionFuture::from(runs.then(|| client.runs(region, realm, name, season))),
        );

        show(profile?, render::profile)?;
        if let Some(result) = talent_result {
          println!();
          show(result?, render::talents)?;
        }
        if let Some(result) = run_result {
          println!();
          show(result?, render::runs)?;
        }
      }
      Command::Dungeons { season } => {
        let result = client.dungeon_stats(self.season(season), region).await?;
        show(result, render::dungeon_stats)?;
      }
      Command::Leaderboard {
        dungeon,
        season,
        page,
      } => {
        let result = client
          .leaderboard(self.season(season), region, dungeon.as_deref(), *page)
          .await?;
        show(result, render::leaderboard)?;
      }
      Command::Build { class, spec } => {
        show(client.build_guide(class, spec).await?, render::build_guide)?;
      }
      Command::Seasons => println!("{}", render::season_list()),
      Command::Account => show(client.account().await?, render::account)?,
      Command::SetEmail { email } => {
        let account = client.update_email(email).await?;
        println!("Email updated: {}", render::account(&account));
      }
      Command::SetUsername { username } => {
        let account = client.update_username(username).await?;
        println!("Username updated: {}", render::account(&account));
      }
      Command::Watch { season, interval } => {
        self
          .watch(self.season(season), Duration::from_secs((*interval).max(1)))
          .await?;
      }
      Command::Cache {
        action: CacheAction::Clear,
      } => {
        client.cache().clear();
        client.cache().clear_persisted()?;
        if self.config.cache.persist {
          println!("Cache cleared");
        } else {
          println!("Persistence is disabled; nothing stored on disk");
        }
      }
    }

    Ok(())
  }

  /// Keep dungeon statistics on screen until Ctrl-C.
  ///
  /// The subscription redraws on every change; each tick re-queries, which
  /// revalidates in the background once the data has gone stale.
  async fn watch(&self, season: &str, interval: Duration) -> Result<()> {
    let region = self.region();
    let mut subscription = self.client.subscribe_dungeon_stats(season, region)?;
    let mut events = EventHandler::new(interval);
    info!(season, %region, ?interval, "Watching dungeon statistics");

    draw_watch(&subscription);
    loop {
      tokio::select! {
        changed = subscription.changed() => {
          if !changed {
            debug!("Entry removed, resubscribing");
            subscription = self.client.subscribe_dungeon_stats(season, region)?;
          }
          draw_watch(&subscription);
        }
        event = events.next() => match event {
          Some(Event::Tick) => {
            self.client.dungeon_stats(season, region).await?;
          }
          Some(Event::Quit) | None => break,
        },
      }
    }

    info!("Stopped watching");
    Ok(())
  }
}

/// Print a result, or fail with its error when there is nothing to show.
fn show<T>(result: QueryResult<T>, view: impl Fn(&T) -> String) -> Result<()> {
  let note = render::freshness(&result, Utc::now());
  match (result.data(), result.error()) {
    (Some(data), _) => {
      println!("{}", view(data));
      if let Some(note) = note {
        eprintln!("({})", note);
      }
      Ok(())
    }
    (None, Some(err)) => Err(eyre!("{}", err)),
    (None, None) => Err(eyre!("No data")),
  }
}

fn draw_watch(subscription: &Subscription<DungeonStats>) {
  let result = subscription.current();
  // Clear screen, cursor home
  print!("\x1b[2J\x1b[H");
  match (result.data(), result.error()) {
    (Some(stats), _) => println!("{}", render::dungeon_stats(stats)),
    (None, Some(err)) => println!("Error: {}", err),
    (None, None) => println!("Loading..."),
  }
  if result.is_loading() {
    println!("\nrefreshing...");
  } else if let Some(note) = render::freshness(&result, Utc::now()) {
    println!("\n{}", note);
  }
  println!("\nCtrl-C to quit");
}
