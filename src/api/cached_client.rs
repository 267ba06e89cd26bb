//! Backend client with transparent caching.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::cache::{Cacheable, QueryClient, QueryKey, SqliteStorage, Subscription};
use crate::config::Config;
use crate::error::QueryError;
use crate::query::QueryResult;
use crate::seasons::Region;

use super::api_types::ApiLeaderboardResponse;
use super::client::BackendClient;
use super::keys::{ApiQuery, InvalidQuery};
use super::types::{
  Account, BuildGuide, CharacterProfile, CsrfToken, DungeonStats, LeaderboardPage, RecentRuns,
  TalentLoadouts,
};
use super::ApiError;

/// Backend client whose reads all go through one [`QueryClient`].
///
/// Reads never fail once the query is valid: transport and decode errors come
/// back inside the [`QueryResult`]. Writes go through
/// [`QueryClient::mutate`] and invalidate what they change.
#[derive(Clone)]
pub struct CachedApiClient {
  api: BackendClient,
  cache: QueryClient,
}

impl CachedApiClient {
  /// Create a client from configuration, with SQLite snapshots when enabled.
  pub fn new(config: &Config) -> Result<Self> {
    let api = BackendClient::new(&config.api)?;
    let query_config = config.cache.query_config(config.api.timeout());

    let cache = if config.cache.persist {
      let storage = SqliteStorage::open(config.cache.path.as_deref())?;
      QueryClient::with_storage(query_config, Arc::new(storage))
    } else {
      QueryClient::new(query_config)
    };

    Ok(Self::from_parts(api, cache))
  }

  pub fn from_parts(api: BackendClient, cache: QueryClient) -> Self {
    Self { api, cache }
  }

  pub fn cache(&self) -> &QueryClient {
    &self.cache
  }

  pub async fn character(
    &self,
    region: Region,
    realm: &str,
    name: &str,
  ) -> Result<QueryResult<CharacterProfile>, InvalidQuery> {
    self.read(ApiQuery::character(region, realm, name)?).await
  }

  pub async fn talents(
    &self,
    region: Region,
    realm: &str,
    name: &str,
  ) -> Result<QueryResult<TalentLoadouts>, InvalidQuery> {
    self.read(ApiQuery::talents(region, realm, name)?).await
  }

  pub async fn runs(
    &self,
    region: Region,
    realm: &str,
    name: &str,
    season: &str,
  ) -> Result<QueryResult<RecentRuns>, InvalidQuery> {
    self
      .read(ApiQuery::runs(region, realm, name, season)?)
      .await
  }

  pub async fn dungeon_stats(
    &self,
    season: &str,
    region: Region,
  ) -> Result<QueryResult<DungeonStats>, InvalidQuery> {
    self.read(ApiQuery::dungeon_stats(season, region)?).await
  }

  /// Live view onto dungeon statistics, refreshed whenever the entry changes.
  pub fn subscribe_dungeon_stats(
    &self,
    season: &str,
    region: Region,
  ) -> Result<Subscription<DungeonStats>, InvalidQuery> {
    let query = ApiQuery::dungeon_stats(season, region)?;
    let key = query.key()?;
    let fetcher = self.fetcher(query, |api, query| async move {
      api.get::<DungeonStats>(&query).await
    });
    Ok(self.cache.subscribe(&key, fetcher))
  }

  pub async fn leaderboard(
    &self,
    season: &str,
    region: Region,
    dungeon: Option<&str>,
    page: u32,
  ) -> Result<QueryResult<LeaderboardPage>, InvalidQuery> {
    let query = ApiQuery::leaderboard(season, region, dungeon, page)?;
    self
      .read_with(query, |api, query| async move {
        let response: ApiLeaderboardResponse = api.get(&query).await?;
        match query {
          ApiQuery::Leaderboard {
            season,
            region,
            dungeon,
            page,
          } => Ok(response.into_page(season, region.slug(), dungeon, page)),
          other => Err(QueryError::Decode(format!(
            "{} is not a leaderboard query",
            other.resource()
          ))),
        }
      })
      .await
  }

  pub async fn build_guide(
    &self,
    class: &str,
    spec: &str,
  ) -> Result<QueryResult<BuildGuide>, InvalidQuery> {
    self.read(ApiQuery::build_guide(class, spec)?).await
  }

  pub async fn account(&self) -> Result<QueryResult<Account>, InvalidQuery> {
    self.read(ApiQuery::Account).await
  }

  pub async fn csrf_token(&self) -> Result<QueryResult<CsrfToken>, InvalidQuery> {
    self.read(ApiQuery::CsrfToken).await
  }

  /// Change the account email.
  pub async fn update_email(&self, email: &str) -> Result<Account, ApiError> {
    let email = email.trim();
    if !is_plausible_email(email) {
      return Err(InvalidQuery::InvalidEmail(email.to_string()).into());
    }

    self
      .with_csrf(|api, token| async move { api.update_email(email, &token).await })
      .await
  }

  /// Change the account username.
  pub async fn update_username(&self, username: &str) -> Result<Account, ApiError> {
    let username = username.trim();
    if username.is_empty() {
      return Err(InvalidQuery::EmptyUsername.into());
    }

    self
      .with_csrf(|api, token| async move { api.update_username(username, &token).await })
      .await
  }

  /// Run an account mutation with a CSRF token from the cache.
  ///
  /// A rejected token is dropped and the mutation retried once with a fresh
  /// one. On success the account and the spent token are invalidated.
  async fn with_csrf<F, Fut>(&self, mutation: F) -> Result<Account, ApiError>
  where
    F: Fn(BackendClient, String) -> Fut,
    Fut: Future<Output = Result<Account, QueryError>>,
  {
    let csrf_key = ApiQuery::CsrfToken.key()?;
    let invalidates = [ApiQuery::Account.key()?, csrf_key.clone()];

    match self.mutate_once(&invalidates, &mutation).await {
      Err(ApiError::Query(QueryError::Forbidden)) => {
        info!("CSRF token rejected, retrying with a fresh one");
        self.cache.invalidate(&csrf_key);
        self.mutate_once(&invalidates, &mutation).await
      }
      other => other,
    }
  }

  async fn mutate_once<F, Fut>(
    &self,
    invalidates: &[QueryKey],
    mutation: &F,
  ) -> Result<Account, ApiError>
  where
    F: Fn(BackendClient, String) -> Fut,
    Fut: Future<Output = Result<Account, QueryError>>,
  {
    let token = self.csrf_token().await?.into_result()?;
    let api = self.api.clone();
    let account = self
      .cache
      .mutate(invalidates, || mutation(api, token.csrf_token.clone()))
      .await?;
    Ok(account)
  }

  async fn read<T: Cacheable>(&self, query: ApiQuery) -> Result<QueryResult<T>, InvalidQuery> {
    self
      .read_with(query, |api, query| async move { api.get::<T>(&query).await })
      .await
  }

  async fn read_with<T, F, Fut>(
    &self,
    query: ApiQuery,
    fetch: F,
  ) -> Result<QueryResult<T>, InvalidQuery>
  where
    T: Cacheable,
    F: Fn(BackendClient, ApiQuery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, QueryError>> + Send + 'static,
  {
    let key = query.key()?;
    let fetcher = self.fetcher(query, fetch);
    Ok(self.cache.query(&key, fetcher).await)
  }

  /// Bind a fetch function to this client and query, producing a fetcher the
  /// cache can call any number of times.
  fn fetcher<T, F, Fut>(
    &self,
    query: ApiQuery,
    fetch: F,
  ) -> impl Fn() -> Fut + Send + Sync + 'static
  where
    F: Fn(BackendClient, ApiQuery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, QueryError>> + Send + 'static,
  {
    let api = self.api.clone();
    move || fetch(api.clone(), query.clone())
  }
}

fn is_plausible_email(email: &str) -> bool {
  match email.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
    }
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::test_server::TestServer;
  use crate::cache::QueryConfig;
  use crate::config::ApiConfig;

  const PROFILE: &str = r#"{
    "name": "Thrall",
    "realm": "Illidan",
    "region": "us",
    "race": "Orc",
    "class": "Shaman",
    "activeSpecName": "Enhancement",
    "itemLevel": 639.5,
    "mythicPlusScore": 3120.4
  }"#;

  const ACCOUNT: &str =
    r#"{"id": 7, "username": "thrall", "email": "old@example.com", "emailVerified": true}"#;
  const UPDATED_ACCOUNT: &str =
    r#"{"id": 7, "username": "thrall", "email": "new@example.com", "emailVerified": false}"#;

  fn client(server: &TestServer) -> CachedApiClient {
    let api = BackendClient::new(&ApiConfig {
      base_url: server.base_url.clone(),
      timeout_secs: 5,
      user_agent: None,
    })
    .unwrap();
    CachedApiClient::from_parts(api, QueryClient::new(QueryConfig::default()))
  }

  #[tokio::test]
  async fn test_concurrent_reads_share_one_request() {
    let server = TestServer::start(&[(
      "GET",
      "/api/characters/us/illidan/thrall",
      &[(200, PROFILE)],
    )])
    .await;
    let client = client(&server);

    let (a, b) = tokio::join!(
      client.character(Region::Us, "Illidan", "Thrall"),
      client.character(Region::Us, "illidan", "thrall"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.is_success());
    assert_eq!(a.data(), b.data());
    assert_eq!(a.data().unwrap().active_spec_name, "Enhancement");
    assert_eq!(server.count("GET", "/api/characters/us/illidan/thrall"), 1);

    // Fresh: served from cache
    let c = client
      .character(Region::Us, "illidan", "thrall")
      .await
      .unwrap();
    assert!(c.is_success());
    assert_eq!(server.count("GET", "/api/characters/us/illidan/thrall"), 1);
  }

  #[tokio::test]
  async fn test_not_found_is_reported_without_retry() {
    let server = TestServer::start(&[]).await;
    let client = client(&server);

    let result = client
      .character(Region::Eu, "kazzak", "nobody")
      .await
      .unwrap();

    assert!(result.is_error());
    assert_eq!(result.error(), Some(&QueryError::NotFound));
    assert_eq!(server.requests().len(), 1);
  }

  #[tokio::test]
  async fn test_query_parameters_are_sent() {
    let server = TestServer::start(&[(
      "GET",
      "/api/stats/dungeons",
      &[(
        200,
        r#"{"season": "season-tww-2", "region": "us", "dungeons": []}"#,
      )],
    )])
    .await;
    let client = client(&server);

    let result = client
      .dungeon_stats("season-tww-2", Region::Us)
      .await
      .unwrap();
    assert!(result.is_success());

    let requests = server.requests();
    assert_eq!(
      requests[0].query.as_deref(),
      Some("season=season-tww-2&region=us")
    );
  }

  #[tokio::test]
  async fn test_leaderboard_is_flattened() {
    let server = TestServer::start(&[(
      "GET",
      "/api/leaderboards/mythic-plus",
      &[(
        200,
        r#"{"rankings": {"rankedGroups": [{
          "rank": 1, "score": 500.0,
          "run": {"dungeon": {"slug": "the-rookery"}, "mythic_level": 21,
                  "clear_time_ms": 1500000, "completed_at": "2025-04-01T00:00:00Z"}
        }]}}"#,
      )],
    )])
    .await;
    let client = client(&server);

    let result = client
      .leaderboard("season-tww-2", Region::Us, Some("the-rookery"), 0)
      .await
      .unwrap();
    let page = result.data().unwrap();
    assert_eq!(page.entries[0].mythic_level, 21);
    assert_eq!(page.dungeon.as_deref(), Some("the-rookery"));
    assert_eq!(page.season, "season-tww-2");
  }

  #[tokio::test]
  async fn test_invalid_query_makes_no_request() {
    let server = TestServer::start(&[]).await;
    let client = client(&server);

    let err = client
      .leaderboard("season-tww-2", Region::Us, Some("the-stonevault"), 0)
      .await
      .unwrap_err();
    assert!(matches!(err, InvalidQuery::DungeonNotInSeason { .. }));

    let err = client.build_guide("mage", "holy").await.unwrap_err();
    assert!(matches!(err, InvalidQuery::UnknownSpec { .. }));

    assert!(server.requests().is_empty());
  }

  #[tokio::test]
  async fn test_update_email_sends_token_and_invalidates_account() {
    let server = TestServer::start(&[
      ("GET", "/api/csrf-token", &[(200, r#"{"csrfToken": "t1"}"#)]),
      ("GET", "/api/account", &[(200, ACCOUNT), (200, UPDATED_ACCOUNT)]),
      ("POST", "/api/account/email", &[(200, UPDATED_ACCOUNT)]),
    ])
    .await;
    let client = client(&server);

    let before = client.account().await.unwrap();
    assert_eq!(before.data().unwrap().email, "old@example.com");

    let account = client.update_email(" new@example.com ").await.unwrap();
    assert_eq!(account.email, "new@example.com");

    let post = server
      .requests()
      .into_iter()
      .find(|r| r.method == "POST")
      .unwrap();
    assert_eq!(post.headers.get("x-csrf-token").map(String::as_str), Some("t1"));
    assert_eq!(post.body, r#"{"email":"new@example.com"}"#);

    // The cached account was invalidated, so the next read goes to the server
    let after = client.account().await.unwrap();
    assert_eq!(after.data().unwrap().email, "new@example.com");
    assert_eq!(server.count("GET", "/api/account"), 2);
  }

  #[tokio::test]
  async fn test_rejected_csrf_token_is_refreshed_once() {
    let server = TestServer::start(&[
      (
        "GET",
        "/api/csrf-token",
        &[(200, r#"{"csrfToken": "expired"}"#), (200, r#"{"csrfToken": "fresh"}"#)],
      ),
      (
        "POST",
        "/api/account/username",
        &[(403, r#"{"message": "bad token"}"#), (200, UPDATED_ACCOUNT)],
      ),
    ])
    .await;
    let client = client(&server);

    let account = client.update_username("thrall").await.unwrap();
    assert_eq!(account.id, 7);

    let tokens: Vec<String> = server
      .requests()
      .into_iter()
      .filter(|r| r.method == "POST")
      .filter_map(|r| r.headers.get("x-csrf-token").cloned())
      .collect();
    assert_eq!(tokens, ["expired", "fresh"]);
    assert_eq!(server.count("GET", "/api/csrf-token"), 2);
  }

  #[tokio::test]
  async fn test_second_csrf_rejection_is_returned() {
    let server = TestServer::start(&[
      ("GET", "/api/csrf-token", &[(200, r#"{"csrfToken": "t"}"#)]),
      ("POST", "/api/account/username", &[(403, "{}")]),
    ])
    .await;
    let client = client(&server);

    let err = client.update_username("thrall").await.unwrap_err();
    assert_eq!(err, ApiError::Query(QueryError::Forbidden));
    assert_eq!(server.count("POST", "/api/account/username"), 2);
  }

  #[tokio::test]
  async fn test_invalid_mutation_input_rejected_locally() {
    let server = TestServer::start(&[]).await;
    let client = client(&server);

    assert!(matches!(
      client.update_email("not-an-email").await,
      Err(ApiError::Invalid(InvalidQuery::InvalidEmail(_)))
    ));
    assert!(matches!(
      client.update_username("   ").await,
      Err(ApiError::Invalid(InvalidQuery::EmptyUsername))
    ));
    assert!(server.requests().is_empty());
  }

  #[test]
  fn test_plausible_email() {
    assert!(is_plausible_email("a@b.co"));
    assert!(!is_plausible_email("@b.co"));
    assert!(!is_plausible_email("a@localhost"));
    assert!(!is_plausible_email("a@.com"));
  }
}
