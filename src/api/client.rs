use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{ApiConfig, Config};
use crate::error::QueryError;

use super::api_types::{ApiErrorBody, UpdateEmailRequest, UpdateUsernameRequest};
use super::keys::ApiQuery;
use super::types::Account;

const CSRF_HEADER: &str = "X-CSRF-Token";

/// Backend REST API client
#[derive(Clone)]
pub struct BackendClient {
  http: reqwest::Client,
  base_url: Url,
  timeout: Duration,
}

impl BackendClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("Invalid API base URL {}", config.base_url));
    }

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(token) = Config::get_api_token() {
      let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("Invalid API token: {}", e))?;
      value.set_sensitive(true);
      headers.insert(AUTHORIZATION, value);
    }

    let timeout = config.timeout();
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .connect_timeout(timeout.min(Duration::from_secs(10)))
      .user_agent(config.user_agent())
      .default_headers(headers)
      .gzip(true)
      .deflate(true)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      timeout,
    })
  }

  /// Build an absolute URL from path segments, percent-encoding each one.
  fn url(&self, segments: &[String]) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  /// Fetch the resource answering `query`.
  pub async fn get<T: DeserializeOwned>(&self, query: &ApiQuery) -> Result<T, QueryError> {
    let endpoint = query.endpoint();
    let url = self.url(&endpoint.segments);
    debug!(%url, "GET");

    let request = self.http.get(url).query(&endpoint.query);
    self.send(request).await
  }

  pub async fn update_email(&self, email: &str, csrf_token: &str) -> Result<Account, QueryError> {
    self
      .post(&["account", "email"], &UpdateEmailRequest { email }, csrf_token)
      .await
  }

  pub async fn update_username(
    &self,
    username: &str,
    csrf_token: &str,
  ) -> Result<Account, QueryError> {
    self
      .post(
        &["account", "username"],
        &UpdateUsernameRequest { username },
        csrf_token,
      )
      .await
  }

  async fn post<B, T>(&self, path: &[&str], body: &B, csrf_token: &str) -> Result<T, QueryError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let segments: Vec<String> = std::iter::once("api")
      .chain(path.iter().copied())
      .map(String::from)
      .collect();
    let url = self.url(&segments);
    debug!(%url, "POST");

    let request = self
      .http
      .post(url)
      .header(CSRF_HEADER, csrf_token)
      .json(body);
    self.send(request).await
  }

  async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, QueryError> {
    let response = request
      .send()
      .await
      .map_err(|e| transport_error(&e, self.timeout))?;
    let status = response.status().as_u16();
    let body = response
      .bytes()
      .await
      .map_err(|e| transport_error(&e, self.timeout))?;

    decode_response(status, &body)
  }
}

/// Map a reqwest failure that produced no usable response.
fn transport_error(err: &reqwest::Error, timeout: Duration) -> QueryError {
  if err.is_timeout() {
    QueryError::Timeout(timeout)
  } else if err.is_decode() {
    QueryError::Decode(err.to_string())
  } else {
    QueryError::Network(err.to_string())
  }
}

/// Turn a status code and body into a typed value or an error.
pub(crate) fn decode_response<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, QueryError> {
  if (200..300).contains(&status) {
    return serde_json::from_slice(body).map_err(QueryError::from);
  }

  if let Ok(err) = serde_json::from_slice::<ApiErrorBody>(body) {
    if let Some(detail) = err.detail() {
      debug!(status, detail, "Backend returned an error");
    }
  }
  Err(QueryError::from_status(status))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::CsrfToken;
  use crate::seasons::Region;

  fn config(base_url: &str) -> ApiConfig {
    ApiConfig {
      base_url: base_url.to_string(),
      timeout_secs: 5,
      user_agent: None,
    }
  }

  #[test]
  fn test_decode_success() {
    let token: CsrfToken = decode_response(200, br#"{"csrfToken": "abc"}"#).unwrap();
    assert_eq!(token.csrf_token, "abc");
  }

  #[test]
  fn test_decode_status_mapping() {
    let body = br#"{"message": "nope"}"#;
    assert_eq!(
      decode_response::<CsrfToken>(401, body),
      Err(QueryError::Unauthorized)
    );
    assert_eq!(
      decode_response::<CsrfToken>(403, body),
      Err(QueryError::Forbidden)
    );
    assert_eq!(
      decode_response::<CsrfToken>(404, b""),
      Err(QueryError::NotFound)
    );
    assert_eq!(
      decode_response::<CsrfToken>(429, b"rate limited"),
      Err(QueryError::Client(429))
    );
    assert_eq!(
      decode_response::<CsrfToken>(503, b"<html>"),
      Err(QueryError::Server(503))
    );
  }

  #[test]
  fn test_decode_shape_mismatch() {
    let result = decode_response::<CsrfToken>(200, br#"{"token": 1}"#);
    assert!(matches!(result, Err(QueryError::Decode(_))));
  }

  #[test]
  fn test_invalid_base_url_rejected() {
    assert!(BackendClient::new(&config("not a url")).is_err());
    assert!(BackendClient::new(&config("mailto:someone@example.com")).is_err());
  }

  #[test]
  fn test_url_encodes_segments() {
    let client = BackendClient::new(&config("https://api.example.com/")).unwrap();
    let query = ApiQuery::character(Region::Eu, "Kazzak", "Jaïna").unwrap();
    let url = client.url(&query.endpoint().segments);
    assert_eq!(
      url.as_str(),
      "https://api.example.com/api/characters/eu/kazzak/ja%C3%AFna"
    );
  }

  #[test]
  fn test_url_keeps_base_path() {
    let client = BackendClient::new(&config("https://example.com/wow")).unwrap();
    let url = client.url(&ApiQuery::Account.endpoint().segments);
    assert_eq!(url.as_str(), "https://example.com/wow/api/account");
  }
}
