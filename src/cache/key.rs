//! Query keys: the identity of a cached request.

use sha2::{Digest, Sha256};
use std::fmt;

/// Separator used when hashing, so `["ab", "c"]` and `["a", "bc"]` differ.
const UNIT_SEPARATOR: char = '\u{1f}';

/// Reasons a key cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
  #[error("query key resource name is empty")]
  EmptyResource,
  #[error("query key resource name {0:?} contains invalid characters")]
  InvalidResource(String),
  #[error("query key parameter {index} is empty")]
  EmptyParam { index: usize },
  #[error("query key parameter {index} contains control characters")]
  InvalidParam { index: usize },
}

/// Identifier for a cached request: a resource name plus ordered parameters.
///
/// Two keys are equal iff the resource name and every parameter match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  resource: String,
  params: Vec<String>,
}

impl QueryKey {
  /// Build a key, rejecting malformed resource names or parameters.
  pub fn new<I, P>(resource: impl Into<String>, params: I) -> Result<Self, KeyError>
  where
    I: IntoIterator<Item = P>,
    P: Into<String>,
  {
    let resource = resource.into();
    if resource.is_empty() {
      return Err(KeyError::EmptyResource);
    }
    if !resource
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
      return Err(KeyError::InvalidResource(resource));
    }

    let params: Vec<String> = params.into_iter().map(Into::into).collect();
    for (index, param) in params.iter().enumerate() {
      if param.is_empty() {
        return Err(KeyError::EmptyParam { index });
      }
      if param.chars().any(char::is_control) {
        return Err(KeyError::InvalidParam { index });
      }
    }

    Ok(Self { resource, params })
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }

  pub fn params(&self) -> &[String] {
    &self.params
  }

  /// Stable, fixed-length hash used as the persistent storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.resource.as_bytes());
    for param in &self.params {
      let mut sep = [0u8; 4];
      hasher.update(UNIT_SEPARATOR.encode_utf8(&mut sep).as_bytes());
      hasher.update(param.as_bytes());
    }
    hex::encode(hasher.finalize())
  }

  /// Human readable form for logs.
  pub fn description(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}[{}]", self.resource, self.params.join(", "))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_same_params_give_equal_keys() {
    let a = QueryKey::new("dungeonStats", ["season-tww-2", "us"]).unwrap();
    let b = QueryKey::new("dungeonStats", ["season-tww-2", "us"]).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_any_differing_param_gives_different_key() {
    let base = QueryKey::new("character", ["us", "illidan", "thrall"]).unwrap();
    let variants = [
      QueryKey::new("characterTalents", ["us", "illidan", "thrall"]).unwrap(),
      QueryKey::new("character", ["eu", "illidan", "thrall"]).unwrap(),
      QueryKey::new("character", ["us", "stormrage", "thrall"]).unwrap(),
      QueryKey::new("character", ["us", "illidan", "jaina"]).unwrap(),
      QueryKey::new("character", ["us", "illidan"]).unwrap(),
    ];
    for variant in variants {
      assert_ne!(base, variant);
      assert_ne!(base.cache_hash(), variant.cache_hash());
    }
  }

  #[test]
  fn test_param_boundaries_affect_hash() {
    let a = QueryKey::new("r", ["ab", "c"]).unwrap();
    let b = QueryKey::new("r", ["a", "bc"]).unwrap();
    assert_ne!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_malformed_keys_rejected() {
    assert_eq!(
      QueryKey::new("", ["us"]).unwrap_err(),
      KeyError::EmptyResource
    );
    assert!(matches!(
      QueryKey::new("dungeon stats", ["us"]),
      Err(KeyError::InvalidResource(_))
    ));
    assert_eq!(
      QueryKey::new("dungeonStats", ["season-tww-2", ""]).unwrap_err(),
      KeyError::EmptyParam { index: 1 }
    );
    assert_eq!(
      QueryKey::new("dungeonStats", ["us\n"]).unwrap_err(),
      KeyError::InvalidParam { index: 0 }
    );
  }

  #[test]
  fn test_key_without_params() {
    let key = QueryKey::new("csrfToken", Vec::<String>::new()).unwrap();
    assert!(key.params().is_empty());
    assert_eq!(key.to_string(), "csrfToken[]");
  }

  #[test]
  fn test_description() {
    let key = QueryKey::new("dungeonStats", ["season-tww-2", "us"]).unwrap();
    assert_eq!(key.description(), "dungeonStats[season-tww-2, us]");
  }
}
