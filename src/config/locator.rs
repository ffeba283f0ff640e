//! Bootstrap locator parsing
//!
//! Syntax: `cache:memcached:<host>:<port>[?peer=<host>:<port>;<host>:<port>&separator=<sep>]`

use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

pub const DEFAULT_LOCATOR: &str = "cache:memcached:localhost:11211";
pub const DEFAULT_SEPARATOR: &str = "$";

const SCHEME: &str = "cache:memcached:";

/// A backend server address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
  pub host: String,
  pub port: u16,
}

impl ServerAddress {
  pub fn new(host: impl Into<String>, port: u16) -> Self {
    Self {
      host: host.into(),
      port,
    }
  }
}

impl fmt::Display for ServerAddress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.host, self.port)
  }
}

impl FromStr for ServerAddress {
  type Err = CacheError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (host, port) = s
      .trim()
      .rsplit_once(':')
      .ok_or_else(|| CacheError::Configuration(format!("Missing port in server address: {}", s)))?;
    if host.is_empty() {
      return Err(CacheError::Configuration(format!(
        "Missing host in server address: {}",
        s
      )));
    }
    let port = port
      .parse::<u16>()
      .map_err(|_| CacheError::Configuration(format!("Invalid port in server address: {}", s)))?;
    Ok(ServerAddress::new(host, port))
  }
}

/// Parsed bootstrap locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
  raw: String,
  servers: Vec<ServerAddress>,
  separator: String,
}

impl Locator {
  /// The locator exactly as supplied
  pub fn as_str(&self) -> &str {
    &self.raw
  }

  /// Primary server followed by any peers
  pub fn servers(&self) -> &[ServerAddress] {
    &self.servers
  }

  /// Separator placed between cache name and key on the wire
  pub fn separator(&self) -> &str {
    &self.separator
  }
}

impl Default for Locator {
  fn default() -> Self {
    Self {
      raw: DEFAULT_LOCATOR.to_string(),
      servers: vec![ServerAddress::new("localhost", 11211)],
      separator: DEFAULT_SEPARATOR.to_string(),
    }
  }
}

impl fmt::Display for Locator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

impl FromStr for Locator {
  type Err = CacheError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let raw = s.trim();
    let rest = raw.strip_prefix(SCHEME).ok_or_else(|| {
      CacheError::Configuration(format!(
        "Unsupported locator '{}', expected {}<host>:<port>",
        raw, SCHEME
      ))
    })?;

    let (authority, query) = match rest.split_once('?') {
      Some((authority, query)) => (authority, Some(query)),
      None => (rest, None),
    };

    let mut servers = vec![authority.parse::<ServerAddress>()?];
    let mut separator = DEFAULT_SEPARATOR.to_string();

    for (name, value) in parse_query(query.unwrap_or_default()) {
      match name {
        "peer" => {
          for peer in value.split(';').filter(|p| !p.trim().is_empty()) {
            servers.push(peer.parse()?);
          }
        }
        "separator" => {
          if value.is_empty() {
            return Err(CacheError::Configuration(
              "Locator separator must not be empty".to_string(),
            ));
          }
          separator = value.to_string();
        }
        other => tracing::debug!("Ignoring unknown locator parameter '{}'", other),
      }
    }

    Ok(Locator {
      raw: raw.to_string(),
      servers,
      separator,
    })
  }
}

/// Split `a=1&b=2` into pairs, skipping parts without `=`
fn parse_query(query: &str) -> impl Iterator<Item = (&str, &str)> {
  query.split('&').filter_map(|part| part.split_once('='))
}
