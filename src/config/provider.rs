//! Provider file configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::locator::DEFAULT_LOCATOR;

/// Expand `${VAR_NAME}` references from the environment. Substituted text
/// is copied through as-is and never expanded again.
fn expand_env_vars(input: &str) -> String {
  let mut result = String::with_capacity(input.len());
  let mut rest = input;

  while let Some(start) = rest.find("${") {
    let Some(end) = rest[start..].find('}') else {
      break;
    };
    result.push_str(&rest[..start]);
    let var_name = &rest[start + 2..start + end];
    result.push_str(&std::env::var(var_name).unwrap_or_default());
    rest = &rest[start + end + 1..];
  }

  result.push_str(rest);
  result
}

/// Process-wide provider defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
  /// Locator used when a caller does not supply one
  #[serde(default = "default_locator")]
  pub locator: String,

  /// Properties handed to managers created without explicit ones
  #[serde(default)]
  pub properties: HashMap<String, String>,
}

fn default_locator() -> String {
  DEFAULT_LOCATOR.to_string()
}

impl Default for ProviderConfig {
  fn default() -> Self {
    Self {
      locator: default_locator(),
      properties: HashMap::new(),
    }
  }
}

impl ProviderConfig {
  pub fn from_yaml(content: &str) -> Result<Self, anyhow::Error> {
    Ok(serde_yaml::from_str(&expand_env_vars(content))?)
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
    let content = std::fs::read_to_string(path)?;
    Self::from_yaml(&content)
  }

  pub fn find_and_load() -> Result<Option<Self>, anyhow::Error> {
    for p in ["spycache.yaml", "spycache.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading provider config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }
}
