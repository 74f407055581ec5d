use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;

use crate::caching::EntityType;
use crate::fetch::SpaceConfig;

/// Tuning knobs for one cache instance.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// The kind of entity this cache resolves links to.
    pub entity_type: EntityType,
    /// Maximum number of links harvested per link array.
    ///
    /// Array elements beyond the cap are silently left unresolved; raise
    /// this if views render more than `link_limit` linked items per field.
    pub link_limit: usize,
    /// Maximum number of ids requested from the space in one fetch round.
    pub page_size: usize,
    /// Deadline for a single fetch round against the space.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            entity_type: EntityType::Entry,
            link_limit: 5,
            page_size: 250,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    pub fn new(entity_type: EntityType) -> Self {
        CacheConfig {
            entity_type,
            ..Default::default()
        }
    }
}

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified otherwise).
    Auto,
    /// With colors.
    Pretty,
    /// Simplified log output.
    Simplified,
    /// Dump out JSON lines.
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the service.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Control the statsd metrics.
#[derive(Clone, Debug, Deserialize)]
pub struct Metrics {
    /// host/port of statsd instance.
    pub statsd: String,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A tag/value pair attached to every metric.
    #[serde(default)]
    pub custom_tags: BTreeMap<String, String>,
}

/// The top-level configuration of an embedding application.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The space all caches of this application resolve against.
    pub space: SpaceConfig,
    /// Cache tuning, shared by all instances unless overridden per view.
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub metrics: Option<Metrics>,
}

impl Config {
    pub fn get(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("failed to open configuration file")?;
        if contents.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&contents).context("failed to parse config YAML")
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    let level = String::deserialize(deserializer)?;
    level.parse().map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let yaml = "space:\n  url: https://cms.example.com/spaces/s1\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(cfg.cache.entity_type, EntityType::Entry);
        assert_eq!(cfg.cache.page_size, 250);
        assert_eq!(cfg.cache.fetch_timeout, Duration::from_secs(30));
        assert_eq!(cfg.logging.level, LevelFilter::INFO);
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn test_cache_overrides() {
        let yaml = r#"
space:
  url: https://cms.example.com/spaces/s1
  token: secret
cache:
  entity_type: Asset
  link_limit: 10
  page_size: 1000
  fetch_timeout: 5s
logging:
  level: debug
  format: json
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(cfg.cache.entity_type, EntityType::Asset);
        assert_eq!(cfg.cache.link_limit, 10);
        assert_eq!(cfg.cache.page_size, 1000);
        assert_eq!(cfg.cache.fetch_timeout, Duration::from_secs(5));
        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.space.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_unsupported_entity_type() {
        let yaml = r#"
space:
  url: https://cms.example.com/spaces/s1
cache:
  entity_type: ContentType
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }
}
