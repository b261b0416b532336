// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! The trial count always comes from the command line. Everything else
//! (payload sizes, group formation) comes from an optional YAML file, with
//! launcher-provided environment variables taking precedence over the file.
//! Any invalid field is rejected before the group communicates.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BenchError, BenchResult, ValidationError};
use crate::types::{MessageSize, Rank};

/// Environment variable carrying this member's rank.
pub const ENV_RANK: &str = "MESHBENCH_RANK";
/// Environment variable carrying the group size.
pub const ENV_SIZE: &str = "MESHBENCH_SIZE";
/// Environment variable carrying the root's listen address.
pub const ENV_ROOT_ADDR: &str = "MESHBENCH_ROOT_ADDR";

/// Upper bound on the group size.
const MAX_GROUP_SIZE: usize = 65_536;
/// Upper bound on latency probes per peer per trial.
const MAX_SMALL_MESSAGE_COUNT: u32 = 1_000_000;

/// Raw benchmark section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBenchmarkConfig {
    #[serde(default = "default_message_size")]
    message_size: usize,
    #[serde(default = "default_small_message_count")]
    small_message_count: u32,
}

fn default_message_size() -> usize {
    MessageSize::DEFAULT.bytes()
}

fn default_small_message_count() -> u32 {
    200
}

impl Default for RawBenchmarkConfig {
    fn default() -> Self {
        Self {
            message_size: default_message_size(),
            small_message_count: default_small_message_count(),
        }
    }
}

/// Raw transport section. Every field may also come from the environment.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTransportConfig {
    rank: Option<u32>,
    size: Option<usize>,
    root_addr: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

impl Default for RawTransportConfig {
    fn default() -> Self {
        Self {
            rank: None,
            size: None,
            root_addr: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    benchmark: RawBenchmarkConfig,
    #[serde(default)]
    transport: RawTransportConfig,
}

/// Validated payload and probe settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkConfig {
    /// Bulk payload for bandwidth and large broadcast rounds.
    pub message_size: MessageSize,
    /// 1-byte round trips per peer per trial.
    pub small_message_count: u32,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            message_size: MessageSize::DEFAULT,
            small_message_count: default_small_message_count(),
        }
    }
}

/// Validated TCP group formation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub rank: Rank,
    pub size: usize,
    /// Address the root listens on and peers connect to.
    pub root_addr: String,
    /// How long peers keep retrying the root, and the root keeps accepting.
    pub connect_timeout: Duration,
}

/// Complete validated configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub benchmark: BenchmarkConfig,
    /// `None` when no group formation settings were supplied at all.
    pub transport: Option<TransportConfig>,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load an optional YAML file and apply process environment overrides.
    pub fn load(path: Option<&Path>) -> BenchResult<Config> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load an optional YAML file, taking overrides from `env`.
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> BenchResult<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = match path {
            Some(path) => Self::read_file(path)?,
            None => RawConfig::default(),
        };
        Self::validate(Self::apply_env(raw, env)?)
    }

    /// Load and validate configuration from a YAML string, without overrides.
    pub fn load_string(content: &str) -> BenchResult<Config> {
        Self::validate(Self::parse(content)?)
    }

    fn read_file(path: &Path) -> BenchResult<RawConfig> {
        if !path.exists() {
            return Err(BenchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BenchError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::parse(&content)
    }

    fn parse(content: &str) -> BenchResult<RawConfig> {
        // An empty document is a valid, all-defaults configuration.
        if content.trim().is_empty() {
            return Ok(RawConfig::default());
        }
        serde_yaml::from_str(content).map_err(|e| BenchError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })
    }

    fn apply_env<F>(mut raw: RawConfig, env: F) -> BenchResult<RawConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rank) = env(ENV_RANK) {
            raw.transport.rank = Some(parse_env(ENV_RANK, &rank)?);
        }
        if let Some(size) = env(ENV_SIZE) {
            raw.transport.size = Some(parse_env(ENV_SIZE, &size)?);
        }
        if let Some(addr) = env(ENV_ROOT_ADDR) {
            raw.transport.root_addr = Some(addr);
        }
        Ok(raw)
    }

    fn validate(raw: RawConfig) -> BenchResult<Config> {
        let benchmark = Self::validate_benchmark(raw.benchmark)?;
        let transport = Self::validate_transport(raw.transport)?;
        Ok(Config {
            benchmark,
            transport,
        })
    }

    fn validate_benchmark(raw: RawBenchmarkConfig) -> BenchResult<BenchmarkConfig> {
        let message_size = MessageSize::new(raw.message_size)?;

        if raw.small_message_count == 0 || raw.small_message_count > MAX_SMALL_MESSAGE_COUNT {
            return Err(ValidationError::InvalidFieldValue {
                field: "small_message_count",
                value: raw.small_message_count.to_string(),
                reason: format!("Must be between 1 and {}", MAX_SMALL_MESSAGE_COUNT),
            }
            .into());
        }

        Ok(BenchmarkConfig {
            message_size,
            small_message_count: raw.small_message_count,
        })
    }

    fn validate_transport(raw: RawTransportConfig) -> BenchResult<Option<TransportConfig>> {
        let (rank, size, root_addr) = match (raw.rank, raw.size, raw.root_addr) {
            (None, None, None) => return Ok(None),
            (Some(rank), Some(size), Some(root_addr)) => (rank, size, root_addr),
            (rank, size, root_addr) => {
                let missing = [
                    (rank.is_none(), "rank"),
                    (size.is_none(), "size"),
                    (root_addr.is_none(), "root_addr"),
                ]
                .iter()
                .filter(|(absent, _)| *absent)
                .map(|(_, name)| *name)
                .collect::<Vec<_>>()
                .join(", ");
                return Err(BenchError::ConfigParse {
                    message: format!("incomplete transport settings, missing: {}", missing),
                });
            }
        };

        if size == 0 || size > MAX_GROUP_SIZE {
            return Err(ValidationError::InvalidFieldValue {
                field: "size",
                value: size.to_string(),
                reason: format!("Must be between 1 and {}", MAX_GROUP_SIZE),
            }
            .into());
        }

        let rank = Rank::checked(rank, size)?;

        if root_addr.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "root_addr",
                value: root_addr,
                reason: "Root address cannot be empty".to_string(),
            }
            .into());
        }

        if raw.connect_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "connect_timeout_ms",
                value: raw.connect_timeout_ms.to_string(),
                reason: "Must be non-zero".to_string(),
            }
            .into());
        }

        Ok(Some(TransportConfig {
            rank,
            size,
            root_addr,
            connect_timeout: Duration::from_millis(raw.connect_timeout_ms),
        }))
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> BenchResult<T> {
    value.trim().parse().map_err(|_| BenchError::ConfigParse {
        message: format!("{} must be a non-negative integer, got '{}'", key, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_applied() {
        let config = ConfigLoader::load_string("").unwrap();
        assert_eq!(config.benchmark.message_size.bytes(), 100 * 1024 * 1024);
        assert_eq!(config.benchmark.small_message_count, 200);
        assert!(config.transport.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
benchmark:
  message_size: 1048576
  small_message_count: 50
transport:
  rank: 2
  size: 4
  root_addr: "10.0.0.1:7400"
  connect_timeout_ms: 5000
"#;
        let config = ConfigLoader::load_string(yaml).unwrap();
        assert_eq!(config.benchmark.message_size.bytes(), 1_048_576);
        assert_eq!(config.benchmark.small_message_count, 50);

        let transport = config.transport.unwrap();
        assert_eq!(transport.rank, Rank::new(2));
        assert_eq!(transport.size, 4);
        assert_eq!(transport.root_addr, "10.0.0.1:7400");
        assert_eq!(transport.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
benchmark:
  message_sise: 10
"#;
        assert!(matches!(
            ConfigLoader::load_string(yaml),
            Err(BenchError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_zero_small_message_count() {
        let yaml = r#"
benchmark:
  small_message_count: 0
"#;
        assert!(matches!(
            ConfigLoader::load_string(yaml),
            Err(BenchError::Validation(_))
        ));
    }

    #[test]
    fn test_rank_out_of_range() {
        let yaml = r#"
transport:
  rank: 4
  size: 4
  root_addr: "127.0.0.1:7400"
"#;
        assert!(matches!(
            ConfigLoader::load_string(yaml),
            Err(BenchError::Validation(ValidationError::RankOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_incomplete_transport() {
        let yaml = r#"
transport:
  rank: 1
"#;
        let err = ConfigLoader::load_string(yaml).unwrap_err();
        assert!(err.to_string().contains("size"));
        assert!(err.to_string().contains("root_addr"));
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("meshbench.yaml");
        std::fs::write(
            &path,
            "transport:\n  rank: 0\n  size: 2\n  root_addr: \"127.0.0.1:1\"\n",
        )
        .unwrap();

        let config = ConfigLoader::load_with_env(Some(&path), |key| match key {
            ENV_RANK => Some("3".to_string()),
            ENV_SIZE => Some("8".to_string()),
            _ => None,
        })
        .unwrap();

        let transport = config.transport.unwrap();
        assert_eq!(transport.rank, Rank::new(3));
        assert_eq!(transport.size, 8);
        assert_eq!(transport.root_addr, "127.0.0.1:1");
    }

    #[test]
    fn test_env_only() {
        let config = ConfigLoader::load_with_env(None, |key| match key {
            ENV_RANK => Some("1".to_string()),
            ENV_SIZE => Some("2".to_string()),
            ENV_ROOT_ADDR => Some("node0:7400".to_string()),
            _ => None,
        })
        .unwrap();
        let transport = config.transport.unwrap();
        assert_eq!(transport.rank, Rank::new(1));
        assert_eq!(transport.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_bad_env_value() {
        let result = ConfigLoader::load_with_env(None, |key| match key {
            ENV_RANK => Some("one".to_string()),
            _ => None,
        });
        assert!(matches!(result, Err(BenchError::ConfigParse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result =
            ConfigLoader::load_with_env(Some(Path::new("/nonexistent/meshbench.yaml")), no_env);
        assert!(matches!(result, Err(BenchError::ConfigNotFound { .. })));
    }
}
