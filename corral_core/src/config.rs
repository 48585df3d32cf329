use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File looked up in the project directory when no config is given.
pub const DEFAULT_CONFIG_FILE: &str = "corral.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid duration {0:?}, expected e.g. \"10m\", \"1h30m\", \"45s\" or \"500ms\"")]
    InvalidDuration(String),
}

/// Parses durations such as `10m`, `1h30m`, `90s` or `250ms`.
///
/// Units are `h`, `m`, `s` and `ms`; components may be concatenated. A bare
/// `0` is accepted as zero.
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(text.to_string());
    let trimmed = text.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let component = match &rest[..unit_len] {
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "s" => Some(Duration::from_secs(value)),
            "ms" => Some(Duration::from_millis(value)),
            _ => None,
        }
        .ok_or_else(invalid)?;
        total = total.checked_add(component).ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_duration(&text).map_err(serde::de::Error::custom)
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct DriverSettings {
    #[serde(default = "default_command")]
    pub command: Vec<String>,
}

fn default_command() -> Vec<String> {
    vec!["go".to_string()]
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            command: default_command(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzSettings {
    #[serde(
        default = "default_fuzz_time",
        deserialize_with = "deserialize_duration"
    )]
    pub fuzz_time: Duration,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub out: Option<PathBuf>,
    #[serde(default)]
    pub quiet: bool,
}

pub fn default_fuzz_time() -> Duration {
    Duration::from_secs(10 * 60)
}

impl Default for FuzzSettings {
    fn default() -> Self {
        Self {
            fuzz_time: default_fuzz_time(),
            fail_fast: false,
            out: None,
            quiet: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CorralConfig {
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub fuzz: FuzzSettings,
}

impl CorralConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path` if given, otherwise `corral.toml` from `project_dir` when
    /// present, otherwise the built-in defaults.
    pub fn discover(path: Option<&Path>, project_dir: &Path) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_path = project_dir.join(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::load_from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
