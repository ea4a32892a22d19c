//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Name of the store directory created under the temp root.
pub const STORE_DIR_NAME: &str = "taurusconfs";

/// Default location of the Taurus `bzt` executable.
pub const DEFAULT_BZT_CMD: &str = "/usr/local/bin/bzt";

/// How job identifiers are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// Persist the last issued id in `<store>/last`.
    File,
    /// Keep the counter in memory, seeded from existing job directories.
    Memory,
}

impl FromStr for IdStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue {
                key: "TAURUS_ID_STRATEGY".to_string(),
                message: format!("expected 'file' or 'memory', got '{other}'"),
            }),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base temp directory; the job store lives in `<tmp_dir>/taurusconfs`.
    pub tmp_dir: PathBuf,
    /// Path to the load-test executable.
    pub bzt_cmd: PathBuf,
    /// Pass `-v` to the tool.
    pub verbose: bool,
    /// Maximum queue depth. Zero means unbounded.
    pub task_limit: usize,
    /// Worker wake cadence.
    pub poll_interval: Duration,
    /// Kill the tool after this long. `None` waits forever.
    pub tool_timeout: Option<Duration>,
    pub id_strategy: IdStrategy,
    /// HTTP listen port.
    pub port: u16,
    /// Base URL used in `Location` headers and listings. Falls back to the
    /// request's `Host` header when unset.
    pub public_url: Option<String>,
    /// Directory for rolling log files. Stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tmp_dir: std::env::temp_dir(),
            bzt_cmd: PathBuf::from(DEFAULT_BZT_CMD),
            verbose: true,
            task_limit: 0,
            poll_interval: Duration::from_secs(5),
            tool_timeout: None,
            id_strategy: IdStrategy::File,
            port: 8080,
            public_url: None,
            log_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Build a config from `TAURUS_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let tmp_dir = std::env::var("TAURUS_TMP_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.tmp_dir);

        let bzt_cmd = std::env::var("TAURUS_BZT_CMD")
            .map(PathBuf::from)
            .unwrap_or(defaults.bzt_cmd);

        let verbose = parse_var("TAURUS_VERBOSE")?.unwrap_or(defaults.verbose);
        let task_limit = parse_var("TAURUS_TASK_LIMIT")?.unwrap_or(defaults.task_limit);

        let poll_interval = match parse_var::<u64>("TAURUS_POLL_INTERVAL_SECS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "TAURUS_POLL_INTERVAL_SECS".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.poll_interval,
        };

        let tool_timeout = parse_var::<u64>("TAURUS_TOOL_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let id_strategy = parse_var("TAURUS_ID_STRATEGY")?.unwrap_or(defaults.id_strategy);
        let port = parse_var("TAURUS_PORT")?.unwrap_or(defaults.port);

        let public_url = std::env::var("TAURUS_PUBLIC_URL")
            .ok()
            .map(|s| s.trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        let log_dir = std::env::var("TAURUS_LOG_DIR").ok().map(PathBuf::from);

        Ok(Self {
            tmp_dir,
            bzt_cmd,
            verbose,
            task_limit,
            poll_interval,
            tool_timeout,
            id_strategy,
            port,
            public_url,
            log_dir,
        })
    }

    /// Root directory of the job store.
    pub fn store_root(&self) -> PathBuf {
        self.tmp_dir.join(STORE_DIR_NAME)
    }
}

fn parse_var<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = ServiceConfig::default();
        assert_eq!(config.bzt_cmd, PathBuf::from("/usr/local/bin/bzt"));
        assert_eq!(config.task_limit, 0);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(config.tool_timeout.is_none());
        assert!(config.verbose);
        assert_eq!(config.id_strategy, IdStrategy::File);
    }

    #[test]
    fn store_root_is_under_tmp_dir() {
        let config = ServiceConfig {
            tmp_dir: PathBuf::from("/var/tmp"),
            ..Default::default()
        };
        assert_eq!(config.store_root(), PathBuf::from("/var/tmp/taurusconfs"));
    }

    #[test]
    fn id_strategy_parses_case_insensitively() {
        assert_eq!("FILE".parse::<IdStrategy>().unwrap(), IdStrategy::File);
        assert_eq!(" memory ".parse::<IdStrategy>().unwrap(), IdStrategy::Memory);
        assert!("redis".parse::<IdStrategy>().is_err());
    }

    #[test]
    fn parse_var_rejects_garbage() {
        // SAFETY: The variable name is unique to this test; no other thread reads it.
        unsafe { std::env::set_var("TAURUS_TEST_PARSE_GARBAGE", "ten") };
        let result = parse_var::<usize>("TAURUS_TEST_PARSE_GARBAGE");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        unsafe { std::env::remove_var("TAURUS_TEST_PARSE_GARBAGE") };
    }

    #[test]
    fn parse_var_treats_blank_as_unset() {
        // SAFETY: The variable name is unique to this test; no other thread reads it.
        unsafe { std::env::set_var("TAURUS_TEST_PARSE_BLANK", "  ") };
        assert!(parse_var::<u16>("TAURUS_TEST_PARSE_BLANK").unwrap().is_none());
        unsafe { std::env::remove_var("TAURUS_TEST_PARSE_BLANK") };
    }
}
