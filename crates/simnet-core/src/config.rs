//! Configuration loading and typed config structures for the simulator.
//!
//! The canonical configuration lives in `simnet-config.yaml` at the project
//! root. Every field has a default, so an empty file (or no file at all)
//! yields a runnable configuration.

use std::path::Path;

use serde::Deserialize;
use simnet_events::JournalConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range or an override could not be parsed.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimnetConfig {
    /// Run-level settings (seed, pool size, cadence, driver).
    #[serde(default)]
    pub world: WorldConfig,

    /// Churn rates for the random driver.
    #[serde(default)]
    pub churn: ChurnConfig,

    /// Journal settings.
    #[serde(default)]
    pub journal: JournalSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimnetConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment overrides are applied after parsing:
    /// - `SIMNET_SEED` overrides `world.seed`
    /// - `SIMNET_MAX_TICKS` overrides `world.max_ticks`
    /// - `SIMNET_TICK_INTERVAL_MS` overrides `world.tick_interval_ms`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML and
    /// [`ConfigError::Invalid`] if the result fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML and
    /// [`ConfigError::Invalid`] if the result fails validation.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but is not a
    /// valid unsigned integer.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value is not a valid unsigned
    /// integer.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(seed) = parse_override(&lookup, "SIMNET_SEED")? {
            self.world.seed = seed;
        }
        if let Some(max_ticks) = parse_override(&lookup, "SIMNET_MAX_TICKS")? {
            self.world.max_ticks = max_ticks;
        }
        if let Some(interval) = parse_override(&lookup, "SIMNET_TICK_INTERVAL_MS")? {
            self.world.tick_interval_ms = interval;
        }
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "world.tick_interval_ms must be at least 1".to_owned(),
            });
        }
        let min_pool = match self.world.driver {
            DriverKind::Random => 1,
            DriverKind::Toggle => 2,
        };
        if self.world.node_pool < min_pool {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "world.node_pool must be at least {min_pool} for the {:?} driver",
                    self.world.driver
                ),
            });
        }
        Ok(())
    }
}

fn parse_override<F>(lookup: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                reason: format!("{key}={raw:?} is not an unsigned integer: {e}"),
            })
        })
        .transpose()
}

/// Which topology driver generates events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Random node and connection churn.
    #[default]
    Random,
    /// Two nodes with a connection toggled every third tick.
    Toggle,
}

/// Run-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of node identities the driver draws from.
    #[serde(default = "default_node_pool")]
    pub node_pool: usize,

    /// Real-time milliseconds per tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Stop after this many ticks (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Topology driver to run.
    #[serde(default)]
    pub driver: DriverKind,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            node_pool: default_node_pool(),
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: 0,
            driver: DriverKind::default(),
        }
    }
}

/// Churn rates for the random driver.
///
/// On the first tick `initial_nodes` nodes and `initial_conns` connections
/// are switched on. On every later tick each of the four flips (node on,
/// node off, connection on, connection off) happens once with probability
/// `1 / odds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChurnConfig {
    /// Nodes switched on at tick 0.
    #[serde(default = "default_initial_nodes")]
    pub initial_nodes: usize,

    /// Connections switched on at tick 0.
    #[serde(default = "default_initial_conns")]
    pub initial_conns: usize,

    /// One-in-N chance of each node flip per tick (0 = never).
    #[serde(default = "default_node_flip_odds")]
    pub node_flip_odds: u32,

    /// One-in-N chance of each connection flip per tick (0 = never).
    #[serde(default = "default_conn_flip_odds")]
    pub conn_flip_odds: u32,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            initial_nodes: default_initial_nodes(),
            initial_conns: default_initial_conns(),
            node_flip_odds: default_node_flip_odds(),
            conn_flip_odds: default_conn_flip_odds(),
        }
    }
}

/// Journal settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct JournalSection {
    /// Already-read entries retained for rewinding.
    #[serde(default)]
    pub replay_window: usize,

    /// How long the engine waits for a tick's events before reading anyway.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl JournalSection {
    /// The journal configuration derived from this section.
    pub const fn journal_config(&self) -> JournalConfig {
        JournalConfig {
            replay_window: self.replay_window,
        }
    }
}

impl Default for JournalSection {
    fn default() -> Self {
        Self {
            replay_window: 0,
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_seed() -> u64 {
    42
}

const fn default_node_pool() -> usize {
    100
}

const fn default_tick_interval_ms() -> u64 {
    1_000
}

const fn default_initial_nodes() -> usize {
    10
}

const fn default_initial_conns() -> usize {
    20
}

const fn default_node_flip_odds() -> u32 {
    10
}

const fn default_conn_flip_odds() -> u32 {
    2
}

const fn default_wait_timeout_ms() -> u64 {
    2_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimnetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.world.seed, 42);
        assert_eq!(config.world.node_pool, 100);
        assert_eq!(config.world.driver, DriverKind::Random);
        assert_eq!(config.churn.initial_nodes, 10);
        assert_eq!(config.churn.initial_conns, 20);
        assert_eq!(config.churn.node_flip_odds, 10);
        assert_eq!(config.churn.conn_flip_odds, 2);
        assert_eq!(config.journal.replay_window, 0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
world:
  seed: 7
  node_pool: 30
  tick_interval_ms: 50
  max_ticks: 12
  driver: toggle
churn:
  initial_nodes: 4
  initial_conns: 3
  node_flip_odds: 5
  conn_flip_odds: 0
journal:
  replay_window: 16
  wait_timeout_ms: 250
logging:
  level: debug
";
        let config = SimnetConfig::parse(yaml).unwrap();
        assert_eq!(config.world.seed, 7);
        assert_eq!(config.world.node_pool, 30);
        assert_eq!(config.world.max_ticks, 12);
        assert_eq!(config.world.driver, DriverKind::Toggle);
        assert_eq!(config.churn.initial_conns, 3);
        assert_eq!(config.churn.conn_flip_odds, 0);
        assert_eq!(config.journal.journal_config().replay_window, 16);
        assert_eq!(config.journal.wait_timeout_ms, 250);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn shipped_config_parses() {
        let config = SimnetConfig::parse(include_str!("../../../simnet-config.yaml")).unwrap();
        assert_eq!(config.world.max_ticks, 120);
        assert_eq!(config.churn, ChurnConfig::default());
        assert_eq!(config.journal, JournalSection::default());
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = SimnetConfig::parse("{}").unwrap();
        assert_eq!(config, SimnetConfig::default());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = SimnetConfig::parse("world:\n  tick_interval_ms: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn toggle_needs_two_nodes() {
        let result = SimnetConfig::parse("world:\n  driver: toggle\n  node_pool: 1\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn overrides_replace_values() {
        let vars: BTreeMap<&str, &str> =
            BTreeMap::from([("SIMNET_SEED", "99"), ("SIMNET_MAX_TICKS", " 5 ")]);
        let mut config = SimnetConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| (*v).to_owned()))
            .unwrap();
        assert_eq!(config.world.seed, 99);
        assert_eq!(config.world.max_ticks, 5);
        assert_eq!(config.world.tick_interval_ms, 1_000);
    }

    #[test]
    fn bad_override_is_reported() {
        let mut config = SimnetConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "SIMNET_SEED").then(|| "not-a-number".to_owned())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
