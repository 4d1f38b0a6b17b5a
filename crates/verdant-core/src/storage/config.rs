//! TOML-based engine configuration.
//!
//! Stores tuning that is not part of the shared documents:
//! - Timer intervals for the scoring, wildfire and idle-check loops
//! - Session thresholds (idle pause, growth threshold)
//! - Wildfire ignition and extinguish thresholds
//! - Scoring policy (tab-switch counter reset)
//!
//! Configuration is stored at `~/.config/verdant/config.toml`.
//! Provider selection and credentials live in the `apiConfig` document
//! instead, so every front end sees them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;

/// Periodic timer intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimersConfig {
    #[serde(default = "default_scoring_interval")]
    pub scoring_interval_secs: u64,
    #[serde(default = "default_wildfire_interval")]
    pub wildfire_interval_secs: u64,
    #[serde(default = "default_idle_check_interval")]
    pub idle_check_interval_secs: u64,
}

/// Session thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity after which an active session pauses.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,
    /// Smoothed score above which a tick grows the forest.
    #[serde(default = "default_growth_threshold")]
    pub growth_threshold: f64,
}

/// Wildfire trigger thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildfireConfig {
    /// Smoothed score below which the low-focus streak runs.
    #[serde(default = "default_ignite_below")]
    pub ignite_below: f64,
    /// Streak length that makes ignition eligible.
    #[serde(default = "default_ignite_after")]
    pub ignite_after_secs: u64,
    /// Smoothed score above which an active fire is put out.
    #[serde(default = "default_extinguish_above")]
    pub extinguish_above: f64,
    /// Fixed RNG seed for reproducible runs. Entropy when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// How the tab-switch counter is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TabSwitchPolicy {
    /// Reset after every scoring tick (switches per window).
    #[default]
    PerTick,
    /// Accumulate for the whole session.
    PerSession,
}

/// Scoring policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub tab_switch_policy: TabSwitchPolicy,
    /// Upper bound on one external analyzer/classifier call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/verdant/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub timers: TimersConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub wildfire: WildfireConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

// Default functions
fn default_scoring_interval() -> u64 {
    20
}
fn default_wildfire_interval() -> u64 {
    2
}
fn default_idle_check_interval() -> u64 {
    60
}
fn default_idle_threshold() -> u64 {
    300
}
fn default_growth_threshold() -> f64 {
    50.0
}
fn default_ignite_below() -> f64 {
    30.0
}
fn default_ignite_after() -> u64 {
    60
}
fn default_extinguish_above() -> f64 {
    70.0
}
fn default_request_timeout() -> u64 {
    10
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            scoring_interval_secs: default_scoring_interval(),
            wildfire_interval_secs: default_wildfire_interval(),
            idle_check_interval_secs: default_idle_check_interval(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: default_idle_threshold(),
            growth_threshold: default_growth_threshold(),
        }
    }
}

impl Default for WildfireConfig {
    fn default() -> Self {
        Self {
            ignite_below: default_ignite_below(),
            ignite_after_secs: default_ignite_after(),
            extinguish_above: default_extinguish_above(),
            seed: None,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            tab_switch_policy: TabSwitchPolicy::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl SessionConfig {
    pub fn idle_threshold(&self) -> Result<chrono::Duration, ConfigError> {
        whole_seconds("session.idle_threshold_secs", self.idle_threshold_secs)
    }
}

impl WildfireConfig {
    pub fn ignite_after(&self) -> Result<chrono::Duration, ConfigError> {
        whole_seconds("wildfire.ignite_after_secs", self.ignite_after_secs)
    }
}

/// Seconds that fit in a `chrono::Duration`.
fn whole_seconds(key: &str, secs: u64) -> Result<chrono::Duration, ConfigError> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{secs} seconds is out of range"),
        })
}

impl TimersConfig {
    pub fn scoring_interval(&self) -> Duration {
        Duration::from_secs(self.scoring_interval_secs.max(1))
    }

    pub fn wildfire_interval(&self) -> Duration {
        Duration::from_secs(self.wildfire_interval_secs.max(1))
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_secs.max(1))
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    // Optional fields (e.g. the seed) are stored as null until set.
                    serde_json::Value::Null => {
                        if value == "none" || value.is_empty() {
                            serde_json::Value::Null
                        } else if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            serde_json::Value::String(value.into())
                        }
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    /// Default config file location.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/verdant"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the default location, writing defaults if absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from disk or return default (persisting it).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Update a value in memory by dot-separated key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// field's type.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check values the engine converts into time spans.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.idle_threshold()?;
        self.wildfire.ignite_after()?;
        Ok(())
    }

    /// Set a value by key and save to the default location.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.timers.scoring_interval_secs, 20);
        assert_eq!(cfg.timers.wildfire_interval_secs, 2);
        assert_eq!(cfg.timers.idle_check_interval_secs, 60);
        assert_eq!(cfg.session.idle_threshold_secs, 300);
        assert_eq!(cfg.session.growth_threshold, 50.0);
        assert_eq!(cfg.wildfire.ignite_below, 30.0);
        assert_eq!(cfg.wildfire.ignite_after_secs, 60);
        assert_eq!(cfg.wildfire.extinguish_above, 70.0);
        assert_eq!(cfg.scoring.tab_switch_policy, TabSwitchPolicy::PerTick);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            "[scoring]\ntab_switch_policy = \"per_session\"\n[timers]\nwildfire_interval_secs = 5\n",
        )
        .unwrap();
        assert_eq!(cfg.scoring.tab_switch_policy, TabSwitchPolicy::PerSession);
        assert_eq!(cfg.timers.wildfire_interval_secs, 5);
        assert_eq!(cfg.timers.scoring_interval_secs, 20);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timers.scoring_interval_secs").as_deref(), Some("20"));
        assert_eq!(
            cfg.get("scoring.tab_switch_policy").as_deref(),
            Some("per_tick")
        );
        assert!(cfg.get("timers.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_number() {
        let mut cfg = Config::default();
        cfg.apply("wildfire.ignite_below", "25.5").unwrap();
        assert_eq!(cfg.wildfire.ignite_below, 25.5);
        cfg.apply("session.idle_threshold_secs", "120").unwrap();
        assert_eq!(cfg.session.idle_threshold_secs, 120);
    }

    #[test]
    fn apply_updates_enum_and_optional_seed() {
        let mut cfg = Config::default();
        cfg.apply("scoring.tab_switch_policy", "per_session").unwrap();
        assert_eq!(cfg.scoring.tab_switch_policy, TabSwitchPolicy::PerSession);
        cfg.apply("wildfire.seed", "7").unwrap();
        assert_eq!(cfg.wildfire.seed, Some(7));
    }

    #[test]
    fn apply_rejects_unknown_key_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("timers.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(cfg.apply("timers.scoring_interval_secs", "soon").is_err());
        assert!(cfg.apply("scoring.tab_switch_policy", "sometimes").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn apply_rejects_spans_that_overflow() {
        let mut cfg = Config::default();
        for key in ["session.idle_threshold_secs", "wildfire.ignite_after_secs"] {
            for value in ["18446744073709551615", "9223372036854775807"] {
                assert!(matches!(
                    cfg.apply(key, value),
                    Err(ConfigError::InvalidValue { .. })
                ));
            }
        }
        assert_eq!(cfg, Config::default());

        cfg.apply("wildfire.ignite_after_secs", "86400").unwrap();
        assert_eq!(cfg.wildfire.ignite_after().unwrap(), chrono::Duration::days(1));
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.apply("timers.scoring_interval_secs", "45").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(
            Config::load_from(&path).unwrap().timers.scoring_interval_secs,
            45
        );
    }
}
