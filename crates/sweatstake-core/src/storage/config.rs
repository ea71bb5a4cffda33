//! TOML-based application configuration.
//!
//! Stores the operational policy knobs:
//! - Geofence radii and polling cadence
//! - Position read timeout and cache age
//! - Escalation ladder offsets and penalty rates
//! - Voice provider endpoint and caller identity
//! - Engine loop pacing and channel sizes
//!
//! Configuration is stored at `~/.config/sweatstake/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::escalation::EscalationLadder;
use crate::gateway::ledger::PenaltyPolicy;
use crate::gateway::voice::VoiceConfig;
use crate::monitor::MonitorPolicy;
use crate::position::PositionPolicy;

/// Geofencing, timing, and penalty policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Radius for automated arrival detection, meters.
    #[serde(default = "default_auto_radius_m")]
    pub auto_radius_m: f64,
    /// Wider radius for manual check-in, meters.
    #[serde(default = "default_manual_radius_m")]
    pub manual_radius_m: f64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_position_timeout_ms")]
    pub position_timeout_ms: u64,
    #[serde(default = "default_position_max_age_ms")]
    pub position_max_age_ms: u64,
    #[serde(default = "default_warn1_after_ms")]
    pub warn1_after_ms: u64,
    #[serde(default = "default_call_after_ms")]
    pub call_after_ms: u64,
    #[serde(default = "default_warn2_after_ms")]
    pub warn2_after_ms: u64,
    #[serde(default = "default_penalize_after_ms")]
    pub penalize_after_ms: u64,
    #[serde(default = "default_penalty_rate")]
    pub penalty_rate: f64,
    #[serde(default = "default_shopping_credit_rate")]
    pub shopping_credit_rate: f64,
}

/// Engine loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline sampling interval for the event loop, milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Capacity of the broadcast channel carrying engine events.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Capacity of the command channel into the event loop.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/sweatstake/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

// Default functions
fn default_auto_radius_m() -> f64 {
    10.0
}
fn default_manual_radius_m() -> f64 {
    50.0
}
fn default_poll_interval_ms() -> u64 {
    5 * 60 * 1000
}
fn default_position_timeout_ms() -> u64 {
    10 * 1000
}
fn default_position_max_age_ms() -> u64 {
    60 * 1000
}
fn default_warn1_after_ms() -> u64 {
    15 * 60 * 1000
}
fn default_call_after_ms() -> u64 {
    30 * 60 * 1000
}
fn default_warn2_after_ms() -> u64 {
    45 * 60 * 1000
}
fn default_penalize_after_ms() -> u64 {
    60 * 60 * 1000
}
fn default_penalty_rate() -> f64 {
    0.1
}
fn default_shopping_credit_rate() -> f64 {
    0.2
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_event_buffer() -> usize {
    64
}
fn default_command_buffer() -> usize {
    16
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_radius_m: default_auto_radius_m(),
            manual_radius_m: default_manual_radius_m(),
            poll_interval_ms: default_poll_interval_ms(),
            position_timeout_ms: default_position_timeout_ms(),
            position_max_age_ms: default_position_max_age_ms(),
            warn1_after_ms: default_warn1_after_ms(),
            call_after_ms: default_call_after_ms(),
            warn2_after_ms: default_warn2_after_ms(),
            penalize_after_ms: default_penalize_after_ms(),
            penalty_rate: default_penalty_rate(),
            shopping_credit_rate: default_shopping_credit_rate(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            event_buffer: default_event_buffer(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl PolicyConfig {
    pub fn monitor_policy(&self) -> MonitorPolicy {
        MonitorPolicy {
            poll_interval_ms: self.poll_interval_ms,
            auto_radius_m: self.auto_radius_m,
            manual_radius_m: self.manual_radius_m,
        }
    }

    pub fn position_policy(&self) -> PositionPolicy {
        PositionPolicy {
            read_timeout_ms: self.position_timeout_ms,
            max_age_ms: self.position_max_age_ms,
        }
    }

    pub fn ladder(&self) -> EscalationLadder {
        EscalationLadder {
            warn1_after_ms: self.warn1_after_ms,
            call_after_ms: self.call_after_ms,
            warn2_after_ms: self.warn2_after_ms,
            penalize_after_ms: self.penalize_after_ms,
        }
    }

    pub fn penalty_policy(&self) -> PenaltyPolicy {
        PenaltyPolicy {
            penalty_rate: self.penalty_rate,
            shopping_credit_rate: self.shopping_credit_rate,
        }
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
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

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
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| {
                                    invalid(format!("cannot parse '{value}' as number"))
                                })?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
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

    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/sweatstake"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
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

    /// Set a config value by key and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.save()?;
        Ok(())
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
        assert_eq!(parsed.policy.auto_radius_m, 10.0);
        assert_eq!(parsed.policy.manual_radius_m, 50.0);
        assert_eq!(parsed.policy.poll_interval_ms, 300_000);
        assert_eq!(parsed.engine.tick_interval_ms, 1000);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: Config = toml::from_str(
            "[policy]\npenalty_rate = 0.25\n\n[voice]\nagent_id = \"agent_7\"\n",
        )
        .unwrap();
        assert_eq!(cfg.policy.penalty_rate, 0.25);
        assert_eq!(cfg.policy.shopping_credit_rate, 0.2);
        assert_eq!(cfg.voice.agent_id.as_deref(), Some("agent_7"));
        assert!(cfg.voice.base_url.starts_with("https://api.retellai.com"));
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("policy.auto_radius_m").as_deref(), Some("10.0"));
        assert_eq!(cfg.get("engine.event_buffer").as_deref(), Some("64"));
        assert!(cfg.get("policy.missing_key").is_none());
    }

    #[test]
    fn set_json_value_by_path_updates_nested_number() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "policy.poll_interval_ms", "60000").unwrap();
        assert_eq!(
            Config::get_json_value_by_path(&json, "policy.poll_interval_ms").unwrap(),
            &serde_json::Value::Number(60000.into())
        );
    }

    #[test]
    fn set_json_value_by_path_updates_nested_float() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "policy.penalty_rate", "0.15").unwrap();
        let got = Config::get_json_value_by_path(&json, "policy.penalty_rate").unwrap();
        assert!((got.as_f64().unwrap() - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn set_json_value_by_path_rejects_unknown_key() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        let result = Config::set_json_value_by_path(&mut json, "policy.nonexistent", "1");
        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_json_value_by_path_rejects_invalid_number() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        let result =
            Config::set_json_value_by_path(&mut json, "policy.poll_interval_ms", "not-a-number");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn policy_converts_to_domain_structs() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.monitor_policy().auto_radius_m, 10.0);
        assert_eq!(policy.position_policy().read_timeout_ms, 10_000);
        assert_eq!(policy.ladder().penalize_after_ms, 3_600_000);
        assert_eq!(policy.penalty_policy().penalty_rate, 0.1);
    }
}
