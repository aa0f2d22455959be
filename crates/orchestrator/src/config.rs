//! Single immutable configuration struct loaded at boot (spec.md §9
//! Design Notes, §6 "Configuration").

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::readiness::ReadinessMode as EngineReadinessMode;

/// `dispatch.readiness_mode` ∈ {block, warn}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessModeConfig {
    Block,
    Warn,
}

impl From<ReadinessModeConfig> for EngineReadinessMode {
    fn from(value: ReadinessModeConfig) -> Self {
        match value {
            ReadinessModeConfig::Block => EngineReadinessMode::Block,
            ReadinessModeConfig::Warn => EngineReadinessMode::Warn,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    #[serde(default = "default_cadence_seconds")]
    pub cadence_seconds: u64,
    #[serde(default = "default_readiness_mode")]
    pub readiness_mode: ReadinessModeConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            cadence_seconds: default_cadence_seconds(),
            readiness_mode: default_readiness_mode(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold_secs: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            stuck_threshold_secs: default_stuck_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDetectorConfig {
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: usize,
    #[serde(default = "default_progress_window_seconds")]
    pub progress_window_seconds: u64,
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
}

impl Default for LoopDetectorConfig {
    fn default() -> Self {
        Self {
            repeat_threshold: default_repeat_threshold(),
            progress_window_seconds: default_progress_window_seconds(),
            history_retention: default_history_retention(),
        }
    }
}

/// Top-level immutable configuration, loaded once at boot. The only
/// runtime-mutable field is `dispatch.max_hops`, gated behind
/// [`Config::set_max_hops`] rather than silent mutation (spec.md §9:
/// "runtime overrides for dispatch.max_hops require a restart or an
/// explicit setter with a write lock").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dispatch: DispatchConfig,
    pub agents: AgentsConfig,
    pub loop_detector: LoopDetectorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            agents: AgentsConfig::default(),
            loop_detector: LoopDetectorConfig::default(),
        }
    }
}

impl Config {
    /// Parse from a TOML document. Unrecognized fields are accepted by
    /// `serde`'s default behaviour (ignored) so new config sections can
    /// be added without breaking older config files.
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Validate the `max_hops` range (spec.md §6: "range 1–100").
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=100).contains(&self.dispatch.max_hops) {
            return Err(format!(
                "dispatch.max_hops must be in 1..=100, got {}",
                self.dispatch.max_hops
            ));
        }
        Ok(())
    }
}

fn default_max_hops() -> u32 {
    20
}
fn default_cadence_seconds() -> u64 {
    10
}
fn default_readiness_mode() -> ReadinessModeConfig {
    ReadinessModeConfig::Warn
}
fn default_max_concurrent() -> u32 {
    10
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_stuck_threshold() -> u64 {
    5 * 60
}
fn default_repeat_threshold() -> usize {
    3
}
fn default_progress_window_seconds() -> u64 {
    300
}
fn default_history_retention() -> usize {
    50
}

/// Thread-safe holder for the one mutable knob, `max_hops`. A write
/// lock as the explicit setter: the rest of `Config` stays immutable.
#[derive(Debug, Clone)]
pub struct MaxHops(Arc<AtomicU32>);

impl MaxHops {
    #[must_use]
    pub fn new(initial: u32) -> Self {
        Self(Arc::new(AtomicU32::new(initial)))
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: u32) {
        self.0.store(value, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_enumerated_options() {
        let config = Config::default();
        assert_eq!(config.dispatch.max_hops, 20);
        assert_eq!(config.dispatch.cadence_seconds, 10);
        assert_eq!(config.agents.max_concurrent, 10);
        assert_eq!(config.agents.heartbeat_interval_secs, 30);
        assert_eq!(config.agents.stuck_threshold_secs, 300);
        assert_eq!(config.loop_detector.repeat_threshold, 3);
        assert_eq!(config.loop_detector.progress_window_seconds, 300);
        assert_eq!(config.loop_detector.history_retention, 50);
    }

    #[test]
    fn from_toml_applies_defaults_for_missing_fields() {
        let config = Config::from_toml("[dispatch]\nmax_hops = 5\n").unwrap();
        assert_eq!(config.dispatch.max_hops, 5);
        assert_eq!(config.dispatch.cadence_seconds, 10);
    }

    #[test]
    fn validate_rejects_out_of_range_max_hops() {
        let mut config = Config::default();
        config.dispatch.max_hops = 0;
        assert!(config.validate().is_err());
        config.dispatch.max_hops = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_hops_setter_is_visible_across_clones() {
        let hops = MaxHops::new(20);
        let clone = hops.clone();
        clone.set(5);
        assert_eq!(hops.get(), 5);
    }
}
