//! Configuration management
//!
//! Defaults, then an optional TOML file named by `ATHENOS_CONFIG`, then
//! `ATHENOS_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::agent::BackgroundConfig;
use crate::error::{AgentError, Result};
use crate::observer::ObserverConfig;
use crate::pattern::MinerConfig;
use crate::policy::{PolicyConfig, RiskCategory};
use crate::sandbox::SandboxConfig;
use crate::synthesizer::SynthesizerConfig;

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub observer: ObserverConfig,
    pub miner: MinerConfig,
    pub policy: PolicyConfig,
    pub sandbox: SandboxConfig,
    pub synthesizer: SynthesizerConfig,
    pub background: BackgroundConfig,

    /// Sealed consent ledger and key salt live here
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            observer: ObserverConfig::default(),
            miner: MinerConfig::default(),
            policy: PolicyConfig::default(),
            sandbox: SandboxConfig::default(),
            synthesizer: SynthesizerConfig::default(),
            background: BackgroundConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("athenos")
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AgentError::Config(format!("{}: cannot parse '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(AgentError::Config(format!("{}: expected a boolean, got '{}'", key, value))),
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("ATHENOS_CONFIG") {
            Some(path) => Self::from_file(&expand(&path))?,
            None => Self::default(),
        };

        if let Some(v) = lookup("ATHENOS_DATA_DIR") {
            config.data_dir = expand(&v);
        }
        if let Some(v) = lookup("ATHENOS_OBSERVER_CAPACITY") {
            config.observer.capacity = parse("ATHENOS_OBSERVER_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("ATHENOS_WINDOW_SIZE") {
            config.miner.window_size = parse("ATHENOS_WINDOW_SIZE", &v)?;
        }
        if let Some(v) = lookup("ATHENOS_MIN_REPETITIONS") {
            config.miner.min_repetitions = parse("ATHENOS_MIN_REPETITIONS", &v)?;
        }
        if let Some(v) = lookup("ATHENOS_AUTO_EXECUTE_THRESHOLD") {
            config.synthesizer.auto_execute_threshold = parse("ATHENOS_AUTO_EXECUTE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("ATHENOS_MAX_AUTO_RISK") {
            config.synthesizer.max_auto_risk = RiskCategory::parse(&v).ok_or_else(|| {
                AgentError::Config(format!("ATHENOS_MAX_AUTO_RISK: unknown risk '{}'", v))
            })?;
        }
        if let Some(v) = lookup("ATHENOS_SANDBOX_TIMEOUT_MS") {
            config.sandbox.timeout_ms = parse("ATHENOS_SANDBOX_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("ATHENOS_MIN_QUALITY") {
            config.sandbox.min_quality = parse("ATHENOS_MIN_QUALITY", &v)?;
        }
        if let Some(v) = lookup("ATHENOS_EPSILON") {
            config.policy.epsilon = parse("ATHENOS_EPSILON", &v)?;
        }
        if let Some(v) = lookup("ATHENOS_RL_SEED") {
            config.policy.rl_seed = Some(parse("ATHENOS_RL_SEED", &v)?);
        }
        if let Some(v) = lookup("ATHENOS_BACKGROUND_ENABLED") {
            config.background.enabled = parse_bool("ATHENOS_BACKGROUND_ENABLED", &v)?;
        }
        if let Some(v) = lookup("ATHENOS_MINE_INTERVAL_SECS") {
            config.background.mine_interval_secs = parse("ATHENOS_MINE_INTERVAL_SECS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| AgentError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject out-of-range thresholds
    pub fn validate(&self) -> Result<()> {
        fn unit(name: &str, v: f64) -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(AgentError::Config(format!("{} must be within [0, 1], got {}", name, v)))
            }
        }

        if self.observer.capacity == 0 {
            return Err(AgentError::Config("observer.capacity must be positive".into()));
        }
        if self.miner.min_repetitions < 2 {
            return Err(AgentError::Config("miner.min_repetitions must be at least 2".into()));
        }
        if self.miner.max_sequence_len < 2 {
            return Err(AgentError::Config("miner.max_sequence_len must be at least 2".into()));
        }
        unit("miner.min_causal_strength", self.miner.min_causal_strength)?;
        unit("synthesizer.auto_execute_threshold", self.synthesizer.auto_execute_threshold)?;
        unit("sandbox.min_quality", self.sandbox.min_quality)?;
        unit("policy.epsilon", self.policy.epsilon)?;
        unit("policy.learning_rate", self.policy.learning_rate)?;
        unit("policy.rl_learning_rate", self.policy.rl_learning_rate)?;
        if self.policy.time_scale_min <= 0.0 {
            return Err(AgentError::Config("policy.time_scale_min must be positive".into()));
        }
        if self.sandbox.timeout_ms == 0 {
            return Err(AgentError::Config("sandbox.timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.observer.capacity, 1000);
        assert_eq!(config.miner.min_repetitions, 3);
        assert!((config.synthesizer.auto_execute_threshold - 0.85).abs() < 1e-9);
        assert!(config.data_dir.ends_with("athenos"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ATHENOS_OBSERVER_CAPACITY", "50"),
            ("ATHENOS_MAX_AUTO_RISK", "low"),
            ("ATHENOS_RL_SEED", "42"),
            ("ATHENOS_BACKGROUND_ENABLED", "0"),
            ("ATHENOS_DATA_DIR", "/tmp/athenos-test"),
        ]))
        .unwrap();
        assert_eq!(config.observer.capacity, 50);
        assert_eq!(config.synthesizer.max_auto_risk, RiskCategory::Low);
        assert_eq!(config.policy.rl_seed, Some(42));
        assert!(!config.background.enabled);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/athenos-test"));
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("ATHENOS_EPSILON", "lots")])),
            Err(AgentError::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("ATHENOS_MIN_QUALITY", "1.5")])),
            Err(AgentError::Config(_))
        ));
        assert!(Config::from_lookup(lookup(&[("ATHENOS_MAX_AUTO_RISK", "spicy")])).is_err());
    }

    #[test]
    fn test_toml_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[miner]\nwindow_size = 64\n\n[synthesizer]\nauto_execute_threshold = 0.9\nmax_auto_risk = \"low\""
        )
        .unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = Config::from_lookup(lookup(&[
            ("ATHENOS_CONFIG", path.as_str()),
            ("ATHENOS_WINDOW_SIZE", "32"),
        ]))
        .unwrap();
        assert_eq!(config.miner.window_size, 32);
        assert_eq!(config.miner.min_repetitions, 3);
        assert!((config.synthesizer.auto_execute_threshold - 0.9).abs() < 1e-9);
        assert_eq!(config.synthesizer.max_auto_risk, RiskCategory::Low);
    }
}
