use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::builtins::AngleMode;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuggestionConfig {
    pub max_candidates: usize,
    pub max_distance: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            max_distance: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub max_rounds: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_rounds: 16 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: Option<u64>,
    pub angle_mode: AngleMode,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 512,
            max_steps: None,
            angle_mode: AngleMode::Radians,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub optimize: bool,
    pub suggestions: SuggestionConfig,
    pub optimizer: OptimizerConfig,
    pub vm: VmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            optimize: true,
            suggestions: SuggestionConfig::default(),
            optimizer: OptimizerConfig::default(),
            vm: VmConfig::default(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Parsing configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("Loading {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn missing_fields_take_defaults() {
        let config = Config::from_yaml_str(indoc! {"
            optimize: false
            vm:
              max_call_depth: 64
              angle_mode: degrees
        "})
        .expect("valid config");
        assert!(!config.optimize);
        assert_eq!(config.vm.max_call_depth, 64);
        assert_eq!(config.vm.angle_mode, AngleMode::Degrees);
        assert_eq!(config.suggestions, SuggestionConfig::default());
        assert_eq!(config.optimizer.max_rounds, 16);
    }

    #[test]
    fn rejects_unknown_keys() {
        let error = Config::from_yaml_str("optimise: true\n").expect_err("typo must fail");
        assert!(format!("{error:#}").contains("unknown field"));
    }
}
