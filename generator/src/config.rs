use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read configuration {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("`{field}` must lie in [0, 1], got {value}")]
    Probability { field: &'static str, value: f64 },
    #[error("`{field}` {reason}")]
    Range { field: &'static str, reason: &'static str },
    #[error("invalid {table} weights: {reason}")]
    Weights { table: &'static str, reason: String },
}

/// Probabilities and weights driving the obfuscator, the value synthesizer
/// and the permutation ranks.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObfuscationConfig {
    /// Chance that the wrapping loop stops before the next transform
    pub p_stop: f64,
    pub w_assign_decoy: u32,
    pub w_declare_decoy: u32,
    pub w_if: u32,
    pub w_switch: u32,
    pub w_for: u32,
    pub w_while: u32,
    /// Chance of no further always-false `else if` branch
    pub p_branch_stop: f64,
    /// Chance of no further decoy `case`
    pub p_case_stop: f64,
    /// Switch on a pooled decoy, when one exists, rather than a fresh variable
    pub p_switch_on_decoy: f64,
    /// Decoy case holding a single distractor rather than a nested block
    pub p_simple_decoy_case: f64,
    pub p_case_break: f64,
    pub min_trips: u32,
    pub max_trips: u32,
    pub w_literal: u32,
    pub w_minus: u32,
    pub w_plus: u32,
    pub w_mask: u32,
    pub w_xor: u32,
    pub w_reflexive: u32,
    pub w_distinct: u32,
    /// Chance that a child shares the rank of its left neighbour
    pub p_sticky_rank: f64,
    pub name_length: usize,
    /// Also attach always-false `else if` branches to assignment goals
    pub assign_else_branches: bool,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            p_stop: 1.0 / 7.0,
            w_assign_decoy: 1,
            w_declare_decoy: 1,
            w_if: 1,
            w_switch: 1,
            w_for: 1,
            w_while: 1,
            p_branch_stop: 0.3,
            p_case_stop: 0.3,
            p_switch_on_decoy: 0.5,
            p_simple_decoy_case: 0.8,
            p_case_break: 0.5,
            min_trips: 1,
            max_trips: 9,
            w_literal: 6,
            w_minus: 1,
            w_plus: 1,
            w_mask: 1,
            w_xor: 1,
            w_reflexive: 1,
            w_distinct: 1,
            p_sticky_rank: 0.6,
            name_length: 3,
            assign_else_branches: false,
        }
    }
}

fn probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Probability { field, value })
    }
}

fn range(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Range { field, reason }
}

impl ObfuscationConfig {
    /// Other weights are checked when the generator builds its tables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        probability("p_stop", self.p_stop)?;
        probability("p_branch_stop", self.p_branch_stop)?;
        probability("p_case_stop", self.p_case_stop)?;
        probability("p_switch_on_decoy", self.p_switch_on_decoy)?;
        probability("p_simple_decoy_case", self.p_simple_decoy_case)?;
        probability("p_case_break", self.p_case_break)?;
        probability("p_sticky_rank", self.p_sticky_rank)?;
        if self.p_stop == 0.0 {
            return Err(range("p_stop", "must be positive or obfuscation never ends"));
        }
        if self.p_branch_stop == 0.0 {
            return Err(range("p_branch_stop", "must be positive or branch generation never ends"));
        }
        if self.p_case_stop == 0.0 {
            return Err(range("p_case_stop", "must be positive or case generation never ends"));
        }
        if self.w_literal == 0 {
            return Err(range("w_literal", "must be positive or value synthesis never ends"));
        }
        if self.min_trips == 0 {
            return Err(range("min_trips", "must be at least 1 so the goal still runs"));
        }
        if self.min_trips > self.max_trips {
            return Err(range("max_trips", "must not be below min_trips"));
        }
        if self.name_length < 2 {
            return Err(range("name_length", "must be at least 2"));
        }
        Ok(())
    }
}

/// Shape of the statement whose effect every variant preserves
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalKind {
    /// `x = value` in `main`, checked by an assertion
    #[default]
    Assign,
    /// `return value` from a helper, checked by an assertion in `main`
    Return,
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    pub goal: GoalKind,
    /// Initialized decoys declared at function scope and offered to the obfuscator
    pub n_decoys: usize,
    /// Numbered variants written next to the primary program
    pub max_variants: usize,
    pub obfuscation: ObfuscationConfig,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            goal: GoalKind::Assign,
            n_decoys: 2,
            max_variants: 100,
            obfuscation: ObfuscationConfig::default(),
        }
    }
}

impl ScriptConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ScriptConfig = toml::from_str(s)?;
        config.obfuscation.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
