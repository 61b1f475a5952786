//! Runtime configuration for script verification
//!
//! Limits and the set of rules an engine instance may apply are plain data,
//! so one binary can validate under several rule sets (historical replay,
//! testing). Values load from JSON, from environment variables, or are built
//! programmatically. Nothing here is global.

use crate::constants::*;
use crate::error::ConsensusError;
use crate::flags::VERIFY_ALL_KNOWN;
use anyhow::Context;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Interpreter resource limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLimits {
    /// Maximum script length in bytes (consensus: 10,000)
    #[serde(default = "default_max_script_size")]
    pub max_script_size: usize,

    /// Maximum stack element size (consensus: 520)
    #[serde(default = "default_max_element_size")]
    pub max_element_size: usize,

    /// Maximum stack element size under the May 2025 rules (consensus: 10,000)
    #[serde(default = "default_may2025_max_element_size")]
    pub may2025_max_element_size: usize,

    /// Maximum counted operations per script (consensus: 201)
    #[serde(default = "default_max_ops")]
    pub max_ops: usize,

    /// Maximum stack plus altstack depth (consensus: 1,000)
    #[serde(default = "default_max_stack_size")]
    pub max_stack_size: usize,

    /// Maximum keys in CHECKMULTISIG (consensus: 20)
    #[serde(default = "default_max_pubkeys_per_multisig")]
    pub max_pubkeys_per_multisig: usize,

    /// Maximum IF nesting under the May 2025 rules (consensus: 100)
    #[serde(default = "default_max_conditional_depth")]
    pub max_conditional_depth: usize,
}

fn default_max_script_size() -> usize {
    MAX_SCRIPT_SIZE
}

fn default_max_element_size() -> usize {
    MAX_SCRIPT_ELEMENT_SIZE
}

fn default_may2025_max_element_size() -> usize {
    MAY2025_MAX_SCRIPT_ELEMENT_SIZE
}

fn default_max_ops() -> usize {
    MAX_SCRIPT_OPS
}

fn default_max_stack_size() -> usize {
    MAX_STACK_SIZE
}

fn default_max_pubkeys_per_multisig() -> usize {
    MAX_PUBKEYS_PER_MULTISIG
}

fn default_max_conditional_depth() -> usize {
    MAX_CONDITIONAL_STACK_DEPTH
}

fn default_enabled_rules() -> u32 {
    VERIFY_ALL_KNOWN
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_script_size: MAX_SCRIPT_SIZE,
            max_element_size: MAX_SCRIPT_ELEMENT_SIZE,
            may2025_max_element_size: MAY2025_MAX_SCRIPT_ELEMENT_SIZE,
            max_ops: MAX_SCRIPT_OPS,
            max_stack_size: MAX_STACK_SIZE,
            max_pubkeys_per_multisig: MAX_PUBKEYS_PER_MULTISIG,
            max_conditional_depth: MAX_CONDITIONAL_STACK_DEPTH,
        }
    }
}

/// Verification engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default)]
    pub limits: ScriptLimits,

    /// Fork value mixed into FORKID signature hash types (BCH: 0)
    #[serde(default)]
    pub fork_id: u32,

    /// Verify flags this engine may apply; requested flags outside the mask are dropped
    #[serde(default = "default_enabled_rules")]
    pub enabled_rules: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            limits: ScriptLimits::default(),
            fork_id: 0,
            enabled_rules: VERIFY_ALL_KNOWN,
        }
    }
}

impl ConsensusConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing consensus config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading consensus config {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Defaults overridden by environment variables
    ///
    /// Variables follow the pattern `CASH_CONSENSUS_<KEY>`:
    /// - `CASH_CONSENSUS_FORK_ID=0`
    /// - `CASH_CONSENSUS_ENABLED_RULES=0x1fffffff`
    /// - `CASH_CONSENSUS_MAX_OPS=201`
    ///
    /// A variable that is set but does not parse is an error, as is a result
    /// that fails [`ConsensusConfig::validate`].
    pub fn from_env() -> Result<Self, ConsensusError> {
        let mut config = Self::default();

        if let Some(fork_id) = env_u32("CASH_CONSENSUS_FORK_ID")? {
            config.fork_id = fork_id;
        }
        if let Some(rules) = env_u32("CASH_CONSENSUS_ENABLED_RULES")? {
            config.enabled_rules = rules;
        }

        let limits = &mut config.limits;
        let overrides: [(&str, &mut usize); 7] = [
            ("CASH_CONSENSUS_MAX_SCRIPT_SIZE", &mut limits.max_script_size),
            ("CASH_CONSENSUS_MAX_ELEMENT_SIZE", &mut limits.max_element_size),
            ("CASH_CONSENSUS_MAY2025_MAX_ELEMENT_SIZE", &mut limits.may2025_max_element_size),
            ("CASH_CONSENSUS_MAX_OPS", &mut limits.max_ops),
            ("CASH_CONSENSUS_MAX_STACK_SIZE", &mut limits.max_stack_size),
            ("CASH_CONSENSUS_MAX_PUBKEYS_PER_MULTISIG", &mut limits.max_pubkeys_per_multisig),
            ("CASH_CONSENSUS_MAX_CONDITIONAL_DEPTH", &mut limits.max_conditional_depth),
        ];
        for (name, slot) in overrides {
            if let Ok(val) = std::env::var(name) {
                *slot = val.parse::<usize>().map_err(|_| bad_env_value(name, &val))?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConsensusError> {
        let limits = &self.limits;
        if limits.max_element_size > limits.may2025_max_element_size {
            return Err(ConsensusError::Configuration(
                "max_element_size exceeds may2025_max_element_size".to_string(),
            ));
        }
        if limits.max_stack_size == 0 || limits.max_script_size == 0 {
            return Err(ConsensusError::Configuration(
                "stack and script limits must be non-zero".to_string(),
            ));
        }
        if self.fork_id > 0x00ff_ffff {
            return Err(ConsensusError::Configuration(
                "fork_id must fit in 24 bits".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_u32(name: &str) -> Result<Option<u32>, ConsensusError> {
    let Ok(val) = std::env::var(name) else {
        return Ok(None);
    };
    let parsed = match val.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => val.parse(),
    };
    parsed.map(Some).map_err(|_| bad_env_value(name, &val))
}

fn bad_env_value(name: &str, val: &str) -> ConsensusError {
    warn!("config from environment: {}={:?} does not parse", name, val);
    ConsensusError::Configuration(format!("{} has unparsable value {:?}", name, val))
}
