use crate::*;
use std::env;
use std::str::FromStr;

pub const DEFAULT_MAX_CANDIDATES: usize = 50;
pub const DEFAULT_MIN_DURATION: u64 = 60 * 60;
pub const DEFAULT_MAX_DURATION: u64 = 30 * 24 * 60 * 60;

/// Protocol limits shared by every election in a registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub tree_depth: usize,
    pub max_candidates: usize,
    pub min_duration: u64,
    pub max_duration: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            tree_depth: DEFAULT_TREE_DEPTH,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            min_duration: DEFAULT_MIN_DURATION,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}

impl ProtocolConfig {
    /// Read overrides from `ZKBALLOT_TREE_DEPTH`, `ZKBALLOT_MAX_CANDIDATES`,
    /// `ZKBALLOT_MIN_DURATION` and `ZKBALLOT_MAX_DURATION`.
    pub fn from_env() -> Result<Self, Error> {
        let defaults = ProtocolConfig::default();
        let config = ProtocolConfig {
            tree_depth: env_or("ZKBALLOT_TREE_DEPTH", defaults.tree_depth)?,
            max_candidates: env_or("ZKBALLOT_MAX_CANDIDATES", defaults.max_candidates)?,
            min_duration: env_or("ZKBALLOT_MIN_DURATION", defaults.min_duration)?,
            max_duration: env_or("ZKBALLOT_MAX_DURATION", defaults.max_duration)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.tree_depth == 0 || self.tree_depth > MAX_TREE_DEPTH {
            return Err(Error::Config(format!(
                "tree depth must be within 1..={}, found {}",
                MAX_TREE_DEPTH, self.tree_depth
            )));
        }
        if self.max_candidates < 2 {
            return Err(Error::Config(format!(
                "max candidates must be at least 2, found {}",
                self.max_candidates
            )));
        }
        if self.min_duration > self.max_duration {
            return Err(Error::Config(format!(
                "min duration {} exceeds max duration {}",
                self.min_duration, self.max_duration
            )));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, Error> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has invalid value {:?}", key, value))),
        Err(_) => Ok(default),
    }
}

/// Optional capabilities of the election state machine.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    /// Privileged transitions check the caller's role
    pub role_gating: bool,

    /// Admins may pause and resume elections
    pub pausable: bool,
}

impl FeatureSet {
    /// No role checks and no emergency pause.
    pub fn open() -> Self {
        FeatureSet {
            role_gating: false,
            pausable: false,
        }
    }

    /// Role checks and emergency pause.
    pub fn governed() -> Self {
        FeatureSet {
            role_gating: true,
            pausable: true,
        }
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        FeatureSet::governed()
    }
}
