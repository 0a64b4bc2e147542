// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ConvergeError, Result};
use crate::validation::deep_validate;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ConvergeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Global sanity checks followed by cluster deep validation.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    validate_ssh_key(cfg)?;
    deep_validate(&cfg.cluster, &cfg.instance_groups, cfg.config.strict)
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.concurrency == 0 {
        return Err(ConvergeError::ConfigError(
            "[config].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.region.trim().is_empty() {
        return Err(ConvergeError::ConfigError(
            "[config].region must not be empty".to_string(),
        ));
    }
    if cfg.cluster.name.trim().is_empty() {
        return Err(ConvergeError::ConfigError(
            "[cluster].name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_ssh_key(cfg: &RawConfigFile) -> Result<()> {
    let Some(key) = &cfg.ssh_key else {
        return Err(ConvergeError::ConfigError(
            "config must contain an [ssh_key] section".to_string(),
        ));
    };
    match (&key.public_key, &key.public_key_file) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        (Some(_), Some(_)) => Err(ConvergeError::ConfigError(
            "[ssh_key] must set only one of `public_key` and `public_key_file`".to_string(),
        )),
        (None, None) => Err(ConvergeError::ConfigError(
            "[ssh_key] must set `public_key` or `public_key_file`".to_string(),
        )),
    }
}
