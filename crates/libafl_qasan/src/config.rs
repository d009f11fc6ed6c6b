//! # config
//! Runtime configuration of the bridge, carried by [`crate::Qasan`].
use std::env;

use thiserror::Error;

/// Guard bytes recorded in the page table on each side of a heap allocation.
pub const DEFAULT_HEAP_PAD: usize = 128;

pub const QASAN_DEBUG_ENV: &str = "QASAN_DEBUG";
pub const QASAN_HEAP_PAD_ENV: &str = "QASAN_HEAP_PAD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QasanConfig {
    /// Log every dispatched action.
    pub debug: bool,
    pub heap_pad: usize,
}

impl Default for QasanConfig {
    fn default() -> Self {
        Self {
            debug: false,
            heap_pad: DEFAULT_HEAP_PAD,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

impl QasanConfig {
    /// Reads `QASAN_DEBUG` and `QASAN_HEAP_PAD`, keeping the defaults for
    /// unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(QASAN_DEBUG_ENV) {
            config.debug = parse_flag(&value);
        }
        if let Some(value) = lookup(QASAN_HEAP_PAD_ENV) {
            config.heap_pad = parse_size(&value).ok_or_else(|| ConfigError::InvalidValue {
                var: QASAN_HEAP_PAD_ENV,
                value,
            })?;
        }
        Ok(config)
    }
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0")
}

fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
