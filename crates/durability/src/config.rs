//! Journal configuration.
//!
//! This module provides configuration for the journal: where segments live,
//! what they are called and how large each segment kind may grow.

use crate::paths::JournalPaths;
use std::path::PathBuf;

/// Smallest capacity accepted for either segment kind
pub const MIN_SEGMENT_CAPACITY: usize = 4096;

/// Journal configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalConfig {
    /// Directory holding segments and the term sidecar (default: `fdl`,
    /// relative to the working directory).
    pub log_dir: PathBuf,

    /// Journal identity, used as the file name prefix (default: `fubar`).
    pub ident: String,

    /// Metadata segment capacity in bytes (default: 1MB).
    ///
    /// A term rolls over when the next event would not fit.
    pub meta_capacity: usize,

    /// Data segment capacity in bytes (default: 16MB).
    pub data_capacity: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        JournalConfig {
            log_dir: PathBuf::from("fdl"),
            ident: "fubar".to_string(),
            meta_capacity: 1 << 20, // 1MB
            data_capacity: 1 << 24, // 16MB
        }
    }
}

impl JournalConfig {
    /// Create a new journal configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log directory (builder pattern).
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Set the journal identity (builder pattern).
    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = ident.into();
        self
    }

    /// Set metadata segment capacity (builder pattern).
    pub fn with_meta_capacity(mut self, bytes: usize) -> Self {
        self.meta_capacity = bytes;
        self
    }

    /// Set data segment capacity (builder pattern).
    pub fn with_data_capacity(mut self, bytes: usize) -> Self {
        self.data_capacity = bytes;
        self
    }

    /// On-disk layout described by this configuration.
    pub fn paths(&self) -> JournalPaths {
        JournalPaths::new(&self.log_dir, self.ident.clone())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ident.is_empty()
            || self.ident.contains(&['/', '\\', '\0'][..])
            || self.ident == "."
            || self.ident == ".."
        {
            return Err(ConfigError::InvalidIdent(self.ident.clone()));
        }
        if self.meta_capacity < MIN_SEGMENT_CAPACITY {
            return Err(ConfigError::CapacityTooSmall {
                kind: "meta",
                capacity: self.meta_capacity,
            });
        }
        if self.data_capacity < MIN_SEGMENT_CAPACITY {
            return Err(ConfigError::CapacityTooSmall {
                kind: "data",
                capacity: self.data_capacity,
            });
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (small segments).
    pub fn for_testing() -> Self {
        JournalConfig {
            meta_capacity: 64 * 1024,  // 64KB for faster rollover in tests
            data_capacity: 256 * 1024, // 256KB
            ..Self::default()
        }
    }
}

/// Journal configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Ident is empty or cannot be used in a file name.
    #[error("invalid journal ident {0:?}")]
    InvalidIdent(String),

    /// Segment capacity is below the minimum.
    #[error("{kind} segment capacity {capacity} is below the 4KB minimum")]
    CapacityTooSmall {
        /// Segment kind ("meta" or "data")
        kind: &'static str,
        /// Configured capacity
        capacity: usize,
    },
}
