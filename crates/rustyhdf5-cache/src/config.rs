//! Cache sizing and replacement configuration.
//!
//! Follows the property-list style: a plain struct with `Default`, `new()`
//! and consuming setters.

use crate::error::{CacheError, Result};

/// Default maximum cache size: 1 MiB.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1024 * 1024;

/// Default minimum clean size: 512 KiB.
pub const DEFAULT_MIN_CLEAN_SIZE: usize = 512 * 1024;

/// Smallest accepted `max_size`: 1 KiB.
pub const MIN_MAX_CACHE_SIZE: usize = 1024;

/// Largest accepted `max_size`: 128 MiB.
pub const MAX_MAX_CACHE_SIZE: usize = 128 * 1024 * 1024;

/// Metadata cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheConfig {
    /// Soft cap on the total size of resident entries, in bytes.
    pub max_size: usize,
    /// Clean bytes the replacement policy tries to keep available at the
    /// cold end of the LRU list. Only acted on when `flush_before_evict`
    /// is enabled.
    pub min_clean_size: usize,
    /// Flush dirty eviction candidates (subject to the write-permission
    /// policy) instead of skipping them.
    pub flush_before_evict: bool,
    /// When false the cache never evicts and may grow past `max_size`.
    pub evictions_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_CACHE_SIZE,
            min_clean_size: DEFAULT_MIN_CLEAN_SIZE,
            flush_before_evict: false,
            evictions_enabled: true,
        }
    }
}

impl CacheConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration derived from a caller's size hint.
    ///
    /// A zero hint keeps the defaults. Any other hint becomes `max_size`,
    /// clamped to [`MIN_MAX_CACHE_SIZE`]..=[`MAX_MAX_CACHE_SIZE`], with
    /// half of it reserved as clean space.
    pub fn from_size_hint(size_hint: usize) -> Self {
        if size_hint == 0 {
            return Self::default();
        }
        let max_size = size_hint.clamp(MIN_MAX_CACHE_SIZE, MAX_MAX_CACHE_SIZE);
        Self {
            max_size,
            min_clean_size: max_size / 2,
            ..Self::default()
        }
    }

    /// Set the maximum cache size in bytes.
    pub fn max_size(mut self, bytes: usize) -> Self {
        self.max_size = bytes;
        self
    }

    /// Set the minimum clean size in bytes.
    pub fn min_clean_size(mut self, bytes: usize) -> Self {
        self.min_clean_size = bytes;
        self
    }

    /// Enable or disable flushing dirty entries to make room.
    pub fn flush_before_evict(mut self, enabled: bool) -> Self {
        self.flush_before_evict = enabled;
        self
    }

    /// Enable or disable eviction.
    pub fn evictions_enabled(mut self, enabled: bool) -> Self {
        self.evictions_enabled = enabled;
        self
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_MAX_CACHE_SIZE..=MAX_MAX_CACHE_SIZE).contains(&self.max_size) {
            return Err(CacheError::InvalidArgument(format!(
                "max_size {} outside {MIN_MAX_CACHE_SIZE}..={MAX_MAX_CACHE_SIZE}",
                self.max_size
            )));
        }
        if self.min_clean_size > self.max_size {
            return Err(CacheError::InvalidArgument(format!(
                "min_clean_size {} exceeds max_size {}",
                self.min_clean_size, self.max_size
            )));
        }
        Ok(())
    }
}
