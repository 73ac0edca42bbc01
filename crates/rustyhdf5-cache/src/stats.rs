//! Cache statistics, kept per entry type.

use std::collections::BTreeMap;
use std::fmt;

/// Counters for one entry type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeStats {
    /// Diagnostic name of the type.
    pub name: String,
    /// Protects satisfied from the cache.
    pub hits: u64,
    /// Protects that had to call `load`.
    pub misses: u64,
    /// Entries added through `insert_entry`.
    pub insertions: u64,
    /// Entries removed through `unprotect` with `DELETED`.
    pub deletions: u64,
    /// Entries dropped to make space or by an invalidating flush.
    pub evictions: u64,
    /// Successful `flush` callbacks.
    pub flushes: u64,
    /// Failed `flush` callbacks.
    pub flush_failures: u64,
    /// Flush attempts skipped because the write-permission policy refused.
    pub write_denials: u64,
    /// Dirty entries marked clean through `clear`.
    pub clears: u64,
    pub renames: u64,
}

impl TypeStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Hit rate in `0.0..=1.0`, zero when the type was never protected.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    fn accumulate(&mut self, other: &TypeStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.insertions += other.insertions;
        self.deletions += other.deletions;
        self.evictions += other.evictions;
        self.flushes += other.flushes;
        self.flush_failures += other.flush_failures;
        self.write_denials += other.write_denials;
        self.clears += other.clears;
        self.renames += other.renames;
    }

    fn reset(&mut self) {
        let name = core::mem::take(&mut self.name);
        *self = Self::new(name);
    }
}

/// Snapshot of the whole cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheStats {
    /// Counters keyed by entry type tag.
    pub per_type: BTreeMap<u8, TypeStats>,
    /// Bytes currently resident.
    pub current_size: usize,
    /// Largest resident size seen since the last reset.
    pub peak_size: usize,
    /// Entries currently resident.
    pub current_entries: usize,
    /// Largest entry count seen since the last reset.
    pub peak_entries: usize,
}

impl CacheStats {
    pub(crate) fn type_mut(&mut self, id: u8, name: &str) -> &mut TypeStats {
        self.per_type
            .entry(id)
            .or_insert_with(|| TypeStats::new(name))
    }

    /// Counters summed over every type.
    pub fn totals(&self) -> TypeStats {
        let mut total = TypeStats::new("total");
        for stats in self.per_type.values() {
            total.accumulate(stats);
        }
        total
    }

    /// Overall hit rate.
    pub fn hit_rate(&self) -> f64 {
        self.totals().hit_rate()
    }

    /// Record the current occupancy, updating the peaks.
    pub(crate) fn observe(&mut self, size: usize, entries: usize) {
        self.current_size = size;
        self.current_entries = entries;
        self.peak_size = self.peak_size.max(size);
        self.peak_entries = self.peak_entries.max(entries);
    }

    /// Zero every counter. Peaks restart from the current occupancy.
    pub fn reset(&mut self) {
        for stats in self.per_type.values_mut() {
            stats.reset();
        }
        self.peak_size = self.current_size;
        self.peak_entries = self.current_entries;
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "size {} (peak {}), entries {} (peak {})",
            self.current_size, self.peak_size, self.current_entries, self.peak_entries
        )?;
        writeln!(
            f,
            "{:<20} {:>8} {:>8} {:>7} {:>8} {:>8} {:>8} {:>7} {:>7} {:>7}",
            "type", "hits", "misses", "hit%", "inserts", "evicts", "flushes", "fails", "denied",
            "renames"
        )?;
        let totals = self.totals();
        for stats in self.per_type.values().chain(core::iter::once(&totals)) {
            writeln!(
                f,
                "{:<20} {:>8} {:>8} {:>6.1}% {:>8} {:>8} {:>8} {:>7} {:>7} {:>7}",
                stats.name,
                stats.hits,
                stats.misses,
                stats.hit_rate() * 100.0,
                stats.insertions,
                stats.evictions,
                stats.flushes,
                stats.flush_failures,
                stats.write_denials,
                stats.renames
            )?;
        }
        Ok(())
    }
}
