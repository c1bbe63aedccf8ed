//! Memory budget tracking for audio assets
//!
//! Thread-safe accounting of compressed and decoded bytes against
//! configurable ceilings. Reservation is a CAS loop that fails (rather than
//! blocks) on overflow, so loads degrade gracefully when the budget is
//! exhausted.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Budget ceilings and warning threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Ceiling for compressed source bytes held in memory
    pub max_compressed_bytes: usize,

    /// Ceiling for bytes decoded ahead of playback
    pub max_decoded_bytes: usize,

    /// Fraction of either ceiling at which `is_warning` trips
    pub warning_threshold: f32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_compressed_bytes: 64 * 1024 * 1024,
            max_decoded_bytes: 8 * 1024 * 1024,
            warning_threshold: 0.85,
        }
    }
}

/// Point-in-time usage snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub compressed_bytes: usize,
    pub decoded_bytes: usize,
    pub total_bytes: usize,
    pub compressed_percent: f32,
    pub decoded_percent: f32,
}

/// Atomic byte-budget tracker, queryable from any thread.
#[derive(Debug)]
pub struct MemoryBudget {
    config: BudgetConfig,
    compressed: AtomicUsize,
    decoded: AtomicUsize,
}

impl MemoryBudget {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            compressed: AtomicUsize::new(0),
            decoded: AtomicUsize::new(0),
        }
    }

    /// Reserve compressed bytes. Returns `false` without side effects when
    /// the reservation would exceed the ceiling.
    pub fn try_alloc_compressed(&self, bytes: usize) -> bool {
        Self::try_alloc(&self.compressed, bytes, self.config.max_compressed_bytes)
    }

    pub fn free_compressed(&self, bytes: usize) {
        self.compressed.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Reserve decoded bytes. Returns `false` without side effects when the
    /// reservation would exceed the ceiling.
    pub fn try_alloc_decoded(&self, bytes: usize) -> bool {
        Self::try_alloc(&self.decoded, bytes, self.config.max_decoded_bytes)
    }

    pub fn free_decoded(&self, bytes: usize) {
        self.decoded.fetch_sub(bytes, Ordering::Relaxed);
    }

    fn try_alloc(counter: &AtomicUsize, bytes: usize, ceiling: usize) -> bool {
        let mut current = counter.load(Ordering::Relaxed);
        loop {
            let Some(desired) = current.checked_add(bytes) else {
                return false;
            };
            if desired > ceiling {
                return false;
            }
            match counter.compare_exchange_weak(
                current,
                desired,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Snapshot current usage.
    pub fn usage(&self) -> MemoryUsage {
        let compressed_bytes = self.compressed.load(Ordering::Relaxed);
        let decoded_bytes = self.decoded.load(Ordering::Relaxed);

        let percent = |used: usize, ceiling: usize| {
            if ceiling > 0 {
                used as f32 / ceiling as f32
            } else {
                0.0
            }
        };

        MemoryUsage {
            compressed_bytes,
            decoded_bytes,
            total_bytes: compressed_bytes + decoded_bytes,
            compressed_percent: percent(compressed_bytes, self.config.max_compressed_bytes),
            decoded_percent: percent(decoded_bytes, self.config.max_decoded_bytes),
        }
    }

    /// Whether either pool is past the warning threshold.
    pub fn is_warning(&self) -> bool {
        let usage = self.usage();
        usage.compressed_percent >= self.config.warning_threshold
            || usage.decoded_percent >= self.config.warning_threshold
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_budget() -> MemoryBudget {
        MemoryBudget::new(BudgetConfig {
            max_compressed_bytes: 1000,
            max_decoded_bytes: 100,
            warning_threshold: 0.85,
        })
    }

    #[test]
    fn test_alloc_within_budget() {
        let budget = small_budget();

        assert!(budget.try_alloc_compressed(600));
        assert!(budget.try_alloc_compressed(400));
        assert_eq!(budget.usage().compressed_bytes, 1000);
    }

    #[test]
    fn test_alloc_over_budget_fails_cleanly() {
        let budget = small_budget();

        assert!(budget.try_alloc_compressed(900));
        assert!(!budget.try_alloc_compressed(200));
        // Failed reservation leaves the counter untouched
        assert_eq!(budget.usage().compressed_bytes, 900);
    }

    #[test]
    fn test_free_releases() {
        let budget = small_budget();

        assert!(budget.try_alloc_compressed(1000));
        assert!(!budget.try_alloc_compressed(1));

        budget.free_compressed(500);
        assert!(budget.try_alloc_compressed(400));
    }

    #[test]
    fn test_decoded_pool_independent() {
        let budget = small_budget();

        assert!(budget.try_alloc_decoded(100));
        assert!(!budget.try_alloc_decoded(1));
        assert!(budget.try_alloc_compressed(500));

        let usage = budget.usage();
        assert_eq!(usage.decoded_bytes, 100);
        assert_eq!(usage.total_bytes, 600);
        assert!((usage.decoded_percent - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_warning_threshold() {
        let budget = small_budget();
        assert!(!budget.is_warning());

        assert!(budget.try_alloc_compressed(850));
        assert!(budget.is_warning());

        budget.free_compressed(200);
        assert!(!budget.is_warning());
    }

    #[test]
    fn test_concurrent_reservations_respect_ceiling() {
        use std::sync::Arc;

        let budget = Arc::new(MemoryBudget::new(BudgetConfig {
            max_compressed_bytes: 10_000,
            max_decoded_bytes: 0,
            warning_threshold: 0.85,
        }));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let budget = Arc::clone(&budget);
            handles.push(std::thread::spawn(move || {
                let mut granted = 0usize;
                for _ in 0..1000 {
                    if budget.try_alloc_compressed(10) {
                        granted += 10;
                    }
                }
                granted
            }));
        }

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 10_000, "grants must sum to exactly the ceiling");
        assert_eq!(budget.usage().compressed_bytes, 10_000);
    }
}
