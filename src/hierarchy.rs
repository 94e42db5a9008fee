//! Memory hierarchy: composes a required L1 and an optional L2, owns the
//! cross-level stride predictor and adaptive prefetcher, and exposes the
//! single public entry point the dispatcher drives a trace through.

use serde::{Deserialize, Serialize};

use crate::cache_level::{AccessOutcome, CacheLevel, CacheLevelConfig, PrefetchHint};
use crate::error::SimulationError;
use crate::prefetch::adaptive::PrefetchStrategy;
use crate::prefetch::{AdaptivePrefetcher, StridePredictor};

/// How often (in accesses) the adaptive prefetcher re-evaluates its
/// distance and strategy choice.
const ADAPT_INTERVAL: u64 = 1000;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct HierarchyCounters {
    pub accesses: u64,
    pub reads: u64,
    pub writes: u64,
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub useful_prefetches: u64,
    pub useless_prefetches: u64,
}

pub struct MemoryHierarchy {
    l1: CacheLevel,
    l2: Option<CacheLevel>,
    stride_predictor: StridePredictor,
    adaptive: Option<AdaptivePrefetcher>,
    now: u64,
    counters: HierarchyCounters,
}

impl MemoryHierarchy {
    pub fn new(l1_config: &CacheLevelConfig, l2_config: Option<&CacheLevelConfig>) -> Self {
        let adaptive = l1_config
            .prefetch
            .filter(|p| p.enabled && p.adaptive)
            .map(|p| AdaptivePrefetcher::new(PrefetchStrategy::Adaptive, p.distance.max(1), p.distance.max(1) * 8));

        Self {
            l1: CacheLevel::new("L1", l1_config),
            l2: l2_config.map(|cfg| CacheLevel::new("L2", cfg)),
            stride_predictor: StridePredictor::new(),
            adaptive,
            now: 0,
            counters: HierarchyCounters::default(),
        }
    }

    pub fn counters(&self) -> &HierarchyCounters {
        &self.counters
    }

    pub fn l1(&self) -> &CacheLevel {
        &self.l1
    }

    pub fn l2(&self) -> Option<&CacheLevel> {
        self.l2.as_ref()
    }

    /// Single public entry point: updates the stride predictor, computes a
    /// prefetch hint when the adaptive prefetcher favors the stride
    /// strategy, dispatches to L1 (which recurses into L2), periodically
    /// re-tunes the adaptive prefetcher, and folds the outcome into the
    /// aggregate counters.
    pub fn access(&mut self, addr: u64, is_write: bool) -> Result<AccessOutcome, SimulationError> {
        self.stride_predictor.update(addr);

        let hint = self.adaptive.as_ref().and_then(|a| match a.current_strategy() {
            PrefetchStrategy::Stride => {
                let stride = self.stride_predictor.get_stride(addr);
                if stride != 0 {
                    Some(PrefetchHint {
                        stride,
                        distance: a.distance(),
                    })
                } else {
                    None
                }
            }
            _ => None,
        });

        self.now += 1;
        let outcome = self.l1.access(addr, is_write, self.l2.as_mut(), self.now, hint)?;

        self.counters.accesses += 1;
        if is_write {
            self.counters.writes += 1;
        } else {
            self.counters.reads += 1;
        }
        if outcome.hit {
            self.counters.l1_hits += 1;
        } else {
            self.counters.l1_misses += 1;
        }
        if let Some(l2) = &self.l2 {
            self.counters.l2_hits = l2.stats().hits;
            self.counters.l2_misses = l2.stats().misses;
        }

        if let Some(adaptive) = &mut self.adaptive {
            if outcome.prefetch_was_useful {
                adaptive.record_outcome(true);
                self.counters.useful_prefetches += 1;
            }
            if outcome.prefetch_was_wasted {
                adaptive.record_outcome(false);
                self.counters.useless_prefetches += 1;
            }
            if self.counters.accesses % ADAPT_INTERVAL == 0 {
                adaptive.adapt();
            }
        }

        Ok(outcome)
    }

    /// Drains any pending write-combining entries at both levels, issuing
    /// their writes to the next level down. Call once after the trace is
    /// exhausted.
    pub fn flush(&mut self) -> Result<(), SimulationError> {
        self.l1.flush_write_combining(self.l2.as_mut(), self.now)?;
        if let Some(l2) = &mut self.l2 {
            l2.flush_write_combining(None, self.now)?;
        }
        Ok(())
    }
}
