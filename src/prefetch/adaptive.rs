//! Adaptive prefetcher: picks between sequential and stride strategies and
//! adjusts aggressiveness (prefetch distance) from observed accuracy.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefetchStrategy {
    Sequential,
    Stride,
    /// Chooses between `Sequential` and `Stride` based on which strategy's
    /// confidence is currently higher; only meaningful as the *configured*
    /// mode — `current_strategy()` always reports a concrete choice.
    Adaptive,
}

const EMA_ALPHA: f64 = 0.1;
const HIGH_ACCURACY_THRESHOLD: f64 = 0.8;
const LOW_ACCURACY_THRESHOLD: f64 = 0.5;

#[derive(Debug)]
pub struct AdaptivePrefetcher {
    configured_strategy: PrefetchStrategy,
    current_strategy: PrefetchStrategy,
    distance: usize,
    max_distance: usize,
    confidence_sequential: f64,
    confidence_stride: f64,
    useful: u64,
    useless: u64,
}

impl AdaptivePrefetcher {
    pub fn new(configured_strategy: PrefetchStrategy, initial_distance: usize, max_distance: usize) -> Self {
        let current_strategy = match configured_strategy {
            PrefetchStrategy::Adaptive => PrefetchStrategy::Sequential,
            other => other,
        };
        Self {
            configured_strategy,
            current_strategy,
            distance: initial_distance.clamp(1, max_distance.max(1)),
            max_distance: max_distance.max(1),
            confidence_sequential: 0.5,
            confidence_stride: 0.5,
            useful: 0,
            useless: 0,
        }
    }

    pub fn current_strategy(&self) -> PrefetchStrategy {
        self.current_strategy
    }

    pub fn distance(&self) -> usize {
        self.distance
    }

    /// Adjusts the confidence of the currently chosen strategy by an
    /// exponential moving average (alpha = 0.1), and accumulates the
    /// useful/useless tallies `adapt()` uses for overall accuracy.
    pub fn record_outcome(&mut self, useful: bool) {
        let sample = if useful { 1.0 } else { 0.0 };
        let confidence = match self.current_strategy {
            PrefetchStrategy::Sequential => &mut self.confidence_sequential,
            PrefetchStrategy::Stride => &mut self.confidence_stride,
            PrefetchStrategy::Adaptive => unreachable!("current_strategy is never Adaptive"),
        };
        *confidence = *confidence * (1.0 - EMA_ALPHA) + sample * EMA_ALPHA;

        if useful {
            self.useful += 1;
        } else {
            self.useless += 1;
        }
    }

    fn overall_accuracy(&self) -> f64 {
        let total = self.useful + self.useless;
        if total == 0 {
            0.0
        } else {
            self.useful as f64 / total as f64
        }
    }

    /// Called periodically (every 1000 accesses per the hierarchy's
    /// schedule). Scales the prefetch distance from observed accuracy and,
    /// if configured as `Adaptive`, re-picks the higher-confidence
    /// strategy.
    pub fn adapt(&mut self) {
        let accuracy = self.overall_accuracy();
        if accuracy > HIGH_ACCURACY_THRESHOLD {
            self.distance = (self.distance * 2).min(self.max_distance);
        } else if accuracy < LOW_ACCURACY_THRESHOLD {
            self.distance = (self.distance / 2).max(1);
        }

        if self.configured_strategy == PrefetchStrategy::Adaptive {
            self.current_strategy = if self.confidence_stride > self.confidence_sequential {
                PrefetchStrategy::Stride
            } else {
                PrefetchStrategy::Sequential
            };
        }
    }

    pub fn useful_prefetches(&self) -> u64 {
        self.useful
    }

    pub fn useless_prefetches(&self) -> u64 {
        self.useless
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_starts_as_sequential() {
        let p = AdaptivePrefetcher::new(PrefetchStrategy::Adaptive, 1, 16);
        assert_eq!(p.current_strategy(), PrefetchStrategy::Sequential);
    }

    #[test]
    fn high_accuracy_doubles_distance_up_to_max() {
        let mut p = AdaptivePrefetcher::new(PrefetchStrategy::Sequential, 4, 8);
        for _ in 0..20 {
            p.record_outcome(true);
        }
        p.adapt();
        assert_eq!(p.distance(), 8);
    }

    #[test]
    fn low_accuracy_halves_distance_down_to_one() {
        let mut p = AdaptivePrefetcher::new(PrefetchStrategy::Sequential, 4, 16);
        for _ in 0..20 {
            p.record_outcome(false);
        }
        p.adapt();
        assert_eq!(p.distance(), 2);
        p.adapt();
        assert_eq!(p.distance(), 1);
        p.adapt();
        assert_eq!(p.distance(), 1, "floor at 1");
    }

    #[test]
    fn adaptive_strategy_switches_to_higher_confidence() {
        let mut p = AdaptivePrefetcher::new(PrefetchStrategy::Adaptive, 4, 16);
        // Record several useless outcomes under Sequential to drag its
        // confidence down, then flip current_strategy manually would be
        // needed to train Stride; instead verify the initial symmetric
        // confidences keep Sequential selected until Stride pulls ahead.
        for _ in 0..20 {
            p.record_outcome(false);
        }
        p.adapt();
        assert_eq!(p.current_strategy(), PrefetchStrategy::Sequential);
    }
}
