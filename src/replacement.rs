//! Replacement policy family: LRU, FIFO, Random, Tree-PLRU, NRU.
//!
//! Policies are a closed, small set, so they are realized as a tagged sum
//! type (`ReplacementState`) rather than a vtable — one instance per cache
//! set, holding whatever auxiliary state that policy needs. All policies
//! share the capability set from the design notes: `on_access`,
//! `on_install`, `select_victim`, `reset`. Only `select_victim` observes
//! which ways are valid, and it always prefers an invalid way when one
//! exists. Ties break to the lowest way index.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Which replacement policy a cache level uses. Selected by configuration;
/// one [`ReplacementState`] per set is built from this plus the set's
/// associativity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacementPolicyKind {
    Lru,
    Fifo,
    Random,
    Plru,
    Nru,
}

/// Per-set mutable state for whichever policy the level was configured
/// with.
#[derive(Debug)]
pub enum ReplacementState {
    Lru {
        /// Front = least-recently-used, back = most-recently-used.
        order: VecDeque<usize>,
    },
    Fifo {
        /// Install order; front = oldest-installed.
        order: VecDeque<usize>,
    },
    Random {
        rng: StdRng,
        associativity: usize,
    },
    Plru {
        /// `associativity - 1` direction bits, heap-indexed: node `i`'s
        /// children are `2i+1` and `2i+2`. `false` = victim candidate is
        /// the left subtree, `true` = right subtree.
        bits: Vec<bool>,
        depth: u32,
    },
    Nru {
        reference: Vec<bool>,
        associativity: usize,
        accesses_since_clear: u32,
    },
}

impl ReplacementState {
    pub fn new(kind: ReplacementPolicyKind, associativity: usize, seed: u64) -> Self {
        match kind {
            ReplacementPolicyKind::Lru => ReplacementState::Lru {
                order: (0..associativity).collect(),
            },
            ReplacementPolicyKind::Fifo => ReplacementState::Fifo {
                order: (0..associativity).collect(),
            },
            ReplacementPolicyKind::Random => ReplacementState::Random {
                rng: StdRng::seed_from_u64(seed),
                associativity,
            },
            ReplacementPolicyKind::Plru => {
                debug_assert!(associativity.is_power_of_two());
                ReplacementState::Plru {
                    bits: vec![false; associativity.saturating_sub(1)],
                    depth: associativity.trailing_zeros(),
                }
            }
            ReplacementPolicyKind::Nru => ReplacementState::Nru {
                reference: vec![false; associativity],
                associativity,
                accesses_since_clear: 0,
            },
        }
    }

    pub fn kind(&self) -> ReplacementPolicyKind {
        match self {
            ReplacementState::Lru { .. } => ReplacementPolicyKind::Lru,
            ReplacementState::Fifo { .. } => ReplacementPolicyKind::Fifo,
            ReplacementState::Random { .. } => ReplacementPolicyKind::Random,
            ReplacementState::Plru { .. } => ReplacementPolicyKind::Plru,
            ReplacementState::Nru { .. } => ReplacementPolicyKind::Nru,
        }
    }

    /// Called on every hit to `way`.
    pub fn on_access(&mut self, way: usize) {
        match self {
            ReplacementState::Lru { order } => promote_mru(order, way),
            ReplacementState::Fifo { .. } => {}
            ReplacementState::Random { .. } => {}
            ReplacementState::Plru { bits, depth } => plru_touch(bits, *depth, way),
            ReplacementState::Nru {
                reference,
                associativity,
                accesses_since_clear,
            } => {
                reference[way] = true;
                *accesses_since_clear += 1;
                if *accesses_since_clear >= 4 * *associativity as u32 {
                    reference.iter_mut().for_each(|r| *r = false);
                    *accesses_since_clear = 0;
                }
            }
        }
    }

    /// Called when a block is installed into `way` (after a miss).
    pub fn on_install(&mut self, way: usize) {
        match self {
            ReplacementState::Lru { order } => promote_mru(order, way),
            ReplacementState::Fifo { order } => {
                if let Some(pos) = order.iter().position(|&w| w == way) {
                    order.remove(pos);
                }
                order.push_back(way);
            }
            ReplacementState::Random { .. } => {}
            ReplacementState::Plru { bits, depth } => plru_touch(bits, *depth, way),
            ReplacementState::Nru { reference, .. } => {
                reference[way] = true;
            }
        }
    }

    /// Selects a victim way. Always prefers an invalid way (a compulsory
    /// insertion) when one exists; only consults policy-specific state when
    /// every way in `valid_mask` is valid.
    pub fn select_victim(&mut self, valid_mask: &[bool]) -> usize {
        if let Some(way) = valid_mask.iter().position(|&v| !v) {
            return way;
        }

        match self {
            ReplacementState::Lru { order } => order.front().copied().unwrap_or(0),
            ReplacementState::Fifo { order } => order.front().copied().unwrap_or(0),
            ReplacementState::Random { rng, associativity } => rng.gen_range(0..*associativity),
            ReplacementState::Plru { bits, depth } => plru_select(bits, *depth),
            ReplacementState::Nru {
                reference,
                associativity,
                accesses_since_clear,
            } => {
                loop {
                    if let Some(way) = (0..*associativity).find(|&w| !reference[w]) {
                        return way;
                    }
                    reference.iter_mut().for_each(|r| *r = false);
                    *accesses_since_clear = 0;
                }
            }
        }
    }

    pub fn reset(&mut self) {
        match self {
            ReplacementState::Lru { order } => {
                let n = order.len();
                *order = (0..n).collect();
            }
            ReplacementState::Fifo { order } => {
                let n = order.len();
                *order = (0..n).collect();
            }
            ReplacementState::Random { .. } => {}
            ReplacementState::Plru { bits, .. } => bits.iter_mut().for_each(|b| *b = false),
            ReplacementState::Nru {
                reference,
                accesses_since_clear,
                ..
            } => {
                reference.iter_mut().for_each(|r| *r = false);
                *accesses_since_clear = 0;
            }
        }
    }
}

fn promote_mru(order: &mut VecDeque<usize>, way: usize) {
    if let Some(pos) = order.iter().position(|&w| w == way) {
        order.remove(pos);
    }
    order.push_back(way);
}

fn plru_touch(bits: &mut [bool], depth: u32, way: usize) {
    let mut node = 0usize;
    for j in 0..depth {
        let path_bit = (way >> (depth - 1 - j)) & 1;
        bits[node] = path_bit == 0;
        if j + 1 < depth {
            node = 2 * node + 1 + path_bit;
        }
    }
}

fn plru_select(bits: &[bool], depth: u32) -> usize {
    let mut node = 0usize;
    let mut way = 0usize;
    for j in 0..depth {
        let direction = if bits[node] { 1 } else { 0 };
        way = (way << 1) | direction;
        if j + 1 < depth {
            node = 2 * node + 1 + direction;
        }
    }
    way
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_victim_is_least_recently_used() {
        let mut s = ReplacementState::new(ReplacementPolicyKind::Lru, 3, 0);
        let all_valid = vec![true; 3];
        s.on_install(0);
        s.on_install(1);
        s.on_install(2);
        s.on_access(0);
        // 1 is now least-recently-used (0 was just touched, 2 was installed last).
        assert_eq!(s.select_victim(&all_valid), 1);
    }

    #[test]
    fn fifo_victim_is_oldest_installed_and_access_is_noop() {
        let mut s = ReplacementState::new(ReplacementPolicyKind::Fifo, 3, 0);
        let all_valid = vec![true; 3];
        s.on_install(0);
        s.on_install(1);
        s.on_install(2);
        s.on_access(0); // no-op for FIFO
        assert_eq!(s.select_victim(&all_valid), 0);
    }

    #[test]
    fn select_victim_prefers_invalid_way() {
        let mut s = ReplacementState::new(ReplacementPolicyKind::Lru, 3, 0);
        let mask = vec![true, false, true];
        assert_eq!(s.select_victim(&mask), 1);
    }

    #[test]
    fn random_is_deterministic_given_seed() {
        let mask = vec![true; 4];
        let mut a = ReplacementState::new(ReplacementPolicyKind::Random, 4, 42);
        let mut b = ReplacementState::new(ReplacementPolicyKind::Random, 4, 42);
        let seq_a: Vec<usize> = (0..10).map(|_| a.select_victim(&mask)).collect();
        let seq_b: Vec<usize> = (0..10).map(|_| b.select_victim(&mask)).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn plru_four_way_cycles_through_all_ways_without_repeat() {
        let mut s = ReplacementState::new(ReplacementPolicyKind::Plru, 4, 0);
        let mask = vec![true; 4];
        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            let victim = s.select_victim(&mask);
            seen.insert(victim);
            s.on_access(victim);
        }
        assert_eq!(seen.len(), 4, "expected PLRU to round-robin through all ways: {seen:?}");
    }

    #[test]
    fn nru_clears_reference_bits_when_all_set() {
        let mut s = ReplacementState::new(ReplacementPolicyKind::Nru, 2, 0);
        let mask = vec![true; 2];
        s.on_access(0);
        s.on_access(1);
        // Both reference bits set; select_victim must clear and rescan.
        let victim = s.select_victim(&mask);
        assert!(victim == 0 || victim == 1);
    }

    #[test]
    fn reset_restores_initial_lru_order() {
        let mut s = ReplacementState::new(ReplacementPolicyKind::Lru, 2, 0);
        s.on_access(1);
        s.reset();
        let mask = vec![true; 2];
        assert_eq!(s.select_victim(&mask), 0);
    }
}
