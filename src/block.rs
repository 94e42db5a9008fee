//! Cache block & set: the passive data model shared by every cache level.

use crate::coherence::CoherenceState;

/// One cache block (a "way" inside a set).
///
/// Invariant: `valid <=> coherence_state != Invalid`.
/// Invariant: a Modified block is always dirty; a block in Shared or
/// Exclusive is never dirty.
#[derive(Clone, Debug)]
pub struct CacheBlock {
    pub valid: bool,
    pub dirty: bool,
    pub tag: u64,
    pub state: CoherenceState,
    pub access_count: u32,
    pub last_access_time: u64,
    pub install_time: u64,
    pub prefetched: bool,
}

impl Default for CacheBlock {
    fn default() -> Self {
        Self {
            valid: false,
            dirty: false,
            tag: 0,
            state: CoherenceState::Invalid,
            access_count: 0,
            last_access_time: 0,
            install_time: 0,
            prefetched: false,
        }
    }
}

impl CacheBlock {
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Installs a fresh block with the given tag at `now`, in the given
    /// coherence state. Dirty is set only for Modified.
    pub fn install(&mut self, tag: u64, state: CoherenceState, now: u64, prefetched: bool) {
        self.valid = state != CoherenceState::Invalid;
        self.dirty = state == CoherenceState::Modified;
        self.tag = tag;
        self.state = state;
        self.access_count = 0;
        self.last_access_time = now;
        self.install_time = now;
        self.prefetched = prefetched;
    }

    pub fn touch(&mut self, now: u64) {
        self.access_count += 1;
        self.last_access_time = now;
        self.prefetched = false;
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
        self.dirty = false;
        self.state = CoherenceState::Invalid;
    }

    /// True only when this block is a real eviction candidate that would
    /// require a next-level write (dirty or Modified).
    pub fn needs_writeback(&self) -> bool {
        self.valid && (self.dirty || self.state == CoherenceState::Modified)
    }
}

/// A fixed array of `associativity` blocks making up one cache set.
/// Replacement-policy-specific auxiliary state lives alongside the policy
/// instance (see `crate::replacement`), not here — the set itself only
/// owns the blocks.
#[derive(Clone, Debug)]
pub struct CacheSet {
    pub blocks: Vec<CacheBlock>,
}

impl CacheSet {
    pub fn new(associativity: usize) -> Self {
        Self {
            blocks: (0..associativity).map(|_| CacheBlock::invalid()).collect(),
        }
    }

    pub fn associativity(&self) -> usize {
        self.blocks.len()
    }

    /// Linear scan for a valid block holding `tag`.
    pub fn find(&self, tag: u64) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| b.valid && b.tag == tag)
    }

    /// Bitmask (as a `Vec<bool>`) of which ways currently hold a valid
    /// block; the replacement policy's `select_victim` consults this to
    /// prefer an invalid way (a compulsory insertion, not a true eviction).
    pub fn validity_mask(&self) -> Vec<bool> {
        self.blocks.iter().map(|b| b.valid).collect()
    }

    pub fn first_invalid_way(&self) -> Option<usize> {
        self.blocks.iter().position(|b| !b.valid)
    }

    pub fn has_invalid_way(&self) -> bool {
        self.blocks.iter().any(|b| !b.valid)
    }

    /// No two ways may hold valid blocks with equal tags (universal
    /// invariant #4 in the design notes).
    #[cfg(debug_assertions)]
    pub fn assert_no_duplicate_tags(&self) -> Result<(), (usize, u64)> {
        let mut seen = std::collections::HashSet::new();
        for b in self.blocks.iter().filter(|b| b.valid) {
            if !seen.insert(b.tag) {
                return Err((0, b.tag));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_sets_dirty_only_for_modified() {
        let mut b = CacheBlock::invalid();
        b.install(5, CoherenceState::Modified, 10, false);
        assert!(b.dirty);
        assert!(b.valid);

        let mut b2 = CacheBlock::invalid();
        b2.install(5, CoherenceState::Shared, 10, false);
        assert!(!b2.dirty);
    }

    #[test]
    fn invalidate_clears_valid_and_dirty() {
        let mut b = CacheBlock::invalid();
        b.install(1, CoherenceState::Modified, 0, false);
        b.invalidate();
        assert!(!b.valid);
        assert!(!b.dirty);
        assert_eq!(b.state, CoherenceState::Invalid);
    }

    #[test]
    fn set_find_and_invalid_way() {
        let mut set = CacheSet::new(2);
        assert!(set.find(1).is_none());
        assert_eq!(set.first_invalid_way(), Some(0));
        set.blocks[0].install(1, CoherenceState::Shared, 0, false);
        assert_eq!(set.find(1), Some(0));
        assert_eq!(set.first_invalid_way(), Some(1));
    }

    #[test]
    fn needs_writeback_tracks_dirty_or_modified() {
        let mut b = CacheBlock::invalid();
        b.install(1, CoherenceState::Exclusive, 0, false);
        assert!(!b.needs_writeback());
        b.dirty = true;
        assert!(b.needs_writeback());
    }
}
