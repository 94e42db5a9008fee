//! Write policy family: the two orthogonal knobs (update, allocation) that
//! combine into the four behaviors from the design notes, plus the
//! optional write-combining buffer that can sit in front of a
//! write-through path.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdatePolicy {
    WriteBack,
    WriteThrough,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationPolicy {
    WriteAllocate,
    NoWriteAllocate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritePolicy {
    pub update: UpdatePolicy,
    pub allocation: AllocationPolicy,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            update: UpdatePolicy::WriteBack,
            allocation: AllocationPolicy::WriteAllocate,
        }
    }
}

/// What a write hit should do to the block it found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteHitAction {
    /// Write-back: mark the block dirty and Modified.
    MarkDirty,
    /// Write-through: forward the write to the next level, keep clean.
    ForwardClean,
}

impl WritePolicy {
    pub fn hit_action(&self) -> WriteHitAction {
        match self.update {
            UpdatePolicy::WriteBack => WriteHitAction::MarkDirty,
            UpdatePolicy::WriteThrough => WriteHitAction::ForwardClean,
        }
    }

    /// Whether a write miss should allocate (fetch + install) a block.
    /// Read misses always allocate; that path does not consult this policy.
    pub fn allocate_on_write_miss(&self) -> bool {
        self.allocation == AllocationPolicy::WriteAllocate
    }

    /// Whether a write miss must forward the write straight to the next
    /// level (in addition to, or instead of, installing).
    pub fn forward_write_on_miss(&self) -> bool {
        self.update == UpdatePolicy::WriteThrough
            || self.allocation == AllocationPolicy::NoWriteAllocate
    }

    /// Whether an eviction of this block (found dirty) must emit a
    /// writeback. Write-through evictions never emit writebacks because
    /// the level is never out of sync with the next level under
    /// write-through.
    pub fn eviction_needs_writeback(&self, dirty: bool) -> bool {
        dirty && self.update == UpdatePolicy::WriteBack
    }
}

/// Write-combining buffer: up to `capacity` entries keyed by block-aligned
/// address, coalescing repeated writes into one counted memory write.
#[derive(Debug)]
pub struct WriteCombiningBuffer {
    capacity: usize,
    entries: VecDeque<(u64, u64)>, // (address, last_touch_timestamp)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOutcome {
    /// Address already buffered; its timestamp was refreshed.
    Coalesced,
    /// Address was new and there was room.
    Inserted,
    /// Address was new; the oldest entry was evicted (caller notified via
    /// the returned address) to make room.
    EvictedAndInserted(u64),
}

impl WriteCombiningBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn try_write(&mut self, addr: u64, now: u64) -> CombineOutcome {
        if let Some(pos) = self.entries.iter().position(|&(a, _)| a == addr) {
            self.entries[pos].1 = now;
            return CombineOutcome::Coalesced;
        }

        if self.entries.len() < self.capacity {
            self.entries.push_back((addr, now));
            return CombineOutcome::Inserted;
        }

        let (evicted, _) = self.entries.pop_front().expect("capacity > 0");
        self.entries.push_back((addr, now));
        CombineOutcome::EvictedAndInserted(evicted)
    }

    /// Returns all buffered addresses and clears the buffer.
    pub fn flush(&mut self) -> Vec<u64> {
        self.entries.drain(..).map(|(a, _)| a).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_back_write_allocate_marks_dirty_on_hit() {
        let wp = WritePolicy {
            update: UpdatePolicy::WriteBack,
            allocation: AllocationPolicy::WriteAllocate,
        };
        assert_eq!(wp.hit_action(), WriteHitAction::MarkDirty);
        assert!(wp.allocate_on_write_miss());
        assert!(!wp.forward_write_on_miss());
        assert!(wp.eviction_needs_writeback(true));
        assert!(!wp.eviction_needs_writeback(false));
    }

    #[test]
    fn write_through_no_write_allocate_forwards_only() {
        let wp = WritePolicy {
            update: UpdatePolicy::WriteThrough,
            allocation: AllocationPolicy::NoWriteAllocate,
        };
        assert_eq!(wp.hit_action(), WriteHitAction::ForwardClean);
        assert!(!wp.allocate_on_write_miss());
        assert!(wp.forward_write_on_miss());
        assert!(!wp.eviction_needs_writeback(true), "write-through never writebacks");
    }

    #[test]
    fn write_back_no_write_allocate_does_not_install_on_miss() {
        let wp = WritePolicy {
            update: UpdatePolicy::WriteBack,
            allocation: AllocationPolicy::NoWriteAllocate,
        };
        assert!(!wp.allocate_on_write_miss());
        assert!(wp.forward_write_on_miss());
    }

    #[test]
    fn combining_buffer_coalesces_repeat_writes() {
        let mut wcb = WriteCombiningBuffer::new(2);
        assert_eq!(wcb.try_write(0x100, 1), CombineOutcome::Inserted);
        assert_eq!(wcb.try_write(0x100, 2), CombineOutcome::Coalesced);
        assert_eq!(wcb.len(), 1);
    }

    #[test]
    fn combining_buffer_evicts_oldest_when_full() {
        let mut wcb = WriteCombiningBuffer::new(2);
        wcb.try_write(0x100, 1);
        wcb.try_write(0x200, 2);
        let outcome = wcb.try_write(0x300, 3);
        assert_eq!(outcome, CombineOutcome::EvictedAndInserted(0x100));
    }

    #[test]
    fn flush_returns_all_and_clears() {
        let mut wcb = WriteCombiningBuffer::new(4);
        wcb.try_write(0x100, 1);
        wcb.try_write(0x200, 2);
        let flushed = wcb.flush();
        assert_eq!(flushed, vec![0x100, 0x200]);
        assert!(wcb.is_empty());
    }
}
