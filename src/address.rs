//! Address decomposition into (tag, set_index, offset).
//!
//! Convention (Open Question in the design notes resolved here): the tag is
//! computed as `addr / block_size`, *not* `addr / (block_size * num_sets)`.
//! The set index is folded back out of the tag (`tag mod num_sets`), so the
//! tag carries redundant set-index bits. Lookups are unaffected because
//! equality comparison on the full tag cancels the redundancy; this matches
//! the original implementation this spec was distilled from.

/// Geometry needed to decompose an address: block size and set count, both
/// powers of two.
#[derive(Clone, Copy, Debug)]
pub struct AddressGeometry {
    block_size: u64,
    num_sets: u64,
    line_bits: u32,
}

impl AddressGeometry {
    pub fn new(block_size: usize, num_sets: usize) -> Self {
        debug_assert!(block_size.is_power_of_two());
        debug_assert!(num_sets.is_power_of_two());
        Self {
            block_size: block_size as u64,
            num_sets: num_sets as u64,
            line_bits: (block_size as u64).trailing_zeros(),
        }
    }

    #[inline]
    pub fn offset(&self, addr: u64) -> u64 {
        addr & (self.block_size - 1)
    }

    #[inline]
    pub fn tag(&self, addr: u64) -> u64 {
        addr >> self.line_bits
    }

    #[inline]
    pub fn set_index(&self, addr: u64) -> usize {
        (self.tag(addr) % self.num_sets) as usize
    }

    /// (tag, set_index) pair, computed once.
    #[inline]
    pub fn decompose(&self, addr: u64) -> (u64, usize) {
        let tag = self.tag(addr);
        let set_index = (tag % self.num_sets) as usize;
        (tag, set_index)
    }

    /// Block-aligned address containing `addr` (drops the offset bits).
    #[inline]
    pub fn block_address(&self, addr: u64) -> u64 {
        addr & !(self.block_size - 1)
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn num_sets(&self) -> u64 {
        self.num_sets
    }
}
