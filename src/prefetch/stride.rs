//! Stride predictor: a per-PC-proxy table tracking the last address and a
//! repeated stride with a saturating confidence counter.
//!
//! Indexed by `pc_proxy = addr & 0xFFFF_0000` in lieu of a real program
//! counter (this crate has no instruction stream, only a trace of
//! addresses). This collapses many call sites onto one table entry and
//! will under-perform on interleaved workloads; preserved as-is per the
//! design notes, since changing it would change observed statistics.

const DEFAULT_TABLE_SIZE: usize = 1024;
const CONFIDENCE_MAX: u8 = 3;
const CONFIDENCE_THRESHOLD: u8 = 2;

#[derive(Clone, Copy, Debug)]
struct StrideEntry {
    last_address: u64,
    stride: i64,
    confidence: u8,
    valid: bool,
}

impl Default for StrideEntry {
    fn default() -> Self {
        Self {
            last_address: 0,
            stride: 0,
            confidence: 0,
            valid: false,
        }
    }
}

#[derive(Debug)]
pub struct StridePredictor {
    table: Vec<StrideEntry>,
    correct_predictions: u64,
    total_updates: u64,
}

impl StridePredictor {
    pub fn new() -> Self {
        Self::with_table_size(DEFAULT_TABLE_SIZE)
    }

    pub fn with_table_size(size: usize) -> Self {
        Self {
            table: vec![StrideEntry::default(); size.max(1)],
            correct_predictions: 0,
            total_updates: 0,
        }
    }

    fn pc_proxy(addr: u64) -> u64 {
        addr & 0xFFFF_0000
    }

    fn index(&self, pc_proxy: u64) -> usize {
        (pc_proxy >> 16) as usize % self.table.len()
    }

    /// Updates the table entry for `addr`'s PC proxy.
    pub fn update(&mut self, addr: u64) {
        let pc_proxy = Self::pc_proxy(addr);
        let idx = self.index(pc_proxy);
        self.total_updates += 1;
        let entry = &mut self.table[idx];

        if !entry.valid {
            entry.last_address = addr;
            entry.stride = 0;
            entry.confidence = 0;
            entry.valid = true;
            return;
        }

        let current_stride = addr as i64 - entry.last_address as i64;
        if current_stride == entry.stride {
            entry.confidence = (entry.confidence + 1).min(CONFIDENCE_MAX);
            self.correct_predictions += 1;
        } else {
            entry.stride = current_stride;
            entry.confidence = entry.confidence.saturating_sub(1);
        }
        entry.last_address = addr;
    }

    /// Returns the stored stride for `addr`'s PC proxy only when confidence
    /// has reached the threshold; otherwise 0 (no confident prediction).
    pub fn get_stride(&self, addr: u64) -> i64 {
        let pc_proxy = Self::pc_proxy(addr);
        let idx = self.index(pc_proxy);
        let entry = &self.table[idx];
        if entry.valid && entry.confidence >= CONFIDENCE_THRESHOLD {
            entry.stride
        } else {
            0
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.total_updates == 0 {
            0.0
        } else {
            self.correct_predictions as f64 / self.total_updates as f64
        }
    }
}

impl Default for StridePredictor {
    fn default() -> Self {
        Self::new()
    }
}
