//! Prefetch subsystem: a sequential stream buffer, a stride predictor with
//! confidence, and an adaptive layer that chooses between them.

pub mod adaptive;
pub mod stream_buffer;
pub mod stride;

pub use adaptive::{AdaptivePrefetcher, PrefetchStrategy};
pub use stream_buffer::StreamBuffer;
pub use stride::StridePredictor;

use serde::{Deserialize, Serialize};

/// Per-level prefetch configuration, as recognized under a cache level's
/// `prefetch` key in the configuration tree.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PrefetchConfig {
    pub enabled: bool,
    pub distance: usize,
    pub adaptive: bool,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            distance: 4,
            adaptive: false,
        }
    }
}
