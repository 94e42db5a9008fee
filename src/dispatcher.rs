//! Parallel trace dispatcher: partitions a trace into contiguous chunks
//! and runs an independent hierarchy per chunk on a small worker pool,
//! merging per-chunk statistics. Cross-chunk coherence is not modeled —
//! this is throughput parallelism for independent simulations, not a
//! distributed cache model (see the concurrency & resource model notes).
//!
//! The worker pool is the textbook mutex + condvar task queue: a fixed
//! number of threads block on a condition variable until a task is
//! enqueued or the pool is dropped, at which point a stop flag drains the
//! remaining queue before threads exit.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::cache_level::CacheLevelConfig;
use crate::error::SimulationError;
use crate::hierarchy::MemoryHierarchy;
use crate::stats::HierarchyReport;
use crate::trace::TraceRecord;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    stop: Mutex<bool>,
}

/// A fixed-size pool of worker threads draining a FIFO task queue.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop: Mutex::new(false),
        });
        let workers = (0..size)
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("cache-sim-worker-{id}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self { shared, workers }
    }

    /// Hardware concurrency, or 1 if it cannot be determined.
    pub fn default_size() -> usize {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues `task` without blocking; returns a handle whose `recv()`
    /// completes with the task's result once a worker runs it.
    pub fn enqueue<F, T>(&self, task: F) -> Receiver<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: Job = Box::new(move || {
            let _ = tx.send(task());
        });
        self.shared.queue.lock().unwrap().push_back(job);
        self.shared.condvar.notify_one();
        rx
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        *self.shared.stop.lock().unwrap() = true;
        self.shared.condvar.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if *shared.stop.lock().unwrap() {
                    break None;
                }
                queue = shared.condvar.wait(queue).unwrap();
            }
        };
        match job {
            Some(job) => job(),
            None => return,
        }
    }
}

/// One chunk's failure: either an internal invariant violation surfaced
/// by the hierarchy, or a worker thread that never reported a result
/// (panicked before sending).
#[derive(Debug)]
pub enum ChunkFailure {
    Simulation(SimulationError),
    WorkerLost,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkFailure::Simulation(e) => write!(f, "{e}"),
            ChunkFailure::WorkerLost => write!(f, "worker thread ended without reporting a result"),
        }
    }
}

/// Aggregated failure surfaced to the caller after every chunk has
/// finished (successfully or not) — the dispatcher never gives up on
/// outstanding chunks just because one failed.
#[derive(Debug)]
pub struct DispatchError {
    pub failures: Vec<ChunkFailure>,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of the dispatched chunk(s) failed: ", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DispatchError {}

/// Splits `records` into `num_chunks` contiguous, nearly-equal slices.
/// Any remainder is distributed one-per-chunk starting from the front so
/// chunk sizes differ by at most one record.
pub fn partition_trace(records: &[TraceRecord], num_chunks: usize) -> Vec<&[TraceRecord]> {
    let num_chunks = num_chunks.max(1).min(records.len().max(1));
    let len = records.len();
    let base = len / num_chunks;
    let remainder = len % num_chunks;

    let mut chunks = Vec::with_capacity(num_chunks);
    let mut start = 0;
    for i in 0..num_chunks {
        let extra = if i < remainder { 1 } else { 0 };
        let end = start + base + extra;
        chunks.push(&records[start..end]);
        start = end;
    }
    chunks
}

fn seed_for_chunk(base_seed: u64, chunk_index: usize) -> u64 {
    // Golden-ratio stride keeps per-hierarchy Random-policy streams
    // decorrelated across chunks while staying deterministic for a fixed
    // base seed (reproducible benchmarks).
    base_seed.wrapping_add(chunk_index as u64 * 0x9E3779B97F4A7C15)
}

fn seeded_level_config(config: &CacheLevelConfig, chunk_index: usize) -> CacheLevelConfig {
    let mut config = config.clone();
    config.replacement_seed = seed_for_chunk(config.replacement_seed, chunk_index);
    config
}

fn run_chunk(
    l1_config: CacheLevelConfig,
    l2_config: Option<CacheLevelConfig>,
    chunk: Vec<TraceRecord>,
) -> Result<HierarchyReport, SimulationError> {
    let mut hierarchy = MemoryHierarchy::new(&l1_config, l2_config.as_ref());
    for record in &chunk {
        hierarchy.access(record.address, record.is_write())?;
    }
    hierarchy.flush()?;
    Ok(HierarchyReport::capture(&hierarchy))
}

/// Runs the full trace through a single hierarchy instance, single
/// threaded. The CLI's default (non-`--parallel`) path.
pub fn run_sequential(
    l1_config: &CacheLevelConfig,
    l2_config: Option<&CacheLevelConfig>,
    records: &[TraceRecord],
) -> Result<HierarchyReport, SimulationError> {
    run_chunk(l1_config.clone(), l2_config.cloned(), records.to_vec())
}

/// Runs `records` through `workers` independent hierarchy instances (each
/// with the identical configuration but a decorrelated RNG seed), merging
/// their statistics into one report. Each worker gets its own hierarchy —
/// this sacrifices cross-chunk cache warmth in exchange for being
/// embarrassingly parallel and correct.
pub fn run_parallel(
    l1_config: &CacheLevelConfig,
    l2_config: Option<&CacheLevelConfig>,
    records: &[TraceRecord],
    workers: usize,
) -> Result<HierarchyReport, DispatchError> {
    let pool = ThreadPool::new(workers);
    let chunks = partition_trace(records, workers);
    log::info!(
        "dispatching {} record(s) across {} chunk(s) on {} worker(s)",
        records.len(),
        chunks.len(),
        pool.worker_count()
    );

    let receivers: Vec<_> = chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let l1_config = seeded_level_config(l1_config, i);
            let l2_config = l2_config.map(|c| seeded_level_config(c, i));
            let chunk = chunk.to_vec();
            pool.enqueue(move || run_chunk(l1_config, l2_config, chunk))
        })
        .collect();

    let mut merged = HierarchyReport::default();
    let mut failures = Vec::new();
    for receiver in receivers {
        match receiver.recv() {
            Ok(Ok(report)) => merged.merge(&report),
            Ok(Err(e)) => {
                log::warn!("chunk simulation failed: {e}");
                failures.push(ChunkFailure::Simulation(e));
            }
            Err(_) => failures.push(ChunkFailure::WorkerLost),
        }
    }

    if failures.is_empty() {
        Ok(merged)
    } else {
        Err(DispatchError { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replacement::ReplacementPolicyKind;
    use crate::trace::AccessOp;
    use crate::write_policy::WritePolicy;

    fn config(num_sets: usize, block_size: usize) -> CacheLevelConfig {
        CacheLevelConfig {
            size_bytes: num_sets * block_size,
            associativity: 1,
            block_size,
            replacement_policy: ReplacementPolicyKind::Lru,
            write_policy: WritePolicy::default(),
            prefetch: None,
            victim_cache_size: None,
            write_combining_capacity: None,
            replacement_seed: 7,
        }
    }

    fn records(n: u64) -> Vec<TraceRecord> {
        (0..n)
            .map(|i| TraceRecord {
                address: i * 64,
                op: AccessOp::Read,
            })
            .collect()
    }

    #[test]
    fn partition_splits_evenly_with_remainder_up_front() {
        let recs = records(10);
        let chunks = partition_trace(&recs, 3);
        let lens: Vec<_> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens.iter().sum::<usize>(), 10);
        assert_eq!(lens, vec![4, 3, 3]);
    }

    #[test]
    fn partition_of_empty_trace_yields_one_empty_chunk() {
        let recs: Vec<TraceRecord> = Vec::new();
        let chunks = partition_trace(&recs, 4);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn thread_pool_runs_enqueued_tasks() {
        let pool = ThreadPool::new(2);
        let rx = pool.enqueue(|| 2 + 2);
        assert_eq!(rx.recv().unwrap(), 4);
    }

    #[test]
    fn parallel_run_additive_counters_match_single_hierarchy_run() {
        let l1_cfg = config(8, 64);
        let recs = records(64);

        let sequential_report = run_chunk(l1_cfg.clone(), None, recs.clone()).unwrap();

        let parallel_report = run_parallel(&l1_cfg, None, &recs, 4).unwrap();

        assert_eq!(parallel_report.accesses, sequential_report.accesses);
        assert_eq!(parallel_report.reads, sequential_report.reads);
        assert_eq!(parallel_report.writes, sequential_report.writes);
    }

    #[test]
    fn empty_trace_produces_all_zero_statistics() {
        let l1_cfg = config(8, 64);
        let report = run_parallel(&l1_cfg, None, &[], 4).unwrap();
        assert_eq!(report.accesses, 0);
        assert_eq!(report.l1.hits, 0);
        assert_eq!(report.l1.misses, 0);
    }
}
