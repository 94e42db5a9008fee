//! Cache level: the central component. Set lookup, hit/miss
//! classification, replacement invocation, write-policy dispatch, prefetch
//! trigger, and writeback emission to the next level.

use std::collections::HashSet;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::address::AddressGeometry;
use crate::block::CacheSet;
use crate::coherence::{CoherenceEvent, CoherenceState, MesiMachine};
use crate::error::SimulationError;
use crate::prefetch::{PrefetchConfig, StreamBuffer};
use crate::replacement::{ReplacementPolicyKind, ReplacementState};
use crate::victim_cache::VictimCache;
use crate::write_policy::{CombineOutcome, WriteCombiningBuffer, WriteHitAction, WritePolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissType {
    Compulsory,
    Conflict,
    Capacity,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LevelStats {
    pub reads: u64,
    pub writes: u64,
    pub hits: u64,
    pub misses: u64,
    pub compulsory_misses: u64,
    pub conflict_misses: u64,
    pub capacity_misses: u64,
    pub writebacks: u64,
    pub victim_cache_hits: u64,
    pub stream_buffer_hits: u64,
    pub next_level_writes: u64,
}

impl LevelStats {
    pub fn total_accesses(&self) -> u64 {
        self.reads + self.writes
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Geometry and policy configuration for one cache level. Recognized keys
/// per the configuration format in the external-interfaces section.
#[derive(Clone, Debug)]
pub struct CacheLevelConfig {
    pub size_bytes: usize,
    pub associativity: usize,
    pub block_size: usize,
    pub replacement_policy: ReplacementPolicyKind,
    pub write_policy: WritePolicy,
    pub prefetch: Option<PrefetchConfig>,
    pub victim_cache_size: Option<usize>,
    pub write_combining_capacity: Option<usize>,
    pub replacement_seed: u64,
}

impl CacheLevelConfig {
    pub fn num_sets(&self) -> usize {
        self.size_bytes / (self.associativity * self.block_size)
    }
}

/// Outcome of one `access` call, reported up to the memory hierarchy for
/// aggregate statistics and adaptive-prefetcher feedback.
#[derive(Clone, Copy, Debug)]
pub struct AccessOutcome {
    pub hit: bool,
    pub miss_type: Option<MissType>,
    /// The hit landed on a block that had been installed speculatively by
    /// the prefetcher and not yet touched by a demand access — a useful
    /// prefetch.
    pub prefetch_was_useful: bool,
    /// A block evicted this access had been prefetched but never touched —
    /// a wasted prefetch.
    pub prefetch_was_wasted: bool,
}

impl AccessOutcome {
    fn hit() -> Self {
        Self {
            hit: true,
            miss_type: None,
            prefetch_was_useful: false,
            prefetch_was_wasted: false,
        }
    }

    fn miss(miss_type: MissType) -> Self {
        Self {
            hit: false,
            miss_type: Some(miss_type),
            prefetch_was_useful: false,
            prefetch_was_wasted: false,
        }
    }
}

/// Optional guidance from the hierarchy's stride predictor / adaptive
/// prefetcher, computed before calling into L1 (the hierarchy owns both;
/// see `crate::hierarchy`). `stride` is 0 when no confident prediction is
/// available.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrefetchHint {
    pub stride: i64,
    pub distance: usize,
}

pub struct CacheLevel {
    name: String,
    geometry: AddressGeometry,
    associativity: usize,
    block_size: u64,
    sets: Vec<CacheSet>,
    replacement: Vec<ReplacementState>,
    write_policy: WritePolicy,
    stream_buffer: Option<StreamBuffer>,
    victim_cache: Option<VictimCache>,
    write_combining: Option<WriteCombiningBuffer>,
    mesi: MesiMachine,
    stats: LevelStats,
    /// Every tag ever installed in this level, across all sets. Drives miss
    /// classification: a tag's first install anywhere is compulsory, a
    /// later reinstall is conflict or capacity depending on whether the
    /// cache has room elsewhere at that moment.
    seen_tags: HashSet<u64>,
}

impl CacheLevel {
    pub fn new(name: impl Into<String>, config: &CacheLevelConfig) -> Self {
        let num_sets = config.num_sets();
        assert!(num_sets > 0, "cache level must have at least one set");
        let geometry = AddressGeometry::new(config.block_size, num_sets);
        let sets = (0..num_sets).map(|_| CacheSet::new(config.associativity)).collect();
        let replacement = (0..num_sets)
            .map(|i| {
                ReplacementState::new(
                    config.replacement_policy,
                    config.associativity,
                    config.replacement_seed.wrapping_add(i as u64),
                )
            })
            .collect();

        Self {
            name: name.into(),
            geometry,
            associativity: config.associativity,
            block_size: config.block_size as u64,
            sets,
            replacement,
            write_policy: config.write_policy,
            stream_buffer: config.prefetch.filter(|p| p.enabled).map(|p| StreamBuffer::new(p.distance.max(1))),
            victim_cache: config.victim_cache_size.map(VictimCache::new),
            write_combining: config.write_combining_capacity.map(WriteCombiningBuffer::new),
            mesi: MesiMachine::new(),
            stats: LevelStats::default(),
            seen_tags: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &LevelStats {
        &self.stats
    }

    pub fn mesi(&self) -> &MesiMachine {
        &self.mesi
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    pub fn associativity(&self) -> usize {
        self.associativity
    }

    pub fn has_victim_cache(&self) -> bool {
        self.victim_cache.is_some()
    }

    /// Applies a coherence event arriving from the (out-of-scope)
    /// multiprocessor/interconnect layer to whichever block currently holds
    /// `addr`, if any. A no-op if the block is not present.
    pub fn receive_remote_event(
        &mut self,
        addr: u64,
        event: CoherenceEvent,
        next: Option<&mut CacheLevel>,
        now: u64,
    ) -> Result<(), SimulationError> {
        let (tag, set_idx) = self.geometry.decompose(addr);
        let Some(way) = self.sets[set_idx].find(tag) else {
            return Ok(());
        };
        let state = self.sets[set_idx].blocks[way].state;
        let transition = self.mesi.apply(state, event)?;
        if transition.writeback_required {
            let victim_addr = self.sets[set_idx].blocks[way].tag * self.block_size;
            forward_write(next, victim_addr, now)?;
            self.stats.writebacks += 1;
        }
        self.sets[set_idx].blocks[way].state = transition.next_state;
        if transition.next_state == CoherenceState::Invalid {
            self.sets[set_idx].blocks[way].invalidate();
        }
        Ok(())
    }

    /// Implements the access protocol: hit path, miss classification,
    /// stream-buffer and victim-cache probes, refill, replacement,
    /// writeback, install, and the prefetch side effect.
    pub fn access(
        &mut self,
        addr: u64,
        is_write: bool,
        mut next: Option<&mut CacheLevel>,
        now: u64,
        prefetch_hint: Option<PrefetchHint>,
    ) -> Result<AccessOutcome, SimulationError> {
        if is_write {
            self.stats.writes += 1;
        } else {
            self.stats.reads += 1;
        }

        let (tag, set_idx) = self.geometry.decompose(addr);

        if let Some(way) = self.sets[set_idx].find(tag) {
            return self.handle_hit(set_idx, way, is_write, next, now);
        }

        let miss_type = self.classify_miss_type(tag);
        let block_addr = self.geometry.block_address(addr);

        if !is_write {
            if let Some(sb) = &mut self.stream_buffer {
                if let Some(matched) = sb.access(block_addr) {
                    sb.shift(matched);
                    self.stats.hits += 1;
                    self.stats.stream_buffer_hits += 1;
                    trace!("{}: stream buffer hit at {:#x}", self.name, addr);
                    return Ok(AccessOutcome::hit());
                }
            }
        }

        if self.victim_cache.is_some() {
            if let Some(outcome) = self.try_victim_cache_hit(set_idx, block_addr, next.as_deref_mut(), now)? {
                return Ok(outcome);
            }
        }

        self.stats.misses += 1;
        match miss_type {
            MissType::Compulsory => self.stats.compulsory_misses += 1,
            MissType::Conflict => self.stats.conflict_misses += 1,
            MissType::Capacity => self.stats.capacity_misses += 1,
        }
        debug!("{}: miss ({:?}) at {:#x}", self.name, miss_type, addr);

        fetch_from_next(next.as_deref_mut(), block_addr, now)?;

        let prefetch_was_wasted =
            self.evict_and_install(set_idx, tag, addr, is_write, next.as_deref_mut(), now)?;

        if let Some(hint) = prefetch_hint.filter(|h| h.stride != 0) {
            self.stride_prefetch(set_idx, addr, hint, next.as_deref_mut(), now)?;
        } else if self.stream_buffer.is_some() {
            self.sequential_prefetch(block_addr);
        }

        let mut outcome = AccessOutcome::miss(miss_type);
        outcome.prefetch_was_wasted = prefetch_was_wasted;
        Ok(outcome)
    }

    fn handle_hit(
        &mut self,
        set_idx: usize,
        way: usize,
        is_write: bool,
        mut next: Option<&mut CacheLevel>,
        now: u64,
    ) -> Result<AccessOutcome, SimulationError> {
        let was_prefetched = self.sets[set_idx].blocks[way].prefetched;
        self.sets[set_idx].blocks[way].touch(now);

        if is_write {
            match self.write_policy.hit_action() {
                WriteHitAction::MarkDirty => {
                    let state = self.sets[set_idx].blocks[way].state;
                    let transition = self.mesi.apply(state, CoherenceEvent::LocalWrite)?;
                    self.sets[set_idx].blocks[way].state = transition.next_state;
                    self.sets[set_idx].blocks[way].dirty = true;
                }
                WriteHitAction::ForwardClean => {
                    let addr = self.sets[set_idx].blocks[way].tag * self.block_size;
                    self.issue_write(next.as_deref_mut(), addr, now)?;
                    self.sets[set_idx].blocks[way].dirty = false;
                }
            }
        }

        self.replacement[set_idx].on_access(way);
        self.stats.hits += 1;

        let mut outcome = AccessOutcome::hit();
        outcome.prefetch_was_useful = was_prefetched;
        Ok(outcome)
    }

    /// Routes a forwarded write through the write-combining buffer, if
    /// configured, coalescing repeat writes to the same block and only
    /// emitting a real write to `next` when an entry is evicted from the
    /// buffer. With no buffer configured, forwards immediately.
    fn issue_write(&mut self, next: Option<&mut CacheLevel>, addr: u64, now: u64) -> Result<(), SimulationError> {
        match &mut self.write_combining {
            Some(wcb) => match wcb.try_write(addr, now) {
                CombineOutcome::EvictedAndInserted(evicted) => forward_write(next, evicted, now),
                CombineOutcome::Coalesced | CombineOutcome::Inserted => Ok(()),
            },
            None => forward_write(next, addr, now),
        }
    }

    /// Drains the write-combining buffer (if any), issuing a real write for
    /// every entry still pending. Called at the end of a run.
    pub fn flush_write_combining(&mut self, next: Option<&mut CacheLevel>, now: u64) -> Result<(), SimulationError> {
        let Some(wcb) = &mut self.write_combining else {
            return Ok(());
        };
        let pending = wcb.flush();
        match next {
            Some(level) => {
                for addr in pending {
                    level.access(addr, true, None, now, None)?;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// A miss is compulsory only the first time its tag is ever seen in
    /// this level, and only while the cache still has room somewhere; a
    /// later miss on a previously-seen tag is capacity only once no set
    /// anywhere has room left, and conflict otherwise (a set-local collision
    /// with room to spare elsewhere, or a brand-new tag landing in an
    /// already-full cache).
    fn classify_miss_type(&mut self, tag: u64) -> MissType {
        let room_exists = self.sets.iter().any(|s| s.has_invalid_way());
        let tag_seen_before = !self.seen_tags.insert(tag);
        match (tag_seen_before, room_exists) {
            (false, true) => MissType::Compulsory,
            (true, false) => MissType::Capacity,
            _ => MissType::Conflict,
        }
    }

    /// Probes the victim cache. On a hit, swaps the victim-cache entry into
    /// L1 (selecting an L1 victim the normal way) and the evicted L1 block
    /// into the victim cache, preserving the no-duplicates invariant.
    fn try_victim_cache_hit(
        &mut self,
        set_idx: usize,
        block_addr: u64,
        next: Option<&mut CacheLevel>,
        now: u64,
    ) -> Result<Option<AccessOutcome>, SimulationError> {
        let entry = match self.victim_cache.as_mut().unwrap().remove(block_addr) {
            Some(e) => e,
            None => return Ok(None),
        };

        let valid_mask = self.sets[set_idx].validity_mask();
        let l1_victim_way = self.replacement[set_idx].select_victim(&valid_mask);
        if l1_victim_way >= self.associativity {
            return Err(SimulationError::InvalidVictimWay {
                way: l1_victim_way,
                associativity: self.associativity,
            });
        }

        let evicted = self.sets[set_idx].blocks[l1_victim_way].clone();
        let mut installed = entry.block;
        installed.touch(now);
        self.sets[set_idx].blocks[l1_victim_way] = installed;
        self.replacement[set_idx].on_install(l1_victim_way);

        if evicted.valid {
            let evicted_addr = evicted.tag * self.block_size;
            if let Some(overflow) = self.victim_cache.as_mut().unwrap().insert(evicted_addr, evicted, now) {
                if overflow.block.needs_writeback() {
                    forward_write(next, overflow.address, now)?;
                    self.stats.writebacks += 1;
                }
            }
        }

        self.stats.hits += 1;
        self.stats.victim_cache_hits += 1;
        trace!("{}: victim cache hit at {:#x}", self.name, block_addr);
        Ok(Some(AccessOutcome::hit()))
    }

    /// Selects a victim in `set_idx`, writes it back / deposits it in the
    /// victim cache if needed, then installs the new block and dispatches
    /// the write policy's miss handler. Returns whether the evicted block
    /// had been prefetched but never used (a wasted prefetch).
    fn evict_and_install(
        &mut self,
        set_idx: usize,
        tag: u64,
        addr: u64,
        is_write: bool,
        mut next: Option<&mut CacheLevel>,
        now: u64,
    ) -> Result<bool, SimulationError> {
        let valid_mask = self.sets[set_idx].validity_mask();
        let victim_way = self.replacement[set_idx].select_victim(&valid_mask);
        if victim_way >= self.associativity {
            return Err(SimulationError::InvalidVictimWay {
                way: victim_way,
                associativity: self.associativity,
            });
        }

        let victim = self.sets[set_idx].blocks[victim_way].clone();
        let mut prefetch_was_wasted = false;

        if victim.valid {
            prefetch_was_wasted = victim.prefetched;
            let transition = self.mesi.apply(victim.state, CoherenceEvent::Eviction)?;
            let needs_writeback =
                transition.writeback_required || self.write_policy.eviction_needs_writeback(victim.dirty);

            if needs_writeback {
                let victim_addr = victim.tag * self.block_size;
                forward_write(next.as_deref_mut(), victim_addr, now)?;
                self.stats.writebacks += 1;
            }

            if let Some(vc) = &mut self.victim_cache {
                let victim_addr = victim.tag * self.block_size;
                if let Some(overflow) = vc.insert(victim_addr, victim.clone(), now) {
                    if overflow.block.needs_writeback() {
                        forward_write(next.as_deref_mut(), overflow.address, now)?;
                        self.stats.writebacks += 1;
                    }
                }
            }
        }
        self.sets[set_idx].blocks[victim_way].invalidate();

        let should_install = !is_write || self.write_policy.allocate_on_write_miss();
        if should_install {
            let event = if is_write {
                CoherenceEvent::LocalWrite
            } else {
                CoherenceEvent::LocalReadExclusive
            };
            let transition = self.mesi.apply(CoherenceState::Invalid, event)?;
            self.sets[set_idx].blocks[victim_way].install(tag, transition.next_state, now, false);
            self.replacement[set_idx].on_install(victim_way);
        }

        if is_write && self.write_policy.forward_write_on_miss() {
            self.issue_write(next, addr, now)?;
            self.stats.next_level_writes += 1;
        }

        Ok(prefetch_was_wasted)
    }

    /// Stride-guided speculative install: computes `addr + stride`,
    /// installs it into a victim way of its own set (if not already
    /// present), and marks it `prefetched`.
    fn stride_prefetch(
        &mut self,
        _set_idx: usize,
        addr: u64,
        hint: PrefetchHint,
        mut next: Option<&mut CacheLevel>,
        now: u64,
    ) -> Result<(), SimulationError> {
        let prefetch_addr = (addr as i64 + hint.stride) as u64;
        let block_addr = self.geometry.block_address(prefetch_addr);
        let (p_tag, p_set) = self.geometry.decompose(block_addr);

        if self.sets[p_set].find(p_tag).is_some() {
            return Ok(());
        }

        let valid_mask = self.sets[p_set].validity_mask();
        let way = self.replacement[p_set].select_victim(&valid_mask);
        if way >= self.associativity {
            return Err(SimulationError::InvalidVictimWay {
                way,
                associativity: self.associativity,
            });
        }

        let victim = self.sets[p_set].blocks[way].clone();
        if victim.valid {
            let transition = self.mesi.apply(victim.state, CoherenceEvent::Eviction)?;
            if transition.writeback_required || self.write_policy.eviction_needs_writeback(victim.dirty) {
                forward_write(next.as_deref_mut(), victim.tag * self.block_size, now)?;
                self.stats.writebacks += 1;
            }
        }

        fetch_from_next(next, block_addr, now)?;
        self.sets[p_set].blocks[way].install(p_tag, CoherenceState::Exclusive, now, true);
        self.replacement[p_set].on_install(way);
        self.seen_tags.insert(p_tag);

        if let Some(sb) = &mut self.stream_buffer {
            sb.prefetch(block_addr, self.block_size);
        }

        Ok(())
    }

    /// Classic sequential refill: fills the stream buffer with `capacity`
    /// consecutive block addresses after the just-installed block.
    fn sequential_prefetch(&mut self, block_addr: u64) {
        if let Some(sb) = &mut self.stream_buffer {
            sb.prefetch(block_addr + self.block_size, self.block_size);
        }
    }
}

fn fetch_from_next(next: Option<&mut CacheLevel>, block_addr: u64, now: u64) -> Result<(), SimulationError> {
    match next {
        Some(level) => level.access(block_addr, false, None, now, None).map(|_| ()),
        None => Ok(()), // main memory: always a hit.
    }
}

fn forward_write(next: Option<&mut CacheLevel>, addr: u64, now: u64) -> Result<(), SimulationError> {
    match next {
        Some(level) => level.access(addr, true, None, now, None).map(|_| ()),
        None => Ok(()),
    }
}
