//! Statistics & reporting: a snapshot of every counter the hierarchy and
//! its levels expose, CSV export per the persisted-state requirement, and
//! a small ASCII bar-chart renderer for `--visualize`/`--charts`. Kept
//! deliberately textual — no GUI/plotting backend, matching the way the
//! charting concern is pushed out of the simulation core.

use crate::cache_level::CacheLevel;
use crate::hierarchy::MemoryHierarchy;

#[derive(Clone, Debug, Default)]
pub struct LevelReport {
    pub name: String,
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
    pub hit_rate: f64,
}

impl LevelReport {
    fn from_level(level: &CacheLevel) -> Self {
        let s = level.stats();
        Self {
            name: level.name().to_string(),
            reads: s.reads,
            writes: s.writes,
            hits: s.hits,
            misses: s.misses,
            compulsory_misses: s.compulsory_misses,
            conflict_misses: s.conflict_misses,
            capacity_misses: s.capacity_misses,
            writebacks: s.writebacks,
            victim_cache_hits: s.victim_cache_hits,
            stream_buffer_hits: s.stream_buffer_hits,
            hit_rate: s.hit_rate(),
        }
    }

    /// Merges another chunk's counters into this one (the dispatcher sums
    /// per-chunk reports; the derived `hit_rate` is recomputed, not added).
    pub fn merge(&mut self, other: &LevelReport) {
        self.reads += other.reads;
        self.writes += other.writes;
        self.hits += other.hits;
        self.misses += other.misses;
        self.compulsory_misses += other.compulsory_misses;
        self.conflict_misses += other.conflict_misses;
        self.capacity_misses += other.capacity_misses;
        self.writebacks += other.writebacks;
        self.victim_cache_hits += other.victim_cache_hits;
        self.stream_buffer_hits += other.stream_buffer_hits;
        let total = self.hits + self.misses;
        self.hit_rate = if total == 0 { 0.0 } else { self.hits as f64 / total as f64 };
    }
}

/// A full snapshot of one hierarchy run's counters, ready for CSV export
/// or ASCII rendering.
#[derive(Clone, Debug, Default)]
pub struct HierarchyReport {
    pub accesses: u64,
    pub reads: u64,
    pub writes: u64,
    pub l1: LevelReport,
    pub l2: Option<LevelReport>,
    pub useful_prefetches: u64,
    pub useless_prefetches: u64,
    pub mesi_transitions: Vec<(String, String, u64)>,
}

impl HierarchyReport {
    pub fn capture(hierarchy: &MemoryHierarchy) -> Self {
        let counters = hierarchy.counters();
        let mut mesi_transitions: Vec<(String, String, u64)> = hierarchy
            .l1()
            .mesi()
            .transition_counts()
            .map(|(from, to, count)| (from.to_string(), to.to_string(), count))
            .collect();
        mesi_transitions.sort();

        Self {
            accesses: counters.accesses,
            reads: counters.reads,
            writes: counters.writes,
            l1: LevelReport::from_level(hierarchy.l1()),
            l2: hierarchy.l2().map(LevelReport::from_level),
            useful_prefetches: counters.useful_prefetches,
            useless_prefetches: counters.useless_prefetches,
            mesi_transitions,
        }
    }

    /// Sums additive counters from `other` into `self`. Used by the
    /// parallel dispatcher to merge per-chunk reports; `mesi_transitions`
    /// are merged by (from, to) key.
    pub fn merge(&mut self, other: &HierarchyReport) {
        self.accesses += other.accesses;
        self.reads += other.reads;
        self.writes += other.writes;
        self.l1.merge(&other.l1);
        match (&mut self.l2, &other.l2) {
            (Some(l2), Some(other_l2)) => l2.merge(other_l2),
            (None, Some(other_l2)) => self.l2 = Some(other_l2.clone()),
            _ => {}
        }
        self.useful_prefetches += other.useful_prefetches;
        self.useless_prefetches += other.useless_prefetches;

        for (from, to, count) in &other.mesi_transitions {
            if let Some(existing) = self
                .mesi_transitions
                .iter_mut()
                .find(|(f, t, _)| f == from && t == to)
            {
                existing.2 += count;
            } else {
                self.mesi_transitions.push((from.clone(), to.clone(), *count));
            }
        }
        self.mesi_transitions.sort();
    }

    fn metric_rows(&self) -> Vec<(String, String)> {
        let mut rows = vec![
            ("accesses".to_string(), self.accesses.to_string()),
            ("reads".to_string(), self.reads.to_string()),
            ("writes".to_string(), self.writes.to_string()),
            ("l1.hits".to_string(), self.l1.hits.to_string()),
            ("l1.misses".to_string(), self.l1.misses.to_string()),
            ("l1.hit_rate".to_string(), format!("{:.6}", self.l1.hit_rate)),
            ("l1.compulsory_misses".to_string(), self.l1.compulsory_misses.to_string()),
            ("l1.conflict_misses".to_string(), self.l1.conflict_misses.to_string()),
            ("l1.capacity_misses".to_string(), self.l1.capacity_misses.to_string()),
            ("l1.writebacks".to_string(), self.l1.writebacks.to_string()),
            ("l1.victim_cache_hits".to_string(), self.l1.victim_cache_hits.to_string()),
            ("l1.stream_buffer_hits".to_string(), self.l1.stream_buffer_hits.to_string()),
            ("useful_prefetches".to_string(), self.useful_prefetches.to_string()),
            ("useless_prefetches".to_string(), self.useless_prefetches.to_string()),
        ];
        if let Some(l2) = &self.l2 {
            rows.push(("l2.hits".to_string(), l2.hits.to_string()));
            rows.push(("l2.misses".to_string(), l2.misses.to_string()));
            rows.push(("l2.hit_rate".to_string(), format!("{:.6}", l2.hit_rate)));
            rows.push(("l2.writebacks".to_string(), l2.writebacks.to_string()));
        }
        for (from, to, count) in &self.mesi_transitions {
            rows.push((format!("mesi.{from}_to_{to}"), count.to_string()));
        }
        rows
    }

    /// `metric,value` header then one row per metric, per the persisted
    /// CSV export requirement.
    pub fn to_csv(&self) -> String {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.write_record(["metric", "value"]).expect("in-memory writer never fails");
        for (metric, value) in self.metric_rows() {
            writer.write_record([metric, value]).expect("in-memory writer never fails");
        }
        let bytes = writer.into_inner().expect("in-memory writer never fails");
        String::from_utf8(bytes).expect("csv output is always valid UTF-8")
    }

    /// A small text/ASCII bar chart: hit rate per level, then L1's miss
    /// breakdown by classification.
    pub fn render_ascii_bar_chart(&self) -> String {
        let mut out = String::new();
        out.push_str("hit rate by level\n");
        render_bar(&mut out, &self.l1.name, self.l1.hit_rate);
        if let Some(l2) = &self.l2 {
            render_bar(&mut out, &l2.name, l2.hit_rate);
        }
        out.push('\n');
        out.push_str("L1 miss breakdown\n");
        let total = self.l1.misses.max(1) as f64;
        render_bar(&mut out, "compulsory", self.l1.compulsory_misses as f64 / total);
        render_bar(&mut out, "conflict", self.l1.conflict_misses as f64 / total);
        render_bar(&mut out, "capacity", self.l1.capacity_misses as f64 / total);
        out
    }
}

const BAR_WIDTH: usize = 40;

fn render_bar(out: &mut String, label: &str, ratio: f64) {
    let ratio = ratio.clamp(0.0, 1.0);
    let filled = (ratio * BAR_WIDTH as f64).round() as usize;
    out.push_str(&format!(
        "  {:<12} [{}{}] {:>5.1}%\n",
        label,
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        ratio * 100.0
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_level::CacheLevelConfig;
    use crate::hierarchy::MemoryHierarchy;
    use crate::replacement::ReplacementPolicyKind;
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
            replacement_seed: 0,
        }
    }

    #[test]
    fn csv_has_header_and_rows() {
        let h = MemoryHierarchy::new(&config(4, 64), None);
        let report = HierarchyReport::capture(&h);
        let csv = report.to_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("metric,value"));
        assert!(lines.next().unwrap().starts_with("accesses,"));
    }

    #[test]
    fn merge_sums_additive_counters() {
        let mut h1 = MemoryHierarchy::new(&config(4, 64), None);
        let mut h2 = MemoryHierarchy::new(&config(4, 64), None);
        h1.access(0x1000, false).unwrap();
        h2.access(0x2000, false).unwrap();
        let mut r1 = HierarchyReport::capture(&h1);
        let r2 = HierarchyReport::capture(&h2);
        r1.merge(&r2);
        assert_eq!(r1.accesses, 2);
        assert_eq!(r1.l1.misses, 2);
    }

    #[test]
    fn ascii_chart_renders_both_sections() {
        let h = MemoryHierarchy::new(&config(4, 64), None);
        let report = HierarchyReport::capture(&h);
        let chart = report.render_ascii_bar_chart();
        assert!(chart.contains("hit rate by level"));
        assert!(chart.contains("L1 miss breakdown"));
    }
}
