//! CLI front end: wires the `cli`, `config`, `trace`, `dispatcher`, and
//! `stats` modules together. Maps each error category to its documented
//! exit code (0 success, 1 invalid arguments/config, 2 I/O error,
//! 3 simulation error) and prints one diagnostic line per failure.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use cache_hierarchy_sim::cli::Cli;
use cache_hierarchy_sim::config::{Config, LevelConfig, WritePolicyConfig};
use cache_hierarchy_sim::dispatcher::{self, ThreadPool};
use cache_hierarchy_sim::replacement::ReplacementPolicyKind;
use cache_hierarchy_sim::stats::HierarchyReport;
use cache_hierarchy_sim::trace::{self, TraceRecord};
use cache_hierarchy_sim::write_policy::UpdatePolicy;

/// Fixed seed used whenever `--benchmark` asks for reproducible timing
/// comparisons, per the design notes' "the default seed for benchmarks is
/// also fixed".
const BENCHMARK_SEED: u64 = 0xC0FF_EE00_D15E_A5E5;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::from(0),
        Err(code) => ExitCode::from(code as u8),
    }
}

fn run(cli: &Cli) -> Result<(), i32> {
    let mut config = load_config(cli)?;
    if cli.benchmark {
        config.replacement_seed = BENCHMARK_SEED;
    }
    config.validate().map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;

    let mut l1_config = config.l1_level_config();
    if cli.victim_cache && l1_config.victim_cache_size.is_none() {
        l1_config.victim_cache_size = Some(8);
    }
    let l2_config = config.l2_level_config();

    let (records, parse_errors) = load_trace(&cli.trace)?;
    if parse_errors > 0 {
        log::warn!("{parse_errors} trace record(s) failed to parse and were skipped");
    }
    log::info!("loaded {} trace record(s) from {}", records.len(), cli.trace.display());

    let workers = resolve_workers(cli, &config);
    let report = match workers {
        Some(workers) => dispatcher::run_parallel(&l1_config, l2_config.as_ref(), &records, workers).map_err(|e| {
            eprintln!("error: {e}");
            3
        })?,
        None => dispatcher::run_sequential(&l1_config, l2_config.as_ref(), &records).map_err(|e| {
            eprintln!("error: {e}");
            3
        })?,
    };

    print_report(&report, cli);
    Ok(())
}

/// Resolves whether (and with how many workers) to run through the
/// parallel dispatcher: an explicit `-p/--parallel [N]` wins, falling
/// back to the config's `parallelization.workers`, falling back to
/// sequential.
fn resolve_workers(cli: &Cli, config: &Config) -> Option<usize> {
    if let Some(n) = cli.parallel {
        return Some(if n == 0 { ThreadPool::default_size() } else { n });
    }
    config
        .parallelization
        .as_ref()
        .and_then(|p| p.workers)
        .filter(|&n| n > 0)
}

fn load_config(cli: &Cli) -> Result<Config, i32> {
    match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                eprintln!("error: cannot read config {}: {e}", path.display());
                2
            })?;
            Config::from_json(&text).map_err(|e| {
                eprintln!("error: {e}");
                1
            })
        }
        None => Ok(default_config()),
    }
}

/// A reasonable starting point for ad-hoc runs with no `-c/--config`:
/// a 32 KiB, 4-way, 64 B write-back L1.
fn default_config() -> Config {
    Config {
        l1: LevelConfig {
            size: 32 * 1024,
            associativity: 4,
            block_size: 64,
            replacement_policy: ReplacementPolicyKind::Lru,
            write_policy: WritePolicyConfig {
                update: UpdatePolicy::WriteBack,
                allocation: None,
            },
            prefetch: None,
        },
        l2: None,
        victim_cache: None,
        write_combining: None,
        multiprocessor: None,
        parallelization: None,
        replacement_seed: 0,
    }
}

fn load_trace(path: &Path) -> Result<(Vec<TraceRecord>, usize), i32> {
    let is_structured = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_structured {
        trace::load_structured_trace(path).map_err(|e| {
            eprintln!("error: {e}");
            e.exit_code()
        })
    } else {
        trace::load_simple_trace(path).map_err(|e| {
            eprintln!("error: {e}");
            2
        })
    }
}

fn print_report(report: &HierarchyReport, cli: &Cli) {
    println!("accesses: {}", report.accesses);
    println!(
        "L1: {} hits, {} misses ({:.2}% hit rate)",
        report.l1.hits,
        report.l1.misses,
        report.l1.hit_rate * 100.0
    );
    println!(
        "  compulsory {} / conflict {} / capacity {}",
        report.l1.compulsory_misses, report.l1.conflict_misses, report.l1.capacity_misses
    );
    if report.l1.victim_cache_hits > 0 {
        println!("  victim-cache hits: {}", report.l1.victim_cache_hits);
    }
    if report.l1.stream_buffer_hits > 0 {
        println!("  stream-buffer hits: {}", report.l1.stream_buffer_hits);
    }
    if let Some(l2) = &report.l2 {
        println!("L2: {} hits, {} misses ({:.2}% hit rate)", l2.hits, l2.misses, l2.hit_rate * 100.0);
    }

    if cli.wants_chart() {
        println!();
        print!("{}", report.render_ascii_bar_chart());
    }

    if let Some(path) = &cli.export {
        match std::fs::write(path, report.to_csv()) {
            Ok(()) => println!("wrote {}", path.display()),
            Err(e) => eprintln!("warning: failed to write export file {}: {e}", path.display()),
        }
    }
}
