//! Command-line surface: the flags documented at the external-interfaces
//! boundary, implemented with `clap`'s derive API.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "cache-sim",
    version,
    about = "Multi-level cache hierarchy simulator: set-associative caches, replacement and write policies, victim cache, prefetching, and MESI coherence over a memory access trace"
)]
pub struct Cli {
    /// Trace file to replay. A `.json` extension selects the structured
    /// trace format; anything else is parsed as the simple text format.
    pub trace: PathBuf,

    /// Configuration file describing cache geometry and policies.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Enables a victim cache in front of L1 even if the config doesn't
    /// request one (default size 8 when forced on this way).
    #[arg(long = "victim-cache")]
    pub victim_cache: bool,

    /// Runs the trace through the parallel dispatcher. An explicit worker
    /// count may follow; omitting it (or passing 0) uses hardware
    /// concurrency.
    #[arg(short = 'p', long = "parallel", num_args = 0..=1, default_missing_value = "0")]
    pub parallel: Option<usize>,

    /// Prints an ASCII hit-rate / miss-breakdown chart after the run.
    #[arg(long = "visualize")]
    pub visualize: bool,

    /// Alias for `--visualize`.
    #[arg(long = "charts")]
    pub charts: bool,

    /// Writes final counters as CSV. An explicit path may follow;
    /// omitting it writes to `stats.csv` in the current directory.
    #[arg(short = 'e', long = "export", num_args = 0..=1, default_missing_value = "stats.csv")]
    pub export: Option<PathBuf>,

    /// Pins the Random replacement policy's seed to the fixed benchmark
    /// default, overriding whatever the config specifies, for
    /// reproducible timing comparisons.
    #[arg(short = 'b', long = "benchmark")]
    pub benchmark: bool,
}

impl Cli {
    pub fn wants_chart(&self) -> bool {
        self.visualize || self.charts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation() {
        let cli = Cli::parse_from(["cache-sim", "trace.txt"]);
        assert_eq!(cli.trace, PathBuf::from("trace.txt"));
        assert!(cli.config.is_none());
        assert!(cli.parallel.is_none());
    }

    #[test]
    fn parallel_flag_without_value_defaults_to_zero() {
        let cli = Cli::parse_from(["cache-sim", "trace.txt", "-p"]);
        assert_eq!(cli.parallel, Some(0));
    }

    #[test]
    fn parallel_flag_with_explicit_count() {
        let cli = Cli::parse_from(["cache-sim", "trace.txt", "--parallel", "8"]);
        assert_eq!(cli.parallel, Some(8));
    }

    #[test]
    fn export_flag_without_value_defaults_to_stats_csv() {
        let cli = Cli::parse_from(["cache-sim", "trace.txt", "-e"]);
        assert_eq!(cli.export, Some(PathBuf::from("stats.csv")));
    }

    #[test]
    fn charts_and_visualize_both_set_wants_chart() {
        let cli = Cli::parse_from(["cache-sim", "trace.txt", "--charts"]);
        assert!(cli.wants_chart());
    }
}
