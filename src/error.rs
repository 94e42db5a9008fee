//! Error kinds for configuration loading, trace parsing, I/O, and internal
//! invariant violations.
//!
//! Each kind maps to one of the exit codes documented at the CLI boundary:
//! 1 (configuration/argument), 2 (I/O), 3 (simulation). `TraceParseError`
//! does not abort a run by itself — the trace parser counts and skips bad
//! records instead of propagating this as a fatal error.

use thiserror::Error;

/// Raised while loading or validating a [`crate::config::Config`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("field `{field}` must be a power of two, got {value}")]
    NotPowerOfTwo { field: String, value: i64 },

    #[error("field `{field}` must be positive, got {value}")]
    NonPositive { field: String, value: i64 },

    #[error(
        "cache size {size} is not divisible by associativity ({associativity}) * block_size ({block_size})"
    )]
    SizeNotDivisible {
        size: usize,
        associativity: usize,
        block_size: usize,
    },

    #[error("unknown value `{value}` for field `{field}`")]
    UnknownEnumValue { field: String, value: String },

    #[error("prefetch distance must be non-negative, got {value}")]
    NegativePrefetchDistance { value: i64 },

    #[error("L1 block_size ({l1}) must equal L2 block_size ({l2})")]
    BlockSizeMismatch { l1: usize, l2: usize },

    #[error("malformed configuration at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
}

/// Raised for one malformed trace record. Carries the 1-based source line
/// number so the caller can report it; the parser itself skips the record
/// and keeps going.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceParseError {
    #[error("line {line}: malformed record: {detail}")]
    MalformedLine { line: usize, detail: String },

    #[error("line {line}: invalid address: {text}")]
    InvalidAddress { line: usize, text: String },

    #[error("line {line}: invalid operation code: {code}")]
    InvalidOperation { line: usize, code: String },

    #[error("malformed structured trace: {detail}")]
    MalformedStructured { detail: String },
}

/// Wraps an I/O failure reading or locating a trace/config file.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot read `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("trace truncated mid-record at byte offset {offset}")]
    Truncated { offset: usize },
}

/// A broken internal invariant. These must never occur in correct code;
/// they are treated as bugs and fail fast rather than retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("select_victim returned way {way}, out of range for associativity {associativity}")]
    InvalidVictimWay { way: usize, associativity: usize },

    #[error("impossible MESI transition: {event:?} from {from:?}")]
    ImpossibleCoherenceTransition { event: String, from: String },

    #[error("duplicate tag {tag} in set {set}")]
    DuplicateTagInSet { set: usize, tag: u64 },
}

/// Unifies the four error kinds behind one type so a single `match` at the
/// CLI boundary can pick an exit code.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("{0} trace record(s) failed to parse")]
    TraceParse(usize),
}

impl SimError {
    /// Exit code for the CLI front end: 1 invalid arguments/config,
    /// 2 I/O error, 3 simulation error. `TraceParse` is intentionally not
    /// constructed via `?` on a single bad record (the parser skips those);
    /// it surfaces only when the caller chooses to treat the error count as
    /// fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::Configuration(_) => 1,
            SimError::TraceParse(_) => 1,
            SimError::Io(_) => 2,
            SimError::Simulation(_) => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
