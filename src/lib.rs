//! # Streaming per-position base calling
//!
//! This library turns a position-sorted stream of aligned reads into one
//! statistics record per reference position: base composition, insertion,
//! deletion and gap counts, a consensus/minor call, a background-normalised
//! entropy score and optional heterozygosity and strand-bias columns.
//!
//! ## Pipeline
//!
//! 1. **Read expansion**: each alignment's CIGAR is walked into per-position observations
//! 2. **Position buffer**: observations collect in a dense queue that releases positions
//!    once no later read can start before them
//! 3. **Aggregation**: released positions are filtered and tallied
//! 4. **Statistics**: consensus, entropy, heterozygosity and strand fractions
//!
//! Memory is bounded by the reference span of the longest alignment in flight.
//!
//! ## Usage Example
//!
//! ```ignore
//! use basecall::genomics::{BaseCaller, HtslibAlignmentSource, NoReference};
//! use basecall::{BasecallConfig, NeverAbort};
//!
//! let config = BasecallConfig::default().with_min_base_quality(20);
//! let source = HtslibAlignmentSource::open("sample.bam", false, 2)?;
//! let mut caller = BaseCaller::new(source, Box::new(NoReference), config)?;
//! let summary = caller.run(None, &mut NeverAbort, |row| { println!("{row:?}"); Ok(()) })?;
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod genomics; // Read expansion, buffering, aggregation and statistics
pub mod util; // Run-time limits

pub use genomics::{
    AlignedRead, BaseCaller, CigarOp, CigarOpKind, ConsensusCall, PositionAggregate, PositionRow,
    Region, Regions,
};
pub use util::{AbortCheck, NeverAbort, TimeBudget};

use std::sync::Once;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Default SAM flag filter: unmapped (0x4), QC failure (0x200) and duplicate (0x400).
pub const DEFAULT_FILTER_MASK: u16 = 1540;

/// Default minor-call threshold relative to the consensus count.
pub const DEFAULT_MINOR_PCT: f64 = 0.01;

/// Default cap on the number of reference positions held in the buffer.
pub const DEFAULT_MAX_SPAN: u32 = 10_000_000;

/// Tunable parameters for a base-calling run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BasecallConfig {
    /// Minimum Phred base quality for match and insertion observations.
    pub min_base_quality: u8,

    /// Minimum number of qualifying matches for a position to be reported.
    pub min_coverage: u32,

    /// Reads whose flags intersect this mask do not contribute matches or insertions.
    pub filter_mask: u16,

    /// Minor calls below this fraction of the consensus count are dropped.
    pub minor_pct: f64,

    /// Add the heterozygosity p-value column.
    pub het_test: bool,

    /// Report positions covered only by gaps (splice junctions).
    pub show_gaps: bool,

    /// Add the plus-strand and per-category minor-strand columns.
    pub show_strand: bool,

    /// Largest reference span the position buffer may hold.
    pub max_span: u32,
}

impl Default for BasecallConfig {
    fn default() -> Self {
        Self {
            min_base_quality: 0,
            min_coverage: 0,
            filter_mask: DEFAULT_FILTER_MASK,
            minor_pct: DEFAULT_MINOR_PCT,
            het_test: false,
            show_gaps: false,
            show_strand: false,
            max_span: DEFAULT_MAX_SPAN,
        }
    }
}

impl BasecallConfig {
    /// Set the minimum base quality.
    pub fn with_min_base_quality(mut self, min_base_quality: u8) -> Self {
        self.min_base_quality = min_base_quality;
        self
    }

    /// Set the minimum reported coverage.
    pub fn with_min_coverage(mut self, min_coverage: u32) -> Self {
        self.min_coverage = min_coverage;
        self
    }

    /// Set the SAM flag filter mask.
    pub fn with_filter_mask(mut self, filter_mask: u16) -> Self {
        self.filter_mask = filter_mask;
        self
    }

    /// Set the minor-call threshold.
    pub fn with_minor_pct(mut self, minor_pct: f64) -> Self {
        self.minor_pct = minor_pct;
        self
    }

    /// Enable the heterozygosity column.
    pub fn with_het_test(mut self, enabled: bool) -> Self {
        self.het_test = enabled;
        self
    }

    /// Enable reporting of gap-only positions.
    pub fn with_show_gaps(mut self, enabled: bool) -> Self {
        self.show_gaps = enabled;
        self
    }

    /// Enable the strand-bias columns.
    pub fn with_show_strand(mut self, enabled: bool) -> Self {
        self.show_strand = enabled;
        self
    }

    /// Set the position buffer span cap.
    pub fn with_max_span(mut self, max_span: u32) -> Self {
        self.max_span = max_span;
        self
    }

    /// Check parameter ranges and feature availability.
    pub fn validate(&self) -> Result<(), BasecallError> {
        if !(0.0..=1.0).contains(&self.minor_pct) || self.minor_pct.is_nan() {
            return Err(BasecallError::InvalidConfiguration(format!(
                "minor call fraction must be within [0, 1], got {}",
                self.minor_pct
            )));
        }
        if self.max_span == 0 {
            return Err(BasecallError::InvalidConfiguration(
                "buffer span must be > 0".to_string(),
            ));
        }
        if self.het_test && !cfg!(feature = "hettest") {
            return Err(BasecallError::HetTestUnavailable);
        }
        Ok(())
    }
}

/// Counters describing a completed (or aborted) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RunSummary {
    /// Alignment records consumed from the source.
    pub records: u64,
    /// Positions released by the buffer.
    pub positions: u64,
    /// Rows handed to the sink.
    pub rows: u64,
    /// Regions skipped because their contig is absent from the alignments.
    pub missing_regions: u64,
    /// Whether the abort check stopped the run early.
    pub aborted: bool,
}

/// Errors that can occur while calling bases.
#[derive(Error, Debug)]
pub enum BasecallError {
    /// An alignment's CIGAR does not agree with its sequence or qualities.
    #[error("malformed alignment {read} at {contig}:{pos}: {source}")]
    MalformedRecord {
        /// Read name.
        read: String,
        /// Contig name.
        contig: String,
        /// 1-based leftmost position.
        pos: u32,
        /// What the expander found wrong.
        #[source]
        source: genomics::ExpandError,
    },

    /// Reads arrived out of coordinate order.
    #[error("alignments are not coordinate sorted: {read} at {contig}:{pos} follows position {previous}")]
    UnsortedInput {
        /// Read name.
        read: String,
        /// Contig name.
        contig: String,
        /// 1-based position of the offending read.
        pos: u32,
        /// 1-based position of the previous read.
        previous: u32,
    },

    /// Reads returned to a contig after a different contig had started.
    #[error("alignments are not coordinate sorted: {read} on {contig} follows reads on {previous}")]
    ContigOrder {
        /// Read name.
        read: String,
        /// Contig of the offending read.
        contig: String,
        /// Contig whose reads came before it.
        previous: String,
    },

    /// A read would stretch the position buffer beyond its cap.
    #[error("alignment {read} spans {span} buffered positions, exceeding the limit of {limit}")]
    BufferSpanExceeded {
        /// Read name.
        read: String,
        /// Span the buffer would need.
        span: u64,
        /// Configured cap.
        limit: u32,
    },

    /// Configuration out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Heterozygosity column requested from a build without exact tests.
    #[error("the heterozygosity test requires the `hettest` feature")]
    HetTestUnavailable,

    /// Region string or BED line could not be parsed.
    #[error("invalid region {region}: {reason}")]
    InvalidRegion {
        /// Offending region text.
        region: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Statistical routine rejected its input.
    #[error("statistics error: {0}")]
    Statistics(String),

    /// Failure reported by htslib.
    #[error("htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    /// I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

static TRACING_INIT: Once = Once::new();

/// Install a stderr `tracing` subscriber honouring `RUST_LOG`.
///
/// `default_directive` applies when `RUST_LOG` is unset.
pub fn init_tracing(default_directive: &str) {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
