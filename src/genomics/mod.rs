//! Genomics building blocks for streaming base calling.
//!
//! Reads flow through [`expand_read`] into a [`PositionBuffer`]; released
//! positions are tallied by a [`PositionAggregator`] and scored by the
//! statistics functions. [`BaseCaller`] wires these together over an
//! [`AlignmentSource`].

mod basecaller;
mod buffer;
mod expander;
mod io;
pub mod output;
mod pileup;
mod reference;
mod regions;
mod statistics;
mod types;

pub use basecaller::BaseCaller;
pub use buffer::{BufferError, PendingPosition, PositionBuffer};
pub use expander::{expand_read, DeletionEvent, ExpandError, Observation, ObservationKind};
pub use io::{AlignmentSource, HtslibAlignmentSource, VecAlignmentSource};
pub use output::{render_rows, OutputColumns, PositionRow, RowWriter, StrandBias};
pub use pileup::{
    base_index, fold_strand_fraction, PositionAggregate, PositionAggregator, DELETION_IDX,
    INSERTION_IDX, NUM_BASES, NUM_CATEGORIES,
};
pub use reference::{FastaReference, MemoryReference, NoReference, ReferenceSource};
pub use regions::{Region, Regions};
#[cfg(feature = "hettest")]
pub use statistics::heterozygosity_pvalue;
pub use statistics::{
    average_multiplicity, consensus_call, entropy, plus_strand_fraction, ConsensusCall,
    StatsCache, GENOMIC_FREQ,
};
pub use types::{AlignedRead, CigarOp, CigarOpKind};
