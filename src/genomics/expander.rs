//! CIGAR walking: turns one alignment into per-reference-position observations.

use std::sync::Arc;

use thiserror::Error;

use crate::genomics::{AlignedRead, CigarOp, CigarOpKind};

/// Reference interval removed by one deletion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionEvent {
    /// First deleted reference position (0-based).
    pub start: u32,
    /// Number of deleted reference bases.
    pub len: u32,
}

/// What a read contributes at one reference position.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationKind {
    /// Aligned base call.
    Match {
        /// Uppercase base.
        base: u8,
        /// Phred quality.
        quality: u8,
    },
    /// Bases inserted after this position.
    Insertion {
        /// Inserted bases as text.
        sequence: String,
        /// Truncated mean Phred quality of the inserted bases.
        quality: u8,
    },
    /// Position deleted from the read. Every position of one deletion shares the event.
    Deletion {
        /// The deletion this position belongs to.
        event: Arc<DeletionEvent>,
    },
    /// Position skipped by a splice junction.
    Gap,
}

/// One read's contribution at one reference position.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Contribution kind.
    pub kind: ObservationKind,
    /// Originating read, kept for strand and multiplicity statistics.
    pub read: Arc<AlignedRead>,
}

impl Observation {
    /// Whether the originating read is on the forward strand.
    pub fn is_plus_strand(&self) -> bool {
        !self.read.is_reverse
    }

    /// Whether the originating read passes the flag filter.
    pub fn passes_flags(&self, mask: u16) -> bool {
        self.read.flags & mask == 0
    }
}

/// Why a read could not be expanded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpandError {
    /// An operation consumes more query bases than the read carries.
    #[error("operation #{op_index} ({op_len}{op_char}) needs query bases up to {needed} but the read has {bases} bases and {qualities} qualities")]
    QueryOverrun {
        /// Index of the offending operation in the CIGAR.
        op_index: usize,
        /// Operation length.
        op_len: u32,
        /// Operation character.
        op_char: char,
        /// Query offset the operation would reach.
        needed: usize,
        /// Sequence length.
        bases: usize,
        /// Quality length.
        qualities: usize,
    },

    /// The CIGAR runs past the last representable reference coordinate.
    #[error("alignment ends at {end}, beyond the 32-bit coordinate range")]
    CoordinateOverflow {
        /// Exclusive end implied by the CIGAR.
        end: u64,
    },
}

/// Largest exclusive end a read may reach.
const MAX_END: u64 = u32::MAX as u64 + 1;

/// Expand a read into `(reference position, observation)` pairs in reference order.
///
/// One observation is allocated per spanned reference position, so callers
/// holding a span budget check [`AlignedRead::end`] first.
pub fn expand_read(read: &Arc<AlignedRead>) -> Result<Vec<(u32, Observation)>, ExpandError> {
    let end = read.end();
    if end > MAX_END {
        return Err(ExpandError::CoordinateOverflow { end });
    }
    let mut observations = Vec::with_capacity((end - u64::from(read.pos)) as usize + 1);
    let mut ref_pos = read.pos;
    let mut query_idx = 0usize;

    for (op_index, op) in read.cigar.iter().enumerate() {
        if op.len == 0 {
            continue;
        }
        let len = op.len as usize;

        if op.kind.consumes_query() {
            check_query_bounds(read, op_index, op, query_idx + len)?;
        }

        match op.kind {
            CigarOpKind::Match => {
                for i in 0..len {
                    let kind = ObservationKind::Match {
                        base: read.sequence[query_idx + i].to_ascii_uppercase(),
                        quality: read.qualities[query_idx + i],
                    };
                    observations.push((ref_pos, observe(read, kind)));
                    ref_pos += 1;
                }
                query_idx += len;
            }
            CigarOpKind::Insertion => {
                let bases = &read.sequence[query_idx..query_idx + len];
                let quality_sum: u32 = read.qualities[query_idx..query_idx + len]
                    .iter()
                    .map(|&q| u32::from(q))
                    .sum();
                let kind = ObservationKind::Insertion {
                    sequence: String::from_utf8_lossy(bases).to_ascii_uppercase(),
                    quality: (quality_sum / op.len) as u8,
                };
                // Anchor on the last aligned reference base; a leading insertion has
                // none inside the read and anchors on the first.
                let anchor = if ref_pos > read.pos { ref_pos - 1 } else { read.pos };
                observations.push((anchor, observe(read, kind)));
                query_idx += len;
            }
            CigarOpKind::Deletion => {
                let event = Arc::new(DeletionEvent {
                    start: ref_pos,
                    len: op.len,
                });
                for _ in 0..len {
                    let kind = ObservationKind::Deletion {
                        event: Arc::clone(&event),
                    };
                    observations.push((ref_pos, observe(read, kind)));
                    ref_pos += 1;
                }
            }
            CigarOpKind::Skip => {
                for _ in 0..len {
                    observations.push((ref_pos, observe(read, ObservationKind::Gap)));
                    ref_pos += 1;
                }
            }
            CigarOpKind::SoftClip => query_idx += len,
            CigarOpKind::HardClip | CigarOpKind::Padding => {}
        }
    }

    debug_assert!(observations.windows(2).all(|w| w[0].0 <= w[1].0));
    Ok(observations)
}

fn observe(read: &Arc<AlignedRead>, kind: ObservationKind) -> Observation {
    Observation {
        kind,
        read: Arc::clone(read),
    }
}

fn check_query_bounds(
    read: &AlignedRead,
    op_index: usize,
    op: &CigarOp,
    needed: usize,
) -> Result<(), ExpandError> {
    if needed > read.sequence.len() || needed > read.qualities.len() {
        return Err(ExpandError::QueryOverrun {
            op_index,
            op_len: op.len,
            op_char: op.kind.as_char(),
            needed,
            bases: read.sequence.len(),
            qualities: read.qualities.len(),
        });
    }
    Ok(())
}
