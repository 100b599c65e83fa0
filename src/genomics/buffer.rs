//! Dense, position-ordered queue of positions still open to new observations.

use std::collections::VecDeque;

use crate::genomics::Observation;

/// A reference position that may still receive observations.
#[derive(Debug, Clone)]
pub struct PendingPosition {
    /// Contig id.
    pub tid: u32,
    /// 0-based reference position.
    pub pos: u32,
    /// Observations in arrival order.
    pub observations: Vec<Observation>,
}

impl PendingPosition {
    fn empty(tid: u32, pos: u32) -> Self {
        Self {
            tid,
            pos,
            observations: Vec::new(),
        }
    }
}

/// Why a read could not be buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// The read touches a position that has already been released.
    BehindFront {
        /// Lowest position the read touches.
        pos: u32,
        /// Lowest position still pending.
        front: u32,
    },
    /// The read belongs to a different contig than the pending positions.
    ContigMismatch {
        /// Contig of the pending positions.
        pending: u32,
        /// Contig of the read.
        read: u32,
    },
    /// Holding the read would exceed the span cap.
    SpanExceeded {
        /// Span that would be required.
        span: u64,
    },
}

/// Ordered run of pending positions from the lowest unreleased position to
/// the highest position touched so far, with no holes.
///
/// Releases are driven by the caller: [`pop_before`](Self::pop_before) with the
/// start of each arriving read, [`pop_front`](Self::pop_front) to drain on a
/// contig change or at the end of input.
#[derive(Debug)]
pub struct PositionBuffer {
    pending: VecDeque<PendingPosition>,
    max_span: u32,
}

impl PositionBuffer {
    /// Create an empty buffer holding at most `max_span` positions.
    pub fn new(max_span: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            max_span,
        }
    }

    /// Contig of the pending positions, if any.
    pub fn tid(&self) -> Option<u32> {
        self.pending.front().map(|p| p.tid)
    }

    /// Lowest pending position.
    pub fn front_pos(&self) -> Option<u32> {
        self.pending.front().map(|p| p.pos)
    }

    /// Highest pending position.
    pub fn back_pos(&self) -> Option<u32> {
        self.pending.back().map(|p| p.pos)
    }

    /// Number of pending positions.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Positions the buffer would hold after taking a read covering
    /// `[start, end)` on the pending contig, without expanding it.
    pub fn required_span(&self, start: u32, end: u64) -> u64 {
        let front = self.front_pos().map_or(start, |front| front.min(start));
        end.max(u64::from(start) + 1) - u64::from(front)
    }

    /// Release the lowest pending position if it lies strictly before `pos`.
    ///
    /// Once a read starting at `pos` has arrived from a sorted stream, no
    /// later read can touch anything before it.
    pub fn pop_before(&mut self, pos: u32) -> Option<PendingPosition> {
        if self.pending.front()?.pos < pos {
            self.pending.pop_front()
        } else {
            None
        }
    }

    /// Release the lowest pending position unconditionally.
    pub fn pop_front(&mut self) -> Option<PendingPosition> {
        self.pending.pop_front()
    }

    /// Add a read's observations, given in non-decreasing position order.
    ///
    /// The pending run is extended to cover the highest observed position.
    pub fn push(
        &mut self,
        tid: u32,
        observations: Vec<(u32, Observation)>,
    ) -> Result<(), BufferError> {
        let (first, last) = match (observations.first(), observations.last()) {
            (Some((first, _)), Some((last, _))) => (*first, *last),
            _ => return Ok(()),
        };

        if let Some(pending) = self.tid() {
            if pending != tid {
                return Err(BufferError::ContigMismatch { pending, read: tid });
            }
        }

        let front = match self.front_pos() {
            Some(front) if first < front => {
                return Err(BufferError::BehindFront { pos: first, front })
            }
            Some(front) => front,
            None => first,
        };

        let span = u64::from(last) - u64::from(front) + 1;
        if span > u64::from(self.max_span) {
            return Err(BufferError::SpanExceeded { span });
        }

        if self.pending.is_empty() {
            self.pending.push_back(PendingPosition::empty(tid, front));
        }
        while let Some(back) = self.back_pos() {
            if back >= last {
                break;
            }
            self.pending.push_back(PendingPosition::empty(tid, back + 1));
        }

        for (pos, observation) in observations {
            let idx = (pos - front) as usize;
            self.pending[idx].observations.push(observation);
        }
        Ok(())
    }
}
