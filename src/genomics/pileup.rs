use std::collections::BTreeMap;

use crate::genomics::{Observation, ObservationKind, PendingPosition, Region};
use crate::BasecallConfig;

/// Number of base categories tallied per position (A, C, G, T, N).
pub const NUM_BASES: usize = 5;

/// Number of strand-tracked categories (A, C, G, T, N, deletion, insertion).
pub const NUM_CATEGORIES: usize = 7;

/// Index of the deletion category in strand arrays.
pub const DELETION_IDX: usize = 5;

/// Index of the insertion category in strand arrays.
pub const INSERTION_IDX: usize = 6;

/// Tally slot for a base call; anything outside ACGT counts as N.
pub fn base_index(base: u8) -> usize {
    match base {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' | b'U' | b'u' => 3,
        _ => 4,
    }
}

/// Fraction of `plus` in `count`, folded so it reports the minor strand share.
///
/// Returns 0.0 for an empty category; the result is always within `[0, 0.5]`.
pub fn fold_strand_fraction(plus: u32, count: u32) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let pct = (f64::from(plus) / f64::from(count)).min(1.0);
    if pct > 0.5 {
        1.0 - pct
    } else {
        pct
    }
}

/// Aggregated pileup statistics for a released genomic position.
#[derive(Debug, Clone)]
pub struct PositionAggregate {
    /// Contig id.
    pub tid: u32,
    /// 1-based position.
    pub position: u32,
    /// Matches passing the quality and flag filters.
    pub total: u32,
    /// Per-base match counts [A, C, G, T, N].
    pub base_counts: [u32; NUM_BASES],
    /// Deletion observations.
    pub deletions: u32,
    /// Gap (splice) observations.
    pub gaps: u32,
    /// Occurrences of each distinct inserted sequence.
    pub insertions: BTreeMap<String, u32>,
    /// Insertions that repeat an already-seen sequence at this position.
    pub insertion_repeats: u32,
    /// Observations that passed filtering, in arrival order.
    pub observations: Vec<Observation>,
    /// Plus-strand counts per category.
    pub plus_counts: [u32; NUM_CATEGORIES],
    /// Folded minor-strand fraction per category.
    pub strand_fractions: [f64; NUM_CATEGORIES],
}

impl PositionAggregate {
    fn new(tid: u32, position: u32) -> Self {
        Self {
            tid,
            position,
            total: 0,
            base_counts: [0; NUM_BASES],
            deletions: 0,
            gaps: 0,
            insertions: BTreeMap::new(),
            insertion_repeats: 0,
            observations: Vec::new(),
            plus_counts: [0; NUM_CATEGORIES],
            strand_fractions: [0.0; NUM_CATEGORIES],
        }
    }

    /// Counts for A, C, G and T in that order.
    pub fn acgt(&self) -> [u32; 4] {
        [
            self.base_counts[0],
            self.base_counts[1],
            self.base_counts[2],
            self.base_counts[3],
        ]
    }

    /// Total insertion occurrences across all sequences.
    pub fn insertion_total(&self) -> u32 {
        self.insertions.values().sum()
    }

    /// Matches plus deletions plus distinct inserted sequences.
    pub fn reportable_depth(&self) -> u32 {
        self.total + self.deletions + self.insertions.len() as u32
    }

    /// Observation count per strand-tracked category.
    pub fn category_counts(&self) -> [u32; NUM_CATEGORIES] {
        let mut counts = [0; NUM_CATEGORIES];
        counts[..NUM_BASES].copy_from_slice(&self.base_counts);
        counts[DELETION_IDX] = self.deletions;
        counts[INSERTION_IDX] = self.insertion_total();
        counts
    }

    fn observe(&mut self, observation: Observation) {
        let plus = observation.is_plus_strand();
        let category = match &observation.kind {
            ObservationKind::Match { base, .. } => {
                let idx = base_index(*base);
                self.total += 1;
                self.base_counts[idx] += 1;
                Some(idx)
            }
            ObservationKind::Insertion { sequence, .. } => {
                match self.insertions.get_mut(sequence) {
                    Some(count) => {
                        *count += 1;
                        self.insertion_repeats += 1;
                    }
                    None => {
                        self.insertions.insert(sequence.clone(), 1);
                    }
                }
                Some(INSERTION_IDX)
            }
            ObservationKind::Deletion { .. } => {
                self.deletions += 1;
                Some(DELETION_IDX)
            }
            ObservationKind::Gap => {
                self.gaps += 1;
                None
            }
        };
        if let (Some(idx), true) = (category, plus) {
            self.plus_counts[idx] += 1;
        }
        self.observations.push(observation);
    }

    fn finish(&mut self) {
        let counts = self.category_counts();
        for (idx, fraction) in self.strand_fractions.iter_mut().enumerate() {
            *fraction = fold_strand_fraction(self.plus_counts[idx], counts[idx]);
        }
    }
}

/// Applies quality, flag, region and coverage filters to released positions.
#[derive(Debug, Clone)]
pub struct PositionAggregator {
    min_base_quality: u8,
    filter_mask: u16,
    min_coverage: u32,
}

impl PositionAggregator {
    /// Create an aggregator from run configuration.
    pub fn new(config: &BasecallConfig) -> Self {
        Self {
            min_base_quality: config.min_base_quality,
            filter_mask: config.filter_mask,
            min_coverage: config.min_coverage,
        }
    }

    /// Tally one released position.
    ///
    /// Returns `None` when the position lies outside `region` or has fewer
    /// qualifying matches than the coverage threshold.
    pub fn aggregate(
        &self,
        pending: PendingPosition,
        region: Option<&Region>,
    ) -> Option<PositionAggregate> {
        if let Some(region) = region {
            if !region.contains(pending.pos) {
                return None;
            }
        }

        let mut aggregate = PositionAggregate::new(pending.tid, pending.pos + 1);
        for observation in pending.observations {
            if self.qualifies(&observation) {
                aggregate.observe(observation);
            }
        }

        if aggregate.total < self.min_coverage {
            return None;
        }
        aggregate.finish();
        Some(aggregate)
    }

    fn qualifies(&self, observation: &Observation) -> bool {
        match &observation.kind {
            ObservationKind::Match { quality, .. } | ObservationKind::Insertion { quality, .. } => {
                *quality >= self.min_base_quality && observation.passes_flags(self.filter_mask)
            }
            ObservationKind::Deletion { .. } | ObservationKind::Gap => true,
        }
    }
}
