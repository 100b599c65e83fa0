use std::collections::HashMap;

use crate::genomics::{Observation, ObservationKind};
use crate::BasecallError;

const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

/// Expected genomic frequency of A, C, G and T.
pub const GENOMIC_FREQ: [f64; 4] = [0.3, 0.2, 0.2, 0.3];

/// Most frequent base(s) and runner-up base(s) at a position.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConsensusCall {
    /// Single base, `N` without coverage, or `/`-joined tied bases.
    pub consensus: String,
    /// `/`-joined minor bases; empty when there is no minor call.
    pub minor: String,
}

/// Pick consensus and minor bases from A, C, G and T counts.
///
/// All bases tied for the top count form the consensus. The minor call is
/// every base tied for the next distinct non-zero count, dropped when it is
/// below `minor_pct` of the consensus count and whenever the consensus itself
/// is a tie. Lower counts are background and ignored.
pub fn consensus_call(minor_pct: f64, a: u32, c: u32, g: u32, t: u32) -> ConsensusCall {
    let mut calls: Vec<(u32, char)> = [a, c, g, t].into_iter().zip(BASES).collect();
    // stable: ties keep A, C, G, T order
    calls.sort_by(|x, y| y.0.cmp(&x.0));

    let best = calls[0].0;
    if best == 0 {
        return ConsensusCall {
            consensus: "N".to_string(),
            minor: String::new(),
        };
    }

    let mut consensus = Vec::new();
    let mut minor_calls = Vec::new();
    let mut minor = 0;
    for &(count, base) in calls.iter().take_while(|(count, _)| *count > 0) {
        if count == best {
            consensus.push(base.to_string());
        } else if minor == 0 {
            minor = count;
            minor_calls.push(base.to_string());
        } else if count == minor {
            minor_calls.push(base.to_string());
        }
    }

    if f64::from(minor) / f64::from(best) < minor_pct {
        minor_calls.clear();
    }
    if consensus.len() > 1 {
        minor_calls.clear();
    }

    ConsensusCall {
        consensus: consensus.join("/"),
        minor: minor_calls.join("/"),
    }
}

/// Background-normalised information score of a base composition.
///
/// Each count receives a pseudocount of `freq * sqrt(N)`; the score is
/// `sum(p * log2(p / freq))` over the smoothed probabilities `p`.
pub fn entropy(a: u32, c: u32, g: u32, t: u32) -> f64 {
    let counts = [a, c, g, t];
    let n: u32 = counts.iter().sum();
    if n == 0 {
        return 0.0;
    }

    let n_sqrt = f64::from(n).sqrt();
    let mut pseudo = [0.0; 4];
    for (idx, &count) in counts.iter().enumerate() {
        pseudo[idx] = f64::from(count) + GENOMIC_FREQ[idx] * n_sqrt;
    }
    let pseudo_total: f64 = pseudo.iter().sum();

    pseudo
        .iter()
        .zip(GENOMIC_FREQ)
        .map(|(&count, freq)| {
            let p = count / pseudo_total;
            p * (p / freq).log2()
        })
        .sum()
}

/// Significance of a heterozygous signal against a homozygous expectation.
///
/// With counts sorted descending into major, minor and background, the 2×2
/// table `[[total - background, background], [major, minor]]` is scored by the
/// hypergeometric probability of the observed table (Fisher's exact test).
/// The fourth count takes no part. A missing minor call yields 1.0.
#[cfg(feature = "hettest")]
pub fn heterozygosity_pvalue(a: u32, c: u32, g: u32, t: u32) -> Result<f64, BasecallError> {
    use statrs::distribution::{Discrete, Hypergeometric};

    let mut calls = [a, c, g, t];
    calls.sort_unstable();
    let (background, minor, major) = (calls[1], calls[2], calls[3]);
    if minor == 0 {
        return Ok(1.0);
    }

    let total = u64::from(a) + u64::from(c) + u64::from(g) + u64::from(t);
    let theoretical_major = total - u64::from(background);
    let theoretical_minor = u64::from(background);
    let population = total + u64::from(major) + u64::from(minor);
    let major_column = theoretical_major + u64::from(major);
    let first_row = theoretical_major + theoretical_minor;

    let dist = Hypergeometric::new(population, major_column, first_row)
        .map_err(|err| BasecallError::Statistics(err.to_string()))?;
    Ok(dist.pmf(theoretical_major))
}

/// Mean multiplicity of the reads behind match, insertion and deletion
/// observations. Reads without the annotation count as one mapping.
pub fn average_multiplicity(observations: &[Observation]) -> f64 {
    let (sum, n) = observations
        .iter()
        .filter(|obs| !matches!(obs.kind, ObservationKind::Gap))
        .fold((0u64, 0u64), |(sum, n), obs| {
            (sum + u64::from(obs.read.mappings()), n + 1)
        });
    if n == 0 {
        0.0
    } else {
        sum as f64 / n as f64
    }
}

/// Share of observations (gaps included) coming from plus-strand reads.
pub fn plus_strand_fraction(observations: &[Observation]) -> f64 {
    if observations.is_empty() {
        return 0.0;
    }
    let plus = observations.iter().filter(|obs| obs.is_plus_strand()).count();
    plus as f64 / observations.len() as f64
}

const DEFAULT_CACHE_CAPACITY: usize = 1 << 16;

/// Memoises entropy and heterozygosity by exact count tuple.
///
/// Both functions are pure, so cached and uncached results are identical.
/// Each table is cleared when it reaches capacity.
#[derive(Debug)]
pub struct StatsCache {
    entropy: HashMap<[u32; 4], f64>,
    heterozygosity: HashMap<[u32; 4], f64>,
    capacity: usize,
}

impl StatsCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `capacity` entries per table.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entropy: HashMap::new(),
            heterozygosity: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Cached [`entropy`].
    pub fn entropy(&mut self, counts: [u32; 4]) -> f64 {
        if let Some(&value) = self.entropy.get(&counts) {
            return value;
        }
        let [a, c, g, t] = counts;
        let value = entropy(a, c, g, t);
        if self.entropy.len() >= self.capacity {
            self.entropy.clear();
        }
        self.entropy.insert(counts, value);
        value
    }

    /// Cached heterozygosity p-value.
    #[cfg(feature = "hettest")]
    pub fn heterozygosity(&mut self, counts: [u32; 4]) -> Result<f64, BasecallError> {
        if let Some(&value) = self.heterozygosity.get(&counts) {
            return Ok(value);
        }
        let [a, c, g, t] = counts;
        let value = heterozygosity_pvalue(a, c, g, t)?;
        if self.heterozygosity.len() >= self.capacity {
            self.heterozygosity.clear();
        }
        self.heterozygosity.insert(counts, value);
        Ok(value)
    }

    /// Heterozygosity p-value; unavailable in this build.
    #[cfg(not(feature = "hettest"))]
    pub fn heterozygosity(&mut self, _counts: [u32; 4]) -> Result<f64, BasecallError> {
        Err(BasecallError::HetTestUnavailable)
    }

    /// Number of memoised entries across both tables.
    pub fn len(&self) -> usize {
        self.entropy.len() + self.heterozygosity.len()
    }

    /// Whether nothing is memoised.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::{AlignedRead, CigarOp, CigarOpKind};
    use std::sync::Arc;
    use test_case::test_case;

    #[test_case(0.01, [0, 0, 0, 0], "N", "" ; "no coverage")]
    #[test_case(1.0, [10, 0, 0, 0], "A", "" ; "single base")]
    #[test_case(0.01, [10, 2, 1, 0], "A", "C" ; "background ignored")]
    #[test_case(0.01, [5, 5, 1, 0], "A/C", "" ; "tied consensus suppresses minor")]
    #[test_case(0.01, [1, 8, 1, 0], "C", "A/G" ; "tied minors")]
    #[test_case(0.5, [10, 2, 0, 0], "A", "" ; "minor below threshold")]
    #[test_case(0.2, [10, 2, 0, 0], "A", "C" ; "minor at threshold")]
    #[test_case(0.01, [0, 0, 3, 3], "G/T", "" ; "tie ordered by base")]
    fn consensus_cases(minor_pct: f64, counts: [u32; 4], consensus: &str, minor: &str) {
        let [a, c, g, t] = counts;
        let call = consensus_call(minor_pct, a, c, g, t);
        assert_eq!(call.consensus, consensus);
        assert_eq!(call.minor, minor);
    }

    #[test]
    fn entropy_without_coverage_is_zero() {
        assert_eq!(entropy(0, 0, 0, 0), 0.0);
    }

    #[test]
    fn entropy_matches_hand_computation() {
        // N = 4, sqrt = 2: pseudo = [4.6, 0.4, 0.4, 0.6], total 6
        let pseudo = [4.6, 0.4, 0.4, 0.6];
        let expected: f64 = pseudo
            .iter()
            .zip(GENOMIC_FREQ)
            .map(|(&c, f)| {
                let p = c / 6.0;
                p * (p / f).log2()
            })
            .sum();
        assert!((entropy(4, 0, 0, 0) - expected).abs() < 1e-12);
    }

    #[test]
    fn entropy_grows_with_depth_and_skew() {
        assert!(entropy(100, 0, 0, 0) > entropy(10, 0, 0, 0));
        assert!(entropy(10, 0, 0, 0) > entropy(3, 2, 2, 3));
        assert!(entropy(3, 2, 2, 3).abs() < 1e-12);
    }

    #[cfg(feature = "hettest")]
    #[test]
    fn heterozygosity_matches_reference_table() {
        let p = heterozygosity_pvalue(10, 2, 1, 0).unwrap();
        assert!((p - 0.373).abs() < 1e-3, "p={p}");
        // argument order does not matter, only the sorted counts
        assert_eq!(p, heterozygosity_pvalue(0, 1, 10, 2).unwrap());
    }

    #[cfg(feature = "hettest")]
    #[test]
    fn heterozygosity_without_minor_is_one() {
        assert_eq!(heterozygosity_pvalue(25, 0, 0, 0).unwrap(), 1.0);
        assert_eq!(heterozygosity_pvalue(0, 0, 0, 0).unwrap(), 1.0);
    }

    #[cfg(feature = "hettest")]
    #[test]
    fn balanced_counts_are_less_likely_homozygous() {
        let balanced = heterozygosity_pvalue(20, 20, 0, 0).unwrap();
        let skewed = heterozygosity_pvalue(38, 2, 0, 0).unwrap();
        assert!(balanced < skewed);
    }

    fn observation(kind: ObservationKind, reverse: bool, ih: Option<u32>) -> Observation {
        let mut read = AlignedRead::new(
            0,
            "r",
            0,
            vec![CigarOp::new(CigarOpKind::Match, 1)],
            b"A".to_vec(),
            vec![30],
            reverse,
        );
        read.multiplicity = ih;
        Observation {
            kind,
            read: Arc::new(read),
        }
    }

    #[test]
    fn average_multiplicity_skips_gaps_and_defaults_to_one() {
        let m = ObservationKind::Match {
            base: b'A',
            quality: 30,
        };
        let observations = vec![
            observation(m.clone(), false, Some(3)),
            observation(m, false, None),
            observation(ObservationKind::Gap, false, Some(100)),
        ];
        assert!((average_multiplicity(&observations) - 2.0).abs() < 1e-12);
        assert_eq!(average_multiplicity(&[]), 0.0);
    }

    #[test]
    fn plus_strand_fraction_counts_every_observation() {
        let observations = vec![
            observation(ObservationKind::Gap, false, None),
            observation(ObservationKind::Gap, true, None),
            observation(ObservationKind::Gap, true, None),
            observation(ObservationKind::Gap, true, None),
        ];
        assert!((plus_strand_fraction(&observations) - 0.25).abs() < 1e-12);
        assert_eq!(plus_strand_fraction(&[]), 0.0);
    }

    #[test]
    fn cache_returns_identical_values() {
        let mut cache = StatsCache::with_capacity(2);
        let first = cache.entropy([7, 1, 0, 2]);
        assert_eq!(first.to_bits(), cache.entropy([7, 1, 0, 2]).to_bits());
        cache.entropy([1, 1, 1, 1]);
        cache.entropy([2, 2, 2, 2]);
        assert!(cache.len() <= 2);
        assert_eq!(first.to_bits(), entropy(7, 1, 0, 2).to_bits());
    }
}
