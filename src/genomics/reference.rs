//! Reference base lookup for the `ref` output column.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use rust_htslib::faidx;
use tracing::{debug, warn};

use crate::BasecallError;

/// Bases fetched per FASTA round trip.
const WINDOW: u32 = 64 * 1024;

/// Source of reference bases. Anything unknown is reported as `N`.
pub trait ReferenceSource {
    /// Uppercase reference base at a 0-based position.
    fn base_at(&mut self, contig: &str, pos: u32) -> u8;
}

/// Used when no reference was supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReference;

impl ReferenceSource for NoReference {
    fn base_at(&mut self, _contig: &str, _pos: u32) -> u8 {
        b'N'
    }
}

/// Reference held in memory, keyed by contig name.
#[derive(Debug, Clone, Default)]
pub struct MemoryReference {
    contigs: HashMap<String, Vec<u8>>,
}

impl MemoryReference {
    /// Create an empty reference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a contig sequence.
    pub fn with_contig(mut self, name: impl Into<String>, sequence: &[u8]) -> Self {
        self.contigs
            .insert(name.into(), sequence.to_ascii_uppercase());
        self
    }
}

impl ReferenceSource for MemoryReference {
    fn base_at(&mut self, contig: &str, pos: u32) -> u8 {
        self.contigs
            .get(contig)
            .and_then(|seq| seq.get(pos as usize).copied())
            .unwrap_or(b'N')
    }
}

/// Indexed FASTA (`.fai`) reader that keeps one window of sequence cached.
///
/// Positions are released in increasing order, so a forward-moving window
/// serves nearly every lookup without touching htslib.
pub struct FastaReference {
    reader: faidx::Reader,
    contig: String,
    start: u32,
    window: Vec<u8>,
    /// Sequence lengths listed in the index.
    lengths: HashMap<String, u64>,
    /// Contigs absent from the index, reported once.
    missing: HashSet<String>,
    /// Contigs whose fetches have failed at least once.
    failed: HashSet<String>,
}

impl fmt::Debug for FastaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastaReference")
            .field("contig", &self.contig)
            .field("start", &self.start)
            .field("window_len", &self.window.len())
            .field("sequences", &self.lengths.len())
            .finish()
    }
}

impl FastaReference {
    /// Open an indexed FASTA file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BasecallError> {
        let reader = faidx::Reader::from_path(path.as_ref())?;
        let lengths = (0..reader.n_seqs())
            .map(|idx| {
                let name = reader.seq_name(idx as i32)?;
                let len = reader.fetch_seq_len(&name);
                Ok((name, len))
            })
            .collect::<Result<HashMap<String, u64>, rust_htslib::errors::Error>>()?;
        debug!(path = %path.as_ref().display(), sequences = lengths.len(), "opened reference");
        Ok(Self {
            reader,
            contig: String::new(),
            start: 0,
            window: Vec::new(),
            lengths,
            missing: HashSet::new(),
            failed: HashSet::new(),
        })
    }

    fn load(&mut self, contig: &str, pos: u32) {
        self.contig.clear();
        self.contig.push_str(contig);
        self.start = pos;
        self.window.clear();

        let end = pos.saturating_add(WINDOW - 1);
        match self
            .reader
            .fetch_seq_string(contig, pos as usize, end as usize)
        {
            Ok(seq) => {
                self.window = seq.into_bytes();
                self.window.make_ascii_uppercase();
                debug!(contig, start = pos, len = self.window.len(), "loaded reference window");
            }
            Err(err) => {
                // the next lookup retries; only the first failure per contig is a warning
                if self.failed.insert(contig.to_string()) {
                    warn!(contig, start = pos, %err, "reference fetch failed; reporting N");
                } else {
                    debug!(contig, start = pos, %err, "reference fetch failed");
                }
            }
        }
    }
}

impl ReferenceSource for FastaReference {
    fn base_at(&mut self, contig: &str, pos: u32) -> u8 {
        let Some(&len) = self.lengths.get(contig) else {
            if self.missing.insert(contig.to_string()) {
                warn!(contig, "contig not in reference index; reporting N");
            }
            return b'N';
        };
        if u64::from(pos) >= len {
            return b'N';
        }
        let cached = self.contig == contig
            && pos >= self.start
            && ((pos - self.start) as usize) < self.window.len();
        if !cached {
            self.load(contig, pos);
        }
        pos.checked_sub(self.start)
            .and_then(|offset| self.window.get(offset as usize).copied())
            .unwrap_or(b'N')
    }
}

impl<R: ReferenceSource + ?Sized> ReferenceSource for Box<R> {
    fn base_at(&mut self, contig: &str, pos: u32) -> u8 {
        (**self).base_at(contig, pos)
    }
}
