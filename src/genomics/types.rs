use std::sync::Arc;

/// CIGAR operation kinds describing how a read aligns to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOpKind {
    /// Consuming match/mismatch (`M`, `=`, `X`).
    Match,
    /// Insertion relative to the reference.
    Insertion,
    /// Deletion relative to the reference.
    Deletion,
    /// Skipped reference region, e.g. a splice junction (`N`).
    Skip,
    /// Soft clipping (sequence present in read only).
    SoftClip,
    /// Hard clipping (trimmed sequence not present in read).
    HardClip,
    /// Silent padding.
    Padding,
}

impl CigarOpKind {
    /// Whether the operation advances along the reference.
    pub fn consumes_reference(self) -> bool {
        matches!(self, Self::Match | Self::Deletion | Self::Skip)
    }

    /// Whether the operation advances along the read sequence.
    pub fn consumes_query(self) -> bool {
        matches!(self, Self::Match | Self::Insertion | Self::SoftClip)
    }

    /// SAM operation character.
    pub fn as_char(self) -> char {
        match self {
            Self::Match => 'M',
            Self::Insertion => 'I',
            Self::Deletion => 'D',
            Self::Skip => 'N',
            Self::SoftClip => 'S',
            Self::HardClip => 'H',
            Self::Padding => 'P',
        }
    }
}

/// CIGAR operation with length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    /// Operation kind.
    pub kind: CigarOpKind,
    /// Number of bases affected by the operation.
    pub len: u32,
}

impl CigarOp {
    /// Construct a new CIGAR operation.
    pub fn new(kind: CigarOpKind, len: u32) -> Self {
        Self { kind, len }
    }
}

/// Aligned read with sequence and quality information.
///
/// Qualities are stored as Phred values (the Sanger ASCII offset of 33 has
/// already been removed by the decoder).
#[derive(Debug, Clone)]
pub struct AlignedRead {
    /// Reference contig id as assigned by the alignment header.
    pub tid: u32,
    /// Read (query template) name.
    pub name: Arc<str>,
    /// 0-based leftmost reference coordinate.
    pub pos: u32,
    /// SAM flag word.
    pub flags: u16,
    /// CIGAR describing the alignment.
    pub cigar: Vec<CigarOp>,
    /// Read sequence stored as uppercase ASCII.
    pub sequence: Arc<[u8]>,
    /// Per-base quality scores in Phred space.
    pub qualities: Arc<[u8]>,
    /// Whether the read maps to the reverse complement strand.
    pub is_reverse: bool,
    /// Number of reported alignments for this read (`IH` tag), if present.
    pub multiplicity: Option<u32>,
}

impl AlignedRead {
    /// Construct a new aligned read wrapper.
    pub fn new(
        tid: u32,
        name: impl Into<Arc<str>>,
        pos: u32,
        cigar: Vec<CigarOp>,
        sequence: impl Into<Arc<[u8]>>,
        qualities: impl Into<Arc<[u8]>>,
        is_reverse: bool,
    ) -> Self {
        Self {
            tid,
            name: name.into(),
            pos,
            flags: if is_reverse { 0x10 } else { 0 },
            cigar,
            sequence: sequence.into(),
            qualities: qualities.into(),
            is_reverse,
            multiplicity: None,
        }
    }

    /// Replace the SAM flag word, keeping the strand bit in sync.
    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self.is_reverse = flags & 0x10 != 0;
        self
    }

    /// Attach an `IH`-style multiplicity annotation.
    pub fn with_multiplicity(mut self, multiplicity: u32) -> Self {
        self.multiplicity = Some(multiplicity);
        self
    }

    /// Read length inferred from the sequence.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether the read carries no bases.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Number of reference bases spanned by the CIGAR.
    ///
    /// Summed as `u64`: a CIGAR may hold many ops near the 28-bit BAM length limit.
    pub fn reference_span(&self) -> u64 {
        self.cigar
            .iter()
            .filter(|op| op.kind.consumes_reference())
            .map(|op| u64::from(op.len))
            .sum()
    }

    /// End position (half-open) on the reference; may lie past `u32::MAX`.
    pub fn end(&self) -> u64 {
        u64::from(self.pos) + self.reference_span()
    }

    /// Base at the provided read offset.
    pub fn base_at(&self, offset: usize) -> Option<u8> {
        self.sequence.get(offset).copied()
    }

    /// Quality score at the provided read offset.
    pub fn quality_at(&self, offset: usize) -> Option<u8> {
        self.qualities.get(offset).copied()
    }

    /// Multiplicity with the absent annotation defaulting to one mapping.
    pub fn mappings(&self) -> u32 {
        self.multiplicity.unwrap_or(1)
    }

    /// Compact CIGAR string, used in diagnostics.
    pub fn cigar_string(&self) -> String {
        if self.cigar.is_empty() {
            return "*".to_string();
        }
        self.cigar
            .iter()
            .map(|op| format!("{}{}", op.len, op.kind.as_char()))
            .collect()
    }
}
