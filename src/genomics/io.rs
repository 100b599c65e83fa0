use std::path::Path;
use std::sync::Arc;

use rust_htslib::bam::{self, record::Aux, record::Cigar, Read};
use tracing::debug;

use crate::genomics::{AlignedRead, CigarOp, CigarOpKind};
use crate::BasecallError;

/// Position-sorted supply of decoded alignments.
///
/// In whole-file mode the caller invokes [`fetch_all`](Self::fetch_all) once;
/// in region mode it calls [`fetch`](Self::fetch) per region. Either way
/// [`next_record`](Self::next_record) then yields records in coordinate order.
pub trait AlignmentSource {
    /// Number of contigs declared by the header.
    fn target_count(&self) -> u32;

    /// Contig name for an id.
    fn reference_name(&self, tid: u32) -> Option<Arc<str>>;

    /// Contig id for a name.
    fn tid(&self, name: &str) -> Option<u32>;

    /// Restrict iteration to reads overlapping `[start, end)` on `tid`.
    fn fetch(&mut self, tid: u32, start: u32, end: u32) -> Result<(), BasecallError>;

    /// Iterate every mapped record.
    fn fetch_all(&mut self) -> Result<(), BasecallError>;

    /// Next record, or `None` at the end of the current fetch.
    fn next_record(&mut self) -> Result<Option<AlignedRead>, BasecallError>;
}

enum HtsReader {
    Indexed(bam::IndexedReader),
    Sequential(bam::Reader),
}

impl HtsReader {
    fn read(&mut self, record: &mut bam::Record) -> Option<rust_htslib::errors::Result<()>> {
        match self {
            Self::Indexed(reader) => reader.read(record),
            Self::Sequential(reader) => reader.read(record),
        }
    }
}

/// BAM/SAM/CRAM input through htslib.
pub struct HtslibAlignmentSource {
    reader: HtsReader,
    names: Vec<Arc<str>>,
    record: bam::Record,
}

impl std::fmt::Debug for HtslibAlignmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtslibAlignmentSource")
            .field("indexed", &matches!(self.reader, HtsReader::Indexed(_)))
            .field("targets", &self.names.len())
            .finish()
    }
}

impl HtslibAlignmentSource {
    /// Open an alignment file. Region queries need `indexed` (a `.bai`/`.csi`
    /// next to the file); whole-file runs read sequentially. `threads` adds
    /// htslib decompression workers when non-zero.
    pub fn open(
        path: impl AsRef<Path>,
        indexed: bool,
        threads: usize,
    ) -> Result<Self, BasecallError> {
        let path = path.as_ref();
        let mut reader = if indexed {
            HtsReader::Indexed(bam::IndexedReader::from_path(path)?)
        } else {
            HtsReader::Sequential(bam::Reader::from_path(path)?)
        };

        let header = match &reader {
            HtsReader::Indexed(r) => r.header(),
            HtsReader::Sequential(r) => r.header(),
        };
        let names: Vec<Arc<str>> = header
            .target_names()
            .into_iter()
            .map(|name| Arc::from(String::from_utf8_lossy(name).as_ref()))
            .collect();

        if threads > 0 {
            match &mut reader {
                HtsReader::Indexed(r) => r.set_threads(threads)?,
                HtsReader::Sequential(r) => r.set_threads(threads)?,
            }
        }

        debug!(path = %path.display(), indexed, targets = names.len(), "opened alignments");
        Ok(Self {
            reader,
            names,
            record: bam::Record::new(),
        })
    }
}

impl AlignmentSource for HtslibAlignmentSource {
    fn target_count(&self) -> u32 {
        self.names.len() as u32
    }

    fn reference_name(&self, tid: u32) -> Option<Arc<str>> {
        self.names.get(tid as usize).cloned()
    }

    fn tid(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n.as_ref() == name)
            .map(|idx| idx as u32)
    }

    fn fetch(&mut self, tid: u32, start: u32, end: u32) -> Result<(), BasecallError> {
        match &mut self.reader {
            HtsReader::Indexed(reader) => {
                reader.fetch((tid, i64::from(start), i64::from(end)))?;
                Ok(())
            }
            HtsReader::Sequential(_) => Err(BasecallError::InvalidConfiguration(
                "region queries require an indexed alignment file".to_string(),
            )),
        }
    }

    fn fetch_all(&mut self) -> Result<(), BasecallError> {
        if let HtsReader::Indexed(reader) = &mut self.reader {
            reader.fetch(bam::FetchDefinition::All)?;
        }
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<AlignedRead>, BasecallError> {
        loop {
            match self.reader.read(&mut self.record) {
                None => return Ok(None),
                Some(result) => result?,
            }
            if self.record.tid() < 0 || self.record.is_unmapped() {
                continue;
            }
            return Ok(Some(convert_record(&self.record)));
        }
    }
}

fn convert_record(record: &bam::Record) -> AlignedRead {
    let cigar = record
        .cigar()
        .iter()
        .map(|op| match *op {
            Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
                CigarOp::new(CigarOpKind::Match, len)
            }
            Cigar::Ins(len) => CigarOp::new(CigarOpKind::Insertion, len),
            Cigar::Del(len) => CigarOp::new(CigarOpKind::Deletion, len),
            Cigar::RefSkip(len) => CigarOp::new(CigarOpKind::Skip, len),
            Cigar::SoftClip(len) => CigarOp::new(CigarOpKind::SoftClip, len),
            Cigar::HardClip(len) => CigarOp::new(CigarOpKind::HardClip, len),
            Cigar::Pad(len) => CigarOp::new(CigarOpKind::Padding, len),
        })
        .collect();

    let mut sequence = record.seq().as_bytes();
    sequence.make_ascii_uppercase();

    AlignedRead {
        tid: record.tid() as u32,
        name: Arc::from(String::from_utf8_lossy(record.qname()).as_ref()),
        pos: record.pos() as u32,
        flags: record.flags(),
        cigar,
        sequence: Arc::from(sequence),
        qualities: Arc::from(record.qual()),
        is_reverse: record.is_reverse(),
        multiplicity: multiplicity(record),
    }
}

/// `IH` tag as a count; absent or non-integer tags give `None`.
fn multiplicity(record: &bam::Record) -> Option<u32> {
    match record.aux(b"IH").ok()? {
        Aux::U8(v) => Some(u32::from(v)),
        Aux::U16(v) => Some(u32::from(v)),
        Aux::U32(v) => Some(v),
        Aux::I8(v) => u32::try_from(v).ok(),
        Aux::I16(v) => u32::try_from(v).ok(),
        Aux::I32(v) => u32::try_from(v).ok(),
        _ => None,
    }
}

/// Sorted alignments held in memory; fetch semantics match htslib's overlap
/// queries.
#[derive(Debug, Clone, Default)]
pub struct VecAlignmentSource {
    names: Vec<Arc<str>>,
    reads: Vec<AlignedRead>,
    selection: Vec<usize>,
    cursor: usize,
}

impl VecAlignmentSource {
    /// Create a source from contig names and reads in coordinate order.
    pub fn new<N: AsRef<str>>(names: &[N], reads: Vec<AlignedRead>) -> Self {
        Self {
            names: names.iter().map(|n| Arc::from(n.as_ref())).collect(),
            reads,
            selection: Vec::new(),
            cursor: 0,
        }
    }
}

impl AlignmentSource for VecAlignmentSource {
    fn target_count(&self) -> u32 {
        self.names.len() as u32
    }

    fn reference_name(&self, tid: u32) -> Option<Arc<str>> {
        self.names.get(tid as usize).cloned()
    }

    fn tid(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n.as_ref() == name)
            .map(|idx| idx as u32)
    }

    fn fetch(&mut self, tid: u32, start: u32, end: u32) -> Result<(), BasecallError> {
        self.selection = self
            .reads
            .iter()
            .enumerate()
            .filter(|(_, read)| {
                let read_end = read.end().max(u64::from(read.pos) + 1);
                read.tid == tid && read.pos < end && read_end > u64::from(start)
            })
            .map(|(idx, _)| idx)
            .collect();
        self.cursor = 0;
        Ok(())
    }

    fn fetch_all(&mut self) -> Result<(), BasecallError> {
        self.selection = (0..self.reads.len()).collect();
        self.cursor = 0;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<AlignedRead>, BasecallError> {
        let Some(&idx) = self.selection.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some(self.reads[idx].clone()))
    }
}
