use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use crate::genomics::{ConsensusCall, NUM_BASES, NUM_CATEGORIES};
use crate::{BasecallConfig, BasecallError};

const BASE_COLUMNS: &str = "chrom\tpos\tref\tcount\tconsensus call\tminor call\tave mappings";
const COUNT_COLUMNS: &str = "entropy\tA\tC\tG\tT\tN\tDeletions\tGaps\tInsertions\tInserts";
const STRAND_COLUMNS: &str = "+ strand %\tA minor %\tC minor %\tG minor %\tT minor %\tN minor %\tDeletion minor %\tInsertion minor %";

/// Strand-bias columns for one position.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StrandBias {
    /// Share of all observations from plus-strand reads.
    pub plus_fraction: f64,
    /// Minor-strand fraction for A, C, G, T, N, deletions and insertions.
    pub minor_fractions: [f64; NUM_CATEGORIES],
}

/// Fully computed output record for one position.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PositionRow {
    /// Contig name.
    pub contig: Arc<str>,
    /// 1-based position.
    pub position: u32,
    /// Reference base, `N` when unknown.
    pub reference: u8,
    /// Qualifying match coverage.
    pub coverage: u32,
    /// Consensus and minor calls.
    pub call: ConsensusCall,
    /// Mean read multiplicity.
    pub average_mappings: f64,
    /// Heterozygosity p-value, when requested.
    pub heterozygosity: Option<f64>,
    /// Background-normalised entropy.
    pub entropy: f64,
    /// Counts for A, C, G, T and N.
    pub base_counts: [u32; NUM_BASES],
    /// Deletion count.
    pub deletions: u32,
    /// Gap count.
    pub gaps: u32,
    /// Insertion occurrences across all sequences.
    pub insertion_total: u32,
    /// Inserted sequences with counts, most frequent first.
    pub insertions: Vec<(String, u32)>,
    /// Strand-bias columns, when requested.
    pub strand: Option<StrandBias>,
}

/// Which optional columns a writer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputColumns {
    /// Heterozygosity p-value column.
    pub heterozygosity: bool,
    /// Strand-bias columns.
    pub strand: bool,
}

impl From<&BasecallConfig> for OutputColumns {
    fn from(config: &BasecallConfig) -> Self {
        Self {
            heterozygosity: config.het_test,
            strand: config.show_strand,
        }
    }
}

/// Tab-delimited header for the selected columns.
pub fn header_line(columns: OutputColumns) -> String {
    let mut line = String::from(BASE_COLUMNS);
    if columns.heterozygosity {
        line.push_str("\theterozygosity");
    }
    line.push('\t');
    line.push_str(COUNT_COLUMNS);
    if columns.strand {
        line.push('\t');
        line.push_str(STRAND_COLUMNS);
    }
    line
}

/// Render one row (without trailing newline) into `buffer`.
///
/// Fractions use four decimals, entropy six, p-values scientific notation.
pub fn format_row(row: &PositionRow, columns: OutputColumns, buffer: &mut String) {
    buffer.clear();
    let _ = write!(
        buffer,
        "{}\t{}\t{}\t{}\t{}\t{}\t{:.4}",
        row.contig,
        row.position,
        row.reference as char,
        row.coverage,
        row.call.consensus,
        row.call.minor,
        row.average_mappings
    );
    if columns.heterozygosity {
        match row.heterozygosity {
            Some(p) => {
                let _ = write!(buffer, "\t{p:.4e}");
            }
            None => buffer.push_str("\t."),
        }
    }
    let _ = write!(buffer, "\t{:.6}", row.entropy);
    for count in row.base_counts {
        let _ = write!(buffer, "\t{count}");
    }
    let _ = write!(
        buffer,
        "\t{}\t{}\t{}\t",
        row.deletions, row.gaps, row.insertion_total
    );
    for (idx, (sequence, count)) in row.insertions.iter().enumerate() {
        if idx > 0 {
            buffer.push('/');
        }
        let _ = write!(buffer, "{sequence}:{count}");
    }
    if columns.strand {
        let strand = row.strand.as_ref();
        let plus = strand.map_or(0.0, |s| s.plus_fraction);
        let _ = write!(buffer, "\t{plus:.4}");
        let minor = strand.map_or([0.0; NUM_CATEGORIES], |s| s.minor_fractions);
        for fraction in minor {
            let _ = write!(buffer, "\t{fraction:.4}");
        }
    }
}

/// Streams the header and rows to any writer.
#[derive(Debug)]
pub struct RowWriter<W: Write> {
    writer: W,
    columns: OutputColumns,
    line: String,
}

impl<W: Write> RowWriter<W> {
    /// Wrap a writer; nothing is written until [`write_header`](Self::write_header).
    pub fn new(writer: W, columns: OutputColumns) -> Self {
        Self {
            writer,
            columns,
            line: String::with_capacity(256),
        }
    }

    /// Write the column header.
    pub fn write_header(&mut self) -> Result<(), BasecallError> {
        self.writer.write_all(header_line(self.columns).as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write one row.
    pub fn write_row(&mut self, row: &PositionRow) -> Result<(), BasecallError> {
        format_row(row, self.columns, &mut self.line);
        self.line.push('\n');
        self.writer.write_all(self.line.as_bytes())?;
        Ok(())
    }

    /// Flush and return the inner writer.
    pub fn finish(mut self) -> Result<W, BasecallError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Render rows with a header into a string (useful for tests and snapshots).
pub fn render_rows(rows: &[PositionRow], columns: OutputColumns) -> Result<String, BasecallError> {
    let mut writer = RowWriter::new(Vec::new(), columns);
    writer.write_header()?;
    for row in rows {
        writer.write_row(row)?;
    }
    let bytes = writer.finish()?;
    String::from_utf8(bytes).map_err(|_| {
        BasecallError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "rendered rows are not valid UTF-8",
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> PositionRow {
        PositionRow {
            contig: Arc::from("chr1"),
            position: 101,
            reference: b'A',
            coverage: 13,
            call: ConsensusCall {
                consensus: "A".to_string(),
                minor: "C".to_string(),
            },
            average_mappings: 1.0,
            heterozygosity: Some(0.373),
            entropy: 0.5,
            base_counts: [10, 2, 1, 0, 0],
            deletions: 1,
            gaps: 0,
            insertion_total: 3,
            insertions: vec![("AT".to_string(), 2), ("G".to_string(), 1)],
            strand: Some(StrandBias {
                plus_fraction: 0.5,
                minor_fractions: [0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5],
            }),
        }
    }

    #[test]
    fn header_tracks_optional_columns() {
        let plain = header_line(OutputColumns::default());
        assert!(plain.starts_with("chrom\tpos\tref"));
        assert!(plain.ends_with("Inserts"));
        assert!(!plain.contains("heterozygosity"));

        let full = header_line(OutputColumns {
            heterozygosity: true,
            strand: true,
        });
        assert!(full.contains("ave mappings\theterozygosity\tentropy"));
        assert!(full.ends_with("Insertion minor %"));
        assert_eq!(full.split('\t').count(), 26);
    }

    #[test]
    fn formats_plain_row() {
        let mut buffer = String::new();
        format_row(&row(), OutputColumns::default(), &mut buffer);
        assert_eq!(
            buffer,
            "chr1\t101\tA\t13\tA\tC\t1.0000\t0.500000\t10\t2\t1\t0\t0\t1\t0\t3\tAT:2/G:1"
        );
    }

    #[test]
    fn formats_optional_columns() {
        let columns = OutputColumns {
            heterozygosity: true,
            strand: true,
        };
        let mut buffer = String::new();
        format_row(&row(), columns, &mut buffer);
        let fields: Vec<&str> = buffer.split('\t').collect();
        assert_eq!(fields.len(), 26);
        assert_eq!(fields[7], "3.7300e-1");
        assert_eq!(fields[18], "0.5000");
        assert_eq!(fields[25], "0.5000");
    }

    #[test]
    fn render_includes_header_and_rows() {
        let text = render_rows(&[row(), row()], OutputColumns::default()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
