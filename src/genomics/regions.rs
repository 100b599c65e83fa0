//! Region restriction: a single `chrom:start-end` argument or a BED file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::BasecallError;

/// Half-open, 0-based reference interval on a named contig.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Region {
    /// Contig name.
    pub contig: String,
    /// First included position (0-based).
    pub start: u32,
    /// First excluded position (0-based).
    pub end: u32,
}

impl Region {
    /// Construct a region from 0-based half-open coordinates.
    pub fn new(contig: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            contig: contig.into(),
            start,
            end,
        }
    }

    /// Whether the 0-based position lies inside the region.
    pub fn contains(&self, pos: u32) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Number of positions covered.
    pub fn span(&self) -> u64 {
        u64::from(self.end.saturating_sub(self.start))
    }

    /// Parse `chrom`, `chrom:pos` or `chrom:start-end` (1-based, inclusive,
    /// thousands separators allowed). A bare contig name covers the whole contig.
    pub fn parse(text: &str) -> Result<Self, BasecallError> {
        let invalid = |reason: &str| BasecallError::InvalidRegion {
            region: text.to_string(),
            reason: reason.to_string(),
        };

        let text_trimmed = text.trim();
        let Some((contig, bounds)) = text_trimmed.rsplit_once(':') else {
            if text_trimmed.is_empty() {
                return Err(invalid("empty region"));
            }
            return Ok(Self::new(text_trimmed, 0, u32::MAX));
        };
        if contig.is_empty() {
            return Err(invalid("missing contig name"));
        }

        let parse_coord = |raw: &str| -> Result<u32, BasecallError> {
            raw.replace(',', "")
                .parse::<u32>()
                .map_err(|_| invalid("coordinates must be positive integers"))
        };

        let (start1, end1) = match bounds.split_once('-') {
            Some((start, end)) => (parse_coord(start)?, parse_coord(end)?),
            None => {
                let pos = parse_coord(bounds)?;
                (pos, pos)
            }
        };
        if start1 == 0 || end1 < start1 {
            return Err(invalid("coordinates are 1-based and start must not exceed end"));
        }
        Ok(Self::new(contig, start1 - 1, end1))
    }
}

/// Ordered list of regions to report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Regions {
    regions: Vec<Region>,
}

impl Regions {
    /// Build from regions that are sorted and non-overlapping within each contig.
    pub fn new(regions: Vec<Region>) -> Result<Self, BasecallError> {
        for pair in regions.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.contig == next.contig && next.start < prev.end {
                return Err(BasecallError::InvalidRegion {
                    region: format!("{}:{}-{}", next.contig, next.start + 1, next.end),
                    reason: format!(
                        "regions must be sorted and non-overlapping (previous ends at {})",
                        prev.end
                    ),
                });
            }
        }
        Ok(Self { regions })
    }

    /// A single-region list.
    pub fn single(region: Region) -> Self {
        Self {
            regions: vec![region],
        }
    }

    /// Parse a single region argument into a one-element list.
    pub fn from_region_str(text: &str) -> Result<Self, BasecallError> {
        Region::parse(text).map(Self::single)
    }

    /// Read a BED file.
    pub fn from_bed_path(path: impl AsRef<Path>) -> Result<Self, BasecallError> {
        let file = File::open(path.as_ref())?;
        Self::from_bed_reader(BufReader::new(file))
    }

    /// Read BED records (first three columns) from any buffered reader.
    ///
    /// Blank, `#`, `track` and `browser` lines are skipped.
    pub fn from_bed_reader<R: BufRead>(reader: R) -> Result<Self, BasecallError> {
        let mut regions = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim_end();
            if trimmed.is_empty()
                || trimmed.starts_with('#')
                || trimmed.starts_with("track")
                || trimmed.starts_with("browser")
            {
                continue;
            }

            let invalid = |reason: &str| BasecallError::InvalidRegion {
                region: format!("line {}: {}", line_no + 1, trimmed),
                reason: reason.to_string(),
            };
            let mut fields = trimmed.split('\t');
            let (Some(contig), Some(start), Some(end)) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(invalid("expected at least three tab-separated columns"));
            };
            let start: u32 = start
                .trim()
                .parse()
                .map_err(|_| invalid("start is not an integer"))?;
            let end: u32 = end
                .trim()
                .parse()
                .map_err(|_| invalid("end is not an integer"))?;
            if end < start {
                return Err(invalid("end precedes start"));
            }
            regions.push(Region::new(contig, start, end));
        }
        Self::new(regions)
    }

    /// Regions in report order.
    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sum of region spans, used for progress reporting.
    pub fn total_span(&self) -> u64 {
        self.regions.iter().map(Region::span).sum()
    }
}

impl<'a> IntoIterator for &'a Regions {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn parses_region_forms() {
        assert_eq!(
            Region::parse("chr1:1,001-2,000").unwrap(),
            Region::new("chr1", 1000, 2000)
        );
        assert_eq!(Region::parse("chrM:42").unwrap(), Region::new("chrM", 41, 42));
        assert_eq!(Region::parse("chr2").unwrap(), Region::new("chr2", 0, u32::MAX));
        assert_eq!(
            Region::parse("HLA-A*01:01:10-20").unwrap(),
            Region::new("HLA-A*01:01", 9, 20)
        );
    }

    #[test]
    fn rejects_bad_regions() {
        for text in ["", ":1-2", "chr1:0-5", "chr1:9-5", "chr1:a-b"] {
            assert!(
                matches!(Region::parse(text), Err(BasecallError::InvalidRegion { .. })),
                "{text} should be rejected"
            );
        }
    }

    #[test]
    fn single_region_is_a_one_element_list() {
        let regions = Regions::from_region_str("chr1:11-20").unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions.total_span(), 10);
    }

    #[test]
    fn reads_bed_with_comments_and_extra_columns() {
        let bed = "# header\ntrack name=x\nchr1\t10\t20\tname\t0\t+\nchr1\t30\t35\nchr2\t0\t5\n";
        let regions = Regions::from_bed_reader(Cursor::new(bed)).unwrap();
        let collected: Vec<&Region> = regions.iter().collect();
        assert_eq!(
            collected,
            vec![
                &Region::new("chr1", 10, 20),
                &Region::new("chr1", 30, 35),
                &Region::new("chr2", 0, 5),
            ]
        );
        assert_eq!(regions.total_span(), 20);
    }

    #[test]
    fn rejects_overlapping_bed_records() {
        let bed = "chr1\t10\t20\nchr1\t15\t25\n";
        assert!(Regions::from_bed_reader(Cursor::new(bed)).is_err());
    }

    #[test]
    fn rejects_short_bed_lines() {
        let bed = "chr1\t10\n";
        assert!(Regions::from_bed_reader(Cursor::new(bed)).is_err());
    }

    #[test]
    fn reads_bed_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chrX\t100\t200").unwrap();
        let regions = Regions::from_bed_path(file.path()).unwrap();
        assert_eq!(regions.iter().next(), Some(&Region::new("chrX", 100, 200)));
    }
}
