#[path = "common/mod.rs"]
mod common;

use basecall::genomics::{render_rows, OutputColumns};
use basecall::{BasecallConfig, Region, Regions};
use common::{call_rows, read, reverse};

fn reference_scenario() -> Vec<basecall::AlignedRead> {
    // ten A, two C, one G at position 5 (1-based)
    let mut reads = Vec::new();
    for i in 0..13u32 {
        let base = match i {
            0..=9 => b'A',
            10 | 11 => b'C',
            _ => b'G',
        };
        let seq = [b'T', b'T', b'T', b'T', base, b'T'];
        let r = read(0, &format!("r{i}"), 0, "6M", &seq);
        reads.push(if i % 2 == 0 { r } else { reverse(r) });
    }
    reads
}

#[test]
fn reference_scenario_calls_consensus_and_minor() {
    let (rows, summary) =
        call_rows(&["chr1"], reference_scenario(), BasecallConfig::default(), None);
    assert_eq!(summary.rows, 6);
    let row = &rows[4];
    assert_eq!(row.position, 5);
    assert_eq!(row.coverage, 13);
    assert_eq!(row.base_counts, [10, 2, 1, 0, 0]);
    assert_eq!(row.call.consensus, "A");
    assert_eq!(row.call.minor, "C");
    assert_eq!(row.heterozygosity, None);
    assert_eq!(row.reference, b'N');
}

#[cfg(feature = "hettest")]
#[test]
fn heterozygosity_column_matches_reference_table() {
    let config = BasecallConfig::default().with_het_test(true);
    let (rows, _) = call_rows(&["chr1"], reference_scenario(), config, None);
    let p = rows[4].heterozygosity.expect("het column requested");
    assert!((p - 0.373).abs() < 1e-3, "p={p}");
    // homozygous positions have no minor call
    assert_eq!(rows[0].heterozygosity, Some(1.0));
}

#[test]
fn strand_columns_report_minor_strand_share() {
    let config = BasecallConfig::default().with_show_strand(true);
    let (rows, _) = call_rows(&["chr1"], reference_scenario(), config, None);
    let strand = rows[4].strand.as_ref().expect("strand requested");
    // reads 0,2,4,6,8 are plus among the ten A calls
    assert!((strand.minor_fractions[0] - 0.5).abs() < 1e-12);
    // C calls come from read 10 (plus) and read 11 (minus)
    assert!((strand.minor_fractions[1] - 0.5).abs() < 1e-12);
    // the single G call is plus-only
    assert_eq!(strand.minor_fractions[2], 0.0);
    assert_eq!(strand.minor_fractions[3], 0.0);
    assert!((strand.plus_fraction - 7.0 / 13.0).abs() < 1e-12);
    for fraction in strand.minor_fractions {
        assert!((0.0..=0.5).contains(&fraction));
    }
}

#[test]
fn indels_and_multiplicity_flow_into_rows() {
    let reads = vec![
        read(0, "del", 0, "2M2D2M", b"ACGT").with_multiplicity(4),
        read(0, "ins", 0, "2M2I2M", b"ACTTGT").with_multiplicity(2),
        read(0, "plain", 0, "6M", b"ACAAGT"),
    ];
    let (rows, _) = call_rows(&["chr1"], reads, BasecallConfig::default(), None);
    let positions: Vec<u32> = rows.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4, 5, 6]);

    // the insertion anchors on position 2 (1-based)
    assert_eq!(rows[1].insertion_total, 1);
    assert_eq!(rows[1].insertions, vec![("TT".to_string(), 1)]);
    // del read (4) + plain read (1) matches + ins read (2) match and insertion
    assert!((rows[1].average_mappings - (4.0 + 2.0 + 2.0 + 1.0) / 4.0).abs() < 1e-12);

    // deleted positions count deletions, not coverage
    assert_eq!(rows[2].deletions, 1);
    assert_eq!(rows[2].coverage, 2);
}

#[test]
fn coverage_threshold_and_mask_filter_rows() {
    let reads = vec![
        read(0, "a", 0, "3M", b"AAA"),
        read(0, "b", 1, "3M", b"AAA"),
        read(0, "dup", 1, "3M", b"CCC").with_flags(0x400),
    ];
    let config = BasecallConfig::default().with_min_coverage(2);
    let (rows, _) = call_rows(&["chr1"], reads, config, None);
    let positions: Vec<u32> = rows.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![2, 3]);
    assert!(rows.iter().all(|r| r.base_counts[1] == 0));
}

#[test]
fn single_region_argument_behaves_like_region_list() {
    let reads = vec![read(0, "a", 0, "10M", b"ACGTACGTAC")];
    let single = Regions::from_region_str("chr1:3-5").unwrap();
    let list = Regions::new(vec![Region::new("chr1", 2, 5)]).unwrap();

    let (from_single, _) =
        call_rows(&["chr1"], reads.clone(), BasecallConfig::default(), Some(&single));
    let (from_list, _) = call_rows(&["chr1"], reads, BasecallConfig::default(), Some(&list));
    assert_eq!(from_single, from_list);
    let positions: Vec<u32> = from_single.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![3, 4, 5]);
}

#[test]
fn rendered_output_has_one_line_per_row() {
    let columns = OutputColumns {
        heterozygosity: false,
        strand: true,
    };
    let config = BasecallConfig::default().with_show_strand(true);
    let (rows, _) = call_rows(&["chr1"], reference_scenario(), config, None);
    let text = render_rows(&rows, columns).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 7);
    assert!(lines[5].starts_with("chr1\t5\tN\t13\tA\tC\t1.0000\t"));
    assert!(lines.iter().all(|l| l.split('\t').count() == 25));
}
