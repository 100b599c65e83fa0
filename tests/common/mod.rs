#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use basecall::genomics::{
    AlignedRead, CigarOp, CigarOpKind, NoReference, PositionRow, VecAlignmentSource,
};
use basecall::{BaseCaller, BasecallConfig, NeverAbort, Regions, RunSummary};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("BASECALL_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set BASECALL_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// Parse a compact CIGAR such as `3M1I2D4M`.
pub fn cigar(text: &str) -> Vec<CigarOp> {
    let mut ops = Vec::new();
    let mut len = 0u32;
    for ch in text.chars() {
        if let Some(digit) = ch.to_digit(10) {
            len = len * 10 + digit;
            continue;
        }
        let kind = match ch {
            'M' | '=' | 'X' => CigarOpKind::Match,
            'I' => CigarOpKind::Insertion,
            'D' => CigarOpKind::Deletion,
            'N' => CigarOpKind::Skip,
            'S' => CigarOpKind::SoftClip,
            'H' => CigarOpKind::HardClip,
            'P' => CigarOpKind::Padding,
            other => panic!("unknown CIGAR op {other}"),
        };
        ops.push(CigarOp::new(kind, len));
        len = 0;
    }
    ops
}

pub fn read(tid: u32, name: &str, pos: u32, cigar_text: &str, seq: &[u8]) -> AlignedRead {
    AlignedRead::new(
        tid,
        name,
        pos,
        cigar(cigar_text),
        seq.to_vec(),
        vec![30; seq.len()],
        false,
    )
}

pub fn reverse(read: AlignedRead) -> AlignedRead {
    let flags = read.flags | 0x10;
    read.with_flags(flags)
}

pub fn call_rows(
    names: &[&str],
    reads: Vec<AlignedRead>,
    config: BasecallConfig,
    regions: Option<&Regions>,
) -> (Vec<PositionRow>, RunSummary) {
    let source = VecAlignmentSource::new(names, reads);
    let mut caller =
        BaseCaller::new(source, Box::new(NoReference), config).expect("valid configuration");
    let mut rows = Vec::new();
    let summary = caller
        .run(regions, &mut NeverAbort, |row| {
            rows.push(row);
            Ok(())
        })
        .expect("base calling succeeds");
    (rows, summary)
}
