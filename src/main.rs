use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use basecall::genomics::{
    FastaReference, HtslibAlignmentSource, NoReference, OutputColumns, ReferenceSource, Regions,
    RowWriter,
};
use basecall::{
    init_tracing, AbortCheck, BaseCaller, BasecallConfig, NeverAbort, TimeBudget,
    DEFAULT_FILTER_MASK, DEFAULT_MAX_SPAN, DEFAULT_MINOR_PCT,
};
use clap::Parser;
use tracing::info;

/// Per-position base calls, entropy and strand bias from a sorted BAM file.
///
/// Writes one tab-delimited row per covered position: reference base,
/// coverage, consensus and minor calls, average read multiplicity, entropy,
/// base/deletion/gap/insertion counts and the inserted sequences.
#[derive(Parser, Debug)]
#[command(name = "basecall", version)]
struct Cli {
    /// Coordinate-sorted BAM/SAM/CRAM file (indexed when a region is given).
    bam: PathBuf,

    /// Restrict output to one region: chrom, chrom:pos or chrom:start-end (1-based).
    #[arg(conflicts_with = "bed")]
    region: Option<String>,

    /// Indexed FASTA used for the reference column.
    #[arg(long = "ref", value_name = "FASTA")]
    reference: Option<PathBuf>,

    /// Minimum base quality (Phred) for matches and insertions.
    #[arg(long = "qual", default_value_t = 0)]
    min_base_quality: u8,

    /// Minimum qualifying coverage for a position to be reported.
    #[arg(long = "count", default_value_t = 0)]
    min_coverage: u32,

    /// SAM flag bits that exclude a read's matches and insertions.
    #[arg(long, default_value_t = DEFAULT_FILTER_MASK)]
    mask: u16,

    /// Minimum minor-call count as a fraction of the consensus count.
    #[arg(long, default_value_t = DEFAULT_MINOR_PCT)]
    minor_pct: f64,

    /// Add a heterozygosity p-value column (Fisher's exact test).
    #[arg(long)]
    het_test: bool,

    /// Report positions covered only by gaps/splice junctions.
    #[arg(long)]
    show_gaps: bool,

    /// Add plus-strand and per-call minor-strand percentage columns.
    #[arg(long)]
    show_strand: bool,

    /// Only report positions inside these BED intervals (sorted, non-overlapping).
    #[arg(long, value_name = "BED")]
    bed: Option<PathBuf>,

    /// Output file, `-` for stdout.
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Stop emitting after this many seconds, keeping rows written so far.
    #[arg(long, value_name = "SECS")]
    time_limit: Option<u64>,

    /// htslib decompression threads.
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Largest reference span held in memory at once.
    #[arg(long, default_value_t = DEFAULT_MAX_SPAN)]
    max_span: u32,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.quiet { "warn" } else { "info" });

    let config = BasecallConfig::default()
        .with_min_base_quality(cli.min_base_quality)
        .with_min_coverage(cli.min_coverage)
        .with_filter_mask(cli.mask)
        .with_minor_pct(cli.minor_pct)
        .with_het_test(cli.het_test)
        .with_show_gaps(cli.show_gaps)
        .with_show_strand(cli.show_strand)
        .with_max_span(cli.max_span);
    config.validate().context("invalid options")?;

    let regions = load_regions(&cli)?;
    let source = HtslibAlignmentSource::open(&cli.bam, regions.is_some(), cli.threads)
        .with_context(|| format!("failed to open alignments {}", cli.bam.display()))?;
    let reference: Box<dyn ReferenceSource> = match &cli.reference {
        Some(path) => Box::new(
            FastaReference::open(path)
                .with_context(|| format!("failed to open reference {}", path.display()))?,
        ),
        None => Box::new(NoReference),
    };

    let mut abort: Box<dyn AbortCheck> = match cli.time_limit {
        Some(secs) => Box::new(TimeBudget::new(Duration::from_secs(secs))),
        None => Box::new(NeverAbort),
    };

    let columns = OutputColumns::from(&config);
    let mut writer = RowWriter::new(open_output(&cli.output)?, columns);
    writer.write_header()?;

    let mut caller = BaseCaller::new(source, reference, config)?;
    let summary = caller
        .run(regions.as_ref(), abort.as_mut(), |row| writer.write_row(&row))
        .with_context(|| format!("base calling failed for {}", cli.bam.display()))?;
    writer.finish().context("failed to flush output")?;

    info!(
        rows = summary.rows,
        aborted = summary.aborted,
        output = %cli.output,
        "done"
    );
    Ok(())
}

fn load_regions(cli: &Cli) -> Result<Option<Regions>> {
    if let Some(path) = &cli.bed {
        let regions = Regions::from_bed_path(path)
            .with_context(|| format!("failed to read BED file {}", path.display()))?;
        return Ok(Some(regions));
    }
    cli.region
        .as_deref()
        .map(Regions::from_region_str)
        .transpose()
        .context("invalid region")
}

fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    let file = File::create(path).with_context(|| format!("failed to create output {path}"))?;
    Ok(Box::new(BufWriter::new(file)))
}
