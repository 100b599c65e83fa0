use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::genomics::output::StrandBias;
use crate::genomics::{
    average_multiplicity, consensus_call, expand_read, plus_strand_fraction, AlignmentSource,
    BufferError, PendingPosition, PositionAggregate, PositionAggregator, PositionBuffer,
    PositionRow, ReferenceSource, Region, Regions, StatsCache,
};
use crate::util::AbortCheck;
use crate::{BasecallConfig, BasecallError, RunSummary};

const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Turns released positions into rows: filtering, statistics and reference lookup.
struct RowBuilder {
    config: BasecallConfig,
    aggregator: PositionAggregator,
    reference: Box<dyn ReferenceSource>,
    cache: StatsCache,
    names: Vec<Arc<str>>,
}

impl RowBuilder {
    fn contig_name(&self, tid: u32) -> Arc<str> {
        self.names
            .get(tid as usize)
            .cloned()
            .unwrap_or_else(|| Arc::from(tid.to_string()))
    }

    /// Whether an aggregate produces an output row.
    fn accepts(&self, aggregate: &PositionAggregate) -> bool {
        aggregate.reportable_depth() > 0 || (self.config.show_gaps && aggregate.gaps > 0)
    }

    fn build(&mut self, aggregate: PositionAggregate) -> Result<PositionRow, BasecallError> {
        let contig = self.contig_name(aggregate.tid);
        let reference = self.reference.base_at(&contig, aggregate.position - 1);
        let acgt = aggregate.acgt();
        let [a, c, g, t] = acgt;

        let heterozygosity = if self.config.het_test {
            Some(self.cache.heterozygosity(acgt)?)
        } else {
            None
        };

        let mut insertions: Vec<(String, u32)> = aggregate
            .insertions
            .iter()
            .map(|(sequence, &count)| (sequence.clone(), count))
            .collect();
        // BTreeMap order is by sequence, so a stable sort leaves ties alphabetical
        insertions.sort_by(|x, y| y.1.cmp(&x.1));

        let strand = self.config.show_strand.then(|| StrandBias {
            plus_fraction: plus_strand_fraction(&aggregate.observations),
            minor_fractions: aggregate.strand_fractions,
        });

        Ok(PositionRow {
            contig,
            position: aggregate.position,
            reference,
            coverage: aggregate.total,
            call: consensus_call(self.config.minor_pct, a, c, g, t),
            average_mappings: average_multiplicity(&aggregate.observations),
            heterozygosity,
            entropy: self.cache.entropy(acgt),
            base_counts: aggregate.base_counts,
            deletions: aggregate.deletions,
            gaps: aggregate.gaps,
            insertion_total: aggregate.insertion_total(),
            insertions,
            strand,
        })
    }
}

/// Single-pass driver: pulls records from an [`AlignmentSource`], buffers
/// their observations and hands every accepted position to a sink as a
/// [`PositionRow`], in coordinate order.
pub struct BaseCaller<S: AlignmentSource> {
    source: S,
    rows: RowBuilder,
}

impl<S: AlignmentSource + std::fmt::Debug> std::fmt::Debug for BaseCaller<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseCaller")
            .field("source", &self.source)
            .field("config", &self.rows.config)
            .finish()
    }
}

/// State carried through one fetch.
struct Pass<'a> {
    region: Option<&'a Region>,
    summary: &'a mut RunSummary,
}

impl<S: AlignmentSource> BaseCaller<S> {
    /// Create a caller after validating `config`.
    pub fn new(
        source: S,
        reference: Box<dyn ReferenceSource>,
        config: BasecallConfig,
    ) -> Result<Self, BasecallError> {
        config.validate()?;
        let names = (0..source.target_count())
            .map(|tid| {
                source
                    .reference_name(tid)
                    .unwrap_or_else(|| Arc::from(tid.to_string()))
            })
            .collect();
        Ok(Self {
            source,
            rows: RowBuilder {
                aggregator: PositionAggregator::new(&config),
                config,
                reference,
                cache: StatsCache::new(),
                names,
            },
        })
    }

    /// Run configuration.
    pub fn config(&self) -> &BasecallConfig {
        &self.rows.config
    }

    /// Process the whole input (`regions == None`) or each region in turn,
    /// passing rows to `sink` until the input ends or `abort` fires.
    pub fn run<F>(
        &mut self,
        regions: Option<&Regions>,
        abort: &mut dyn AbortCheck,
        mut sink: F,
    ) -> Result<RunSummary, BasecallError>
    where
        F: FnMut(PositionRow) -> Result<(), BasecallError>,
    {
        let mut summary = RunSummary::default();

        match regions {
            None => {
                info!("calling bases across the whole file");
                self.source.fetch_all()?;
                let mut pass = Pass {
                    region: None,
                    summary: &mut summary,
                };
                self.process(&mut pass, abort, &mut sink)?;
            }
            Some(regions) => {
                info!(
                    regions = regions.len(),
                    span = regions.total_span(),
                    "calling bases across regions"
                );
                for region in regions {
                    let Some(tid) = self.source.tid(&region.contig) else {
                        warn!(contig = %region.contig, "region contig not present in alignments; skipping");
                        summary.missing_regions += 1;
                        continue;
                    };
                    debug!(
                        contig = %region.contig,
                        start = region.start,
                        end = region.end,
                        "fetching region"
                    );
                    self.source.fetch(tid, region.start, region.end)?;
                    let mut pass = Pass {
                        region: Some(region),
                        summary: &mut summary,
                    };
                    if self.process(&mut pass, abort, &mut sink)?.is_break() {
                        break;
                    }
                }
            }
        }

        if summary.aborted {
            warn!(rows = summary.rows, "time budget exhausted; output is partial");
        }
        info!(
            records = summary.records,
            positions = summary.positions,
            rows = summary.rows,
            "base calling finished"
        );
        Ok(summary)
    }

    fn process<F>(
        &mut self,
        pass: &mut Pass<'_>,
        abort: &mut dyn AbortCheck,
        sink: &mut F,
    ) -> Result<ControlFlow<()>, BasecallError>
    where
        F: FnMut(PositionRow) -> Result<(), BasecallError>,
    {
        let mut buffer = PositionBuffer::new(self.rows.config.max_span);
        let mut last: Option<(u32, u32)> = None;
        let mut finished: HashSet<u32> = HashSet::new();

        while let Some(read) = self.source.next_record()? {
            pass.summary.records += 1;
            if pass.summary.records % PROGRESS_INTERVAL == 0 {
                info!(
                    records = pass.summary.records,
                    rows = pass.summary.rows,
                    contig = %self.rows.contig_name(read.tid),
                    pos = read.pos + 1,
                    buffered = buffer.len(),
                    "progress"
                );
            }

            if let Some((tid, pos)) = last {
                if tid == read.tid && read.pos < pos {
                    return Err(BasecallError::UnsortedInput {
                        read: read.name.to_string(),
                        contig: self.rows.contig_name(read.tid).to_string(),
                        pos: read.pos + 1,
                        previous: pos + 1,
                    });
                }
                if tid != read.tid {
                    finished.insert(tid);
                    if finished.contains(&read.tid) {
                        return Err(BasecallError::ContigOrder {
                            read: read.name.to_string(),
                            contig: self.rows.contig_name(read.tid).to_string(),
                            previous: self.rows.contig_name(tid).to_string(),
                        });
                    }
                }
            }
            last = Some((read.tid, read.pos));

            if buffer.tid().is_some_and(|tid| tid != read.tid) {
                debug!(
                    from = %self.rows.contig_name(buffer.tid().unwrap_or_default()),
                    to = %self.rows.contig_name(read.tid),
                    "contig changed; flushing buffer"
                );
                while let Some(pending) = buffer.pop_front() {
                    if self.emit(pending, pass, abort, sink)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
            }

            while let Some(pending) = buffer.pop_before(read.pos) {
                if self.emit(pending, pass, abort, sink)?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }

            let span = buffer.required_span(read.pos, read.end());
            if span > u64::from(self.rows.config.max_span) {
                return Err(BasecallError::BufferSpanExceeded {
                    read: read.name.to_string(),
                    span,
                    limit: self.rows.config.max_span,
                });
            }

            let read = Arc::new(read);
            let observations =
                expand_read(&read).map_err(|source| BasecallError::MalformedRecord {
                    read: read.name.to_string(),
                    contig: self.rows.contig_name(read.tid).to_string(),
                    pos: read.pos + 1,
                    source,
                })?;
            buffer
                .push(read.tid, observations)
                .map_err(|err| self.buffer_error(err, &read))?;
        }

        while let Some(pending) = buffer.pop_front() {
            if self.emit(pending, pass, abort, sink)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn emit<F>(
        &mut self,
        pending: PendingPosition,
        pass: &mut Pass<'_>,
        abort: &mut dyn AbortCheck,
        sink: &mut F,
    ) -> Result<ControlFlow<()>, BasecallError>
    where
        F: FnMut(PositionRow) -> Result<(), BasecallError>,
    {
        pass.summary.positions += 1;
        let Some(aggregate) = self.rows.aggregator.aggregate(pending, pass.region) else {
            return Ok(ControlFlow::Continue(()));
        };
        if !self.rows.accepts(&aggregate) {
            return Ok(ControlFlow::Continue(()));
        }
        if abort.should_abort() {
            pass.summary.aborted = true;
            return Ok(ControlFlow::Break(()));
        }

        let row = self.rows.build(aggregate)?;
        sink(row)?;
        pass.summary.rows += 1;
        Ok(ControlFlow::Continue(()))
    }

    fn buffer_error(&self, err: BufferError, read: &crate::genomics::AlignedRead) -> BasecallError {
        match err {
            BufferError::SpanExceeded { span } => BasecallError::BufferSpanExceeded {
                read: read.name.to_string(),
                span,
                limit: self.rows.config.max_span,
            },
            BufferError::BehindFront { front, .. } => BasecallError::UnsortedInput {
                read: read.name.to_string(),
                contig: self.rows.contig_name(read.tid).to_string(),
                pos: read.pos + 1,
                previous: front + 1,
            },
            BufferError::ContigMismatch { pending, .. } => BasecallError::ContigOrder {
                read: read.name.to_string(),
                contig: self.rows.contig_name(read.tid).to_string(),
                previous: self.rows.contig_name(pending).to_string(),
            },
        }
    }
}
