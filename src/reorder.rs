//! Bounded order correction for near-sorted alignment streams.
//!
//! Aligner output is supposed to arrive sorted by chromosome and position
//! but often carries small local inversions. The buffer here admits records
//! that are not earlier than anything already released, holds them until no
//! earlier record can still arrive, and re-emits them in guaranteed order —
//! it corrects bounded local disorder, it does not re-sort an arbitrary
//! stream. Memory is capped: input whose disorder outruns the cap is judged
//! unrecoverable and reported as a fatal error.

use crate::chrom;
use crate::sam::Alignment;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::io::{self, Write};
use thiserror::Error;
use tracing::{debug, warn};

/// Initial pending-buffer capacity. Typical near-sorted streams stay well
/// inside this allocation.
pub const START_CAPACITY: usize = 4096;

/// Hard ceiling on pending records. Reaching it means the input's local
/// disorder exceeds what bounded buffering can correct; erroring out here
/// prevents runaway memory use on pathological streams.
pub const MAX_CAPACITY: usize = 524288;

/// Configuration for one stream's correction pass.
#[derive(Debug, Clone)]
pub struct ReorderConfig {
    /// Minimum mapping quality; lower-quality records are counted and
    /// discarded, never buffered.
    pub min_quality: u8,
    /// Initial pending-buffer capacity.
    pub start_capacity: usize,
    /// Hard maximum pending-record count; must be >= `start_capacity`.
    pub max_capacity: usize,
    /// How far the incoming position must advance past a buffered record
    /// before that record is released. 0 releases a record as soon as any
    /// strictly greater position arrives; larger values tolerate deeper
    /// local inversions at the cost of more buffering. Output order is
    /// guaranteed for any value — the window only decides how late an
    /// equal-or-later record may still be admitted.
    pub release_window: u64,
}

impl ReorderConfig {
    pub fn new(min_quality: u8) -> Self {
        Self {
            min_quality,
            start_capacity: START_CAPACITY,
            max_capacity: MAX_CAPACITY,
            release_window: 0,
        }
    }
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Fatal stream conditions. Any of these ends processing of the stream;
/// none of them is a per-record rejection.
#[derive(Error, Debug)]
pub enum ReorderError {
    #[error("alignment at {chrom}:{pos} is behind the released watermark position {previous}")]
    PositionRegression {
        chrom: String,
        pos: u64,
        previous: u64,
    },

    #[error("chromosome {chrom} arrived after {previous}; stream order is broken beyond the correction window")]
    ChromosomeRegression { chrom: String, previous: String },

    #[error("pending buffer reached its hard limit of {max} records; input disorder exceeds the correction window")]
    CapacityExceeded { max: usize },
}

/// Running statistics for one corrected stream. All counters are monotone
/// while the stream is processed.
#[derive(Debug, Clone)]
pub struct ReorderStats {
    /// Records offered to the buffer, including rejected ones.
    pub total: u64,
    /// Records that passed every filter and were released.
    pub reads_used: u64,
    /// Records rejected for the unmapped flag.
    pub unmapped: u64,
    /// Records rejected for quality below the minimum.
    pub discarded_low_quality: u64,
    /// Records still pending when the stream ended.
    pub trailing: u64,
    /// Trailing records that failed the quality filter at flush time.
    pub discarded_trailing: u64,
    /// Quality sum over released records.
    pub quality_sum: u64,
    /// Lowest released quality; meaningful once `reads_used > 0`.
    pub quality_min: u64,
    /// Highest released quality.
    pub quality_max: u64,
    /// Released records with quality equal to the minimum.
    pub at_minimum: u64,
    /// Released records with quality above the minimum.
    pub above_minimum: u64,
    /// Rejected records with quality below the minimum.
    pub below_minimum: u64,
    /// Quality sum over discarded records.
    pub discarded_quality_sum: u64,
    /// Lowest discarded quality; meaningful once a record was discarded.
    pub discarded_quality_min: u64,
    /// Highest discarded quality.
    pub discarded_quality_max: u64,
}

impl Default for ReorderStats {
    fn default() -> Self {
        Self {
            total: 0,
            reads_used: 0,
            unmapped: 0,
            discarded_low_quality: 0,
            trailing: 0,
            discarded_trailing: 0,
            quality_sum: 0,
            quality_min: u64::MAX,
            quality_max: 0,
            at_minimum: 0,
            above_minimum: 0,
            below_minimum: 0,
            discarded_quality_sum: 0,
            discarded_quality_min: u64::MAX,
            discarded_quality_max: 0,
        }
    }
}

impl ReorderStats {
    /// Mean quality over released records, 0.0 when none were released.
    pub fn mean_quality(&self) -> f64 {
        if self.reads_used == 0 {
            0.0
        } else {
            self.quality_sum as f64 / self.reads_used as f64
        }
    }

    /// Render a human-readable summary of the stream.
    pub fn write_summary<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut ryu = ryu::Buffer::new();
        let (qmin, qmax) = if self.reads_used > 0 {
            (self.quality_min, self.quality_max)
        } else {
            (0, 0)
        };
        writeln!(w, "Total alignments:     {}", self.total)?;
        writeln!(w, "Reads used:           {}", self.reads_used)?;
        writeln!(w, "Unmapped:             {}", self.unmapped)?;
        writeln!(w, "Discarded low-MAPQ:   {}", self.discarded_low_quality)?;
        writeln!(
            w,
            "Trailing:             {} ({} discarded)",
            self.trailing, self.discarded_trailing
        )?;
        writeln!(w, "MAPQ min/max:         {}/{}", qmin, qmax)?;
        writeln!(
            w,
            "MAPQ mean:            {}",
            ryu.format(self.mean_quality())
        )?;
        writeln!(
            w,
            "MAPQ below/at/above:  {}/{}/{}",
            self.below_minimum, self.at_minimum, self.above_minimum
        )
    }
}

/// The order-correction buffer. Single-owner, synchronous; callers feed one
/// stream per instance and must serialize all calls.
pub struct ReorderBuffer {
    config: ReorderConfig,
    pending: VecDeque<Alignment>,
    previous_rname: String,
    previous_pos: u64,
    stats: ReorderStats,
    near_capacity_warned: bool,
}

impl ReorderBuffer {
    pub fn new(config: ReorderConfig) -> Self {
        let start = config.start_capacity.min(config.max_capacity);
        Self {
            config,
            pending: VecDeque::with_capacity(start),
            previous_rname: String::new(),
            previous_pos: 0,
            stats: ReorderStats::default(),
            near_capacity_warned: false,
        }
    }

    /// Convenience constructor with default capacities and window.
    pub fn with_min_quality(min_quality: u8) -> Self {
        Self::new(ReorderConfig::new(min_quality))
    }

    /// Offer one record to the buffer.
    ///
    /// Returns the records this arrival released, in guaranteed
    /// (chromosome, position) order. Unmapped and low-quality records are
    /// counted and dropped. A record earlier than the watermark, or an
    /// arrival that would push the pending count past the hard maximum, is
    /// a fatal stream error.
    pub fn push(&mut self, aln: Alignment) -> Result<Vec<Alignment>, ReorderError> {
        self.stats.total += 1;

        if aln.is_unmapped() {
            self.stats.unmapped += 1;
            return Ok(Vec::new());
        }

        if aln.mapq < self.config.min_quality {
            self.note_discard(&aln);
            return Ok(Vec::new());
        }

        // Every record already committed to the output is at or before the
        // watermark; anything arriving behind it cannot be emitted in order.
        if !self.previous_rname.is_empty() {
            match chrom::cmp(&aln.rname, &self.previous_rname) {
                Ordering::Less => {
                    return Err(ReorderError::ChromosomeRegression {
                        chrom: aln.rname,
                        previous: self.previous_rname.clone(),
                    });
                }
                Ordering::Equal if aln.pos < self.previous_pos => {
                    return Err(ReorderError::PositionRegression {
                        chrom: aln.rname,
                        pos: aln.pos,
                        previous: self.previous_pos,
                    });
                }
                _ => {}
            }
        }

        if self.pending.len() >= self.config.max_capacity {
            return Err(ReorderError::CapacityExceeded {
                max: self.config.max_capacity,
            });
        }
        if !self.near_capacity_warned && self.pending.len() >= self.config.max_capacity / 2 {
            self.near_capacity_warned = true;
            warn!(
                pending = self.pending.len(),
                max = self.config.max_capacity,
                "pending buffer past half of its hard limit"
            );
        }

        let rname = aln.rname.clone();
        let pos = aln.pos;

        // Tail-scan insertion keeps the pending set ordered while preserving
        // arrival order among records at the same position. The stream is
        // near-sorted, so the scan rarely moves more than a few slots.
        let mut idx = self.pending.len();
        while idx > 0 && Self::order(&self.pending[idx - 1], pos, &rname) == Ordering::Greater {
            idx -= 1;
        }
        self.pending.insert(idx, aln);

        Ok(self.release_up_to(&rname, pos))
    }

    /// End the stream: flush every remaining record in ascending order and
    /// hand back the final statistics.
    pub fn finish(mut self) -> (Vec<Alignment>, ReorderStats) {
        let mut released = Vec::with_capacity(self.pending.len());
        while let Some(aln) = self.pending.pop_front() {
            self.stats.trailing += 1;
            if aln.mapq < self.config.min_quality {
                self.stats.discarded_trailing += 1;
                self.note_discard(&aln);
                continue;
            }
            self.note_release(&aln);
            released.push(aln);
        }
        if self.stats.trailing > 0 {
            debug!(
                trailing = self.stats.trailing,
                discarded = self.stats.discarded_trailing,
                "flushed trailing alignments at end of stream"
            );
        }
        (released, self.stats)
    }

    /// Statistics so far.
    pub fn stats(&self) -> &ReorderStats {
        &self.stats
    }

    /// Number of records currently pending.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The chromosome and position of the most recently released record,
    /// if any record has been released yet.
    pub fn watermark(&self) -> Option<(&str, u64)> {
        if self.previous_rname.is_empty() {
            None
        } else {
            Some((&self.previous_rname, self.previous_pos))
        }
    }

    #[inline]
    fn order(pending: &Alignment, pos: u64, rname: &str) -> Ordering {
        chrom::cmp(&pending.rname, rname).then(pending.pos.cmp(&pos))
    }

    /// Release every buffered record that the arrival at `rname:pos` proves
    /// safe: records on earlier chromosomes, and records on the same
    /// chromosome left behind by more than the release window.
    fn release_up_to(&mut self, rname: &str, pos: u64) -> Vec<Alignment> {
        let mut released = Vec::new();
        while let Some(front) = self.pending.front() {
            let safe = match chrom::cmp(&front.rname, rname) {
                Ordering::Less => true,
                Ordering::Equal => {
                    front.pos.saturating_add(self.config.release_window) < pos
                }
                Ordering::Greater => false,
            };
            if !safe {
                break;
            }
            let front = self.pending.pop_front().expect("front checked above");
            self.note_release(&front);
            released.push(front);
        }
        released
    }

    fn note_release(&mut self, aln: &Alignment) {
        self.previous_rname.clear();
        self.previous_rname.push_str(&aln.rname);
        self.previous_pos = aln.pos;

        let q = aln.mapq as u64;
        self.stats.reads_used += 1;
        self.stats.quality_sum += q;
        self.stats.quality_min = self.stats.quality_min.min(q);
        self.stats.quality_max = self.stats.quality_max.max(q);
        if aln.mapq == self.config.min_quality {
            self.stats.at_minimum += 1;
        } else {
            self.stats.above_minimum += 1;
        }
    }

    fn note_discard(&mut self, aln: &Alignment) {
        let q = aln.mapq as u64;
        self.stats.discarded_low_quality += 1;
        self.stats.below_minimum += 1;
        self.stats.discarded_quality_sum += q;
        self.stats.discarded_quality_min = self.stats.discarded_quality_min.min(q);
        self.stats.discarded_quality_max = self.stats.discarded_quality_max.max(q);
    }
}
