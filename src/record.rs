//! Feature record types for the progressive-field interval format.

use crate::chrom;
use std::cmp::Ordering;
use std::fmt;

/// Strand orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
    Unknown,
}

impl Strand {
    /// Parse a strand byte. Only `+`, `-`, and `.` are valid.
    #[inline]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'+' => Some(Strand::Forward),
            b'-' => Some(Strand::Reverse),
            b'.' => Some(Strand::Unknown),
            _ => None,
        }
    }

    /// The single-character text form.
    #[inline]
    pub fn as_char(&self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
            Strand::Unknown => '.',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// The thick-drawing sub-interval. Both bounds travel together: a record
/// either has the whole pair or neither half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thick {
    pub start: u64,
    pub end: u64,
}

/// One block of a multi-block feature: a size paired with a start offset.
///
/// Storing the pair in one element keeps the two lists the same length by
/// construction; a record cannot carry more sizes than starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub size: u64,
    pub start: u64,
}

/// A feature record with 3 required columns and up to 9 optional ones.
///
/// Coordinates are 0-based and half-open: `start` is inside the feature,
/// `end` is not. The optional groups form a strict left-to-right chain —
/// `name`, `score`, `strand`, the thick pair, `item_rgb`, the block list —
/// and a decoded record only ever populates a prefix of that chain. Records
/// assembled by hand may leave gaps; [`Feature::field_count`] and the encoder
/// both stop at the first absent group, so the gap simply truncates the
/// record's column span.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Feature {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub name: Option<String>,
    pub score: Option<u16>,
    pub strand: Option<Strand>,
    pub thick: Option<Thick>,
    pub item_rgb: Option<String>,
    pub blocks: Option<Vec<Block>>,
}

impl Feature {
    /// Create a minimal three-column record.
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
            ..Self::default()
        }
    }

    /// Number of columns this record spans, in 3..=12.
    ///
    /// Derived from group presence rather than stored, so it can never
    /// disagree with the fields themselves. Counting stops at the first
    /// absent group, matching the left-to-right structure of the format.
    pub fn field_count(&self) -> u8 {
        let mut count = 3;
        if self.name.is_none() {
            return count;
        }
        count += 1;
        if self.score.is_none() {
            return count;
        }
        count += 1;
        if self.strand.is_none() {
            return count;
        }
        count += 1;
        if self.thick.is_none() {
            return count;
        }
        count += 2;
        if self.item_rgb.is_none() {
            return count;
        }
        count += 1;
        if self.blocks.is_none() {
            return count;
        }
        count + 3
    }

    /// Feature length in bases.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// True for zero-length features.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for Feature {
    /// Canonical tab-delimited form: the required triple followed by every
    /// group up to the first absent one.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.chrom, self.start, self.end)?;
        let Some(ref name) = self.name else {
            return Ok(());
        };
        write!(f, "\t{}", name)?;
        let Some(score) = self.score else {
            return Ok(());
        };
        write!(f, "\t{}", score)?;
        let Some(strand) = self.strand else {
            return Ok(());
        };
        write!(f, "\t{}", strand)?;
        let Some(thick) = self.thick else {
            return Ok(());
        };
        write!(f, "\t{}\t{}", thick.start, thick.end)?;
        let Some(ref rgb) = self.item_rgb else {
            return Ok(());
        };
        write!(f, "\t{}", rgb)?;
        let Some(ref blocks) = self.blocks else {
            return Ok(());
        };
        write!(f, "\t{}\t", blocks.len())?;
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", block.size)?;
        }
        write!(f, "\t")?;
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", block.start)?;
        }
        Ok(())
    }
}

impl Ord for Feature {
    fn cmp(&self, other: &Self) -> Ordering {
        chrom::cmp(&self.chrom, &other.chrom)
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
    }
}

impl PartialOrd for Feature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
