//! Sortedness validation for decoded feature streams.
//!
//! Streaming consumers require input sorted by chromosome and start
//! position. The checker enforces two things: positions never decrease
//! within a chromosome, and each chromosome's records are contiguous (a
//! chromosome never reappears after another one has started). Any
//! consistent chromosome order is accepted.

use rustc_hash::FxHashSet;
use thiserror::Error;

/// A sort-order violation. Unlike per-record decode failures, either kind
/// means the stream as a whole cannot be trusted.
#[derive(Error, Debug)]
pub enum SortError {
    #[error(
        "record {record}: position {start} on {chrom} comes after {previous_start}; \
         stream is not sorted by start position"
    )]
    PositionRegression {
        record: u64,
        chrom: String,
        start: u64,
        previous_start: u64,
    },

    #[error(
        "record {record}: chromosome {chrom} reappears after other chromosomes; \
         chromosome runs must be contiguous"
    )]
    ChromosomeInterleaved { record: u64, chrom: String },
}

/// Inline sort checker for streaming loops.
#[derive(Debug, Default)]
pub struct SortChecker {
    previous_chrom: Option<String>,
    previous_start: u64,
    seen: FxHashSet<String>,
    records: u64,
}

impl SortChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one record against everything seen so far.
    pub fn check(&mut self, chrom: &str, start: u64) -> Result<(), SortError> {
        self.records += 1;

        if let Some(ref previous) = self.previous_chrom {
            if chrom != previous {
                if self.seen.contains(chrom) {
                    return Err(SortError::ChromosomeInterleaved {
                        record: self.records,
                        chrom: chrom.to_string(),
                    });
                }
                self.seen.insert(previous.clone());
                self.previous_chrom = Some(chrom.to_string());
                self.previous_start = start;
                return Ok(());
            }
            if start < self.previous_start {
                return Err(SortError::PositionRegression {
                    record: self.records,
                    chrom: chrom.to_string(),
                    start,
                    previous_start: self.previous_start,
                });
            }
        } else {
            self.previous_chrom = Some(chrom.to_string());
        }

        self.previous_start = start;
        Ok(())
    }

    /// Number of records checked.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Reset for a new stream.
    pub fn reset(&mut self) {
        self.previous_chrom = None;
        self.previous_start = 0;
        self.seen.clear();
        self.records = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_stream() {
        let mut checker = SortChecker::new();
        assert!(checker.check("chr1", 100).is_ok());
        assert!(checker.check("chr1", 100).is_ok());
        assert!(checker.check("chr1", 250).is_ok());
        assert!(checker.check("chr2", 50).is_ok());
        assert_eq!(checker.records(), 4);
    }

    #[test]
    fn test_position_regression() {
        let mut checker = SortChecker::new();
        checker.check("chr1", 200).unwrap();
        let err = checker.check("chr1", 100).unwrap_err();
        assert!(matches!(
            err,
            SortError::PositionRegression {
                start: 100,
                previous_start: 200,
                ..
            }
        ));
    }

    #[test]
    fn test_interleaved_chromosome() {
        let mut checker = SortChecker::new();
        checker.check("chr1", 100).unwrap();
        checker.check("chr2", 100).unwrap();
        let err = checker.check("chr1", 300).unwrap_err();
        assert!(matches!(err, SortError::ChromosomeInterleaved { .. }));
    }

    #[test]
    fn test_any_consistent_chromosome_order() {
        // Lexicographically "wrong" order is fine as long as runs stay
        // contiguous.
        let mut checker = SortChecker::new();
        assert!(checker.check("chr2", 100).is_ok());
        assert!(checker.check("chr1", 100).is_ok());
    }

    #[test]
    fn test_position_resets_on_new_chromosome() {
        let mut checker = SortChecker::new();
        checker.check("chr1", 5000).unwrap();
        assert!(checker.check("chr2", 10).is_ok());
    }

    #[test]
    fn test_reset() {
        let mut checker = SortChecker::new();
        checker.check("chr1", 100).unwrap();
        checker.check("chr2", 100).unwrap();
        checker.reset();
        assert!(checker.check("chr1", 50).is_ok());
        assert_eq!(checker.records(), 1);
    }
}
