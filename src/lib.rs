//! bedcodec: codec and order-correction layer for genomic-interval records.
//!
//! Three pieces cover the pipeline between raw text and ordered, typed
//! records:
//!
//! - **Decode/encode** of progressive-field feature records ([`bed`]): 3
//!   required columns plus up to 9 optional ones whose presence is
//!   self-describing from where the line ends.
//! - **Overlap resolution** across coordinate conventions ([`overlap`]):
//!   0-based half-open features against 1-based fully-closed annotations.
//! - **Order correction** for near-sorted alignment streams ([`reorder`]):
//!   bounded buffering that repairs small local inversions, filters by
//!   mapping quality, and reports stream statistics.
//!
//! # Example
//!
//! ```rust
//! use bedcodec::bed::parse_records;
//! use bedcodec::overlap::{place, Closed, Placement};
//!
//! let records = parse_records("chr1\t10\t20\tgene1\n").unwrap();
//! let annotation = Closed::new("chr1", 15, 25);
//!
//! match place(&records[0], &annotation) {
//!     Placement::Overlap(ov) => assert_eq!(ov.start, 15),
//!     other => panic!("expected overlap, got {:?}", other),
//! }
//! ```

pub mod bed;
pub mod chrom;
pub mod fields;
pub mod overlap;
pub mod record;
pub mod reorder;
pub mod sam;
pub mod validate;

// Re-export commonly used types
pub use bed::{parse_records, DecodeError, FieldMask, Reader, Writer};
pub use overlap::{place, Closed, Overlap, Placement};
pub use record::{Block, Feature, Strand, Thick};
pub use reorder::{ReorderBuffer, ReorderConfig, ReorderError, ReorderStats};
pub use sam::Alignment;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bed::{parse_records, DecodeError, FieldMask, Reader, Writer};
    pub use crate::overlap::{place, Closed, Overlap, Placement};
    pub use crate::record::{Block, Feature, Strand, Thick};
    pub use crate::reorder::{ReorderBuffer, ReorderConfig, ReorderError, ReorderStats};
    pub use crate::sam::Alignment;
    pub use crate::validate::{SortChecker, SortError};
}
