//! Streaming decoder and encoder for progressive-field feature records.
//!
//! A record line carries 3 required columns (chromosome, start, end) and up
//! to 9 optional ones in a fixed order. Fields are read strictly left to
//! right; the delimiter that ends each read decides whether the next optional
//! group is attempted, so the column count of every record is self-describing
//! from where the line ends.

use crate::fields::{parse_u64, Delim, FieldScanner};
use crate::record::{Block, Feature, Strand, Thick};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::ops::BitOr;
use std::path::Path;
use thiserror::Error;

/// Errors produced while decoding a record.
///
/// Every variant names the offending line; malformed-record variants also
/// name the field and value so a bad input can be diagnosed without
/// re-reading it. Decoding never recovers partially: a failed record yields
/// an error, not a half-filled `Feature`.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: input ended while reading {field}")]
    Truncated { line: usize, field: &'static str },

    #[error("line {line}: invalid {field}: '{value}'")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: score {score} out of range 0..=1000")]
    ScoreOutOfRange { line: usize, score: u64 },

    #[error("line {line}: strand must be '+', '-', or '.': '{value}'")]
    InvalidStrand { line: usize, value: String },

    #[error("line {line}: block count {count} exceeds 65535")]
    BlockCountOutOfRange { line: usize, count: u64 },

    #[error("line {line}: declared {declared} blocks but found {found} {list}")]
    BlockCountMismatch {
        line: usize,
        list: &'static str,
        declared: usize,
        found: usize,
    },

    #[error("line {line}: more than 12 fields in record")]
    ExtraFields { line: usize },
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// A streaming feature-record reader.
pub struct Reader<R: Read> {
    reader: BufReader<R>,
    line: Vec<u8>,
    line_number: usize,
}

impl Reader<File> {
    /// Open a record stream from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> Reader<R> {
    /// Create a reader over any byte source.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::with_capacity(1024),
            line_number: 0,
        }
    }

    /// Create a reader with a custom input buffer capacity.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(capacity, reader),
            line: Vec::with_capacity(1024),
            line_number: 0,
        }
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` on clean end of input, i.e. when no bytes remain
    /// where a new record would begin. End of input anywhere later in a
    /// record is a truncation error.
    pub fn read_record(&mut self) -> Result<Option<Feature>> {
        self.line.clear();
        let bytes_read = self.reader.read_until(b'\n', &mut self.line)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        decode_line(&self.line, self.line_number).map(Some)
    }

    /// The number of lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Iterator over all records.
    pub fn records(self) -> Records<R> {
        Records { reader: self }
    }
}

/// Iterator over decoded records.
pub struct Records<R: Read> {
    reader: Reader<R>,
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Parse records from an in-memory string (useful for testing).
pub fn parse_records(content: &str) -> Result<Vec<Feature>> {
    Reader::new(content.as_bytes()).records().collect()
}

fn field_string(tok: &[u8], line: usize, field: &'static str) -> Result<String> {
    std::str::from_utf8(tok)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidField {
            line,
            field,
            value: String::from_utf8_lossy(tok).into_owned(),
        })
}

fn numeric_field(tok: &[u8], line: usize, field: &'static str) -> Result<u64> {
    parse_u64(tok).ok_or_else(|| DecodeError::InvalidField {
        line,
        field,
        value: String::from_utf8_lossy(tok).into_owned(),
    })
}

/// Decode one raw line into a record.
///
/// The scanner yields each field together with its terminating delimiter;
/// a newline stops the walk after any complete group, and running out of
/// input mid-record is a truncation. The thick pair and the block triplet
/// are atomic: reading their first member commits the decoder to the rest.
fn decode_line(raw: &[u8], line: usize) -> Result<Feature> {
    let mut scan = FieldScanner::new(raw);

    // Chromosome
    let (tok, mut delim) = scan.field();
    if tok.is_empty() {
        return Err(DecodeError::InvalidField {
            line,
            field: "chromosome",
            value: String::new(),
        });
    }
    let chrom = field_string(tok, line, "chromosome")?;
    if delim != Delim::Tab {
        return Err(DecodeError::Truncated {
            line,
            field: "start position",
        });
    }

    // Start position
    let (tok, d) = scan.field();
    if d == Delim::End {
        return Err(DecodeError::Truncated {
            line,
            field: "start position",
        });
    }
    let start = numeric_field(tok, line, "start position")?;
    if d != Delim::Tab {
        return Err(DecodeError::Truncated {
            line,
            field: "end position",
        });
    }

    // End position
    let (tok, d) = scan.field();
    if d == Delim::End {
        return Err(DecodeError::Truncated {
            line,
            field: "end position",
        });
    }
    let end = numeric_field(tok, line, "end position")?;
    delim = d;

    let mut record = Feature::new(chrom, start, end);

    // Name
    if delim != Delim::Newline {
        let (tok, d) = scan.field();
        if d == Delim::End {
            return Err(DecodeError::Truncated { line, field: "name" });
        }
        record.name = Some(field_string(tok, line, "name")?);
        delim = d;
    }

    // Score, bounds-checked to the format's 0..=1000
    if delim != Delim::Newline {
        let (tok, d) = scan.field();
        if d == Delim::End {
            return Err(DecodeError::Truncated { line, field: "score" });
        }
        let score = numeric_field(tok, line, "score")?;
        if score > 1000 {
            return Err(DecodeError::ScoreOutOfRange { line, score });
        }
        record.score = Some(score as u16);
        delim = d;
    }

    // Strand, exactly one byte from {+,-,.}
    if delim != Delim::Newline {
        let (tok, d) = scan.field();
        if d == Delim::End {
            return Err(DecodeError::Truncated {
                line,
                field: "strand",
            });
        }
        if tok.len() != 1 {
            return Err(DecodeError::InvalidStrand {
                line,
                value: String::from_utf8_lossy(tok).into_owned(),
            });
        }
        record.strand = Some(Strand::from_byte(tok[0]).ok_or_else(|| {
            DecodeError::InvalidStrand {
                line,
                value: String::from_utf8_lossy(tok).into_owned(),
            }
        })?);
        delim = d;
    }

    // Thick pair: reading the start commits to the end.
    if delim != Delim::Newline {
        let (tok, d) = scan.field();
        if d == Delim::End {
            return Err(DecodeError::Truncated {
                line,
                field: "thick start",
            });
        }
        let thick_start = numeric_field(tok, line, "thick start")?;
        if d == Delim::Newline {
            return Err(DecodeError::Truncated {
                line,
                field: "thick end",
            });
        }

        let (tok, d) = scan.field();
        if d == Delim::End {
            return Err(DecodeError::Truncated {
                line,
                field: "thick end",
            });
        }
        let thick_end = numeric_field(tok, line, "thick end")?;
        record.thick = Some(Thick {
            start: thick_start,
            end: thick_end,
        });
        delim = d;
    }

    // Item RGB, opaque text
    if delim != Delim::Newline {
        let (tok, d) = scan.field();
        if d == Delim::End {
            return Err(DecodeError::Truncated {
                line,
                field: "item RGB",
            });
        }
        record.item_rgb = Some(field_string(tok, line, "item RGB")?);
        delim = d;
    }

    // Block triplet: count, then comma-separated sizes and starts whose
    // lengths must both equal the declared count.
    if delim != Delim::Newline {
        let (tok, d) = scan.field();
        if d == Delim::End {
            return Err(DecodeError::Truncated {
                line,
                field: "block count",
            });
        }
        let count = numeric_field(tok, line, "block count")?;
        if count > 65535 {
            return Err(DecodeError::BlockCountOutOfRange { line, count });
        }
        let count = count as usize;
        if d == Delim::Newline {
            return Err(DecodeError::Truncated {
                line,
                field: "block sizes",
            });
        }

        let mut sizes = Vec::with_capacity(count);
        loop {
            let (tok, d) = scan.subfield();
            if d == Delim::End {
                return Err(DecodeError::Truncated {
                    line,
                    field: "block sizes",
                });
            }
            sizes.push(numeric_field(tok, line, "block size")?);
            if d != Delim::Comma {
                delim = d;
                break;
            }
        }
        if sizes.len() != count {
            return Err(DecodeError::BlockCountMismatch {
                line,
                list: "sizes",
                declared: count,
                found: sizes.len(),
            });
        }
        if delim == Delim::Newline {
            return Err(DecodeError::Truncated {
                line,
                field: "block starts",
            });
        }

        let mut starts = Vec::with_capacity(count);
        loop {
            let (tok, d) = scan.subfield();
            if d == Delim::End {
                return Err(DecodeError::Truncated {
                    line,
                    field: "block starts",
                });
            }
            starts.push(numeric_field(tok, line, "block start")?);
            if d != Delim::Comma {
                delim = d;
                break;
            }
        }
        if starts.len() != count {
            return Err(DecodeError::BlockCountMismatch {
                line,
                list: "starts",
                declared: count,
                found: starts.len(),
            });
        }

        record.blocks = Some(
            sizes
                .into_iter()
                .zip(starts)
                .map(|(size, start)| Block { size, start })
                .collect(),
        );
    }

    // All twelve columns are accounted for at this point.
    if delim != Delim::Newline {
        return Err(DecodeError::ExtraFields { line });
    }

    Ok(record)
}

/// Selects which optional groups the encoder renders with real data.
///
/// One bit per group; the chromosome, start, and end columns are required
/// and have no bits. Deselected groups that are present in the record are
/// rendered as placeholder markers so the column count is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMask(u8);

impl FieldMask {
    pub const NAME: FieldMask = FieldMask(0x01);
    pub const SCORE: FieldMask = FieldMask(0x02);
    pub const STRAND: FieldMask = FieldMask(0x04);
    pub const THICK: FieldMask = FieldMask(0x08);
    pub const RGB: FieldMask = FieldMask(0x10);
    pub const BLOCK: FieldMask = FieldMask(0x20);
    /// Render every group present in the record.
    pub const ALL: FieldMask = FieldMask(0xff);

    #[inline]
    pub const fn contains(self, group: FieldMask) -> bool {
        self.0 & group.0 == group.0
    }
}

impl BitOr for FieldMask {
    type Output = FieldMask;

    fn bitor(self, rhs: FieldMask) -> FieldMask {
        FieldMask(self.0 | rhs.0)
    }
}

/// Buffered record encoder.
///
/// Integers are rendered through a reused `itoa` buffer. Output is
/// append-only line text; a failed write leaves whatever was already
/// written in place.
pub struct Writer<W: Write> {
    writer: BufWriter<W>,
    itoa: itoa::Buffer,
}

impl<W: Write> Writer<W> {
    pub fn new(output: W) -> Self {
        Self {
            writer: BufWriter::new(output),
            itoa: itoa::Buffer::new(),
        }
    }

    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa: itoa::Buffer::new(),
        }
    }

    /// Encode one record with exactly `record.field_count()` columns.
    ///
    /// Groups deselected by the mask render as markers: `.` for name and
    /// strand, `0` for score and RGB, `0\t0` for the thick pair, and
    /// `0\t.\t.` for the block triplet.
    pub fn write_record(&mut self, record: &Feature, mask: FieldMask) -> io::Result<()> {
        self.writer.write_all(record.chrom.as_bytes())?;
        self.tab()?;
        self.int(record.start)?;
        self.tab()?;
        self.int(record.end)?;

        loop {
            let Some(ref name) = record.name else { break };
            self.tab()?;
            if mask.contains(FieldMask::NAME) {
                self.writer.write_all(name.as_bytes())?;
            } else {
                self.writer.write_all(b".")?;
            }

            let Some(score) = record.score else { break };
            self.tab()?;
            if mask.contains(FieldMask::SCORE) {
                self.int(score as u64)?;
            } else {
                self.writer.write_all(b"0")?;
            }

            let Some(strand) = record.strand else { break };
            self.tab()?;
            if mask.contains(FieldMask::STRAND) {
                self.writer.write_all(&[strand.as_char() as u8])?;
            } else {
                self.writer.write_all(b".")?;
            }

            let Some(thick) = record.thick else { break };
            self.tab()?;
            if mask.contains(FieldMask::THICK) {
                self.int(thick.start)?;
                self.tab()?;
                self.int(thick.end)?;
            } else {
                self.writer.write_all(b"0\t0")?;
            }

            let Some(ref rgb) = record.item_rgb else { break };
            self.tab()?;
            if mask.contains(FieldMask::RGB) {
                self.writer.write_all(rgb.as_bytes())?;
            } else {
                self.writer.write_all(b"0")?;
            }

            let Some(ref blocks) = record.blocks else { break };
            self.tab()?;
            if mask.contains(FieldMask::BLOCK) {
                self.int(blocks.len() as u64)?;
                self.tab()?;
                for (i, block) in blocks.iter().enumerate() {
                    if i > 0 {
                        self.writer.write_all(b",")?;
                    }
                    self.int(block.size)?;
                }
                self.tab()?;
                for (i, block) in blocks.iter().enumerate() {
                    if i > 0 {
                        self.writer.write_all(b",")?;
                    }
                    self.int(block.start)?;
                }
            } else {
                self.writer.write_all(b"0\t.\t.")?;
            }
            break;
        }

        self.writer.write_all(b"\n")
    }

    #[inline]
    fn tab(&mut self) -> io::Result<()> {
        self.writer.write_all(b"\t")
    }

    #[inline]
    fn int(&mut self, n: u64) -> io::Result<()> {
        self.writer.write_all(self.itoa.format(n).as_bytes())
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Encode a slice of records to a writer.
pub fn write_records<W: Write>(output: W, records: &[Feature], mask: FieldMask) -> io::Result<()> {
    let mut writer = Writer::new(output);
    for record in records {
        writer.write_record(record, mask)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(line: &str) -> Result<Feature> {
        let mut reader = Reader::new(line.as_bytes());
        Ok(reader.read_record()?.expect("record expected"))
    }

    fn encode_one(record: &Feature, mask: FieldMask) -> String {
        let mut out = Vec::new();
        {
            let mut writer = Writer::new(&mut out);
            writer.write_record(record, mask).unwrap();
            writer.flush().unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_decode_three_columns() {
        let rec = decode_one("chr1\t100\t200\n").unwrap();
        assert_eq!(rec.chrom, "chr1");
        assert_eq!(rec.start, 100);
        assert_eq!(rec.end, 200);
        assert_eq!(rec.field_count(), 3);
    }

    #[test]
    fn test_decode_twelve_columns() {
        let rec =
            decode_one("chr7\t1000\t5000\tuc001\t960\t+\t1200\t4800\t255,0,0\t2\t567,488\t0,3512\n")
                .unwrap();
        assert_eq!(rec.field_count(), 12);
        assert_eq!(rec.name.as_deref(), Some("uc001"));
        assert_eq!(rec.score, Some(960));
        assert_eq!(rec.strand, Some(Strand::Forward));
        assert_eq!(
            rec.thick,
            Some(Thick {
                start: 1200,
                end: 4800
            })
        );
        assert_eq!(rec.item_rgb.as_deref(), Some("255,0,0"));
        let blocks = rec.blocks.as_ref().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], Block { size: 567, start: 0 });
        assert_eq!(
            blocks[1],
            Block {
                size: 488,
                start: 3512
            }
        );
    }

    #[test]
    fn test_roundtrip_all_field_counts() {
        let lines = [
            "chr1\t100\t200\n",
            "chr1\t100\t200\tgene1\n",
            "chr1\t100\t200\tgene1\t500\n",
            "chr1\t100\t200\tgene1\t500\t-\n",
            "chr1\t100\t200\tgene1\t500\t-\t120\t180\n",
            "chr1\t100\t200\tgene1\t500\t-\t120\t180\t0,128,255\n",
            "chr1\t100\t200\tgene1\t500\t-\t120\t180\t0,128,255\t3\t10,20,30\t0,40,70\n",
        ];
        let expected_counts = [3u8, 4, 5, 6, 8, 9, 12];
        for (line, expected) in lines.iter().zip(expected_counts) {
            let rec = decode_one(line).unwrap();
            assert_eq!(rec.field_count(), expected, "line {}", line.trim_end());
            let encoded = encode_one(&rec, FieldMask::ALL);
            assert_eq!(&encoded, line);
            let again = decode_one(&encoded).unwrap();
            assert_eq!(again, rec);
        }
    }

    #[test]
    fn test_clean_end_of_input() {
        let mut reader = Reader::new(&b""[..]);
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_unterminated_final_line_is_truncated() {
        let mut reader = Reader::new(&b"chr1\t100\t200"[..]);
        assert!(matches!(
            reader.read_record(),
            Err(DecodeError::Truncated {
                field: "end position",
                ..
            })
        ));
    }

    #[test]
    fn test_missing_end_position() {
        assert!(matches!(
            decode_one("chr1\t100\n"),
            Err(DecodeError::Truncated {
                field: "end position",
                ..
            })
        ));
    }

    #[test]
    fn test_trailing_garbage_in_number() {
        assert!(matches!(
            decode_one("chr1\t100x\t200\n"),
            Err(DecodeError::InvalidField {
                field: "start position",
                ..
            })
        ));
    }

    #[test]
    fn test_thick_start_without_thick_end() {
        let err = decode_one("chr1\t100\t200\tgene1\t500\t-\t120\n").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                field: "thick end",
                ..
            }
        ));
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(decode_one("chr1\t1\t2\tn\t0\n").unwrap().score, Some(0));
        assert_eq!(
            decode_one("chr1\t1\t2\tn\t1000\n").unwrap().score,
            Some(1000)
        );
        assert!(matches!(
            decode_one("chr1\t1\t2\tn\t1001\n"),
            Err(DecodeError::ScoreOutOfRange { score: 1001, .. })
        ));
    }

    #[test]
    fn test_invalid_strand() {
        assert!(matches!(
            decode_one("chr1\t1\t2\tn\t0\t*\n"),
            Err(DecodeError::InvalidStrand { .. })
        ));
        assert!(matches!(
            decode_one("chr1\t1\t2\tn\t0\t++\n"),
            Err(DecodeError::InvalidStrand { .. })
        ));
    }

    #[test]
    fn test_block_count_mismatch_fewer_sizes() {
        let err = decode_one("chr1\t0\t100\tn\t0\t+\t0\t100\t0\t3\t10,20\t0,40\n").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::BlockCountMismatch {
                list: "sizes",
                declared: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_block_count_mismatch_extra_starts() {
        let err = decode_one("chr1\t0\t100\tn\t0\t+\t0\t100\t0\t2\t10,20\t0,40,70\n").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::BlockCountMismatch {
                list: "starts",
                declared: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_block_count_without_lists() {
        let err = decode_one("chr1\t0\t100\tn\t0\t+\t0\t100\t0\t2\n").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                field: "block sizes",
                ..
            }
        ));
    }

    #[test]
    fn test_block_sizes_without_starts() {
        let err = decode_one("chr1\t0\t100\tn\t0\t+\t0\t100\t0\t2\t10,20\n").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                field: "block starts",
                ..
            }
        ));
    }

    #[test]
    fn test_block_count_out_of_range() {
        let err = decode_one("chr1\t0\t100\tn\t0\t+\t0\t100\t0\t65536\t1\t0\n").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::BlockCountOutOfRange { count: 65536, .. }
        ));
    }

    #[test]
    fn test_extra_fields_rejected() {
        let err =
            decode_one("chr1\t0\t100\tn\t0\t+\t0\t100\t0\t2\t10,20\t0,40\textra\n").unwrap_err();
        assert!(matches!(err, DecodeError::ExtraFields { .. }));
    }

    #[test]
    fn test_error_reports_line_number() {
        let content = "chr1\t100\t200\nchr1\tbroken\t300\n";
        let mut reader = Reader::new(content.as_bytes());
        reader.read_record().unwrap();
        match reader.read_record() {
            Err(DecodeError::InvalidField { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_multiple_records() {
        let content = "chr1\t100\t200\nchr1\t300\t400\tgene2\n";
        let records = parse_records(content).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name.as_deref(), Some("gene2"));
    }

    #[test]
    fn test_masked_encode_keeps_column_count() {
        let rec = decode_one("chr1\t100\t200\tgene1\t500\t-\t120\t180\n").unwrap();
        let masked = encode_one(&rec, FieldMask::NAME | FieldMask::STRAND);
        assert_eq!(masked, "chr1\t100\t200\tgene1\t0\t-\t0\t0\n");
        assert_eq!(masked.trim_end().split('\t').count(), 8);
    }

    #[test]
    fn test_masked_block_placeholder() {
        let rec = decode_one("chr1\t0\t100\tn\t5\t+\t0\t100\t0\t2\t10,20\t0,40\n").unwrap();
        let masked = encode_one(
            &rec,
            FieldMask::NAME
                | FieldMask::SCORE
                | FieldMask::STRAND
                | FieldMask::THICK
                | FieldMask::RGB,
        );
        assert_eq!(masked, "chr1\t0\t100\tn\t5\t+\t0\t100\t0\t0\t.\t.\n");
    }

    #[test]
    fn test_write_records_helper() {
        let records = vec![Feature::new("chr1", 10, 20), Feature::new("chr2", 30, 40)];
        let mut out = Vec::new();
        write_records(&mut out, &records, FieldMask::ALL).unwrap();
        assert_eq!(out, b"chr1\t10\t20\nchr2\t30\t40\n");
    }
}
