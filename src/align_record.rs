//! Persisted alignment record exchanged with the Smith-Waterman scorer.
//!
//! The scorer produces one of these per accepted candidate; the record is
//! stored and read back as an opaque binary blob. The layout is explicit
//! little-endian, field by field, so records written on one machine decode
//! on any other.

use crate::error::Result;
use crate::index::ByteCursor;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentRecord {
    /// Packed CIGAR operations (length in the high 28 bits, op in the low 4).
    pub cigar: Vec<u32>,
    /// Position of the reference sequence within its reference file.
    pub ref_num: u32,
    pub ref_begin: i32,
    pub ref_end: i32,
    pub read_begin: i32,
    pub read_end: i32,
    pub read_len: u32,
    pub score: u16,
    /// Index part the alignment was found in.
    pub part: u16,
    /// Reference database number.
    pub index_num: u16,
    /// True for an alignment of the forward read, false for the reverse
    /// complement.
    pub forward: bool,
}

impl AlignmentRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&(self.cigar.len() as u64).to_le_bytes());
        for &op in &self.cigar {
            buf.extend_from_slice(&op.to_le_bytes());
        }
        buf.extend_from_slice(&self.ref_num.to_le_bytes());
        buf.extend_from_slice(&self.ref_begin.to_le_bytes());
        buf.extend_from_slice(&self.ref_end.to_le_bytes());
        buf.extend_from_slice(&self.read_begin.to_le_bytes());
        buf.extend_from_slice(&self.read_end.to_le_bytes());
        buf.extend_from_slice(&self.read_len.to_le_bytes());
        buf.extend_from_slice(&self.score.to_le_bytes());
        buf.extend_from_slice(&self.part.to_le_bytes());
        buf.extend_from_slice(&self.index_num.to_le_bytes());
        buf.push(self.forward as u8);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(bytes);
        let cigar_len = cursor.read_u64()? as usize;
        let mut cigar = Vec::with_capacity(cigar_len.min(1 << 20));
        for _ in 0..cigar_len {
            cigar.push(cursor.read_u32()?);
        }
        let rec = AlignmentRecord {
            cigar,
            ref_num: cursor.read_u32()?,
            ref_begin: cursor.read_u32()? as i32,
            ref_end: cursor.read_u32()? as i32,
            read_begin: cursor.read_u32()? as i32,
            read_end: cursor.read_u32()? as i32,
            read_len: cursor.read_u32()?,
            score: cursor.read_u16()?,
            part: cursor.read_u16()?,
            index_num: cursor.read_u16()?,
            forward: cursor.read_u8()? != 0,
        };
        Ok(rec)
    }

    pub fn encoded_len(&self) -> usize {
        8 + 4 * self.cigar.len() + 4 * 6 + 2 * 3 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let rec = AlignmentRecord {
            cigar: vec![(20 << 4) | 0, (1 << 4) | 1, (79 << 4) | 0],
            ref_num: 17,
            ref_begin: 1200,
            ref_end: 1299,
            read_begin: 0,
            read_end: 99,
            read_len: 100,
            score: 188,
            part: 2,
            index_num: 1,
            forward: true,
        };
        let bytes = rec.to_bytes();
        assert_eq!(bytes.len(), rec.encoded_len());
        assert_eq!(AlignmentRecord::from_bytes(&bytes).unwrap(), rec);
    }

    #[test]
    fn negative_coordinates_survive() {
        let rec = AlignmentRecord {
            ref_begin: -5,
            read_begin: -1,
            forward: false,
            ..AlignmentRecord::default()
        };
        assert_eq!(AlignmentRecord::from_bytes(&rec.to_bytes()).unwrap(), rec);
    }

    #[test]
    fn truncated_blob_is_an_error() {
        let rec = AlignmentRecord::default();
        let bytes = rec.to_bytes();
        assert!(AlignmentRecord::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(AlignmentRecord::from_bytes(&[]).is_err());
    }

    #[test]
    fn empty_cigar_is_legal() {
        let rec = AlignmentRecord::default();
        let back = AlignmentRecord::from_bytes(&rec.to_bytes()).unwrap();
        assert!(back.cigar.is_empty());
    }
}
