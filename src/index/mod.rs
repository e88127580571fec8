//! Prebuilt reference index: loading, validation, and the per-part bundle
//! the search core runs against.
//!
//! An index file (`.rsvi`) carries one or more *parts*; a part is the slice
//! of the reference database that fits the memory budget, bundled with
//! everything the core needs to search it: the Levenshtein transition blob,
//! the forward-half and reverse-half burst tries, and the L-mer occurrence
//! table resolving trie keys to `(reference, offset)` coordinates. Parts are
//! loaded one at a time; the file is memory-mapped and each part is decoded
//! from its mapped byte range on demand.
//!
//! Every size, offset or count that disagrees with the headers is reported
//! as [`FilterError::CorruptIndex`] naming the offending field; a corrupt
//! part rejects the whole part, never silently truncates.

pub mod lev;
pub mod refs;
pub mod trie;

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

use crate::error::{FilterError, Result};
use lev::LevTable;
use trie::MiniBurstTrie;

const MAGIC: &[u8; 4] = b"RSVI";
const FORMAT_VERSION: u16 = 1;

/// Checked little-endian reader over a byte slice.
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteCursor { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(FilterError::corrupt(format!(
                "unexpected end of index data at byte {} (wanted {} more)",
                self.pos, n
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn is_at_end(&self) -> bool {
        self.pos == self.buf.len()
    }
}

/// Per-part metadata written by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexPartMeta {
    /// Byte range of the reference file covered by this part.
    pub start_part: u64,
    pub end_part: u64,
    /// Number of reference sequences in the range.
    pub numseq_part: u32,
    /// Seed length `L` the part was built for.
    pub seed_len: u32,
    /// Half-window `P = L / 2`.
    pub partial_win: u32,
}

impl IndexPartMeta {
    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let meta = IndexPartMeta {
            start_part: cursor.read_u64()?,
            end_part: cursor.read_u64()?,
            numseq_part: cursor.read_u32()?,
            seed_len: cursor.read_u32()?,
            partial_win: cursor.read_u32()?,
        };
        if meta.seed_len < 4 || meta.seed_len % 2 != 0 {
            return Err(FilterError::corrupt(format!(
                "part seed length {} is not an even integer >= 4",
                meta.seed_len
            )));
        }
        if meta.partial_win * 2 != meta.seed_len {
            return Err(FilterError::corrupt(format!(
                "part half-window {} does not match seed length {}",
                meta.partial_win, meta.seed_len
            )));
        }
        Ok(meta)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(28);
        buf.extend_from_slice(&self.start_part.to_le_bytes());
        buf.extend_from_slice(&self.end_part.to_le_bytes());
        buf.extend_from_slice(&self.numseq_part.to_le_bytes());
        buf.extend_from_slice(&self.seed_len.to_le_bytes());
        buf.extend_from_slice(&self.partial_win.to_le_bytes());
        buf
    }
}

/// One reference-side coordinate of an indexed L-mer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefPosition {
    pub ref_id: u32,
    pub offset: u32,
}

/// Occurrence table: trie key -> packed positions.
#[derive(Debug)]
pub struct LmerPositions {
    bounds: Vec<(u32, u32)>,
    entries: Vec<RefPosition>,
}

impl LmerPositions {
    pub fn empty() -> Self {
        LmerPositions {
            bounds: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Build from per-key position lists (key = list index).
    pub fn from_lists(lists: Vec<Vec<RefPosition>>) -> Self {
        let mut bounds = Vec::with_capacity(lists.len());
        let mut entries = Vec::new();
        for list in lists {
            let start = entries.len() as u32;
            entries.extend_from_slice(&list);
            bounds.push((start, list.len() as u32));
        }
        LmerPositions { bounds, entries }
    }

    pub fn num_keys(&self) -> usize {
        self.bounds.len()
    }

    /// Positions of a key, in storage order.
    pub fn get(&self, key: u32) -> &[RefPosition] {
        let (start, len) = self.bounds[key as usize];
        &self.entries[start as usize..(start + len) as usize]
    }

    fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let key_count = cursor.read_u32()? as usize;
        let mut bounds = Vec::with_capacity(key_count);
        let mut entries = Vec::new();
        for _ in 0..key_count {
            let len = cursor.read_u32()?;
            let start = entries.len() as u32;
            for _ in 0..len {
                entries.push(RefPosition {
                    ref_id: cursor.read_u32()?,
                    offset: cursor.read_u32()?,
                });
            }
            bounds.push((start, len));
        }
        Ok(LmerPositions { bounds, entries })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.bounds.len() as u32).to_le_bytes());
        for &(start, len) in &self.bounds {
            buf.extend_from_slice(&len.to_le_bytes());
            for pos in &self.entries[start as usize..(start + len) as usize] {
                buf.extend_from_slice(&pos.ref_id.to_le_bytes());
                buf.extend_from_slice(&pos.offset.to_le_bytes());
            }
        }
        buf
    }
}

/// Everything the core needs to search one index part.
#[derive(Debug)]
pub struct IndexPart {
    pub meta: IndexPartMeta,
    pub lev: LevTable,
    /// Trie over the forward (prefix) half-mers of reference L-mers.
    pub trie_fwd: MiniBurstTrie,
    /// Trie over the reversed suffix half-mers.
    pub trie_rev: MiniBurstTrie,
    pub positions: LmerPositions,
}

impl IndexPart {
    pub fn from_cursor(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let meta = IndexPartMeta::from_cursor(cursor)?;
        let lev_len = cursor.read_u32()? as usize;
        if lev_len != lev::BLOB_LEN {
            return Err(FilterError::corrupt(format!(
                "Levenshtein blob length {} in part header, expected {}",
                lev_len,
                lev::BLOB_LEN
            )));
        }
        let lev = LevTable::from_bytes(cursor.read_bytes(lev_len)?)?;
        let trie_fwd = MiniBurstTrie::from_cursor(cursor, meta.partial_win)?;
        let trie_rev = MiniBurstTrie::from_cursor(cursor, meta.partial_win)?;
        let positions = LmerPositions::from_cursor(cursor)?;
        for (name, trie) in [("forward", &trie_fwd), ("reverse", &trie_rev)] {
            if let Some(max) = trie.max_key() {
                if max as usize >= positions.num_keys() {
                    return Err(FilterError::corrupt(format!(
                        "{} trie references key {} but the occurrence table has {} keys",
                        name,
                        max,
                        positions.num_keys()
                    )));
                }
            }
        }
        Ok(IndexPart {
            meta,
            lev,
            trie_fwd,
            trie_rev,
            positions,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.meta.to_bytes();
        let lev = self.lev.to_bytes();
        buf.extend_from_slice(&(lev.len() as u32).to_le_bytes());
        buf.extend_from_slice(&lev);
        buf.extend_from_slice(&self.trie_fwd.to_bytes());
        buf.extend_from_slice(&self.trie_rev.to_bytes());
        buf.extend_from_slice(&self.positions.to_bytes());
        buf
    }
}

/// A memory-mapped index file: part directory up front, parts decoded on
/// demand.
#[derive(Debug)]
pub struct RiboIndex {
    mmap: Mmap,
    /// Byte ranges of the serialized parts within the map.
    part_ranges: Vec<(usize, usize)>,
}

impl RiboIndex {
    /// Map an index file and read its part directory.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        log::debug!(
            "memory-mapped index {}: {} bytes ({:.1} MB)",
            path.display(),
            mmap.len(),
            mmap.len() as f64 / 1024.0 / 1024.0
        );

        let mut part_ranges = Vec::new();
        {
            let mut cursor = ByteCursor::new(&mmap);
            let magic = cursor.read_bytes(4)?;
            if magic != MAGIC {
                return Err(FilterError::corrupt(format!(
                    "bad index magic in {}: {:02x?}",
                    path.display(),
                    magic
                )));
            }
            let version = cursor.read_u16()?;
            if version != FORMAT_VERSION {
                return Err(FilterError::corrupt(format!(
                    "unsupported index format version {} (supported: {})",
                    version, FORMAT_VERSION
                )));
            }
            let num_parts = cursor.read_u16()? as usize;
            if num_parts == 0 {
                return Err(FilterError::corrupt("index file contains no parts"));
            }
            let mut lens = Vec::with_capacity(num_parts);
            for _ in 0..num_parts {
                lens.push(cursor.read_u64()? as usize);
            }
            let mut offset = cursor.pos;
            for len in lens {
                if offset + len > mmap.len() {
                    return Err(FilterError::corrupt(format!(
                        "part directory runs past the end of the file ({} + {} > {})",
                        offset,
                        len,
                        mmap.len()
                    )));
                }
                part_ranges.push((offset, offset + len));
                offset += len;
            }
            if offset != mmap.len() {
                return Err(FilterError::corrupt(format!(
                    "{} trailing bytes after the last index part",
                    mmap.len() - offset
                )));
            }
        }

        Ok(RiboIndex { mmap, part_ranges })
    }

    pub fn num_parts(&self) -> usize {
        self.part_ranges.len()
    }

    /// Decode part `i` from the map. Parts are meant to be loaded one at a
    /// time and dropped before the next one.
    pub fn load_part(&self, i: usize) -> Result<IndexPart> {
        let (start, end) = self.part_ranges[i];
        let mut cursor = ByteCursor::new(&self.mmap[start..end]);
        let part = IndexPart::from_cursor(&mut cursor)?;
        if !cursor.is_at_end() {
            return Err(FilterError::corrupt(format!(
                "index part {} has trailing bytes",
                i
            )));
        }
        Ok(part)
    }

    /// Serialize parts into an index file (directory + payloads). Used by
    /// the upstream indexer and by tests building toy indexes.
    pub fn write(path: &Path, parts: &[IndexPart]) -> Result<()> {
        use std::io::Write;
        let payloads: Vec<Vec<u8>> = parts.iter().map(|p| p.to_bytes()).collect();
        let mut out = std::io::BufWriter::new(File::create(path)?);
        out.write_all(MAGIC)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;
        out.write_all(&(parts.len() as u16).to_le_bytes())?;
        for payload in &payloads {
            out.write_all(&(payload.len() as u64).to_le_bytes())?;
        }
        for payload in &payloads {
            out.write_all(payload)?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::trie::TrieBuilder;
    use crate::nt;

    fn toy_part() -> IndexPart {
        let mut fwd = TrieBuilder::new(2);
        fwd.insert(&nt::encode(b"AC"), 0).unwrap();
        fwd.insert(&nt::encode(b"AG"), 1).unwrap();
        let mut rev = TrieBuilder::new(2);
        rev.insert(&nt::encode(b"TG"), 0).unwrap();
        IndexPart {
            meta: IndexPartMeta {
                start_part: 0,
                end_part: 64,
                numseq_part: 2,
                seed_len: 4,
                partial_win: 2,
            },
            lev: LevTable::generate(),
            trie_fwd: fwd.build(),
            trie_rev: rev.build(),
            positions: LmerPositions::from_lists(vec![
                vec![RefPosition { ref_id: 0, offset: 0 }],
                vec![
                    RefPosition { ref_id: 0, offset: 7 },
                    RefPosition { ref_id: 1, offset: 3 },
                ],
            ]),
        }
    }

    #[test]
    fn part_bytes_round_trip() {
        let part = toy_part();
        let bytes = part.to_bytes();
        let mut cursor = ByteCursor::new(&bytes);
        let back = IndexPart::from_cursor(&mut cursor).unwrap();
        assert!(cursor.is_at_end());
        assert_eq!(back.meta, part.meta);
        assert_eq!(back.positions.num_keys(), 2);
        assert_eq!(back.positions.get(1).len(), 2);
        assert_eq!(back.to_bytes(), bytes);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toy.rsvi");
        RiboIndex::write(&path, &[toy_part()]).unwrap();
        let index = RiboIndex::open(&path).unwrap();
        assert_eq!(index.num_parts(), 1);
        let part = index.load_part(0).unwrap();
        assert_eq!(part.meta.seed_len, 4);
        assert_eq!(part.trie_fwd.num_keys(), 2);
        assert_eq!(part.trie_rev.num_keys(), 1);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.rsvi");
        std::fs::write(&path, b"NOPExxxxxxxxxxxx").unwrap();
        let err = RiboIndex::open(&path).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn key_out_of_occurrence_table_is_corrupt() {
        let mut part = toy_part();
        part.positions = LmerPositions::from_lists(vec![vec![]]);
        let bytes = part.to_bytes();
        let mut cursor = ByteCursor::new(&bytes);
        let err = IndexPart::from_cursor(&mut cursor).unwrap_err();
        assert!(err.to_string().contains("occurrence table"));
    }

    #[test]
    fn truncated_part_is_corrupt() {
        let part = toy_part();
        let bytes = part.to_bytes();
        let mut cursor = ByteCursor::new(&bytes[..bytes.len() - 3]);
        assert!(IndexPart::from_cursor(&mut cursor).is_err());
    }
}
