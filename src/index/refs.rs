//! Load-on-demand reference sequences for one index part.
//!
//! An index part covers a byte range `[start_part, end_part)` of the
//! reference FASTA/FASTQ file holding `numseq_part` sequences. The store
//! seeks straight to the range start and parses records until the count is
//! reached, converting sequences to numeric form on the way in. References
//! stay loaded for the lifetime of the part and are dropped by `unload`
//! before the next part takes their place.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::error::{FilterError, Result};
use crate::index::IndexPartMeta;
use crate::nt::NT4_TABLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BioFormat {
    Fasta,
    Fastq,
}

/// One decoded reference sequence.
#[derive(Debug)]
pub struct BaseRecord {
    /// Full header line, including the leading `>` or `@`.
    pub header: String,
    /// Numeric sequence; space bytes (0x20) are preserved verbatim.
    pub sequence: Vec<u8>,
    pub quality: Option<String>,
    pub format: BioFormat,
    /// Ordinal of the record within its part.
    pub nid: usize,
}

impl BaseRecord {
    /// Header id: the first whitespace-delimited token without the marker.
    pub fn id(&self) -> &str {
        self.header[1..]
            .split_whitespace()
            .next()
            .unwrap_or("")
    }
}

/// Reference records of the currently loaded index part.
#[derive(Debug)]
pub struct References {
    pub buffer: Vec<BaseRecord>,
    /// Index (database) file number this store was loaded from.
    pub num: u32,
    /// Part number within the database.
    pub part: u32,
}

impl References {
    /// Load the part's sequences from the reference file.
    pub fn load(path: &Path, num: u32, part: u32, meta: &IndexPartMeta) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(meta.start_part))?;

        let mut buffer: Vec<BaseRecord> = Vec::with_capacity(meta.numseq_part as usize);
        let mut header: Option<(String, BioFormat)> = None;
        let mut sequence: Vec<u8> = Vec::new();
        let mut quality: Option<String> = None;
        let mut fastq_line = 0usize;
        let mut line = String::new();

        while (buffer.len() as u32) < meta.numseq_part {
            line.clear();
            let n = file.read_line(&mut line)?;
            if n == 0 {
                // EOF: flush the record in progress, if any.
                if let Some((h, f)) = header.take() {
                    push_record(&mut buffer, h, f, std::mem::take(&mut sequence), quality.take());
                }
                break;
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            let first = trimmed.as_bytes()[0];
            if first == b'>' || (first == b'@' && fastq_line == 0) {
                if let Some((h, f)) = header.take() {
                    push_record(&mut buffer, h, f, std::mem::take(&mut sequence), quality.take());
                    if buffer.len() as u32 == meta.numseq_part {
                        break;
                    }
                }
                let format = if first == b'@' {
                    BioFormat::Fastq
                } else {
                    BioFormat::Fasta
                };
                header = Some((trimmed.to_string(), format));
                sequence.clear();
                quality = None;
                fastq_line = if format == BioFormat::Fastq { 1 } else { 0 };
                continue;
            }
            match header {
                Some((_, BioFormat::Fastq)) => {
                    match fastq_line {
                        1 => {
                            sequence.extend(convert(trimmed));
                            fastq_line = 2;
                        }
                        2 => {
                            if first != b'+' {
                                return Err(FilterError::corrupt(format!(
                                    "malformed FASTQ record in {}: expected '+', got {:?}",
                                    path.display(),
                                    trimmed
                                )));
                            }
                            fastq_line = 3;
                        }
                        _ => {
                            quality = Some(trimmed.to_string());
                            fastq_line = 0;
                        }
                    }
                }
                Some((_, BioFormat::Fasta)) => {
                    sequence.extend(convert(trimmed));
                }
                None => {
                    return Err(FilterError::corrupt(format!(
                        "reference part of {} does not start at a record boundary",
                        path.display()
                    )));
                }
            }
        }

        if buffer.len() as u32 != meta.numseq_part {
            return Err(FilterError::corrupt(format!(
                "reference part of {} holds {} sequences, metadata says {}",
                path.display(),
                buffer.len(),
                meta.numseq_part
            )));
        }

        log::debug!(
            "loaded {} reference sequences for index {} part {}",
            buffer.len(),
            num,
            part
        );
        Ok(References { buffer, num, part })
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn get(&self, nid: usize) -> Option<&BaseRecord> {
        self.buffer.get(nid)
    }

    /// Linear search for a header containing `id`. Used by tests and manual
    /// reference lookups; not on the hot path.
    pub fn find_by_id_substring(&self, id: &str) -> Option<usize> {
        self.buffer.iter().position(|r| r.header.contains(id))
    }

    /// Release the part's sequence memory.
    pub fn unload(&mut self) {
        self.buffer.clear();
        self.buffer.shrink_to_fit();
    }
}

/// Numeric conversion of one sequence line: spaces survive, everything else
/// goes through the nucleotide table.
fn convert(line: &str) -> impl Iterator<Item = u8> + '_ {
    line.bytes()
        .map(|b| if b == b' ' { b } else { NT4_TABLE[b as usize] })
}

fn push_record(
    buffer: &mut Vec<BaseRecord>,
    header: String,
    format: BioFormat,
    sequence: Vec<u8>,
    quality: Option<String>,
) {
    let nid = buffer.len();
    buffer.push(BaseRecord {
        header,
        sequence,
        quality,
        format,
        nid,
    });
}
