//! Run configuration for the filter.

use crate::defaults;
use crate::error::{FilterError, Result};
use std::path::PathBuf;

/// Options recognized by the seed-enumeration core and the pipeline around
/// it. Built from the command line in the binary, or directly by library
/// users and tests.
#[derive(Debug, Clone)]
pub struct FilterOpt {
    /// Reference databases: for every FASTA file there must be a prebuilt
    /// index next to it (`<fasta>.rsvi`), or an explicit path in `index_files`.
    pub ref_files: Vec<PathBuf>,
    /// Optional explicit index paths, parallel to `ref_files`.
    pub index_files: Vec<PathBuf>,
    /// Read files (FASTA or FASTQ, optionally gzip/BGZF compressed).
    pub read_files: Vec<PathBuf>,

    /// Seed length `L`; even, >= 8. The half-window is `L / 2`.
    pub seed_length: u32,
    /// Skip the forward-half traversal of a window once the reverse half
    /// produced an exact (zero-edit) match for the current read.
    pub skip_if_zero_kmer_hit: bool,
    /// Worker threads (>= 1).
    pub num_threads: usize,
    /// Reads shorter than this skip the core entirely and are counted in
    /// `short_reads_num`. Defaults to the seed length.
    pub min_read_len_threshold: u32,

    /// Directory for the persisted statistics record; nothing is written
    /// when unset.
    pub workdir: Option<PathBuf>,
}

impl Default for FilterOpt {
    fn default() -> Self {
        FilterOpt {
            ref_files: Vec::new(),
            index_files: Vec::new(),
            read_files: Vec::new(),
            seed_length: defaults::SEED_LENGTH,
            skip_if_zero_kmer_hit: false,
            num_threads: 1,
            min_read_len_threshold: defaults::SEED_LENGTH,
            workdir: None,
        }
    }
}

impl FilterOpt {
    /// Validate the option set before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.ref_files.is_empty() {
            return Err(FilterError::InvalidOption(
                "at least one reference database is required".into(),
            ));
        }
        if self.read_files.is_empty() {
            return Err(FilterError::InvalidOption(
                "at least one reads file is required".into(),
            ));
        }
        if !self.index_files.is_empty() && self.index_files.len() != self.ref_files.len() {
            return Err(FilterError::InvalidOption(format!(
                "{} index paths given for {} reference files",
                self.index_files.len(),
                self.ref_files.len()
            )));
        }
        if self.seed_length < defaults::MIN_SEED_LENGTH || self.seed_length % 2 != 0 {
            return Err(FilterError::InvalidOption(format!(
                "seed length must be an even integer >= {}, got {}",
                defaults::MIN_SEED_LENGTH,
                self.seed_length
            )));
        }
        if self.num_threads < 1 {
            return Err(FilterError::InvalidOption(
                "thread count must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Index path for reference database `i` (explicit, or derived by the
    /// `<fasta>.rsvi` convention).
    pub fn index_path(&self, i: usize) -> PathBuf {
        if let Some(p) = self.index_files.get(i) {
            p.clone()
        } else {
            let mut os = self.ref_files[i].clone().into_os_string();
            os.push(".");
            os.push(defaults::INDEX_SUFFIX);
            PathBuf::from(os)
        }
    }

    /// Half-window `P = L / 2`.
    pub fn partial_win(&self) -> u32 {
        self.seed_length / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> FilterOpt {
        FilterOpt {
            ref_files: vec![PathBuf::from("db.fasta")],
            read_files: vec![PathBuf::from("reads.fq")],
            ..FilterOpt::default()
        }
    }

    #[test]
    fn accepts_defaults() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn rejects_odd_or_tiny_seed_length() {
        let mut opt = minimal();
        opt.seed_length = 17;
        assert!(opt.validate().is_err());
        opt.seed_length = 4;
        assert!(opt.validate().is_err());
        opt.seed_length = 6;
        assert!(opt.validate().is_err());
        opt.seed_length = 8;
        assert!(opt.validate().is_ok());
    }

    #[test]
    fn derives_index_path_by_convention() {
        let opt = minimal();
        assert_eq!(opt.index_path(0), PathBuf::from("db.fasta.rsvi"));
    }
}
