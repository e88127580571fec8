//! Collective statistics over all reads of a run.
//!
//! Counters are updated concurrently by the worker fan-out with relaxed
//! atomic increments (no ordering is consumed anywhere) and persisted as a
//! single binary record keyed by the read-file set. The key is the FNV-1a
//! hash of the ordered, underscore-joined read-file basenames, so re-running
//! on the same inputs finds the previous record.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::defaults;
use crate::error::Result;
use crate::index::ByteCursor;
use crate::utils;

const MAX_READ_LEN: u32 = u32::MAX;

pub struct ReadStats {
    /// Stable key into the statistics store.
    pub dbkey: String,

    pub min_read_len: AtomicU32,
    pub max_read_len: AtomicU32,
    /// Reads with at least one candidate seed (the scorer refines this to
    /// its E-value rule before persisting, when it runs).
    pub total_reads_aligned: AtomicU64,
    /// Reads additionally passing the identity/coverage thresholds; owned
    /// by the scorer, carried here for persistence.
    pub total_mapped_sw_id_cov: AtomicU64,
    /// Reads below the configured minimum length; they skip the core.
    pub short_reads_num: AtomicU64,
    pub all_reads_count: AtomicU64,
    /// Sum of all read lengths.
    pub all_reads_len: AtomicU64,
    pub total_reads_denovo_clustering: AtomicU64,
    /// Reads matched per reference database, index-file order.
    pub reads_matched_per_db: Vec<AtomicU64>,

    pub is_stats_calc: AtomicBool,
    pub is_total_mapped_sw_id_cov: AtomicBool,
}

impl ReadStats {
    pub fn new(read_files: &[PathBuf], num_dbs: usize) -> Self {
        let joined = read_files
            .iter()
            .map(|p| utils::basename(p))
            .collect::<Vec<_>>()
            .join("_");
        let dbkey = format!("{:016x}", utils::fnv1a(&joined));
        ReadStats {
            dbkey,
            min_read_len: AtomicU32::new(MAX_READ_LEN),
            max_read_len: AtomicU32::new(0),
            total_reads_aligned: AtomicU64::new(0),
            total_mapped_sw_id_cov: AtomicU64::new(0),
            short_reads_num: AtomicU64::new(0),
            all_reads_count: AtomicU64::new(0),
            all_reads_len: AtomicU64::new(0),
            total_reads_denovo_clustering: AtomicU64::new(0),
            reads_matched_per_db: (0..num_dbs).map(|_| AtomicU64::new(0)).collect(),
            is_stats_calc: AtomicBool::new(false),
            is_total_mapped_sw_id_cov: AtomicBool::new(false),
        }
    }

    /// Account one read; `short_threshold` gates the short-read counter.
    pub fn record_read(&self, len: usize, short_threshold: u32) {
        self.all_reads_count.fetch_add(1, Ordering::Relaxed);
        self.all_reads_len.fetch_add(len as u64, Ordering::Relaxed);
        self.min_read_len.fetch_min(len as u32, Ordering::Relaxed);
        self.max_read_len.fetch_max(len as u32, Ordering::Relaxed);
        if (len as u32) < short_threshold {
            self.short_reads_num.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn add_aligned(&self) {
        self.total_reads_aligned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_matched(&self, db: usize) {
        self.reads_matched_per_db[db].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            min_read_len: self.min_read_len.load(Ordering::Relaxed),
            max_read_len: self.max_read_len.load(Ordering::Relaxed),
            total_reads_aligned: self.total_reads_aligned.load(Ordering::Relaxed),
            total_mapped_sw_id_cov: self.total_mapped_sw_id_cov.load(Ordering::Relaxed),
            short_reads_num: self.short_reads_num.load(Ordering::Relaxed),
            all_reads_count: self.all_reads_count.load(Ordering::Relaxed),
            all_reads_len: self.all_reads_len.load(Ordering::Relaxed),
            total_reads_denovo_clustering: self
                .total_reads_denovo_clustering
                .load(Ordering::Relaxed),
            reads_matched_per_db: self
                .reads_matched_per_db
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
            is_stats_calc: self.is_stats_calc.load(Ordering::Relaxed),
            is_total_mapped_sw_id_cov: self.is_total_mapped_sw_id_cov.load(Ordering::Relaxed),
        }
    }

    fn apply(&self, snap: &StatsSnapshot) {
        self.min_read_len.store(snap.min_read_len, Ordering::Relaxed);
        self.max_read_len.store(snap.max_read_len, Ordering::Relaxed);
        self.total_reads_aligned
            .store(snap.total_reads_aligned, Ordering::Relaxed);
        self.total_mapped_sw_id_cov
            .store(snap.total_mapped_sw_id_cov, Ordering::Relaxed);
        self.short_reads_num
            .store(snap.short_reads_num, Ordering::Relaxed);
        self.all_reads_count
            .store(snap.all_reads_count, Ordering::Relaxed);
        self.all_reads_len.store(snap.all_reads_len, Ordering::Relaxed);
        self.total_reads_denovo_clustering
            .store(snap.total_reads_denovo_clustering, Ordering::Relaxed);
        for (c, &v) in self.reads_matched_per_db.iter().zip(&snap.reads_matched_per_db) {
            c.store(v, Ordering::Relaxed);
        }
        self.is_stats_calc.store(snap.is_stats_calc, Ordering::Relaxed);
        self.is_total_mapped_sw_id_cov
            .store(snap.is_total_mapped_sw_id_cov, Ordering::Relaxed);
    }

    fn record_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.dbkey, defaults::STATS_SUFFIX))
    }

    /// Persist the current counters into `dir`.
    pub fn store(&self, dir: &Path) -> Result<PathBuf> {
        let path = self.record_path(dir);
        std::fs::write(&path, self.snapshot().to_bytes())?;
        log::info!("stored read statistics to {}", path.display());
        Ok(path)
    }

    /// Load a previous record for the same read-file set, if present and
    /// shaped for the same number of databases.
    pub fn restore(&self, dir: &Path) -> Result<bool> {
        let path = self.record_path(dir);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let snap = StatsSnapshot::from_bytes(&bytes)?;
        if snap.reads_matched_per_db.len() != self.reads_matched_per_db.len() {
            log::warn!(
                "stats record in {} covers {} databases, run uses {}; ignoring it",
                path.display(),
                snap.reads_matched_per_db.len(),
                self.reads_matched_per_db.len()
            );
            return Ok(false);
        }
        self.apply(&snap);
        log::info!(
            "restored read statistics: all_reads_count={} all_reads_len={}",
            snap.all_reads_count,
            snap.all_reads_len
        );
        Ok(true)
    }
}

/// Plain-value image of [`ReadStats`], the unit of persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub min_read_len: u32,
    pub max_read_len: u32,
    pub total_reads_aligned: u64,
    pub total_mapped_sw_id_cov: u64,
    pub short_reads_num: u64,
    pub all_reads_count: u64,
    pub all_reads_len: u64,
    pub total_reads_denovo_clustering: u64,
    pub reads_matched_per_db: Vec<u64>,
    pub is_stats_calc: bool,
    pub is_total_mapped_sw_id_cov: bool,
}

impl StatsSnapshot {
    /// Fixed little-endian layout; see the field order below.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(66 + 8 * self.reads_matched_per_db.len());
        buf.extend_from_slice(&self.min_read_len.to_le_bytes());
        buf.extend_from_slice(&self.max_read_len.to_le_bytes());
        buf.extend_from_slice(&self.total_reads_aligned.to_le_bytes());
        buf.extend_from_slice(&self.total_mapped_sw_id_cov.to_le_bytes());
        buf.extend_from_slice(&self.short_reads_num.to_le_bytes());
        buf.extend_from_slice(&self.all_reads_count.to_le_bytes());
        buf.extend_from_slice(&self.all_reads_len.to_le_bytes());
        buf.extend_from_slice(&self.total_reads_denovo_clustering.to_le_bytes());
        buf.extend_from_slice(&(self.reads_matched_per_db.len() as u64).to_le_bytes());
        for &v in &self.reads_matched_per_db {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.push(self.is_stats_calc as u8);
        buf.push(self.is_total_mapped_sw_id_cov as u8);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(bytes);
        let min_read_len = cursor.read_u32()?;
        let max_read_len = cursor.read_u32()?;
        let total_reads_aligned = cursor.read_u64()?;
        let total_mapped_sw_id_cov = cursor.read_u64()?;
        let short_reads_num = cursor.read_u64()?;
        let all_reads_count = cursor.read_u64()?;
        let all_reads_len = cursor.read_u64()?;
        let total_reads_denovo_clustering = cursor.read_u64()?;
        let per_db_len = cursor.read_u64()? as usize;
        let mut reads_matched_per_db = Vec::with_capacity(per_db_len);
        for _ in 0..per_db_len {
            reads_matched_per_db.push(cursor.read_u64()?);
        }
        let is_stats_calc = cursor.read_u8()? != 0;
        let is_total_mapped_sw_id_cov = cursor.read_u8()? != 0;
        Ok(StatsSnapshot {
            min_read_len,
            max_read_len,
            total_reads_aligned,
            total_mapped_sw_id_cov,
            short_reads_num,
            all_reads_count,
            all_reads_len,
            total_reads_denovo_clustering,
            reads_matched_per_db,
            is_stats_calc,
            is_total_mapped_sw_id_cov,
        })
    }
}
