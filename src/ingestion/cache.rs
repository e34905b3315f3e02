//! Raw Table Cache
//!
//! Memoizes parsed source tables keyed by path and content digest, so a filter
//! change does not re-parse the spreadsheet. Only raw ingestion is cached;
//! normalized and derived tables are always rebuilt from the cached frame.

use crate::error::{ReportError, Result};
use crate::ingestion::loader;
use polars::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

struct CachedTable {
    digest: [u8; 32],
    frame: DataFrame,
}

/// Cache of raw tables, owned by the application state
#[derive(Default)]
pub struct TableCache {
    entries: HashMap<PathBuf, CachedTable>,
    hits: u64,
    misses: u64,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the raw table for `path`, parsing it only if its content changed
    pub fn load(&mut self, path: &Path) -> Result<DataFrame> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ReportError::SourceNotFound(path.to_path_buf()),
            _ => ReportError::Load(format!("Failed to read {}: {}", path.display(), e)),
        })?;
        let digest: [u8; 32] = Sha256::digest(&bytes).into();

        if let Some(cached) = self.entries.get(path) {
            if cached.digest == digest {
                self.hits += 1;
                debug!(path = %path.display(), "raw table cache hit");
                return Ok(cached.frame.clone());
            }
        }

        self.misses += 1;
        let frame = loader::load_table(path)?;
        info!(
            path = %path.display(),
            rows = frame.height(),
            columns = frame.width(),
            "loaded source table"
        );

        self.entries.insert(
            path.to_path_buf(),
            CachedTable {
                digest,
                frame: frame.clone(),
            },
        );

        Ok(frame)
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_load_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        std::fs::write(&path, "Item Code,Category\n1,Drinks\n").unwrap();

        let mut cache = TableCache::new();
        let first = cache.load(&path).unwrap();
        let second = cache.load(&path).unwrap();

        assert_eq!(first.height(), second.height());
        assert_eq!(cache.stats(), (1, 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_changed_content_reparses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        std::fs::write(&path, "Item Code,Category\n1,Drinks\n").unwrap();

        let mut cache = TableCache::new();
        assert_eq!(cache.load(&path).unwrap().height(), 1);

        std::fs::write(&path, "Item Code,Category\n1,Drinks\n2,Snacks\n").unwrap();
        assert_eq!(cache.load(&path).unwrap().height(), 2);
        assert_eq!(cache.stats(), (0, 2));
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let mut cache = TableCache::new();
        let err = cache.load(Path::new("/no/such/prices.xlsx")).unwrap_err();
        assert!(matches!(err, ReportError::SourceNotFound(_)));
        assert!(cache.is_empty());
    }
}
