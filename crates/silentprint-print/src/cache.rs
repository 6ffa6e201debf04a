// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded on-disk cache of resolved PDFs.
//
// Every job materializes its PDF here as `<uuid>.pdf`.  Files are written to
// a staging temp file inside the same directory and renamed into place once
// complete, so a concurrent directory scan never sees a half-written entry.
// Only `*.pdf` files count as entries.  The cache keeps at most
// `max_entries` files; eviction deletes the oldest by modification time and
// is best-effort: failures are logged, never returned.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use silentprint_core::error::{PrintError, Result};
use silentprint_core::types::{CacheEntry, EntryId};

/// Default number of retained PDFs.
pub const MAX_CACHE: usize = 5;

/// Extension of committed cache entries.
const ENTRY_EXTENSION: &str = "pdf";

/// Prefix of in-progress staging files (never counted as entries).
const STAGING_PREFIX: &str = ".staging-";
const STAGING_SUFFIX: &str = ".part";

/// Staging files older than this at startup are leftovers from a crash.
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(10 * 60);

/// A cache file being written.  Dropping it without committing deletes it.
pub struct StagedFile {
    id: EntryId,
    file: NamedTempFile,
}

impl StagedFile {
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Writable handle to the staging file.
    pub fn file_mut(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Outcome of an eviction pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionReport {
    pub removed: usize,
    pub failed: usize,
}

/// The cache directory and its retention cap.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    max_entries: usize,
}

impl CacheStore {
    /// Open (or create) the cache directory.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>, max_entries: usize) -> Result<Self> {
        if max_entries == 0 {
            return Err(PrintError::Internal("cache must retain at least one entry".into()));
        }
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let store = Self { dir, max_entries };
        let swept = store.sweep_staging(STALE_STAGING_AGE);
        info!(max_entries, swept, "pdf cache opened");
        Ok(store)
    }

    /// Remove staging files left by an interrupted write.
    ///
    /// Only files untouched for `min_age` go, so a write still in progress in
    /// another process is left alone.  Returns how many were removed.
    pub fn sweep_staging(&self, min_age: Duration) -> usize {
        let dirents = match fs::read_dir(&self.dir) {
            Ok(dirents) => dirents,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cache scan failed, skipping staging sweep");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for dirent in dirents.filter_map(|d| d.ok()) {
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(STAGING_PREFIX) || !name.ends_with(STAGING_SUFFIX) {
                continue;
            }
            let age = dirent
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_none_or(|age| age < min_age) {
                continue;
            }
            match fs::remove_file(dirent.path()) {
                Ok(()) => {
                    removed += 1;
                    debug!(file = name, "removed stale staging file");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = name, error = %e, "failed to remove stale staging file"),
            }
        }
        removed
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Start a new entry with a fresh identifier.
    pub fn stage(&self) -> Result<StagedFile> {
        let file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(&self.dir)?;
        Ok(StagedFile {
            id: EntryId::new(),
            file,
        })
    }

    /// Final path an entry with `id` is committed to.
    pub fn entry_path(&self, id: EntryId) -> PathBuf {
        self.dir.join(format!("{id}.{ENTRY_EXTENSION}"))
    }

    /// Rename a fully written staging file into place.
    ///
    /// With `evict` set, older entries are trimmed first so that the cache
    /// holds at most `max_entries` once the new one lands.
    #[instrument(skip_all, fields(entry = %staged.id))]
    pub fn commit(&self, mut staged: StagedFile, evict: bool) -> Result<CacheEntry> {
        staged.file.as_file_mut().flush()?;

        if evict {
            self.evict_to(self.max_entries - 1);
        }

        let path = self.entry_path(staged.id);
        staged
            .file
            .persist_noclobber(&path)
            .map_err(|e| PrintError::Io(e.error))?;

        debug!(path = %path.display(), "cache entry committed");
        Ok(CacheEntry {
            id: staged.id,
            path,
            created_at: Utc::now(),
        })
    }

    /// Trim the cache to its cap.
    pub fn evict(&self) -> EvictionReport {
        self.evict_to(self.max_entries)
    }

    /// Delete all but the `keep` most recently modified entries.
    pub fn evict_to(&self, keep: usize) -> EvictionReport {
        let mut report = EvictionReport::default();

        let mut files = match self.pdf_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cache scan failed, skipping eviction");
                return report;
            }
        };
        if files.len() <= keep {
            return report;
        }

        // Oldest first.
        files.sort_by_key(|(_, modified)| *modified);
        let excess = files.len() - keep;

        for (path, _) in files.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    report.removed += 1;
                    debug!(path = %path.display(), "evicted cache entry");
                }
                // A concurrent eviction got there first.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(path = %path.display(), error = %e, "failed to evict cache entry");
                }
            }
        }

        if report.removed > 0 {
            info!(removed = report.removed, failed = report.failed, "cache eviction finished");
        }
        report
    }

    /// Current entries, newest first.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut files = self.pdf_files()?;
        files.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(files
            .into_iter()
            .filter_map(|(path, modified)| {
                let stem = path.file_stem()?.to_str()?;
                let id = Uuid::parse_str(stem).ok()?;
                Some(CacheEntry {
                    id: EntryId(id),
                    path,
                    created_at: DateTime::<Utc>::from(modified),
                })
            })
            .collect())
    }

    /// All committed `*.pdf` files with their modification times.
    fn pdf_files(&self) -> io::Result<Vec<(PathBuf, SystemTime)>> {
        let mut files = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let dirent = dirent?;
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            // The file may vanish between listing and stat.
            let Ok(meta) = dirent.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((path, modified));
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_entry(store: &CacheStore, bytes: &[u8]) -> CacheEntry {
        let mut staged = store.stage().expect("stage");
        staged.file_mut().write_all(bytes).expect("write");
        store.commit(staged, true).expect("commit")
    }

    /// Create a committed-looking entry with a given age.
    fn plant_entry(dir: &Path, age_secs: u64) -> PathBuf {
        let path = dir.join(format!("{}.pdf", Uuid::new_v4()));
        fs::write(&path, b"%PDF-1.4").expect("write");
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(mtime))
            .expect("set mtime");
        path
    }

    fn pdf_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("pdf"))
            .count()
    }

    #[test]
    fn commit_moves_staged_bytes_into_place() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path(), MAX_CACHE).unwrap();

        let entry = write_entry(&store, b"%PDF-1.7 label");

        assert_eq!(entry.path, store.entry_path(entry.id));
        assert_eq!(fs::read(&entry.path).unwrap(), b"%PDF-1.7 label");
        // Only the committed file is left behind.
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn dropped_stage_leaves_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path(), MAX_CACHE).unwrap();

        let staged = store.stage().unwrap();
        let staging_path = staged.path().to_path_buf();
        drop(staged);

        assert!(!staging_path.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn cache_never_exceeds_cap() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path(), MAX_CACHE).unwrap();

        let mut last = None;
        for i in 0..8u8 {
            last = Some(write_entry(&store, &[i]));
            assert!(pdf_count(tmp.path()) <= MAX_CACHE);
        }

        assert_eq!(pdf_count(tmp.path()), MAX_CACHE);
        assert!(last.unwrap().path.exists());
    }

    #[test]
    fn eviction_keeps_most_recent_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path(), MAX_CACHE).unwrap();

        // Ages 600s (oldest) down to 100s.
        let planted: Vec<PathBuf> = (1..=6).rev().map(|n| plant_entry(tmp.path(), n * 100)).collect();

        let fresh = write_entry(&store, b"new");

        assert_eq!(pdf_count(tmp.path()), MAX_CACHE);
        assert!(fresh.path.exists());
        // The two oldest went, the four youngest stayed.
        assert!(!planted[0].exists());
        assert!(!planted[1].exists());
        for path in &planted[2..] {
            assert!(path.exists(), "{} should be retained", path.display());
        }
    }

    #[test]
    fn commit_without_eviction_leaves_older_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path(), 2).unwrap();
        for age in [300, 200, 100] {
            plant_entry(tmp.path(), age);
        }

        let mut staged = store.stage().unwrap();
        staged.file_mut().write_all(b"remote").unwrap();
        store.commit(staged, false).unwrap();

        assert_eq!(pdf_count(tmp.path()), 4);
        assert_eq!(store.evict(), EvictionReport { removed: 2, failed: 0 });
        assert_eq!(pdf_count(tmp.path()), 2);
    }

    #[test]
    fn foreign_files_are_not_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path(), 1).unwrap();
        fs::write(tmp.path().join("notes.txt"), b"keep me").unwrap();
        plant_entry(tmp.path(), 50);

        write_entry(&store, b"x");

        assert!(tmp.path().join("notes.txt").exists());
        assert_eq!(pdf_count(tmp.path()), 1);
    }

    #[test]
    fn entries_are_listed_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path(), MAX_CACHE).unwrap();
        let old = plant_entry(tmp.path(), 500);
        let young = plant_entry(tmp.path(), 10);

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, young);
        assert_eq!(entries[1].path, old);
    }

    #[test]
    fn open_sweeps_stale_staging_files() {
        let tmp = tempfile::tempdir().unwrap();
        let stale = tmp.path().join(".staging-crashed.part");
        fs::write(&stale, b"%PDF-1.4 half").unwrap();
        File::options()
            .write(true)
            .open(&stale)
            .and_then(|f| f.set_modified(SystemTime::now() - STALE_STAGING_AGE * 2))
            .unwrap();
        let fresh = tmp.path().join(".staging-inflight.part");
        fs::write(&fresh, b"%PDF-1.4 still writing").unwrap();
        let kept = plant_entry(tmp.path(), 3600);

        let store = CacheStore::open(tmp.path(), MAX_CACHE).unwrap();

        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(kept.exists());
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(CacheStore::open(tmp.path(), 0).is_err());
    }
}
