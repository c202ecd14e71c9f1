//! # Samples Module
//!
//! In-memory view of one directory tree of audio samples.
//!
//! ## Architecture
//!
//! ### [`scanner`] - Directory Scanner
//! - Iterative walk with an explicit stack of pending directories
//! - Case-insensitive extension allow-list (`mp3 wav ogg flac m4a aiff`)
//! - Per-entry failures are skipped, stat failures record size 0
//!
//! ### [`identifier`] - Sample Identifier
//! - Deterministic slug derived from the base name only
//!
//! ### [`metadata`] - Metadata Extractor
//! - Symphonia probe per file on the blocking pool
//! - Failures degrade to an extension-derived record, never shrink the batch
//!
//! ### [`SampleLibrary`] - Cached Facade
//! - Two [`TtlCache`] slots: the raw scan and the metadata batch
//! - `invalidate()` clears both together, since metadata from a stale scan
//!   is stale too
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use strudel_sampler::samples::SampleLibrary;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let library = SampleLibrary::new("./samples", Duration::from_secs(3600), Some(500), 4);
//!
//! let entries = library.list_entries().await;
//! let metadata = library.list_metadata().await;
//! assert_eq!(entries.len(), metadata.len());
//!
//! // Tras un cambio en disco
//! library.invalidate();
//! # }
//! ```

pub mod identifier;
pub mod metadata;
pub mod scanner;

use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use metadata::MetadataRecord;

/// One audio file found under the sample root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleEntry {
    /// Slug from the base name; not unique across folders
    pub id: String,
    /// Path below the root, `/`-separated
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
}

/// Scan and metadata caches over one sample root.
///
/// Owned by the server for the process lifetime and shared by `Arc` with
/// request handlers and the watcher task.
#[derive(Debug)]
pub struct SampleLibrary {
    root: PathBuf,
    entries: TtlCache<Arc<Vec<SampleEntry>>>,
    metadata: TtlCache<Arc<Vec<MetadataRecord>>>,
    metadata_concurrency: usize,
}

impl SampleLibrary {
    /// Creates the root if needed and canonicalizes it.
    pub fn new(
        root: impl Into<PathBuf>,
        ttl: Duration,
        max_size: Option<usize>,
        metadata_concurrency: usize,
    ) -> Self {
        let root = prepare_root(root.into());
        info!("📁 Biblioteca de samples en: {}", root.display());

        Self {
            root,
            entries: TtlCache::new(ttl, max_size),
            metadata: TtlCache::new(ttl, max_size),
            metadata_concurrency,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every sample under the root, from cache or a fresh scan.
    pub async fn list_entries(&self) -> Arc<Vec<SampleEntry>> {
        self.entries
            .get(|| async {
                let root = self.root.clone();
                let samples = match tokio::task::spawn_blocking(move || scanner::scan(&root)).await
                {
                    Ok(samples) => samples,
                    Err(err) => {
                        warn!(error = %err, "Scan task failed, returning no samples");
                        Vec::new()
                    }
                };
                debug!("🔍 Escaneados {} samples", samples.len());
                Arc::new(samples)
            })
            .await
    }

    /// One metadata record per entry of [`Self::list_entries`].
    pub async fn list_metadata(&self) -> Arc<Vec<MetadataRecord>> {
        self.metadata
            .get(|| async {
                let entries = self.list_entries().await;
                Arc::new(metadata::extract_batch(&entries, self.metadata_concurrency).await)
            })
            .await
    }

    /// Descarta scan y metadata; el próximo acceso recalcula.
    pub fn invalidate(&self) {
        self.entries.clear();
        self.metadata.clear();

        let scan = self.entries.metrics();
        debug!(
            hits = scan.hits,
            misses = scan.misses,
            overflows = scan.overflows,
            hit_rate = scan.hit_rate(),
            "Sample cache invalidated"
        );
    }
}

fn prepare_root(root: PathBuf) -> PathBuf {
    if let Err(err) = std::fs::create_dir_all(&root) {
        warn!(root = %root.display(), error = %err, "Could not create sample root");
    }
    match root.canonicalize() {
        Ok(canonical) => canonical,
        Err(err) => {
            warn!(root = %root.display(), error = %err, "Could not canonicalize sample root");
            root
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn library(dir: &TempDir, ttl: Duration, max_size: Option<usize>) -> SampleLibrary {
        SampleLibrary::new(dir.path(), ttl, max_size, 2)
    }

    fn relative_paths(entries: &[SampleEntry]) -> Vec<String> {
        let mut paths: Vec<_> = entries.iter().map(|e| e.relative_path.clone()).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_new_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested/samples");

        let library = SampleLibrary::new(&root, HOUR, None, 1);

        assert!(root.is_dir());
        assert_eq!(library.root(), root.canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_repeat_listing_is_memoized() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kick.wav"), b"k").unwrap();
        let library = library(&dir, HOUR, None);

        let first = library.list_entries().await;
        let second = library.list_entries().await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(library.entries.metrics().misses, 1);
    }

    #[tokio::test]
    async fn test_invalidate_picks_up_new_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kick.wav"), b"k").unwrap();
        let library = library(&dir, HOUR, None);
        assert_eq!(library.list_entries().await.len(), 1);

        fs::write(dir.path().join("snare.wav"), b"s").unwrap();
        assert_eq!(library.list_entries().await.len(), 1);

        library.invalidate();
        assert_eq!(
            relative_paths(&library.list_entries().await),
            vec!["kick.wav", "snare.wav"]
        );
    }

    #[tokio::test]
    async fn test_ttl_expiry_rescans() {
        let dir = TempDir::new().unwrap();
        let library = library(&dir, Duration::from_millis(50), None);
        assert!(library.list_entries().await.is_empty());

        fs::write(dir.path().join("hat.ogg"), b"h").unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(library.list_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_rescans() {
        let dir = TempDir::new().unwrap();
        let library = library(&dir, Duration::ZERO, None);

        library.list_entries().await;
        fs::write(dir.path().join("hat.ogg"), b"h").unwrap();
        library.list_entries().await;
        let entries = library.list_entries().await;

        assert_eq!(entries.len(), 1);
        assert_eq!(library.entries.metrics().misses, 3);
    }

    #[tokio::test]
    async fn test_oversized_scan_is_not_kept() {
        let dir = TempDir::new().unwrap();
        for name in ["a.wav", "b.wav", "c.wav"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let library = library(&dir, HOUR, Some(2));

        assert_eq!(library.list_entries().await.len(), 3);
        assert_eq!(library.entries.metrics().overflows, 1);

        library.list_entries().await;
        assert_eq!(library.entries.metrics().misses, 2);
    }

    #[tokio::test]
    async fn test_metadata_matches_entries_even_when_probes_fail() {
        let dir = TempDir::new().unwrap();
        metadata::tests::write_wav(&dir.path().join("tone.wav"), 8000, 1, 800);
        fs::write(dir.path().join("junk.mp3"), b"junk").unwrap();
        fs::write(dir.path().join("empty.flac"), b"").unwrap();
        let library = library(&dir, HOUR, None);

        let entries = library.list_entries().await;
        let records = library.list_metadata().await;

        assert_eq!(records.len(), entries.len());
        let entry_ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        let record_ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(entry_ids, record_ids);

        let tone = records.iter().find(|r| r.id == "tone").unwrap();
        assert_eq!(tone.sample_rate, Some(8000));
    }

    #[tokio::test]
    async fn test_invalidate_clears_metadata_too() {
        let dir = TempDir::new().unwrap();
        let library = library(&dir, HOUR, None);
        assert!(library.list_metadata().await.is_empty());

        fs::write(dir.path().join("kick.wav"), b"k").unwrap();
        library.invalidate();

        assert_eq!(library.list_metadata().await.len(), 1);
    }

    #[tokio::test]
    async fn test_same_basename_in_two_folders_keeps_both_entries() {
        // Ids colisionan por diseño: ambos entries existen, el manifest plano
        // se queda con uno solo (ver server::tests).
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a/kick.wav"), b"a").unwrap();
        fs::write(dir.path().join("b/kick.wav"), b"b").unwrap();
        let library = library(&dir, HOUR, None);

        let entries = library.list_entries().await;

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.id == "kick"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_listing_returns_complete_scans() {
        let dir = TempDir::new().unwrap();
        for i in 0..20 {
            fs::write(dir.path().join(format!("s{i}.wav")), b"x").unwrap();
        }
        let library = Arc::new(library(&dir, HOUR, None));

        let a = tokio::spawn({
            let library = library.clone();
            async move { library.list_entries().await }
        });
        let b = tokio::spawn({
            let library = library.clone();
            async move { library.list_entries().await }
        });

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a.len(), 20);
        assert_eq!(relative_paths(&a), relative_paths(&b));
    }
}
