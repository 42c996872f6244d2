//! Recently edited and open files as a retrieval source.
//!
//! When no index is warm yet (a fresh editor session), the files a user has
//! just touched are the best stand-in for relevance. The host feeds edit
//! events into [`RecentlyEditedFiles`]; [`RecencySource`] turns a snapshot of
//! it, padded with open editor tabs, into chunks.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::chunker::{ChunkDocument, Chunker};
use crate::ide::Ide;

/// Default number of edited files remembered.
pub const DEFAULT_RECENT_FILES_CAPACITY: usize = 100;

/// Most-recently-edited-first set of file paths.
///
/// Owned by the host session and shared by reference with every pipeline.
/// Reads copy a snapshot and release the lock immediately.
pub struct RecentlyEditedFiles {
    cache: RwLock<LruCache<String, Instant>>,
    max_age: Option<Duration>,
}

impl RecentlyEditedFiles {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            max_age: None,
        }
    }

    /// Ignore edits older than `max_age` when reading.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, LruCache<String, Instant>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LruCache<String, Instant>> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Host event: `path` was edited.
    pub fn record_edit(&self, path: impl Into<String>) {
        self.write().put(path.into(), Instant::now());
    }

    /// Host event: `path` was closed or deleted.
    pub fn forget(&self, path: &str) {
        self.write().pop(path);
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `n` paths, most recently edited first.
    pub fn most_recent(&self, n: usize) -> Vec<String> {
        let now = Instant::now();
        self.read()
            .iter()
            .filter(|(_, edited)| {
                self.max_age
                    .map_or(true, |max_age| now.duration_since(**edited) <= max_age)
            })
            .take(n)
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl Default for RecentlyEditedFiles {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_FILES_CAPACITY)
    }
}

/// Chunks of recently edited files, topped up with open files.
pub struct RecencySource {
    recent: Arc<RecentlyEditedFiles>,
    ide: Arc<dyn Ide>,
    chunker: Arc<dyn Chunker>,
    max_chunk_size: usize,
}

impl RecencySource {
    pub fn new(
        recent: Arc<RecentlyEditedFiles>,
        ide: Arc<dyn Ide>,
        chunker: Arc<dyn Chunker>,
        max_chunk_size: usize,
    ) -> Self {
        Self {
            recent,
            ide,
            chunker,
            max_chunk_size,
        }
    }

    /// Up to `n` distinct paths: recent edits first, then open files.
    pub async fn recent_paths(&self, n: usize) -> Vec<String> {
        let mut paths = self.recent.most_recent(n);
        if paths.len() >= n {
            return paths;
        }

        let open_files = match self.ide.open_files().await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Failed to list open files");
                Vec::new()
            }
        };

        let mut seen: HashSet<String> = paths.iter().cloned().collect();
        for file in open_files {
            if paths.len() >= n {
                break;
            }
            if seen.insert(file.clone()) {
                paths.push(file);
            }
        }
        paths
    }

    /// Up to `n` chunks from the files returned by [`recent_paths`](Self::recent_paths).
    pub async fn most_recent(&self, n: usize) -> Vec<Chunk> {
        if n == 0 {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        for filepath in self.recent_paths(n).await {
            if chunks.len() >= n {
                break;
            }

            let contents = match self.ide.read_file(&filepath).await {
                Ok(contents) => contents,
                Err(e) => {
                    warn!(path = %filepath, error = %e, "Skipping unreadable recent file");
                    continue;
                }
            };

            let document = ChunkDocument {
                filepath: &filepath,
                contents: &contents,
                max_chunk_size: self.max_chunk_size,
                digest: &filepath,
            };
            let remaining = n - chunks.len();
            chunks.extend(self.chunker.chunk(&document).take(remaining));
        }

        debug!(count = chunks.len(), "Collected recent file chunks");
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::BasicChunker;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeIde {
        files: HashMap<String, String>,
        open: Vec<String>,
    }

    #[async_trait]
    impl Ide for FakeIde {
        async fn workspace_dirs(&self) -> Result<Vec<String>> {
            Ok(vec!["/repo".to_string()])
        }

        async fn open_files(&self) -> Result<Vec<String>> {
            Ok(self.open.clone())
        }

        async fn read_file(&self, path: &str) -> Result<String> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow!("no such file: {path}"))
        }
    }

    fn fake_ide(paths: &[&str], open: &[&str]) -> Arc<FakeIde> {
        Arc::new(FakeIde {
            files: paths
                .iter()
                .map(|p| (p.to_string(), format!("// {p}\nfn body() {{}}\n")))
                .collect(),
            open: open.iter().map(|p| p.to_string()).collect(),
        })
    }

    fn source(recent: Arc<RecentlyEditedFiles>, ide: Arc<FakeIde>, max_chunk_size: usize) -> RecencySource {
        RecencySource::new(recent, ide, Arc::new(BasicChunker), max_chunk_size)
    }

    #[test]
    fn test_most_recent_first() {
        let recent = RecentlyEditedFiles::new(10);
        recent.record_edit("a.rs");
        recent.record_edit("b.rs");
        recent.record_edit("a.rs");
        assert_eq!(recent.most_recent(10), vec!["a.rs", "b.rs"]);
        assert_eq!(recent.most_recent(1), vec!["a.rs"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let recent = RecentlyEditedFiles::new(2);
        recent.record_edit("a.rs");
        recent.record_edit("b.rs");
        recent.record_edit("c.rs");
        assert_eq!(recent.most_recent(10), vec!["c.rs", "b.rs"]);
    }

    #[test]
    fn test_forget_and_clear() {
        let recent = RecentlyEditedFiles::new(5);
        recent.record_edit("a.rs");
        recent.record_edit("b.rs");
        recent.forget("a.rs");
        assert_eq!(recent.most_recent(5), vec!["b.rs"]);
        recent.clear();
        assert!(recent.is_empty());
    }

    #[test]
    fn test_max_age_hides_stale_edits() {
        let recent = RecentlyEditedFiles::new(5).with_max_age(Duration::ZERO);
        recent.record_edit("a.rs");
        std::thread::sleep(Duration::from_millis(5));
        assert!(recent.most_recent(5).is_empty());
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_pads_with_open_files_without_duplicates() {
        let recent = Arc::new(RecentlyEditedFiles::new(10));
        recent.record_edit("/repo/b.rs");
        recent.record_edit("/repo/a.rs");

        let all = ["/repo/a.rs", "/repo/b.rs", "/repo/c.rs", "/repo/d.rs", "/repo/e.rs", "/repo/f.rs"];
        // a.rs is both recent and open
        let ide = fake_ide(&all, &["/repo/a.rs", "/repo/c.rs", "/repo/d.rs", "/repo/e.rs", "/repo/f.rs"]);
        let paths = source(recent, ide, 512).recent_paths(5).await;

        assert_eq!(
            paths,
            vec!["/repo/a.rs", "/repo/b.rs", "/repo/c.rs", "/repo/d.rs", "/repo/e.rs"]
        );
    }

    #[tokio::test]
    async fn test_open_files_exhausted() {
        let recent = Arc::new(RecentlyEditedFiles::new(10));
        recent.record_edit("/repo/a.rs");
        let ide = fake_ide(&["/repo/a.rs", "/repo/b.rs"], &["/repo/b.rs"]);
        let paths = source(recent, ide, 512).recent_paths(5).await;
        assert_eq!(paths, vec!["/repo/a.rs", "/repo/b.rs"]);
    }

    #[tokio::test]
    async fn test_chunks_use_path_as_digest() {
        let recent = Arc::new(RecentlyEditedFiles::new(10));
        recent.record_edit("/repo/a.rs");
        let ide = fake_ide(&["/repo/a.rs"], &[]);
        let chunks = source(recent, ide, 512).most_recent(5).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].digest, "/repo/a.rs");
        assert_eq!(chunks[0].filepath, "/repo/a.rs");
    }

    #[tokio::test]
    async fn test_truncates_to_n_chunks() {
        let recent = Arc::new(RecentlyEditedFiles::new(10));
        recent.record_edit("/repo/b.rs");
        recent.record_edit("/repo/a.rs");
        let ide = fake_ide(&["/repo/a.rs", "/repo/b.rs"], &[]);
        // Budget of 6 tokens puts each line in its own chunk
        let chunks = source(recent, ide, 6).most_recent(3).await;
        assert_eq!(chunks.len(), 3);
        assert!(chunks[..2].iter().all(|c| c.filepath == "/repo/a.rs"));
        assert_eq!(chunks[2].filepath, "/repo/b.rs");
    }

    #[tokio::test]
    async fn test_unreadable_files_are_skipped() {
        let recent = Arc::new(RecentlyEditedFiles::new(10));
        recent.record_edit("/repo/b.rs");
        recent.record_edit("/repo/missing.rs");
        let ide = fake_ide(&["/repo/b.rs"], &[]);
        let chunks = source(recent, ide, 512).most_recent(5).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].filepath, "/repo/b.rs");
    }
}
