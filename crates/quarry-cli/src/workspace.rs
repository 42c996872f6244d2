//! Load a workspace into the in-process indexes before a search.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use quarry_index::{
    compute_digest, BasicChunker, ChunkDocument, Chunker, InMemoryVectorIndex, Tag, TrigramIndex,
};

/// Files larger than this are not indexed.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Directories skipped even when not git-ignored.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", ".git", "vendor", "__pycache__"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub files: usize,
    pub chunks: usize,
    pub skipped: usize,
}

/// Walks a workspace and feeds every text file into the indexes.
pub struct WorkspaceIndexer {
    root: PathBuf,
    tag: Tag,
    max_chunk_size: usize,
    chunker: BasicChunker,
}

impl WorkspaceIndexer {
    pub fn new(root: PathBuf, tag: Tag, max_chunk_size: usize) -> Self {
        Self {
            root,
            tag,
            max_chunk_size,
            chunker: BasicChunker,
        }
    }

    /// Candidate files under the root, respecting `.gitignore`.
    pub fn collect_files(&self) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .filter_entry(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map_or(true, |name| !SKIPPED_DIRS.contains(&name))
            })
            .build();

        let mut files: Vec<PathBuf> = walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .filter(|entry| {
                entry
                    .metadata()
                    .map_or(false, |m| m.len() <= MAX_FILE_BYTES)
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    /// Chunk every file into `lexical`, and into `vector` when given.
    pub async fn index(
        &self,
        lexical: &TrigramIndex,
        vector: Option<&InMemoryVectorIndex>,
    ) -> Result<IndexStats> {
        let mut stats = IndexStats::default();

        for path in self.collect_files() {
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(e) => {
                    // Binary files land here too
                    debug!(path = %path.display(), error = %e, "Skipping unreadable file");
                    stats.skipped += 1;
                    continue;
                }
            };

            let filepath = path.to_string_lossy().into_owned();
            let digest = compute_digest(&filepath, &contents);
            let document = ChunkDocument {
                filepath: &filepath,
                contents: &contents,
                max_chunk_size: self.max_chunk_size,
                digest: &digest,
            };
            let chunks: Vec<_> = self.chunker.chunk(&document).collect();
            if chunks.is_empty() {
                stats.skipped += 1;
                continue;
            }

            stats.files += 1;
            stats.chunks += chunks.len();

            if let Some(vector) = vector {
                if let Err(e) = vector.add_chunks(&self.tag, chunks.clone()).await {
                    warn!(path = %filepath, error = %e, "Failed to embed file");
                }
            }
            lexical.add_chunks(&self.tag, chunks).await;
        }

        info!(
            files = stats.files,
            chunks = stats.chunks,
            skipped = stats.skipped,
            "Indexed workspace"
        );
        Ok(stats)
    }
}

/// Absolute form of `path`, resolving relative paths against `base`.
pub fn absolutize(base: &Path, path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    joined
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", joined.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_index::{LexicalIndex, LexicalQuery, QueryNormalizer};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_collect_files_skips_build_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn a() {}\n").unwrap();
        fs::write(dir.path().join("target/debug/out.rs"), "generated\n").unwrap();

        let indexer = WorkspaceIndexer::new(dir.path().to_path_buf(), Tag::new("main", "/"), 512);
        let files = indexer.collect_files();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/lib.rs"));
    }

    #[tokio::test]
    async fn test_index_then_search() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("parser.rs"), "pub fn parse_json(input: &str) {}\n").unwrap();
        fs::write(root.join("server.rs"), "async fn listen() {}\n").unwrap();
        fs::write(root.join("blob.bin"), [0xff, 0xfe, 0x00, 0x9f]).unwrap();

        let tag = Tag::new("main", root.to_string_lossy());
        let indexer = WorkspaceIndexer::new(root.clone(), tag.clone(), 512);
        let lexical = TrigramIndex::new();
        let stats = indexer.index(&lexical, None).await.unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.skipped, 1);

        let query = LexicalQuery {
            n: 5,
            text: QueryNormalizer::new().normalize("parse json"),
            tags: vec![tag],
            directory: None,
        };
        let hits = lexical.retrieve(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].filepath.ends_with("parser.rs"));
    }

    #[test]
    fn test_absolutize_relative_path() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "").unwrap();
        let resolved = absolutize(dir.path(), Path::new("a.rs")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("a.rs"));
        assert!(absolutize(dir.path(), Path::new("missing.rs")).is_err());
    }
}
