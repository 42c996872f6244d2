//! Chunk and scope types shared by every retrieval source.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A contiguous excerpt of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Identity of the source version this chunk was cut from
    pub digest: String,
    /// The excerpt text
    pub content: String,
    /// Scope-relative path of the source file
    pub filepath: String,
    /// First line of the excerpt (0-indexed)
    pub start_line: usize,
    /// Last line of the excerpt (0-indexed, inclusive)
    pub end_line: usize,
    /// Position of this chunk within its file
    pub index: usize,
}

impl Chunk {
    /// Key used to collapse duplicates during fusion.
    ///
    /// Chunks cut from the same file version share a digest, so the
    /// position within the file completes the identity.
    pub fn identity(&self) -> (&str, usize) {
        (&self.digest, self.index)
    }

    /// Whether this chunk lives under `directory`.
    pub fn is_under(&self, directory: &str) -> bool {
        let dir = directory.trim_end_matches('/');
        if dir.is_empty() {
            return true;
        }
        self.filepath == dir
            || self
                .filepath
                .strip_prefix(dir)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// One indexable scope of a workspace: a branch checked out at a directory root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub branch: String,
    pub directory: String,
}

impl Tag {
    pub fn new(branch: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            directory: directory.into(),
        }
    }
}

/// Compute the digest of a file version from its path and contents.
pub fn compute_digest(filepath: &str, contents: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filepath.as_bytes());
    hasher.update([0u8]);
    hasher.update(contents.as_bytes());
    hex::encode(hasher.finalize())
}
