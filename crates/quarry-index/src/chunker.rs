//! Line-based document chunking.
//!
//! Recency fallback chunks whole files on demand, so the chunker only has to
//! honour a maximum chunk size. Chunks never split a line.

use crate::chunk::Chunk;

/// A document handed to a [`Chunker`].
#[derive(Debug, Clone)]
pub struct ChunkDocument<'a> {
    pub filepath: &'a str,
    pub contents: &'a str,
    /// Maximum chunk size in approximate tokens
    pub max_chunk_size: usize,
    /// Digest stamped on every produced chunk
    pub digest: &'a str,
}

/// Splits a document into chunks.
///
/// The returned iterator is lazy and finite; calling `chunk` again restarts it.
pub trait Chunker: Send + Sync {
    fn chunk<'a>(&'a self, document: &ChunkDocument<'a>) -> Box<dyn Iterator<Item = Chunk> + 'a>;
}

/// Rough token estimate for a line of source text.
pub fn approximate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Accumulates whole lines until the next one would exceed the size budget.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicChunker;

impl Chunker for BasicChunker {
    fn chunk<'a>(&'a self, document: &ChunkDocument<'a>) -> Box<dyn Iterator<Item = Chunk> + 'a> {
        Box::new(LineChunks {
            lines: document.contents.lines().enumerate(),
            filepath: document.filepath,
            digest: document.digest,
            max_chunk_size: document.max_chunk_size.max(1),
            pending: None,
            index: 0,
        })
    }
}

struct LineChunks<'a, I> {
    lines: I,
    filepath: &'a str,
    digest: &'a str,
    max_chunk_size: usize,
    /// First line of the next chunk, carried over from the previous call
    pending: Option<(usize, &'a str, usize)>,
    index: usize,
}

impl<'a, I> Iterator for LineChunks<'a, I>
where
    I: Iterator<Item = (usize, &'a str)>,
{
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let mut content = String::new();
        let mut tokens = 0;
        let mut start_line = None;
        let mut end_line = 0;

        loop {
            let next = match self.pending.take() {
                Some(line) => Some(line),
                None => self
                    .lines
                    .next()
                    .map(|(number, line)| (number, line, approximate_tokens(line) + 1)),
            };

            let Some((number, line, cost)) = next else {
                break;
            };

            // A single line over budget can never fit
            if cost > self.max_chunk_size {
                continue;
            }

            if tokens + cost > self.max_chunk_size {
                self.pending = Some((number, line, cost));
                break;
            }

            start_line.get_or_insert(number);
            end_line = number;
            tokens += cost;
            content.push_str(line);
            content.push('\n');
        }

        let start_line = start_line?;
        let chunk = Chunk {
            digest: self.digest.to_string(),
            content,
            filepath: self.filepath.to_string(),
            start_line,
            end_line,
            index: self.index,
        };
        self.index += 1;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document<'a>(contents: &'a str, max_chunk_size: usize) -> ChunkDocument<'a> {
        ChunkDocument {
            filepath: "src/lib.rs",
            contents,
            max_chunk_size,
            digest: "src/lib.rs",
        }
    }

    #[test]
    fn test_small_file_is_one_chunk() {
        let chunks: Vec<_> = BasicChunker.chunk(&document("fn a() {}\nfn b() {}\n", 512)).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 0);
        assert_eq!(chunks[0].end_line, 1);
        assert_eq!(chunks[0].content, "fn a() {}\nfn b() {}\n");
        assert_eq!(chunks[0].digest, "src/lib.rs");
    }

    #[test]
    fn test_splits_on_budget() {
        // Each 8-char line costs 2 + 1 tokens; budget 6 fits two lines
        let contents = "aaaaaaaa\nbbbbbbbb\ncccccccc\ndddddddd\neeeeeeee\n";
        let chunks: Vec<_> = BasicChunker.chunk(&document(contents, 6)).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (0, 1));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (2, 3));
        assert_eq!((chunks[2].start_line, chunks[2].end_line), (4, 4));
        let indices: Vec<_> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_oversized_line_is_skipped() {
        let long = "x".repeat(100);
        let contents = format!("short\n{}\nshort again\n", long);
        let chunks: Vec<_> = BasicChunker.chunk(&document(&contents, 10)).collect();
        assert!(chunks.iter().all(|c| !c.content.contains(&long)));
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(BasicChunker.chunk(&document("", 512)).count(), 0);
    }

    #[test]
    fn test_restartable() {
        let doc = document("a\nb\nc\n", 2);
        let first: Vec<_> = BasicChunker.chunk(&doc).collect();
        let second: Vec<_> = BasicChunker.chunk(&doc).collect();
        assert_eq!(first, second);
    }
}
