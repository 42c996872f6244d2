//! Rendering of search results.

use std::fmt::Write;

use serde::Serialize;

use quarry_index::Chunk;

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    results: &'a [Chunk],
}

pub fn render_json(query: &str, chunks: &[Chunk]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&SearchOutput {
        query,
        results: chunks,
    })
}

/// One header line per chunk (1-based line numbers) followed by its content.
pub fn render_text(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return "No results.\n".to_string();
    }

    let mut out = String::new();
    for (rank, chunk) in chunks.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {}:{}-{}",
            rank + 1,
            chunk.filepath,
            chunk.start_line + 1,
            chunk.end_line + 1
        );
        for line in chunk.content.lines() {
            let _ = writeln!(out, "    {line}");
        }
        out.push('\n');
    }
    out
}
