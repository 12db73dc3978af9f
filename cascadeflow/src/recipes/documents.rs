//! Plain-text document ingestion for the research and chat stores.

use crate::errors::CascadeError;
use crate::providers::EmbeddingProvider;
use crate::vectorstore::{VectorRecord, VectorStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Default chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// A source document before chunking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Where the text came from, e.g. a relative file path.
    pub source: String,
    /// Full text.
    pub text: String,
}

impl Document {
    /// Creates a document.
    #[must_use]
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// Splits text into overlapping chunks of at most `chunk_size` characters.
///
/// A chunk ends at the last paragraph break, line break, or space inside
/// the window, in that order of preference, and falls back to a hard cut.
/// The next chunk starts `chunk_overlap` characters before that end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    /// Creates a splitter. The size is at least 1 and the overlap is kept below it.
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Returns the chunk size.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the chunk overlap.
    #[must_use]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text`. Chunks are trimmed and blank chunks are dropped.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let cut = if end == chars.len() {
                end
            } else {
                self.cut_point(&chars, start, end)
            };

            let chunk: String = chars[start..cut].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            if cut == chars.len() {
                break;
            }
            start = cut - self.chunk_overlap;
        }
        chunks
    }

    /// Finds where the window `[start, end)` should end. The result is
    /// always past `start + chunk_overlap`, so every chunk advances.
    fn cut_point(&self, chars: &[char], start: usize, end: usize) -> usize {
        let floor = start + self.chunk_overlap;
        for separator in SEPARATORS {
            let sep: Vec<char> = separator.chars().collect();
            let found = (floor + 1..=end.saturating_sub(sep.len()))
                .rev()
                .find(|&i| chars[i..i + sep.len()] == sep[..]);
            if let Some(i) = found {
                return i;
            }
        }
        end
    }
}

/// Chunks, embeds, and stores documents. Returns how many chunks were stored.
///
/// Chunk ids are `{source}#{n}` with `n` starting at 0, so re-ingesting a
/// source replaces its chunks. Metadata is `{source, chunk}`.
///
/// # Errors
///
/// Returns an error if embedding or the store fails.
pub async fn ingest_documents(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    documents: &[Document],
    splitter: &TextSplitter,
) -> Result<usize, CascadeError> {
    let mut stored = 0;
    for document in documents {
        for (n, chunk) in splitter.split(&document.text).into_iter().enumerate() {
            let vector = embedder.embed(&chunk).await?;
            store
                .upsert(
                    VectorRecord::new(format!("{}#{n}", document.source), vector)
                        .with_metadata(json!({"source": document.source, "chunk": n}))
                        .with_document(chunk),
                )
                .await?;
            stored += 1;
        }
    }
    tracing::info!(documents = documents.len(), chunks = stored, "Ingested documents");
    Ok(stored)
}

/// Reads every `.txt` file under `root`, sorted by path.
///
/// Sources are paths relative to `root`. Files that are not valid UTF-8
/// are skipped with a warning.
///
/// # Errors
///
/// Returns `NotFound` if `root` is not a directory.
pub fn load_text_documents(root: impl AsRef<Path>) -> io::Result<Vec<Document>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut files = WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "txt"))
        .map(walkdir::DirEntry::into_path)
        .collect::<Vec<_>>();
    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let source = path.strip_prefix(root).unwrap_or(path.as_path()).display().to_string();
        match std::fs::read_to_string(&path) {
            Ok(text) => documents.push(Document::new(source, text)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
        }
    }
    tracing::debug!(root = %root.display(), count = documents.len(), "Loaded text documents");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashingEmbedder;
    use crate::vectorstore::InMemoryVectorStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_and_blank_input_yield_no_chunks() {
        let splitter = TextSplitter::default();
        assert!(splitter.split("").is_empty());
        assert!(splitter.split(" \n\n  ").is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(TextSplitter::default().split("  HNSW builds a layered graph.  "), vec![
            "HNSW builds a layered graph."
        ]);
    }

    #[test]
    fn test_hard_cut_with_overlap() {
        let splitter = TextSplitter::new(4, 1);
        assert_eq!(splitter.split("abcdefghij"), vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_prefers_word_boundaries() {
        let splitter = TextSplitter::new(12, 0);
        assert_eq!(splitter.split("alpha beta gamma delta"), vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn test_prefers_paragraph_breaks_over_spaces() {
        let splitter = TextSplitter::new(30, 0);
        let text = "first para\n\nsecond one here and more words";
        assert_eq!(splitter.split(text)[0], "first para");
    }

    #[test]
    fn test_overlap_repeats_tail_of_previous_chunk() {
        let splitter = TextSplitter::new(10, 4);
        let chunks = splitter.split("0123456789abcdefghij");
        assert_eq!(chunks[0], "0123456789");
        assert!(chunks[1].starts_with("6789"));
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let splitter = TextSplitter::new(3, 1);
        let chunks = splitter.split("äöüßéñ");
        assert_eq!(chunks, vec!["äöü", "üßé", "éñ"]);
    }

    #[test]
    fn test_overlap_is_clamped_below_size() {
        let splitter = TextSplitter::new(5, 9);
        assert_eq!(splitter.chunk_overlap(), 4);
        assert_eq!(TextSplitter::new(0, 0).chunk_size(), 1);
        assert_eq!(splitter.split("abcdefg").len(), 3);
    }

    #[tokio::test]
    async fn test_ingest_stores_every_chunk_with_source() {
        let store = InMemoryVectorStore::new();
        let embedder = HashingEmbedder::default();
        let documents = vec![
            Document::new("hnsw.txt", "alpha beta gamma delta"),
            Document::new("empty.txt", "   "),
        ];

        let stored = ingest_documents(&store, &embedder, &documents, &TextSplitter::new(12, 0))
            .await
            .unwrap();

        assert_eq!(stored, 2);
        assert_eq!(store.count().await.unwrap(), 2);
        let hits = store.query(&embedder.embed_sync("gamma delta"), 1, None).await.unwrap();
        assert_eq!(hits[0].record.id, "hnsw.txt#1");
        assert_eq!(hits[0].record.metadata, json!({"source": "hnsw.txt", "chunk": 1}));
    }

    #[test]
    fn test_load_text_documents_reads_txt_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("papers")).unwrap();
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        std::fs::write(dir.path().join("papers").join("a.txt"), "nested").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let documents = load_text_documents(dir.path()).unwrap();

        let sources: Vec<_> = documents.iter().map(|d| d.source.clone()).collect();
        assert_eq!(sources, vec!["b.txt".to_string(), format!("papers{}a.txt", std::path::MAIN_SEPARATOR)]);
        assert_eq!(documents[1].text, "nested");
    }

    #[test]
    fn test_load_text_documents_requires_directory() {
        let err = load_text_documents("/definitely/not/here").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
