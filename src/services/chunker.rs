//! Token-bounded document chunking.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::models::{ChunkingConfig, Document, DocumentChunk};

/// Splits documents into windows of at most `chunk_token_size` tokens.
///
/// A token is a maximal run of non-whitespace characters; this approximates
/// model tokenization closely enough for sizing windows and keeps the chunker
/// a pure function, independent of any embedding backend.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_token_size: usize,
    min_chunk_chars: usize,
    max_chunks_per_document: usize,
}

impl TextChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_token_size: config.chunk_token_size.max(1),
            min_chunk_chars: config.min_chunk_chars,
            max_chunks_per_document: config.max_chunks_per_document,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&ChunkingConfig::default())
    }

    /// Chunk a batch of documents, keyed by document id.
    ///
    /// Documents without an id are assigned a fresh one so chunk ids stay
    /// well-formed and deletable. Documents whose text yields no chunks are
    /// dropped from the result (logged, see module tests).
    pub fn chunk_documents(
        &self,
        documents: Vec<Document>,
        max_tokens: Option<usize>,
    ) -> HashMap<String, Vec<DocumentChunk>> {
        let max_tokens = max_tokens.unwrap_or(self.chunk_token_size).max(1);
        let mut result = HashMap::new();

        for document in documents {
            let document_id = document
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            let pieces = self.split_text(&document.text, max_tokens);
            if pieces.is_empty() {
                warn!(document_id = %document_id, "document produced no chunks, dropping");
                continue;
            }

            let chunks = pieces
                .into_iter()
                .enumerate()
                .map(|(n, text)| DocumentChunk {
                    id: DocumentChunk::chunk_id(&document_id, n),
                    document_id: document_id.clone(),
                    text,
                    metadata: document.metadata.clone(),
                    embedding: None,
                })
                .collect();

            result.insert(document_id, chunks);
        }

        result
    }

    /// Split text into consecutive windows of at most `max_tokens` tokens,
    /// preferring paragraph, then line, then sentence breaks found in the
    /// tail of the window.
    fn split_text(&self, text: &str, max_tokens: usize) -> Vec<String> {
        let spans = token_spans(text);
        if spans.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < spans.len() && chunks.len() < self.max_chunks_per_document {
            let end = (start + max_tokens).min(spans.len());
            let cut = if end < spans.len() {
                self.find_break(text, &spans, start, end)
            } else {
                end
            };

            let piece = &text[spans[start].0..spans[cut - 1].1];
            if piece.chars().count() >= self.min_chunk_chars {
                chunks.push(piece.to_string());
            }

            start = cut;
        }

        chunks
    }

    /// Find the best cut position in `(start, end]`: the chunk will cover
    /// tokens `[start, cut)`. Only the tail half of the window is searched so
    /// chunks stay near the target size; with no break point the window is
    /// cut at the token boundary.
    fn find_break(&self, text: &str, spans: &[(usize, usize)], start: usize, end: usize) -> usize {
        let search_from = start + (end - start) / 2;

        let mut paragraph = None;
        let mut line = None;
        let mut sentence = None;

        for cut in (search_from + 1)..end {
            let (_, prev_end) = spans[cut - 1];
            let (next_start, _) = spans[cut];
            let gap = &text[prev_end..next_start];

            if gap.matches('\n').count() >= 2 {
                paragraph = Some(cut);
            } else if gap.contains('\n') {
                line = Some(cut);
            }
            if text[..prev_end].ends_with(['.', '!', '?']) {
                sentence = Some(cut);
            }
        }

        paragraph.or(line).or(sentence).unwrap_or(end)
    }
}

/// Byte spans of whitespace-separated tokens.
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }

    spans
}
