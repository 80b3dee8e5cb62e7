use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Email,
    File,
    Chat,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Email => write!(f, "email"),
            Source::File => write!(f, "file"),
            Source::Chat => write!(f, "chat"),
        }
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(Source::Email),
            "file" => Ok(Source::File),
            "chat" => Ok(Source::Chat),
            other => Err(format!("unknown source: {}", other)),
        }
    }
}

/// Metadata attached to a document and inherited by every chunk derived
/// from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A document submitted for indexing.
///
/// The id is caller-supplied; a document without one is treated as having no
/// prior versions, and an id is generated for it before chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub text: String,

    #[serde(default)]
    pub metadata: DocumentMetadata,
}

/// A token-bounded slice of a document, optionally carrying its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl DocumentChunk {
    /// Deterministic chunk id: the same document and index always produce the
    /// same id, so re-chunking overwrites instead of duplicating.
    pub fn chunk_id(document_id: &str, index: usize) -> String {
        format!("{}_{}", document_id, index)
    }
}

/// Equality/range predicates over document metadata, used to scope both
/// deletes and query-time search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadataFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
}

impl DocumentMetadataFilter {
    /// Filter that matches every chunk of one document.
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            ..Default::default()
        }
    }

    /// True if no predicate is set.
    pub fn is_empty(&self) -> bool {
        self.document_id.is_none()
            && self.source.is_none()
            && self.source_id.is_none()
            && self.author.is_none()
            && self.created_after.is_none()
            && self.created_before.is_none()
    }

    /// Evaluate all set predicates against a chunk (AND semantics).
    pub fn matches(&self, chunk: &DocumentChunk) -> bool {
        if let Some(ref id) = self.document_id
            && chunk.document_id != *id
        {
            return false;
        }
        if let Some(source) = self.source
            && chunk.metadata.source != Some(source)
        {
            return false;
        }
        if let Some(ref source_id) = self.source_id
            && chunk.metadata.source_id.as_deref() != Some(source_id.as_str())
        {
            return false;
        }
        if let Some(ref author) = self.author
            && chunk.metadata.author.as_deref() != Some(author.as_str())
        {
            return false;
        }
        if self.created_after.is_some() || self.created_before.is_some() {
            let Some(created_at) = chunk.metadata.created_at else {
                return false;
            };
            if let Some(after) = self.created_after
                && created_at < after
            {
                return false;
            }
            if let Some(before) = self.created_before
                && created_at > before
            {
                return false;
            }
        }
        true
    }
}
