//! Collection identity and embedding mode.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Embedding backend a collection is bound to.
///
/// Fixed at collection creation: every chunk in a collection must live in the
/// same embedding space, or similarity scores are meaningless. Unknown mode
/// strings are rejected at the boundary before any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    Openai,
    Mpnet,
}

impl EmbeddingMode {
    /// Dimension of the vectors this mode produces.
    pub fn dimension(&self) -> u64 {
        match self {
            // text-embedding-ada-002
            EmbeddingMode::Openai => 1536,
            // all-mpnet-base-v2
            EmbeddingMode::Mpnet => 768,
        }
    }
}

impl std::fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingMode::Openai => write!(f, "openai"),
            EmbeddingMode::Mpnet => write!(f, "mpnet"),
        }
    }
}

impl std::str::FromStr for EmbeddingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(EmbeddingMode::Openai),
            "mpnet" => Ok(EmbeddingMode::Mpnet),
            other => Err(format!("invalid embedding mode: {}", other)),
        }
    }
}

/// A collection as resolved through the registry: the internal vector-store
/// name plus the embedding mode it was created with.
#[derive(Debug, Clone)]
pub struct ResolvedCollection {
    pub collection_name: String,
    pub mode: EmbeddingMode,
}

/// Tenant-visible collection listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveCollection {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
}

/// Derive the internal vector-store collection name from the tenant-visible
/// one: a uuid suffix prevents collisions between tenants, and separators are
/// normalized for backends that reject spaces and hyphens.
pub fn internal_collection_name(display_name: &str) -> String {
    format!("{}_{}", display_name, Uuid::new_v4())
        .replace(' ', "_")
        .replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trip() {
        for mode in [EmbeddingMode::Openai, EmbeddingMode::Mpnet] {
            let parsed: EmbeddingMode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!("word2vec".parse::<EmbeddingMode>().is_err());
        assert!("".parse::<EmbeddingMode>().is_err());
    }

    #[test]
    fn mode_dimensions() {
        assert_eq!(EmbeddingMode::Openai.dimension(), 1536);
        assert_eq!(EmbeddingMode::Mpnet.dimension(), 768);
    }

    #[test]
    fn internal_name_has_no_spaces_or_hyphens() {
        let name = internal_collection_name("my notes-2024");
        assert!(name.starts_with("my_notes_2024_"));
        assert!(!name.contains(' '));
        assert!(!name.contains('-'));
        // uuid suffix makes repeated creations distinct
        assert_ne!(name, internal_collection_name("my notes-2024"));
    }
}
