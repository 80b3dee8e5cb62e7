//! Request/response shapes at the HTTP boundary.

use serde::{Deserialize, Serialize};

use super::collection::ActiveCollection;
use super::document::{Document, DocumentMetadataFilter};
use super::query::{Query, QueryResult};

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertRequest {
    pub collection_name: String,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertResponse {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub collection_name: String,
    pub queries: Vec<Query>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub collection_name: String,

    #[serde(default)]
    pub ids: Option<Vec<String>>,

    #[serde(default)]
    pub filter: Option<DocumentMetadataFilter>,

    #[serde(default)]
    pub delete_all: bool,
}

impl DeleteRequest {
    /// At least one deletion criterion must be meaningfully supplied.
    pub fn has_criteria(&self) -> bool {
        self.ids.as_ref().is_some_and(|ids| !ids.is_empty())
            || self.filter.as_ref().is_some_and(|f| !f.is_empty())
            || self.delete_all
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCollectionRequest {
    pub collection_name: String,

    #[serde(default = "default_embedding_method")]
    pub embedding_method: String,

    #[serde(default)]
    pub overview: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_embedding_method() -> String {
    "mpnet".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCollectionResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCollectionRequest {
    pub collection_name: String,

    #[serde(default)]
    pub new_collection_name: Option<String>,

    #[serde(default)]
    pub overview: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateCollectionResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteCollectionRequest {
    pub collection_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionsResponse {
    pub collections: Vec<ActiveCollection>,
}

/// Body of every error response; `detail` never carries backend internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_request_criteria() {
        let base = DeleteRequest {
            collection_name: "c".to_string(),
            ids: None,
            filter: None,
            delete_all: false,
        };
        assert!(!base.has_criteria());

        let with_ids = DeleteRequest {
            ids: Some(vec!["doc1".to_string()]),
            ..base.clone()
        };
        assert!(with_ids.has_criteria());

        // An empty id list or empty filter does not count as a criterion
        let empty_ids = DeleteRequest {
            ids: Some(vec![]),
            filter: Some(DocumentMetadataFilter::default()),
            ..base.clone()
        };
        assert!(!empty_ids.has_criteria());

        let wipe = DeleteRequest {
            delete_all: true,
            ..base
        };
        assert!(wipe.has_criteria());
    }

    #[test]
    fn create_collection_defaults_to_mpnet() {
        let req: CreateCollectionRequest =
            serde_json::from_str(r#"{"collection_name": "notes"}"#).unwrap();
        assert_eq!(req.embedding_method, "mpnet");
    }
}
