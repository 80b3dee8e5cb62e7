//! HTTP surface of the retrieval service.
//!
//! Every route authenticates a bearer api key against the registry, resolves
//! the tenant-visible collection name to its internal vector-store identity,
//! and delegates to the datastore. Error bodies carry a stable `detail`
//! string; backend internals only reach the logs.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::datastore::DataStore;
use crate::error::{RegistryError, RetrievalError};
use crate::models::api::{
    CollectionsResponse, CreateCollectionRequest, CreateCollectionResponse, DeleteCollectionRequest,
    DeleteRequest, DeleteResponse, ErrorResponse, QueryRequest, QueryResponse, UpdateCollectionRequest,
    UpdateCollectionResponse, UpsertRequest, UpsertResponse,
};
use crate::models::{EmbeddingMode, ResolvedCollection, internal_collection_name};
use crate::registry::CollectionRegistry;
use crate::services::Embedders;

pub struct AppState {
    pub datastore: Arc<dyn DataStore>,
    pub embedders: Arc<Embedders>,
    pub registry: Arc<CollectionRegistry>,
    pub chunk_token_size: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upsert", post(upsert))
        .route("/query", post(query))
        .route("/delete", delete(delete_chunks))
        .route("/create-collection", post(create_collection))
        .route("/update-collection", post(update_collection))
        .route("/delete-collection", delete(delete_collection))
        .route("/collections", get(list_collections))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, listen_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!(addr = %listen_addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install shutdown handler");
        return;
    }
    info!("shutting down");
}

enum ApiError {
    Unauthorized,
    BadRequest(String),
    InvalidCollection,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "invalid or missing api key".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InvalidCollection => {
                (StatusCode::NOT_FOUND, "collection not found".to_string())
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal service error".to_string(),
            ),
        };
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

impl From<RetrievalError> for ApiError {
    fn from(e: RetrievalError) -> Self {
        match e {
            RetrievalError::Validation(msg) | RetrievalError::InvalidMode(msg) => {
                ApiError::BadRequest(msg)
            }
            RetrievalError::CollectionNotFound(_) => ApiError::InvalidCollection,
            other => {
                error!(error = %other, "request failed");
                ApiError::Internal
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        error!(error = %e, "registry lookup failed");
        ApiError::Internal
    }
}

fn bearer_key(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(ApiError::Unauthorized)
}

/// Authenticate the key, then resolve the tenant's collection.
async fn resolve(
    state: &AppState,
    headers: &HeaderMap,
    collection_name: &str,
) -> Result<(String, ResolvedCollection), ApiError> {
    let api_key = bearer_key(headers)?.to_string();
    if !state.registry.authenticate(&api_key).await? {
        return Err(ApiError::Unauthorized);
    }
    let collection = state
        .registry
        .resolve(&api_key, collection_name)
        .await?
        .ok_or_else(|| RetrievalError::CollectionNotFound(collection_name.to_string()))?;
    Ok((api_key, collection))
}

async fn upsert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<UpsertRequest>,
) -> Result<Json<UpsertResponse>, ApiError> {
    let (_, collection) = resolve(&state, &headers, &request.collection_name).await?;

    let ids = state
        .datastore
        .upsert(
            request.documents,
            Some(state.chunk_token_size),
            collection.mode,
            state.embedders.as_ref(),
            &collection.collection_name,
        )
        .await?;

    Ok(Json(UpsertResponse { ids }))
}

async fn query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let (_, collection) = resolve(&state, &headers, &request.collection_name).await?;

    let results = state
        .datastore
        .query(
            request.queries,
            collection.mode,
            state.embedders.as_ref(),
            &collection.collection_name,
        )
        .await?;

    Ok(Json(QueryResponse { results }))
}

async fn delete_chunks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if !request.has_criteria() {
        return Err(RetrievalError::Validation(
            "one of ids, filter, or delete_all is required".to_string(),
        )
        .into());
    }
    let (_, collection) = resolve(&state, &headers, &request.collection_name).await?;

    let success = state
        .datastore
        .delete(
            request.ids.as_deref(),
            request.filter.as_ref(),
            request.delete_all,
            &collection.collection_name,
        )
        .await
        .map_err(RetrievalError::Store)?;

    Ok(Json(DeleteResponse { success }))
}

async fn create_collection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateCollectionRequest>,
) -> Result<Json<CreateCollectionResponse>, ApiError> {
    let api_key = bearer_key(&headers)?.to_string();
    if !state.registry.authenticate(&api_key).await? {
        return Err(ApiError::Unauthorized);
    }

    let mode: EmbeddingMode = request
        .embedding_method
        .parse()
        .map_err(RetrievalError::InvalidMode)?;

    if state
        .registry
        .resolve(&api_key, &request.collection_name)
        .await?
        .is_some()
    {
        return Err(ApiError::BadRequest(format!(
            "collection '{}' already exists",
            request.collection_name
        )));
    }

    let internal = internal_collection_name(&request.collection_name);
    state
        .datastore
        .create_collection(&internal, mode)
        .await
        .map_err(RetrievalError::Store)?;

    let success = state
        .registry
        .register(
            &api_key,
            &request.collection_name,
            &internal,
            mode,
            request.overview.as_deref(),
            request.description.as_deref(),
        )
        .await?;

    Ok(Json(CreateCollectionResponse { success }))
}

async fn update_collection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<UpdateCollectionRequest>,
) -> Result<Json<UpdateCollectionResponse>, ApiError> {
    let api_key = bearer_key(&headers)?.to_string();
    if !state.registry.authenticate(&api_key).await? {
        return Err(ApiError::Unauthorized);
    }

    let success = state
        .registry
        .update(
            &api_key,
            &request.collection_name,
            request.new_collection_name.as_deref(),
            request.overview.as_deref(),
            request.description.as_deref(),
            request.is_active,
        )
        .await?;
    if !success {
        return Err(ApiError::InvalidCollection);
    }

    Ok(Json(UpdateCollectionResponse { success }))
}

async fn delete_collection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<DeleteCollectionRequest>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let (api_key, collection) = resolve(&state, &headers, &request.collection_name).await?;

    // Vector data goes first; a dangling registry row is recoverable, a
    // dangling vector collection is not
    state
        .datastore
        .delete_collection(&collection.collection_name)
        .await
        .map_err(RetrievalError::Store)?;

    let success = state
        .registry
        .deactivate(&api_key, &request.collection_name)
        .await?;

    Ok(Json(DeleteResponse { success }))
}

async fn list_collections(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CollectionsResponse>, ApiError> {
    let api_key = bearer_key(&headers)?;
    if !state.registry.authenticate(api_key).await? {
        return Err(ApiError::Unauthorized);
    }

    let collections = state.registry.list(api_key).await?;
    Ok(Json(CollectionsResponse { collections }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_key_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer sk-test-123"),
        );
        assert_eq!(bearer_key(&headers).ok(), Some("sk-test-123"));
    }

    #[test]
    fn retrieval_errors_map_to_stable_statuses() {
        use crate::error::VectorStoreError;

        let bad_mode: ApiError =
            RetrievalError::InvalidMode("invalid embedding mode: word2vec".to_string()).into();
        assert_eq!(bad_mode.into_response().status(), StatusCode::BAD_REQUEST);

        let no_criteria: ApiError =
            RetrievalError::Validation("one of ids, filter, or delete_all is required".to_string())
                .into();
        assert_eq!(no_criteria.into_response().status(), StatusCode::BAD_REQUEST);

        let missing: ApiError = RetrievalError::CollectionNotFound("notes".to_string()).into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        // Backend failures collapse to a generic 500
        let store: ApiError =
            RetrievalError::Store(VectorStoreError::SearchError("qdrant down".to_string())).into();
        assert_eq!(
            store.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_or_malformed_key_is_rejected() {
        let headers = HeaderMap::new();
        assert!(bearer_key(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("sk-raw"));
        assert!(bearer_key(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_key(&headers).is_err());
    }
}
