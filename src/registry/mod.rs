//! Tenant and collection registry backed by Postgres.
//!
//! Three tables drive access control: `users`, `api_keys` (one user, many
//! keys), and `collections` (one user, many collections). The vector store
//! never sees api keys; handlers resolve a tenant-visible collection name to
//! its internal vector-store name and embedding mode here first.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

use crate::error::RegistryError;
use crate::models::{ActiveCollection, EmbeddingMode, RegistryConfig, ResolvedCollection};

pub struct CollectionRegistry {
    pool: PgPool,
}

impl CollectionRegistry {
    pub async fn connect(url: &str, config: &RegistryConfig) -> Result<Self, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await?;
        info!(pool_max = config.pool_max, "connected to registry database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// True if the api key belongs to a known user and is active.
    pub async fn authenticate(&self, api_key: &str) -> Result<bool, RegistryError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM api_keys k \
             JOIN users u ON u.user_id = k.user_id \
             WHERE k.api_key = $1 AND k.is_active",
        )
        .bind(api_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Resolve a tenant-visible collection name to its internal vector-store
    /// name and embedding mode. `None` when the key has no active collection
    /// by that name.
    pub async fn resolve(
        &self,
        api_key: &str,
        name: &str,
    ) -> Result<Option<ResolvedCollection>, RegistryError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT c.collection_name, c.embedding_method FROM collections c \
             JOIN api_keys k ON k.user_id = c.user_id \
             WHERE k.api_key = $1 AND k.is_active AND c.is_active AND c.name = $2",
        )
        .bind(api_key)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some((collection_name, method)) => {
                let mode: EmbeddingMode =
                    method
                        .parse()
                        .map_err(|_| RegistryError::CorruptMode {
                            name: name.to_string(),
                            method,
                        })?;
                Ok(Some(ResolvedCollection {
                    collection_name,
                    mode,
                }))
            }
        }
    }

    /// All active collections visible to the key, oldest first.
    pub async fn list(&self, api_key: &str) -> Result<Vec<ActiveCollection>, RegistryError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT c.name, c.overview FROM collections c \
             JOIN api_keys k ON k.user_id = c.user_id \
             WHERE k.api_key = $1 AND k.is_active AND c.is_active \
             ORDER BY c.created_at",
        )
        .bind(api_key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, overview)| ActiveCollection { name, overview })
            .collect())
    }

    /// Record a newly created collection. Returns false when the key resolves
    /// to no user.
    pub async fn register(
        &self,
        api_key: &str,
        name: &str,
        collection_name: &str,
        mode: EmbeddingMode,
        overview: Option<&str>,
        description: Option<&str>,
    ) -> Result<bool, RegistryError> {
        let result = sqlx::query(
            "INSERT INTO collections \
             (user_id, name, collection_name, embedding_method, overview, description, is_active) \
             SELECT k.user_id, $2, $3, $4, $5, $6, TRUE FROM api_keys k \
             WHERE k.api_key = $1 AND k.is_active",
        )
        .bind(api_key)
        .bind(name)
        .bind(collection_name)
        .bind(mode.to_string())
        .bind(overview)
        .bind(description)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update mutable collection attributes; unset fields are left untouched.
    /// The internal collection name and embedding mode never change.
    pub async fn update(
        &self,
        api_key: &str,
        name: &str,
        new_name: Option<&str>,
        overview: Option<&str>,
        description: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<bool, RegistryError> {
        let result = sqlx::query(
            "UPDATE collections SET \
             name = COALESCE($3, name), \
             overview = COALESCE($4, overview), \
             description = COALESCE($5, description), \
             is_active = COALESCE($6, is_active) \
             WHERE name = $2 AND user_id IN \
             (SELECT k.user_id FROM api_keys k WHERE k.api_key = $1 AND k.is_active)",
        )
        .bind(api_key)
        .bind(name)
        .bind(new_name)
        .bind(overview)
        .bind(description)
        .bind(is_active)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a collection inactive after its vector data has been dropped. The
    /// row is kept for audit, so the registry still knows the name was used.
    pub async fn deactivate(&self, api_key: &str, name: &str) -> Result<bool, RegistryError> {
        let result = sqlx::query(
            "UPDATE collections SET is_active = FALSE \
             WHERE name = $2 AND is_active AND user_id IN \
             (SELECT k.user_id FROM api_keys k WHERE k.api_key = $1 AND k.is_active)",
        )
        .bind(api_key)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
