pub mod datastore;
pub mod error;
pub mod models;
pub mod registry;
pub mod server;
pub mod services;
pub mod utils;

pub use datastore::{DataStore, InMemoryDataStore, QdrantDataStore};
pub use error::RetrievalError;
pub use models::{Config, EmbeddingMode};
