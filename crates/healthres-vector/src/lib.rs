//! healthres-vector
//!
//! Named vector indexes behind the `VectorStore` capability: a managed
//! Pinecone index over REST and an embedded LanceDB table, plus the batched
//! upsert driver both share.

use std::sync::Arc;

use healthres_core::config::{expand_path, secret, RemoteSettings, StoreProvider};
use healthres_core::traits::VectorStore;
use healthres_core::types::IndexSpec;
use healthres_core::Result;

pub mod batch;
pub mod lance;
pub mod pinecone;
pub mod schema;
pub mod table;

pub use batch::{upsert_batched, upsert_batched_from};
pub use lance::LanceStore;
pub use pinecone::PineconeStore;

pub async fn build_store(settings: &RemoteSettings) -> Result<Arc<dyn VectorStore>> {
    match settings.provider {
        StoreProvider::Pinecone => {
            let api_key = secret("PINECONE_API_KEY")?;
            Ok(Arc::new(PineconeStore::from_settings(settings, &api_key)?))
        }
        StoreProvider::Lance => Ok(Arc::new(LanceStore::open(&expand_path(&settings.lance_uri)).await?)),
    }
}

/// Index shape requested for a corpus embedded at `dimension`.
pub fn index_spec(settings: &RemoteSettings, dimension: usize) -> IndexSpec {
    IndexSpec {
        name: settings.index_name.clone(),
        dimension,
        metric: settings.metric,
        placement: settings.placement(),
    }
}
