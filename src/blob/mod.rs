use async_trait::async_trait;
use thiserror::Error;

pub mod http;

pub use http::HttpBlobStore;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("storage returned {status} for '{path}'")]
    UnexpectedStatus { path: String, status: u16 },
}

/// Thin wrapper over the object-storage service. Failures are surfaced to
/// the caller, which decides whether they are fatal; no retries happen at
/// this layer.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Uploads `bytes` under `path` and returns the stored path.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError>;

    async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError>;
}
