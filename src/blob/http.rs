use async_trait::async_trait;
use reqwest::header;

use super::{BlobError, BlobStore};

/// Bucket holding both the fixed ticket template and the generated PDFs.
const ASSETS_BUCKET: &str = "assets";

/// Object-storage client speaking the storage service's REST API:
/// objects live at `{base_url}/object/{bucket}/{path}` and every request
/// carries the service credential as a bearer token.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, ASSETS_BUCKET, path)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        let response = self
            .client
            .post(self.object_url(path))
            .bearer_auth(&self.service_key)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BlobError::UnexpectedStatus {
                path: path.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(path.to_string())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let response = self
            .client
            .get(self.object_url(path))
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BlobError::UnexpectedStatus {
                path: path.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
