// Re-upload of delivered books to external storage via HTTP PUT.

use std::time::Duration;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::info;

use crate::config::UPLOAD_CONTENT_TYPE;

pub struct StorageUploader {
    client: Client,
    base_url: String,
}

impl StorageUploader {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.base_url, filename)
    }

    /// PUT `bytes` to `{base_url}/{filename}`.
    pub async fn upload(&self, filename: &str, bytes: Bytes) -> Result<()> {
        let url = self.url_for(filename);
        let resp = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, UPLOAD_CONTENT_TYPE)
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        info!("upload {} status={} response={:?}", url, status.as_u16(), text);

        if !status.is_success() {
            return Err(anyhow!("upload to {} failed: HTTP {}", url, status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_trims_trailing_slash() {
        let uploader = StorageUploader::new("http://storage.local/books/", Duration::from_secs(1)).unwrap();
        assert_eq!(uploader.url_for("Dune.epub"), "http://storage.local/books/Dune.epub");
    }
}
