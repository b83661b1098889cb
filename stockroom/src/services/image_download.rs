//! Image download over HTTP
//!
//! [`HttpFetcher`] is the production [`AssetFetcher`]: it streams the body of
//! a public download URL into a local file. No request timeout is set; a
//! stalled download is left to the transport.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::asset_cache::{AssetCacheError, AssetFetcher};

#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, AssetCacheError> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AssetCacheError::Http(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AssetCacheError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(AssetCacheError::Download(format!(
                "{} returned status {}",
                url, status
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| AssetCacheError::Http(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        tracing::debug!(url = %url, size = written, "Image body downloaded");
        Ok(written)
    }
}
