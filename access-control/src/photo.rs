use async_trait::async_trait;
use errors::{Upstream, UpstreamError};
use hcp_core::PhotoSource;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Downloads face photos over plain HTTP(S).
pub struct HttpPhotoFetcher {
    client: Client
}

impl HttpPhotoFetcher {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| UpstreamError::Request {
                upstream: Upstream::Photo,
                reason: e.to_string(),
                retryable: false
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PhotoSource for HttpPhotoFetcher {
    async fn fetch_base64(&self, url: &str) -> Result<String, UpstreamError> {
        let response = self.client.get(url).send().await.map_err(photo_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                upstream: Upstream::Photo,
                status: status.as_u16(),
                body: String::new()
            });
        }

        let bytes = response.bytes().await.map_err(photo_error)?;
        debug!(url = %url, bytes = bytes.len(), "Photo downloaded");
        Ok(utils::encode_base64(&bytes))
    }
}

fn photo_error(e: reqwest::Error) -> UpstreamError {
    UpstreamError::Request {
        upstream: Upstream::Photo,
        retryable: e.is_timeout() || e.is_connect(),
        reason: e.to_string()
    }
}
