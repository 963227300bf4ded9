use async_trait::async_trait;
use config::HrSourceConfig;
use errors::{Upstream, UpstreamError};
use hcp_core::{EmployeeSource, Page};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

/// HTTP client for the paginated employee listing.
pub struct EposhClient {
    client: Client,
    config: HrSourceConfig
}

impl EposhClient {
    pub fn new(config: HrSourceConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| UpstreamError::Request {
                upstream: Upstream::HrSource,
                reason: e.to_string(),
                retryable: false
            })?;

        Ok(Self { client, config })
    }

    fn page_url(&self, date: &str, page: u32) -> Result<Url, UpstreamError> {
        let params = [
            (self.config.date_param.as_str(), date.to_string()),
            ("include_base64", self.config.include_base64.to_string()),
            ("page", page.to_string()),
            ("limit", self.config.page_limit.to_string())
        ];

        Url::parse_with_params(&self.config.base_url, &params).map_err(|e| {
            UpstreamError::Request {
                upstream: Upstream::HrSource,
                reason: format!("invalid base url '{}': {e}", self.config.base_url),
                retryable: false
            }
        })
    }
}

#[async_trait]
impl EmployeeSource for EposhClient {
    async fn fetch_page(&self, date: &str, page: u32) -> Result<Page, UpstreamError> {
        let url = self.page_url(date, page)?;
        debug!(url = %url, page = page, "Requesting HR page");

        let response = self
            .client
            .get(url)
            .header("x-api-key", &self.config.api_key)
            .header("x-app-id", &self.config.app_id)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        record_request(status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                upstream: Upstream::HrSource,
                status: status.as_u16(),
                body
            });
        }

        let bytes = response.bytes().await.map_err(request_error)?;
        serde_json::from_slice::<Page>(&bytes).map_err(|e| UpstreamError::MalformedBody {
            upstream: Upstream::HrSource,
            reason: e.to_string()
        })
    }
}

fn request_error(e: reqwest::Error) -> UpstreamError {
    UpstreamError::Request {
        upstream: Upstream::HrSource,
        retryable: e.is_timeout() || e.is_connect(),
        reason: e.to_string()
    }
}

fn record_request(status: u16) {
    metrics::counter!(
        "hcp_sync_upstream_requests_total",
        "target" => Upstream::HrSource.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_carries_all_params() {
        let config = HrSourceConfig {
            base_url: "https://hr.example.com/v1/induction/employees".to_string(),
            ..Default::default()
        };
        let client = EposhClient::new(config).unwrap();
        let url = client.page_url("2026-01-05", 3).unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("induction_date".to_string(), "2026-01-05".to_string()),
                ("include_base64".to_string(), "false".to_string()),
                ("page".to_string(), "3".to_string()),
                ("limit".to_string(), "10".to_string())
            ]
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = HrSourceConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        let client = EposhClient::new(config).unwrap();
        assert!(matches!(
            client.page_url("2026-01-05", 1),
            Err(UpstreamError::Request { retryable: false, .. })
        ));
    }
}
