use crate::requests::{
    AddPersonsRequest, CreatePersonRequest, PlatformResponse, UpdatePersonRequest
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use config::{AccessControlConfig, PersonDefaults};
use errors::{Upstream, UpstreamError};
use hcp_core::{AccessControl, CreatedPerson, EmployeeRecord};
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CONTENT_TYPE: &str = "application/json;charset=UTF-8";
pub const ACCEPT: &str = "application/json";

/// Signed client for the access-control platform.
///
/// Every call is a `POST` carrying `X-Ca-Key` and an `X-Ca-Signature`
/// computed over method, accept, content type and path. Transient failures
/// are retried with exponential backoff before an error is returned.
pub struct ArtemisClient {
    client: Client,
    config: AccessControlConfig,
    person: PersonDefaults
}

impl ArtemisClient {
    pub fn new(config: AccessControlConfig, person: PersonDefaults) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| UpstreamError::Request {
                upstream: Upstream::AccessControl,
                reason: e.to_string(),
                retryable: false
            })?;

        Ok(Self {
            client,
            config,
            person
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_once(&self, path: &str, body: &[u8]) -> Result<PlatformResponse, UpstreamError> {
        let signature =
            utils::sign_request("POST", ACCEPT, CONTENT_TYPE, path, &self.config.app_secret);

        let response = self
            .client
            .post(self.url(path))
            .header("Content-Type", CONTENT_TYPE)
            .header("Accept", ACCEPT)
            .header("X-Ca-Key", &self.config.app_key)
            .header("X-Ca-Signature", signature)
            .body(body.to_vec())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        record_request(status.as_u16());
        let text = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                upstream: Upstream::AccessControl,
                status: status.as_u16(),
                body: text
            });
        }

        let parsed: PlatformResponse = if text.trim().is_empty() {
            PlatformResponse::default()
        } else {
            serde_json::from_str(&text).map_err(|e| UpstreamError::MalformedBody {
                upstream: Upstream::AccessControl,
                reason: e.to_string()
            })?
        };

        if !parsed.is_success() {
            return Err(UpstreamError::Platform {
                upstream: Upstream::AccessControl,
                code: parsed.code().unwrap_or_default(),
                message: parsed.message().unwrap_or_default()
            });
        }

        Ok(parsed)
    }

    /// Sends `request` to `path`, retrying transient failures up to
    /// `retry.max_retries` times.
    async fn post<T: Serialize + Sync>(
        &self,
        operation: &'static str,
        path: &str,
        request: &T
    ) -> Result<PlatformResponse, UpstreamError> {
        let body = serde_json::to_vec(request).map_err(|e| UpstreamError::Request {
            upstream: Upstream::AccessControl,
            reason: format!("cannot encode {operation} request: {e}"),
            retryable: false
        })?;

        let retry = &self.config.retry;
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(retry.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(retry.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();

        let max_retries = retry.max_retries;
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let body = body.as_slice();

        backoff::future::retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.post_once(path, body).await {
                Ok(response) => Ok(response),
                Err(e) if e.is_retryable() && attempt <= max_retries => {
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        error = %e,
                        "Transient access-control failure, retrying"
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e))
            }
        })
        .await
    }
}

#[async_trait]
impl AccessControl for ArtemisClient {
    async fn create_person(
        &self,
        employee: &EmployeeRecord,
        face_data: &str
    ) -> Result<CreatedPerson, UpstreamError> {
        let request = CreatePersonRequest::new(employee, face_data, &self.person);
        let response = self
            .post("create_person", &self.config.create_person_path, &request)
            .await?;

        let person_id = response.created_person_id();
        info!(
            person_code = %employee.identity_number,
            person_id = person_id.as_deref().unwrap_or(""),
            has_face = !face_data.is_empty(),
            "Person created"
        );
        Ok(CreatedPerson { person_id })
    }

    async fn update_identifier(
        &self,
        person_id: &str,
        kib_number: &str
    ) -> Result<(), UpstreamError> {
        let request = UpdatePersonRequest {
            person_id,
            person_code: kib_number
        };
        self.post("update_identifier", &self.config.update_person_path, &request)
            .await?;

        info!(person_id = %person_id, kib_number = %kib_number, "Person identifier updated");
        Ok(())
    }

    async fn assign_privilege_groups(
        &self,
        person_id: &str,
        privilege_group_ids: &[String]
    ) -> Result<(), UpstreamError> {
        for group_id in privilege_group_ids {
            let request = AddPersonsRequest::single(group_id, person_id);
            self.post(
                "assign_privilege",
                &self.config.assign_privilege_path,
                &request
            )
            .await?;
            debug!(
                person_id = %person_id,
                privilege_group_id = %group_id,
                "Person added to group"
            );
        }

        info!(
            person_id = %person_id,
            groups = privilege_group_ids.len(),
            "Privilege groups assigned"
        );
        Ok(())
    }
}

pub(crate) fn request_error(e: reqwest::Error) -> UpstreamError {
    UpstreamError::Request {
        upstream: Upstream::AccessControl,
        retryable: e.is_timeout() || e.is_connect(),
        reason: e.to_string()
    }
}

fn record_request(status: u16) {
    metrics::counter!(
        "hcp_sync_upstream_requests_total",
        "target" => Upstream::AccessControl.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
