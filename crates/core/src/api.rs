// crates/core/src/api.rs
//! Client for the executor's start and cancel endpoints.

use async_trait::async_trait;
use jobtrack_types::{CancelResponse, JobId, StartResponse};
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ApiError;

/// The backend that actually runs jobs.
///
/// Implementations include:
/// - `HttpExecutor`: JSON over HTTP against the executor's REST endpoints
/// - test doubles that resolve on demand
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    /// Submit a job. Never returns `Ok` without an identifier.
    async fn start(&self, payload: serde_json::Value) -> Result<JobId, ApiError>;

    /// Ask the executor to stop a job. Best-effort: an error does not mean
    /// the job is still running.
    async fn cancel(&self, job_id: &JobId) -> Result<(), ApiError>;
}

/// `JobExecutor` over HTTP.
pub struct HttpExecutor {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpExecutor {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Shared with the event channel so both use one connection pool.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl JobExecutor for HttpExecutor {
    async fn start(&self, payload: serde_json::Value) -> Result<JobId, ApiError> {
        let response = self
            .client
            .post(self.config.start_url())
            .timeout(self.config.request_timeout)
            .json(&payload)
            .send()
            .await?;

        let (status, body) = read_body::<StartResponse>(response).await?;
        if !(200..300).contains(&status) {
            return Err(ApiError::http(status, body.error));
        }

        match body.job_id.filter(|id| !id.trim().is_empty()) {
            Some(id) if body.ok => {
                tracing::info!(job_id = %id, "Job accepted by executor");
                Ok(JobId::from(id))
            }
            _ => Err(ApiError::Rejected(
                body.error
                    .unwrap_or_else(|| "Backend did not return a job_id.".to_string()),
            )),
        }
    }

    async fn cancel(&self, job_id: &JobId) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.config.cancel_url(job_id))
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        let (status, body) = read_body::<CancelResponse>(response).await?;
        if !(200..300).contains(&status) {
            return Err(ApiError::http(status, body.error));
        }
        if !body.ok {
            return Err(ApiError::Rejected(
                body.error
                    .unwrap_or_else(|| "Cancel was not acknowledged.".to_string()),
            ));
        }
        Ok(())
    }
}

/// Read a JSON body. A body that is not the expected JSON is an
/// `InvalidResponse` whatever the status code.
async fn read_body<T: DeserializeOwned>(response: Response) -> Result<(u16, T), ApiError> {
    let status = response.status().as_u16();
    let text = response.text().await?;
    serde_json::from_str::<T>(&text)
        .map(|body| (status, body))
        .map_err(|e| {
            tracing::warn!(status, error = %e, "Executor returned a non-JSON body");
            ApiError::InvalidResponse { status }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn executor(server: &mockito::Server) -> HttpExecutor {
        let config = ClientConfig::default().with_base_url(&server.url()).unwrap();
        HttpExecutor::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_start_returns_job_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/jobs/start/")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"type": "sequence"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true, "job_id": "5a7e"}"#)
            .create_async()
            .await;

        let id = executor(&server)
            .start(json!({"type": "sequence"}))
            .await
            .unwrap();

        assert_eq!(id, JobId::from("5a7e"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_start_http_error_uses_server_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/jobs/start/")
            .with_status(400)
            .with_body(r#"{"ok": false, "error": "missing paths"}"#)
            .create_async()
            .await;

        let err = executor(&server).start(json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 400, .. }));
        assert_eq!(err.to_string(), "missing paths");
    }

    #[tokio::test]
    async fn test_start_without_job_id_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/jobs/start/")
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let err = executor(&server).start(json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(_)));
        assert_eq!(err.to_string(), "Backend did not return a job_id.");
    }

    #[tokio::test]
    async fn test_start_non_json_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/jobs/start/")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let err = executor(&server).start(json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid server response (HTTP 200)");
    }

    #[tokio::test]
    async fn test_start_gateway_error_page() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/jobs/start/")
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create_async()
            .await;

        let err = executor(&server).start(json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse { status: 502 }));
        assert_eq!(err.to_string(), "Invalid server response (HTTP 502)");
    }

    #[tokio::test]
    async fn test_start_unreachable_is_transport_error() {
        // Port 9 (discard) is not listening on test hosts.
        let config = ClientConfig::default()
            .with_base_url("http://127.0.0.1:9")
            .unwrap();
        let err = HttpExecutor::new(config)
            .unwrap()
            .start(json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[tokio::test]
    async fn test_cancel_acknowledged() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/jobs/cancel/5a7e/")
            .with_status(200)
            .with_body(r#"{"ok": true, "job_id": "5a7e"}"#)
            .create_async()
            .await;

        executor(&server).cancel(&JobId::from("5a7e")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/jobs/cancel/gone/")
            .with_status(404)
            .with_body(r#"{"ok": false, "error": "job_not_found"}"#)
            .create_async()
            .await;

        let err = executor(&server)
            .cancel(&JobId::from("gone"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "job_not_found");
    }
}
