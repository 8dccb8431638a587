use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::GithubConfig;

/// Event type the pipeline workflow listens for under `repository_dispatch`.
pub const EVENT_TYPE: &str = "telegram-devops";

const USER_AGENT: &str = "telegram-devops-bot";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientPayload {
    pub message: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRequest {
    pub event_type: String,
    pub client_payload: ClientPayload,
}

impl DispatchRequest {
    pub fn new(message: &str, chat_id: i64) -> Self {
        Self {
            event_type: EVENT_TYPE.to_string(),
            client_payload: ClientPayload {
                message: message.to_string(),
                chat_id: chat_id.to_string(),
            },
        }
    }
}

/// Raw result of a dispatch call. The body is only kept for error relay.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    pub status: u16,
    pub body: String,
}

impl DispatchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Triggers an automation run in the target repository.
///
/// A rejected dispatch is reported through the returned status; only
/// transport failures come back as `Err`.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchResponse>;
}

pub struct GithubClient {
    client: reqwest::Client,
    config: GithubConfig,
}

impl GithubClient {
    pub fn new(config: GithubConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn dispatch_url(&self) -> String {
        format!(
            "{}/repos/{}/dispatches",
            self.config.api_url.trim_end_matches('/'),
            self.config.repo
        )
    }
}

#[async_trait]
impl Dispatcher for GithubClient {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchResponse> {
        let url = self.dispatch_url();

        debug!("Sending repository dispatch to GitHub: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.config.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .context("Failed to send repository dispatch to GitHub")?;

        let status = response.status().as_u16();
        let body = if response.status().is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        Ok(DispatchResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Seen {
        path: String,
        headers: HeaderMap,
        body: Value,
    }

    type Shared = Arc<(Mutex<Seen>, StatusCode)>;

    async fn dispatches(
        State(shared): State<Shared>,
        Path((owner, repo)): Path<(String, String)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, String) {
        let (seen, status) = &*shared;
        *seen.lock().await = Seen {
            path: format!("{owner}/{repo}"),
            headers,
            body,
        };
        let body = if status.is_success() {
            String::new()
        } else {
            r#"{"message":"Bad credentials"}"#.to_string()
        };
        (*status, body)
    }

    async fn serve(status: StatusCode) -> (String, Shared) {
        let shared: Shared = Arc::new((Mutex::new(Seen::default()), status));
        let app = Router::new()
            .route("/repos/{owner}/{repo}/dispatches", post(dispatches))
            .with_state(shared.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/"), shared)
    }

    fn client(api_url: String) -> GithubClient {
        GithubClient::new(GithubConfig {
            repo: "octo/deploy".to_string(),
            token: "ghp_test".to_string(),
            api_url,
        })
    }

    #[test]
    fn test_request_shape() {
        let request = DispatchRequest::new("deploy hotfix", 1001);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "event_type": "telegram-devops",
                "client_payload": { "message": "deploy hotfix", "chat_id": "1001" }
            })
        );
    }

    #[test]
    fn test_success_range() {
        let ok = |status| DispatchResponse {
            status,
            body: String::new(),
        };
        assert!(ok(204).is_success());
        assert!(ok(200).is_success());
        assert!(!ok(301).is_success());
        assert!(!ok(422).is_success());
    }

    #[tokio::test]
    async fn test_dispatch_sends_documented_request() {
        let (url, shared) = serve(StatusCode::NO_CONTENT).await;
        let response = client(url)
            .dispatch(&DispatchRequest::new("deploy hotfix", 1001))
            .await
            .unwrap();

        assert_eq!(response.status, 204);
        assert!(response.is_success());

        let seen = shared.0.lock().await;
        assert_eq!(seen.path, "octo/deploy");
        assert_eq!(seen.headers["authorization"], "token ghp_test");
        assert_eq!(seen.headers["accept"], "application/vnd.github.v3+json");
        assert_eq!(seen.headers["user-agent"], "telegram-devops-bot");
        assert_eq!(seen.body["event_type"], json!("telegram-devops"));
        assert_eq!(seen.body["client_payload"]["chat_id"], json!("1001"));
    }

    #[tokio::test]
    async fn test_rejection_returns_status_and_body() {
        let (url, _shared) = serve(StatusCode::UNAUTHORIZED).await;
        let response = client(url)
            .dispatch(&DispatchRequest::new("deploy", 1))
            .await
            .unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.body, r#"{"message":"Bad credentials"}"#);
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        // Bind and drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client(format!("http://{addr}"))
            .dispatch(&DispatchRequest::new("deploy", 1))
            .await;
        assert!(result.is_err());
    }
}
