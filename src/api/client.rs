//! API client module
//!
//! This module provides HTTP client functionality to interact with the mikado API server.

use std::sync::Arc;

use reqwest::{Client as ReqwestClient, Error as ReqwestError};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::server::CommandRequest;
use crate::domain::{Command, RenderResult};
use crate::session::GoalsResponse;
use crate::snapshot::Snapshot;
use crate::stats::Stats;

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Generic API response structure
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, ClientError> {
        if self.success {
            self.data.ok_or(ClientError::MissingData)
        } else {
            Err(ClientError::Api(
                self.error
                    .unwrap_or_else(|| "Unknown API error".to_string()),
            ))
        }
    }
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("API error: {0}")]
    Api(String),

    #[error("Missing data in response")]
    MissingData,
}

/// API client for the mikado service
#[derive(Debug, Clone)]
pub struct Client {
    http_client: Arc<ReqwestClient>,
    config: ClientConfig,
}

impl Client {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        match response.json::<ApiResponse<T>>().await {
            Ok(api_response) => api_response.into_result(),
            Err(_) if !status.is_success() => {
                Err(ClientError::Api(format!("HTTP error: {}", status)))
            }
            Err(e) => Err(ClientError::Http(e)),
        }
    }

    /// Get the rendered goals
    pub async fn render(&self) -> Result<RenderResult, ClientError> {
        let response = self.http_client.get(self.url("render")).send().await?;
        Self::read(response).await
    }

    /// Apply a batch of commands; rejections come back as messages
    pub async fn apply(
        &self,
        commands: Vec<Command>,
    ) -> Result<GoalsResponse<RenderResult>, ClientError> {
        let request = CommandRequest { commands };
        let response = self
            .http_client
            .post(self.url("command"))
            .json(&request)
            .send()
            .await?;
        Self::read(response).await
    }

    /// Get graph statistics
    pub async fn stats(&self) -> Result<Stats, ClientError> {
        let response = self.http_client.get(self.url("stats")).send().await?;
        Self::read(response).await
    }

    /// Export the persistent state
    pub async fn export(&self) -> Result<Snapshot, ClientError> {
        let response = self.http_client.get(self.url("export")).send().await?;
        Self::read(response).await
    }

    /// Replace the persistent state
    pub async fn import(&self, snapshot: &Snapshot) -> Result<RenderResult, ClientError> {
        let response = self
            .http_client
            .post(self.url("import"))
            .json(snapshot)
            .send()
            .await?;
        Self::read(response).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::router;
    use crate::domain::EdgeType;
    use crate::session::Core;
    use tokio::net::TcpListener;

    async fn spawn_server() -> Client {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = router(Core::default());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Client::with_config(ClientConfig {
            base_url: format!("http://{}", address),
        })
    }

    #[tokio::test]
    async fn test_client_round_trip() {
        let client = spawn_server().await;

        let response = client
            .apply(vec![
                Command::add("A", 1),
                Command::add("B", 1),
                Command::toggle_link(2, 3, EdgeType::Blocker),
            ])
            .await
            .unwrap();
        assert!(response.messages.is_empty());
        assert_eq!(response.res.rows.len(), 3);

        let stats = client.stats().await.unwrap();
        assert_eq!(stats.goals, 3);
        assert_eq!(stats.edges, 3);

        let snapshot = client.export().await.unwrap();
        let result = client.import(&snapshot).await.unwrap();
        assert_eq!(result, client.render().await.unwrap());
    }

    #[tokio::test]
    async fn test_client_reports_api_errors() {
        let client = spawn_server().await;
        let error = client.import(&Snapshot::default()).await.unwrap_err();
        assert!(matches!(error, ClientError::Api(_)));
    }
}
