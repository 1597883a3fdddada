//! Recon HTTP Client
//!
//! A type-safe HTTP client for the Recon server API, used by the CLI to
//! submit runs and read analytics.
//!
//! # Example
//!
//! ```no_run
//! use recon_client::ReconClient;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> recon_client::Result<()> {
//!     let client = ReconClient::new("http://localhost:8080");
//!
//!     let detail = client.get_run(Uuid::new_v4()).await?;
//!     println!("Run status: {}", detail.run.status.as_str());
//!     Ok(())
//! }
//! ```

pub mod error;
mod analytics;
mod runs;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Recon server API
///
/// Methods are organized into logical groups:
/// - Run lifecycle (submit, get, cancel, root causes)
/// - Pipeline analytics (history, trends, baselines)
#[derive(Debug, Clone)]
pub struct ReconClient {
    /// Base URL of the server (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ReconClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use recon_client::ReconClient;
    ///
    /// let client = ReconClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}
