//! Play Store Publisher HTTP Client
//!
//! A small, typed client for the build server API, shared by the CLI and by
//! anything else that submits builds and polls them.
//!
//! # Example
//!
//! ```no_run
//! use playpub_client::{BuildUpload, PollOptions, PublisherClient};
//! use playpub_core::domain::config::BuildConfig;
//!
//! # async fn example() -> playpub_client::Result<()> {
//! let client = PublisherClient::new("http://localhost:8000");
//!
//! let apk = BuildUpload::new("app-release.apk", std::fs::read("app-release.apk").unwrap());
//! let submitted = client
//!     .submit_build(&BuildConfig::new("Demo", 1), apk, None, Vec::new())
//!     .await?;
//!
//! let job = client
//!     .wait_for_build(submitted.build_id, &PollOptions::default(), |job| {
//!         println!("{} {}%", job.status, job.progress);
//!     })
//!     .await?;
//! println!("Finished: {}", job.status);
//!
//! let bundle = client.download_artifact(job.id).await?;
//! std::fs::write(&bundle.file_name, &bundle.data).unwrap();
//! # Ok(())
//! # }
//! ```

mod builds;
pub mod error;
mod poll;

// Re-export commonly used types
pub use builds::{Artifact, BuildUpload};
pub use error::{ClientError, Result};
pub use poll::PollOptions;

use playpub_core::dto::build::ErrorResponse;
use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the build server API
#[derive(Debug, Clone)]
pub struct PublisherClient {
    /// Base URL of the server (e.g., "http://localhost:8000")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl PublisherClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use playpub_client::PublisherClient;
    ///
    /// let client = PublisherClient::new("http://localhost:8000");
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

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Turn an error status into [`ClientError::Api`]
    ///
    /// Error bodies are `{ "detail": ... }`; the detail is surfaced verbatim.
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let detail = serde_json::from_str::<ErrorResponse>(&text)
            .map(|body| body.detail)
            .unwrap_or(text);
        Err(ClientError::api_error(status.as_u16(), detail))
    }

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        self.check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("Failed to parse JSON response: {}", e)))
    }
}
