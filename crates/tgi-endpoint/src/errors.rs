//! Error types for endpoint provisioning and the surrounding workflow.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while provisioning, invoking or benchmarking an endpoint.
#[derive(Error, Debug)]
pub enum EndpointError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} {code} - {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Authentication or authorization was rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No usable AWS credentials.
    #[error("Missing credentials: {0}")]
    Credentials(String),

    /// The access token still holds its documented placeholder.
    #[error("Please set your Hugging Face Hub token (HUGGING_FACE_HUB_TOKEN is still the placeholder)")]
    PlaceholderToken,

    /// The execution role could not be resolved.
    #[error("Could not resolve execution role: {0}")]
    Role(String),

    /// The endpoint reached the `Failed` status.
    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),

    /// The inference response carried no choices.
    #[error("Inference response contained no choices")]
    EmptyResponse,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem or process I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A deployment recorded in the state directory is still live.
    #[error("Endpoint {name} is still {step}; run `tgi-endpoint teardown --yes` first or pass --force")]
    ActiveDeployment { name: String, step: String },

    /// The benchmark tool exited unsuccessfully.
    #[error("Benchmark failed: {0}")]
    Benchmark(String),

    /// The benchmark tool did not leave a summary file where expected.
    #[error("Benchmark summary not found at {}", .0.display())]
    MissingSummary(PathBuf),
}

/// Result alias used across the crate.
pub type EndpointResult<T> = Result<T, EndpointError>;
