//! Endpoint provider trait and common types.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chat::{ChatRequest, ChatResponse};
use crate::errors::EndpointResult;

/// Longest resource name the platform accepts.
pub const MAX_NAME_LEN: usize = 63;

/// Endpoint status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    /// Endpoint is being created.
    Creating,
    /// Endpoint is being updated.
    Updating,
    /// Platform maintenance in progress.
    SystemUpdating,
    /// An update is being rolled back.
    RollingBack,
    /// Endpoint is serving traffic.
    InService,
    /// Endpoint is not serving traffic.
    OutOfService,
    /// Endpoint is being deleted.
    Deleting,
    /// Creation or update failed.
    Failed,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Updating => write!(f, "updating"),
            Self::SystemUpdating => write!(f, "system_updating"),
            Self::RollingBack => write!(f, "rolling_back"),
            Self::InService => write!(f, "in_service"),
            Self::OutOfService => write!(f, "out_of_service"),
            Self::Deleting => write!(f, "deleting"),
            Self::Failed => write!(f, "failed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Handle to a deployed endpoint and the resources behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint name.
    pub name: String,
    /// Endpoint configuration name.
    pub config_name: String,
    /// Model name.
    pub model_name: String,
    /// Endpoint ARN, once known.
    pub arn: Option<String>,
    /// Current status.
    pub status: EndpointStatus,
    /// Reason reported for a failed endpoint.
    pub failure_reason: Option<String>,
    /// When the endpoint was created.
    pub created_at: Option<DateTime<Utc>>,
}

/// Request to create and deploy an endpoint.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Name shared by the model, endpoint config and endpoint.
    pub name: String,
    /// Serving image URI.
    pub image_uri: String,
    /// Container environment.
    pub environment: BTreeMap<String, String>,
    /// Execution role ARN.
    pub role_arn: String,
    /// Instance type.
    pub instance_type: String,
    /// Number of instances.
    pub instance_count: u32,
    /// Container startup health-check timeout in seconds.
    pub health_check_timeout_secs: u64,
    /// How long to wait for the endpoint to be ready.
    pub wait_timeout_secs: u64,
}

/// Trait for managed inference platforms.
#[async_trait]
pub trait EndpointProvider: Send + Sync {
    /// Create the model, endpoint configuration and endpoint without waiting.
    async fn create_endpoint(&self, req: &DeployRequest) -> EndpointResult<Endpoint>;

    /// Get an endpoint by name.
    async fn get_endpoint(&self, name: &str) -> EndpointResult<Endpoint>;

    /// Wait for an endpoint to be in service.
    async fn wait_ready(&self, name: &str, timeout_secs: u64) -> EndpointResult<Endpoint>;

    /// Send a chat request to the endpoint.
    async fn invoke(&self, endpoint: &Endpoint, request: &ChatRequest)
        -> EndpointResult<ChatResponse>;

    /// Delete the model behind an endpoint.
    async fn delete_model(&self, endpoint: &Endpoint) -> EndpointResult<()>;

    /// Delete the endpoint and its configuration.
    async fn delete_endpoint(&self, endpoint: &Endpoint) -> EndpointResult<()>;

    /// Delete the model, then the endpoint.
    ///
    /// Not idempotent: once the resources are gone, a repeated call fails with
    /// the platform's not-found error.
    async fn teardown(&self, endpoint: &Endpoint) -> EndpointResult<()> {
        info!(endpoint = %endpoint.name, model = %endpoint.model_name, "Tearing down endpoint");
        self.delete_model(endpoint).await?;
        self.delete_endpoint(endpoint).await?;
        info!(endpoint = %endpoint.name, "Endpoint torn down");
        Ok(())
    }
}

/// Unique resource name: `<base>-<timestamp>`, at most [`MAX_NAME_LEN`] chars.
///
/// Characters the platform rejects are replaced with `-`.
pub fn resource_name(base: &str, time: DateTime<Utc>) -> String {
    let timestamp = time.format("%Y-%m-%d-%H-%M-%S-%3f").to_string();

    let mut sanitized = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_alphanumeric() {
            sanitized.push(c);
        } else if !sanitized.ends_with('-') {
            sanitized.push('-');
        }
    }
    let budget = MAX_NAME_LEN - timestamp.len() - 1;
    let base: String = sanitized.trim_matches('-').chars().take(budget).collect();
    let base = base.trim_end_matches('-');

    if base.is_empty() {
        timestamp
    } else {
        format!("{base}-{timestamp}")
    }
}
