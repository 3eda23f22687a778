//! SageMaker API request and response models.
//!
//! The control plane speaks AWS JSON 1.1 with PascalCase members.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Model
// ============================================================================

/// `CreateModel` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateModelRequest {
    /// Model name.
    pub model_name: String,
    /// Role the container runs as.
    pub execution_role_arn: String,
    /// Serving container.
    pub primary_container: ContainerDefinition,
}

/// Container definition.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerDefinition {
    /// Image URI.
    pub image: String,
    /// Container environment.
    pub environment: BTreeMap<String, String>,
}

/// `CreateModel` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateModelResponse {
    /// Model ARN.
    pub model_arn: String,
}

/// `DeleteModel` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteModelRequest {
    /// Model name.
    pub model_name: String,
}

// ============================================================================
// Endpoint configuration
// ============================================================================

/// `CreateEndpointConfig` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEndpointConfigRequest {
    /// Endpoint configuration name.
    pub endpoint_config_name: String,
    /// Production variants.
    pub production_variants: Vec<ProductionVariant>,
}

/// A production variant.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductionVariant {
    /// Variant name.
    pub variant_name: String,
    /// Model name.
    pub model_name: String,
    /// Number of instances.
    pub initial_instance_count: u32,
    /// Instance type.
    pub instance_type: String,
    /// Container startup health-check timeout.
    pub container_startup_health_check_timeout_in_seconds: u64,
}

/// `CreateEndpointConfig` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEndpointConfigResponse {
    /// Endpoint configuration ARN.
    pub endpoint_config_arn: String,
}

/// `DeleteEndpointConfig` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteEndpointConfigRequest {
    /// Endpoint configuration name.
    pub endpoint_config_name: String,
}

// ============================================================================
// Endpoint
// ============================================================================

/// `CreateEndpoint` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEndpointRequest {
    /// Endpoint name.
    pub endpoint_name: String,
    /// Endpoint configuration name.
    pub endpoint_config_name: String,
}

/// `CreateEndpoint` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEndpointResponse {
    /// Endpoint ARN.
    pub endpoint_arn: String,
}

/// Request naming a single endpoint (`DescribeEndpoint`, `DeleteEndpoint`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointNameRequest {
    /// Endpoint name.
    pub endpoint_name: String,
}

/// `DescribeEndpoint` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeEndpointResponse {
    /// Endpoint name.
    pub endpoint_name: String,
    /// Endpoint ARN.
    pub endpoint_arn: Option<String>,
    /// Endpoint configuration name.
    pub endpoint_config_name: Option<String>,
    /// Status (`Creating`, `InService`, `Failed`, ...).
    pub endpoint_status: String,
    /// Reason for a failed status.
    pub failure_reason: Option<String>,
    /// Creation time as epoch seconds.
    pub creation_time: Option<f64>,
}
