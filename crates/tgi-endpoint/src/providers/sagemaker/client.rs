//! SageMaker API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use super::models::{
    ContainerDefinition, CreateEndpointConfigRequest, CreateEndpointConfigResponse,
    CreateEndpointRequest, CreateEndpointResponse, CreateModelRequest, CreateModelResponse,
    DeleteEndpointConfigRequest, DeleteModelRequest, DescribeEndpointResponse,
    EndpointNameRequest, ProductionVariant,
};
use crate::aws::{Credentials, SignedClient};
use crate::chat::{ChatRequest, ChatResponse};
use crate::errors::{EndpointError, EndpointResult};
use crate::providers::traits::{DeployRequest, Endpoint, EndpointProvider, EndpointStatus};

/// Signing name shared by the control plane and the runtime.
const SERVICE: &str = "sagemaker";

/// Variant name used for the single production variant.
const VARIANT_NAME: &str = "AllTraffic";

/// Timeout for a single inference request.
const INVOKE_TIMEOUT_SECS: u64 = 300;

/// Default polling interval when waiting for the endpoint.
const POLL_INTERVAL_SECS: u64 = 30;

/// SageMaker endpoint provider.
#[derive(Clone)]
pub struct SageMaker {
    /// Client for control-plane calls.
    control: SignedClient,
    /// Client for inference calls.
    runtime: SignedClient,
    /// Control-plane endpoint.
    control_endpoint: Url,
    /// Runtime endpoint.
    runtime_endpoint: Url,
    /// Interval between status polls.
    poll_interval: Duration,
}

impl SageMaker {
    /// Create a new SageMaker provider.
    ///
    /// # Arguments
    /// * `credentials` - AWS credentials
    /// * `region` - AWS region (e.g., "us-east-1")
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(credentials: Credentials, region: &str) -> EndpointResult<Self> {
        let control_endpoint =
            parse_endpoint(&format!("https://api.sagemaker.{region}.amazonaws.com/"))?;
        let runtime_endpoint =
            parse_endpoint(&format!("https://runtime.sagemaker.{region}.amazonaws.com/"))?;

        Ok(Self {
            control: SignedClient::new(credentials.clone(), region, None)?,
            runtime: SignedClient::new(
                credentials,
                region,
                Some(Duration::from_secs(INVOKE_TIMEOUT_SECS)),
            )?,
            control_endpoint,
            runtime_endpoint,
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
        })
    }

    /// Override the control-plane and runtime endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, control_endpoint: Url, runtime_endpoint: Url) -> Self {
        self.control_endpoint = control_endpoint;
        self.runtime_endpoint = runtime_endpoint;
        self
    }

    /// Set the interval between status polls.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Call a control-plane operation.
    async fn call<T, B>(&self, operation: &str, body: &B) -> EndpointResult<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.control
            .json_call(
                &self.control_endpoint,
                SERVICE,
                &format!("SageMaker.{operation}"),
                body,
            )
            .await
    }

    /// Convert a `DescribeEndpoint` response to our `Endpoint` type.
    ///
    /// The model name is not part of the response; the endpoint shares its
    /// name with the model it was created for.
    fn to_endpoint(described: &DescribeEndpointResponse) -> Endpoint {
        let status = match described.endpoint_status.as_str() {
            "Creating" => EndpointStatus::Creating,
            "Updating" => EndpointStatus::Updating,
            "SystemUpdating" => EndpointStatus::SystemUpdating,
            "RollingBack" => EndpointStatus::RollingBack,
            "InService" => EndpointStatus::InService,
            "OutOfService" => EndpointStatus::OutOfService,
            "Deleting" => EndpointStatus::Deleting,
            "Failed" => EndpointStatus::Failed,
            _ => EndpointStatus::Unknown,
        };

        Endpoint {
            name: described.endpoint_name.clone(),
            config_name: described
                .endpoint_config_name
                .clone()
                .unwrap_or_else(|| described.endpoint_name.clone()),
            model_name: described.endpoint_name.clone(),
            arn: described.endpoint_arn.clone(),
            status,
            failure_reason: described.failure_reason.clone(),
            created_at: described.creation_time.and_then(epoch_to_datetime),
        }
    }
}

fn parse_endpoint(raw: &str) -> EndpointResult<Url> {
    Url::parse(raw).map_err(|e| EndpointError::Config(format!("invalid endpoint {raw}: {e}")))
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

#[async_trait]
impl EndpointProvider for SageMaker {
    async fn create_endpoint(&self, req: &DeployRequest) -> EndpointResult<Endpoint> {
        info!(
            name = %req.name,
            image = %req.image_uri,
            instance_type = %req.instance_type,
            instance_count = req.instance_count,
            "Creating SageMaker model"
        );

        let model: CreateModelResponse = self
            .call(
                "CreateModel",
                &CreateModelRequest {
                    model_name: req.name.clone(),
                    execution_role_arn: req.role_arn.clone(),
                    primary_container: ContainerDefinition {
                        image: req.image_uri.clone(),
                        environment: req.environment.clone(),
                    },
                },
            )
            .await?;
        debug!(model_arn = %model.model_arn, "Model created");

        let config: CreateEndpointConfigResponse = self
            .call(
                "CreateEndpointConfig",
                &CreateEndpointConfigRequest {
                    endpoint_config_name: req.name.clone(),
                    production_variants: vec![ProductionVariant {
                        variant_name: VARIANT_NAME.to_string(),
                        model_name: req.name.clone(),
                        initial_instance_count: req.instance_count,
                        instance_type: req.instance_type.clone(),
                        container_startup_health_check_timeout_in_seconds: req
                            .health_check_timeout_secs,
                    }],
                },
            )
            .await?;
        debug!(config_arn = %config.endpoint_config_arn, "Endpoint config created");

        let endpoint: CreateEndpointResponse = self
            .call(
                "CreateEndpoint",
                &CreateEndpointRequest {
                    endpoint_name: req.name.clone(),
                    endpoint_config_name: req.name.clone(),
                },
            )
            .await?;

        info!(endpoint = %req.name, arn = %endpoint.endpoint_arn, "Endpoint creation started");

        Ok(Endpoint {
            name: req.name.clone(),
            config_name: req.name.clone(),
            model_name: req.name.clone(),
            arn: Some(endpoint.endpoint_arn),
            status: EndpointStatus::Creating,
            failure_reason: None,
            created_at: Some(Utc::now()),
        })
    }

    async fn get_endpoint(&self, name: &str) -> EndpointResult<Endpoint> {
        let described: DescribeEndpointResponse = self
            .call(
                "DescribeEndpoint",
                &EndpointNameRequest {
                    endpoint_name: name.to_string(),
                },
            )
            .await?;
        Ok(Self::to_endpoint(&described))
    }

    async fn wait_ready(&self, name: &str, timeout_secs: u64) -> EndpointResult<Endpoint> {
        info!(endpoint = %name, timeout_secs, "Waiting for endpoint to be in service");

        let start = std::time::Instant::now();
        let timeout = Duration::from_secs(timeout_secs);

        loop {
            let endpoint = self.get_endpoint(name).await?;

            debug!(
                endpoint = %name,
                status = %endpoint.status,
                elapsed_secs = start.elapsed().as_secs(),
                "Polling endpoint status"
            );

            match endpoint.status {
                EndpointStatus::InService => {
                    info!(endpoint = %name, "Endpoint is in service");
                    return Ok(endpoint);
                }
                EndpointStatus::Failed => {
                    return Err(EndpointError::DeploymentFailed(
                        endpoint
                            .failure_reason
                            .unwrap_or_else(|| "no failure reason reported".to_string()),
                    ));
                }
                _ => {}
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(EndpointError::Timeout(timeout_secs));
            }

            // Never sleep past the deadline.
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }

    async fn invoke(
        &self,
        endpoint: &Endpoint,
        request: &ChatRequest,
    ) -> EndpointResult<ChatResponse> {
        let url = self
            .runtime_endpoint
            .join(&format!("endpoints/{}/invocations", endpoint.name))
            .map_err(|e| EndpointError::Config(format!("invalid endpoint name: {e}")))?;

        debug!(
            endpoint = %endpoint.name,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "Invoking endpoint"
        );

        self.runtime.post_json(&url, SERVICE, request).await
    }

    async fn delete_model(&self, endpoint: &Endpoint) -> EndpointResult<()> {
        info!(model = %endpoint.model_name, "Deleting model");
        let _: serde_json::Value = self
            .call(
                "DeleteModel",
                &DeleteModelRequest {
                    model_name: endpoint.model_name.clone(),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_endpoint(&self, endpoint: &Endpoint) -> EndpointResult<()> {
        info!(endpoint = %endpoint.name, "Deleting endpoint");
        let _: serde_json::Value = self
            .call(
                "DeleteEndpoint",
                &EndpointNameRequest {
                    endpoint_name: endpoint.name.clone(),
                },
            )
            .await?;

        info!(config = %endpoint.config_name, "Deleting endpoint config");
        let _: serde_json::Value = self
            .call(
                "DeleteEndpointConfig",
                &DeleteEndpointConfigRequest {
                    endpoint_config_name: endpoint.config_name.clone(),
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn described(status: &str) -> DescribeEndpointResponse {
        DescribeEndpointResponse {
            endpoint_name: "tgi-2024".to_string(),
            endpoint_arn: Some("arn:aws:sagemaker:us-east-1:123:endpoint/tgi-2024".to_string()),
            endpoint_config_name: Some("tgi-2024-config".to_string()),
            endpoint_status: status.to_string(),
            failure_reason: None,
            creation_time: Some(1_714_566_645.123),
        }
    }

    #[test]
    fn test_endpoint_status_mapping() {
        assert_eq!(
            SageMaker::to_endpoint(&described("InService")).status,
            EndpointStatus::InService
        );
        assert_eq!(
            SageMaker::to_endpoint(&described("Creating")).status,
            EndpointStatus::Creating
        );
        assert_eq!(
            SageMaker::to_endpoint(&described("Failed")).status,
            EndpointStatus::Failed
        );
        assert_eq!(
            SageMaker::to_endpoint(&described("Mystery")).status,
            EndpointStatus::Unknown
        );
    }

    #[test]
    fn test_to_endpoint_fields() {
        let endpoint = SageMaker::to_endpoint(&described("InService"));
        assert_eq!(endpoint.name, "tgi-2024");
        assert_eq!(endpoint.config_name, "tgi-2024-config");
        assert_eq!(endpoint.model_name, "tgi-2024");
        assert_eq!(
            endpoint.created_at.map(|t| t.timestamp_millis()),
            Some(1_714_566_645_123)
        );
    }
}
