//! The end-to-end sequence: configure, deploy, chat, benchmark, tear down.
//!
//! Every step awaits the previous one and any failure aborts the rest. Nothing
//! is cleaned up on failure; the state file keeps the resource names so a
//! later `teardown` can remove them.

use tracing::{info, warn};

use crate::benchmark::{BenchmarkConfig, BenchmarkRequest, BenchmarkRunner, BenchmarkSummary};
use crate::chat::{ChatMessage, ChatRequest, GenerationParams};
use crate::config::{DeploymentConfig, ServingConfig};
use crate::errors::EndpointResult;
use crate::providers::{DeployRequest, Endpoint, EndpointProvider, EndpointStatus};
use crate::state::DeploymentState;

/// System prompt of the built-in test conversations.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// User prompts of the built-in test conversations.
pub const DEFAULT_PROMPTS: [&str; 2] = [
    "What is deep learning?",
    "Write a short poem about GPUs.",
];

/// Build a deploy request, validating the serving configuration first.
///
/// # Errors
/// Fails with [`crate::EndpointError::PlaceholderToken`] when the access token
/// was never replaced.
pub fn deploy_request(
    name: &str,
    image_uri: &str,
    role_arn: &str,
    serving: &ServingConfig,
    deployment: &DeploymentConfig,
) -> EndpointResult<DeployRequest> {
    Ok(DeployRequest {
        name: name.to_string(),
        image_uri: image_uri.to_string(),
        environment: serving.to_environment()?,
        role_arn: role_arn.to_string(),
        instance_type: deployment.instance_type.clone(),
        instance_count: deployment.instance_count,
        health_check_timeout_secs: deployment.health_check_timeout_secs,
        wait_timeout_secs: deployment.wait_timeout_secs,
    })
}

/// Create the endpoint and block until it is in service.
///
/// The state, when given, records the resource names before the first create
/// call, so a partial create can still be torn down. It is saved again once
/// the resources exist and when the endpoint is ready.
///
/// # Errors
/// Returns the provider's error, [`crate::EndpointError::DeploymentFailed`] or
/// [`crate::EndpointError::Timeout`].
pub async fn deploy(
    provider: &dyn EndpointProvider,
    request: &DeployRequest,
    mut state: Option<&mut DeploymentState>,
) -> EndpointResult<Endpoint> {
    if let Some(state) = state.as_deref_mut() {
        state.set_deploying(pending_endpoint(request), &request.image_uri)?;
    }

    let created = provider.create_endpoint(request).await?;
    if let Some(state) = state.as_deref_mut() {
        state.set_deploying(created.clone(), &request.image_uri)?;
    }

    let ready = provider
        .wait_ready(&created.name, request.wait_timeout_secs)
        .await?;
    let endpoint = Endpoint {
        config_name: created.config_name,
        model_name: created.model_name,
        ..ready
    };

    if let Some(state) = state {
        state.set_deployed(endpoint.clone())?;
    }
    Ok(endpoint)
}

/// Names a deploy request is about to create.
fn pending_endpoint(request: &DeployRequest) -> Endpoint {
    Endpoint {
        name: request.name.clone(),
        config_name: request.name.clone(),
        model_name: request.name.clone(),
        arn: None,
        status: EndpointStatus::Creating,
        failure_reason: None,
        created_at: None,
    }
}

/// Send one conversation and return the generated text.
///
/// # Errors
/// Returns the provider's error or [`crate::EndpointError::EmptyResponse`].
pub async fn chat(
    provider: &dyn EndpointProvider,
    endpoint: &Endpoint,
    messages: Vec<ChatMessage>,
    params: &GenerationParams,
) -> EndpointResult<String> {
    let request = ChatRequest::new(messages, params);
    let response = provider.invoke(endpoint, &request).await?;
    if let Some(usage) = response.usage {
        info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Chat completed"
        );
    }
    response.text().map(str::to_string)
}

/// Delete the endpoint's resources and mark the state deleted.
///
/// # Errors
/// Returns the provider's error; a second teardown fails with
/// [`crate::EndpointError::NotFound`].
pub async fn teardown(
    provider: &dyn EndpointProvider,
    endpoint: &Endpoint,
    state: Option<&mut DeploymentState>,
) -> EndpointResult<()> {
    provider.teardown(endpoint).await?;
    if let Some(state) = state {
        state.set_deleted()?;
    }
    Ok(())
}

/// Built-in test conversations.
pub fn default_conversations() -> Vec<Vec<ChatMessage>> {
    DEFAULT_PROMPTS
        .iter()
        .map(|prompt| {
            vec![
                ChatMessage::system(DEFAULT_SYSTEM_PROMPT),
                ChatMessage::user(*prompt),
            ]
        })
        .collect()
}

/// Inputs for a full run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Resource name.
    pub name: String,
    /// Serving image URI.
    pub image_uri: String,
    /// Execution role ARN.
    pub role_arn: String,
    /// Container environment.
    pub serving: ServingConfig,
    /// Deployment shape.
    pub deployment: DeploymentConfig,
    /// Generation parameters for the test conversations.
    pub generation: GenerationParams,
    /// Test conversations.
    pub conversations: Vec<Vec<ChatMessage>>,
    /// Benchmark settings.
    pub benchmark: BenchmarkConfig,
    /// Delete the resources at the end.
    pub teardown: bool,
}

/// Outcome of a full run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The deployed endpoint.
    pub endpoint: Endpoint,
    /// Generated text per test conversation.
    pub replies: Vec<String>,
    /// Benchmark summary, when a runner was given.
    pub benchmark: Option<BenchmarkSummary>,
    /// Whether the resources were deleted.
    pub torn_down: bool,
}

/// Run the whole sequence.
///
/// # Errors
/// The first failing step's error; later steps are not attempted.
pub async fn run(
    provider: &dyn EndpointProvider,
    runner: Option<&dyn BenchmarkRunner>,
    plan: &RunPlan,
    mut state: Option<&mut DeploymentState>,
) -> EndpointResult<RunReport> {
    let request = deploy_request(
        &plan.name,
        &plan.image_uri,
        &plan.role_arn,
        &plan.serving,
        &plan.deployment,
    )?;
    info!(name = %plan.name, image = %plan.image_uri, "Starting run");

    let endpoint = deploy(provider, &request, state.as_deref_mut()).await?;

    let mut replies = Vec::with_capacity(plan.conversations.len());
    for messages in &plan.conversations {
        let reply = chat(provider, &endpoint, messages.clone(), &plan.generation).await?;
        replies.push(reply);
    }

    let benchmark = match runner {
        Some(runner) => {
            let request = BenchmarkRequest::new(&endpoint.name, &plan.benchmark);
            Some(runner.run(&request).await?)
        }
        None => None,
    };

    if plan.teardown {
        teardown(provider, &endpoint, state).await?;
    } else {
        warn!(endpoint = %endpoint.name, "Leaving endpoint running");
    }

    Ok(RunReport {
        endpoint,
        replies,
        benchmark,
        torn_down: plan.teardown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EndpointError;

    #[test]
    fn test_deploy_request_carries_deployment_shape() {
        let request = deploy_request(
            "tgi-1",
            "image:tag",
            "arn:aws:iam::1:role/r",
            &ServingConfig::default().with_token("hf_abc"),
            &DeploymentConfig::default(),
        )
        .unwrap();

        assert_eq!(request.instance_type, "ml.p4d.24xlarge");
        assert_eq!(request.instance_count, 1);
        assert_eq!(request.health_check_timeout_secs, 900);
        assert_eq!(request.environment["HUGGING_FACE_HUB_TOKEN"], "hf_abc");
    }

    #[test]
    fn test_deploy_request_rejects_placeholder() {
        let err = deploy_request(
            "tgi-1",
            "image:tag",
            "arn",
            &ServingConfig::default(),
            &DeploymentConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EndpointError::PlaceholderToken));
    }

    #[test]
    fn test_default_conversations() {
        let conversations = default_conversations();
        assert_eq!(conversations.len(), DEFAULT_PROMPTS.len());
        assert_eq!(conversations[0][0], ChatMessage::system(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(conversations[0][1], ChatMessage::user("What is deep learning?"));
    }
}
