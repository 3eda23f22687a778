//! Hosted LLM endpoints on Amazon SageMaker with the Hugging Face TGI container.
//!
//! This crate provisions a Text Generation Inference endpoint, talks to it
//! through the Messages API, load-tests it with llmperf and deletes it again.
//!
//! ## Workflow
//!
//! ```text
//! credentials ──► session/role ──► image URI ──► container env
//!                                                     │
//!                                                     ▼
//!  teardown ◄── benchmark ◄── test prompts ◄── deployed endpoint
//! ```
//!
//! Model sharding, batching and scheduling happen inside the serving
//! container; provisioning happens inside SageMaker; load generation happens
//! inside llmperf. This crate only calls them in order.
//!
//! ## Example
//!
//! ```no_run
//! use tgi_endpoint::{
//!     workflow, ChatMessage, Credentials, DeploymentConfig, EndpointProvider, GenerationParams,
//!     SageMaker, ServingConfig,
//! };
//!
//! # async fn example(
//! #     key: &str,
//! #     secret: &str,
//! #     name: String,
//! #     image_uri: String,
//! #     role_arn: String,
//! #     hf_token: &str,
//! # ) -> tgi_endpoint::EndpointResult<()> {
//! let messages = vec![ChatMessage::user("What is deep learning?")];
//! let params = GenerationParams::default();
//! let provider = SageMaker::new(Credentials::new(key, secret), "us-east-1")?;
//! let request = workflow::deploy_request(
//!     &name,
//!     &image_uri,
//!     &role_arn,
//!     &ServingConfig::default().with_token(hf_token),
//!     &DeploymentConfig::default(),
//! )?;
//!
//! let endpoint = workflow::deploy(&provider, &request, None).await?;
//! let reply = workflow::chat(&provider, &endpoint, messages, &params).await?;
//! println!("{reply}");
//! provider.teardown(&endpoint).await?;
//! # Ok(())
//! # }
//! ```

pub mod aws;
pub mod benchmark;
pub mod chat;
pub mod config;
pub mod errors;
pub mod image;
pub mod providers;
pub mod session;
pub mod state;
pub mod workflow;

pub use aws::Credentials;
pub use benchmark::{BenchmarkConfig, BenchmarkRequest, BenchmarkRunner, BenchmarkSummary, LlmPerf};
pub use chat::{ChatMessage, ChatRequest, ChatResponse, GenerationParams, Role};
pub use config::{AppConfig, DeploymentConfig, ServingConfig, TOKEN_PLACEHOLDER};
pub use errors::{EndpointError, EndpointResult};
pub use image::ImageConfig;
pub use providers::{
    resource_name, DeployRequest, Endpoint, EndpointProvider, EndpointStatus, SageMaker,
};
pub use session::{AwsIdentity, IdentityService, Session, SessionConfig};
pub use state::{DeploymentState, DeploymentStep};
