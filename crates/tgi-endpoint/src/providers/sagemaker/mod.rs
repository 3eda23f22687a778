//! Amazon SageMaker endpoint provider.
//!
//! Implements the [`EndpointProvider`](crate::providers::EndpointProvider) trait
//! on top of the SageMaker control plane (JSON 1.1) and runtime APIs.
//!
//! ## Recommended Instance Types
//!
//! - **ml.g5.2xlarge**: 1x A10G 24GB - 7B/8B models
//! - **ml.g5.12xlarge**: 4x A10G 24GB - 13B to 34B models, or 70B quantized
//! - **ml.p4d.24xlarge**: 8x A100 40GB - 70B models in bf16

mod client;
mod models;

pub use client::SageMaker;
pub use models::*;
