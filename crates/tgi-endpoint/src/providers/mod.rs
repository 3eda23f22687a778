//! Endpoint provider abstractions.
//!
//! This module contains the [`EndpointProvider`] trait and its implementation
//! for Amazon SageMaker.

pub mod sagemaker;
pub mod traits;

pub use sagemaker::SageMaker;
pub use traits::{
    resource_name, DeployRequest, Endpoint, EndpointProvider, EndpointStatus, MAX_NAME_LEN,
};
