//! Session and execution-role resolution.
//!
//! The session is an explicit context object: region and credentials come from
//! the caller, and the execution role is resolved once up front.
//!
//! Role resolution order:
//!
//! 1. a role ARN configured by the caller;
//! 2. the caller identity from STS, when it is an assumed role;
//! 3. IAM `GetRole` for a fixed role name.
//!
//! If the last step fails, its error is returned unchanged.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::aws::http::xml_element;
use crate::aws::{Credentials, SignedClient};
use crate::errors::{EndpointError, EndpointResult};

/// Role name looked up when the caller identity is not an assumed role.
pub const DEFAULT_ROLE_NAME: &str = "sagemaker_execution_role";

/// IAM is a global service signed in this region.
const IAM_SIGNING_REGION: &str = "us-east-1";

/// Inputs for building a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// AWS region (e.g., "us-east-1").
    pub region: String,
    /// Credentials used for all calls.
    pub credentials: Credentials,
    /// Explicit execution role ARN; skips lookups when set.
    pub role_arn: Option<String>,
    /// Role name for the IAM fallback lookup.
    pub role_name: String,
}

impl SessionConfig {
    /// Create a session config with the default fallback role name.
    pub fn new(region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            region: region.into(),
            credentials,
            role_arn: None,
            role_name: DEFAULT_ROLE_NAME.to_string(),
        }
    }
}

/// A resolved cloud session.
#[derive(Debug, Clone)]
pub struct Session {
    /// AWS region.
    pub region: String,
    /// Credentials.
    pub credentials: Credentials,
    /// Execution role ARN assumed by the serving container.
    pub role_arn: String,
}

impl Session {
    /// Resolve the execution role and build a session.
    ///
    /// # Errors
    /// Returns an error when the region is empty or no role can be resolved.
    pub async fn resolve(
        config: SessionConfig,
        identity: &dyn IdentityService,
    ) -> EndpointResult<Self> {
        if config.region.trim().is_empty() {
            return Err(EndpointError::Config(
                "region not set (use --region or AWS_REGION)".to_string(),
            ));
        }

        let role_arn =
            resolve_execution_role(identity, config.role_arn.as_deref(), &config.role_name)
                .await?;

        info!(region = %config.region, role_arn = %role_arn, "Session resolved");

        Ok(Self {
            region: config.region,
            credentials: config.credentials,
            role_arn,
        })
    }
}

/// Identity lookups needed for role resolution.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// ARN of the calling identity.
    async fn caller_arn(&self) -> EndpointResult<String>;

    /// ARN of an IAM role by name.
    async fn role_arn(&self, role_name: &str) -> EndpointResult<String>;
}

/// Resolve the execution role ARN.
///
/// # Errors
/// Returns the fallback lookup's error when every step fails.
pub async fn resolve_execution_role(
    identity: &dyn IdentityService,
    configured: Option<&str>,
    fallback_role_name: &str,
) -> EndpointResult<String> {
    if let Some(arn) = configured.map(str::trim).filter(|a| !a.is_empty()) {
        debug!(role_arn = %arn, "Using configured execution role");
        return Ok(arn.to_string());
    }

    match identity.caller_arn().await {
        Ok(caller) => {
            if let Some(role) = role_from_caller_arn(&caller) {
                return Ok(role);
            }
            warn!(caller = %caller, "Caller identity is not a role, falling back to IAM lookup");
        }
        Err(e) => {
            warn!(error = %e, "Caller identity lookup failed, falling back to IAM lookup");
        }
    }

    identity.role_arn(fallback_role_name).await.map_err(|e| match e {
        EndpointError::NotFound(msg) => EndpointError::Role(format!(
            "role '{fallback_role_name}' not found: {msg}"
        )),
        other => other,
    })
}

/// Turn a caller ARN into the IAM role ARN it was assumed from.
///
/// Returns `None` for identities that are not roles (e.g. IAM users).
pub fn role_from_caller_arn(arn: &str) -> Option<String> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    let [_, partition, service, _, account, resource] = parts.as_slice() else {
        return None;
    };

    match *service {
        "iam" if resource.starts_with("role/") => Some(arn.to_string()),
        "sts" => {
            let role = resource.strip_prefix("assumed-role/")?.split('/').next()?;
            if role.is_empty() {
                return None;
            }
            // Roles created by the SageMaker console live under a service-role path.
            let path = if role.starts_with("AmazonSageMaker-ExecutionRole") {
                "service-role/"
            } else {
                ""
            };
            Some(format!("arn:{partition}:iam::{account}:role/{path}{role}"))
        }
        _ => None,
    }
}

/// STS and IAM backed [`IdentityService`].
#[derive(Clone)]
pub struct AwsIdentity {
    /// Signed HTTP client.
    http: SignedClient,
    /// STS endpoint.
    sts_endpoint: Url,
    /// IAM endpoint.
    iam_endpoint: Url,
}

impl AwsIdentity {
    /// Create an identity client for the given region.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(credentials: Credentials, region: &str) -> EndpointResult<Self> {
        let sts = format!("https://sts.{region}.amazonaws.com/");
        let sts_endpoint = Url::parse(&sts)
            .map_err(|e| EndpointError::Config(format!("invalid STS endpoint {sts}: {e}")))?;
        let iam_endpoint = Url::parse("https://iam.amazonaws.com/")
            .map_err(|e| EndpointError::Config(format!("invalid IAM endpoint: {e}")))?;

        Ok(Self {
            http: SignedClient::new(credentials, region, None)?,
            sts_endpoint,
            iam_endpoint,
        })
    }

    /// Override the STS and IAM endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, sts_endpoint: Url, iam_endpoint: Url) -> Self {
        self.sts_endpoint = sts_endpoint;
        self.iam_endpoint = iam_endpoint;
        self
    }
}

#[async_trait]
impl IdentityService for AwsIdentity {
    async fn caller_arn(&self) -> EndpointResult<String> {
        let region = self.http.region().to_string();
        let xml = self
            .http
            .query_call(
                &self.sts_endpoint,
                "sts",
                &region,
                &[("Action", "GetCallerIdentity"), ("Version", "2011-06-15")],
            )
            .await?;

        xml_element(&xml, "Arn").ok_or_else(|| {
            EndpointError::Role("GetCallerIdentity response carried no Arn".to_string())
        })
    }

    async fn role_arn(&self, role_name: &str) -> EndpointResult<String> {
        let xml = self
            .http
            .query_call(
                &self.iam_endpoint,
                "iam",
                IAM_SIGNING_REGION,
                &[
                    ("Action", "GetRole"),
                    ("RoleName", role_name),
                    ("Version", "2010-05-08"),
                ],
            )
            .await?;

        xml_element(&xml, "Arn")
            .ok_or_else(|| EndpointError::Role(format!("GetRole({role_name}) carried no Arn")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct FakeIdentity {
        caller: EndpointResult<String>,
        role: Option<String>,
        looked_up: Mutex<Vec<String>>,
    }

    impl FakeIdentity {
        fn new(caller: EndpointResult<String>, role: Option<&str>) -> Self {
            Self {
                caller,
                role: role.map(String::from),
                looked_up: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IdentityService for FakeIdentity {
        async fn caller_arn(&self) -> EndpointResult<String> {
            match &self.caller {
                Ok(arn) => Ok(arn.clone()),
                Err(e) => Err(EndpointError::Auth(e.to_string())),
            }
        }

        async fn role_arn(&self, role_name: &str) -> EndpointResult<String> {
            self.looked_up.lock().unwrap().push(role_name.to_string());
            self.role
                .clone()
                .ok_or_else(|| EndpointError::NotFound(format!("no role {role_name}")))
        }
    }

    #[test]
    fn test_role_from_assumed_role_arn() {
        assert_eq!(
            role_from_caller_arn("arn:aws:sts::123456789012:assumed-role/Deployer/botocore-session")
                .as_deref(),
            Some("arn:aws:iam::123456789012:role/Deployer")
        );
        assert_eq!(
            role_from_caller_arn(
                "arn:aws:sts::123456789012:assumed-role/AmazonSageMaker-ExecutionRole-2024/SageMaker"
            )
            .as_deref(),
            Some("arn:aws:iam::123456789012:role/service-role/AmazonSageMaker-ExecutionRole-2024")
        );
        assert_eq!(
            role_from_caller_arn("arn:aws:iam::123456789012:role/Direct").as_deref(),
            Some("arn:aws:iam::123456789012:role/Direct")
        );
    }

    #[test]
    fn test_role_from_user_arn_is_none() {
        assert!(role_from_caller_arn("arn:aws:iam::123456789012:user/alice").is_none());
        assert!(role_from_caller_arn("not-an-arn").is_none());
    }

    #[tokio::test]
    async fn test_configured_role_wins() {
        let identity = FakeIdentity::new(Ok("arn:aws:iam::1:user/u".to_string()), None);
        let arn = resolve_execution_role(&identity, Some("arn:aws:iam::1:role/Mine"), "fallback")
            .await
            .unwrap();
        assert_eq!(arn, "arn:aws:iam::1:role/Mine");
        assert!(identity.looked_up.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_iam_for_user_identity() {
        let identity = FakeIdentity::new(
            Ok("arn:aws:iam::1:user/u".to_string()),
            Some("arn:aws:iam::1:role/sagemaker_execution_role"),
        );
        let arn = resolve_execution_role(&identity, None, DEFAULT_ROLE_NAME)
            .await
            .unwrap();
        assert_eq!(arn, "arn:aws:iam::1:role/sagemaker_execution_role");
        assert_eq!(
            *identity.looked_up.lock().unwrap(),
            vec![DEFAULT_ROLE_NAME.to_string()]
        );
    }

    #[tokio::test]
    async fn test_fallback_failure_surfaces() {
        let identity = FakeIdentity::new(Err(EndpointError::Auth("denied".to_string())), None);
        let err = resolve_execution_role(&identity, None, DEFAULT_ROLE_NAME)
            .await
            .unwrap_err();
        assert!(matches!(err, EndpointError::Role(_)));
    }

    #[tokio::test]
    async fn test_session_requires_region() {
        let identity = FakeIdentity::new(Ok("arn:aws:iam::1:role/r".to_string()), None);
        let config = SessionConfig::new("  ", Credentials::new("a", "b"));
        let err = Session::resolve(config, &identity).await.unwrap_err();
        assert!(matches!(err, EndpointError::Config(_)));
    }
}
