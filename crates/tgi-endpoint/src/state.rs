//! Deployment state persistence.
//!
//! Separate CLI invocations find the endpoint they operate on through a small
//! JSON file in the state directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{EndpointError, EndpointResult};
use crate::providers::Endpoint;

/// File name inside the state directory.
const STATE_FILE: &str = "deployment.json";

/// Lifecycle of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStep {
    /// Nothing created yet.
    NotDeployed,
    /// Resources created, endpoint not yet in service.
    Deploying,
    /// Endpoint is in service.
    Deployed,
    /// Resources deleted.
    Deleted,
}

impl std::fmt::Display for DeploymentStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotDeployed => write!(f, "not_deployed"),
            Self::Deploying => write!(f, "deploying"),
            Self::Deployed => write!(f, "deployed"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Persisted deployment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Current step.
    pub step: DeploymentStep,
    /// AWS region the resources live in.
    pub region: String,
    /// Image the model was created from.
    pub image_uri: Option<String>,
    /// Endpoint and the resources behind it.
    pub endpoint: Option<Endpoint>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
    /// Directory the state lives in.
    #[serde(skip)]
    dir: PathBuf,
}

impl DeploymentState {
    /// Create an empty state for a region.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, region: impl Into<String>) -> Self {
        Self {
            step: DeploymentStep::NotDeployed,
            region: region.into(),
            image_uri: None,
            endpoint: None,
            updated_at: Utc::now(),
            dir: dir.into(),
        }
    }

    /// Start a new deployment record, refusing to replace a live one.
    ///
    /// A saved state in `deploying` or `deployed` still names resources that
    /// may be running; it is only replaced when `force` is set.
    ///
    /// # Errors
    /// Returns [`EndpointError::ActiveDeployment`] for a live deployment, or an
    /// error if the existing file cannot be read.
    pub fn begin(dir: &Path, region: &str, force: bool) -> EndpointResult<Self> {
        if let Some(existing) = Self::load(dir)? {
            let live = matches!(
                existing.step,
                DeploymentStep::Deploying | DeploymentStep::Deployed
            );
            if live && !force {
                return Err(EndpointError::ActiveDeployment {
                    name: existing
                        .endpoint
                        .map_or_else(|| "<unknown>".to_string(), |e| e.name),
                    step: existing.step.to_string(),
                });
            }
            if live {
                warn!(step = %existing.step, "Replacing state of a live deployment");
            }
        }
        Ok(Self::new(dir, region))
    }

    /// Path of the state file.
    #[must_use]
    pub fn state_file(dir: &Path) -> PathBuf {
        dir.join(STATE_FILE)
    }

    /// Load state, or `None` when nothing was saved yet.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(dir: &Path) -> EndpointResult<Option<Self>> {
        let path = Self::state_file(dir);
        if !path.exists() {
            debug!(path = %path.display(), "No deployment state");
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let mut state: Self = serde_json::from_str(&content)?;
        state.dir = dir.to_path_buf();

        info!(step = %state.step, "Loaded deployment state");
        Ok(Some(state))
    }

    /// Save state.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&mut self) -> EndpointResult<()> {
        self.updated_at = Utc::now();
        std::fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::state_file(&self.dir), content)?;
        Ok(())
    }

    /// Record created resources and save.
    ///
    /// # Errors
    /// Returns an error if saving fails.
    pub fn set_deploying(&mut self, endpoint: Endpoint, image_uri: &str) -> EndpointResult<()> {
        self.step = DeploymentStep::Deploying;
        self.image_uri = Some(image_uri.to_string());
        self.endpoint = Some(endpoint);
        self.save()
    }

    /// Record an in-service endpoint and save.
    ///
    /// # Errors
    /// Returns an error if saving fails.
    pub fn set_deployed(&mut self, endpoint: Endpoint) -> EndpointResult<()> {
        self.step = DeploymentStep::Deployed;
        self.endpoint = Some(endpoint);
        self.save()
    }

    /// Mark resources as deleted and save.
    ///
    /// # Errors
    /// Returns an error if saving fails.
    pub fn set_deleted(&mut self) -> EndpointResult<()> {
        self.step = DeploymentStep::Deleted;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::EndpointStatus;

    fn endpoint() -> Endpoint {
        Endpoint {
            name: "tgi-2024".to_string(),
            config_name: "tgi-2024".to_string(),
            model_name: "tgi-2024".to_string(),
            arn: None,
            status: EndpointStatus::Creating,
            failure_reason: None,
            created_at: None,
        }
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DeploymentState::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("nested");

        let mut state = DeploymentState::new(&state_dir, "us-east-1");
        state.set_deploying(endpoint(), "image:tag").unwrap();

        let loaded = DeploymentState::load(&state_dir).unwrap().unwrap();
        assert_eq!(loaded.step, DeploymentStep::Deploying);
        assert_eq!(loaded.region, "us-east-1");
        assert_eq!(loaded.image_uri.as_deref(), Some("image:tag"));
        assert_eq!(loaded.endpoint.unwrap().name, "tgi-2024");
    }

    #[test]
    fn test_step_transitions_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = DeploymentState::new(dir.path(), "us-east-1");

        let mut ready = endpoint();
        ready.status = EndpointStatus::InService;
        state.set_deployed(ready).unwrap();
        state.set_deleted().unwrap();

        let loaded = DeploymentState::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.step, DeploymentStep::Deleted);
        assert_eq!(loaded.endpoint.unwrap().status, EndpointStatus::InService);

        let raw = std::fs::read_to_string(DeploymentState::state_file(dir.path())).unwrap();
        assert!(raw.contains("\"step\": \"deleted\""));
    }

    #[test]
    fn test_begin_refuses_live_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = DeploymentState::begin(dir.path(), "us-east-1", false).unwrap();
        let mut ready = endpoint();
        ready.status = EndpointStatus::InService;
        state.set_deployed(ready).unwrap();

        let err = DeploymentState::begin(dir.path(), "us-east-1", false).unwrap_err();
        assert!(matches!(
            err,
            EndpointError::ActiveDeployment { ref name, ref step }
                if name == "tgi-2024" && step == "deployed"
        ));

        // The live record is left untouched.
        let saved = DeploymentState::load(dir.path()).unwrap().unwrap();
        assert_eq!(saved.step, DeploymentStep::Deployed);
        assert_eq!(saved.endpoint.unwrap().name, "tgi-2024");
    }

    #[test]
    fn test_begin_refuses_half_created_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = DeploymentState::new(dir.path(), "us-east-1");
        state.set_deploying(endpoint(), "image:tag").unwrap();

        assert!(matches!(
            DeploymentState::begin(dir.path(), "us-east-1", false),
            Err(EndpointError::ActiveDeployment { .. })
        ));
        let forced = DeploymentState::begin(dir.path(), "eu-west-1", true).unwrap();
        assert_eq!(forced.step, DeploymentStep::NotDeployed);
        assert_eq!(forced.region, "eu-west-1");
    }

    #[test]
    fn test_begin_after_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = DeploymentState::new(dir.path(), "us-east-1");
        state.set_deploying(endpoint(), "image:tag").unwrap();
        state.set_deleted().unwrap();

        let next = DeploymentState::begin(dir.path(), "us-east-1", false).unwrap();
        assert_eq!(next.step, DeploymentStep::NotDeployed);
        assert!(next.endpoint.is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(DeploymentState::state_file(dir.path()), "{not json").unwrap();
        assert!(DeploymentState::load(dir.path()).is_err());
    }
}
