//! Serving image resolution.

use serde::{Deserialize, Serialize};

/// Registry account hosting the Hugging Face deep learning containers.
pub const DEFAULT_REGISTRY_ACCOUNT: &str = "763104351884";

/// TGI serving image repository.
pub const DEFAULT_REPOSITORY: &str = "huggingface-pytorch-tgi-inference";

/// TGI 2.0 image tag.
pub const DEFAULT_TAG: &str = "2.1-tgi2.0-gpu-py310-cu121-ubuntu22.04";

/// Where the serving image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Registry account ID.
    pub account: String,
    /// Repository name.
    pub repository: String,
    /// Image tag.
    pub tag: String,
    /// Fully qualified URI; bypasses the template when set.
    pub uri: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            account: DEFAULT_REGISTRY_ACCOUNT.to_string(),
            repository: DEFAULT_REPOSITORY.to_string(),
            tag: DEFAULT_TAG.to_string(),
            uri: None,
        }
    }
}

impl ImageConfig {
    /// Image URI for a region.
    ///
    /// The image is not checked for existence.
    pub fn resolve(&self, region: &str) -> String {
        if let Some(uri) = self.uri.as_deref().filter(|u| !u.trim().is_empty()) {
            return uri.trim().to_string();
        }
        format!(
            "{}.dkr.ecr.{region}.amazonaws.com/{}:{}",
            self.account, self.repository, self.tag
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_us_east_1() {
        assert_eq!(
            ImageConfig::default().resolve("us-east-1"),
            "763104351884.dkr.ecr.us-east-1.amazonaws.com/huggingface-pytorch-tgi-inference:2.1-tgi2.0-gpu-py310-cu121-ubuntu22.04"
        );
    }

    #[test]
    fn test_resolve_interpolates_region_and_tag() {
        let image = ImageConfig {
            tag: "2.0-tgi1.4-gpu".to_string(),
            ..ImageConfig::default()
        };
        assert_eq!(
            image.resolve("eu-central-1"),
            "763104351884.dkr.ecr.eu-central-1.amazonaws.com/huggingface-pytorch-tgi-inference:2.0-tgi1.4-gpu"
        );
    }

    #[test]
    fn test_explicit_uri_wins() {
        let image = ImageConfig {
            uri: Some("123.dkr.ecr.us-west-2.amazonaws.com/custom:latest".to_string()),
            ..ImageConfig::default()
        };
        assert_eq!(
            image.resolve("us-east-1"),
            "123.dkr.ecr.us-west-2.amazonaws.com/custom:latest"
        );
    }
}
