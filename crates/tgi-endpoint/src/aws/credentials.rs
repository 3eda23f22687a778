//! AWS credentials.

use std::fmt;

use crate::errors::{EndpointError, EndpointResult};

/// Static AWS credentials used to sign requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// AWS access key ID.
    pub access_key_id: String,
    /// AWS secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl Credentials {
    /// Create credentials from an access key pair.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Build credentials from optional parts, as collected from flags or env vars.
    ///
    /// Blank values count as missing. An empty session token is dropped.
    ///
    /// # Errors
    /// Returns [`EndpointError::Credentials`] when the key ID or secret is missing.
    pub fn from_parts(
        access_key_id: Option<&str>,
        secret_access_key: Option<&str>,
        session_token: Option<&str>,
    ) -> EndpointResult<Self> {
        fn non_blank(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|s| !s.is_empty())
        }

        let access_key_id = non_blank(access_key_id).ok_or_else(|| {
            EndpointError::Credentials(
                "access key ID not set (use --access-key-id or AWS_ACCESS_KEY_ID)".to_string(),
            )
        })?;
        let secret_access_key = non_blank(secret_access_key).ok_or_else(|| {
            EndpointError::Credentials(
                "secret access key not set (use --secret-access-key or AWS_SECRET_ACCESS_KEY)"
                    .to_string(),
            )
        })?;

        let mut creds = Self::new(access_key_id, secret_access_key);
        if let Some(token) = non_blank(session_token) {
            creds = creds.with_session_token(token);
        }
        Ok(creds)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}
