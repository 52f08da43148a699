//! Bearer credentials
//!
//! The upload coordinator never reads credentials from ambient state: the
//! caller resolves a [`BearerToken`] once and passes it in explicitly.
//!
//! # Sources
//!
//! - `TokenSource::Static` - Token from configuration or a CLI flag
//! - `TokenSource::Environment` - Token from a named environment variable
//!
//! # Example
//!
//! ```
//! use kata_uploadr::backend::{BearerToken, TokenSource};
//!
//! let token = TokenSource::Static("session-token".to_string()).resolve().unwrap();
//! assert_eq!(token.expose(), "session-token");
//!
//! // Debug output never leaks the secret
//! assert_eq!(format!("{:?}", token), "BearerToken(***)");
//! ```

use crate::config::AuthConfig;
use std::fmt;
use thiserror::Error;

/// Default environment variable holding the bearer token
pub const TOKEN_ENV_VAR: &str = "KATA_UPLOAD_TOKEN";

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Bearer credential issued by the auth provider
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Create a token, rejecting empty values and embedded whitespace
    pub fn new(token: impl Into<String>) -> Result<Self, CredentialsError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(CredentialsError::InvalidCredentials(
                "bearer token is empty".into(),
            ));
        }
        if token.chars().any(char::is_whitespace) {
            return Err(CredentialsError::InvalidCredentials(
                "bearer token contains whitespace".into(),
            ));
        }
        Ok(Self(token))
    }

    /// Raw token value for the Authorization header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Where to obtain the bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Static(String),
    Environment(String),
}

impl TokenSource {
    /// Pick the source for a run.
    ///
    /// An explicit CLI value wins, then `auth.token` from configuration,
    /// then the [`TOKEN_ENV_VAR`] environment variable.
    pub fn select(cli_token: Option<&str>, auth: &AuthConfig) -> Self {
        if let Some(token) = cli_token {
            return TokenSource::Static(token.to_string());
        }
        match auth.token.as_deref() {
            // An unexpanded `${VAR}` placeholder means the variable was not set
            Some(token) if !token.trim().is_empty() && !token.starts_with("${") => {
                TokenSource::Static(token.to_string())
            }
            _ => TokenSource::Environment(TOKEN_ENV_VAR.to_string()),
        }
    }

    /// Resolve the token
    pub fn resolve(&self) -> Result<BearerToken, CredentialsError> {
        match self {
            TokenSource::Static(token) => BearerToken::new(token.clone()),
            TokenSource::Environment(var) => {
                let token = std::env::var(var).map_err(|_| {
                    CredentialsError::MissingCredentials(format!("{} not set", var))
                })?;
                BearerToken::new(token)
            }
        }
    }
}
