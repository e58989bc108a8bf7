//! Credential references and output redaction

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// Errors resolving a credential
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("environment variable '{0}' is not set or empty")]
    MissingEnv(String),

    #[error("failed to read secret file '{path}': {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encrypted value cannot be decrypted locally; expose it through an environment variable and use `{{ env: NAME }}`")]
    Encrypted,
}

/// Where a credential comes from
///
/// ```yaml
/// token: { env: GITHUB_TOKEN }
/// password: { file: /run/secrets/pypi }
/// password: { secure: "gAAAA..." }
/// username: __token__
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecretRef {
    Env { env: String },
    File { file: String },
    Secure { secure: String },
    Plain(String),
}

impl SecretRef {
    /// Resolve against an explicit environment map
    pub fn resolve_with(&self, env: &HashMap<String, String>) -> Result<String, SecretError> {
        match self {
            SecretRef::Env { env: name } => env
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| SecretError::MissingEnv(name.clone())),
            SecretRef::File { file } => std::fs::read_to_string(file)
                .map(|s| s.trim_end_matches(['\n', '\r']).to_string())
                .map_err(|source| SecretError::File {
                    path: file.clone(),
                    source,
                }),
            SecretRef::Secure { .. } => Err(SecretError::Encrypted),
            SecretRef::Plain(value) => Ok(value.clone()),
        }
    }

    /// Plain values are fine for usernames but not for tokens
    pub fn warn_if_plain(&self, field: &str) {
        if matches!(self, SecretRef::Plain(_)) {
            warn!("'{}' is stored in plain text in the pipeline file", field);
        }
    }

    /// Safe description for dry runs and logs
    pub fn describe(&self) -> String {
        match self {
            SecretRef::Env { env } => format!("${}", env),
            SecretRef::File { file } => format!("file:{}", file),
            SecretRef::Secure { .. } => "[secure]".to_string(),
            SecretRef::Plain(_) => "[plain]".to_string(),
        }
    }
}

const MASK: &str = "[secure]";

/// Shorter values would mask unrelated text
const MIN_MASKED_LEN: usize = 4;

/// Replaces resolved secret values in command output
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value to be masked
    ///
    /// Returns `false` when the value is too short to mask; such a value
    /// can still show up in output, so a warning is logged.
    pub fn add(&mut self, secret: &str) -> bool {
        if secret.len() < MIN_MASKED_LEN {
            warn!(
                "a credential of {} character(s) is too short to be masked in output; use a value of at least {}",
                secret.chars().count(),
                MIN_MASKED_LEN
            );
            return false;
        }
        if !self.secrets.iter().any(|s| s == secret) {
            self.secrets.push(secret.to_string());
            // longest first so overlapping secrets are fully masked
            self.secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        }
        true
    }

    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret, MASK))
    }
}
