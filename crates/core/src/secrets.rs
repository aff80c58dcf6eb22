//! Credential lookup.

use crate::errors::Result;

/// Resolves the secret a source authenticates with.
///
/// `Ok(None)` means no credential is configured, which the orchestrator treats
/// as "skip this source" for sources that require one.
pub trait CredentialProvider: Send + Sync {
    fn get_active_credential(&self, source_id: &str) -> Result<Option<String>>;
}

/// Provider with no credentials at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn get_active_credential(&self, _source_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
