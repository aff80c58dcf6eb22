use tufe_core::{secrets::CredentialProvider, Result};

pub const DEFAULT_PREFIX: &str = "TUFE_CREDENTIAL_";

/// Reads source credentials from `<prefix><SOURCE_ID>` environment variables.
///
/// The id is upper-cased and every character that is not ASCII alphanumeric
/// becomes `_`, so `tcmb_evds` resolves `TUFE_CREDENTIAL_TCMB_EVDS`.
#[derive(Clone, Debug)]
pub struct EnvCredentialProvider {
    prefix: String,
}

impl EnvCredentialProvider {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn variable_for(&self, source_id: &str) -> String {
        let suffix: String = source_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn get_active_credential(&self, source_id: &str) -> Result<Option<String>> {
        Ok(std::env::var(self.variable_for(source_id))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_name_is_normalized() {
        let provider = EnvCredentialProvider::new();
        assert_eq!(
            provider.variable_for("tcmb_evds"),
            "TUFE_CREDENTIAL_TCMB_EVDS"
        );
        assert_eq!(
            provider.variable_for("json-mirror.2"),
            "TUFE_CREDENTIAL_JSON_MIRROR_2"
        );
    }

    #[test]
    fn reads_non_empty_values_only() {
        let provider = EnvCredentialProvider::with_prefix("TUFE_TEST_SECRET_");
        std::env::set_var("TUFE_TEST_SECRET_EVDS", " key-123 ");
        std::env::set_var("TUFE_TEST_SECRET_BLANK", "   ");

        assert_eq!(
            provider.get_active_credential("evds").unwrap(),
            Some("key-123".to_string())
        );
        assert_eq!(provider.get_active_credential("blank").unwrap(), None);
        assert_eq!(provider.get_active_credential("absent").unwrap(), None);
    }
}
