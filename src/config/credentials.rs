//! Credential resolution: `env:VARNAME` references in config, and
//! `SYGRA_<MODELNAME>_*` environment variable fallbacks (spec §6
//! "Environment variables").
//!
//! Grounded in `BaseCustomModel.__init__`'s `auth_token`/`url` handling and
//! `_set_chat_template`'s `SYGRA_<NAME>_CHAT_TEMPLATE` lookup in the original
//! Python source.

use crate::error::{PipelineError, Result};

const ENV_PREFIX: &str = "env:";

/// Resolve one config-supplied string value. A value of the form
/// `env:VARNAME` is replaced with the named environment variable's content;
/// anything else is returned as a literal. Missing environment variables
/// are a configuration error, not a silent empty string.
pub fn resolve_credential(raw: &str) -> Result<String> {
    match raw.strip_prefix(ENV_PREFIX) {
        Some(var_name) => std::env::var(var_name).map_err(|_| {
            PipelineError::InvalidConfig(format!(
                "credential references environment variable '{var_name}' which is not set"
            ))
        }),
        None => Ok(raw.to_string()),
    }
}

/// Look up `SYGRA_<MODEL_NAME>_<SUFFIX>` (model name upper-cased, not
/// required to exist). Used as a fallback when a model config omits
/// `url`/`auth_token`/`chat_template` outright.
pub fn env_override(model_name: &str, suffix: &str) -> Option<String> {
    let key = format!("SYGRA_{}_{}", model_name.to_uppercase(), suffix);
    std::env::var(key).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_value_passes_through() {
        assert_eq!(resolve_credential("sk-literal-token").unwrap(), "sk-literal-token");
    }

    #[test]
    fn test_env_reference_resolves() {
        std::env::set_var("SYGRA_TEST_CRED_VAR", "resolved-value");
        assert_eq!(resolve_credential("env:SYGRA_TEST_CRED_VAR").unwrap(), "resolved-value");
        std::env::remove_var("SYGRA_TEST_CRED_VAR");
    }

    #[test]
    fn test_env_reference_missing_is_invalid_config() {
        let err = resolve_credential("env:SYGRA_DOES_NOT_EXIST_VAR").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_env_override_lookup() {
        std::env::set_var("SYGRA_MYMODEL_URL", "http://override");
        assert_eq!(env_override("mymodel", "URL").as_deref(), Some("http://override"));
        std::env::remove_var("SYGRA_MYMODEL_URL");
        assert_eq!(env_override("mymodel", "URL"), None);
    }
}
