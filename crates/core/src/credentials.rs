use crate::error::CredentialError;
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info};

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Loads `.env` (or `env_file`) and exports `OPENAI_API_KEY` into the process
/// environment. Absence of the key is reported, never fatal.
pub fn setup_openai_api_key(env_file: Option<&Path>) -> Result<ApiKey, CredentialError> {
    load_credential(OPENAI_API_KEY_VAR, env_file)
}

pub fn load_credential(var: &str, env_file: Option<&Path>) -> Result<ApiKey, CredentialError> {
    load_env_file(env_file)?;

    let value = std::env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    match value {
        Some(value) => {
            std::env::set_var(var, &value);
            info!("{var} set successfully.");
            Ok(ApiKey(value))
        }
        None => {
            error!("Error: {var} environment variable is not set.");
            Err(CredentialError::Missing {
                var: var.to_string(),
            })
        }
    }
}

fn load_env_file(env_file: Option<&Path>) -> Result<(), CredentialError> {
    let loaded = match env_file {
        Some(path) => dotenvy::from_path(path).map(|_| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match loaded {
        Ok(path) => {
            debug!(path = %path.display(), "loaded env file");
            Ok(())
        }
        Err(error) if error.not_found() => Ok(()),
        Err(error) => Err(CredentialError::EnvFile(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_credential_leaves_environment_untouched() {
        let var = "DOC_RAG_TEST_MISSING_KEY";
        std::env::remove_var(var);

        let dir = tempdir().expect("tempdir");
        let env_file = dir.path().join(".env");
        fs::write(&env_file, "UNRELATED=1\n").expect("write env file");

        let result = load_credential(var, Some(&env_file));
        assert!(matches!(result, Err(CredentialError::Missing { .. })));
        assert!(std::env::var(var).is_err());
    }

    #[test]
    fn credential_from_env_file_is_exported() {
        let var = "DOC_RAG_TEST_FILE_KEY";
        std::env::remove_var(var);

        let dir = tempdir().expect("tempdir");
        let env_file = dir.path().join(".env");
        fs::write(&env_file, format!("{var}=sk-from-file\n")).expect("write env file");

        let key = load_credential(var, Some(&env_file)).expect("key should load");
        assert_eq!(key.expose(), "sk-from-file");
        assert_eq!(std::env::var(var).as_deref(), Ok("sk-from-file"));
    }

    #[test]
    fn process_environment_wins_over_env_file() {
        let var = "DOC_RAG_TEST_PROCESS_KEY";
        std::env::set_var(var, "sk-process");

        let dir = tempdir().expect("tempdir");
        let env_file = dir.path().join(".env");
        fs::write(&env_file, format!("{var}=sk-file\n")).expect("write env file");

        let key = load_credential(var, Some(&env_file)).expect("key should load");
        assert_eq!(key.expose(), "sk-process");
        assert_eq!(std::env::var(var).as_deref(), Ok("sk-process"));
    }

    #[test]
    fn absent_env_file_is_not_an_error() {
        let var = "DOC_RAG_TEST_NO_FILE_KEY";
        std::env::set_var(var, "sk-set");

        let dir = tempdir().expect("tempdir");
        let key = load_credential(var, Some(&dir.path().join("missing.env")))
            .expect("missing env file should be ignored");
        assert_eq!(key.expose(), "sk-set");
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey("sk-secret".to_string());
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
    }
}
