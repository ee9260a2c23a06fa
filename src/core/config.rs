use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::time::Duration;

/// Default lifetime of a signature, in seconds
pub const DEFAULT_EXPIRY_WINDOW_SECS: u64 = 60;

/// API credentials shared by the signer, the REST gateway and both stream channels
#[derive(Debug, Clone)]
pub struct Credentials {
    api_key: String,
    secret: Secret<String>,
    expiry_window: Duration,
}

// Never expose the secret in serialization
impl Serialize for Credentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Credentials", 3)?;
        state.serialize_field("api_key", &self.api_key)?;
        state.serialize_field("secret", "[REDACTED]")?;
        state.serialize_field("expiry_window_secs", &self.expiry_window.as_secs())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CredentialsHelper {
            api_key: String,
            secret: String,
            #[serde(default = "default_expiry_window_secs")]
            expiry_window_secs: u64,
        }

        let helper = CredentialsHelper::deserialize(deserializer)?;
        Ok(Self {
            api_key: helper.api_key,
            secret: Secret::new(helper.secret),
            expiry_window: Duration::from_secs(helper.expiry_window_secs),
        })
    }
}

const fn default_expiry_window_secs() -> u64 {
    DEFAULT_EXPIRY_WINDOW_SECS
}

impl Credentials {
    #[must_use]
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: Secret::new(secret.into()),
            expiry_window: Duration::from_secs(DEFAULT_EXPIRY_WINDOW_SECS),
        }
    }

    /// Set how long a signature stays valid after it is produced
    #[must_use]
    pub const fn with_expiry_window(mut self, expiry_window: Duration) -> Self {
        self.expiry_window = expiry_window;
        self
    }

    /// Create credentials from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY`
    /// - `{PREFIX}_API_SECRET`
    /// - `{PREFIX}_API_EXPIRES` (optional, seconds, defaults to 60)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_var = format!("{}_API_SECRET", prefix);
        let expires_var = format!("{}_API_EXPIRES", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;
        let secret =
            env::var(&secret_var).map_err(|_| ConfigError::MissingEnvironmentVariable(secret_var))?;

        let expiry_window_secs = match env::var(&expires_var) {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidConfiguration(format!("{} is not a number: {}", expires_var, e))
            })?,
            Err(_) => DEFAULT_EXPIRY_WINDOW_SECS,
        };

        if api_key.is_empty() || secret.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "API key and secret must not be empty".to_string(),
            ));
        }

        Ok(Self::new(api_key, secret).with_expiry_window(Duration::from_secs(expiry_window_secs)))
    }

    /// Create credentials from a `.env` file and the environment
    ///
    /// A missing file is not an error; the process environment is used as is.
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        load_env_file(env_file_path)?;
        Self::from_env(prefix)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Secret bytes used to key the HMAC (use carefully - exposes secret)
    pub fn secret_bytes(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }

    pub const fn expiry_window(&self) -> Duration {
        self.expiry_window
    }
}

/// Load a `.env` file into the process environment, ignoring a missing file
#[cfg(feature = "env-file")]
pub fn load_env_file(env_file_path: &str) -> Result<(), ConfigError> {
    match dotenv::from_path(env_file_path) {
        Ok(()) => Ok(()),
        Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConfigError::InvalidConfiguration(format!(
            "Failed to load .env file '{}': {}",
            env_file_path, e
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_redacts_secret() {
        let credentials = Credentials::new("key", "very-secret");
        let text = serde_json::to_string(&credentials).unwrap();
        assert!(text.contains("[REDACTED]"));
        assert!(!text.contains("very-secret"));
    }

    #[test]
    fn test_deserialize_defaults_expiry() {
        let credentials: Credentials =
            serde_json::from_str(r#"{"api_key":"k","secret":"s"}"#).unwrap();
        assert_eq!(credentials.api_key(), "k");
        assert_eq!(credentials.secret_bytes(), b"s");
        assert_eq!(
            credentials.expiry_window(),
            Duration::from_secs(DEFAULT_EXPIRY_WINDOW_SECS)
        );
    }

    #[test]
    fn test_from_env_missing_key() {
        let result = Credentials::from_env("SPIRALX_TEST_DOES_NOT_EXIST");
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvironmentVariable(var)) if var == "SPIRALX_TEST_DOES_NOT_EXIST_API_KEY"
        ));
    }

    #[test]
    fn test_from_env_reads_expiry() {
        env::set_var("SPIRALX_CFG_TEST_API_KEY", "key");
        env::set_var("SPIRALX_CFG_TEST_API_SECRET", "secret");
        env::set_var("SPIRALX_CFG_TEST_API_EXPIRES", "86400");

        let credentials = Credentials::from_env("spiralx_cfg_test").unwrap();
        assert_eq!(credentials.api_key(), "key");
        assert_eq!(credentials.expiry_window(), Duration::from_secs(86_400));
    }
}
