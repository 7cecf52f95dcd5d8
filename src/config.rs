use anyhow::{Context, Result};
use log::warn;

const DEFAULT_GEMINI_KEY_PATH: &str = "/flights/gemini_key";

/// An API key or other secret that must never end up in logs.
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[derive(Debug)]
pub struct Config {
    pub table_name: String,
    pub topic_arn: String,
    pub rapidapi_key: SecretString,
    pub gemini_api_key: Option<SecretString>,
}

impl Config {
    /// Reads table/topic names from the environment and resolves API keys
    /// through Parameter Store. A missing Gemini key disables smart filtering
    /// instead of failing the invocation.
    pub async fn from_env(ssm: &aws_sdk_ssm::Client) -> Result<Self> {
        let table_name = std::env::var("SEARCH_TABLE").context("SEARCH_TABLE env var not set")?;
        let topic_arn = std::env::var("SNS_TOPIC_ARN").context("SNS_TOPIC_ARN env var not set")?;

        let rapidapi_key_path =
            std::env::var("RAPIDAPI_KEY_PATH").context("RAPIDAPI_KEY_PATH env var not set")?;
        let rapidapi_key = ssm_parameter(ssm, &rapidapi_key_path).await?;

        let gemini_key_path = std::env::var("GEMINI_KEY_PATH")
            .unwrap_or_else(|_| DEFAULT_GEMINI_KEY_PATH.to_owned());
        let gemini_api_key = match ssm_parameter(ssm, &gemini_key_path).await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Smart filtering disabled, could not read {gemini_key_path}: {e:#}");
                None
            }
        };

        Ok(Self {
            table_name,
            topic_arn,
            rapidapi_key,
            gemini_api_key,
        })
    }
}

async fn ssm_parameter(client: &aws_sdk_ssm::Client, name: &str) -> Result<SecretString> {
    let output = client
        .get_parameter()
        .name(name)
        .with_decryption(true)
        .send()
        .await
        .with_context(|| format!("failed to fetch SSM parameter {name}"))?;

    let value = output
        .parameter
        .and_then(|p| p.value)
        .with_context(|| format!("SSM parameter {name} has no value"))?;

    Ok(SecretString::new(value))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_secret_string_display_redacted() {
        let secret = SecretString::new("rapid-api-key-123".to_owned());
        assert_eq!(secret.to_string(), "[REDACTED]");
    }

    #[test]
    fn test_secret_string_debug_redacted() {
        let secret = SecretString::new("rapid-api-key-123".to_owned());
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
    }

    #[test]
    fn test_secret_string_expose() {
        let secret = SecretString::new("rapid-api-key-123".to_owned());
        assert_eq!(secret.expose(), "rapid-api-key-123");
    }
}
