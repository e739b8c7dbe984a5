//! Access tokens for the Sheets API.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Supplies a bearer token for each request batch.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<SecretString>;
}

/// Tokens minted from a Google service account key file.
///
/// The key is read on every call, so replacing the file takes effect on the
/// next append without a restart.
#[derive(Debug, Clone)]
pub struct ServiceAccountTokens {
    key_path: PathBuf,
}

impl ServiceAccountTokens {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
        }
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<SecretString> {
        let key = yup_oauth2::read_service_account_key(&self.key_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read service account key: {}",
                    self.key_path.display()
                )
            })?;

        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .context("Failed to build service account authenticator")?;

        let token = auth
            .token(&[SPREADSHEETS_SCOPE])
            .await
            .context("Failed to obtain access token")?;

        let token = token
            .token()
            .ok_or_else(|| anyhow!("Token response did not include an access token"))?;
        Ok(SecretString::from(token.to_string()))
    }
}

/// A fixed token. Useful against mock servers.
#[derive(Debug)]
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<SecretString> {
        Ok(SecretString::from(self.0.expose_secret().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_key_file_names_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("service-account.json");
        let err = ServiceAccountTokens::new(&path)
            .access_token()
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("service-account.json"));
    }

    #[tokio::test]
    async fn static_token_is_returned_as_is() {
        let token = StaticToken::new("abc").access_token().await.unwrap();
        assert_eq!(token.expose_secret(), "abc");
    }
}
