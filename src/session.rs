//! Capturing an authenticated browser session after a manual login.
//!
//! The operator signs in by hand in a visible browser; once the page reaches
//! an authenticated route, cookies and local storage are written to a JSON
//! file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{PortalConfig, SessionSettings, Timings};
use crate::error::{Error, Result};
use crate::portal::wait::{wait_for_url, UrlPattern};
use crate::portal::{PageLauncher, PortalPage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix seconds; `-1` for session cookies.
    pub expires: f64,
    pub http_only: bool,
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    pub local_storage: Vec<StorageEntry>,
}

/// Cookies plus per-origin local storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: Vec<StoredCookie>,
    pub origins: Vec<OriginState>,
}

impl SessionState {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::InvalidInput(format!("invalid session file {}: {e}", path.display()))
        })
    }
}

/// Pages that can export their storage state.
#[async_trait]
pub trait StorageStateSource: PortalPage {
    async fn storage_state(&self) -> anyhow::Result<SessionState>;
}

/// Opens the sign-in page and waits for someone to finish logging in.
pub struct SessionCapturer<L> {
    launcher: L,
    signin_url: String,
    authenticated: UrlPattern,
    login_timeout: Duration,
    poll_interval: Duration,
}

impl<L> SessionCapturer<L>
where
    L: PageLauncher,
    L::Page: StorageStateSource,
{
    pub fn new(
        launcher: L,
        portal: &PortalConfig,
        session: &SessionSettings,
        timings: &Timings,
    ) -> Result<Self> {
        Ok(Self {
            launcher,
            signin_url: portal.signin_url.clone(),
            authenticated: UrlPattern::new(&portal.authenticated_url)?,
            login_timeout: session.login_timeout,
            poll_interval: timings.poll_interval,
        })
    }

    /// Wait for a manual login, then write the session to `output`.
    ///
    /// The browser is closed on every path.
    pub async fn capture(&self, output: &Path) -> Result<PathBuf> {
        let mut page = self.launcher.launch().await?;
        let result = self.capture_on(&page, output).await;
        if let Err(err) = page.close().await {
            warn!(error = %err, "Failed to close browser");
        }
        result
    }

    async fn capture_on(&self, page: &L::Page, output: &Path) -> Result<PathBuf> {
        page.goto(&self.signin_url).await?;
        info!(
            timeout_secs = self.login_timeout.as_secs(),
            "Log in manually in the browser window"
        );

        wait_for_url(
            page,
            &self.authenticated,
            self.login_timeout,
            self.poll_interval,
        )
        .await?;

        let state = page.storage_state().await?;
        state.save(output)?;
        info!(
            path = %output.display(),
            cookies = state.cookies.len(),
            "Session state saved"
        );
        Ok(output.to_path_buf())
    }
}
