use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::duration::deserialize_duration;

/// Portal addresses and the URL globs that mark each login stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub signin_url: String,

    /// Reached after submitting PAN and password.
    pub questionnaire_url: String,

    /// Reached after answering the security question.
    pub home_url: String,

    /// Any authenticated route. Used to detect a finished manual login.
    pub authenticated_url: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            signin_url: "https://app.mfcentral.com/investor/signin".to_string(),
            questionnaire_url: "**/signin-questionnaire".to_string(),
            home_url: "**/portal/home".to_string(),
            authenticated_url: "**/portal/**".to_string(),
        }
    }
}

/// Fixed delays and wait bounds for the scraping flow.
///
/// The defaults are tuned to the portal's observed latency; every bounded
/// wait fails the run once its limit passes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// How long an input or button may take to render before filling or
    /// clicking it fails.
    #[serde(deserialize_with = "deserialize_duration")]
    pub action_timeout: Duration,

    /// Pause after ticking the bot-check box.
    #[serde(deserialize_with = "deserialize_duration")]
    pub captcha_settle: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub questionnaire_timeout: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub home_timeout: Duration,

    /// Pause before looking for post-login dialogs.
    #[serde(deserialize_with = "deserialize_duration")]
    pub popup_appear_delay: Duration,

    pub popup_rounds: usize,

    #[serde(deserialize_with = "deserialize_duration")]
    pub popup_primary_timeout: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub popup_fallback_timeout: Duration,

    /// Pause after each dismissed dialog.
    #[serde(deserialize_with = "deserialize_duration")]
    pub popup_pause: Duration,

    /// Pause for dialog fade-out before navigating.
    #[serde(deserialize_with = "deserialize_duration")]
    pub overlay_settle: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub portfolio_settle: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub container_timeout: Duration,

    /// How often bounded waits re-check their condition.
    #[serde(deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(30),
            captcha_settle: Duration::from_secs(2),
            questionnaire_timeout: Duration::from_secs(10),
            home_timeout: Duration::from_secs(30),
            popup_appear_delay: Duration::from_secs(10),
            popup_rounds: 5,
            popup_primary_timeout: Duration::from_secs(2),
            popup_fallback_timeout: Duration::from_secs(1),
            popup_pause: Duration::from_secs(2),
            overlay_settle: Duration::from_secs(5),
            portfolio_settle: Duration::from_secs(3),
            container_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl Timings {
    /// No fixed pauses and short bounds. For driving the scripted portal.
    pub fn instant() -> Self {
        Self {
            action_timeout: Duration::from_millis(200),
            captcha_settle: Duration::ZERO,
            questionnaire_timeout: Duration::from_millis(200),
            home_timeout: Duration::from_millis(200),
            popup_appear_delay: Duration::ZERO,
            popup_rounds: 5,
            popup_primary_timeout: Duration::from_millis(20),
            popup_fallback_timeout: Duration::from_millis(20),
            popup_pause: Duration::ZERO,
            overlay_settle: Duration::ZERO,
            portfolio_settle: Duration::ZERO,
            container_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
        }
    }
}

/// Browser launch settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,

    /// Explicit Chrome/Chromium binary. Searched for when unset.
    pub chrome_executable: Option<PathBuf>,

    /// Written when a scrape fails after the browser started.
    pub screenshot_path: PathBuf,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_executable: None,
            screenshot_path: PathBuf::from("error-final.png"),
        }
    }
}

/// Spreadsheet settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetsSettings {
    /// Service account key file, relative to the working directory.
    pub service_account_path: PathBuf,

    /// Tab used when none is named and it exists.
    pub preferred_tab: String,

    /// Tab used when the document has no tabs to choose from.
    pub fallback_tab: String,

    pub api_base_url: String,
}

impl Default for SheetsSettings {
    fn default() -> Self {
        Self {
            service_account_path: PathBuf::from("service-account.json"),
            preferred_tab: "Mutual Funds".to_string(),
            fallback_tab: "Sheet1".to_string(),
            api_base_url: "https://sheets.googleapis.com".to_string(),
        }
    }
}

/// Manual session capture settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub output_path: PathBuf,

    /// How long to wait for the operator to finish logging in.
    #[serde(deserialize_with = "deserialize_duration")]
    pub login_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("session.json"),
            login_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub portal: PortalConfig,
    pub timings: Timings,
    pub browser: BrowserSettings,
    pub sheets: SheetsSettings,
    pub session: SessionSettings,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
