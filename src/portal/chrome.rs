//! Chrome-backed [`PortalPage`] using chromiumoxide.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::layout::Point;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{DomTarget, PageLauncher, PortalPage, TextMatch};
use crate::config::BrowserSettings;
use crate::session::{OriginState, SessionState, StorageEntry, StorageStateSource, StoredCookie};

// Checkbox position inside the reCAPTCHA anchor frame.
const CHECKBOX_OFFSET: (f64, f64) = (27.0, 39.0);

/// Launches a fresh Chrome with a blank page per run.
///
/// Every launch gets its own throwaway profile, so no cookies or storage
/// carry over between runs and concurrent launches never share a browser.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    settings: BrowserSettings,
}

impl ChromeLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    /// Same browser, but with a visible window regardless of config.
    pub fn headed(mut self) -> Self {
        self.settings.headless = false;
        self
    }

    fn executable(&self) -> Result<PathBuf> {
        if let Some(path) = &self.settings.chrome_executable {
            return Ok(path.clone());
        }
        find_chrome()
            .map(PathBuf::from)
            .context("Chrome/Chromium not found. Install it or set browser.chrome_executable.")
    }
}

#[async_trait]
impl PageLauncher for ChromeLauncher {
    type Page = ChromePage;

    async fn launch(&self) -> Result<ChromePage> {
        let profile = fresh_profile()?;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(self.executable()?)
            .user_data_dir(profile.path())
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !self.settings.headless {
            builder = builder.with_head().viewport(None);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                handler_task.abort();
                return Err(err).context("Failed to open page");
            }
        };
        debug!(
            headless = self.settings.headless,
            profile = %profile.path().display(),
            "Browser launched"
        );

        Ok(ChromePage {
            browser,
            page,
            handler_task,
            profile: Some(profile),
        })
    }
}

/// A page in a browser owned by one run.
pub struct ChromePage {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    profile: Option<TempDir>,
}

/// Empty Chrome profile directory, removed when dropped.
fn fresh_profile() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("mf-snapshot-profile-")
        .tempdir()
        .context("Failed to create browser profile directory")
}

impl ChromePage {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self.page.evaluate(script).await?;
        result
            .into_value::<T>()
            .context("Unexpected script result")
    }

    /// Center of the first visible match, scrolled into view.
    async fn locate(&self, target: &DomTarget) -> Result<Option<Point>> {
        let body = "el.scrollIntoView({ block: 'center' }); \
                    const r = el.getBoundingClientRect(); \
                    return [r.x + r.width / 2, r.y + r.height / 2];";
        let center: Vec<f64> = self.eval(target_script(target, body, "[]")).await?;
        Ok(match center.as_slice() {
            [x, y] => Some(Point::new(*x, *y)),
            _ => None,
        })
    }
}

/// Wrap `body` in a script that binds `el` to the first visible match of
/// `target`. The script yields `missing` when nothing matches.
fn target_script(target: &DomTarget, body: &str, missing: &str) -> String {
    let (mode, needles): (&str, Vec<&str>) = match &target.text {
        TextMatch::Any => ("any", Vec::new()),
        TextMatch::Exact(s) => ("exact", vec![s.as_str()]),
        TextMatch::ContainsAnyIgnoreCase(options) => {
            ("icontains", options.iter().map(String::as_str).collect())
        }
    };
    let selector = serde_json::to_string(&target.selector).unwrap_or_default();
    let needles = serde_json::to_string(&needles).unwrap_or_default();

    format!(
        r#"(() => {{
  const mode = "{mode}";
  const needles = {needles};
  const textOk = (t) => {{
    if (mode === "exact") return t.trim() === needles[0];
    if (mode === "icontains") return needles.some((n) => t.toLowerCase().includes(n.toLowerCase()));
    return true;
  }};
  const shown = (e) => {{
    const r = e.getBoundingClientRect();
    const s = getComputedStyle(e);
    return r.width > 0 && r.height > 0 && s.visibility !== "hidden" && s.display !== "none";
  }};
  for (const m of document.querySelectorAll({selector})) {{
    if (!textOk(m.textContent || "")) continue;
    const el = {parent};
    if (!el || !shown(el)) continue;
    {body}
  }}
  return {missing};
}})()"#,
        parent = if target.use_parent { "m.parentElement" } else { "m" },
    )
}

#[async_trait]
impl PortalPage for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to open {url}"))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("No input matches {selector}"))?;
        element.click().await?;
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await?;
        element.type_str(value).await?;
        Ok(())
    }

    async fn is_visible(&self, target: &DomTarget) -> Result<bool> {
        self.eval(target_script(target, "return true;", "false"))
            .await
    }

    async fn click(&self, target: &DomTarget) -> Result<()> {
        let point = self
            .locate(target)
            .await?
            .ok_or_else(|| anyhow!("No visible element matches {}", target.selector))?;
        self.page.click(point).await?;
        Ok(())
    }

    async fn dom_click(&self, target: &DomTarget) -> Result<bool> {
        self.eval(target_script(target, "el.click(); return true;", "false"))
            .await
    }

    async fn click_frame_checkbox(&self, frame_selector: &str) -> Result<bool> {
        let Some(frame) = self.locate(&DomTarget::css(frame_selector)).await? else {
            return Ok(false);
        };
        // `locate` yields the centre; the anchor frame is 304x78.
        let point = Point::new(
            frame.x - 152.0 + CHECKBOX_OFFSET.0,
            frame.y - 39.0 + CHECKBOX_OFFSET.1,
        );
        self.page.click(point).await?;
        Ok(true)
    }

    async fn visible_text(&self) -> Result<String> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .with_context(|| format!("Failed to save screenshot to {}", path.display()))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        if let Some(profile) = self.profile.take() {
            if let Err(err) = profile.close() {
                debug!(error = %err, "Failed to remove browser profile");
            }
        }
        closed.context("Failed to close browser")?;
        Ok(())
    }
}

#[async_trait]
impl StorageStateSource for ChromePage {
    async fn storage_state(&self) -> Result<SessionState> {
        let cookies = self
            .page
            .get_cookies()
            .await?
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: c.expires,
                http_only: c.http_only,
                secure: c.secure,
                same_site: c.same_site.map(|s| s.as_ref().to_string()),
            })
            .collect();

        let origin: String = self.eval("location.origin".to_string()).await?;
        let entries: Vec<(String, String)> = self
            .eval("Object.entries(window.localStorage)".to_string())
            .await?;

        Ok(SessionState {
            cookies,
            origins: vec![OriginState {
                origin,
                local_storage: entries
                    .into_iter()
                    .map(|(name, value)| StorageEntry { name, value })
                    .collect(),
            }],
        })
    }
}

/// Find Chrome/Chromium executable.
fn find_chrome() -> Option<String> {
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .into_iter()
        .find(|candidate| Path::new(candidate).exists())
        .map(str::to_string)
}
