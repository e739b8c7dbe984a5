//! Bounded waits: poll a condition until it holds or the limit passes.

use std::future::Future;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use super::PortalPage;
use crate::error::{Error, Result};

/// A glob over full URLs.
///
/// `**` matches anything, `*` matches anything but `/`, the rest is literal.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    glob: String,
    regex: Regex,
}

impl UrlPattern {
    pub fn new(glob: &str) -> Result<Self> {
        let mut pattern = String::from("^");
        let mut rest = glob;
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix("**") {
                pattern.push_str(".*");
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix('*') {
                pattern.push_str("[^/]*");
                rest = tail;
            } else {
                let end = rest.find('*').unwrap_or(rest.len());
                pattern.push_str(&regex::escape(&rest[..end]));
                rest = &rest[end..];
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)
            .map_err(|e| Error::InvalidInput(format!("invalid URL pattern {glob:?}: {e}")))?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

/// Poll `probe` every `poll` until it returns `true`.
///
/// Probe errors count as "not yet". Fails with
/// [`Error::NavigationTimeout`] once `timeout` has passed.
pub async fn wait_until<F, Fut>(what: &str, timeout: Duration, poll: Duration, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let start = Instant::now();
    loop {
        match probe().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(err) => debug!(error = %err, what, "Probe failed while waiting"),
        }

        if start.elapsed() >= timeout {
            return Err(Error::timeout(what, timeout));
        }
        tokio::time::sleep(poll).await;
    }
}

/// Like [`wait_until`], but a timeout is an answer rather than an error.
pub async fn appears_within<F, Fut>(timeout: Duration, poll: Duration, probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    wait_until("condition", timeout, poll, probe).await.is_ok()
}

/// Wait for the page URL to match `pattern`.
pub async fn wait_for_url<P: PortalPage + ?Sized>(
    page: &P,
    pattern: &UrlPattern,
    timeout: Duration,
    poll: Duration,
) -> Result<()> {
    let what = format!("URL matching {}", pattern.as_str());
    wait_until(&what, timeout, poll, || async move {
        let url = page.current_url().await?;
        Ok::<bool, anyhow::Error>(url.is_some_and(|url| pattern.matches(&url)))
    })
    .await
}
