use std::path::PathBuf;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, error, info, warn};

use super::extract::{has_element, select_answer, snapshot_from_html};
use super::wait::{appears_within, wait_for_url, wait_until, UrlPattern};
use super::{
    DomTarget, PageLauncher, PortalPage, PAN_INPUT, PORTFOLIO_CONTAINER, RECAPTCHA_FRAME,
    SECRET_INPUT,
};
use crate::config::{PortalConfig, Timings};
use crate::error::{Error, Result};
use crate::models::{Credentials, PortfolioSnapshot};
use crate::pipeline::PortfolioSource;

/// Logs into the portal and reads the portfolio summary.
///
/// Each call launches its own page, walks sign-in → security question →
/// dialogs → portfolio once, and closes the page whatever happens. There
/// are no retries: the first failed step ends the run.
pub struct PortalScraper<L> {
    launcher: L,
    signin_url: String,
    questionnaire: UrlPattern,
    home: UrlPattern,
    timings: Timings,
    screenshot_path: PathBuf,
}

impl<L: PageLauncher> PortalScraper<L> {
    pub fn new(launcher: L, portal: &PortalConfig, timings: Timings) -> Result<Self> {
        Ok(Self {
            launcher,
            signin_url: portal.signin_url.clone(),
            questionnaire: UrlPattern::new(&portal.questionnaire_url)?,
            home: UrlPattern::new(&portal.home_url)?,
            timings,
            screenshot_path: PathBuf::from("error-final.png"),
        })
    }

    /// Where to write the diagnostic screenshot on failure.
    pub fn with_screenshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot_path = path.into();
        self
    }

    pub async fn scrape(&self, credentials: &Credentials) -> Result<PortfolioSnapshot> {
        let mut page = self.launcher.launch().await?;

        let result = self.drive(&page, credentials).await;

        if let Err(err) = &result {
            error!(error = %err, "Portal scrape failed");
            match page.screenshot(&self.screenshot_path).await {
                Ok(()) => info!(path = %self.screenshot_path.display(), "Saved failure screenshot"),
                Err(shot_err) => warn!(error = %shot_err, "Could not save failure screenshot"),
            }
        }

        if let Err(err) = page.close().await {
            warn!(error = %err, "Failed to close browser");
        }

        result
    }

    async fn drive(&self, page: &L::Page, credentials: &Credentials) -> Result<PortfolioSnapshot> {
        self.sign_in(page, credentials).await?;
        self.answer_security_question(page, credentials).await?;
        self.dismiss_dialogs(page).await;
        self.open_portfolio(page).await?;
        self.read_portfolio(page).await
    }

    async fn sign_in(&self, page: &L::Page, credentials: &Credentials) -> Result<()> {
        info!(url = %self.signin_url, "Navigating to sign-in page");
        page.goto(&self.signin_url).await?;

        info!("Entering credentials");
        self.fill(page, PAN_INPUT, &credentials.pan).await?;
        self.fill(page, SECRET_INPUT, credentials.password.expose_secret())
            .await?;

        // Best effort: a challenge that needs more than a tick is not handled.
        match page.click_frame_checkbox(RECAPTCHA_FRAME).await {
            Ok(true) => {
                info!("Ticked bot-check checkbox");
                tokio::time::sleep(self.timings.captcha_settle).await;
            }
            Ok(false) => debug!("No bot-check widget visible"),
            Err(err) => warn!(error = %err, "Bot-check interaction failed; continuing"),
        }

        self.click(page, &DomTarget::submit()).await?;

        info!("Waiting for security question page");
        wait_for_url(
            page,
            &self.questionnaire,
            self.timings.questionnaire_timeout,
            self.timings.poll_interval,
        )
        .await
    }

    async fn answer_security_question(
        &self,
        page: &L::Page,
        credentials: &Credentials,
    ) -> Result<()> {
        let text = page.visible_text().await?;
        let (question, answer) = select_answer(&credentials.security_answers, &text)
            .ok_or(Error::UnmatchedSecurityQuestion)?;
        info!(question, "Found security question");
        self.fill(page, SECRET_INPUT, answer).await?;

        let submit = DomTarget::submit();
        if page.is_visible(&submit).await? {
            self.click(page, &submit).await?;
        } else {
            self.click(page, &DomTarget::submit_fallback()).await?;
        }

        info!("Waiting for portal home");
        wait_for_url(
            page,
            &self.home,
            self.timings.home_timeout,
            self.timings.poll_interval,
        )
        .await
    }

    /// Close the notice dialogs shown after login, up to `popup_rounds`.
    async fn dismiss_dialogs(&self, page: &L::Page) {
        tokio::time::sleep(self.timings.popup_appear_delay).await;

        for round in 1..=self.timings.popup_rounds {
            match self.dismiss_one(page).await {
                Ok(true) => {
                    info!(round, "Dismissed dialog");
                    tokio::time::sleep(self.timings.popup_pause).await;
                }
                Ok(false) => break,
                Err(err) => {
                    warn!(round, error = %err, "Dialog check failed");
                    break;
                }
            }
        }

        tokio::time::sleep(self.timings.overlay_settle).await;
    }

    async fn dismiss_one(&self, page: &L::Page) -> anyhow::Result<bool> {
        let candidates = [
            (DomTarget::dialog_ok(), self.timings.popup_primary_timeout),
            (DomTarget::dialog_ok_span(), self.timings.popup_fallback_timeout),
        ];
        for (target, timeout) in &candidates {
            let visible = appears_within(*timeout, self.timings.poll_interval, || async move {
                page.is_visible(target).await
            })
            .await;
            // The styled button ignores synthetic mouse events, so click through the DOM.
            if visible && page.dom_click(target).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn open_portfolio(&self, page: &L::Page) -> Result<()> {
        info!("Opening portfolio");
        self.click(page, &DomTarget::portfolio_nav()).await?;
        tokio::time::sleep(self.timings.portfolio_settle).await;
        Ok(())
    }

    /// Wait for `target` to render, bounded by `action_timeout`.
    async fn actionable(&self, page: &L::Page, target: &DomTarget) -> Result<()> {
        wait_until(
            &target.selector,
            self.timings.action_timeout,
            self.timings.poll_interval,
            || async move { page.is_visible(target).await },
        )
        .await
    }

    async fn fill(&self, page: &L::Page, selector: &str, value: &str) -> Result<()> {
        self.actionable(page, &DomTarget::css(selector)).await?;
        page.fill(selector, value).await?;
        Ok(())
    }

    async fn click(&self, page: &L::Page, target: &DomTarget) -> Result<()> {
        self.actionable(page, target).await?;
        page.click(target).await?;
        Ok(())
    }

    async fn read_portfolio(&self, page: &L::Page) -> Result<PortfolioSnapshot> {
        info!("Waiting for portfolio values");
        let loaded = wait_until(
            PORTFOLIO_CONTAINER,
            self.timings.container_timeout,
            self.timings.poll_interval,
            || async move {
                let html = page.content().await?;
                Ok::<bool, anyhow::Error>(has_element(&html, PORTFOLIO_CONTAINER)?)
            },
        )
        .await;
        if let Err(err) = loaded {
            return Err(Error::Extraction(format!(
                "selector {PORTFOLIO_CONTAINER} or inner elements not found ({err})"
            )));
        }

        let html = page.content().await?;
        snapshot_from_html(&html)
    }
}

#[async_trait]
impl<L: PageLauncher> PortfolioSource for PortalScraper<L> {
    async fn fetch(&self, credentials: &Credentials) -> Result<PortfolioSnapshot> {
        self.scrape(credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SecurityAnswers;
    use crate::portal::{PortalScript, ScriptedPortal};

    fn scraper(portal: &ScriptedPortal) -> PortalScraper<ScriptedPortal> {
        PortalScraper::new(portal.clone(), &PortalConfig::default(), Timings::instant())
            .unwrap()
            .with_screenshot_path("failure.png")
    }

    fn credentials() -> Credentials {
        Credentials::new(
            "ABCDE1234F",
            "s3cret",
            SecurityAnswers::new()
                .with("Q1", "A1")
                .with("Q2", "A2"),
        )
    }

    #[tokio::test]
    async fn happy_path_reads_snapshot_and_closes() {
        let portal = ScriptedPortal::new(PortalScript::default().with_question("Q2"));
        let snapshot = scraper(&portal).scrape(&credentials()).await.unwrap();

        assert_eq!(snapshot.invested_value, "100000.00");
        assert_eq!(snapshot.market_value, "110000.00");
        assert_eq!(snapshot.gain_loss, "10000.00");
        assert_eq!(snapshot.gain_loss_percentage, "10");

        let record = portal.record();
        assert_eq!(record.fills.get(PAN_INPUT).map(String::as_str), Some("ABCDE1234F"));
        assert_eq!(record.answer.as_deref(), Some("A2"));
        assert!(record.closed);
        assert!(record.screenshots.is_empty());
    }

    #[tokio::test]
    async fn unmatched_question_fails_with_screenshot() {
        let portal = ScriptedPortal::new(PortalScript::default().with_question("Q9"));
        let err = scraper(&portal).scrape(&credentials()).await.unwrap_err();

        assert!(matches!(err, Error::UnmatchedSecurityQuestion));
        let record = portal.record();
        assert_eq!(record.screenshots, vec![PathBuf::from("failure.png")]);
        assert!(record.closed);
    }

    #[tokio::test]
    async fn stalled_sign_in_times_out() {
        let mut script = PortalScript::default();
        script.stall_after_signin = true;
        let portal = ScriptedPortal::new(script);
        let err = scraper(&portal).scrape(&credentials()).await.unwrap_err();

        assert!(matches!(err, Error::NavigationTimeout { .. }), "{err:?}");
        assert!(portal.record().closed);
        assert_eq!(portal.record().screenshots.len(), 1);
    }

    #[tokio::test]
    async fn missing_captcha_is_tolerated() {
        let mut script = PortalScript::default().with_question("Q1");
        script.captcha = false;
        let portal = ScriptedPortal::new(script);
        scraper(&portal).scrape(&credentials()).await.unwrap();
        assert!(!portal.record().captcha_ticked);
    }

    #[tokio::test]
    async fn captcha_is_ticked_when_present() {
        let portal = ScriptedPortal::new(PortalScript::default().with_question("Q1"));
        scraper(&portal).scrape(&credentials()).await.unwrap();
        assert!(portal.record().captcha_ticked);
    }

    #[tokio::test]
    async fn dismisses_both_dialog_shapes() {
        let mut script = PortalScript::default().with_question("Q1");
        script.styled_dialogs = 2;
        script.plain_dialogs = 1;
        let portal = ScriptedPortal::new(script);
        scraper(&portal).scrape(&credentials()).await.unwrap();
        assert_eq!(portal.record().dialogs_dismissed, 3);
    }

    #[tokio::test]
    async fn dialog_rounds_are_capped() {
        let mut script = PortalScript::default().with_question("Q1");
        script.styled_dialogs = 9;
        let portal = ScriptedPortal::new(script);
        scraper(&portal).scrape(&credentials()).await.unwrap();
        assert_eq!(portal.record().dialogs_dismissed, 5);
    }

    #[tokio::test]
    async fn missing_container_is_an_extraction_error() {
        let mut script = PortalScript::default().with_question("Q1");
        script.portfolio_html = "<html><body><p>Loading…</p></body></html>".to_string();
        let portal = ScriptedPortal::new(script);
        let err = scraper(&portal).scrape(&credentials()).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)), "{err:?}");
        assert!(portal.record().closed);
    }

    #[tokio::test]
    async fn uppercase_dialog_labels_are_dismissed() {
        let mut script = PortalScript::default().with_question("Q1");
        script.dialog_label = "OK".to_string();
        script.plain_dialogs = 1;
        let portal = ScriptedPortal::new(script);
        scraper(&portal).scrape(&credentials()).await.unwrap();
        assert_eq!(portal.record().dialogs_dismissed, 2);
    }

    #[tokio::test]
    async fn waits_for_late_rendering_elements() {
        let mut script = PortalScript::default().with_question("Q1");
        script.render_delay = 3;
        let portal = ScriptedPortal::new(script);
        let snapshot = scraper(&portal).scrape(&credentials()).await.unwrap();

        assert_eq!(snapshot.market_value, "110000.00");
        let record = portal.record();
        assert_eq!(record.fills.get(PAN_INPUT).map(String::as_str), Some("ABCDE1234F"));
        assert_eq!(record.answer.as_deref(), Some("A1"));
        assert!(record.clicks.contains(&DomTarget::portfolio_nav()));
    }

    #[tokio::test]
    async fn element_that_never_renders_times_out() {
        let mut script = PortalScript::default().with_question("Q1");
        script.render_delay = usize::MAX;
        let portal = ScriptedPortal::new(script);
        let err = scraper(&portal).scrape(&credentials()).await.unwrap_err();

        assert!(matches!(err, Error::NavigationTimeout { .. }), "{err:?}");
        let record = portal.record();
        assert!(record.fills.is_empty());
        assert!(record.closed);
    }

    #[tokio::test]
    async fn hidden_submit_uses_fallback_button() {
        let mut script = PortalScript::default().with_question("Q1");
        script.questionnaire_submit_hidden = true;
        let portal = ScriptedPortal::new(script);
        scraper(&portal).scrape(&credentials()).await.unwrap();
        assert!(portal
            .record()
            .clicks
            .contains(&DomTarget::submit_fallback()));
    }
}
