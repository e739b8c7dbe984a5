//! In-memory stand-in for the MF Central web UI.
//!
//! [`ScriptedPortal`] walks the same pages as the real site (sign-in,
//! security question, home with notice dialogs, portfolio) and records what
//! the automation did to them. It lets the scraping flow and both entry
//! points run without Chrome.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{DomTarget, PageLauncher, PortalPage, PAN_INPUT, SECRET_INPUT};
use crate::session::{OriginState, SessionState, StorageEntry, StorageStateSource, StoredCookie};

const SCRIPTED_PORTFOLIO_HTML: &str = r#"<html><body>
<div class="db-portfolio-bottom">
  <div class="db-portfolio-info">
    <div><h6>Invested Value</h6><p>₹1,00,000.00</p></div>
    <div><h6>Market Value</h6><p>₹1,10,000.00</p></div>
    <div><h6>Gain/Loss (Absolute)</h6><p>₹10,000.00 <span>+10%</span></p></div>
  </div>
</div>
</body></html>"#;

/// How the scripted portal behaves.
#[derive(Debug, Clone)]
pub struct PortalScript {
    pub origin: String,
    /// Show the bot-check frame on the sign-in page.
    pub captcha: bool,
    /// The security question rendered on the questionnaire page.
    pub question: String,
    /// Never leave the sign-in page after submit.
    pub stall_after_signin: bool,
    /// Hide `#submit-id` on the questionnaire page.
    pub questionnaire_submit_hidden: bool,
    /// Dialogs with the styled "Ok" button.
    pub styled_dialogs: usize,
    /// Dialogs with a plain button wrapping an "Ok" span.
    pub plain_dialogs: usize,
    /// Label of the dialog buttons as found in the DOM.
    pub dialog_label: String,
    /// Visibility checks each page answers "not yet" to before its elements
    /// render.
    pub render_delay: usize,
    pub portfolio_html: String,
    /// Simulate a person logging in by hand: after this many URL checks on the
    /// sign-in page the browser lands on the portal home.
    pub manual_login_after: Option<usize>,
}

impl Default for PortalScript {
    fn default() -> Self {
        Self {
            origin: "https://app.mfcentral.com".to_string(),
            captcha: true,
            question: "What is your favourite colour?".to_string(),
            stall_after_signin: false,
            questionnaire_submit_hidden: false,
            styled_dialogs: 1,
            plain_dialogs: 0,
            dialog_label: "Ok".to_string(),
            render_delay: 0,
            portfolio_html: SCRIPTED_PORTFOLIO_HTML.to_string(),
            manual_login_after: None,
        }
    }
}

impl PortalScript {
    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = question.into();
        self
    }

    pub fn with_portfolio_html(mut self, html: impl Into<String>) -> Self {
        self.portfolio_html = html.into();
        self
    }

    fn questionnaire_url(&self) -> String {
        format!("{}/investor/signin-questionnaire", self.origin)
    }

    fn home_url(&self) -> String {
        format!("{}/portal/home", self.origin)
    }
}

/// Everything the automation did to the scripted portal.
#[derive(Debug, Clone, Default)]
pub struct PortalRecord {
    pub launches: usize,
    pub visited: Vec<String>,
    /// Values typed on the sign-in page, by selector.
    pub fills: HashMap<String, String>,
    /// Value typed on the security question page.
    pub answer: Option<String>,
    pub clicks: Vec<DomTarget>,
    pub captcha_ticked: bool,
    pub dialogs_dismissed: usize,
    pub screenshots: Vec<PathBuf>,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Blank,
    SignIn,
    Questionnaire,
    Home,
    Portfolio,
}

#[derive(Debug)]
struct PortalState {
    stage: Stage,
    url: Option<String>,
    styled_left: usize,
    plain_left: usize,
    url_checks: usize,
    /// Visibility checks since the current page was entered.
    render_checks: usize,
    record: PortalRecord,
}

impl PortalState {
    fn enter(&mut self, stage: Stage, url: String) {
        self.stage = stage;
        self.url = Some(url);
        self.render_checks = 0;
    }

    fn new(script: &PortalScript) -> Self {
        Self {
            stage: Stage::Blank,
            url: None,
            styled_left: script.styled_dialogs,
            plain_left: script.plain_dialogs,
            url_checks: 0,
            render_checks: 0,
            record: PortalRecord::default(),
        }
    }
}

/// Launcher for scripted pages. Clones share state and the record.
#[derive(Debug, Clone)]
pub struct ScriptedPortal {
    script: Arc<PortalScript>,
    state: Arc<Mutex<PortalState>>,
}

impl ScriptedPortal {
    pub fn new(script: PortalScript) -> Self {
        let state = PortalState::new(&script);
        Self {
            script: Arc::new(script),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn record(&self) -> PortalRecord {
        lock(&self.state).record.clone()
    }
}

#[async_trait]
impl PageLauncher for ScriptedPortal {
    type Page = ScriptedPage;

    async fn launch(&self) -> Result<ScriptedPage> {
        let mut state = lock(&self.state);
        state.enter(Stage::Blank, "about:blank".to_string());
        state.styled_left = self.script.styled_dialogs;
        state.plain_left = self.script.plain_dialogs;
        state.url_checks = 0;
        state.record.launches += 1;
        state.record.closed = false;
        Ok(ScriptedPage {
            script: self.script.clone(),
            state: self.state.clone(),
        })
    }
}

/// A page of the scripted portal.
#[derive(Debug)]
pub struct ScriptedPage {
    script: Arc<PortalScript>,
    state: Arc<Mutex<PortalState>>,
}

fn lock(state: &Mutex<PortalState>) -> MutexGuard<'_, PortalState> {
    state.lock().expect("scripted portal lock poisoned")
}

impl ScriptedPage {
    fn visible(&self, state: &PortalState, target: &DomTarget) -> bool {
        if state.render_checks < self.script.render_delay {
            return false;
        }
        let dialog_label = || target.text.matches(&self.script.dialog_label);

        if *target == DomTarget::css(PAN_INPUT) {
            state.stage == Stage::SignIn
        } else if *target == DomTarget::css(SECRET_INPUT) {
            matches!(state.stage, Stage::SignIn | Stage::Questionnaire)
        } else if *target == DomTarget::submit() {
            match state.stage {
                Stage::SignIn => true,
                Stage::Questionnaire => !self.script.questionnaire_submit_hidden,
                _ => false,
            }
        } else if *target == DomTarget::submit_fallback() {
            state.stage == Stage::Questionnaire
        } else if *target == DomTarget::dialog_ok() {
            state.stage == Stage::Home && state.styled_left > 0 && dialog_label()
        } else if *target == DomTarget::dialog_ok_span() {
            state.stage == Stage::Home
                && state.styled_left == 0
                && state.plain_left > 0
                && dialog_label()
        } else if *target == DomTarget::portfolio_nav() {
            matches!(state.stage, Stage::Home | Stage::Portfolio)
        } else {
            false
        }
    }

    fn submit(&self, state: &mut PortalState) {
        match state.stage {
            Stage::SignIn if !self.script.stall_after_signin => {
                state.enter(Stage::Questionnaire, self.script.questionnaire_url());
            }
            Stage::Questionnaire if state.record.answer.is_some() => {
                state.enter(Stage::Home, self.script.home_url());
            }
            _ => {}
        }
    }
}

#[async_trait]
impl PortalPage for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.record.visited.push(url.to_string());
        state.enter(Stage::SignIn, url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>> {
        let mut state = lock(&self.state);
        state.url_checks += 1;
        if let Some(after) = self.script.manual_login_after {
            if state.stage == Stage::SignIn && state.url_checks >= after {
                state.enter(Stage::Home, self.script.home_url());
            }
        }
        Ok(state.url.clone())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if state.render_checks < self.script.render_delay {
            return Err(anyhow!("no input matches {selector}"));
        }
        match state.stage {
            Stage::SignIn => {
                state
                    .record
                    .fills
                    .insert(selector.to_string(), value.to_string());
                Ok(())
            }
            Stage::Questionnaire if selector == SECRET_INPUT => {
                state.record.answer = Some(value.to_string());
                Ok(())
            }
            _ => Err(anyhow!("no input matches {selector}")),
        }
    }

    async fn is_visible(&self, target: &DomTarget) -> Result<bool> {
        let mut state = lock(&self.state);
        state.render_checks += 1;
        Ok(self.visible(&state, target))
    }

    async fn click(&self, target: &DomTarget) -> Result<()> {
        let mut state = lock(&self.state);
        if !self.visible(&state, target) {
            return Err(anyhow!("no visible element matches {}", target.selector));
        }
        state.record.clicks.push(target.clone());

        if *target == DomTarget::portfolio_nav() {
            let url = state.url.clone().unwrap_or_default();
            state.enter(Stage::Portfolio, url);
        } else if *target == DomTarget::submit() || *target == DomTarget::submit_fallback() {
            self.submit(&mut state);
        }
        Ok(())
    }

    async fn dom_click(&self, target: &DomTarget) -> Result<bool> {
        let mut state = lock(&self.state);
        if !self.visible(&state, target) {
            return Ok(false);
        }
        if *target == DomTarget::dialog_ok() {
            state.styled_left -= 1;
        } else if *target == DomTarget::dialog_ok_span() {
            state.plain_left -= 1;
        }
        state.record.dialogs_dismissed += 1;
        Ok(true)
    }

    async fn click_frame_checkbox(&self, _frame_selector: &str) -> Result<bool> {
        let mut state = lock(&self.state);
        if self.script.captcha && state.stage == Stage::SignIn {
            state.record.captcha_ticked = true;
            return Ok(true);
        }
        Ok(false)
    }

    async fn visible_text(&self) -> Result<String> {
        let state = lock(&self.state);
        let text = match state.stage {
            Stage::Blank => String::new(),
            Stage::SignIn => "Sign In\nPAN / PEKRN\nPassword".to_string(),
            Stage::Questionnaire => {
                format!("Security Question\n{}\nAnswer\nSubmit", self.script.question)
            }
            Stage::Home => "Welcome\nPortfolio\nTransact".to_string(),
            Stage::Portfolio => "Portfolio".to_string(),
        };
        Ok(text)
    }

    async fn content(&self) -> Result<String> {
        let state = lock(&self.state);
        if state.stage == Stage::Portfolio {
            Ok(self.script.portfolio_html.clone())
        } else {
            Ok("<html><body></body></html>".to_string())
        }
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        lock(&self.state).record.screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.state).record.closed = true;
        Ok(())
    }
}

#[async_trait]
impl StorageStateSource for ScriptedPage {
    async fn storage_state(&self) -> Result<SessionState> {
        let state = lock(&self.state);
        if !matches!(state.stage, Stage::Home | Stage::Portfolio) {
            return Ok(SessionState::default());
        }
        let domain = self
            .script
            .origin
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string();
        Ok(SessionState {
            cookies: vec![StoredCookie {
                name: "SESSION".to_string(),
                value: "scripted-session".to_string(),
                domain,
                path: "/".to_string(),
                expires: -1.0,
                http_only: true,
                secure: true,
                same_site: Some("Lax".to_string()),
            }],
            origins: vec![OriginState {
                origin: self.script.origin.clone(),
                local_storage: vec![StorageEntry {
                    name: "authToken".to_string(),
                    value: "scripted-token".to_string(),
                }],
            }],
        })
    }
}
