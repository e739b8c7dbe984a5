//! MF Central portal automation.
//!
//! The login flow in [`PortalScraper`] only talks to the browser through
//! [`PortalPage`], so it can run against Chrome ([`chrome`]) or against the
//! in-memory [`ScriptedPortal`].

#[cfg(feature = "browser")]
pub mod chrome;
pub mod extract;
mod flow;
pub mod scripted;
pub mod wait;

pub use flow::PortalScraper;
pub use scripted::{PortalScript, ScriptedPage, ScriptedPortal};
pub use wait::UrlPattern;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

/// PAN / PEKRN field on the sign-in page.
pub const PAN_INPUT: &str = "#textinput";

/// Password field on the sign-in page; the questionnaire reuses it for answers.
pub const SECRET_INPUT: &str = "#outlined-adornment-password";

pub const SUBMIT_BUTTON: &str = "#submit-id";

pub const RECAPTCHA_FRAME: &str = r#"iframe[title="reCAPTCHA"]"#;

pub const PORTFOLIO_CONTAINER: &str = ".db-portfolio-bottom";

/// How an element's text must look for a [`DomTarget`] to match it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    Any,
    /// Trimmed text equals this exactly.
    Exact(String),
    /// Text contains any of these, ignoring case.
    ContainsAnyIgnoreCase(Vec<String>),
}

impl TextMatch {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(wanted) => text.trim() == wanted,
            Self::ContainsAnyIgnoreCase(options) => {
                let text = text.to_lowercase();
                options.iter().any(|o| text.contains(&o.to_lowercase()))
            }
        }
    }
}

/// An element located by CSS selector and, optionally, its text.
///
/// The first match in document order wins. With `use_parent`, actions apply
/// to the matched element's parent (e.g. a button wrapping a labelled span).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomTarget {
    pub selector: String,
    pub text: TextMatch,
    pub use_parent: bool,
}

impl DomTarget {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            text: TextMatch::Any,
            use_parent: false,
        }
    }

    pub fn with_text(mut self, text: TextMatch) -> Self {
        self.text = text;
        self
    }

    pub fn parent(mut self) -> Self {
        self.use_parent = true;
        self
    }

    pub fn submit() -> Self {
        Self::css(SUBMIT_BUTTON)
    }

    /// Any button labelled like a submit action.
    pub fn submit_fallback() -> Self {
        Self::css("button").with_text(TextMatch::ContainsAnyIgnoreCase(vec![
            "submit".to_string(),
            "sign in".to_string(),
        ]))
    }

    /// Styled "Ok" button on post-login dialogs. Any casing matches.
    pub fn dialog_ok() -> Self {
        Self::css("button.customBtn").with_text(ok_label())
    }

    /// Plain button whose "Ok" label sits in a span.
    pub fn dialog_ok_span() -> Self {
        Self::css("button span").with_text(ok_label()).parent()
    }

    /// The "Portfolio" entry in the portal navigation.
    pub fn portfolio_nav() -> Self {
        Self::css("*").with_text(TextMatch::Exact("Portfolio".to_string()))
    }
}

fn ok_label() -> TextMatch {
    TextMatch::ContainsAnyIgnoreCase(vec!["ok".to_string()])
}

/// The browser operations the portal flow needs.
#[async_trait]
pub trait PortalPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<Option<String>>;

    /// Replace the value of the input matching `selector` by typing `value`.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn is_visible(&self, target: &DomTarget) -> Result<bool>;

    /// Click with simulated mouse input. Fails when nothing matches.
    async fn click(&self, target: &DomTarget) -> Result<()>;

    /// Call `click()` on the element directly, bypassing input simulation.
    /// Returns whether a visible match was clicked.
    async fn dom_click(&self, target: &DomTarget) -> Result<bool>;

    /// Tick the checkbox inside the embedded frame if the frame is visible.
    async fn click_frame_checkbox(&self, frame_selector: &str) -> Result<bool>;

    /// Rendered (visible) text of the page body.
    async fn visible_text(&self) -> Result<String>;

    /// Current page HTML.
    async fn content(&self) -> Result<String>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Shut the page and its browser down.
    async fn close(&mut self) -> Result<()>;
}

/// Opens a fresh, independent page for each run.
#[async_trait]
pub trait PageLauncher: Send + Sync {
    type Page: PortalPage;

    async fn launch(&self) -> Result<Self::Page>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_text_ignores_surrounding_whitespace_only() {
        let m = TextMatch::Exact("Portfolio".to_string());
        assert!(m.matches("  Portfolio\n"));
        assert!(!m.matches("Portfolio Summary"));
        assert!(!m.matches("portfolio"));
    }

    #[test]
    fn submit_fallback_matches_either_label() {
        let target = DomTarget::submit_fallback();
        assert!(target.text.matches("SUBMIT"));
        assert!(target.text.matches("Sign In Now"));
        assert!(!target.text.matches("Cancel"));
    }

    #[test]
    fn dialog_labels_match_in_any_case() {
        for label in ["Ok", "OK", "ok", " OK "] {
            assert!(DomTarget::dialog_ok().text.matches(label), "{label}");
            assert!(DomTarget::dialog_ok_span().text.matches(label), "{label}");
        }
        assert!(!DomTarget::dialog_ok().text.matches("Cancel"));
    }

    #[test]
    fn dialog_ok_span_acts_on_parent() {
        assert!(DomTarget::dialog_ok_span().use_parent);
        assert!(!DomTarget::dialog_ok().use_parent);
    }
}
