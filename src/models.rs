//! The records that flow through a snapshot run.

use secrecy::SecretString;
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Login details for the portal.
#[derive(Debug)]
pub struct Credentials {
    /// PAN or PEKRN, used as the portal username.
    pub pan: String,
    pub password: SecretString,
    pub security_answers: SecurityAnswers,
}

impl Credentials {
    pub fn new(
        pan: impl Into<String>,
        password: impl Into<String>,
        security_answers: SecurityAnswers,
    ) -> Self {
        Self {
            pan: pan.into(),
            password: SecretString::from(password.into()),
            security_answers,
        }
    }
}

/// Security question → answer pairs, kept in the order they were written.
///
/// The portal shows one question per login; the first entry whose question
/// text is on screen wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityAnswers(Vec<(String, String)>);

impl SecurityAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        self.0.push((question.into(), answer.into()));
        self
    }

    /// Parse a JSON object of question → answer strings.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| {
            Error::InvalidInput(format!("security questions must be a JSON object of strings: {e}"))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(q, a)| (q.as_str(), a.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for SecurityAnswers {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // serde_json's map keeps insertion order (preserve_order feature).
        let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut pairs = Vec::with_capacity(map.len());
        for (question, answer) in map {
            match answer {
                serde_json::Value::String(answer) => pairs.push((question, answer)),
                other => {
                    return Err(de::Error::custom(format!(
                        "answer for {question:?} must be a string, got {other}"
                    )))
                }
            }
        }
        Ok(Self(pairs))
    }
}

/// Portfolio summary scraped from the portal, values already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub invested_value: String,
    pub market_value: String,
    pub gain_loss: String,
    pub gain_loss_percentage: String,
}

impl PortfolioSnapshot {
    /// Build a snapshot from display strings such as `"₹16,69,587.70"`.
    pub fn from_display(
        invested_value: &str,
        market_value: &str,
        gain_loss: &str,
        gain_loss_percentage: &str,
    ) -> Self {
        Self {
            invested_value: normalize_amount(invested_value),
            market_value: normalize_amount(market_value),
            gain_loss: normalize_amount(gain_loss),
            gain_loss_percentage: normalize_amount(gain_loss_percentage),
        }
    }
}

/// Where a snapshot row should be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub spreadsheet_id: String,
    tab: Option<String>,
}

impl SheetTarget {
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            tab: None,
        }
    }

    /// Target a named tab. Blank names fall back to automatic resolution.
    pub fn with_tab(mut self, tab: Option<impl Into<String>>) -> Self {
        self.tab = tab
            .map(Into::into)
            .filter(|name: &String| !name.trim().is_empty());
        self
    }

    pub fn tab(&self) -> Option<&str> {
        self.tab.as_deref()
    }
}

/// Strip everything but digits, `.` and `-` from a display amount.
///
/// Returns `"0"` when nothing numeric is left, so the result is never empty
/// and normalizing twice changes nothing.
pub fn normalize_amount(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "0".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn normalize_strips_currency_and_grouping() {
        assert_eq!(normalize_amount("₹16,69,587.70"), "1669587.70");
        assert_eq!(normalize_amount(" ₹ 1,00,000.00 "), "100000.00");
        assert_eq!(normalize_amount("-₹2,500.10"), "-2500.10");
        assert_eq!(normalize_amount("+ 45.86 %"), "45.86");
    }

    #[test]
    fn normalize_empty_and_non_numeric_is_zero() {
        assert_eq!(normalize_amount(""), "0");
        assert_eq!(normalize_amount("   "), "0");
        assert_eq!(normalize_amount("N/A"), "0");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["₹16,69,587.70", "", "abc", "-1.2.3", "₹7,65,671.44  + 45.86 %", "0"] {
            let once = normalize_amount(input);
            assert_eq!(normalize_amount(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn security_answers_keep_json_order() {
        let answers =
            SecurityAnswers::from_json(r#"{"Zebra question": "z", "Alpha question": "a"}"#)
                .unwrap();
        let questions: Vec<&str> = answers.iter().map(|(q, _)| q).collect();
        assert_eq!(questions, vec!["Zebra question", "Alpha question"]);
    }

    #[test]
    fn security_answers_reject_non_string_values() {
        let err = SecurityAnswers::from_json(r#"{"Q1": 42}"#).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn security_answers_reject_non_objects() {
        assert!(SecurityAnswers::from_json("not json").is_err());
        assert!(SecurityAnswers::from_json(r#"["Q1", "A1"]"#).is_err());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("ABCDE1234F", "hunter2", SecurityAnswers::new());
        assert_eq!(creds.password.expose_secret(), "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn sheet_target_blank_tab_is_absent() {
        assert_eq!(SheetTarget::new("id").with_tab(Some("  ")).tab(), None);
        assert_eq!(SheetTarget::new("id").with_tab(None::<String>).tab(), None);
        assert_eq!(
            SheetTarget::new("id").with_tab(Some("Mutual Funds")).tab(),
            Some("Mutual Funds")
        );
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = PortfolioSnapshot::from_display("₹1,000", "₹1,100", "₹100", "10%");
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["investedValue"], "1000");
        assert_eq!(json["marketValue"], "1100");
        assert_eq!(json["gainLoss"], "100");
        assert_eq!(json["gainLossPercentage"], "10");
    }
}
