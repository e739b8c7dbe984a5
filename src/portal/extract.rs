//! Reading the security question and the portfolio summary out of page content.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{PortfolioSnapshot, SecurityAnswers};

pub const INVESTED_LABEL: &str = "Invested Value";
pub const MARKET_LABEL: &str = "Market Value";
pub const GAIN_LOSS_LABEL: &str = "Gain/Loss (Absolute)";

const METRIC_HEADING: &str = ".db-portfolio-info h6";

/// A metric as displayed, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMetric {
    pub value: String,
    /// Only populated for metrics that show a percentage next to the value.
    pub percentage: String,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Extraction(format!("bad selector {css:?}: {e}")))
}

/// Lowercase and collapse runs of whitespace, for lenient text comparison.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// First answer whose question appears in the visible page text.
pub fn select_answer<'a>(
    answers: &'a SecurityAnswers,
    page_text: &str,
) -> Option<(&'a str, &'a str)> {
    let page_text = normalize_text(page_text);
    answers.iter().find(|(question, _)| {
        let question = normalize_text(question);
        !question.is_empty() && page_text.contains(&question)
    })
}

/// Whether `css` matches anything in `html`.
pub fn has_element(html: &str, css: &str) -> Result<bool> {
    let sel = selector(css)?;
    Ok(Html::parse_document(html).select(&sel).next().is_some())
}

/// Find the metric headed by `label` and read its value paragraph.
///
/// The value is the paragraph's leading text node; a nested span carries the
/// percentage. Missing metrics read as empty.
pub fn read_metric(document: &Html, label: &str) -> Result<Option<RawMetric>> {
    let heading_sel = selector(METRIC_HEADING)?;
    let paragraph_sel = selector("p")?;
    let span_sel = selector("span")?;

    let heading = document
        .select(&heading_sel)
        .find(|h| h.text().collect::<String>().trim() == label);
    let Some(container) = heading
        .and_then(|h| h.parent())
        .and_then(ElementRef::wrap)
    else {
        return Ok(None);
    };
    let Some(paragraph) = container.select(&paragraph_sel).next() else {
        return Ok(None);
    };

    let span_text = paragraph
        .select(&span_sel)
        .next()
        .map(|span| span.text().collect::<String>().trim().to_string());

    let value = match paragraph.first_child().and_then(|n| n.value().as_text()) {
        Some(text) => text.trim().to_string(),
        None => {
            let full: String = paragraph.text().collect();
            match &span_text {
                Some(span) => full.replacen(span.as_str(), "", 1).trim().to_string(),
                None => full.trim().to_string(),
            }
        }
    };

    Ok(Some(RawMetric {
        value,
        percentage: span_text.unwrap_or_default(),
    }))
}

/// Build a normalized snapshot from the portfolio page HTML.
pub fn snapshot_from_html(html: &str) -> Result<PortfolioSnapshot> {
    let document = Html::parse_document(html);

    let metric = |label: &str| -> Result<RawMetric> {
        Ok(read_metric(&document, label)?.unwrap_or_else(|| {
            warn!(label, "Portfolio metric not found on page");
            RawMetric::default()
        }))
    };

    let invested = metric(INVESTED_LABEL)?;
    let market = metric(MARKET_LABEL)?;
    let gain = metric(GAIN_LOSS_LABEL)?;

    Ok(PortfolioSnapshot::from_display(
        &invested.value,
        &market.value,
        &gain.value,
        &gain.percentage,
    ))
}
