//! Appending snapshot rows to a Google Sheet.

pub mod auth;
pub mod client;

pub use auth::{ServiceAccountTokens, StaticToken, TokenSource};
pub use client::SheetsClient;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{error, info};

use crate::clock::{Clock, SystemClock};
use crate::config::SheetsSettings;
use crate::error::{Error, Result};
use crate::models::{PortfolioSnapshot, SheetTarget};
use crate::pipeline::{AppendOutcome, SnapshotSink};

/// Pick the tab to write to.
///
/// An explicit name is used verbatim. Otherwise `preferred` if the document
/// has it, else the first tab, else `fallback`.
pub fn resolve_tab_title(
    explicit: Option<&str>,
    titles: &[String],
    preferred: &str,
    fallback: &str,
) -> String {
    if let Some(name) = explicit {
        return name.to_string();
    }
    titles
        .iter()
        .find(|t| t.as_str() == preferred)
        .or_else(|| titles.first())
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

/// A1 range covering columns A to C of `title`.
pub fn quoted_range(title: &str) -> String {
    if title.chars().any(char::is_whitespace) {
        format!("'{title}'!A:C")
    } else {
        format!("{title}!A:C")
    }
}

/// Date as written to the sheet: `dd-mm-yyyy`.
pub fn format_sheet_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// The three cells written per snapshot.
pub fn snapshot_row(date: NaiveDate, snapshot: &PortfolioSnapshot) -> Vec<String> {
    vec![
        format_sheet_date(date),
        snapshot.invested_value.clone(),
        snapshot.market_value.clone(),
    ]
}

/// Writes one dated row per snapshot.
pub struct SheetAppender {
    client: SheetsClient,
    preferred_tab: String,
    fallback_tab: String,
    clock: Arc<dyn Clock>,
}

impl SheetAppender {
    pub fn new(client: SheetsClient, settings: &SheetsSettings) -> Self {
        Self {
            client,
            preferred_tab: settings.preferred_tab.clone(),
            fallback_tab: settings.fallback_tab.clone(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Service-account backed appender for the configured API.
    pub fn from_settings(settings: &SheetsSettings) -> Self {
        let tokens = Arc::new(ServiceAccountTokens::new(&settings.service_account_path));
        let client = SheetsClient::new(tokens).with_base_url(&settings.api_base_url);
        Self::new(client, settings)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn try_append(
        &self,
        snapshot: &PortfolioSnapshot,
        target: &SheetTarget,
    ) -> anyhow::Result<AppendOutcome> {
        let titles = match target.tab() {
            Some(_) => Vec::new(),
            None => self.client.tab_titles(&target.spreadsheet_id).await?,
        };
        let title = resolve_tab_title(
            target.tab(),
            &titles,
            &self.preferred_tab,
            &self.fallback_tab,
        );
        let range = quoted_range(&title);
        let row = snapshot_row(self.clock.today(), snapshot);

        info!(tab = %title, range = %range, date = %row[0], "Appending snapshot row");
        self.client
            .append_row(&target.spreadsheet_id, &range, row)
            .await
    }
}

#[async_trait]
impl SnapshotSink for SheetAppender {
    async fn append(
        &self,
        snapshot: &PortfolioSnapshot,
        target: &SheetTarget,
    ) -> Result<AppendOutcome> {
        match self.try_append(snapshot, target).await {
            Ok(outcome) => {
                info!(
                    updated_cells = outcome.updated_cells().unwrap_or(0),
                    "Appended snapshot to spreadsheet"
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(
                    spreadsheet_id = %target.spreadsheet_id,
                    error = %format!("{err:#}"),
                    "Spreadsheet append failed"
                );
                Err(Error::SheetAppend)
            }
        }
    }
}
