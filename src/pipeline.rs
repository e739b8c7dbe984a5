//! The scrape → append pipeline shared by the CLI and the HTTP handler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::models::{Credentials, PortfolioSnapshot, SheetTarget};

/// Something that can produce a portfolio snapshot for a set of credentials.
#[async_trait]
pub trait PortfolioSource: Send + Sync {
    async fn fetch(&self, credentials: &Credentials) -> Result<PortfolioSnapshot>;
}

/// Something that can record a snapshot as a spreadsheet row.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn append(&self, snapshot: &PortfolioSnapshot, target: &SheetTarget)
        -> Result<AppendOutcome>;
}

/// Update metadata returned by the spreadsheet provider for an append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,

    /// The existing table the row was appended after, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_range: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<UpdateSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_columns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_cells: Option<u32>,
}

impl AppendOutcome {
    pub fn updated_cells(&self) -> Option<u32> {
        self.updates.as_ref().and_then(|u| u.updated_cells)
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub snapshot: PortfolioSnapshot,
    /// Present only when a sheet target was given.
    pub sheet: Option<AppendOutcome>,
}

/// Scrape once, then append once if a target is given. Nothing is retried.
pub async fn run_once(
    source: &dyn PortfolioSource,
    sink: &dyn SnapshotSink,
    credentials: &Credentials,
    target: Option<&SheetTarget>,
) -> Result<RunOutcome> {
    let snapshot = source.fetch(credentials).await?;
    info!(
        invested = %snapshot.invested_value,
        market = %snapshot.market_value,
        gain_loss = %snapshot.gain_loss,
        gain_loss_pct = %snapshot.gain_loss_percentage,
        "Scraped portfolio snapshot"
    );

    let sheet = match target {
        Some(target) => {
            info!(
                spreadsheet_id = %target.spreadsheet_id,
                tab = target.tab().unwrap_or("(auto)"),
                "Pushing snapshot to spreadsheet"
            );
            Some(sink.append(&snapshot, target).await?)
        }
        None => None,
    };

    Ok(RunOutcome { snapshot, sheet })
}
