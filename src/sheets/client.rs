//! Minimal Google Sheets v4 REST client: tab titles and row appends.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

use super::auth::TokenSource;
use crate::pipeline::AppendOutcome;

const BASE_URL: &str = "https://sheets.googleapis.com";

pub struct SheetsClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl SheetsClient {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: Client::new(),
            base_url: BASE_URL.to_string(),
            tokens,
        }
    }

    /// Point the client at another server (for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn spreadsheet_url(&self, spreadsheet_id: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}",
            self.base_url,
            urlencoding::encode(spreadsheet_id)
        )
    }

    /// Titles of the document's tabs, in display order.
    pub async fn tab_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(self.spreadsheet_url(spreadsheet_id))
            .query(&[("fields", "sheets(properties(title))")])
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Sheets metadata request failed with status {status}: {body}"
            ));
        }

        let metadata: SpreadsheetMetadata = response.json().await?;
        Ok(metadata
            .sheets
            .into_iter()
            .filter_map(|sheet| sheet.properties.and_then(|p| p.title))
            .collect())
    }

    /// Append one row after the last row of the table in `range`.
    pub async fn append_row(
        &self,
        spreadsheet_id: &str,
        range: &str,
        row: Vec<String>,
    ) -> Result<AppendOutcome> {
        let token = self.tokens.access_token().await?;
        let url = format!(
            "{}/values/{}:append",
            self.spreadsheet_url(spreadsheet_id),
            urlencoding::encode(range)
        );

        let response = self
            .client
            .post(url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token.expose_secret())
            .json(&json!({ "values": [row] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Sheets append request failed with status {status}: {body}"
            ));
        }

        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: Option<SheetProperties>,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: Option<String>,
}
