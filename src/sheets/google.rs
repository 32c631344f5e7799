//! Google Sheets v4 REST mirror.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{SheetMirror, find_row, record_to_row, rows_to_records};
use crate::config::SheetsConfig;
use crate::directory::AddressRecord;
use crate::error::{BotError, Result};

/// Last column of the read range.
const LAST_COLUMN: &str = "Z";

/// Mirror backed by a Google spreadsheet.
pub struct GoogleSheetsMirror {
    spreadsheet_id: String,
    sheet_name: String,
    api_base_url: String,
    access_token: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl GoogleSheetsMirror {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &SheetsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BotError::Sheets(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet_name: config.sheet_name.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            access_token: config.access_token.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn read_range(&self) -> String {
        format!("{}!A:{LAST_COLUMN}", self.sheet_name)
    }

    /// Whole-row range for a zero-based row index.
    fn row_range(&self, index: usize) -> String {
        let line = index + 1;
        format!("{}!{line}:{line}", self.sheet_name)
    }

    fn values_url(&self, range: &str, suffix: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}{suffix}",
            self.api_base_url,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(range),
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = match &self.access_token {
            Some(token) if !token.trim().is_empty() => request.bearer_auth(token),
            _ => request,
        };
        match &self.api_key {
            Some(key) if !key.trim().is_empty() => request.query(&[("key", key)]),
            _ => request,
        }
    }

    async fn read_rows(&self) -> anyhow::Result<Vec<Vec<String>>> {
        let url = self.values_url(&self.read_range(), "");
        let response = self.authorize(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "reading spreadsheet {} failed ({status}): {body}",
                self.spreadsheet_id
            );
        }
        let range: ValueRange = response.json().await?;
        Ok(range
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn write_values(
        &self,
        request: reqwest::RequestBuilder,
        range: &str,
        row: Vec<String>,
    ) -> anyhow::Result<()> {
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [row],
        });
        let response = self
            .authorize(request)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "writing spreadsheet {} failed ({status}): {body}",
                self.spreadsheet_id
            );
        }
        Ok(())
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetMirror for GoogleSheetsMirror {
    fn id(&self) -> &'static str {
        "google-sheets"
    }

    async fn pull(&self) -> anyhow::Result<Vec<AddressRecord>> {
        let rows = self.read_rows().await?;
        Ok(rows_to_records(&rows)?)
    }

    async fn push(&self, record: &AddressRecord) -> anyhow::Result<()> {
        let rows = self.read_rows().await?;
        if rows.is_empty() {
            anyhow::bail!("spreadsheet {} returned no rows", self.spreadsheet_id);
        }

        match find_row(&rows, &record.handle) {
            Some(index) => {
                let range = self.row_range(index);
                debug!(handle = %record.handle, %range, "updating sheet row");
                let url = self.values_url(&range, "");
                self.write_values(self.client.put(&url), &range, record_to_row(record))
                    .await
            }
            None => {
                let range = self.read_range();
                debug!(handle = %record.handle, "appending sheet row");
                let url = self.values_url(&range, ":append");
                self.write_values(self.client.post(&url), &range, record_to_row(record))
                    .await
            }
        }
    }
}
