use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

use super::{Column, MutationResult, NewRow, Sheet, SheetApi};
use crate::config::SmartsheetConfig;
use crate::errors::{Error, Result};
use crate::sources::{build_http_client, endpoint, send_json};

pub const SMARTSHEET: &str = "Smartsheet";

#[derive(Debug, Deserialize)]
struct RawSheet {
    id: u64,
    name: String,
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    rows: Vec<RawRow>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    id: u64,
}

impl From<RawSheet> for Sheet {
    fn from(raw: RawSheet) -> Self {
        Sheet {
            id: raw.id,
            name: raw.name,
            columns: raw.columns,
            row_ids: raw.rows.into_iter().map(|row| row.id).collect(),
        }
    }
}

/// Body of a rejected request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_code: i64,
    message: String,
}

/// The concrete implementation of `SheetApi` against the Smartsheet REST API.
pub struct SmartsheetClient {
    client: Client,
    base_url: Url,
    authorization: String,
}

impl SmartsheetClient {
    pub fn new(config: &SmartsheetConfig, request_timeout: Duration) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::config("Smartsheet api_key is not configured (set SMARTSHEET_API_KEY)"))?;

        Ok(Self {
            client: build_http_client(request_timeout)?,
            base_url: config.base_url.clone(),
            authorization: format!("Bearer {api_key}"),
        })
    }

    fn rows_url(&self, sheet_id: u64) -> Result<Url> {
        endpoint(&self.base_url, &format!("sheets/{sheet_id}/rows"), SMARTSHEET)
    }

    /// Send a mutation. Error bodies come back as a non-success result rather than an `Err`.
    async fn send_mutation(&self, request: RequestBuilder, operation: &str) -> Result<MutationResult> {
        let response = request
            .header("Authorization", &self.authorization)
            .send()
            .await
            .map_err(|e| Error::upstream(SMARTSHEET, operation, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::upstream(SMARTSHEET, operation, e))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                debug!("Response body was: {}", body);
                Error::decode(SMARTSHEET, format!("{operation}: {e}"))
            });
        }

        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(rejected) => Ok(MutationResult {
                message: rejected.message,
                result_code: rejected.error_code,
            }),
            Err(_) => {
                error!("{} {} returned {}", SMARTSHEET, operation, status);
                Err(Error::upstream(SMARTSHEET, operation, format!("HTTP {status} - {body}")))
            }
        }
    }
}

#[async_trait]
impl SheetApi for SmartsheetClient {
    #[instrument(skip(self))]
    async fn get_sheet(&self, sheet_id: u64) -> Result<Sheet> {
        let url = endpoint(&self.base_url, &format!("sheets/{sheet_id}"), SMARTSHEET)?;
        let request = self.client.get(url).header("Authorization", &self.authorization);

        let raw: RawSheet = send_json(request, SMARTSHEET, &format!("get sheet {sheet_id}")).await?;
        Ok(raw.into())
    }

    #[instrument(skip(self, row_ids), fields(rows = row_ids.len()))]
    async fn delete_rows(&self, sheet_id: u64, row_ids: &[u64]) -> Result<MutationResult> {
        let ids = row_ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
        let mut url = self.rows_url(sheet_id)?;
        url.query_pairs_mut()
            .append_pair("ids", &ids)
            .append_pair("ignoreRowsNotFound", "true");

        self.send_mutation(self.client.delete(url), &format!("delete rows from sheet {sheet_id}"))
            .await
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn add_rows(&self, sheet_id: u64, rows: &[NewRow]) -> Result<MutationResult> {
        let url = self.rows_url(sheet_id)?;
        self.send_mutation(self.client.post(url).json(rows), &format!("add rows to sheet {sheet_id}"))
            .await
    }
}
