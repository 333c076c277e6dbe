//! Opsgenie alert source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::{Window, build_http_client, endpoint, send_json};
use crate::config::OpsgenieConfig;
use crate::errors::{Error, Result};
use crate::models::Alert;

pub const OPSGENIE: &str = "Opsgenie";

/// One page of the list-alerts endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertPage {
    pub data: Vec<RawAlert>,
    #[serde(default)]
    pub paging: Paging,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    /// URL of the next page, absent on the last page
    pub next: Option<String>,
}

/// An alert as the list-alerts endpoint returns it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlert {
    pub id: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<RawAlert> for Alert {
    fn from(raw: RawAlert) -> Self {
        Alert {
            id: raw.id,
            alias: raw.alias,
            message: raw.message,
            created_at: raw.created_at,
            acknowledged: raw.acknowledged,
            status: raw.status,
            source: raw.source,
            count: raw.count,
            priority: raw.priority,
            tags: raw.tags,
        }
    }
}

/// Access to the Opsgenie list-alerts endpoint.
#[async_trait]
pub trait AlertApi: Send + Sync {
    /// Fetch one page of alerts matching `query`, newest first.
    async fn list_alerts(&self, query: &str, offset: usize, limit: usize) -> Result<AlertPage>;
}

/// The concrete implementation of `AlertApi`, talking to the Opsgenie REST API.
pub struct OpsgenieClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl OpsgenieClient {
    pub fn new(config: &OpsgenieConfig, request_timeout: Duration) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::config("Opsgenie api_key is not configured"))?;

        Ok(Self {
            client: build_http_client(request_timeout)?,
            base_url: config.base_url.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl AlertApi for OpsgenieClient {
    async fn list_alerts(&self, query: &str, offset: usize, limit: usize) -> Result<AlertPage> {
        let mut url = endpoint(&self.base_url, "v2/alerts", OPSGENIE)?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("sort", "createdAt")
            .append_pair("order", "desc");

        debug!("Listing Opsgenie alerts from offset {}", offset);

        let request = self
            .client
            .get(url)
            .header("Authorization", format!("GenieKey {}", self.api_key));

        send_json(request, OPSGENIE, "list alerts").await
    }
}

/// Build the search query for alerts created inside `window` carrying any of `tags`.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use qbrsync::sources::{Window, build_alert_query};
///
/// let now = Utc.with_ymd_and_hms(2024, 4, 15, 0, 0, 0).unwrap();
/// let query = build_alert_query(&["acme".to_string(), "acme-dc".to_string()], &Window::new(now, 90));
/// assert_eq!(query, r#"createdAt >= 16-01-2024 tag: ("acme" OR "acme-dc")"#);
/// ```
pub fn build_alert_query(tags: &[String], window: &Window) -> String {
    let tag_clause = tags
        .iter()
        .map(|tag| format!("\"{}\"", tag.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(" OR ");

    format!("createdAt >= {} tag: ({})", window.cutoff().format("%d-%m-%Y"), tag_clause)
}

/// Fetch up to `max_rows` alerts created inside `window` with any of `tags`, newest first.
///
/// Pages are requested until Opsgenie reports no next page or `max_rows` is reached, in which
/// case the last page is cut to fit exactly. A failed first page is returned as an error. A
/// failed later page is logged and the previous page is used again in its place, then paging
/// carries on from the next offset. That can duplicate alerts on the sheet; it matches what the
/// dashboards have always received and is flagged in the log whenever it happens.
#[instrument(skip(api, tags), fields(tags = tags.len()))]
pub async fn fetch_quarterly_alerts<A: AlertApi + ?Sized>(
    api: &A,
    tags: &[String],
    window: &Window,
    max_rows: usize,
    page_size: usize,
) -> Result<Vec<Alert>> {
    info!("Gathering quarterly Opsgenie alert data...");

    let query = build_alert_query(tags, window);
    debug!("Opsgenie query: {}", query);

    let mut offset = 0;
    let mut page = api.list_alerts(&query, offset, page_size).await?;
    let mut alerts: Vec<Alert> = Vec::new();

    loop {
        let remaining = max_rows - alerts.len();
        alerts.extend(page.data.iter().take(remaining).cloned().map(Alert::from));

        if alerts.len() >= max_rows {
            info!("Reached the maximum of {} alerts, not fetching further pages", max_rows);
            break;
        }

        if page.paging.next.is_none() || page.data.is_empty() {
            break;
        }

        offset += page_size;
        match api.list_alerts(&query, offset, page_size).await {
            Ok(next_page) => page = next_page,
            Err(e) => {
                error!("An exception occurred when calling the Opsgenie list alerts endpoint: {}", e);
                warn!(offset, "Reusing the previous page of alerts in place of the failed page, the sheet may contain duplicates");
            }
        }
    }

    info!("Opsgenie quarterly alert data gathered! ({} alerts)", alerts.len());
    Ok(alerts)
}
