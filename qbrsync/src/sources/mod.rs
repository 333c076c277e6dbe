//! Clients for the three upstream systems.
//!
//! Each system sits behind a small trait (`AlertApi`, `TicketApi`, `SensorApi`) with one
//! reqwest-backed implementation. The `fetch_*` functions hold the paging, merging and capping
//! logic and are written against the traits, so tests drive them with in-memory fakes.

pub mod opsgenie;
pub mod prtg;
pub mod servicenow;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use crate::errors::{Error, Result};

pub use opsgenie::{AlertApi, OpsgenieClient, build_alert_query, fetch_quarterly_alerts};
pub use prtg::{PrtgClient, SensorApi, fetch_alerting_sensors};
pub use servicenow::{ServiceNowClient, TicketApi, build_ticket_query, fetch_quarterly_tickets};

/// The time range alerts and tickets are fetched for: `lookback_days` up to `now`.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub now: DateTime<Utc>,
    pub lookback_days: i64,
}

impl Window {
    pub fn new(now: DateTime<Utc>, lookback_days: i64) -> Self {
        Self { now, lookback_days }
    }

    /// Start of the window.
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.now - ChronoDuration::days(self.lookback_days)
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Other(anyhow::anyhow!("Failed to create HTTP client: {e}")))
}

/// Makes sure a url has a trailing slash.
///
/// `Url::join` replaces the last path segment unless the base ends in '/', so joining
/// `/2.0` with `sheets` gives `/sheets` but `/2.0/` with `sheets` gives `/2.0/sheets`.
pub(crate) fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

/// Join a relative path onto a service base URL.
pub(crate) fn endpoint(base: &Url, path: &str, service: &'static str) -> Result<Url> {
    ensure_slash(base)
        .join(path)
        .map_err(|e| Error::upstream(service, format!("build URL for {path}"), e))
}

/// Send a request and decode a JSON body, logging the body on failure.
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder, service: &'static str, operation: &str) -> Result<T> {
    let response = request.send().await.map_err(|e| Error::upstream(service, operation, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("{} {} returned {}", service, operation, status);
        debug!("Response body was: {}", body);
        return Err(Error::upstream(service, operation, format!("HTTP {status} - {body}")));
    }

    let body_text = response.text().await.map_err(|e| Error::upstream(service, operation, e))?;

    match serde_json::from_str::<T>(&body_text) {
        Ok(parsed) => Ok(parsed),
        Err(e) => {
            error!("Failed to parse {} response to {} as JSON. Error: {}", service, operation, e);
            debug!("Response body was: {}", body_text);
            Err(Error::decode(service, format!("{operation}: {e}")))
        }
    }
}
