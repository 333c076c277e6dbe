//! # qbrsync: quarterly business report sync
//!
//! `qbrsync` refreshes the per-customer dashboards behind quarterly business reviews. For every
//! configured customer it pulls the last quarter of Opsgenie alerts, the last quarter of
//! ServiceNow tickets (incidents, requested items and change requests) and the PRTG sensors
//! that are currently not up, then replaces the rows of the customer's three Smartsheet sheets
//! with the fresh data.
//!
//! ## Architecture
//!
//! The run is a straight line: load configuration, build one HTTP client per external system,
//! then for each customer run the alert, ticket and sensor pipelines in turn. Every network call
//! is awaited before the next one starts.
//!
//! The **source clients** ([`sources`]) sit behind one trait per system so the paging, merging
//! and capping logic can be driven by in-memory fakes. Raw responses are decoded into the
//! [`models`] types at the client boundary.
//!
//! The **row mapper** ([`rows`]) turns each record into a positional row. Alert rows carry a
//! single category derived from the alert's tags by the [`classifier`].
//!
//! The **sheet writer** ([`sheets`]) clears a sheet in chunks and inserts the new rows at the
//! top in one call. Failed deletes and inserts are logged and the run carries on.
//!
//! The **orchestrator** ([`sync`]) wires these together per customer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use qbrsync::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = qbrsync::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     qbrsync::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let report = Application::new(config)?.run().await?;
//!     println!("{} customers synced", report.customers);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod classifier;
pub mod config;
pub mod errors;
pub mod models;
pub mod rows;
pub mod sheets;
pub mod sources;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
mod test_utils;

use chrono::Utc;
use tracing::{debug, info};

pub use config::Config;
pub use errors::{Error, Result};
pub use sync::RunReport;

use sheets::SmartsheetClient;
use sources::{OpsgenieClient, PrtgClient, ServiceNowClient, Window};
use sync::Pipelines;

/// Main application struct that owns the configuration and one client per external system.
///
/// Created with [`Application::new`], which fails if credentials for any system are missing,
/// and driven by [`Application::run`], which syncs every configured customer once.
pub struct Application {
    config: Config,
    opsgenie: OpsgenieClient,
    servicenow: ServiceNowClient,
    prtg: PrtgClient,
    smartsheet: SmartsheetClient,
}

impl Application {
    pub fn new(config: Config) -> Result<Self> {
        let timeout = config.request_timeout;
        debug!("Building API clients with a {:?} request timeout", timeout);
        Ok(Self {
            opsgenie: OpsgenieClient::new(&config.opsgenie, timeout)?,
            servicenow: ServiceNowClient::new(&config.servicenow, timeout)?,
            prtg: PrtgClient::new(timeout)?,
            smartsheet: SmartsheetClient::new(&config.smartsheet, timeout)?,
            config,
        })
    }

    /// Sync every configured customer, stopping at the first pipeline that fails.
    pub async fn run(&self) -> Result<RunReport> {
        let window = Window::new(Utc::now(), self.config.lookback_days);
        info!(
            "Starting QBR automation for {} customer(s), alerts and tickets since {}",
            self.config.customers.len(),
            window.cutoff().format("%Y-%m-%d")
        );

        let pipelines = Pipelines::new(
            &self.opsgenie,
            &self.servicenow,
            &self.prtg,
            &self.smartsheet,
            &self.config,
            window,
        );
        pipelines.run(&self.config.customers).await
    }
}
