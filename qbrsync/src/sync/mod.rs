//! The per-customer sync pipelines.
//!
//! Each pipeline fetches its records, loads the destination sheet, maps the records to rows and
//! replaces the sheet contents. Customers and pipelines run one after the other; an error in any
//! pipeline ends the run.

use tracing::{error, info, instrument};

use crate::config::{Config, CustomerConfig};
use crate::errors::Result;
use crate::rows::{DestinationRow, alert_row, sensor_row, ticket_row};
use crate::sheets::{SheetApi, SheetWriter};
use crate::sources::{
    AlertApi, SensorApi, TicketApi, Window, fetch_alerting_sensors, fetch_quarterly_alerts, fetch_quarterly_tickets,
};

/// Rows written for one customer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CustomerReport {
    pub alerts: usize,
    pub tickets: usize,
    pub sensors: usize,
}

/// Totals over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub customers: usize,
    pub alerts_written: usize,
    pub tickets_written: usize,
    pub sensors_written: usize,
}

impl RunReport {
    fn add(&mut self, customer: CustomerReport) {
        self.customers += 1;
        self.alerts_written += customer.alerts;
        self.tickets_written += customer.tickets;
        self.sensors_written += customer.sensors;
    }
}

/// The three pipelines, wired to one client per upstream system.
pub struct Pipelines<'a, A, T, S, W>
where
    A: AlertApi + ?Sized,
    T: TicketApi + ?Sized,
    S: SensorApi + ?Sized,
    W: SheetApi + ?Sized,
{
    alerts: &'a A,
    tickets: &'a T,
    sensors: &'a S,
    writer: SheetWriter<'a, W>,
    config: &'a Config,
    window: Window,
}

impl<'a, A, T, S, W> Pipelines<'a, A, T, S, W>
where
    A: AlertApi + ?Sized,
    T: TicketApi + ?Sized,
    S: SensorApi + ?Sized,
    W: SheetApi + ?Sized,
{
    pub fn new(alerts: &'a A, tickets: &'a T, sensors: &'a S, sheets: &'a W, config: &'a Config, window: Window) -> Self {
        Self {
            alerts,
            tickets,
            sensors,
            writer: SheetWriter::new(sheets, config.smartsheet.delete_chunk_size),
            config,
            window,
        }
    }

    async fn replace_sheet(&self, sheet_id: u64, rows: Vec<DestinationRow>) -> Result<usize> {
        let sheet = self.writer.load(sheet_id).await?;
        self.writer.replace(&sheet, &rows).await
    }

    #[instrument(skip_all, fields(customer = %customer.customer_name))]
    pub async fn sync_alerts(&self, customer: &CustomerConfig) -> Result<usize> {
        let alerts = fetch_quarterly_alerts(
            self.alerts,
            &customer.opsgenie_tags,
            &self.window,
            self.config.max_rows,
            self.config.opsgenie.page_size,
        )
        .await?;

        let rows = alerts.iter().map(alert_row).collect();
        self.replace_sheet(customer.smartsheet_sheet_ids.opsgenie_alerts, rows).await
    }

    #[instrument(skip_all, fields(customer = %customer.customer_name))]
    pub async fn sync_tickets(&self, customer: &CustomerConfig) -> Result<usize> {
        let tickets = fetch_quarterly_tickets(
            self.tickets,
            &customer.servicenow_company_names,
            &self.window,
            self.config.max_rows,
        )
        .await?;

        let rows = tickets.iter().map(ticket_row).collect();
        self.replace_sheet(customer.smartsheet_sheet_ids.servicenow_tickets, rows).await
    }

    #[instrument(skip_all, fields(customer = %customer.customer_name))]
    pub async fn sync_sensors(&self, customer: &CustomerConfig) -> Result<usize> {
        if customer.prtg_instances.is_empty() {
            info!("No PRTG instances configured for {}, skipping PRTG sync", customer.customer_name);
            return Ok(0);
        }

        let sensors = fetch_alerting_sensors(
            self.sensors,
            &self.config.prtg,
            &customer.prtg_instances,
            self.config.max_rows,
        )
        .await?;

        let rows = sensors.iter().map(sensor_row).collect();
        self.replace_sheet(customer.smartsheet_sheet_ids.prtg_alerts, rows).await
    }

    /// Alerts, then tickets, then sensors.
    pub async fn sync_customer(&self, customer: &CustomerConfig) -> Result<CustomerReport> {
        info!("Syncing QBR data for {}", customer.customer_name);

        let report = CustomerReport {
            alerts: self.sync_alerts(customer).await?,
            tickets: self.sync_tickets(customer).await?,
            sensors: self.sync_sensors(customer).await?,
        };

        info!(
            customer = %customer.customer_name,
            alerts = report.alerts,
            tickets = report.tickets,
            sensors = report.sensors,
            "Finished QBR sync for {}",
            customer.customer_name
        );
        Ok(report)
    }

    pub async fn run(&self, customers: &[CustomerConfig]) -> Result<RunReport> {
        let mut report = RunReport::default();
        for customer in customers {
            let synced = self.sync_customer(customer).await.inspect_err(|e| {
                error!(
                    customer = %customer.customer_name,
                    service = e.service().unwrap_or("qbrsync"),
                    "Sync failed: {}",
                    e
                );
            })?;
            report.add(synced);
        }

        info!(
            customers = report.customers,
            alerts = report.alerts_written,
            tickets = report.tickets_written,
            sensors = report.sensors_written,
            "QBR automation completed"
        );
        Ok(report)
    }
}
