//! Mapping from domain records to destination sheet rows.
//!
//! Each sheet type has a fixed column order. A row is a list of `(column position, value)`
//! pairs; the sheet writer turns positions into the sheet's column ids at write time.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::models::{Alert, Sensor, Ticket};

/// Date-only columns
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Combined date-time columns
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";

/// alias, category, message, id, created-date, created-datetime, acknowledged, status, source,
/// count, priority
pub const ALERT_COLUMNS: usize = 11;
/// number, location, CI name, description, state, category, priority, risk, assignee,
/// opened-date, opened-datetime, updated-by, closed-date, closed-datetime, resolution-days
pub const TICKET_COLUMNS: usize = 15;
/// status, downtime-since, name, probe > group > device, message
pub const SENSOR_COLUMNS: usize = 5;

/// A single cell value in a form the sheet API accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// One destination row, cells keyed by column position.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationRow {
    pub cells: Vec<(usize, CellValue)>,
}

impl DestinationRow {
    fn positional<const N: usize>(values: [CellValue; N]) -> Self {
        Self {
            cells: values.into_iter().enumerate().collect(),
        }
    }

    /// Value at a column position, if the row sets one.
    pub fn get(&self, position: usize) -> Option<&CellValue> {
        self.cells.iter().find(|(p, _)| *p == position).map(|(_, v)| v)
    }

    /// Number of columns the row needs: one past the highest position it sets.
    pub fn width(&self) -> usize {
        self.cells.iter().map(|(p, _)| p + 1).max().unwrap_or(0)
    }
}

/// Python-style rendering, kept because the dashboards filter on "True"/"False".
fn bool_text(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

fn date_cell(value: &NaiveDateTime) -> CellValue {
    value.format(DATE_FORMAT).to_string().into()
}

fn datetime_cell(value: &NaiveDateTime) -> CellValue {
    value.format(DATETIME_FORMAT).to_string().into()
}

fn utc_date_cell(value: &DateTime<Utc>) -> CellValue {
    date_cell(&value.naive_utc())
}

fn utc_datetime_cell(value: &DateTime<Utc>) -> CellValue {
    datetime_cell(&value.naive_utc())
}

pub fn alert_row(alert: &Alert) -> DestinationRow {
    DestinationRow::positional([
        alert.alias.as_str().into(),
        alert.primary_tag().into(),
        alert.message.as_str().into(),
        alert.id.as_str().into(),
        utc_date_cell(&alert.created_at),
        utc_datetime_cell(&alert.created_at),
        bool_text(alert.acknowledged).into(),
        alert.status.as_str().into(),
        alert.source.as_str().into(),
        alert.count.to_string().into(),
        alert.priority.as_str().into(),
    ])
}

pub fn ticket_row(ticket: &Ticket) -> DestinationRow {
    let (closed_date, closed_datetime) = match &ticket.closed_at {
        Some(closed_at) => (date_cell(closed_at), datetime_cell(closed_at)),
        None => (CellValue::empty(), CellValue::empty()),
    };
    let resolution = ticket.resolution_days().map(CellValue::Number).unwrap_or_else(CellValue::empty);

    DestinationRow::positional([
        ticket.number.as_str().into(),
        ticket.location.as_str().into(),
        ticket.ci_name.as_str().into(),
        ticket.short_description.as_str().into(),
        ticket.state.as_str().into(),
        ticket.category.as_str().into(),
        ticket.priority.as_str().into(),
        ticket.risk.as_str().into(),
        ticket.assigned_to.as_str().into(),
        date_cell(&ticket.opened_at),
        datetime_cell(&ticket.opened_at),
        ticket.updated_by.as_str().into(),
        closed_date,
        closed_datetime,
        resolution,
    ])
}

pub fn sensor_row(sensor: &Sensor) -> DestinationRow {
    DestinationRow::positional([
        sensor.status.as_str().into(),
        sensor.downtime_since.as_str().into(),
        sensor.name.as_str().into(),
        sensor.path().into(),
        sensor.message.as_str().into(),
    ])
}
