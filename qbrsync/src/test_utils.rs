//! In-memory fakes of the upstream and sheet APIs, plus record builders for tests.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::config::ResolvedPrtgInstance;
use crate::errors::{Error, Result};
use crate::models::Sensor;
use crate::sheets::{Column, MutationResult, NewRow, Sheet, SheetApi};
use crate::sources::opsgenie::{AlertPage, Paging, RawAlert};
use crate::sources::servicenow::{RawTicket, TicketTable};
use crate::sources::{AlertApi, SensorApi, TicketApi};

/// Install the process-wide rustls provider. Safe to call from every test.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Serves queued pages in order, whatever offset is asked for, and records the offsets.
pub struct FakeAlertApi {
    responses: Mutex<VecDeque<Result<AlertPage>>>,
    offsets: Mutex<Vec<usize>>,
}

impl FakeAlertApi {
    pub fn new(responses: Vec<Result<AlertPage>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            offsets: Mutex::new(Vec::new()),
        }
    }

    pub fn offsets(&self) -> Vec<usize> {
        self.offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertApi for FakeAlertApi {
    async fn list_alerts(&self, _query: &str, offset: usize, _limit: usize) -> Result<AlertPage> {
        self.offsets.lock().unwrap().push(offset);
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| Ok(AlertPage::default()))
    }
}

/// A page of `count` alerts with ids `alert-{start}` onwards, each a minute older than the last.
pub fn alert_page(start: usize, count: usize, has_next: bool) -> AlertPage {
    let newest = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
    let data = (start..start + count)
        .map(|i| RawAlert {
            id: format!("alert-{i}"),
            alias: format!("acme-alias-{i}"),
            message: format!("Alert number {i}"),
            created_at: newest - Duration::minutes(i as i64),
            acknowledged: i % 2 == 0,
            status: "closed".to_string(),
            source: "PRTG".to_string(),
            count: 1,
            priority: "P3".to_string(),
            tags: vec!["acme".to_string(), "acme-fw".to_string()],
        })
        .collect();

    AlertPage {
        data,
        paging: Paging {
            next: has_next.then(|| format!("https://api.opsgenie.com/v2/alerts?offset={}", start + count)),
        },
    }
}

/// Returns fixed records per table and records each `(table, query)` it was asked for.
#[derive(Default)]
pub struct FakeTicketApi {
    tables: HashMap<TicketTable, Vec<RawTicket>>,
    calls: Mutex<Vec<(TicketTable, String)>>,
}

impl FakeTicketApi {
    pub fn with_table(mut self, table: TicketTable, records: Vec<RawTicket>) -> Self {
        self.tables.insert(table, records);
        self
    }

    pub fn calls(&self) -> Vec<(TicketTable, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TicketApi for FakeTicketApi {
    async fn query_table(&self, table: TicketTable, query: &str, _fields: &[&str]) -> Result<Vec<RawTicket>> {
        self.calls.lock().unwrap().push((table, query.to_string()));
        Ok(self.tables.get(&table).cloned().unwrap_or_default())
    }
}

pub fn raw_ticket(number: &str, opened_at: &str, closed_at: Option<&str>) -> RawTicket {
    RawTicket {
        number: number.to_string(),
        location: Some("HQ".to_string()),
        ci_name: Some("core-sw-01".to_string()),
        short_description: Some(format!("{number} description")),
        state: Some(if closed_at.is_some() { "Closed" } else { "Open" }.to_string()),
        category: None,
        priority: Some("3 - Moderate".to_string()),
        risk: None,
        assigned_to: Some("Pat Doe".to_string()),
        opened_at: opened_at.to_string(),
        updated_by: Some("pat.doe".to_string()),
        closed_at: Some(closed_at.unwrap_or_default().to_string()),
    }
}

/// Returns fixed sensors per instance URL and records the API key of each query.
#[derive(Default)]
pub struct FakeSensorApi {
    instances: HashMap<String, Vec<Sensor>>,
    keys: Mutex<Vec<String>>,
}

impl FakeSensorApi {
    pub fn with_instance(mut self, url: &str, sensors: Vec<Sensor>) -> Self {
        self.instances.insert(url.to_string(), sensors);
        self
    }

    pub fn queried_keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl SensorApi for FakeSensorApi {
    async fn list_alerting_sensors(&self, instance: &ResolvedPrtgInstance, _count: u32) -> Result<Vec<Sensor>> {
        self.keys.lock().unwrap().push(instance.api_key.clone());
        Ok(self.instances.get(instance.url.as_str()).cloned().unwrap_or_default())
    }
}

pub fn sensor(name: &str) -> Sensor {
    Sensor {
        name: name.to_string(),
        parent_id: 2041,
        downtime_since: "1 h 5 m".to_string(),
        status: "Down".to_string(),
        status_raw: 5,
        probe: "Acme Probe".to_string(),
        group: "Core".to_string(),
        device: "core-sw-01".to_string(),
        message: "Destination unreachable".to_string(),
    }
}

/// A sheet with `columns` columns (ids `1000 + position`) holding `row_ids`.
pub fn sheet(id: u64, columns: usize, row_ids: Vec<u64>) -> Sheet {
    Sheet {
        id,
        name: format!("Sheet {id}"),
        columns: (0..columns)
            .map(|index| Column {
                id: 1000 + index as u64,
                index,
                title: format!("Column {index}"),
            })
            .collect(),
        row_ids,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SheetCall {
    Get { sheet_id: u64 },
    Delete { sheet_id: u64, row_ids: Vec<u64> },
    Add { sheet_id: u64, rows: Vec<NewRow> },
}

impl SheetCall {
    pub fn sheet_id(&self) -> u64 {
        match self {
            SheetCall::Get { sheet_id } | SheetCall::Delete { sheet_id, .. } | SheetCall::Add { sheet_id, .. } => *sheet_id,
        }
    }
}

/// Records every call. Deletes succeed unless their call number was marked to fail; adds
/// succeed unless a rejection was set.
#[derive(Default)]
pub struct FakeSheetApi {
    sheets: HashMap<u64, Sheet>,
    failing_deletes: HashSet<usize>,
    add_rejection: Option<MutationResult>,
    calls: Mutex<Vec<SheetCall>>,
    delete_count: Mutex<usize>,
}

impl FakeSheetApi {
    pub fn with_sheet(mut self, sheet: Sheet) -> Self {
        self.sheets.insert(sheet.id, sheet);
        self
    }

    /// Make the `call`-th delete (zero-based) come back with an error result.
    pub fn fail_delete_call(mut self, call: usize) -> Self {
        self.failing_deletes.insert(call);
        self
    }

    pub fn reject_adds(mut self, result: MutationResult) -> Self {
        self.add_rejection = Some(result);
        self
    }

    pub fn calls(&self) -> Vec<SheetCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> Vec<(u64, Vec<u64>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SheetCall::Delete { sheet_id, row_ids } => Some((sheet_id, row_ids)),
                _ => None,
            })
            .collect()
    }

    pub fn add_calls(&self) -> Vec<(u64, Vec<NewRow>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SheetCall::Add { sheet_id, rows } => Some((sheet_id, rows)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SheetApi for FakeSheetApi {
    async fn get_sheet(&self, sheet_id: u64) -> Result<Sheet> {
        self.calls.lock().unwrap().push(SheetCall::Get { sheet_id });
        self.sheets.get(&sheet_id).cloned().ok_or_else(|| Error::Sheet {
            sheet: sheet_id.to_string(),
            result_code: Some(1006),
            message: "Not Found".to_string(),
        })
    }

    async fn delete_rows(&self, sheet_id: u64, row_ids: &[u64]) -> Result<MutationResult> {
        self.calls.lock().unwrap().push(SheetCall::Delete {
            sheet_id,
            row_ids: row_ids.to_vec(),
        });

        let mut count = self.delete_count.lock().unwrap();
        let call = *count;
        *count += 1;

        if self.failing_deletes.contains(&call) {
            Ok(MutationResult {
                message: "Rate limit exceeded.".to_string(),
                result_code: 4003,
            })
        } else {
            Ok(MutationResult::success())
        }
    }

    async fn add_rows(&self, sheet_id: u64, rows: &[NewRow]) -> Result<MutationResult> {
        self.calls.lock().unwrap().push(SheetCall::Add {
            sheet_id,
            rows: rows.to_vec(),
        });
        Ok(self.add_rejection.clone().unwrap_or_else(MutationResult::success))
    }
}
