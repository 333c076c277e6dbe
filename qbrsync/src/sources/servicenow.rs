//! ServiceNow ticket source (incidents, requested items, change requests).

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use super::{Window, build_http_client, endpoint, send_json};
use crate::config::ServiceNowConfig;
use crate::errors::{Error, Result};
use crate::models::Ticket;
use crate::models::tickets::parse_ticket_timestamp;

pub const SERVICENOW: &str = "ServiceNow";

/// Fields requested from every ticket table.
pub const TICKET_FIELDS: &[&str] = &[
    "number",
    "location.name",
    "cmdb_ci.name",
    "short_description",
    "state",
    "category",
    "priority",
    "risk",
    "assigned_to.name",
    "opened_at",
    "sys_updated_by",
    "closed_at",
];

/// The tables a customer's tickets are collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketTable {
    Incident,
    RequestItem,
    ChangeRequest,
}

impl TicketTable {
    pub const ALL: [TicketTable; 3] = [TicketTable::Incident, TicketTable::RequestItem, TicketTable::ChangeRequest];

    pub fn name(self) -> &'static str {
        match self {
            TicketTable::Incident => "incident",
            TicketTable::RequestItem => "sc_req_item",
            TicketTable::ChangeRequest => "change_request",
        }
    }
}

impl fmt::Display for TicketTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Deserialize)]
struct TablePage {
    result: Vec<RawTicket>,
}

/// A ticket record as the Table API returns it with display values on.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawTicket {
    pub number: String,
    #[serde(rename = "location.name", default)]
    pub location: Option<String>,
    #[serde(rename = "cmdb_ci.name", default)]
    pub ci_name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub risk: Option<String>,
    #[serde(rename = "assigned_to.name", default)]
    pub assigned_to: Option<String>,
    pub opened_at: String,
    #[serde(rename = "sys_updated_by", default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub closed_at: Option<String>,
}

impl TryFrom<RawTicket> for Ticket {
    type Error = Error;

    fn try_from(raw: RawTicket) -> Result<Self> {
        let opened_at = parse_ticket_timestamp(&raw.opened_at)
            .map_err(|e| Error::decode(SERVICENOW, format!("ticket {} has unparseable opened_at '{}': {e}", raw.number, raw.opened_at)))?;

        let closed_at = match raw.closed_at.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(
                parse_ticket_timestamp(value)
                    .map_err(|e| Error::decode(SERVICENOW, format!("ticket {} has unparseable closed_at '{value}': {e}", raw.number)))?,
            ),
        };

        Ok(Ticket {
            number: raw.number,
            location: raw.location.unwrap_or_default(),
            ci_name: raw.ci_name.unwrap_or_default(),
            short_description: raw.short_description.unwrap_or_default(),
            state: raw.state.unwrap_or_default(),
            category: raw.category.unwrap_or_default(),
            priority: raw.priority.unwrap_or_default(),
            risk: raw.risk.unwrap_or_default(),
            assigned_to: raw.assigned_to.unwrap_or_default(),
            opened_at,
            updated_by: raw.updated_by.unwrap_or_default(),
            closed_at,
        })
    }
}

/// Access to the ServiceNow Table API.
#[async_trait]
pub trait TicketApi: Send + Sync {
    /// Every record in `table` matching the encoded `query`, projected to `fields`.
    async fn query_table(&self, table: TicketTable, query: &str, fields: &[&str]) -> Result<Vec<RawTicket>>;
}

/// The concrete implementation of `TicketApi`, using basic auth against one instance.
pub struct ServiceNowClient {
    client: Client,
    instance_url: Url,
    authorization: String,
    page_size: usize,
}

impl ServiceNowClient {
    pub fn new(config: &ServiceNowConfig, request_timeout: Duration) -> Result<Self> {
        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            return Err(Error::config("ServiceNow username and password must both be configured"));
        };

        Ok(Self {
            client: build_http_client(request_timeout)?,
            instance_url: config.instance_url()?,
            authorization: format!("Basic {}", STANDARD.encode(format!("{username}:{password}"))),
            page_size: config.page_size,
        })
    }

    async fn query_page(&self, table: TicketTable, query: &str, fields: &[&str], offset: usize) -> Result<Vec<RawTicket>> {
        let mut url = endpoint(&self.instance_url, &format!("api/now/table/{}", table.name()), SERVICENOW)?;
        url.query_pairs_mut()
            .append_pair("sysparm_query", query)
            .append_pair("sysparm_fields", &fields.join(","))
            .append_pair("sysparm_display_value", "true")
            .append_pair("sysparm_exclude_reference_link", "true")
            .append_pair("sysparm_limit", &self.page_size.to_string())
            .append_pair("sysparm_offset", &offset.to_string());

        let request = self
            .client
            .get(url)
            .header("Authorization", &self.authorization)
            .header("Accept", "application/json");

        let page: TablePage = send_json(request, SERVICENOW, &format!("query the {table} table")).await?;
        Ok(page.result)
    }
}

#[async_trait]
impl TicketApi for ServiceNowClient {
    async fn query_table(&self, table: TicketTable, query: &str, fields: &[&str]) -> Result<Vec<RawTicket>> {
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.query_page(table, query, fields, offset).await?;
            let page_len = page.len();
            records.extend(page);

            if page_len < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        debug!("Fetched {} records from the {} table", records.len(), table);
        Ok(records)
    }
}

/// Build the encoded query for tickets created inside `window` under any of `companies`.
///
/// `^OR` binds tighter than `^`, so the result reads `created AND (company1 OR company2 ...)`.
pub fn build_ticket_query(companies: &[String], window: &Window) -> String {
    let companies = companies
        .iter()
        .map(|company| format!("company.name={}", company.replace('^', "^^")))
        .collect::<Vec<_>>()
        .join("^OR");

    format!("sys_created_on>={}^{}", window.cutoff().format("%Y-%m-%d %H:%M:%S"), companies)
}

/// Sort newest opened first and keep at most `max_rows`. Tickets opened at the same instant come
/// out in reverse fetch order.
pub fn newest_first(mut tickets: Vec<Ticket>, max_rows: usize) -> Vec<Ticket> {
    tickets.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
    tickets.reverse();
    tickets.truncate(max_rows);
    tickets
}

/// Fetch tickets of every supported type created inside `window` for any of `companies`.
#[instrument(skip(api, companies), fields(companies = companies.len()))]
pub async fn fetch_quarterly_tickets<T: TicketApi + ?Sized>(
    api: &T,
    companies: &[String],
    window: &Window,
    max_rows: usize,
) -> Result<Vec<Ticket>> {
    info!("Gathering quarterly ServiceNow ticket data...");

    let query = build_ticket_query(companies, window);
    debug!("ServiceNow query: {}", query);

    let mut raw_tickets = Vec::new();
    for table in TicketTable::ALL {
        let records = api.query_table(table, &query, TICKET_FIELDS).await?;
        debug!("{} {} records", records.len(), table);
        raw_tickets.extend(records);
    }

    let tickets = raw_tickets.into_iter().map(Ticket::try_from).collect::<Result<Vec<_>>>()?;
    let tickets = newest_first(tickets, max_rows);

    info!("ServiceNow quarterly ticket data gathered! ({} tickets)", tickets.len());
    Ok(tickets)
}
