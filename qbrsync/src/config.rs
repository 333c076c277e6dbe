//! Run configuration.
//!
//! Configuration is loaded from an optional YAML file with environment variable overrides. The
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `QBRSYNC_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`, may be absent)
//! 2. **Environment variables** - Variables prefixed with `QBRSYNC_` override YAML values
//! 3. **Credential variables** - `OPSGENIE_API_KEY`, `SERVICENOW_*`, `SMARTSHEET_API_KEY` and
//!    `PRTG_DEFAULT_INSTANCE_{1,2}_{URL,API_KEY}` map onto their service sections
//!
//! For nested values, use double underscores: `QBRSYNC_OPSGENIE__PAGE_SIZE=50` sets
//! `opsgenie.page_size`.
//!
//! ## Customers
//!
//! The customer list is a JSON array (see [`CustomerConfig`]) and can come from three places,
//! the last one present wins:
//!
//! - the `customers` key in the YAML file
//! - the `CUSTOMER_CONFIGS` environment variable
//! - a mounted secret file named by `customer_configs_file` (or `CUSTOMER_CONFIGS_FILE`)
//!
//! ```bash
//! export CUSTOMER_CONFIGS='[{
//!   "customer_name": "Acme",
//!   "opsgenie_tags": ["acme"],
//!   "servicenow_company_names": ["Acme Corp"],
//!   "smartsheet_sheet_ids": {"opsgenie_alerts": 1, "servicenow_tickets": 2, "prtg_alerts": 3},
//!   "prtg_instances": [{"url": "DEFAULT_INSTANCE_1", "probe_substrings": ["acme"]}]
//! }]'
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, env::VarError, fmt, path::PathBuf, time::Duration};
use url::Url;

use crate::errors::{Error, Result};
use crate::sheets::writer::MAX_DELETE_CHUNK;

/// Environment variable holding the inline customer JSON array.
pub const CUSTOMER_CONFIGS_ENV: &str = "CUSTOMER_CONFIGS";

/// Raw credential variables and the config keys they populate.
const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[
    ("OPSGENIE_API_KEY", "opsgenie.api_key"),
    ("SERVICENOW_INSTANCE_NAME", "servicenow.instance_name"),
    ("SERVICENOW_USERNAME", "servicenow.username"),
    ("SERVICENOW_PASSWORD", "servicenow.password"),
    ("SMARTSHEET_API_KEY", "smartsheet.api_key"),
    ("PRTG_DEFAULT_INSTANCE_1_URL", "prtg.default_instances.primary.url"),
    ("PRTG_DEFAULT_INSTANCE_1_API_KEY", "prtg.default_instances.primary.api_key"),
    ("PRTG_DEFAULT_INSTANCE_2_URL", "prtg.default_instances.secondary.url"),
    ("PRTG_DEFAULT_INSTANCE_2_API_KEY", "prtg.default_instances.secondary.api_key"),
    ("CUSTOMER_CONFIGS_FILE", "customer_configs_file"),
];

/// CLI args
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "QBRSYNC_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without touching any sheet.
    #[arg(long)]
    pub validate: bool,

    /// Only sync the named customer (repeatable). Defaults to every configured customer.
    #[arg(long = "customer")]
    pub customers: Vec<String>,
}

/// Main configuration.
///
/// All fields have defaults except credentials and the customer list, which must be supplied
/// through the file or the environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Customers to sync, in order
    pub customers: Vec<CustomerConfig>,
    /// Path to a mounted secret file holding the customer JSON array
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_configs_file: Option<PathBuf>,
    /// Maximum number of rows written to any one sheet
    pub max_rows: usize,
    /// How far back alerts and tickets are fetched
    pub lookback_days: i64,
    /// Timeout applied to every outbound HTTP request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Enable OpenTelemetry OTLP export for run traces
    pub enable_otel_export: bool,
    pub opsgenie: OpsgenieConfig,
    pub servicenow: ServiceNowConfig,
    pub smartsheet: SmartsheetConfig,
    pub prtg: PrtgSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            customers: Vec::new(),
            customer_configs_file: None,
            max_rows: 2500,
            lookback_days: 90,
            request_timeout: Duration::from_secs(30),
            enable_otel_export: false,
            opsgenie: OpsgenieConfig::default(),
            servicenow: ServiceNowConfig::default(),
            smartsheet: SmartsheetConfig::default(),
            prtg: PrtgSettings::default(),
        }
    }
}

/// One customer's sources and destination sheets.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CustomerConfig {
    pub customer_name: String,
    /// Alerts carrying any of these tags belong to the customer
    pub opsgenie_tags: Vec<String>,
    /// Tickets raised under any of these companies belong to the customer
    pub servicenow_company_names: Vec<String>,
    pub smartsheet_sheet_ids: SheetIds,
    /// Probe instances to collect alerting sensors from. Empty skips the sensor sheet.
    #[serde(default)]
    pub prtg_instances: Vec<PrtgInstanceConfig>,
}

/// Destination sheet per data category.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct SheetIds {
    pub opsgenie_alerts: u64,
    pub servicenow_tickets: u64,
    pub prtg_alerts: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PrtgInstanceConfig {
    /// Instance URL, or `DEFAULT_INSTANCE_1` / `DEFAULT_INSTANCE_2` for a shared instance
    pub url: PrtgEndpoint,
    /// API token. Ignored for shared instances, which use their own token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Only sensors whose probe name contains one of these are fetched. Empty means all probes.
    #[serde(default)]
    pub probe_substrings: Vec<String>,
}

/// Where a probe instance lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum PrtgEndpoint {
    Literal(Url),
    Default(DefaultInstance),
}

/// The shared probe instances configured once for all customers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultInstance {
    Primary,
    Secondary,
}

impl DefaultInstance {
    pub fn sentinel(self) -> &'static str {
        match self {
            DefaultInstance::Primary => "DEFAULT_INSTANCE_1",
            DefaultInstance::Secondary => "DEFAULT_INSTANCE_2",
        }
    }

    fn from_sentinel(value: &str) -> Option<Self> {
        [DefaultInstance::Primary, DefaultInstance::Secondary]
            .into_iter()
            .find(|instance| instance.sentinel() == value)
    }
}

impl fmt::Display for DefaultInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sentinel())
    }
}

impl TryFrom<String> for PrtgEndpoint {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        if let Some(instance) = DefaultInstance::from_sentinel(&value) {
            return Ok(PrtgEndpoint::Default(instance));
        }
        Url::parse(&value)
            .map(PrtgEndpoint::Literal)
            .map_err(|e| format!("invalid PRTG instance url '{value}': {e}"))
    }
}

impl From<PrtgEndpoint> for String {
    fn from(value: PrtgEndpoint) -> Self {
        match value {
            PrtgEndpoint::Literal(url) => url.to_string(),
            PrtgEndpoint::Default(instance) => instance.sentinel().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpsgenieConfig {
    pub api_key: Option<String>,
    pub base_url: Url,
    /// Alerts requested per page (the API maximum is 100)
    pub page_size: usize,
}

impl Default for OpsgenieConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Url::parse("https://api.opsgenie.com").expect("static url"),
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceNowConfig {
    /// Instance name, as in `https://<instance_name>.service-now.com`
    pub instance_name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Overrides the URL derived from `instance_name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
    /// Records requested per table page
    pub page_size: usize,
}

impl Default for ServiceNowConfig {
    fn default() -> Self {
        Self {
            instance_name: None,
            username: None,
            password: None,
            base_url: None,
            page_size: 1000,
        }
    }
}

impl ServiceNowConfig {
    /// The instance base URL, from `base_url` or derived from `instance_name`.
    pub fn instance_url(&self) -> Result<Url> {
        if let Some(url) = &self.base_url {
            return Ok(url.clone());
        }
        let name = self
            .instance_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::config("ServiceNow instance_name is not configured (set SERVICENOW_INSTANCE_NAME)"))?;
        Url::parse(&format!("https://{name}.service-now.com"))
            .map_err(|e| Error::config(format!("ServiceNow instance name '{name}' does not form a valid URL: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmartsheetConfig {
    pub api_key: Option<String>,
    pub base_url: Url,
    /// Row ids per delete call when clearing a sheet
    pub delete_chunk_size: usize,
}

impl Default for SmartsheetConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Url::parse("https://api.smartsheet.com/2.0").expect("static url"),
            delete_chunk_size: 100,
        }
    }
}

/// Probe-system settings shared by every customer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrtgSettings {
    /// `count` parameter sent with every sensor table request
    pub count: u32,
    pub default_instances: DefaultInstances,
}

impl Default for PrtgSettings {
    fn default() -> Self {
        Self {
            count: 50_000,
            default_instances: DefaultInstances::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultInstances {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<PrtgCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<PrtgCredentials>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PrtgCredentials {
    pub url: Url,
    pub api_key: String,
}

/// A probe instance with its sentinel (if any) replaced by concrete connection details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrtgInstance {
    pub url: Url,
    pub api_key: String,
    pub probe_substrings: Vec<String>,
}

impl PrtgSettings {
    pub fn default_instance(&self, instance: DefaultInstance) -> Option<&PrtgCredentials> {
        match instance {
            DefaultInstance::Primary => self.default_instances.primary.as_ref(),
            DefaultInstance::Secondary => self.default_instances.secondary.as_ref(),
        }
    }

    /// Resolve a configured instance to the URL and token that will actually be queried.
    pub fn resolve(&self, instance: &PrtgInstanceConfig) -> Result<ResolvedPrtgInstance> {
        let (url, api_key) = match &instance.url {
            PrtgEndpoint::Default(default) => {
                let credentials = self
                    .default_instance(*default)
                    .ok_or_else(|| Error::config(format!("PRTG shared instance {default} is referenced but not configured")))?;
                (credentials.url.clone(), credentials.api_key.clone())
            }
            PrtgEndpoint::Literal(url) => {
                let api_key = instance
                    .api_key
                    .clone()
                    .ok_or_else(|| Error::config(format!("PRTG instance {url} has no api_key")))?;
                (url.clone(), api_key)
            }
        };

        Ok(ResolvedPrtgInstance {
            url,
            api_key,
            probe_substrings: instance.probe_substrings.clone(),
        })
    }
}

impl Config {
    /// Load, merge and validate the configuration, restricted to the customers named in `args`.
    pub fn load(args: &Args) -> Result<Self> {
        let mut config: Self = Self::figment(args)?
            .extract()
            .map_err(|e| Error::config(e.to_string()))?;

        if let Some(raw) = env_string(CUSTOMER_CONFIGS_ENV, std::env::var(CUSTOMER_CONFIGS_ENV))? {
            config.customers = parse_customers(&raw, CUSTOMER_CONFIGS_ENV)?;
        }

        if let Some(path) = &config.customer_configs_file {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| Error::config(format!("failed to read customer configs file {}: {e}", path.display())))?;
            config.customers = parse_customers(&raw, &path.display().to_string())?;
        }

        config.select_customers(&args.customers)?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Result<Figment> {
        let mut figment = Figment::new()
            // Base config file (optional, every value can come from the environment)
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("QBRSYNC_").ignore(&["CONFIG"]).split("__"));

        // Conventional credential variable names, always taken as strings
        for &(var, path) in CREDENTIAL_ENV_VARS {
            if let Some(value) = env_string(var, std::env::var(var))? {
                figment = figment.merge(Serialized::default(path, value));
            }
        }

        Ok(figment)
    }

    /// Keep only the named customers, in configuration order.
    fn select_customers(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        if let Some(unknown) = names.iter().find(|name| !self.customers.iter().any(|c| &c.customer_name == *name)) {
            return Err(Error::config(format!("customer '{unknown}' was requested but is not configured")));
        }

        self.customers.retain(|customer| names.contains(&customer.customer_name));
        Ok(())
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<()> {
        if self.customers.is_empty() {
            return Err(Error::config(
                "no customers configured. Set CUSTOMER_CONFIGS, customer_configs_file, or customers in the config file",
            ));
        }

        if self.max_rows == 0 {
            return Err(Error::config("max_rows must be at least 1"));
        }

        if self.lookback_days < 1 {
            return Err(Error::config("lookback_days must be at least 1"));
        }

        if self.opsgenie.page_size == 0 || self.opsgenie.page_size > 100 {
            return Err(Error::config(format!(
                "opsgenie.page_size must be between 1 and 100, got {}",
                self.opsgenie.page_size
            )));
        }

        if self.servicenow.page_size == 0 {
            return Err(Error::config("servicenow.page_size must be at least 1"));
        }

        if !(1..=MAX_DELETE_CHUNK).contains(&self.smartsheet.delete_chunk_size) {
            return Err(Error::config(format!(
                "smartsheet.delete_chunk_size must be between 1 and {MAX_DELETE_CHUNK}, got {}",
                self.smartsheet.delete_chunk_size
            )));
        }

        require(&self.opsgenie.api_key, "Opsgenie api_key (set OPSGENIE_API_KEY)")?;
        require(&self.servicenow.username, "ServiceNow username (set SERVICENOW_USERNAME)")?;
        require(&self.servicenow.password, "ServiceNow password (set SERVICENOW_PASSWORD)")?;
        self.servicenow.instance_url()?;
        require(&self.smartsheet.api_key, "Smartsheet api_key (set SMARTSHEET_API_KEY)")?;

        let mut seen = HashSet::new();
        for customer in &self.customers {
            if !seen.insert(customer.customer_name.as_str()) {
                return Err(Error::config(format!("customer '{}' is configured more than once", customer.customer_name)));
            }

            if customer.opsgenie_tags.is_empty() {
                return Err(Error::config(format!("customer '{}' has no opsgenie_tags", customer.customer_name)));
            }

            if customer.servicenow_company_names.is_empty() {
                return Err(Error::config(format!(
                    "customer '{}' has no servicenow_company_names",
                    customer.customer_name
                )));
            }

            for instance in &customer.prtg_instances {
                if let PrtgEndpoint::Literal(url) = &instance.url
                    && !matches!(url.scheme(), "http" | "https")
                {
                    return Err(Error::config(format!(
                        "customer '{}' has PRTG instance {url} with unsupported scheme",
                        customer.customer_name
                    )));
                }

                self.prtg.resolve(instance).map_err(|e| match e {
                    Error::Config { message } => Error::config(format!("customer '{}': {message}", customer.customer_name)),
                    other => other,
                })?;
            }
        }

        Ok(())
    }
}

fn require(value: &Option<String>, what: &str) -> Result<()> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(Error::config(format!("{what} is not configured"))),
    }
}

/// An unset variable is `None`; one that is set but not UTF-8 is a config error.
fn env_string(name: &str, value: std::result::Result<String, VarError>) -> Result<Option<String>> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(Error::config(format!("{name} is set but is not valid UTF-8"))),
    }
}

fn parse_customers(raw: &str, source: &str) -> Result<Vec<CustomerConfig>> {
    serde_json::from_str(raw).map_err(|e| Error::config(format!("failed to parse customer configs from {source}: {e}")))
}
