//! PRTG sensor source. Every configured probe instance is queried for sensors that are not up.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{build_http_client, endpoint, send_json};
use crate::config::{PrtgInstanceConfig, PrtgSettings, ResolvedPrtgInstance};
use crate::errors::Result;
use crate::models::Sensor;
use crate::models::sensors::SENSOR_STATUS_UP;

pub const PRTG: &str = "PRTG";

const SENSOR_COLUMNS: &str = "name,parentid,downtimesince,status,probe,group,device,message";

#[derive(Debug, Deserialize)]
struct SensorTable {
    #[serde(default)]
    sensors: Vec<RawSensor>,
}

/// One row of the sensor table.
///
/// Columns the request did not ask for (such as `status_raw`) are still returned by PRTG as
/// companions of the requested ones; `message_raw` is the message without HTML markup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawSensor {
    name: String,
    parentid: i64,
    downtimesince: String,
    status: String,
    status_raw: i64,
    probe: String,
    group: String,
    device: String,
    message_raw: String,
}

impl From<RawSensor> for Sensor {
    fn from(raw: RawSensor) -> Self {
        Sensor {
            name: raw.name,
            parent_id: raw.parentid,
            downtime_since: raw.downtimesince,
            status: raw.status,
            status_raw: raw.status_raw,
            probe: raw.probe,
            group: raw.group,
            device: raw.device,
            message: raw.message_raw,
        }
    }
}

/// Access to the table API of PRTG probe instances.
#[async_trait]
pub trait SensorApi: Send + Sync {
    /// Sensors on `instance` that are not up, filtered by its probe substrings.
    async fn list_alerting_sensors(&self, instance: &ResolvedPrtgInstance, count: u32) -> Result<Vec<Sensor>>;
}

/// The concrete implementation of `SensorApi`. One client serves every instance, since the
/// token travels with each request.
pub struct PrtgClient {
    client: Client,
}

impl PrtgClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(request_timeout)?,
        })
    }
}

#[async_trait]
impl SensorApi for PrtgClient {
    #[instrument(skip(self, instance), fields(url = %instance.url))]
    async fn list_alerting_sensors(&self, instance: &ResolvedPrtgInstance, count: u32) -> Result<Vec<Sensor>> {
        let mut url = endpoint(&instance.url, "api/table.json", PRTG)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("content", "sensors")
                .append_pair("columns", SENSOR_COLUMNS)
                .append_pair("filter_status", &format!("@neq({SENSOR_STATUS_UP})"))
                .append_pair("output", "json")
                .append_pair("count", &count.to_string());
            for substring in &instance.probe_substrings {
                query.append_pair("filter_probe", &format!("@sub({substring})"));
            }
            query.append_pair("apitoken", &instance.api_key);
        }

        let table: SensorTable = send_json(self.client.get(url), PRTG, "list sensors").await?;
        debug!("{} sensors returned", table.sensors.len());

        Ok(table.sensors.into_iter().map(Sensor::from).collect())
    }
}

/// Collect alerting sensors from every instance, in configuration order, capped at `max_rows`.
#[instrument(skip(api, settings, instances), fields(instances = instances.len()))]
pub async fn fetch_alerting_sensors<S: SensorApi + ?Sized>(
    api: &S,
    settings: &PrtgSettings,
    instances: &[PrtgInstanceConfig],
    max_rows: usize,
) -> Result<Vec<Sensor>> {
    info!("Gathering PRTG sensor data...");

    let mut sensors = Vec::new();
    for instance in instances {
        let resolved = settings.resolve(instance)?;
        debug!("Querying PRTG instance {}", resolved.url);
        sensors.extend(api.list_alerting_sensors(&resolved, settings.count).await?);
    }
    sensors.truncate(max_rows);

    info!("PRTG sensor data gathered! ({} sensors)", sensors.len());
    Ok(sensors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefaultInstance, DefaultInstances, PrtgCredentials, PrtgEndpoint};
    use crate::errors::Error;
    use crate::test_utils::{FakeSensorApi, install_crypto_provider, sensor};
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn instance(url: PrtgEndpoint, api_key: Option<&str>, substrings: &[&str]) -> PrtgInstanceConfig {
        PrtgInstanceConfig {
            url,
            api_key: api_key.map(str::to_string),
            probe_substrings: substrings.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn settings(primary: &str, secondary: &str) -> PrtgSettings {
        PrtgSettings {
            count: 50_000,
            default_instances: DefaultInstances {
                primary: Some(PrtgCredentials {
                    url: Url::parse(primary).unwrap(),
                    api_key: "primary-token".to_string(),
                }),
                secondary: Some(PrtgCredentials {
                    url: Url::parse(secondary).unwrap(),
                    api_key: "secondary-token".to_string(),
                }),
            },
        }
    }

    fn sensor_body(names: &[&str]) -> serde_json::Value {
        let sensors: Vec<_> = names
            .iter()
            .map(|name| {
                serde_json::json!({
                    "name": name,
                    "parentid": 2041,
                    "downtimesince": "3 h 12 m",
                    "status": "Down",
                    "status_raw": 5,
                    "probe": "Acme Probe",
                    "group": "Core",
                    "device": "core-sw-01",
                    "message": "<div class=\"status\">Destination unreachable</div>",
                    "message_raw": "Destination unreachable"
                })
            })
            .collect();
        serde_json::json!({ "prtg-version": "24.1.92", "treesize": sensors.len(), "sensors": sensors })
    }

    #[tokio::test]
    async fn test_default_instances_resolve_to_their_endpoints() {
        install_crypto_provider();
        let first = MockServer::start().await;
        let second = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/table.json"))
            .and(query_param("apitoken", "primary-token"))
            .and(query_param("filter_probe", "@sub(Acme)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sensor_body(&["Ping", "HTTPS"])))
            .expect(1)
            .mount(&first)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/table.json"))
            .and(query_param("apitoken", "secondary-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sensor_body(&["Disk Free"])))
            .expect(1)
            .mount(&second)
            .await;

        let instances = vec![
            // The descriptor's own key is ignored for sentinels
            instance(PrtgEndpoint::Default(DefaultInstance::Primary), Some("ignored"), &["Acme"]),
            instance(PrtgEndpoint::Default(DefaultInstance::Secondary), None, &["Acme"]),
        ];
        let client = PrtgClient::new(Duration::from_secs(5)).unwrap();

        let sensors = fetch_alerting_sensors(&client, &settings(&first.uri(), &second.uri()), &instances, 2500)
            .await
            .unwrap();

        let names: Vec<_> = sensors.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Ping", "HTTPS", "Disk Free"]);
        assert_eq!(sensors[0].message, "Destination unreachable");
        assert_eq!(sensors[0].status_raw, 5);
    }

    #[tokio::test]
    async fn test_request_parameters() {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/table.json"))
            .and(query_param("content", "sensors"))
            .and(query_param("columns", SENSOR_COLUMNS))
            .and(query_param("filter_status", "@neq(3)"))
            .and(query_param("output", "json"))
            .and(query_param("count", "50000"))
            .and(query_param("apitoken", "literal-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sensor_body(&[])))
            .expect(1)
            .mount(&server)
            .await;

        let client = PrtgClient::new(Duration::from_secs(5)).unwrap();
        let resolved = ResolvedPrtgInstance {
            url: Url::parse(&server.uri()).unwrap(),
            api_key: "literal-token".to_string(),
            probe_substrings: vec![],
        };

        let sensors = client.list_alerting_sensors(&resolved, 50_000).await.unwrap();
        assert!(sensors.is_empty());

        // No probe filter at all when the substring list is empty
        let requests: Vec<Request> = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].url.query_pairs().any(|(key, _)| key == "filter_probe"));
    }

    #[tokio::test]
    async fn test_one_filter_per_probe_substring() {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sensor_body(&["Ping"])))
            .mount(&server)
            .await;

        let client = PrtgClient::new(Duration::from_secs(5)).unwrap();
        let resolved = ResolvedPrtgInstance {
            url: Url::parse(&server.uri()).unwrap(),
            api_key: "t".to_string(),
            probe_substrings: vec!["Acme".to_string(), "ACME-DR".to_string()],
        };
        client.list_alerting_sensors(&resolved, 10).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let filters: Vec<String> = requests[0]
            .url
            .query_pairs()
            .filter(|(key, _)| key == "filter_probe")
            .map(|(_, value)| value.into_owned())
            .collect();
        assert_eq!(filters, vec!["@sub(Acme)", "@sub(ACME-DR)"]);
    }

    #[tokio::test]
    async fn test_fetch_concatenates_and_truncates() {
        let api = FakeSensorApi::default()
            .with_instance("https://prtg-a.example/", vec![sensor("a1"), sensor("a2"), sensor("a3")])
            .with_instance("https://prtg-b.example/", vec![sensor("b1"), sensor("b2")]);
        let instances = vec![
            instance(PrtgEndpoint::Literal(Url::parse("https://prtg-a.example").unwrap()), Some("ka"), &[]),
            instance(PrtgEndpoint::Literal(Url::parse("https://prtg-b.example").unwrap()), Some("kb"), &[]),
        ];

        let sensors = fetch_alerting_sensors(&api, &PrtgSettings::default(), &instances, 4).await.unwrap();

        let names: Vec<_> = sensors.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a1", "a2", "a3", "b1"]);
        assert_eq!(api.queried_keys(), vec!["ka", "kb"]);
    }

    #[tokio::test]
    async fn test_unconfigured_default_instance_is_config_error() {
        let api = FakeSensorApi::default();
        let instances = vec![instance(PrtgEndpoint::Default(DefaultInstance::Secondary), None, &[])];

        let err = fetch_alerting_sensors(&api, &PrtgSettings::default(), &instances, 2500)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config { .. }));
        assert!(api.queried_keys().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        install_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let client = PrtgClient::new(Duration::from_secs(5)).unwrap();
        let resolved = ResolvedPrtgInstance {
            url: Url::parse(&server.uri()).unwrap(),
            api_key: "bad".to_string(),
            probe_substrings: vec![],
        };
        let err = client.list_alerting_sensors(&resolved, 10).await.unwrap_err();
        assert!(matches!(err, Error::Upstream { service: PRTG, .. }));
    }
}
