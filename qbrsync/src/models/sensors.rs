use serde::{Deserialize, Serialize};

/// PRTG status code for a sensor that is up. Only sensors in any other state are fetched.
pub const SENSOR_STATUS_UP: i64 = 3;

/// A PRTG sensor that is not up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub name: String,
    pub parent_id: i64,
    /// Human readable downtime, e.g. "2 d 4 h"
    pub downtime_since: String,
    pub status: String,
    pub status_raw: i64,
    pub probe: String,
    pub group: String,
    pub device: String,
    pub message: String,
}

impl Sensor {
    /// `probe > group > device`, the location shown on the sensor sheet.
    pub fn path(&self) -> String {
        format!("{} > {} > {}", self.probe, self.group, self.device)
    }
}
