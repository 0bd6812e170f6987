use crate::state::device_state::ServerTime;
use serde::{Deserialize, Serialize};

/// Complete device snapshot, as pushed on `/stream` and returned by `/status`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub mag: bool,
    #[serde(default)]
    pub pir: bool,
    pub locked: bool,
    pub pir_enabled: bool,
    pub notify_enabled: bool,
    pub temp: Option<f64>,
    pub times: SnapshotTimes,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SnapshotTimes {
    pub last_mag: ServerTime,
    pub last_pir: ServerTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<f64>,
}
