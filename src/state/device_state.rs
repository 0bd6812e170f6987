use crate::garage_api::models::response::status_response::StatusSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Elapsed-time value computed by the server (`"6 min"` or plain seconds).
/// The client only displays it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ServerTime {
    Text(String),
    Seconds(f64),
}

impl Default for ServerTime {
    fn default() -> Self {
        ServerTime::Text("-".to_string())
    }
}

impl Display for ServerTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerTime::Text(text) => write!(f, "{}", text),
            ServerTime::Seconds(seconds) => write!(f, "{} sec", seconds),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DeviceState {
    pub door_open: bool,
    pub motion: bool,
    pub last_door_change: ServerTime,
    pub last_motion: ServerTime,
    pub temperature: Option<f64>,
    pub locked: bool,
    pub motion_detection_enabled: bool,
    pub notify_enabled: bool,
    /// Client-side preference, never part of a server snapshot.
    pub auto_image_enabled: bool,
    pub revision: u64,
}

impl DeviceState {
    /// Replace every server-owned field with the snapshot's, keeping the local
    /// auto-image preference. The revision is left for the store to stamp.
    pub fn from_snapshot(snapshot: &StatusSnapshot, auto_image_enabled: bool) -> Self {
        Self {
            door_open: snapshot.mag,
            motion: snapshot.pir,
            last_door_change: snapshot.times.last_mag.clone(),
            last_motion: snapshot.times.last_pir.clone(),
            temperature: snapshot.temp,
            locked: snapshot.locked,
            motion_detection_enabled: snapshot.pir_enabled,
            notify_enabled: snapshot.notify_enabled,
            auto_image_enabled,
            revision: 0,
        }
    }

    /// Field-wise equality ignoring `revision`.
    pub fn same_fields(&self, other: &DeviceState) -> bool {
        DeviceState {
            revision: other.revision,
            ..self.clone()
        } == *other
    }
}
