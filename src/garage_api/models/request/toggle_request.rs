use crate::garage_api::models::control::Control;
use serde::{Deserialize, Serialize};

/// Body of a `/set_*` request. The lock endpoint names its field `locked`,
/// the feature switches use `enabled`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ToggleRequest {
    Lock { locked: bool },
    Enable { enabled: bool },
}

impl ToggleRequest {
    pub fn new(control: Control, desired: bool) -> Self {
        match control {
            Control::Lock => ToggleRequest::Lock { locked: desired },
            Control::MotionDetection | Control::Notify => ToggleRequest::Enable { enabled: desired },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_wire_bodies() {
        assert_eq!(
            serde_json::to_string(&ToggleRequest::new(Control::Lock, true)).unwrap(),
            r#"{"locked":true}"#
        );
        assert_eq!(
            serde_json::to_string(&ToggleRequest::new(Control::MotionDetection, false)).unwrap(),
            r#"{"enabled":false}"#
        );
        assert_eq!(
            serde_json::to_string(&ToggleRequest::new(Control::Notify, true)).unwrap(),
            r#"{"enabled":true}"#
        );
    }
}
