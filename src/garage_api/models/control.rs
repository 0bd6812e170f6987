use crate::state::device_state::DeviceState;
use std::fmt::{Display, Formatter};

/// A boolean control the server confirms with an echoed value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Control {
    Lock,
    MotionDetection,
    Notify,
}

impl Control {
    pub const ALL: [Control; 3] = [Control::Lock, Control::MotionDetection, Control::Notify];

    pub fn endpoint(&self) -> &'static str {
        match self {
            Control::Lock => "/set_lock",
            Control::MotionDetection => "/set_pir",
            Control::Notify => "/set_notify",
        }
    }

    pub fn value(&self, state: &DeviceState) -> bool {
        match self {
            Control::Lock => state.locked,
            Control::MotionDetection => state.motion_detection_enabled,
            Control::Notify => state.notify_enabled,
        }
    }

    /// Copy of `state` with only this control's field replaced.
    pub fn with_value(&self, state: &DeviceState, value: bool) -> DeviceState {
        let mut next = state.clone();
        match self {
            Control::Lock => next.locked = value,
            Control::MotionDetection => next.motion_detection_enabled = value,
            Control::Notify => next.notify_enabled = value,
        }
        next
    }
}

impl Display for Control {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Control::Lock => "lock",
            Control::MotionDetection => "pir",
            Control::Notify => "notify",
        };
        write!(f, "{}", name)
    }
}
