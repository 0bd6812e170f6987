use crate::processors::{Effect, TransitionProcessor};
use crate::state::device_state::DeviceState;
use tracing::info;

/// Renders the state as one log line whenever a field actually changes.
pub struct StatusProcessor;

impl StatusProcessor {
    pub fn render(state: &DeviceState) -> String {
        let temperature = match state.temperature {
            Some(t) => format!("{:.1}°C", t),
            None => "-".to_string(),
        };
        format!(
            "door {} for {} | last motion {} | temp {} | lock {} | pir {} | notify {} | auto image {}",
            if state.door_open { "open" } else { "closed" },
            state.last_door_change,
            state.last_motion,
            temperature,
            on_off(state.locked),
            on_off(state.motion_detection_enabled),
            on_off(state.notify_enabled),
            on_off(state.auto_image_enabled),
        )
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

impl TransitionProcessor for StatusProcessor {
    fn handle(&mut self, previous: &DeviceState, next: &DeviceState) -> Option<Effect> {
        if !previous.same_fields(next) {
            info!("[rev {}] {}", next.revision, Self::render(next));
        }
        None
    }
}
