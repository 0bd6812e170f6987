use crate::processors::{Effect, TransitionProcessor};
use crate::state::device_state::DeviceState;

/// Requests a fresh camera image when the door moves while auto-image is on.
pub struct ImageProcessor;

impl TransitionProcessor for ImageProcessor {
    fn handle(&mut self, previous: &DeviceState, next: &DeviceState) -> Option<Effect> {
        (previous.door_open != next.door_open && next.auto_image_enabled).then_some(Effect::RefreshImage)
    }
}
