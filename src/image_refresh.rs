use crate::error::ImageLoadError;
use tracing::{debug, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImagePhase {
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Explicit user request; the only way out of `Failed`.
    Click,
    Timer,
    DoorChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageState {
    pub uri: String,
    pub phase: ImagePhase,
    pub generation: u64,
}

/// A load the caller has to perform and report back with `finish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLoad {
    pub uri: String,
    pub generation: u64,
}

/// Camera snapshot lifecycle, independent of the device state.
pub struct ImageRefreshController {
    base_uri: String,
    state: ImageState,
}

impl ImageRefreshController {
    /// Starts in `Loading` with the first load already issued.
    pub fn new(base_uri: &str, now_ms: i64) -> (Self, ImageLoad) {
        let uri = Self::cache_busted(base_uri, now_ms);
        let controller = Self {
            base_uri: base_uri.to_string(),
            state: ImageState {
                uri: uri.clone(),
                phase: ImagePhase::Loading,
                generation: 1,
            },
        };
        (controller, ImageLoad { uri, generation: 1 })
    }

    pub fn state(&self) -> &ImageState {
        &self.state
    }

    pub fn cache_busted(base_uri: &str, now_ms: i64) -> String {
        let separator = if base_uri.contains('?') { '&' } else { '?' };
        format!("{}{}{}", base_uri, separator, now_ms)
    }

    /// Returns the load to issue, or `None` when the trigger is suppressed.
    pub fn request(
        &mut self,
        trigger: RefreshTrigger,
        auto_image_enabled: bool,
        now_ms: i64,
    ) -> Option<ImageLoad> {
        let allowed = match trigger {
            RefreshTrigger::Click => true,
            RefreshTrigger::Timer => auto_image_enabled && self.state.phase == ImagePhase::Loaded,
            RefreshTrigger::DoorChange => self.state.phase != ImagePhase::Failed,
        };
        if !allowed {
            debug!("{:?} refresh suppressed in {:?}", trigger, self.state.phase);
            return None;
        }

        self.state = ImageState {
            uri: Self::cache_busted(&self.base_uri, now_ms),
            phase: ImagePhase::Loading,
            generation: self.state.generation + 1,
        };
        Some(ImageLoad {
            uri: self.state.uri.clone(),
            generation: self.state.generation,
        })
    }

    /// Whether `generation` is the load currently awaited.
    pub fn is_loading(&self, generation: u64) -> bool {
        generation == self.state.generation && self.state.phase == ImagePhase::Loading
    }

    /// Record the outcome of a load. Results of superseded loads are ignored;
    /// returns whether the result was applied.
    pub fn finish(&mut self, generation: u64, result: Result<(), &ImageLoadError>) -> bool {
        if !self.is_loading(generation) {
            debug!(
                "ignoring image result for generation {} (current {})",
                generation, self.state.generation
            );
            return false;
        }
        self.state.phase = match result {
            Ok(()) => ImagePhase::Loaded,
            Err(e) => {
                warn!("cannot get image from camera: {}", e);
                ImagePhase::Failed
            }
        };
        true
    }
}
