use crate::reconciler::Reconciler;
use crate::state::device_state::DeviceState;
use crate::state::store::SubscriptionId;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

pub mod image_processor;
pub mod notification_processor;
pub mod status_processor;

/// Side effects the session has to carry out after a state replacement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Effect {
    RefreshImage,
}

/// Trait for a processor that reacts to a `(previous, next)` state pair
pub trait TransitionProcessor: Send + 'static {
    fn handle(&mut self, previous: &DeviceState, next: &DeviceState) -> Option<Effect>;
}

pub struct EffectDispatcher {
    processors: Vec<Box<dyn TransitionProcessor>>,
    effects: UnboundedSender<Effect>,
}

impl EffectDispatcher {
    pub fn new(effects: UnboundedSender<Effect>) -> Self {
        Self {
            processors: Vec::new(),
            effects,
        }
    }

    pub fn with<P: TransitionProcessor>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn dispatch(&mut self, previous: &DeviceState, next: &DeviceState) {
        for processor in self.processors.iter_mut() {
            if let Some(effect) = processor.handle(previous, next)
                && self.effects.send(effect).is_err()
            {
                warn!("Dropping {:?}, effect receiver is gone", effect);
            }
        }
    }

    /// Subscribe to the reconciler's store; the dispatcher lives as long as
    /// the subscription.
    pub fn attach(mut self, reconciler: &mut Reconciler) -> SubscriptionId {
        reconciler.subscribe(move |previous, next| self.dispatch(previous, next))
    }
}
