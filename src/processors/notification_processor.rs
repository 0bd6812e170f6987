use crate::notifier::{NotificationPermission, Notifier};
use crate::processors::{Effect, TransitionProcessor};
use crate::state::device_state::DeviceState;
use std::sync::Arc;
use tracing::debug;

pub struct NotificationProcessor {
    notifier: Arc<dyn Notifier>,
    permission: NotificationPermission,
}

impl NotificationProcessor {
    pub fn new(notifier: Arc<dyn Notifier>, permission: NotificationPermission) -> Self {
        Self {
            notifier,
            permission,
        }
    }

    pub fn title(door_open: bool) -> &'static str {
        if door_open {
            "Garage Open!"
        } else {
            "Garage Closed!"
        }
    }
}

impl TransitionProcessor for NotificationProcessor {
    fn handle(&mut self, previous: &DeviceState, next: &DeviceState) -> Option<Effect> {
        if previous.door_open == next.door_open || !next.notify_enabled {
            return None;
        }
        if !self.permission.is_granted() {
            debug!("door changed but notification permission is {:?}", self.permission);
            return None;
        }
        let body = format!("last change: {}", next.last_door_change);
        self.notifier.notify(Self::title(next.door_open), &body);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingNotifier {
        titles: Mutex<Vec<String>>,
    }

    impl Notifier for CountingNotifier {
        fn notify(&self, title: &str, _body: &str) {
            self.titles.lock().unwrap().push(title.to_string());
        }
    }

    fn state(door_open: bool, notify_enabled: bool) -> DeviceState {
        DeviceState {
            door_open,
            notify_enabled,
            ..Default::default()
        }
    }

    #[test]
    fn fires_on_each_edge() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut processor = NotificationProcessor::new(notifier.clone(), NotificationPermission::Granted);

        processor.handle(&state(false, true), &state(true, true));
        processor.handle(&state(true, true), &state(true, true));
        processor.handle(&state(true, true), &state(false, true));

        assert_eq!(
            *notifier.titles.lock().unwrap(),
            vec!["Garage Open!".to_string(), "Garage Closed!".to_string()]
        );
    }

    #[test]
    fn silent_when_disabled_or_not_permitted() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut processor = NotificationProcessor::new(notifier.clone(), NotificationPermission::Granted);
        processor.handle(&state(false, true), &state(true, false));

        let mut denied = NotificationProcessor::new(notifier.clone(), NotificationPermission::Denied);
        denied.handle(&state(false, true), &state(true, true));

        let mut undecided = NotificationProcessor::new(notifier.clone(), NotificationPermission::Default);
        undecided.handle(&state(false, true), &state(true, true));

        assert!(notifier.titles.lock().unwrap().is_empty());
    }
}
