use crate::error::{ParseError, TransportError};
use crate::garage_api::models::control::Control;
use crate::garage_api::models::response::status_response::StatusSnapshot;
use crate::state::device_state::DeviceState;
use crate::state::store::{StateStore, SubscriptionId};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Handed out for every optimistic toggle; `seq` is the revision at which
/// the speculative state was published.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ToggleTicket {
    pub control: Control,
    pub desired: bool,
    pub seq: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// A new state was published at this revision.
    Applied(u64),
    /// The store already held the resulting value.
    Unchanged,
    /// A newer snapshot or a newer toggle of the same control superseded it.
    Stale,
}

/// The single entry point through which state changes reach the store.
pub struct Reconciler {
    store: StateStore,
    /// Last value of every field as the server stated it.
    confirmed: DeviceState,
    snapshot_revision: u64,
    pending: HashMap<Control, u64>,
    /// Seq of the ticket whose echo `confirmed` currently holds, per control.
    confirmed_seq: HashMap<Control, u64>,
}

impl Reconciler {
    pub fn new(initial: DeviceState) -> Self {
        Self {
            confirmed: initial.clone(),
            store: StateStore::new(initial),
            snapshot_revision: 0,
            pending: HashMap::new(),
            confirmed_seq: HashMap::new(),
        }
    }

    pub fn state(&self) -> &DeviceState {
        self.store.get()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&DeviceState, &DeviceState) + Send + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Last-writer-wins: the snapshot replaces every server field.
    pub fn apply_snapshot(&mut self, snapshot: &StatusSnapshot) -> u64 {
        let next = DeviceState::from_snapshot(snapshot, self.store.get().auto_image_enabled);
        let revision = self.store.set(next);
        self.confirmed = self.store.get().clone();
        self.snapshot_revision = revision;
        self.confirmed_seq.clear();
        if !self.pending.is_empty() {
            debug!(
                "snapshot at revision {} supersedes {} pending toggle(s)",
                revision,
                self.pending.len()
            );
            self.pending.clear();
        }
        revision
    }

    /// Parse and apply a raw push message. On error nothing changes.
    pub fn apply_message(&mut self, raw: &str) -> Result<u64, ParseError> {
        let snapshot: StatusSnapshot =
            serde_json::from_str(raw).map_err(|source| ParseError {
                body: raw.to_string(),
                source,
            })?;
        Ok(self.apply_snapshot(&snapshot))
    }

    /// Publish the flipped value of `control` immediately and return the
    /// ticket the eventual confirmation must present.
    pub fn begin_toggle(&mut self, control: Control) -> ToggleTicket {
        let current = self.store.get();
        let desired = !control.value(current);
        let next = control.with_value(current, desired);
        let seq = self.store.set(next);
        self.pending.insert(control, seq);
        debug!("optimistic {} -> {} at revision {}", control, desired, seq);
        ToggleTicket {
            control,
            desired,
            seq,
        }
    }

    pub fn confirm_toggle(&mut self, ticket: ToggleTicket, confirmed: bool) -> ConfirmOutcome {
        if !self.is_current(&ticket) {
            // a newer toggle of the same control is in flight: remember what
            // the server said so a failure of that toggle reverts to it
            if self.record_confirmed(ticket, confirmed) {
                debug!(
                    "{} confirmed {} by superseded toggle (seq {})",
                    ticket.control, confirmed, ticket.seq
                );
            }
            debug!(
                "discarding stale {} confirmation (seq {}, snapshot revision {})",
                ticket.control, ticket.seq, self.snapshot_revision
            );
            return ConfirmOutcome::Stale;
        }
        self.pending.remove(&ticket.control);
        if confirmed != ticket.desired {
            info!(
                "server set {} to {} instead of {}",
                ticket.control, confirmed, ticket.desired
            );
        }
        self.record_confirmed(ticket, confirmed);
        self.publish_field(ticket.control, confirmed)
    }

    /// Roll the control back to its last confirmed value.
    pub fn fail_toggle(&mut self, ticket: ToggleTicket, error: &TransportError) -> ConfirmOutcome {
        if !self.is_current(&ticket) {
            debug!(
                "ignoring failure of stale {} toggle (seq {}): {}",
                ticket.control, ticket.seq, error
            );
            return ConfirmOutcome::Stale;
        }
        self.pending.remove(&ticket.control);
        let value = ticket.control.value(&self.confirmed);
        warn!("{} toggle failed, reverting to {}: {}", ticket.control, value, error);
        self.publish_field(ticket.control, value)
    }

    /// The auto-image switch is a local preference with no server round trip.
    pub fn set_auto_image(&mut self, enabled: bool) -> ConfirmOutcome {
        self.confirmed.auto_image_enabled = enabled;
        let current = self.store.get();
        if current.auto_image_enabled == enabled {
            return ConfirmOutcome::Unchanged;
        }
        let next = DeviceState {
            auto_image_enabled: enabled,
            ..current.clone()
        };
        ConfirmOutcome::Applied(self.store.set(next))
    }

    pub fn has_pending(&self, control: Control) -> bool {
        self.pending.contains_key(&control)
    }

    fn is_current(&self, ticket: &ToggleTicket) -> bool {
        ticket.seq > self.snapshot_revision && self.pending.get(&ticket.control) == Some(&ticket.seq)
    }

    /// Store an echoed value unless a snapshot or a newer echo already
    /// covers this control.
    fn record_confirmed(&mut self, ticket: ToggleTicket, confirmed: bool) -> bool {
        let newest = self.confirmed_seq.get(&ticket.control).copied().unwrap_or(0);
        if ticket.seq <= self.snapshot_revision || ticket.seq <= newest {
            return false;
        }
        self.confirmed_seq.insert(ticket.control, ticket.seq);
        self.confirmed = ticket.control.with_value(&self.confirmed, confirmed);
        true
    }

    fn publish_field(&mut self, control: Control, value: bool) -> ConfirmOutcome {
        let current = self.store.get();
        if control.value(current) == value {
            return ConfirmOutcome::Unchanged;
        }
        let next = control.with_value(current, value);
        ConfirmOutcome::Applied(self.store.set(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garage_api::models::response::status_response::SnapshotTimes;
    use crate::state::device_state::ServerTime;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn snapshot(mag: bool, locked: bool) -> StatusSnapshot {
        StatusSnapshot {
            mag,
            pir: false,
            locked,
            pir_enabled: true,
            notify_enabled: true,
            temp: Some(40.0),
            times: SnapshotTimes {
                last_mag: ServerTime::Text("1 min".to_string()),
                last_pir: ServerTime::Text("5 min".to_string()),
                now: None,
            },
        }
    }

    fn record_transitions(reconciler: &mut Reconciler) -> Arc<Mutex<Vec<(DeviceState, DeviceState)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        reconciler.subscribe(move |prev, next| sink.lock().unwrap().push((prev.clone(), next.clone())));
        seen
    }

    fn network_down() -> TransportError {
        TransportError::Decode {
            endpoint: "/set_lock".to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn optimistic_toggle_then_matching_confirmation_is_one_transition() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(false, false));
        let seen = record_transitions(&mut reconciler);

        let ticket = reconciler.begin_toggle(Control::Lock);
        assert!(ticket.desired);
        assert!(reconciler.state().locked);

        assert_eq!(reconciler.confirm_toggle(ticket, true), ConfirmOutcome::Unchanged);
        assert!(reconciler.state().locked);

        let seen = seen.lock().unwrap();
        let meaningful = seen.iter().filter(|(prev, next)| !prev.same_fields(next)).count();
        assert_eq!(meaningful, 1);
    }

    #[test]
    fn rejected_lock_reverts_to_server_value() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(false, false));

        let ticket = reconciler.begin_toggle(Control::Lock);
        assert!(reconciler.state().locked);

        let outcome = reconciler.confirm_toggle(ticket, false);
        assert!(matches!(outcome, ConfirmOutcome::Applied(_)));
        assert!(!reconciler.state().locked);
        assert!(!reconciler.has_pending(Control::Lock));
    }

    #[test]
    fn late_confirmation_loses_to_newer_snapshot() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(false, false));

        let first = reconciler.begin_toggle(Control::Lock);
        let second = reconciler.begin_toggle(Control::Lock);
        assert!(!reconciler.state().locked);

        // push snapshot overtakes both requests
        reconciler.apply_snapshot(&snapshot(false, true));
        assert!(reconciler.state().locked);

        assert_eq!(reconciler.confirm_toggle(first, false), ConfirmOutcome::Stale);
        assert_eq!(reconciler.confirm_toggle(second, false), ConfirmOutcome::Stale);
        assert!(reconciler.state().locked);
    }

    #[test]
    fn superseded_toggle_of_same_control_is_stale() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(false, false));

        let first = reconciler.begin_toggle(Control::Lock);
        let second = reconciler.begin_toggle(Control::Lock);

        assert_eq!(reconciler.confirm_toggle(first, true), ConfirmOutcome::Stale);
        assert!(!reconciler.state().locked);
        assert_eq!(reconciler.confirm_toggle(second, false), ConfirmOutcome::Unchanged);
    }

    #[test]
    fn failure_after_superseded_echo_reverts_to_that_echo() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(false, false));

        let first = reconciler.begin_toggle(Control::Lock);
        let second = reconciler.begin_toggle(Control::Lock);
        assert!(!reconciler.state().locked);

        assert_eq!(reconciler.confirm_toggle(first, true), ConfirmOutcome::Stale);
        assert!(!reconciler.state().locked);

        let outcome = reconciler.fail_toggle(second, &network_down());
        assert!(matches!(outcome, ConfirmOutcome::Applied(_)));
        assert!(reconciler.state().locked);
    }

    #[test]
    fn late_older_echo_does_not_replace_newer_confirmation() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(false, false));

        let first = reconciler.begin_toggle(Control::Lock);
        let second = reconciler.begin_toggle(Control::Lock);
        assert_eq!(reconciler.confirm_toggle(second, false), ConfirmOutcome::Unchanged);
        assert_eq!(reconciler.confirm_toggle(first, true), ConfirmOutcome::Stale);

        let third = reconciler.begin_toggle(Control::Lock);
        assert!(reconciler.state().locked);
        reconciler.fail_toggle(third, &network_down());
        assert!(!reconciler.state().locked);
    }

    #[test]
    fn unrelated_toggle_does_not_invalidate_confirmation() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(false, false));

        let lock = reconciler.begin_toggle(Control::Lock);
        let pir = reconciler.begin_toggle(Control::MotionDetection);
        assert!(!reconciler.state().motion_detection_enabled);

        assert_eq!(reconciler.confirm_toggle(lock, false), ConfirmOutcome::Applied(4));
        assert!(!reconciler.state().locked);
        assert!(!reconciler.state().motion_detection_enabled);

        assert_eq!(reconciler.confirm_toggle(pir, false), ConfirmOutcome::Unchanged);
    }

    #[test]
    fn failed_toggle_rolls_back_to_last_confirmed_value() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(false, false));

        let ticket = reconciler.begin_toggle(Control::Notify);
        assert!(!reconciler.state().notify_enabled);

        let outcome = reconciler.fail_toggle(ticket, &network_down());
        assert!(matches!(outcome, ConfirmOutcome::Applied(_)));
        assert!(reconciler.state().notify_enabled);
    }

    #[test]
    fn rollback_keeps_values_confirmed_since_the_snapshot() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(false, false));

        let first = reconciler.begin_toggle(Control::Lock);
        reconciler.confirm_toggle(first, true);

        let second = reconciler.begin_toggle(Control::Lock);
        assert!(!reconciler.state().locked);
        reconciler.fail_toggle(second, &network_down());
        assert!(reconciler.state().locked);
    }

    #[test]
    fn failure_after_snapshot_is_ignored() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(false, false));

        let ticket = reconciler.begin_toggle(Control::Lock);
        reconciler.apply_snapshot(&snapshot(false, true));

        assert_eq!(reconciler.fail_toggle(ticket, &network_down()), ConfirmOutcome::Stale);
        assert!(reconciler.state().locked);
    }

    #[test]
    fn malformed_message_leaves_state_untouched() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        reconciler.apply_snapshot(&snapshot(true, true));
        let before = reconciler.state().clone();
        let seen = record_transitions(&mut reconciler);

        assert!(reconciler.apply_message("{not json").is_err());
        assert!(reconciler.apply_message(r#"{"mag":true}"#).is_err());

        assert_eq!(*reconciler.state(), before);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn auto_image_survives_snapshots() {
        let mut reconciler = Reconciler::new(DeviceState::default());
        assert!(matches!(reconciler.set_auto_image(true), ConfirmOutcome::Applied(_)));
        assert_eq!(reconciler.set_auto_image(true), ConfirmOutcome::Unchanged);

        reconciler.apply_snapshot(&snapshot(true, false));
        assert!(reconciler.state().auto_image_enabled);
    }

    fn arb_snapshot() -> impl Strategy<Value = StatusSnapshot> {
        (
            any::<[bool; 5]>(),
            proptest::option::of((-40i32..160).prop_map(|half| half as f64 / 2.0)),
            0u32..3600,
            0u32..3600,
        )
            .prop_map(|(flags, temp, last_mag, last_pir)| StatusSnapshot {
                mag: flags[0],
                pir: flags[1],
                locked: flags[2],
                pir_enabled: flags[3],
                notify_enabled: flags[4],
                temp,
                times: SnapshotTimes {
                    last_mag: ServerTime::Text(format!("{} sec", last_mag)),
                    last_pir: ServerTime::Seconds(last_pir as f64),
                    now: None,
                },
            })
    }

    proptest! {
        #[test]
        fn store_equals_last_snapshot(
            inputs in proptest::collection::vec((arb_snapshot(), proptest::option::of(0usize..3)), 1..24)
        ) {
            let mut reconciler = Reconciler::new(DeviceState::default());
            let mut last_revision = 0;
            for (snapshot, toggle) in &inputs {
                if let Some(index) = toggle {
                    reconciler.begin_toggle(Control::ALL[*index]);
                }
                let revision = reconciler.apply_message(&serde_json::to_string(snapshot).unwrap()).unwrap();
                prop_assert!(revision > last_revision);
                last_revision = revision;
                prop_assert!(reconciler.state().same_fields(&DeviceState::from_snapshot(snapshot, false)));
            }
        }
    }
}
