//! Timer bridge: the state machine between the observed timer and the overlay.
//!
//! The bridge owns the overlay controls, classifies raw mutation records of
//! the timer toggle into RUNNING/STOPPED transitions and forwards overlay
//! clicks and title changes to the handlers registered on it.
//!
//! Status is derived from the *previous* label of the toggle: a toggle that
//! used to read "Start time entry" has just been started. Records with any
//! other previous label are ignored.

use crate::surface::Surface;
use crate::types::{ControlKind, MutationKind, MutationRecord, MutationTarget, ObservedStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Handler for a click on an overlay control
pub type ControlHandler = Arc<dyn Fn(&Arc<TimerBridge>) + Send + Sync>;

/// Handler for a status transition (and the initial status)
pub type StatusHandler = Arc<dyn Fn(&Arc<TimerBridge>, ObservedStatus) + Send + Sync>;

/// Handler for a change of the entry title
pub type TitleHandler = Arc<dyn Fn(&Arc<TimerBridge>) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    controls: HashMap<ControlKind, ControlHandler>,
    /// Subscription on the timer toggle's attributes
    status: Option<StatusHandler>,
    /// Subscription on the title input's attributes
    title: Option<TitleHandler>,
}

/// Bridge between the observed timer and the overlay controls
pub struct TimerBridge {
    surface: Arc<dyn Surface>,
    listeners: Mutex<Listeners>,
    status: Mutex<Option<ObservedStatus>>,
}

impl TimerBridge {
    /// Build the overlay on an attached surface.
    ///
    /// Creates every action control next to the timer and hides the page's
    /// own start/stop button, which the overlay replaces.
    pub fn create(surface: Arc<dyn Surface>) -> Arc<Self> {
        for control in ControlKind::ALL {
            surface.create_control(control);
        }
        surface.hide_timer_toggle();

        Arc::new(Self {
            surface,
            listeners: Mutex::new(Listeners::default()),
            status: Mutex::new(None),
        })
    }

    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    /// Last status seen, `None` before a status listener is registered
    pub fn status(&self) -> Option<ObservedStatus> {
        self.status.lock().ok().and_then(|s| *s)
    }

    /// Whether the title input has no value attribute
    pub fn is_title_empty(&self) -> bool {
        !self.surface.has_title_value()
    }

    pub fn title(&self) -> String {
        self.surface.entry_title()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.surface.entry_seconds()
    }

    pub fn click_timer_toggle(&self) {
        self.surface.click_timer_toggle();
    }

    pub fn delete_entry(&self) {
        self.surface.click_delete_entry();
    }

    /// Show and hide the action controls for `status`
    pub fn update_visibility(&self, status: ObservedStatus) {
        for control in ControlKind::ALL {
            self.surface
                .set_control_visible(control, control.visible_when(status));
        }
    }

    /// Register the handler for clicks on `control`
    pub fn set_control_listener<F>(self: &Arc<Self>, control: ControlKind, handler: F) -> &Arc<Self>
    where
        F: Fn(&Arc<TimerBridge>) + Send + Sync + 'static,
    {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.controls.insert(control, Arc::new(handler));
        }
        self
    }

    /// Subscribe to status transitions.
    ///
    /// The handler is invoked once right away with the status the timer has
    /// now, then on every recognized transition.
    pub fn set_status_listener<F>(self: &Arc<Self>, handler: F) -> &Arc<Self>
    where
        F: Fn(&Arc<TimerBridge>, ObservedStatus) + Send + Sync + 'static,
    {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.status = Some(Arc::new(handler));
        }

        let initial = if self.surface.is_counting() {
            ObservedStatus::Running
        } else {
            ObservedStatus::Stopped
        };
        self.apply_status(initial);
        self
    }

    /// Subscribe to changes of the title input
    pub fn set_title_listener<F>(self: &Arc<Self>, handler: F) -> &Arc<Self>
    where
        F: Fn(&Arc<TimerBridge>) + Send + Sync + 'static,
    {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.title = Some(Arc::new(handler));
        }
        self
    }

    /// An overlay control was clicked
    pub fn press(self: &Arc<Self>, control: ControlKind) {
        let handler = self
            .listeners
            .lock()
            .ok()
            .and_then(|l| l.controls.get(&control).cloned());

        match handler {
            Some(handler) => {
                debug!("{} button clicked", control.as_str());
                handler(self);
            }
            None => debug!("No listener for {} button", control.as_str()),
        }
    }

    /// Feed a batch of mutation records observed on `target`.
    ///
    /// Returns the status transition the batch produced, if any.
    pub fn handle_mutations(
        self: &Arc<Self>,
        target: MutationTarget,
        records: &[MutationRecord],
    ) -> Option<ObservedStatus> {
        match target {
            MutationTarget::TimerToggle => self.handle_toggle_mutations(records),
            MutationTarget::TitleInput => {
                self.handle_title_mutations(records);
                None
            }
            MutationTarget::Container => None,
        }
    }

    fn handle_toggle_mutations(self: &Arc<Self>, records: &[MutationRecord]) -> Option<ObservedStatus> {
        let subscribed = self
            .listeners
            .lock()
            .map(|l| l.status.is_some())
            .unwrap_or(false);
        if !subscribed {
            return None;
        }

        // The last record of a batch describes where the toggle ended up
        let record = records.last()?;
        if record.kind != MutationKind::Attributes {
            return None;
        }

        let status = classify(record)?;
        debug!("Status updated -> {}", status.as_str());
        self.apply_status(status);
        Some(status)
    }

    fn handle_title_mutations(self: &Arc<Self>, records: &[MutationRecord]) {
        if !records.iter().any(|r| r.kind == MutationKind::Attributes) {
            return;
        }

        let handler = self.listeners.lock().ok().and_then(|l| l.title.clone());
        if let Some(handler) = handler {
            trace!("Title input changed");
            handler(self);
        }
    }

    fn apply_status(self: &Arc<Self>, status: ObservedStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = Some(status);
        }
        self.update_visibility(status);

        let handler = self.listeners.lock().ok().and_then(|l| l.status.clone());
        if let Some(handler) = handler {
            handler(self, status);
        }
    }
}

/// Status transition named by a toggle attribute record, if any
pub fn classify(record: &MutationRecord) -> Option<ObservedStatus> {
    ObservedStatus::from_previous_label(record.old_value.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::SurfaceCommand;
    use crate::surface::NativeSurface;
    use crate::types::{SurfaceSnapshot, START_TIME_ENTRY, STOP_TIME_ENTRY};
    use proptest::prelude::*;
    use tokio::sync::mpsc;

    fn surface(counting: bool) -> (Arc<NativeSurface>, mpsc::UnboundedReceiver<SurfaceCommand>) {
        let (surface, rx) = NativeSurface::new();
        surface.update(SurfaceSnapshot {
            container_ready: true,
            counting,
            title: "Write report".to_string(),
            title_value_present: true,
            ..Default::default()
        });
        (Arc::new(surface), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SurfaceCommand>) -> Vec<SurfaceCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    fn visibility(commands: &[SurfaceCommand]) -> HashMap<ControlKind, bool> {
        commands
            .iter()
            .filter_map(|c| match c {
                SurfaceCommand::SetVisible { control, visible } => Some((*control, *visible)),
                _ => None,
            })
            .collect()
    }

    fn recorder(bridge: &Arc<TimerBridge>) -> Arc<Mutex<Vec<ObservedStatus>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bridge.set_status_listener(move |_, status| sink.lock().unwrap().push(status));
        seen
    }

    fn toggle(old_value: &str) -> Vec<MutationRecord> {
        vec![MutationRecord::attribute("aria-label", Some(old_value))]
    }

    #[test]
    fn test_create_builds_overlay() {
        let (surface, mut rx) = surface(false);
        let _bridge = TimerBridge::create(surface);

        let commands = drain(&mut rx);
        let created: Vec<ControlKind> = commands
            .iter()
            .filter_map(|c| match c {
                SurfaceCommand::CreateControl { control } => Some(*control),
                _ => None,
            })
            .collect();
        assert_eq!(created, ControlKind::ALL.to_vec());
        assert_eq!(commands.last(), Some(&SurfaceCommand::HideTimerToggle));
    }

    #[test]
    fn test_status_listener_called_once_with_initial_status() {
        for (counting, expected) in [(true, ObservedStatus::Running), (false, ObservedStatus::Stopped)] {
            let (surface, _rx) = surface(counting);
            let bridge = TimerBridge::create(surface);
            let seen = recorder(&bridge);

            assert_eq!(*seen.lock().unwrap(), vec![expected]);
            assert_eq!(bridge.status(), Some(expected));
        }
    }

    #[test]
    fn test_visibility_follows_status() {
        let (surface, mut rx) = surface(false);
        let bridge = TimerBridge::create(surface);
        drain(&mut rx);

        let _seen = recorder(&bridge);
        let initial = visibility(&drain(&mut rx));
        for control in ControlKind::ALL {
            assert_eq!(initial[&control], control.visible_when(ObservedStatus::Stopped));
        }

        bridge.handle_mutations(MutationTarget::TimerToggle, &toggle(START_TIME_ENTRY));
        let running = visibility(&drain(&mut rx));
        assert!(!running[&ControlKind::Start]);
        assert!(!running[&ControlKind::TaskPicker]);
        assert!(running[&ControlKind::Pause]);
        assert!(running[&ControlKind::Interrupt]);
        assert!(running[&ControlKind::Done]);
        assert!(running[&ControlKind::Delete]);

        bridge.handle_mutations(MutationTarget::TimerToggle, &toggle(STOP_TIME_ENTRY));
        let stopped = visibility(&drain(&mut rx));
        assert!(stopped[&ControlKind::Start]);
        assert!(stopped[&ControlKind::TaskPicker]);
        assert!(!stopped[&ControlKind::Pause]);
        assert!(!stopped[&ControlKind::Delete]);
    }

    #[test]
    fn test_transition_from_previous_label() {
        let (surface, _rx) = surface(false);
        let bridge = TimerBridge::create(surface);
        let seen = recorder(&bridge);

        let status = bridge.handle_mutations(MutationTarget::TimerToggle, &toggle(START_TIME_ENTRY));
        assert_eq!(status, Some(ObservedStatus::Running));

        let status = bridge.handle_mutations(MutationTarget::TimerToggle, &toggle(STOP_TIME_ENTRY));
        assert_eq!(status, Some(ObservedStatus::Stopped));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ObservedStatus::Stopped, ObservedStatus::Running, ObservedStatus::Stopped]
        );
    }

    #[test]
    fn test_unrecognized_records_are_ignored() {
        let (surface, _rx) = surface(false);
        let bridge = TimerBridge::create(surface);
        let seen = recorder(&bridge);

        let missing = vec![MutationRecord::attribute("class", None)];
        assert_eq!(bridge.handle_mutations(MutationTarget::TimerToggle, &missing), None);
        assert_eq!(bridge.handle_mutations(MutationTarget::TimerToggle, &toggle("Continue")), None);
        assert_eq!(
            bridge.handle_mutations(MutationTarget::TimerToggle, &[MutationRecord::child_list()]),
            None
        );
        assert_eq!(bridge.handle_mutations(MutationTarget::TimerToggle, &[]), None);

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(bridge.status(), Some(ObservedStatus::Stopped));
    }

    #[test]
    fn test_last_record_of_batch_decides() {
        let (surface, _rx) = surface(false);
        let bridge = TimerBridge::create(surface);
        let seen = recorder(&bridge);

        let batch = vec![
            MutationRecord::attribute("aria-label", Some(START_TIME_ENTRY)),
            MutationRecord::attribute("aria-label", Some(STOP_TIME_ENTRY)),
        ];
        assert_eq!(
            bridge.handle_mutations(MutationTarget::TimerToggle, &batch),
            Some(ObservedStatus::Stopped)
        );
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_toggle_mutations_before_subscription_are_ignored() {
        let (surface, mut rx) = surface(false);
        let bridge = TimerBridge::create(surface);
        drain(&mut rx);

        assert_eq!(bridge.handle_mutations(MutationTarget::TimerToggle, &toggle(START_TIME_ENTRY)), None);
        assert_eq!(bridge.status(), None);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_title_listener_fires_per_attribute_batch() {
        let (surface, _rx) = surface(false);
        let bridge = TimerBridge::create(surface);
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        bridge.set_title_listener(move |b| {
            assert_eq!(b.title(), "Write report");
            *counter.lock().unwrap() += 1;
        });

        let records = vec![MutationRecord::attribute("value", Some("Write"))];
        bridge.handle_mutations(MutationTarget::TitleInput, &records);
        bridge.handle_mutations(MutationTarget::TitleInput, &records);
        bridge.handle_mutations(MutationTarget::TitleInput, &[MutationRecord::child_list()]);

        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_press_invokes_registered_handler_only() {
        let (surface, mut rx) = surface(true);
        let bridge = TimerBridge::create(surface);
        drain(&mut rx);

        bridge.set_control_listener(ControlKind::Start, |b| b.click_timer_toggle());
        bridge.press(ControlKind::Start);
        bridge.press(ControlKind::Pause);

        assert_eq!(drain(&mut rx), vec![SurfaceCommand::ClickTimerToggle]);
    }

    #[test]
    fn test_title_emptiness_tracks_value_attribute() {
        let (surface, _rx) = surface(false);
        let bridge = TimerBridge::create(surface.clone());
        assert!(!bridge.is_title_empty());

        surface.update(SurfaceSnapshot {
            container_ready: true,
            ..Default::default()
        });
        assert!(bridge.is_title_empty());
    }

    proptest! {
        #[test]
        fn prop_transition_iff_known_previous_label(
            labels in proptest::collection::vec(
                prop_oneof![
                    Just(START_TIME_ENTRY.to_string()),
                    Just(STOP_TIME_ENTRY.to_string()),
                    ".*",
                ],
                0..20,
            )
        ) {
            let (surface, _rx) = surface(false);
            let bridge = TimerBridge::create(surface);
            let seen = recorder(&bridge);

            let mut expected = vec![ObservedStatus::Stopped];
            for label in &labels {
                let emitted = bridge.handle_mutations(MutationTarget::TimerToggle, &toggle(label));
                let known = label == START_TIME_ENTRY || label == STOP_TIME_ENTRY;
                prop_assert_eq!(emitted.is_some(), known);
                if let Some(status) = emitted {
                    expected.push(status);
                }
            }

            prop_assert_eq!(seen.lock().unwrap().clone(), expected);
        }
    }
}
