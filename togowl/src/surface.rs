//! The observed page, seen through the content script.
//!
//! `Surface` is the narrow view the bridge and the dispatcher have of the
//! timer page: a few readers and a few actions. `NativeSurface` implements it
//! by mirroring the last snapshot the content script reported and turning
//! actions into commands sent back over native messaging.

use crate::native::SurfaceCommand;
use crate::types::{ControlKind, SurfaceSnapshot, Task};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Read and act on the observed timer page
pub trait Surface: Send + Sync {
    /// Whether the timer container exists yet
    fn is_ready(&self) -> bool;

    /// Whether the current entry is counting
    fn is_counting(&self) -> bool;

    fn entry_title(&self) -> String;

    /// Whether the title input carries a `value` attribute
    fn has_title_value(&self) -> bool;

    fn entry_client(&self) -> Option<String>;

    fn entry_project(&self) -> Option<String>;

    /// Seconds elapsed in the current entry
    fn entry_seconds(&self) -> u64;

    fn click_timer_toggle(&self);

    fn click_delete_entry(&self);

    fn create_control(&self, control: ControlKind);

    fn set_control_visible(&self, control: ControlKind, visible: bool);

    /// Hide the page's own start/stop button
    fn hide_timer_toggle(&self);

    fn show_tasks(&self, tasks: &[Task]);

    fn hide_task_picker(&self);
}

/// Surface backed by the native messaging link
pub struct NativeSurface {
    snapshot: Mutex<SurfaceSnapshot>,
    commands: mpsc::UnboundedSender<SurfaceCommand>,
}

impl NativeSurface {
    /// Create a surface and the receiver its commands are queued on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SurfaceCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                snapshot: Mutex::new(SurfaceSnapshot::default()),
                commands: tx,
            },
            rx,
        )
    }

    /// Replace the mirrored page state
    pub fn update(&self, snapshot: SurfaceSnapshot) {
        trace!(
            "Surface snapshot: ready={} counting={} title='{}'",
            snapshot.container_ready,
            snapshot.counting,
            snapshot.title
        );
        if let Ok(mut current) = self.snapshot.lock() {
            *current = snapshot;
        }
    }

    /// Copy of the mirrored page state
    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn read<T>(&self, f: impl FnOnce(&SurfaceSnapshot) -> T) -> T
    where
        T: Default,
    {
        self.snapshot.lock().map(|s| f(&s)).unwrap_or_default()
    }

    fn send(&self, command: SurfaceCommand) {
        if self.commands.send(command).is_err() {
            debug!("Surface command dropped, writer has stopped");
        }
    }
}

impl Surface for NativeSurface {
    fn is_ready(&self) -> bool {
        self.read(|s| s.container_ready)
    }

    fn is_counting(&self) -> bool {
        self.read(|s| s.counting)
    }

    fn entry_title(&self) -> String {
        self.read(|s| s.title.clone())
    }

    fn has_title_value(&self) -> bool {
        self.read(|s| s.title_value_present)
    }

    fn entry_client(&self) -> Option<String> {
        self.read(|s| s.client.clone())
    }

    fn entry_project(&self) -> Option<String> {
        self.read(|s| s.project.clone())
    }

    fn entry_seconds(&self) -> u64 {
        self.read(|s| s.entry_seconds)
    }

    fn click_timer_toggle(&self) {
        self.send(SurfaceCommand::ClickTimerToggle);
    }

    fn click_delete_entry(&self) {
        self.send(SurfaceCommand::ClickDeleteEntry);
    }

    fn create_control(&self, control: ControlKind) {
        self.send(SurfaceCommand::CreateControl { control });
    }

    fn set_control_visible(&self, control: ControlKind, visible: bool) {
        self.send(SurfaceCommand::SetVisible { control, visible });
    }

    fn hide_timer_toggle(&self) {
        self.send(SurfaceCommand::HideTimerToggle);
    }

    fn show_tasks(&self, tasks: &[Task]) {
        self.send(SurfaceCommand::ShowTasks {
            tasks: tasks.to_vec(),
        });
    }

    fn hide_task_picker(&self) {
        self.send(SurfaceCommand::HideTaskPicker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readers_follow_latest_snapshot() {
        let (surface, _rx) = NativeSurface::new();
        assert!(!surface.is_ready());
        assert_eq!(surface.entry_title(), "");

        surface.update(SurfaceSnapshot {
            container_ready: true,
            counting: true,
            title: "Write report".to_string(),
            title_value_present: true,
            client: Some("Acme".to_string()),
            project: None,
            entry_seconds: 42,
        });

        assert!(surface.is_ready());
        assert!(surface.is_counting());
        assert!(surface.has_title_value());
        assert_eq!(surface.entry_title(), "Write report");
        assert_eq!(surface.entry_client().as_deref(), Some("Acme"));
        assert_eq!(surface.entry_project(), None);
        assert_eq!(surface.entry_seconds(), 42);
    }

    #[test]
    fn test_actions_become_commands() {
        let (surface, mut rx) = NativeSurface::new();
        surface.click_timer_toggle();
        surface.set_control_visible(ControlKind::Done, true);
        surface.hide_task_picker();

        assert_eq!(rx.try_recv().unwrap(), SurfaceCommand::ClickTimerToggle);
        assert_eq!(
            rx.try_recv().unwrap(),
            SurfaceCommand::SetVisible {
                control: ControlKind::Done,
                visible: true
            }
        );
        assert_eq!(rx.try_recv().unwrap(), SurfaceCommand::HideTaskPicker);
    }

    #[test]
    fn test_commands_after_writer_stops_are_dropped() {
        let (surface, rx) = NativeSurface::new();
        drop(rx);
        surface.click_delete_entry();
    }
}
