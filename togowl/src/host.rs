//! Host loop.
//!
//! Processes messages from the content script strictly in arrival order:
//! snapshots refresh the mirrored surface, container mutations drive the
//! attachment watcher, toggle and title mutations go to the bridge, and
//! overlay clicks are dispatched to the handlers installed by the relay.

use crate::bridge::TimerBridge;
use crate::native::HostMessage;
use crate::relay::Relay;
use crate::surface::{NativeSurface, Surface};
use crate::types::{MutationRecord, MutationTarget, SurfaceSnapshot};
use crate::watcher::AttachmentWatcher;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Host status information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostStatus {
    pub attached: bool,
    pub readiness_checks: u64,
    pub messages_handled: u64,
}

/// Message loop between the content script and the overlay
pub struct Host {
    surface: Arc<NativeSurface>,
    watcher: AttachmentWatcher,
    /// Set once the timer surface is attached
    bridge: Option<Arc<TimerBridge>>,
    relay: Arc<Relay>,
    messages_handled: u64,
}

impl Host {
    pub fn new(surface: Arc<NativeSurface>, relay: Arc<Relay>) -> Self {
        Self {
            surface,
            watcher: AttachmentWatcher::new(),
            bridge: None,
            relay,
            messages_handled: 0,
        }
    }

    pub fn bridge(&self) -> Option<&Arc<TimerBridge>> {
        self.bridge.as_ref()
    }

    pub fn status(&self) -> HostStatus {
        HostStatus {
            attached: self.bridge.is_some(),
            readiness_checks: self.watcher.checks(),
            messages_handled: self.messages_handled,
        }
    }

    /// Handle one message from the content script.
    ///
    /// A snapshot carried by a click or mutation is applied before the event
    /// is dispatched. Must be called inside a tokio runtime: overlay actions
    /// spawn their asynchronous parts.
    pub fn handle(&mut self, message: HostMessage) {
        self.messages_handled += 1;

        match message {
            HostMessage::Snapshot { snapshot } => {
                self.surface.update(snapshot);
                self.check_attachment();
            }
            HostMessage::Mutation {
                target,
                records,
                snapshot,
            } => {
                self.apply(snapshot);
                self.handle_mutation(target, &records);
            }
            HostMessage::ControlClicked { control, snapshot } => {
                self.apply(snapshot);
                match &self.bridge {
                    Some(bridge) => bridge.press(control),
                    None => warn!("{} clicked before attachment", control.as_str()),
                }
            }
            HostMessage::TaskPicked { task_id } => match &self.bridge {
                Some(bridge) => {
                    self.relay.pick_task(bridge, task_id);
                }
                None => warn!("Task {} picked before attachment", task_id),
            },
            HostMessage::TaskPickerClosed => self.relay.close_task_picker(),
        }
    }

    fn apply(&self, snapshot: Option<SurfaceSnapshot>) {
        if let Some(snapshot) = snapshot {
            self.surface.update(snapshot);
        }
    }

    fn handle_mutation(&mut self, target: MutationTarget, records: &[MutationRecord]) {
        match target {
            MutationTarget::Container => self.check_attachment(),
            MutationTarget::TimerToggle | MutationTarget::TitleInput => match &self.bridge {
                Some(bridge) => {
                    bridge.handle_mutations(target, records);
                }
                None => trace!("Ignoring {:?} mutation before attachment", target),
            },
        }
    }

    /// Run until the content script disconnects or shutdown is requested
    pub async fn run(
        &mut self,
        mut messages: mpsc::Receiver<HostMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> HostStatus {
        info!("Host loop running");

        loop {
            tokio::select! {
                message = messages.recv() => match message {
                    Some(message) => self.handle(message),
                    None => {
                        info!("Message stream closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested");
                        break;
                    }
                }
            }
        }

        let status = self.status();
        debug!(
            "Host stopped: attached={} checks={} messages={}",
            status.attached, status.readiness_checks, status.messages_handled
        );
        status
    }

    fn check_attachment(&mut self) {
        if !self.watcher.is_observing() {
            return;
        }

        let surface: Arc<dyn Surface> = self.surface.clone();
        if let Some(bridge) = self.watcher.on_structure_change(&surface) {
            self.relay.install(&bridge);
            self.bridge = Some(bridge);
        }
    }
}
