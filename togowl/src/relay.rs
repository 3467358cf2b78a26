//! Overlay actions.
//!
//! `Relay` holds everything the bridge handlers need: the dispatcher, the
//! settings and the remote service clients. `install` wires its actions onto
//! a freshly attached bridge. Each action does its synchronous part (reading
//! labels, clicking) inside the bridge callback and spawns the rest.

use crate::bridge::TimerBridge;
use crate::clients::{TaskService, TimerService};
use crate::config::{Config, TaskPickerConfig, TimingConfig};
use crate::dispatcher::{Dispatcher, MessageParts};
use crate::format::{self, event_prefix};
use crate::storage::Settings;
use crate::types::{ControlKind, CurrentTaskLink, ObservedStatus, Result, Task};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Notification texts, one per overlay event
pub mod message {
    use super::*;

    pub fn started(p: &MessageParts) -> String {
        format!(
            "{} `Started`  *{}*    {}{}",
            event_prefix::START,
            p.title,
            p.client,
            p.project
        )
    }

    pub fn paused(p: &MessageParts) -> String {
        format!(
            "{} `Paused` {}  *{}*    {}{}",
            event_prefix::PAUSE,
            p.time,
            p.title,
            p.client,
            p.project
        )
    }

    pub fn interrupted(_: &MessageParts) -> String {
        format!("{} `Interrupted`", event_prefix::INTERRUPT)
    }

    pub fn force_stopped(p: &MessageParts) -> String {
        format!(
            "{} `Force stopped` {}  *{}*    {}{}",
            event_prefix::FORCE_STOP,
            p.time,
            p.title,
            p.client,
            p.project
        )
    }

    pub fn done(p: &MessageParts) -> String {
        format!(
            "{} `Done` {}  *{}*    {}{}",
            event_prefix::DONE,
            p.time,
            p.title,
            p.client,
            p.project
        )
    }

    pub fn deleted(_: &MessageParts) -> String {
        format!("{} `Cancelled`", event_prefix::DELETE)
    }
}

/// Handlers behind the overlay controls
pub struct Relay {
    dispatcher: Arc<Dispatcher>,
    settings: Settings,
    tasks: Arc<dyn TaskService>,
    timers: Arc<dyn TimerService>,
    timing: TimingConfig,
    picker: TaskPickerConfig,
    /// Tasks currently listed in the task picker
    shown_tasks: Mutex<Vec<Task>>,
}

impl Relay {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        settings: Settings,
        tasks: Arc<dyn TaskService>,
        timers: Arc<dyn TimerService>,
        config: &Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            settings,
            tasks,
            timers,
            timing: config.timing.clone(),
            picker: config.task_picker.clone(),
            shown_tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Register every handler on `bridge`.
    ///
    /// The status handler goes last: registering it runs it once with the
    /// current status.
    pub fn install(self: &Arc<Self>, bridge: &Arc<TimerBridge>) {
        bridge.set_control_listener(ControlKind::Start, |b| b.click_timer_toggle());

        let relay = Arc::clone(self);
        bridge.set_control_listener(ControlKind::Pause, move |b| {
            relay.pause_entry(b);
        });

        let relay = Arc::clone(self);
        bridge.set_control_listener(ControlKind::Interrupt, move |b| {
            relay.interrupt_entry(b);
        });

        let relay = Arc::clone(self);
        bridge.set_control_listener(ControlKind::Done, move |b| {
            relay.complete_entry(b);
        });

        let relay = Arc::clone(self);
        bridge.set_control_listener(ControlKind::Delete, move |b| {
            relay.delete_entry(b);
        });

        let relay = Arc::clone(self);
        bridge.set_control_listener(ControlKind::TaskPicker, move |b| {
            relay.open_task_picker(b);
        });

        bridge.set_title_listener(|b| debug!("Title changed -> '{}'", b.title()));

        let relay = Arc::clone(self);
        bridge.set_status_listener(move |b, status| {
            relay.status_changed(b, status);
        });
        info!("Overlay handlers installed");
    }

    /// Announce an entry that just started counting.
    ///
    /// Entries without a title, or that have been running for a while
    /// (reloaded page, resumed elsewhere), are not announced.
    pub fn status_changed(
        self: &Arc<Self>,
        bridge: &Arc<TimerBridge>,
        status: ObservedStatus,
    ) -> Option<JoinHandle<()>> {
        if status != ObservedStatus::Running
            || bridge.is_title_empty()
            || bridge.elapsed_seconds() >= self.timing.start_notify_window_seconds
        {
            return None;
        }

        Some(self.spawn_notify(message::started))
    }

    pub fn pause_entry(self: &Arc<Self>, bridge: &Arc<TimerBridge>) -> JoinHandle<()> {
        let handle = self.spawn_notify(message::paused);
        bridge.click_timer_toggle();
        handle
    }

    /// Stop, announce the interruption, then stop again after a short delay.
    ///
    /// The second stop catches the entry the timer page resumes on its own
    /// after an interrupted stop.
    pub fn interrupt_entry(self: &Arc<Self>, bridge: &Arc<TimerBridge>) -> JoinHandle<()> {
        let labels = self.dispatcher.capture();
        let interrupted = self
            .dispatcher
            .notify_with(labels.clone(), message::interrupted);
        let force_stopped = self.dispatcher.notify_with(labels, message::force_stopped);

        bridge.click_timer_toggle();
        let restop_at = Instant::now() + self.timing.interrupt_restop_delay();

        let bridge = Arc::clone(bridge);
        tokio::spawn(async move {
            interrupted.await;
            force_stopped.await;

            tokio::time::sleep_until(restop_at).await;
            debug!("Stopping again after interrupt");
            bridge.click_timer_toggle();
        })
    }

    /// Announce completion, close the linked task if this entry was started
    /// from it, then stop the timer.
    pub fn complete_entry(self: &Arc<Self>, bridge: &Arc<TimerBridge>) -> JoinHandle<()> {
        let notified = self.spawn_notify(message::done);
        let title = bridge.title();

        let relay = Arc::clone(self);
        let bridge = Arc::clone(bridge);
        tokio::spawn(async move {
            let closing = match relay.settings.current_task().await {
                Ok(Some(link)) if format::timer_title_from_task(&link.task_title) == title => {
                    Some(relay.spawn_close_task(link))
                }
                Ok(_) => None,
                Err(e) => {
                    warn!("Could not read current task: {}", e);
                    None
                }
            };

            if let Err(e) = relay.settings.clear_current_task().await {
                warn!("Could not clear current task: {}", e);
            }
            bridge.click_timer_toggle();

            if let Some(closing) = closing {
                let _ = closing.await;
            }
            let _ = notified.await;
        })
    }

    pub fn delete_entry(self: &Arc<Self>, bridge: &Arc<TimerBridge>) -> JoinHandle<()> {
        let handle = self.spawn_notify(message::deleted);
        bridge.delete_entry();
        handle
    }

    /// Fill the task picker with today's tasks
    pub fn open_task_picker(self: &Arc<Self>, bridge: &Arc<TimerBridge>) -> JoinHandle<()> {
        let relay = Arc::clone(self);
        let bridge = Arc::clone(bridge);
        tokio::spawn(async move {
            match relay.load_tasks().await {
                Ok(tasks) => {
                    debug!("Showing {} task(s) in picker", tasks.len());
                    bridge.surface().show_tasks(&tasks);
                    if let Ok(mut shown) = relay.shown_tasks.lock() {
                        *shown = tasks;
                    }
                }
                Err(e) => {
                    warn!("Could not load tasks: {}", e);
                    bridge.surface().hide_task_picker();
                }
            }
        })
    }

    /// Start a timer entry for a task chosen in the picker.
    ///
    /// Returns `None` when the task is not among the ones last shown.
    pub fn pick_task(self: &Arc<Self>, bridge: &Arc<TimerBridge>, task_id: i64) -> Option<JoinHandle<()>> {
        let task = self
            .shown_tasks
            .lock()
            .ok()
            .and_then(|shown| shown.iter().find(|t| t.id == task_id).cloned());
        let task = match task {
            Some(task) => task,
            None => {
                warn!("Picked task {} is not in the picker, ignoring", task_id);
                return None;
            }
        };

        let relay = Arc::clone(self);
        let bridge = Arc::clone(bridge);
        Some(tokio::spawn(async move {
            if let Err(e) = relay.start_task(&task).await {
                warn!("Could not start timer for task {}: {}", task.id, e);
            }
            bridge.surface().hide_task_picker();
        }))
    }

    /// The picker was dismissed without a choice
    pub fn close_task_picker(&self) {
        if let Ok(mut shown) = self.shown_tasks.lock() {
            shown.clear();
        }
    }

    /// Tasks currently listed in the picker
    pub fn shown_tasks(&self) -> Vec<Task> {
        self.shown_tasks
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn spawn_notify(self: &Arc<Self>, builder: fn(&MessageParts) -> String) -> JoinHandle<()> {
        tokio::spawn(self.dispatcher.notify(builder))
    }

    fn spawn_close_task(self: &Arc<Self>, link: CurrentTaskLink) -> JoinHandle<()> {
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            let result = match relay.settings.todoist_api_token().await {
                Ok(token) => relay.tasks.close_task(&token, link.task_id).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => info!("Closed task {} '{}'", link.task_id, link.task_title),
                Err(e) => warn!("Could not close task {}: {}", link.task_id, e),
            }
        })
    }

    async fn load_tasks(&self) -> Result<Vec<Task>> {
        let token = self.settings.todoist_api_token().await?;
        let tasks = self.tasks.fetch_daily_tasks(&token).await?;
        let ignored = self.settings.todoist_ignore_project_ids().await?;

        Ok(tasks
            .into_iter()
            .filter(|t| !t.project_id.map_or(false, |id| ignored.contains(&id)))
            .take(self.picker.max_tasks)
            .collect())
    }

    async fn start_task(&self, task: &Task) -> Result<()> {
        let token = self.settings.toggl_api_token().await?;
        let project_id = match &task.project_name {
            Some(name) => {
                let workspace_id = self.settings.toggl_workspace_id().await?;
                self.timers.find_project_id(&token, workspace_id, name).await?
            }
            None => None,
        };

        let title = format::timer_title_from_task(&task.title);
        self.timers.start_timer(&token, &title, project_id).await?;
        info!("Started timer '{}' for task {}", title, task.id);

        self.settings
            .set_current_task(&CurrentTaskLink {
                task_id: task.id,
                task_title: task.title.clone(),
            })
            .await
    }
}
