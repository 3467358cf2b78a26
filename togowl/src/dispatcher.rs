//! Notification dispatcher.
//!
//! Messages are composed from the current entry (title, client, project,
//! elapsed time), queued, and delivered to the messaging endpoint strictly in
//! queue order. Composition may suspend on the settings store, so a message
//! takes its place in the queue when its composition completes, not when
//! `notify` was called.
//!
//! A message counts as pending from the moment `notify` is called, so
//! `wait_idle` also waits for compositions that have not reached the queue.
//!
//! At most one drain loop runs at a time. The loop is started by whichever
//! enqueue finds the `draining` flag clear; every other enqueue only appends.

use crate::clients::Messenger;
use crate::config::DispatcherConfig;
use crate::format;
use crate::storage::Settings;
use crate::surface::Surface;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, error, trace, warn};

/// Entry labels captured from the surface, before title decoration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLabels {
    pub title: String,
    pub client: String,
    pub project: String,
    pub time: String,
}

/// Pieces a message builder renders from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageParts {
    /// Entry title with issue keys linked
    pub title: String,
    /// Client label, "" without a client
    pub client: String,
    /// Project label, "" without a project
    pub project: String,
    /// Elapsed time label
    pub time: String,
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// Ordered notification queue in front of a messenger
pub struct Dispatcher {
    surface: Arc<dyn Surface>,
    settings: Settings,
    messenger: Arc<dyn Messenger>,
    config: DispatcherConfig,
    queue: Mutex<VecDeque<String>>,
    /// Set while a drain loop owns the queue
    draining: AtomicBool,
    /// Messages still being composed
    composing: AtomicUsize,
    idle: Notify,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        surface: Arc<dyn Surface>,
        settings: Settings,
        messenger: Arc<dyn Messenger>,
        config: DispatcherConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            surface,
            settings,
            messenger,
            config,
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            composing: AtomicUsize::new(0),
            idle: Notify::new(),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Read the entry labels from the surface as they are right now
    pub fn capture(&self) -> EntryLabels {
        EntryLabels {
            title: self.surface.entry_title(),
            client: format::client_label(self.surface.entry_client().as_deref()),
            project: format::project_label(self.surface.entry_project().as_deref()),
            time: format::time_label(self.surface.entry_seconds()),
        }
    }

    /// Compose a message from the current entry and queue it.
    ///
    /// The labels are read and the message is registered as pending right
    /// away; the returned future finishes the composition and enqueues it.
    pub fn notify<F>(self: &Arc<Self>, builder: F) -> impl Future<Output = ()> + Send + 'static
    where
        F: FnOnce(&MessageParts) -> String + Send + 'static,
    {
        let labels = self.capture();
        self.notify_with(labels, builder)
    }

    /// Compose a message from previously captured labels and queue it
    pub fn notify_with<F>(
        self: &Arc<Self>,
        labels: EntryLabels,
        builder: F,
    ) -> impl Future<Output = ()> + Send + 'static
    where
        F: FnOnce(&MessageParts) -> String + Send + 'static,
    {
        let composing = Composing::start(self);
        let this = Arc::clone(self);
        async move {
            let parts = MessageParts {
                title: this.decorate(&labels.title).await,
                client: labels.client,
                project: labels.project,
                time: labels.time,
            };
            this.enqueue(builder(&parts));
            drop(composing);
        }
    }

    /// Append a rendered message and make sure a drain loop is running
    pub fn enqueue(self: &Arc<Self>, message: String) {
        debug!("Pushed '{}' to queue", message);
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(message);
        }
        self.start_drain();
    }

    /// Number of messages waiting for delivery
    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Number of messages not yet queued
    pub fn composing(&self) -> usize {
        self.composing.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.composing() == 0 && !self.draining.load(Ordering::Acquire) && self.pending() == 0
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Wait until every notified message has been delivered or dropped
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    async fn decorate(&self, title: &str) -> String {
        let browser_url = match self.settings.jira_browser_url().await {
            Ok(url) => url,
            Err(e) => {
                warn!("Could not read issue tracker url: {}", e);
                None
            }
        };
        format::link_issue_key(title, browser_url.as_deref())
    }

    fn try_claim_drain(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn start_drain(self: &Arc<Self>) {
        if !self.try_claim_drain() {
            trace!("Drain already running");
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move { this.drain().await });
    }

    fn pop(&self) -> Option<String> {
        self.queue.lock().ok().and_then(|mut q| q.pop_front())
    }

    async fn drain(self: Arc<Self>) {
        loop {
            while let Some(message) = self.pop() {
                self.deliver(&message).await;
            }
            self.draining.store(false, Ordering::Release);

            // An enqueue racing with the release saw the flag still set and
            // left its message for us
            if self.pending() == 0 || !self.try_claim_drain() {
                break;
            }
        }
        self.idle.notify_waiters();
    }

    async fn deliver(&self, message: &str) {
        let webhook_url = match self.settings.slack_webhook_url().await {
            Ok(url) => url,
            Err(e) => {
                error!("Dropping message '{}': {}", message, e);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let attempts = self.config.max_delivery_attempts.max(1);
        for attempt in 1..=attempts {
            match self.messenger.send(&webhook_url, message).await {
                Ok(()) => {
                    debug!("Sent '{}' to slack", message);
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) if attempt < attempts && e.is_retryable() => {
                    warn!(
                        "Delivery attempt {}/{} failed: {}, retrying",
                        attempt, attempts, e
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(e) => {
                    error!(
                        "Dropping message '{}' after {} attempt(s): {}",
                        message, attempt, e
                    );
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }
    }
}

/// Marks one message as being composed until dropped
struct Composing {
    dispatcher: Arc<Dispatcher>,
}

impl Composing {
    fn start(dispatcher: &Arc<Dispatcher>) -> Self {
        dispatcher.composing.fetch_add(1, Ordering::AcqRel);
        Self {
            dispatcher: Arc::clone(dispatcher),
        }
    }
}

impl Drop for Composing {
    fn drop(&mut self) {
        if self.dispatcher.composing.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.dispatcher.idle.notify_waiters();
        }
    }
}
