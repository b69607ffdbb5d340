//! Stage sequencer for url generation.
//!
//! Generators subscribe to named stages (`init`, `added:posts`, ...).
//! [`Queue::start`] waits until a stage has enough subscribers, or until its
//! tolerance elapses, then runs every subscriber in registration order.
//! [`Queue::run`] dispatches an already-satisfied stage synchronously and
//! stops at the first subscriber returning [`Flow::Stop`].
//!
//! ```text
//! start(init) ──► started ──► wait(count >= required | tolerance) ──► run ──► ended
//!                                    ▲
//! subscribe(init, cb) ───────────────┘ (notify)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Notify;

use crate::core::ListenerId;
use crate::resource::{ResourceRef, ResourceType};
use crate::{debug, log};

/// Stage names.
pub struct Stage;

impl Stage {
    /// First pass of every generator after the bulk fetch.
    pub const INIT: &'static str = "init";

    /// Stage dispatched when a resource of `resource_type` becomes available.
    pub fn added(resource_type: ResourceType) -> String {
        format!("added:{resource_type}")
    }
}

/// Subscriber verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// End dispatch, later subscribers are not consulted
    Stop,
}

/// Payload handed to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    pub stage: String,
    pub resource: Option<ResourceRef>,
}

impl StageEvent {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            resource: None,
        }
    }

    pub fn with_resource(stage: impl Into<String>, resource: ResourceRef) -> Self {
        Self {
            stage: stage.into(),
            resource: Some(resource),
        }
    }
}

/// Lifecycle signal of a started stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSignal {
    Started(String),
    Ended(String),
}

/// Options for [`Queue::start`]
#[derive(Debug, Clone)]
pub struct StageOptions {
    pub stage: String,
    /// Upper bound on waiting for subscribers
    pub tolerance: Duration,
    pub required_subscribers: usize,
}

pub type Subscriber = Arc<dyn Fn(&StageEvent) -> Flow + Send + Sync>;
pub type QueueListener = Arc<dyn Fn(&QueueSignal) + Send + Sync>;

#[derive(Default)]
pub struct Queue {
    subscribers: RwLock<FxHashMap<String, Vec<Subscriber>>>,
    listeners: RwLock<Vec<(ListenerId, QueueListener)>>,
    next_listener: AtomicU64,
    /// Stages started and not yet ended
    pending: Mutex<FxHashSet<String>>,
    arrivals: Notify,
    /// Bumped by resets; a waiting `start` from an older epoch gives up
    epoch: AtomicU64,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `stage`. Wakes a `start` waiting on it.
    pub fn subscribe<F>(&self, stage: &str, callback: F)
    where
        F: Fn(&StageEvent) -> Flow + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .entry(stage.to_string())
            .or_default()
            .push(Arc::new(callback));
        self.arrivals.notify_waiters();
    }

    pub fn subscriber_count(&self, stage: &str) -> usize {
        self.subscribers.read().get(stage).map_or(0, Vec::len)
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&QueueSignal) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Whether `stage` was started and has not ended yet.
    pub fn is_pending(&self, stage: &str) -> bool {
        self.pending.lock().contains(stage)
    }

    /// Start a stage: wait for subscribers, run them, signal the end.
    ///
    /// Returns `false` if the stage was already running or a reset
    /// cancelled it while waiting.
    pub async fn start(&self, options: StageOptions) -> bool {
        let StageOptions {
            stage,
            tolerance,
            required_subscribers,
        } = options;

        if !self.pending.lock().insert(stage.clone()) {
            debug!("queue"; "stage `{}` already running", stage);
            return false;
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.emit(&QueueSignal::Started(stage.clone()));

        let deadline = tokio::time::Instant::now() + tolerance;
        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.epoch.load(Ordering::SeqCst) != epoch {
                debug!("queue"; "stage `{}` cancelled by reset", stage);
                return false;
            }
            let count = self.subscriber_count(&stage);
            if count >= required_subscribers {
                break;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                log!(
                    "queue";
                    "stage `{}` proceeding with {}/{} subscribers after {:?}",
                    stage,
                    self.subscriber_count(&stage),
                    required_subscribers,
                    tolerance
                );
                break;
            }
        }

        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }

        self.run(&StageEvent::new(stage.as_str()));
        self.pending.lock().remove(&stage);
        self.emit(&QueueSignal::Ended(stage));
        true
    }

    /// Dispatch `event` to subscribers of its stage, in registration order.
    ///
    /// Returns `true` if a subscriber stopped the dispatch.
    pub fn run(&self, event: &StageEvent) -> bool {
        let subscribers = match self.subscribers.read().get(&event.stage) {
            Some(subs) => subs.clone(),
            None => return false,
        };

        subscribers
            .iter()
            .any(|subscriber| subscriber(event) == Flow::Stop)
    }

    /// Discard pending stages, subscribers and listeners.
    pub fn reset(&self) {
        self.soft_reset();
        self.subscribers.write().clear();
        self.listeners.write().clear();
    }

    /// Discard pending stages only.
    pub fn soft_reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().clear();
        self.arrivals.notify_waiters();
    }

    fn emit(&self, signal: &QueueSignal) {
        let listeners: Vec<QueueListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(signal);
        }
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<(String, usize)> = self
            .subscribers
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.len()))
            .collect();
        f.debug_struct("Queue")
            .field("subscribers", &stages)
            .field("pending", &*self.pending.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn options(required: usize, tolerance_ms: u64) -> StageOptions {
        StageOptions {
            stage: Stage::INIT.to_string(),
            tolerance: Duration::from_millis(tolerance_ms),
            required_subscribers: required,
        }
    }

    #[test]
    fn test_added_stage_name() {
        assert_eq!(Stage::added(ResourceType::Posts), "added:posts");
    }

    #[test]
    fn test_run_in_order_and_stop() {
        let queue = Queue::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for (i, flow) in [Flow::Continue, Flow::Stop, Flow::Continue].into_iter().enumerate() {
            let calls = Arc::clone(&calls);
            queue.subscribe("added:posts", move |_| {
                calls.lock().push(i);
                flow
            });
        }

        assert!(queue.run(&StageEvent::new("added:posts")));
        assert_eq!(*calls.lock(), vec![0, 1]);
        assert!(!queue.run(&StageEvent::new("added:tags")));
    }

    #[tokio::test]
    async fn test_start_runs_when_satisfied() {
        let queue = Queue::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        queue.subscribe(Stage::INIT, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Flow::Continue
        });

        let signals = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&signals);
        queue.add_listener(move |sig| s.lock().push(sig.clone()));

        assert!(queue.start(options(1, 5_000)).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            *signals.lock(),
            vec![
                QueueSignal::Started("init".into()),
                QueueSignal::Ended("init".into())
            ]
        );
        assert!(!queue.is_pending(Stage::INIT));
    }

    #[tokio::test]
    async fn test_start_proceeds_after_tolerance() {
        let queue = Queue::new();
        let started = tokio::time::Instant::now();
        assert!(queue.start(options(3, 30)).await);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_late_subscriber_wakes_start() {
        let queue = Arc::new(Queue::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let q = Arc::clone(&queue);
        let task = tokio::spawn(async move { q.start(options(1, 10_000)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let h = Arc::clone(&hits);
        queue.subscribe(Stage::INIT, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Flow::Continue
        });

        assert!(task.await.unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_cancels_waiting_stage() {
        let queue = Arc::new(Queue::new());
        let q = Arc::clone(&queue);
        let task = tokio::spawn(async move { q.start(options(1, 10_000)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.is_pending(Stage::INIT));
        queue.soft_reset();

        assert!(!task.await.unwrap());
        assert!(!queue.is_pending(Stage::INIT));
    }

    #[test]
    fn test_reset_variants() {
        let queue = Queue::new();
        queue.subscribe(Stage::INIT, |_| Flow::Continue);
        let id = queue.add_listener(|_| {});

        queue.soft_reset();
        assert_eq!(queue.subscriber_count(Stage::INIT), 1);
        assert!(queue.remove_listener(id));

        queue.add_listener(|_| {});
        queue.reset();
        assert_eq!(queue.subscriber_count(Stage::INIT), 0);
        assert!(queue.listeners.read().is_empty());
    }
}
