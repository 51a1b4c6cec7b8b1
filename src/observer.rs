//! Event Observer
//!
//! Bounded, rotating log of local usage events. Every event is checked
//! against the consent kernel before it is stored; events for a capability
//! that is not granted are dropped without a trace.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use crate::privacy::{Capability, ConsentKernel};

/// Kind of observed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AppLaunch,
    AppSwitch,
    AppClose,
    WindowFocus,
    WindowUnfocus,
    KeyPress,
    MouseClick,
    SystemSleep,
    SystemWake,
    /// Derived affect signal (typing cadence, error burst)
    AffectSignal,
}

impl EventKind {
    /// Capability that must be granted to record this kind
    pub fn capability(&self) -> Capability {
        match self {
            EventKind::AffectSignal => Capability::EmotionalSensing,
            _ => Capability::BehavioralLogging,
        }
    }

    /// Kinds that move the user's focus to an app
    pub fn is_transition(&self) -> bool {
        matches!(
            self,
            EventKind::AppLaunch | EventKind::AppSwitch | EventKind::WindowFocus
        )
    }

    /// Kinds that count as a focus switch for context-switching detection
    pub fn is_focus_switch(&self) -> bool {
        matches!(self, EventKind::AppSwitch | EventKind::WindowFocus)
    }
}

/// Immutable observed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub app_name: String,
    pub window_title: Option<String>,
    pub payload: BTreeMap<String, String>,
}

impl ObservedEvent {
    /// New event stamped now
    pub fn new(kind: EventKind, app_name: &str) -> Self {
        Self::at(kind, app_name, Utc::now())
    }

    /// New event with an explicit timestamp (replay, tests)
    pub fn at(kind: EventKind, app_name: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            kind,
            app_name: app_name.to_string(),
            window_title: None,
            payload: BTreeMap::new(),
        }
    }

    pub fn with_window(mut self, title: &str) -> Self {
        self.window_title = Some(title.to_string());
        self
    }

    pub fn with_payload(mut self, key: &str, value: &str) -> Self {
        self.payload.insert(key.to_string(), value.to_string());
        self
    }
}

/// Observer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Maximum events kept in the ring buffer
    pub capacity: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Capture statistics
#[derive(Debug, Default)]
pub struct ObserverStats {
    pub recorded: AtomicU64,
    pub rejected: AtomicU64,
    pub evicted: AtomicU64,
}

/// Snapshot of [`ObserverStats`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObserverStatsSnapshot {
    pub recorded: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub buffered: usize,
    pub capacity: usize,
}

pub struct EventObserver {
    capacity: usize,
    buffer: RwLock<VecDeque<ObservedEvent>>,
    consent: Arc<ConsentKernel>,
    stats: ObserverStats,
    /// Woken on every recorded event (mining triggers)
    recorded_notify: Notify,
}

impl EventObserver {
    pub fn new(config: ObserverConfig, consent: Arc<ConsentKernel>) -> Self {
        let capacity = config.capacity.max(1);
        info!("Event observer created with capacity {}", capacity);
        Self {
            capacity,
            buffer: RwLock::new(VecDeque::with_capacity(capacity)),
            consent,
            stats: ObserverStats::default(),
            recorded_notify: Notify::new(),
        }
    }

    /// Record an event. Returns false when consent for its capability class
    /// is missing; nothing is stored or logged in that case.
    pub fn record(&self, event: ObservedEvent) -> bool {
        if !self.consent.is_granted(event.kind.capability()) {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        {
            let mut buffer = self.buffer.write();
            // A revoke may have landed while waiting for the buffer
            if !self.consent.is_granted(event.kind.capability()) {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            buffer.push_back(event);
            while buffer.len() > self.capacity {
                buffer.pop_front();
                self.stats.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.stats.recorded.fetch_add(1, Ordering::Relaxed);
        self.recorded_notify.notify_waiters();
        true
    }

    /// Ordered events for `app_name` among the last `window` events
    pub fn sequence_of(&self, app_name: &str, window: usize) -> Vec<ObservedEvent> {
        self.sequence_matching(|e| e.app_name == app_name, window)
    }

    /// Ordered events matching `predicate` among the last `window` events
    pub fn sequence_matching<F>(&self, predicate: F, window: usize) -> Vec<ObservedEvent>
    where
        F: Fn(&ObservedEvent) -> bool,
    {
        let buffer = self.buffer.read();
        let start = buffer.len().saturating_sub(window);
        buffer
            .iter()
            .skip(start)
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// Last `limit` events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<ObservedEvent> {
        self.sequence_matching(|_| true, limit)
    }

    /// App names of focus transitions among the last `n` events
    pub fn app_sequence(&self, n: usize) -> Vec<String> {
        self.sequence_matching(|e| e.kind.is_transition(), n)
            .into_iter()
            .map(|e| e.app_name)
            .collect()
    }

    /// Copy of the whole buffer for mining
    pub fn snapshot(&self) -> Vec<ObservedEvent> {
        self.buffer.read().iter().cloned().collect()
    }

    /// Purge everything (explicit user request)
    pub fn clear(&self) {
        let mut buffer = self.buffer.write();
        info!("Clearing {} observed events", buffer.len());
        buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events recorded since creation (monotonic)
    pub fn total_recorded(&self) -> u64 {
        self.stats.recorded.load(Ordering::Relaxed)
    }

    /// Wait until the next event is recorded
    pub async fn recorded(&self) {
        self.recorded_notify.notified().await;
        debug!("Observer woke on new event");
    }

    pub fn stats(&self) -> ObserverStatsSnapshot {
        ObserverStatsSnapshot {
            recorded: self.stats.recorded.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            evicted: self.stats.evicted.load(Ordering::Relaxed),
            buffered: self.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observer(capacity: usize) -> (Arc<ConsentKernel>, EventObserver) {
        let consent = Arc::new(ConsentKernel::ephemeral());
        consent.grant(Capability::BehavioralLogging);
        let observer = EventObserver::new(ObserverConfig { capacity }, consent.clone());
        (consent, observer)
    }

    #[test]
    fn test_rejects_without_consent() {
        let consent = Arc::new(ConsentKernel::ephemeral());
        let observer = EventObserver::new(ObserverConfig::default(), consent);
        assert!(!observer.record(ObservedEvent::new(EventKind::AppLaunch, "Teams")));
        assert!(observer.is_empty());
        assert_eq!(observer.stats().rejected, 1);
    }

    #[test]
    fn test_affect_signal_needs_emotional_sensing() {
        let (consent, observer) = observer(10);
        assert!(!observer.record(ObservedEvent::new(EventKind::AffectSignal, "IDE")));
        consent.grant(Capability::EmotionalSensing);
        assert!(observer.record(ObservedEvent::new(EventKind::AffectSignal, "IDE")));
    }

    #[test]
    fn test_rotation_keeps_most_recent() {
        let (_consent, observer) = observer(2);
        for i in 0..5 {
            observer.record(ObservedEvent::new(EventKind::AppLaunch, &format!("App{}", i)));
        }
        let events = observer.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].app_name, "App3");
        assert_eq!(events[1].app_name, "App4");
        assert_eq!(observer.stats().evicted, 3);
        assert_eq!(observer.total_recorded(), 5);
    }

    #[test]
    fn test_app_sequence_skips_non_transitions() {
        let (_consent, observer) = observer(10);
        observer.record(ObservedEvent::new(EventKind::AppLaunch, "Teams"));
        observer.record(ObservedEvent::new(EventKind::KeyPress, "Teams"));
        observer.record(ObservedEvent::new(EventKind::AppSwitch, "Gmail"));
        observer.record(ObservedEvent::new(EventKind::WindowFocus, "IDE"));
        assert_eq!(observer.app_sequence(10), vec!["Teams", "Gmail", "IDE"]);
    }

    #[test]
    fn test_sequence_of_respects_window() {
        let (_consent, observer) = observer(10);
        for app in ["IDE", "Browser", "IDE", "Browser", "IDE"] {
            observer.record(ObservedEvent::new(EventKind::AppSwitch, app));
        }
        assert_eq!(observer.sequence_of("IDE", 10).len(), 3);
        assert_eq!(observer.sequence_of("IDE", 2).len(), 1);
    }

    #[test]
    fn test_revocation_stops_capture() {
        let (consent, observer) = observer(10);
        assert!(observer.record(ObservedEvent::new(EventKind::AppLaunch, "Teams")));
        consent.revoke(Capability::BehavioralLogging, None);
        assert!(!observer.record(ObservedEvent::new(EventKind::AppLaunch, "Gmail")));
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn test_revocation_during_concurrent_capture() {
        let (consent, observer) = observer(1024);
        let observer = Arc::new(observer);

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let observer = observer.clone();
                std::thread::spawn(move || {
                    let app = format!("app{}", i);
                    while observer.record(ObservedEvent::new(EventKind::AppSwitch, &app)) {}
                })
            })
            .collect();

        std::thread::sleep(std::time::Duration::from_millis(5));
        consent.revoke(Capability::BehavioralLogging, None);
        for writer in writers {
            writer.join().unwrap();
        }

        let stats = observer.stats();
        assert_eq!(stats.rejected, 4);
        let stored = observer.len() + stats.evicted as usize;
        assert_eq!(stats.recorded as usize, stored);
        assert!(!observer.record(ObservedEvent::new(EventKind::AppSwitch, "late")));
        assert_eq!(observer.stats().recorded, stats.recorded);
    }
}
