//! Topic-keyed event fan-out.
//!
//! One topic per session. `publish` assigns the next sequence number,
//! appends to a bounded replay ring, and delivers to every live subscriber
//! over its own bounded channel. A subscriber that cannot keep up (full
//! channel) or has gone away (closed channel) is dropped — debate progress
//! always wins over a slow sink. Heartbeats are keep-alive comments with
//! `seq = 0`, delivered out of band and never retained.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use agora_domain::clock::Clock;
use agora_domain::event::{EventKind, SessionEvent};

/// Retained events per session for reconnect replay.
pub const REPLAY_CAPACITY: usize = 1024;
/// Queue depth per subscriber before the drop policy applies. Token-level
/// events are fine-grained, so the queue is sized to absorb a burst of
/// several full turns before a consumer counts as too slow.
const SUBSCRIBER_CAPACITY: usize = 2048;
/// Keep-alive interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

struct Subscriber {
    tx: mpsc::Sender<SessionEvent>,
}

struct Topic {
    next_seq: u64,
    replay: VecDeque<SessionEvent>,
    subscribers: HashMap<u64, Subscriber>,
}

impl Topic {
    fn new() -> Self {
        Self {
            next_seq: 1,
            replay: VecDeque::new(),
            subscribers: HashMap::new(),
        }
    }

    fn oldest_retained(&self) -> Option<u64> {
        self.replay.front().map(|e| e.seq)
    }
}

/// A live subscription. Dropping the receiver unsubscribes: the next
/// delivery attempt notices the closed channel and removes the entry.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<SessionEvent>,
}

pub struct EventPublisher {
    topics: Mutex<HashMap<String, Topic>>,
    clock: Arc<dyn Clock>,
    next_subscriber_id: AtomicU64,
    dropped: AtomicU64,
    replay_capacity: usize,
}

impl EventPublisher {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_replay_capacity(clock, REPLAY_CAPACITY)
    }

    pub fn with_replay_capacity(clock: Arc<dyn Clock>, replay_capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            clock,
            next_subscriber_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            replay_capacity,
        }
    }

    /// Register a sink for a session's events.
    ///
    /// With `last_seq`, every retained event with a later sequence is
    /// queued for delivery first; a `last_seq` older than the replay
    /// window yields a single `resync_required` instead. A `connected`
    /// keep-alive (seq 0) always arrives before anything else.
    pub fn subscribe(&self, session_id: &str, last_seq: Option<u64>) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        let mut topics = self.topics.lock();
        let topic = topics
            .entry(session_id.to_string())
            .or_insert_with(Topic::new);

        let connected = SessionEvent {
            seq: 0,
            ts_ms: 0,
            kind: EventKind::Connected {
                session_id: session_id.to_string(),
                last_seq,
            },
        };
        let _ = tx.try_send(connected);

        if let Some(last) = last_seq {
            let oldest = topic.oldest_retained();
            let gap = match oldest {
                // Buffer holds seq `oldest..next_seq`; anything at or past
                // `oldest - 1` can be caught up exactly.
                Some(oldest) => last + 1 < oldest,
                None => last + 1 < topic.next_seq,
            };
            if gap {
                let _ = tx.try_send(SessionEvent {
                    seq: 0,
                    ts_ms: 0,
                    kind: EventKind::ResyncRequired {
                        oldest_retained: oldest.unwrap_or(topic.next_seq),
                    },
                });
            } else {
                for event in topic.replay.iter().filter(|e| e.seq > last) {
                    let _ = tx.try_send(event.clone());
                }
            }
        }

        topic.subscribers.insert(id, Subscriber { tx });
        tracing::debug!(session_id, subscriber = id, "subscribed");
        Subscription { id, rx }
    }

    /// Idempotent explicit unsubscribe.
    pub fn unsubscribe(&self, session_id: &str, subscriber_id: u64) {
        if let Some(topic) = self.topics.lock().get_mut(session_id) {
            topic.subscribers.remove(&subscriber_id);
        }
    }

    /// Publish an event: assign its sequence number, retain it for replay,
    /// fan out to all live subscribers. Returns the assigned sequence.
    pub fn publish(&self, session_id: &str, ts_ms: u64, kind: EventKind) -> u64 {
        let mut topics = self.topics.lock();
        let topic = topics
            .entry(session_id.to_string())
            .or_insert_with(Topic::new);

        let seq = topic.next_seq;
        topic.next_seq += 1;
        let event = SessionEvent { seq, ts_ms, kind };

        topic.replay.push_back(event.clone());
        while topic.replay.len() > self.replay_capacity {
            topic.replay.pop_front();
        }

        self.fan_out(session_id, topic, &event);
        seq
    }

    /// Non-blocking delivery to every subscriber; full or closed sinks are
    /// dropped so one slow consumer cannot stall the rest.
    fn fan_out(&self, session_id: &str, topic: &mut Topic, event: &SessionEvent) {
        let mut dead = Vec::new();
        for (&id, sub) in &topic.subscribers {
            if sub.tx.try_send(event.clone()).is_err() {
                dead.push(id);
            }
        }
        for id in dead {
            topic.subscribers.remove(&id);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(session_id, subscriber = id, "subscriber dropped");
        }
    }

    /// Send one heartbeat to every subscriber of every session.
    pub fn heartbeat_all(&self) {
        let ts_ms = self.clock.monotonic_ms();
        let mut topics = self.topics.lock();
        for (session_id, topic) in topics.iter_mut() {
            let event = SessionEvent {
                seq: 0,
                ts_ms,
                kind: EventKind::Heartbeat,
            };
            let mut dead = Vec::new();
            for (&id, sub) in &topic.subscribers {
                if sub.tx.try_send(event.clone()).is_err() {
                    dead.push(id);
                }
            }
            for id in dead {
                topic.subscribers.remove(&id);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(session_id, subscriber = id, "subscriber dropped");
            }
        }
    }

    /// Spawn the periodic heartbeat dispatcher.
    pub fn spawn_heartbeats(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let publisher = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(publisher) = publisher.upgrade() else {
                    break;
                };
                publisher.heartbeat_all();
            }
        })
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.topics
            .lock()
            .get(session_id)
            .map(|t| t.subscribers.len())
            .unwrap_or(0)
    }

    /// Subscribers dropped for falling behind or disconnecting.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
