//! Pipeline lifecycle events.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late subscribers can catch up.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::ids::JobId;
use crate::pipeline::Stage;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    JobQueued {
        job_id: JobId,
    },
    StageStarted {
        job_id: JobId,
        stage: Stage,
        attempt: u32,
    },
    StageSucceeded {
        job_id: JobId,
        stage: Stage,
        attempt: u32,
        /// Fraction of stages completed, 0.0 -- 1.0.
        progress: f32,
    },
    StageRetryScheduled {
        job_id: JobId,
        stage: Stage,
        attempt: u32,
        error_kind: ErrorKind,
        delay_ms: u64,
    },
    JobSucceeded {
        job_id: JobId,
    },
    JobFailed {
        job_id: JobId,
        stage: Stage,
        error: String,
    },
}

impl EventPayload {
    pub fn job_id(&self) -> JobId {
        match self {
            EventPayload::JobQueued { job_id }
            | EventPayload::StageStarted { job_id, .. }
            | EventPayload::StageSucceeded { job_id, .. }
            | EventPayload::StageRetryScheduled { job_id, .. }
            | EventPayload::JobSucceeded { job_id }
            | EventPayload::JobFailed { job_id, .. } => *job_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }

    /// Recent events for one job, newest first.
    pub fn recent_for_job(&self, job_id: JobId) -> Vec<Event> {
        let recent = self.recent.read();
        recent
            .iter()
            .filter(|e| e.payload.job_id() == job_id)
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let job_id = JobId::new();
        bus.broadcast(EventPayload::JobQueued { job_id });

        let event = rx.try_recv().unwrap();
        match &event.payload {
            EventPayload::JobQueued { job_id: received } => assert_eq!(*received, job_id),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        let job_id = JobId::new();

        for _ in 0..150 {
            bus.broadcast(EventPayload::JobQueued { job_id });
        }

        assert_eq!(bus.recent_events(200).len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn recent_for_job_filters() {
        let bus = EventBus::new(16);
        let a = JobId::new();
        let b = JobId::new();
        bus.broadcast(EventPayload::JobQueued { job_id: a });
        bus.broadcast(EventPayload::JobQueued { job_id: b });
        bus.broadcast(EventPayload::JobSucceeded { job_id: a });

        let events = bus.recent_for_job(a);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].payload, EventPayload::JobSucceeded { .. }));
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.broadcast(EventPayload::JobFailed {
            job_id: JobId::new(),
            stage: Stage::Analyze,
            error: "test".into(),
        });
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = EventPayload::StageRetryScheduled {
            job_id: JobId::new(),
            stage: Stage::Convert,
            attempt: 2,
            error_kind: ErrorKind::ExternalServiceTransient,
            delay_ms: 4000,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "stage_retry_scheduled");
        assert_eq!(json["stage"], "convert");
        assert_eq!(json["error_kind"], "external_service_transient");
    }
}
