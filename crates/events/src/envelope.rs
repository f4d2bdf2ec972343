use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::AggregateId;

/// Position of a committed event inside its document's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPosition {
    pub aggregate_id: AggregateId,
    /// 1-based; never reused within a stream.
    pub sequence_number: u64,
}

impl StreamPosition {
    pub fn new(aggregate_id: AggregateId, sequence_number: u64) -> Self {
        Self {
            aggregate_id,
            sequence_number,
        }
    }

    /// Whether this event is the one right after `applied` events.
    pub fn follows(&self, applied: u64) -> bool {
        self.sequence_number == applied + 1
    }

    /// Already folded by a reader that has applied `applied` events.
    pub fn is_replay_of(&self, applied: u64) -> bool {
        self.sequence_number <= applied
    }
}

/// A committed workflow event as read models and history views see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    position: StreamPosition,
    aggregate_type: String,
    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,
    payload: E,
}

/// Stream metadata of an envelope, without the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeMeta {
    pub event_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
}

impl<E> EventEnvelope<E> {
    pub fn new(position: StreamPosition, meta: EnvelopeMeta, payload: E) -> Self {
        Self {
            event_id: meta.event_id,
            position,
            aggregate_type: meta.aggregate_type,
            event_type: meta.event_type,
            event_version: meta.event_version,
            occurred_at: meta.occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn position(&self) -> StreamPosition {
        self.position
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.position.aggregate_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.position.sequence_number
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    /// Decode the payload while keeping the stream metadata.
    pub fn try_map<F, Err>(
        &self,
        decode: impl FnOnce(&E) -> Result<F, Err>,
    ) -> Result<EventEnvelope<F>, Err> {
        Ok(EventEnvelope {
            event_id: self.event_id,
            position: self.position,
            aggregate_type: self.aggregate_type.clone(),
            event_type: self.event_type.clone(),
            event_version: self.event_version,
            occurred_at: self.occurred_at,
            payload: decode(&self.payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> EnvelopeMeta {
        EnvelopeMeta {
            event_id: Uuid::now_v7(),
            aggregate_type: "counting.plan".to_string(),
            event_type: "counting.plan.started".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn positions_order_a_single_reader() {
        let at_three = StreamPosition::new(AggregateId::new(), 3);
        assert!(at_three.follows(2));
        assert!(!at_three.follows(3));
        assert!(at_three.is_replay_of(3));
        assert!(!at_three.is_replay_of(1));
    }

    #[test]
    fn try_map_keeps_metadata() {
        let position = StreamPosition::new(AggregateId::new(), 7);
        let env = EventEnvelope::new(position, meta(), "12".to_string());

        let decoded = env.try_map(|raw| raw.parse::<u32>()).unwrap();
        assert_eq!(*decoded.payload(), 12);
        assert_eq!(decoded.position(), position);
        assert_eq!(decoded.event_type(), "counting.plan.started");

        assert!(env.try_map(|_| "x".parse::<u32>()).is_err());
    }
}
