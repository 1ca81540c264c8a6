use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An append-only row in the durable commit-log stand-in. `offset` is
/// monotonic and plays the role of a Kafka offset; `partition_key` (the
/// recipient `user_id`) gives per-user ordering without a real partitioned
/// broker.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DomainEventRecord {
    pub offset: i64,
    pub partition_key: String,
    pub event_type: String,
    pub payload: String,
    pub occurred_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

/// Per-`(consumer_group, partition_key)` committed progress, the durable
/// equivalent of a Kafka consumer group's committed offsets.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ConsumerOffset {
    pub consumer_group: String,
    pub partition_key: String,
    pub last_committed_offset: i64,
}
