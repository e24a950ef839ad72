use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::emotion::EmotionDistribution;
use crate::shared::BoxError;

/// Uniqueness key of a persisted record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub identity: String,
    pub class_id: i64,
    pub frame_id: u64,
}

/// A record about to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRecord {
    pub key: RecordKey,
    pub emotion: EmotionDistribution,
}

/// A stored attendance row.
///
/// Field names on disk match the reporting table: `studentID`, `ClassID`,
/// `FramID`, `Emotion`, `created_at`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(rename = "studentID")]
    pub identity: String,
    #[serde(rename = "ClassID")]
    pub class_id: i64,
    #[serde(rename = "FramID")]
    pub frame_id: u64,
    #[serde(rename = "Emotion")]
    pub emotion: EmotionDistribution,
    pub created_at: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn from_new(record: NewRecord, created_at: DateTime<Utc>) -> Self {
        Self {
            identity: record.key.identity,
            class_id: record.key.class_id,
            frame_id: record.key.frame_id,
            emotion: record.emotion,
            created_at,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            identity: self.identity.clone(),
            class_id: self.class_id,
            frame_id: self.frame_id,
        }
    }
}

/// Durable table of attendance records, unique by [`RecordKey`].
///
/// `create` is an atomic create-if-absent: concurrent callers racing on
/// the same key produce exactly one record.
pub trait RecordStore: Send + Sync {
    fn exists(&self, key: &RecordKey) -> Result<bool, BoxError>;

    /// Returns the stored record, or `None` if the key already existed.
    fn create(&self, record: NewRecord) -> Result<Option<PersistedRecord>, BoxError>;

    /// Creates every absent record and returns how many were new.
    fn create_all(&self, records: Vec<NewRecord>) -> Result<usize, BoxError> {
        let mut created = 0;
        for record in records {
            if self.create(record)?.is_some() {
                created += 1;
            }
        }
        Ok(created)
    }

    /// All stored records in key order.
    fn records(&self) -> Result<Vec<PersistedRecord>, BoxError>;
}
