use crate::attendance::domain::observation::Observation;
use crate::attendance::domain::record_store::{NewRecord, RecordKey, RecordStore};
use crate::attendance::domain::track_resolver::ResolvedTracks;
use crate::shared::BoxError;

/// Outcome of persisting one run's observations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub created: usize,
    /// Observations whose key was already stored.
    pub duplicates: usize,
    /// Observations dropped because their track never resolved.
    pub unresolved: usize,
}

/// Persists buffered observations under their tracks' resolved identities.
pub struct RecordWriter<'a> {
    store: &'a dyn RecordStore,
    class_id: i64,
}

impl<'a> RecordWriter<'a> {
    pub fn new(store: &'a dyn RecordStore, class_id: i64) -> Self {
        Self { store, class_id }
    }

    pub fn write(
        &self,
        observations: &[Observation],
        resolved: &ResolvedTracks,
    ) -> Result<WriteSummary, BoxError> {
        let mut unresolved = 0;
        let mut pending = Vec::with_capacity(observations.len());
        for obs in observations {
            let Some(identity) = resolved.identity_of(obs.track_id) else {
                unresolved += 1;
                continue;
            };
            pending.push(NewRecord {
                key: RecordKey {
                    identity: identity.to_string(),
                    class_id: self.class_id,
                    frame_id: obs.frame_id,
                },
                emotion: obs.emotion.clone(),
            });
        }

        let attempted = pending.len();
        let created = self.store.create_all(pending)?;
        Ok(WriteSummary {
            created,
            duplicates: attempted - created,
            unresolved,
        })
    }
}
