use std::collections::BTreeMap;

use crate::detection::domain::face_tracker::TrackId;
use crate::recognition::domain::identity_matcher::Candidate;

/// Distances recorded per candidate identity, in arrival order.
pub type CandidateVotes = BTreeMap<String, Vec<f64>>;

/// Append-only, run-scoped accumulator of identity votes per track.
///
/// Every candidate present under a track holds at least one distance.
/// A track whose detections never produced a usable candidate is still
/// present, with no candidates, so it can be reported as unresolved.
#[derive(Clone, Debug, Default)]
pub struct TrackVoteLedger {
    tracks: BTreeMap<TrackId, CandidateVotes>,
}

impl TrackVoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one detection's ranked candidates under `track_id`.
    ///
    /// Distances that are negative or not finite are not valid votes and
    /// are dropped with a warning. Returns the number of votes recorded.
    pub fn record_votes(&mut self, track_id: TrackId, candidates: &[Candidate]) -> usize {
        let entry = self.tracks.entry(track_id).or_default();
        let mut recorded = 0;
        for candidate in candidates {
            if !candidate.distance.is_finite() || candidate.distance < 0.0 {
                log::warn!(
                    "Ignoring vote for {} on track {track_id}: invalid distance {}",
                    candidate.identity,
                    candidate.distance
                );
                continue;
            }
            entry
                .entry(candidate.identity.clone())
                .or_default()
                .push(candidate.distance);
            recorded += 1;
        }
        recorded
    }

    pub fn candidates(&self, track_id: TrackId) -> Option<&CandidateVotes> {
        self.tracks.get(&track_id)
    }

    /// Tracks in ascending id order with their candidate votes.
    pub fn iter(&self) -> impl Iterator<Item = (TrackId, &CandidateVotes)> + '_ {
        self.tracks.iter().map(|(id, votes)| (*id, votes))
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn vote_count(&self) -> usize {
        self.tracks
            .values()
            .flat_map(|c| c.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
