use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::attendance::domain::vote_ledger::{CandidateVotes, TrackVoteLedger};
use crate::detection::domain::face_tracker::TrackId;

/// Final identity decision for one track.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Resolved {
        identity: String,
        votes: usize,
        avg_distance: f64,
    },
    /// The track never received a vote. Its observations are not persisted.
    Unresolved,
}

impl Resolution {
    pub fn identity(&self) -> Option<&str> {
        match self {
            Resolution::Resolved { identity, .. } => Some(identity.as_str()),
            Resolution::Unresolved => None,
        }
    }
}

/// Resolution of every track seen in a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedTracks {
    by_track: BTreeMap<TrackId, Resolution>,
}

impl ResolvedTracks {
    /// `None` for unresolved tracks and for ids the run never saw.
    pub fn identity_of(&self, track_id: TrackId) -> Option<&str> {
        self.by_track.get(&track_id).and_then(Resolution::identity)
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Resolution> {
        self.by_track.get(&track_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrackId, &Resolution)> + '_ {
        self.by_track.iter().map(|(id, r)| (*id, r))
    }

    /// `(resolved, unresolved)` track counts.
    pub fn counts(&self) -> (usize, usize) {
        let resolved = self
            .by_track
            .values()
            .filter(|r| matches!(r, Resolution::Resolved { .. }))
            .count();
        (resolved, self.by_track.len() - resolved)
    }

    pub fn len(&self) -> usize {
        self.by_track.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_track.is_empty()
    }
}

/// Reduces each track's votes to one identity.
///
/// The candidate with the most votes wins. Equal counts go to the lower
/// mean distance, and exact ties after that go to the identity that sorts
/// first. The result depends only on the vote multiset.
pub struct TrackResolver;

impl TrackResolver {
    pub fn resolve(ledger: &TrackVoteLedger) -> ResolvedTracks {
        let by_track = ledger
            .iter()
            .map(|(track_id, candidates)| (track_id, Self::resolve_track(candidates)))
            .collect();
        ResolvedTracks { by_track }
    }

    pub fn resolve_track(candidates: &CandidateVotes) -> Resolution {
        let mut best: Option<(&str, usize, f64)> = None;

        // Candidates iterate in identity order, so only a strict improvement
        // may replace the current best.
        for (identity, distances) in candidates {
            let count = distances.len();
            if count == 0 {
                continue;
            }
            let avg = mean_distance(distances);
            let better = match best {
                None => true,
                Some((_, best_count, best_avg)) => match count.cmp(&best_count) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => avg < best_avg,
                },
            };
            if better {
                best = Some((identity.as_str(), count, avg));
            }
        }

        match best {
            Some((identity, votes, avg_distance)) => Resolution::Resolved {
                identity: identity.to_string(),
                votes,
                avg_distance,
            },
            None => Resolution::Unresolved,
        }
    }
}

/// Mean of `distances`, summed in ascending order so that every
/// permutation of the same votes gives a bit-identical result.
fn mean_distance(distances: &[f64]) -> f64 {
    let mut sorted = distances.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.iter().sum::<f64>() / sorted.len() as f64
}
