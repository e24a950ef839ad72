//! Simplified ByteTrack association.
//!
//! Confident boxes are matched to known tracks first; weak boxes may only
//! extend tracks left unmatched by that pass and never open new ones. A
//! student who dips in confidence for a frame therefore keeps their id.

use std::collections::HashSet;

use crate::detection::domain::face_tracker::TrackId;
use crate::shared::bounding_box::BoundingBox;

/// A detector output awaiting association.
#[derive(Clone, Debug)]
pub struct ScoredBox {
    pub bbox: BoundingBox,
    pub score: f64,
}

/// A box that was associated with a live track this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedBox {
    pub id: TrackId,
    pub bbox: BoundingBox,
}

const HIGH_THRESH: f64 = 0.5;
const MATCH_THRESH: f64 = 0.3;

#[derive(Clone, Debug)]
struct TrackState {
    id: TrackId,
    bbox: BoundingBox,
    frames_lost: usize,
    matched: bool,
}

pub struct ByteTracker {
    tracks: Vec<TrackState>,
    next_id: TrackId,
    max_lost: usize,
}

impl ByteTracker {
    pub fn new(max_lost: usize) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            max_lost,
        }
    }

    /// Associates one frame of boxes and returns the tracks seen in it.
    ///
    /// Output follows track creation order.
    pub fn update(&mut self, boxes: &[ScoredBox]) -> Vec<TrackedBox> {
        let (high, low): (Vec<_>, Vec<_>) = boxes
            .iter()
            .enumerate()
            .partition(|(_, b)| b.score >= HIGH_THRESH);

        for track in &mut self.tracks {
            track.matched = false;
        }
        let num_existing = self.tracks.len();

        let claimed = self.associate(&high);
        self.associate(&low);

        for (i, b) in &high {
            if !claimed.contains(i) {
                self.tracks.push(TrackState {
                    id: self.next_id,
                    bbox: b.bbox,
                    frames_lost: 0,
                    matched: true,
                });
                self.next_id += 1;
            }
        }

        for track in self.tracks.iter_mut().take(num_existing) {
            if !track.matched {
                track.frames_lost += 1;
            }
        }
        let max_lost = self.max_lost;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        // Lost tracks stay internal so they can be re-acquired.
        self.tracks
            .iter()
            .filter(|t| t.matched)
            .map(|t| TrackedBox {
                id: t.id,
                bbox: t.bbox,
            })
            .collect()
    }

    /// Greedy IoU matching of `candidates` against still-unmatched tracks.
    /// Returns the candidate indices that were claimed.
    fn associate(&mut self, candidates: &[(usize, &ScoredBox)]) -> HashSet<usize> {
        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate().filter(|(_, t)| !t.matched) {
            for (ci, candidate) in candidates {
                let iou = track.bbox.iou(&candidate.bbox);
                if iou >= MATCH_THRESH {
                    pairs.push((ti, *ci, iou));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut used_tracks = HashSet::new();
        let mut claimed = HashSet::new();
        for (ti, ci, _) in pairs {
            if used_tracks.contains(&ti) || claimed.contains(&ci) {
                continue;
            }
            used_tracks.insert(ti);
            claimed.insert(ci);

            let Some(bbox) = candidates.iter().find(|(i, _)| *i == ci).map(|(_, b)| b.bbox) else {
                continue;
            };
            let track = &mut self.tracks[ti];
            track.bbox = bbox;
            track.frames_lost = 0;
            track.matched = true;
        }
        claimed
    }
}
