//! Classroom attendance from recorded video.
//!
//! Samples frames, tracks faces, matches each track against a gallery of
//! enrolled students, scores emotions per observed face and resolves every
//! track to one identity before writing deduplicated attendance records.

pub mod attendance;
pub mod detection;
pub mod emotion;
pub mod error;
pub mod pipeline;
pub mod recognition;
pub mod shared;
pub mod video;
