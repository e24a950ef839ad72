use crate::error::AttendanceError;
use crate::shared::frame::Frame;

/// A frame chosen by the [`FrameSampler`].
#[derive(Clone, Debug)]
pub struct SampledFrame {
    pub frame: Frame,
    /// Emission counter: 0, 1, 2, ... in sampling order. Persisted as the
    /// record's frame id.
    pub sequence: u64,
    /// Decode position within the source video.
    pub source_index: usize,
}

/// Yields every `interval`-th decoded frame, starting with position 0.
///
/// Wraps any frame iterator. Decode errors pass through regardless of
/// position. Once the source is exhausted the sampler stays exhausted.
pub struct FrameSampler<I> {
    frames: I,
    interval: usize,
    position: usize,
    emitted: u64,
    done: bool,
}

impl<I> FrameSampler<I> {
    pub fn new(frames: I, interval: usize) -> Result<Self, AttendanceError> {
        if interval == 0 {
            return Err(AttendanceError::InvalidInterval(interval));
        }
        Ok(Self {
            frames,
            interval,
            position: 0,
            emitted: 0,
            done: false,
        })
    }
}

/// Frames a sampler emits for a source of `total_frames` decodable frames.
pub fn expected_samples(total_frames: usize, interval: usize) -> usize {
    if interval == 0 {
        return 0;
    }
    total_frames.div_ceil(interval)
}

impl<I, E> Iterator for FrameSampler<I>
where
    I: Iterator<Item = Result<Frame, E>>,
{
    type Item = Result<SampledFrame, E>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some(item) = self.frames.next() else {
                self.done = true;
                break;
            };
            let position = self.position;
            self.position += 1;

            let frame = match item {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e)),
            };
            if position % self.interval != 0 {
                continue;
            }

            let sequence = self.emitted;
            self.emitted += 1;
            return Some(Ok(SampledFrame {
                frame,
                sequence,
                source_index: position,
            }));
        }
        None
    }
}
