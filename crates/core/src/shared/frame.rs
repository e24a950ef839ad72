use ndarray::ArrayView3;

use crate::shared::bounding_box::CropRect;

/// A single decoded frame: contiguous RGB bytes in row-major order.
///
/// `index` is the decode position within the source. Crops carry the
/// index of the frame they were cut from.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// True when the frame holds no pixels (zero width or height).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `rect` into a new frame.
    ///
    /// `rect` is expected to lie within the frame; anything outside is
    /// cut off rather than read out of bounds.
    pub fn crop(&self, rect: &CropRect) -> Frame {
        let x1 = (rect.x as usize).min(self.width as usize);
        let y1 = (rect.y as usize).min(self.height as usize);
        let x2 = (rect.x as usize + rect.width as usize).min(self.width as usize);
        let y2 = (rect.y as usize + rect.height as usize).min(self.height as usize);
        let crop_w = x2.saturating_sub(x1);
        let crop_h = y2.saturating_sub(y1);

        let channels = self.channels as usize;
        let row_bytes = self.width as usize * channels;
        let mut data = Vec::with_capacity(crop_w * crop_h * channels);
        for row in y1..y1 + crop_h {
            let start = row * row_bytes + x1 * channels;
            data.extend_from_slice(&self.data[start..start + crop_w * channels]);
        }

        Frame::new(
            data,
            crop_w as u32,
            crop_h as u32,
            self.channels,
            self.index,
        )
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frame where each pixel's R channel encodes its column and G its row.
    fn coordinate_frame(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for row in 0..h {
            for col in 0..w {
                data.extend_from_slice(&[col as u8, row as u8, 0]);
            }
        }
        Frame::new(data, w, h, 3, 4)
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
        assert!(!frame.is_empty());
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let frame = Frame::new(vec![0u8; 24], 4, 2, 3, 0);
        assert_eq!(frame.as_ndarray().shape(), &[2, 4, 3]);
    }

    #[test]
    fn test_crop_copies_requested_window() {
        let frame = coordinate_frame(10, 8);
        let crop = frame.crop(&CropRect {
            x: 2,
            y: 3,
            width: 4,
            height: 2,
        });

        assert_eq!(crop.width(), 4);
        assert_eq!(crop.height(), 2);
        assert_eq!(crop.index(), 4);
        let arr = crop.as_ndarray();
        assert_eq!(arr[[0, 0, 0]], 2); // column
        assert_eq!(arr[[0, 0, 1]], 3); // row
        assert_eq!(arr[[1, 3, 0]], 5);
        assert_eq!(arr[[1, 3, 1]], 4);
    }

    #[test]
    fn test_crop_cuts_off_outside_frame() {
        let frame = coordinate_frame(10, 8);
        let crop = frame.crop(&CropRect {
            x: 8,
            y: 6,
            width: 5,
            height: 5,
        });
        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 2);
    }

    #[test]
    fn test_crop_empty_rect_yields_empty_frame() {
        let frame = coordinate_frame(10, 8);
        let crop = frame.crop(&CropRect {
            x: 3,
            y: 3,
            width: 0,
            height: 4,
        });
        assert!(crop.is_empty());
        assert!(crop.data().is_empty());
    }
}
