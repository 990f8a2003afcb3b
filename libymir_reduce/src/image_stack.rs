use ndarray::{concatenate, s, Array3, ArrayView2, Axis};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use super::image_key::ImageKey;

/// Image stacks separated by their ImageKey
pub type AllImageStacks = BTreeMap<ImageKey, ImageStack>;

/// An ordered stack of detector frames.
///
/// `data` has the dimensions (time, dim_1, dim_2) and is shared between copies of a stack, so
/// attaching a coordinate makes a new stack without touching the pixels of the original.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStack {
    time: Vec<i64>,
    data: Arc<Array3<f64>>,
    rotation_angle: Option<Vec<f64>>,
}

impl ImageStack {
    /// Create a stack. Returns None if the number of time stamps does not match the number of
    /// frames
    pub fn new(time: Vec<i64>, data: Array3<f64>) -> Option<Self> {
        if time.len() != data.len_of(Axis(0)) {
            return None;
        }
        Some(Self {
            time,
            data: Arc::new(data),
            rotation_angle: None,
        })
    }

    pub fn time(&self) -> &[i64] {
        &self.time
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn rotation_angle(&self) -> Option<&[f64]> {
        self.rotation_angle.as_deref()
    }

    pub fn n_frames(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Shape of a single frame as (dim_1, dim_2)
    pub fn frame_shape(&self) -> (usize, usize) {
        (self.data.len_of(Axis(1)), self.data.len_of(Axis(2)))
    }

    pub fn frame(&self, index: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), index)
    }

    /// Return a copy sorted by time. Frames with equal time stamps keep their order.
    pub fn sort_by_time(&self) -> Self {
        if self.time.windows(2).all(|pair| pair[0] <= pair[1]) {
            return self.clone();
        }
        let mut order: Vec<usize> = (0..self.n_frames()).collect();
        order.sort_by_key(|idx| self.time[*idx]);
        Self {
            time: order.iter().map(|idx| self.time[*idx]).collect(),
            data: Arc::new(self.data.select(Axis(0), &order)),
            rotation_angle: self
                .rotation_angle
                .as_ref()
                .map(|angles| order.iter().map(|idx| angles[*idx]).collect()),
        }
    }

    /// Copy the frames in the index range `[start, end)`. The range is clamped to the stack.
    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.n_frames());
        let start = start.min(end);
        Self {
            time: self.time[start..end].to_vec(),
            data: Arc::new(self.data.slice(s![start..end, .., ..]).to_owned()),
            rotation_angle: self
                .rotation_angle
                .as_ref()
                .map(|angles| angles[start..end].to_vec()),
        }
    }

    /// Concatenate stacks along time, in the order given.
    ///
    /// Returns None if there are no stacks or their frame shapes differ. The rotation angle is
    /// kept only if every stack carries one.
    pub fn concat(stacks: &[ImageStack]) -> Option<Self> {
        let first = stacks.first()?;
        if stacks.len() == 1 {
            return Some(first.clone());
        }
        let views: Vec<_> = stacks.iter().map(|stack| stack.data.view()).collect();
        let data = concatenate(Axis(0), &views).ok()?;
        let time = stacks
            .iter()
            .flat_map(|stack| stack.time.iter().copied())
            .collect();
        let rotation_angle = stacks
            .iter()
            .map(|stack| stack.rotation_angle.clone())
            .collect::<Option<Vec<Vec<f64>>>>()
            .map(|angles| angles.concat());
        Some(Self {
            time,
            data: Arc::new(data),
            rotation_angle,
        })
    }

    /// Return a copy of the stack with the rotation angle coordinate attached.
    ///
    /// Returns None if the number of angles does not match the number of frames.
    pub fn with_rotation_angle(&self, angles: Vec<f64>) -> Option<Self> {
        if angles.len() != self.n_frames() {
            return None;
        }
        Some(Self {
            time: self.time.clone(),
            data: Arc::clone(&self.data),
            rotation_angle: Some(angles),
        })
    }

    /// Return a copy with the same coordinates and new pixel data of the same shape
    pub fn with_data(&self, data: Array3<f64>) -> Option<Self> {
        if data.shape() != self.data.shape() {
            return None;
        }
        Some(Self {
            time: self.time.clone(),
            data: Arc::new(data),
            rotation_angle: self.rotation_angle.clone(),
        })
    }

    /// Copy the pixels in `dim_1` x `dim_2` of every frame. Ranges are clamped to the frame.
    pub fn crop_pixels(&self, dim_1: Range<usize>, dim_2: Range<usize>) -> Self {
        let (size_1, size_2) = self.frame_shape();
        let end_1 = dim_1.end.min(size_1);
        let end_2 = dim_2.end.min(size_2);
        let start_1 = dim_1.start.min(end_1);
        let start_2 = dim_2.start.min(end_2);
        Self {
            time: self.time.clone(),
            data: Arc::new(
                self.data
                    .slice(s![.., start_1..end_1, start_2..end_2])
                    .to_owned(),
            ),
            rotation_angle: self.rotation_angle.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn shares_data_with(&self, other: &ImageStack) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}
