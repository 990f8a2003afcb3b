//! Image tools used to judge and shrink reduced images.
use ndarray::{s, Array2, ArrayView2};
use strum_macros::{Display, EnumIter, EnumString};

use super::error::AnalysisError;
use super::image_stack::ImageStack;

/// Reduction applied to each block when resampling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ResampleMethod {
    #[default]
    Sum,
    Mean,
    Max,
    Min,
}

impl ResampleMethod {
    fn reduce(&self, block: ArrayView2<f64>) -> f64 {
        match self {
            Self::Sum => block.sum(),
            Self::Mean => block.sum() / block.len() as f64,
            Self::Max => block.fold(f64::NEG_INFINITY, |acc, v| acc.max(*v)),
            Self::Min => block.fold(f64::INFINITY, |acc, v| acc.min(*v)),
        }
    }
}

/// Reduce every `block_sizes[0] x block_sizes[1]` block of `image` to a single pixel.
///
/// The image shape must be divisible by the block sizes.
pub fn resample(
    image: ArrayView2<f64>,
    block_sizes: [usize; 2],
    method: ResampleMethod,
) -> Result<Array2<f64>, AnalysisError> {
    let [b0, b1] = block_sizes;
    if b0 == 0 || b1 == 0 {
        return Err(AnalysisError::ZeroBlock(block_sizes));
    }
    let (n0, n1) = image.dim();
    if n0 % b0 != 0 || n1 % b1 != 0 {
        return Err(AnalysisError::NotDivisible {
            shape: [n0, n1],
            blocks: block_sizes,
        });
    }
    Ok(Array2::from_shape_fn((n0 / b0, n1 / b1), |(i, j)| {
        method.reduce(image.slice(s![i * b0..(i + 1) * b0, j * b1..(j + 1) * b1]))
    }))
}

/// Discrete Laplacian with the 3x3 kernel (centre 8, neighbours -1).
///
/// Only pixels with a full neighbourhood are kept, so the result is two pixels smaller than
/// the input along each axis.
pub fn laplace_2d(image: ArrayView2<f64>) -> Array2<f64> {
    let (n0, n1) = image.dim();
    if n0 < 3 || n1 < 3 {
        return Array2::zeros((n0.saturating_sub(2), n1.saturating_sub(2)));
    }
    let mut out = image.slice(s![1..n0 - 1, 1..n1 - 1]).to_owned() * 9.0;
    for di in 0..3 {
        for dj in 0..3 {
            out -= &image.slice(s![di..n0 - 2 + di, dj..n1 - 2 + dj]);
        }
    }
    out
}

/// Sum of the absolute Laplacian. Larger values mean more fine detail.
pub fn sharpness(image: ArrayView2<f64>) -> f64 {
    laplace_2d(image).iter().map(|v| v.abs()).sum()
}

pub fn sharpness_per_frame(stack: &ImageStack) -> Vec<f64> {
    (0..stack.n_frames())
        .map(|index| sharpness(stack.frame(index)))
        .collect()
}
