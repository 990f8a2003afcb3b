//! Normalization of sample images against open beam and dark current images.
//!
//! ```text
//! OpenBeam          = mean(open_beam, 'time')
//! DarkCurrent       = mean(dark_current, 'time')
//! Background        = max(background_threshold, OpenBeam - DarkCurrent)
//! CleansedSample_i  = max(sample_threshold, Sample_i - DarkCurrent)
//! ScaleFactor       = mean(Background) / mean(CleansedSample)
//! NormalizedSample_i = CleansedSample_i / Background * ScaleFactor
//! ```
//!
//! The thresholds default to 1 count for the background and 0 counts for the samples. Pixels
//! below a threshold are raised to it.
use ndarray::{Array2, Array3, ArrayD, Axis, Dimension, Zip};
use num_traits::{FromPrimitive, Zero};
use std::ops::{Add, Div};

use super::error::NormalizeError;
use super::image_stack::ImageStack;

/// Default floor of the background image, in counts
pub const DEFAULT_BACKGROUND_THRESHOLD: f64 = 1.0;
/// Default floor of the cleansed sample images, in counts
pub const DEFAULT_SAMPLE_THRESHOLD: f64 = 0.0;

/// Calculate the mean over all dimensions, one dimension at a time.
///
/// Reducing a single axis per pass keeps every partial sum small, so large integer stacks do not
/// overflow the accumulator the way a single whole-array sum would. Returns None for empty input.
pub fn mean_all_dims<A, D>(data: &ndarray::Array<A, D>) -> Option<A>
where
    A: Clone + Zero + FromPrimitive + Add<Output = A> + Div<Output = A>,
    D: Dimension,
{
    let mut reduced: ArrayD<A> = data.view().into_dyn().to_owned();
    while reduced.ndim() > 0 {
        reduced = reduced.mean_axis(Axis(0))?;
    }
    reduced.first().cloned()
}

fn average_stack(stack: &ImageStack, name: &'static str) -> Result<Array2<f64>, NormalizeError> {
    stack
        .data()
        .mean_axis(Axis(0))
        .ok_or(NormalizeError::EmptyStack(name))
}

fn check_shape(lhs: &[usize], rhs: &[usize]) -> Result<(), NormalizeError> {
    if lhs != rhs {
        return Err(NormalizeError::ShapeMismatch(lhs.to_vec(), rhs.to_vec()));
    }
    Ok(())
}

fn with_pixels(stack: &ImageStack, data: Array3<f64>) -> Result<ImageStack, NormalizeError> {
    let shape = data.shape().to_vec();
    stack
        .with_data(data)
        .ok_or_else(|| NormalizeError::ShapeMismatch(stack.data().shape().to_vec(), shape))
}

fn floor_at(value: f64, threshold: f64) -> f64 {
    if value < threshold {
        threshold
    } else {
        value
    }
}

/// Average the open beam image stack over time
pub fn average_open_beam_images(open_beam: &ImageStack) -> Result<Array2<f64>, NormalizeError> {
    spdlog::info!("Computing average open beam image assuming constant exposure time.");
    average_stack(open_beam, "open beam")
}

/// Average the dark current image stack over time
pub fn average_dark_current_images(
    dark_current: &ImageStack,
) -> Result<Array2<f64>, NormalizeError> {
    spdlog::info!("Computing average dark current image assuming constant exposure time.");
    average_stack(dark_current, "dark current")
}

/// Difference of the averaged open beam and dark current images, before any threshold
pub fn subtract_dark_current_image(
    open_beam: &Array2<f64>,
    dark_current: &Array2<f64>,
) -> Result<Array2<f64>, NormalizeError> {
    check_shape(open_beam.shape(), dark_current.shape())?;
    Ok(open_beam - dark_current)
}

/// Raise every background pixel below `threshold` to `threshold`
pub fn apply_threshold_to_background_image(
    background: &Array2<f64>,
    threshold: f64,
) -> Array2<f64> {
    background.mapv(|pixel| floor_at(pixel, threshold))
}

/// Calculate the background image, `max(1, open_beam - dark_current)` for every pixel
pub fn calculate_white_beam_background(
    open_beam: &Array2<f64>,
    dark_current: &Array2<f64>,
) -> Result<Array2<f64>, NormalizeError> {
    let difference = subtract_dark_current_image(open_beam, dark_current)?;
    Ok(apply_threshold_to_background_image(
        &difference,
        DEFAULT_BACKGROUND_THRESHOLD,
    ))
}

/// Subtract the averaged dark current image from every sample frame
pub fn cleanse_sample_images(
    samples: &ImageStack,
    dark_current: &Array2<f64>,
) -> Result<ImageStack, NormalizeError> {
    check_shape(&samples.data().shape()[1..], dark_current.shape())?;
    let cleansed = samples.data() - &dark_current.view().insert_axis(Axis(0));
    with_pixels(samples, cleansed)
}

/// Raise every sample pixel below `threshold` to `threshold`, keeping the coordinates
pub fn apply_threshold_to_sample_images(
    samples: &ImageStack,
    threshold: f64,
) -> Result<ImageStack, NormalizeError> {
    with_pixels(samples, samples.data().mapv(|pixel| floor_at(pixel, threshold)))
}

pub fn average_background_pixel_counts(background: &Array2<f64>) -> Result<f64, NormalizeError> {
    background
        .mean()
        .ok_or(NormalizeError::EmptyStack("background"))
}

/// Average pixel counts of the cleansed sample stack, reduced one dimension at a time
pub fn average_sample_pixel_counts(cleansed: &ImageStack) -> Result<f64, NormalizeError> {
    mean_all_dims(cleansed.data()).ok_or(NormalizeError::EmptyStack("sample"))
}

/// ScaleFactor = mean(background) / mean(cleansed sample)
pub fn calculate_scale_factor(average_background: f64, average_sample: f64) -> f64 {
    average_background / average_sample
}

/// Normalize every cleansed sample frame, `cleansed / background * factor`.
///
/// A negative scale factor means the averages were corrupted (most often by an overflowing
/// integer sum) and is rejected without producing any output.
pub fn normalize_sample_images(
    cleansed: &ImageStack,
    factor: f64,
    background: &Array2<f64>,
) -> Result<ImageStack, NormalizeError> {
    if factor < 0.0 {
        return Err(NormalizeError::NegativeScaleFactor(factor));
    }
    if !factor.is_finite() {
        spdlog::warn!("Scale factor is not finite ({factor}); normalized images will not be");
    }
    check_shape(&cleansed.data().shape()[1..], background.shape())?;
    let mut normalized = cleansed.data().clone();
    for mut frame in normalized.axis_iter_mut(Axis(0)) {
        Zip::from(&mut frame)
            .and(background)
            .for_each(|pixel, bg| *pixel = *pixel / *bg * factor);
    }
    with_pixels(cleansed, normalized)
}
