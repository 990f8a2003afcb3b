use hdf5::types::{VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use ndarray::Ix3;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::LoaderError;
use super::image_stack::ImageStack;
use super::time_log::{derive_log_coord_by_range, TimeLog};

/// Default location of the histogram mode detectors in a YMIR NeXus file
pub const DEFAULT_HISTOGRAM_PATH: &str = "/entry/instrument/histogram_mode_detectors";
/// Default image detector name
pub const DEFAULT_DETECTOR_NAME: &str = "orca";
/// Default rotation motion sensor name
pub const DEFAULT_SENSOR_NAME: &str = "motion_cabinet_2";
/// Rotation angle given to frames taken before the first rotation log entry
pub const ROTATION_OUT_OF_RANGE: f64 = -1.0;

const DATA_NAME: &str = "data";
const TIME_NAME: &str = "time";
const VALUE_NAME: &str = "value";
const IMAGE_KEY_NAME: &str = "image_key";
const UNITS_ATTR: &str = "units";
const EXPECTED_UNIT: &str = "counts";

/// Histogram mode detector data as stored in the file.
///
/// Frames are in file order; use [`separate_detector_images`] for the time sorted stack.
#[derive(Debug, Clone)]
pub struct HistogramModeDetector {
    pub images: ImageStack,
    pub image_keys: TimeLog<i64>,
    /// The unit found on disk, before it was corrected to counts
    pub original_unit: String,
}

/// Read a string attribute, whether it was written as unicode or ascii
fn read_string_attr(dataset: &Dataset, name: &str) -> Result<Option<String>, LoaderError> {
    if !dataset.attr_names()?.iter().any(|attr| attr == name) {
        return Ok(None);
    }
    let attr = dataset.attr(name)?;
    if let Ok(value) = attr.read_scalar::<VarLenUnicode>() {
        return Ok(Some(value.as_str().to_string()));
    }
    Ok(Some(attr.read_scalar::<VarLenAscii>()?.as_str().to_string()))
}

/// Read an NXlog-like group with parallel `time` and `value` datasets
fn read_log<T: hdf5::H5Type>(
    group: &Group,
    path: &str,
) -> Result<(Vec<i64>, Vec<T>), LoaderError> {
    let times = group.dataset(TIME_NAME)?.read_raw::<i64>()?;
    let values = group.dataset(VALUE_NAME)?.read_raw::<T>()?;
    if times.len() != values.len() {
        return Err(LoaderError::MismatchedLog {
            path: path.to_string(),
            times: times.len(),
            values: values.len(),
        });
    }
    Ok((times, values))
}

fn open_file(file_path: &Path) -> Result<File, LoaderError> {
    if !file_path.exists() {
        return Err(LoaderError::BadFilePath(file_path.to_path_buf()));
    }
    Ok(File::open(file_path)?)
}

/// Load the histogram mode detector `{histogram_path}/{detector_name}`.
///
/// The detector data is expected in counts. Any other unit is reported with a warning and
/// replaced by counts.
pub fn load_histogram_mode_detector(
    file_path: &Path,
    histogram_path: &str,
    detector_name: &str,
) -> Result<HistogramModeDetector, LoaderError> {
    let file = open_file(file_path)?;
    let detector_path = format!("{}/{}", histogram_path.trim_end_matches('/'), detector_name);
    spdlog::info!(
        "Loading histogram mode detector {} from {}",
        detector_path,
        file_path.to_string_lossy()
    );
    let detector = file.group(&detector_path)?;

    let data_set = detector.dataset(DATA_NAME)?;
    if data_set.ndim() != 3 {
        return Err(LoaderError::BadDimensions(data_set.ndim()));
    }
    let data = data_set.read::<f64, Ix3>()?;
    let time = detector.dataset(TIME_NAME)?.read_raw::<i64>()?;
    let frames = data.shape()[0];
    let n_times = time.len();
    let images = ImageStack::new(time, data).ok_or(LoaderError::MismatchedTime {
        frames,
        times: n_times,
    })?;

    let original_unit = read_string_attr(&data_set, UNITS_ATTR)?.unwrap_or_default();
    if original_unit != EXPECTED_UNIT {
        spdlog::warn!(
            "The unit of the histogram detector data is [{}]. It is expected to be [{}]. \
             The loader manually assigned the unit to be [{}].",
            original_unit,
            EXPECTED_UNIT,
            EXPECTED_UNIT
        );
    }

    let key_path = format!("{detector_path}/{IMAGE_KEY_NAME}");
    let (key_times, key_values) = read_log::<i64>(&detector.group(IMAGE_KEY_NAME)?, &key_path)?;
    spdlog::info!(
        "Loaded {} frames of {}x{} pixels and {} image key entries",
        images.n_frames(),
        images.frame_shape().0,
        images.frame_shape().1,
        key_times.len()
    );

    Ok(HistogramModeDetector {
        images,
        image_keys: TimeLog::from_columns(key_times, key_values),
        original_unit,
    })
}

/// The detector images sorted by time
pub fn separate_detector_images(detector: &HistogramModeDetector) -> ImageStack {
    detector.images.sort_by_time()
}

/// Pixel index bounds applied to every detector frame.
///
/// Each pair selects the half-open range `[min, max)` along one frame dimension. A missing
/// bound keeps the frame edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBounds {
    pub min_dim_1: Option<usize>,
    pub max_dim_1: Option<usize>,
    pub min_dim_2: Option<usize>,
    pub max_dim_2: Option<usize>,
}

impl CropBounds {
    pub fn is_full_frame(&self) -> bool {
        *self == Self::default()
    }
}

fn crop_range(
    dim: &'static str,
    min: Option<usize>,
    max: Option<usize>,
    size: usize,
) -> Result<std::ops::Range<usize>, LoaderError> {
    let start = min.unwrap_or(0);
    let end = max.unwrap_or(size).min(size);
    if start >= end {
        return Err(LoaderError::EmptyCrop {
            dim,
            start,
            end,
            size,
        });
    }
    Ok(start..end)
}

/// Crop every frame of the detector images to `bounds`. Fails if a dimension would be empty.
pub fn crop_detector_images(
    images: &ImageStack,
    bounds: &CropBounds,
) -> Result<ImageStack, LoaderError> {
    if bounds.is_full_frame() {
        return Ok(images.clone());
    }
    let (size_1, size_2) = images.frame_shape();
    let dim_1 = crop_range("dim_1", bounds.min_dim_1, bounds.max_dim_1, size_1)?;
    let dim_2 = crop_range("dim_2", bounds.min_dim_2, bounds.max_dim_2, size_2)?;
    spdlog::info!(
        "Cropping detector frames to dim_1 {:?}, dim_2 {:?}",
        dim_1,
        dim_2
    );
    Ok(images.crop_pixels(dim_1, dim_2))
}

/// The image key log of the detector
pub fn separate_image_key_logs(detector: &HistogramModeDetector) -> TimeLog<i64> {
    detector.image_keys.clone()
}

/// Load the rotation stage readback log of the motion sensor `sensor_name`
pub fn load_rotation_logs(
    file_path: &Path,
    sensor_name: &str,
) -> Result<TimeLog<f64>, LoaderError> {
    let file = open_file(file_path)?;
    let log_path = format!("entry/instrument/{sensor_name}/rotation_stage_readback");
    let (times, values) = read_log::<f64>(&file.group(&log_path)?, &log_path)?;
    spdlog::info!("Loaded {} rotation log entries from {}", times.len(), log_path);
    Ok(TimeLog::from_columns(times, values))
}

/// Rotation angle of every sample frame. Frames before the first log entry get -1.
pub fn derive_rotation_angle_coord(
    samples: &ImageStack,
    rotation_logs: &TimeLog<f64>,
) -> Vec<f64> {
    derive_log_coord_by_range(samples.time(), rotation_logs, ROTATION_OUT_OF_RANGE)
}

/// A copy of the sample stack with the rotation angle attached
pub fn apply_logs_as_coords(
    samples: &ImageStack,
    rotation_angles: Vec<f64>,
) -> Option<ImageStack> {
    samples.with_rotation_angle(rotation_angles)
}
