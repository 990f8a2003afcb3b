//! Providers of the YMIR image reduction and the workflow that wires them together.
use super::classify;
use super::config::Config;
use super::error::PipelineError;
use super::nexus::{self, CropBounds};
use super::normalize;
use super::pipeline::{Inputs, Key, Pipeline, Provider, Value};

fn load_histogram_mode_detector(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Detector(nexus::load_histogram_mode_detector(
        inputs.path(Key::FilePath)?,
        inputs.text(Key::HistogramModeDetectorsPath)?,
        inputs.text(Key::ImageDetectorName)?,
    )?))
}

fn separate_detector_images(inputs: &Inputs) -> Result<Value, PipelineError> {
    let sorted = nexus::separate_detector_images(inputs.detector(Key::HistogramModeDetector)?);
    let bounds = CropBounds {
        min_dim_1: *inputs.bound(Key::MinDim1)?,
        max_dim_1: *inputs.bound(Key::MaxDim1)?,
        min_dim_2: *inputs.bound(Key::MinDim2)?,
        max_dim_2: *inputs.bound(Key::MaxDim2)?,
    };
    Ok(Value::Stack(nexus::crop_detector_images(&sorted, &bounds)?))
}

fn separate_image_key_logs(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::KeyLog(nexus::separate_image_key_logs(
        inputs.detector(Key::HistogramModeDetector)?,
    )))
}

fn load_rotation_logs(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::FloatLog(nexus::load_rotation_logs(
        inputs.path(Key::FilePath)?,
        inputs.text(Key::RotationMotionSensorName)?,
    )?))
}

fn separate_image_by_keys(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Stacks(classify::separate_image_by_keys(
        inputs.stack(Key::HistogramModeDetectorData)?,
        inputs.key_log(Key::ImageKeyLogs)?,
    )?))
}

fn retrieve_sample_images(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Stack(classify::retrieve_sample_images(
        inputs.stack(Key::HistogramModeDetectorData)?,
        inputs.key_log(Key::ImageKeyLogs)?,
    )?))
}

fn retrieve_open_beam_images(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Stack(classify::retrieve_open_beam_images(
        inputs.stack(Key::HistogramModeDetectorData)?,
        inputs.key_log(Key::ImageKeyLogs)?,
    )?))
}

fn retrieve_dark_current_images(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Stack(classify::retrieve_dark_current_images(
        inputs.stack(Key::HistogramModeDetectorData)?,
        inputs.key_log(Key::ImageKeyLogs)?,
    )?))
}

fn derive_rotation_angle_coord(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Coord(nexus::derive_rotation_angle_coord(
        inputs.stack(Key::RawSampleImageStacks)?,
        inputs.float_log(Key::RotationLogs)?,
    )))
}

fn apply_logs_as_coords(inputs: &Inputs) -> Result<Value, PipelineError> {
    let samples = inputs.stack(Key::RawSampleImageStacks)?;
    let angles = inputs.coord(Key::RotationAngleCoord)?;
    nexus::apply_logs_as_coords(samples, angles.clone())
        .map(Value::Stack)
        .ok_or(PipelineError::MismatchedCoord(Key::RotationAngleCoord))
}

fn average_open_beam_images(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Image(normalize::average_open_beam_images(
        inputs.stack(Key::OpenBeamImageStacks)?,
    )?))
}

fn average_dark_current_images(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Image(normalize::average_dark_current_images(
        inputs.stack(Key::DarkCurrentImageStacks)?,
    )?))
}

fn subtract_dark_current_image(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Image(normalize::subtract_dark_current_image(
        inputs.image(Key::OpenBeamImage)?,
        inputs.image(Key::DarkCurrentImage)?,
    )?))
}

fn apply_threshold_to_background_image(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Image(normalize::apply_threshold_to_background_image(
        inputs.image(Key::RawBackgroundImage)?,
        *inputs.scalar(Key::BackgroundPixelThreshold)?,
    )))
}

fn cleanse_sample_images(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Stack(normalize::cleanse_sample_images(
        inputs.stack(Key::SampleImageStacks)?,
        inputs.image(Key::DarkCurrentImage)?,
    )?))
}

fn apply_threshold_to_sample_images(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Stack(normalize::apply_threshold_to_sample_images(
        inputs.stack(Key::RawCleansedSampleImages)?,
        *inputs.scalar(Key::SamplePixelThreshold)?,
    )?))
}

fn average_background_pixel_counts(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Scalar(normalize::average_background_pixel_counts(
        inputs.image(Key::BackgroundImage)?,
    )?))
}

fn average_sample_pixel_counts(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Scalar(normalize::average_sample_pixel_counts(
        inputs.stack(Key::CleansedSampleImages)?,
    )?))
}

fn calculate_scale_factor(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Scalar(normalize::calculate_scale_factor(
        *inputs.scalar(Key::AverageBackgroundPixelCounts)?,
        *inputs.scalar(Key::AverageSamplePixelCounts)?,
    )))
}

fn normalize_sample_images(inputs: &Inputs) -> Result<Value, PipelineError> {
    Ok(Value::Stack(normalize::normalize_sample_images(
        inputs.stack(Key::CleansedSampleImages)?,
        *inputs.scalar(Key::ScaleFactor)?,
        inputs.image(Key::BackgroundImage)?,
    )?))
}

/// Providers that load and separate the detector images
pub fn io_providers() -> Vec<Provider> {
    vec![
        Provider::new(
            Key::HistogramModeDetector,
            &[
                Key::FilePath,
                Key::HistogramModeDetectorsPath,
                Key::ImageDetectorName,
            ],
            load_histogram_mode_detector,
        ),
        Provider::new(
            Key::HistogramModeDetectorData,
            &[
                Key::HistogramModeDetector,
                Key::MinDim1,
                Key::MaxDim1,
                Key::MinDim2,
                Key::MaxDim2,
            ],
            separate_detector_images,
        ),
        Provider::new(
            Key::ImageKeyLogs,
            &[Key::HistogramModeDetector],
            separate_image_key_logs,
        ),
        Provider::new(
            Key::RotationLogs,
            &[Key::FilePath, Key::RotationMotionSensorName],
            load_rotation_logs,
        ),
        Provider::new(
            Key::AllImageStacks,
            &[Key::HistogramModeDetectorData, Key::ImageKeyLogs],
            separate_image_by_keys,
        ),
        Provider::new(
            Key::RawSampleImageStacks,
            &[Key::HistogramModeDetectorData, Key::ImageKeyLogs],
            retrieve_sample_images,
        ),
        Provider::new(
            Key::OpenBeamImageStacks,
            &[Key::HistogramModeDetectorData, Key::ImageKeyLogs],
            retrieve_open_beam_images,
        ),
        Provider::new(
            Key::DarkCurrentImageStacks,
            &[Key::HistogramModeDetectorData, Key::ImageKeyLogs],
            retrieve_dark_current_images,
        ),
        Provider::new(
            Key::RotationAngleCoord,
            &[Key::RawSampleImageStacks, Key::RotationLogs],
            derive_rotation_angle_coord,
        ),
        Provider::new(
            Key::SampleImageStacks,
            &[Key::RawSampleImageStacks, Key::RotationAngleCoord],
            apply_logs_as_coords,
        ),
    ]
}

/// Providers of the normalization steps
pub fn normalization_providers() -> Vec<Provider> {
    vec![
        Provider::new(
            Key::OpenBeamImage,
            &[Key::OpenBeamImageStacks],
            average_open_beam_images,
        ),
        Provider::new(
            Key::DarkCurrentImage,
            &[Key::DarkCurrentImageStacks],
            average_dark_current_images,
        ),
        Provider::new(
            Key::RawBackgroundImage,
            &[Key::OpenBeamImage, Key::DarkCurrentImage],
            subtract_dark_current_image,
        ),
        Provider::new(
            Key::BackgroundImage,
            &[Key::RawBackgroundImage, Key::BackgroundPixelThreshold],
            apply_threshold_to_background_image,
        ),
        Provider::new(
            Key::RawCleansedSampleImages,
            &[Key::SampleImageStacks, Key::DarkCurrentImage],
            cleanse_sample_images,
        ),
        Provider::new(
            Key::CleansedSampleImages,
            &[Key::RawCleansedSampleImages, Key::SamplePixelThreshold],
            apply_threshold_to_sample_images,
        ),
        Provider::new(
            Key::AverageBackgroundPixelCounts,
            &[Key::BackgroundImage],
            average_background_pixel_counts,
        ),
        Provider::new(
            Key::AverageSamplePixelCounts,
            &[Key::CleansedSampleImages],
            average_sample_pixel_counts,
        ),
        Provider::new(
            Key::ScaleFactor,
            &[
                Key::AverageBackgroundPixelCounts,
                Key::AverageSamplePixelCounts,
            ],
            calculate_scale_factor,
        ),
        Provider::new(
            Key::NormalizedSampleImages,
            &[
                Key::CleansedSampleImages,
                Key::ScaleFactor,
                Key::BackgroundImage,
            ],
            normalize_sample_images,
        ),
    ]
}

fn set_crop_bounds(pipeline: &mut Pipeline, bounds: &CropBounds) {
    pipeline.set_param(Key::MinDim1, Value::Bound(bounds.min_dim_1));
    pipeline.set_param(Key::MaxDim1, Value::Bound(bounds.max_dim_1));
    pipeline.set_param(Key::MinDim2, Value::Bound(bounds.min_dim_2));
    pipeline.set_param(Key::MaxDim2, Value::Bound(bounds.max_dim_2));
}

/// The YMIR workflow with the default detector, sensor, histogram path and thresholds, and no
/// cropping.
///
/// `Key::FilePath` must still be set before anything can be computed.
pub fn ymir_workflow() -> Pipeline {
    let mut providers = io_providers();
    providers.extend(normalization_providers());
    let mut pipeline = Pipeline::new(providers);
    pipeline.set_param(
        Key::HistogramModeDetectorsPath,
        Value::Text(String::from(nexus::DEFAULT_HISTOGRAM_PATH)),
    );
    pipeline.set_param(
        Key::ImageDetectorName,
        Value::Text(String::from(nexus::DEFAULT_DETECTOR_NAME)),
    );
    pipeline.set_param(
        Key::RotationMotionSensorName,
        Value::Text(String::from(nexus::DEFAULT_SENSOR_NAME)),
    );
    set_crop_bounds(&mut pipeline, &CropBounds::default());
    pipeline.set_param(
        Key::BackgroundPixelThreshold,
        Value::Scalar(normalize::DEFAULT_BACKGROUND_THRESHOLD),
    );
    pipeline.set_param(
        Key::SamplePixelThreshold,
        Value::Scalar(normalize::DEFAULT_SAMPLE_THRESHOLD),
    );
    pipeline
}

/// The YMIR workflow with every parameter taken from the config
pub fn ymir_workflow_from_config(config: &Config) -> Pipeline {
    let mut pipeline = ymir_workflow();
    pipeline.set_param(Key::FilePath, Value::Path(config.input_path.clone()));
    pipeline.set_param(
        Key::HistogramModeDetectorsPath,
        Value::Text(config.histogram_path.clone()),
    );
    pipeline.set_param(
        Key::ImageDetectorName,
        Value::Text(config.detector_name.clone()),
    );
    pipeline.set_param(
        Key::RotationMotionSensorName,
        Value::Text(config.sensor_name.clone()),
    );
    set_crop_bounds(&mut pipeline, &config.crop);
    pipeline.set_param(
        Key::BackgroundPixelThreshold,
        Value::Scalar(config.background_threshold),
    );
    pipeline.set_param(
        Key::SamplePixelThreshold,
        Value::Scalar(config.sample_threshold),
    );
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoaderError;
    use crate::image_key::ImageKey;
    use crate::nexus::tests::write_ymir_file;

    #[test]
    fn test_missing_file_path_reported_at_build() {
        let pipeline = ymir_workflow();
        match pipeline.build(&[Key::AllImageStacks]) {
            Err(PipelineError::MissingInput(key)) => assert_eq!(key, Key::FilePath),
            other => panic!("Expected MissingInput, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_order() {
        let mut pipeline = ymir_workflow();
        pipeline.set_param(Key::FilePath, Value::Path("unused.h5".into()));
        let steps = pipeline.build(&[Key::NormalizedSampleImages]).unwrap().steps();
        let position = |key: Key| steps.iter().position(|step| *step == key).unwrap();
        assert!(
            position(Key::HistogramModeDetector) < position(Key::HistogramModeDetectorData)
        );
        assert!(position(Key::RotationLogs) < position(Key::RotationAngleCoord));
        assert!(position(Key::BackgroundImage) < position(Key::ScaleFactor));
        assert_eq!(*steps.last().unwrap(), Key::NormalizedSampleImages);
        assert!(!steps.contains(&Key::AllImageStacks));
    }

    #[test]
    fn test_workflow_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ymir.h5");
        write_ymir_file(&path, "counts");

        let mut pipeline = ymir_workflow();
        pipeline.set_param(Key::FilePath, Value::Path(path));
        let outputs = pipeline
            .compute(&[
                Key::AllImageStacks,
                Key::SampleImageStacks,
                Key::NormalizedSampleImages,
            ])
            .unwrap();

        let Value::Stacks(stacks) = &outputs[&Key::AllImageStacks] else {
            panic!("Expected image stacks");
        };
        assert_eq!(stacks[&ImageKey::DarkCurrent].time(), &[0, 10]);
        assert_eq!(stacks[&ImageKey::OpenBeam].time(), &[20, 30]);
        assert_eq!(stacks[&ImageKey::Sample].time(), &[40, 50]);

        let Value::Stack(samples) = &outputs[&Key::SampleImageStacks] else {
            panic!("Expected a sample stack");
        };
        assert_eq!(samples.rotation_angle(), Some(&[0.0, 90.0][..]));

        let Value::Stack(normalized) = &outputs[&Key::NormalizedSampleImages] else {
            panic!("Expected normalized images");
        };
        assert_eq!(normalized.n_frames(), 2);
        assert_eq!(normalized.rotation_angle(), Some(&[0.0, 90.0][..]));
    }

    fn workflow_on(path: &std::path::Path) -> Pipeline {
        let mut pipeline = ymir_workflow();
        pipeline.set_param(Key::FilePath, Value::Path(path.to_path_buf()));
        pipeline
    }

    #[test]
    fn test_default_thresholds_and_bounds() {
        let pipeline = ymir_workflow();
        assert!(matches!(
            pipeline.param(Key::BackgroundPixelThreshold),
            Some(Value::Scalar(v)) if *v == 1.0
        ));
        assert!(matches!(
            pipeline.param(Key::SamplePixelThreshold),
            Some(Value::Scalar(v)) if *v == 0.0
        ));
        for key in [Key::MinDim1, Key::MaxDim1, Key::MinDim2, Key::MaxDim2] {
            assert!(matches!(pipeline.param(key), Some(Value::Bound(None))));
        }
    }

    #[test]
    fn test_thresholds_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ymir.h5");
        write_ymir_file(&path, "counts");

        // Open beam minus dark current is 20 everywhere, cleansed samples are 35 and 45
        let mut pipeline = workflow_on(&path);
        pipeline.set_param(Key::BackgroundPixelThreshold, Value::Scalar(30.0));
        pipeline.set_param(Key::SamplePixelThreshold, Value::Scalar(40.0));
        let outputs = pipeline
            .compute(&[
                Key::RawBackgroundImage,
                Key::BackgroundImage,
                Key::RawCleansedSampleImages,
                Key::CleansedSampleImages,
            ])
            .unwrap();

        let Value::Image(raw_background) = &outputs[&Key::RawBackgroundImage] else {
            panic!("Expected an image");
        };
        assert!(raw_background.iter().all(|pixel| *pixel == 20.0));
        let Value::Image(background) = &outputs[&Key::BackgroundImage] else {
            panic!("Expected an image");
        };
        assert!(background.iter().all(|pixel| *pixel == 30.0));

        let Value::Stack(raw_cleansed) = &outputs[&Key::RawCleansedSampleImages] else {
            panic!("Expected a stack");
        };
        assert!(raw_cleansed.frame(0).iter().all(|pixel| *pixel == 35.0));
        let Value::Stack(cleansed) = &outputs[&Key::CleansedSampleImages] else {
            panic!("Expected a stack");
        };
        assert!(cleansed.frame(0).iter().all(|pixel| *pixel == 40.0));
        assert!(cleansed.frame(1).iter().all(|pixel| *pixel == 45.0));
        assert_eq!(cleansed.rotation_angle(), Some(&[0.0, 90.0][..]));
    }

    #[test]
    fn test_crop_bounds_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ymir.h5");
        write_ymir_file(&path, "counts");

        let mut pipeline = workflow_on(&path);
        pipeline.set_param(Key::MinDim1, Value::Bound(Some(1)));
        pipeline.set_param(Key::MaxDim2, Value::Bound(Some(2)));
        let outputs = pipeline
            .compute(&[Key::AllImageStacks, Key::NormalizedSampleImages])
            .unwrap();
        let Value::Stacks(stacks) = &outputs[&Key::AllImageStacks] else {
            panic!("Expected image stacks");
        };
        let dark_current = &stacks[&ImageKey::DarkCurrent];
        assert_eq!(dark_current.frame_shape(), (1, 2));
        assert_eq!(dark_current.frame(0)[[0, 0]], 3.0);
        assert_eq!(dark_current.frame(0)[[0, 1]], 4.0);
        let Value::Stack(normalized) = &outputs[&Key::NormalizedSampleImages] else {
            panic!("Expected normalized images");
        };
        assert_eq!(normalized.frame_shape(), (1, 2));

        pipeline.set_param(Key::MinDim2, Value::Bound(Some(2)));
        assert!(matches!(
            pipeline.compute(&[Key::AllImageStacks]),
            Err(PipelineError::LoaderError(LoaderError::EmptyCrop { .. }))
        ));
    }

    #[test]
    fn test_workflow_from_config() {
        let config = Config {
            input_path: "/data/ymir.h5".into(),
            background_threshold: 2.5,
            crop: CropBounds {
                max_dim_1: Some(64),
                ..Default::default()
            },
            ..Default::default()
        };
        let pipeline = ymir_workflow_from_config(&config);
        assert!(matches!(
            pipeline.param(Key::BackgroundPixelThreshold),
            Some(Value::Scalar(v)) if *v == 2.5
        ));
        assert!(matches!(
            pipeline.param(Key::MaxDim1),
            Some(Value::Bound(Some(64)))
        ));
        assert!(matches!(pipeline.param(Key::MinDim1), Some(Value::Bound(None))));
        assert!(matches!(pipeline.param(Key::FilePath), Some(Value::Path(_))));
    }
}
