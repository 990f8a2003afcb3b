use fxhash::FxHashMap;
use std::path::PathBuf;
use std::sync::mpsc::Sender;

use super::cache::DataCache;
use super::config::Config;
use super::error::{CacheError, PipelineError, ProcessorError};
use super::image_key::ImageKey;
use super::image_stack::{AllImageStacks, ImageStack};
use super::pipeline::{Key, Value};
use super::status::{ReductionStatus, Stage};
use super::tiff_writer::export_image_stacks_as_tiff;
use super::workflow::ymir_workflow_from_config;

/// Path of the NeXus input file. With a source directory the file is first staged into the data
/// cache and the cached copy is read.
fn stage_input(config: &Config) -> Result<PathBuf, CacheError> {
    let Some(source_dir) = config.source_dir.as_ref() else {
        return Ok(config.input_path.clone());
    };
    let name = config
        .input_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| CacheError::UnknownFile(config.input_path.to_string_lossy().to_string()))?;
    let mut cache = DataCache::from_env(source_dir, DataCache::imaging_registry());
    if !cache.is_registered(&name) {
        cache.register(&name, None);
    }
    spdlog::info!(
        "Staging {} from {} into {}",
        name,
        source_dir.to_string_lossy(),
        cache.cache_dir().to_string_lossy()
    );
    cache.fetch(&name)
}

fn take_stacks(outputs: &mut FxHashMap<Key, Value>) -> Result<AllImageStacks, PipelineError> {
    match outputs.remove(&Key::AllImageStacks) {
        Some(Value::Stacks(stacks)) => Ok(stacks),
        Some(_) => Err(PipelineError::TypeMismatch {
            key: Key::AllImageStacks,
            expected: "Stacks",
        }),
        None => Err(PipelineError::NotComputed(Key::AllImageStacks)),
    }
}

fn take_normalized(outputs: &mut FxHashMap<Key, Value>) -> Result<ImageStack, PipelineError> {
    match outputs.remove(&Key::NormalizedSampleImages) {
        Some(Value::Stack(stack)) => Ok(stack),
        Some(_) => Err(PipelineError::TypeMismatch {
            key: Key::NormalizedSampleImages,
            expected: "Stack",
        }),
        None => Err(PipelineError::NotComputed(Key::NormalizedSampleImages)),
    }
}

/// The main routine of ymir_reduce.
///
/// Loads the detector images named by the config, exports every image role to the output
/// directory and, if a normalized path is given, exports the normalized sample images there.
/// All requested values come from a single run of the workflow, so the file is read once.
/// Intended to be called from a separate thread; progress is reported through `tx`.
pub fn process(config: Config, tx: Sender<ReductionStatus>) -> Result<(), ProcessorError> {
    let input_path = stage_input(&config)?;
    let mut pipeline = ymir_workflow_from_config(&config);
    pipeline.set_param(Key::FilePath, Value::Path(input_path.clone()));
    let options = config.export_options();

    let targets: &[Key] = if config.has_normalized_path() {
        &[Key::AllImageStacks, Key::NormalizedSampleImages]
    } else {
        &[Key::AllImageStacks]
    };

    spdlog::info!(
        "Loading detector images from {}...",
        input_path.to_string_lossy()
    );
    tx.send(ReductionStatus::new(0.0, Stage::Loading, "images"))?;
    let mut outputs = pipeline.compute(targets)?;
    let stacks = take_stacks(&mut outputs)?;
    for (key, stack) in stacks.iter() {
        spdlog::info!("Found {} {} images", stack.n_frames(), key);
    }
    tx.send(ReductionStatus::new(1.0, Stage::Loading, "images"))?;

    export_image_stacks_as_tiff(&config.output_path, &stacks, &options, Some(&tx))?;
    spdlog::info!("Done exporting images.");

    if let Some(normalized_path) = config.normalized_path.as_ref() {
        let normalized = take_normalized(&mut outputs)?;
        spdlog::info!("Normalized {} sample images.", normalized.n_frames());
        tx.send(ReductionStatus::new(1.0, Stage::Normalizing, "sample"))?;

        let mut normalized_stacks = AllImageStacks::new();
        normalized_stacks.insert(ImageKey::Sample, normalized);
        export_image_stacks_as_tiff(normalized_path, &normalized_stacks, &options, Some(&tx))?;
        spdlog::info!("Done exporting normalized images.");
    }
    Ok(())
}
