use std::path::PathBuf;
use thiserror::Error;

use super::image_key::ImageKey;
use super::pipeline::Key;
use super::status::ReductionStatus;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Loader failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Could not open NeXus file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Detector data has {0} dimensions; expected 3 (time, dim_1, dim_2)")]
    BadDimensions(usize),
    #[error("Detector data has {frames} frames but {times} time stamps")]
    MismatchedTime { frames: usize, times: usize },
    #[error("Crop of {dim} to [{start}, {end}) leaves no pixels of {size}")]
    EmptyCrop {
        dim: &'static str,
        start: usize,
        end: usize,
        size: usize,
    },
    #[error("Log at {path} has {times} time stamps but {values} values")]
    MismatchedLog {
        path: String,
        times: usize,
        values: usize,
    },
}

#[derive(Debug, Clone, Error)]
pub enum ClassifyError {
    #[error("No images found for {0}")]
    NoImages(ImageKey),
}

#[derive(Debug, Clone, Error)]
pub enum NormalizeError {
    #[error("Scale factor must be positive, but got {0}")]
    NegativeScaleFactor(f64),
    #[error("Cannot average an empty {0} image stack")]
    EmptyStack(&'static str),
    #[error("Image shape mismatch -- {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Output directory {0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("Output directory {0:?} is not empty")]
    NotEmpty(PathBuf),
    #[error("Image stack for prefix {0} has no frames")]
    EmptyStack(String),
    #[error("Image size {0}x{1} does not fit in a TIFF image")]
    ImageTooLarge(usize, usize),
    #[error("TIFF export failed due to TIFF error: {0}")]
    TiffError(#[from] tiff::TiffError),
    #[error("TIFF export failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("TIFF export failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<ReductionStatus>),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No provider or parameter registered for {0}")]
    MissingInput(Key),
    #[error("Cycle detected while building the workflow graph at {0}")]
    Cycle(Key),
    #[error("Value for {key} has the wrong type; expected {expected}")]
    TypeMismatch { key: Key, expected: &'static str },
    #[error("Coordinate {0} does not have one value per frame")]
    MismatchedCoord(Key),
    #[error("Value for {0} was not computed by this plan")]
    NotComputed(Key),
    #[error("Provider failed due to Loader error: {0}")]
    LoaderError(#[from] LoaderError),
    #[error("Provider failed due to Classify error: {0}")]
    ClassifyError(#[from] ClassifyError),
    #[error("Provider failed due to Normalize error: {0}")]
    NormalizeError(#[from] NormalizeError),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("DataCache does not know file {0}")]
    UnknownFile(String),
    #[error("DataCache could not find {0:?} in the source directory")]
    BadFilePath(PathBuf),
    #[error("DataCache fetched {name} with {found} bytes; expected {expected} bytes")]
    SizeMismatch {
        name: String,
        found: u64,
        expected: u64,
    },
    #[error("DataCache failed to fetch {name} after {attempts} attempts: {source}")]
    RetriesExhausted {
        name: String,
        attempts: u32,
        source: std::io::Error,
    },
    #[error("DataCache failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("Image shape {shape:?} is not divisible by block sizes {blocks:?}")]
    NotDivisible {
        shape: [usize; 2],
        blocks: [usize; 2],
    },
    #[error("Block sizes must be non-zero, got {0:?}")]
    ZeroBlock([usize; 2]),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),
    #[error("Processor failed due to Export error: {0}")]
    ExportError(#[from] ExportError),
    #[error("Processor failed due to Cache error: {0}")]
    CacheError(#[from] CacheError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<ReductionStatus>),
}
