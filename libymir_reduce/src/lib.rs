//! # ymir_reduce
//!
//! ymir_reduce is a data reduction toolkit for the YMIR neutron imaging instrument, written in
//! Rust. It reads histogram-mode detector images and motion sensor logs from NeXus (HDF5)
//! files, sorts every frame into sample, open beam or dark current images using the image key
//! log, attaches the rotation angle of the sample stage to each sample frame, normalizes the
//! sample images against the white beam background and exports the results as TIFF files.
//!
//! ## Installation
//!
//! Currently the only method of install is from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### HDF5
//!
//! Before building and running ymir_reduce, HDF5 must be installed. Typically this will be
//! installed using a package manager (homebrew, apt, etc), and the Rust libraries will auto
//! detect the location of the HDF install. If HDF5 is installed to a custom location, write
//! the following snippet into the file `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./ymir_reduce_cli` from the top
//! level repository. To use the CLI see the `ymir_reduce_cli` README.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! input_path: /data/ymir/small_ymir_images.hdf
//! source_dir: null
//! histogram_path: /entry/instrument/histogram_mode_detectors
//! detector_name: orca
//! sensor_name: motion_cabinet_2
//! crop:
//!   min_dim_1: null
//!   max_dim_1: null
//!   min_dim_2: null
//!   max_dim_2: null
//! background_threshold: 1.0
//! sample_threshold: 0.0
//! output_path: /data/ymir/tiff
//! normalized_path: null
//! merge_images: false
//! overwrite: false
//! prefixes:
//!   sample: sample
//!   open_beam: ob
//!   dark_current: dc
//! ```
//!
//! - `source_dir`: if set, `input_path` is a file name in this directory, copied into the
//!   data cache (`YMIR_DATA_DIR`, or a directory under the system temporary directory) first
//! - `histogram_path`, `detector_name`: location of the detector group in the NeXus file
//! - `sensor_name`: motion cabinet holding the `rotation_stage_readback` log
//! - `crop`: half-open pixel ranges `[min, max)` kept from every frame, `null` keeps the edge
//! - `background_threshold`, `sample_threshold`: background and dark current subtracted sample
//!   pixels below these counts are raised to them
//! - `normalized_path`: if set, normalized sample images are written to this directory
//! - `merge_images`: write one multi-page TIFF per image role instead of one file per frame
//! - `overwrite`: remove files in the output directories before writing
//!
//! ## Output
//!
//! Individual images are named `{prefix}_{index}.tiff` (index zero padded to four digits),
//! merged images are named `{prefix}_0000_{number of frames}.tiff`. Pixels are written as
//! 64-bit floating point gray scale. The output directory must be empty unless `overwrite` is
//! set.
//!
//! ## Library
//!
//! The reduction steps are plain functions ([`time_log`], [`classify`], [`normalize`],
//! [`nexus`], [`tiff_writer`]) and are wired together as a declarative graph in [`workflow`]
//! using the [`pipeline`] module. Sample data files can be staged locally with a
//! [`cache::DataCache`].
pub mod analysis;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod image_key;
pub mod image_stack;
pub mod nexus;
pub mod normalize;
pub mod pipeline;
pub mod process;
pub mod status;
pub mod tiff_writer;
pub mod time_log;
pub mod workflow;
