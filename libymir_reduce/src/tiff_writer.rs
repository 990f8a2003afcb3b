use ndarray::ArrayView2;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tiff::encoder::{colortype, TiffEncoder};

use super::error::ExportError;
use super::image_key::ImagePrefixMap;
use super::image_stack::{AllImageStacks, ImageStack};
use super::status::{ReductionStatus, Stage};

/// Options for writing image stacks to disk
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Write one multi-page file per image key instead of one file per frame
    pub merge_image_by_key: bool,
    /// Remove the files in the output directory before writing
    pub overwrite: bool,
    pub prefixes: ImagePrefixMap,
}

fn write_frame<W: Write + Seek>(
    encoder: &mut TiffEncoder<W>,
    frame: ArrayView2<f64>,
) -> Result<(), ExportError> {
    let (height, width) = frame.dim();
    let (Ok(tiff_width), Ok(tiff_height)) = (u32::try_from(width), u32::try_from(height)) else {
        return Err(ExportError::ImageTooLarge(width, height));
    };
    // Iteration is in logical (row major) order regardless of memory layout
    let buffer: Vec<f64> = frame.iter().copied().collect();
    encoder.write_image::<colortype::Gray64Float>(tiff_width, tiff_height, &buffer)?;
    Ok(())
}

fn create_encoder(path: &Path) -> Result<TiffEncoder<File>, ExportError> {
    let file = File::create(path)?;
    Ok(TiffEncoder::new(file)?)
}

fn log_written(path: &Path) {
    if let Ok(meta) = path.metadata() {
        spdlog::debug!(
            "Wrote {} ({})",
            path.to_string_lossy(),
            human_bytes::human_bytes(meta.len() as f64)
        );
    }
}

/// Write the whole stack into a single multi-page file named `{prefix}_0000_{n_frames}.tiff`
fn save_merged_images(
    stack: &ImageStack,
    prefix: &str,
    output_dir: &Path,
) -> Result<PathBuf, ExportError> {
    if stack.is_empty() {
        return Err(ExportError::EmptyStack(prefix.to_string()));
    }
    let image_path = output_dir.join(format!("{prefix}_0000_{:04}.tiff", stack.n_frames()));
    let mut encoder = create_encoder(&image_path)?;
    for idx in 0..stack.n_frames() {
        write_frame(&mut encoder, stack.frame(idx))?;
    }
    drop(encoder);
    log_written(&image_path);
    Ok(image_path)
}

/// Write every frame into its own file named `{prefix}_{index}.tiff`
fn save_individual_images(
    stack: &ImageStack,
    prefix: &str,
    output_dir: &Path,
    tx: Option<&Sender<ReductionStatus>>,
) -> Result<Vec<PathBuf>, ExportError> {
    let mut written = Vec::with_capacity(stack.n_frames());
    for idx in 0..stack.n_frames() {
        let image_path = output_dir.join(format!("{prefix}_{idx:04}.tiff"));
        let mut encoder = create_encoder(&image_path)?;
        write_frame(&mut encoder, stack.frame(idx))?;
        drop(encoder);
        log_written(&image_path);
        written.push(image_path);
        if let Some(tx) = tx {
            tx.send(ReductionStatus::new(
                (idx + 1) as f32 / stack.n_frames() as f32,
                Stage::Exporting,
                prefix,
            ))?;
        }
    }
    Ok(written)
}

/// The output directory must be an empty directory. A missing one is created.
fn validate_output_dir(output_dir: &Path) -> Result<(), ExportError> {
    if !output_dir.exists() {
        std::fs::create_dir_all(output_dir)?;
    } else if !output_dir.is_dir() {
        return Err(ExportError::NotADirectory(output_dir.to_path_buf()));
    } else if output_dir.read_dir()?.next().is_some() {
        return Err(ExportError::NotEmpty(output_dir.to_path_buf()));
    }
    Ok(())
}

/// Save image stacks as TIFF files in `output_dir`.
///
/// With `overwrite` the files already in `output_dir` are removed first. The directory is then
/// validated before any image is written. Returns the paths of the written files.
pub fn export_image_stacks_as_tiff(
    output_dir: &Path,
    image_stacks: &AllImageStacks,
    options: &ExportOptions,
    tx: Option<&Sender<ReductionStatus>>,
) -> Result<Vec<PathBuf>, ExportError> {
    if options.overwrite && output_dir.is_dir() {
        for item in output_dir.read_dir()? {
            let item_path = item?.path();
            spdlog::info!("Removing {}", item_path.to_string_lossy());
            std::fs::remove_file(item_path)?;
        }
    }

    validate_output_dir(output_dir)?;

    let mut written = Vec::new();
    for (key, stack) in image_stacks.iter() {
        let prefix = options.prefixes.get(key);
        spdlog::info!(
            "Exporting {} {} images to {}",
            stack.n_frames(),
            key,
            output_dir.to_string_lossy()
        );
        if options.merge_image_by_key {
            written.push(save_merged_images(stack, prefix, output_dir)?);
            if let Some(tx) = tx {
                tx.send(ReductionStatus::new(1.0, Stage::Exporting, prefix))?;
            }
        } else {
            written.extend(save_individual_images(stack, prefix, output_dir, tx)?);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_key::ImageKey;
    use ndarray::Array;
    use tiff::decoder::{Decoder, DecodingResult};

    fn stacks() -> AllImageStacks {
        let mut stacks = AllImageStacks::new();
        let sample = Array::from_shape_fn((3, 2, 4), |(t, i, j)| (t * 100 + i * 10 + j) as f64);
        stacks.insert(ImageKey::Sample, ImageStack::new(vec![0, 1, 2], sample).unwrap());
        let ob = Array::from_elem((2, 2, 4), 7.5);
        stacks.insert(ImageKey::OpenBeam, ImageStack::new(vec![3, 4], ob).unwrap());
        stacks
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = dir
            .read_dir()
            .unwrap()
            .map(|item| item.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_individual_images() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let written =
            export_image_stacks_as_tiff(&out, &stacks(), &ExportOptions::default(), None).unwrap();
        assert_eq!(written.len(), 5);
        assert_eq!(
            file_names(&out),
            vec![
                "ob_0000.tiff",
                "ob_0001.tiff",
                "sample_0000.tiff",
                "sample_0001.tiff",
                "sample_0002.tiff"
            ]
        );

        let mut decoder = Decoder::new(File::open(out.join("sample_0001.tiff")).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (4, 2));
        match decoder.read_image().unwrap() {
            DecodingResult::F64(values) => {
                assert_eq!(values, vec![100.0, 101.0, 102.0, 103.0, 110.0, 111.0, 112.0, 113.0])
            }
            _ => panic!("Expected 64-bit float pixels"),
        }
    }

    #[test]
    fn test_merged_images() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExportOptions {
            merge_image_by_key: true,
            ..Default::default()
        };
        export_image_stacks_as_tiff(dir.path(), &stacks(), &options, None).unwrap();
        assert_eq!(
            file_names(dir.path()),
            vec!["ob_0000_0002.tiff", "sample_0000_0003.tiff"]
        );

        let file = File::open(dir.path().join("sample_0000_0003.tiff")).unwrap();
        let mut decoder = Decoder::new(file).unwrap();
        let mut pages = 1;
        while decoder.more_images() {
            decoder.next_image().unwrap();
            pages += 1;
        }
        assert_eq!(pages, 3);
    }

    #[test]
    fn test_non_empty_dir_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("existing.txt"), "hello").unwrap();
        let result =
            export_image_stacks_as_tiff(dir.path(), &stacks(), &ExportOptions::default(), None);
        assert!(matches!(result, Err(ExportError::NotEmpty(_))));
        assert_eq!(file_names(dir.path()), vec!["existing.txt"]);
    }

    #[test]
    fn test_overwrite_clears_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("existing.txt"), "hello").unwrap();
        let options = ExportOptions {
            overwrite: true,
            merge_image_by_key: true,
            ..Default::default()
        };
        export_image_stacks_as_tiff(dir.path(), &stacks(), &options, None).unwrap();
        assert!(!dir.path().join("existing.txt").exists());
        assert_eq!(file_names(dir.path()).len(), 2);
    }

    #[test]
    fn test_file_as_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_a_dir");
        std::fs::write(&path, "hello").unwrap();
        let result = export_image_stacks_as_tiff(&path, &stacks(), &ExportOptions::default(), None);
        assert!(matches!(result, Err(ExportError::NotADirectory(_))));
    }

    #[test]
    fn test_progress_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        export_image_stacks_as_tiff(dir.path(), &stacks(), &ExportOptions::default(), Some(&tx))
            .unwrap();
        drop(tx);
        let statuses: Vec<ReductionStatus> = rx.iter().collect();
        assert_eq!(statuses.len(), 5);
        assert!(statuses.iter().all(|s| s.stage == Stage::Exporting));
        assert_eq!(statuses.last().unwrap().progress, 1.0);
    }
}
