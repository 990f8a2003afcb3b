//! Separation of a detector image stack into sample, open beam and dark current stacks.
//!
//! The image key log marks the start of a run of frames of one role. An entry governs a single
//! frame, the first frame at or after its time stamp that no earlier entry has claimed, except
//! the last entry which governs every remaining frame. Entries that fall in the same gap
//! between frames (or before the first frame) therefore claim consecutive frames, and no frame
//! is governed by two entries. When the log holds one entry per frame this is simply
//! "frame i has the role of log entry i".
use std::ops::Range;
use strum::IntoEnumIterator;

use super::error::ClassifyError;
use super::image_key::ImageKey;
use super::image_stack::{AllImageStacks, ImageStack};
use super::time_log::TimeLog;

/// Frame range governed by each image key entry, in log order. The ranges never overlap.
fn governed_ranges(times: &[i64], image_keys: &TimeLog<i64>) -> Vec<(i64, Range<usize>)> {
    let n_frames = times.len();
    let n_entries = image_keys.len();
    let mut claimed = 0;
    let mut ranges = Vec::with_capacity(n_entries);
    for (idx, entry) in image_keys.entries().iter().enumerate() {
        let start = times.partition_point(|t| *t < entry.time).max(claimed);
        let end = if idx + 1 == n_entries {
            n_frames
        } else {
            (start + 1).min(n_frames)
        };
        let start = start.min(end);
        claimed = end;
        ranges.push((entry.value, start..end));
    }
    ranges
}

/// Slices of `stack` whose image key entry matches `key`, in log order.
fn slice_stack_by_key(
    stack: &ImageStack,
    image_keys: &TimeLog<i64>,
    key: ImageKey,
) -> Vec<ImageStack> {
    governed_ranges(stack.time(), image_keys)
        .into_iter()
        .filter(|(code, range)| ImageKey::from_index(*code) == Some(key) && !range.is_empty())
        .map(|(_, range)| stack.slice_frames(range.start, range.end))
        .collect()
}

/// Collect every frame with the role `key` into one stack, keeping chronological order.
///
/// `stack` must be sorted by time. Fails if no frame has the requested role.
pub fn retrieve_images_by_key(
    stack: &ImageStack,
    image_keys: &TimeLog<i64>,
    key: ImageKey,
) -> Result<ImageStack, ClassifyError> {
    let slices = slice_stack_by_key(stack, image_keys, key);
    let images = ImageStack::concat(&slices).ok_or(ClassifyError::NoImages(key))?;
    spdlog::debug!("Found {} {} images", images.n_frames(), key);
    Ok(images)
}

pub fn retrieve_sample_images(
    stack: &ImageStack,
    image_keys: &TimeLog<i64>,
) -> Result<ImageStack, ClassifyError> {
    retrieve_images_by_key(stack, image_keys, ImageKey::Sample)
}

pub fn retrieve_open_beam_images(
    stack: &ImageStack,
    image_keys: &TimeLog<i64>,
) -> Result<ImageStack, ClassifyError> {
    retrieve_images_by_key(stack, image_keys, ImageKey::OpenBeam)
}

pub fn retrieve_dark_current_images(
    stack: &ImageStack,
    image_keys: &TimeLog<i64>,
) -> Result<ImageStack, ClassifyError> {
    retrieve_images_by_key(stack, image_keys, ImageKey::DarkCurrent)
}

/// Separate the stack into all three roles. Fails if any role has no frames.
pub fn separate_image_by_keys(
    stack: &ImageStack,
    image_keys: &TimeLog<i64>,
) -> Result<AllImageStacks, ClassifyError> {
    let n_unknown = image_keys
        .values()
        .filter(|code| ImageKey::from_index(**code).is_none())
        .count();
    if n_unknown > 0 {
        spdlog::debug!("{n_unknown} image key entries have an unknown code and are ignored");
    }
    let mut stacks = AllImageStacks::new();
    for key in ImageKey::iter() {
        stacks.insert(key, retrieve_images_by_key(stack, image_keys, key)?);
    }
    let n_classified: usize = stacks.values().map(|s| s.n_frames()).sum();
    if n_classified < stack.n_frames() {
        spdlog::debug!(
            "{} of {} frames are not governed by any image key entry",
            stack.n_frames() - n_classified,
            stack.n_frames()
        );
    }
    Ok(stacks)
}
