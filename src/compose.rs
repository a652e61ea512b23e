//! Timeline recomposition
//!
//! Rebuilds a full-length video from a timing document and a directory of
//! (edited) keyframe images. Images are matched to scenes by position in
//! file name order; the scene's stored `filename` is not consulted. Scene
//! `i` is emitted as image `i` repeated `max(duration_frames, 1)` times.
//!
//! - The output is opened on the first image that decodes; its size becomes
//!   the canvas and the timing document's fps the output rate.
//! - An image that fails to decode is skipped: its scene emits no frames.
//! - Once images run out, remaining scenes are not written.
//! - Images of a different size than the canvas follow [`CanvasPolicy`].

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::encoding::{EncoderStats, FrameSink, OutputTarget};
use crate::error::{Error, Result};
use crate::images;
use crate::timing::TimingDocument;

/// What to do with an image whose size differs from the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasPolicy {
    /// Scale the image to the canvas size
    #[default]
    Resize,
    /// Fail the run
    Reject,
}

/// Outcome of a completed composition
#[derive(Debug, Clone)]
pub struct Composition {
    pub fps: f64,
    /// Scenes in the timing document
    pub timing_scenes: usize,
    /// Images found in the image directory
    pub input_images: usize,
    /// Scenes whose image decoded and was written
    pub scenes_written: u64,
    /// Output frames written
    pub frames_written: u64,
    /// Canvas size fixed by the first decoded image
    pub canvas: (u32, u32),
    /// Images that failed to decode
    pub skipped: Vec<PathBuf>,
    pub encoder: EncoderStats,
}

impl Composition {
    /// Length of the written video in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames_written as f64 / self.fps
    }
}

/// Compose `timing` with the images in `images_dir` into `target`
///
/// `progress` is called with `(scenes_written, total_scenes)` after each
/// scene that was written; skipped scenes do not advance it.
pub fn compose_timeline<T, F>(
    timing: &TimingDocument,
    images_dir: &Path,
    target: &mut T,
    policy: CanvasPolicy,
    mut progress: F,
) -> Result<Composition>
where
    T: OutputTarget,
    F: FnMut(u64, u64),
{
    if timing.scenes.is_empty() {
        return Err(Error::InvalidInput("Timing document has no scenes".into()));
    }
    if !images_dir.is_dir() {
        return Err(Error::not_found("Image directory", images_dir));
    }

    let image_paths = images::list_images(images_dir)?;
    if image_paths.is_empty() {
        return Err(Error::InvalidInput(format!(
            "No images found in {}",
            images_dir.display()
        )));
    }

    let total_scenes = timing.scenes.len() as u64;
    let mut sink: Option<T::Sink> = None;
    let mut canvas = (0u32, 0u32);
    let mut scenes_written = 0u64;
    let mut frames_written = 0u64;
    let mut skipped = Vec::new();

    for (scene, path) in timing.scenes.iter().zip(&image_paths) {
        let frame = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                skipped.push(path.clone());
                continue;
            }
        };

        if sink.is_none() {
            canvas = frame.dimensions();
            log::info!(
                "Composing {} scenes at {}x{}, {} fps",
                total_scenes,
                canvas.0,
                canvas.1,
                timing.fps
            );
            sink = Some(target.open(canvas.0, canvas.1, timing.fps)?);
        }

        let frame = fit_to_canvas(frame, canvas, policy, path)?;
        let repeat = scene.duration_frames.max(1);
        if let Some(sink) = sink.as_mut() {
            for _ in 0..repeat {
                sink.push_frame(&frame)?;
            }
        }

        scenes_written += 1;
        frames_written += repeat;
        progress(scenes_written, total_scenes);
    }

    let Some(sink) = sink else {
        return Err(Error::Compose(format!(
            "No image in {} could be decoded",
            images_dir.display()
        )));
    };

    if image_paths.len() < timing.scenes.len() {
        log::info!(
            "{} scenes have no image and were not written",
            timing.scenes.len() - image_paths.len()
        );
    }

    let encoder = sink.finish()?;

    Ok(Composition {
        fps: timing.fps,
        timing_scenes: timing.scenes.len(),
        input_images: image_paths.len(),
        scenes_written,
        frames_written,
        canvas,
        skipped,
        encoder,
    })
}

fn fit_to_canvas(frame: RgbImage, canvas: (u32, u32), policy: CanvasPolicy, path: &Path) -> Result<RgbImage> {
    if frame.dimensions() == canvas {
        return Ok(frame);
    }

    let (width, height) = frame.dimensions();
    match policy {
        CanvasPolicy::Resize => {
            log::debug!(
                "Resizing {} from {}x{} to {}x{}",
                path.display(),
                width,
                height,
                canvas.0,
                canvas.1
            );
            Ok(image::imageops::resize(&frame, canvas.0, canvas.1, FilterType::Triangle))
        }
        CanvasPolicy::Reject => Err(Error::InvalidInput(format!(
            "{} is {}x{}, expected {}x{}",
            path.display(),
            width,
            height,
            canvas.0,
            canvas.1
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::MemoryTarget;
    use crate::error::ErrorKind;
    use crate::timing::Scene;
    use image::Rgb;

    fn timing(durations: &[u64]) -> TimingDocument {
        TimingDocument {
            fps: 24.0,
            scenes: durations
                .iter()
                .enumerate()
                .map(|(i, &d)| Scene {
                    filename: format!("{:05}.png", i),
                    duration_frames: d,
                })
                .collect(),
        }
    }

    fn write_image(dir: &Path, name: &str, size: (u32, u32), value: u8) {
        RgbImage::from_pixel(size.0, size.1, Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_repeats_each_image_for_its_duration() {
        let dir = tempfile::tempdir().unwrap();
        for (i, v) in [10u8, 20, 30].iter().enumerate() {
            write_image(dir.path(), &format!("{:05}.png", i), (4, 2), *v);
        }

        let mut target = MemoryTarget::new();
        let mut progress = Vec::new();
        let result = compose_timeline(&timing(&[3, 1, 2]), dir.path(), &mut target, CanvasPolicy::Resize, |c, t| {
            progress.push((c, t))
        })
        .unwrap();

        assert_eq!(result.scenes_written, 3);
        assert_eq!(result.frames_written, 6);
        assert_eq!(result.encoder.frames_encoded, 6);
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(target.opened, vec![(4, 2, 24.0)]);

        let values: Vec<u8> = target.frames.lock().iter().map(|f| f.get_pixel(0, 0)[0]).collect();
        assert_eq!(values, vec![10, 10, 10, 20, 30, 30]);
    }

    #[test]
    fn test_fewer_images_than_scenes_stops_quietly() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "only.png", (2, 2), 50);

        let mut target = MemoryTarget::new();
        let result =
            compose_timeline(&timing(&[3, 1, 2]), dir.path(), &mut target, CanvasPolicy::Resize, |_, _| {}).unwrap();

        assert_eq!(result.scenes_written, 1);
        assert_eq!(result.frames_written, 3);
        assert_eq!(result.timing_scenes, 3);
        assert_eq!(result.input_images, 1);
        assert_eq!(target.frame_count(), 3);
    }

    #[test]
    fn test_aligns_by_position_not_filename() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a_edit.png", (2, 2), 1);
        write_image(dir.path(), "b_edit.png", (2, 2), 2);

        let mut target = MemoryTarget::new();
        compose_timeline(&timing(&[1, 2]), dir.path(), &mut target, CanvasPolicy::Resize, |_, _| {}).unwrap();

        let values: Vec<u8> = target.frames.lock().iter().map(|f| f.get_pixel(0, 0)[0]).collect();
        assert_eq!(values, vec![1, 2, 2]);
    }

    #[test]
    fn test_zero_duration_writes_one_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "00000.png", (2, 2), 9);

        let mut target = MemoryTarget::new();
        let result =
            compose_timeline(&timing(&[0]), dir.path(), &mut target, CanvasPolicy::Resize, |_, _| {}).unwrap();
        assert_eq!(result.frames_written, 1);
    }

    #[test]
    fn test_undecodable_image_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("00000.png"), b"not a png").unwrap();
        write_image(dir.path(), "00001.png", (2, 2), 70);
        write_image(dir.path(), "00002.png", (2, 2), 80);

        let mut target = MemoryTarget::new();
        let mut progress = Vec::new();
        let result = compose_timeline(&timing(&[5, 1, 2]), dir.path(), &mut target, CanvasPolicy::Resize, |c, t| {
            progress.push((c, t))
        })
        .unwrap();

        assert_eq!(result.scenes_written, 2);
        assert_eq!(result.frames_written, 3);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(progress, vec![(1, 3), (2, 3)]);
    }

    #[test]
    fn test_mismatched_size_is_resized() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "00000.png", (4, 4), 10);
        write_image(dir.path(), "00001.png", (8, 2), 20);

        let mut target = MemoryTarget::new();
        compose_timeline(&timing(&[1, 1]), dir.path(), &mut target, CanvasPolicy::Resize, |_, _| {}).unwrap();

        assert!(target.frames.lock().iter().all(|f| f.dimensions() == (4, 4)));
    }

    #[test]
    fn test_mismatched_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "00000.png", (4, 4), 10);
        write_image(dir.path(), "00001.png", (8, 2), 20);

        let mut target = MemoryTarget::new();
        let err =
            compose_timeline(&timing(&[1, 1]), dir.path(), &mut target, CanvasPolicy::Reject, |_, _| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_empty_inputs_fail_before_opening() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = MemoryTarget::new();

        let err = compose_timeline(&timing(&[]), dir.path(), &mut target, CanvasPolicy::Resize, |_, _| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = compose_timeline(&timing(&[1]), dir.path(), &mut target, CanvasPolicy::Resize, |_, _| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = compose_timeline(&timing(&[1]), &dir.path().join("missing"), &mut target, CanvasPolicy::Resize, |_, _| {})
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(target.opened.is_empty());
    }

    #[test]
    fn test_nothing_decodable_is_an_error_without_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("00000.png"), b"garbage").unwrap();

        let mut target = MemoryTarget::new();
        let err = compose_timeline(&timing(&[2]), dir.path(), &mut target, CanvasPolicy::Resize, |_, _| {}).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(target.opened.is_empty());
    }
}
