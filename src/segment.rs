//! Scene segmentation
//!
//! Collapses runs of visually similar frames into single keyframes. Each
//! frame is reduced to an 8-bit luma map and compared against the luma map
//! of the most recent keyframe (the anchor), not the previous frame:
//!
//! - score = Σ |luma(frame) − luma(anchor)| over all pixels
//! - score <  threshold → same scene, its `duration_frames` grows by one
//! - score >= threshold → new scene, the frame is written as the next keyframe
//!   and becomes the anchor
//!
//! Anchoring on the keyframe means slow drift is still cut once it has
//! accumulated past the threshold. A lower threshold keeps more keyframes.
//!
//! The caller is responsible for clearing stale keyframes before a run;
//! a failed run leaves already written keyframes on disk and no timing
//! document.

use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};

use crate::error::Result;
use crate::timing::{Scene, TimingDocument, DEFAULT_FPS};
use crate::video::FrameSource;

/// Default sensitivity: lower = more keyframes kept
pub const DEFAULT_THRESHOLD: u64 = 1_000_000;

/// Image format keyframes are written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyframeFormat {
    #[default]
    Png,
    Jpg,
}

impl KeyframeFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            KeyframeFormat::Png => "png",
            KeyframeFormat::Jpg => "jpg",
        }
    }
}

/// Keyframe file name for a 0-based ordinal, e.g. `00007.png`
pub fn keyframe_name(index: usize, format: KeyframeFormat) -> String {
    format!("{:05}.{}", index, format.extension())
}

/// Rec.601 luma, rounded, the same weights OpenCV uses for BGR→GRAY
pub fn luma_map(frame: &RgbImage) -> GrayImage {
    let (width, height) = frame.dimensions();
    let data = frame
        .as_raw()
        .chunks_exact(3)
        .map(|px| ((px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114 + 500) / 1000) as u8)
        .collect();
    // Length is width * height by construction
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Sum of absolute per-pixel differences between two luma maps
///
/// Maps of different sizes are maximally different.
pub fn difference_score(a: &GrayImage, b: &GrayImage) -> u64 {
    if a.dimensions() != b.dimensions() {
        return u64::MAX;
    }
    a.as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum()
}

/// What happened to a frame pushed into the segmenter
#[derive(Debug, Clone, PartialEq)]
pub enum FrameDecision {
    /// The frame opened a new scene and was written as a keyframe
    NewScene { index: usize, path: PathBuf, score: Option<u64> },
    /// The frame extends the current scene
    Continuation { score: u64 },
}

/// Incremental segmenter; feed frames in order, then call [`SceneSegmenter::finish`]
pub struct SceneSegmenter {
    frames_dir: PathBuf,
    threshold: u64,
    format: KeyframeFormat,
    anchor: Option<GrayImage>,
    scenes: Vec<Scene>,
    frames_scanned: u64,
}

impl SceneSegmenter {
    pub fn new(frames_dir: impl Into<PathBuf>, threshold: u64, format: KeyframeFormat) -> Self {
        Self {
            frames_dir: frames_dir.into(),
            threshold,
            format,
            anchor: None,
            scenes: Vec::new(),
            frames_scanned: 0,
        }
    }

    pub fn frames_scanned(&self) -> u64 {
        self.frames_scanned
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// Classify one frame, writing it as a keyframe if it starts a scene
    pub fn push_frame(&mut self, frame: &RgbImage) -> Result<FrameDecision> {
        let luma = luma_map(frame);
        self.frames_scanned += 1;

        let score = match &self.anchor {
            None => None,
            Some(anchor) => {
                let score = difference_score(anchor, &luma);
                if score < self.threshold {
                    if let Some(current) = self.scenes.last_mut() {
                        current.duration_frames += 1;
                    }
                    return Ok(FrameDecision::Continuation { score });
                }
                Some(score)
            }
        };

        let index = self.scenes.len();
        let filename = keyframe_name(index, self.format);
        let path = self.frames_dir.join(&filename);
        frame.save(&path)?;

        log::debug!(
            "Scene {} starts at frame {} (score {:?})",
            index,
            self.frames_scanned - 1,
            score
        );

        self.scenes.push(Scene::new(filename));
        self.anchor = Some(luma);

        Ok(FrameDecision::NewScene { index, path, score })
    }

    /// Close the run and build its timing document
    pub fn finish(self, fps: f64) -> Segmentation {
        let keyframes_written = self.scenes.len() as u64;
        Segmentation {
            timing: TimingDocument {
                fps,
                scenes: self.scenes,
            },
            frames_scanned: self.frames_scanned,
            keyframes_written,
        }
    }
}

/// Outcome of a completed segmentation run
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub timing: TimingDocument,
    /// Frames read from the source
    pub frames_scanned: u64,
    /// Keyframe images written (== `timing.scenes.len()`)
    pub keyframes_written: u64,
}

/// Segment a whole frame source into `frames_dir`
///
/// `progress` is called once per frame with `(frames_processed, frames_total)`;
/// `frames_total` is the source's frame count estimate (0 if unknown) and does
/// not change during the run.
pub fn segment_source<S, F>(
    source: &mut S,
    frames_dir: &Path,
    threshold: u64,
    format: KeyframeFormat,
    mut progress: F,
) -> Result<Segmentation>
where
    S: FrameSource + ?Sized,
    F: FnMut(u64, u64),
{
    std::fs::create_dir_all(frames_dir)?;

    let fps = source.info().fps.filter(|f| *f > 0.0).unwrap_or(DEFAULT_FPS);
    let frames_total = source.info().frame_count;

    let mut segmenter = SceneSegmenter::new(frames_dir, threshold, format);
    while let Some(frame) = source.next_frame()? {
        segmenter.push_frame(&frame)?;
        progress(segmenter.frames_scanned(), frames_total);
    }

    let segmentation = segmenter.finish(fps);
    log::info!(
        "Segmented {} frames into {} keyframes (threshold {})",
        segmentation.frames_scanned,
        segmentation.keyframes_written,
        threshold
    );
    Ok(segmentation)
}
