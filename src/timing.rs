// Timing document: the contract between segmentation and recomposition
//
// Deserialization is lenient so hand-edited files keep loading: a missing
// `fps` becomes 24.0, missing `scenes` becomes empty, a scene without
// `filename` gets an empty one and `duration_frames` is truncated to a whole
// number of at least one frame.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Frame rate assumed when a timing document or source does not provide one
pub const DEFAULT_FPS: f64 = 24.0;

/// One run of similar source frames, represented by a single keyframe image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Keyframe image that stands in for this scene
    #[serde(default)]
    pub filename: String,

    /// Number of source frames this keyframe replaces (>= 1)
    #[serde(default = "default_duration_frames", deserialize_with = "deserialize_duration_frames")]
    pub duration_frames: u64,
}

impl Scene {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            duration_frames: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingDocument {
    #[serde(default = "default_fps", deserialize_with = "deserialize_fps")]
    pub fps: f64,

    /// Scenes in keyframe emission order
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// Aggregate view for status display. Does not check that keyframes exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub fps: f64,
    pub scene_count: usize,
    pub duration_frames: u64,
}

impl TimingDocument {
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            scenes: Vec::new(),
        }
    }

    pub fn summary(&self) -> TimingSummary {
        TimingSummary {
            fps: self.fps,
            scene_count: self.scenes.len(),
            duration_frames: self.total_frames(),
        }
    }

    /// Sum of `duration_frames` over all scenes
    pub fn total_frames(&self) -> u64 {
        self.scenes.iter().map(|s| s.duration_frames).sum()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a timing document from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::not_found("Timing file", path));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Write the document, creating the parent directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

fn default_fps() -> f64 {
    DEFAULT_FPS
}

fn default_duration_frames() -> u64 {
    1
}

/// Accepts a number or null; null, zero and negative values fall back to the default
fn deserialize_fps<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let fps = Option::<f64>::deserialize(deserializer)?;
    Ok(match fps {
        Some(v) if v > 0.0 && v.is_finite() => v,
        _ => DEFAULT_FPS,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameCount {
    Whole(i64),
    Fractional(f64),
}

/// Accepts an integer, a float or null; truncates and clamps to at least 1
fn deserialize_duration_frames<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let frames = match Option::<FrameCount>::deserialize(deserializer)? {
        Some(FrameCount::Whole(n)) => n,
        Some(FrameCount::Fractional(v)) if v.is_finite() => v.trunc() as i64,
        _ => 1,
    };
    Ok(frames.max(1) as u64)
}
