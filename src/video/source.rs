// Frame source trait
//
// A frame source yields decoded frames in presentation order. It is
// consumed exactly once, front to back; no seeking is needed for
// segmentation.

use image::RgbImage;

use super::VideoError;

/// Information about a video stream
#[derive(Debug, Clone)]
pub struct VideoInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (frames per second), `None` if the container does not say
    pub fps: Option<f64>,
    /// Total duration in milliseconds (0 if unknown)
    pub duration_ms: u64,
    /// Total number of frames (approximate, 0 if unknown)
    pub frame_count: u64,
}

/// Trait for sequential frame decoders
pub trait FrameSource {
    /// Get information about the video stream
    fn info(&self) -> &VideoInfo;

    /// Decode the next frame, `Ok(None)` at end of stream
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> &VideoInfo {
        (**self).info()
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        (**self).next_frame()
    }
}

/// In-memory frame source, used by tests and by callers that already hold
/// decoded frames
pub struct MemorySource {
    info: VideoInfo,
    frames: std::vec::IntoIter<RgbImage>,
}

impl MemorySource {
    pub fn new(fps: f64, frames: Vec<RgbImage>) -> Self {
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        let frame_count = frames.len() as u64;
        let duration_ms = if fps > 0.0 {
            (frame_count as f64 * 1000.0 / fps) as u64
        } else {
            0
        };
        Self {
            info: VideoInfo {
                width,
                height,
                fps: Some(fps),
                duration_ms,
                frame_count,
            },
            frames: frames.into_iter(),
        }
    }

    /// Report an unknown frame count, as some containers do
    pub fn without_frame_count(mut self) -> Self {
        self.info.frame_count = 0;
        self
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        Ok(self.frames.next())
    }
}
