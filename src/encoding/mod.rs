// Video encoding
//
// The composer writes frames through two small traits:
// - `OutputTarget` is opened once, with the canvas size and fps fixed by the
//   first decoded image, and returns a `FrameSink`.
// - `FrameSink` accepts frames in order and is finalized explicitly so the
//   container gets flushed.
//
// `Mp4Target` is the production target (GStreamer H.264 in MP4). To add a
// new backend, implement both traits and pass the target to the composer.

pub mod encoder;
pub mod presets;

pub use encoder::{
    detect_best_encoder, EncoderConfig, EncoderError, EncoderStats, HardwareEncoderType,
    VideoEncoder,
};

use std::path::{Path, PathBuf};

use image::RgbImage;

/// Receives composed frames in presentation order
pub trait FrameSink {
    /// Append one frame; the frame must match the size the sink was opened with
    fn push_frame(&mut self, frame: &RgbImage) -> Result<(), EncoderError>;

    /// Flush and close the output
    fn finish(self) -> Result<EncoderStats, EncoderError>;
}

/// Factory for a [`FrameSink`], opened lazily once the canvas is known
pub trait OutputTarget {
    type Sink: FrameSink;

    fn open(&mut self, width: u32, height: u32, fps: f64) -> Result<Self::Sink, EncoderError>;

    /// File the sink writes to, if any
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// H.264 / MP4 output file
pub struct Mp4Target {
    path: PathBuf,
    config: EncoderConfig,
}

impl Mp4Target {
    pub fn new(path: impl Into<PathBuf>, config: EncoderConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

impl OutputTarget for Mp4Target {
    type Sink = VideoEncoder;

    fn open(&mut self, width: u32, height: u32, fps: f64) -> Result<VideoEncoder, EncoderError> {
        VideoEncoder::new(self.path.clone(), width, height, fps, self.config.clone())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Collects frames in memory instead of encoding them
#[derive(Debug, Default)]
pub struct MemoryTarget {
    /// `(width, height, fps)` of every `open` call
    pub opened: Vec<(u32, u32, f64)>,
    /// Frames pushed through the most recent sink, shared with the sink
    pub frames: std::sync::Arc<parking_lot::Mutex<Vec<RgbImage>>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }
}

pub struct MemorySink {
    frames: std::sync::Arc<parking_lot::Mutex<Vec<RgbImage>>>,
    started: std::time::Instant,
}

impl OutputTarget for MemoryTarget {
    type Sink = MemorySink;

    fn open(&mut self, width: u32, height: u32, fps: f64) -> Result<MemorySink, EncoderError> {
        self.opened.push((width, height, fps));
        self.frames.lock().clear();
        Ok(MemorySink {
            frames: self.frames.clone(),
            started: std::time::Instant::now(),
        })
    }
}

impl FrameSink for MemorySink {
    fn push_frame(&mut self, frame: &RgbImage) -> Result<(), EncoderError> {
        self.frames.lock().push(frame.clone());
        Ok(())
    }

    fn finish(self) -> Result<EncoderStats, EncoderError> {
        let frames = self.frames.lock();
        let bytes_written = frames.iter().map(|f| f.as_raw().len() as u64).sum();
        Ok(EncoderStats::new(frames.len() as u64, bytes_written, self.started.elapsed()))
    }
}
