//! H.264 / MP4 video encoder
//!
//! Frames are handed to a background encoding thread through a bounded
//! channel and pushed into a GStreamer pipeline:
//!
//! `appsrc (RGB) → queue → videoconvert → <h264 encoder> → h264parse → mp4mux → filesink`
//!
//! ## Design Goals
//! - The producer (composer) never holds more than `buffer_size` frames in flight
//! - Explicit `finish()` sends EOS and waits for the muxer to finalize the file
//! - Hardware encoders are preferred when GStreamer exposes one

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use image::RgbImage;
use parking_lot::Mutex;

use super::presets;
use super::FrameSink;

/// Error type for encoder operations
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("GStreamer error: {0}")]
    Gst(String),

    #[error("Encoder not available: {0}")]
    NotAvailable(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Frame is {got_width}x{got_height}, encoder expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EncoderError>;

/// Configuration for video encoding
#[derive(Clone, Debug)]
pub struct EncoderConfig {
    /// Quality preset level (1 = lightest, 5 = maximum)
    pub preset_level: u8,
    /// Keyframe interval in frames (0 = encoder default)
    pub keyframe_interval: u32,
    /// Maximum frames queued between producer and encoder thread
    pub buffer_size: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            preset_level: presets::DEFAULT_PRESET,
            keyframe_interval: 0,
            buffer_size: 16,
        }
    }
}

/// Type of H.264 encoder available
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HardwareEncoderType {
    /// NVIDIA NVENC
    Nvenc,
    /// AMD AMF
    Amf,
    /// Intel QuickSync
    Qsv,
    /// VA-API (Linux)
    VaApi,
    /// Software fallback
    Software,
}

impl HardwareEncoderType {
    /// Get the GStreamer element name for H.264 encoding
    pub fn h264_encoder_element(&self) -> &'static str {
        match self {
            HardwareEncoderType::Nvenc => "nvh264enc",
            HardwareEncoderType::Amf => "amfh264enc",
            HardwareEncoderType::Qsv => "qsvh264enc",
            HardwareEncoderType::VaApi => "vah264enc",
            HardwareEncoderType::Software => "x264enc",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            HardwareEncoderType::Nvenc => "NVIDIA NVENC",
            HardwareEncoderType::Amf => "AMD AMF",
            HardwareEncoderType::Qsv => "Intel QuickSync",
            HardwareEncoderType::VaApi => "VA-API",
            HardwareEncoderType::Software => "Software (x264)",
        }
    }
}

/// Detect the best available H.264 encoder
pub fn detect_best_encoder() -> HardwareEncoderType {
    [
        HardwareEncoderType::Nvenc,
        HardwareEncoderType::Amf,
        HardwareEncoderType::Qsv,
        HardwareEncoderType::VaApi,
    ]
    .into_iter()
    .find(|hw| gst::ElementFactory::find(hw.h264_encoder_element()).is_some())
    .unwrap_or(HardwareEncoderType::Software)
}

/// Statistics from an encoding session
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_written: u64,
    pub encoding_duration: Duration,
    pub average_fps: f64,
}

impl EncoderStats {
    pub fn new(frames_encoded: u64, bytes_written: u64, encoding_duration: Duration) -> Self {
        let average_fps = if encoding_duration.as_secs_f64() > 0.0 {
            frames_encoded as f64 / encoding_duration.as_secs_f64()
        } else {
            0.0
        };
        Self {
            frames_encoded,
            bytes_written,
            encoding_duration,
            average_fps,
        }
    }
}

/// Messages sent to the encoder thread
enum EncoderMessage {
    /// A packed RGB frame, rows padded to the pipeline stride
    Frame(Vec<u8>),
    /// Flush and finalize the output
    Finish,
}

/// Raw format handed to the H.264 encoder
const ENCODER_INPUT_FORMAT: &str = "I420";

/// Encoder state shared between threads
struct EncoderState {
    last_error: Option<String>,
}

/// Video encoder that runs the GStreamer pipeline on a background thread
///
/// Frames of the canvas size are accepted via [`FrameSink::push_frame`].
/// Odd canvas dimensions are padded to the next even size with black,
/// since 4:2:0 H.264 needs even dimensions.
pub struct VideoEncoder {
    frame_sender: Sender<EncoderMessage>,
    encoder_thread: Option<std::thread::JoinHandle<Result<EncoderStats>>>,
    state: Arc<Mutex<EncoderState>>,
    width: u32,
    height: u32,
    layout: FrameLayout,
}

impl VideoEncoder {
    /// Create a new encoder writing to `output_path`
    ///
    /// # Arguments
    /// * `output_path` - Path to the output file (created or truncated)
    /// * `width` / `height` - Canvas size of the frames that will be pushed
    /// * `fps` - Output frame rate
    /// * `config` - Encoder configuration
    pub fn new(
        output_path: PathBuf,
        width: u32,
        height: u32,
        fps: f64,
        config: EncoderConfig,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EncoderError::Pipeline(format!(
                "Invalid canvas size {}x{}",
                width, height
            )));
        }
        if !(fps > 0.0 && fps.is_finite()) {
            return Err(EncoderError::Pipeline(format!("Invalid frame rate {}", fps)));
        }

        crate::gstreamer_init::init_gstreamer().map_err(EncoderError::Gst)?;

        let hw_type = detect_best_encoder();
        log::info!("Using {} for H.264 encoding", hw_type.display_name());

        let layout = FrameLayout::new(width, height);

        // Build the pipeline up front so configuration errors surface here,
        // before the caller starts pushing frames
        let pipeline = create_pipeline(&output_path, layout, fps, &config, hw_type)?;

        let (frame_sender, frame_receiver) = bounded::<EncoderMessage>(config.buffer_size.max(1));

        let state = Arc::new(Mutex::new(EncoderState {
            last_error: None,
        }));

        let state_clone = state.clone();
        let frame_duration = gst::ClockTime::from_nseconds((1_000_000_000f64 / fps).round() as u64);

        let encoder_thread = std::thread::Builder::new()
            .name("reframe-video-encoder".into())
            .spawn(move || {
                encoder_thread_main(frame_receiver, pipeline, output_path, frame_duration, state_clone)
            })
            .map_err(|e| EncoderError::Pipeline(format!("Failed to spawn encoder thread: {}", e)))?;

        Ok(Self {
            frame_sender,
            encoder_thread: Some(encoder_thread),
            state,
            width,
            height,
            layout,
        })
    }

    /// Send a frame to be encoded (blocking if the buffer is full)
    pub fn send_frame(&self, frame: &RgbImage) -> Result<()> {
        if let Some(err) = self.has_error() {
            return Err(EncoderError::Pipeline(err));
        }

        let (got_width, got_height) = frame.dimensions();
        if got_width != self.width || got_height != self.height {
            return Err(EncoderError::FrameSize {
                width: self.width,
                height: self.height,
                got_width,
                got_height,
            });
        }

        self.frame_sender
            .send(EncoderMessage::Frame(self.layout.pack(frame)))
            .map_err(|_| EncoderError::Channel("Encoder thread disconnected".into()))
    }

    /// Check if the encoder has encountered an error
    pub fn has_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }
}

impl FrameSink for VideoEncoder {
    fn push_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.send_frame(frame)
    }

    /// Finish encoding and wait for the container to be finalized
    fn finish(mut self) -> Result<EncoderStats> {
        let _ = self.frame_sender.send(EncoderMessage::Finish);

        match self.encoder_thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| EncoderError::Pipeline("Encoder thread panicked".into()))?,
            None => Err(EncoderError::Pipeline("Encoder already finished".into())),
        }
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        if self.encoder_thread.is_some() {
            // Let the thread finalize on its own; dropping must not block
            let _ = self.frame_sender.send(EncoderMessage::Finish);
        }
    }
}

/// Row layout of buffers pushed into appsrc
///
/// GStreamer expects packed RGB rows padded to a multiple of 4 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameLayout {
    width: u32,
    height: u32,
    out_width: u32,
    out_height: u32,
    stride: usize,
}

impl FrameLayout {
    fn new(width: u32, height: u32) -> Self {
        let out_width = width + (width & 1);
        let out_height = height + (height & 1);
        let stride = (out_width as usize * 3 + 3) & !3;
        Self {
            width,
            height,
            out_width,
            out_height,
            stride,
        }
    }

    fn buffer_size(&self) -> usize {
        self.stride * self.out_height as usize
    }

    fn pack(&self, frame: &RgbImage) -> Vec<u8> {
        let row_bytes = self.width as usize * 3;
        let mut data = vec![0u8; self.buffer_size()];
        for (row, src) in frame.as_raw().chunks_exact(row_bytes).enumerate() {
            let start = row * self.stride;
            data[start..start + row_bytes].copy_from_slice(src);
        }
        data
    }
}

/// Main function for the encoder thread
fn encoder_thread_main(
    receiver: Receiver<EncoderMessage>,
    pipeline: gst::Pipeline,
    output_path: PathBuf,
    frame_duration: gst::ClockTime,
    state: Arc<Mutex<EncoderState>>,
) -> Result<EncoderStats> {
    let start_time = Instant::now();

    let fail = |msg: String| {
        state.lock().last_error = Some(msg.clone());
        pipeline.set_state(gst::State::Null).ok();
        EncoderError::Pipeline(msg)
    };

    let appsrc = pipeline
        .by_name("src")
        .ok_or_else(|| EncoderError::Pipeline("Could not find appsrc".into()))?
        .downcast::<gst_app::AppSrc>()
        .map_err(|_| EncoderError::Pipeline("Could not downcast to AppSrc".into()))?;

    if let Err(e) = pipeline.set_state(gst::State::Playing) {
        return Err(fail(format!("Failed to start pipeline: {:?}", e)));
    }

    let mut frames_encoded = 0u64;

    loop {
        match receiver.recv() {
            Ok(EncoderMessage::Frame(data)) => {
                let mut buffer = gst::Buffer::from_slice(data);
                if let Some(buffer_ref) = buffer.get_mut() {
                    buffer_ref.set_pts(gst::ClockTime::from_nseconds(
                        frame_duration.nseconds() * frames_encoded,
                    ));
                    buffer_ref.set_duration(frame_duration);
                }

                if let Err(e) = appsrc.push_buffer(buffer) {
                    return Err(fail(format!("Failed to push buffer: {:?}", e)));
                }

                frames_encoded += 1;

                if frames_encoded % 500 == 0 {
                    log::debug!("Encoded {} frames", frames_encoded);
                }
            }
            Ok(EncoderMessage::Finish) | Err(_) => break,
        }
    }

    log::debug!("Sending EOS after {} frames", frames_encoded);
    if let Err(e) = appsrc.end_of_stream() {
        log::warn!("EOS send failed: {:?}", e);
    }

    // Wait for EOS so mp4mux can write the moov atom
    let mut pipeline_error = None;
    let mut got_eos = false;
    if let Some(bus) = pipeline.bus() {
        for msg in bus.iter_timed(gst::ClockTime::from_seconds(60)) {
            match msg.view() {
                gst::MessageView::Eos(..) => {
                    got_eos = true;
                    break;
                }
                gst::MessageView::Error(err) => {
                    pipeline_error = Some(format!("Pipeline error: {} ({:?})", err.error(), err.debug()));
                    break;
                }
                _ => {}
            }
        }
    }

    pipeline.set_state(gst::State::Null).ok();

    if let Some(msg) = pipeline_error {
        state.lock().last_error = Some(msg.clone());
        return Err(EncoderError::Pipeline(msg));
    }
    if !got_eos {
        log::warn!("Did not receive EOS, output may be truncated");
    }

    let bytes_written = std::fs::metadata(&output_path).map(|m| m.len()).unwrap_or(0);
    let stats = EncoderStats::new(frames_encoded, bytes_written, start_time.elapsed());

    log::info!(
        "Encoder finished: {} frames, {} bytes, {:.1} fps",
        stats.frames_encoded,
        stats.bytes_written,
        stats.average_fps
    );

    Ok(stats)
}

/// Create the GStreamer encoding pipeline
fn create_pipeline(
    output_path: &Path,
    layout: FrameLayout,
    fps: f64,
    config: &EncoderConfig,
    hw_type: HardwareEncoderType,
) -> Result<gst::Pipeline> {
    let pipeline = gst::Pipeline::new();

    let framerate = gst::Fraction::approximate_f64(fps)
        .unwrap_or_else(|| gst::Fraction::new((fps * 1000.0).round() as i32, 1000));

    let caps = gst::Caps::builder("video/x-raw")
        .field("format", "RGB")
        .field("width", layout.out_width as i32)
        .field("height", layout.out_height as i32)
        .field("framerate", framerate)
        .build();

    let appsrc = gst_app::AppSrc::builder()
        .name("src")
        .caps(&caps)
        .format(gst::Format::Time)
        .is_live(false)
        .block(true)
        .stream_type(gst_app::AppStreamType::Stream)
        .build();

    let queue = gst::ElementFactory::make("queue")
        .property("max-size-buffers", 30u32)
        .property("max-size-time", 0u64)
        .property("max-size-bytes", 0u32)
        .build()
        .map_err(|e| EncoderError::Pipeline(format!("Failed to create queue: {}", e)))?;

    let videoconvert = gst::ElementFactory::make("videoconvert")
        .build()
        .map_err(|e| EncoderError::Pipeline(format!("Failed to create videoconvert: {}", e)))?;

    // Pin 4:2:0 so encoders don't pick Y444 from RGB input
    let convert_caps = gst::Caps::builder("video/x-raw")
        .field("format", ENCODER_INPUT_FORMAT)
        .build();
    let capsfilter = gst::ElementFactory::make("capsfilter")
        .name("convert-caps")
        .property("caps", &convert_caps)
        .build()
        .map_err(|e| EncoderError::Pipeline(format!("Failed to create capsfilter: {}", e)))?;

    let encoder = create_encoder(hw_type, config)?;

    let parser = gst::ElementFactory::make("h264parse")
        .build()
        .map_err(|e| EncoderError::Pipeline(format!("Failed to create h264parse: {}", e)))?;

    let muxer = gst::ElementFactory::make("mp4mux")
        .build()
        .map_err(|e| EncoderError::Pipeline(format!("Failed to create mp4mux: {}", e)))?;

    let filesink = gst::ElementFactory::make("filesink")
        .property("location", output_path.to_string_lossy().to_string())
        .property("async", false)
        .property("sync", false)
        .build()
        .map_err(|e| EncoderError::Pipeline(format!("Failed to create filesink: {}", e)))?;

    pipeline
        .add_many([appsrc.upcast_ref(), &queue, &videoconvert, &capsfilter, &encoder, &parser, &muxer, &filesink])
        .map_err(|e| EncoderError::Pipeline(format!("Failed to add elements: {}", e)))?;

    gst::Element::link_many([appsrc.upcast_ref(), &queue, &videoconvert, &capsfilter, &encoder, &parser, &muxer, &filesink])
        .map_err(|e| EncoderError::Pipeline(format!("Failed to link elements: {}", e)))?;

    Ok(pipeline)
}

/// Create the encoder element based on hardware type
fn create_encoder(hw_type: HardwareEncoderType, config: &EncoderConfig) -> Result<gst::Element> {
    let encoder_name = hw_type.h264_encoder_element();

    let encoder = gst::ElementFactory::make(encoder_name)
        .build()
        .map_err(|e| EncoderError::NotAvailable(format!("Failed to create {}: {}", encoder_name, e)))?;

    presets::apply_preset(&encoder, hw_type, config.preset_level, config.keyframe_interval);

    Ok(encoder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_even_width_stride() {
        let layout = FrameLayout::new(4, 2);
        assert_eq!(layout.stride, 12);
        assert_eq!(layout.buffer_size(), 24);
    }

    #[test]
    fn test_layout_pads_odd_sizes() {
        let layout = FrameLayout::new(3, 3);
        assert_eq!((layout.out_width, layout.out_height), (4, 4));
        // 4 px * 3 bytes = 12, already aligned
        assert_eq!(layout.stride, 12);

        let layout = FrameLayout::new(5, 2);
        assert_eq!(layout.out_width, 6);
        // 6 px * 3 bytes = 18 → 20
        assert_eq!(layout.stride, 20);
    }

    #[test]
    fn test_pack_copies_rows_and_pads_black() {
        let layout = FrameLayout::new(1, 1);
        let frame = RgbImage::from_pixel(1, 1, image::Rgb([10, 20, 30]));
        let data = layout.pack(&frame);

        // 2x2 canvas, stride 8
        assert_eq!(data.len(), 16);
        assert_eq!(&data[0..3], &[10, 20, 30]);
        assert!(data[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_stats_average_fps() {
        let stats = EncoderStats::new(50, 1000, Duration::from_secs(2));
        assert_eq!(stats.average_fps, 25.0);
        let stats = EncoderStats::new(50, 1000, Duration::ZERO);
        assert_eq!(stats.average_fps, 0.0);
    }

    #[test]
    fn test_pipeline_pins_420_before_encoder() {
        // Needs GStreamer with x264enc installed
        if crate::gstreamer_init::init_gstreamer().is_err()
            || gst::ElementFactory::find(HardwareEncoderType::Software.h264_encoder_element()).is_none()
        {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let pipeline = create_pipeline(
            &dir.path().join("out.mp4"),
            FrameLayout::new(4, 2),
            25.0,
            &EncoderConfig::default(),
            HardwareEncoderType::Software,
        )
        .unwrap();

        let filter = pipeline.by_name("convert-caps").unwrap();
        let caps = filter.property::<gst::Caps>("caps");
        let format = caps.structure(0).unwrap().get::<&str>("format").unwrap();
        assert_eq!(format, "I420");
    }
}
