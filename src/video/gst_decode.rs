// Sequential GStreamer frame reader
//
// Uses GStreamer's decodebin to decode any supported codec, then converts
// every frame to packed RGB for the segmenter.
//
// Pipeline: filesrc → decodebin → videoconvert → appsink (video/x-raw,RGB)
//
// The appsink runs unsynchronised with a small queue, so decoding proceeds
// as fast as the consumer pulls frames.

use std::path::Path;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;

use super::source::{FrameSource, VideoInfo};
use super::VideoError;

/// Decodes a video file front to back into RGB frames
#[derive(Debug)]
pub struct GstFrameReader {
    info: VideoInfo,
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    playing: bool,
    frames_read: u64,
}

impl GstFrameReader {
    /// Open a video file and preroll the decode pipeline
    ///
    /// Fails with [`VideoError::Unreadable`] when GStreamer cannot find a
    /// decodable video stream in the file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VideoError> {
        let path = path.as_ref().to_path_buf();

        crate::gstreamer_init::init_gstreamer().map_err(VideoError::Gst)?;

        let pipeline = gst::Pipeline::new();

        let filesrc = gst::ElementFactory::make("filesrc")
            .property("location", path.to_string_lossy().to_string())
            .build()
            .map_err(|e| VideoError::Gst(format!("Failed to create filesrc: {}", e)))?;

        let decodebin = gst::ElementFactory::make("decodebin")
            .build()
            .map_err(|e| VideoError::Gst(format!("Failed to create decodebin: {}", e)))?;

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| VideoError::Gst(format!("Failed to create videoconvert: {}", e)))?;

        let caps = gst_video::VideoCapsBuilder::new()
            .format(gst_video::VideoFormat::Rgb)
            .build();

        let appsink = gst_app::AppSink::builder()
            .name("sink")
            .caps(&caps)
            .sync(false)
            .max_buffers(8)
            .drop(false)
            .build();

        pipeline
            .add_many([&filesrc, &decodebin, &videoconvert, appsink.upcast_ref()])
            .map_err(|e| VideoError::Gst(format!("Failed to add elements: {}", e)))?;

        filesrc
            .link(&decodebin)
            .map_err(|e| VideoError::Gst(format!("Failed to link filesrc to decodebin: {}", e)))?;

        videoconvert
            .link(&appsink)
            .map_err(|e| VideoError::Gst(format!("Failed to link videoconvert to appsink: {}", e)))?;

        // Only the first video pad is linked; audio and subtitles are ignored
        let videoconvert_weak = videoconvert.downgrade();
        decodebin.connect_pad_added(move |_decodebin, src_pad| {
            let Some(videoconvert) = videoconvert_weak.upgrade() else {
                return;
            };

            let caps = src_pad
                .current_caps()
                .unwrap_or_else(|| src_pad.query_caps(None));
            let Some(structure) = caps.structure(0) else {
                return;
            };

            let name = structure.name().as_str();
            if !name.starts_with("video/") {
                log::debug!("GstFrameReader: ignoring non-video pad with caps '{}'", name);
                return;
            }

            let Some(sink_pad) = videoconvert.static_pad("sink") else {
                return;
            };
            if !sink_pad.is_linked() {
                if let Err(e) = src_pad.link(&sink_pad) {
                    log::warn!("GstFrameReader: failed to link video pad: {:?}", e);
                }
            }
        });

        if let Err(e) = pipeline.set_state(gst::State::Paused) {
            pipeline.set_state(gst::State::Null).ok();
            return Err(VideoError::Unreadable {
                path,
                reason: format!("failed to preroll: {:?}", e),
            });
        }

        let Some(bus) = pipeline.bus() else {
            pipeline.set_state(gst::State::Null).ok();
            return Err(VideoError::Gst("Failed to get pipeline bus".into()));
        };

        let mut width = 0u32;
        let mut height = 0u32;
        let mut duration_ms = 0u64;
        let mut caps_fps = None;
        let mut prerolled = false;

        for msg in bus.iter_timed(gst::ClockTime::from_seconds(10)) {
            match msg.view() {
                gst::MessageView::AsyncDone(_) => {
                    if let Some(dur) = pipeline.query_duration::<gst::ClockTime>() {
                        duration_ms = dur.mseconds();
                    }

                    if let Some(sample) = appsink.try_pull_preroll(gst::ClockTime::from_seconds(5)) {
                        if let Some(info) = sample
                            .caps()
                            .and_then(|caps| gst_video::VideoInfo::from_caps(caps).ok())
                        {
                            width = info.width();
                            height = info.height();
                            caps_fps = fraction_to_fps(info.fps());
                        }
                    }
                    prerolled = true;
                    break;
                }
                gst::MessageView::Error(err) => {
                    pipeline.set_state(gst::State::Null).ok();
                    return Err(VideoError::Unreadable {
                        path,
                        reason: format!("{} ({:?})", err.error(), err.debug()),
                    });
                }
                _ => {}
            }
        }

        if !prerolled || width == 0 || height == 0 {
            pipeline.set_state(gst::State::Null).ok();
            return Err(VideoError::NoVideoTrack);
        }

        let fps = Self::probe_fps(&path).or(caps_fps);

        // Estimate frame count from duration and fps
        let frame_count = match fps {
            Some(fps) if duration_ms > 0 => (duration_ms as f64 * fps / 1000.0).round() as u64,
            _ => 0,
        };

        log::info!(
            "Opened {} ({}x{}, fps {:?}, ~{} frames)",
            path.display(),
            width,
            height,
            fps,
            frame_count
        );

        Ok(Self {
            info: VideoInfo {
                width,
                height,
                fps,
                duration_ms,
                frame_count,
            },
            pipeline,
            appsink,
            playing: false,
            frames_read: 0,
        })
    }

    /// Probe the video file's FPS using GStreamer's discoverer
    fn probe_fps(path: &Path) -> Option<f64> {
        use gst_pbutils::prelude::*;
        use gstreamer_pbutils as gst_pbutils;

        let discoverer = gst_pbutils::Discoverer::new(gst::ClockTime::from_seconds(10)).ok()?;
        let uri = gst::glib::filename_to_uri(path, None).ok()?;
        let info = discoverer.discover_uri(uri.as_str()).ok()?;

        let video_streams = info.video_streams();
        let stream = video_streams.first()?;
        let caps = stream.caps()?;
        let structure = caps.structure(0)?;

        structure
            .get::<gst::Fraction>("framerate")
            .ok()
            .and_then(fraction_to_fps)
    }

    /// Copy a mapped RGB buffer into a tightly packed image, dropping row padding
    fn to_rgb_image(sample: &gst::Sample) -> Result<RgbImage, VideoError> {
        let caps = sample
            .caps()
            .ok_or_else(|| VideoError::Decode("Sample without caps".into()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| VideoError::Decode(format!("Invalid caps: {}", e)))?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| VideoError::Decode("No buffer in sample".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|e| VideoError::Decode(format!("Failed to map buffer: {}", e)))?;

        let width = info.width() as usize;
        let height = info.height() as usize;
        let stride = info.stride()[0] as usize;
        let row_bytes = width * 3;
        let data = map.as_slice();

        if stride < row_bytes || data.len() < stride * (height.saturating_sub(1)) + row_bytes {
            return Err(VideoError::Decode(format!(
                "Buffer too small for {}x{} RGB (stride {}, {} bytes)",
                width,
                height,
                stride,
                data.len()
            )));
        }

        let mut pixels = Vec::with_capacity(row_bytes * height);
        for row in 0..height {
            let start = row * stride;
            pixels.extend_from_slice(&data[start..start + row_bytes]);
        }

        RgbImage::from_raw(info.width(), info.height(), pixels)
            .ok_or_else(|| VideoError::Decode("Pixel buffer size mismatch".into()))
    }

    /// Pop a pending error message from the bus, if any
    fn pending_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(format!("{} ({:?})", err.error(), err.debug())),
            _ => None,
        }
    }
}

impl FrameSource for GstFrameReader {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        if !self.playing {
            self.pipeline
                .set_state(gst::State::Playing)
                .map_err(|e| VideoError::Gst(format!("Failed to set PLAYING: {:?}", e)))?;
            self.playing = true;
        }

        let sample = match self.appsink.pull_sample() {
            Ok(sample) => sample,
            Err(_) if self.appsink.is_eos() => {
                log::debug!("GstFrameReader: EOS after {} frames", self.frames_read);
                return Ok(None);
            }
            Err(e) => {
                let reason = self.pending_error().unwrap_or_else(|| e.to_string());
                return Err(VideoError::Decode(reason));
            }
        };

        let frame = Self::to_rgb_image(&sample)?;
        self.frames_read += 1;
        Ok(Some(frame))
    }
}

impl Drop for GstFrameReader {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn fraction_to_fps(fraction: gst::Fraction) -> Option<f64> {
    if fraction.denom() == 0 {
        return None;
    }
    let fps = fraction.numer() as f64 / fraction.denom() as f64;
    (fps > 0.0).then_some(fps)
}
