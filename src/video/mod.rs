// Video decoding
//
// The segmenter only needs an ordered stream of RGB frames plus the stream's
// fps and an (approximate) frame count. `FrameSource` is that contract;
// `GstFrameReader` implements it with GStreamer's decodebin so any codec the
// local GStreamer installation can decode is accepted.

pub mod gst_decode;
pub mod source;

pub use gst_decode::GstFrameReader;
pub use source::{FrameSource, VideoInfo};

use std::path::{Path, PathBuf};

/// Container extensions recognised as an imported source video
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Check a path's extension against [`VIDEO_EXTENSIONS`] (case-insensitive)
pub fn is_video_file(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

pub(crate) fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .map(|e| allowed.contains(&e.as_str()))
        .unwrap_or(false)
}

/// Open a video file for sequential frame decoding
pub fn open_video<P: AsRef<Path>>(path: P) -> Result<GstFrameReader, VideoError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(VideoError::NotFound(path.to_path_buf()));
    }
    GstFrameReader::open(path)
}

/// Error type for video operations
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Video not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unable to open video {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("No video track found")]
    NoVideoTrack,

    #[error("Frame decode error: {0}")]
    Decode(String),

    #[error("GStreamer error: {0}")]
    Gst(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_extensions() {
        assert!(is_video_file(Path::new("clip.mp4")));
        assert!(is_video_file(Path::new("CLIP.MKV")));
        assert!(is_video_file(Path::new("a/b/c.Mov")));
        assert!(!is_video_file(Path::new("clip.webm")));
        assert!(!is_video_file(Path::new("mp4")));
    }

    #[test]
    fn test_open_missing_video() {
        let err = open_video("/definitely/not/here.mp4").unwrap_err();
        assert!(matches!(err, VideoError::NotFound(_)));
    }
}
