// Core error taxonomy shared by the segmenter, composer, store and jobs

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::encoding::EncoderError;
use crate::video::VideoError;

/// Coarse classification of a failure, stable across error sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A video, timing file, image directory or project path does not exist
    NotFound,
    /// Empty scene list, empty image set, busy project, bad argument
    InvalidInput,
    /// A delete target resolved outside the managed projects root
    PathSafety,
    /// Decode, encode or filesystem failure
    IoFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::PathSafety => "path_safety",
            ErrorKind::IoFailure => "io_failure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{what} not found: {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Project {} is busy: {holder}", project.display())]
    Busy { project: PathBuf, holder: String },

    #[error("Refusing to touch {} outside projects root {}", target.display(), root.display())]
    PathSafety { target: PathBuf, root: PathBuf },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Timing document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Composition failed: {0}")]
    Compose(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        Error::NotFound { what, path: path.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::InvalidInput(_) | Error::Busy { .. } => ErrorKind::InvalidInput,
            Error::PathSafety { .. } => ErrorKind::PathSafety,
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Error::Video(VideoError::NotFound(_)) => ErrorKind::NotFound,
            Error::Image(_)
            | Error::Json(_)
            | Error::Video(_)
            | Error::Encoder(_)
            | Error::Io(_)
            | Error::Compose(_) => ErrorKind::IoFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Error::not_found("Video", "/x.mp4").kind(), ErrorKind::NotFound);
        assert_eq!(Error::InvalidInput("empty".into()).kind(), ErrorKind::InvalidInput);
        assert_eq!(
            Error::PathSafety { target: "/a".into(), root: "/b".into() }.kind(),
            ErrorKind::PathSafety
        );

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(missing).kind(), ErrorKind::NotFound);

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(Error::from(denied).kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_message_names_path() {
        let err = Error::not_found("Timing file", "/p/timestamps/a.json");
        assert_eq!(err.to_string(), "Timing file not found: /p/timestamps/a.json");
        assert_eq!(ErrorKind::PathSafety.to_string(), "path_safety");
    }
}
