// Reframe - keyframe extraction and video recomposition
// Main library entry point

pub mod compose;
pub mod config;
pub mod encoding;
pub mod error;
pub mod gstreamer_init;
pub mod images;
pub mod jobs;
pub mod project;
pub mod segment;
pub mod stage;
pub mod timing;
pub mod video;

pub use compose::{compose_timeline, CanvasPolicy, Composition};
pub use error::{Error, ErrorKind, Result};
pub use jobs::{ComposeJob, ComposeSummary, ExtractJob, ExtractSummary, JobEvent, JobHandle};
pub use project::{Project, ProjectState, ProjectStore};
pub use segment::{KeyframeFormat, SceneSegmenter};
pub use stage::{Stage, StageReport};
pub use timing::{Scene, TimingDocument, TimingSummary};

/// Initialize env_logger with `info` (or `debug` when verbose) unless RUST_LOG is set
pub fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .try_init();
}
