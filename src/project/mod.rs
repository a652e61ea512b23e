// Project workspace management
//
// Every project is a directory under `<workspace>/projects` with a fixed
// skeleton:
//
//   <name>/
//     project.json   metadata
//     original/      imported source video
//     frames/        keyframes written by extraction
//     timestamps/    timing documents, one per source video
//     modified/      edited keyframes used for composition
//     output/        composed videos, one per run
//
// `ProjectStore` is the only thing that creates, clears or deletes inside
// this tree; the segmenter and composer are handed directories explicitly.

pub mod lock;
pub mod metadata;
pub mod store;

pub use lock::{LockInfo, ProjectLock};
pub use metadata::ProjectMetadata;
pub use store::{sanitize_project_name, ProjectState, ProjectStore};

use std::path::{Path, PathBuf};

pub const ORIGINAL_DIR: &str = "original";
pub const FRAMES_DIR: &str = "frames";
pub const TIMESTAMPS_DIR: &str = "timestamps";
pub const MODIFIED_DIR: &str = "modified";
pub const OUTPUT_DIR: &str = "output";

/// In-memory view of a project directory
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    /// `YYYYMMDD_HHMMSS`
    pub created_at: String,
    pub original_dir: PathBuf,
    pub frames_dir: PathBuf,
    pub timestamps_dir: PathBuf,
    pub modified_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Source video inside `original/`, if one was imported
    pub original_video: Option<PathBuf>,
}

impl Project {
    pub(crate) fn at(root: &Path, created_at: String) -> Self {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            name,
            created_at,
            original_dir: root.join(ORIGINAL_DIR),
            frames_dir: root.join(FRAMES_DIR),
            timestamps_dir: root.join(TIMESTAMPS_DIR),
            modified_dir: root.join(MODIFIED_DIR),
            output_dir: root.join(OUTPUT_DIR),
            root: root.to_path_buf(),
            original_video: None,
        }
    }

    /// Create any missing part of the directory skeleton
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.root,
            &self.original_dir,
            &self.frames_dir,
            &self.timestamps_dir,
            &self.modified_dir,
            &self.output_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// True if the imported video is still on disk
    pub fn has_video(&self) -> bool {
        self.original_video.as_deref().is_some_and(Path::is_file)
    }
}
