// Project metadata (project.json at the project root)

use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const METADATA_FILE: &str = "project.json";

/// Timestamp layout used for project names, `created_at` and output files
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default)]
    pub name: String,

    /// `YYYYMMDD_HHMMSS`, local time
    #[serde(default)]
    pub created_at: String,

    /// File name of the imported video as it was on disk before the copy
    #[serde(default)]
    pub source_video_name: String,
}

impl ProjectMetadata {
    /// Read `project.json` in `project_dir`; `Ok(None)` if there is none
    pub fn read(project_dir: &Path) -> Result<Option<Self>> {
        let path = project_dir.join(METADATA_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn write(&self, project_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(project_dir.join(METADATA_FILE), content)?;
        Ok(())
    }
}

pub fn format_stamp(time: DateTime<Local>) -> String {
    time.format(STAMP_FORMAT).to_string()
}

/// Modification time of `path` as a `YYYYMMDD_HHMMSS` stamp
pub fn mtime_stamp(path: &Path) -> std::io::Result<String> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(format_stamp(DateTime::<Local>::from(modified)))
}
