// Project store: lifecycle of project directories under a workspace root

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use serde::Serialize;

use super::metadata::{format_stamp, mtime_stamp, ProjectMetadata};
use super::Project;
use crate::error::{Error, Result};
use crate::images;
use crate::timing::{TimingDocument, TimingSummary};
use crate::video::{has_extension, is_video_file};

const PROJECTS_DIR: &str = "projects";

/// Read-only snapshot of what a project contains
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectState {
    pub has_video: bool,
    pub frame_count: usize,
    pub modified_count: usize,
    /// Newest first
    pub timing_files: Vec<PathBuf>,
    pub selected_timing: Option<PathBuf>,
    /// Newest first
    pub output_files: Vec<PathBuf>,
    pub latest_output: Option<PathBuf>,
}

pub struct ProjectStore {
    projects_root: PathBuf,
}

impl ProjectStore {
    /// Store rooted at `<workspace_root>/projects`, created if needed
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self> {
        let projects_root = workspace_root.as_ref().join(PROJECTS_DIR);
        std::fs::create_dir_all(&projects_root)?;
        Ok(Self { projects_root })
    }

    pub fn projects_root(&self) -> &Path {
        &self.projects_root
    }

    /// Create a project for `video_path` and copy the video into it
    pub fn create_project_from_video(&self, video_path: impl AsRef<Path>) -> Result<Project> {
        let source = video_path.as_ref();
        if !source.is_file() {
            return Err(Error::not_found("Video file", source));
        }
        let file_name = source
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("{} has no file name", source.display())))?;

        let stamp = format_stamp(Local::now());
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let root = self.unique_root(&format!("{}_{}", sanitize_project_name(&stem), stamp));

        let mut project = Project::at(&root, stamp);
        if let Err(e) = self.populate(&mut project, source, file_name) {
            // Don't leave a half-created project behind
            if let Err(cleanup) = std::fs::remove_dir_all(&root) {
                log::warn!("Failed to clean up {}: {}", root.display(), cleanup);
            }
            return Err(e);
        }

        log::info!("Created project {} from {}", project.name, source.display());
        Ok(project)
    }

    fn populate(&self, project: &mut Project, source: &Path, file_name: &std::ffi::OsStr) -> Result<()> {
        project.ensure_dirs()?;

        let target = project.original_dir.join(file_name);
        std::fs::copy(source, &target)?;
        project.original_video = Some(target);

        ProjectMetadata {
            name: project.name.clone(),
            created_at: project.created_at.clone(),
            source_video_name: file_name.to_string_lossy().to_string(),
        }
        .write(&project.root)
    }

    fn unique_root(&self, base: &str) -> PathBuf {
        let mut root = self.projects_root.join(base);
        let mut n = 2;
        while root.exists() {
            root = self.projects_root.join(format!("{}_{}", base, n));
            n += 1;
        }
        root
    }

    /// All loadable projects, most recently modified first
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects: Vec<(SystemTime, Project)> = Vec::new();

        for entry in std::fs::read_dir(&self.projects_root)?.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match self.load_project(&path) {
                Ok(project) => projects.push((modified_time(&path), project)),
                Err(e) => log::debug!("Skipping {}: {}", path.display(), e),
            }
        }

        projects.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(projects.into_iter().map(|(_, p)| p).collect())
    }

    /// Rebuild a project from its directory, ensuring the skeleton exists
    pub fn load_project(&self, dir: impl AsRef<Path>) -> Result<Project> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::not_found("Project directory", dir));
        }

        let created_at = match ProjectMetadata::read(dir)? {
            Some(meta) if !meta.created_at.is_empty() => meta.created_at,
            _ => mtime_stamp(dir)?,
        };

        let mut project = Project::at(dir, created_at);
        project.ensure_dirs()?;
        project.original_video = find_first_video(&project.original_dir)?;
        Ok(project)
    }

    /// Directory a `<project>` argument refers to: a directory name under the
    /// projects root if one exists, otherwise the argument as a path. Read-only.
    pub fn project_dir(&self, name_or_path: &str) -> PathBuf {
        let by_name = self.projects_root.join(name_or_path);
        if by_name.is_dir() {
            by_name
        } else {
            PathBuf::from(name_or_path)
        }
    }

    /// Resolve and load a project by name or path
    ///
    /// Paths outside the projects root are refused with [`Error::PathSafety`]
    /// before anything is created on disk.
    pub fn find_project(&self, name_or_path: &str) -> Result<Project> {
        let dir = self.project_dir(name_or_path);
        if !dir.is_dir() {
            return Err(Error::not_found("Project directory", &dir));
        }
        self.contained(&dir)?;
        self.load_project(dir)
    }

    /// Remove a project directory tree
    ///
    /// The target must resolve to a strict descendant of the projects root;
    /// anything else is refused with [`Error::PathSafety`] before touching disk,
    /// whether or not it exists.
    pub fn delete_project(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        let target = self.contained(dir)?;
        if !target.exists() {
            return Err(Error::not_found("Project directory", dir));
        }

        std::fs::remove_dir_all(&target)?;
        log::info!("Deleted project {}", target.display());
        Ok(())
    }

    /// Resolve `dir` and require it to lie strictly below the projects root
    fn contained(&self, dir: &Path) -> Result<PathBuf> {
        let target = resolve_path(dir)?;
        let root = self.projects_root.canonicalize()?;
        if target == root || !target.starts_with(&root) {
            return Err(Error::PathSafety { target, root });
        }
        Ok(target)
    }

    pub fn get_project_state(&self, project: &Project) -> Result<ProjectState> {
        let timing_files = self.list_timing_files(project)?;
        let output_files = self.list_output_files(project)?;

        Ok(ProjectState {
            has_video: project.has_video(),
            frame_count: images::list_images(&project.frames_dir)?.len(),
            modified_count: images::list_images(&project.modified_dir)?.len(),
            selected_timing: timing_files.first().cloned(),
            latest_output: output_files.first().cloned(),
            timing_files,
            output_files,
        })
    }

    /// Timing documents (`*.json`) in `timestamps/`, newest first
    pub fn list_timing_files(&self, project: &Project) -> Result<Vec<PathBuf>> {
        Ok(list_newest_first(&project.timestamps_dir, &["json"])?)
    }

    /// Composed videos (`*.mp4`) in `output/`, newest first
    pub fn list_output_files(&self, project: &Project) -> Result<Vec<PathBuf>> {
        Ok(list_newest_first(&project.output_dir, &["mp4"])?)
    }

    pub fn read_timing_info(&self, timing_path: impl AsRef<Path>) -> Result<TimingSummary> {
        Ok(TimingDocument::load(timing_path.as_ref())?.summary())
    }

    /// Replace the whole modified image set with the images found in `sources`
    ///
    /// Each source is either an image file or a directory whose images are
    /// taken (non-recursively). Existing images in `modified/` are removed
    /// first, even if nothing gets copied. Returns the number copied.
    pub fn replace_modified_images<P: AsRef<Path>>(&self, project: &Project, sources: &[P]) -> Result<usize> {
        let mut files = Vec::new();
        for source in sources {
            let source = source.as_ref();
            if source.is_dir() {
                files.extend(images::list_images(source)?);
            } else if images::is_image_file(source) {
                files.push(source.to_path_buf());
            } else {
                log::warn!("Ignoring {}: not an image or directory", source.display());
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let removed = images::clear_images(&project.modified_dir)?;
        log::debug!("Cleared {} images from {}", removed, project.modified_dir.display());

        let mut copied = 0;
        for file in &files {
            if let Some(name) = file.file_name() {
                std::fs::copy(file, project.modified_dir.join(name))?;
                copied += 1;
            }
        }

        log::info!("Imported {} modified images into {}", copied, project.name);
        Ok(copied)
    }

    pub fn list_images(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        Ok(images::list_images(dir.as_ref())?)
    }

    pub fn clear_images(&self, dir: impl AsRef<Path>) -> Result<usize> {
        Ok(images::clear_images(dir.as_ref())?)
    }
}

/// Reduce a file stem to alphanumerics, `_` and `-`, trimming `_` at both ends
pub fn sanitize_project_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "project".to_string()
    } else {
        cleaned.to_string()
    }
}

fn find_first_video(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut videos: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_video_file(p))
        .collect();
    videos.sort();
    Ok(videos.into_iter().next())
}

/// Absolute form of `path` with symlinks resolved as far as it exists
///
/// `.` and `..` are folded lexically, so a path that does not exist yet still
/// resolves to where it would be.
fn resolve_path(path: &Path) -> std::io::Result<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Ok(resolved);
    }

    let mut normal = PathBuf::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::ParentDir => {
                normal.pop();
            }
            Component::CurDir => {}
            other => normal.push(other),
        }
    }

    let mut existing = normal.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(normal),
        }
    }

    let mut resolved = existing.canonicalize()?;
    resolved.extend(missing.iter().rev());
    Ok(resolved)
}

fn modified_time(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn list_newest_first(dir: &Path, extensions: &[&str]) -> std::io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<(SystemTime, PathBuf)> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_extension(p, extensions))
        .map(|p| (modified_time(&p), p))
        .collect();
    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(files.into_iter().map(|(_, p)| p).collect())
}
