//! Extraction and composition runs against a project
//!
//! A job wraps one segmenter or composer pass with the project bookkeeping
//! around it: the per-project lock, clearing stale keyframes, naming the
//! timing document and the output video, and timing the run.
//!
//! Jobs run synchronously through `run*`, or on a worker thread through
//! [`spawn_extract`] / [`spawn_compose`], which report back over a
//! crossbeam channel:
//!
//! ```text
//! Log("Extracting ...")
//! Progress { current: 1, total: 240 }
//! ...
//! Finished(summary) | Failed { kind, message }
//! ```
//!
//! Every run ends with exactly one `Finished` or `Failed` event.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Local;
use crossbeam_channel::{Receiver, Sender};

use crate::compose::{compose_timeline, CanvasPolicy};
use crate::encoding::{EncoderConfig, Mp4Target, OutputTarget};
use crate::error::{Error, ErrorKind, Result};
use crate::images;
use crate::project::metadata::format_stamp;
use crate::project::{Project, ProjectLock};
use crate::segment::{segment_source, KeyframeFormat, DEFAULT_THRESHOLD};
use crate::timing::TimingDocument;
use crate::video::{self, FrameSource};

/// Result of a successful extraction
#[derive(Debug, Clone)]
pub struct ExtractSummary {
    pub video_path: PathBuf,
    pub frames_dir: PathBuf,
    pub timing_path: PathBuf,
    pub threshold: u64,
    pub fps: f64,
    /// Frames read from the video
    pub total_frames: u64,
    /// Keyframes written
    pub saved_frames: u64,
    pub elapsed: Duration,
}

/// Result of a successful composition
#[derive(Debug, Clone)]
pub struct ComposeSummary {
    pub timing_path: PathBuf,
    pub images_dir: PathBuf,
    /// `None` when the target is not a file
    pub output_path: Option<PathBuf>,
    pub fps: f64,
    pub timing_scenes: usize,
    pub input_images: usize,
    pub scenes_written: u64,
    pub frames_written: u64,
    /// Playback length of the written video
    pub duration_secs: f64,
    pub skipped_images: usize,
    pub elapsed: Duration,
    /// Size of the output file, or bytes handed to the sink for non-file targets
    pub output_size: u64,
}

/// Keyframe extraction for a project's imported video
#[derive(Debug, Clone)]
pub struct ExtractJob {
    pub project: Project,
    pub threshold: u64,
    pub format: KeyframeFormat,
}

impl ExtractJob {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            threshold: DEFAULT_THRESHOLD,
            format: KeyframeFormat::default(),
        }
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_format(mut self, format: KeyframeFormat) -> Self {
        self.format = format;
        self
    }

    fn video_path(&self) -> Result<&Path> {
        match self.project.original_video.as_deref() {
            Some(path) if path.is_file() => Ok(path),
            Some(path) => Err(Error::not_found("Source video", path)),
            None => Err(Error::not_found("Source video", &self.project.original_dir)),
        }
    }

    /// `timestamps/<video stem>.json`
    pub fn timing_path(&self) -> Result<PathBuf> {
        let video = self.video_path()?;
        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "timing".to_string());
        Ok(self.project.timestamps_dir.join(format!("{}.json", stem)))
    }

    /// Decode the project's video with GStreamer and extract from it
    pub fn run<F: FnMut(u64, u64)>(&self, progress: F) -> Result<ExtractSummary> {
        let mut reader = video::open_video(self.video_path()?)?;
        self.run_with_source(&mut reader, progress)
    }

    /// Extract from an already opened frame source standing in for the video
    pub fn run_with_source<S, F>(&self, source: &mut S, progress: F) -> Result<ExtractSummary>
    where
        S: FrameSource + ?Sized,
        F: FnMut(u64, u64),
    {
        let started = Instant::now();
        let video_path = self.video_path()?.to_path_buf();
        let timing_path = self.timing_path()?;
        let _lock = ProjectLock::acquire(&self.project.root, "extract")?;

        std::fs::create_dir_all(&self.project.timestamps_dir)?;
        let cleared = images::clear_images(&self.project.frames_dir)?;
        if cleared > 0 {
            log::info!("Removed {} stale keyframes", cleared);
        }

        let segmentation = segment_source(source, &self.project.frames_dir, self.threshold, self.format, progress)?;
        segmentation.timing.save(&timing_path)?;

        Ok(ExtractSummary {
            video_path,
            frames_dir: self.project.frames_dir.clone(),
            timing_path,
            threshold: self.threshold,
            fps: segmentation.timing.fps,
            total_frames: segmentation.frames_scanned,
            saved_frames: segmentation.keyframes_written,
            elapsed: started.elapsed(),
        })
    }
}

/// Composition of a project's modified images against a timing document
#[derive(Debug, Clone)]
pub struct ComposeJob {
    pub project: Project,
    pub timing_path: PathBuf,
    pub images_dir: PathBuf,
    pub canvas_policy: CanvasPolicy,
    pub encoder: EncoderConfig,
}

impl ComposeJob {
    /// Compose `modified/` against `timing_path`
    pub fn new(project: Project, timing_path: impl Into<PathBuf>) -> Self {
        let images_dir = project.modified_dir.clone();
        Self {
            project,
            timing_path: timing_path.into(),
            images_dir,
            canvas_policy: CanvasPolicy::default(),
            encoder: EncoderConfig::default(),
        }
    }

    pub fn with_images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.images_dir = dir.into();
        self
    }

    pub fn with_canvas_policy(mut self, policy: CanvasPolicy) -> Self {
        self.canvas_policy = policy;
        self
    }

    pub fn with_encoder(mut self, config: EncoderConfig) -> Self {
        self.encoder = config;
        self
    }

    /// Fresh `output/<project>_<YYYYMMDD_HHMMSS>.mp4`; earlier outputs are kept
    pub fn output_path(&self) -> PathBuf {
        let base = format!("{}_{}", self.project.name, format_stamp(Local::now()));
        let mut path = self.project.output_dir.join(format!("{}.mp4", base));
        let mut n = 2;
        while path.exists() {
            path = self.project.output_dir.join(format!("{}_{}.mp4", base, n));
            n += 1;
        }
        path
    }

    /// Encode to a new MP4 in the project's output directory
    pub fn run<F: FnMut(u64, u64)>(&self, progress: F) -> Result<ComposeSummary> {
        std::fs::create_dir_all(&self.project.output_dir)?;
        let mut target = Mp4Target::new(self.output_path(), self.encoder.clone());
        self.run_with_target(&mut target, progress)
    }

    pub fn run_with_target<T, F>(&self, target: &mut T, progress: F) -> Result<ComposeSummary>
    where
        T: OutputTarget,
        F: FnMut(u64, u64),
    {
        let started = Instant::now();
        let timing = TimingDocument::load(&self.timing_path)?;
        let _lock = ProjectLock::acquire(&self.project.root, "compose")?;

        let composition = compose_timeline(&timing, &self.images_dir, target, self.canvas_policy, progress)?;

        let output_path = target.location().map(Path::to_path_buf);
        let output_size = match output_path.as_deref() {
            Some(path) => std::fs::metadata(path)?.len(),
            None => composition.encoder.bytes_written,
        };

        Ok(ComposeSummary {
            timing_path: self.timing_path.clone(),
            images_dir: self.images_dir.clone(),
            output_path,
            fps: composition.fps,
            timing_scenes: composition.timing_scenes,
            input_images: composition.input_images,
            scenes_written: composition.scenes_written,
            frames_written: composition.frames_written,
            duration_secs: composition.duration_secs(),
            skipped_images: composition.skipped.len(),
            elapsed: started.elapsed(),
            output_size,
        })
    }
}

/// Notification from a background job
#[derive(Debug, Clone)]
pub enum JobEvent<T> {
    Progress { current: u64, total: u64 },
    Log(String),
    Finished(T),
    Failed { kind: ErrorKind, message: String },
}

/// Terminal failure reported by a background job
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Handle to a job running on a worker thread
pub struct JobHandle<T> {
    events: Receiver<JobEvent<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T> JobHandle<T> {
    pub fn events(&self) -> &Receiver<JobEvent<T>> {
        &self.events
    }

    /// Block until the job ends, passing progress and log events to `on_event`
    pub fn join<F>(mut self, mut on_event: F) -> std::result::Result<T, JobFailure>
    where
        F: FnMut(&JobEvent<T>),
    {
        let mut outcome = None;
        for event in self.events.iter() {
            match event {
                JobEvent::Finished(summary) => {
                    outcome = Some(Ok(summary));
                    break;
                }
                JobEvent::Failed { kind, message } => {
                    outcome = Some(Err(JobFailure { kind, message }));
                    break;
                }
                other => on_event(&other),
            }
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Job worker thread panicked");
            }
        }

        outcome.unwrap_or_else(|| {
            Err(JobFailure {
                kind: ErrorKind::IoFailure,
                message: "Job worker exited without a result".to_string(),
            })
        })
    }
}

fn spawn_job<T, W>(name: &str, work: W) -> Result<JobHandle<T>>
where
    T: Send + 'static,
    W: FnOnce(&Sender<JobEvent<T>>) -> Result<T> + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::unbounded();
    let thread = std::thread::Builder::new()
        .name(format!("reframe-{}", name))
        .spawn(move || {
            let terminal = match work(&tx) {
                Ok(summary) => JobEvent::Finished(summary),
                Err(e) => {
                    log::error!("Job failed: {}", e);
                    JobEvent::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };
            let _ = tx.send(terminal);
        })?;

    Ok(JobHandle {
        events: rx,
        thread: Some(thread),
    })
}

fn progress_sender<T>(tx: &Sender<JobEvent<T>>) -> impl FnMut(u64, u64) + '_ {
    move |current, total| {
        let _ = tx.send(JobEvent::Progress { current, total });
    }
}

/// Run an extraction on a worker thread, decoding with GStreamer
pub fn spawn_extract(job: ExtractJob) -> Result<JobHandle<ExtractSummary>> {
    spawn_job("extract", move |tx| {
        let video = job.video_path()?;
        let _ = tx.send(JobEvent::Log(format!("Extracting keyframes from {}", video.display())));
        let summary = job.run(progress_sender(tx))?;
        let _ = tx.send(JobEvent::Log(extract_message(&summary)));
        Ok(summary)
    })
}

/// Run an extraction on a worker thread against an explicit frame source
pub fn spawn_extract_from<S>(job: ExtractJob, mut source: S) -> Result<JobHandle<ExtractSummary>>
where
    S: FrameSource + Send + 'static,
{
    spawn_job("extract", move |tx| {
        let summary = job.run_with_source(&mut source, progress_sender(tx))?;
        let _ = tx.send(JobEvent::Log(extract_message(&summary)));
        Ok(summary)
    })
}

/// Run a composition on a worker thread, encoding to a new MP4
pub fn spawn_compose(job: ComposeJob) -> Result<JobHandle<ComposeSummary>> {
    spawn_job("compose", move |tx| {
        let _ = tx.send(JobEvent::Log(format!(
            "Composing {} with {}",
            job.images_dir.display(),
            job.timing_path.display()
        )));
        let summary = job.run(progress_sender(tx))?;
        let _ = tx.send(JobEvent::Log(compose_message(&summary)));
        Ok(summary)
    })
}

/// Run a composition on a worker thread into an explicit output target
pub fn spawn_compose_into<T>(job: ComposeJob, mut target: T) -> Result<JobHandle<ComposeSummary>>
where
    T: OutputTarget + Send + 'static,
{
    spawn_job("compose", move |tx| {
        let summary = job.run_with_target(&mut target, progress_sender(tx))?;
        let _ = tx.send(JobEvent::Log(compose_message(&summary)));
        Ok(summary)
    })
}

pub fn extract_message(summary: &ExtractSummary) -> String {
    format!(
        "Saved {} keyframes from {} frames to {} in {:.1}s",
        summary.saved_frames,
        summary.total_frames,
        summary.frames_dir.display(),
        summary.elapsed.as_secs_f64()
    )
}

pub fn compose_message(summary: &ComposeSummary) -> String {
    let target = summary
        .output_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "memory".to_string());
    format!(
        "Wrote {} scenes ({} frames, {:.2}s of video, {:.1} MB) to {} in {:.1}s",
        summary.scenes_written,
        summary.frames_written,
        summary.duration_secs,
        summary.output_size as f64 / (1024.0 * 1024.0),
        target,
        summary.elapsed.as_secs_f64()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::MemoryTarget;
    use crate::project::ProjectStore;
    use crate::video::source::MemorySource;
    use image::{Rgb, RgbImage};

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([value, value, value]))
    }

    fn project() -> (tempfile::TempDir, ProjectStore, Project) {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"stand-in").unwrap();
        let store = ProjectStore::new(dir.path().join("ws")).unwrap();
        let project = store.create_project_from_video(&video).unwrap();
        (dir, store, project)
    }

    #[test]
    fn test_extract_clears_stale_frames_and_names_timing() {
        let (_dir, _store, project) = project();
        std::fs::write(project.frames_dir.join("99999.png"), b"stale").unwrap();

        let mut source = MemorySource::new(30.0, vec![solid(0), solid(0), solid(200)]);
        let summary = ExtractJob::new(project.clone())
            .with_threshold(10)
            .run_with_source(&mut source, |_, _| {})
            .unwrap();

        assert_eq!(summary.timing_path, project.timestamps_dir.join("clip.json"));
        assert_eq!(summary.total_frames, 3);
        assert_eq!(summary.saved_frames, 2);
        assert_eq!(summary.fps, 30.0);
        assert!(!project.frames_dir.join("99999.png").exists());
        assert_eq!(images::list_images(&project.frames_dir).unwrap().len(), 2);

        let timing = TimingDocument::load(&summary.timing_path).unwrap();
        assert_eq!(timing.total_frames(), 3);
        assert!(ProjectLock::holder(&project.root).is_none());
    }

    #[test]
    fn test_extract_without_video_is_not_found() {
        let (_dir, _store, mut project) = project();
        if let Some(video) = project.original_video.take() {
            std::fs::remove_file(video).unwrap();
        }

        let mut source = MemorySource::new(24.0, vec![solid(0)]);
        let err = ExtractJob::new(project).run_with_source(&mut source, |_, _| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_busy_project_is_rejected() {
        let (_dir, _store, project) = project();
        let _held = ProjectLock::acquire(&project.root, "compose").unwrap();

        let mut source = MemorySource::new(24.0, vec![solid(0)]);
        let err = ExtractJob::new(project.clone())
            .run_with_source(&mut source, |_, _| {})
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(matches!(err, Error::Busy { .. }));
    }

    #[test]
    fn test_compose_missing_timing() {
        let (_dir, _store, project) = project();
        let job = ComposeJob::new(project.clone(), project.timestamps_dir.join("nope.json"));
        let err = job.run_with_target(&mut MemoryTarget::new(), |_, _| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_output_names_do_not_collide() {
        let (_dir, _store, project) = project();
        let job = ComposeJob::new(project.clone(), project.timestamps_dir.join("clip.json"));

        let first = job.output_path();
        assert!(first.file_name().unwrap().to_string_lossy().starts_with(&project.name));
        assert_eq!(first.extension().unwrap(), "mp4");
        std::fs::write(&first, b"x").unwrap();
        assert_ne!(job.output_path(), first);
    }

    #[test]
    fn test_spawned_jobs_report_one_terminal_event() {
        let (_dir, _store, project) = project();

        let source = MemorySource::new(24.0, vec![solid(0), solid(0), solid(255), solid(255)]);
        let handle = spawn_extract_from(ExtractJob::new(project.clone()).with_threshold(10), source).unwrap();
        let mut progress = Vec::new();
        let extract = handle
            .join(|event| {
                if let JobEvent::Progress { current, total } = event {
                    progress.push((*current, *total));
                }
            })
            .unwrap();
        assert_eq!(extract.saved_frames, 2);
        assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);

        let frames: Vec<PathBuf> = images::list_images(&project.frames_dir).unwrap();
        for frame in &frames {
            std::fs::copy(frame, project.modified_dir.join(frame.file_name().unwrap())).unwrap();
        }

        let target = MemoryTarget::new();
        let frames = target.frames.clone();
        let handle = spawn_compose_into(ComposeJob::new(project.clone(), &extract.timing_path), target).unwrap();

        let mut terminal = 0;
        let mut summary = None;
        for event in handle.events().iter() {
            match event {
                JobEvent::Finished(s) => {
                    terminal += 1;
                    summary = Some(s);
                }
                JobEvent::Failed { .. } => terminal += 1,
                _ => {}
            }
        }
        assert_eq!(terminal, 1);
        let summary = summary.unwrap();
        assert_eq!(summary.scenes_written, 2);
        assert_eq!(summary.frames_written, 4);
        assert!((summary.duration_secs - 4.0 / 24.0).abs() < 1e-9);
        assert!(compose_message(&summary).contains("0.17s of video"));
        assert!(summary.output_path.is_none());
        assert_eq!(frames.lock().len(), 4);
    }

    #[test]
    fn test_spawned_failure_carries_kind() {
        let (_dir, _store, project) = project();
        let handle = spawn_compose_into(
            ComposeJob::new(project.clone(), project.timestamps_dir.join("missing.json")),
            MemoryTarget::new(),
        )
        .unwrap();

        let err = handle.join(|_| {}).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(err.message.contains("missing.json"));
    }
}
