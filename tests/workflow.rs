// End-to-end project workflow with in-memory video collaborators

use image::{Rgb, RgbImage};

use reframe_lib::encoding::MemoryTarget;
use reframe_lib::jobs::{ComposeJob, ExtractJob};
use reframe_lib::video::source::MemorySource;
use reframe_lib::{ErrorKind, ProjectStore, Stage, StageReport, TimingDocument};

fn solid(value: u8) -> RgbImage {
    RgbImage::from_pixel(6, 4, Rgb([value, value, value]))
}

#[test]
fn test_full_workflow() {
    let tmp = tempfile::tempdir().unwrap();
    let video = tmp.path().join("holiday.mp4");
    std::fs::write(&video, b"stand-in for an encoded video").unwrap();

    let store = ProjectStore::new(tmp.path().join("workspace")).unwrap();
    let project = store.create_project_from_video(&video).unwrap();

    let report = StageReport::from_state(&store.get_project_state(&project).unwrap());
    assert_eq!(report.completed, [true, false, false, false, false, false]);
    assert_eq!(report.current_stage(), Stage::SplitFrames);

    // Three scenes: 3 dark frames, 2 bright, 1 mid
    let frames = vec![solid(10), solid(10), solid(10), solid(240), solid(240), solid(120)];
    let mut source = MemorySource::new(25.0, frames);
    let mut progress = Vec::new();
    let extract = ExtractJob::new(project.clone())
        .with_threshold(1_000)
        .run_with_source(&mut source, |c, t| progress.push((c, t)))
        .unwrap();

    assert_eq!(extract.total_frames, 6);
    assert_eq!(extract.saved_frames, 3);
    assert_eq!(progress.len(), 6);
    assert!(progress.iter().all(|(_, total)| *total == 6));
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));

    let timing = TimingDocument::load(&extract.timing_path).unwrap();
    let durations: Vec<u64> = timing.scenes.iter().map(|s| s.duration_frames).collect();
    assert_eq!(durations, vec![3, 2, 1]);
    assert_eq!(timing.fps, 25.0);

    // Edit externally: invert every keyframe into a separate folder
    let edited = tmp.path().join("edited");
    std::fs::create_dir(&edited).unwrap();
    for keyframe in store.list_images(&project.frames_dir).unwrap() {
        let mut img = image::open(&keyframe).unwrap().to_rgb8();
        image::imageops::invert(&mut img);
        img.save(edited.join(keyframe.file_name().unwrap())).unwrap();
    }
    assert_eq!(store.replace_modified_images(&project, &[&edited]).unwrap(), 3);

    let state = store.get_project_state(&project).unwrap();
    assert_eq!(state.selected_timing.as_deref(), Some(extract.timing_path.as_path()));
    let report = StageReport::from_state(&state);
    assert_eq!(report.completed, [true, true, true, true, true, false]);
    assert_eq!(report.current_stage(), Stage::ComposeVideo);

    let mut target = MemoryTarget::new();
    let compose = ComposeJob::new(project.clone(), &extract.timing_path)
        .run_with_target(&mut target, |_, _| {})
        .unwrap();

    assert_eq!(compose.scenes_written, 3);
    assert_eq!(compose.frames_written, 6);
    assert_eq!(target.opened, vec![(6, 4, 25.0)]);

    let values: Vec<u8> = target.frames.lock().iter().map(|f| f.get_pixel(0, 0)[0]).collect();
    assert_eq!(values, vec![245, 245, 245, 15, 15, 135]);

    store.delete_project(&project.root).unwrap();
    assert!(store.list_projects().unwrap().is_empty());
}

#[test]
fn test_reextract_replaces_previous_keyframes() {
    let tmp = tempfile::tempdir().unwrap();
    let video = tmp.path().join("clip.mkv");
    std::fs::write(&video, b"x").unwrap();
    let store = ProjectStore::new(tmp.path()).unwrap();
    let project = store.create_project_from_video(&video).unwrap();

    let frames: Vec<RgbImage> = (0..5u8).map(|i| solid(i * 50)).collect();
    let mut source = MemorySource::new(24.0, frames.clone());
    ExtractJob::new(project.clone())
        .with_threshold(1)
        .run_with_source(&mut source, |_, _| {})
        .unwrap();
    assert_eq!(store.list_images(&project.frames_dir).unwrap().len(), 5);

    let mut source = MemorySource::new(24.0, frames);
    let summary = ExtractJob::new(project.clone())
        .with_threshold(u64::MAX)
        .run_with_source(&mut source, |_, _| {})
        .unwrap();
    assert_eq!(summary.saved_frames, 1);
    assert_eq!(store.list_images(&project.frames_dir).unwrap().len(), 1);
    assert_eq!(store.list_timing_files(&project).unwrap().len(), 1);
}

#[test]
fn test_compose_without_images_fails_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    let video = tmp.path().join("clip.avi");
    std::fs::write(&video, b"x").unwrap();
    let store = ProjectStore::new(tmp.path()).unwrap();
    let project = store.create_project_from_video(&video).unwrap();

    let mut source = MemorySource::new(24.0, vec![solid(0), solid(0)]);
    let extract = ExtractJob::new(project.clone())
        .run_with_source(&mut source, |_, _| {})
        .unwrap();

    let mut target = MemoryTarget::new();
    let err = ComposeJob::new(project.clone(), &extract.timing_path)
        .run_with_target(&mut target, |_, _| {})
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(target.opened.is_empty());
    assert!(store.list_output_files(&project).unwrap().is_empty());
}
