// Workflow stage tracking for status display
//
// Derived fresh from a `ProjectState` every time; nothing here is stored.

use serde::Serialize;

use crate::project::ProjectState;

/// Workflow stages in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ImportVideo,
    SplitFrames,
    /// Derived: frames were split and edited images came back
    EditExternally,
    UploadModified,
    SelectTiming,
    ComposeVideo,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::ImportVideo,
        Stage::SplitFrames,
        Stage::EditExternally,
        Stage::UploadModified,
        Stage::SelectTiming,
        Stage::ComposeVideo,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::ImportVideo => "Import video",
            Stage::SplitFrames => "Split keyframes",
            Stage::EditExternally => "Edit images externally",
            Stage::UploadModified => "Upload modified images",
            Stage::SelectTiming => "Select timing file",
            Stage::ComposeVideo => "Compose video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Completion per stage, indexed like [`Stage::ALL`]
    pub completed: [bool; 6],
    /// Index of the first incomplete stage, or the last stage when all are done
    pub current: usize,
}

impl StageReport {
    pub fn from_state(state: &ProjectState) -> Self {
        let split = state.frame_count > 0;
        let uploaded = state.modified_count > 0;
        let completed = [
            state.has_video,
            split,
            split && uploaded,
            uploaded,
            state.selected_timing.as_deref().is_some_and(|p| p.is_file()),
            state.latest_output.as_deref().is_some_and(|p| p.is_file()),
        ];
        let current = completed
            .iter()
            .position(|done| !done)
            .unwrap_or(completed.len() - 1);

        Self { completed, current }
    }

    pub fn current_stage(&self) -> Stage {
        Stage::ALL[self.current]
    }

    pub fn is_complete(&self) -> bool {
        self.completed.iter().all(|done| *done)
    }
}

impl std::fmt::Display for StageReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, stage) in Stage::ALL.iter().enumerate() {
            let mark = if self.completed[idx] {
                "x"
            } else if idx == self.current {
                ">"
            } else {
                " "
            };
            writeln!(f, "[{}] {}. {}", mark, idx + 1, stage.label())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_only() {
        let state = ProjectState {
            has_video: true,
            ..Default::default()
        };
        let report = StageReport::from_state(&state);
        assert_eq!(report.completed, [true, false, false, false, false, false]);
        assert_eq!(report.current, 1);
        assert_eq!(report.current_stage(), Stage::SplitFrames);
    }

    #[test]
    fn test_edit_is_derived() {
        let state = ProjectState {
            has_video: true,
            modified_count: 2,
            ..Default::default()
        };
        let report = StageReport::from_state(&state);
        assert_eq!(report.completed, [true, false, false, true, false, false]);
        assert_eq!(report.current, 1);

        let state = ProjectState {
            has_video: true,
            frame_count: 3,
            modified_count: 2,
            ..Default::default()
        };
        let report = StageReport::from_state(&state);
        assert_eq!(report.completed, [true, true, true, true, false, false]);
        assert_eq!(report.current_stage(), Stage::SelectTiming);
    }

    #[test]
    fn test_paths_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let timing = dir.path().join("clip.json");
        let output = dir.path().join("clip.mp4");
        std::fs::write(&timing, b"{}").unwrap();

        let mut state = ProjectState {
            has_video: true,
            frame_count: 1,
            modified_count: 1,
            selected_timing: Some(timing),
            latest_output: Some(output.clone()),
            ..Default::default()
        };
        let report = StageReport::from_state(&state);
        assert!(report.completed[4]);
        assert!(!report.completed[5]);
        assert_eq!(report.current, 5);

        std::fs::write(&output, b"x").unwrap();
        state.latest_output = Some(output);
        let report = StageReport::from_state(&state);
        assert!(report.is_complete());
        assert_eq!(report.current, 5);
    }

    #[test]
    fn test_empty_and_display() {
        let report = StageReport::from_state(&ProjectState::default());
        assert_eq!(report.current_stage(), Stage::ImportVideo);
        let text = report.to_string();
        assert!(text.starts_with("[>] 1. Import video"));
        assert_eq!(text.lines().count(), 6);
    }
}
