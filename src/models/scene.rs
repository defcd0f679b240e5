//! # Scene
//!
//! Per-item records the default pipeline fans out over. The legacy engine and
//! the scene handlers both derive stage completion by rescanning these rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Scene progression through the media stages. `Failed` is terminal for every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    #[default]
    Scripted,
    ImageReady,
    VideoReady,
    AudioReady,
    Failed,
}

impl SceneStatus {
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Scripted => Some(0),
            Self::ImageReady => Some(1),
            Self::VideoReady => Some(2),
            Self::AudioReady => Some(3),
            Self::Failed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// True when the scene is at or past `target`
    pub fn has_reached(&self, target: SceneStatus) -> bool {
        match (self.rank(), target.rank()) {
            (Some(current), Some(target)) => current >= target,
            _ => false,
        }
    }

    /// True when no more work for `target` can happen on this scene
    pub fn is_settled_for(&self, target: SceneStatus) -> bool {
        self.is_failed() || self.has_reached(target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scripted => "scripted",
            Self::ImageReady => "image_ready",
            Self::VideoReady => "video_ready",
            Self::AudioReady => "audio_ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SceneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SceneStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scripted" => Ok(Self::Scripted),
            "image_ready" => Ok(Self::ImageReady),
            "video_ready" => Ok(Self::VideoReady),
            "audio_ready" => Ok(Self::AudioReady),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid scene status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: Uuid,
    pub project_id: Uuid,
    pub position: i32,
    pub status: SceneStatus,
}

/// Tally of a scene rescan against one target status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SceneTally {
    pub total: usize,
    pub reached: usize,
    pub failed: usize,
}

impl SceneTally {
    pub fn of(scenes: &[Scene], target: SceneStatus) -> Self {
        scenes.iter().fold(
            SceneTally {
                total: scenes.len(),
                ..Default::default()
            },
            |mut tally, scene| {
                if scene.status.is_failed() {
                    tally.failed += 1;
                } else if scene.status.has_reached(target) {
                    tally.reached += 1;
                }
                tally
            },
        )
    }

    /// No scene is still pending work for the target
    pub fn is_settled(&self) -> bool {
        self.reached + self.failed == self.total
    }

    /// Every scene failed; an empty project never counts as wiped out
    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.failed == self.total
    }
}

/// Scenes that have not failed, in script order
pub fn active_scenes(scenes: &[Scene]) -> Vec<&Scene> {
    let mut active: Vec<&Scene> = scenes.iter().filter(|s| !s.status.is_failed()).collect();
    active.sort_by_key(|s| s.position);
    active
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(position: i32, status: SceneStatus) -> Scene {
        Scene {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            position,
            status,
        }
    }

    #[test]
    fn test_progression_ordering() {
        assert!(SceneStatus::AudioReady.has_reached(SceneStatus::ImageReady));
        assert!(SceneStatus::ImageReady.has_reached(SceneStatus::ImageReady));
        assert!(!SceneStatus::Scripted.has_reached(SceneStatus::ImageReady));
        assert!(!SceneStatus::Failed.has_reached(SceneStatus::Scripted));
        assert!(SceneStatus::Failed.is_settled_for(SceneStatus::AudioReady));
    }

    #[test]
    fn test_tally_counts_failures_separately() {
        let scenes = vec![
            scene(0, SceneStatus::VideoReady),
            scene(1, SceneStatus::Failed),
            scene(2, SceneStatus::ImageReady),
        ];

        let tally = SceneTally::of(&scenes, SceneStatus::VideoReady);
        assert_eq!(tally.reached, 1);
        assert_eq!(tally.failed, 1);
        assert!(!tally.is_settled());

        let tally = SceneTally::of(&scenes, SceneStatus::ImageReady);
        assert!(tally.is_settled());
        assert!(!tally.all_failed());
    }

    #[test]
    fn test_empty_project_is_settled_but_not_wiped_out() {
        let tally = SceneTally::of(&[], SceneStatus::ImageReady);
        assert!(tally.is_settled());
        assert!(!tally.all_failed());
    }

    #[test]
    fn test_active_scenes_drop_failures_and_sort() {
        let scenes = vec![
            scene(2, SceneStatus::ImageReady),
            scene(0, SceneStatus::Failed),
            scene(1, SceneStatus::ImageReady),
        ];
        let positions: Vec<i32> = active_scenes(&scenes).iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![1, 2]);
    }
}
