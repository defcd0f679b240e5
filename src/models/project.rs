//! # Project
//!
//! The unit a pipeline runs for. Only the fields the orchestrator reads or
//! writes are modeled here; the rest of the project row belongs to the CRUD
//! layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Coarse project status shown to users while a pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Ingesting,
    WritingStory,
    GeneratingScenes,
    AwaitingApproval,
    GeneratingVideo,
    GeneratingAudio,
    MixingAudio,
    GeneratingCaptions,
    Assembling,
    Completed,
    Failed,
    Cancelled,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 13] = [
        Self::Draft,
        Self::Ingesting,
        Self::WritingStory,
        Self::GeneratingScenes,
        Self::AwaitingApproval,
        Self::GeneratingVideo,
        Self::GeneratingAudio,
        Self::MixingAudio,
        Self::GeneratingCaptions,
        Self::Assembling,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Ingesting => "INGESTING",
            Self::WritingStory => "WRITING_STORY",
            Self::GeneratingScenes => "GENERATING_SCENES",
            Self::AwaitingApproval => "AWAITING_APPROVAL",
            Self::GeneratingVideo => "GENERATING_VIDEO",
            Self::GeneratingAudio => "GENERATING_AUDIO",
            Self::MixingAudio => "MIXING_AUDIO",
            Self::GeneratingCaptions => "GENERATING_CAPTIONS",
            Self::Assembling => "ASSEMBLING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Terminal project states a new pipeline may be started from
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid project status: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Selected pipeline template; `None` means the built-in default
    pub template_id: Option<String>,
    pub status: ProjectStatus,
    pub progress: i32,
    pub visuals_approved_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl Project {
    pub fn new(user_id: Uuid, template_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            template_id,
            status: ProjectStatus::Draft,
            progress: 0,
            visuals_approved_at: None,
            failure_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_status_round_trips_through_labels() {
        for status in ProjectStatus::ALL {
            assert_eq!(status.as_str().parse::<ProjectStatus>().unwrap(), status);
        }
        assert!("writing_story".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_project_status_serde_matches_labels() {
        let json = serde_json::to_string(&ProjectStatus::GeneratingCaptions).unwrap();
        assert_eq!(json, "\"GENERATING_CAPTIONS\"");
    }
}
