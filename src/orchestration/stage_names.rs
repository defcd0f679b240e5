//! Legacy stage names as workers of the default pipeline report them, and
//! their DAG stage ids.

use std::fmt;
use std::str::FromStr;

use crate::constants::stage_ids;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyStage {
    Ingestion,
    StoryWriting,
    SceneGeneration,
    VisualsApproval,
    VideoGeneration,
    Tts,
    AudioMixing,
    CaptionGeneration,
    Assembly,
}

const STAGE_NAMES: [(LegacyStage, &str, &str); 9] = [
    (LegacyStage::Ingestion, "INGESTION", stage_ids::INGESTION),
    (LegacyStage::StoryWriting, "STORY_WRITING", stage_ids::STORY_WRITING),
    (LegacyStage::SceneGeneration, "SCENE_GENERATION", stage_ids::SCENE_GENERATION),
    (LegacyStage::VisualsApproval, "VISUALS_APPROVAL", stage_ids::VISUALS_APPROVAL),
    (LegacyStage::VideoGeneration, "VIDEO_GENERATION", stage_ids::VIDEO_GENERATION),
    (LegacyStage::Tts, "TTS", stage_ids::TTS),
    (LegacyStage::AudioMixing, "AUDIO_MIXING", stage_ids::AUDIO_MIXING),
    (LegacyStage::CaptionGeneration, "CAPTION_GENERATION", stage_ids::CAPTION_GENERATION),
    (LegacyStage::Assembly, "ASSEMBLY", stage_ids::ASSEMBLY),
];

impl LegacyStage {
    pub const ALL: [LegacyStage; 9] = [
        LegacyStage::Ingestion,
        LegacyStage::StoryWriting,
        LegacyStage::SceneGeneration,
        LegacyStage::VisualsApproval,
        LegacyStage::VideoGeneration,
        LegacyStage::Tts,
        LegacyStage::AudioMixing,
        LegacyStage::CaptionGeneration,
        LegacyStage::Assembly,
    ];

    fn entry(self) -> &'static (LegacyStage, &'static str, &'static str) {
        // The table lists every variant in declaration order
        &STAGE_NAMES[self as usize]
    }

    pub fn legacy_name(self) -> &'static str {
        self.entry().1
    }

    pub fn stage_id(self) -> &'static str {
        self.entry().2
    }

    pub fn from_stage_id(stage_id: &str) -> Option<Self> {
        STAGE_NAMES
            .iter()
            .find(|(_, _, id)| *id == stage_id)
            .map(|(stage, _, _)| *stage)
    }

    pub fn from_legacy_name(name: &str) -> Option<Self> {
        STAGE_NAMES
            .iter()
            .find(|(_, legacy, _)| *legacy == name)
            .map(|(stage, _, _)| *stage)
    }
}

impl fmt::Display for LegacyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.legacy_name())
    }
}

/// Accepts either spelling
impl FromStr for LegacyStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_legacy_name(s)
            .or_else(|| Self::from_stage_id(s))
            .ok_or_else(|| format!("Unknown legacy stage: {s}"))
    }
}

pub fn legacy_to_stage_id(legacy_name: &str) -> Option<&'static str> {
    LegacyStage::from_legacy_name(legacy_name).map(LegacyStage::stage_id)
}

pub fn stage_id_to_legacy(stage_id: &str) -> Option<&'static str> {
    LegacyStage::from_stage_id(stage_id).map(LegacyStage::legacy_name)
}
