//! # Constants
//!
//! Identifiers shared by the built-in default template, the legacy engine and
//! the queue routing table.

/// Reserved identifier of the built-in default template
pub const DEFAULT_TEMPLATE_ID: &str = "default";

/// Stage ids of the built-in default template
pub mod stage_ids {
    pub const INGESTION: &str = "ingestion";
    pub const STORY_WRITING: &str = "story-writing";
    pub const SCENE_GENERATION: &str = "scene-generation";
    pub const VISUALS_APPROVAL: &str = "visuals-approval";
    pub const VIDEO_GENERATION: &str = "video-generation";
    pub const TTS: &str = "tts";
    pub const AUDIO_MIXING: &str = "audio-mixing";
    pub const CAPTION_GENERATION: &str = "caption-generation";
    pub const ASSEMBLY: &str = "assembly";

    pub const ALL: [&str; 9] = [
        INGESTION,
        STORY_WRITING,
        SCENE_GENERATION,
        VISUALS_APPROVAL,
        VIDEO_GENERATION,
        TTS,
        AUDIO_MIXING,
        CAPTION_GENERATION,
        ASSEMBLY,
    ];

    /// Stages that fan out one job per scene, in scene progression order
    pub const SCENE_STAGES: [&str; 3] = [SCENE_GENERATION, VIDEO_GENERATION, TTS];
}

/// Frozen configuration sections that can disable optional stages
pub mod config_keys {
    pub const VISUALS_APPROVAL: &str = "visualsApproval";
    pub const VIDEO_GENERATION: &str = "videoGeneration";
    pub const CAPTIONS: &str = "captions";
}

/// Default queue names per worker pool
pub mod queues {
    pub const INGESTION: &str = "ingestion";
    pub const STORY: &str = "story";
    pub const IMAGE: &str = "image-generation";
    pub const VIDEO: &str = "video-generation";
    pub const AUDIO: &str = "audio";
    pub const CAPTIONS: &str = "captions";
    pub const ASSEMBLY: &str = "assembly";
}

/// Failure reasons recorded on runs and projects
pub mod failure_reasons {
    pub const SUPERSEDED: &str = "superseded";
    pub const ALL_SCENES_FAILED: &str = "all scenes failed";
    pub const NO_SCENES: &str = "story produced no scenes";

    /// Reason for a generic stage whose every job failed
    pub fn all_jobs_failed(stage_id: &str) -> String {
        format!("all jobs of stage '{stage_id}' failed")
    }
}
