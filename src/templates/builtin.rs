use crate::constants::{config_keys, stage_ids, DEFAULT_TEMPLATE_ID};
use crate::models::{PipelineTemplate, ProjectStatus, StageDefinition};

/// The original hand-coded pipeline expressed as a template
pub fn default_template() -> PipelineTemplate {
    PipelineTemplate {
        id: DEFAULT_TEMPLATE_ID.to_string(),
        slug: DEFAULT_TEMPLATE_ID.to_string(),
        name: "Story video".to_string(),
        stages: vec![
            StageDefinition::new(stage_ids::INGESTION, &[])
                .with_status(ProjectStatus::Ingesting, 5),
            StageDefinition::new(stage_ids::STORY_WRITING, &[stage_ids::INGESTION])
                .with_status(ProjectStatus::WritingStory, 15),
            StageDefinition::new(stage_ids::SCENE_GENERATION, &[stage_ids::STORY_WRITING])
                .with_status(ProjectStatus::GeneratingScenes, 35),
            StageDefinition::new(stage_ids::VISUALS_APPROVAL, &[stage_ids::SCENE_GENERATION])
                .optional(config_keys::VISUALS_APPROVAL)
                .with_status(ProjectStatus::AwaitingApproval, 45),
            StageDefinition::new(stage_ids::VIDEO_GENERATION, &[stage_ids::VISUALS_APPROVAL])
                .optional(config_keys::VIDEO_GENERATION)
                .with_status(ProjectStatus::GeneratingVideo, 60),
            StageDefinition::new(stage_ids::TTS, &[stage_ids::VIDEO_GENERATION])
                .with_status(ProjectStatus::GeneratingAudio, 75),
            StageDefinition::new(stage_ids::AUDIO_MIXING, &[stage_ids::TTS])
                .with_status(ProjectStatus::MixingAudio, 85),
            StageDefinition::new(stage_ids::CAPTION_GENERATION, &[stage_ids::AUDIO_MIXING])
                .optional(config_keys::CAPTIONS)
                .with_status(ProjectStatus::GeneratingCaptions, 90),
            StageDefinition::new(stage_ids::ASSEMBLY, &[stage_ids::CAPTION_GENERATION])
                .with_status(ProjectStatus::Assembling, 95),
        ],
    }
}
