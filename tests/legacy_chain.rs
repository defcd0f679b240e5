mod common;

use common::Harness;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use reel_pipeline::constants::{failure_reasons, stage_ids};
use reel_pipeline::models::{ProjectStatus, SceneStatus};
use reel_pipeline::orchestration::{AdvanceOutcome, LegacyOrchestrator};
use reel_pipeline::state_machine::{RunStatus, StageStatus};

fn set_all(harness: &Harness, scenes: &[Uuid], status: SceneStatus) {
    for scene in scenes {
        harness.store.set_scene_status(*scene, status);
    }
}

fn status(harness: &Harness, project_id: Uuid) -> ProjectStatus {
    harness.store.project(project_id).unwrap().status
}

/// Start the chain and advance it until scene images are being generated
async fn through_story(
    harness: &Harness,
    legacy: &LegacyOrchestrator,
    scene_count: usize,
) -> (Uuid, Uuid, Vec<Uuid>) {
    let (project_id, user_id) = harness.project(None);
    let scenes = harness.store.add_scenes(project_id, scene_count);

    legacy.start_pipeline(project_id, user_id).await.unwrap();
    legacy.advance_after_ingestion(project_id, user_id).await.unwrap();
    legacy
        .advance_after_story_writing(project_id, user_id)
        .await
        .unwrap();
    (project_id, user_id, scenes)
}

#[tokio::test]
async fn test_full_chain_with_every_optional_stage() {
    let harness = Harness::new();
    let legacy = harness.legacy(true);
    let (project_id, user_id, scenes) = through_story(&harness, &legacy, 2).await;

    assert_eq!(harness.job_count("ingest-source"), 1);
    assert_eq!(harness.job_count("write-story"), 1);
    assert_eq!(harness.job_count("generate-scene-image"), 2);
    assert_eq!(status(&harness, project_id), ProjectStatus::GeneratingScenes);

    harness.store.set_scene_status(scenes[0], SceneStatus::ImageReady);
    let outcome = legacy
        .advance_after_scene_generation(project_id, user_id)
        .await
        .unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Waiting(p) if p.completed_jobs == 1 && p.total_jobs == 2));

    harness.store.set_scene_status(scenes[1], SceneStatus::ImageReady);
    legacy
        .advance_after_scene_generation(project_id, user_id)
        .await
        .unwrap();
    assert_eq!(status(&harness, project_id), ProjectStatus::AwaitingApproval);

    let outcome = legacy
        .advance_after_visuals_approved(project_id, user_id)
        .await
        .unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Waiting(_)));
    assert_eq!(harness.job_count("generate-scene-video"), 0);

    harness.store.approve_visuals(project_id);
    legacy
        .advance_after_visuals_approved(project_id, user_id)
        .await
        .unwrap();
    assert_eq!(harness.job_count("generate-scene-video"), 2);
    assert_eq!(status(&harness, project_id), ProjectStatus::GeneratingVideo);

    set_all(&harness, &scenes, SceneStatus::VideoReady);
    legacy
        .advance_after_video_generation(project_id, user_id)
        .await
        .unwrap();
    assert_eq!(harness.job_count("generate-scene-audio"), 2);

    set_all(&harness, &scenes, SceneStatus::AudioReady);
    legacy.advance_after_tts(project_id, user_id).await.unwrap();
    assert_eq!(harness.job_count("mix-audio"), 1);
    assert_eq!(status(&harness, project_id), ProjectStatus::MixingAudio);

    legacy
        .advance_after_audio_mixing(project_id, user_id)
        .await
        .unwrap();
    assert_eq!(harness.job_count("generate-captions"), 1);
    assert_eq!(status(&harness, project_id), ProjectStatus::GeneratingCaptions);

    legacy
        .advance_after_caption_generation(project_id, user_id)
        .await
        .unwrap();
    assert_eq!(harness.job_count("assemble-video"), 1);
    assert_eq!(status(&harness, project_id), ProjectStatus::Assembling);

    let outcome = legacy.advance_after_assembly(project_id, user_id).await.unwrap();
    assert!(outcome.report().unwrap().run_completed);

    let project = harness.store.project(project_id).unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    assert_eq!(project.progress, 100);

    // The mirror run followed every step without enqueueing anything itself
    let run = harness.latest_run(project_id);
    assert_eq!(run.status, RunStatus::Completed);
    for stage_id in stage_ids::ALL {
        assert_eq!(harness.stage_status(run.id, stage_id), StageStatus::Completed);
    }
    assert_eq!(harness.queue.len(), 1 + 1 + 2 + 2 + 2 + 1 + 1 + 1);
}

#[tokio::test]
async fn test_disabled_optional_stages_are_bypassed() {
    let harness = Harness::new();
    let legacy = harness.legacy(true);
    let (project_id, user_id) = harness.project(None);
    harness.store.set_stage_config(
        project_id,
        json!({
            "visualsApproval": { "enabled": false },
            "videoGeneration": { "enabled": false },
            "captions": { "enabled": false },
        }),
    );
    let scenes = harness.store.add_scenes(project_id, 3);

    legacy.start_pipeline(project_id, user_id).await.unwrap();
    legacy.advance_after_ingestion(project_id, user_id).await.unwrap();
    legacy
        .advance_after_story_writing(project_id, user_id)
        .await
        .unwrap();

    set_all(&harness, &scenes, SceneStatus::ImageReady);
    let outcome = legacy
        .advance_after_scene_generation(project_id, user_id)
        .await
        .unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.started, vec![stage_ids::TTS.to_string()]);
    assert_eq!(
        report.skipped,
        vec![
            stage_ids::VISUALS_APPROVAL.to_string(),
            stage_ids::VIDEO_GENERATION.to_string()
        ]
    );
    assert_eq!(harness.job_count("generate-scene-video"), 0);
    assert_eq!(harness.job_count("generate-scene-audio"), 3);
    assert_eq!(status(&harness, project_id), ProjectStatus::GeneratingAudio);

    set_all(&harness, &scenes, SceneStatus::AudioReady);
    legacy.advance_after_tts(project_id, user_id).await.unwrap();
    let outcome = legacy
        .advance_after_audio_mixing(project_id, user_id)
        .await
        .unwrap();
    assert_eq!(
        outcome.report().unwrap().skipped,
        vec![stage_ids::CAPTION_GENERATION.to_string()]
    );
    assert_eq!(harness.job_count("generate-captions"), 0);
    assert_eq!(harness.job_count("assemble-video"), 1);

    legacy.advance_after_assembly(project_id, user_id).await.unwrap();
    let run = harness.latest_run(project_id);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        harness.stage_status(run.id, stage_ids::VIDEO_GENERATION),
        StageStatus::Skipped
    );
    assert_eq!(
        harness.stage_status(run.id, stage_ids::CAPTION_GENERATION),
        StageStatus::Skipped
    );
}

#[tokio::test]
async fn test_failed_scenes_are_left_out_of_later_stages() {
    let harness = Harness::new();
    let legacy = harness.legacy(true);
    let (project_id, user_id, scenes) = through_story(&harness, &legacy, 3).await;

    harness.store.set_scene_status(scenes[0], SceneStatus::ImageReady);
    harness.store.set_scene_status(scenes[1], SceneStatus::Failed);
    harness.store.set_scene_status(scenes[2], SceneStatus::ImageReady);
    legacy
        .advance_after_scene_generation(project_id, user_id)
        .await
        .unwrap();
    harness.store.approve_visuals(project_id);
    legacy
        .advance_after_visuals_approved(project_id, user_id)
        .await
        .unwrap();

    let scene_ids: Vec<String> = harness
        .queue
        .jobs_named("generate-scene-video")
        .iter()
        .map(|job| job.payload["sceneId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        scene_ids,
        vec![scenes[0].to_string(), scenes[2].to_string()]
    );
}

#[tokio::test]
async fn test_every_scene_failed_fails_project_and_mirror_run() {
    let harness = Harness::new();
    let legacy = harness.legacy(true);
    let (project_id, user_id, scenes) = through_story(&harness, &legacy, 2).await;

    set_all(&harness, &scenes, SceneStatus::Failed);
    let outcome = legacy
        .advance_after_scene_generation(project_id, user_id)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        AdvanceOutcome::RunFailed {
            reason: failure_reasons::ALL_SCENES_FAILED.to_string()
        }
    );
    let project = harness.store.project(project_id).unwrap();
    assert_eq!(project.status, ProjectStatus::Failed);
    assert_eq!(
        project.failure_reason.as_deref(),
        Some(failure_reasons::ALL_SCENES_FAILED)
    );

    let run = harness.latest_run(project_id);
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        harness.stage_status(run.id, stage_ids::SCENE_GENERATION),
        StageStatus::Failed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_enqueues_mixing_once() {
    let harness = Harness::new();
    let legacy = Arc::new(harness.legacy(true));
    let (project_id, user_id, scenes) = through_story(&harness, &legacy, 4).await;

    set_all(&harness, &scenes, SceneStatus::ImageReady);
    legacy
        .advance_after_scene_generation(project_id, user_id)
        .await
        .unwrap();
    harness.store.approve_visuals(project_id);
    legacy
        .advance_after_visuals_approved(project_id, user_id)
        .await
        .unwrap();
    set_all(&harness, &scenes, SceneStatus::VideoReady);
    legacy
        .advance_after_video_generation(project_id, user_id)
        .await
        .unwrap();
    set_all(&harness, &scenes, SceneStatus::AudioReady);

    // The last four audio jobs all report at once
    let calls = (0..4).map(|_| {
        let legacy = legacy.clone();
        tokio::spawn(async move { legacy.advance_after_tts(project_id, user_id).await.unwrap() })
    });
    let outcomes: Vec<AdvanceOutcome> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_advanced()).count(), 1);
    assert_eq!(harness.job_count("mix-audio"), 1);
}

#[tokio::test]
async fn test_missing_mirror_run_does_not_break_the_chain() {
    let harness = Harness::new();
    let legacy = harness.legacy(true);
    let (project_id, user_id) = harness.project(None);

    legacy.start_pipeline(project_id, user_id).await.unwrap();
    let run = harness.latest_run(project_id);
    legacy
        .mirror()
        .fail_active_run(project_id, "operator reset")
        .await
        .unwrap();
    assert_eq!(harness.latest_run(project_id).status, RunStatus::Failed);

    let outcome = legacy.advance_after_ingestion(project_id, user_id).await.unwrap();
    assert!(outcome.is_advanced());
    assert_eq!(harness.job_count("write-story"), 1);
    assert_eq!(harness.stage_status(run.id, stage_ids::INGESTION), StageStatus::Failed);
}

#[tokio::test]
async fn test_jobs_carry_the_mirror_run_id() {
    let harness = Harness::new();
    let legacy = harness.legacy(true);
    let (project_id, user_id) = harness.project(None);

    let run_id = legacy.start_pipeline(project_id, user_id).await.unwrap().unwrap();

    let job = &harness.queue.jobs_named("ingest-source")[0];
    assert_eq!(job.payload["pipelineRunId"], json!(run_id));
    assert_eq!(job.payload["stageId"], json!(stage_ids::INGESTION));
    assert_eq!(status(&harness, project_id), ProjectStatus::Ingesting);
}

#[tokio::test]
async fn test_chain_completes_without_single_flight() {
    let harness = Harness::new();
    let legacy = harness.legacy(false);
    let (project_id, user_id, scenes) = through_story(&harness, &legacy, 2).await;

    set_all(&harness, &scenes, SceneStatus::ImageReady);
    legacy
        .advance_after_scene_generation(project_id, user_id)
        .await
        .unwrap();
    harness.store.approve_visuals(project_id);
    legacy
        .advance_after_visuals_approved(project_id, user_id)
        .await
        .unwrap();
    set_all(&harness, &scenes, SceneStatus::VideoReady);
    legacy
        .advance_after_video_generation(project_id, user_id)
        .await
        .unwrap();
    set_all(&harness, &scenes, SceneStatus::AudioReady);
    legacy.advance_after_tts(project_id, user_id).await.unwrap();
    legacy
        .advance_after_audio_mixing(project_id, user_id)
        .await
        .unwrap();
    legacy
        .advance_after_caption_generation(project_id, user_id)
        .await
        .unwrap();
    let outcome = legacy.advance_after_assembly(project_id, user_id).await.unwrap();
    assert!(outcome.report().unwrap().run_completed);

    let project = harness.store.project(project_id).unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    assert_eq!(project.progress, 100);
    assert_eq!(harness.latest_run(project_id).status, RunStatus::Completed);
    assert_eq!(harness.queue.len(), 1 + 1 + 2 + 2 + 2 + 1 + 1 + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_without_single_flight_every_racing_report_enqueues_mixing() {
    let harness = Harness::new();
    let legacy = Arc::new(harness.legacy(false));
    let (project_id, user_id, scenes) = through_story(&harness, &legacy, 4).await;

    set_all(&harness, &scenes, SceneStatus::ImageReady);
    legacy
        .advance_after_scene_generation(project_id, user_id)
        .await
        .unwrap();
    harness.store.approve_visuals(project_id);
    legacy
        .advance_after_visuals_approved(project_id, user_id)
        .await
        .unwrap();
    set_all(&harness, &scenes, SceneStatus::VideoReady);
    legacy
        .advance_after_video_generation(project_id, user_id)
        .await
        .unwrap();
    set_all(&harness, &scenes, SceneStatus::AudioReady);

    let calls = (0..4).map(|_| {
        let legacy = legacy.clone();
        tokio::spawn(async move { legacy.advance_after_tts(project_id, user_id).await.unwrap() })
    });
    let outcomes: Vec<AdvanceOutcome> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    // Unguarded, each report that sees every scene settled advances
    assert!(outcomes.iter().all(AdvanceOutcome::is_advanced));
    assert_eq!(harness.job_count("mix-audio"), 4);

    // The mirror run still records the stage transition once
    let run = harness.latest_run(project_id);
    assert_eq!(harness.stage_status(run.id, stage_ids::TTS), StageStatus::Completed);
    assert_eq!(
        harness.stage_status(run.id, stage_ids::AUDIO_MIXING),
        StageStatus::Running
    );
}
