mod common;

use common::{template, Harness};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use reel_pipeline::error::TemplateError;
use reel_pipeline::models::{PipelineTemplate, StageDefinition};
use reel_pipeline::state_machine::{RunStatus, StageStatus};
use reel_pipeline::store::PipelineStore;

/// Dependency lists that only point at earlier stages, plus a disabled flag
/// per stage
fn dag_strategy() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<bool>)> {
    (1usize..10).prop_flat_map(|n| {
        let deps: Vec<_> = (0..n)
            .map(|i| prop::collection::vec(0..i.max(1), 0..=i.min(3)))
            .collect();
        (deps, prop::collection::vec(any::<bool>(), n))
    })
}

fn stage_id(index: usize) -> String {
    format!("s{index}")
}

fn build_template(deps: &[Vec<usize>]) -> PipelineTemplate {
    let stages = deps
        .iter()
        .enumerate()
        .map(|(i, stage_deps)| {
            let mut ids: Vec<String> = stage_deps.iter().map(|d| stage_id(*d)).collect();
            ids.sort();
            ids.dedup();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            StageDefinition::new(stage_id(i), &refs).optional(stage_id(i))
        })
        .collect();
    template("generated", stages)
}

proptest! {
    /// Forward-only edges always validate, and the ordering respects every edge
    #[test]
    fn generated_templates_are_acyclic((deps, _) in dag_strategy()) {
        let template = build_template(&deps);
        prop_assert!(template.validate().is_ok());

        let order = template.topological_order().unwrap();
        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        for stage in &template.stages {
            for dep in &stage.depends_on {
                prop_assert!(position[dep.as_str()] < position[stage.stage_id.as_str()]);
            }
        }
    }

    /// Adding an edge from the first stage back to the last one closes a cycle
    #[test]
    fn back_edges_are_rejected((deps, _) in dag_strategy()) {
        prop_assume!(deps.len() > 1);
        let mut template = build_template(&deps);
        let last = stage_id(deps.len() - 1);
        // Make the chain explicit so the back edge always closes a loop
        for i in 1..template.stages.len() {
            let previous = stage_id(i - 1);
            if !template.stages[i].depends_on.contains(&previous) {
                template.stages[i].depends_on.push(previous);
            }
        }
        template.stages[0].depends_on.push(last);

        prop_assert!(
            matches!(template.validate(), Err(TemplateError::Cycle { .. })),
            "expected cycle error"
        );
    }

    /// Driving a run to the end starts every enabled stage exactly once and
    /// skips every disabled one
    #[test]
    fn every_enabled_stage_runs_exactly_once((deps, disabled) in dag_strategy()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let harness = Harness::with_templates(vec![build_template(&deps)]);
            for i in 0..deps.len() {
                harness.register_single(&stage_id(i));
            }
            let (project_id, user_id) = harness.project(Some("generated"));

            let config: Map<String, Value> = disabled
                .iter()
                .enumerate()
                .filter(|(_, off)| **off)
                .map(|(i, _)| (stage_id(i), json!({ "enabled": false })))
                .collect();
            harness.store.set_stage_config(project_id, Value::Object(config));

            let dag = harness.dag();
            let run_id = dag.start_pipeline(project_id, user_id).await.unwrap().unwrap();

            // Each pass reports every running stage; a chain needs at most n passes
            for _ in 0..=deps.len() {
                let running: Vec<String> = harness
                    .store
                    .list_stages(run_id)
                    .await
                    .unwrap()
                    .into_iter()
                    .filter(|s| s.status == StageStatus::Running)
                    .map(|s| s.stage_id)
                    .collect();
                if running.is_empty() {
                    break;
                }
                for id in running {
                    dag.check_and_advance_pipeline(project_id, user_id, &id)
                        .await
                        .unwrap();
                }
            }

            assert_eq!(harness.latest_run(project_id).status, RunStatus::Completed);
            for (i, off) in disabled.iter().enumerate() {
                let id = stage_id(i);
                let expected = if *off { StageStatus::Skipped } else { StageStatus::Completed };
                assert_eq!(harness.stage_status(run_id, &id), expected);
                assert_eq!(harness.job_count(&id), usize::from(!*off));
            }
        });
    }
}
