//! # Pipeline Templates
//!
//! Static, versioned description of a pipeline as a DAG of named stages.
//!
//! A template is immutable once published. Dependency resolution treats a
//! stage as done when it is `completed` or `skipped`, so these helpers take
//! the done set as plain stage ids and never look at run state directly.
//!
//! ## Validation
//!
//! [`PipelineTemplate::validate`] rejects duplicate stage ids, dependencies on
//! unknown stages and cycles. Only validated templates enter the catalog, which
//! is what makes [`PipelineTemplate::find_next_stages`] walks terminate.
//!
//! Scene stages share a single status progression per scene, so a template
//! must chain them in that order: a video stage running beside a narration
//! stage would see scenes already past its target and complete early.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::constants::stage_ids;
use crate::error::TemplateError;
use crate::models::frozen_config::FrozenConfig;
use crate::models::project::ProjectStatus;

/// One named stage and its dependency edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub stage_id: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub can_be_disabled: bool,
    /// Section of the frozen configuration that can disable this stage
    #[serde(default)]
    pub config_key: Option<String>,
    pub project_status_label: ProjectStatus,
    /// UI hint, monotonic along any path through the DAG
    #[serde(default)]
    pub progress_percent: i32,
}

impl StageDefinition {
    pub fn new(stage_id: impl Into<String>, depends_on: &[&str]) -> Self {
        Self {
            stage_id: stage_id.into(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            can_be_disabled: false,
            config_key: None,
            project_status_label: ProjectStatus::Draft,
            progress_percent: 0,
        }
    }

    /// Mark the stage optional, controlled by the `config_key` section
    pub fn optional(mut self, config_key: impl Into<String>) -> Self {
        self.can_be_disabled = true;
        self.config_key = Some(config_key.into());
        self
    }

    pub fn with_status(mut self, label: ProjectStatus, progress_percent: i32) -> Self {
        self.project_status_label = label;
        self.progress_percent = progress_percent;
        self
    }

    pub fn is_root(&self) -> bool {
        self.depends_on.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTemplate {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub stages: Vec<StageDefinition>,
}

impl PipelineTemplate {
    pub fn stage(&self, stage_id: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.stage_id == stage_id)
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.stage_id.as_str())
    }

    pub fn find_root_stages(&self) -> Vec<&StageDefinition> {
        self.stages.iter().filter(|s| s.is_root()).collect()
    }

    /// Stages not yet done whose every dependency is done, in template order
    pub fn find_next_stages(&self, done: &HashSet<String>) -> Vec<&StageDefinition> {
        self.stages
            .iter()
            .filter(|s| !done.contains(&s.stage_id))
            .filter(|s| s.depends_on.iter().all(|dep| done.contains(dep)))
            .collect()
    }

    /// True once every stage of the template is in the done set
    pub fn is_exhausted(&self, done: &HashSet<String>) -> bool {
        self.stages.iter().all(|s| done.contains(&s.stage_id))
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.stages.is_empty() {
            return Err(TemplateError::Empty {
                template: self.id.clone(),
            });
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.stage_id.as_str()) {
                return Err(TemplateError::DuplicateStage {
                    template: self.id.clone(),
                    stage_id: stage.stage_id.clone(),
                });
            }
        }

        for stage in &self.stages {
            if let Some(dependency) = stage.depends_on.iter().find(|d| !seen.contains(d.as_str())) {
                return Err(TemplateError::UnknownDependency {
                    template: self.id.clone(),
                    stage_id: stage.stage_id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        self.topological_order()?;
        self.check_scene_stage_order()
    }

    fn check_scene_stage_order(&self) -> Result<(), TemplateError> {
        let present: Vec<&str> = stage_ids::SCENE_STAGES
            .iter()
            .copied()
            .filter(|id| self.stage(id).is_some())
            .collect();

        for pair in present.windows(2) {
            if !self.depends_transitively(pair[1], pair[0]) {
                return Err(TemplateError::UnorderedSceneStages {
                    template: self.id.clone(),
                    earlier: pair[0].to_string(),
                    later: pair[1].to_string(),
                });
            }
        }
        Ok(())
    }

    /// True when `stage_id` reaches `ancestor` through its dependency edges
    pub fn depends_transitively(&self, stage_id: &str, ancestor: &str) -> bool {
        let mut stack = vec![stage_id];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(stage) = self.stage(current) else {
                continue;
            };
            for dep in &stage.depends_on {
                if dep == ancestor {
                    return true;
                }
                stack.push(dep.as_str());
            }
        }
        false
    }

    /// Kahn ordering of the stage ids; ties keep template order
    pub fn topological_order(&self) -> Result<Vec<&str>, TemplateError> {
        let mut in_degree: HashMap<&str, usize> = self
            .stages
            .iter()
            .map(|s| (s.stage_id.as_str(), s.depends_on.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for stage in &self.stages {
            for dep in &stage.depends_on {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(stage.stage_id.as_str());
            }
        }

        let mut ready: VecDeque<&str> = self
            .stages
            .iter()
            .filter(|s| s.is_root())
            .map(|s| s.stage_id.as_str())
            .collect();
        let mut order = Vec::with_capacity(self.stages.len());

        while let Some(stage_id) = ready.pop_front() {
            order.push(stage_id);
            for dependent in dependents.get(stage_id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != self.stages.len() {
            let ordered: HashSet<&str> = order.iter().copied().collect();
            return Err(TemplateError::Cycle {
                template: self.id.clone(),
                stages: self
                    .stage_ids()
                    .filter(|id| !ordered.contains(id))
                    .map(str::to_string)
                    .collect(),
            });
        }

        Ok(order)
    }
}

/// A stage is disabled only when it may be and the snapshot says `enabled: false`.
/// A missing section means enabled, so snapshots taken before a template gained
/// a stage keep running it.
pub fn is_stage_disabled(stage: &StageDefinition, frozen_config: &FrozenConfig) -> bool {
    if !stage.can_be_disabled {
        return false;
    }
    match &stage.config_key {
        Some(key) => frozen_config.section_enabled(key) == Some(false),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diamond() -> PipelineTemplate {
        PipelineTemplate {
            id: "diamond".to_string(),
            slug: "diamond".to_string(),
            name: "Diamond".to_string(),
            stages: vec![
                StageDefinition::new("a", &[]),
                StageDefinition::new("b", &["a"]),
                StageDefinition::new("c", &["a"]),
                StageDefinition::new("d", &["b", "c"]),
            ],
        }
    }

    fn done(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn ids<'a>(stages: &[&'a StageDefinition]) -> Vec<&'a str> {
        stages.iter().map(|s| s.stage_id.as_str()).collect()
    }

    #[test]
    fn test_root_and_next_stages() {
        let template = diamond();
        assert_eq!(ids(&template.find_root_stages()), vec!["a"]);
        assert_eq!(ids(&template.find_next_stages(&done(&[]))), vec!["a"]);
        assert_eq!(ids(&template.find_next_stages(&done(&["a"]))), vec!["b", "c"]);
        assert_eq!(ids(&template.find_next_stages(&done(&["a", "b"]))), vec!["c"]);
        assert_eq!(ids(&template.find_next_stages(&done(&["a", "b", "c"]))), vec!["d"]);
        assert!(template.find_next_stages(&done(&["a", "b", "c", "d"])).is_empty());
        assert!(template.is_exhausted(&done(&["a", "b", "c", "d"])));
    }

    #[test]
    fn test_validate_rejects_cycles() {
        let mut template = diamond();
        template.stages[0].depends_on = vec!["d".to_string()];
        match template.validate() {
            Err(TemplateError::Cycle { stages, .. }) => {
                assert_eq!(stages, vec!["a", "b", "c", "d"]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_unknown_and_duplicate_stages() {
        let mut template = diamond();
        template.stages[3].depends_on.push("e".to_string());
        assert!(matches!(
            template.validate(),
            Err(TemplateError::UnknownDependency { dependency, .. }) if dependency == "e"
        ));

        let mut template = diamond();
        template.stages.push(StageDefinition::new("b", &[]));
        assert!(matches!(
            template.validate(),
            Err(TemplateError::DuplicateStage { .. })
        ));
    }

    #[test]
    fn test_validate_requires_scene_stages_in_progression_order() {
        let parallel = PipelineTemplate {
            id: "parallel".to_string(),
            slug: "parallel".to_string(),
            name: "Parallel".to_string(),
            stages: vec![
                StageDefinition::new("scene-generation", &[]),
                StageDefinition::new("video-generation", &["scene-generation"]),
                StageDefinition::new("tts", &["scene-generation"]),
            ],
        };
        assert_eq!(
            parallel.validate(),
            Err(TemplateError::UnorderedSceneStages {
                template: "parallel".to_string(),
                earlier: "video-generation".to_string(),
                later: "tts".to_string(),
            })
        );

        let mut chained = parallel.clone();
        chained.stages[2].depends_on = vec!["video-generation".to_string()];
        chained.validate().unwrap();
        assert!(chained.depends_transitively("tts", "scene-generation"));
        assert!(!chained.depends_transitively("scene-generation", "tts"));

        // Indirect dependencies through other stages count
        let indirect = PipelineTemplate {
            stages: vec![
                StageDefinition::new("scene-generation", &[]),
                StageDefinition::new("review", &["scene-generation"]),
                StageDefinition::new("tts", &["review"]),
            ],
            ..parallel
        };
        indirect.validate().unwrap();
    }

    #[test]
    fn test_topological_order_keeps_template_order_for_ties() {
        assert_eq!(diamond().topological_order().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_stage_disabled_fails_open() {
        let optional = StageDefinition::new("captions", &[]).optional("captions");
        let required = StageDefinition::new("tts", &[]);

        let off = FrozenConfig::from(json!({"captions": {"enabled": false}, "tts": {"enabled": false}}));
        let on = FrozenConfig::from(json!({"captions": {"enabled": true}}));
        let empty = FrozenConfig::default();

        assert!(is_stage_disabled(&optional, &off));
        assert!(!is_stage_disabled(&optional, &on));
        assert!(!is_stage_disabled(&optional, &empty));
        assert!(!is_stage_disabled(&required, &off));
    }

    #[test]
    fn test_template_deserializes_from_yaml() {
        let yaml = r#"
id: short-form
slug: short-form
name: Short form
stages:
  - stage_id: ingestion
    project_status_label: INGESTING
    progress_percent: 10
  - stage_id: captions
    depends_on: [ingestion]
    can_be_disabled: true
    config_key: captions
    project_status_label: GENERATING_CAPTIONS
"#;
        let template: PipelineTemplate = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(template.stages.len(), 2);
        assert_eq!(template.stages[1].config_key.as_deref(), Some("captions"));
        assert_eq!(template.stages[1].progress_percent, 0);
        template.validate().unwrap();
    }
}
