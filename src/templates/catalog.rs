//! # Template Catalog
//!
//! Holds every published template keyed by id and slug. Templates are
//! validated on the way in, so everything the orchestrators resolve is a DAG.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::TemplateError;
use crate::models::PipelineTemplate;
use crate::templates::builtin::default_template;

#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: HashMap<String, Arc<PipelineTemplate>>,
    slugs: HashMap<String, String>,
    default_id: String,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCatalog {
    /// Catalog holding only the built-in default template
    pub fn new() -> Self {
        let default = default_template();
        let mut catalog = Self {
            templates: HashMap::new(),
            slugs: HashMap::new(),
            default_id: default.id.clone(),
        };
        catalog.insert(default);
        catalog
    }

    fn insert(&mut self, template: PipelineTemplate) {
        self.slugs.insert(template.slug.clone(), template.id.clone());
        self.templates
            .insert(template.id.clone(), Arc::new(template));
    }

    pub fn register(&mut self, template: PipelineTemplate) -> Result<(), TemplateError> {
        template.validate()?;
        if self.templates.contains_key(&template.id) || self.slugs.contains_key(&template.slug) {
            return Err(TemplateError::DuplicateTemplate {
                template: template.id,
            });
        }
        info!(
            template_id = %template.id,
            slug = %template.slug,
            stages = template.stages.len(),
            "Registered pipeline template"
        );
        self.insert(template);
        Ok(())
    }

    /// Load every `*.yaml`/`*.yml` file in a directory as a template
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize, TemplateError> {
        let io_error = |e: std::io::Error| TemplateError::Io {
            path: dir.display().to_string(),
            reason: e.to_string(),
        };

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(io_error)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        for path in &paths {
            debug!(path = %path.display(), "Loading pipeline template");
            let contents = std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            let template: PipelineTemplate =
                serde_yaml::from_str(&contents).map_err(|e| TemplateError::Parse {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            self.register(template)?;
        }

        Ok(paths.len())
    }

    /// Exact lookup by id or slug
    pub fn get(&self, id_or_slug: &str) -> Option<Arc<PipelineTemplate>> {
        self.templates
            .get(id_or_slug)
            .or_else(|| {
                self.slugs
                    .get(id_or_slug)
                    .and_then(|id| self.templates.get(id))
            })
            .cloned()
    }

    pub fn default_template(&self) -> Arc<PipelineTemplate> {
        match self.templates.get(&self.default_id) {
            Some(template) => template.clone(),
            None => Arc::new(default_template()),
        }
    }

    /// Lookup that falls back to the default template for `None` or unknown ids
    pub fn resolve_template(&self, template_id: Option<&str>) -> Arc<PipelineTemplate> {
        match template_id {
            None => self.default_template(),
            Some(id) => self.get(id).unwrap_or_else(|| {
                warn!(template_id = id, "Unknown template, falling back to default");
                self.default_template()
            }),
        }
    }

    pub fn templates(&self) -> impl Iterator<Item = &Arc<PipelineTemplate>> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
