use crate::models::{validate_pool, ContentModule, Question, ValidationIssue};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

pub static MODULE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").expect("module key pattern"));

pub fn is_valid_module_key(key: &str) -> bool {
    MODULE_KEY_RE.is_match(key)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSummary {
    pub module: String,
    pub title: String,
    pub question_count: usize,
}

#[derive(Debug, Default)]
pub struct ContentRegistry {
    modules: HashMap<String, ContentModule>,
    min_visible_questions: usize,
}

impl ContentRegistry {
    pub fn new(min_visible_questions: usize) -> Self {
        Self {
            modules: HashMap::new(),
            min_visible_questions,
        }
    }

    pub fn insert(&mut self, module: ContentModule) -> Result<(), Vec<ValidationIssue>> {
        if !is_valid_module_key(&module.module) {
            return Err(vec![ValidationIssue {
                field: "module".into(),
                issue: format!("invalid module key '{}'", module.module),
            }]);
        }
        validate_pool(&module.questions)?;
        self.modules.insert(module.module.clone(), module);
        Ok(())
    }

    /// Loads every `*.json` file in `dir`. Files that fail the schema or pool
    /// checks are skipped with a warning.
    pub fn load_dir(
        dir: &Path,
        schema: &serde_json::Value,
        min_visible_questions: usize,
    ) -> anyhow::Result<Self> {
        let mut registry = Self::new(min_visible_questions);
        if !dir.is_dir() {
            warn!("content directory {} does not exist, serving no modules", dir.display());
            return Ok(registry);
        }
        let compiled = jsonschema::draft202012::new(schema)
            .map_err(|e| anyhow::anyhow!("content schema build failed: {}", e))?;

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        for path in paths {
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("failed to read content file {}: {}", path.display(), err);
                    continue;
                }
            };
            let value: serde_json::Value = match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(err) => {
                    warn!("content file {} is not valid json: {}", path.display(), err);
                    continue;
                }
            };
            if compiled.validate(&value).is_err() {
                for err in compiled.iter_errors(&value) {
                    warn!(file = %path.display(), at = %err.instance_path, "schema violation: {}", err);
                }
                continue;
            }
            let mut module: ContentModule = match serde_json::from_value(value) {
                Ok(m) => m,
                Err(err) => {
                    warn!("cannot decode content file {}: {}", path.display(), err);
                    continue;
                }
            };
            module.module = key.clone();
            let count = module.questions.len();
            match registry.insert(module) {
                Ok(()) => info!(module = %key, questions = count, "content module loaded"),
                Err(issues) => {
                    for issue in issues {
                        warn!(module = %key, field = %issue.field, "invalid content: {}", issue.issue);
                    }
                }
            }
        }
        Ok(registry)
    }

    /// Modules with enough questions to be offered, sorted by key.
    pub fn visible_modules(&self) -> Vec<ModuleSummary> {
        let mut out: Vec<_> = self
            .modules
            .values()
            .filter(|m| m.questions.len() >= self.min_visible_questions)
            .map(|m| ModuleSummary {
                module: m.module.clone(),
                title: m.title.clone(),
                question_count: m.questions.len(),
            })
            .collect();
        out.sort_by(|a, b| a.module.cmp(&b.module));
        out
    }

    pub fn pool(&self, module: &str) -> Option<&[Question]> {
        self.modules.get(module).map(|m| m.questions.as_slice())
    }

    pub fn question(&self, module: &str, id: i64) -> Option<&Question> {
        self.pool(module)?.iter().find(|q| q.id == id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
