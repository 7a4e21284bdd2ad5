//! Analyzer registry: the static builtin table plus programmatic additions.

use std::collections::BTreeMap;
use std::sync::Arc;

use crengine_core::{ConfigError, EngineConfig};

use super::{bandit, eslint, flake8, semgrep, Analyzer, ToolAdapter, ToolSpec};

/// Builtin tools, keyed by name.
pub static BUILTINS: &[&ToolSpec] = &[&bandit::SPEC, &eslint::SPEC, &flake8::SPEC, &semgrep::SPEC];

/// Find a builtin tool by name.
pub fn builtin(name: &str) -> Option<&'static ToolSpec> {
    BUILTINS.iter().copied().find(|spec| spec.name == name)
}

/// Set of analyzers a pipeline can run.
#[derive(Default, Clone)]
pub struct AnalyzerRegistry {
    extra: BTreeMap<String, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    /// Registry holding only the builtin tools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an additional analyzer. A later registration with the same
    /// name replaces the earlier one, including a builtin.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) -> &mut Self {
        self.extra.insert(analyzer.name().to_string(), analyzer);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.register(analyzer);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.extra.contains_key(name) || builtin(name).is_some()
    }

    /// All known tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTINS.iter().map(|s| s.name.to_string()).collect();
        names.extend(self.extra.keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    /// Reject `[tools.<name>]` sections naming tools nobody provides.
    pub fn validate(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        match config.tools.keys().find(|name| !self.contains(name)) {
            Some(name) => Err(ConfigError::UnknownTool(name.clone())),
            None => Ok(()),
        }
    }

    /// Enabled analyzers for `config`, sorted by name.
    pub fn resolve(&self, config: &EngineConfig) -> Result<Vec<Arc<dyn Analyzer>>, ConfigError> {
        self.validate(config)?;
        let mut selected = Vec::new();
        for name in self.names() {
            let tool = config.tool(&name);
            if !tool.enabled {
                continue;
            }
            let analyzer: Arc<dyn Analyzer> = match self.extra.get(&name) {
                Some(analyzer) => Arc::clone(analyzer),
                None => match builtin(&name) {
                    Some(spec) => Arc::new(ToolAdapter::new(spec, &tool)),
                    None => continue,
                },
            };
            selected.push(analyzer);
        }
        Ok(selected)
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("names", &self.names())
            .finish()
    }
}
