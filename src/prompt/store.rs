use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
};

use super::PromptError;

pub const TERMS_TO_SEARCH_TEMPLATE: &str = "terms_to_search.jinja";
pub const RESULTS_SELECTION_TEMPLATE: &str = "results_selection.jinja";
pub const RESULTS_URLS_TEMPLATE: &str = "results_urls.jinja";

/// Environment variable that points the file system store at another directory.
pub const PROMPTS_DIR_ENV: &str = "SEARCH_AGENTS_PROMPTS_DIR";
pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

/// Resolves a template name to its source text.
pub trait TemplateStore: Send + Sync {
    fn get(&self, name: &str) -> Result<String, PromptError>;
}

/// Templates compiled into the binary, plus any added at runtime.
#[derive(Debug, Clone)]
pub struct EmbeddedTemplateStore {
    templates: HashMap<String, String>,
}

impl EmbeddedTemplateStore {
    /// An empty store; use [`EmbeddedTemplateStore::default`] for the bundled templates.
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn with_template<N: Into<String>, S: Into<String>>(mut self, name: N, source: S) -> Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for EmbeddedTemplateStore {
    fn default() -> Self {
        Self::empty()
            .with_template(
                TERMS_TO_SEARCH_TEMPLATE,
                include_str!("../../prompts/terms_to_search.jinja"),
            )
            .with_template(
                RESULTS_SELECTION_TEMPLATE,
                include_str!("../../prompts/results_selection.jinja"),
            )
            .with_template(
                RESULTS_URLS_TEMPLATE,
                include_str!("../../prompts/results_urls.jinja"),
            )
    }
}

impl TemplateStore for EmbeddedTemplateStore {
    fn get(&self, name: &str) -> Result<String, PromptError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| PromptError::TemplateNotFound(name.to_string()))
    }
}

/// Reads templates from a directory on every lookup.
#[derive(Debug, Clone)]
pub struct FileSystemTemplateStore {
    root: PathBuf,
}

impl FileSystemTemplateStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Uses `SEARCH_AGENTS_PROMPTS_DIR` when set, otherwise `./prompts`.
    pub fn from_env() -> Self {
        let root = env::var(PROMPTS_DIR_ENV).unwrap_or_else(|_| DEFAULT_PROMPTS_DIR.to_string());
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TemplateStore for FileSystemTemplateStore {
    fn get(&self, name: &str) -> Result<String, PromptError> {
        // Template names are flat file names, never paths.
        if name.is_empty() || name.contains("..") || Path::new(name).is_absolute() {
            return Err(PromptError::TemplateNotFound(name.to_string()));
        }

        let path = self.root.join(name);
        std::fs::read_to_string(&path).map_err(|e| {
            log::debug!("Template {} not readable at {}: {}", name, path.display(), e);
            PromptError::TemplateNotFound(name.to_string())
        })
    }
}
