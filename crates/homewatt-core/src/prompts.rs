//! Prompt Library for the reasoning agents
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/homewatt/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Each file starts with YAML frontmatter (`id`, `version`, `role`) followed by
//! `# System` and `# User` sections. Templates use `{{var}}` placeholders and
//! `{{#if var}}...{{/if}}` blocks that are dropped when `var` is empty.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const INTERPRET_FORECAST: &str = include_str!("../../../prompts/interpret_forecast.md");
    pub const ADVISE_ACTIONS: &str = include_str!("../../../prompts/advise_actions.md");
}

/// Known prompt IDs, one per agent role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Forecast Interpreter: explains the predicted number
    InterpretForecast,
    /// Advisor: proposes prioritized energy-saving actions
    AdviseActions,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InterpretForecast => "interpret_forecast",
            Self::AdviseActions => "advise_actions",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::InterpretForecast, Self::AdviseActions]
    }

    pub fn parse(id: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.as_str() == id)
    }

    /// Role the frontmatter must declare
    fn role(&self) -> &'static str {
        match self {
            Self::InterpretForecast => "interpreter",
            Self::AdviseActions => "advisor",
        }
    }

    fn file_name(&self) -> String {
        format!("{}.md", self.as_str())
    }

    fn embedded(&self) -> &'static str {
        match self {
            Self::InterpretForecast => defaults::INTERPRET_FORECAST,
            Self::AdviseActions => defaults::ADVISE_ACTIONS,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Bumped whenever the wording changes
    pub version: u32,
    /// Agent role this prompt drives (interpreter, advisor)
    pub role: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// Body after the frontmatter (system + user sections)
    pub content: String,
    pub is_override: bool,
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    pub fn system_section(&self) -> Option<&str> {
        section(&self.content, "# System")
    }

    pub fn user_section(&self) -> Option<&str> {
        section(&self.content, "# User")
    }

    /// Render the user section; the whole body when there is no `# User` header
    pub fn render_user(&self, vars: &HashMap<&str, String>) -> String {
        render_template(self.user_section().unwrap_or(&self.content), vars)
    }

    /// Render the system section (empty when absent)
    pub fn render_system(&self, vars: &HashMap<&str, String>) -> String {
        self.system_section()
            .map(|s| render_template(s, vars))
            .unwrap_or_default()
    }
}

fn conditional_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\{\{#if (\w+)\}\}(.*?)\{\{/if\}\}").expect("valid regex")
    })
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid regex"))
}

/// Resolve `{{#if}}` blocks, then substitute `{{var}}` placeholders
///
/// Unknown placeholders are left in place so a typo shows up in the output.
fn render_template(template: &str, vars: &HashMap<&str, String>) -> String {
    let is_set = |name: &str| vars.get(name).is_some_and(|v| !v.is_empty());

    let resolved = conditional_block().replace_all(template, |caps: &Captures| {
        if is_set(&caps[1]) {
            caps[2].to_string()
        } else {
            String::new()
        }
    });

    placeholder()
        .replace_all(&resolved, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Prompt library for loading and caching prompts
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Overrides from the platform data directory, then embedded defaults
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Embedded defaults only; used by tests and the mock backend
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading it on first use
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::Prompt(format!("prompt {} missing from cache", id.as_str())))
    }

    fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|dir| dir.join(id.file_name()))
            .filter(|path| path.exists())
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        let override_path = self.override_path(id);
        let content = match &override_path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                Error::Prompt(format!("cannot read prompt override {}: {}", path.display(), e))
            })?,
            None => id.embedded().to_string(),
        };

        let (metadata, body) = parse_prompt(&content)?;
        if metadata.id != id.as_str() || metadata.role != id.role() {
            return Err(Error::Prompt(format!(
                "prompt {} declares id '{}' and role '{}', expected role '{}'",
                id.as_str(),
                metadata.id,
                metadata.role,
                id.role()
            )));
        }

        Ok(Prompt {
            metadata,
            content: body,
            is_override: override_path.is_some(),
            override_path,
        })
    }

    /// All prompts with their override status; unreadable prompts list as version 0
    pub fn list(&mut self) -> Vec<PromptInfo> {
        PromptId::all()
            .iter()
            .map(|&id| {
                let override_path = self.override_path(id);
                let (version, role) = match self.get(id) {
                    Ok(p) => (p.metadata.version, p.metadata.role.clone()),
                    Err(_) => (0, id.role().to_string()),
                };
                PromptInfo {
                    id: id.as_str().to_string(),
                    version,
                    role,
                    has_override: override_path.is_some(),
                    override_path,
                }
            })
            .collect()
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_path(id).is_some()
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Information about a prompt for listing
#[derive(Debug, Clone)]
pub struct PromptInfo {
    pub id: String,
    pub version: u32,
    pub role: String,
    pub has_override: bool,
    pub override_path: Option<PathBuf>,
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("homewatt").join("prompts").join("overrides"))
}

/// Split a prompt file into frontmatter metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let rest = content
        .trim()
        .strip_prefix("---")
        .ok_or_else(|| Error::Prompt("prompt must start with YAML frontmatter (---)".into()))?;
    let (frontmatter, body) = rest
        .split_once("---")
        .ok_or_else(|| Error::Prompt("prompt frontmatter not closed (missing second ---)".into()))?;

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter.trim())
        .map_err(|e| Error::Prompt(format!("invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.trim().to_string()))
}

/// Text under `header`, up to the next top-level header
fn section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)? + header.len();
    let after = &content[start..];
    let end = after.find("\n# ").unwrap_or(after.len());
    Some(after[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_parse_prompt() {
        let content = r#"---
id: test_prompt
version: 1
role: interpreter
---

# System
Test system prompt.

# User
Test user prompt with {{variable}}.
"#;

        let (metadata, body) = parse_prompt(content).unwrap();
        assert_eq!(metadata.id, "test_prompt");
        assert_eq!(metadata.version, 1);
        assert_eq!(metadata.role, "interpreter");
        assert!(body.starts_with("# System"));
        assert!(body.contains("# User"));
    }

    #[test]
    fn test_prompt_id_parse() {
        assert_eq!(
            PromptId::parse("interpret_forecast"),
            Some(PromptId::InterpretForecast)
        );
        assert_eq!(PromptId::parse("advise_actions"), Some(PromptId::AdviseActions));
        assert_eq!(PromptId::parse("explain_usage"), None);
    }

    #[test]
    fn test_parse_prompt_requires_frontmatter() {
        assert!(parse_prompt("# System\nno frontmatter").is_err());
        assert!(parse_prompt("---\nid: x\n# System").is_err());
    }

    #[test]
    fn test_section() {
        let content = "# System\nSystem content here.\n\n# User\nUser content here.";
        assert_eq!(section(content, "# System"), Some("System content here."));
        assert_eq!(section(content, "# User"), Some("User content here."));
        assert_eq!(section(content, "# Examples"), None);
    }

    #[test]
    fn test_conditional_blocks() {
        let template = "Start{{#if confidence}}\nConfidence: {{confidence}}{{/if}}\nEnd";

        let kept = render_template(template, &vars(&[("confidence", "0.9")]));
        assert_eq!(kept, "Start\nConfidence: 0.9\nEnd");

        let dropped = render_template(template, &vars(&[("confidence", "")]));
        assert_eq!(dropped, "Start\nEnd");

        let missing = render_template(template, &HashMap::new());
        assert_eq!(missing, "Start\nEnd");
    }

    #[test]
    fn test_unknown_placeholder_left_in_place() {
        let rendered = render_template("{{known}} and {{unknown}}", &vars(&[("known", "A")]));
        assert_eq!(rendered, "A and {{unknown}}");
    }

    #[test]
    fn test_render_user_substitutes_and_drops_empty_blocks() {
        let mut lib = PromptLibrary::embedded_only();
        let prompt = lib.get(PromptId::InterpretForecast).unwrap();
        let rendered = prompt.render_user(&vars(&[
            ("household_id", "H1"),
            ("predicted_kwh", "42.00"),
            ("confidence", ""),
        ]));
        assert!(rendered.contains("Household: H1"));
        assert!(rendered.contains("42.00 kWh"));
        assert!(!rendered.contains("Model confidence"));
        assert!(!rendered.contains("{{#if"));
    }

    #[test]
    fn test_prompt_library_embedded() {
        let mut lib = PromptLibrary::embedded_only();
        for id in PromptId::all() {
            let prompt = lib.get(*id).unwrap();
            assert!(!prompt.is_override);
            assert_eq!(prompt.metadata.role, id.role());
            assert!(prompt.system_section().is_some());
            assert!(prompt.user_section().is_some());
        }
    }

    #[test]
    fn test_prompt_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("advise_actions.md"),
            "---\nid: advise_actions\nversion: 7\nrole: advisor\n---\n# System\nCustom\n\n# User\nGo",
        )
        .unwrap();

        let mut lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert!(lib.has_override(PromptId::AdviseActions));
        assert!(!lib.has_override(PromptId::InterpretForecast));

        let prompt = lib.get(PromptId::AdviseActions).unwrap();
        assert!(prompt.is_override);
        assert_eq!(prompt.metadata.version, 7);

        let listed = lib.list();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|p| p.id == "advise_actions" && p.has_override));
    }

    #[test]
    fn test_override_with_wrong_role_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("interpret_forecast.md"),
            "---\nid: interpret_forecast\nversion: 2\nrole: advisor\n---\n# User\nHi",
        )
        .unwrap();

        let mut lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert!(matches!(
            lib.get(PromptId::InterpretForecast),
            Err(Error::Prompt(_))
        ));

        let listed = lib.list();
        let info = listed.iter().find(|p| p.id == "interpret_forecast").unwrap();
        assert_eq!(info.version, 0);
        assert!(info.has_override);
    }

    #[test]
    fn test_default_prompts_parse() {
        for id in PromptId::all() {
            let (metadata, _) = parse_prompt(id.embedded()).unwrap();
            assert_eq!(metadata.id, id.as_str(), "Prompt ID mismatch");
        }
    }
}
