//! Prompt library for language model calls
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/scanwise/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Each prompt is markdown with YAML frontmatter and a `# System` and
//! `# User` section. Sections use `{{var}}` placeholders and
//! `{{#if var}}...{{/if}}` blocks.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::config::StageKind;
use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const PARSE_RECEIPT: &str = include_str!("../../../prompts/parse_receipt.md");
    pub const SPENDING_ADVICE: &str = include_str!("../../../prompts/spending_advice.md");
    pub const SUMMARIZE_TEXT: &str = include_str!("../../../prompts/summarize_text.md");
    pub const ANALYZE_CODE: &str = include_str!("../../../prompts/analyze_code.md");
    pub const DETECT_LANGUAGE: &str = include_str!("../../../prompts/detect_language.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    ParseReceipt,
    SpendingAdvice,
    SummarizeText,
    AnalyzeCode,
    DetectLanguage,
}

impl PromptId {
    /// Get the string identifier for this prompt
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseReceipt => "parse_receipt",
            Self::SpendingAdvice => "spending_advice",
            Self::SummarizeText => "summarize_text",
            Self::AnalyzeCode => "analyze_code",
            Self::DetectLanguage => "detect_language",
        }
    }

    /// Get all known prompt IDs
    pub fn all() -> &'static [PromptId] {
        &[
            Self::ParseReceipt,
            Self::SpendingAdvice,
            Self::SummarizeText,
            Self::AnalyzeCode,
            Self::DetectLanguage,
        ]
    }

    /// Look up a prompt by its string identifier
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|id| id.as_str() == name)
    }

    /// The model call this prompt drives, for its sampling settings
    pub fn stage(&self) -> StageKind {
        match self {
            Self::ParseReceipt => StageKind::Parse,
            Self::SpendingAdvice => StageKind::Advise,
            Self::SummarizeText => StageKind::Summarize,
            Self::AnalyzeCode => StageKind::CodeReview,
            Self::DetectLanguage => StageKind::DetectLanguage,
        }
    }

    /// Get the default embedded content for this prompt
    fn default_content(&self) -> &'static str {
        match self {
            Self::ParseReceipt => defaults::PARSE_RECEIPT,
            Self::SpendingAdvice => defaults::SPENDING_ADVICE,
            Self::SummarizeText => defaults::SUMMARIZE_TEXT,
            Self::AnalyzeCode => defaults::ANALYZE_CODE,
            Self::DetectLanguage => defaults::DETECT_LANGUAGE,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    /// Unique identifier
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
    /// Kind of task (structured_extraction, narrative, reasoning, ...)
    pub task_type: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Metadata from frontmatter
    pub metadata: PromptMetadata,
    /// The prompt content (system + user sections)
    pub content: String,
    /// Whether this came from an override file
    pub is_override: bool,
    /// Path to override file (if any)
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    /// Get the system section of the prompt
    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    /// Get the user section of the prompt
    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the whole prompt with template variables replaced
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        render_template(&self.content, vars)
    }

    /// Render just the system section with variables
    pub fn render_system(&self, vars: &HashMap<&str, &str>) -> String {
        match self.system_section() {
            Some(system) => render_template(system, vars),
            None => String::new(),
        }
    }

    /// Render just the user section with variables
    ///
    /// Falls back to the whole prompt when there is no `# User` section.
    pub fn render_user(&self, vars: &HashMap<&str, &str>) -> String {
        match self.user_section() {
            Some(user) => render_template(user, vars),
            None => self.render(vars),
        }
    }
}

/// Prompt library for loading and caching prompts
pub struct PromptLibrary {
    /// Override directory path
    override_dir: Option<PathBuf>,
    /// Cached parsed prompts
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Create a new prompt library with default paths
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with a custom override directory
    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with no override directory (embedded only)
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::Prompt(format!("Prompt {} not loaded", id.as_str())))
    }

    /// Load a prompt (checking override first, then default)
    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(ref override_dir) = self.override_dir {
            let override_path = override_dir.join(format!("{}.md", id.as_str()));
            if override_path.exists() {
                let content = fs::read_to_string(&override_path).map_err(|e| {
                    Error::Prompt(format!("Failed to read prompt override: {}", e))
                })?;
                let (metadata, body) = parse_prompt(&content)?;
                tracing::debug!(prompt = id.as_str(), path = %override_path.display(), "Using prompt override");
                return Ok(Prompt {
                    metadata,
                    content: body,
                    is_override: true,
                    override_path: Some(override_path),
                });
            }
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
            override_path: None,
        })
    }

    /// List all prompts with their override status
    pub fn list(&mut self) -> Vec<PromptInfo> {
        PromptId::all()
            .iter()
            .map(|&id| {
                let has_override = self.has_override(id);
                let override_path = if has_override {
                    self.override_dir
                        .as_ref()
                        .map(|d| d.join(format!("{}.md", id.as_str())))
                } else {
                    None
                };
                let prompt = self.get(id).ok();
                PromptInfo {
                    id: id.as_str().to_string(),
                    version: prompt.map(|p| p.metadata.version).unwrap_or(0),
                    task_type: prompt
                        .map(|p| p.metadata.task_type.clone())
                        .unwrap_or_default(),
                    has_override,
                    override_path,
                }
            })
            .collect()
    }

    /// Check if a prompt has an override file
    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_dir
            .as_ref()
            .is_some_and(|dir| dir.join(format!("{}.md", id.as_str())).exists())
    }

    /// Get the override directory path
    pub fn override_dir(&self) -> Option<&PathBuf> {
        self.override_dir.as_ref()
    }

    /// Clear the cache (useful after editing override files)
    pub fn clear_cache(&mut self) {
        self.cache.clear();
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
    pub task_type: String,
    pub has_override: bool,
    pub override_path: Option<PathBuf>,
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("scanwise").join("prompts").join("overrides"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    if !content.starts_with("---") {
        return Err(Error::Prompt(
            "Prompt must start with YAML frontmatter (---)".into(),
        ));
    }

    let rest = &content[3..];
    let end = rest.find("---").ok_or_else(|| {
        Error::Prompt("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::Prompt(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

/// Extract a section from the prompt content
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];

    let end = after_header.find("\n# ").unwrap_or(after_header.len());

    Some(after_header[..end].trim())
}

/// Resolve conditionals, then substitute variables
///
/// Conditionals go first so substituted values (receipt text, code) are
/// never scanned for template syntax.
fn render_template(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = remove_unmatched_conditionals(template, vars);
    for (key, value) in vars {
        let pattern = format!("{{{{{}}}}}", key);
        result = result.replace(&pattern, value);
    }
    result
}

/// Keep `{{#if var}}` blocks whose variable is set and non-empty, drop the rest
fn remove_unmatched_conditionals(content: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = content.to_string();

    while let Some(if_start) = result.find("{{#if ") {
        let var_start = if_start + 6;
        let Some(var_end) = result[var_start..].find("}}") else {
            break;
        };
        let var_name = result[var_start..var_start + var_end].trim().to_string();
        let block_start = var_start + var_end + 2;

        let Some(endif_pos) = result[block_start..].find("{{/if}}") else {
            break;
        };
        let block_content = result[block_start..block_start + endif_pos].to_string();
        let full_end = block_start + endif_pos + 7;

        let should_include = vars.get(var_name.as_str()).is_some_and(|v| !v.is_empty());

        result = if should_include {
            format!("{}{}{}", &result[..if_start], block_content, &result[full_end..])
        } else {
            format!("{}{}", &result[..if_start], &result[full_end..])
        };
    }

    result
}
