use crate::locate::TypeKeywords;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_COMMIT_MESSAGE: &str = "Fix {function} in {file}: {issue}";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-05-01-preview";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RunConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub issues: IssuesConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
    #[serde(default)]
    pub fix_service: Option<FixServiceConfig>,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        let repo = &self.repository;
        if repo.root.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "repository.root",
            });
        }
        if let Some(branch) = &repo.branch {
            if branch.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    field: "repository.branch",
                });
            }
        }
        if repo.push && repo.branch.is_none() {
            issues.push(ValidationIssue::InvalidCombo {
                message: "repository.push requires repository.branch".to_string(),
            });
        }
        if repo.remote.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "repository.remote",
            });
        }
        if repo.commit_message.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "repository.commit_message",
            });
        }

        if let Some(keywords) = &self.locator.type_keywords {
            if keywords.is_empty() && self.locator.extra_type_keywords.is_empty() {
                issues.push(ValidationIssue::InvalidValue {
                    field: "locator.type_keywords",
                    message: "at least one keyword is required when the list is given"
                        .to_string(),
                });
            }
        }

        match &self.fix_service {
            Some(FixServiceConfig::Chat(chat)) => chat.validate(&mut issues),
            Some(FixServiceConfig::Command { program, .. }) => {
                if program.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        field: "fix_service.program",
                    });
                }
            }
            None => {}
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Resolve relative paths against the directory holding the config file.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.repository.root.is_relative() {
            self.repository.root = base.join(&self.repository.root);
        }
        if let Some(path) = &self.issues.path {
            if path.is_relative() {
                self.issues.path = Some(base.join(path));
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Branch to commit patches on; no branch means files are only written
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default)]
    pub push: bool,
    /// Template with `{function}`, `{file}` and `{issue}` placeholders
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            branch: None,
            remote: default_remote(),
            push: false,
            commit_message: default_commit_message(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_commit_message() -> String {
    DEFAULT_COMMIT_MESSAGE.to_string()
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct IssuesConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct LocatorConfig {
    /// Replaces the default keyword set when present
    #[serde(default)]
    pub type_keywords: Option<TypeKeywords>,
    /// Added on top of whichever set is in effect
    #[serde(default)]
    pub extra_type_keywords: Vec<String>,
}

impl LocatorConfig {
    pub fn keywords(&self) -> TypeKeywords {
        let mut keywords = self.type_keywords.clone().unwrap_or_default();
        keywords.extend(self.extra_type_keywords.iter().cloned());
        keywords
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FixServiceConfig {
    /// OpenAI-compatible chat completion endpoint
    Chat(ChatSettings),
    /// External program: prompt on stdin, replacement on stdout
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ChatProvider {
    #[default]
    Azure,
    Openai,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatSettings {
    #[serde(default)]
    pub provider: ChatProvider,
    /// Falls back to `AZURE_OPENAI_ENDPOINT` (azure) or the public OpenAI API
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Azure deployment name; falls back to `AZURE_OPENAI_DEPLOYMENT_NAME`
    #[serde(default)]
    pub deployment: Option<String>,
    /// Model name sent in the request body (required for openai)
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            provider: ChatProvider::default(),
            endpoint: None,
            deployment: None,
            model: None,
            api_version: default_api_version(),
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: None,
        }
    }
}

impl ChatSettings {
    /// Name of the environment variable holding the API key.
    pub fn api_key_var(&self) -> &str {
        match (&self.api_key_env, self.provider) {
            (Some(var), _) => var,
            (None, ChatProvider::Azure) => "AZURE_OPENAI_API_KEY",
            (None, ChatProvider::Openai) => "OPENAI_API_KEY",
        }
    }

    fn validate(&self, issues: &mut Vec<ValidationIssue>) {
        if self.timeout_secs == 0 {
            issues.push(ValidationIssue::InvalidValue {
                field: "fix_service.timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.max_tokens == 0 {
            issues.push(ValidationIssue::InvalidValue {
                field: "fix_service.max_tokens",
                message: "must be greater than zero".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            issues.push(ValidationIssue::InvalidValue {
                field: "fix_service.temperature",
                message: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }
        if self.provider == ChatProvider::Openai
            && self.model.as_deref().map_or(true, |m| m.trim().is_empty())
        {
            issues.push(ValidationIssue::MissingField {
                field: "fix_service.model",
            });
        }
        if matches!(&self.api_key_env, Some(var) if var.trim().is_empty()) {
            issues.push(ValidationIssue::MissingField {
                field: "fix_service.api_key_env",
            });
        }
    }
}

fn default_api_version() -> String {
    DEFAULT_AZURE_API_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    800
}

fn default_temperature() -> f32 {
    0.5
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        field: &'static str,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
    InvalidCombo {
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "invalid value for '{field}': {message}")
            }
            ValidationIssue::InvalidCombo { message } => {
                write!(f, "invalid configuration: {message}")
            }
        }
    }
}
