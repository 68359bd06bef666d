//! Fix services: given a function and an issue description, produce a
//! corrected version of the function.
//!
//! The pipeline only sees the [`FixService`] trait. Two implementations
//! ship with the crate: an OpenAI-compatible chat completion client
//! (Azure or OpenAI) and an external command that reads the prompt on
//! stdin. Requests are sent one at a time and never retried.

use crate::config::schema::{ChatProvider, ChatSettings};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const SYSTEM_PROMPT: &str =
    "You are an AI assistant that helps review and fix C++ code without comment.";

const OPENAI_ENDPOINT: &str = "https://api.openai.com";

/// Everything a fix service is told about one issue.
#[derive(Debug, Clone, Copy)]
pub struct FixRequest<'a> {
    pub function_name: &'a str,
    pub function_text: &'a str,
    pub issue: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Single-text rendering for services without message roles.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

pub fn build_prompt(request: &FixRequest<'_>, system: Option<&str>) -> Prompt {
    Prompt {
        system: system.unwrap_or(SYSTEM_PROMPT).to_string(),
        user: format!(
            "Fix the following C++ function based on the issue: {}\n```cpp\n{}\n```",
            request.issue, request.function_text
        ),
    }
}

#[derive(Error, Debug)]
pub enum FixError {
    #[error("fix service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fix service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("fix service returned no content")]
    EmptyResponse,

    #[error("fix service is not configured: {0}")]
    NotConfigured(String),

    #[error("environment variable {var} is not set")]
    MissingCredential { var: String },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

pub trait FixService {
    /// Raw replacement text for the requested function. The response is
    /// sanitized by the caller.
    fn suggest(&self, request: &FixRequest<'_>) -> Result<String, FixError>;
}

impl<T: FixService + ?Sized> FixService for Box<T> {
    fn suggest(&self, request: &FixRequest<'_>) -> Result<String, FixError> {
        (**self).suggest(request)
    }
}

#[derive(Clone)]
enum Auth {
    ApiKeyHeader(String),
    Bearer(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::ApiKeyHeader(_) => f.write_str("ApiKeyHeader(..)"),
            Auth::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completion client for Azure OpenAI deployments and the OpenAI API.
#[derive(Debug, Clone)]
pub struct ChatCompletionService {
    client: reqwest::blocking::Client,
    url: String,
    auth: Auth,
    model: Option<String>,
    max_tokens: u32,
    temperature: f32,
    system_prompt: Option<String>,
}

impl ChatCompletionService {
    /// Build from settings, filling gaps from the process environment.
    pub fn from_env(settings: &ChatSettings) -> Result<Self, FixError> {
        Self::from_settings(settings, |var| std::env::var(var).ok())
    }

    /// Build from settings, with `env` standing in for environment lookup.
    pub fn from_settings(
        settings: &ChatSettings,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, FixError> {
        let key_var = settings.api_key_var();
        let key = env(key_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| FixError::MissingCredential {
                var: key_var.to_string(),
            })?;

        let (url, auth) = match settings.provider {
            ChatProvider::Azure => {
                let endpoint = settings
                    .endpoint
                    .clone()
                    .or_else(|| env("AZURE_OPENAI_ENDPOINT"))
                    .ok_or_else(|| {
                        FixError::NotConfigured(
                            "no endpoint (set fix_service.endpoint or AZURE_OPENAI_ENDPOINT)"
                                .to_string(),
                        )
                    })?;
                let deployment = settings
                    .deployment
                    .clone()
                    .or_else(|| env("AZURE_OPENAI_DEPLOYMENT_NAME"))
                    .ok_or_else(|| {
                        FixError::NotConfigured(
                            "no deployment (set fix_service.deployment or AZURE_OPENAI_DEPLOYMENT_NAME)"
                                .to_string(),
                        )
                    })?;
                let url = format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    endpoint.trim_end_matches('/'),
                    deployment,
                    settings.api_version
                );
                (url, Auth::ApiKeyHeader(key))
            }
            ChatProvider::Openai => {
                let endpoint = settings.endpoint.as_deref().unwrap_or(OPENAI_ENDPOINT);
                let url = format!("{}/v1/chat/completions", endpoint.trim_end_matches('/'));
                (url, Auth::Bearer(key))
            }
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url,
            auth,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            system_prompt: settings.system_prompt.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FixService for ChatCompletionService {
    fn suggest(&self, request: &FixRequest<'_>) -> Result<String, FixError> {
        let prompt = build_prompt(request, self.system_prompt.as_deref());
        let body = ChatRequest {
            model: self.model.as_deref(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(function = request.function_name, url = %self.url, "requesting fix");
        let builder = self.client.post(&self.url).json(&body);
        let builder = match &self.auth {
            Auth::ApiKeyHeader(key) => builder.header("api-key", key),
            Auth::Bearer(key) => builder.bearer_auth(key),
        };
        let resp = builder.send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<failed to read body>".into());
            return Err(FixError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(FixError::EmptyResponse)
    }
}

/// Runs an external program per request. The rendered prompt is written to
/// its stdin and its stdout is taken as the response.
///
/// The function name and issue are also exported as `FUNC_PATCHER_FUNCTION`
/// and `FUNC_PATCHER_ISSUE`.
#[derive(Debug, Clone)]
pub struct CommandFixService {
    program: String,
    args: Vec<String>,
}

impl CommandFixService {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl FixService for CommandFixService {
    fn suggest(&self, request: &FixRequest<'_>) -> Result<String, FixError> {
        let spawn_err = |source| FixError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("FUNC_PATCHER_FUNCTION", request.function_name)
            .env("FUNC_PATCHER_ISSUE", request.issue)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        let prompt = build_prompt(request, None).render();
        if let Some(mut stdin) = child.stdin.take() {
            // A program that ignores its input may close the pipe early.
            if let Err(e) = stdin.write_all(prompt.as_bytes()) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(spawn_err(e));
                }
            }
        }

        let output = child.wait_with_output().map_err(spawn_err)?;
        if !output.status.success() {
            return Err(FixError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Err(FixError::EmptyResponse);
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const BUGGY: &str = "int add(int a, int b) {\n  return a - b;\n}";

    fn request() -> FixRequest<'static> {
        FixRequest {
            function_name: "add",
            function_text: BUGGY,
            issue: "Returns difference instead of sum",
        }
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn prompt_embeds_issue_and_function() {
        let prompt = build_prompt(&request(), None);
        assert_eq!(prompt.system, SYSTEM_PROMPT);
        assert_eq!(
            prompt.user,
            format!(
                "Fix the following C++ function based on the issue: Returns difference instead of sum\n```cpp\n{BUGGY}\n```"
            )
        );
        assert!(prompt.render().starts_with(SYSTEM_PROMPT));
    }

    #[test]
    fn custom_system_prompt() {
        let prompt = build_prompt(&request(), Some("Reply with code only."));
        assert_eq!(prompt.system, "Reply with code only.");
    }

    #[test]
    fn azure_url_from_environment() {
        let service = ChatCompletionService::from_settings(
            &ChatSettings::default(),
            env_of(&[
                ("AZURE_OPENAI_API_KEY", "secret"),
                ("AZURE_OPENAI_ENDPOINT", "https://unit.openai.azure.com/"),
                ("AZURE_OPENAI_DEPLOYMENT_NAME", "gpt-4o"),
            ]),
        )
        .unwrap();
        assert_eq!(
            service.url(),
            "https://unit.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-05-01-preview"
        );
    }

    #[test]
    fn explicit_settings_win_over_environment() {
        let settings = ChatSettings {
            endpoint: Some("https://configured.example".to_string()),
            deployment: Some("fixer".to_string()),
            ..ChatSettings::default()
        };
        let service = ChatCompletionService::from_settings(
            &settings,
            env_of(&[
                ("AZURE_OPENAI_API_KEY", "secret"),
                ("AZURE_OPENAI_ENDPOINT", "https://env.example"),
            ]),
        )
        .unwrap();
        assert!(service
            .url()
            .starts_with("https://configured.example/openai/deployments/fixer/"));
    }

    #[test]
    fn openai_provider_url() {
        let settings = ChatSettings {
            provider: ChatProvider::Openai,
            model: Some("gpt-4o-mini".to_string()),
            ..ChatSettings::default()
        };
        let service =
            ChatCompletionService::from_settings(&settings, env_of(&[("OPENAI_API_KEY", "k")]))
                .unwrap();
        assert_eq!(service.url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let err = ChatCompletionService::from_settings(&ChatSettings::default(), env_of(&[]))
            .unwrap_err();
        assert!(matches!(err, FixError::MissingCredential { ref var } if var == "AZURE_OPENAI_API_KEY"));
    }

    #[test]
    fn missing_endpoint_is_not_configured() {
        let err = ChatCompletionService::from_settings(
            &ChatSettings::default(),
            env_of(&[("AZURE_OPENAI_API_KEY", "secret")]),
        )
        .unwrap_err();
        assert!(matches!(err, FixError::NotConfigured(_)));
    }

    #[test]
    fn request_body_shape() {
        let body = ChatRequest {
            model: None,
            messages: [
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            max_tokens: 800,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["max_tokens"], 800);
    }

    #[cfg(unix)]
    #[test]
    fn command_service_returns_stdout() {
        let service = CommandFixService::new(
            "sh",
            vec![
                "-c".to_string(),
                "cat > /dev/null; printf 'int %s(int a, int b) { return a + b; }' \"$FUNC_PATCHER_FUNCTION\""
                    .to_string(),
            ],
        );
        let reply = service.suggest(&request()).unwrap();
        assert_eq!(reply, "int add(int a, int b) { return a + b; }");
    }

    #[cfg(unix)]
    #[test]
    fn command_service_sees_prompt_on_stdin() {
        let service = CommandFixService::new(
            "sh",
            vec!["-c".to_string(), "grep -c 'return a - b'".to_string()],
        );
        assert_eq!(service.suggest(&request()).unwrap().trim(), "1");
    }

    #[cfg(unix)]
    #[test]
    fn command_failure_is_an_error() {
        let service = CommandFixService::new(
            "sh",
            vec!["-c".to_string(), "echo nope >&2; exit 3".to_string()],
        );
        match service.suggest(&request()) {
            Err(FixError::CommandFailed { stderr, .. }) => assert_eq!(stderr, "nope"),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let service = CommandFixService::new("func-patcher-no-such-program", Vec::new());
        assert!(matches!(
            service.suggest(&request()),
            Err(FixError::Spawn { .. })
        ));
    }
}
