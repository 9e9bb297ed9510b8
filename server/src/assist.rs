//! Deployment assistant
//!
//! Thin client for an OpenAI-compatible chat completions endpoint. The
//! assistant answers deployment questions, reviews configuration records,
//! and suggests troubleshooting steps. It never fails a caller: when the
//! endpoint is unconfigured or unreachable it degrades to a fixed notice.

use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::schema::GuestConfig;
use crate::config::validate;
use crate::errors::AppError;

pub const UNAVAILABLE_NOTICE: &str =
    "The assistant is not available right now. Set an API key and try again.";

const SYSTEM_PROMPT: &str = "You are a deployment assistant for Windows-in-Docker containers. \
    You help operators size guests, pick Windows versions, configure networking \
    (bridge, static, macvlan), and debug failed deployments. Answer concisely \
    and prefer concrete commands and configuration values.";

const ANALYSIS_PROMPT: &str = "Review the Windows container configuration below and reply with \
    a JSON object holding four string arrays: recommendations, security_notes, \
    performance_tips, warnings. Reply with JSON only.";

/// Assistant endpoint settings.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_base: String,
    pub api_key: Option<SecretString>,
    pub model: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl AssistantConfig {
    /// Read endpoint settings from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("WINFORGE_AI_BASE").unwrap_or(defaults.api_base),
            api_key: std::env::var("WINFORGE_AI_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            model: std::env::var("WINFORGE_AI_MODEL").unwrap_or(defaults.model),
        }
    }
}

/// Structured configuration review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigAnalysis {
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub security_notes: Vec<String>,
    #[serde(default)]
    pub performance_tips: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

pub struct Assistant {
    config: AssistantConfig,
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl Assistant {
    pub fn new(config: AssistantConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Free-form question, optionally with extra context prepended.
    pub async fn chat(&self, message: &str, context: Option<&str>) -> String {
        let content = match context {
            Some(ctx) => format!("Context:\n{}\n\nQuestion: {}", ctx, message),
            None => message.to_string(),
        };
        self.complete(SYSTEM_PROMPT, content).await
    }

    /// Review a configuration record. The validator's findings are handed to
    /// the model so its advice lines up with what the server will enforce.
    pub async fn analyze_config(&self, config: &GuestConfig) -> ConfigAnalysis {
        let report = validate::validate(config);
        let record = serde_json::to_string_pretty(config).unwrap_or_else(|_| format!("{:?}", config));
        let content = format!(
            "Configuration:\n{}\n\nValidator errors: {:?}\nValidator warnings: {:?}",
            record, report.errors, report.warnings,
        );

        let reply = self.complete(ANALYSIS_PROMPT, content).await;
        parse_analysis(&reply)
    }

    /// Troubleshooting help for a described problem, optionally with logs.
    pub async fn troubleshoot(&self, issue: &str, logs: Option<&str>) -> String {
        let content = match logs {
            Some(logs) => format!(
                "A Windows-in-Docker deployment has a problem. Suggest diagnosis \
                 steps and likely fixes.\n\nProblem: {}\n\nLogs:\n{}",
                issue, logs
            ),
            None => format!(
                "A Windows-in-Docker deployment has a problem. Suggest diagnosis \
                 steps and likely fixes.\n\nProblem: {}",
                issue
            ),
        };
        self.complete(SYSTEM_PROMPT, content).await
    }

    async fn complete(&self, system_prompt: &str, content: String) -> String {
        let Some(api_key) = &self.config.api_key else {
            debug!("Assistant not configured, returning notice");
            return UNAVAILABLE_NOTICE.to_string();
        };

        match self.request(api_key, system_prompt, content).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Assistant request failed");
                UNAVAILABLE_NOTICE.to_string()
            }
        }
    }

    async fn request(
        &self,
        api_key: &SecretString,
        system_prompt: &str,
        content: String,
    ) -> Result<String, AppError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content,
                },
            ],
        };

        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        debug!(url = %url, model = %self.config.model, "Assistant request");

        let response = self
            .client
            .post(&url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Internal(format!(
                "Assistant endpoint returned {}",
                status
            )));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Internal("Assistant returned no choices".to_string()))
    }
}

/// Parse the model's JSON review, tolerating code fences; free-form replies
/// land in `recommendations` whole.
fn parse_analysis(reply: &str) -> ConfigAnalysis {
    if reply == UNAVAILABLE_NOTICE {
        return ConfigAnalysis {
            warnings: vec![UNAVAILABLE_NOTICE.to_string()],
            ..Default::default()
        };
    }

    let trimmed = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(trimmed).unwrap_or_else(|_| ConfigAnalysis {
        recommendations: vec![reply.to_string()],
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_assistant_degrades() {
        let assistant = Assistant::new(AssistantConfig::default()).unwrap();
        assert!(!assistant.is_available());

        let reply = assistant.chat("how much RAM for Windows 11?", None).await;
        assert_eq!(reply, UNAVAILABLE_NOTICE);

        let reply = assistant.troubleshoot("container restarts", None).await;
        assert_eq!(reply, UNAVAILABLE_NOTICE);

        let analysis = assistant.analyze_config(&GuestConfig::default()).await;
        assert_eq!(analysis.warnings, vec![UNAVAILABLE_NOTICE.to_string()]);
    }

    #[test]
    fn test_parse_analysis_json_and_fallback() {
        let parsed = parse_analysis(
            r#"```json
{"recommendations": ["use 8G RAM"], "security_notes": [], "performance_tips": [], "warnings": []}
```"#,
        );
        assert_eq!(parsed.recommendations, vec!["use 8G RAM".to_string()]);

        let parsed = parse_analysis("just some prose");
        assert_eq!(parsed.recommendations, vec!["just some prose".to_string()]);
    }
}
