use async_trait::async_trait;
use serde::Serialize;

/// Content categories the generation service filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

impl HarmCategory {
    pub const ALL: [HarmCategory; 4] = [
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
        HarmCategory::DangerousContent,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockThreshold {
    BlockNone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: BlockThreshold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyConfig {
    pub settings: Vec<SafetySetting>,
}

impl SafetyConfig {
    /// Every category at the least restrictive level. Narrative fiction trips the
    /// default filters far too often; the service may still refuse on its own.
    pub fn permissive() -> Self {
        Self {
            settings: HarmCategory::ALL
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: BlockThreshold::BlockNone,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("blocked by safety filter: {0}")]
    Blocked(String),

    #[error("service returned no text")]
    Empty,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Text-generation boundary. Implementations perform exactly one call per invocation;
/// retries and fallbacks live in the orchestrator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, safety: &SafetyConfig) -> Result<String, GenerateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_config_covers_every_category_with_block_none() {
        let config = SafetyConfig::permissive();
        assert_eq!(config.settings.len(), HarmCategory::ALL.len());
        assert!(
            config
                .settings
                .iter()
                .all(|s| s.threshold == BlockThreshold::BlockNone)
        );
    }

    #[test]
    fn safety_setting_serializes_to_wire_names() {
        let setting = SafetySetting {
            category: HarmCategory::SexuallyExplicit,
            threshold: BlockThreshold::BlockNone,
        };
        let json = serde_json::to_value(setting).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT",
                "threshold": "BLOCK_NONE",
            })
        );
    }
}
