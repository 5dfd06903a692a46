//! Capability traits for the external content providers.
//!
//! The generation logic itself (prompt construction, model selection) lives
//! behind these traits; the orchestration layer only sees
//! `generate(spec) -> artifact or error`. Provider errors use the shared
//! taxonomy: `ExternalService` for transient upstream failures,
//! `Unprocessable` for input the provider can never handle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taleforge_common::AppResult;
use validator::Validate;

/// Validated generation spec, stored verbatim in the Job row's `input`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationInput {
    /// Story theme. Required.
    #[validate(length(min = 1, max = 200))]
    pub theme: String,

    /// BCP-47-ish language tag.
    #[serde(default = "default_language")]
    #[validate(length(min = 2, max = 16))]
    pub language: String,

    /// Story flavor (fairy tale, adventure, ...).
    #[serde(default = "default_story_type")]
    pub story_type: String,

    /// Sampling temperature handed to the text provider.
    #[serde(default = "default_creativity")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub creativity: f32,

    /// Visual style for the image step.
    #[serde(default = "default_image_style")]
    pub image_style: String,

    /// Playback speed for the speech step.
    #[serde(default = "default_audio_speed")]
    #[validate(range(min = 0.5, max = 2.0))]
    pub audio_speed: f32,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_story_type() -> String {
    "fairy_tale".to_string()
}

const fn default_creativity() -> f32 {
    0.8
}

fn default_image_style() -> String {
    "fantasy".to_string()
}

const fn default_audio_speed() -> f32 {
    1.0
}

/// Aggregated pipeline output. Partial artifacts accumulate in the Job
/// row's `result` after each step so a redelivered task resumes instead of
/// regenerating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Output of the text step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_text: Option<String>,
    /// URL of the generated illustration, absent on degraded success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// URL of the synthesized narration, absent on degraded success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl GenerationResult {
    /// Parse the accumulated result from a Job row, tolerating an absent or
    /// malformed payload (treated as "nothing done yet").
    #[must_use]
    pub fn from_job_result(value: Option<&serde_json::Value>) -> Self {
        value
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Serialize for the Job row.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// Text generation capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate the story text for the given spec.
    async fn generate_text(&self, input: &GenerationInput) -> AppResult<String>;
}

/// Image generation capability.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an illustration for the story; returns the artifact URL.
    async fn generate_image(&self, story_text: &str, input: &GenerationInput)
    -> AppResult<String>;
}

/// Speech synthesis capability.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Narrate the story; returns the artifact URL.
    async fn synthesize(&self, story_text: &str, input: &GenerationInput) -> AppResult<String>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_input_defaults() {
        let input: GenerationInput =
            serde_json::from_value(serde_json::json!({"theme": "space pirates"})).unwrap();
        assert_eq!(input.language, "en");
        assert_eq!(input.story_type, "fairy_tale");
        assert_eq!(input.image_style, "fantasy");
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_empty_theme_fails_validation() {
        let input: GenerationInput =
            serde_json::from_value(serde_json::json!({"theme": ""})).unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_audio_speed_out_of_range() {
        let input: GenerationInput =
            serde_json::from_value(serde_json::json!({"theme": "t", "audio_speed": 5.0}))
                .unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_result_accumulates_partial_artifacts() {
        let mut result = GenerationResult::default();
        result.story_text = Some("once".into());
        let value = result.to_value();
        assert!(value.get("image_url").is_none());

        let parsed = GenerationResult::from_job_result(Some(&value));
        assert_eq!(parsed.story_text.as_deref(), Some("once"));
        assert!(parsed.image_url.is_none());
    }

    #[test]
    fn test_result_tolerates_missing_payload() {
        let parsed = GenerationResult::from_job_result(None);
        assert_eq!(parsed, GenerationResult::default());
    }
}
