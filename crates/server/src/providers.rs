//! Local development providers.
//!
//! Deterministic placeholder implementations of the core capability traits
//! so the pipeline runs end to end without external API credentials. Real
//! provider integrations implement the same traits and replace these at
//! wiring time.

use std::time::Duration;

use async_trait::async_trait;
use taleforge_common::AppResult;
use taleforge_core::{GenerationInput, ImageGenerator, SpeechSynthesizer, TextGenerator};

fn slug(theme: &str) -> String {
    theme
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .take(48)
        .collect()
}

/// Text provider producing a fixed-shape story.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevTextGenerator;

#[async_trait]
impl TextGenerator for DevTextGenerator {
    async fn generate_text(&self, input: &GenerationInput) -> AppResult<String> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(format!(
            "Once upon a time there was a {} about {}. (language: {})",
            input.story_type, input.theme, input.language
        ))
    }
}

/// Image provider returning a placeholder artifact URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevImageGenerator;

#[async_trait]
impl ImageGenerator for DevImageGenerator {
    async fn generate_image(&self, _story: &str, input: &GenerationInput) -> AppResult<String> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(format!(
            "https://placeholder.taleforge.dev/images/{}-{}.png",
            slug(&input.theme),
            input.image_style
        ))
    }
}

/// Speech provider returning a placeholder artifact URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevSpeechSynthesizer;

#[async_trait]
impl SpeechSynthesizer for DevSpeechSynthesizer {
    async fn synthesize(&self, _story: &str, input: &GenerationInput) -> AppResult<String> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(format!(
            "https://placeholder.taleforge.dev/audio/{}.mp3",
            slug(&input.theme)
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dev_pipeline_artifacts() {
        let input: GenerationInput =
            serde_json::from_value(serde_json::json!({"theme": "The Brave Fox!"})).unwrap();

        let story = DevTextGenerator.generate_text(&input).await.unwrap();
        assert!(story.contains("The Brave Fox!"));

        let image = DevImageGenerator.generate_image(&story, &input).await.unwrap();
        assert!(image.contains("the-brave-fox-"));
        assert!(image.ends_with(".png"));

        let audio = DevSpeechSynthesizer.synthesize(&story, &input).await.unwrap();
        assert!(audio.ends_with(".mp3"));
    }
}
