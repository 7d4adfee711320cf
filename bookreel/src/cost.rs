//! Cost projection for the external services.
//!
//! Estimates are linear approximations from character and word counts, with
//! no real tokenizer. They are used for reporting before a run and never
//! gate or throttle any call.

use serde::{Deserialize, Serialize};

use crate::chunking::split_into_chunks;
use crate::errors::Result;
use crate::scene::SCENE_SCHEMA;

/// Approximate tokens per character of English prose.
pub const TOKENS_PER_CHAR: f64 = 0.5;

/// Upper bound on scene analysis reply length, in tokens.
pub const ANALYSIS_MAX_OUTPUT_TOKENS: u64 = 1000;

/// Fixed token overhead of an image generation request.
pub const IMAGE_PROMPT_OVERHEAD_TOKENS: u64 = 100;

/// Narration speed used to predict audio length.
pub const NARRATION_WORDS_PER_MINUTE: f64 = 150.0;

/// Prices in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    /// Scene analysis price per 1K input tokens.
    #[serde(default = "default_input_per_1k_tokens")]
    pub input_per_1k_tokens: f64,
    /// Scene analysis price per 1K output tokens.
    #[serde(default = "default_output_per_1k_tokens")]
    pub output_per_1k_tokens: f64,
    /// Price per generated image.
    #[serde(default = "default_per_image")]
    pub per_image: f64,
    /// Transcription price per minute of audio.
    #[serde(default = "default_per_audio_minute")]
    pub per_audio_minute: f64,
    /// Speech synthesis price per 1K characters.
    #[serde(default = "default_tts_per_1k_chars")]
    pub tts_per_1k_chars: f64,
}

const fn default_input_per_1k_tokens() -> f64 {
    0.01
}

const fn default_output_per_1k_tokens() -> f64 {
    0.03
}

const fn default_per_image() -> f64 {
    0.04
}

const fn default_per_audio_minute() -> f64 {
    0.006
}

const fn default_tts_per_1k_chars() -> f64 {
    0.015
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            input_per_1k_tokens: default_input_per_1k_tokens(),
            output_per_1k_tokens: default_output_per_1k_tokens(),
            per_image: default_per_image(),
            per_audio_minute: default_per_audio_minute(),
            tts_per_1k_chars: default_tts_per_1k_chars(),
        }
    }
}

/// Projected cost of converting a whole book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Number of chunks.
    pub chunks: usize,
    /// Characters in the book.
    pub characters: usize,
    /// Words in the book.
    pub words: usize,
    /// Predicted narration length in minutes.
    pub audio_minutes: f64,
    /// Scene analysis cost.
    pub analysis: f64,
    /// Image generation cost.
    pub images: f64,
    /// Speech synthesis cost.
    pub narration: f64,
    /// Transcription cost.
    pub transcription: f64,
}

impl CostBreakdown {
    /// Total cost in USD.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.analysis + self.images + self.narration + self.transcription
    }
}

/// Approximates the token count of a text from its length.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn estimate_tokens(text: &str) -> u64 {
    (TOKENS_PER_CHAR * text.chars().count() as f64) as u64
}

/// Input tokens of a scene analysis request: two per word plus the schema.
#[must_use]
pub fn analysis_input_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64 * 2 + schema_overhead_tokens()
}

/// Tokens of an image generation request.
#[must_use]
pub fn image_prompt_tokens(prompt: &str) -> u64 {
    prompt.split_whitespace().count() as u64 * 2 + IMAGE_PROMPT_OVERHEAD_TOKENS
}

/// Predicted narration length of a text, in seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn narration_seconds(text: &str) -> f64 {
    text.split_whitespace().count() as f64 / NARRATION_WORDS_PER_MINUTE * 60.0
}

fn schema_overhead_tokens() -> u64 {
    SCENE_SCHEMA.len() as u64 / 4
}

/// Maps text and audio characteristics to prices.
#[derive(Debug, Clone, Default)]
pub struct CostEstimator {
    prices: PriceTable,
}

impl CostEstimator {
    /// Creates an estimator over a price table.
    #[must_use]
    pub const fn new(prices: PriceTable) -> Self {
        Self { prices }
    }

    /// Returns the price table.
    #[must_use]
    pub const fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Cost of analyzing one chunk, assuming a maximum-length reply.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate_analysis_cost(&self, text: &str) -> f64 {
        let input = analysis_input_tokens(text) as f64;
        let output = ANALYSIS_MAX_OUTPUT_TOKENS as f64;
        input / 1000.0 * self.prices.input_per_1k_tokens
            + output / 1000.0 * self.prices.output_per_1k_tokens
    }

    /// Cost of generating `count` images.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate_image_cost(&self, count: usize) -> f64 {
        count as f64 * self.prices.per_image
    }

    /// Cost of synthesizing `characters` characters of speech.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate_tts_cost(&self, characters: usize) -> f64 {
        characters as f64 / 1000.0 * self.prices.tts_per_1k_chars
    }

    /// Cost of transcribing `seconds` of audio.
    #[must_use]
    pub fn estimate_transcription_cost(&self, seconds: f64) -> f64 {
        seconds / 60.0 * self.prices.per_audio_minute
    }

    /// Projects the cost of converting a whole book.
    ///
    /// # Errors
    ///
    /// Returns an error when `chunk_size` is zero.
    pub fn estimate_book(&self, text: &str, chunk_size: usize) -> Result<CostBreakdown> {
        let chunks = split_into_chunks(text, chunk_size)?;
        let mut breakdown = CostBreakdown {
            chunks: chunks.len(),
            ..CostBreakdown::default()
        };

        for chunk in &chunks {
            let characters = chunk.char_len();
            let seconds = narration_seconds(chunk.text());

            breakdown.characters += characters;
            breakdown.words += chunk.word_count();
            breakdown.audio_minutes += seconds / 60.0;
            breakdown.analysis += self.estimate_analysis_cost(chunk.text());
            breakdown.narration += self.estimate_tts_cost(characters);
            breakdown.transcription += self.estimate_transcription_cost(seconds);
        }
        breakdown.images = self.estimate_image_cost(chunks.len());

        Ok(breakdown)
    }
}
