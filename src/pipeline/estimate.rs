//! Pre-dispatch token and cost estimation.
//!
//! Sizes are approximate on purpose: text is measured in characters, inline
//! media in bytes (or base64 characters), and remote media falls back to a
//! fixed token count per content type.

use crate::config::{ContentEstimate, CoreConfig};
use crate::types::{ContentPart, MediaSource, ModelCatalogEntry, UsageEstimate};

const PER_MILLION: f64 = 1_000_000.0;

pub fn text_tokens(text: &str, config: &CoreConfig) -> u64 {
    config
        .token_estimation
        .text
        .raw_tokens(text.chars().count())
}

pub fn media_tokens(source: &MediaSource, estimate: &ContentEstimate) -> u64 {
    match source {
        MediaSource::Url { .. } => estimate.fallback_tokens,
        MediaSource::Base64 { data, .. } => estimate.base64_tokens(data.len()),
        MediaSource::Bytes { data, .. } => estimate.raw_tokens(data.len()),
    }
}

/// Input tokens split by how they are billed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputTokens {
    pub text: u64,
    pub audio: u64,
}

impl InputTokens {
    pub fn total(&self) -> u64 {
        self.text + self.audio
    }

    pub fn add_part(&mut self, part: &ContentPart, config: &CoreConfig) {
        let est = &config.token_estimation;
        match part {
            ContentPart::Text { text } => self.text += text_tokens(text, config),
            ContentPart::Image { source } => self.text += media_tokens(source, &est.image),
            ContentPart::Audio { source } => self.audio += media_tokens(source, &est.audio),
            ContentPart::File { source } => self.text += media_tokens(source, &est.file),
        }
    }
}

/// Build an estimate priced against `entry`. Token prices missing from the
/// catalog use the configured default; audio input falls back to the text
/// input price.
pub fn priced(
    input: InputTokens,
    output_tokens: u64,
    units: u32,
    entry: &ModelCatalogEntry,
    config: &CoreConfig,
) -> UsageEstimate {
    let pricing = &entry.pricing;
    let fallback = config.default_cost_per_million_tokens;
    let input_price = pricing.input_per_million.unwrap_or(fallback);
    let audio_price = pricing.audio_input_per_million.unwrap_or(input_price);
    let output_price = pricing
        .output_per_million
        .or(pricing.input_per_million)
        .unwrap_or(fallback);

    let mut cost = input.text as f64 / PER_MILLION * input_price
        + input.audio as f64 / PER_MILLION * audio_price
        + output_tokens as f64 / PER_MILLION * output_price;
    if let Some(per_image) = pricing.per_image {
        cost += f64::from(units) * per_image;
    }

    UsageEstimate {
        input_tokens: input.total(),
        output_tokens,
        units,
        cost,
    }
}
