// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Tunable timing and threshold parameters for the turn pipeline.
//!
//! All durations are stored in milliseconds so the config round-trips cleanly
//! through JSON. Use the `*_delay()` / `*_timeout()` accessors to get
//! [`Duration`] values.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::frames::Stage;
use crate::utils::word_count;

/// Default user-safe text surfaced to the UI when a turn fails.
pub const DEFAULT_FALLBACK_UTTERANCE: &str = "Sorry, I didn't catch that. Could you say it again?";

/// Extra delay added to every cascade deadline for short utterances.
///
/// A two-word utterance is much more likely to be a pause mid-sentence than a
/// finished question, so the cascade waits a little longer before committing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveDelay {
    pub short_max_words: usize,
    pub short_extra_ms: u64,
    pub medium_max_words: usize,
    pub medium_extra_ms: u64,
}

impl Default for AdaptiveDelay {
    fn default() -> Self {
        Self {
            short_max_words: 3,
            short_extra_ms: 600,
            medium_max_words: 6,
            medium_extra_ms: 300,
        }
    }
}

impl AdaptiveDelay {
    /// Extra delay for an utterance with the given text.
    pub fn extra_for(&self, text: &str) -> Duration {
        let words = word_count(text);
        let extra_ms = if words <= self.short_max_words {
            self.short_extra_ms
        } else if words <= self.medium_max_words {
            self.medium_extra_ms
        } else {
            0
        };
        Duration::from_millis(extra_ms)
    }
}

/// Configuration for a [`TurnPipeline`](crate::pipeline::TurnPipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// `D1`: silence before reply generation starts.
    pub generation_delay_ms: u64,
    /// `D2`: silence before synthesis may start.
    pub synthesis_delay_ms: u64,
    /// `D3`: silence before playback may start.
    pub playback_delay_ms: u64,
    /// Minimum character growth (exclusive) for an update to count as new speech.
    pub growth_threshold_chars: usize,
    /// Inactivity after the last growth before silence is reported.
    pub silence_gap_ms: u64,
    /// Ceiling for a single generation call.
    pub generation_timeout_ms: u64,
    /// Ceiling for a single synthesis call.
    pub synthesis_timeout_ms: u64,
    /// Text handed to observers alongside a failed turn.
    pub fallback_utterance: String,
    /// Optional word-count based extension of the stage delays.
    pub adaptive_delay: Option<AdaptiveDelay>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            generation_delay_ms: 500,
            synthesis_delay_ms: 1500,
            playback_delay_ms: 2000,
            growth_threshold_chars: 2,
            silence_gap_ms: 0,
            generation_timeout_ms: 15_000,
            synthesis_timeout_ms: 15_000,
            fallback_utterance: DEFAULT_FALLBACK_UTTERANCE.to_string(),
            adaptive_delay: None,
        }
    }
}

impl TurnConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TURN_*` environment variable overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: key.to_string(),
                    value,
                })
        }

        if let Some(v) = lookup("TURN_GENERATION_DELAY_MS") {
            self.generation_delay_ms = parse("TURN_GENERATION_DELAY_MS", v)?;
        }
        if let Some(v) = lookup("TURN_SYNTHESIS_DELAY_MS") {
            self.synthesis_delay_ms = parse("TURN_SYNTHESIS_DELAY_MS", v)?;
        }
        if let Some(v) = lookup("TURN_PLAYBACK_DELAY_MS") {
            self.playback_delay_ms = parse("TURN_PLAYBACK_DELAY_MS", v)?;
        }
        if let Some(v) = lookup("TURN_GROWTH_THRESHOLD_CHARS") {
            self.growth_threshold_chars = parse("TURN_GROWTH_THRESHOLD_CHARS", v)?;
        }
        if let Some(v) = lookup("TURN_SILENCE_GAP_MS") {
            self.silence_gap_ms = parse("TURN_SILENCE_GAP_MS", v)?;
        }
        Ok(self)
    }

    /// Check that `D1 < D2 < D3` and that stage timeouts are non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.generation_delay_ms < self.synthesis_delay_ms
            && self.synthesis_delay_ms < self.playback_delay_ms)
        {
            return Err(ConfigError::DelaysNotIncreasing {
                generate_ms: self.generation_delay_ms,
                synthesize_ms: self.synthesis_delay_ms,
                play_ms: self.playback_delay_ms,
            });
        }
        if self.generation_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                stage: Stage::Generate,
            });
        }
        if self.synthesis_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                stage: Stage::Synthesize,
            });
        }
        Ok(())
    }

    /// Deadline offset of a stage from the silence point.
    pub fn stage_delay(&self, stage: Stage) -> Duration {
        Duration::from_millis(match stage {
            Stage::Generate => self.generation_delay_ms,
            Stage::Synthesize => self.synthesis_delay_ms,
            Stage::Play => self.playback_delay_ms,
        })
    }

    pub fn silence_gap(&self) -> Duration {
        Duration::from_millis(self.silence_gap_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }
}
