// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Error types for the turn pipeline.

use std::time::Duration;

use crate::frames::Stage;

/// Errors produced while running a speculative turn.
///
/// Collaborator failures are caught at the stage boundary and surface to
/// observers as a `turn_failed` outcome; they never tear down the session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TurnError {
    #[error("reply generation failed: {0}")]
    Generation(String),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("audio playback failed: {0}")]
    Playback(String),
    #[error("{stage} stage timed out after {}ms", .after.as_millis())]
    Timeout { stage: Stage, after: Duration },
    #[error("{stage} collaborator panicked: {message}")]
    CollaboratorPanicked { stage: Stage, message: String },
    #[error("reply generator returned an empty reply")]
    EmptyReply,
    #[error("no cached {stage} result for the current epoch")]
    MissingResult { stage: Stage },
    #[error("turn pipeline is no longer running")]
    ChannelClosed,
}

impl TurnError {
    /// Returns the stage this error is attributed to, when it names one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Generation(_) | Self::EmptyReply => Some(Stage::Generate),
            Self::Synthesis(_) => Some(Stage::Synthesize),
            Self::Playback(_) => Some(Stage::Play),
            Self::Timeout { stage, .. }
            | Self::CollaboratorPanicked { stage, .. }
            | Self::MissingResult { stage } => Some(*stage),
            Self::ChannelClosed => None,
        }
    }
}

/// Errors raised while loading or validating a [`TurnConfig`](crate::config::TurnConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "stage delays must be strictly increasing, got generate={generate_ms}ms \
         synthesize={synthesize_ms}ms play={play_ms}ms"
    )]
    DelaysNotIncreasing {
        generate_ms: u64,
        synthesize_ms: u64,
        play_ms: u64,
    },
    #[error("{stage} timeout must be greater than zero")]
    ZeroTimeout { stage: Stage },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
}
