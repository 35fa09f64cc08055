// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Collaborator traits for reply generation, speech synthesis, playback and
//! recognizer control.
//!
//! The pipeline only depends on these call contracts. Every long-running call
//! receives the epoch it works for and a [`CancellationToken`] that is
//! cancelled as soon as the epoch is superseded. Honouring the token is
//! optional: a late result is dropped by the pipeline either way.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TurnError;
use crate::frames::{AudioClip, EpochId};

/// Produces the reply text for a user utterance (typically an LLM).
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate a reply to `text`.
    async fn generate(
        &self,
        text: &str,
        epoch: EpochId,
        cancel: CancellationToken,
    ) -> Result<String, TurnError>;
}

/// Turns reply text into audio (TTS).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into a playable clip.
    async fn synthesize(
        &self,
        text: &str,
        epoch: EpochId,
        cancel: CancellationToken,
    ) -> Result<AudioClip, TurnError>;
}

/// Plays audio to the user.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play `audio` to completion.
    ///
    /// The returned future is dropped when playback is interrupted, after
    /// [`stop`](Self::stop) has been called.
    async fn play(&self, audio: AudioClip, epoch: EpochId) -> Result<(), TurnError>;

    /// Silence the output immediately. Must not wait for buffers to drain.
    fn stop(&self);
}

/// Optional control over the upstream speech recognizer.
#[async_trait]
pub trait RecognizerControl: Send + Sync {
    /// Restart the recognizer's transcript from empty.
    async fn reset(&self);
}

/// The collaborators a pipeline session calls into.
#[derive(Clone)]
pub struct TurnServices {
    pub generator: Arc<dyn ReplyGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub player: Arc<dyn AudioPlayer>,
}

impl TurnServices {
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
    ) -> Self {
        Self {
            generator,
            synthesizer,
            player,
        }
    }
}

impl std::fmt::Debug for TurnServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnServices").finish_non_exhaustive()
    }
}
