// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Playback controller.
//!
//! Plays synthesized audio for the current epoch only. The epoch is
//! re-validated right before playback starts, since it may have gone stale
//! between synthesis completing and this call. [`PlaybackController::stop`]
//! is a hard stop: the player is silenced synchronously and the playback task
//! is cancelled without reporting anything.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TurnError;
use crate::frames::{AudioClip, CascadeEvent, EpochId, Stage};
use crate::services::AudioPlayer;
use crate::turns::epoch::{EpochRegistry, EpochToken};
use crate::utils::panic_message;

struct ActivePlayback {
    epoch: EpochId,
    cancel: CancellationToken,
}

/// Starts, stops and settles playback for one session.
pub struct PlaybackController {
    player: Arc<dyn AudioPlayer>,
    registry: EpochRegistry,
    active: Option<ActivePlayback>,
    parent: CancellationToken,
    events_tx: mpsc::UnboundedSender<CascadeEvent>,
}

impl PlaybackController {
    pub fn new(
        player: Arc<dyn AudioPlayer>,
        registry: EpochRegistry,
        parent: CancellationToken,
        events_tx: mpsc::UnboundedSender<CascadeEvent>,
    ) -> Self {
        Self {
            player,
            registry,
            active: None,
            parent,
            events_tx,
        }
    }

    /// Start playing `audio` for the epoch of `token`.
    ///
    /// Returns `false` without touching the player when the epoch is no
    /// longer current. On natural completion a
    /// [`CascadeEvent::PlaybackFinished`] is sent to the coordinator.
    pub fn start(&mut self, token: &EpochToken, audio: AudioClip) -> bool {
        if !token.is_current() {
            tracing::debug!(epoch = %token.id(), "Playback: epoch is stale, not playing");
            return false;
        }
        if let Some(previous) = self.stop() {
            tracing::warn!(
                epoch = %token.id(),
                previous = %previous,
                "Playback: stopped leftover playback before starting"
            );
        }

        let epoch = token.id();
        let cancel = self.parent.child_token();
        let task_cancel = cancel.clone();
        let player = Arc::clone(&self.player);
        let events_tx = self.events_tx.clone();
        tracing::debug!(
            epoch = %epoch,
            duration_ms = audio.duration().as_millis() as u64,
            "Playback: starting"
        );

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = task_cancel.cancelled() => return,
                outcome = AssertUnwindSafe(player.play(audio, epoch)).catch_unwind() => outcome,
            };
            let result = match outcome {
                Ok(result) => result,
                Err(payload) => Err(TurnError::CollaboratorPanicked {
                    stage: Stage::Play,
                    message: panic_message(payload.as_ref()),
                }),
            };
            if events_tx
                .send(CascadeEvent::PlaybackFinished { epoch, result })
                .is_err()
            {
                tracing::trace!(epoch = %epoch, "Playback: coordinator gone, result dropped");
            }
        });

        self.active = Some(ActivePlayback { epoch, cancel });
        true
    }

    /// Hard-stop any active playback. Returns the epoch that was playing.
    pub fn stop(&mut self) -> Option<EpochId> {
        let active = self.active.take()?;
        active.cancel.cancel();
        self.player.stop();
        tracing::debug!(epoch = %active.epoch, "Playback: stopped");
        Some(active.epoch)
    }

    /// Settle playback that ended on its own.
    ///
    /// On success the epoch is marked terminal in the registry. Returns
    /// `false` for a stale or already stopped playback, which the caller must
    /// ignore.
    pub fn finish(&mut self, epoch: EpochId, result: &Result<(), TurnError>) -> bool {
        match &self.active {
            Some(active) if active.epoch == epoch => {}
            _ => {
                tracing::trace!(epoch = %epoch, "Playback: ignoring stale completion");
                return false;
            }
        }
        self.active = None;
        if result.is_ok() {
            self.registry.close(epoch);
            tracing::debug!(epoch = %epoch, "Playback: finished, epoch delivered");
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_epoch(&self) -> Option<EpochId> {
        self.active.as_ref().map(|active| active.epoch)
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}
