// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Debounced arming timer.
//!
//! On silence the whole cascade is armed at once: one background task sleeps
//! until each of the three stage deadlines `D1 < D2 < D3` (measured from the
//! silence point) and reports [`CascadeEvent::DeadlineElapsed`] for each.
//! Growth before the cascade commits disarms it by cancelling the task.
//!
//! At most one cascade is live. Arming while armed replaces the previous
//! cascade rather than stacking a second one.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::TurnConfig;
use crate::frames::{CascadeEvent, EpochId, Stage};

/// Per-stage deadline offsets from the silence point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeDeadlines {
    pub generate: Duration,
    pub synthesize: Duration,
    pub play: Duration,
}

impl CascadeDeadlines {
    /// Deadlines for an utterance, including any adaptive extension.
    pub fn for_utterance(config: &TurnConfig, text: &str) -> Self {
        let extra = config
            .adaptive_delay
            .as_ref()
            .map(|adaptive| adaptive.extra_for(text))
            .unwrap_or_default();
        Self {
            generate: config.stage_delay(Stage::Generate) + extra,
            synthesize: config.stage_delay(Stage::Synthesize) + extra,
            play: config.stage_delay(Stage::Play) + extra,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Generate => self.generate,
            Stage::Synthesize => self.synthesize,
            Stage::Play => self.play,
        }
    }
}

impl From<&TurnConfig> for CascadeDeadlines {
    fn from(config: &TurnConfig) -> Self {
        Self {
            generate: config.stage_delay(Stage::Generate),
            synthesize: config.stage_delay(Stage::Synthesize),
            play: config.stage_delay(Stage::Play),
        }
    }
}

/// Timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmingState {
    Idle,
    Armed { epoch: EpochId, silence_at: Instant },
}

struct LiveCascade {
    epoch: EpochId,
    silence_at: Instant,
    cancel: CancellationToken,
}

/// Arms and disarms the three-deadline cascade.
pub struct ArmingTimer {
    live: Option<LiveCascade>,
    parent: CancellationToken,
    events_tx: mpsc::UnboundedSender<CascadeEvent>,
}

impl ArmingTimer {
    /// Create an idle timer. Cascade tasks are children of `parent`.
    pub fn new(parent: CancellationToken, events_tx: mpsc::UnboundedSender<CascadeEvent>) -> Self {
        Self {
            live: None,
            parent,
            events_tx,
        }
    }

    /// Start the cascade for `epoch`, replacing any live one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm(&mut self, epoch: EpochId, silence_at: Instant, deadlines: CascadeDeadlines) {
        if let Some(previous) = self.disarm() {
            tracing::debug!(
                epoch = %epoch,
                previous = %previous,
                "ArmingTimer: replacing live cascade"
            );
        }

        let cancel = self.parent.child_token();
        let events_tx = self.events_tx.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            for stage in Stage::ALL {
                let deadline = silence_at + deadlines.for_stage(stage);
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(deadline) => {}
                }
                tracing::trace!(epoch = %epoch, stage = %stage, "ArmingTimer: deadline elapsed");
                if events_tx
                    .send(CascadeEvent::DeadlineElapsed { epoch, stage })
                    .is_err()
                {
                    return;
                }
            }
        });

        tracing::debug!(
            epoch = %epoch,
            generate_ms = deadlines.generate.as_millis() as u64,
            synthesize_ms = deadlines.synthesize.as_millis() as u64,
            play_ms = deadlines.play.as_millis() as u64,
            "ArmingTimer: cascade armed"
        );
        self.live = Some(LiveCascade {
            epoch,
            silence_at,
            cancel,
        });
    }

    /// Cancel the live cascade. Returns the epoch it was armed for.
    pub fn disarm(&mut self) -> Option<EpochId> {
        let live = self.live.take()?;
        live.cancel.cancel();
        tracing::debug!(epoch = %live.epoch, "ArmingTimer: cascade disarmed");
        Some(live.epoch)
    }

    /// Return to idle after the final deadline of `epoch` elapsed.
    pub fn complete(&mut self, epoch: EpochId) -> bool {
        match &self.live {
            Some(live) if live.epoch == epoch => {
                self.live = None;
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> ArmingState {
        match &self.live {
            Some(live) => ArmingState::Armed {
                epoch: live.epoch,
                silence_at: live.silence_at,
            },
            None => ArmingState::Idle,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.live.is_some()
    }

    pub fn armed_epoch(&self) -> Option<EpochId> {
        self.live.as_ref().map(|live| live.epoch)
    }
}

impl Drop for ArmingTimer {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            live.cancel.cancel();
        }
    }
}
