// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Interruption (barge-in) detection.
//!
//! Classifies every content-growth signal against what the pipeline is doing
//! at that moment:
//!
//! | Pipeline activity                         | Classification                 |
//! |-------------------------------------------|--------------------------------|
//! | nothing armed, no tasks, nothing playing  | [`GrowthClass::NewSpeech`]     |
//! | cascade armed, no stage task created yet  | [`GrowthClass::FalseSilence`]  |
//! | any task pending/running, or playback on  | [`GrowthClass::Interruption`]  |
//!
//! An [`InterruptionStrategy`] may veto an interruption, in which case the
//! growth is [`GrowthClass::Suppressed`] and the reply keeps going.

use std::fmt;

use async_trait::async_trait;

use crate::frames::EpochId;
use crate::utils::word_count;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Decides whether speech during an active turn is a real barge-in.
#[async_trait]
pub trait InterruptionStrategy: Send + Sync {
    /// Check if the active turn should be interrupted by `text`.
    async fn should_interrupt(&self, text: &str) -> bool;
}

/// Every growth during an active turn interrupts it.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysInterrupt;

#[async_trait]
impl InterruptionStrategy for AlwaysInterrupt {
    async fn should_interrupt(&self, _text: &str) -> bool {
        true
    }
}

/// Interrupt only once the new speech has at least `min_words` words.
///
/// Keeps short backchannels ("uh-huh", "ok") and speaker echo from cutting
/// the reply off.
#[derive(Debug, Clone, Copy)]
pub struct MinWordsInterruption {
    pub min_words: usize,
}

impl MinWordsInterruption {
    pub fn new(min_words: usize) -> Self {
        Self { min_words }
    }
}

#[async_trait]
impl InterruptionStrategy for MinWordsInterruption {
    async fn should_interrupt(&self, text: &str) -> bool {
        let words = word_count(text);
        tracing::trace!(
            words,
            min_words = self.min_words,
            "MinWordsInterruption: evaluating growth"
        );
        words >= self.min_words
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// What the pipeline is doing when growth arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivitySnapshot {
    /// Epoch owning the current utterance, if any.
    pub epoch: Option<EpochId>,
    /// The arming timer has a live cascade.
    pub armed: bool,
    /// Some stage task of the epoch is pending or running.
    pub tasks_active: bool,
    /// Audio is being played.
    pub playback_active: bool,
}

impl ActivitySnapshot {
    fn is_busy(&self) -> bool {
        self.tasks_active || self.playback_active
    }
}

/// Result of classifying a growth signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthClass {
    /// Ordinary speech; no speculative work is affected.
    NewSpeech,
    /// The silence that armed the cascade was premature. The cascade must be
    /// disarmed and a new epoch opened, without notifying observers.
    FalseSilence { epoch: EpochId },
    /// Barge-in during an active turn.
    Interruption { epoch: EpochId },
    /// Speech during an active turn that the strategy chose to ignore.
    Suppressed { epoch: EpochId },
}

/// Recognizes barge-in against the current pipeline activity.
pub struct InterruptionDetector {
    strategy: Box<dyn InterruptionStrategy>,
    interruptions: u64,
    suppressed: u64,
}

impl InterruptionDetector {
    pub fn new(strategy: Box<dyn InterruptionStrategy>) -> Self {
        Self {
            strategy,
            interruptions: 0,
            suppressed: 0,
        }
    }

    /// Classify growth carrying `text` against `activity`.
    pub async fn classify(&mut self, text: &str, activity: ActivitySnapshot) -> GrowthClass {
        let Some(epoch) = activity.epoch else {
            return GrowthClass::NewSpeech;
        };

        if activity.is_busy() {
            if self.strategy.should_interrupt(text).await {
                self.interruptions += 1;
                tracing::debug!(
                    epoch = %epoch,
                    tasks_active = activity.tasks_active,
                    playback_active = activity.playback_active,
                    "InterruptionDetector: barge-in detected"
                );
                return GrowthClass::Interruption { epoch };
            }
            self.suppressed += 1;
            tracing::debug!(epoch = %epoch, "InterruptionDetector: growth suppressed by strategy");
            return GrowthClass::Suppressed { epoch };
        }

        if activity.armed {
            return GrowthClass::FalseSilence { epoch };
        }
        GrowthClass::NewSpeech
    }

    /// Interruptions detected so far.
    pub fn interruptions(&self) -> u64 {
        self.interruptions
    }

    /// Growth signals vetoed by the strategy so far.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

impl Default for InterruptionDetector {
    fn default() -> Self {
        Self::new(Box::new(AlwaysInterrupt))
    }
}

impl fmt::Debug for InterruptionDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptionDetector")
            .field("interruptions", &self.interruptions)
            .field("suppressed", &self.suppressed)
            .finish()
    }
}
