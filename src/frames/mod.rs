// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Data types that flow through the turn pipeline.
//!
//! - [`TranscriptionUpdate`]: inbound, from the speech recognizer.
//! - [`UtteranceSignal`]: the adapter's two-event vocabulary.
//! - [`CascadeEvent`]: internal notifications from timers, stage tasks and
//!   playback back to the session coordinator.
//! - [`AudioClip`]: synthesized speech handed from synthesis to playback.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::TurnError;

// ---------------------------------------------------------------------------
// EpochId
// ---------------------------------------------------------------------------

/// Identifier of one turn attempt.
///
/// Ids are handed out by the [`EpochRegistry`](crate::turns::EpochRegistry)
/// in strictly increasing order and never reused within a session. The zero
/// value means "no epoch has been opened yet".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EpochId(u64);

impl EpochId {
    /// The placeholder id before any epoch exists.
    pub const NONE: EpochId = EpochId(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Stage / TaskStatus
// ---------------------------------------------------------------------------

/// One of the three speculative stages of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Generate,
    Synthesize,
    Play,
}

impl Stage {
    /// All stages in cascade order.
    pub const ALL: [Stage; 3] = [Stage::Generate, Stage::Synthesize, Stage::Play];

    /// Position of the stage in the cascade.
    pub fn index(self) -> usize {
        match self {
            Self::Generate => 0,
            Self::Synthesize => 1,
            Self::Play => 2,
        }
    }

    /// The stage whose result this stage consumes.
    pub fn dependency(self) -> Option<Stage> {
        match self {
            Self::Generate => None,
            Self::Synthesize => Some(Self::Generate),
            Self::Play => Some(Self::Synthesize),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => write!(f, "generate"),
            Self::Synthesize => write!(f, "synthesize"),
            Self::Play => write!(f, "play"),
        }
    }
}

/// Lifecycle of a speculative task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task still holds a claim on the epoch.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound transcription
// ---------------------------------------------------------------------------

/// A transcript update from the speech recognizer.
///
/// Recognizers report the cumulative text of the current utterance and may
/// re-emit revised versions of text they already reported.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionUpdate {
    pub text: String,
    pub is_final: bool,
    pub at: Instant,
}

impl TranscriptionUpdate {
    /// Create an interim update stamped with the current time.
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            at: Instant::now(),
        }
    }

    /// Create a final update stamped with the current time.
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            at: Instant::now(),
        }
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, at: Instant) -> Self {
        self.at = at;
        self
    }
}

/// Clean output of the [`UtteranceStreamAdapter`](crate::turns::UtteranceStreamAdapter).
#[derive(Debug, Clone, PartialEq)]
pub enum UtteranceSignal {
    /// Materially new content. `text` is the utterance text so far.
    ContentGrowth { text: String, at: Instant },
    /// No qualifying growth for the configured gap. `at` is the silence point
    /// from which cascade deadlines are measured.
    SilenceDetected { at: Instant },
}

// ---------------------------------------------------------------------------
// AudioClip
// ---------------------------------------------------------------------------

/// Synthesized speech ready for playback.
///
/// Samples are shared so the clip can be cached and handed to the player
/// without copying.
#[derive(Clone, PartialEq)]
pub struct AudioClip {
    pub audio: Arc<[u8]>,
    pub sample_rate: u32,
    pub num_channels: u16,
}

impl AudioClip {
    pub fn new(audio: impl Into<Arc<[u8]>>, sample_rate: u32, num_channels: u16) -> Self {
        Self {
            audio: audio.into(),
            sample_rate,
            num_channels,
        }
    }

    /// Number of samples per channel, assuming 16-bit PCM.
    pub fn num_frames(&self) -> usize {
        let channels = usize::from(self.num_channels.max(1));
        self.audio.len() / (2 * channels)
    }

    /// Playback length of the clip.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.num_frames() as u128 * 1_000_000_000 / u128::from(self.sample_rate);
        Duration::from_nanos(nanos as u64)
    }
}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("bytes", &self.audio.len())
            .field("sample_rate", &self.sample_rate)
            .field("num_channels", &self.num_channels)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Internal events
// ---------------------------------------------------------------------------

/// Notifications delivered to the session coordinator by its background tasks.
///
/// Every event carries the epoch it was produced for; the coordinator drops
/// events whose epoch is no longer current.
#[derive(Debug)]
pub enum CascadeEvent {
    /// A cascade deadline measured from the silence point has passed.
    DeadlineElapsed { epoch: EpochId, stage: Stage },
    /// A generation or synthesis task finished. On success the result has
    /// already been published to the registry.
    StageCompleted {
        epoch: EpochId,
        stage: Stage,
        result: Result<(), TurnError>,
    },
    /// The playback task ended on its own (not via `stop()`).
    PlaybackFinished {
        epoch: EpochId,
        result: Result<(), TurnError>,
    },
}

impl CascadeEvent {
    pub fn epoch(&self) -> EpochId {
        match self {
            Self::DeadlineElapsed { epoch, .. }
            | Self::StageCompleted { epoch, .. }
            | Self::PlaybackFinished { epoch, .. } => *epoch,
        }
    }
}
