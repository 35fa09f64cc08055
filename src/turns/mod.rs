// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Turn detection and interruption components.
//!
//! Leaves first:
//!
//! - [`utterance`]: transcription updates to growth / silence signals.
//! - [`arming`]: the debounced three-deadline cascade timer.
//! - [`scheduler`]: dual-gated stage bookkeeping for one epoch.
//! - [`epoch`]: current-epoch pointer and result cache.
//! - [`interruption`]: barge-in classification.
//! - [`playback`]: epoch-checked playback with hard stop.
//!
//! The [`pipeline`](crate::pipeline) module wires these together.

pub mod arming;
pub mod epoch;
pub mod interruption;
pub mod playback;
pub mod scheduler;
pub mod utterance;

pub use arming::{ArmingState, ArmingTimer, CascadeDeadlines};
pub use epoch::{CachedResult, EpochRegistry, EpochToken};
pub use interruption::{
    ActivitySnapshot, AlwaysInterrupt, GrowthClass, InterruptionDetector, InterruptionStrategy,
    MinWordsInterruption,
};
pub use playback::PlaybackController;
pub use scheduler::StageScheduler;
pub use utterance::UtteranceStreamAdapter;
