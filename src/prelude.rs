// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Common re-exports for convenient use of the turn pipeline.
//!
//! ```
//! use speculative_turns::prelude::*;
//! ```

pub use std::sync::Arc;

pub use crate::config::{AdaptiveDelay, TurnConfig};
pub use crate::error::{ConfigError, TurnError};
pub use crate::frames::{AudioClip, EpochId, Stage, TaskStatus, TranscriptionUpdate};
pub use crate::metrics::{SessionStats, StageTimings, TurnMetricsData, TurnOutcome};
pub use crate::observers::{LogObserver, TurnFailure, TurnObserver};
pub use crate::pipeline::{PipelineHandle, TurnPipeline};
pub use crate::services::{
    AudioPlayer, RecognizerControl, ReplyGenerator, SpeechSynthesizer, TurnServices,
};
pub use crate::turns::{AlwaysInterrupt, InterruptionStrategy, MinWordsInterruption};
