// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Base observer types for following turns through the pipeline.
//!
//! Observers are the outbound notification surface for UI layers and
//! analytics. They are one-way: nothing an observer does feeds back into
//! pipeline state.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use speculative_turns::frames::EpochId;
//! use speculative_turns::observers::TurnObserver;
//!
//! struct PrintObserver;
//!
//! #[async_trait]
//! impl TurnObserver for PrintObserver {
//!     async fn on_reply_ready(&self, epoch: EpochId, text: &str) {
//!         println!("{epoch}: {text}");
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::frames::{EpochId, Stage};
use crate::metrics::TurnMetricsData;

/// Details of a failed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFailure {
    /// Stage that failed, when attributable.
    pub stage: Option<Stage>,
    /// Human-readable reason, for logs.
    pub reason: String,
    /// User-safe text the UI may show or speak instead of a reply.
    pub fallback_utterance: String,
}

/// Receives turn lifecycle notifications.
///
/// While the session runs, every `on_turn_started` is followed by exactly
/// one of `on_interrupted`, `on_turn_completed` or `on_turn_failed` for the
/// same epoch.
/// Callbacks run on a dedicated delivery task, in order. A slow observer
/// delays later callbacks but never the session itself.
///
/// All methods have default no-op implementations, so observers only need to
/// implement the callbacks they care about.
#[async_trait]
pub trait TurnObserver: Send + Sync {
    /// The generation deadline elapsed and the epoch committed to a reply.
    async fn on_turn_started(&self, _epoch: EpochId) {}

    /// Reply text for the epoch is available.
    async fn on_reply_ready(&self, _epoch: EpochId, _text: &str) {}

    /// The user barged in; all work for the epoch was discarded.
    async fn on_interrupted(&self, _epoch: EpochId) {}

    /// The reply played to the end.
    async fn on_turn_completed(&self, _epoch: EpochId) {}

    /// A collaborator failed or timed out.
    async fn on_turn_failed(&self, _epoch: EpochId, _failure: &TurnFailure) {}

    /// Metrics for a finished turn.
    async fn on_metrics(&self, _metrics: &TurnMetricsData) {}
}
