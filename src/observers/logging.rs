// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Observer that writes every turn notification to `tracing`.

use async_trait::async_trait;

use crate::frames::EpochId;
use crate::metrics::TurnMetricsData;
use crate::observers::{TurnFailure, TurnObserver};

/// Logs turn lifecycle events at `info` and failures at `warn`.
#[derive(Debug, Default, Clone)]
pub struct LogObserver {
    /// Include reply text in log lines.
    pub log_text: bool,
}

impl LogObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self) -> Self {
        self.log_text = true;
        self
    }
}

#[async_trait]
impl TurnObserver for LogObserver {
    async fn on_turn_started(&self, epoch: EpochId) {
        tracing::info!(epoch = %epoch, "Turn started");
    }

    async fn on_reply_ready(&self, epoch: EpochId, text: &str) {
        if self.log_text {
            tracing::info!(epoch = %epoch, text, "Reply ready");
        } else {
            tracing::info!(epoch = %epoch, chars = text.chars().count(), "Reply ready");
        }
    }

    async fn on_interrupted(&self, epoch: EpochId) {
        tracing::info!(epoch = %epoch, "Turn interrupted");
    }

    async fn on_turn_completed(&self, epoch: EpochId) {
        tracing::info!(epoch = %epoch, "Turn completed");
    }

    async fn on_turn_failed(&self, epoch: EpochId, failure: &TurnFailure) {
        tracing::warn!(
            epoch = %epoch,
            stage = ?failure.stage,
            reason = %failure.reason,
            "Turn failed"
        );
    }

    async fn on_metrics(&self, metrics: &TurnMetricsData) {
        match serde_json::to_string(metrics) {
            Ok(json) => tracing::debug!(epoch = %metrics.epoch, metrics = %json, "Turn metrics"),
            Err(e) => tracing::warn!("LogObserver: failed to serialize metrics: {e}"),
        }
    }
}
