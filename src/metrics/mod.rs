// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Metrics data models for the turn pipeline.
//!
//! [`TurnMetricsData`] is reported to observers once per committed turn, and
//! [`SessionStats`] summarizes a whole session on shutdown. Both serialize to
//! JSON for export.

use serde::{Deserialize, Serialize};

use crate::frames::{EpochId, Stage};

/// How a committed turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The reply was played to the end.
    Completed,
    /// The user barged in before the reply finished.
    Interrupted,
    /// A collaborator failed or timed out.
    Failed,
}

/// Start and finish offsets of each stage, in milliseconds from the moment
/// the cascade was armed. `None` when the stage never started or finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub generate_started_ms: Option<f64>,
    pub generate_finished_ms: Option<f64>,
    pub synthesize_started_ms: Option<f64>,
    pub synthesize_finished_ms: Option<f64>,
    pub play_started_ms: Option<f64>,
    pub play_finished_ms: Option<f64>,
}

impl StageTimings {
    /// Wall time a stage took, if it both started and finished.
    pub fn stage_duration_ms(&self, stage: Stage) -> Option<f64> {
        let (start, end) = match stage {
            Stage::Generate => (self.generate_started_ms, self.generate_finished_ms),
            Stage::Synthesize => (self.synthesize_started_ms, self.synthesize_finished_ms),
            Stage::Play => (self.play_started_ms, self.play_finished_ms),
        };
        Some(end? - start?)
    }
}

/// Per-turn metrics data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetricsData {
    /// Epoch the turn ran under.
    pub epoch: EpochId,
    /// How the turn ended.
    pub outcome: TurnOutcome,
    /// Stage the turn failed in, for [`TurnOutcome::Failed`].
    pub failed_stage: Option<Stage>,
    /// Per-stage offsets from the arming point.
    pub timings: StageTimings,
}

/// Counters for a whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Epochs opened, including ones disarmed before committing.
    pub epochs_opened: u64,
    /// Cascades disarmed by growth before `D1` elapsed.
    pub cascades_disarmed: u64,
    pub turns_started: u64,
    pub turns_completed: u64,
    pub turns_interrupted: u64,
    pub turns_failed: u64,
    pub generation_calls: u64,
    pub synthesis_calls: u64,
    pub playback_calls: u64,
}

impl SessionStats {
    /// Record a collaborator invocation for `stage`.
    pub fn record_call(&mut self, stage: Stage) {
        match stage {
            Stage::Generate => self.generation_calls += 1,
            Stage::Synthesize => self.synthesis_calls += 1,
            Stage::Play => self.playback_calls += 1,
        }
    }

    /// Record a terminal outcome.
    pub fn record_outcome(&mut self, outcome: TurnOutcome) {
        match outcome {
            TurnOutcome::Completed => self.turns_completed += 1,
            TurnOutcome::Interrupted => self.turns_interrupted += 1,
            TurnOutcome::Failed => self.turns_failed += 1,
        }
    }

    /// Turns started but not yet resolved.
    pub fn turns_in_flight(&self) -> u64 {
        self.turns_started
            .saturating_sub(self.turns_completed + self.turns_interrupted + self.turns_failed)
    }
}
