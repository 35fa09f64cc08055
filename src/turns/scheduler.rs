// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Speculative stage scheduler.
//!
//! Pure bookkeeping for the three-stage cascade of one epoch. The scheduler
//! never spawns anything itself; it answers "which stages may start now?"
//! every time a deadline elapses or a stage completes, and the session
//! coordinator launches whatever it returns.
//!
//! # Gating
//!
//! A stage starts only when both hold:
//!
//! 1. its clock deadline has elapsed, and
//! 2. the stage it depends on is [`TaskStatus::Done`].
//!
//! So synthesis starts at `max(D2, generation done)` and playback at
//! `max(D3, synthesis done)`. Generation has no dependency and starts at `D1`.
//!
//! # Task creation
//!
//! No tasks exist while the cascade is merely armed. When `D1` elapses the
//! epoch commits: generation becomes [`TaskStatus::Running`] and synthesis and
//! playback are created [`TaskStatus::Pending`]. From then on any new speech
//! is an interruption rather than a debounce.

use std::time::Duration;

use tokio::time::Instant;

use crate::frames::{EpochId, Stage, TaskStatus};
use crate::metrics::StageTimings;

#[derive(Debug, Clone, Copy, Default)]
struct StageSlot {
    deadline_elapsed: bool,
    status: Option<TaskStatus>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

/// Tracks the stage tasks of the epoch currently owning the cascade.
#[derive(Debug, Default)]
pub struct StageScheduler {
    epoch: Option<EpochId>,
    armed_at: Option<Instant>,
    slots: [StageSlot; 3],
}

impl StageScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a freshly armed epoch.
    pub fn begin(&mut self, epoch: EpochId, armed_at: Instant) {
        self.epoch = Some(epoch);
        self.armed_at = Some(armed_at);
        self.slots = [StageSlot::default(); 3];
    }

    /// Forget the epoch entirely.
    pub fn clear(&mut self) {
        self.epoch = None;
        self.armed_at = None;
        self.slots = [StageSlot::default(); 3];
    }

    pub fn epoch(&self) -> Option<EpochId> {
        self.epoch
    }

    /// Whether tasks have been created for the epoch (`D1` has elapsed).
    pub fn is_committed(&self) -> bool {
        self.epoch.is_some() && self.slots[Stage::Generate.index()].status.is_some()
    }

    /// Record an elapsed deadline. Returns the stages that may start now.
    pub fn on_deadline(&mut self, epoch: EpochId, stage: Stage, now: Instant) -> Vec<Stage> {
        if self.epoch != Some(epoch) {
            tracing::trace!(epoch = %epoch, stage = %stage, "Scheduler: ignoring stale deadline");
            return Vec::new();
        }
        if stage == Stage::Generate && !self.is_committed() {
            for slot in &mut self.slots {
                slot.status = Some(TaskStatus::Pending);
            }
            tracing::debug!(epoch = %epoch, "Scheduler: epoch committed, tasks created");
        }
        self.slots[stage.index()].deadline_elapsed = true;
        self.ready_stages(now)
    }

    /// Record a successful stage. Returns the stages that may start now.
    pub fn on_completed(&mut self, epoch: EpochId, stage: Stage, now: Instant) -> Vec<Stage> {
        if self.epoch != Some(epoch) {
            tracing::trace!(epoch = %epoch, stage = %stage, "Scheduler: ignoring stale completion");
            return Vec::new();
        }
        let slot = &mut self.slots[stage.index()];
        if slot.status != Some(TaskStatus::Running) {
            tracing::warn!(
                epoch = %epoch,
                stage = %stage,
                status = ?slot.status,
                "Scheduler: completion for a stage that is not running"
            );
            return Vec::new();
        }
        slot.status = Some(TaskStatus::Done);
        slot.finished_at = Some(now);
        tracing::debug!(epoch = %epoch, stage = %stage, "Scheduler: stage done");
        self.ready_stages(now)
    }

    /// Mark every pending or running task cancelled.
    ///
    /// Returns the stages that were still active.
    pub fn cancel_all(&mut self, now: Instant) -> Vec<Stage> {
        let mut cancelled = Vec::new();
        for stage in Stage::ALL {
            let slot = &mut self.slots[stage.index()];
            if slot.status.is_some_and(TaskStatus::is_active) {
                slot.status = Some(TaskStatus::Cancelled);
                if slot.started_at.is_some() {
                    slot.finished_at = Some(now);
                }
                cancelled.push(stage);
            }
        }
        if !cancelled.is_empty() {
            tracing::debug!(
                epoch = ?self.epoch,
                stages = ?cancelled,
                "Scheduler: cancelled active tasks"
            );
        }
        cancelled
    }

    pub fn status(&self, stage: Stage) -> Option<TaskStatus> {
        self.slots[stage.index()].status
    }

    /// Whether any task is pending or running.
    pub fn has_active_tasks(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.status.is_some_and(TaskStatus::is_active))
    }

    /// Whether all three stages are done.
    pub fn is_complete(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.status == Some(TaskStatus::Done))
    }

    /// Stage start/finish offsets from the arming point.
    pub fn timings(&self) -> StageTimings {
        let offset = |at: Option<Instant>| -> Option<f64> {
            let armed_at = self.armed_at?;
            let at = at?;
            Some(ms(at.saturating_duration_since(armed_at)))
        };
        let slot = |stage: Stage| &self.slots[stage.index()];
        StageTimings {
            generate_started_ms: offset(slot(Stage::Generate).started_at),
            generate_finished_ms: offset(slot(Stage::Generate).finished_at),
            synthesize_started_ms: offset(slot(Stage::Synthesize).started_at),
            synthesize_finished_ms: offset(slot(Stage::Synthesize).finished_at),
            play_started_ms: offset(slot(Stage::Play).started_at),
            play_finished_ms: offset(slot(Stage::Play).finished_at),
        }
    }

    fn ready_stages(&mut self, now: Instant) -> Vec<Stage> {
        let mut ready = Vec::new();
        for stage in Stage::ALL {
            let dependency_done = stage
                .dependency()
                .map(|dep| self.slots[dep.index()].status == Some(TaskStatus::Done))
                .unwrap_or(true);
            let slot = &mut self.slots[stage.index()];
            if slot.status == Some(TaskStatus::Pending) && slot.deadline_elapsed && dependency_done
            {
                slot.status = Some(TaskStatus::Running);
                slot.started_at = Some(now);
                ready.push(stage);
            }
        }
        ready
    }
}

fn ms(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}
