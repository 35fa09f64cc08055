// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Single-owner session coordinator.
//!
//! [`TurnPipeline::spawn`] starts one Tokio task that exclusively owns all
//! turn state: the utterance adapter, arming timer, stage scheduler,
//! interruption detector and playback controller. Everything else talks to
//! it through channels:
//!
//! - transcription updates arrive from the [`PipelineHandle`];
//! - timer deadlines, stage completions and playback completions arrive as
//!   [`CascadeEvent`]s from background tasks.
//!
//! Because every mutation of the current-epoch pointer happens on this one
//! task, an epoch can never change between an event's staleness check and
//! the state change it triggers.
//!
//! Generation and synthesis run as spawned tasks guarded by a timeout and
//! `catch_unwind`; they publish their result through their [`EpochToken`] and
//! then notify the coordinator, which re-checks the epoch before acting.
//!
//! Observer callbacks are queued on an [`ObserverDispatcher`] and never
//! awaited here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::TurnConfig;
use crate::error::{ConfigError, TurnError};
use crate::frames::{CascadeEvent, EpochId, Stage, TranscriptionUpdate, UtteranceSignal};
use crate::metrics::{SessionStats, StageTimings, TurnMetricsData, TurnOutcome};
use crate::observers::{Notification, ObserverDispatcher, TurnFailure, TurnObserver};
use crate::services::{RecognizerControl, TurnServices};
use crate::turns::{
    ActivitySnapshot, AlwaysInterrupt, ArmingTimer, CachedResult, CascadeDeadlines, EpochRegistry,
    EpochToken, GrowthClass, InterruptionDetector, InterruptionStrategy, PlaybackController,
    StageScheduler, UtteranceStreamAdapter,
};
use crate::utils::{obj_id, run_guarded, strip_spoken_prefix};

// ---------------------------------------------------------------------------
// TurnPipeline (builder)
// ---------------------------------------------------------------------------

/// Builder for a turn-taking session.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use speculative_turns::prelude::*;
/// # async fn run(services: TurnServices) -> Result<(), Box<dyn std::error::Error>> {
/// let handle = TurnPipeline::new(TurnConfig::default(), services)?
///     .with_observer(Arc::new(LogObserver::new()))
///     .spawn();
/// handle.send(TranscriptionUpdate::interim("what's the weather"))?;
/// let _stats = handle.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct TurnPipeline {
    id: u64,
    config: TurnConfig,
    services: TurnServices,
    observers: Vec<Arc<dyn TurnObserver>>,
    strategy: Box<dyn InterruptionStrategy>,
    recognizer: Option<Arc<dyn RecognizerControl>>,
}

impl TurnPipeline {
    /// Validate `config` and create a pipeline calling into `services`.
    pub fn new(config: TurnConfig, services: TurnServices) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id: obj_id(),
            config,
            services,
            observers: Vec::new(),
            strategy: Box::new(AlwaysInterrupt),
            recognizer: None,
        })
    }

    /// Register an observer. Observers are notified in registration order.
    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replace the default [`AlwaysInterrupt`] strategy.
    pub fn with_interruption_strategy(
        mut self,
        strategy: impl InterruptionStrategy + 'static,
    ) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Reset the recognizer's transcript after every finished turn.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn RecognizerControl>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Start the session task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self) -> PipelineHandle {
        let (transcription_tx, transcription_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let registry = EpochRegistry::new();

        let session = Session {
            id: self.id,
            adapter: UtteranceStreamAdapter::from_config(&self.config),
            timer: ArmingTimer::new(cancel_token.child_token(), events_tx.clone()),
            scheduler: StageScheduler::new(),
            registry: registry.clone(),
            detector: InterruptionDetector::new(self.strategy),
            playback: PlaybackController::new(
                Arc::clone(&self.services.player),
                registry.clone(),
                cancel_token.child_token(),
                events_tx.clone(),
            ),
            config: self.config,
            services: self.services,
            recognizer: self.recognizer,
            observers: ObserverDispatcher::spawn(self.observers),
            events_tx,
            cancel_token: cancel_token.clone(),
            utterance: None,
            stats: SessionStats::default(),
        };

        tracing::debug!(session = self.id, "TurnPipeline: spawning session");
        let task = tokio::spawn(session.run(transcription_rx, events_rx));

        PipelineHandle {
            id: self.id,
            transcription_tx,
            registry,
            cancel_token,
            task,
        }
    }
}

impl std::fmt::Debug for TurnPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnPipeline")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PipelineHandle
// ---------------------------------------------------------------------------

/// Handle to a running session.
pub struct PipelineHandle {
    id: u64,
    transcription_tx: mpsc::UnboundedSender<TranscriptionUpdate>,
    registry: EpochRegistry,
    cancel_token: CancellationToken,
    task: JoinHandle<SessionStats>,
}

impl PipelineHandle {
    /// Feed a transcription update. Never blocks.
    pub fn send(&self, update: TranscriptionUpdate) -> Result<(), TurnError> {
        self.transcription_tx
            .send(update)
            .map_err(|_| TurnError::ChannelClosed)
    }

    /// The most recently opened epoch.
    pub fn current_epoch(&self) -> EpochId {
        self.registry.current()
    }

    /// Process-wide unique identifier of this session, as used in logs.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Token cancelled when the session shuts down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Stop the session and wait for it to finish.
    ///
    /// Active playback is hard-stopped and in-flight work is abandoned
    /// without notifying observers.
    pub async fn shutdown(self) -> SessionStats {
        self.cancel_token.cancel();
        self.join().await
    }

    /// Close the transcription stream and wait for the session to finish.
    ///
    /// Updates already sent are processed first. The session then stops the
    /// same way as [`shutdown`](Self::shutdown).
    pub async fn close(self) -> SessionStats {
        self.join().await
    }

    async fn join(self) -> SessionStats {
        drop(self.transcription_tx);
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(session = self.id, "TurnPipeline: session task failed: {e}");
                SessionStats::default()
            }
        }
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("id", &self.id)
            .field("current_epoch", &self.registry.current())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The in-progress utterance and the epoch it runs under.
struct UtteranceSession {
    token: EpochToken,
    text: String,
    /// Handed to every collaborator call of this epoch.
    cancel: CancellationToken,
    /// `D1` elapsed and observers were told the turn started.
    committed: bool,
}

impl UtteranceSession {
    fn epoch(&self) -> EpochId {
        self.token.id()
    }
}

struct Session {
    id: u64,
    config: TurnConfig,
    services: TurnServices,
    recognizer: Option<Arc<dyn RecognizerControl>>,
    observers: ObserverDispatcher,
    adapter: UtteranceStreamAdapter,
    timer: ArmingTimer,
    scheduler: StageScheduler,
    registry: EpochRegistry,
    detector: InterruptionDetector,
    playback: PlaybackController,
    events_tx: mpsc::UnboundedSender<CascadeEvent>,
    cancel_token: CancellationToken,
    utterance: Option<UtteranceSession>,
    stats: SessionStats,
}

impl Session {
    async fn run(
        mut self,
        mut transcriptions: mpsc::UnboundedReceiver<TranscriptionUpdate>,
        mut events: mpsc::UnboundedReceiver<CascadeEvent>,
    ) -> SessionStats {
        tracing::debug!(session = self.id, "TurnPipeline: session started");
        let cancel = self.cancel_token.clone();

        loop {
            let silence_deadline = self.adapter.silence_deadline();
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(event) = events.recv() => self.handle_event(event).await,

                update = transcriptions.recv() => match update {
                    Some(update) => self.handle_transcription(update).await,
                    None => break,
                },

                _ = silence_timer(silence_deadline) => {
                    if let Some(signal) = self.adapter.poll_silence(Instant::now()) {
                        self.handle_signal(signal).await;
                    }
                }
            }
        }

        self.teardown();
        self.observers.close().await;
        self.stats
    }

    fn current_epoch(&self) -> Option<EpochId> {
        self.utterance.as_ref().map(UtteranceSession::epoch)
    }

    fn activity(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            epoch: self.current_epoch(),
            armed: self.timer.is_armed(),
            tasks_active: self.scheduler.has_active_tasks(),
            playback_active: self.playback.is_active(),
        }
    }

    // ----- Transcription path -----

    async fn handle_transcription(&mut self, update: TranscriptionUpdate) {
        for signal in self.adapter.ingest(&update) {
            if !self.handle_signal(signal).await {
                break;
            }
        }
    }

    /// Returns `false` when the rest of the update's signals must be skipped.
    async fn handle_signal(&mut self, signal: UtteranceSignal) -> bool {
        match signal {
            UtteranceSignal::ContentGrowth { text, .. } => self.handle_growth(text).await,
            UtteranceSignal::SilenceDetected { at } => {
                self.handle_silence(at);
                true
            }
        }
    }

    async fn handle_growth(&mut self, text: String) -> bool {
        let activity = self.activity();
        // The strategy judges only what was said since the turn's own text.
        let spoken = self
            .utterance
            .as_ref()
            .and_then(|utterance| strip_spoken_prefix(&text, &utterance.text))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(text.as_str())
            .to_string();
        match self.detector.classify(&spoken, activity).await {
            GrowthClass::NewSpeech => match self.utterance.as_mut() {
                Some(utterance) => utterance.text = text,
                None => self.open_utterance(text),
            },
            GrowthClass::FalseSilence { epoch } => {
                tracing::debug!(epoch = %epoch, "TurnPipeline: speech resumed before commit");
                self.timer.disarm();
                self.scheduler.clear();
                self.retire_utterance();
                self.stats.cascades_disarmed += 1;
                self.open_utterance(text);
            }
            GrowthClass::Interruption { epoch } => self.interrupt(epoch, text).await,
            GrowthClass::Suppressed { .. } => {
                self.adapter.rewind_growth();
                return false;
            }
        }
        true
    }

    fn handle_silence(&mut self, at: Instant) {
        let Some(utterance) = &self.utterance else {
            return;
        };
        if utterance.committed || self.timer.is_armed() {
            tracing::trace!(epoch = %utterance.epoch(), "TurnPipeline: silence while cascade busy");
            return;
        }
        let epoch = utterance.epoch();
        let deadlines = CascadeDeadlines::for_utterance(&self.config, &utterance.text);
        self.timer.arm(epoch, at, deadlines);
        self.scheduler.begin(epoch, at);
    }

    // ----- Cascade events -----

    async fn handle_event(&mut self, event: CascadeEvent) {
        let epoch = event.epoch();
        if self.current_epoch() != Some(epoch) {
            tracing::trace!(epoch = %epoch, "TurnPipeline: dropping event for stale epoch");
            return;
        }
        match event {
            CascadeEvent::DeadlineElapsed { stage, .. } => self.on_deadline(epoch, stage).await,
            CascadeEvent::StageCompleted { stage, result, .. } => match result {
                Ok(()) => self.on_stage_done(epoch, stage).await,
                Err(err) => self.fail(stage, err).await,
            },
            CascadeEvent::PlaybackFinished { result, .. } => {
                if !self.playback.finish(epoch, &result) {
                    return;
                }
                match result {
                    Ok(()) => {
                        self.scheduler.on_completed(epoch, Stage::Play, Instant::now());
                        self.complete_turn(epoch).await;
                    }
                    Err(err) => self.fail(Stage::Play, err).await,
                }
            }
        }
    }

    async fn on_deadline(&mut self, epoch: EpochId, stage: Stage) {
        if stage == Stage::Play {
            self.timer.complete(epoch);
        }
        let ready = self.scheduler.on_deadline(epoch, stage, Instant::now());

        let newly_committed = match self.utterance.as_mut() {
            Some(utterance) if stage == Stage::Generate && !utterance.committed => {
                utterance.committed = true;
                true
            }
            _ => false,
        };

        self.launch(ready).await;

        if newly_committed {
            self.stats.turns_started += 1;
            tracing::info!(epoch = %epoch, "TurnPipeline: turn started");
            self.observers.notify(Notification::TurnStarted(epoch));
        }
    }

    async fn on_stage_done(&mut self, epoch: EpochId, stage: Stage) {
        if stage == Stage::Generate {
            if let Some(CachedResult::Reply(reply)) = self.registry.cached(epoch, stage) {
                self.observers.notify(Notification::ReplyReady(epoch, reply));
            }
        }
        let ready = self.scheduler.on_completed(epoch, stage, Instant::now());
        self.launch(ready).await;
    }

    // ----- Stage launching -----

    async fn launch(&mut self, stages: Vec<Stage>) {
        for stage in stages {
            if let Err(err) = self.launch_stage(stage) {
                self.fail(stage, err).await;
                return;
            }
        }
    }

    fn launch_stage(&mut self, stage: Stage) -> Result<(), TurnError> {
        let Some(utterance) = &self.utterance else {
            return Ok(());
        };
        let token = utterance.token.clone();
        let cancel = utterance.cancel.clone();
        let epoch = token.id();
        tracing::debug!(epoch = %epoch, stage = %stage, "TurnPipeline: launching stage");

        match stage {
            Stage::Generate => {
                let generator = Arc::clone(&self.services.generator);
                let text = utterance.text.clone();
                self.spawn_stage(stage, token, self.config.generation_timeout(), async move {
                    let reply = generator.generate(&text, epoch, cancel).await?;
                    if reply.trim().is_empty() {
                        return Err(TurnError::EmptyReply);
                    }
                    Ok(CachedResult::Reply(reply))
                });
            }
            Stage::Synthesize => {
                let reply = token
                    .cached(Stage::Generate)
                    .and_then(|cached| cached.as_reply().map(str::to_string))
                    .ok_or(TurnError::MissingResult {
                        stage: Stage::Generate,
                    })?;
                let synthesizer = Arc::clone(&self.services.synthesizer);
                self.spawn_stage(stage, token, self.config.synthesis_timeout(), async move {
                    let audio = synthesizer.synthesize(&reply, epoch, cancel).await?;
                    Ok(CachedResult::Audio(audio))
                });
            }
            Stage::Play => {
                let audio = token
                    .cached(Stage::Synthesize)
                    .and_then(|cached| cached.as_audio().cloned())
                    .ok_or(TurnError::MissingResult {
                        stage: Stage::Synthesize,
                    })?;
                if !self.playback.start(&token, audio) {
                    return Ok(());
                }
            }
        }
        self.stats.record_call(stage);
        Ok(())
    }

    fn spawn_stage<F>(&self, stage: Stage, token: EpochToken, limit: Duration, work: F)
    where
        F: Future<Output = Result<CachedResult, TurnError>> + Send + 'static,
    {
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let epoch = token.id();
            let result = match run_guarded(stage, limit, work).await {
                Ok(output) => {
                    if !token.publish(stage, output) {
                        tracing::debug!(
                            epoch = %epoch,
                            stage = %stage,
                            "TurnPipeline: stage finished for stale epoch, result dropped"
                        );
                        return;
                    }
                    Ok(())
                }
                Err(err) => {
                    if !token.is_current() {
                        tracing::debug!(
                            epoch = %epoch,
                            stage = %stage,
                            "TurnPipeline: stale stage failed: {err}"
                        );
                        return;
                    }
                    Err(err)
                }
            };
            if events_tx
                .send(CascadeEvent::StageCompleted {
                    epoch,
                    stage,
                    result,
                })
                .is_err()
            {
                tracing::trace!(epoch = %epoch, "TurnPipeline: session gone, completion dropped");
            }
        });
    }

    // ----- Terminal transitions -----

    fn open_utterance(&mut self, text: String) {
        let token = self.registry.begin_new_epoch();
        self.stats.epochs_opened += 1;
        tracing::debug!(epoch = %token.id(), "TurnPipeline: utterance opened");
        self.utterance = Some(UtteranceSession {
            token,
            text,
            cancel: self.cancel_token.child_token(),
            committed: false,
        });
    }

    /// Close the current epoch and cancel its collaborator calls.
    fn retire_utterance(&mut self) -> Option<UtteranceSession> {
        let utterance = self.utterance.take()?;
        utterance.cancel.cancel();
        self.registry.close(utterance.epoch());
        Some(utterance)
    }

    async fn interrupt(&mut self, epoch: EpochId, text: String) {
        // Audio first: it is the only effect the user can hear.
        self.playback.stop();
        self.timer.disarm();
        self.scheduler.cancel_all(Instant::now());
        let timings = self.scheduler.timings();
        self.scheduler.clear();
        self.retire_utterance();
        self.open_utterance(text);

        self.stats.record_outcome(TurnOutcome::Interrupted);
        tracing::info!(epoch = %epoch, "TurnPipeline: turn interrupted");
        self.observers.notify(Notification::Interrupted(epoch));
        self.emit_metrics(epoch, TurnOutcome::Interrupted, None, timings);
    }

    async fn complete_turn(&mut self, epoch: EpochId) {
        let timings = self.scheduler.timings();
        self.scheduler.clear();
        self.timer.disarm();
        self.retire_utterance();
        self.finish_utterance().await;

        self.stats.record_outcome(TurnOutcome::Completed);
        tracing::info!(epoch = %epoch, "TurnPipeline: turn completed");
        self.observers.notify(Notification::TurnCompleted(epoch));
        self.emit_metrics(epoch, TurnOutcome::Completed, None, timings);
    }

    async fn fail(&mut self, stage: Stage, err: TurnError) {
        let Some(epoch) = self.current_epoch() else {
            return;
        };
        tracing::warn!(epoch = %epoch, stage = %stage, "TurnPipeline: turn failed: {err}");

        self.playback.stop();
        self.timer.disarm();
        self.scheduler.cancel_all(Instant::now());
        let timings = self.scheduler.timings();
        self.scheduler.clear();
        self.retire_utterance();
        self.finish_utterance().await;

        self.stats.record_outcome(TurnOutcome::Failed);
        let failed_stage = err.stage().unwrap_or(stage);
        let failure = TurnFailure {
            stage: Some(failed_stage),
            reason: err.to_string(),
            fallback_utterance: self.config.fallback_utterance.clone(),
        };
        self.observers.notify(Notification::TurnFailed(epoch, failure));
        self.emit_metrics(epoch, TurnOutcome::Failed, Some(failed_stage), timings);
    }

    /// Mark the utterance text consumed and restart the recognizer.
    async fn finish_utterance(&mut self) {
        self.adapter.finish_utterance();
        if let Some(recognizer) = &self.recognizer {
            recognizer.reset().await;
            self.adapter.recognizer_reset();
            tracing::debug!(session = self.id, "TurnPipeline: recognizer reset");
        }
    }

    fn emit_metrics(
        &self,
        epoch: EpochId,
        outcome: TurnOutcome,
        failed_stage: Option<Stage>,
        timings: StageTimings,
    ) {
        if !self.observers.is_active() {
            return;
        }
        self.observers.notify(Notification::Metrics(TurnMetricsData {
            epoch,
            outcome,
            failed_stage,
            timings,
        }));
    }

    fn teardown(&mut self) {
        self.playback.stop();
        self.timer.disarm();
        self.scheduler.clear();
        if let Some(utterance) = self.retire_utterance() {
            if utterance.committed {
                tracing::info!(
                    epoch = %utterance.epoch(),
                    "TurnPipeline: abandoning turn on shutdown"
                );
            }
        }
        tracing::debug!(session = self.id, "TurnPipeline: session stopped");
    }
}

async fn silence_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
