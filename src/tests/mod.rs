// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Testing utilities for turn pipeline components.
//!
//! Scripted collaborators that record every call with a
//! [`tokio::time::Instant`] timestamp, a recording observer, and
//! [`play_script`] to feed timed transcription updates into a running
//! session. Pair them with `#[tokio::test(start_paused = true)]` to assert
//! exact stage timings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::TurnError;
use crate::frames::{AudioClip, EpochId, TranscriptionUpdate};
use crate::metrics::TurnMetricsData;
use crate::observers::{TurnFailure, TurnObserver};
use crate::pipeline::PipelineHandle;
use crate::services::{
    AudioPlayer, RecognizerControl, ReplyGenerator, SpeechSynthesizer, TurnServices,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Scripted outcomes
// ---------------------------------------------------------------------------

/// What a scripted collaborator does once its latency has elapsed.
#[derive(Debug, Clone)]
pub enum Scripted<T> {
    Succeed(T),
    Fail(String),
    Panic(String),
    /// Never finishes unless cancelled.
    Hang,
}

/// A recorded collaborator invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub epoch: EpochId,
    pub text: String,
    pub at: Instant,
}

/// Wait out `latency`, returning `false` if `cancel` fired first.
async fn wait_latency(latency: Duration, cancel: &CancellationToken) -> bool {
    if latency.is_zero() {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(latency) => true,
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// [`ReplyGenerator`] with a fixed latency and outcome.
pub struct ScriptedGenerator {
    latency: Duration,
    outcome: Scripted<String>,
    calls: Mutex<Vec<RecordedCall>>,
    cancellations: AtomicU64,
}

impl ScriptedGenerator {
    pub fn new(outcome: Scripted<String>) -> Self {
        Self {
            latency: Duration::ZERO,
            outcome,
            calls: Mutex::new(Vec::new()),
            cancellations: AtomicU64::new(0),
        }
    }

    pub fn replying(reply: impl Into<String>) -> Self {
        Self::new(Scripted::Succeed(reply.into()))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Calls that observed their cancellation token.
    pub fn cancellations(&self) -> u64 {
        self.cancellations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplyGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        text: &str,
        epoch: EpochId,
        cancel: CancellationToken,
    ) -> Result<String, TurnError> {
        lock(&self.calls).push(RecordedCall {
            epoch,
            text: text.to_string(),
            at: Instant::now(),
        });
        if !wait_latency(self.latency, &cancel).await {
            self.cancellations.fetch_add(1, Ordering::SeqCst);
            return Err(TurnError::Generation("cancelled".into()));
        }
        match &self.outcome {
            Scripted::Succeed(reply) => Ok(reply.clone()),
            Scripted::Fail(message) => Err(TurnError::Generation(message.clone())),
            Scripted::Panic(message) => panic!("{message}"),
            Scripted::Hang => {
                cancel.cancelled().await;
                self.cancellations.fetch_add(1, Ordering::SeqCst);
                Err(TurnError::Generation("cancelled".into()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedSynthesizer
// ---------------------------------------------------------------------------

/// Bytes per second of 16kHz mono PCM16.
const BYTES_PER_SECOND: u64 = 32_000;

/// [`SpeechSynthesizer`] producing silent clips of a fixed length.
pub struct ScriptedSynthesizer {
    latency: Duration,
    outcome: Scripted<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedSynthesizer {
    pub fn new(outcome: Scripted<Duration>) -> Self {
        Self {
            latency: Duration::ZERO,
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Succeeds with a clip that plays for `clip_length`.
    pub fn producing(clip_length: Duration) -> Self {
        Self::new(Scripted::Succeed(clip_length))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

/// A silent 16kHz mono clip of the given length.
pub fn silent_clip(length: Duration) -> AudioClip {
    let bytes = (length.as_millis() as u64 * BYTES_PER_SECOND / 1000) as usize;
    AudioClip::new(vec![0u8; bytes], 16_000, 1)
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        epoch: EpochId,
        cancel: CancellationToken,
    ) -> Result<AudioClip, TurnError> {
        lock(&self.calls).push(RecordedCall {
            epoch,
            text: text.to_string(),
            at: Instant::now(),
        });
        if !wait_latency(self.latency, &cancel).await {
            return Err(TurnError::Synthesis("cancelled".into()));
        }
        match &self.outcome {
            Scripted::Succeed(length) => Ok(silent_clip(*length)),
            Scripted::Fail(message) => Err(TurnError::Synthesis(message.clone())),
            Scripted::Panic(message) => panic!("{message}"),
            Scripted::Hang => {
                cancel.cancelled().await;
                Err(TurnError::Synthesis("cancelled".into()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingPlayer
// ---------------------------------------------------------------------------

/// A recorded playback start.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayCall {
    pub epoch: EpochId,
    pub clip_length: Duration,
    pub at: Instant,
}

/// [`AudioPlayer`] that "plays" for the clip's duration.
#[derive(Default)]
pub struct RecordingPlayer {
    failure: Option<String>,
    plays: Mutex<Vec<PlayCall>>,
    stops: Mutex<Vec<Instant>>,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every playback halfway through the clip.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn plays(&self) -> Vec<PlayCall> {
        lock(&self.plays).clone()
    }

    pub fn play_count(&self) -> usize {
        lock(&self.plays).len()
    }

    /// Times at which `stop()` was called.
    pub fn stops(&self) -> Vec<Instant> {
        lock(&self.stops).clone()
    }
}

#[async_trait]
impl AudioPlayer for RecordingPlayer {
    async fn play(&self, audio: AudioClip, epoch: EpochId) -> Result<(), TurnError> {
        let clip_length = audio.duration();
        lock(&self.plays).push(PlayCall {
            epoch,
            clip_length,
            at: Instant::now(),
        });
        match &self.failure {
            Some(message) => {
                tokio::time::sleep(clip_length / 2).await;
                Err(TurnError::Playback(message.clone()))
            }
            None => {
                tokio::time::sleep(clip_length).await;
                Ok(())
            }
        }
    }

    fn stop(&self) {
        lock(&self.stops).push(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// RecordingRecognizer
// ---------------------------------------------------------------------------

/// [`RecognizerControl`] that counts resets.
#[derive(Debug, Default)]
pub struct RecordingRecognizer {
    resets: AtomicU64,
}

impl RecordingRecognizer {
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognizerControl for RecordingRecognizer {
    async fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// An observer notification.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Started(EpochId),
    ReplyReady(EpochId, String),
    Interrupted(EpochId),
    Completed(EpochId),
    Failed(EpochId, TurnFailure),
    Metrics(TurnMetricsData),
}

impl TurnEvent {
    pub fn epoch(&self) -> EpochId {
        match self {
            Self::Started(epoch)
            | Self::ReplyReady(epoch, _)
            | Self::Interrupted(epoch)
            | Self::Completed(epoch)
            | Self::Failed(epoch, _) => *epoch,
            Self::Metrics(data) => data.epoch,
        }
    }

    /// Whether this event ends a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Interrupted(_) | Self::Completed(_) | Self::Failed(_, _)
        )
    }
}

/// Observer that records every notification with its timestamp.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(Instant, TurnEvent)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: TurnEvent) {
        lock(&self.events).push((Instant::now(), event));
    }

    /// All notifications, metrics included.
    pub fn events(&self) -> Vec<TurnEvent> {
        lock(&self.events).iter().map(|(_, e)| e.clone()).collect()
    }

    /// Lifecycle notifications only (no metrics).
    pub fn lifecycle(&self) -> Vec<TurnEvent> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, TurnEvent::Metrics(_)))
            .collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, TurnEvent)> {
        lock(&self.events).clone()
    }

    pub fn metrics(&self) -> Vec<TurnMetricsData> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TurnEvent::Metrics(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    /// Number of events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&TurnEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|(_, e)| predicate(e)).count()
    }
}

#[async_trait]
impl TurnObserver for RecordingObserver {
    async fn on_turn_started(&self, epoch: EpochId) {
        self.record(TurnEvent::Started(epoch));
    }

    async fn on_reply_ready(&self, epoch: EpochId, text: &str) {
        self.record(TurnEvent::ReplyReady(epoch, text.to_string()));
    }

    async fn on_interrupted(&self, epoch: EpochId) {
        self.record(TurnEvent::Interrupted(epoch));
    }

    async fn on_turn_completed(&self, epoch: EpochId) {
        self.record(TurnEvent::Completed(epoch));
    }

    async fn on_turn_failed(&self, epoch: EpochId, failure: &TurnFailure) {
        self.record(TurnEvent::Failed(epoch, failure.clone()));
    }

    async fn on_metrics(&self, metrics: &TurnMetricsData) {
        self.record(TurnEvent::Metrics(metrics.clone()));
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Scripted collaborators plus the [`TurnServices`] wrapping them.
pub struct TestServices {
    pub generator: Arc<ScriptedGenerator>,
    pub synthesizer: Arc<ScriptedSynthesizer>,
    pub player: Arc<RecordingPlayer>,
}

impl TestServices {
    pub fn new(
        generator: ScriptedGenerator,
        synthesizer: ScriptedSynthesizer,
        player: RecordingPlayer,
    ) -> Self {
        Self {
            generator: Arc::new(generator),
            synthesizer: Arc::new(synthesizer),
            player: Arc::new(player),
        }
    }

    /// Instant collaborators and a one second reply clip.
    pub fn instant(reply: &str) -> Self {
        Self::new(
            ScriptedGenerator::replying(reply),
            ScriptedSynthesizer::producing(Duration::from_secs(1)),
            RecordingPlayer::new(),
        )
    }

    pub fn services(&self) -> TurnServices {
        TurnServices::new(
            self.generator.clone(),
            self.synthesizer.clone(),
            self.player.clone(),
        )
    }
}

/// One timed transcription update.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub at_ms: u64,
    pub text: String,
    pub is_final: bool,
}

impl ScriptStep {
    pub fn interim(at_ms: u64, text: &str) -> Self {
        Self {
            at_ms,
            text: text.to_string(),
            is_final: false,
        }
    }

    pub fn final_text(at_ms: u64, text: &str) -> Self {
        Self {
            at_ms,
            text: text.to_string(),
            is_final: true,
        }
    }
}

/// Send each step to `handle` at `start + at_ms`.
pub async fn play_script(
    handle: &PipelineHandle,
    start: Instant,
    steps: &[ScriptStep],
) -> Result<(), TurnError> {
    for step in steps {
        tokio::time::sleep_until(start + Duration::from_millis(step.at_ms)).await;
        let update = if step.is_final {
            TranscriptionUpdate::final_text(step.text.clone())
        } else {
            TranscriptionUpdate::interim(step.text.clone())
        };
        handle.send(update)?;
    }
    Ok(())
}

/// Milliseconds between `start` and `at`.
pub fn offset_ms(start: Instant, at: Instant) -> u64 {
    at.saturating_duration_since(start).as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_scripted_generator_records_and_waits() {
        let generator = ScriptedGenerator::replying("sure").with_latency(Duration::from_millis(300));
        let start = Instant::now();
        let reply = generator
            .generate("hi", EpochId::new(1), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "sure");
        assert_eq!(offset_ms(start, Instant::now()), 300);
        assert_eq!(generator.calls()[0].text, "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_generator_honours_cancel() {
        let generator = ScriptedGenerator::new(Scripted::Hang);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = generator.generate("hi", EpochId::new(1), cancel).await;
        assert!(result.is_err());
        assert_eq!(generator.cancellations(), 1);
    }

    #[test]
    fn test_silent_clip_length() {
        let clip = silent_clip(Duration::from_millis(1500));
        assert_eq!(clip.duration(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_player() {
        let player = RecordingPlayer::new();
        let start = Instant::now();
        player
            .play(silent_clip(Duration::from_millis(400)), EpochId::new(2))
            .await
            .unwrap();
        assert_eq!(offset_ms(start, Instant::now()), 400);
        player.stop();
        assert_eq!(player.play_count(), 1);
        assert_eq!(player.stops().len(), 1);
    }

    #[tokio::test]
    async fn test_recording_observer_filters() {
        let observer = RecordingObserver::new();
        observer.on_turn_started(EpochId::new(1)).await;
        observer
            .on_metrics(&TurnMetricsData {
                epoch: EpochId::new(1),
                outcome: crate::metrics::TurnOutcome::Completed,
                failed_stage: None,
                timings: Default::default(),
            })
            .await;
        observer.on_turn_completed(EpochId::new(1)).await;
        assert_eq!(observer.events().len(), 3);
        assert_eq!(
            observer.lifecycle(),
            vec![
                TurnEvent::Started(EpochId::new(1)),
                TurnEvent::Completed(EpochId::new(1))
            ]
        );
        assert_eq!(observer.metrics().len(), 1);
        assert_eq!(observer.count(TurnEvent::is_terminal), 1);
    }
}
