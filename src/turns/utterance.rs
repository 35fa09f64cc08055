// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Utterance stream adapter.
//!
//! Speech recognizers report the cumulative transcript of the current
//! utterance and frequently re-emit revised versions of text they already
//! reported ("hello" -> "Hello." -> "Hello"). The adapter turns that noisy
//! stream into two clean signals:
//!
//! - [`UtteranceSignal::ContentGrowth`] when the text grows by more than the
//!   configured threshold.
//! - [`UtteranceSignal::SilenceDetected`] when no qualifying growth has
//!   arrived for the configured gap, or immediately when a final transcript
//!   carries growth.
//!
//! Same-length, shorter and below-threshold updates never produce a signal,
//! regardless of `is_final`.
//!
//! Text already consumed by a finished turn is remembered and stripped from
//! later cumulative updates, so a recognizer that keeps accumulating across
//! turns never leaks a previous question into the next one. The match ignores
//! case and punctuation: a late "What time is it?" after "what time is it"
//! was answered is a refinement, not new speech.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::TurnConfig;
use crate::frames::{TranscriptionUpdate, UtteranceSignal};
use crate::utils::strip_spoken_prefix;

/// Normalizes transcription updates into growth / silence signals.
#[derive(Debug)]
pub struct UtteranceStreamAdapter {
    growth_threshold: usize,
    silence_gap: Duration,
    /// Character length of the utterance text at the last qualifying growth.
    last_len: usize,
    /// Utterance text at the last qualifying growth.
    last_text: String,
    /// Cumulative text attributed to already finished turns.
    consumed_prefix: Option<String>,
    /// Set after growth until the matching silence is reported.
    silence_due: Option<Instant>,
    /// Length and text before the most recent growth, for
    /// [`Self::rewind_growth`].
    previous_len: usize,
    previous_text: String,
}

impl UtteranceStreamAdapter {
    pub fn new(growth_threshold: usize, silence_gap: Duration) -> Self {
        Self {
            growth_threshold,
            silence_gap,
            last_len: 0,
            last_text: String::new(),
            consumed_prefix: None,
            silence_due: None,
            previous_len: 0,
            previous_text: String::new(),
        }
    }

    pub fn from_config(config: &TurnConfig) -> Self {
        Self::new(config.growth_threshold_chars, config.silence_gap())
    }

    /// Feed one transcription update.
    ///
    /// Returns zero, one or two signals. A growth signal may be followed by an
    /// immediate silence signal when the update is final or the configured
    /// gap is zero.
    pub fn ingest(&mut self, update: &TranscriptionUpdate) -> Vec<UtteranceSignal> {
        let trimmed = update.text.trim();
        if trimmed.is_empty() {
            tracing::debug!("UtteranceStreamAdapter: dropping empty transcription update");
            return Vec::new();
        }

        let text = self.strip_consumed(trimmed);
        let len = text.chars().count();
        if len <= self.last_len + self.growth_threshold {
            tracing::trace!(
                len,
                last_len = self.last_len,
                is_final = update.is_final,
                "UtteranceStreamAdapter: refinement ignored"
            );
            return Vec::new();
        }

        self.previous_len = self.last_len;
        self.previous_text = std::mem::replace(&mut self.last_text, text.to_string());
        self.last_len = len;
        let mut signals = vec![UtteranceSignal::ContentGrowth {
            text: text.to_string(),
            at: update.at,
        }];

        if update.is_final || self.silence_gap.is_zero() {
            self.silence_due = None;
            signals.push(UtteranceSignal::SilenceDetected { at: update.at });
        } else {
            self.silence_due = Some(update.at + self.silence_gap);
        }
        signals
    }

    /// When the pending silence signal becomes due, if any.
    pub fn silence_deadline(&self) -> Option<Instant> {
        self.silence_due
    }

    /// Emit the pending silence signal if its deadline has passed.
    pub fn poll_silence(&mut self, now: Instant) -> Option<UtteranceSignal> {
        match self.silence_due {
            Some(due) if now >= due => {
                self.silence_due = None;
                Some(UtteranceSignal::SilenceDetected { at: due })
            }
            _ => None,
        }
    }

    /// Undo the most recent growth so the same text is re-evaluated later.
    ///
    /// Used when growth was observed but deliberately not acted upon.
    /// Rewound text is not treated as consumed by [`Self::finish_utterance`].
    pub fn rewind_growth(&mut self) {
        self.last_len = self.previous_len;
        self.last_text = std::mem::take(&mut self.previous_text);
        self.silence_due = None;
    }

    /// Forget the current utterance after its turn finished.
    ///
    /// The text seen so far is treated as consumed: later updates that still
    /// start with it are measured from what follows.
    pub fn finish_utterance(&mut self) {
        if !self.last_text.is_empty() {
            let consumed = match self.consumed_prefix.take() {
                Some(mut prefix) => {
                    prefix.push(' ');
                    prefix.push_str(&self.last_text);
                    prefix
                }
                None => std::mem::take(&mut self.last_text),
            };
            self.consumed_prefix = Some(consumed);
        }
        self.last_text.clear();
        self.last_len = 0;
        self.previous_len = 0;
        self.previous_text.clear();
        self.silence_due = None;
    }

    /// Drop the consumed prefix after the recognizer restarted its transcript.
    pub fn recognizer_reset(&mut self) {
        self.consumed_prefix = None;
    }

    /// Character length of the utterance text at the last growth.
    pub fn last_len(&self) -> usize {
        self.last_len
    }

    fn strip_consumed<'a>(&self, text: &'a str) -> &'a str {
        match &self.consumed_prefix {
            Some(prefix) => strip_spoken_prefix(text, prefix).unwrap_or(text),
            None => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(threshold: usize) -> UtteranceStreamAdapter {
        UtteranceStreamAdapter::new(threshold, Duration::ZERO)
    }

    fn growth_text(signals: &[UtteranceSignal]) -> Option<&str> {
        signals.iter().find_map(|s| match s {
            UtteranceSignal::ContentGrowth { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    // -- growth threshold tests --

    #[test]
    fn test_growth_above_threshold_emits_growth_and_silence() {
        let mut adapter = adapter(2);
        let update = TranscriptionUpdate::interim("hello");
        let signals = adapter.ingest(&update);
        assert_eq!(
            signals,
            vec![
                UtteranceSignal::ContentGrowth {
                    text: "hello".into(),
                    at: update.at
                },
                UtteranceSignal::SilenceDetected { at: update.at },
            ]
        );
    }

    #[test]
    fn test_growth_at_threshold_is_ignored() {
        let mut adapter = adapter(2);
        assert!(adapter.ingest(&TranscriptionUpdate::interim("he")).is_empty());
        assert_eq!(adapter.last_len(), 0);

        assert!(!adapter.ingest(&TranscriptionUpdate::interim("hey")).is_empty());
        // 3 -> 5 chars is growth of exactly the threshold.
        assert!(adapter.ingest(&TranscriptionUpdate::interim("hey y")).is_empty());
        assert!(!adapter.ingest(&TranscriptionUpdate::interim("hey yo")).is_empty());
    }

    #[test]
    fn test_zero_threshold_counts_every_new_char() {
        let mut adapter = adapter(0);
        assert_eq!(growth_text(&adapter.ingest(&TranscriptionUpdate::interim("he"))), Some("he"));
        assert_eq!(
            growth_text(&adapter.ingest(&TranscriptionUpdate::interim("hell"))),
            Some("hell")
        );
        assert!(adapter.ingest(&TranscriptionUpdate::interim("Hell")).is_empty());
    }

    // -- refinement tests --

    #[test]
    fn test_refinements_never_signal() {
        let mut adapter = adapter(2);
        adapter.ingest(&TranscriptionUpdate::interim("what is the weather"));
        for revision in [
            "what is the weather",
            "What is the weather",
            "What is the weather?",
            "what is the",
            "what's the weather",
        ] {
            assert!(
                adapter.ingest(&TranscriptionUpdate::interim(revision)).is_empty(),
                "revision {revision:?} should not signal"
            );
        }
    }

    #[test]
    fn test_final_without_growth_is_ignored() {
        let mut adapter = adapter(2);
        adapter.ingest(&TranscriptionUpdate::interim("turn on the lights"));
        assert!(adapter
            .ingest(&TranscriptionUpdate::final_text("Turn on the lights."))
            .is_empty());
    }

    #[test]
    fn test_empty_updates_dropped() {
        let mut adapter = adapter(0);
        assert!(adapter.ingest(&TranscriptionUpdate::interim("")).is_empty());
        assert!(adapter.ingest(&TranscriptionUpdate::final_text("   ")).is_empty());
        assert_eq!(adapter.last_len(), 0);
        assert!(adapter.silence_deadline().is_none());
    }

    // -- silence gap tests --

    #[tokio::test(start_paused = true)]
    async fn test_silence_after_gap() {
        let mut adapter = UtteranceStreamAdapter::new(2, Duration::from_millis(300));
        let update = TranscriptionUpdate::interim("good morning");
        let signals = adapter.ingest(&update);
        assert_eq!(signals.len(), 1);
        let due = adapter.silence_deadline().unwrap();
        assert_eq!(due, update.at + Duration::from_millis(300));

        assert!(adapter.poll_silence(update.at + Duration::from_millis(299)).is_none());
        assert_eq!(
            adapter.poll_silence(due),
            Some(UtteranceSignal::SilenceDetected { at: due })
        );
        assert!(adapter.silence_deadline().is_none());
        assert!(adapter.poll_silence(due).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_growth_pushes_silence_deadline_back() {
        let mut adapter = UtteranceStreamAdapter::new(2, Duration::from_millis(300));
        adapter.ingest(&TranscriptionUpdate::interim("good"));
        tokio::time::advance(Duration::from_millis(200)).await;
        let later = TranscriptionUpdate::interim("good morning");
        adapter.ingest(&later);
        assert_eq!(
            adapter.silence_deadline(),
            Some(later.at + Duration::from_millis(300))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_growth_reports_silence_immediately() {
        let mut adapter = UtteranceStreamAdapter::new(2, Duration::from_millis(800));
        let update = TranscriptionUpdate::final_text("see you tomorrow");
        let signals = adapter.ingest(&update);
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1], UtteranceSignal::SilenceDetected { at: update.at });
        assert!(adapter.silence_deadline().is_none());
    }

    // -- turn boundary tests --

    #[test]
    fn test_finish_strips_consumed_text() {
        let mut adapter = adapter(2);
        adapter.ingest(&TranscriptionUpdate::interim("what time is it"));
        adapter.finish_utterance();

        // Recognizer without reset keeps accumulating.
        assert!(adapter
            .ingest(&TranscriptionUpdate::interim("what time is it"))
            .is_empty());
        let signals = adapter.ingest(&TranscriptionUpdate::interim("what time is it and the date"));
        assert_eq!(growth_text(&signals), Some("and the date"));
    }

    #[test]
    fn test_finish_handles_restarted_recognizer() {
        let mut adapter = adapter(2);
        adapter.ingest(&TranscriptionUpdate::interim("what time is it"));
        adapter.finish_utterance();
        adapter.recognizer_reset();

        let signals = adapter.ingest(&TranscriptionUpdate::interim("thanks"));
        assert_eq!(growth_text(&signals), Some("thanks"));
    }

    #[test]
    fn test_consumed_prefix_accumulates_across_turns() {
        let mut adapter = adapter(2);
        adapter.ingest(&TranscriptionUpdate::interim("first question"));
        adapter.finish_utterance();
        adapter.ingest(&TranscriptionUpdate::interim("first question second one"));
        adapter.finish_utterance();

        let signals =
            adapter.ingest(&TranscriptionUpdate::interim("first question second one third"));
        assert_eq!(growth_text(&signals), Some("third"));
    }

    #[test]
    fn test_rewind_growth_reevaluates_text() {
        let mut adapter = adapter(2);
        adapter.ingest(&TranscriptionUpdate::interim("stop"));
        adapter.ingest(&TranscriptionUpdate::interim("stop uh huh"));
        adapter.rewind_growth();
        assert_eq!(adapter.last_len(), 4);
        // The same text qualifies again once rewound.
        assert!(!adapter
            .ingest(&TranscriptionUpdate::interim("stop uh huh"))
            .is_empty());
    }

    #[test]
    fn test_late_refinement_of_consumed_text_is_ignored() {
        let mut adapter = adapter(2);
        adapter.ingest(&TranscriptionUpdate::interim("what time is it"));
        adapter.finish_utterance();

        assert!(adapter
            .ingest(&TranscriptionUpdate::final_text("What time is it?"))
            .is_empty());
        assert_eq!(adapter.last_len(), 0);
        let signals =
            adapter.ingest(&TranscriptionUpdate::interim("What time is it? And the date"));
        assert_eq!(growth_text(&signals), Some("And the date"));
    }

    #[test]
    fn test_rewound_text_is_not_consumed() {
        let mut adapter = adapter(2);
        adapter.ingest(&TranscriptionUpdate::interim("hello"));
        adapter.ingest(&TranscriptionUpdate::interim("hello ok"));
        adapter.rewind_growth();
        adapter.finish_utterance();

        let signals = adapter.ingest(&TranscriptionUpdate::interim("hello ok what now"));
        assert_eq!(growth_text(&signals), Some("ok what now"));
    }
}
