// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Speculative turn-taking for real-time voice agents.
//!
//! Streaming transcription updates are turned into growth and silence
//! signals. Silence arms a debounced cascade of three deadlines that starts
//! reply generation, speech synthesis and playback speculatively, before the
//! user has clearly finished. Every piece of work is stamped with an epoch;
//! when the user keeps talking, the epoch is abandoned, playback is stopped
//! at once and late results are discarded.
//!
//! Start from [`pipeline::TurnPipeline`], or pull everything in with
//! [`prelude`].

pub mod config;
pub mod error;
pub mod frames;
pub mod metrics;
pub mod observers;
pub mod pipeline;
pub mod prelude;
pub mod services;
pub mod tests;
pub mod turns;
pub mod utils;
