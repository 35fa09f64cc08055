// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Session orchestration.
//!
//! This module provides [`TurnPipeline`], which wires the turn components
//! into one single-owner session task, and [`PipelineHandle`] for feeding it
//! transcriptions and shutting it down.

pub mod session;
pub use session::{PipelineHandle, TurnPipeline};
