// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Turn observers.
//!
//! Observers are registered on a [`TurnPipeline`](crate::pipeline::TurnPipeline)
//! and receive a callback for every turn lifecycle transition. Callbacks are
//! delivered by an [`ObserverDispatcher`] task, never by the coordinator.

pub mod base_observer;
pub mod dispatch;
pub mod logging;

pub use base_observer::{TurnFailure, TurnObserver};
pub use dispatch::{Notification, ObserverDispatcher};
pub use logging::LogObserver;
