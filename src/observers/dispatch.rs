// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Off-coordinator observer delivery.
//!
//! The session coordinator never awaits an observer. Notifications are queued
//! on an unbounded channel and delivered by one background task, in the
//! order they were raised, to every observer in registration order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{TurnFailure, TurnObserver};
use crate::frames::EpochId;
use crate::metrics::TurnMetricsData;

/// One queued observer callback.
#[derive(Debug, Clone)]
pub enum Notification {
    TurnStarted(EpochId),
    ReplyReady(EpochId, String),
    Interrupted(EpochId),
    TurnCompleted(EpochId),
    TurnFailed(EpochId, TurnFailure),
    Metrics(TurnMetricsData),
}

impl Notification {
    async fn deliver(&self, observer: &dyn TurnObserver) {
        match self {
            Notification::TurnStarted(epoch) => observer.on_turn_started(*epoch).await,
            Notification::ReplyReady(epoch, text) => observer.on_reply_ready(*epoch, text).await,
            Notification::Interrupted(epoch) => observer.on_interrupted(*epoch).await,
            Notification::TurnCompleted(epoch) => observer.on_turn_completed(*epoch).await,
            Notification::TurnFailed(epoch, failure) => {
                observer.on_turn_failed(*epoch, failure).await
            }
            Notification::Metrics(data) => observer.on_metrics(data).await,
        }
    }
}

/// Queues notifications for a background delivery task.
#[derive(Debug)]
pub struct ObserverDispatcher {
    tx: Option<mpsc::UnboundedSender<Notification>>,
    task: Option<JoinHandle<()>>,
}

impl ObserverDispatcher {
    /// Start the delivery task. With no observers nothing is spawned and
    /// notifications are discarded.
    pub fn spawn(observers: Vec<Arc<dyn TurnObserver>>) -> Self {
        if observers.is_empty() {
            return Self {
                tx: None,
                task: None,
            };
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        let task = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                for observer in &observers {
                    notification.deliver(observer.as_ref()).await;
                }
            }
        });
        Self {
            tx: Some(tx),
            task: Some(task),
        }
    }

    /// Whether any observer is registered.
    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue a notification. Never waits on an observer.
    pub fn notify(&self, notification: Notification) {
        if let Some(tx) = &self.tx {
            if tx.send(notification).is_err() {
                tracing::warn!("ObserverDispatcher: delivery task gone, notification dropped");
            }
        }
    }

    /// Deliver everything already queued, then stop the delivery task.
    pub async fn close(&mut self) {
        self.tx = None;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("ObserverDispatcher: delivery task failed: {e}");
            }
        }
    }
}
