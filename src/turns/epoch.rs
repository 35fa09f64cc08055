// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Epoch registry: the current-epoch pointer and the cached-results table.
//!
//! Every unit of speculative work is tagged with an [`EpochToken`]. Opening a
//! new epoch evicts everything cached for older epochs, and a token only
//! publishes while its epoch is current and still open. The check and the
//! write happen under one lock, so a task can never publish across an epoch
//! boundary.
//!
//! The registry is cheap to clone; clones share state.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::frames::{AudioClip, EpochId, Stage};

// ---------------------------------------------------------------------------
// CachedResult
// ---------------------------------------------------------------------------

/// Output of a finished stage, kept so later stages never redo earlier work.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResult {
    Reply(String),
    Audio(AudioClip),
}

impl CachedResult {
    pub fn as_reply(&self) -> Option<&str> {
        match self {
            Self::Reply(text) => Some(text),
            Self::Audio(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioClip> {
        match self {
            Self::Audio(clip) => Some(clip),
            Self::Reply(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// EpochRegistry
// ---------------------------------------------------------------------------

struct RegistryState {
    current: EpochId,
    /// Set once the current epoch is delivered, cancelled or failed.
    closed: bool,
    cache: HashMap<(EpochId, Stage), CachedResult>,
}

/// Shared current-epoch pointer plus the per-epoch result cache.
#[derive(Clone)]
pub struct EpochRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl EpochRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                current: EpochId::NONE,
                closed: true,
                cache: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the next epoch, evicting every cached result of older epochs.
    ///
    /// The previous epoch is implicitly closed; its tokens stop publishing
    /// from this point on.
    pub fn begin_new_epoch(&self) -> EpochToken {
        let mut state = self.lock();
        let previous = state.current;
        state.current = previous.next();
        state.closed = false;
        let evicted = state.cache.len();
        state.cache.clear();
        let id = state.current;
        drop(state);

        tracing::debug!(
            epoch = %id,
            previous = %previous,
            evicted,
            "EpochRegistry: opened new epoch"
        );
        EpochToken {
            id,
            registry: self.clone(),
        }
    }

    /// Mark `epoch` terminal and evict its cached results.
    ///
    /// The current pointer does not move. Returns `false` if `epoch` is not
    /// the current open epoch.
    pub fn close(&self, epoch: EpochId) -> bool {
        let mut state = self.lock();
        if state.current != epoch || state.closed {
            return false;
        }
        state.closed = true;
        state.cache.retain(|(e, _), _| *e != epoch);
        tracing::trace!(epoch = %epoch, "EpochRegistry: closed epoch");
        true
    }

    /// The most recently opened epoch (open or closed).
    pub fn current(&self) -> EpochId {
        self.lock().current
    }

    /// Whether `epoch` is current and still accepts results.
    pub fn is_live(&self, epoch: EpochId) -> bool {
        let state = self.lock();
        state.current == epoch && !state.closed
    }

    /// Cached result of `stage` for `epoch`, if one was published.
    pub fn cached(&self, epoch: EpochId, stage: Stage) -> Option<CachedResult> {
        self.lock().cache.get(&(epoch, stage)).cloned()
    }

    /// Number of cached entries across all epochs.
    pub fn cached_len(&self) -> usize {
        self.lock().cache.len()
    }

    fn publish(&self, epoch: EpochId, stage: Stage, result: CachedResult) -> bool {
        let mut state = self.lock();
        if state.current != epoch || state.closed {
            tracing::debug!(
                epoch = %epoch,
                current = %state.current,
                stage = %stage,
                "EpochRegistry: dropping stale result"
            );
            return false;
        }
        state.cache.insert((epoch, stage), result);
        true
    }
}

impl Default for EpochRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EpochRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("EpochRegistry")
            .field("current", &state.current)
            .field("closed", &state.closed)
            .field("cached", &state.cache.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EpochToken
// ---------------------------------------------------------------------------

/// Capability carried by every speculative task of one epoch.
#[derive(Clone)]
pub struct EpochToken {
    id: EpochId,
    registry: EpochRegistry,
}

impl EpochToken {
    pub fn id(&self) -> EpochId {
        self.id
    }

    /// Whether this token's epoch is current and open.
    pub fn is_current(&self) -> bool {
        self.registry.is_live(self.id)
    }

    /// Store `result` for `stage` if the epoch is still current.
    ///
    /// The staleness check and the write are one atomic step. Returns `false`
    /// and drops the result when the epoch has been superseded or closed.
    pub fn publish(&self, stage: Stage, result: CachedResult) -> bool {
        self.registry.publish(self.id, stage, result)
    }

    /// Cached result of `stage` for this epoch.
    pub fn cached(&self, stage: Stage) -> Option<CachedResult> {
        self.registry.cached(self.id, stage)
    }
}

impl fmt::Debug for EpochToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EpochToken").field(&self.id).finish()
    }
}
