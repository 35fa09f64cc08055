// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Small shared helpers.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;

use crate::error::TurnError;
use crate::frames::Stage;

/// Global monotonically-increasing object ID counter.
static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a process-wide unique object identifier.
pub fn obj_id() -> u64 {
    OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a collaborator call with a time ceiling, converting panics and
/// timeouts into [`TurnError`]s attributed to `stage`.
pub async fn run_guarded<T, F>(stage: Stage, limit: Duration, fut: F) -> Result<T, TurnError>
where
    F: Future<Output = Result<T, TurnError>>,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(fut).catch_unwind()).await {
        Err(_) => Err(TurnError::Timeout {
            stage,
            after: limit,
        }),
        Ok(Err(payload)) => Err(TurnError::CollaboratorPanicked {
            stage,
            message: panic_message(payload.as_ref()),
        }),
        Ok(Ok(result)) => result,
    }
}

/// Number of whitespace-separated words in `text`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Strip `prefix` from the start of `text`, ignoring case and punctuation.
///
/// Only alphanumeric characters are compared, so recognizer revisions such
/// as "what time is it" -> "What time is it?" still match. The prefix must
/// end on a word boundary of `text`. Returns what follows, without leading
/// punctuation or whitespace, or `None` when `text` does not start with
/// `prefix`.
pub fn strip_spoken_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut wanted = prefix
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .peekable();
    let mut end = 0;
    for (i, c) in text.char_indices() {
        if wanted.peek().is_none() {
            break;
        }
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                if wanted.next() != Some(lower) {
                    return None;
                }
            }
        }
        end = i + c.len_utf8();
    }
    if wanted.peek().is_some() {
        return None;
    }
    let rest = &text[end..];
    if rest.starts_with(char::is_alphanumeric) {
        return None;
    }
    Some(rest.trim_start_matches(|c: char| !c.is_alphanumeric()))
}
