//! Update-time storage diffing
//!
//! When a post's file list changes, only the keys that disappeared are
//! deleted. Content-hash keys can be listed by several posts, so a key still
//! referenced elsewhere is kept and reported as shared. Deletes run
//! concurrently and every failure is collected; callers proceed with their
//! database work whatever the outcome.

use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::db::PostStore;
use crate::services::storage::ObjectStorage;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<DeleteFailure>,
    /// Kept because another post still references them
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shared: Vec<String>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// One aggregated message for partial failures
    pub fn failure_summary(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        let keys: Vec<&str> = self.failed.iter().map(|f| f.key.as_str()).collect();
        Some(format!(
            "{} of {} file(s) could not be deleted: {}",
            self.failed.len(),
            self.failed.len() + self.deleted.len(),
            keys.join(", ")
        ))
    }
}

/// Keys in `old_keys` that are absent from `new_keys`, first-seen order, no
/// duplicates
pub fn removed_keys(old_keys: &[String], new_keys: &[String]) -> Vec<String> {
    let keep: HashSet<&str> = new_keys.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    old_keys
        .iter()
        .filter(|key| !keep.contains(key.as_str()))
        .filter(|key| seen.insert(key.as_str()))
        .cloned()
        .collect()
}

/// Delete every key in `keys` concurrently and aggregate the outcome
pub async fn delete_all(storage: &dyn ObjectStorage, keys: Vec<String>) -> DeleteReport {
    let results = join_all(keys.iter().map(|key| storage.delete(key))).await;

    let mut report = DeleteReport::default();
    for (key, result) in keys.into_iter().zip(results) {
        match result {
            Ok(()) => report.deleted.push(key),
            Err(err) => report.failed.push(DeleteFailure {
                key,
                reason: err.to_string(),
            }),
        }
    }

    if let Some(summary) = report.failure_summary() {
        tracing::warn!(failed = report.failed.len(), "{}", summary);
    }
    report
}

/// Delete `keys` unless a post other than `owner` still references them.
///
/// A failed reference check keeps the key and reports it as a failure.
pub async fn release_unreferenced(
    storage: &dyn ObjectStorage,
    refs: &dyn PostStore,
    keys: Vec<String>,
    owner: Option<Uuid>,
) -> DeleteReport {
    let checks = join_all(keys.iter().map(|key| refs.key_in_use(key.clone(), owner))).await;

    let mut releasable = Vec::with_capacity(keys.len());
    let mut shared = Vec::new();
    let mut failed = Vec::new();
    for (key, check) in keys.into_iter().zip(checks) {
        match check {
            Ok(false) => releasable.push(key),
            Ok(true) => shared.push(key),
            Err(err) => failed.push(DeleteFailure {
                key,
                reason: format!("reference check failed: {}", err),
            }),
        }
    }

    if !shared.is_empty() {
        tracing::debug!(?shared, "keeping files referenced by other posts");
    }

    let mut report = if releasable.is_empty() {
        DeleteReport::default()
    } else {
        delete_all(storage, releasable).await
    };
    if !failed.is_empty() {
        tracing::warn!(count = failed.len(), "could not check file references, keeping files");
    }
    report.failed.extend(failed);
    report.shared = shared;
    report
}

/// Delete the keys that were dropped between `old_keys` and `new_keys`
pub async fn diff_and_delete_removed(
    storage: &dyn ObjectStorage,
    refs: &dyn PostStore,
    post_id: Uuid,
    old_keys: &[String],
    new_keys: &[String],
) -> DeleteReport {
    let removed = removed_keys(old_keys, new_keys);
    if removed.is_empty() {
        return DeleteReport::default();
    }
    tracing::debug!(count = removed.len(), "deleting removed post files");
    release_unreferenced(storage, refs, removed, Some(post_id)).await
}
