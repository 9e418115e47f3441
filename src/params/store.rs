// SPDX-License-Identifier: GPL-3.0-only

//! Shared parameter state
//!
//! The UI thread edits the vector; the render and capture threads read
//! immutable snapshots. Writers replace the whole `Arc` under a short write
//! lock, so a reader holding a snapshot is never affected by later edits.

use super::presets::CapturePreset;
use super::vector::ParameterVector;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::trace;

#[derive(Debug)]
struct StoreInner {
    current: RwLock<Arc<ParameterVector>>,
    revision: AtomicU64,
}

/// Cloneable handle to the current parameter vector
#[derive(Debug, Clone)]
pub struct ParameterStore {
    inner: Arc<StoreInner>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new(ParameterVector::default())
    }
}

impl ParameterStore {
    pub fn new(initial: ParameterVector) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                current: RwLock::new(Arc::new(initial)),
                revision: AtomicU64::new(0),
            }),
        }
    }

    /// Copy-on-read snapshot of the current vector
    pub fn snapshot(&self) -> Arc<ParameterVector> {
        let guard = self.inner.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Revision counter; increases on every committed edit
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::Acquire)
    }

    /// Edit a copy of the current vector and publish it
    ///
    /// Returns the new revision.
    pub fn update<F>(&self, edit: F) -> u64
    where
        F: FnOnce(&mut ParameterVector),
    {
        let mut guard = self.inner.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = ParameterVector::clone(&guard);
        edit(&mut next);
        *guard = Arc::new(next);
        let revision = self.inner.revision.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(revision, "Parameter vector updated");
        revision
    }

    /// Replace the whole vector (e.g. after loading a bundle)
    pub fn replace(&self, vector: ParameterVector) -> u64 {
        self.update(|current| *current = vector)
    }

    pub fn apply_preset(&self, preset: &CapturePreset) -> u64 {
        self.update(|vector| vector.apply_preset(preset))
    }

    /// A reader for a thread that must never block on the store
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            store: self.clone(),
            cached: self.snapshot(),
            revision: self.revision(),
        }
    }
}

/// Per-thread cached view of a [`ParameterStore`]
///
/// `latest()` only tries the read lock. While a writer holds it the reader
/// keeps returning its cached snapshot, so the render loop never waits.
#[derive(Debug)]
pub struct SnapshotReader {
    store: ParameterStore,
    cached: Arc<ParameterVector>,
    revision: u64,
}

impl SnapshotReader {
    /// Latest snapshot obtainable without blocking, and its revision
    pub fn latest(&mut self) -> (Arc<ParameterVector>, u64) {
        let revision = self.store.revision();
        if revision != self.revision {
            if let Ok(guard) = self.store.inner.current.try_read() {
                self.cached = Arc::clone(&guard);
                // Re-read under the lock: the published Arc is at least this new
                self.revision = self.store.revision();
            }
        }
        (Arc::clone(&self.cached), self.revision)
    }

    /// Whether the store has moved past the cached snapshot
    pub fn is_stale(&self) -> bool {
        self.store.revision() != self.revision
    }
}
