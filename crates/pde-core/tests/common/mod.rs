//! Shared test helpers: a provider that records every call it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pde_core::error::{PdeError, Result};
use pde_core::{
    AvailabilityChanged, BufferUnprotectResult, IssueNotice, ItemKind, ItemProtectionStatus,
    ProtectionLevel, ProtectionService, StorageItem,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// When a provider takes delivery of an item call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// Records on the first poll and raises the notice straight away.
    Immediate,
    /// Looks the item up on a blocking thread first, folders taking longer,
    /// then records and raises the notice. Shaped like the WinRT backend.
    Deferred,
    /// Records on a blocking thread and leaves the notice to be raised on
    /// completion, like a provider relying on the trait default.
    OnCompletion,
}

/// Records item calls in the order they reach the provider. Items whose
/// name contains `fail` report `NotProtectable`; names containing `boom`
/// return an error. Each call sleeps a little, longer for shallower paths,
/// so completions come back out of call order.
pub struct RecordingService {
    shape: CallShape,
    item_calls: Arc<Mutex<Vec<StorageItem>>>,
    pub buffer_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight_seen: AtomicUsize,
    events: broadcast::Sender<AvailabilityChanged>,
}

impl RecordingService {
    pub fn new() -> Self {
        Self::with_shape(CallShape::Immediate)
    }

    pub fn with_shape(shape: CallShape) -> Self {
        let (events, _) = broadcast::channel(4);
        Self {
            shape,
            item_calls: Arc::new(Mutex::new(Vec::new())),
            buffer_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight_seen: AtomicUsize::new(0),
            events,
        }
    }

    pub fn called_paths(&self) -> Vec<PathBuf> {
        self.item_calls.lock().iter().map(|i| i.path.clone()).collect()
    }
}

#[async_trait]
impl ProtectionService for RecordingService {
    async fn protect_item(
        &self,
        item: &StorageItem,
        level: ProtectionLevel,
    ) -> Result<ItemProtectionStatus> {
        self.protect_item_issued(item, level, IssueNotice::detached())
            .await
    }

    async fn protect_item_issued(
        &self,
        item: &StorageItem,
        _level: ProtectionLevel,
        issued: IssueNotice,
    ) -> Result<ItemProtectionStatus> {
        let mut pending = Some(issued);
        match self.shape {
            CallShape::Immediate => self.item_calls.lock().push(item.clone()),
            CallShape::Deferred | CallShape::OnCompletion => {
                let lookup = match item.kind {
                    ItemKind::Folder => Duration::from_millis(30),
                    ItemKind::File => Duration::ZERO,
                };
                let calls = self.item_calls.clone();
                let item = item.clone();
                tokio::task::spawn_blocking(move || {
                    std::thread::sleep(lookup);
                    calls.lock().push(item);
                })
                .await
                .unwrap();
            }
        }
        if self.shape != CallShape::OnCompletion {
            if let Some(notice) = pending.take() {
                notice.raise();
            }
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_seen.fetch_max(now, Ordering::SeqCst);
        let depth = item.path.components().count() as u64;
        tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(depth * 2))).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        drop(pending);

        let name = item.name();
        if name.contains("boom") {
            return Err(PdeError::Platform("simulated failure".into()));
        }
        if name.contains("fail") {
            return Ok(ItemProtectionStatus::NotProtectable);
        }
        Ok(ItemProtectionStatus::Succeeded)
    }

    async fn protect_buffer(&self, data: &[u8], _level: ProtectionLevel) -> Result<Vec<u8>> {
        self.buffer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(data.iter().rev().copied().collect())
    }

    async fn unprotect_buffer(&self, data: &[u8]) -> Result<BufferUnprotectResult> {
        self.buffer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BufferUnprotectResult::Succeeded(
            data.iter().rev().copied().collect(),
        ))
    }

    fn is_continued_availability_expected(&self, _level: ProtectionLevel) -> Result<bool> {
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<AvailabilityChanged> {
        self.events.subscribe()
    }
}

pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"data").unwrap();
}
