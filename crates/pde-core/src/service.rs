//! The contract this toolkit needs from a data protection provider.
//!
//! A provider protects files, folders and in-memory buffers to a
//! [`ProtectionLevel`], unprotects buffers it produced, and answers whether
//! data at a level is expected to stay readable. It also publishes an
//! [`AvailabilityChanged`] notification whenever the lock state moves.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

use crate::error::Result;
use crate::level::{BufferUnprotectResult, ItemProtectionStatus, ProtectionLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Folder,
    File,
}

/// A file or folder addressed by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageItem {
    pub path: PathBuf,
    pub kind: ItemKind,
}

impl StorageItem {
    pub fn folder(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ItemKind::Folder,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ItemKind::File,
        }
    }

    /// Last path component, or the whole path for roots.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Raised by a provider once a protect call has been handed to the platform,
/// before waiting for its result. A folder walk holds back the next call
/// until then. Dropping the notice counts as raising it.
#[derive(Debug)]
pub struct IssueNotice(Option<oneshot::Sender<()>>);

impl IssueNotice {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(Some(tx)), rx)
    }

    /// A notice nobody waits on.
    pub fn detached() -> Self {
        Self(None)
    }

    pub fn raise(mut self) {
        if let Some(tx) = self.0.take() {
            // receiver gone means nobody is waiting
            let _ = tx.send(());
        }
    }
}

/// Published by a provider when the device lock state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityChanged;

#[async_trait]
pub trait ProtectionService: Send + Sync {
    async fn protect_item(
        &self,
        item: &StorageItem,
        level: ProtectionLevel,
    ) -> Result<ItemProtectionStatus>;

    /// Same as [`protect_item`](Self::protect_item), raising `issued` as soon
    /// as the platform has received the call. The default raises it on
    /// completion, which is correct for any provider; providers whose calls
    /// complete asynchronously override it so calls can overlap.
    async fn protect_item_issued(
        &self,
        item: &StorageItem,
        level: ProtectionLevel,
        issued: IssueNotice,
    ) -> Result<ItemProtectionStatus> {
        let result = self.protect_item(item, level).await;
        issued.raise();
        result
    }

    async fn protect_buffer(&self, data: &[u8], level: ProtectionLevel) -> Result<Vec<u8>>;

    /// `Err` only when `data` is not something this provider protected.
    async fn unprotect_buffer(&self, data: &[u8]) -> Result<BufferUnprotectResult>;

    fn is_continued_availability_expected(&self, level: ProtectionLevel) -> Result<bool>;

    fn subscribe(&self) -> broadcast::Receiver<AvailabilityChanged>;
}

pub type SharedService = Arc<dyn ProtectionService>;
