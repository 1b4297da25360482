//! Windows Personal Data Encryption via `UserDataProtectionManager`.
//!
//! The WinRT calls are waited on with `get()` inside `spawn_blocking`, so
//! callers on the async runtime never block. Item protection raises its
//! [`IssueNotice`] once `ProtectStorageItemAsync` has been started, not when
//! the blocking task is queued.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{info, warn};
use windows::core::{Array, Interface, HSTRING};
use windows::Foundation::TypedEventHandler;
use windows::Security::Cryptography::CryptographicBuffer;
use windows::Security::DataProtection::{
    UserDataAvailability, UserDataAvailabilityStateChangedEventArgs,
    UserDataBufferUnprotectStatus, UserDataProtectionManager, UserDataStorageItemProtectionStatus,
};
use windows::Storage::Streams::IBuffer;
use windows::Storage::{IStorageItem, StorageFile, StorageFolder};

use crate::error::{PdeError, Result};
use crate::level::{BufferUnprotectResult, ItemProtectionStatus, ProtectionLevel};
use crate::service::{
    AvailabilityChanged, IssueNotice, ItemKind, ProtectionService, StorageItem,
};

pub struct WindowsProtectionService {
    manager: UserDataProtectionManager,
    events: broadcast::Sender<AvailabilityChanged>,
}

impl WindowsProtectionService {
    pub fn try_default() -> Option<Self> {
        let manager = match UserDataProtectionManager::TryGetDefault() {
            Ok(manager) => manager,
            Err(err) => {
                info!("UserDataProtectionManager unavailable: {err}");
                return None;
            }
        };
        let (events, _) = broadcast::channel(16);
        let tx = events.clone();
        let handler = TypedEventHandler::<
            UserDataProtectionManager,
            UserDataAvailabilityStateChangedEventArgs,
        >::new(move |_, _| {
            let _ = tx.send(AvailabilityChanged);
            Ok(())
        });
        // registration lives as long as the manager
        if let Err(err) = manager.DataAvailabilityStateChanged(&handler) {
            warn!("cannot subscribe to availability changes: {err}");
        }
        Some(Self { manager, events })
    }
}

fn availability(level: ProtectionLevel) -> UserDataAvailability {
    match level {
        ProtectionLevel::WhileUnlocked => UserDataAvailability::WhileUnlocked,
        ProtectionLevel::AfterFirstUnlock => UserDataAvailability::AfterFirstUnlock,
        ProtectionLevel::Always => UserDataAvailability::Always,
    }
}

fn platform_err(err: windows::core::Error) -> PdeError {
    PdeError::Platform(err.message().to_string())
}

fn to_bytes(buffer: &IBuffer) -> windows::core::Result<Vec<u8>> {
    let mut out = Array::<u8>::new();
    CryptographicBuffer::CopyToByteArray(buffer, &mut out)?;
    Ok(out.to_vec())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PdeError::Platform(format!("platform call aborted: {e}")))?
}

#[async_trait]
impl ProtectionService for WindowsProtectionService {
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
        level: ProtectionLevel,
        issued: IssueNotice,
    ) -> Result<ItemProtectionStatus> {
        let manager = self.manager.clone();
        let item = item.clone();
        blocking(move || {
            let path = HSTRING::from(item.path.as_path());
            let storage: IStorageItem = match item.kind {
                ItemKind::Folder => StorageFolder::GetFolderFromPathAsync(&path)
                    .and_then(|op| op.get())
                    .and_then(|f| f.cast()),
                ItemKind::File => StorageFile::GetFileFromPathAsync(&path)
                    .and_then(|op| op.get())
                    .and_then(|f| f.cast()),
            }
            .map_err(|e| PdeError::InvalidSelection(format!("{}: {}", item.path.display(), e.message())))?;
            let op = manager
                .ProtectStorageItemAsync(&storage, availability(level))
                .map_err(platform_err)?;
            // the manager has the call; the next item may go while this one runs
            issued.raise();
            let status = op.get().map_err(platform_err)?;
            Ok(match status {
                UserDataStorageItemProtectionStatus::Succeeded => ItemProtectionStatus::Succeeded,
                UserDataStorageItemProtectionStatus::DataUnavailable => {
                    ItemProtectionStatus::DataUnavailable
                }
                _ => ItemProtectionStatus::NotProtectable,
            })
        })
        .await
    }

    async fn protect_buffer(&self, data: &[u8], level: ProtectionLevel) -> Result<Vec<u8>> {
        let manager = self.manager.clone();
        let data = data.to_vec();
        blocking(move || {
            let input = CryptographicBuffer::CreateFromByteArray(&data).map_err(platform_err)?;
            let protected = manager
                .ProtectBufferAsync(&input, availability(level))
                .and_then(|op| op.get())
                .map_err(platform_err)?;
            to_bytes(&protected).map_err(platform_err)
        })
        .await
    }

    async fn unprotect_buffer(&self, data: &[u8]) -> Result<BufferUnprotectResult> {
        let manager = self.manager.clone();
        let data = data.to_vec();
        blocking(move || {
            let input = CryptographicBuffer::CreateFromByteArray(&data).map_err(platform_err)?;
            let result = manager
                .UnprotectBufferAsync(&input)
                .and_then(|op| op.get())
                .map_err(|e| PdeError::MalformedBuffer(e.message().to_string()))?;
            if result.Status().map_err(platform_err)? != UserDataBufferUnprotectStatus::Succeeded {
                return Ok(BufferUnprotectResult::Unavailable);
            }
            let buffer = result.UnprotectedBuffer().map_err(platform_err)?;
            Ok(BufferUnprotectResult::Succeeded(
                to_bytes(&buffer).map_err(platform_err)?,
            ))
        })
        .await
    }

    fn is_continued_availability_expected(&self, level: ProtectionLevel) -> Result<bool> {
        self.manager
            .IsContinuedDataAvailabilityExpected(availability(level))
            .map_err(platform_err)
    }

    fn subscribe(&self) -> broadcast::Receiver<AvailabilityChanged> {
        self.events.subscribe()
    }
}
