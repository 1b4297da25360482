//! In-process stand-in for the platform protection service.
//!
//! Buffers are sealed with XChaCha20-Poly1305 under a key generated at
//! construction and never written anywhere, so tokens only round-trip within
//! the process that produced them. The device lock state is simulated and
//! drives both buffer availability and [`AvailabilityChanged`] notifications.
//! Item protection is recorded in memory; a path without an explicit record
//! inherits the level of its nearest protected ancestor.

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{PdeError, Result};
use crate::level::{BufferUnprotectResult, ItemProtectionStatus, ProtectionLevel};
use crate::service::{AvailabilityChanged, ItemKind, ProtectionService, StorageItem};

const MAGIC: &[u8; 4] = b"PDE\x01";
const NONCE_LEN: usize = 24;
const HEADER_LEN: usize = MAGIC.len() + 1 + NONCE_LEN;

#[derive(Debug, Clone, Copy)]
struct DeviceLock {
    locked: bool,
    unlocked_since_boot: bool,
}

pub struct EmulatedProtectionService {
    key: Zeroizing<[u8; 32]>,
    device: Mutex<DeviceLock>,
    items: Mutex<HashMap<PathBuf, ProtectionLevel>>,
    events: broadcast::Sender<AvailabilityChanged>,
}

impl Default for EmulatedProtectionService {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatedProtectionService {
    /// A freshly booted, unlocked device.
    pub fn new() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut key[..]);
        let (events, _) = broadcast::channel(16);
        Self {
            key,
            device: Mutex::new(DeviceLock {
                locked: false,
                unlocked_since_boot: true,
            }),
            items: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn lock(&self) {
        self.transition(|d| d.locked = true);
    }

    pub fn unlock(&self) {
        self.transition(|d| {
            d.locked = false;
            d.unlocked_since_boot = true;
        });
    }

    /// Locked, and not unlocked since boot.
    pub fn reboot(&self) {
        self.transition(|d| {
            d.locked = true;
            d.unlocked_since_boot = false;
        });
    }

    pub fn is_locked(&self) -> bool {
        self.device.lock().locked
    }

    /// Level recorded for `path`, or inherited from the closest recorded
    /// ancestor.
    pub fn effective_level(&self, path: &Path) -> Option<ProtectionLevel> {
        let items = self.items.lock();
        path.ancestors().find_map(|p| items.get(p).copied())
    }

    fn transition(&self, apply: impl FnOnce(&mut DeviceLock)) {
        let changed = {
            let mut device = self.device.lock();
            let before = *device;
            apply(&mut device);
            before.locked != device.locked
                || before.unlocked_since_boot != device.unlocked_since_boot
        };
        if changed {
            debug!("emulated device availability changed");
            // no subscribers is fine
            let _ = self.events.send(AvailabilityChanged);
        }
    }

    fn readable(&self, level: ProtectionLevel) -> bool {
        let device = self.device.lock();
        match level {
            ProtectionLevel::Always => true,
            ProtectionLevel::AfterFirstUnlock => device.unlocked_since_boot,
            ProtectionLevel::WhileUnlocked => !device.locked,
        }
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.key[..]))
    }

    fn aad(level: ProtectionLevel) -> [u8; 5] {
        let mut aad = [0u8; 5];
        aad[..4].copy_from_slice(MAGIC);
        aad[4] = level.as_byte();
        aad
    }
}

#[async_trait]
impl ProtectionService for EmulatedProtectionService {
    async fn protect_item(
        &self,
        item: &StorageItem,
        level: ProtectionLevel,
    ) -> Result<ItemProtectionStatus> {
        let kind_matches = match item.kind {
            ItemKind::Folder => item.path.is_dir(),
            ItemKind::File => item.path.is_file(),
        };
        if !kind_matches {
            return Ok(ItemProtectionStatus::NotProtectable);
        }
        // Content sealed to WhileUnlocked cannot be rewrapped while locked.
        if let Some(current) = self.effective_level(&item.path) {
            if !self.readable(current) {
                return Ok(ItemProtectionStatus::DataUnavailable);
            }
        }
        self.items.lock().insert(item.path.clone(), level);
        Ok(ItemProtectionStatus::Succeeded)
    }

    async fn protect_buffer(&self, data: &[u8], level: ProtectionLevel) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let aad = Self::aad(level);
        let sealed = self
            .cipher()
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: data,
                    aad: &aad,
                },
            )
            .map_err(|e| PdeError::Platform(format!("encrypt: {e}")))?;

        let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
        out.extend_from_slice(MAGIC);
        out.push(level.as_byte());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    async fn unprotect_buffer(&self, data: &[u8]) -> Result<BufferUnprotectResult> {
        if data.len() <= HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
            return Err(PdeError::MalformedBuffer(format!(
                "{} bytes without a protected buffer header",
                data.len()
            )));
        }
        let level = ProtectionLevel::from_byte(data[MAGIC.len()]).ok_or_else(|| {
            PdeError::MalformedBuffer(format!("unknown level tag {}", data[MAGIC.len()]))
        })?;
        if !self.readable(level) {
            return Ok(BufferUnprotectResult::Unavailable);
        }
        let nonce = XNonce::from_slice(&data[MAGIC.len() + 1..HEADER_LEN]);
        let aad = Self::aad(level);
        let plain = self
            .cipher()
            .decrypt(
                nonce,
                Payload {
                    msg: &data[HEADER_LEN..],
                    aad: &aad,
                },
            )
            .map_err(|_| {
                PdeError::MalformedBuffer("authentication failed; not protected here".into())
            })?;
        Ok(BufferUnprotectResult::Succeeded(plain))
    }

    fn is_continued_availability_expected(&self, level: ProtectionLevel) -> Result<bool> {
        Ok(self.readable(level))
    }

    fn subscribe(&self) -> broadcast::Receiver<AvailabilityChanged> {
        self.events.subscribe()
    }
}
