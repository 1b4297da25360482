//! One user's interactive session: the provider handle, the two selected
//! paths, the last buffer output, and the actions that use them.
//!
//! Every action reports through the activity log. An absent provider is
//! reported as [`PdeError::NotEnabled`] and nothing is called; bad input is
//! reported as a usage error and leaves the session unchanged.

use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::activity_log::ActivityLog;
use crate::availability::{log_availability, spawn_availability_monitor};
use crate::buffer::{protect_to_token, unprotect_token};
use crate::error::{PdeError, Result};
use crate::folder::{protect_and_log, protect_folder, FolderReport, ItemOutcome, TraversalOptions};
use crate::level::{BufferUnprotectResult, ProtectionLevel};
use crate::platform::Backend;
use crate::service::{SharedService, StorageItem};

pub const NOT_ENABLED_MESSAGE: &str =
    "Personal Data Encryption is not enabled on the device, please enable before proceeding!";
pub const VERIFY_INPUT_MESSAGE: &str =
    "Please verify first the input text provided for unprotecting!";
pub const UNAVAILABLE_MESSAGE: &str =
    "This protected buffer is currently unavailable for unprotection";

pub struct Session {
    backend: Backend,
    log: ActivityLog,
    traversal: TraversalOptions,
    selected_folder: Option<PathBuf>,
    selected_file: Option<PathBuf>,
    output: Option<String>,
    monitor: Option<JoinHandle<()>>,
}

impl Session {
    /// Reports whether protection is available and, if so, starts listening
    /// for availability changes. Must be called within a tokio runtime.
    pub fn start(backend: Backend, log: ActivityLog, traversal: TraversalOptions) -> Self {
        let monitor = match &backend.service {
            Some(service) => {
                log.line("Personal Data Encryption is enabled.");
                Some(spawn_availability_monitor(service.clone(), log.clone()))
            }
            None => {
                log.line(
                    "Personal Data Encryption is not supported or enabled. Restart this app to check again.",
                );
                None
            }
        };
        Self {
            backend,
            log,
            traversal,
            selected_folder: None,
            selected_file: None,
            output: None,
            monitor,
        }
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn selected_folder(&self) -> Option<&Path> {
        self.selected_folder.as_deref()
    }

    pub fn selected_file(&self) -> Option<&Path> {
        self.selected_file.as_deref()
    }

    /// Last token or decoded text shown to the user.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn select_folder(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(self.usage(PdeError::InvalidSelection(format!(
                "{} is not a folder",
                path.display()
            ))));
        }
        self.selected_folder = Some(path.to_path_buf());
        self.log.line(format!("Selected folder {}", path.display()));
        Ok(())
    }

    pub fn select_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(self.usage(PdeError::InvalidSelection(format!(
                "{} is not a file",
                path.display()
            ))));
        }
        self.selected_file = Some(path.to_path_buf());
        self.log.line(format!("Selected file {}", path.display()));
        Ok(())
    }

    /// `Ok(None)` when no folder is selected.
    pub async fn protect_selected_folder(
        &self,
        level: ProtectionLevel,
    ) -> Result<Option<FolderReport>> {
        let Some(folder) = self.selected_folder.clone() else {
            debug!("no folder selected");
            return Ok(None);
        };
        let service = self.service()?;
        let report = protect_folder(service, &folder, level, &self.traversal, &self.log).await?;
        Ok(Some(report))
    }

    /// `Ok(None)` when no file is selected.
    pub async fn protect_selected_file(
        &self,
        level: ProtectionLevel,
    ) -> Result<Option<ItemOutcome>> {
        let Some(file) = self.selected_file.clone() else {
            debug!("no file selected");
            return Ok(None);
        };
        let service = self.service()?;
        Ok(Some(
            protect_and_log(&service, StorageItem::file(file), level, &self.log).await,
        ))
    }

    /// Protects UTF-8 `text`; on success the token becomes the output.
    /// Empty text is ignored.
    pub async fn protect_buffer(
        &mut self,
        text: &str,
        level: ProtectionLevel,
    ) -> Result<Option<String>> {
        if text.is_empty() {
            return Ok(None);
        }
        let service = self.service()?;
        match protect_to_token(service.as_ref(), text.as_bytes(), level).await {
            Ok(Some(token)) => {
                self.log.line(format!("Protected buffer: {token}"));
                self.output = Some(token.clone());
                Ok(Some(token))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                self.log.line(format!("Buffer protection failed: {err}"));
                Err(err)
            }
        }
    }

    /// Unprotects a token; on success the decoded text becomes the output.
    /// Empty input is ignored.
    pub async fn unprotect_buffer(&mut self, token: &str) -> Result<Option<BufferUnprotectResult>> {
        if token.trim().is_empty() {
            return Ok(None);
        }
        let service = self.service()?;
        let result = match unprotect_token(service.as_ref(), token).await {
            Ok(result) => result,
            Err(err) if err.is_usage() => {
                self.log.line(VERIFY_INPUT_MESSAGE);
                return Err(self.usage(err));
            }
            Err(err) => {
                self.log.line(format!("Buffer unprotection failed: {err}"));
                return Err(err);
            }
        };
        match &result {
            BufferUnprotectResult::Succeeded(bytes) => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                self.log
                    .line(format!("Result of Unprotecting the buffer: {text}"));
                self.output = Some(text);
                self.log.line("Status of Unprotecting the buffer: Succeeded");
            }
            BufferUnprotectResult::Unavailable => self.log.line(UNAVAILABLE_MESSAGE),
        }
        Ok(Some(result))
    }

    pub fn log_availability(&self) -> Result<()> {
        let service = self.service()?;
        log_availability(service.as_ref(), &self.log);
        Ok(())
    }

    fn service(&self) -> Result<SharedService> {
        match &self.backend.service {
            Some(service) => Ok(service.clone()),
            None => {
                self.log.line(NOT_ENABLED_MESSAGE);
                Err(PdeError::NotEnabled)
            }
        }
    }

    fn usage(&self, err: PdeError) -> PdeError {
        self.log.line(err.to_string());
        err
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}
