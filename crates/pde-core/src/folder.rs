//! Recursive folder protection.
//!
//! A folder is protected before anything inside it, so content created in
//! it afterwards inherits the folder's level from the provider. The walk is
//! depth-first pre-order with subfolders ahead of files: a folder, then each
//! subfolder's whole subtree, then the folder's own files.
//!
//! The walk runs on a blocking thread and feeds a bounded channel. The
//! submitter hands each item to its own task, at most `max_in_flight` at a
//! time, and chains the tasks so that call N+1 is not started until the
//! provider has raised the [`IssueNotice`] for call N. Completion order is
//! unconstrained, and one item failing never stops the others.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::activity_log::ActivityLog;
use crate::error::{PdeError, Result};
use crate::level::{ItemProtectionStatus, ProtectionLevel};
use crate::service::{IssueNotice, SharedService, StorageItem};

const WALK_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct TraversalOptions {
    pub max_in_flight: usize,
    pub follow_links: bool,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            follow_links: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub item: StorageItem,
    pub result: std::result::Result<ItemProtectionStatus, String>,
}

impl ItemOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.result, Ok(ItemProtectionStatus::Succeeded))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FolderReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<ItemOutcome>,
    pub enumeration_errors: Vec<(PathBuf, String)>,
}

enum Walked {
    Item(StorageItem),
    Unreadable { path: PathBuf, message: String },
}

/// Protects one item and logs the outcome.
pub async fn protect_and_log(
    service: &SharedService,
    item: StorageItem,
    level: ProtectionLevel,
    log: &ActivityLog,
) -> ItemOutcome {
    let result = service.protect_item(&item, level).await;
    log_outcome(&item, level, &result, log);
    ItemOutcome {
        item,
        result: result.map_err(|e| e.to_string()),
    }
}

fn log_outcome(
    item: &StorageItem,
    level: ProtectionLevel,
    result: &Result<ItemProtectionStatus>,
    log: &ActivityLog,
) {
    let name = item.name();
    match result {
        Ok(ItemProtectionStatus::Succeeded) => {
            log.line(format!("Protected {name} to level {level}"));
        }
        Ok(status) => {
            log.line(format!(
                "Protection failed for {name} to level {level}, status: {status}"
            ));
        }
        Err(err) => {
            warn!("protect {} failed: {err}", item.path.display());
            log.line(format!(
                "Protection failed for {name} to level {level}, error: {err}"
            ));
        }
    }
}

/// Protects `root` and everything under it to `level`, returning once every
/// issued call has completed.
pub async fn protect_folder(
    service: SharedService,
    root: &Path,
    level: ProtectionLevel,
    options: &TraversalOptions,
    log: &ActivityLog,
) -> Result<FolderReport> {
    if !root.is_dir() {
        return Err(PdeError::InvalidSelection(format!(
            "{} is not a folder",
            root.display()
        )));
    }
    info!(
        "protecting folder {} to {level} (max in flight {})",
        root.display(),
        options.max_in_flight
    );

    let (walk_tx, mut walk_rx) = mpsc::channel(WALK_QUEUE_DEPTH);
    let walker = {
        let root = root.to_path_buf();
        let follow_links = options.follow_links;
        tokio::task::spawn_blocking(move || walk(&root, follow_links, walk_tx))
    };

    let permits = Arc::new(Semaphore::new(options.max_in_flight.max(1)));
    let mut in_flight = JoinSet::new();
    let mut report = FolderReport::default();
    let mut previous_issued: Option<oneshot::Receiver<()>> = None;

    while let Some(walked) = walk_rx.recv().await {
        let item = match walked {
            Walked::Item(item) => item,
            Walked::Unreadable { path, message } => {
                log.line(format!("Could not read {}: {message}", path.display()));
                report.enumeration_errors.push((path, message));
                continue;
            }
        };

        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PdeError::Platform(format!("submission closed: {e}")))?;
        let (issued, issued_rx) = IssueNotice::new();
        let after = previous_issued.replace(issued_rx);
        let service = service.clone();
        let log = log.clone();
        report.attempted += 1;

        in_flight.spawn(async move {
            if let Some(after) = after {
                // sender dropped means the predecessor is gone; proceed
                let _ = after.await;
            }
            let result = service.protect_item_issued(&item, level, issued).await;
            drop(permit);
            log_outcome(&item, level, &result, &log);
            ItemOutcome {
                item,
                result: result.map_err(|e| e.to_string()),
            }
        });
    }

    walker
        .await
        .map_err(|e| PdeError::Platform(format!("folder walk aborted: {e}")))?;

    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok(outcome) if outcome.succeeded() => report.succeeded += 1,
            Ok(outcome) => report.failed.push(outcome),
            Err(e) => warn!("protection task ended abnormally: {e}"),
        }
    }

    info!(
        "folder {} done: {} attempted, {} succeeded, {} failed, {} unreadable",
        root.display(),
        report.attempted,
        report.succeeded,
        report.failed.len(),
        report.enumeration_errors.len()
    );
    Ok(report)
}

fn walk(root: &Path, follow_links: bool, tx: mpsc::Sender<Walked>) {
    let walker = WalkDir::new(root)
        .follow_links(follow_links)
        .sort_by(|a, b| {
            b.file_type()
                .is_dir()
                .cmp(&a.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        });

    for entry in walker {
        let walked = match entry {
            Ok(entry) => {
                let file_type = entry.file_type();
                if file_type.is_dir() {
                    Walked::Item(StorageItem::folder(entry.into_path()))
                } else if file_type.is_file() {
                    Walked::Item(StorageItem::file(entry.into_path()))
                } else {
                    debug!("skipping {}", entry.path().display());
                    continue;
                }
            }
            Err(err) => Walked::Unreadable {
                path: err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf()),
                message: err.to_string(),
            },
        };
        if tx.blocking_send(walked).is_err() {
            debug!("submitter gone, stopping walk of {}", root.display());
            return;
        }
    }
}
