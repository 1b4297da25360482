use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::activity_log::ActivityLog;
use crate::error::Result;
use crate::level::ProtectionLevel;
use crate::service::{ProtectionService, SharedService};

/// One line describing whether protected data is expected to stay readable
/// at each protecting level.
pub fn availability_summary(service: &dyn ProtectionService) -> Result<String> {
    let after_first_unlock =
        service.is_continued_availability_expected(ProtectionLevel::AfterFirstUnlock)?;
    let while_unlocked =
        service.is_continued_availability_expected(ProtectionLevel::WhileUnlocked)?;
    Ok(format!(
        "IsContinuedDataAvailabilityExpected AfterFirstUnlock: {after_first_unlock}, WhileUnlocked: {while_unlocked}"
    ))
}

pub fn log_availability(service: &dyn ProtectionService, log: &ActivityLog) {
    match availability_summary(service) {
        Ok(summary) => log.line(summary),
        Err(err) => log.line(format!("Could not query data availability: {err}")),
    }
}

/// Single handler for availability notifications: every change re-queries
/// the provider and logs the answer. Runs until the provider drops its
/// sender or the task is aborted.
pub fn spawn_availability_monitor(service: SharedService, log: ActivityLog) -> JoinHandle<()> {
    let mut changes = service.subscribe();
    log.line("Listening to DataAvailabilityStateChanged events");
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(_) => {
                    log.line("DataAvailabilityStateChanged event received");
                    log_availability(service.as_ref(), &log);
                }
                Err(RecvError::Lagged(skipped)) => {
                    // the state is re-queried anyway, missed events add nothing
                    warn!("availability monitor skipped {skipped} notifications");
                }
                Err(RecvError::Closed) => {
                    debug!("availability notifications closed");
                    break;
                }
            }
        }
    })
}
