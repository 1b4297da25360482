//! Drives a device data protection service: protect files, whole folder
//! trees and in-memory buffers to a [`ProtectionLevel`], unprotect buffers,
//! and report when protected data is expected to stay readable.
//!
//! The provider is the [`ProtectionService`] trait. On Windows it is backed
//! by Personal Data Encryption; [`EmulatedProtectionService`] is a software
//! stand-in for other systems and for tests.

pub mod activity_log;
pub mod availability;
pub mod buffer;
pub mod emulated;
pub mod error;
pub mod folder;
pub mod level;
pub mod paths;
pub mod platform;
pub mod service;
pub mod session;
pub mod settings;

pub use activity_log::{ActivityLog, LogLine, LogSink, MemorySink, StdoutSink};
pub use emulated::EmulatedProtectionService;
pub use error::{PdeError, Result};
pub use folder::{protect_folder, FolderReport, ItemOutcome, TraversalOptions};
pub use level::{BufferUnprotectResult, ItemProtectionStatus, ProtectionLevel};
pub use platform::Backend;
pub use service::{
    AvailabilityChanged, IssueNotice, ItemKind, ProtectionService, SharedService, StorageItem,
};
pub use session::Session;
pub use settings::{BackendChoice, PdeSettings};
