//! Integration tests for recursive folder protection.
//!
//! Covers:
//!  1. Every folder is called before anything beneath it
//!  2. One call per folder and file, each logged
//!  3. Failed items do not stop their siblings
//!  4. In-flight calls stay within the configured bound
//!  5. A folder's own files follow its subfolders' subtrees
//!  6. Ordering holds however late a provider takes delivery of a call
//!  7. Unreadable entries are logged and counted without stopping the walk
//!  8. Symlinks are skipped unless links are followed

mod common;

use common::{touch, CallShape, RecordingService};
use pde_core::{
    protect_folder, ActivityLog, MemorySink, PdeError, ProtectionLevel, SharedService,
    TraversalOptions,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::tempdir;

fn build_tree(root: &Path) {
    touch(&root.join("alpha/beta/gamma/deep.txt"));
    touch(&root.join("alpha/beta/b1.txt"));
    touch(&root.join("alpha/a1.txt"));
    touch(&root.join("alpha/a2.txt"));
    fs::create_dir_all(root.join("delta")).unwrap();
    touch(&root.join("top1.txt"));
    touch(&root.join("top2.txt"));
}

fn options(max_in_flight: usize) -> TraversalOptions {
    TraversalOptions {
        max_in_flight,
        follow_links: false,
    }
}

async fn assert_folders_first(shape: CallShape) {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    build_tree(&root);

    let recorder = Arc::new(RecordingService::with_shape(shape));
    let service: SharedService = recorder.clone();
    let (log, _consumer) = ActivityLog::spawn(MemorySink::new(256));

    protect_folder(
        service,
        &root,
        ProtectionLevel::WhileUnlocked,
        &options(8),
        &log,
    )
    .await
    .unwrap();

    let calls = recorder.called_paths();
    assert_eq!(calls.len(), 11, "{shape:?}");
    assert_eq!(calls[0], root, "{shape:?}");
    for (i, folder) in calls.iter().enumerate().filter(|(_, p)| p.is_dir()) {
        for (j, other) in calls.iter().enumerate() {
            if other != folder && other.starts_with(folder) {
                assert!(
                    i < j,
                    "{shape:?}: {} was called before its ancestor {}",
                    other.display(),
                    folder.display()
                );
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn folders_are_called_before_their_descendants() {
    for shape in [
        CallShape::Immediate,
        CallShape::Deferred,
        CallShape::OnCompletion,
    ] {
        assert_folders_first(shape).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_folder_lookups_do_not_let_files_overtake() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    touch(&root.join("sub/inner.txt"));
    touch(&root.join("top.txt"));

    let recorder = Arc::new(RecordingService::with_shape(CallShape::Deferred));
    let (log, _consumer) = ActivityLog::spawn(MemorySink::new(16));

    protect_folder(
        recorder.clone(),
        &root,
        ProtectionLevel::WhileUnlocked,
        &options(4),
        &log,
    )
    .await
    .unwrap();

    assert_eq!(
        recorder.called_paths(),
        vec![
            root.clone(),
            root.join("sub"),
            root.join("sub/inner.txt"),
            root.join("top.txt"),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_item_is_called_once_and_logged() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    build_tree(&root);
    // root + alpha, beta, gamma, delta + 6 files
    let expected = 1 + 4 + 6;

    let recorder = Arc::new(RecordingService::new());
    let sink = MemorySink::new(256);
    let (log, _consumer) = ActivityLog::spawn(sink.clone());

    let report = protect_folder(
        recorder.clone(),
        &root,
        ProtectionLevel::AfterFirstUnlock,
        &options(16),
        &log,
    )
    .await
    .unwrap();
    log.flush().await;

    assert_eq!(report.attempted, expected);
    assert_eq!(report.succeeded, expected);
    assert!(report.failed.is_empty());
    assert_eq!(recorder.called_paths().len(), expected);

    let protected_lines = sink
        .messages()
        .iter()
        .filter(|m| m.starts_with("Protected ") && m.ends_with("to level AfterFirstUnlock"))
        .count();
    assert_eq!(protected_lines, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failures_do_not_stop_siblings() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    touch(&root.join("ok1.txt"));
    touch(&root.join("fail.txt"));
    touch(&root.join("boom.txt"));
    touch(&root.join("failing-dir/inner.txt"));
    touch(&root.join("ok2.txt"));

    let recorder = Arc::new(RecordingService::new());
    let sink = MemorySink::new(256);
    let (log, _consumer) = ActivityLog::spawn(sink.clone());

    let report = protect_folder(
        recorder.clone(),
        &root,
        ProtectionLevel::WhileUnlocked,
        &options(4),
        &log,
    )
    .await
    .unwrap();
    log.flush().await;

    // root, failing-dir, inner, boom, fail, ok1, ok2
    assert_eq!(report.attempted, 7);
    assert_eq!(recorder.called_paths().len(), 7);
    assert_eq!(report.failed.len(), 3);
    assert_eq!(report.succeeded, 4);
    assert!(recorder
        .called_paths()
        .contains(&root.join("failing-dir/inner.txt")));

    let messages = sink.messages();
    assert!(messages
        .iter()
        .any(|m| m == "Protection failed for fail.txt to level WhileUnlocked, status: NotProtectable"));
    assert!(messages
        .iter()
        .any(|m| m.starts_with("Protection failed for boom.txt to level WhileUnlocked, error:")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_calls_respect_the_bound() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    for i in 0..20 {
        touch(&root.join(format!("file{i:02}.txt")));
    }

    let recorder = Arc::new(RecordingService::new());
    let (log, _consumer) = ActivityLog::spawn(MemorySink::new(8));

    let report = protect_folder(
        recorder.clone(),
        &root,
        ProtectionLevel::AfterFirstUnlock,
        &options(2),
        &log,
    )
    .await
    .unwrap();

    assert_eq!(report.attempted, 21);
    assert!(recorder.max_in_flight_seen.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn own_files_follow_subfolder_subtrees() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    build_tree(&root);

    let recorder = Arc::new(RecordingService::new());
    let (log, _consumer) = ActivityLog::spawn(MemorySink::new(64));

    protect_folder(
        recorder.clone(),
        &root,
        ProtectionLevel::WhileUnlocked,
        &options(1),
        &log,
    )
    .await
    .unwrap();

    let calls = recorder.called_paths();
    let last_nested = calls
        .iter()
        .rposition(|p| p.starts_with(root.join("alpha")) || p.starts_with(root.join("delta")))
        .unwrap();
    let first_top_file = calls
        .iter()
        .position(|p| p.parent() == Some(root.as_path()) && p.is_file())
        .unwrap();
    assert!(last_nested < first_top_file);
}

#[tokio::test]
async fn a_file_is_not_a_folder() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    touch(&file);

    let recorder = Arc::new(RecordingService::new());
    let (log, _consumer) = ActivityLog::spawn(MemorySink::new(8));
    let err = protect_folder(
        recorder.clone(),
        &file,
        ProtectionLevel::Always,
        &TraversalOptions::default(),
        &log,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PdeError::InvalidSelection(_)));
    assert!(recorder.called_paths().is_empty());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreadable_entries_are_reported_and_skipped() {
    use std::os::unix::fs::symlink;

    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    touch(&root.join("keep.txt"));
    touch(&root.join("sub/inner.txt"));
    symlink(root.join("nowhere"), root.join("dangling")).unwrap();
    symlink(&root, root.join("sub/loop")).unwrap();

    let recorder = Arc::new(RecordingService::new());
    let sink = MemorySink::new(64);
    let (log, _consumer) = ActivityLog::spawn(sink.clone());

    let report = protect_folder(
        recorder.clone(),
        &root,
        ProtectionLevel::AfterFirstUnlock,
        &TraversalOptions {
            max_in_flight: 4,
            follow_links: true,
        },
        &log,
    )
    .await
    .unwrap();
    log.flush().await;

    assert_eq!(report.enumeration_errors.len(), 2);
    assert_eq!(
        sink.messages()
            .iter()
            .filter(|m| m.starts_with("Could not read "))
            .count(),
        2
    );
    // root, sub, inner, keep
    assert_eq!(report.attempted, 4);
    assert_eq!(report.succeeded, 4);
    let calls = recorder.called_paths();
    assert!(calls.contains(&root.join("keep.txt")));
    assert!(calls.contains(&root.join("sub/inner.txt")));
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_folders_are_not_followed_by_default() {
    use std::os::unix::fs::symlink;

    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let outside = dir.path().join("outside");
    touch(&outside.join("elsewhere.txt"));
    touch(&root.join("own.txt"));
    symlink(&outside, root.join("linked")).unwrap();

    let recorder = Arc::new(RecordingService::new());
    let (log, _consumer) = ActivityLog::spawn(MemorySink::new(16));

    let report = protect_folder(
        recorder.clone(),
        &root,
        ProtectionLevel::WhileUnlocked,
        &options(4),
        &log,
    )
    .await
    .unwrap();

    assert_eq!(recorder.called_paths(), vec![root.clone(), root.join("own.txt")]);
    assert!(report.enumeration_errors.is_empty());
}
