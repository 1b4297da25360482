//! User-facing activity log.
//!
//! Any thread or task may post through a cloned [`ActivityLog`]; exactly one
//! consumer task renders lines to a [`LogSink`], so output is never touched
//! from two places at once. Every line is also mirrored to `tracing`.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%m/%d/%y %H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl LogLine {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "[{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.message
        )
    }
}

enum LogMessage {
    Line(LogLine),
    Flush(oneshot::Sender<()>),
}

/// Producer handle. Cheap to clone, safe to use from blocking threads.
#[derive(Clone)]
pub struct ActivityLog {
    tx: mpsc::UnboundedSender<LogMessage>,
}

impl ActivityLog {
    /// Creates the log and spawns its single consumer on the current runtime.
    /// The consumer exits once every handle has been dropped.
    pub fn spawn<S: LogSink>(mut sink: S) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    LogMessage::Line(line) => sink.render(&line),
                    LogMessage::Flush(ack) => {
                        sink.flush();
                        let _ = ack.send(());
                    }
                }
            }
            sink.flush();
        });
        (Self { tx }, consumer)
    }

    pub fn line(&self, message: impl Into<String>) {
        let line = LogLine::now(message);
        info!(target: "pde::activity", "{}", line.message);
        // consumer gone means we are shutting down
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Resolves once every line posted before this call has been rendered.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(LogMessage::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

pub trait LogSink: Send + 'static {
    fn render(&mut self, line: &LogLine);

    fn flush(&mut self) {}
}

/// Writes rendered lines to stdout, oldest first.
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn render(&mut self, line: &LogLine) {
        println!("{}", line.render());
    }

    fn flush(&mut self) {
        let _ = std::io::stdout().flush();
    }
}

/// Keeps lines in memory, newest first, up to `capacity`.
#[derive(Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<VecDeque<LogLine>>>,
    capacity: usize,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Messages in the order they were posted.
    pub fn messages(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .rev()
            .map(|l| l.message.clone())
            .collect()
    }
}

impl LogSink for MemorySink {
    fn render(&mut self, line: &LogLine) {
        let mut lines = self.lines.lock();
        lines.push_front(line.clone());
        lines.truncate(self.capacity);
    }
}

/// Renders to two sinks.
pub struct TeeSink<A, B>(pub A, pub B);

impl<A: LogSink, B: LogSink> LogSink for TeeSink<A, B> {
    fn render(&mut self, line: &LogLine) {
        self.0.render(line);
        self.1.render(line);
    }

    fn flush(&mut self) {
        self.0.flush();
        self.1.flush();
    }
}
