//! JSONL-backed inbound message source.
//!
//! `replay` yields a finished file once and ends; `tail` follows a file as it
//! grows until the stream is dropped.

mod parsers;
mod tail;

pub use parsers::{parse_line, parse_messages, InboundItem};
pub use tail::TailState;

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SourceError;

/// Poll interval backing up filesystem notifications (inotify misses
/// appends on some filesystems).
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Read a whole message log and yield its lines in order.
pub async fn replay(path: &Path) -> Result<BoxStream<'static, InboundItem>, SourceError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let items = parse_messages(&content);
    debug!(path = %path.display(), lines = items.len(), "replaying message log");
    Ok(stream::iter(items).boxed())
}

/// Follow a message log, yielding lines already present and then every
/// complete line appended later. Must be called inside a tokio runtime.
pub fn tail(path: impl Into<PathBuf>) -> Result<BoxStream<'static, InboundItem>, SourceError> {
    let path = path.into();
    let watch_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let (wake_tx, mut wake_rx) = mpsc::unbounded_channel::<()>();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(_) => {
                let _ = wake_tx.send(());
            }
            Err(e) => warn!(error = %e, "file watch error"),
        },
        Config::default().with_poll_interval(POLL_INTERVAL),
    )?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<InboundItem>();
    tokio::spawn(async move {
        // Dropping the watcher stops notifications; keep it for the task's life.
        let _watcher = watcher;
        let mut tail = TailState::new(path);
        let mut poll = tokio::time::interval(POLL_INTERVAL);

        loop {
            tokio::select! {
                woke = wake_rx.recv() => {
                    if woke.is_none() {
                        break;
                    }
                }
                _ = poll.tick() => {}
                _ = tx.closed() => break,
            }

            if !tail.path().exists() {
                continue;
            }
            match tail.read_new_lines() {
                Ok(content) => {
                    for item in parse_messages(&content) {
                        if tx.send(item).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!(path = %tail.path().display(), error = %e, "failed to read message log"),
            }
        }
        debug!(path = %tail.path().display(), "tail stopped");
    });

    Ok(stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn replay_yields_every_line_then_ends() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type":"welcome"}}"#).unwrap();
        writeln!(file, r#"{{"type":"q4h_answered","questionId":"q-1"}}"#).unwrap();

        let items: Vec<_> = replay(file.path()).await.unwrap().collect().await;

        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.is_ok()));
    }

    #[tokio::test]
    async fn replay_missing_file_is_io_error() {
        let err = replay(Path::new("/nonexistent/log.jsonl")).await.err().unwrap();
        assert!(matches!(err, SourceError::Io { .. }));
    }
}
