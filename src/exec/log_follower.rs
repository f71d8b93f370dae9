// src/exec/log_follower.rs

//! Tail the log files of a running process into tracing events.
//!
//! Files are polled from the last offset read, so the producing process is
//! never slowed down. Only complete lines are emitted while polling; on stop
//! the files are drained one last time and a trailing partial line is
//! flushed as well.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::logging::PROCESS_OUTPUT_TARGET;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle on a background tailing task.
#[derive(Debug)]
pub struct LogFollower {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl LogFollower {
    /// Start following `streams`, given as `(stream name, path)`.
    pub fn spawn(process: String, streams: Vec<(&'static str, PathBuf)>) -> Self {
        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let mut tails: Vec<Tail> = streams
            .into_iter()
            .map(|(stream, path)| Tail::new(stream, path))
            .collect();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        for tail in tails.iter_mut() {
                            tail.poll(&process, false).await;
                        }
                    }
                }
            }
            for tail in tails.iter_mut() {
                tail.poll(&process, true).await;
            }
            debug!(process = %process, "log follower finished");
        });

        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Stop polling and wait until everything written so far is emitted.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(err) = (&mut self.handle).await {
            warn!(error = %err, "log follower task failed");
        }
    }
}

impl Drop for LogFollower {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
struct Tail {
    stream: &'static str,
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
}

impl Tail {
    fn new(stream: &'static str, path: PathBuf) -> Self {
        Self {
            stream,
            path,
            offset: 0,
            pending: Vec::new(),
        }
    }

    async fn poll(&mut self, process: &str, flush: bool) {
        if let Err(err) = self.read_new_bytes().await {
            debug!(process = %process, path = %self.path.display(), error = %err, "cannot read log file");
        }

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(process, &line[..line.len() - 1]);
        }
        if flush && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(process, &rest);
        }
    }

    async fn read_new_bytes(&mut self) -> std::io::Result<()> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        let len = file.metadata().await?.len();
        if len < self.offset {
            // Truncated behind our back: start over.
            self.offset = 0;
            self.pending.clear();
        }
        file.seek(SeekFrom::Start(self.offset)).await?;
        let read = file.read_to_end(&mut self.pending).await?;
        self.offset += read as u64;
        Ok(())
    }

    fn emit(&self, process: &str, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches('\r');
        info!(target: PROCESS_OUTPUT_TARGET, process = %process, stream = self.stream, "{line}");
    }
}
