// ODM Core - OverDrive audiobook download client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Per-job append-only log
//!
//! Every event of a download job can be appended to one log file that a
//! front-end polls for status. Producers only send lines over a channel;
//! a single consumer task owns the file, so lines from concurrent workers
//! never interleave.
//!
//! Lines are prefixed with a local timestamp:
//! `2025-06-01 12:00:00.123 Downloading Part01.mp3`

use crate::error::{OdmError, Result};
use chrono::Local;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};

enum Message {
    Line(String),
    Flush(oneshot::Sender<()>),
}

/// Handle to a job log; clones share the same consumer
#[derive(Debug, Clone)]
pub struct JobLog {
    tx: mpsc::UnboundedSender<Message>,
    path: PathBuf,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Line(line) => f.debug_tuple("Line").field(line).finish(),
            Message::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl JobLog {
    /// Open `path` for appending and start the consumer task
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| OdmError::FileIoError(format!("open: {} - {}", path.display(), e)))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let log_path = path.to_path_buf();

        tokio::spawn(async move {
            let mut writer = BufWriter::new(file);
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Line(line) => {
                        if let Err(e) = writer.write_all(line.as_bytes()).await {
                            tracing::error!(path = %log_path.display(), "Job log write failed: {}", e);
                        }
                    }
                    Message::Flush(ack) => {
                        if let Err(e) = writer.flush().await {
                            tracing::error!(path = %log_path.display(), "Job log flush failed: {}", e);
                        }
                        let _ = ack.send(());
                    }
                }
            }
            if let Err(e) = writer.flush().await {
                tracing::error!(path = %log_path.display(), "Job log flush failed: {}", e);
            }
        });

        Ok(Self {
            tx,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line
    pub fn log<S: AsRef<str>>(&self, message: S) {
        let line = format!(
            "{} {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            message.as_ref()
        );
        if self.tx.send(Message::Line(line)).is_err() {
            tracing::warn!(path = %self.path.display(), "Job log consumer has stopped");
        }
    }

    /// Wait until every line sent so far is on disk
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Message::Flush(ack_tx))
            .map_err(|_| OdmError::internal("job log consumer has stopped"))?;
        ack_rx
            .await
            .map_err(|_| OdmError::internal("job log consumer has stopped"))
    }

    /// Record how a job ended and wait until the log is on disk
    ///
    /// Failures are written as an `ERR:` line. Call this on every exit path
    /// so buffered lines survive the runtime shutting down.
    pub async fn finish<T, E: std::fmt::Display>(
        &self,
        outcome: &std::result::Result<T, E>,
    ) -> Result<()> {
        match outcome {
            Ok(_) => self.log("Job finished"),
            Err(e) => self.log(format!("ERR: {}", e)),
        }
        self.flush().await
    }
}

/// Job identifier for a descriptor: hex SHA-1 of its bytes
pub fn job_id(descriptor: &[u8]) -> String {
    hex::encode(Sha1::digest(descriptor))
}
