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


//! Part downloader
//!
//! # Flow
//! 1. Acquire the license (cached, see `LicenseCache`)
//! 2. Pick the best format and its download base URL
//! 3. Create `<output>/<Author_Title>` and copy the descriptor into it
//! 4. Queue one job per incomplete part, plus the cover art
//! 5. Drain the queue with N workers and wait for all of them
//!
//! # Resume
//! A part whose file already has the declared size is skipped without a
//! request. Any other file is overwritten from the start.
//!
//! # Failures
//! Descriptor, license and format errors abort before anything is queued.
//! A failing job never stops its siblings; its error is reported on the
//! outcome channel and ends up in [`DownloadReport::failed`].

use crate::api::client::OdmClient;
use crate::api::descriptor::{Descriptor, Metadata, Part};
use crate::api::format::{choose_best_format, download_url, part_url};
use crate::api::license::{License, LicenseCache};
use crate::download::stream::{is_complete, is_non_empty, write_body};
use crate::error::{OdmError, Result};
use crate::file::paths::is_plain_file_name;
use crate::job_log::JobLog;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 10;

/// File name of the downloaded cover art
pub const COVER_FILE_NAME: &str = "folder.jpg";

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory the book folder is created in
    pub output_directory: PathBuf,

    /// Number of concurrent workers
    pub workers: usize,

    /// Log every job at info level
    pub verbose: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            workers: DEFAULT_WORKERS,
            verbose: false,
        }
    }
}

/// A part that could not be downloaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedJob {
    /// Local file name of the part
    pub part: String,
    pub message: String,
}

/// What happened to the cover art
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum CoverOutcome {
    /// Metadata has no cover URL
    NotRequested,
    /// A non-empty `folder.jpg` was already present
    AlreadyPresent,
    Downloaded,
    Failed(String),
}

/// Result of one download batch
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    /// Book folder the parts were written to
    pub folder: PathBuf,
    /// Parts already complete on disk
    pub skipped: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedJob>,
    pub cover: CoverOutcome,
    /// Jobs taken off the queue by the workers
    pub jobs_consumed: usize,
}

impl DownloadReport {
    /// Every part is on disk
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn part failures into an error
    ///
    /// Cover art failures are not counted.
    pub fn into_result(self) -> Result<Self> {
        match self.failed.as_slice() {
            [] => Ok(self),
            [only] => Err(OdmError::part_failed(only.part.clone(), only.message.clone())),
            failed => Err(OdmError::part_failed(
                failed
                    .iter()
                    .map(|f| f.part.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                format!("{} of {} parts failed", failed.len(), self.total_parts()),
            )),
        }
    }

    fn total_parts(&self) -> usize {
        self.skipped.len() + self.succeeded.len() + self.failed.len()
    }
}

#[derive(Debug)]
enum Job {
    Part {
        part: Part,
        url: String,
        destination: PathBuf,
    },
    Cover {
        url: String,
        destination: PathBuf,
    },
}

impl Job {
    fn label(&self) -> String {
        match self {
            Job::Part { part, .. } => part.local_file_name().to_string(),
            Job::Cover { .. } => "cover art".to_string(),
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Part(String, Result<u64>),
    Cover(Result<u64>),
}

/// Downloads every part of a descriptor with a fixed worker pool
pub struct PartDownloader {
    client: OdmClient,
    config: DownloadConfig,
    job_log: Option<JobLog>,
}

impl PartDownloader {
    pub fn new(client: OdmClient, config: DownloadConfig) -> Self {
        Self {
            client,
            config,
            job_log: None,
        }
    }

    /// Also append progress lines to a job log
    pub fn with_job_log(mut self, job_log: JobLog) -> Self {
        self.job_log = Some(job_log);
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    fn event(&self, message: String) {
        if self.config.verbose {
            tracing::info!("{}", message);
        } else {
            tracing::debug!("{}", message);
        }
        if let Some(log) = &self.job_log {
            log.log(message);
        }
    }

    /// Download all parts and the cover art of `descriptor`
    pub async fn download(
        &self,
        descriptor: &Descriptor,
        licenses: &LicenseCache,
    ) -> Result<DownloadReport> {
        let license = licenses.get_license(&self.client).await?;

        let format = choose_best_format(&descriptor.formats)?;
        let base_url = download_url(format)?;

        let metadata = descriptor.metadata().unwrap_or_else(|e| {
            tracing::warn!("Could not read book metadata: {}", e);
            Metadata::default()
        });

        let folder = self.config.output_directory.join(metadata.folder_name());
        tokio::fs::create_dir_all(&folder).await.map_err(|e| {
            OdmError::FileIoError(format!("create: {} - {}", folder.display(), e))
        })?;

        let descriptor_copy = folder.join(descriptor.file_name());
        tokio::fs::write(&descriptor_copy, descriptor.raw_bytes())
            .await
            .map_err(|e| {
                OdmError::FileIoError(format!("write: {} - {}", descriptor_copy.display(), e))
            })?;

        self.event(format!(
            "Downloading {} parts of '{}' ({}) to {}",
            format.parts.len(),
            metadata.title,
            format.name,
            folder.display()
        ));

        let mut report = DownloadReport {
            folder: folder.clone(),
            skipped: Vec::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            cover: CoverOutcome::NotRequested,
            jobs_consumed: 0,
        };

        let mut jobs = Vec::with_capacity(format.parts.len() + 1);
        for part in &format.parts {
            if !is_plain_file_name(part.local_file_name()) {
                report.failed.push(FailedJob {
                    part: part.file_name.clone(),
                    message: "filename does not name a local file".to_string(),
                });
                continue;
            }
            let destination = folder.join(part.local_file_name());
            if is_complete(&destination, part.file_size).await {
                self.event(format!("Skipping {}, already downloaded", part.local_file_name()));
                report.skipped.push(part.local_file_name().to_string());
                continue;
            }
            jobs.push(Job::Part {
                part: part.clone(),
                url: part_url(base_url, &part.file_name),
                destination,
            });
        }

        let cover_path = folder.join(COVER_FILE_NAME);
        if metadata.cover_url.is_empty() {
            report.cover = CoverOutcome::NotRequested;
        } else if is_non_empty(&cover_path).await {
            report.cover = CoverOutcome::AlreadyPresent;
        } else {
            jobs.push(Job::Cover {
                url: metadata.cover_url.clone(),
                destination: cover_path,
            });
        }

        let outcomes = self.run_pool(jobs, license).await;
        report.jobs_consumed = outcomes.len();

        for outcome in outcomes {
            match outcome {
                Outcome::Part(name, Ok(bytes)) => {
                    self.event(format!("Finished {} ({} bytes)", name, bytes));
                    report.succeeded.push(name);
                }
                Outcome::Part(name, Err(e)) => {
                    tracing::error!(part = %name, "Download failed: {}", e);
                    self.event(format!("ERR: {} failed: {}", name, e));
                    report.failed.push(FailedJob {
                        part: name,
                        message: e.to_string(),
                    });
                }
                Outcome::Cover(Ok(_)) => {
                    self.event("Saved cover art".to_string());
                    report.cover = CoverOutcome::Downloaded;
                }
                Outcome::Cover(Err(e)) => {
                    tracing::warn!("Cover art download failed: {}", e);
                    report.cover = CoverOutcome::Failed(e.to_string());
                }
            }
        }

        // Completion order is arbitrary; report in part order
        let order = |name: &str| {
            format
                .parts
                .iter()
                .position(|p| p.local_file_name() == name)
                .unwrap_or(usize::MAX)
        };
        report.succeeded.sort_by_key(|name| order(name));
        report.failed.sort_by_key(|f| order(&f.part));

        self.event(format!(
            "Done: {} downloaded, {} skipped, {} failed",
            report.succeeded.len(),
            report.skipped.len(),
            report.failed.len()
        ));

        Ok(report)
    }

    /// Drain `jobs` with the worker pool and return every outcome
    ///
    /// Returns only after the queue is closed and every worker has exited.
    async fn run_pool(&self, jobs: Vec<Job>, license: License) -> Vec<Outcome> {
        let workers = self.config.workers.max(1);
        let (job_tx, job_rx) = mpsc::channel::<Job>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<Outcome>();
        let license = Arc::new(license);

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let job_rx = Arc::clone(&job_rx);
                let outcome_tx = outcome_tx.clone();
                let client = self.client.clone();
                let license = Arc::clone(&license);
                let verbose = self.config.verbose;

                tokio::spawn(async move {
                    loop {
                        let job = job_rx.lock().await.recv().await;
                        let job = match job {
                            Some(job) => job,
                            None => break,
                        };

                        if verbose {
                            tracing::info!("Downloading {}", job.label());
                        }
                        let outcome = run_job(&client, &license, job).await;
                        if outcome_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(outcome_tx);

        for job in jobs {
            if job_tx.send(job).await.is_err() {
                tracing::error!("All download workers stopped early");
                break;
            }
        }
        drop(job_tx);

        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!("Download worker panicked: {}", e);
            }
        }

        let mut outcomes = Vec::new();
        while let Some(outcome) = outcome_rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

async fn run_job(client: &OdmClient, license: &License, job: Job) -> Outcome {
    match job {
        Job::Part {
            part,
            url,
            destination,
        } => {
            let name = part.local_file_name().to_string();
            let result = fetch_part(client, license, &url, &destination).await;
            Outcome::Part(name, result)
        }
        Job::Cover { url, destination } => Outcome::Cover(fetch_cover(client, &url, &destination).await),
    }
}

async fn fetch_part(client: &OdmClient, license: &License, url: &str, destination: &Path) -> Result<u64> {
    let response = client.download_part(url, license).await?;
    write_body(response, destination).await
}

async fn fetch_cover(client: &OdmClient, url: &str, destination: &Path) -> Result<u64> {
    let response = client.fetch(url).await?;
    write_body(response, destination).await
}
