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


use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use odm_core::api::{Descriptor, LicenseCache, OdmClient};
use odm_core::audio::{ChapterSplitter, FfprobeTagReader, SplitOptions};
use odm_core::config::Settings;
use odm_core::download::PartDownloader;
use odm_core::job_log::{job_id, JobLog};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "odm-cli")]
#[command(about = "Download OverDrive audiobooks and split them into chapters", long_about = None)]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append job events to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every part of an .odm loan
    Download {
        /// Path to the .odm file
        odm: PathBuf,
        /// Directory the book folder is created in
        outdir: Option<PathBuf>,
        /// Return the loan once every part is downloaded
        #[arg(short, long = "return")]
        return_loan: bool,
        /// Log every part
        #[arg(short, long)]
        verbose: bool,
        /// Number of concurrent downloads
        #[arg(short, long)]
        workers: Option<usize>,
        /// Print the download report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Return an .odm loan early
    Return {
        /// Path to the .odm file
        odm: PathBuf,
    },
    /// Split downloaded parts into one file per chapter
    Split {
        /// Directory holding the parts
        directory: PathBuf,
        /// Output directory (defaults to the parts directory)
        outdir: Option<PathBuf>,
        /// Zip and delete the original parts on success
        #[arg(short, long)]
        delete: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(log_file) = cli.log_file {
        settings.log_file = Some(log_file);
    }

    let verbose = matches!(cli.command, Commands::Download { verbose: true, .. })
        || settings.download.verbose;
    odm_core::logging::init(verbose);

    match cli.command {
        Commands::Download {
            odm,
            outdir,
            return_loan,
            verbose,
            workers,
            json,
        } => {
            if let Some(outdir) = outdir {
                settings.download.output_directory = outdir;
            }
            if let Some(workers) = workers {
                settings.download.workers = workers;
            }
            settings.download.verbose |= verbose;
            settings.validate()?;

            let descriptor = Descriptor::from_file(&odm)
                .await
                .with_context(|| format!("reading {}", odm.display()))?;
            let client = OdmClient::with_config(settings.client_config())?;
            let licenses = LicenseCache::for_descriptor(&descriptor);

            let mut downloader = PartDownloader::new(client.clone(), settings.download.clone());
            let job_log = match &settings.log_file {
                Some(path) => {
                    let log = JobLog::open(path).await?;
                    log.log(format!("Job {} started for {}", job_id(descriptor.raw_bytes()), odm.display()));
                    downloader = downloader.with_job_log(log.clone());
                    Some(log)
                }
                None => None,
            };

            let result = download(&downloader, &client, &descriptor, &licenses, return_loan, json).await;

            if let Some(log) = &job_log {
                log.finish(&result).await?;
            }
            result?;
        }
        Commands::Return { odm } => {
            let descriptor = Descriptor::from_file(&odm)
                .await
                .with_context(|| format!("reading {}", odm.display()))?;
            let client = OdmClient::with_config(settings.client_config())?;
            client.return_loan(&descriptor.early_return_url).await?;
            println!("Loan returned");
        }
        Commands::Split {
            directory,
            outdir,
            delete,
        } => {
            let options = SplitOptions {
                directory,
                outdir,
                delete_sources: delete,
            };
            let splitter = ChapterSplitter::new(FfprobeTagReader::new());
            let summary = splitter.run(&options).await?;

            println!("{} chapters written", summary.written.len());
            if !summary.renamed.is_empty() {
                println!("{} playlist entries renamed", summary.renamed.len());
            }
            if let Some(archive) = &summary.archive {
                println!("Original parts saved to {}", archive.display());
            }
            if !summary.is_success() {
                for failed in &summary.failed {
                    eprintln!("  {}: {}", failed.file_name, failed.message);
                }
                bail!("{} chapters failed", summary.failed.len());
            }
        }
    }

    Ok(())
}

async fn download(
    downloader: &PartDownloader,
    client: &OdmClient,
    descriptor: &Descriptor,
    licenses: &LicenseCache,
    return_loan: bool,
    json: bool,
) -> Result<()> {
    let report = match downloader.download(descriptor, licenses).await {
        Ok(report) => report,
        Err(e) => bail!(e.user_message()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}: {} downloaded, {} already present, {} failed",
            report.folder.display(),
            report.succeeded.len(),
            report.skipped.len(),
            report.failed.len()
        );
        for failed in &report.failed {
            println!("  {}: {}", failed.part, failed.message);
        }
    }

    if return_loan {
        if report.is_complete() {
            client.return_loan(&descriptor.early_return_url).await?;
            println!("Loan returned");
        } else {
            println!("Not returning the loan: some parts failed");
        }
    }

    report.into_result()?;
    Ok(())
}
