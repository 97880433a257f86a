// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// kioskprint: walk-up print kiosk backend
//
// Entry point. Initialises logging and backend services, then runs one CLI
// command (`devices`, `submit`, `status`, `config`).
//
// Workers live in this process, so `submit` always stays until the job
// finishes; `--wait` additionally prints each progress change.

mod services;

use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kioskprint_core::KioskError;
use kioskprint_core::human_errors::humanize_error;
use kioskprint_core::types::{ColorMode, JobId, JobStatus, PageSelection, PrintJob, PrintOptions};
use kioskprint_dispatch::SubmitRequest;

use services::engine_services::EngineServices;

const FOLLOW_INTERVAL: Duration = Duration::from_millis(250);

/// kioskprint - walk-up print kiosk backend
#[derive(Parser, Debug)]
#[command(name = "kioskprint")]
#[command(version)]
#[command(about = "Dispatch documents to kiosk printers and track their progress", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// List the printers the kiosk can reach
    Devices,

    /// Submit a document and wait until it has printed
    Submit(SubmitArgs),

    /// Show the current state of a job
    Status {
        /// Job id returned by `submit`
        job_id: String,
    },

    /// Print the active configuration
    Config {
        /// Also write it to config.json in the data directory
        #[arg(long)]
        save: bool,
    },
}

#[derive(Args, Debug, PartialEq)]
struct SubmitArgs {
    /// Local path or http(s) link to the document
    document_ref: String,

    /// Printer to send the job to
    #[arg(long)]
    device: String,

    /// Number of copies
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    copies: u32,

    /// Print in black and white
    #[arg(long)]
    mono: bool,

    /// Pages to print: all, odd, even, or a range such as 1-3,5
    #[arg(long, value_parser = parse_pages)]
    pages: Option<PageSelection>,

    /// Display name (default: the file name of the reference)
    #[arg(long)]
    name: Option<String>,

    /// Caller-chosen job id (default: a new UUID)
    #[arg(long)]
    job_id: Option<String>,

    /// Print each progress change while waiting
    #[arg(long)]
    wait: bool,
}

impl SubmitArgs {
    fn into_request(self) -> SubmitRequest {
        SubmitRequest {
            job_id: self.job_id,
            document_ref: self.document_ref,
            document_name: self.name,
            device: self.device,
            options: PrintOptions {
                copies: self.copies,
                color_mode: if self.mono {
                    ColorMode::Monochrome
                } else {
                    ColorMode::Color
                },
                page_selection: self.pages.unwrap_or(PageSelection::All),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let svc = match EngineServices::init() {
        Ok(svc) => svc,
        Err(e) => {
            tracing::error!(error = %e, "persistent storage failed, using in-memory fallback");
            match EngineServices::fallback() {
                Ok(svc) => svc,
                Err(e) => {
                    eprintln!("kioskprint: cannot start: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    let result = run(&svc, cli.command).await;
    svc.shutdown();

    match result {
        Ok(code) => code,
        Err(e) => {
            let human = humanize_error(&e);
            eprintln!("{}\n{}", human.message, human.suggestion);
            tracing::debug!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(svc: &EngineServices, command: Command) -> Result<ExitCode, KioskError> {
    match command {
        Command::Devices => {
            for device in svc.devices().await? {
                println!("{device}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Status { job_id } => {
            let job_id = JobId::from(job_id.as_str());
            match svc.status(&job_id).await? {
                Some(job) => {
                    print_job(&job)?;
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("no job with id {job_id}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Command::Config { save } => {
            let config = svc.config();
            println!("{}", serde_json::to_string_pretty(config)?);
            if save {
                let path = svc.save_config(config)?;
                eprintln!("saved to {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Submit(args) => {
            let follow = args.wait;
            let response = svc.submit(args.into_request()).await?;
            println!("{}", serde_json::to_string(&response)?);
            if !response.accepted {
                return Ok(ExitCode::FAILURE);
            }

            let job = if follow {
                follow_job(svc, &response.job_id).await?
            } else {
                svc.wait(&response.job_id, svc.job_timeout()).await?
            };
            print_job(&job)?;
            Ok(if job.status == JobStatus::Completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

/// Print each progress change until the job is terminal.
async fn follow_job(svc: &EngineServices, job_id: &JobId) -> Result<PrintJob, KioskError> {
    let deadline = tokio::time::Instant::now() + svc.job_timeout();
    let mut last = None;
    loop {
        if let Some(job) = svc.status(job_id).await? {
            let line = format!("{:>3}% {:<10} {}", job.progress, job.status.as_str(), job.status_message);
            if last.as_ref() != Some(&line) {
                eprintln!("{line}");
                last = Some(line);
            }
            if job.status.is_terminal() {
                return Ok(job);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(KioskError::Timeout {
                operation: format!("waiting for job {job_id}"),
                seconds: svc.job_timeout().as_secs(),
            });
        }
        tokio::time::sleep(FOLLOW_INTERVAL).await;
    }
}

fn print_job(job: &PrintJob) -> Result<(), KioskError> {
    println!("{}", serde_json::to_string_pretty(job)?);
    Ok(())
}

fn parse_pages(raw: &str) -> Result<PageSelection, String> {
    Ok(match raw.trim().to_ascii_lowercase().as_str() {
        "" | "all" => PageSelection::All,
        "odd" => PageSelection::Odd,
        "even" => PageSelection::Even,
        _ => PageSelection::Custom(raw.trim().to_string()),
    })
}
