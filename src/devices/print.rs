//! Print Device: turns print requests into physical prints
//!
//! Each request becomes a job with its own temp file. The file is removed
//! once per job: right away when the download fails, otherwise when the
//! cleanup timer armed at download completion fires.
//!
//! Only the most recent finished jobs are remembered. Print requests and
//! purchase confirmations still waiting for their counterpart are bounded
//! too; the oldest is forgotten first.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

use crate::config::PrintConfig;
use crate::printing::{PrintOptions, choose_printer, direct_image_url, parse_listing};
use crate::protocol::{Command, DeviceIdentity};
use crate::remote::{CommandError, CommandTable, no_args};
use crate::timer::{Scheduler, TimerId};
use crate::Result;

/// Finished jobs kept for the `jobs` listing
const FINISHED_JOBS_KEPT: usize = 16;

/// Links held on either side of the purchase handshake
const HELD_LINKS_MAX: usize = 32;

/// Job handle, unique per device run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Submitted,
    Failed,
}

/// Timers the print station runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintTimer {
    /// Delete a job's downloaded file
    Cleanup(JobId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub id: JobId,
    pub url: String,
    pub path: PathBuf,
    pub status: JobStatus,
    pub printer: Option<String>,
    cleanup: Option<TimerId>,
    cleaned: bool,
}

impl PrintJob {
    /// Whether the temp file has been deleted
    #[must_use]
    pub const fn cleaned(&self) -> bool {
        self.cleaned
    }

    const fn finished(&self) -> bool {
        self.cleaned && !matches!(self.status, JobStatus::Pending)
    }
}

/// Output for the owning loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintEffect {
    /// Fetch `url` into `dest`, reporting back through [`Print::downloaded`]
    Download {
        job: JobId,
        url: String,
        dest: PathBuf,
    },
    /// Query the printer listing, reporting back through [`Print::listed`]
    ListPrinters { job: JobId },
    /// Send the file to a printer, reporting back through [`Print::submitted`]
    Submit {
        job: JobId,
        printer: String,
        options: PrintOptions,
        path: PathBuf,
    },
    DeleteTemp { job: JobId, path: PathBuf },
}

/// Print station state machine
pub struct Print<S> {
    identity: DeviceIdentity,
    config: PrintConfig,
    options: PrintOptions,
    timers: S,
    session: Option<String>,
    jobs: Vec<PrintJob>,
    next_job: u64,
    awaiting_purchase: VecDeque<String>,
    purchased: VecDeque<String>,
    outbox: Vec<PrintEffect>,
}

impl<S: Scheduler<PrintTimer>> Print<S> {
    #[must_use]
    pub fn new(identity: DeviceIdentity, config: PrintConfig, timers: S) -> Self {
        let options = PrintOptions::from_config(&config);
        Self {
            identity,
            config,
            options,
            timers,
            session: None,
            jobs: Vec::new(),
            next_job: 0,
            awaiting_purchase: VecDeque::new(),
            purchased: VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    #[must_use]
    pub fn jobs(&self) -> &[PrintJob] {
        &self.jobs
    }

    #[must_use]
    pub fn job(&self, id: JobId) -> Option<&PrintJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Print links waiting for their purchase confirmation
    #[must_use]
    pub fn awaiting_purchase(&self) -> usize {
        self.awaiting_purchase.len()
    }

    pub const fn timers_mut(&mut self) -> &mut S {
        &mut self.timers
    }

    pub fn take_effects(&mut self) -> Vec<PrintEffect> {
        std::mem::take(&mut self.outbox)
    }

    pub fn on_session(&mut self, session: String) {
        self.session = Some(session);
    }

    /// Command decoded from a chat message
    pub fn on_command(&mut self, command: Command) {
        match command {
            Command::Print { link } => {
                let url = direct_image_url(&link);
                tracing::info!(%url, "print requested");
                if !self.config.require_purchase || take_link(&mut self.purchased, &url) {
                    self.start_job(url);
                } else {
                    tracing::info!(%url, "print held until purchase is confirmed");
                    hold_link(&mut self.awaiting_purchase, url);
                }
            }
            Command::PurchaseConfirmed { link } => {
                let url = direct_image_url(&link);
                if !self.config.require_purchase {
                    tracing::debug!(%url, "purchase confirmed");
                } else if take_link(&mut self.awaiting_purchase, &url) {
                    tracing::info!(%url, "purchase confirmed, releasing print");
                    self.start_job(url);
                } else {
                    tracing::debug!(%url, "purchase confirmed before print request");
                    hold_link(&mut self.purchased, url);
                }
            }
            other => tracing::trace!(opcode = other.opcode(), "not for the printer"),
        }
    }

    /// Result of a [`PrintEffect::Download`]
    pub fn downloaded(&mut self, id: JobId, result: Result<u64>) {
        let cleanup_after = self.config.cleanup_after;
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) else {
            return;
        };
        match result {
            Ok(bytes) => {
                tracing::info!(job = %id, bytes, path = %job.path.display(), "image downloaded");
                job.cleanup = Some(self.timers.start(cleanup_after, PrintTimer::Cleanup(id)));
                self.outbox.push(PrintEffect::ListPrinters { job: id });
            }
            Err(e) => {
                tracing::error!(job = %id, url = %job.url, error = %e, "download failed");
                job.status = JobStatus::Failed;
                let path = job.path.clone();
                self.delete_temp(id, path);
            }
        }
    }

    /// Result of a [`PrintEffect::ListPrinters`]
    pub fn listed(&mut self, id: JobId, listing: Result<String>) {
        let patterns = self.config.printer_match.clone();
        let options = self.options.clone();
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) else {
            return;
        };
        let listing = match listing {
            Ok(listing) => listing,
            Err(e) => {
                tracing::error!(job = %id, error = %e, "cannot list printers");
                job.status = JobStatus::Failed;
                return;
            }
        };

        let names = parse_listing(&listing);
        let Some(printer) = choose_printer(&names, &patterns) else {
            tracing::error!(job = %id, patterns = ?patterns, %listing, "no matching printer");
            job.status = JobStatus::Failed;
            return;
        };

        tracing::info!(job = %id, printer, "printer selected");
        job.printer = Some(printer.to_string());
        self.outbox.push(PrintEffect::Submit {
            job: id,
            printer: printer.to_string(),
            options,
            path: job.path.clone(),
        });
    }

    /// Result of a [`PrintEffect::Submit`]
    pub fn submitted(&mut self, id: JobId, result: Result<String>) {
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) else {
            return;
        };
        match result {
            Ok(ack) => {
                tracing::info!(job = %id, %ack, "print job submitted");
                job.status = JobStatus::Submitted;
            }
            Err(e) => {
                tracing::error!(job = %id, error = %e, "print failed");
                job.status = JobStatus::Failed;
            }
        }
        self.prune_finished();
    }

    /// A timer started by this machine fired
    pub fn on_timer(&mut self, id: TimerId, timer: PrintTimer) {
        if !self.timers.complete(id) {
            return;
        }
        let PrintTimer::Cleanup(job_id) = timer;
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == job_id) else {
            return;
        };
        if job.cleanup != Some(id) {
            return;
        }
        job.cleanup = None;
        let path = job.path.clone();
        self.delete_temp(job_id, path);
    }

    fn start_job(&mut self, url: String) {
        self.next_job += 1;
        let id = JobId(self.next_job);
        let path = self.temp_path(id);
        tracing::debug!(job = %id, path = %path.display(), "job created");
        self.outbox.push(PrintEffect::Download {
            job: id,
            url: url.clone(),
            dest: path.clone(),
        });
        self.jobs.push(PrintJob {
            id,
            url,
            path,
            status: JobStatus::Pending,
            printer: None,
            cleanup: None,
            cleaned: false,
        });
    }

    fn temp_path(&self, id: JobId) -> PathBuf {
        let name = format!("print_{}.jpg", chrono::Utc::now().timestamp_millis());
        let path = self.config.temp_dir.join(&name);
        if self.jobs.iter().any(|j| j.path == path) {
            return self
                .config
                .temp_dir
                .join(format!("print_{}_{}.jpg", chrono::Utc::now().timestamp_millis(), id.0));
        }
        path
    }

    fn delete_temp(&mut self, id: JobId, path: PathBuf) {
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) else {
            return;
        };
        if job.cleaned {
            return;
        }
        job.cleaned = true;
        self.outbox.push(PrintEffect::DeleteTemp { job: id, path });
        self.prune_finished();
    }

    /// Drop the oldest finished jobs beyond [`FINISHED_JOBS_KEPT`]
    fn prune_finished(&mut self) {
        let finished = self.jobs.iter().filter(|j| j.finished()).count();
        let mut excess = finished.saturating_sub(FINISHED_JOBS_KEPT);
        if excess == 0 {
            return;
        }
        self.jobs.retain(|j| {
            if excess > 0 && j.finished() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}

fn hold_link(held: &mut VecDeque<String>, url: String) {
    if held.contains(&url) {
        return;
    }
    if held.len() >= HELD_LINKS_MAX {
        let oldest = held.pop_front().unwrap_or_default();
        tracing::warn!(url = %oldest, "too many unmatched links, forgetting the oldest");
    }
    held.push_back(url);
}

fn take_link(held: &mut VecDeque<String>, url: &str) -> bool {
    held.iter()
        .position(|u| u == url)
        .and_then(|i| held.remove(i))
        .is_some()
}

/// Remote commands the print station answers
#[must_use]
pub fn commands<S: Scheduler<PrintTimer>>() -> CommandTable<Print<S>> {
    CommandTable::<Print<S>>::new()
        .with("status", "job counts", |p, args| {
            no_args(args)?;
            let count = |status| p.jobs.iter().filter(|j| j.status == status).count();
            Ok(format!(
                "{} pending, {} submitted, {} failed, {} awaiting purchase",
                count(JobStatus::Pending),
                count(JobStatus::Submitted),
                count(JobStatus::Failed),
                p.awaiting_purchase.len()
            ))
        })
        .with("session", "session id", |p, args| {
            no_args(args)?;
            Ok(p.session.clone().unwrap_or_else(|| "none".to_string()))
        })
        .with("identity", "hub name and room", |p, args| {
            no_args(args)?;
            Ok(format!("{} {}", p.identity.name(), p.identity.room()))
        })
        .with("jobs", "list print jobs", |p, args| {
            no_args(args)?;
            if p.jobs.is_empty() {
                return Ok("no jobs".to_string());
            }
            Ok(p.jobs
                .iter()
                .map(|j| {
                    format!(
                        "{} {:?} {} {}",
                        j.id,
                        j.status,
                        j.printer.as_deref().unwrap_or("-"),
                        j.url
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        })
        .with(
            "printers-match",
            "show or replace printer name patterns: printers-match(a, b)",
            |p, args| {
                if !args.is_empty() {
                    if args.iter().any(|a| a.trim().is_empty()) {
                        return Err(CommandError::Arguments("empty pattern".to_string()));
                    }
                    p.config.printer_match = args.to_vec();
                }
                Ok(p.config.printer_match.join(", "))
            },
        )
}
