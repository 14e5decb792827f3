//! Event loops that drive the station machines
//!
//! Every loop owns one machine and multiplexes hub events, timer firings,
//! backend completions and local input with `tokio::select!`. Backend calls
//! run in spawned tasks and report back over a channel, so the machine
//! itself is only ever touched from the loop.

use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::sync::mpsc;

use super::admin::{self, Admin, AdminEffect};
use super::capture::{self, Capture, CaptureEffect};
use super::print::{self, JobId, Print, PrintEffect};
use super::selector::{self, FrameSelection, Selector, SelectorEffect};
use super::route_frame;
use crate::api::{AUTH_STATUS_PATH, AuthStatus};
use crate::camera::{self, Camera, CameraMode, encode_png, render};
use crate::config::Config;
use crate::printing::PrintBackend;
use crate::protocol::{DeviceIdentity, DeviceRole, FilterSpec, HubFrame};
use crate::relay::{HubClient, HubEvent, HubHandle};
use crate::remote;
use crate::storage::{Downloader, UploadReceipt, Uploader};
use crate::timer::{Fired, TokioScheduler};
use crate::{Error, Result};

/// Guest action on the kiosk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskAction {
    Begin,
    Frame(FrameSelection),
    Filter(FilterSpec),
    ConfirmFilter,
    Skip,
    Purchase(u32),
    Leave,
}

impl FromStr for KioskAction {
    type Err = String;

    /// Parse a kiosk console line (`begin`, `frame duo 2`, `filter {"sepia":"1"}`, ...)
    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match word {
            "begin" | "start" => Ok(Self::Begin),
            "frame" => {
                let mut parts = rest.split_whitespace();
                let (Some(id), Some(shots), None) = (parts.next(), parts.next(), parts.next()) else {
                    return Err("usage: frame <id> <shots>".to_string());
                };
                let shots = shots
                    .parse::<u32>()
                    .ok()
                    .and_then(NonZeroU32::new)
                    .ok_or_else(|| format!("shots must be a positive number, got '{shots}'"))?;
                Ok(Self::Frame(FrameSelection {
                    id: id.to_string(),
                    shots,
                }))
            }
            "filter" if rest.is_empty() || rest == "none" => Ok(Self::Filter(FilterSpec::none())),
            "filter" => FilterSpec::from_json(rest)
                .map(Self::Filter)
                .map_err(|e| format!("bad filter JSON: {e}")),
            "confirm" => Ok(Self::ConfirmFilter),
            "skip" => Ok(Self::Skip),
            "purchase" => rest
                .parse()
                .map(Self::Purchase)
                .map_err(|_| "usage: purchase <0-100>".to_string()),
            "leave" | "home" => Ok(Self::Leave),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// Operator input on the Admin console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Remote command line, or a local one (`clear`, `help`)
    Command(String),
    /// Chat line, typed as `say <text>`
    Message(String),
}

impl From<&str> for ConsoleInput {
    fn from(line: &str) -> Self {
        let line = line.trim();
        match line.strip_prefix("say ") {
            Some(text) => Self::Message(text.to_string()),
            None => Self::Command(line.to_string()),
        }
    }
}

fn connect(config: &Config, role: DeviceRole) -> Result<(DeviceIdentity, HubHandle)> {
    let identity = DeviceIdentity::new(role, config.devices.name_for(role));
    let client = HubClient::new(&config.hub.url, &identity, config.hub.reconnect_delay)?;
    tracing::info!(name = identity.name(), hub = client.url(), "starting station");
    Ok((identity, client.spawn()))
}

fn hub_stopped() -> Error {
    Error::Hub("hub client stopped".to_string())
}

fn log_link(event: &HubEvent) {
    match event {
        HubEvent::Connected => tracing::info!("hub connected"),
        HubEvent::Disconnected => tracing::warn!("hub disconnected, reconnecting"),
        HubEvent::Frame(_) => {}
    }
}

/// Run the kiosk until the hub client stops
///
/// # Errors
///
/// Returns error if the hub URL is invalid or the hub client stops
pub async fn run_selector(config: &Config, mut actions: mpsc::Receiver<KioskAction>) -> Result<()> {
    let (identity, mut hub) = connect(config, DeviceRole::Selector)?;
    let (timers, mut fired) = TokioScheduler::channel();
    let mut kiosk = Selector::new(identity.clone(), config.selector.clone(), timers);
    let table = selector::commands();
    let admin = config.devices.admin.clone();

    loop {
        tokio::select! {
            event = hub.recv() => {
                let event = event.ok_or_else(hub_stopped)?;
                log_link(&event);
                if let HubEvent::Frame(frame) = event {
                    if let Some(reply) = route_frame(&mut kiosk, &table, &admin, frame) {
                        hub.send(reply);
                    }
                }
            }
            Some(Fired { id, timer }) = fired.recv() => kiosk.on_timer(id, timer),
            Some(action) = actions.recv() => {
                if let Err(e) = apply_action(&mut kiosk, action) {
                    tracing::warn!(error = %e, "kiosk action refused");
                }
            }
        }

        for effect in kiosk.take_effects() {
            match effect {
                SelectorEffect::Send(command) => {
                    hub.send(HubFrame::command_message(identity.name(), &command));
                    if let Some(url) = kiosk.qr_url() {
                        tracing::debug!(%url, "download QR");
                    }
                }
                SelectorEffect::Countdown {
                    index,
                    shots,
                    remaining,
                } => tracing::info!(shot = index, shots, remaining, "countdown"),
                SelectorEffect::Restart => tracing::info!("back to start page"),
            }
        }
    }
}

fn apply_action<S>(kiosk: &mut Selector<S>, action: KioskAction) -> Result<()>
where
    S: crate::timer::Scheduler<selector::SelectorTimer>,
{
    match action {
        KioskAction::Begin => kiosk.begin(),
        KioskAction::Frame(frame) => kiosk.choose_frame(frame),
        KioskAction::Filter(filter) => kiosk.choose_filter(filter),
        KioskAction::ConfirmFilter => kiosk.confirm_filter(),
        KioskAction::Skip => {
            kiosk.skip();
            Ok(())
        }
        KioskAction::Purchase(value) => {
            kiosk.purchase_input(value)?;
            if let Some(url) = kiosk.qr_url() {
                tracing::info!(%url, "scan to download");
            }
            Ok(())
        }
        KioskAction::Leave => {
            kiosk.leave();
            Ok(())
        }
    }
}

enum CaptureDone {
    Acquired(Option<CameraMode>),
    Grabbed(Result<Vec<u8>>),
    Uploaded(Result<UploadReceipt>),
}

/// Run the camera station until the hub client stops
///
/// # Errors
///
/// Returns error if the hub URL is invalid or the hub client stops
pub async fn run_capture(
    config: &Config,
    camera: Arc<dyn Camera>,
    uploader: Arc<dyn Uploader>,
) -> Result<()> {
    let (identity, mut hub) = connect(config, DeviceRole::Capture)?;
    let (timers, mut fired) = TokioScheduler::channel();
    let mut station = Capture::new(identity.clone(), config.capture.clone(), timers);
    let table = capture::commands();
    let admin = config.devices.admin.clone();
    let high = config.capture.high_resolution;
    let (done_tx, mut done) = mpsc::unbounded_channel();

    loop {
        tokio::select! {
            event = hub.recv() => {
                let event = event.ok_or_else(hub_stopped)?;
                log_link(&event);
                if let HubEvent::Frame(frame) = event {
                    if let Some(reply) = route_frame(&mut station, &table, &admin, frame) {
                        hub.send(reply);
                    }
                }
            }
            Some(Fired { id, timer }) = fired.recv() => station.on_timer(id, timer),
            Some(result) = done.recv() => match result {
                CaptureDone::Acquired(mode) => station.camera_acquired(mode),
                CaptureDone::Grabbed(png) => station.grabbed(png),
                CaptureDone::Uploaded(receipt) => station.uploaded(receipt),
            },
        }

        for effect in station.take_effects() {
            match effect {
                CaptureEffect::Send(command) => {
                    hub.send(HubFrame::command_message(identity.name(), &command));
                }
                CaptureEffect::AcquireCamera => {
                    let camera = Arc::clone(&camera);
                    let tx = done_tx.clone();
                    tokio::spawn(async move {
                        let mode = camera::acquire(camera.as_ref(), high).await;
                        let _ = tx.send(CaptureDone::Acquired(mode));
                    });
                }
                CaptureEffect::ReleaseCamera => {
                    let camera = Arc::clone(&camera);
                    tokio::spawn(async move { camera.close().await });
                }
                CaptureEffect::SetBlur(blurred) => tracing::debug!(blurred, "preview blur"),
                CaptureEffect::PreviewFilter(css) => tracing::debug!(%css, "preview filter"),
                CaptureEffect::ShowCountdown(Some(n)) => tracing::info!(remaining = n, "countdown"),
                CaptureEffect::ShowCountdown(None) => {}
                CaptureEffect::Shutter => tracing::debug!("shutter"),
                CaptureEffect::Grab { filter } => {
                    let camera = Arc::clone(&camera);
                    let tx = done_tx.clone();
                    tokio::spawn(async move {
                        let png = grab_shot(camera.as_ref(), filter).await;
                        let _ = tx.send(CaptureDone::Grabbed(png));
                    });
                }
                CaptureEffect::Upload {
                    session,
                    filename,
                    png,
                } => {
                    let uploader = Arc::clone(&uploader);
                    let tx = done_tx.clone();
                    tokio::spawn(async move {
                        let receipt = uploader.upload(&session, &filename, png).await;
                        let _ = tx.send(CaptureDone::Uploaded(receipt));
                    });
                }
            }
        }
    }
}

/// Grab a frame and render the mirrored, filtered PNG
async fn grab_shot(camera: &dyn Camera, filter: FilterSpec) -> Result<Vec<u8>> {
    let frame: RgbaImage = camera.grab().await?;
    tokio::task::spawn_blocking(move || encode_png(&render(&frame, &filter)))
        .await
        .map_err(|e| Error::Render(format!("render task failed: {e}")))?
}

enum PrintDone {
    Downloaded(JobId, Result<u64>),
    Listed(JobId, Result<String>),
    Submitted(JobId, Result<String>),
}

/// Run the print station until the hub client stops
///
/// # Errors
///
/// Returns error if the hub URL is invalid or the hub client stops
pub async fn run_print(
    config: &Config,
    backend: Arc<dyn PrintBackend>,
    downloader: Arc<dyn Downloader>,
) -> Result<()> {
    let (identity, mut hub) = connect(config, DeviceRole::Print)?;
    let (timers, mut fired) = TokioScheduler::channel();
    let mut station = Print::new(identity, config.print.clone(), timers);
    let table = print::commands();
    let admin = config.devices.admin.clone();
    let (done_tx, mut done) = mpsc::unbounded_channel();

    loop {
        tokio::select! {
            event = hub.recv() => {
                let event = event.ok_or_else(hub_stopped)?;
                log_link(&event);
                if let HubEvent::Frame(frame) = event {
                    if let Some(reply) = route_frame(&mut station, &table, &admin, frame) {
                        hub.send(reply);
                    }
                }
            }
            Some(Fired { id, timer }) = fired.recv() => station.on_timer(id, timer),
            Some(result) = done.recv() => match result {
                PrintDone::Downloaded(job, r) => station.downloaded(job, r),
                PrintDone::Listed(job, r) => station.listed(job, r),
                PrintDone::Submitted(job, r) => station.submitted(job, r),
            },
        }

        for effect in station.take_effects() {
            let tx = done_tx.clone();
            match effect {
                PrintEffect::Download { job, url, dest } => {
                    let downloader = Arc::clone(&downloader);
                    tokio::spawn(async move {
                        let result = downloader.download(&url, &dest).await;
                        let _ = tx.send(PrintDone::Downloaded(job, result));
                    });
                }
                PrintEffect::ListPrinters { job } => {
                    let backend = Arc::clone(&backend);
                    tokio::spawn(async move {
                        let result = backend.list_printers().await;
                        let _ = tx.send(PrintDone::Listed(job, result));
                    });
                }
                PrintEffect::Submit {
                    job,
                    printer,
                    options,
                    path,
                } => {
                    let backend = Arc::clone(&backend);
                    tokio::spawn(async move {
                        let result = backend.submit(&printer, &options, &path).await;
                        let _ = tx.send(PrintDone::Submitted(job, result));
                    });
                }
                PrintEffect::DeleteTemp { job, path } => {
                    tokio::spawn(async move {
                        match tokio::fs::remove_file(&path).await {
                            Ok(()) => tracing::debug!(%job, path = %path.display(), "temp file removed"),
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                                tracing::debug!(%job, "temp file already gone");
                            }
                            Err(e) => tracing::warn!(%job, error = %e, "cannot remove temp file"),
                        }
                    });
                }
            }
        }
    }
}

/// Run the operator console until the hub client stops
///
/// Console lines (and clears) are forwarded on `console` for display.
///
/// # Errors
///
/// Returns error if the hub URL is invalid or the hub client stops
pub async fn run_admin(
    config: &Config,
    mut input: mpsc::Receiver<ConsoleInput>,
    console: mpsc::UnboundedSender<AdminEffect>,
) -> Result<()> {
    let (identity, mut hub) = connect(config, DeviceRole::Admin)?;
    let mut operator = Admin::new(identity.clone(), &config.admin);
    let table = admin::commands();

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let auth_url = format!("{}{AUTH_STATUS_PATH}", config.hub.url.trim_end_matches('/'));
    let mut poll = tokio::time::interval(config.admin.auth_poll);
    let (auth_tx, mut auth) = mpsc::unbounded_channel();

    loop {
        tokio::select! {
            event = hub.recv() => match event.ok_or_else(hub_stopped)? {
                HubEvent::Connected => tracing::info!("hub connected"),
                HubEvent::Disconnected => operator.on_disconnected(),
                HubEvent::Frame(HubFrame::Command(raw)) => {
                    if let Some(reply) = remote::dispatch(&identity, identity.name(), &table, &mut operator, &raw) {
                        hub.send(HubFrame::CommandResponse(reply));
                    }
                }
                HubEvent::Frame(frame) => operator.on_frame(frame),
            },
            _ = poll.tick() => {
                let http = http.clone();
                let url = auth_url.clone();
                let tx = auth_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(fetch_auth_status(&http, &url).await);
                });
            }
            Some(status) = auth.recv() => operator.auth_status(status),
            Some(line) = input.recv() => match line {
                ConsoleInput::Command(raw) => operator.send_command(&raw),
                ConsoleInput::Message(text) => operator.send_message(&text),
            },
        }

        for effect in operator.take_effects() {
            match effect {
                AdminEffect::Send(frame) => hub.send(frame),
                other => {
                    let _ = console.send(other);
                }
            }
        }
    }
}

async fn fetch_auth_status(http: &reqwest::Client, url: &str) -> Result<bool> {
    let status: AuthStatus = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(status.google_drive_authenticated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kiosk_lines() {
        assert_eq!("begin".parse::<KioskAction>(), Ok(KioskAction::Begin));
        assert_eq!(
            "frame duo 2".parse::<KioskAction>(),
            Ok(KioskAction::Frame(FrameSelection {
                id: "duo".to_string(),
                shots: NonZeroU32::new(2).unwrap(),
            }))
        );
        assert_eq!(
            "filter none".parse::<KioskAction>(),
            Ok(KioskAction::Filter(FilterSpec::none()))
        );
        assert!(matches!(
            r#"filter {"sepia":"1"}"#.parse::<KioskAction>(),
            Ok(KioskAction::Filter(f)) if f.css() == "sepia(1)"
        ));
        assert_eq!("purchase 100".parse::<KioskAction>(), Ok(KioskAction::Purchase(100)));
    }

    #[test]
    fn bad_kiosk_lines() {
        assert!("frame duo 0".parse::<KioskAction>().is_err());
        assert!("frame duo".parse::<KioskAction>().is_err());
        assert!("purchase lots".parse::<KioskAction>().is_err());
        assert!("dance".parse::<KioskAction>().is_err());
    }

    #[test]
    fn console_lines() {
        assert_eq!(
            ConsoleInput::from("say hi all"),
            ConsoleInput::Message("hi all".to_string())
        );
        assert_eq!(
            ConsoleInput::from(" status -> Print "),
            ConsoleInput::Command("status -> Print".to_string())
        );
    }
}
