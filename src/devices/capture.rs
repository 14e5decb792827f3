//! Capture Device: the camera station
//!
//! Grabs a mirrored, filtered still on each `:capture` (or at the end of a
//! `:countdown-N-capture`), uploads it under the hub-issued session and
//! announces the result. The camera is announced ready again one ready delay
//! after every attempt, whatever its outcome.
//!
//! A frame is handed off for review once as many attempts as it has shots
//! have finished, using the last shot that reached storage. A capture asked
//! for while another is in flight runs as soon as that one finishes.

use std::num::NonZeroU32;
use std::time::Duration;

use crate::camera::CameraMode;
use crate::config::CaptureConfig;
use crate::protocol::{Command, DeviceIdentity, FilterSpec};
use crate::remote::{CommandError, CommandTable, no_args};
use crate::storage::UploadReceipt;
use crate::timer::{Scheduler, TimerId};
use crate::Result;

const TICK: Duration = Duration::from_secs(1);

/// Station state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Waiting for a visit; preview blurred or not
    Idle { blurred: bool },
    /// Visit running, ready to shoot
    Armed,
    /// Grabbing and rendering a frame
    Capturing,
    /// Sending the shot to storage
    Uploading,
}

/// Camera availability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    Off,
    Acquiring,
    On(CameraMode),
}

/// Timers the station runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTimer {
    /// One second of the local countdown
    Countdown,
    /// Re-announce readiness after an attempt
    Ready,
}

/// Output for the owning loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEffect {
    Send(Command),
    /// Open the camera, reporting back through [`Capture::camera_acquired`]
    AcquireCamera,
    ReleaseCamera,
    SetBlur(bool),
    /// Shutter sound, played as the frame is grabbed
    Shutter,
    /// Live preview CSS filter
    PreviewFilter(String),
    /// On-screen countdown digit, `None` hides it
    ShowCountdown(Option<u32>),
    /// Grab and render a frame, reporting back through [`Capture::grabbed`]
    Grab { filter: FilterSpec },
    /// Upload a rendered shot, reporting back through [`Capture::uploaded`]
    Upload {
        session: String,
        filename: String,
        png: Vec<u8>,
    },
}

/// Frame layout announced by the kiosk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTarget {
    pub id: String,
    pub shots: NonZeroU32,
}

/// Camera station state machine
pub struct Capture<S> {
    identity: DeviceIdentity,
    config: CaptureConfig,
    timers: S,
    state: CaptureState,
    camera: CameraStatus,
    filter: FilterSpec,
    session: Option<String>,
    frame: Option<FrameTarget>,
    shots_uploaded: u32,
    attempts: u32,
    last_upload: Option<UploadReceipt>,
    /// Between `:start` and `:end`
    visit_open: bool,
    /// Capture requested while one was in flight
    queued: bool,
    countdown: Option<(TimerId, u32)>,
    ready: Option<TimerId>,
    outbox: Vec<CaptureEffect>,
}

impl<S: Scheduler<CaptureTimer>> Capture<S> {
    #[must_use]
    pub fn new(identity: DeviceIdentity, config: CaptureConfig, timers: S) -> Self {
        Self {
            identity,
            config,
            timers,
            state: CaptureState::Idle { blurred: true },
            camera: CameraStatus::Off,
            filter: FilterSpec::none(),
            session: None,
            frame: None,
            shots_uploaded: 0,
            attempts: 0,
            last_upload: None,
            visit_open: false,
            queued: false,
            countdown: None,
            ready: None,
            outbox: Vec::new(),
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    #[must_use]
    pub const fn camera(&self) -> CameraStatus {
        self.camera
    }

    #[must_use]
    pub const fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Shots uploaded since the frame was chosen
    #[must_use]
    pub const fn shots_uploaded(&self) -> u32 {
        self.shots_uploaded
    }

    /// Capture attempts finished since the frame was chosen, failed ones included
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub const fn timers_mut(&mut self) -> &mut S {
        &mut self.timers
    }

    pub fn take_effects(&mut self) -> Vec<CaptureEffect> {
        std::mem::take(&mut self.outbox)
    }

    /// Session id pushed by the hub on connect
    pub fn on_session(&mut self, session: String) {
        tracing::info!(%session, "session id");
        self.session = Some(session);
    }

    /// Command decoded from a chat message
    pub fn on_command(&mut self, command: Command) {
        match command {
            Command::Ready => self.ensure_camera(),
            Command::Start => {
                self.ensure_camera();
                self.outbox.push(CaptureEffect::SetBlur(false));
                self.visit_open = true;
                self.state = CaptureState::Armed;
                self.send(Command::CameraReady);
            }
            Command::End => {
                self.outbox.push(CaptureEffect::SetBlur(true));
                self.visit_open = false;
                if self.state == CaptureState::Armed {
                    self.state = CaptureState::Idle { blurred: true };
                }
            }
            Command::Stop => self.stop_camera(),
            Command::Filter(filter) => self.set_filter(filter),
            Command::Countdown { seconds } => self.start_countdown(seconds.get()),
            Command::Capture => self.capture(),
            Command::Frame { id, shots } => {
                tracing::info!(frame = %id, shots = %shots, "frame announced");
                self.frame = Some(FrameTarget { id, shots });
                self.shots_uploaded = 0;
                self.attempts = 0;
                self.last_upload = None;
            }
            other => tracing::trace!(opcode = other.opcode(), "not for the camera"),
        }
    }

    /// Result of an [`CaptureEffect::AcquireCamera`]
    pub fn camera_acquired(&mut self, mode: Option<CameraMode>) {
        self.camera = match mode {
            Some(mode) => CameraStatus::On(mode),
            None => {
                tracing::error!("camera left uninitialized");
                CameraStatus::Off
            }
        };
    }

    /// Result of a [`CaptureEffect::Grab`]
    pub fn grabbed(&mut self, png: Result<Vec<u8>>) {
        if self.state != CaptureState::Capturing {
            tracing::debug!(state = ?self.state, "grab finished after reset, dropped");
            return;
        }
        let png = match png {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!(error = %e, "capture failed");
                self.after_attempt();
                return;
            }
        };

        let Some(session) = self.session.clone() else {
            tracing::warn!("no session id, cannot upload");
            self.send(Command::CameraReady);
            self.finish_attempt();
            return;
        };

        let filename = format!("{session}-{}.png", chrono::Utc::now().timestamp_millis());
        tracing::debug!(%filename, size = png.len(), "uploading shot");
        self.state = CaptureState::Uploading;
        self.outbox.push(CaptureEffect::Upload {
            session,
            filename,
            png,
        });
    }

    /// Result of an [`CaptureEffect::Upload`]
    pub fn uploaded(&mut self, result: Result<UploadReceipt>) {
        match result {
            Ok(receipt) => {
                tracing::info!(link = %receipt.link, "shot uploaded");
                self.send(Command::AnimationStarted {
                    link: receipt.link.clone(),
                });
                self.shots_uploaded += 1;
                self.last_upload = Some(receipt);
            }
            Err(e) => tracing::warn!(error = %e, "upload error"),
        }
        self.after_attempt();
    }

    /// A timer started by this machine fired
    pub fn on_timer(&mut self, id: TimerId, timer: CaptureTimer) {
        if !self.timers.complete(id) {
            return;
        }
        match timer {
            CaptureTimer::Countdown => {
                let Some((current, remaining)) = self.countdown.take() else {
                    return;
                };
                if current != id {
                    return;
                }
                let remaining = remaining.saturating_sub(1);
                if remaining > 0 {
                    self.outbox
                        .push(CaptureEffect::ShowCountdown(Some(remaining)));
                    let next = self.timers.start(TICK, CaptureTimer::Countdown);
                    self.countdown = Some((next, remaining));
                } else {
                    self.outbox.push(CaptureEffect::ShowCountdown(None));
                    self.capture();
                }
            }
            CaptureTimer::Ready if self.ready == Some(id) => {
                self.ready = None;
                self.send(Command::CameraReady);
            }
            CaptureTimer::Ready => {}
        }
    }

    fn ensure_camera(&mut self) {
        if self.camera == CameraStatus::Off {
            self.camera = CameraStatus::Acquiring;
            self.outbox.push(CaptureEffect::AcquireCamera);
        }
    }

    fn stop_camera(&mut self) {
        if let Some((id, _)) = self.countdown.take() {
            self.timers.cancel(id);
            self.outbox.push(CaptureEffect::ShowCountdown(None));
        }
        if self.camera != CameraStatus::Off {
            self.camera = CameraStatus::Off;
            self.outbox.push(CaptureEffect::ReleaseCamera);
        }
        self.visit_open = false;
        self.queued = false;
        if self.state == CaptureState::Armed {
            self.state = CaptureState::Idle { blurred: true };
        }
    }

    fn set_filter(&mut self, filter: FilterSpec) {
        tracing::debug!(filter = %filter.css(), "filter applied");
        self.outbox.push(CaptureEffect::PreviewFilter(filter.css()));
        self.filter = filter;
    }

    fn start_countdown(&mut self, seconds: u32) {
        if let Some((old, _)) = self.countdown.take() {
            self.timers.cancel(old);
        }
        self.outbox.push(CaptureEffect::ShowCountdown(Some(seconds)));
        let id = self.timers.start(TICK, CaptureTimer::Countdown);
        self.countdown = Some((id, seconds));
    }

    fn capture(&mut self) {
        if !matches!(self.camera, CameraStatus::On(_)) {
            tracing::warn!("capture failed: no camera stream");
            return;
        }
        if matches!(
            self.state,
            CaptureState::Capturing | CaptureState::Uploading
        ) {
            tracing::info!(state = ?self.state, "capture queued behind the one in flight");
            self.queued = true;
            return;
        }
        self.state = CaptureState::Capturing;
        self.outbox.push(CaptureEffect::Shutter);
        self.outbox.push(CaptureEffect::Grab {
            filter: self.filter.clone(),
        });
    }

    fn hand_off(&mut self, last: &UploadReceipt) {
        let local = last.preview_link.clone().unwrap_or_else(|| last.link.clone());
        tracing::info!(link = %last.link, "frame complete, handing off for review");
        self.send(Command::LocalLink { link: local });
        self.send(Command::ArchiveLink {
            link: last.link.clone(),
        });
    }

    /// Attempt over: ready again after the ready delay
    fn after_attempt(&mut self) {
        if let Some(old) = self.ready.take() {
            self.timers.cancel(old);
        }
        self.ready = Some(
            self.timers
                .start(self.config.ready_delay, CaptureTimer::Ready),
        );
        self.finish_attempt();
    }

    fn finish_attempt(&mut self) {
        self.state = if self.visit_open {
            CaptureState::Armed
        } else {
            CaptureState::Idle { blurred: true }
        };

        self.attempts += 1;
        let complete = self
            .frame
            .as_ref()
            .is_some_and(|f| self.attempts == f.shots.get());
        if complete {
            match self.last_upload.take() {
                Some(receipt) => self.hand_off(&receipt),
                None => tracing::warn!(
                    attempts = self.attempts,
                    "no shot of the frame reached storage, nothing to review"
                ),
            }
        }

        if std::mem::take(&mut self.queued) {
            self.capture();
        }
    }

    fn send(&mut self, command: Command) {
        self.outbox.push(CaptureEffect::Send(command));
    }
}

/// Remote commands the camera station answers
#[must_use]
pub fn commands<S: Scheduler<CaptureTimer>>() -> CommandTable<Capture<S>> {
    CommandTable::<Capture<S>>::new()
        .with("status", "station state and camera", |c, args| {
            no_args(args)?;
            Ok(format!(
                "{:?}, camera {:?}, {} uploaded of {} attempts",
                c.state, c.camera, c.shots_uploaded, c.attempts
            ))
        })
        .with("session", "session id", |c, args| {
            no_args(args)?;
            Ok(c.session.clone().unwrap_or_else(|| "none".to_string()))
        })
        .with("identity", "hub name and room", |c, args| {
            no_args(args)?;
            Ok(format!("{} {}", c.identity.name(), c.identity.room()))
        })
        .with("ready", "acquire the camera", |c, args| {
            no_args(args)?;
            c.ensure_camera();
            Ok(format!("{:?}", c.camera))
        })
        .with("stop", "release the camera", |c, args| {
            no_args(args)?;
            c.stop_camera();
            Ok("camera stopped".to_string())
        })
        .with("capture", "take a shot now", |c, args| {
            no_args(args)?;
            if !matches!(c.camera, CameraStatus::On(_)) {
                return Err(CommandError::Failed("no camera stream".to_string()));
            }
            c.capture();
            Ok(format!("{:?}", c.state))
        })
        .with("filter", "show or replace the filter: filter(json)", |c, args| {
            match args {
                [] => Ok(c.filter.to_json()),
                [payload] => {
                    let filter = FilterSpec::from_json(payload)
                        .map_err(|e| CommandError::Arguments(e.to_string()))?;
                    c.set_filter(filter);
                    Ok(c.filter.css())
                }
                _ => Err(CommandError::Arguments(
                    "filter takes one JSON argument".to_string(),
                )),
            }
        })
}
