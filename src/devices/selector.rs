//! Selector Device: the guest-facing kiosk
//!
//! Drives a visit through frame and filter choice, the capture bursts, the
//! review of the result and the purchase gate. The kiosk is the only device
//! that knows the whole visit, so it enforces the stage order: review links
//! that arrive while the bursts are still running are held back and replayed
//! once capture finishes, and anything for a later stage is ignored before
//! that.

use std::num::NonZeroU32;
use std::time::Duration;

use crate::config::SelectorConfig;
use crate::protocol::{Command, DeviceIdentity, FilterSpec};
use crate::remote::{CommandError, CommandTable, no_args};
use crate::sequencer::{BurstSequencer, Step};
use crate::timer::{Scheduler, TimerId};
use crate::{Error, Result};

/// Slider value that confirms a purchase
pub const PURCHASE_CONFIRM_VALUE: u32 = 100;

const TICK: Duration = Duration::from_secs(1);

/// Visit stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Idle,
    FrameChosen,
    FilterChosen,
    Capturing,
    Reviewing,
    Purchasing,
    Done,
}

/// Timers the kiosk runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorTimer {
    Tick,
    Cooldown,
    Reset,
}

/// Output for the owning loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorEffect {
    /// Broadcast a command on the hub
    Send(Command),
    /// Redraw the burst countdown
    Countdown { index: u32, shots: u32, remaining: u32 },
    /// Visit over, show the start page again
    Restart,
}

/// Guest-chosen layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSelection {
    pub id: String,
    pub shots: NonZeroU32,
}

/// Everything scoped to one guest visit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visit {
    pub frame: Option<FrameSelection>,
    pub filter: FilterSpec,
    /// Preview image of the latest shot
    pub preview: Option<String>,
    /// Direct link of the composed result
    pub local_link: Option<String>,
    /// Archival link of the composed result
    pub archive_link: Option<String>,
    pub purchase_confirmed: bool,
    deferred_local: Option<String>,
    deferred_archive: Option<String>,
}

/// Kiosk state machine
pub struct Selector<S> {
    identity: DeviceIdentity,
    config: SelectorConfig,
    timers: S,
    sequencer: BurstSequencer,
    state: SelectorState,
    visit: Visit,
    session: Option<String>,
    camera_ready: bool,
    slider: u32,
    tick: Option<TimerId>,
    cooldown: Option<TimerId>,
    reset: Option<TimerId>,
    outbox: Vec<SelectorEffect>,
}

impl<S: Scheduler<SelectorTimer>> Selector<S> {
    #[must_use]
    pub fn new(identity: DeviceIdentity, config: SelectorConfig, timers: S) -> Self {
        let sequencer = BurstSequencer::new(config.timing.clone());
        Self {
            identity,
            config,
            timers,
            sequencer,
            state: SelectorState::Idle,
            visit: Visit::default(),
            session: None,
            camera_ready: false,
            slider: 0,
            tick: None,
            cooldown: None,
            reset: None,
            outbox: Vec::new(),
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    #[must_use]
    pub const fn state(&self) -> SelectorState {
        self.state
    }

    #[must_use]
    pub const fn visit(&self) -> &Visit {
        &self.visit
    }

    #[must_use]
    pub const fn camera_ready(&self) -> bool {
        self.camera_ready
    }

    /// Current purchase slider position
    #[must_use]
    pub const fn slider(&self) -> u32 {
        self.slider
    }

    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub const fn timers(&self) -> &S {
        &self.timers
    }

    pub const fn timers_mut(&mut self) -> &mut S {
        &mut self.timers
    }

    /// Take everything queued for the loop since the last call
    pub fn take_effects(&mut self) -> Vec<SelectorEffect> {
        std::mem::take(&mut self.outbox)
    }

    /// QR hand-off URL for the archival link
    #[must_use]
    pub fn qr_url(&self) -> Option<String> {
        self.visit
            .archive_link
            .as_deref()
            .map(|link| qr_url(&self.config.qr_base_url, link))
    }

    /// Guest tapped start
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside `Idle`
    pub fn begin(&mut self) -> Result<()> {
        self.expect_state(&[SelectorState::Idle], "begin")?;
        tracing::info!("visit started");
        self.send(Command::Start);
        Ok(())
    }

    /// Guest picked a frame layout
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] once a filter has been chosen
    pub fn choose_frame(&mut self, frame: FrameSelection) -> Result<()> {
        self.expect_state(
            &[SelectorState::Idle, SelectorState::FrameChosen],
            "choose frame",
        )?;
        tracing::info!(frame = %frame.id, shots = %frame.shots, "frame chosen");
        self.send(Command::Frame {
            id: frame.id.clone(),
            shots: frame.shots,
        });
        self.visit.frame = Some(frame);
        self.state = SelectorState::FrameChosen;
        Ok(())
    }

    /// Guest picked (or changed) the filter
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before a frame is chosen or after
    /// capture started
    pub fn choose_filter(&mut self, filter: FilterSpec) -> Result<()> {
        self.expect_state(
            &[SelectorState::FrameChosen, SelectorState::FilterChosen],
            "choose filter",
        )?;
        tracing::debug!(filter = %filter.css(), "filter chosen");
        self.send(Command::Filter(filter.clone()));
        self.visit.filter = filter;
        self.state = SelectorState::FilterChosen;
        Ok(())
    }

    /// Guest confirmed the filter; the bursts begin
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless a filter has been chosen
    pub fn confirm_filter(&mut self) -> Result<()> {
        self.expect_state(&[SelectorState::FilterChosen], "confirm filter")?;
        let Some(shots) = self.visit.frame.as_ref().map(|f| f.shots) else {
            return Err(Error::InvalidState("no frame chosen".to_string()));
        };
        self.state = SelectorState::Capturing;
        tracing::info!(%shots, "capture started");
        let steps = self.sequencer.start(shots);
        self.apply(steps);
        Ok(())
    }

    /// Guest pressed skip during a countdown
    pub fn skip(&mut self) {
        if self.state == SelectorState::Capturing {
            let steps = self.sequencer.skip();
            self.apply(steps);
        }
    }

    /// Purchase slider released at `value`
    ///
    /// Only the maximum value confirms; anything else snaps the slider back
    /// to zero and keeps the gate closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside the purchase gate
    pub fn purchase_input(&mut self, value: u32) -> Result<()> {
        self.expect_state(&[SelectorState::Purchasing], "purchase")?;
        if value != PURCHASE_CONFIRM_VALUE {
            tracing::debug!(value, "purchase slider not at maximum");
            self.slider = 0;
            return Ok(());
        }

        let Some(link) = self.visit.archive_link.clone() else {
            return Err(Error::InvalidState("no archival link".to_string()));
        };
        self.slider = value;
        self.visit.purchase_confirmed = true;
        self.state = SelectorState::Done;
        tracing::info!(%link, "purchase confirmed");
        self.send(Command::PurchaseConfirmed { link });
        self.arm_reset();
        Ok(())
    }

    /// Guest walked away or pressed home
    pub fn leave(&mut self) {
        self.restart();
    }

    /// Session id pushed by the hub
    pub fn on_session(&mut self, session: String) {
        tracing::info!(%session, "session id");
        self.session = Some(session);
    }

    /// Command decoded from a chat message
    pub fn on_command(&mut self, command: Command) {
        match command {
            Command::CameraReady => {
                self.camera_ready = true;
                tracing::debug!("camera ready for next capture");
            }
            Command::AnimationStarted { link } => {
                let preview = preview_link(&link);
                tracing::debug!(%preview, "shot uploaded");
                self.camera_ready = false;
                self.visit.preview = Some(preview);
            }
            Command::LocalLink { link } => self.on_local_link(link),
            Command::ArchiveLink { link } => self.on_archive_link(link),
            other => tracing::trace!(opcode = other.opcode(), "not for the kiosk"),
        }
    }

    /// A timer started by this machine fired
    pub fn on_timer(&mut self, id: TimerId, timer: SelectorTimer) {
        if !self.timers.complete(id) {
            return;
        }
        match timer {
            SelectorTimer::Tick if self.tick == Some(id) => {
                self.tick = None;
                let steps = self.sequencer.tick();
                self.apply(steps);
            }
            SelectorTimer::Cooldown if self.cooldown == Some(id) => {
                self.cooldown = None;
                let steps = self.sequencer.cooldown_elapsed();
                self.apply(steps);
            }
            SelectorTimer::Reset if self.reset == Some(id) => {
                self.reset = None;
                tracing::info!("visit timed out");
                self.restart();
            }
            _ => tracing::trace!(%id, ?timer, "stale timer"),
        }
    }

    fn on_local_link(&mut self, link: String) {
        match self.state {
            SelectorState::Capturing => self.visit.deferred_local = Some(link),
            SelectorState::Reviewing | SelectorState::Purchasing | SelectorState::Done => {
                tracing::info!(%link, "result ready");
                self.visit.local_link = Some(link);
            }
            state => tracing::debug!(?state, "local link before capture, ignored"),
        }
    }

    fn on_archive_link(&mut self, link: String) {
        match self.state {
            SelectorState::Capturing => self.visit.deferred_archive = Some(link),
            SelectorState::Reviewing => {
                tracing::info!(%link, "archival link ready");
                self.send(Command::Print { link: link.clone() });
                self.visit.archive_link = Some(link);
                self.slider = 0;
                self.state = SelectorState::Purchasing;
                self.arm_reset();
            }
            state => tracing::debug!(?state, "archival link out of order, ignored"),
        }
    }

    fn apply(&mut self, steps: Vec<Step>) {
        for step in steps {
            match step {
                Step::Display {
                    index,
                    shots,
                    remaining,
                } => self.outbox.push(SelectorEffect::Countdown {
                    index,
                    shots,
                    remaining,
                }),
                Step::Notify { seconds } => {
                    if let Some(seconds) = NonZeroU32::new(seconds) {
                        self.send(Command::Countdown { seconds });
                    }
                }
                Step::ArmTick => self.tick = Some(self.timers.start(TICK, SelectorTimer::Tick)),
                Step::ArmCooldown => {
                    let delay = self.config.timing.cooldown;
                    self.cooldown = Some(self.timers.start(delay, SelectorTimer::Cooldown));
                }
                Step::Finished => self.enter_review(),
            }
        }
    }

    fn enter_review(&mut self) {
        tracing::info!("capture finished");
        self.send(Command::End);
        self.state = SelectorState::Reviewing;
        self.arm_reset();
        if let Some(link) = self.visit.deferred_local.take() {
            self.on_local_link(link);
        }
        if let Some(link) = self.visit.deferred_archive.take() {
            self.on_archive_link(link);
        }
    }

    fn arm_reset(&mut self) {
        if let Some(old) = self.reset.take() {
            self.timers.cancel(old);
        }
        self.reset = Some(
            self.timers
                .start(self.config.reset_after, SelectorTimer::Reset),
        );
    }

    fn restart(&mut self) {
        for id in [self.tick.take(), self.cooldown.take(), self.reset.take()]
            .into_iter()
            .flatten()
        {
            self.timers.cancel(id);
        }
        self.sequencer.reset();
        self.visit = Visit::default();
        self.slider = 0;
        self.state = SelectorState::Idle;
        self.outbox.push(SelectorEffect::Restart);
    }

    fn send(&mut self, command: Command) {
        self.outbox.push(SelectorEffect::Send(command));
    }

    fn expect_state(&self, allowed: &[SelectorState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "cannot {action} while {:?}",
                self.state
            )))
        }
    }
}

/// Remote commands the kiosk answers
#[must_use]
pub fn commands<S: Scheduler<SelectorTimer>>() -> CommandTable<Selector<S>> {
    CommandTable::<Selector<S>>::new()
        .with("status", "visit stage and camera readiness", |s, args| {
            no_args(args)?;
            Ok(format!(
                "{:?}, camera {}",
                s.state,
                if s.camera_ready { "ready" } else { "busy" }
            ))
        })
        .with("state", "visit details", |s, args| {
            no_args(args)?;
            let frame = s
                .visit
                .frame
                .as_ref()
                .map_or_else(|| "-".to_string(), |f| format!("{} x{}", f.id, f.shots));
            Ok(format!(
                "state={:?} frame={frame} filter={} phase={:?} archive={}",
                s.state,
                s.visit.filter.to_json(),
                s.sequencer.phase(),
                s.visit.archive_link.as_deref().unwrap_or("-")
            ))
        })
        .with("session", "session id", |s, args| {
            no_args(args)?;
            Ok(s.session.clone().unwrap_or_else(|| "none".to_string()))
        })
        .with("identity", "hub name and room", |s, args| {
            no_args(args)?;
            Ok(format!("{} {}", s.identity.name(), s.identity.room()))
        })
        .with("reload", "restart the visit", |s, args| {
            no_args(args)?;
            s.restart();
            Ok("reloaded".to_string())
        })
        .with("skip", "skip to the end of the countdown", |s, args| {
            no_args(args)?;
            if s.state != SelectorState::Capturing {
                return Err(CommandError::Failed("not capturing".to_string()));
            }
            s.skip();
            Ok(format!("{:?}", s.sequencer.phase()))
        })
}

/// Preview image uploaded next to a shot
#[must_use]
pub fn preview_link(link: &str) -> String {
    link.replacen(".png", "-preview.webp", 1)
}

/// QR payload for an archival link
#[must_use]
pub fn qr_url(base: &str, link: &str) -> String {
    format!("{base}?l={}", urlencoding::encode(link))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DeviceRole, FilterName};
    use crate::timer::ManualScheduler;

    type TestSelector = Selector<ManualScheduler<SelectorTimer>>;

    fn selector() -> TestSelector {
        Selector::new(
            DeviceIdentity::for_role(DeviceRole::Selector),
            SelectorConfig::default(),
            ManualScheduler::new(),
        )
    }

    fn sent(effects: &[SelectorEffect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                SelectorEffect::Send(c) => Some(c.encode()),
                _ => None,
            })
            .collect()
    }

    /// Past the last burst of a three-shot visit, short of the inactivity reset
    const BURSTS_OVER: Duration = Duration::from_secs(100);

    /// Fire every timer due by `until`, collecting sent commands
    fn run_until(s: &mut TestSelector, until: Duration) -> Vec<String> {
        let mut out = Vec::new();
        while let Some((id, timer)) = s.timers_mut().pop_due(until) {
            s.on_timer(id, timer);
            out.extend(sent(&s.take_effects()));
        }
        out
    }

    fn to_capture(s: &mut TestSelector, shots: u32) {
        s.begin().unwrap();
        s.choose_frame(FrameSelection {
            id: "classic".to_string(),
            shots: NonZeroU32::new(shots).unwrap(),
        })
        .unwrap();
        s.choose_filter(FilterSpec::none().with(FilterName::Sepia, "0.4"))
            .unwrap();
        s.confirm_filter().unwrap();
    }

    fn to_purchase(s: &mut TestSelector) {
        to_capture(s, 1);
        run_until(s, BURSTS_OVER);
        s.on_command(Command::ArchiveLink {
            link: "https://drive.test/a".to_string(),
        });
        s.take_effects();
    }

    #[test]
    fn visit_emits_commands_in_order() {
        let mut s = selector();
        to_capture(&mut s, 3);
        let mut out = sent(&s.take_effects());
        out.extend(run_until(&mut s, BURSTS_OVER));

        assert_eq!(out[0], ":start");
        assert_eq!(out[1], ":frame-classic-3");
        assert_eq!(out[2], r#":filter-{"sepia":"0.4"}"#);
        let countdowns = out.iter().filter(|m| *m == ":countdown-5-capture").count();
        assert_eq!(countdowns, 3);
        assert_eq!(out.last().map(String::as_str), Some(":end"));
        assert_eq!(s.state(), SelectorState::Reviewing);
    }

    #[test]
    fn notify_lands_fifteen_seconds_into_each_burst() {
        let mut s = selector();
        to_capture(&mut s, 2);
        s.take_effects();
        assert!(run_until(&mut s, Duration::from_secs(14)).is_empty());
        assert_eq!(
            run_until(&mut s, Duration::from_secs(15)),
            vec![":countdown-5-capture"]
        );
    }

    #[test]
    fn archive_link_sends_print_and_opens_gate() {
        let mut s = selector();
        to_capture(&mut s, 1);
        run_until(&mut s, BURSTS_OVER);
        s.on_command(Command::ArchiveLink {
            link: "https://drive.test/a b".to_string(),
        });
        assert_eq!(sent(&s.take_effects()), vec![":print-https://drive.test/a b"]);
        assert_eq!(s.state(), SelectorState::Purchasing);
        assert_eq!(
            s.qr_url().unwrap(),
            "https://sccl4c.web.app/?l=https%3A%2F%2Fdrive.test%2Fa%20b"
        );
    }

    #[test]
    fn slider_below_maximum_resets_and_stays() {
        let mut s = selector();
        to_purchase(&mut s);
        s.purchase_input(99).unwrap();
        assert_eq!(s.slider(), 0);
        assert_eq!(s.state(), SelectorState::Purchasing);
        assert!(sent(&s.take_effects()).is_empty());
    }

    #[test]
    fn slider_at_maximum_confirms_once() {
        let mut s = selector();
        to_purchase(&mut s);
        s.purchase_input(100).unwrap();
        assert_eq!(s.state(), SelectorState::Done);
        assert!(s.purchase_input(100).is_err());
        let confirmations: Vec<_> = sent(&s.take_effects());
        assert_eq!(confirmations, vec![":purchase-confirmed-https://drive.test/a"]);
    }

    #[test]
    fn confirmation_restarts_reset_timer() {
        let mut s = selector();
        to_purchase(&mut s);
        let gate_opened = s.timers().now();
        s.timers_mut().advance_to(gate_opened + Duration::from_secs(100));
        s.purchase_input(100).unwrap();

        run_until(&mut s, gate_opened + Duration::from_secs(130));
        assert_eq!(s.state(), SelectorState::Done);
        run_until(&mut s, gate_opened + Duration::from_secs(221));
        assert_eq!(s.state(), SelectorState::Idle);
        assert!(s.visit().archive_link.is_none());
    }

    #[test]
    fn review_links_during_capture_are_replayed() {
        let mut s = selector();
        to_capture(&mut s, 1);
        s.on_command(Command::LocalLink {
            link: "http://hub/images/x.png".to_string(),
        });
        s.on_command(Command::ArchiveLink {
            link: "https://drive.test/x".to_string(),
        });
        assert_eq!(s.state(), SelectorState::Capturing);

        let out = run_until(&mut s, BURSTS_OVER);
        assert_eq!(out[out.len() - 2..], [":end", ":print-https://drive.test/x"]);
        assert_eq!(s.state(), SelectorState::Purchasing);
        assert_eq!(
            s.visit().local_link.as_deref(),
            Some("http://hub/images/x.png")
        );
    }

    #[test]
    fn review_without_links_times_out() {
        let mut s = selector();
        to_capture(&mut s, 1);
        run_until(&mut s, BURSTS_OVER);
        assert_eq!(s.state(), SelectorState::Reviewing);

        run_until(&mut s, Duration::from_secs(144));
        assert_eq!(s.state(), SelectorState::Reviewing);
        run_until(&mut s, Duration::from_secs(145));
        assert_eq!(s.state(), SelectorState::Idle);
    }

    #[test]
    fn archive_link_before_capture_is_ignored() {
        let mut s = selector();
        s.on_command(Command::ArchiveLink {
            link: "https://drive.test/early".to_string(),
        });
        assert_eq!(s.state(), SelectorState::Idle);
        assert!(sent(&s.take_effects()).is_empty());
    }

    #[test]
    fn stage_order_is_enforced() {
        let mut s = selector();
        assert!(s.choose_filter(FilterSpec::none()).is_err());
        assert!(s.confirm_filter().is_err());
        assert!(s.purchase_input(100).is_err());
    }

    #[test]
    fn leaving_cancels_the_bursts() {
        let mut s = selector();
        to_capture(&mut s, 3);
        s.leave();
        assert_eq!(s.state(), SelectorState::Idle);
        assert_eq!(s.timers().pending(), 0);
        assert!(s.take_effects().contains(&SelectorEffect::Restart));
    }

    #[test]
    fn preview_replaces_first_png() {
        assert_eq!(
            preview_link("http://hub/images/s-1.png"),
            "http://hub/images/s-1-preview.webp"
        );
    }

    #[test]
    fn remote_skip_and_state() {
        let table = commands();
        let mut s = selector();
        assert!(table.eval(&mut s, "skip()").is_err());
        to_capture(&mut s, 1);
        assert_eq!(
            table.eval(&mut s, "skip").unwrap(),
            "Countdown { index: 1, remaining: 6 }"
        );
        assert!(table.eval(&mut s, "state").unwrap().starts_with("state=Capturing"));
    }
}
