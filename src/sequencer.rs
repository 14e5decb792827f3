//! Capture Burst Sequencer
//!
//! Runs on the Selector kiosk. A visit is `shots` bursts; each burst is a
//! countdown of one-second ticks, and at `notify_at` seconds remaining the
//! camera is told to start its own countdown so the shot lands on the shared
//! timeline. After each burst a cooldown leaves room for the upload before
//! the next countdown starts.
//!
//! The sequencer owns no timers. Every input returns the [`Step`]s the owner
//! must act on, including which timer to arm next.

use std::num::NonZeroU32;

use crate::config::BurstTiming;

/// Where the sequencer is in the visit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Burst `index` (1-based) counting down
    Countdown { index: u32, remaining: u32 },
    /// Burst `index` done, waiting before the next
    Cooldown { index: u32 },
    Finished,
}

/// Output of a sequencer input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Update the on-screen countdown
    Display { index: u32, shots: u32, remaining: u32 },
    /// Tell the camera to count down `seconds` then shoot
    Notify { seconds: u32 },
    /// Arm the one-second tick timer
    ArmTick,
    /// Arm the post-burst cooldown timer
    ArmCooldown,
    /// Every burst is done
    Finished,
}

/// Burst state machine for one visit
#[derive(Debug, Clone)]
pub struct BurstSequencer {
    timing: BurstTiming,
    shots: u32,
    phase: Phase,
    notified: bool,
}

impl BurstSequencer {
    #[must_use]
    pub const fn new(timing: BurstTiming) -> Self {
        Self {
            timing,
            shots: 0,
            phase: Phase::Idle,
            notified: false,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn shots(&self) -> u32 {
        self.shots
    }

    /// Whether a burst is running or cooling down
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Countdown { .. } | Phase::Cooldown { .. })
    }

    /// Begin the first burst
    ///
    /// Ignored while a visit is already running.
    pub fn start(&mut self, shots: NonZeroU32) -> Vec<Step> {
        if self.is_running() {
            tracing::debug!(phase = ?self.phase, "sequencer already running");
            return Vec::new();
        }
        self.shots = shots.get();
        self.begin_burst(1)
    }

    /// One second elapsed
    pub fn tick(&mut self) -> Vec<Step> {
        let Phase::Countdown { index, remaining } = self.phase else {
            return Vec::new();
        };

        let remaining = remaining.saturating_sub(1);
        self.phase = Phase::Countdown { index, remaining };

        let mut steps = vec![self.display(index, remaining)];
        if remaining == self.timing.notify_at_secs && !self.notified {
            self.notified = true;
            steps.push(Step::Notify {
                seconds: self.timing.notify_at_secs,
            });
        }

        if remaining == 0 {
            self.phase = Phase::Cooldown { index };
            steps.push(Step::ArmCooldown);
        } else {
            steps.push(Step::ArmTick);
        }
        steps
    }

    /// Guest pressed skip
    ///
    /// Jumps to the final window only when more time than that remains.
    pub fn skip(&mut self) -> Vec<Step> {
        match self.phase {
            Phase::Countdown { index, remaining } if remaining > self.timing.skip_to_secs => {
                let remaining = self.timing.skip_to_secs;
                self.phase = Phase::Countdown { index, remaining };
                vec![self.display(index, remaining)]
            }
            _ => Vec::new(),
        }
    }

    /// Post-burst pause is over
    pub fn cooldown_elapsed(&mut self) -> Vec<Step> {
        let Phase::Cooldown { index } = self.phase else {
            return Vec::new();
        };

        if index < self.shots {
            self.begin_burst(index + 1)
        } else {
            self.phase = Phase::Finished;
            vec![Step::Finished]
        }
    }

    /// Drop back to idle
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.shots = 0;
        self.notified = false;
    }

    fn begin_burst(&mut self, index: u32) -> Vec<Step> {
        let remaining = self.timing.countdown_secs;
        self.phase = Phase::Countdown { index, remaining };
        self.notified = false;
        tracing::debug!(index, shots = self.shots, "burst started");
        vec![self.display(index, remaining), Step::ArmTick]
    }

    const fn display(&self, index: u32, remaining: u32) -> Step {
        Step::Display {
            index,
            shots: self.shots,
            remaining,
        }
    }
}
