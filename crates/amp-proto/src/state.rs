/// Debounced amp power state machine.
///
/// `AmpStateMachine` is the single owner of `AmpState` and of the amp sink.
/// It is driven one event at a time by the daemon's control loop and never
/// shared with the poller or timer tasks.  Scheduling the off-delay is left to
/// the caller: `handle()` returns the `OffDelayTicket` to deliver back as
/// `AmpEvent::DelayExpired` once the delay has elapsed.
///
/// ```text
///   Stopped ──Playing/write On──▶ Playing ──Closed/arm──▶ ClosingPending
///      ▲                             ▲                         │   │
///      │                             └────────Playing──────────┘   │
///      └──────────────DelayExpired(armed ticket)/write Off─────────┘
/// ```
///
/// Timers are never cancelled.  A `DelayExpired` is honoured only when it
/// carries the currently armed ticket, so a timer left over from an earlier
/// closing window is a no-op in every state.
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::SinkWriteError;
use crate::protocol::{AmpCommand, AmpState, PlaybackSignal};

/// Write side of the amp control device.
pub trait AmpSink {
    /// Write one command, returning the number of bytes the device accepted.
    fn write_command(&mut self, command: AmpCommand) -> std::io::Result<usize>;
}

/// Identifies one arming of the off-delay timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OffDelayTicket(u64);

impl OffDelayTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Inputs consumed by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmpEvent {
    Playback(PlaybackSignal),
    DelayExpired(OffDelayTicket),
}

impl From<PlaybackSignal> for AmpEvent {
    fn from(signal: PlaybackSignal) -> Self {
        AmpEvent::Playback(signal)
    }
}

pub struct AmpStateMachine<S> {
    sink: S,
    state: AmpState,
    off_delay: Duration,
    /// Ticket of the timer whose expiry will power the amp off.
    armed: Option<OffDelayTicket>,
    next_ticket: u64,
}

impl<S: AmpSink> AmpStateMachine<S> {
    pub fn new(sink: S, off_delay: Duration) -> Self {
        Self {
            sink,
            state: AmpState::Stopped,
            off_delay,
            armed: None,
            next_ticket: 0,
        }
    }

    pub fn state(&self) -> AmpState {
        self.state
    }

    pub fn off_delay(&self) -> Duration {
        self.off_delay
    }

    pub fn armed_ticket(&self) -> Option<OffDelayTicket> {
        self.armed
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Give the sink back so the caller can close it.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Apply one event.  Returns `Some(ticket)` when a new off-delay timer
    /// must be scheduled.
    ///
    /// A failed `Off` write leaves the machine in `ClosingPending` with no
    /// armed ticket.  The retry is the next `Closed`, which arms a full new
    /// off-delay, so the amp can stay powered for up to twice the delay.
    pub fn handle(&mut self, event: AmpEvent) -> Option<OffDelayTicket> {
        match (self.state, event) {
            (AmpState::Stopped, AmpEvent::Playback(PlaybackSignal::Playing)) => {
                if self.write(AmpCommand::On) {
                    self.state = AmpState::Playing;
                    info!("Playing");
                }
                None
            }
            (AmpState::Stopped, AmpEvent::Playback(PlaybackSignal::Closed)) => None,
            (AmpState::Playing, AmpEvent::Playback(PlaybackSignal::Playing)) => None,
            (AmpState::Playing, AmpEvent::Playback(PlaybackSignal::Closed)) => Some(self.arm()),
            (AmpState::ClosingPending, AmpEvent::Playback(PlaybackSignal::Playing)) => {
                if let Some(ticket) = self.armed.take() {
                    debug!("off-delay ticket {} disarmed", ticket.id());
                }
                self.state = AmpState::Playing;
                info!("Playback resumed within off-delay, amp stays on");
                None
            }
            (AmpState::ClosingPending, AmpEvent::Playback(PlaybackSignal::Closed)) => {
                // Re-arm only after a failed off write consumed the ticket.
                match self.armed {
                    Some(_) => None,
                    None => Some(self.arm()),
                }
            }
            (AmpState::ClosingPending, AmpEvent::DelayExpired(ticket))
                if self.armed == Some(ticket) =>
            {
                self.armed = None;
                if self.write(AmpCommand::Off) {
                    self.state = AmpState::Stopped;
                    info!("Stopped");
                }
                None
            }
            (state, AmpEvent::DelayExpired(ticket)) => {
                debug!(
                    "ignoring stale off-delay ticket {} in state {:?}",
                    ticket.id(),
                    state
                );
                None
            }
        }
    }

    fn arm(&mut self) -> OffDelayTicket {
        self.next_ticket += 1;
        let ticket = OffDelayTicket(self.next_ticket);
        self.armed = Some(ticket);
        self.state = AmpState::ClosingPending;
        info!("Closed. Waiting {:?} ...", self.off_delay);
        ticket
    }

    /// Write `command`, logging any failure.  Returns true when the device
    /// accepted exactly the one command byte.
    fn write(&mut self, command: AmpCommand) -> bool {
        let result = match self.sink.write_command(command) {
            Ok(1) => Ok(()),
            Ok(written) => Err(SinkWriteError::ShortWrite { command, written }),
            Err(source) => Err(SinkWriteError::Io { command, source }),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("{}; staying {:?}", e, self.state);
                false
            }
        }
    }
}
