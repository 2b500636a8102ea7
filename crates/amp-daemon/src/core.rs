/// DaemonCore: single-owner event loop for the amp state.
///
/// All tasks that want to influence the amp send `DaemonEvent` messages to
/// this loop.  DaemonCore owns the `AmpStateMachine` (and through it the amp
/// sink) exclusively; the poller and timer tasks only hold inbox senders.
///
/// Off-delay timers are fire-and-forget tasks that sleep and then post
/// `DelayExpired(ticket)`.  They are never aborted: whether an expiry still
/// matters is decided here, when the event is consumed.
use std::time::Duration;

use amp_proto::protocol::{AmpState, PlaybackSignal};
use amp_proto::state::{AmpEvent, AmpSink, AmpStateMachine, OffDelayTicket};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// Classified status sample from the poller.
    Playback(PlaybackSignal),
    /// The off-delay armed with this ticket has elapsed.
    DelayExpired(OffDelayTicket),
    /// Shutdown requested (SIGINT / SIGTERM).
    Shutdown,
    /// Unrecoverable error reported by a background task.
    Fatal(String),
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore<S> {
    machine: AmpStateMachine<S>,
    /// Cloned into every off-delay timer task.
    event_tx: mpsc::Sender<DaemonEvent>,
}

impl<S: AmpSink> DaemonCore<S> {
    pub fn new(sink: S, off_delay: Duration, event_tx: mpsc::Sender<DaemonEvent>) -> Self {
        Self {
            machine: AmpStateMachine::new(sink, off_delay),
            event_tx,
        }
    }

    pub fn state(&self) -> AmpState {
        self.machine.state()
    }

    pub fn into_sink(self) -> S {
        self.machine.into_sink()
    }

    /// Process events until `Shutdown` or `Fatal`.  A `Fatal` event ends the
    /// loop with an error; the sink stays owned by `self` either way.
    ///
    /// `self` holds a sender for the timer tasks, so the inbox never closes
    /// while the loop runs.  Dropping every other sender does not stop it.
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        while let Some(event) = event_rx.recv().await {
            match event {
                DaemonEvent::Playback(signal) => self.apply(AmpEvent::Playback(signal)),
                DaemonEvent::DelayExpired(ticket) => self.apply(AmpEvent::DelayExpired(ticket)),
                DaemonEvent::Shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                DaemonEvent::Fatal(reason) => {
                    error!("Stopping amp control: {}", reason);
                    anyhow::bail!(reason);
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, event: AmpEvent) {
        if let Some(ticket) = self.machine.handle(event) {
            self.schedule_off_delay(ticket);
        }
    }

    fn schedule_off_delay(&self, ticket: OffDelayTicket) {
        let delay = self.machine.off_delay();
        let tx = self.event_tx.clone();
        debug!("core: off-delay ticket {} fires in {:?}", ticket.id(), delay);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(DaemonEvent::DelayExpired(ticket)).await;
        });
    }
}
