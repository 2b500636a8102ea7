/// Playback status poller.
///
/// ```text
///   StatusPoller::run()
///         │  every tick (one read in flight at most)
///         └── read task  ← StatusSource::read_status()
///                             ├── classified signal → DaemonEvent::Playback
///                             ├── no marker         → nothing
///                             └── read error        → warn (skip) | DaemonEvent::Fatal
/// ```
///
/// Read tasks only hold a clone of the inbox sender; the poller never sees
/// the amp state.
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use amp_proto::config::ReadErrorPolicy;
use amp_proto::protocol::{classify_status, StatusMarkers};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::core::DaemonEvent;

/// Readable playback status, e.g. an ALSA `/proc` status file.
pub trait StatusSource: Send + Sync + 'static {
    fn read_status(&self) -> impl Future<Output = std::io::Result<String>> + Send;
}

pub struct ProcStatusFile {
    path: PathBuf,
}

impl ProcStatusFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StatusSource for ProcStatusFile {
    async fn read_status(&self) -> std::io::Result<String> {
        tokio::fs::read_to_string(&self.path).await
    }
}

pub struct StatusPoller<S> {
    source: Arc<S>,
    markers: Arc<StatusMarkers>,
    tick: Duration,
    read_errors: ReadErrorPolicy,
    /// Consecutive failed reads, so a missing source logs one warning.
    failures: Arc<AtomicU32>,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(
        source: S,
        markers: StatusMarkers,
        tick: Duration,
        read_errors: ReadErrorPolicy,
    ) -> Self {
        Self {
            source: Arc::new(source),
            markers: Arc::new(markers),
            tick,
            read_errors,
            failures: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn spawn(self, event_tx: mpsc::Sender<DaemonEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(event_tx))
    }

    /// Tick until the inbox is closed, i.e. the core loop has returned and
    /// dropped its receiver.
    pub async fn run(self, event_tx: mpsc::Sender<DaemonEvent>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let in_flight = Arc::new(Semaphore::new(1));

        loop {
            ticker.tick().await;
            if event_tx.is_closed() {
                debug!("poller: inbox closed, stopping");
                break;
            }

            let permit = match in_flight.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("poller: previous read still running, skipping tick");
                    continue;
                }
            };

            let source = self.source.clone();
            let markers = self.markers.clone();
            let failures = self.failures.clone();
            let read_errors = self.read_errors;
            let tx = event_tx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let event = sample(&*source, &markers, read_errors, &failures).await;
                if let Some(event) = event {
                    let _ = tx.send(event).await;
                }
            });
        }
    }
}

/// Read and classify one status sample.
async fn sample<S: StatusSource>(
    source: &S,
    markers: &StatusMarkers,
    read_errors: ReadErrorPolicy,
    failures: &AtomicU32,
) -> Option<DaemonEvent> {
    match source.read_status().await {
        Ok(text) => {
            let failed = failures.swap(0, Ordering::Relaxed);
            if failed > 0 {
                info!("poller: status readable again after {} failed reads", failed);
            }
            match classify_status(&text, markers) {
                Some(signal) => {
                    trace!("poller: {:?}", signal);
                    Some(DaemonEvent::Playback(signal))
                }
                None => {
                    trace!("poller: no status marker in sample");
                    None
                }
            }
        }
        Err(e) => match read_errors {
            ReadErrorPolicy::Skip => {
                if failures.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!("poller: failed to read playback status: {}", e);
                } else {
                    debug!("poller: failed to read playback status: {}", e);
                }
                None
            }
            ReadErrorPolicy::Fatal => {
                error!("poller: failed to read playback status: {}", e);
                Some(DaemonEvent::Fatal(format!(
                    "failed to read playback status: {}",
                    e
                )))
            }
        },
    }
}
