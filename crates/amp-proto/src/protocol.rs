use serde::{Deserialize, Serialize};

/// Classified playback status of one poll tick.
///
/// An inconclusive sample (no marker found, or a failed read) is not a
/// signal at all; callers carry it as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackSignal {
    /// The PCM substream reports an actively running stream.
    Playing,
    /// The PCM substream is closed (stream ended or device idle).
    Closed,
}

/// Command written to the amp control device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmpCommand {
    On,
    Off,
}

impl AmpCommand {
    /// Single-byte wire encoding understood by the amp control device.
    pub fn as_byte(self) -> u8 {
        match self {
            AmpCommand::On => b'1',
            AmpCommand::Off => b'0',
        }
    }
}

impl std::fmt::Display for AmpCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmpCommand::On => f.write_str("on"),
            AmpCommand::Off => f.write_str("off"),
        }
    }
}

/// Power state of the amplifier as tracked by the control loop.
///
/// Transitions:
///   Stopped -> Playing -> ClosingPending -> Stopped
///   ClosingPending -> Playing (playback resumed inside the off-delay)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmpState {
    /// Amp is off.
    #[default]
    Stopped,
    /// Amp is on and the source is playing.
    Playing,
    /// Amp is still on; the off-delay is running.
    ClosingPending,
}

/// Substrings that classify the text read from the status source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMarkers {
    #[serde(default = "default_closed_marker")]
    pub closed_marker: String,
    #[serde(default = "default_running_marker")]
    pub running_marker: String,
}

impl Default for StatusMarkers {
    fn default() -> Self {
        Self {
            closed_marker: default_closed_marker(),
            running_marker: default_running_marker(),
        }
    }
}

fn default_closed_marker() -> String {
    "closed".to_string()
}

fn default_running_marker() -> String {
    "state: RUNNING".to_string()
}

/// Classify one status sample.
///
/// `closed` takes precedence when both markers are present: ALSA only
/// prints `closed` for a substream with no open handle, so a running marker
/// in the same text can only be stale.
pub fn classify_status(text: &str, markers: &StatusMarkers) -> Option<PlaybackSignal> {
    if !markers.closed_marker.is_empty() && text.contains(&markers.closed_marker) {
        Some(PlaybackSignal::Closed)
    } else if !markers.running_marker.is_empty() && text.contains(&markers.running_marker) {
        Some(PlaybackSignal::Playing)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING_SAMPLE: &str = "state: RUNNING\n\
owner_pid   : 1234\n\
trigger_time: 5806.491004377\n\
tstamp      : 0.000000000\n\
delay       : 7526\n\
avail       : 666\n\
avail_max   : 2048\n";

    const PREPARED_SAMPLE: &str = "state: PREPARED\nowner_pid   : 1234\n";

    #[test]
    fn test_classify_running() {
        let markers = StatusMarkers::default();
        assert_eq!(
            classify_status(RUNNING_SAMPLE, &markers),
            Some(PlaybackSignal::Playing)
        );
    }

    #[test]
    fn test_classify_closed() {
        let markers = StatusMarkers::default();
        assert_eq!(
            classify_status("closed\n", &markers),
            Some(PlaybackSignal::Closed)
        );
    }

    #[test]
    fn test_classify_unknown_is_no_signal() {
        let markers = StatusMarkers::default();
        assert_eq!(classify_status(PREPARED_SAMPLE, &markers), None);
        assert_eq!(classify_status("", &markers), None);
    }

    #[test]
    fn test_closed_wins_over_running() {
        let markers = StatusMarkers::default();
        assert_eq!(
            classify_status("closed\nstate: RUNNING\n", &markers),
            Some(PlaybackSignal::Closed)
        );
    }

    #[test]
    fn test_custom_markers() {
        let markers = StatusMarkers {
            closed_marker: "IDLE".to_string(),
            running_marker: "BUSY".to_string(),
        };
        assert_eq!(classify_status("dev: BUSY", &markers), Some(PlaybackSignal::Playing));
        assert_eq!(classify_status("dev: IDLE", &markers), Some(PlaybackSignal::Closed));
        assert_eq!(classify_status("closed", &markers), None);
    }

    #[test]
    fn test_command_bytes() {
        assert_eq!(AmpCommand::On.as_byte(), b'1');
        assert_eq!(AmpCommand::Off.as_byte(), b'0');
    }
}
