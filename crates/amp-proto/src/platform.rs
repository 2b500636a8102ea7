use std::path::PathBuf;
use std::time::Duration;

/// Amp control character device.
pub const DEFAULT_AMP_DEVICE: &str = "/dev/ampcontrol";

/// ALSA status file of the first playback substream on card 1.
pub const DEFAULT_ALSA_STATUS: &str = "/proc/asound/card1/pcm0p/sub0/status";

pub const DEFAULT_TICK: Duration = Duration::from_millis(333);

pub fn config_dir() -> PathBuf {
    // Always ~/.config/ampd/, also when running as root under a service manager
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("ampd")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
