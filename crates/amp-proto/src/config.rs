use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::DurationParseError;
use super::platform;
use super::protocol::StatusMarkers;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub amp: AmpConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmpConfig {
    /// Device accepting the single-byte on/off commands.
    #[serde(default = "default_amp_device")]
    pub device: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Playback status file polled every tick.
    #[serde(default = "default_status_path")]
    pub path: PathBuf,
    #[serde(default = "default_tick", with = "duration_str")]
    pub tick_interval: Duration,
    #[serde(flatten)]
    pub markers: StatusMarkers,
    #[serde(default)]
    pub read_errors: ReadErrorPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlConfig {
    /// How long playback must stay closed before the amp is switched off.
    #[serde(default, with = "duration_str")]
    pub off_delay: Duration,
}

/// What the poller does when the status source cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadErrorPolicy {
    /// Log the failure and treat the tick as inconclusive.
    #[default]
    Skip,
    /// Stop the daemon on the first failed read.
    Fatal,
}

impl Default for AmpConfig {
    fn default() -> Self {
        Self {
            device: default_amp_device(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            path: default_status_path(),
            tick_interval: default_tick(),
            markers: StatusMarkers::default(),
            read_errors: ReadErrorPolicy::default(),
        }
    }
}

fn default_amp_device() -> PathBuf {
    PathBuf::from(platform::DEFAULT_AMP_DEVICE)
}

fn default_status_path() -> PathBuf {
    PathBuf::from(platform::DEFAULT_ALSA_STATUS)
}

fn default_tick() -> Duration {
    platform::DEFAULT_TICK
}

impl Config {
    /// Load `path`, or the default config file when no path is given.
    ///
    /// A missing default file yields the built-in defaults; an explicitly
    /// requested file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = platform::default_config_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                Self::from_file(&path)
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Parse a duration such as `300ms`, `1.5s`, `1m30s` or `0`.
///
/// Units: `ns`, `us` (`µs`), `ms`, `s`, `m`, `h`.  Every number needs a unit
/// except a bare `0`.  Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || DurationParseError::Invalid(input.to_string());
    let overflow = || DurationParseError::Overflow(input.to_string());

    if s.is_empty() {
        return Err(invalid());
    }

    let mut rest = s;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(num_len);
        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(invalid());
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale: u128 = match unit {
            "" => return Err(DurationParseError::MissingUnit(input.to_string())),
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => {
                return Err(DurationParseError::UnknownUnit {
                    unit: unit.to_string(),
                    input: input.to_string(),
                })
            }
        };

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;
        if !frac.is_empty() {
            // Digits past nanosecond precision are dropped.
            let digits = &frac[..frac.len().min(18)];
            let frac_val: u128 = digits.parse().map_err(|_| invalid())?;
            nanos = nanos
                .checked_add(frac_val * scale / 10u128.pow(digits.len() as u32))
                .ok_or_else(overflow)?;
        }
        total = total.checked_add(nanos).ok_or_else(overflow)?;
        rest = tail;
    }

    u64::try_from(total)
        .map(Duration::from_nanos)
        .map_err(|_| overflow())
}

/// Inverse of `parse_duration` for whole units.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        "0".to_string()
    } else if nanos % 1_000_000_000 == 0 {
        format!("{}s", nanos / 1_000_000_000)
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}us", nanos / 1_000)
    } else {
        format!("{}ns", nanos)
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.amp.device, PathBuf::from("/dev/ampcontrol"));
        assert_eq!(
            config.status.path,
            PathBuf::from("/proc/asound/card1/pcm0p/sub0/status")
        );
        assert_eq!(config.status.tick_interval, Duration::from_millis(333));
        assert_eq!(config.control.off_delay, Duration::ZERO);
        assert_eq!(config.status.read_errors, ReadErrorPolicy::Skip);
        assert_eq!(config.status.markers.closed_marker, "closed");
        assert_eq!(config.status.markers.running_marker, "state: RUNNING");
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.status.tick_interval, Duration::from_millis(333));
        assert_eq!(config.amp.device, PathBuf::from("/dev/ampcontrol"));
    }

    #[test]
    fn test_parse_full_toml() {
        let config = Config::from_toml_str(
            r#"
[amp]
device = "/dev/amp0"

[status]
path = "/proc/asound/card0/pcm0p/sub0/status"
tick_interval = "250ms"
closed_marker = "closed"
running_marker = "RUNNING"
read_errors = "fatal"

[control]
off_delay = "1m30s"
"#,
        )
        .unwrap();
        assert_eq!(config.amp.device, PathBuf::from("/dev/amp0"));
        assert_eq!(config.status.tick_interval, Duration::from_millis(250));
        assert_eq!(config.status.markers.running_marker, "RUNNING");
        assert_eq!(config.status.read_errors, ReadErrorPolicy::Fatal);
        assert_eq!(config.control.off_delay, Duration::from_secs(90));
    }

    #[test]
    fn test_bad_duration_in_toml_is_rejected() {
        let err = Config::from_toml_str("[control]\noff_delay = \"ten seconds\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_serialized_config_reloads() {
        let mut config = Config::default();
        config.control.off_delay = Duration::from_secs(5);
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("off_delay = \"5s\""));
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back.control.off_delay, Duration::from_secs(5));
        assert_eq!(back.status.tick_interval, Duration::from_millis(333));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[control]\noff_delay = \"2s\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.control.off_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("300ms"), Ok(Duration::from_millis(300)));
        assert_eq!(parse_duration("1s"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration(".5s"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("10us"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_duration("10µs"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_duration("7ns"), Ok(Duration::from_nanos(7)));
        assert_eq!(parse_duration(" +2s "), Ok(Duration::from_secs(2)));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert_eq!(parse_duration(""), Err(DurationParseError::Empty));
        assert_eq!(
            parse_duration("5"),
            Err(DurationParseError::MissingUnit("5".to_string()))
        );
        assert!(matches!(
            parse_duration("5d"),
            Err(DurationParseError::UnknownUnit { .. })
        ));
        assert!(matches!(
            parse_duration("-1s"),
            Err(DurationParseError::Invalid(_))
        ));
        assert!(matches!(
            parse_duration("1.2.3s"),
            Err(DurationParseError::Invalid(_))
        ));
        assert!(matches!(
            parse_duration("ms"),
            Err(DurationParseError::Invalid(_))
        ));
        assert!(matches!(
            parse_duration("99999999999h"),
            Err(DurationParseError::Overflow(_))
        ));
        // Whole part fits, the fraction pushes it past the limit.
        let max_hours = u128::MAX / 3_600_000_000_000;
        assert!(matches!(
            parse_duration(&format!("{}.999999999h", max_hours)),
            Err(DurationParseError::Overflow(_))
        ));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0");
        assert_eq!(format_duration(Duration::from_millis(333)), "333ms");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_micros(15)), "15us");
        assert_eq!(format_duration(Duration::from_nanos(3)), "3ns");
    }
}
