use crate::protocol::AmpCommand;

/// A duration string that could not be parsed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
    #[error("duration {0:?} out of range")]
    Overflow(String),
}

/// A command write the amp control device did not accept.
#[derive(Debug, thiserror::Error)]
pub enum SinkWriteError {
    #[error("short write for amp {command}: {written} of 1 bytes written")]
    ShortWrite { command: AmpCommand, written: usize },
    #[error("failed to write amp {command}: {source}")]
    Io {
        command: AmpCommand,
        #[source]
        source: std::io::Error,
    },
}
