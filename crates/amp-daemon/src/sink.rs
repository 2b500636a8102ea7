/// Amp control device, opened write-only for the lifetime of the daemon.
///
/// The descriptor is released exactly once: either by `close()` on the
/// normal shutdown path, or by `Drop` on every other exit path (early return
/// during setup, panic unwinding).
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use amp_proto::protocol::AmpCommand;
use amp_proto::state::AmpSink;
use anyhow::Context;
use tracing::{debug, info};

pub struct AmpDevice {
    path: PathBuf,
    file: Option<File>,
}

impl AmpDevice {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open amp control device {}", path.display()))?;
        info!("Amp control device opened: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and release the device, reporting any error to the caller.
    pub fn close(mut self) -> std::io::Result<()> {
        let result = match self.file.take() {
            Some(mut file) => file.flush(),
            None => Ok(()),
        };
        info!("Amp control device closed");
        result
    }
}

impl AmpSink for AmpDevice {
    fn write_command(&mut self, command: AmpCommand) -> std::io::Result<usize> {
        let file = self.file.as_mut().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "amp control device already closed",
            )
        })?;
        debug!("amp: write {:?} to {}", command, self.path.display());
        file.write(&[command.as_byte()])
    }
}

impl Drop for AmpDevice {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            info!("Amp control device closed");
        }
    }
}
