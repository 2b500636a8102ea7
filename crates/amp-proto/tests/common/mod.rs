use std::collections::VecDeque;

use amp_proto::protocol::AmpCommand;
use amp_proto::state::AmpSink;

/// Sink that records every command it accepted.  Scripted results are
/// consumed first; once the script is empty every write succeeds.
#[derive(Default)]
pub struct RecordingSink {
    pub accepted: Vec<AmpCommand>,
    pub attempts: Vec<AmpCommand>,
    script: VecDeque<std::io::Result<usize>>,
}

impl RecordingSink {
    pub fn with_script(script: impl IntoIterator<Item = std::io::Result<usize>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl AmpSink for RecordingSink {
    fn write_command(&mut self, command: AmpCommand) -> std::io::Result<usize> {
        self.attempts.push(command);
        let result = self.script.pop_front().unwrap_or(Ok(1));
        if matches!(result, Ok(1)) {
            self.accepted.push(command);
        }
        result
    }
}
