use std::fmt;

use tracing::info;

use crate::config::CommandConfig;

/// Actions a remote operator can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    TakePhoto,
    RecordVideo,
    Feed,
    ReadTemperature,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::TakePhoto => "take-photo",
            Command::RecordVideo => "record-video",
            Command::Feed => "feed",
            Command::ReadTemperature => "read-temperature",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps configured command tokens to [`Command`]s.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    routes: [(Box<str>, Command); 4],
}

impl CommandRouter {
    pub fn new(commands: &CommandConfig) -> Self {
        Self {
            routes: [
                (commands.take_photo.as_str().into(), Command::TakePhoto),
                (commands.record_video.as_str().into(), Command::RecordVideo),
                (commands.feed.as_str().into(), Command::Feed),
                (
                    commands.read_temperature.as_str().into(),
                    Command::ReadTemperature,
                ),
            ],
        }
    }

    /// Exact match only. Unknown tokens are logged and yield `None`.
    pub fn route(&self, token: &str) -> Option<Command> {
        info!(command = token, "Received command");

        let command = self
            .routes
            .iter()
            .find(|(known, _)| &**known == token)
            .map(|(_, command)| *command);

        if command.is_none() {
            info!(command = token, "Ignoring unknown command");
        }
        command
    }
}
