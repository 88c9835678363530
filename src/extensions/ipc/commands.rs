//! The closed set of host commands reachable from extension script.
//!
//! Command names coming off the wire are mapped onto [`CommandKind`] first;
//! anything that does not map is rejected before a payload is even decoded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies a host command, independent of its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    ReadFile,
    WriteFile,
    ListDirectory,
    DeleteFile,
    Greet,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::ReadFile,
        CommandKind::WriteFile,
        CommandKind::ListDirectory,
        CommandKind::DeleteFile,
        CommandKind::Greet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::ReadFile => "read_file",
            CommandKind::WriteFile => "write_file",
            CommandKind::ListDirectory => "list_directory",
            CommandKind::DeleteFile => "delete_file",
            CommandKind::Greet => "greet",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for a command name outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl FromStr for CommandKind {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read_file" | "get_file_content" => Ok(CommandKind::ReadFile),
            "write_file" => Ok(CommandKind::WriteFile),
            "list_directory" | "open_folder" => Ok(CommandKind::ListDirectory),
            "delete_file" => Ok(CommandKind::DeleteFile),
            "greet" => Ok(CommandKind::Greet),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// A fully decoded host command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    ReadFile { path: String },
    WriteFile { path: String, contents: String },
    ListDirectory { path: String },
    DeleteFile { path: String },
    Greet { name: String },
}

#[derive(Deserialize)]
struct PathArgs {
    #[serde(alias = "filePath", alias = "file_path", alias = "folderPath")]
    path: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    #[serde(alias = "filePath", alias = "file_path")]
    path: String,
    #[serde(alias = "content")]
    contents: String,
}

#[derive(Deserialize)]
struct GreetArgs {
    name: String,
}

impl HostCommand {
    /// Decode the payload for an already-identified command.
    pub fn decode(kind: CommandKind, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            CommandKind::ReadFile => {
                let args: PathArgs = serde_json::from_value(payload)?;
                HostCommand::ReadFile { path: args.path }
            }
            CommandKind::WriteFile => {
                let args: WriteArgs = serde_json::from_value(payload)?;
                HostCommand::WriteFile {
                    path: args.path,
                    contents: args.contents,
                }
            }
            CommandKind::ListDirectory => {
                let args: PathArgs = serde_json::from_value(payload)?;
                HostCommand::ListDirectory { path: args.path }
            }
            CommandKind::DeleteFile => {
                let args: PathArgs = serde_json::from_value(payload)?;
                HostCommand::DeleteFile { path: args.path }
            }
            CommandKind::Greet => {
                let args: GreetArgs = serde_json::from_value(payload)?;
                HostCommand::Greet { name: args.name }
            }
        })
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            HostCommand::ReadFile { .. } => CommandKind::ReadFile,
            HostCommand::WriteFile { .. } => CommandKind::WriteFile,
            HostCommand::ListDirectory { .. } => CommandKind::ListDirectory,
            HostCommand::DeleteFile { .. } => CommandKind::DeleteFile,
            HostCommand::Greet { .. } => CommandKind::Greet,
        }
    }
}
