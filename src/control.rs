//! External control triggers

use std::str::FromStr;

/// Trigger accepted by the simulation loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Advance exactly one cycle
    Step,
    /// End the simulation loop
    Stop,
    /// Anything else; ignored
    Unknown(String),
}

impl Command {
    /// Keypress form used by the console: space steps, `q` stops
    pub fn from_key(key: char) -> Self {
        match key {
            ' ' | 's' | '\n' => Command::Step,
            'q' | 'Q' => Command::Stop,
            other => Command::Unknown(other.to_string()),
        }
    }

    /// One console line: a lone keypress goes through [`Command::from_key`],
    /// anything longer is read as a word.
    pub fn from_line(line: &str) -> Self {
        let raw = line.trim_end_matches(['\r', '\n']);
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(key), None) => Command::from_key(key),
            _ => match raw.parse() {
                Ok(command) => command,
                Err(never) => match never {},
            },
        }
    }
}

impl FromStr for Command {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cmd = match s.trim().to_ascii_lowercase().as_str() {
            "" | "s" | "step" => Command::Step,
            "q" | "quit" | "stop" | "exit" => Command::Stop,
            other => Command::Unknown(other.to_string()),
        };
        Ok(cmd)
    }
}
