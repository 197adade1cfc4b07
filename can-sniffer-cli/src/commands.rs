//! Terminal command parsing
//!
//! One command per line, selected by its first character. `m` on its own arms
//! annotation mode: the next line is taken verbatim as the annotation text.
//! Unrecognised input is ignored.

use can_sniffer_core::{BusSpeed, Command};

/// Menu shown by `h`
pub const HELP: &str = "\
========== COMMANDS ==========
1 - Set baud to 125 kbps
2 - Set baud to 250 kbps (default, most common)
3 - Set baud to 500 kbps
4 - Set baud to 1 Mbps
a - Auto-scan all baud rates
s - Print status summary
i - Print identifier table
r [n] - Print the n most recent log entries
n <seq> - Print log entries newer than sequence <seq>
e - Print full CSV export
w - Write CSV export to a file
c - Clear message counts
m [text] - Add annotation mark (no text: type it on the next line)
h - Print this help
q - Quit
==============================";

/// A parsed terminal line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Forwarded to the sniffer
    Command(Command),
    /// Next line is annotation text
    AwaitingMark,
    /// Write the export to a file
    Save,
    Help,
    Quit,
}

/// Line parser with the pending-annotation state
#[derive(Debug, Default)]
pub struct CommandParser {
    awaiting_mark: bool,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the next line will be taken as an annotation
    pub fn is_awaiting_mark(&self) -> bool {
        self.awaiting_mark
    }

    /// Parse one line; `None` for blank or unrecognised input
    pub fn parse_line(&mut self, line: &str) -> Option<Input> {
        if self.awaiting_mark {
            self.awaiting_mark = false;
            return Some(Input::Command(Command::Annotate(line.to_string())));
        }

        let line = line.trim();
        let mut chars = line.chars();
        let selector = chars.next()?;
        let argument = chars.as_str().trim();

        let input = match selector.to_ascii_lowercase() {
            '1' | '2' | '3' | '4' if argument.is_empty() => {
                Input::Command(Command::SetSpeed(BusSpeed::from_selector(selector)?))
            }
            'a' => Input::Command(Command::RunDetection),
            's' => Input::Command(Command::Status),
            'i' => Input::Command(Command::Identifiers),
            'c' => Input::Command(Command::Clear),
            'e' => Input::Command(Command::Export),
            'w' => Input::Save,
            'r' => {
                if argument.is_empty() {
                    Input::Command(Command::Recent(None))
                } else {
                    Input::Command(Command::Recent(Some(argument.parse().ok()?)))
                }
            }
            'n' => Input::Command(Command::Since(argument.parse().ok()?)),
            'm' => {
                if argument.is_empty() {
                    self.awaiting_mark = true;
                    Input::AwaitingMark
                } else {
                    Input::Command(Command::Annotate(argument.to_string()))
                }
            }
            'h' | '?' => Input::Help,
            'q' => Input::Quit,
            _ => {
                log::debug!("Ignoring unrecognised input: {:?}", line);
                return None;
            }
        };

        Some(input)
    }
}
