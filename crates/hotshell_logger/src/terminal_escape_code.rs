use std::fmt::Display;

use crate::log_level::LogLevel;

pub type TerminalEscapeCode = u8;

pub const RESET: TerminalEscapeCode = 0;
pub const BOLD: TerminalEscapeCode = 1;
pub const DIM: TerminalEscapeCode = 2;

pub const RED: TerminalEscapeCode = 31;
pub const GREEN: TerminalEscapeCode = 32;
pub const YELLOW: TerminalEscapeCode = 33;
pub const CYAN: TerminalEscapeCode = 36;
pub const WHITE: TerminalEscapeCode = 37;

pub const fn bg_color(color: TerminalEscapeCode) -> TerminalEscapeCode {
    color + 10
}

/// A list of SGR codes rendered as a single `ESC[...m` sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalEscapeSequence(pub Vec<TerminalEscapeCode>);

impl TerminalEscapeSequence {
    pub fn reset() -> Self {
        Self(vec![RESET])
    }
}

impl Display for TerminalEscapeSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let codes = self
            .0
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<String>>()
            .join(";");
        write!(f, "\x1b[{}m", codes)
    }
}

impl From<LogLevel> for TerminalEscapeSequence {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Debug => Self(vec![DIM, WHITE]),
            LogLevel::Info => Self(vec![GREEN]),
            LogLevel::Warn => Self(vec![YELLOW]),
            LogLevel::Error => Self(vec![RED]),
            LogLevel::Critical => Self(vec![bg_color(RED), WHITE, BOLD]),
        }
    }
}

impl From<TerminalEscapeCode> for TerminalEscapeSequence {
    fn from(value: TerminalEscapeCode) -> Self {
        Self(vec![value])
    }
}
