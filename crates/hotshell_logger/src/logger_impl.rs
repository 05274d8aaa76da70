use std::{fs::OpenOptions, io::Write};

use anyhow::Result;
use cfg_if::cfg_if;

use crate::{log_errors::LogError, log_level::LogLevel, TerminalEscapeSequence};

pub const CORE_LOGGER_NAME: &str = "core";
pub const APP_LOGGER_NAME: &str = "app";

cfg_if! {
    if #[cfg(debug_assertions)] {
        pub const DEFAULT_MIN_LEVEL: LogLevel = LogLevel::Debug;
    } else {
        pub const DEFAULT_MIN_LEVEL: LogLevel = LogLevel::Info;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogTarget {
    Stdout,
    Stderr,
    File(&'static str),
}

impl LogTarget {
    /// Stdout only takes non-error levels and stderr only error levels, so a
    /// logger with both terminal targets prints every message exactly once.
    pub fn accepts(&self, level: LogLevel) -> bool {
        match self {
            LogTarget::Stdout => !level.is_error(),
            LogTarget::Stderr => level.is_error(),
            LogTarget::File(_) => true,
        }
    }
}

#[derive(Debug)]
pub struct LogMessage {
    pub logger_name: &'static str,
    pub level: LogLevel,
    pub msg: String,
    pub shutdown: bool,
}

#[derive(Debug)]
pub struct Logger {
    pub name: &'static str,
    pub label: &'static str,
    pub min_level: LogLevel,
    pub targets: Vec<LogTarget>,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            name: APP_LOGGER_NAME,
            label: "App",
            min_level: DEFAULT_MIN_LEVEL,
            targets: vec![LogTarget::Stdout, LogTarget::Stderr],
        }
    }
}

impl Logger {
    pub fn default_core() -> Self {
        Self {
            name: CORE_LOGGER_NAME,
            label: "Shell",
            ..Default::default()
        }
    }

    pub fn default_app() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn with_target(mut self, target: LogTarget) -> Self {
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
        self
    }

    pub fn with_min_level(mut self, min_level: LogLevel) -> Self {
        self.min_level = min_level;
        self
    }

    pub fn log(&self, level: LogLevel, msg: &str) {
        if level < self.min_level {
            return;
        }

        for target in self.targets.iter().filter(|t| t.accepts(level)) {
            if let Err(e) = self.log_to_target(target, level, msg) {
                eprintln!("{e}");
            }
        }
    }

    pub fn format_terminal(&self, level: LogLevel, msg: &str) -> String {
        format!(
            "{}{} [{}]: {}{}",
            TerminalEscapeSequence::from(level),
            self.label,
            level,
            msg,
            TerminalEscapeSequence::reset()
        )
    }

    pub fn format_file(&self, level: LogLevel, msg: &str) -> String {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        format!("{} {} [{}]: {}\n", timestamp, self.label, level, msg)
    }

    fn log_to_target(&self, target: &LogTarget, level: LogLevel, msg: &str) -> Result<()> {
        match target {
            LogTarget::Stdout => {
                println!("{}", self.format_terminal(level, msg));
                Ok(())
            }
            LogTarget::Stderr => {
                eprintln!("{}", self.format_terminal(level, msg));
                Ok(())
            }
            LogTarget::File(path) => {
                let mut file = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(path)
                    .map_err(|source| LogError::CouldNotOpenFile {
                        path: path.to_string(),
                        source,
                    })?;

                file.write_all(self.format_file(level, msg).as_bytes())
                    .map_err(|source| LogError::CouldNotWriteToFile {
                        path: path.to_string(),
                        source,
                    })?;
                Ok(())
            }
        }
    }
}
