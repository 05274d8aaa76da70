use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    /// Levels at or above this one go to stderr instead of stdout.
    pub const STDERR_THRESHOLD: LogLevel = LogLevel::Error;

    pub fn is_error(&self) -> bool {
        *self >= Self::STDERR_THRESHOLD
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Critical);
    }

    #[test]
    fn test_error_levels() {
        assert!(!LogLevel::Warn.is_error());
        assert!(LogLevel::Error.is_error());
        assert!(LogLevel::Critical.is_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(LogLevel::Critical.to_string(), "CRITICAL");
        assert_eq!(LogLevel::Info.to_string(), "INFO");
    }
}
