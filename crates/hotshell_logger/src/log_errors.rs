use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("The logging thread is already running")]
    AlreadyRunning,
    #[error("The logging thread is not running")]
    NotRunning,
    #[error("Logger with name \"{0}\" is registered more than once")]
    DuplicateLogger(&'static str),
    #[error("Could not open log file '{path}': {source}")]
    CouldNotOpenFile {
        path: String,
        source: std::io::Error,
    },
    #[error("Could not write to log file '{path}': {source}")]
    CouldNotWriteToFile {
        path: String,
        source: std::io::Error,
    },
    #[error("Could not spawn the logging thread: {0}")]
    CouldNotSpawnThread(std::io::Error),
    #[error("The logging thread panicked")]
    ThreadPanicked,
}
