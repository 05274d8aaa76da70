use std::{
    collections::HashMap,
    sync::{
        mpsc::{channel, Sender},
        Mutex, MutexGuard,
    },
    thread::JoinHandle,
};

use crate::{
    log_errors::LogError,
    log_level::LogLevel,
    logger_impl::{LogMessage, Logger, APP_LOGGER_NAME, CORE_LOGGER_NAME},
};

struct LoggerThread {
    sender: Sender<LogMessage>,
    handle: JoinHandle<()>,
}

static LOGGER_THREAD: Mutex<Option<LoggerThread>> = Mutex::new(None);

fn logger_thread() -> MutexGuard<'static, Option<LoggerThread>> {
    // A panic while holding the lock leaves the Option intact.
    LOGGER_THREAD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Spawns the background thread that owns every logger. `core` and `app`
/// loggers are added with their defaults when `loggers` does not provide them.
pub fn logging_thread_start(loggers: Option<Vec<Logger>>) -> Result<(), LogError> {
    let mut thread = logger_thread();
    if thread.is_some() {
        return Err(LogError::AlreadyRunning);
    }

    let mut logger_map = HashMap::new();
    for logger in loggers.unwrap_or_default() {
        let name = logger.name();
        if logger_map.insert(name, logger).is_some() {
            return Err(LogError::DuplicateLogger(name));
        }
    }
    logger_map
        .entry(CORE_LOGGER_NAME)
        .or_insert_with(Logger::default_core);
    logger_map
        .entry(APP_LOGGER_NAME)
        .or_insert_with(Logger::default_app);

    let (sender, receiver) = channel::<LogMessage>();

    let handle = std::thread::Builder::new()
        .name("hotshell-logger".into())
        .spawn(move || {
            while let Ok(msg) = receiver.recv() {
                match logger_map.get(msg.logger_name) {
                    Some(logger) => logger.log(msg.level, &msg.msg),
                    None => eprintln!("Logger with name \"{}\" does not exist", msg.logger_name),
                }

                if msg.shutdown {
                    break;
                }
            }
        })
        .map_err(LogError::CouldNotSpawnThread)?;

    *thread = Some(LoggerThread { sender, handle });
    Ok(())
}

/// Flushes every queued message and stops the logging thread.
pub fn logging_thread_join() -> Result<(), LogError> {
    let thread = logger_thread().take().ok_or(LogError::NotRunning)?;

    let _ = thread.sender.send(LogMessage {
        logger_name: CORE_LOGGER_NAME,
        level: LogLevel::Info,
        msg: "Shutting down the logger thread".into(),
        shutdown: true,
    });

    thread.handle.join().map_err(|_| LogError::ThreadPanicked)
}

pub fn is_logging_thread_running() -> bool {
    logger_thread().is_some()
}

/// Queues a message for the logging thread. Without a running thread the
/// message is dropped, unless it is an error, which is printed to stderr.
pub fn send_log_message(logger_name: &'static str, level: LogLevel, msg: String) {
    let thread = logger_thread();
    match thread.as_ref() {
        Some(thread) => {
            let _ = thread.sender.send(LogMessage {
                logger_name,
                level,
                msg,
                shutdown: false,
            });
        }
        None if level.is_error() => eprintln!("{logger_name} [{level}]: {msg}"),
        None => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // The logging thread is process-global, so every assertion about its
    // lifecycle lives in one test.
    #[test]
    fn test_logging_thread_lifecycle() -> anyhow::Result<()> {
        assert!(matches!(logging_thread_join(), Err(LogError::NotRunning)));

        let duplicated = vec![Logger::default_core(), Logger::default_core()];
        assert!(matches!(
            logging_thread_start(Some(duplicated)),
            Err(LogError::DuplicateLogger("core"))
        ));
        assert!(!is_logging_thread_running());

        let quiet = Logger {
            targets: vec![],
            ..Logger::default_core()
        };
        logging_thread_start(Some(vec![quiet]))?;
        assert!(is_logging_thread_running());
        assert!(matches!(
            logging_thread_start(None),
            Err(LogError::AlreadyRunning)
        ));

        send_log_message(CORE_LOGGER_NAME, LogLevel::Debug, "queued".into());
        send_log_message("missing", LogLevel::Debug, "unknown logger".into());

        logging_thread_join()?;
        assert!(!is_logging_thread_running());
        Ok(())
    }
}
