use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use crate::error::Error;
use crate::lsp::types::Id;

/// How much of the traffic an endpoint logs.
///
/// Levels are ordered: enabling one enables everything before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    /// Includes the text of every frame.
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("unknown log level {:?}", s)),
        }
    }
}

/// Logging capability owned by an endpoint.
///
/// Only emits through `tracing`, so nothing here can fail the connection.
#[derive(Clone, Debug)]
pub(crate) struct Logger {
    name: String,
    level: LogLevel,
}

impl Logger {
    pub(crate) fn new(name: String, level: LogLevel) -> Self {
        Logger { name, level }
    }

    pub(crate) fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self.level
    }

    pub(crate) fn outgoing(&self, text: &str) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!(endpoint = %self.name, "--> {}", text);
        }
    }

    pub(crate) fn incoming(&self, text: &str) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!(endpoint = %self.name, "<-- {}", text);
        }
    }

    pub(crate) fn error(&self, err: &Error) {
        if self.enabled(LogLevel::Error) {
            tracing::error!(endpoint = %self.name, "{}", err);
        }
    }

    pub(crate) fn unhandled(&self, method: &str, id: Option<&Id>) {
        match id {
            Some(id) if self.enabled(LogLevel::Warn) => {
                tracing::warn!(endpoint = %self.name, "no handler for request {} ({})", method, id);
            }
            None if self.enabled(LogLevel::Trace) => {
                tracing::trace!(endpoint = %self.name, "no handler for notification {}", method);
            }
            _ => {}
        }
    }

    pub(crate) fn closed(&self, pending: usize) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(endpoint = %self.name, pending, "connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("off".parse::<LogLevel>(), Ok(LogLevel::Off));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn levels_enable_lower_ones() {
        let logger = Logger::new("test".to_owned(), LogLevel::Warn);
        assert!(logger.enabled(LogLevel::Error));
        assert!(logger.enabled(LogLevel::Warn));
        assert!(!logger.enabled(LogLevel::Info));
        assert!(!logger.enabled(LogLevel::Off));

        let logger = Logger::new("test".to_owned(), LogLevel::Off);
        assert!(!logger.enabled(LogLevel::Error));
    }
}
