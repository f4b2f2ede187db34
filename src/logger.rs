//! Leveled, prefixable diagnostics on top of `tracing`.
//!
//! `info` and `warn` always emit. `verbose` and `very_verbose` are gated on the
//! matching settings flag, and turning on `very_verbose` implies `verbose`.
//! Relay loggers carry a per-connection prefix so interleaved output from
//! concurrent connections can be told apart.

use std::{fmt::Display, sync::Arc};
use tracing::{Level, debug, info, trace, warn};

use crate::config::Settings;

#[derive(Debug, Clone)]
pub struct Logger {
    prefix: Arc<str>,
    verbose: bool,
    very_verbose: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl Logger {
    #[must_use]
    pub fn new(verbose: bool, very_verbose: bool) -> Self {
        Self {
            prefix: Arc::from(""),
            verbose: verbose || very_verbose,
            very_verbose,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.verbose, settings.very_verbose)
    }

    /// Returns a copy of this logger that prepends `prefix` to every message.
    #[must_use]
    pub fn with_prefix(&self, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            prefix: prefix.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub const fn is_verbose(&self) -> bool {
        self.verbose
    }

    #[must_use]
    pub const fn is_very_verbose(&self) -> bool {
        self.very_verbose
    }

    pub fn info(&self, msg: impl Display) {
        info!("{}{msg}", self.prefix);
    }

    pub fn warn(&self, msg: impl Display) {
        warn!("{}{msg}", self.prefix);
    }

    pub fn verbose(&self, msg: impl Display) {
        if self.verbose {
            debug!("{}{msg}", self.prefix);
        }
    }

    /// Raw traffic output.
    pub fn very_verbose(&self, msg: impl Display) {
        if self.very_verbose {
            trace!("{}{msg}", self.prefix);
        }
    }
}

/// Installs the global fmt subscriber sized to the configured verbosity.
pub fn init_tracing(settings: &Settings) {
    let level = if settings.very_verbose {
        Level::TRACE
    } else if settings.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(settings.output_ansi_colors)
        .with_target(false)
        .init();
}


#[cfg(test)]
mod tests {
    use super::capture::capture;
    use super::*;

    #[test]
    fn very_verbose_implies_verbose() {
        let log = Logger::new(false, true);
        assert!(log.is_verbose());
        assert!(log.is_very_verbose());

        let log = Logger::new(true, false);
        assert!(log.is_verbose());
        assert!(!log.is_very_verbose());
    }

    #[test]
    fn prefix_is_prepended() {
        let (captured, _guard) = capture();
        let log = Logger::default().with_prefix("Connection #007 ");

        log.info("Opened");
        log.warn(format_args!("Read failed '{}'", "boom"));

        assert!(captured.contains("Connection #007 Opened"));
        assert!(captured.contains("Connection #007 Read failed 'boom'"));
        assert_eq!(captured.count_level("INFO"), 1);
        assert_eq!(captured.count_level("WARN"), 1);
    }

    #[test]
    fn gated_levels_stay_quiet_by_default() {
        let (captured, _guard) = capture();
        let log = Logger::default();

        log.verbose("debug line");
        log.very_verbose("raw bytes");
        assert!(captured.lines().is_empty());

        let log = Logger::new(false, true);
        log.verbose("debug line");
        log.very_verbose("raw bytes");
        assert_eq!(captured.count_level("DEBUG"), 1);
        assert_eq!(captured.count_level("TRACE"), 1);
    }

    #[test]
    fn prefix_survives_flag_copy() {
        let (captured, _guard) = capture();
        let base = Logger::new(true, false);
        let prefixed = base.with_prefix("X ");
        assert!(prefixed.is_verbose());

        prefixed.verbose("from prefixed");
        base.verbose("from base");

        let lines = captured.lines();
        assert!(lines.iter().any(|l| l.ends_with("X from prefixed")));
        assert!(lines.iter().any(|l| l.ends_with("DEBUG from base")));
    }
}
