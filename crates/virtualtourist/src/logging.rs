//! Logging setup for the `vtour` binary and the library.
//!
//! Diagnostics go to stderr; stdout is reserved for command output so that
//! `--format json` can be piped.

use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// Crates whose logs are shown at the chosen verbosity. The binary logs under
/// its own target name.
const OWN_TARGETS: [&str; 2] = ["virtualtourist", "vtour"];

/// HTTP stack crates. Kept at `warn` unless tracing everything.
const HTTP_TARGETS: [&str; 2] = ["reqwest", "hyper"];

/// How much diagnostic output to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Errors only (`-q`).
    Quiet,
    /// Progress messages.
    #[default]
    Normal,
    /// Debug output (`-v`).
    Verbose,
    /// Everything, including HTTP internals (`-vv`).
    Trace,
}

impl Verbosity {
    /// Pick a verbosity from the `-q` flag and the number of `-v` flags.
    ///
    /// `quiet` wins over any number of `-v`.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Level applied to this crate's own targets.
    #[must_use]
    pub fn level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::ERROR,
            Self::Normal => LevelFilter::INFO,
            Self::Verbose => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    /// Level applied to the HTTP client crates.
    #[must_use]
    pub fn http_level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::ERROR,
            Self::Trace => LevelFilter::DEBUG,
            _ => LevelFilter::WARN,
        }
    }

    /// The `EnvFilter` directives used when `RUST_LOG` is not set.
    #[must_use]
    pub fn directives(self) -> String {
        OWN_TARGETS
            .iter()
            .map(|target| format!("{target}={}", self.level()))
            .chain(
                HTTP_TARGETS
                    .iter()
                    .map(|target| format!("{target}={}", self.http_level())),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG`, when set, replaces the directives derived from `verbosity`.
/// Calling this more than once is harmless; later calls do nothing.
///
/// # Examples
///
/// ```no_run
/// use virtualtourist::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directives()));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity >= Verbosity::Verbose)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init();
}

/// Warnings and errors only, captured per test.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        assert_eq!(Verbosity::from_flags(false, 0), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(false, 1), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, 5), Verbosity::Trace);
        assert_eq!(Verbosity::from_flags(true, 2), Verbosity::Quiet);
    }

    #[test]
    fn test_levels() {
        assert_eq!(Verbosity::Quiet.level(), LevelFilter::ERROR);
        assert_eq!(Verbosity::default().level(), LevelFilter::INFO);
        assert_eq!(Verbosity::Verbose.level(), LevelFilter::DEBUG);
        assert_eq!(Verbosity::Trace.level(), LevelFilter::TRACE);
    }

    #[test]
    fn test_http_crates_stay_quiet_until_trace() {
        assert_eq!(Verbosity::Verbose.http_level(), LevelFilter::WARN);
        assert_eq!(Verbosity::Trace.http_level(), LevelFilter::DEBUG);
    }

    #[test]
    fn test_directives() {
        assert_eq!(
            Verbosity::Verbose.directives().to_lowercase(),
            "virtualtourist=debug,vtour=debug,reqwest=warn,hyper=warn"
        );
        // Every directive must parse
        EnvFilter::try_new(Verbosity::Trace.directives()).unwrap();
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Trace);
        init_test_logging();
    }
}
