//! Domain error types.
//!
//! Configuration problems are collected in [`ConfigError`] and surface before
//! any simulation step runs. Everything else is a [`BarstepError`].

use chrono::NaiveDateTime;
use std::fmt;

use super::strategy::RunState;

/// What kind of registration a configuration error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Indicator,
    Signal,
    Rule,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Indicator => write!(f, "indicator"),
            Namespace::Signal => write!(f, "signal"),
            Namespace::Rule => write!(f, "rule"),
        }
    }
}

/// Errors raised while registering or resolving strategy components.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate {kind} '{name}' for group {group}")]
    DuplicateName {
        kind: Namespace,
        name: String,
        group: String,
    },

    #[error("{kind} '{name}' depends on unknown {dependency_kind} '{dependency}' (group {group})")]
    UnresolvedDependency {
        kind: Namespace,
        name: String,
        dependency_kind: Namespace,
        dependency: String,
        group: String,
    },

    #[error("{kind} dependency cycle: {}", .path.join(" -> "))]
    Cycle { kind: Namespace, path: Vec<String> },

    #[error("{kind} '{name}' for group {group} has {actual} values, time axis has {expected}")]
    LengthMismatch {
        kind: Namespace,
        name: String,
        group: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid time axis: {reason}")]
    TimeAxis { reason: String },

    #[error("group {0} is not part of this strategy")]
    UnknownGroup(String),

    #[error("rule '{rule}' refers to unknown signal '{signal}'")]
    UnknownSignal { rule: String, signal: String },

    #[error("rule '{rule}' has an empty trigger set")]
    EmptyTriggerSet { rule: String },

    #[error("no market simulator registered")]
    MissingMarketSimulator,

    #[error("strategy has no instrument groups")]
    NoGroups,
}

/// Top-level error type for barstep.
#[derive(Debug, thiserror::Error)]
pub enum BarstepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot {operation} while strategy is {state}")]
    InvalidState {
        operation: &'static str,
        state: RunState,
    },

    #[error("assertion failed: {reason}")]
    Assertion { reason: String },

    #[error("invariant violated: {reason}")]
    InvariantViolation { reason: String },

    #[error("rule '{rule}' failed for group {group} at index {index}: {source}")]
    RuleFailed {
        rule: String,
        group: String,
        index: usize,
        #[source]
        source: Box<BarstepError>,
    },

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("unknown instrument group: {0}")]
    UnknownGroup(String),

    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("query at {requested} is ahead of simulation time {current}")]
    LookAhead {
        requested: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("no series named '{name}'")]
    MissingSeries { name: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BarstepError {
    /// Whether this error was raised before the simulation loop started.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BarstepError::Config(_)
                | BarstepError::ConfigParse { .. }
                | BarstepError::ConfigMissing { .. }
                | BarstepError::ConfigInvalid { .. }
        )
    }
}

/// Fail with [`BarstepError::Assertion`] unless `condition` holds.
///
/// Intended for rule callbacks that rely on account state, e.g. an entry rule
/// that must only ever see a flat position.
pub fn ensure(condition: bool, reason: impl Into<String>) -> Result<(), BarstepError> {
    if condition {
        Ok(())
    } else {
        Err(BarstepError::Assertion {
            reason: reason.into(),
        })
    }
}

impl From<&BarstepError> for std::process::ExitCode {
    fn from(err: &BarstepError) -> Self {
        let code: u8 = match err {
            BarstepError::Io(_) => 1,
            BarstepError::ConfigParse { .. }
            | BarstepError::ConfigMissing { .. }
            | BarstepError::ConfigInvalid { .. } => 2,
            BarstepError::Data { .. } => 3,
            BarstepError::Config(_) | BarstepError::InvalidState { .. } => 4,
            BarstepError::Assertion { .. }
            | BarstepError::InvariantViolation { .. }
            | BarstepError::RuleFailed { .. }
            | BarstepError::UnknownInstrument(_)
            | BarstepError::UnknownGroup(_)
            | BarstepError::InvalidOrder { .. }
            | BarstepError::LookAhead { .. }
            | BarstepError::MissingSeries { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_display_joins_path() {
        let err = ConfigError::Cycle {
            kind: Namespace::Indicator,
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "indicator dependency cycle: a -> b -> a");
    }

    #[test]
    fn ensure_passes_and_fails() {
        assert!(ensure(true, "fine").is_ok());
        let err = ensure(false, "position must be flat").unwrap_err();
        assert!(matches!(err, BarstepError::Assertion { .. }));
        assert_eq!(err.to_string(), "assertion failed: position must be flat");
    }

    #[test]
    fn configuration_classification() {
        let err: BarstepError = ConfigError::MissingMarketSimulator.into();
        assert!(err.is_configuration());
        let err = BarstepError::UnknownInstrument("XYZ".into());
        assert!(!err.is_configuration());
    }

    #[test]
    fn rule_failure_keeps_source() {
        let err = BarstepError::RuleFailed {
            rule: "entry".into(),
            group: "AAPL".into(),
            index: 3,
            source: Box::new(BarstepError::Assertion {
                reason: "flat".into(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "rule 'entry' failed for group AAPL at index 3: assertion failed: flat"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
