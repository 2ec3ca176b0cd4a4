//! Tagged stage results.
//!
//! A pipeline stage can succeed, succeed with a caveat the caller must record,
//! or fail in a way that aborts the batch. Keeping those three cases in one
//! enum means a "skip this value" signal can never be mistaken for an
//! "abort everything" signal.

use crate::document::ExtractionMetadata;

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    /// The stage produced its value with nothing to report.
    Ok(T),
    /// The stage produced a usable value but degraded along the way.
    Recoverable { value: T, reason: String },
    /// The enclosing batch must stop.
    Fatal {
        reason: String,
        metadata: Option<Box<ExtractionMetadata>>,
    },
}

impl<T> StageOutcome<T> {
    pub fn recoverable(value: T, reason: impl Into<String>) -> Self {
        StageOutcome::Recoverable {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageOutcome::Fatal { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            StageOutcome::Ok(_) => None,
            StageOutcome::Recoverable { reason, .. } | StageOutcome::Fatal { reason, .. } => {
                Some(reason)
            }
        }
    }

    /// The carried value, if the stage was not fatal.
    pub fn value(self) -> Option<T> {
        match self {
            StageOutcome::Ok(value) | StageOutcome::Recoverable { value, .. } => Some(value),
            StageOutcome::Fatal { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        match self {
            StageOutcome::Ok(value) => StageOutcome::Ok(f(value)),
            StageOutcome::Recoverable { value, reason } => StageOutcome::Recoverable {
                value: f(value),
                reason,
            },
            StageOutcome::Fatal { reason, metadata } => StageOutcome::Fatal { reason, metadata },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_kept_unless_fatal() {
        assert_eq!(StageOutcome::Ok(3).value(), Some(3));
        assert_eq!(StageOutcome::recoverable(4, "hash fallback").value(), Some(4));
        let fatal: StageOutcome<i32> = StageOutcome::Fatal {
            reason: "down".into(),
            metadata: None,
        };
        assert!(fatal.is_fatal());
        assert_eq!(fatal.value(), None);
    }

    #[test]
    fn map_preserves_reason() {
        let mapped = StageOutcome::recoverable(2, "partial").map(|v| v * 10);
        assert_eq!(mapped.reason(), Some("partial"));
        assert_eq!(mapped.value(), Some(20));
    }
}
