//! Error taxonomy shared by the engine, the serializer and the CLI.

use crate::individual::IndividualId;
use thiserror::Error;

/// Engine-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A vector handed to the network (or an observation) has the wrong width.
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// A persisted population file could not be parsed.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// A persisted morphology tag has no known descriptor.
    #[error("unknown morphology: {0}")]
    UnknownMorphology(String),

    /// Selection was asked for zero survivors, or ran on an empty pool.
    #[error("selection requires at least one evaluated individual and one survivor")]
    EmptyPopulation,

    #[error("invalid morphology: {0}")]
    InvalidMorphology(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown activation function: {0}")]
    UnknownActivation(String),

    /// A single trial failed; the surrounding generation keeps going.
    #[error("trial failed for individual {individual}: {source}")]
    Trial {
        individual: IndividualId,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }

    /// True for errors that only invalidate the current trial.
    ///
    /// A wrapped [`Error::Trial`] is local only when its source is. Environment
    /// I/O and configuration failures abort the generation.
    pub fn is_trial_local(&self) -> bool {
        match self {
            Self::ShapeMismatch { .. } => true,
            Self::Trial { source, .. } => source.is_trial_local(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::ShapeMismatch {
            expected: 15,
            found: 14,
        };
        assert_eq!(err.to_string(), "shape mismatch: expected 15, found 14");

        let err = Error::malformed(12, "bad weight literal");
        assert_eq!(err.to_string(), "malformed record at line 12: bad weight literal");
    }

    #[test]
    fn test_trial_error_wraps_source() {
        let err = Error::Trial {
            individual: IndividualId(7),
            source: Box::new(Error::ShapeMismatch {
                expected: 4,
                found: 3,
            }),
        };
        assert!(err.is_trial_local());
        assert!(err.to_string().contains("individual #7"));
        assert!(!Error::EmptyPopulation.is_trial_local());
    }

    #[test]
    fn test_environment_failure_is_not_trial_local() {
        let err = Error::Trial {
            individual: IndividualId(2),
            source: Box::new(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "simulator went away",
            ))),
        };
        assert!(!err.is_trial_local());

        let err = Error::Trial {
            individual: IndividualId(2),
            source: Box::new(Error::InvalidMorphology("no joints".to_string())),
        };
        assert!(!err.is_trial_local());
    }
}
