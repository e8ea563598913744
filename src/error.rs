//! Error and interruption types shared by every generation stage.

use thiserror::Error;

/// Errors that abort a generation run.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("map dimensions {width}x{height} outside allowed range {min}..={max}")]
    DimensionOutOfRange {
        width: usize,
        height: usize,
        min: usize,
        max: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("stage `{stage}` requires `{requires}` to be generated first")]
    MissingPrerequisite {
        stage: &'static str,
        requires: &'static str,
    },

    #[error("generation cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a stage stopped before producing its output.
///
/// Cancellation is not an error: it unwinds through `?` like one, but the
/// public entry point reports it as its own outcome.
#[derive(Debug)]
pub enum Halt {
    Cancelled,
    Failed(GenError),
}

impl From<GenError> for Halt {
    fn from(err: GenError) -> Self {
        Halt::Failed(err)
    }
}

impl std::fmt::Display for Halt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Halt::Cancelled => write!(f, "generation cancelled"),
            Halt::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Result type used inside the pipeline.
pub type StageResult<T> = Result<T, Halt>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_error_converts_to_halt() {
        fn failing() -> Result<(), GenError> {
            Err(GenError::InvalidConfig("scale".into()))
        }
        fn stage() -> StageResult<()> {
            failing()?;
            Ok(())
        }
        match stage() {
            Err(Halt::Failed(GenError::InvalidConfig(msg))) => assert_eq!(msg, "scale"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_messages_name_the_stage() {
        let err = GenError::MissingPrerequisite { stage: "biomes", requires: "climate" };
        assert!(err.to_string().contains("biomes"));
        assert!(err.to_string().contains("climate"));
    }
}
