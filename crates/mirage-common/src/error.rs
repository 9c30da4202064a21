use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirageError>;

/// Failure taxonomy for the overlay engine. Nothing in here is allowed to
/// escape and crash the host's main loop; callers convert these to log
/// records at task boundaries.
#[derive(Debug, Error)]
pub enum MirageError {
    /// Rejected before any side effect: missing viewer/chunk arguments,
    /// out-of-range light values.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Scoped to a single chunk/viewer synthesis attempt; sibling work
    /// continues.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Anything else caught at a worker task boundary.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = MirageError::Synthesis("section count 8, expected 16".to_owned());
        assert!(err.to_string().contains("section count 8"));
    }
}
