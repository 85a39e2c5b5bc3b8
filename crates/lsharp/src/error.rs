use thiserror::Error;

/// Everything that can go wrong while learning. All variants are fatal: the
/// learner performs no retries and propagates the error to the caller of
/// [`LSharp::infer`](crate::LSharp::infer).
///
/// Symbol payloads are rendered to strings at the point of failure so the
/// error type stays independent of the symbol types in use.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LearningError {
    /// An observation disagrees with an edge already recorded in the tree.
    /// This means the system under learning is not deterministic.
    #[error(
        "observation conflicts with the tree: input {input} already recorded with output {recorded}, now observed {observed}"
    )]
    OutputMismatch {
        input: String,
        recorded: String,
        observed: String,
    },
    /// A query contained a symbol outside the learning alphabet.
    #[error("input {0} is not part of the learning alphabet")]
    InvalidInput(String),
    /// Input and output words of an observation differ in length.
    #[error("inputs and outputs must have equal length ({inputs} vs {outputs})")]
    LengthMismatch { inputs: usize, outputs: usize },
    /// Hypothesis construction hit a state of the bookkeeping that the
    /// algorithm's invariants rule out. Indicates a bug, not a user error.
    #[error("hypothesis construction failed: {0}")]
    MalformedBasis(String),
    /// A basis state lacks an observation that adequacy should have ensured.
    #[error("basis state lacks an observation required for hypothesis construction")]
    MissingObservation,
    /// The characterization set of a hypothesis could not be computed.
    #[error("hypothesis is non-canonical: characterization set cannot be computed")]
    NonCanonicalHypothesis,
    /// The configured learning-round bound was reached without termination.
    #[error("exceeded the configured bound of {0} learning rounds")]
    MaxRoundsExceeded(usize),
}
