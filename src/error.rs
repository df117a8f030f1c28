use thiserror::Error;

use crate::sample::ModelKind;

/// Everything that can go wrong when inferring an automaton. Rejected merges are not errors,
/// they are part of the regular search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpniError {
    /// Two observations assign different labels to the same prefix, so no deterministic model
    /// can be consistent with the sample.
    #[error("sample is not deterministic, prefix {prefix} is observed with conflicting outputs; fix the sample or use a non-exact inference technique")]
    SampleInconsistency {
        /// The offending prefix.
        prefix: String,
    },
    /// The engine broke one of its own invariants while handling the given pair of nodes.
    #[error("engine invariant violated while handling {boundary} and {settled}")]
    EngineInvariantViolation {
        /// The settled node that was involved.
        settled: String,
        /// The candidate node that was involved.
        boundary: String,
    },
    /// A trace does not have the shape that the kind of the sample requires.
    #[error("trace {index} is not a valid {kind} trace")]
    MalformedTrace {
        /// Position of the trace in the sample.
        index: usize,
        /// The kind of the sample.
        kind: ModelKind,
    },
    /// The given string does not name a kind of model.
    #[error("unknown model kind `{0}`, expected one of `dfa`, `moore` or `mealy`")]
    UnknownModelKind(String),
    /// A hypothesis was exported into an automaton of the wrong kind.
    #[error("cannot export a {found} hypothesis as a {requested}")]
    KindMismatch {
        /// The kind of automaton that was asked for.
        requested: ModelKind,
        /// The kind of the sample the hypothesis was learned from.
        found: ModelKind,
    },
}
