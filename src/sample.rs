use std::{fmt::Display, str::FromStr};

use itertools::Itertools;

use crate::RpniError;

/// Determines how the observations of a [`Sample`] are interpreted and consequently which kind
/// of automaton is learned from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Words are classified as accepted or rejected, the result is a DFA.
    Dfa,
    /// Words are annotated with the output of the state they reach, the result is a Moore machine.
    Moore,
    /// Each input symbol of a word produces an output, the result is a Mealy machine.
    Mealy,
}

impl ModelKind {
    /// Returns `true` if outputs are emitted on transitions rather than on states.
    pub fn is_transducer(&self) -> bool {
        matches!(self, ModelKind::Mealy)
    }
}

impl Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Dfa => write!(f, "dfa"),
            ModelKind::Moore => write!(f, "moore"),
            ModelKind::Mealy => write!(f, "mealy"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = RpniError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dfa" => Ok(ModelKind::Dfa),
            "moore" => Ok(ModelKind::Moore),
            "mealy" => Ok(ModelKind::Mealy),
            _ => Err(RpniError::UnknownModelKind(s.to_string())),
        }
    }
}

/// A single observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trace<I, O> {
    /// A word together with the label it is classified with, used by DFA and Moore samples.
    Classified(Vec<I>, O),
    /// A sequence of input symbols, each paired with the output it produced. Used by Mealy samples.
    Transduced(Vec<(I, O)>),
}

impl<I, O> Trace<I, O> {
    /// The number of input symbols in the trace.
    pub fn len(&self) -> usize {
        match self {
            Trace::Classified(word, _) => word.len(),
            Trace::Transduced(steps) => steps.len(),
        }
    }

    /// Returns `true` if the trace contains no input symbols.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the input symbols of the trace.
    pub fn inputs(&self) -> Box<dyn Iterator<Item = &I> + '_> {
        match self {
            Trace::Classified(word, _) => Box::new(word.iter()),
            Trace::Transduced(steps) => Box::new(steps.iter().map(|(i, _)| i)),
        }
    }

    fn fits(&self, kind: ModelKind) -> bool {
        matches!(
            (self, kind.is_transducer()),
            (Trace::Classified(..), false) | (Trace::Transduced(_), true)
        )
    }
}

/// A finite collection of observations, which serves as ground truth for the inference. The
/// [`ModelKind`] fixes how the observations are interpreted for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample<I, O> {
    kind: ModelKind,
    traces: Vec<Trace<I, O>>,
}

impl<I, O> Sample<I, O> {
    /// Creates a sample of the given kind. Fails if one of the traces does not fit the kind,
    /// i.e. if a [`Trace::Transduced`] is given for a DFA or Moore sample or a
    /// [`Trace::Classified`] is given for a Mealy sample.
    pub fn new<T: IntoIterator<Item = Trace<I, O>>>(
        kind: ModelKind,
        traces: T,
    ) -> Result<Self, RpniError> {
        let traces = traces.into_iter().collect_vec();
        if let Some(index) = traces.iter().position(|t| !t.fits(kind)) {
            return Err(RpniError::MalformedTrace { index, kind });
        }
        Ok(Self { kind, traces })
    }

    /// Creates a Moore sample from an iterator over pairs of words and the output that is
    /// produced once the word has been read.
    pub fn moore<W: IntoIterator<Item = I>, J: IntoIterator<Item = (W, O)>>(words: J) -> Self {
        Self {
            kind: ModelKind::Moore,
            traces: words
                .into_iter()
                .map(|(w, o)| Trace::Classified(w.into_iter().collect(), o))
                .collect(),
        }
    }

    /// Creates a Mealy sample from an iterator over traces, each of which is given as an
    /// iterator over pairs of input symbol and produced output.
    pub fn mealy<W: IntoIterator<Item = (I, O)>, J: IntoIterator<Item = W>>(traces: J) -> Self {
        Self {
            kind: ModelKind::Mealy,
            traces: traces
                .into_iter()
                .map(|t| Trace::Transduced(t.into_iter().collect()))
                .collect(),
        }
    }

    /// The kind of model that this sample describes.
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Returns an iterator over all traces in the order in which they were given.
    pub fn traces(&self) -> impl Iterator<Item = &Trace<I, O>> + '_ {
        self.traces.iter()
    }

    /// The number of traces in the sample.
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// Returns `true` if the sample contains no traces.
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Returns the maximum length of any trace in the sample. Gives back `0` if the sample is empty.
    pub fn max_trace_len(&self) -> usize {
        self.traces.iter().map(|t| t.len()).max().unwrap_or(0)
    }
}

impl<I> Sample<I, bool> {
    /// Create a new DFA sample from an iterator over annotated words. The words are given as
    /// an iterator of pairs (word, classification).
    pub fn dfa<W: IntoIterator<Item = I>, J: IntoIterator<Item = (W, bool)>>(words: J) -> Self {
        Self {
            kind: ModelKind::Dfa,
            ..Self::moore(words)
        }
    }

    /// Gives an iterator over all words that are classified as positive.
    pub fn positive_words(&self) -> impl Iterator<Item = &[I]> + '_ {
        self.classified_as(true)
    }

    /// Gives an iterator over all words that are classified as negative.
    pub fn negative_words(&self) -> impl Iterator<Item = &[I]> + '_ {
        self.classified_as(false)
    }

    fn classified_as(&self, classification: bool) -> impl Iterator<Item = &[I]> + '_ {
        self.traces.iter().filter_map(move |t| match t {
            Trace::Classified(word, c) if *c == classification => Some(word.as_slice()),
            _ => None,
        })
    }
}
