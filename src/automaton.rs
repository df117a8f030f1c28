use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    ops::Range,
};

use itertools::Itertools;

use crate::{Symbol, Void};

/// Index of a state in an [`Automaton`].
pub type StateIndex = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
struct State<I, Q, C> {
    access: Vec<I>,
    color: Q,
    edges: BTreeMap<I, (C, StateIndex)>,
}

/// A deterministic automaton with colors of type `Q` on its states and colors of type `C` on
/// its edges. States are numbered consecutively, so a state index is simply a position.
///
/// Every state also remembers its access word, i.e. the prefix of the sample that it was
/// created for during learning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Automaton<I, Q, C> {
    initial: StateIndex,
    states: Vec<State<I, Q, C>>,
}

/// A deterministic finite automaton, states are colored with their acceptance.
pub type Dfa<I = char> = Automaton<I, bool, Void>;

/// A Moore machine emits an output in every state. As the sample does not necessarily determine
/// the output of every state, the state colors are optional.
pub type MooreMachine<I = char, O = usize> = Automaton<I, Option<O>, Void>;

/// A Mealy machine is a transition system where each transition has an output. For a word of
/// length `n`, there are `n` outputs.
pub type MealyMachine<I = char, O = usize> = Automaton<I, Void, O>;

impl<I: Symbol, Q, C> Automaton<I, Q, C> {
    pub(crate) fn new() -> Self {
        Self {
            initial: 0,
            states: vec![],
        }
    }

    pub(crate) fn add_state(&mut self, access: Vec<I>, color: Q) -> StateIndex {
        self.states.push(State {
            access,
            color,
            edges: BTreeMap::new(),
        });
        self.states.len() - 1
    }

    pub(crate) fn add_edge(&mut self, source: StateIndex, symbol: I, color: C, target: StateIndex) {
        self.states[source].edges.insert(symbol, (color, target));
    }

    /// The initial state.
    pub fn initial(&self) -> StateIndex {
        self.initial
    }

    /// The number of states.
    pub fn size(&self) -> usize {
        self.states.len()
    }

    /// Returns the range of all state indices.
    pub fn state_indices(&self) -> Range<StateIndex> {
        0..self.states.len()
    }

    /// The color of the given state, `None` if the state does not exist.
    pub fn state_color(&self, state: StateIndex) -> Option<&Q> {
        self.states.get(state).map(|q| &q.color)
    }

    /// The word of the sample that led to the creation of the given state.
    pub fn access_word(&self, state: StateIndex) -> Option<&[I]> {
        self.states.get(state).map(|q| q.access.as_slice())
    }

    /// Returns the color and target of the `symbol`-transition leaving `state`, if it exists.
    pub fn transition(&self, state: StateIndex, symbol: &I) -> Option<(&C, StateIndex)> {
        self.states
            .get(state)?
            .edges
            .get(symbol)
            .map(|(c, t)| (c, *t))
    }

    /// The state reached from `state` on `symbol`, if there is a transition.
    pub fn successor(&self, state: StateIndex, symbol: &I) -> Option<StateIndex> {
        self.transition(state, symbol).map(|(_, t)| t)
    }

    /// Returns an iterator over the symbol, color and target of every transition leaving `state`.
    pub fn edges_from(
        &self,
        state: StateIndex,
    ) -> impl Iterator<Item = (&I, &C, StateIndex)> + '_ {
        self.states
            .get(state)
            .into_iter()
            .flat_map(|q| q.edges.iter().map(|(s, (c, t))| (s, c, *t)))
    }

    /// The number of transitions.
    pub fn transition_count(&self) -> usize {
        self.states.iter().map(|q| q.edges.len()).sum()
    }

    /// All symbols that appear on some transition, in ascending order.
    pub fn alphabet(&self) -> Vec<I> {
        self.states
            .iter()
            .flat_map(|q| q.edges.keys())
            .sorted()
            .dedup()
            .cloned()
            .collect()
    }

    /// Follows `word` from the initial state and returns the reached state. If a transition is
    /// missing along the way, `None` is returned.
    pub fn reached_state<'a, W: IntoIterator<Item = &'a I>>(&self, word: W) -> Option<StateIndex>
    where
        I: 'a,
    {
        word.into_iter()
            .try_fold(self.initial, |q, symbol| self.successor(q, symbol))
    }

    /// Returns a string representation of the transition table of the automaton.
    fn build_transition_table<SD, ED>(&self, state_decorator: SD, edge_decorator: ED) -> String
    where
        SD: Fn(StateIndex, &Q) -> String,
        ED: Fn(&C, StateIndex) -> String,
    {
        let alphabet = self.alphabet();
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(
            std::iter::once("State".to_string()).chain(alphabet.iter().map(|s| format!("{:?}", s))),
        );
        for (id, state) in self.states.iter().enumerate() {
            let mut row = vec![state_decorator(id, &state.color)];
            for symbol in &alphabet {
                row.push(match state.edges.get(symbol) {
                    Some((color, target)) => edge_decorator(color, *target),
                    None => "-".to_string(),
                });
            }
            builder.push_record(row);
        }

        builder
            .build()
            .with(tabled::settings::Style::rounded())
            .to_string()
    }

    fn state_name(&self, state: StateIndex) -> String {
        if state == self.initial {
            format!("->q{state}")
        } else {
            format!("q{state}")
        }
    }
}

impl<I: Symbol> Dfa<I> {
    /// Returns `true` if the given state is accepting.
    pub fn is_accepting(&self, state: StateIndex) -> bool {
        self.state_color(state).copied().unwrap_or(false)
    }
}

impl<I: Symbol> Display for Dfa<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.build_transition_table(
            |q, accepting| {
                let name = self.state_name(q);
                if *accepting {
                    format!("{name} +")
                } else {
                    name
                }
            },
            |_, t| format!("q{t}"),
        );
        write!(f, "{table}")
    }
}

impl<I: Symbol, O: Debug> Display for MooreMachine<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.build_transition_table(
            |q, output| match output {
                Some(o) => format!("{} | {:?}", self.state_name(q), o),
                None => format!("{} | ?", self.state_name(q)),
            },
            |_, t| format!("q{t}"),
        );
        write!(f, "{table}")
    }
}

impl<I: Symbol, O: Debug> Display for MealyMachine<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.build_transition_table(
            |q, _| self.state_name(q),
            |output, t| format!("q{t} | {output:?}"),
        );
        write!(f, "{table}")
    }
}
