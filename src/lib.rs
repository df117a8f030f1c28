//! Library for passively learning deterministic finite-state models from a finite sample.
//!
//! The learner implements the classical state-merging approach known as RPNI. A [`Sample`] is a
//! finite collection of observations, either words annotated with an acceptance flag (for a DFA),
//! words annotated with an output (for a Moore machine) or sequences of input/output pairs (for a
//! Mealy machine). From the sample a [`prefix_tree::PrefixTree`] is built, in which every node
//! corresponds to precisely one prefix of some observation. The engine [`Rpni`] then processes the
//! nodes in length-lexicographic order, tentatively identifying each candidate with one of the states
//! that have already been settled. A tentative identification is computed on an
//! [`fold::Overlay`], which journals all changes on top of the prefix tree and can simply be dropped
//! if the outcome contradicts the [`held_out::HeldOutSuite`] that was extracted from the sample.
//! Only identifications that survive the check are replayed on the prefix tree itself.
//!
//! Once no candidates remain, the settled states form a [`Hypothesis`] which can be exported into
//! an [`Automaton`], concretely a [`Dfa`], [`MooreMachine`] or [`MealyMachine`].
//!
//! ```
//! use automata_rpni::prelude::*;
//!
//! let sample = Sample::dfa([
//!     (vec!['a'], false),
//!     (vec!['a', 'b'], true),
//!     (vec!['b'], false),
//!     (vec!['b', 'b'], true),
//! ]);
//! let dfa = dfa_rpni(&sample).unwrap();
//! assert_eq!(dfa.size(), 2);
//! ```
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The prelude is supposed to make using this package easier. Including everything, i.e.
/// `use automata_rpni::prelude::*;` should be enough to use the package.
pub mod prelude {
    pub use super::{
        automaton::{Automaton, Dfa, MealyMachine, MooreMachine, StateIndex},
        dfa_rpni, infer, mealy_rpni, moore_rpni,
        prefix_tree::{NodeId, PrefixTree},
        rpni::{Hypothesis, Rpni, Step},
        sample::{ModelKind, Sample, Trace},
        Color, RpniError, Symbol, Void,
    };
}

/// Type aliases for the collections used throughout the crate.
pub mod math;

/// Errors that can occur during inference.
pub mod error;
pub use error::RpniError;

/// Definitions for samples, which are collections of labelled observations.
pub mod sample;
pub use sample::{ModelKind, Sample, Trace};

/// The prefix tree of a sample, stored as an arena of nodes.
pub mod prefix_tree;

/// Extraction of the held-out tests that every tentative merge has to pass.
pub mod held_out;

/// Merging and folding of nodes, either directly on the prefix tree or on an overlay.
pub mod fold;

/// The state-merging engine.
pub mod rpni;
pub use rpni::{Hypothesis, Rpni};

/// Deterministic automata that are produced by the learner.
pub mod automaton;
pub use automaton::{Automaton, Dfa, MealyMachine, MooreMachine};

mod export;

use std::{fmt::Debug, hash::Hash};

/// A symbol is anything that can be read by the learned model. Symbols need to be ordered, as
/// the order of symbols determines the order in which candidates are considered.
pub trait Symbol: Clone + Eq + Ord + Hash + Debug + Send + Sync {}

impl<T: Clone + Eq + Ord + Hash + Debug + Send + Sync> Symbol for T {}

/// A color is simply a type that can be used to label states or transitions, i.e. an acceptance
/// flag or an output.
pub trait Color: Clone + Eq + Hash + Debug + Send + Sync {}

impl<T: Clone + Eq + Hash + Debug + Send + Sync> Color for T {}

/// Represents the absence of a color. A [`Dfa`] and a [`MooreMachine`] have no colors on their
/// edges, whereas a [`MealyMachine`] has no colors on its states.
#[derive(Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Void;

impl Debug for Void {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#")
    }
}

/// Runs the state-merging engine on the given sample and returns the resulting [`Hypothesis`].
/// The hypothesis can subsequently be turned into the automaton matching the [`ModelKind`] of
/// the sample.
pub fn infer<I: Symbol, O: Color>(sample: &Sample<I, O>) -> Result<Hypothesis<I, O>, RpniError> {
    Rpni::new(sample)?.run()
}

/// Executes the RPNI algorithm on the given sample. This returns a DFA which classifies every
/// word of the sample in the same way as the sample does. States whose acceptance is not
/// determined by the sample are rejecting.
pub fn dfa_rpni<I: Symbol>(sample: &Sample<I, bool>) -> Result<Dfa<I>, RpniError> {
    infer(sample)?.into_dfa()
}

/// Similar to [`dfa_rpni`], but produces a [`MooreMachine`] from a sample that annotates words
/// with outputs.
pub fn moore_rpni<I: Symbol, O: Color>(
    sample: &Sample<I, O>,
) -> Result<MooreMachine<I, O>, RpniError> {
    infer(sample)?.into_moore()
}

/// Similar to [`dfa_rpni`], but produces a [`MealyMachine`] from a sample of input/output traces.
pub fn mealy_rpni<I: Symbol, O: Color>(
    sample: &Sample<I, O>,
) -> Result<MealyMachine<I, O>, RpniError> {
    infer(sample)?.into_mealy()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use itertools::Itertools;

    use crate::{math::Map, prelude::*};

    fn random_words(rng: &mut fastrand::Rng, count: usize, max_len: usize) -> Vec<Vec<char>> {
        (0..count)
            .map(|_| {
                let len = rng.usize(..=max_len);
                (0..len).map(|_| rng.choice(['a', 'b']).unwrap()).collect()
            })
            .collect()
    }

    fn edges<I: Symbol, Q, C: Clone>(
        aut: &Automaton<I, Q, C>,
    ) -> Vec<(StateIndex, I, C, StateIndex)> {
        aut.state_indices()
            .flat_map(|q| {
                aut.edges_from(q)
                    .map(move |(s, c, t)| (q, s.clone(), c.clone(), t))
            })
            .collect()
    }

    /// Identifies states `p` and `q` and closes the identification under transitions. Returns
    /// the representative of the class of every state.
    fn quotient<I: Symbol, Q, C>(
        aut: &Automaton<I, Q, C>,
        p: StateIndex,
        q: StateIndex,
    ) -> Vec<StateIndex> {
        fn find(parent: &[StateIndex], mut x: StateIndex) -> StateIndex {
            while parent[x] != x {
                x = parent[x];
            }
            x
        }

        let mut parent = aut.state_indices().collect_vec();
        let mut successors = aut
            .state_indices()
            .map(|s| {
                aut.edges_from(s)
                    .map(|(i, _, t)| (i.clone(), t))
                    .collect::<BTreeMap<_, _>>()
            })
            .collect_vec();
        let mut pending = vec![(p, q)];
        while let Some((a, b)) = pending.pop() {
            let (a, b) = (find(&parent, a), find(&parent, b));
            if a == b {
                continue;
            }
            parent[b] = a;
            for (symbol, target) in std::mem::take(&mut successors[b]) {
                match successors[a].get(&symbol) {
                    Some(&other) => pending.push((other, target)),
                    None => {
                        successors[a].insert(symbol, target);
                    }
                }
            }
        }
        aut.state_indices().map(|s| find(&parent, s)).collect()
    }

    /// Checks whether some class of `classes` is assigned two different values by the sample,
    /// either as the label of a word or as the output on an input.
    fn contradicts<I: Symbol, Q, C, O: Color>(
        aut: &Automaton<I, Q, C>,
        classes: &[StateIndex],
        sample: &Sample<I, O>,
    ) -> bool {
        let mut seen: Map<(StateIndex, Option<I>), O> = Map::default();
        let mut observe = |key: (StateIndex, Option<I>), value: &O| {
            *seen.entry(key).or_insert_with(|| value.clone()) != *value
        };
        for trace in sample.traces() {
            match trace {
                Trace::Classified(word, label) => {
                    let q = aut.reached_state(word).unwrap();
                    if observe((classes[q], None), label) {
                        return true;
                    }
                }
                Trace::Transduced(steps) => {
                    let mut q = aut.initial();
                    for (symbol, output) in steps {
                        if observe((classes[q], Some(symbol.clone())), output) {
                            return true;
                        }
                        q = aut.successor(q, symbol).unwrap();
                    }
                }
            }
        }
        false
    }

    fn assert_no_merge_possible<I: Symbol, Q, C, O: Color>(
        aut: &Automaton<I, Q, C>,
        sample: &Sample<I, O>,
    ) {
        assert!(!contradicts(aut, &aut.state_indices().collect_vec(), sample));
        for (p, q) in aut.state_indices().tuple_combinations() {
            assert!(
                contradicts(aut, &quotient(aut, p, q), sample),
                "states {p} and {q} could be identified"
            );
        }
    }

    #[test_log::test]
    fn two_state_dfa_from_small_sample() {
        let sample = Sample::dfa([
            ("a".chars(), false),
            ("ab".chars(), true),
            ("b".chars(), false),
            ("bb".chars(), true),
        ]);
        let dfa = dfa_rpni(&sample).unwrap();
        assert_eq!(dfa.size(), 2);
        assert_eq!(dfa.initial(), 0);
        assert!(dfa.is_accepting(0));
        assert!(!dfa.is_accepting(1));
        assert_eq!(
            edges(&dfa),
            vec![(0, 'a', Void, 1), (0, 'b', Void, 1), (1, 'b', Void, 0)]
        );
        for (word, accepted) in [("a", false), ("ab", true), ("b", false), ("bb", true)] {
            let word = word.chars().collect::<Vec<_>>();
            assert_eq!(dfa.is_accepting(dfa.reached_state(&word).unwrap()), accepted);
        }
    }

    #[test]
    fn conflicting_sample_has_no_automaton() {
        let sample = Sample::dfa([("a".chars(), true), ("a".chars(), false)]);
        assert!(matches!(
            dfa_rpni(&sample),
            Err(RpniError::SampleInconsistency { .. })
        ));
    }

    #[test]
    fn complete_sample_gives_parity_dfa() {
        let mut words = vec![vec![]];
        for len in 1..=3 {
            for bits in 0..(1 << len) {
                words.push((0..len).map(|i| if bits >> i & 1 == 1 { 'a' } else { 'b' }).collect());
            }
        }
        let sample = Sample::dfa(words.into_iter().map(|w: Vec<char>| {
            let even = w.iter().filter(|c| **c == 'a').count() % 2 == 0;
            (w, even)
        }));
        let dfa = dfa_rpni(&sample).unwrap();
        assert_eq!(dfa.size(), 2);
        assert!(dfa.is_accepting(0));
        assert_eq!(
            edges(&dfa),
            vec![
                (0, 'a', Void, 1),
                (0, 'b', Void, 0),
                (1, 'a', Void, 0),
                (1, 'b', Void, 1)
            ]
        );
    }

    #[test]
    fn moore_chain_folds_into_cycle() {
        let sample = Sample::moore(["", "a", "aa", "aaa", "aaaa"].into_iter().map(|w| {
            let out = if w.len() % 2 == 0 { 'x' } else { 'y' };
            (w.chars(), out)
        }));
        let moore = moore_rpni(&sample).unwrap();
        assert_eq!(moore.size(), 2);
        assert_eq!(moore.state_color(0), Some(&Some('x')));
        assert_eq!(moore.state_color(1), Some(&Some('y')));
        assert_eq!(edges(&moore), vec![(0, 'a', Void, 1), (1, 'a', Void, 0)]);
    }

    #[test_log::test]
    fn later_transducer_output_wins_on_distinct_states() {
        let sample = Sample::mealy([vec![('x', 0), ('a', 1)], vec![('y', 0), ('a', 2)]]);
        let mealy = mealy_rpni(&sample).unwrap();
        assert_eq!(mealy.size(), 2);
        assert_eq!(
            edges(&mealy),
            vec![(0, 'a', 1, 0), (0, 'x', 0, 0), (0, 'y', 0, 1), (1, 'a', 2, 0)]
        );
        assert_eq!(mealy.access_word(1), Some(&['y'][..]));
    }

    #[test]
    fn moore_folds_subtrees_in_order_of_observation() {
        let sample = Sample::moore([
            ("c", 1),
            ("ccc", 0),
            ("ccbc", 0),
            ("abba", 2),
            ("abbba", 2),
            ("acc", 0),
            ("aabbb", 2),
            ("", 0),
            ("bc", 1),
            ("cccaaa", 0),
            ("babaab", 0),
            ("cac", 0),
            ("aacb", 0),
        ]
        .map(|(w, o)| (w.chars(), o)));
        let moore = moore_rpni(&sample).unwrap();
        let access = moore
            .state_indices()
            .map(|q| moore.access_word(q).unwrap().iter().collect::<String>())
            .collect_vec();
        assert_eq!(access, vec!["", "b", "c", "cc", "ccb"]);
        assert_no_merge_possible(&moore, &sample);
    }

    #[test]
    fn no_two_learned_states_can_be_identified() {
        let mut rng = fastrand::Rng::with_seed(23);
        for _ in 0..15 {
            let sample = Sample::dfa(random_words(&mut rng, 30, 7).into_iter().map(|w| {
                let label = w.iter().filter(|c| **c == 'b').count() % 3 == 0;
                (w, label)
            }));
            assert_no_merge_possible(&dfa_rpni(&sample).unwrap(), &sample);

            let sample = Sample::moore(random_words(&mut rng, 30, 7).into_iter().map(|w| {
                let out = w.last().copied().unwrap_or('-');
                (w, out)
            }));
            assert_no_merge_possible(&moore_rpni(&sample).unwrap(), &sample);

            let sample = Sample::mealy(random_words(&mut rng, 25, 6).into_iter().map(|w| {
                let mut previous = 'a';
                w.into_iter()
                    .map(|s| {
                        let out = u8::from(s == previous);
                        previous = s;
                        (s, out)
                    })
                    .collect_vec()
            }));
            assert_no_merge_possible(&mealy_rpni(&sample).unwrap(), &sample);
        }
    }

    #[test]
    fn learned_dfas_are_consistent_and_deterministic() {
        let mut rng = fastrand::Rng::with_seed(17);
        for _ in 0..30 {
            let sample = Sample::dfa(random_words(&mut rng, 40, 8).into_iter().map(|w| {
                let label = w.windows(2).filter(|p| p == &['a', 'b']).count() % 2 == 0;
                (w, label)
            }));
            let dfa = dfa_rpni(&sample).unwrap();
            for word in sample.positive_words() {
                assert!(dfa.is_accepting(dfa.reached_state(word).unwrap()));
            }
            for word in sample.negative_words() {
                assert!(!dfa.is_accepting(dfa.reached_state(word).unwrap()));
            }
            assert_eq!(dfa, dfa_rpni(&sample).unwrap());
        }
    }

    #[test]
    fn learned_moore_machines_are_consistent() {
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..30 {
            let words = random_words(&mut rng, 30, 7);
            let sample = Sample::moore(words.iter().map(|w| {
                let out = (w.iter().filter(|c| **c == 'a').count() % 3) as u8;
                (w.clone(), out)
            }));
            let moore = moore_rpni(&sample).unwrap();
            for trace in sample.traces() {
                let Trace::Classified(word, out) = trace else {
                    unreachable!()
                };
                let q = moore.reached_state(word).unwrap();
                assert_eq!(moore.state_color(q), Some(&Some(*out)));
            }
        }
    }

    #[test]
    fn learned_mealy_machines_are_consistent() {
        let mut rng = fastrand::Rng::with_seed(11);
        for _ in 0..30 {
            let traces = random_words(&mut rng, 30, 7)
                .into_iter()
                .map(|w| {
                    let mut seen_a = 0u8;
                    w.into_iter()
                        .map(|s| {
                            let out = (seen_a + u8::from(s == 'b')) % 3;
                            seen_a += u8::from(s == 'a');
                            (s, out)
                        })
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();
            let sample = Sample::mealy(traces.clone());
            let mealy = mealy_rpni(&sample).unwrap();
            for trace in traces {
                let mut q = mealy.initial();
                for (symbol, expected) in trace {
                    let (out, next) = mealy.transition(q, &symbol).unwrap();
                    assert_eq!(*out, expected);
                    q = next;
                }
            }
            assert_eq!(mealy, mealy_rpni(&sample).unwrap());
        }
    }
}
