use std::time::Instant;

use itertools::Itertools;
use tracing::debug;

use crate::{
    fold::NodeStore,
    math::Set,
    prefix_tree::{NodeId, PrefixTree},
    sample::ModelKind,
    Color, Symbol,
};

/// A path from the root of the prefix tree to one of its leaves. Each step consists of a
/// symbol and the value that is expected after taking it: the label of the reached node, or
/// for Mealy trees the output of the transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeldOutTest<I, O> {
    steps: Vec<(I, Option<O>)>,
}

impl<I: Symbol, O: Color> HeldOutTest<I, O> {
    /// The word that is tested.
    pub fn word(&self) -> impl Iterator<Item = &I> + '_ {
        self.steps.iter().map(|(i, _)| i)
    }

    /// The number of symbols in the tested word.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the test does not read any symbol.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Walks the test from `root`. Once a transition is missing, nothing more can be
    /// contradicted and the test holds. Otherwise every expected value has to match.
    pub fn holds<S: NodeStore<I, O>>(&self, store: &S, root: NodeId) -> bool {
        let transducer = store.kind().is_transducer();
        let mut node = root;
        for (symbol, expected) in &self.steps {
            let Some(transition) = store.children(node).get(symbol) else {
                return true;
            };
            node = transition.target();
            let Some(expected) = expected else {
                continue;
            };
            let observed = if transducer {
                transition.output()
            } else {
                store.label(node)
            };
            if observed != Some(expected) {
                return false;
            }
        }
        true
    }
}

/// The obligations that every tentative merge has to satisfy. The suite is extracted once from
/// the freshly built prefix tree and is never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldOutSuite<I, O> {
    kind: ModelKind,
    root: Option<O>,
    tests: Vec<HeldOutTest<I, O>>,
}

impl<I: Symbol, O: Color> HeldOutSuite<I, O> {
    /// Traverses the tree once and collects one test for each root-to-leaf path, together with
    /// the label of the root. Together they cover every node of the tree.
    pub fn extract(tree: &PrefixTree<I, O>) -> Self {
        let start = Instant::now();
        let transducer = tree.kind().is_transducer();
        let mut seen = Set::default();
        let mut tests = vec![];

        let mut queue = vec![(tree.root(), vec![])];
        while let Some((node, steps)) = queue.pop() {
            let children = tree.node(node).children();
            if children.is_empty() {
                let test = HeldOutTest { steps };
                if !test.is_empty() && seen.insert(test.clone()) {
                    tests.push(test);
                }
                continue;
            }
            for (symbol, transition) in children.iter().rev() {
                let expected = if transducer {
                    transition.output().cloned()
                } else {
                    tree.node(transition.target()).label().cloned()
                };
                let extended = steps
                    .iter()
                    .cloned()
                    .chain(std::iter::once((symbol.clone(), expected)))
                    .collect_vec();
                queue.push((transition.target(), extended));
            }
        }

        debug!(
            "extracted {} held-out tests in {}ms",
            tests.len(),
            start.elapsed().as_millis()
        );
        Self {
            kind: tree.kind(),
            root: tree.node(tree.root()).label().cloned(),
            tests,
        }
    }

    /// Checks whether the structure in `store`, starting in `root`, satisfies every test.
    pub fn is_consistent<S: NodeStore<I, O>>(&self, store: &S, root: NodeId) -> bool {
        debug_assert_eq!(store.kind(), self.kind);
        if let Some(expected) = &self.root {
            if store.label(root) != Some(expected) {
                return false;
            }
        }
        self.tests.iter().all(|test| test.holds(store, root))
    }

    /// Returns an iterator over all tests in the order of the leaves they end in.
    pub fn tests(&self) -> impl Iterator<Item = &HeldOutTest<I, O>> + '_ {
        self.tests.iter()
    }

    /// The number of tests, not counting the check of the root label.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns `true` if there are no tests.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fold::{merge, Boundary, Overlay},
        sample::Sample,
    };

    fn words<I: Symbol, O: Color>(suite: &HeldOutSuite<I, O>) -> Vec<Vec<I>> {
        suite.tests().map(|t| t.word().cloned().collect()).collect()
    }

    #[test]
    fn one_test_per_leaf() {
        let sample = Sample::dfa([
            ("ab".chars(), true),
            ("a".chars(), false),
            ("b".chars(), false),
            ("bab".chars(), true),
            ("ab".chars(), true),
        ]);
        let tree = PrefixTree::build(&sample).unwrap();
        let suite = HeldOutSuite::extract(&tree);
        assert_eq!(suite.len(), 2);
        assert_eq!(
            words(&suite),
            vec![vec!['a', 'b'], vec!['b', 'a', 'b']]
        );
        let long = suite.tests().nth(1).unwrap();
        assert_eq!(long.len(), 3);
        assert_eq!(
            long.steps,
            vec![('b', Some(false)), ('a', None), ('b', Some(true))]
        );
        assert!(suite.is_consistent(&tree, tree.root()));
    }

    #[test]
    fn only_the_root() {
        let sample = Sample::moore([(Vec::<char>::new(), 4u8)]);
        let tree = PrefixTree::build(&sample).unwrap();
        let suite = HeldOutSuite::extract(&tree);
        assert!(suite.is_empty());
        assert!(suite.is_consistent(&tree, tree.root()));
    }

    #[test]
    fn mealy_tests_check_outputs() {
        let sample = Sample::mealy([vec![('a', 0), ('a', 1)], vec![('b', 5)]]);
        let tree = PrefixTree::build(&sample).unwrap();
        let suite = HeldOutSuite::extract(&tree);
        assert_eq!(suite.len(), 2);
        assert_eq!(
            suite.tests().next().unwrap().steps,
            vec![('a', Some(0)), ('a', Some(1))]
        );

        // identifying `a` with the root leaves a single `a` transition with output 1
        let a = tree.walk(&['a']).unwrap();
        let mut overlay = Overlay::new(&tree);
        merge(
            &mut overlay,
            tree.root(),
            &Boundary {
                parent: tree.root(),
                symbol: 'a',
                node: a,
            },
        )
        .unwrap();
        assert!(!suite.is_consistent(&overlay, tree.root()));
    }

    #[test]
    fn missing_transitions_hold_vacuously() {
        let sample = Sample::dfa([("ab".chars(), true)]);
        let tree = PrefixTree::build(&sample).unwrap();
        let suite = HeldOutSuite::extract(&tree);

        let other = PrefixTree::build(&Sample::dfa([("a".chars(), true)])).unwrap();
        assert!(suite.is_consistent(&other, other.root()));

        let contradicting = PrefixTree::build(&Sample::dfa([("ab".chars(), false)])).unwrap();
        assert!(!suite.is_consistent(&contradicting, contradicting.root()));
    }

    #[test]
    fn root_label_is_checked() {
        let sample = Sample::dfa([("".chars(), true), ("a".chars(), false)]);
        let tree = PrefixTree::build(&sample).unwrap();
        let suite = HeldOutSuite::extract(&tree);
        let a = tree.walk(&['a']).unwrap();

        let mut overlay = Overlay::new(&tree);
        merge(
            &mut overlay,
            tree.root(),
            &Boundary {
                parent: tree.root(),
                symbol: 'a',
                node: a,
            },
        )
        .unwrap();
        assert_eq!(overlay.label(tree.root()), Some(&false));
        assert!(!suite.is_consistent(&overlay, tree.root()));
    }
}
