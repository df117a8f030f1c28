use std::time::Instant;

use bit_set::BitSet;
use itertools::Itertools;
use owo_colors::OwoColorize;
use tracing::{debug, trace};

use crate::{
    fold::{merge, Boundary, Overlay},
    held_out::HeldOutSuite,
    prefix_tree::{NodeId, PrefixTree},
    sample::{ModelKind, Sample},
    Color, RpniError, Symbol,
};

/// The outcome of handling a single boundary node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The boundary node was identified with a settled node.
    Merged {
        /// The settled node that absorbed the boundary node.
        settled: NodeId,
        /// The boundary node, which is no longer reachable.
        boundary: NodeId,
    },
    /// No settled node could absorb the boundary node, so it became settled itself.
    Promoted(NodeId),
}

/// The state-merging engine. It owns the prefix tree of a sample, the held-out tests derived
/// from it and the list of settled nodes, which is always sorted in length-lexicographic order
/// of the node prefixes.
///
/// Each call to [`Rpni::step`] takes the smallest boundary node, i.e. the smallest node that is
/// not settled but is the target of a transition leaving a settled node. It is tentatively
/// merged with each settled node in turn, and the first merge that passes all held-out tests
/// is replayed on the prefix tree. If there is none, the boundary node is promoted.
pub struct Rpni<'a, I, O> {
    tree: PrefixTree<I, O>,
    suite: HeldOutSuite<I, O>,
    settled: Vec<NodeId>,
    is_settled: BitSet,
    trial_threads: usize,
    progress: Option<Box<dyn FnMut(usize) + 'a>>,
}

impl<'a, I: Symbol, O: Color> Rpni<'a, I, O> {
    /// Builds the prefix tree of the sample and prepares a run. Fails if the sample is not
    /// deterministic.
    pub fn new(sample: &Sample<I, O>) -> Result<Self, RpniError> {
        Ok(Self::from_tree(PrefixTree::build(sample)?))
    }

    /// Prepares a run on an already constructed prefix tree.
    pub fn from_tree(tree: PrefixTree<I, O>) -> Self {
        let suite = HeldOutSuite::extract(&tree);
        let mut is_settled = BitSet::with_capacity(tree.size());
        is_settled.insert(tree.root().index());
        Self {
            settled: vec![tree.root()],
            tree,
            suite,
            is_settled,
            trial_threads: 1,
            progress: None,
        }
    }

    /// Registers a callback that receives the number of settled nodes whenever a node is promoted.
    pub fn with_progress<F: FnMut(usize) + 'a>(mut self, progress: F) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Evaluates the tentative merges for a boundary node on up to `threads` threads. The
    /// outcome does not depend on the number of threads.
    pub fn with_trial_threads(mut self, threads: usize) -> Self {
        self.trial_threads = threads.max(1);
        self
    }

    /// The kind of model that is being learned.
    pub fn kind(&self) -> ModelKind {
        self.tree.kind()
    }

    /// The prefix tree in its current state.
    pub fn tree(&self) -> &PrefixTree<I, O> {
        &self.tree
    }

    /// The held-out tests that every merge must satisfy.
    pub fn suite(&self) -> &HeldOutSuite<I, O> {
        &self.suite
    }

    /// The settled nodes in settlement order.
    pub fn settled(&self) -> &[NodeId] {
        &self.settled
    }

    /// Returns an iterator over the prefixes of the settled nodes in settlement order.
    pub fn settled_prefixes(&self) -> impl Iterator<Item = &[I]> + '_ {
        self.settled.iter().map(|&n| self.tree.node(n).prefix())
    }

    /// Computes all nodes that are not settled but can be reached from a settled node with a
    /// single transition.
    pub fn boundary(&self) -> Vec<Boundary<I>> {
        self.settled
            .iter()
            .flat_map(|&parent| {
                self.tree
                    .node(parent)
                    .children()
                    .iter()
                    .map(move |(symbol, t)| (parent, symbol, t.target()))
            })
            .filter(|(_, _, node)| !self.is_settled.contains(node.index()))
            .unique_by(|(_, _, node)| *node)
            .map(|(parent, symbol, node)| Boundary {
                parent,
                symbol: symbol.clone(),
                node,
            })
            .collect()
    }

    /// Handles the smallest boundary node. Returns `None` once the boundary is empty, which
    /// happens after at most as many steps as the tree has nodes.
    pub fn step(&mut self) -> Result<Option<Step>, RpniError> {
        let Some(candidate) = self
            .boundary()
            .into_iter()
            .min_by(|l, r| self.tree.order_key(l.node).cmp(&self.tree.order_key(r.node)))
        else {
            return Ok(None);
        };

        let step = match self.first_compatible(&candidate)? {
            Some(settled) => {
                merge(&mut self.tree, settled, &candidate)?;
                trace!(
                    "{} {:?} into {:?}",
                    "merged".green(),
                    self.tree.node(candidate.node).prefix(),
                    self.tree.node(settled).prefix()
                );
                Step::Merged {
                    settled,
                    boundary: candidate.node,
                }
            }
            None => {
                self.promote(candidate.node);
                trace!(
                    "{} {:?}, now {} settled",
                    "promoted".blue(),
                    self.tree.node(candidate.node).prefix(),
                    self.settled.len()
                );
                if let Some(progress) = self.progress.as_mut() {
                    progress(self.settled.len());
                }
                Step::Promoted(candidate.node)
            }
        };

        self.verify_order(step)?;
        Ok(Some(step))
    }

    /// Runs the engine until the boundary is empty and returns the result.
    pub fn run(mut self) -> Result<Hypothesis<I, O>, RpniError> {
        let start = Instant::now();
        let mut steps = 0;
        while self.step()?.is_some() {
            steps += 1;
        }
        debug!(
            "RPNI learned {} state {} in {} steps, took {}ms",
            self.settled.len(),
            self.kind(),
            steps,
            start.elapsed().as_millis()
        );
        Ok(Hypothesis {
            tree: self.tree,
            settled: self.settled,
        })
    }

    fn promote(&mut self, node: NodeId) {
        let key = self.tree.order_key(node);
        let position = self
            .settled
            .partition_point(|&s| self.tree.order_key(s) <= key);
        self.settled.insert(position, node);
        self.is_settled.insert(node.index());
    }

    /// Returns the first settled node, in settlement order, whose tentative merge with
    /// `candidate` passes the held-out suite.
    fn first_compatible(&self, candidate: &Boundary<I>) -> Result<Option<NodeId>, RpniError> {
        let (tree, suite) = (&self.tree, &self.suite);

        if self.trial_threads <= 1 || self.settled.len() < 2 {
            for &settled in &self.settled {
                if trial(tree, suite, settled, candidate)? {
                    return Ok(Some(settled));
                }
            }
            return Ok(None);
        }

        let chunk_size = self.settled.len().div_ceil(self.trial_threads);
        let verdicts = std::thread::scope(|scope| {
            let handles = self
                .settled
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|&settled| trial(tree, suite, settled, candidate))
                            .collect::<Result<Vec<_>, _>>()
                    })
                })
                .collect_vec();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect::<Result<Vec<_>, _>>()
        })?;

        Ok(self
            .settled
            .iter()
            .zip(verdicts.into_iter().flatten())
            .find_map(|(&settled, compatible)| compatible.then_some(settled)))
    }

    fn verify_order(&self, step: Step) -> Result<(), RpniError> {
        let Some((left, right)) = self
            .settled
            .iter()
            .tuple_windows()
            .find(|(l, r)| self.tree.order_key(**l) > self.tree.order_key(**r))
        else {
            return Ok(());
        };
        let (settled, boundary) = match step {
            Step::Merged { settled, boundary } => (settled, boundary),
            Step::Promoted(node) if node == *left => (*right, node),
            Step::Promoted(node) => (*left, node),
        };
        Err(RpniError::EngineInvariantViolation {
            settled: format!("{:?} {:?}", settled, self.tree.node(settled).prefix()),
            boundary: format!("{:?} {:?}", boundary, self.tree.node(boundary).prefix()),
        })
    }
}

fn trial<I: Symbol, O: Color>(
    tree: &PrefixTree<I, O>,
    suite: &HeldOutSuite<I, O>,
    settled: NodeId,
    candidate: &Boundary<I>,
) -> Result<bool, RpniError> {
    let mut overlay = Overlay::new(tree);
    merge(&mut overlay, settled, candidate)?;
    let compatible = suite.is_consistent(&overlay, tree.root());
    trace!(
        "trying {:?} for {:?}: {}",
        tree.node(settled).prefix(),
        tree.node(candidate.node).prefix(),
        if compatible {
            "compatible".green().to_string()
        } else {
            format!("rejected after touching {} nodes", overlay.touched())
                .red()
                .to_string()
        }
    );
    Ok(compatible)
}

/// The result of a run: the merged prefix tree together with the settled nodes, which are the
/// states of the learned automaton. Use [`Hypothesis::into_dfa`], [`Hypothesis::into_moore`] or
/// [`Hypothesis::into_mealy`] to obtain the automaton itself.
#[derive(Debug, Clone)]
pub struct Hypothesis<I, O> {
    pub(crate) tree: PrefixTree<I, O>,
    pub(crate) settled: Vec<NodeId>,
}

impl<I: Symbol, O: Color> Hypothesis<I, O> {
    /// The number of states.
    pub fn size(&self) -> usize {
        self.settled.len()
    }

    /// The kind of sample the hypothesis was learned from.
    pub fn kind(&self) -> ModelKind {
        self.tree.kind()
    }

    /// The settled nodes in settlement order. The first one is the root.
    pub fn settled(&self) -> &[NodeId] {
        &self.settled
    }

    /// The merged prefix tree.
    pub fn tree(&self) -> &PrefixTree<I, O> {
        &self.tree
    }
}
