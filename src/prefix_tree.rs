use std::{collections::BTreeMap, fmt::Debug, time::Instant};

use tracing::debug;

use crate::{
    sample::{ModelKind, Sample, Trace},
    Color, RpniError, Symbol,
};

/// Index of a node in a [`PrefixTree`].
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The root of every prefix tree, which corresponds to the empty word.
    pub const ROOT: NodeId = NodeId(0);

    /// Returns the position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// An outgoing transition of a node. In a Mealy tree the transition additionally carries the
/// output that was observed on it, so together with the symbol it is keyed by, it forms an
/// input/output pair.
///
/// Besides, each transition knows its rank among the transitions of its source, that is the
/// number of transitions the source had when this one was added. Folding visits transitions
/// in the order of their rank, which is the order in which the sample first exhibited them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<O> {
    pub(crate) target: NodeId,
    pub(crate) output: Option<O>,
    pub(crate) rank: usize,
}

impl<O> Transition<O> {
    /// The node that is reached by taking the transition.
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// The output produced by the transition, always `None` unless the tree stems from a
    /// Mealy sample.
    pub fn output(&self) -> Option<&O> {
        self.output.as_ref()
    }

    /// Position of the transition among those leaving its source, in order of insertion.
    pub fn rank(&self) -> usize {
        self.rank
    }
}

/// The outgoing transitions of a node, ordered by their symbol.
pub type Children<I, O> = BTreeMap<I, Transition<O>>;

/// A node of the prefix tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node<I, O> {
    prefix: Vec<I>,
    label: Option<O>,
    children: Children<I, O>,
}

impl<I, O> Node<I, O> {
    /// The word with which the node was reached when the tree was constructed.
    pub fn prefix(&self) -> &[I] {
        &self.prefix
    }

    /// The label of the node, `None` if it is not determined by the sample.
    pub fn label(&self) -> Option<&O> {
        self.label.as_ref()
    }

    /// The outgoing transitions of the node.
    pub fn children(&self) -> &Children<I, O> {
        &self.children
    }
}

/// The prefix tree of a sample. Nodes live in an arena and are addressed by their [`NodeId`],
/// the root always has index `0`. While the engine runs, transitions of the tree are
/// redirected and children are attached to other nodes, so the structure is only a tree when
/// freshly built. The prefix of a node, however, never changes and serves as its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTree<I, O> {
    kind: ModelKind,
    nodes: Vec<Node<I, O>>,
}

impl<I: Symbol, O: Color> PrefixTree<I, O> {
    /// Creates a tree that consists only of an unlabelled root.
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            nodes: vec![Node {
                prefix: vec![],
                label: None,
                children: Children::new(),
            }],
        }
    }

    /// Builds the prefix tree of the given sample. Every trace is walked from the root and
    /// missing nodes are added along the way. For DFA and Moore samples the node that is
    /// reached in the end receives the label of the trace. For Mealy samples each step sets
    /// the output of the transition it takes.
    ///
    /// Fails with [`RpniError::SampleInconsistency`] if two traces disagree on the label of
    /// a node or on the output of a transition.
    pub fn build(sample: &Sample<I, O>) -> Result<Self, RpniError> {
        let start = Instant::now();
        let mut tree = Self::new(sample.kind());

        for trace in sample.traces() {
            let mut node = NodeId::ROOT;
            match trace {
                Trace::Classified(word, label) => {
                    for symbol in word {
                        node = tree.child_or_insert(node, symbol, None)?;
                    }
                    tree.assign_label(node, label)?;
                }
                Trace::Transduced(steps) => {
                    for (symbol, output) in steps {
                        node = tree.child_or_insert(node, symbol, Some(output))?;
                    }
                }
            }
        }

        debug!(
            "constructed prefix tree with {} nodes from {} traces in {}ms",
            tree.size(),
            sample.len(),
            start.elapsed().as_millis()
        );
        Ok(tree)
    }

    fn child_or_insert(
        &mut self,
        node: NodeId,
        symbol: &I,
        output: Option<&O>,
    ) -> Result<NodeId, RpniError> {
        if let Some(transition) = self.nodes[node.0].children.get(symbol) {
            if output.is_some() && transition.output.as_ref() != output {
                let mut prefix = self.nodes[node.0].prefix.clone();
                prefix.push(symbol.clone());
                return Err(RpniError::SampleInconsistency {
                    prefix: format!("{prefix:?}"),
                });
            }
            return Ok(transition.target);
        }
        Ok(self.add_child(node, symbol.clone(), output.cloned()))
    }

    fn assign_label(&mut self, node: NodeId, label: &O) -> Result<(), RpniError> {
        let node = &mut self.nodes[node.0];
        if let Some(existing) = &node.label {
            if existing != label {
                return Err(RpniError::SampleInconsistency {
                    prefix: format!("{:?}", node.prefix),
                });
            }
            return Ok(());
        }
        node.label = Some(label.clone());
        Ok(())
    }

    /// Adds a fresh, unlabelled node as the `symbol`-successor of `parent` and returns its index.
    /// An existing transition on `symbol` is replaced but keeps its rank.
    pub fn add_child(&mut self, parent: NodeId, symbol: I, output: Option<O>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut prefix = self.nodes[parent.0].prefix.clone();
        prefix.push(symbol.clone());
        self.nodes.push(Node {
            prefix,
            label: None,
            children: Children::new(),
        });
        let children = &mut self.nodes[parent.0].children;
        let rank = children
            .get(&symbol)
            .map_or(children.len(), |existing| existing.rank);
        children.insert(
            symbol,
            Transition {
                target: id,
                output,
                rank,
            },
        );
        id
    }

    /// The kind of sample that the tree was built from.
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Index of the root node.
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// The number of nodes, including those that have been merged away.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Returns a reference to the node with the given index.
    ///
    /// # Panics
    /// If the index does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &Node<I, O> {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node<I, O> {
        &mut self.nodes[id.0]
    }

    /// The key by which nodes are ordered: shorter prefixes come first, prefixes of equal
    /// length are compared lexicographically.
    pub fn order_key(&self, id: NodeId) -> (usize, &[I]) {
        let prefix = self.node(id).prefix();
        (prefix.len(), prefix)
    }

    /// Follows the given word from the root, returning the reached node if all transitions exist.
    pub fn walk<'a, W: IntoIterator<Item = &'a I>>(&self, word: W) -> Option<NodeId>
    where
        I: 'a,
    {
        word.into_iter().try_fold(NodeId::ROOT, |node, symbol| {
            self.node(node).children.get(symbol).map(|t| t.target)
        })
    }
}

impl<I, O> Node<I, O> {
    pub(crate) fn label_mut(&mut self) -> &mut Option<O> {
        &mut self.label
    }

    pub(crate) fn children_mut(&mut self) -> &mut Children<I, O> {
        &mut self.children
    }
}
