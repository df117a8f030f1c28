use itertools::Itertools;

use crate::{
    math::Map,
    prefix_tree::{Children, NodeId, PrefixTree, Transition},
    sample::ModelKind,
    Color, RpniError, Symbol,
};

/// Read and write access to the labels and transitions of nodes. Merges are computed
/// against this trait, which is implemented by the [`PrefixTree`] itself and by an
/// [`Overlay`] on top of it. This way the same code performs tentative merges as well as
/// committed ones.
pub trait NodeStore<I, O> {
    /// The kind of the underlying tree, which selects how nodes are folded.
    fn kind(&self) -> ModelKind;
    /// The label of the given node.
    fn label(&self, node: NodeId) -> Option<&O>;
    /// The outgoing transitions of the given node.
    fn children(&self, node: NodeId) -> &Children<I, O>;
    /// Overwrites the label of the given node.
    fn set_label(&mut self, node: NodeId, label: O);
    /// Mutable access to the outgoing transitions of the given node.
    fn children_mut(&mut self, node: NodeId) -> &mut Children<I, O>;
}

impl<I: Symbol, O: Color> NodeStore<I, O> for PrefixTree<I, O> {
    fn kind(&self) -> ModelKind {
        PrefixTree::kind(self)
    }

    fn label(&self, node: NodeId) -> Option<&O> {
        self.node(node).label()
    }

    fn children(&self, node: NodeId) -> &Children<I, O> {
        self.node(node).children()
    }

    fn set_label(&mut self, node: NodeId, label: O) {
        *self.node_mut(node).label_mut() = Some(label);
    }

    fn children_mut(&mut self, node: NodeId) -> &mut Children<I, O> {
        self.node_mut(node).children_mut()
    }
}

/// A copy-on-write journal on top of a [`PrefixTree`]. Reads fall through to the tree unless
/// the node has been written before, writes only ever touch the journal. Dropping the overlay
/// discards a tentative merge without leaving any trace in the tree.
#[derive(Debug, Clone)]
pub struct Overlay<'a, I, O> {
    base: &'a PrefixTree<I, O>,
    labels: Map<NodeId, O>,
    children: Map<NodeId, Children<I, O>>,
}

impl<'a, I: Symbol, O: Color> Overlay<'a, I, O> {
    /// Creates an empty overlay over `base`.
    pub fn new(base: &'a PrefixTree<I, O>) -> Self {
        Self {
            base,
            labels: Map::default(),
            children: Map::default(),
        }
    }

    /// Returns `true` if nothing has been written to the overlay yet.
    pub fn is_pristine(&self) -> bool {
        self.labels.is_empty() && self.children.is_empty()
    }

    /// The number of nodes whose label or transitions have been written.
    pub fn touched(&self) -> usize {
        self.children
            .keys()
            .chain(self.labels.keys().filter(|n| !self.children.contains_key(n)))
            .count()
    }
}

impl<'a, I: Symbol, O: Color> NodeStore<I, O> for Overlay<'a, I, O> {
    fn kind(&self) -> ModelKind {
        self.base.kind()
    }

    fn label(&self, node: NodeId) -> Option<&O> {
        self.labels
            .get(&node)
            .or_else(|| self.base.node(node).label())
    }

    fn children(&self, node: NodeId) -> &Children<I, O> {
        self.children
            .get(&node)
            .unwrap_or_else(|| self.base.node(node).children())
    }

    fn set_label(&mut self, node: NodeId, label: O) {
        self.labels.insert(node, label);
    }

    fn children_mut(&mut self, node: NodeId) -> &mut Children<I, O> {
        let base = self.base;
        self.children
            .entry(node)
            .or_insert_with(|| base.node(node).children().clone())
    }
}

/// A candidate for merging: a node that is not settled, together with the settled node and
/// symbol of the transition through which it is reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Boundary<I> {
    /// The settled predecessor.
    pub parent: NodeId,
    /// The symbol on the transition from `parent` to `node`.
    pub symbol: I,
    /// The candidate itself.
    pub node: NodeId,
}

/// Identifies the boundary node with the settled one. The transition leading into the boundary
/// node is redirected to `settled`, its output is kept. Afterwards the subtree of the boundary
/// node is folded into `settled`, see [`fold`].
///
/// Fails if `boundary.parent` has no transition on `boundary.symbol` that leads to
/// `boundary.node`, which means the engine lost track of its candidates.
pub fn merge<I, O, S>(store: &mut S, settled: NodeId, boundary: &Boundary<I>) -> Result<(), RpniError>
where
    I: Symbol,
    O: Color,
    S: NodeStore<I, O>,
{
    if store
        .children(boundary.parent)
        .get(&boundary.symbol)
        .map(|t| t.target)
        != Some(boundary.node)
    {
        return Err(RpniError::EngineInvariantViolation {
            settled: format!("{settled:?}"),
            boundary: format!("{:?} via {:?}", boundary.node, boundary.symbol),
        });
    }
    if let Some(transition) = store
        .children_mut(boundary.parent)
        .get_mut(&boundary.symbol)
    {
        transition.target = settled;
    }
    fold(store, settled, boundary.node);
    Ok(())
}

/// A pending pair of nodes together with the symbols of the boundary side that still need
/// to be handled. The stack of frames mirrors the call stack of a recursive fold.
struct Frame<I> {
    settled: NodeId,
    boundary: NodeId,
    symbols: Vec<I>,
    next: usize,
}

/// Folds the node `boundary` into `settled`. The label of `boundary` replaces that of
/// `settled` if it is known. Then each transition of `boundary`, in order of its
/// [`Transition::rank`], is either attached to `settled` behind all of its transitions (if
/// `settled` has no transition on that symbol) or both targets are folded in turn.
///
/// For Mealy trees, a transition of `boundary` supersedes the output of the transition of
/// `settled` on the same input when the pair is entered. Transitions on other inputs are left
/// untouched.
///
/// Every node below `boundary` is visited at most once and is only ever read.
pub fn fold<I, O, S>(store: &mut S, settled: NodeId, boundary: NodeId)
where
    I: Symbol,
    O: Color,
    S: NodeStore<I, O>,
{
    let transducer = store.kind().is_transducer();
    let mut stack = vec![enter(store, transducer, settled, boundary)];

    while let Some(frame) = stack.last_mut() {
        let Some(symbol) = frame.symbols.get(frame.next).cloned() else {
            stack.pop();
            continue;
        };
        frame.next += 1;
        let (settled, boundary) = (frame.settled, frame.boundary);

        let Some(incoming) = store.children(boundary).get(&symbol).cloned() else {
            continue;
        };
        let existing = store.children(settled).get(&symbol).map(|t| t.target);

        match existing {
            Some(target) => {
                let frame = enter(store, transducer, target, incoming.target);
                stack.push(frame);
            }
            None => {
                let children = store.children_mut(settled);
                let rank = children.len();
                children.insert(symbol, Transition { rank, ..incoming });
            }
        }
    }
}

fn enter<I, O, S>(store: &mut S, transducer: bool, settled: NodeId, boundary: NodeId) -> Frame<I>
where
    I: Symbol,
    O: Color,
    S: NodeStore<I, O>,
{
    if let Some(label) = store.label(boundary).cloned() {
        if store.label(settled) != Some(&label) {
            store.set_label(settled, label);
        }
    }

    if transducer {
        let superseded: Vec<(I, Option<O>)> = {
            let ours = store.children(settled);
            store
                .children(boundary)
                .iter()
                .filter(|(s, t)| ours.get(*s).is_some_and(|o| o.output != t.output))
                .map(|(s, t)| (s.clone(), t.output.clone()))
                .collect()
        };
        if !superseded.is_empty() {
            let children = store.children_mut(settled);
            for (symbol, output) in superseded {
                if let Some(t) = children.get_mut(&symbol) {
                    t.output = output;
                }
            }
        }
    }

    Frame {
        settled,
        boundary,
        symbols: store
            .children(boundary)
            .iter()
            .sorted_by_key(|(_, t)| t.rank)
            .map(|(s, _)| s.clone())
            .collect(),
        next: 0,
    }
}
