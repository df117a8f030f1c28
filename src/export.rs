use itertools::Itertools;

use crate::{
    automaton::{Automaton, Dfa, MealyMachine, MooreMachine, StateIndex},
    math::Bijection,
    prefix_tree::NodeId,
    rpni::Hypothesis,
    sample::ModelKind,
    Color, RpniError, Symbol, Void,
};

impl<I: Symbol> Hypothesis<I, bool> {
    /// Turns the hypothesis into a [`Dfa`]. States whose acceptance is unknown are rejecting.
    pub fn into_dfa(self) -> Result<Dfa<I>, RpniError> {
        self.export(
            ModelKind::Dfa,
            |label| label.copied().unwrap_or(false),
            |_| Some(Void),
        )
    }
}

impl<I: Symbol, O: Color> Hypothesis<I, O> {
    /// Turns the hypothesis into a [`MooreMachine`].
    pub fn into_moore(self) -> Result<MooreMachine<I, O>, RpniError> {
        self.export(ModelKind::Moore, |label| label.cloned(), |_| Some(Void))
    }

    /// Turns the hypothesis into a [`MealyMachine`].
    pub fn into_mealy(self) -> Result<MealyMachine<I, O>, RpniError> {
        self.export(ModelKind::Mealy, |_| Void, |output| output.cloned())
    }

    fn export<Q, C, SC, EC>(
        &self,
        requested: ModelKind,
        state_color: SC,
        edge_color: EC,
    ) -> Result<Automaton<I, Q, C>, RpniError>
    where
        SC: Fn(Option<&O>) -> Q,
        EC: Fn(Option<&O>) -> Option<C>,
    {
        if requested != self.kind() {
            return Err(RpniError::KindMismatch {
                requested,
                found: self.kind(),
            });
        }
        let numbering = self.numbering()?;

        let mut automaton = Automaton::new();
        for &node in &self.settled {
            let node = self.tree.node(node);
            automaton.add_state(node.prefix().to_vec(), state_color(node.label()));
        }

        for (source, &node) in self.settled.iter().enumerate() {
            for (symbol, transition) in self.tree.node(node).children() {
                let target = numbering.get_by_left(&transition.target()).copied();
                let color = edge_color(transition.output());
                let (Some(target), Some(color)) = (target, color) else {
                    return Err(self.violation(node, transition.target()));
                };
                automaton.add_edge(source, symbol.clone(), color, target);
            }
        }
        Ok(automaton)
    }

    /// Assigns each settled node the index of its state. Fails if the settled nodes are not in
    /// length-lexicographic order, as the numbering would then not be canonical.
    fn numbering(&self) -> Result<Bijection<NodeId, StateIndex>, RpniError> {
        if let Some((l, r)) = self
            .settled
            .iter()
            .tuple_windows()
            .find(|(l, r)| self.tree.order_key(**l) > self.tree.order_key(**r))
        {
            return Err(self.violation(*l, *r));
        }
        Ok(self
            .settled
            .iter()
            .enumerate()
            .map(|(state, &node)| (node, state))
            .collect())
    }

    fn violation(&self, settled: NodeId, other: NodeId) -> RpniError {
        RpniError::EngineInvariantViolation {
            settled: format!("{:?} {:?}", settled, self.tree.node(settled).prefix()),
            boundary: format!("{:?} {:?}", other, self.tree.node(other).prefix()),
        }
    }
}
