//! The L# learner. It maintains a *basis* of observation-tree nodes that are
//! pairwise apart (these back the states of the hypothesis) and a *frontier*
//! of nodes one input beyond the basis, each mapped to the basis nodes it is
//! not yet apart from. Queries are posed until every frontier node is
//! identified with exactly one basis node and every basis node has an output
//! for every input; then a hypothesis is read off and handed to the
//! equivalence oracle. Counterexamples are folded back into the tree with a
//! binary search over the diverging prefix.

use std::collections::HashMap;

use bimap::BiMap;
use indexmap::{IndexMap, IndexSet};
use mealy::{MealyMachine, MealyState, StateIndex, SystemUnderLearning};
use tabled::Tabled;
use tracing::{debug, trace, warn};

use crate::ads::{Ads, AdsFailure};
use crate::apartness;
use crate::error::LearningError;
use crate::oracle::EquivalenceOracle;
use crate::tree::{NodeId, ObservationTree};

type In<S> = <S as SystemUnderLearning>::Input;
type Out<S> = <S as SystemUnderLearning>::Output;

/// How completion queries for unexplored `(basis, input)` pairs are built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExtensionRule {
    /// Just the access sequence followed by the missing input.
    #[default]
    Nothing,
    /// Additionally append a witness separating the first two basis nodes,
    /// so the new frontier node starts out with fewer candidates.
    SepSeq,
    /// Drive an adaptive distinguishing sequence over the whole basis.
    Ads,
}

impl std::fmt::Display for ExtensionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtensionRule::Nothing => write!(f, "Nothing"),
            ExtensionRule::SepSeq => write!(f, "SepSeq"),
            ExtensionRule::Ads => write!(f, "ADS"),
        }
    }
}

/// How identification queries for frontier nodes with several candidates are
/// built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeparationRule {
    /// Separate the first two candidates with a cached witness.
    #[default]
    SepSeq,
    /// Drive an adaptive distinguishing sequence over all candidates.
    Ads,
}

impl std::fmt::Display for SeparationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeparationRule::SepSeq => write!(f, "SepSeq"),
            SeparationRule::Ads => write!(f, "ADS"),
        }
    }
}

/// Counters exposed after learning. Learner-issued queries and oracle
/// traffic are tracked separately.
#[derive(Clone, Copy, Debug, Default, Tabled)]
pub struct LearningStats {
    #[tabled(rename = "rounds")]
    pub learning_rounds: usize,
    #[tabled(rename = "learn queries")]
    pub learn_queries: usize,
    #[tabled(rename = "learn steps")]
    pub learn_steps: usize,
    #[tabled(rename = "test resets")]
    pub eq_oracle_resets: usize,
    #[tabled(rename = "test steps")]
    pub eq_oracle_steps: usize,
    #[tabled(rename = "tree size")]
    pub observation_tree_size: usize,
}

/// The result of a successful run: the final hypothesis and the counters.
pub struct Learned<I, O> {
    pub hypothesis: MealyMachine<I, O>,
    pub stats: LearningStats,
}

impl<I: mealy::Symbol, O: mealy::Symbol> Clone for Learned<I, O> {
    fn clone(&self) -> Self {
        Self {
            hypothesis: self.hypothesis.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<I: mealy::Symbol, O: mealy::Symbol> std::fmt::Debug for Learned<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Learned")
            .field("hypothesis", &self.hypothesis)
            .field("stats", &self.stats)
            .finish()
    }
}

/// An instance of the L# algorithm, owning the system under learning, the
/// equivalence oracle and all bookkeeping.
pub struct LSharp<S, Q>
where
    S: SystemUnderLearning,
{
    alphabet: Vec<In<S>>,
    sul: S,
    oracle: Q,
    tree: ObservationTree<In<S>, Out<S>>,
    basis: IndexSet<NodeId>,
    frontier: IndexMap<NodeId, Vec<NodeId>>,
    basis_to_state: BiMap<NodeId, StateIndex>,
    witness_cache: HashMap<(NodeId, NodeId), Vec<In<S>>>,
    extension_rule: ExtensionRule,
    separation_rule: SeparationRule,
    max_rounds: Option<usize>,
    seed: Option<u64>,
    stats: LearningStats,
}

impl<S, Q> LSharp<S, Q>
where
    S: SystemUnderLearning,
    Q: EquivalenceOracle<In<S>, Out<S>>,
{
    /// Creates a learner for the given input alphabet. Configuration is
    /// chained onto the fresh instance before calling [`infer`](Self::infer).
    pub fn new(alphabet: impl IntoIterator<Item = In<S>>, sul: S, oracle: Q) -> Self {
        let mut alphabet: Vec<In<S>> = alphabet.into_iter().collect();
        alphabet.sort();
        alphabet.dedup();
        let tree = ObservationTree::new(alphabet.iter().cloned());
        Self {
            alphabet,
            sul,
            oracle,
            tree,
            basis: IndexSet::new(),
            frontier: IndexMap::new(),
            basis_to_state: BiMap::new(),
            witness_cache: HashMap::new(),
            extension_rule: ExtensionRule::default(),
            separation_rule: SeparationRule::default(),
            max_rounds: None,
            seed: None,
            stats: LearningStats::default(),
        }
    }

    pub fn with_extension_rule(mut self, rule: ExtensionRule) -> Self {
        self.extension_rule = rule;
        self
    }

    pub fn with_separation_rule(mut self, rule: SeparationRule) -> Self {
        self.separation_rule = rule;
        self
    }

    /// Bounds the number of learning rounds; exceeding it aborts with
    /// [`MaxRoundsExceeded`](LearningError::MaxRoundsExceeded).
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    /// Seed forwarded to the equivalence oracle for reproducible shuffling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Runs the main learning loop until the oracle accepts a hypothesis or
    /// the round bound is hit.
    pub fn infer(mut self) -> Result<Learned<In<S>, Out<S>>, LearningError> {
        self.basis.insert(self.tree.root());
        loop {
            if let Some(max) = self.max_rounds {
                if self.stats.learning_rounds == max {
                    return Err(LearningError::MaxRoundsExceeded(max));
                }
            }
            self.stats.learning_rounds += 1;
            debug!("starting learning round {}", self.stats.learning_rounds);

            let hypothesis = self.build_hypothesis()?;
            trace!(
                "round {} hypothesis has {} states",
                self.stats.learning_rounds,
                hypothesis.size()
            );

            let cex =
                self.oracle
                    .find_cex(&hypothesis, &mut self.sul, &mut self.tree, self.seed)?;
            let (resets, steps) = self.oracle.stats();
            self.stats.eq_oracle_resets = resets;
            self.stats.eq_oracle_steps = steps;
            self.stats.observation_tree_size = self.tree.size();

            let Some(cex) = cex else {
                debug!(
                    "hypothesis accepted after {} rounds",
                    self.stats.learning_rounds
                );
                return Ok(Learned {
                    hypothesis,
                    stats: self.stats,
                });
            };
            debug!("received counterexample of length {}", cex.len());
            let outputs = self.query_sul(&cex);
            self.process_counterexample(&hypothesis, &cex, &outputs)?;
            self.stats.observation_tree_size = self.tree.size();
        }
    }

    /// Poses one input word to the system under learning, counting it.
    fn query_sul(&mut self, inputs: &[In<S>]) -> Vec<Out<S>> {
        self.stats.learn_queries += 1;
        self.stats.learn_steps += inputs.len();
        self.sul.query(inputs)
    }

    /// Iterates make-adequate / construct / consistency-check until the tree
    /// holds no counterexample against the constructed hypothesis.
    fn build_hypothesis(&mut self) -> Result<MealyMachine<In<S>, Out<S>>, LearningError> {
        loop {
            self.make_tree_adequate()?;
            let hypothesis = self.construct_hypothesis()?;
            let Some(cex) = apartness::witness_against_hypothesis(&self.tree, &hypothesis) else {
                return Ok(hypothesis);
            };
            trace!("tree disagrees with hypothesis on {:?}", cex);
            let outputs = self.tree.observation(&cex).ok_or_else(|| {
                LearningError::MalformedBasis("in-tree counterexample is not observed".into())
            })?;
            self.process_counterexample(&hypothesis, &cex, &outputs)?;
        }
    }

    fn make_tree_adequate(&mut self) -> Result<(), LearningError> {
        self.update_frontier_and_basis();
        while !self.is_adequate() {
            self.make_basis_complete()?;
            self.make_frontiers_identified()?;
            self.promote_frontier_state();
        }
        Ok(())
    }

    fn update_frontier_and_basis(&mut self) {
        self.update_basis_candidates_all();
        self.promote_frontier_state();
        self.check_frontier_consistency();
        self.update_basis_candidates_all();
    }

    /// Drops every basis candidate that has become apart from its frontier
    /// node.
    fn update_basis_candidates_all(&mut self) {
        let tree = &self.tree;
        for (f, candidates) in self.frontier.iter_mut() {
            let f = *f;
            candidates.retain(|b| !apartness::states_are_apart(tree, f, *b));
        }
    }

    fn update_basis_candidates(&mut self, f: NodeId) {
        let tree = &self.tree;
        let Some(candidates) = self.frontier.get_mut(&f) else {
            warn!("node {f} is not in the frontier map");
            return;
        };
        candidates.retain(|b| !apartness::states_are_apart(tree, f, *b));
    }

    /// Moves the first frontier node whose candidate list ran empty into the
    /// basis, then offers the new basis node to the remaining frontier.
    fn promote_frontier_state(&mut self) {
        let Some(promoted) = self
            .frontier
            .iter()
            .find_map(|(f, candidates)| candidates.is_empty().then_some(*f))
        else {
            return;
        };
        trace!("promoting frontier node {promoted} into the basis");
        self.frontier.shift_remove(&promoted);
        self.basis.insert(promoted);
        let tree = &self.tree;
        for (f, candidates) in self.frontier.iter_mut() {
            if !apartness::states_are_apart(tree, promoted, *f) {
                candidates.push(promoted);
            }
        }
    }

    /// Registers every tree successor of a basis node that is neither basis
    /// nor frontier yet, with all basis nodes it is not apart from as
    /// candidates.
    fn check_frontier_consistency(&mut self) {
        let alphabet = self.alphabet.clone();
        let basis: Vec<NodeId> = self.basis.iter().copied().collect();
        for &b in &basis {
            for input in &alphabet {
                let Some(f) = self.tree.successor_of(b, input) else {
                    continue;
                };
                if self.basis.contains(&f) || self.frontier.contains_key(&f) {
                    continue;
                }
                let candidates = basis
                    .iter()
                    .copied()
                    .filter(|&c| !apartness::states_are_apart(&self.tree, c, f))
                    .collect();
                self.frontier.insert(f, candidates);
            }
        }
    }

    /// Adequate means: every frontier node has exactly one candidate left
    /// and every basis node has an output for every input.
    fn is_adequate(&mut self) -> bool {
        self.check_frontier_consistency();
        if self.frontier.values().any(|candidates| candidates.len() != 1) {
            return false;
        }
        self.basis
            .iter()
            .all(|&b| self.alphabet.iter().all(|a| self.tree.output_of(b, a).is_some()))
    }

    /// Explores every missing `(basis, input)` pair and registers the new
    /// frontier nodes.
    fn make_basis_complete(&mut self) -> Result<(), LearningError> {
        let alphabet = self.alphabet.clone();
        let basis: Vec<NodeId> = self.basis.iter().copied().collect();
        for &b in &basis {
            for input in &alphabet {
                if self.tree.successor_of(b, input).is_some() {
                    continue;
                }
                self.explore_frontier(b, input)?;
                let f = self
                    .tree
                    .successor_of(b, input)
                    .ok_or(LearningError::MissingObservation)?;
                let candidates = self
                    .basis
                    .iter()
                    .copied()
                    .filter(|&c| !apartness::states_are_apart(&self.tree, c, f))
                    .collect();
                self.frontier.insert(f, candidates);
            }
        }
        Ok(())
    }

    /// Poses the completion query for `(basis_node, input)` according to the
    /// configured extension rule.
    fn explore_frontier(
        &mut self,
        basis_node: NodeId,
        input: &In<S>,
    ) -> Result<(), LearningError> {
        match self.extension_rule {
            ExtensionRule::Ads => {
                let basis: Vec<NodeId> = self.basis.iter().copied().collect();
                match Ads::new(&self.tree, &basis) {
                    Ok(mut ads) => {
                        let mut prefix = self.tree.access_sequence(basis_node);
                        prefix.push(input.clone());
                        self.adaptive_output_query(prefix, &mut ads)?;
                        Ok(())
                    }
                    Err(AdsFailure) => self.explore_plain(basis_node, input),
                }
            }
            ExtensionRule::SepSeq if self.basis.len() >= 2 => {
                let b1 = *self.basis.get_index(0).expect("basis is non-empty");
                let b2 = *self.basis.get_index(1).expect("basis has two nodes");
                let witness = self.witness_between(b1, b2).ok_or_else(|| {
                    LearningError::MalformedBasis(format!(
                        "basis nodes {b1} and {b2} have no separating witness"
                    ))
                })?;
                let mut inputs = self.tree.access_sequence(basis_node);
                inputs.push(input.clone());
                inputs.extend(witness);
                let outputs = self.query_sul(&inputs);
                self.tree.insert_observation(&inputs, &outputs)
            }
            _ => self.explore_plain(basis_node, input),
        }
    }

    fn explore_plain(&mut self, basis_node: NodeId, input: &In<S>) -> Result<(), LearningError> {
        let mut inputs = self.tree.access_sequence(basis_node);
        inputs.push(input.clone());
        let outputs = self.query_sul(&inputs);
        self.tree.insert_observation(&inputs, &outputs)
    }

    fn make_frontiers_identified(&mut self) -> Result<(), LearningError> {
        let frontier: Vec<NodeId> = self.frontier.keys().copied().collect();
        for f in frontier {
            self.identify_frontier(f)?;
        }
        Ok(())
    }

    /// Poses one identification query for frontier node `f` according to the
    /// configured separation rule, then re-filters its candidates.
    fn identify_frontier(&mut self, f: NodeId) -> Result<(), LearningError> {
        if !self.frontier.contains_key(&f) {
            return Err(LearningError::MalformedBasis(format!(
                "node {f} is not a frontier state"
            )));
        }
        self.update_basis_candidates(f);
        let old_size = self.frontier[&f].len();
        if old_size < 2 {
            return Ok(());
        }

        let (inputs, outputs) = if self.separation_rule == SeparationRule::SepSeq || old_size == 2 {
            self.identify_frontier_sepseq(f)?
        } else {
            let candidates = self.frontier[&f].clone();
            match Ads::new(&self.tree, &candidates) {
                Ok(mut ads) => {
                    let prefix = self.tree.access_sequence(f);
                    self.adaptive_output_query(prefix, &mut ads)?
                }
                Err(AdsFailure) => {
                    trace!("no ADS for the candidates of {f}, falling back to separating sequences");
                    self.identify_frontier_sepseq(f)?
                }
            }
        };
        self.tree.insert_observation(&inputs, &outputs)?;

        self.update_basis_candidates(f);
        if self.frontier[&f].len() == old_size {
            warn!("identification query did not shrink the candidate set of node {f}");
        }
        Ok(())
    }

    fn identify_frontier_sepseq(
        &mut self,
        f: NodeId,
    ) -> Result<(Vec<In<S>>, Vec<Out<S>>), LearningError> {
        let (c1, c2) = {
            let candidates = &self.frontier[&f];
            (candidates[0], candidates[1])
        };
        let witness = self.witness_between(c1, c2).ok_or_else(|| {
            LearningError::MalformedBasis(format!(
                "basis candidates {c1} and {c2} have no separating witness"
            ))
        })?;
        let mut inputs = self.tree.access_sequence(f);
        inputs.extend(witness);
        let outputs = self.query_sul(&inputs);
        Ok((inputs, outputs))
    }

    /// Answers an adaptive query, preferring the tree over the system under
    /// learning: if the whole ADS can be resolved from recorded
    /// observations, no query is spent.
    fn adaptive_output_query(
        &mut self,
        prefix: Vec<In<S>>,
        ads: &mut Ads<In<S>, Out<S>>,
    ) -> Result<(Vec<In<S>>, Vec<Out<S>>), LearningError> {
        if let Some(node) = self.tree.node_at(&prefix) {
            let answered = self.answer_ads_from_tree(ads, node);
            ads.reset_to_root();
            if let Some((suffix_inputs, suffix_outputs)) = answered {
                let mut inputs = prefix.clone();
                let mut outputs = self
                    .tree
                    .observation(&prefix)
                    .expect("prefix path is observed");
                inputs.extend(suffix_inputs);
                outputs.extend(suffix_outputs);
                return Ok((inputs, outputs));
            }
        }
        let (inputs, outputs) = self.sul_adaptive_query(prefix, ads);
        self.tree.insert_observation(&inputs, &outputs)?;
        Ok((inputs, outputs))
    }

    /// Tries to drive the ADS purely on recorded observations below `from`.
    /// `None` as soon as a needed edge is missing.
    fn answer_ads_from_tree(
        &self,
        ads: &mut Ads<In<S>, Out<S>>,
        from: NodeId,
    ) -> Option<(Vec<In<S>>, Vec<Out<S>>)> {
        let mut current = from;
        let mut previous: Option<Out<S>> = None;
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        loop {
            let Some(input) = ads.next_input(previous.as_ref()).cloned() else {
                break;
            };
            let output = self.tree.output_of(current, &input)?.clone();
            let successor = self.tree.successor_of(current, &input)?;
            inputs.push(input);
            outputs.push(output.clone());
            previous = Some(output);
            current = successor;
        }
        Some((inputs, outputs))
    }

    /// Steps the prefix on the system under learning and then drives the ADS
    /// one output at a time. The session is recycled at the start of the
    /// adaptive segment.
    fn sul_adaptive_query(
        &mut self,
        mut inputs: Vec<In<S>>,
        ads: &mut Ads<In<S>, Out<S>>,
    ) -> (Vec<In<S>>, Vec<Out<S>>) {
        let mut outputs = Vec::with_capacity(inputs.len());
        self.sul.post();
        self.sul.pre();
        for input in &inputs {
            outputs.push(self.sul.step(input));
            self.stats.learn_steps += 1;
        }
        let mut previous: Option<Out<S>> = None;
        loop {
            let Some(input) = ads.next_input(previous.as_ref()).cloned() else {
                break;
            };
            let output = self.sul.step(&input);
            self.stats.learn_steps += 1;
            inputs.push(input);
            outputs.push(output.clone());
            previous = Some(output);
        }
        self.stats.learn_queries += 1;
        (inputs, outputs)
    }

    /// Looks up or computes the canonical witness separating two basis
    /// nodes. The cache is keyed on the unordered pair, so it is symmetric.
    fn witness_between(&mut self, a: NodeId, b: NodeId) -> Option<Vec<In<S>>> {
        let key = (a.min(b), a.max(b));
        if let Some(cached) = self.witness_cache.get(&key) {
            return Some(cached.clone());
        }
        let witness = apartness::compute_witness(&self.tree, key.0, key.1)?;
        self.witness_cache.insert(key, witness.clone());
        Some(witness)
    }

    /// Reads the hypothesis off the adequate tree: basis nodes become states
    /// in basis order (the root first, making it initial), frontier
    /// successors are replaced by their unique candidate.
    fn construct_hypothesis(&mut self) -> Result<MealyMachine<In<S>, Out<S>>, LearningError> {
        self.basis_to_state.clear();
        for (idx, b) in self.basis.iter().enumerate() {
            self.basis_to_state.insert(*b, idx as StateIndex);
        }

        let mut states = Vec::with_capacity(self.basis.len());
        for (idx, &b) in self.basis.iter().enumerate() {
            let mut state = MealyState::new(format!("s{idx}"));
            for input in &self.alphabet {
                let output = self
                    .tree
                    .output_of(b, input)
                    .ok_or(LearningError::MissingObservation)?
                    .clone();
                let mut successor = self
                    .tree
                    .successor_of(b, input)
                    .ok_or(LearningError::MissingObservation)?;
                if let Some(candidates) = self.frontier.get(&successor) {
                    if candidates.len() != 1 {
                        return Err(LearningError::MalformedBasis(format!(
                            "frontier node {successor} has {} basis candidates",
                            candidates.len()
                        )));
                    }
                    successor = candidates[0];
                }
                let target = *self.basis_to_state.get_by_left(&successor).ok_or_else(|| {
                    LearningError::MalformedBasis(format!(
                        "successor {successor} is neither basis nor identified frontier"
                    ))
                })?;
                state.add_transition(input.clone(), output, target);
            }
            states.push(state);
        }

        let initial = *self
            .basis_to_state
            .get_by_left(&self.tree.root())
            .expect("the root is always in the basis");
        Ok(MealyMachine::new(initial, states))
    }

    /// Folds a counterexample into the tree, truncates it to the prefix up
    /// to the first output divergence and hands that to the binary search.
    fn process_counterexample(
        &mut self,
        hypothesis: &MealyMachine<In<S>, Out<S>>,
        inputs: &[In<S>],
        outputs: &[Out<S>],
    ) -> Result<(), LearningError> {
        self.tree.insert_observation(inputs, outputs)?;
        let hyp_outputs = hypothesis.trace(inputs).ok_or_else(|| {
            LearningError::MalformedBasis("hypothesis is not complete on the counterexample".into())
        })?;
        let k = outputs
            .iter()
            .zip(&hyp_outputs)
            .position(|(observed, predicted)| observed != predicted)
            .ok_or_else(|| {
                LearningError::MalformedBasis(
                    "counterexample outputs agree with the hypothesis".into(),
                )
            })?;
        self.binary_search_refine(hypothesis, inputs[..k].to_vec(), outputs[..k].to_vec())
    }

    /// Halves the distance between the known-correct prefix and the
    /// divergence with every recursive step, spending one query each, until
    /// the diverging node lands in basis or frontier territory.
    fn binary_search_refine(
        &mut self,
        hypothesis: &MealyMachine<In<S>, Out<S>>,
        cex_inputs: Vec<In<S>>,
        cex_outputs: Vec<Out<S>>,
    ) -> Result<(), LearningError> {
        let tree_node = self
            .tree
            .node_at(&cex_inputs)
            .ok_or(LearningError::MissingObservation)?;
        self.update_frontier_and_basis();
        if self.frontier.contains_key(&tree_node) || self.basis.contains(&tree_node) {
            return Ok(());
        }

        let hyp_node = self.backing_basis_node(hypothesis, &cex_inputs)?;

        // the part of the counterexample that already runs inside the basis
        let mut prefix_len = 0;
        let mut current = self.tree.root();
        for input in &cex_inputs {
            if self.frontier.contains_key(&current) {
                break;
            }
            current = self
                .tree
                .successor_of(current, input)
                .ok_or(LearningError::MissingObservation)?;
            prefix_len += 1;
        }

        let h = (prefix_len + cex_inputs.len()) / 2;
        let sigma1 = cex_inputs[..h].to_vec();
        let sigma2 = &cex_inputs[h..];

        let hyp_node_p = self.backing_basis_node(hypothesis, &sigma1)?;
        let access_p = self.tree.access_sequence(hyp_node_p);
        let witness = self.witness_between(tree_node, hyp_node).ok_or_else(|| {
            LearningError::MalformedBasis(
                "binary search requires a witness between tree node and hypothesis node".into(),
            )
        })?;

        let mut query_inputs = access_p.clone();
        query_inputs.extend_from_slice(sigma2);
        query_inputs.extend(witness);
        let query_outputs = self.query_sul(&query_inputs);
        self.tree.insert_observation(&query_inputs, &query_outputs)?;

        let sigma1_node = self
            .tree
            .node_at(&sigma1)
            .ok_or(LearningError::MissingObservation)?;
        if apartness::states_are_apart(&self.tree, sigma1_node, hyp_node_p) {
            // the divergence lies in the left half
            self.binary_search_refine(hypothesis, sigma1, cex_outputs[..h].to_vec())
        } else {
            // replace the prefix by the basis access and recurse right
            let mut shifted = access_p;
            shifted.extend_from_slice(sigma2);
            let len = shifted.len();
            self.binary_search_refine(hypothesis, shifted, query_outputs[..len].to_vec())
        }
    }

    /// The basis node backing the hypothesis state reached by `word`.
    fn backing_basis_node(
        &self,
        hypothesis: &MealyMachine<In<S>, Out<S>>,
        word: &[In<S>],
    ) -> Result<NodeId, LearningError> {
        let state = hypothesis.reached(word).ok_or_else(|| {
            LearningError::MalformedBasis("hypothesis is not complete on the counterexample".into())
        })?;
        self.basis_to_state
            .get_by_right(&state)
            .copied()
            .ok_or_else(|| {
                LearningError::MalformedBasis(format!(
                    "hypothesis state {state} has no backing basis node"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtensionRule, LSharp, SeparationRule};
    use crate::error::LearningError;
    use crate::oracle::{PerfectKnowledgeOracle, WMethodOracle};
    use mealy::{MealyMachine, MealySul};

    fn identity() -> MealyMachine<char, u8> {
        MealyMachine::builder()
            .with_transitions([(0, 'a', 0, 0), (0, 'b', 0, 0)])
            .into_mealy(0)
    }

    fn toggle() -> MealyMachine<char, u8> {
        MealyMachine::builder()
            .with_transitions([(0, 'a', 0, 1), (1, 'a', 1, 0)])
            .into_mealy(0)
    }

    fn three_state() -> MealyMachine<char, u8> {
        MealyMachine::builder()
            .with_transitions([
                (0, 'a', 0, 1),
                (0, 'b', 0, 0),
                (1, 'a', 0, 2),
                (1, 'b', 1, 0),
                (2, 'a', 1, 2),
                (2, 'b', 0, 0),
            ])
            .into_mealy(0)
    }

    fn four_state() -> MealyMachine<char, u8> {
        MealyMachine::builder()
            .with_transitions([
                (0, 'a', 0, 1),
                (0, 'b', 0, 0),
                (1, 'a', 0, 2),
                (1, 'b', 1, 0),
                (2, 'a', 0, 3),
                (2, 'b', 0, 0),
                (3, 'a', 1, 3),
                (3, 'b', 0, 2),
            ])
            .into_mealy(0)
    }

    fn learn_with_perfect_oracle(
        reference: &MealyMachine<char, u8>,
        extension: ExtensionRule,
        separation: SeparationRule,
    ) -> super::Learned<char, u8> {
        LSharp::new(
            reference.input_alphabet(),
            MealySul::new(reference.clone()),
            PerfectKnowledgeOracle::new(reference.clone()),
        )
        .with_extension_rule(extension)
        .with_separation_rule(separation)
        .with_max_rounds(20)
        .infer()
        .expect("learning must succeed")
    }

    #[test]
    fn single_state_identity() {
        let learned = learn_with_perfect_oracle(
            &identity(),
            ExtensionRule::Nothing,
            SeparationRule::SepSeq,
        );
        assert_eq!(learned.hypothesis.size(), 1);
        assert_eq!(learned.stats.learning_rounds, 1);
        assert!(learned.stats.learn_queries <= 2);
    }

    #[test]
    fn two_state_toggle_needs_the_double_a() {
        // the W-method suite distinguishes the one-state hypothesis from the
        // toggle precisely on the word a a
        let flat = MealyMachine::builder()
            .with_transitions([(0, 'a', 0, 0)])
            .into_mealy(0);
        let mut sul = MealySul::new(toggle());
        let mut tree = crate::ObservationTree::new(['a']);
        let mut oracle = WMethodOracle::new(['a'], 0);
        use crate::oracle::EquivalenceOracle;
        let cex = oracle.find_cex(&flat, &mut sul, &mut tree, None).unwrap();
        assert_eq!(cex, Some(vec!['a', 'a']));

        let learned = LSharp::new(
            ['a'],
            MealySul::new(toggle()),
            WMethodOracle::new(['a'], 0),
        )
        .infer()
        .unwrap();
        assert_eq!(learned.hypothesis.size(), 2);
        assert_eq!(learned.stats.learning_rounds, 2);
        assert_eq!(learned.hypothesis.witness_inequivalence(&toggle()), None);
    }

    #[test]
    fn three_state_with_separating_sequences() {
        let reference = three_state();
        let learned =
            learn_with_perfect_oracle(&reference, ExtensionRule::SepSeq, SeparationRule::SepSeq);
        assert_eq!(learned.hypothesis.size(), 3);
        assert_eq!(learned.hypothesis.witness_inequivalence(&reference), None);

        // the states reached by a and a a are told apart by a first
        let hyp = &learned.hypothesis;
        let s1 = hyp.reached(&['a']).unwrap();
        let s2 = hyp.reached(&['a', 'a']).unwrap();
        let witness = hyp.distinguishing_sequence(s1, s2).unwrap();
        assert_eq!(witness.first(), Some(&'a'));
    }

    #[test_log::test]
    fn all_rule_combinations_learn_the_same_machine() {
        for reference in [toggle(), three_state(), four_state()] {
            for extension in [
                ExtensionRule::Nothing,
                ExtensionRule::SepSeq,
                ExtensionRule::Ads,
            ] {
                for separation in [SeparationRule::SepSeq, SeparationRule::Ads] {
                    let learned = learn_with_perfect_oracle(&reference, extension, separation);
                    assert_eq!(
                        learned.hypothesis.size(),
                        reference.size(),
                        "wrong size with {extension}/{separation}"
                    );
                    assert_eq!(
                        learned.hypothesis.witness_inequivalence(&reference),
                        None,
                        "inequivalent result with {extension}/{separation}"
                    );
                }
            }
        }
    }

    #[test]
    fn round_trip_law_bounds_learning_rounds() {
        for reference in [identity(), toggle(), three_state(), four_state()] {
            let learned = learn_with_perfect_oracle(
                &reference,
                ExtensionRule::Nothing,
                SeparationRule::SepSeq,
            );
            assert_eq!(learned.hypothesis.witness_inequivalence(&reference), None);
            assert!(learned.stats.learning_rounds <= reference.size());
        }
    }

    #[test]
    fn learning_with_wmethod_oracle_and_seed() {
        let reference = four_state();
        let learned = LSharp::new(
            ['a', 'b'],
            MealySul::new(reference.clone()),
            WMethodOracle::new(['a', 'b'], 2).with_recorded_tests(),
        )
        .with_extension_rule(ExtensionRule::SepSeq)
        .with_seed(1234)
        .with_max_rounds(20)
        .infer()
        .unwrap();
        assert_eq!(learned.hypothesis.size(), 4);
        assert_eq!(learned.hypothesis.witness_inequivalence(&reference), None);
        assert!(learned.stats.eq_oracle_resets > 0);
        assert!(learned.stats.observation_tree_size > 4);
    }

    #[test]
    fn round_bound_is_enforced() {
        let result = LSharp::new(
            ['a'],
            MealySul::new(toggle()),
            WMethodOracle::new(['a'], 0),
        )
        .with_max_rounds(1)
        .infer();
        assert_eq!(result.err(), Some(LearningError::MaxRoundsExceeded(1)));
    }

    #[test]
    fn witness_cache_is_symmetric() {
        let mut learner = LSharp::new(
            ['a'],
            MealySul::new(toggle()),
            PerfectKnowledgeOracle::new(toggle()),
        );
        learner
            .tree
            .insert_observation(&['a', 'a'], &[0, 1])
            .unwrap();
        let root = learner.tree.root();
        let after_a = learner.tree.node_at(&['a']).unwrap();

        let forward = learner.witness_between(root, after_a).unwrap();
        let backward = learner.witness_between(after_a, root).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward, vec!['a']);
        assert_eq!(learner.witness_cache.len(), 1);
    }

    #[test]
    fn basis_is_pairwise_apart_and_frontier_hangs_off_it() {
        let reference = four_state();
        let mut learner = LSharp::new(
            ['a', 'b'],
            MealySul::new(reference.clone()),
            PerfectKnowledgeOracle::new(reference.clone()),
        );
        let root = learner.tree.root();
        learner.basis.insert(root);
        loop {
            let hypothesis = learner.build_hypothesis().unwrap();
            let Some(cex) = hypothesis.witness_inequivalence(&reference) else {
                break;
            };
            let outputs = learner.query_sul(&cex);
            learner
                .process_counterexample(&hypothesis, &cex, &outputs)
                .unwrap();
        }
        assert_eq!(learner.basis.len(), 4);

        for (i, &a) in learner.basis.iter().enumerate() {
            for &b in learner.basis.iter().skip(i + 1) {
                assert!(
                    crate::apartness::states_are_apart(&learner.tree, a, b),
                    "basis nodes {a} and {b} are not apart"
                );
            }
        }
        // every frontier node is a basis node extended by a single input
        for &f in learner.frontier.keys() {
            let access = learner.tree.access_sequence(f);
            let (_, parent_access) = access.split_last().unwrap();
            let parent = learner.tree.node_at(parent_access).unwrap();
            assert!(learner.basis.contains(&parent));
        }
    }

    #[test]
    fn binary_search_stays_within_logarithmic_queries() {
        // 16-state cycle that answers 0 until the wrap-around step
        let mut edges = Vec::new();
        for i in 0..16usize {
            edges.push((i, 'a', u8::from(i == 15), (i + 1) % 16));
        }
        let reference = MealyMachine::builder().with_transitions(edges).into_mealy(0);

        let mut learner = LSharp::new(
            ['a'],
            MealySul::new(reference.clone()),
            PerfectKnowledgeOracle::new(reference.clone()),
        );
        let root = learner.tree.root();
        learner.basis.insert(root);
        let hypothesis = learner.build_hypothesis().unwrap();
        assert_eq!(hypothesis.size(), 1);

        let cex = vec!['a'; 16];
        let outputs = reference.trace(&cex).unwrap();
        let queries_before = learner.stats.learn_queries;
        learner
            .process_counterexample(&hypothesis, &cex, &outputs)
            .unwrap();
        // ceil(log2(16)) + 1
        assert!(learner.stats.learn_queries - queries_before <= 5);
    }
}
