//! Equivalence oracles: given a hypothesis, search for an input word on
//! which hypothesis and system under learning disagree.

use std::collections::HashSet;

use indexmap::IndexMap;
use itertools::{Itertools, repeat_n};
use mealy::{MealyMachine, StateIndex, Symbol, SystemUnderLearning};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::error::LearningError;
use crate::tree::ObservationTree;

/// Contract consumed by the learner. Implementations return the shortest
/// diverging prefix they observe, or `None` when they accept the
/// hypothesis. Oracles that exercise the system under learning may fold
/// fully consistent runs into the observation tree.
pub trait EquivalenceOracle<I: Symbol, O: Symbol> {
    fn find_cex<S>(
        &mut self,
        hypothesis: &MealyMachine<I, O>,
        sul: &mut S,
        tree: &mut ObservationTree<I, O>,
        seed: Option<u64>,
    ) -> Result<Option<Vec<I>>, LearningError>
    where
        S: SystemUnderLearning<Input = I, Output = O>;

    /// Resets and steps this oracle has spent on the system under learning.
    fn stats(&self) -> (usize, usize) {
        (0, 0)
    }
}

/// Conformance-testing oracle after Chow's W-method. The test suite is the
/// flattened product of a transition cover, all middle words of length at
/// most `k` (the extra-states bound) and a characterization set computed per
/// hypothesis. Every suite word is replayed in lock-step against hypothesis
/// and system under learning.
pub struct WMethodOracle<I> {
    alphabet: Vec<I>,
    k: usize,
    add_to_tree: bool,
    cache: HashSet<Vec<I>>,
    resets: usize,
    steps: usize,
}

impl<I: Symbol> WMethodOracle<I> {
    /// Creates an oracle over `alphabet` that tests for up to `k` states
    /// beyond the hypothesis size.
    pub fn new(alphabet: impl IntoIterator<Item = I>, k: usize) -> Self {
        let mut alphabet: Vec<I> = alphabet.into_iter().collect();
        alphabet.sort();
        alphabet.dedup();
        Self {
            alphabet,
            k,
            add_to_tree: false,
            cache: HashSet::new(),
            resets: 0,
            steps: 0,
        }
    }

    /// Folds every fully consistent suite word into the observation tree, so
    /// the learner gets the negative test results for free.
    pub fn with_recorded_tests(mut self) -> Self {
        self.add_to_tree = true;
        self
    }

    /// All input words of length `1..=k`, preceded by the empty word.
    fn middle_words(&self) -> Vec<Vec<I>> {
        let mut middle = vec![Vec::new()];
        for len in 1..=self.k {
            middle.extend(
                repeat_n(self.alphabet.iter().cloned(), len).multi_cartesian_product(),
            );
        }
        middle
    }
}

impl<I: Symbol, O: Symbol> EquivalenceOracle<I, O> for WMethodOracle<I> {
    fn find_cex<S>(
        &mut self,
        hypothesis: &MealyMachine<I, O>,
        sul: &mut S,
        tree: &mut ObservationTree<I, O>,
        seed: Option<u64>,
    ) -> Result<Option<Vec<I>>, LearningError>
    where
        S: SystemUnderLearning<Input = I, Output = O>,
    {
        let characterization = characterization_set(hypothesis, &self.alphabet)?;
        let access = hypothesis.access_sequences();
        let transition_cover: Vec<Vec<I>> = access
            .values()
            .flat_map(|prefix| {
                self.alphabet.iter().map(|input| {
                    let mut word = prefix.clone();
                    word.push(input.clone());
                    word
                })
            })
            .collect();
        let middle = self.middle_words();

        let mut suite: Vec<Vec<I>> = Vec::new();
        for cover in &transition_cover {
            for mid in &middle {
                for suffix in &characterization {
                    suite.push(
                        cover
                            .iter()
                            .chain(mid)
                            .chain(suffix)
                            .cloned()
                            .collect(),
                    );
                }
            }
        }
        if let Some(seed) = seed {
            suite.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        debug!(
            "running W-method suite of {} words ({} cached)",
            suite.len(),
            self.cache.len()
        );

        for word in suite {
            if self.cache.contains(&word) {
                continue;
            }
            sul.post();
            sul.pre();
            self.resets += 1;

            let mut state = hypothesis.initial();
            let mut outputs = Vec::with_capacity(word.len());
            let mut divergence = None;
            for (idx, input) in word.iter().enumerate() {
                let (hyp_out, next) = hypothesis
                    .transition(state, input)
                    .expect("hypothesis must be complete on its own alphabet");
                let sul_out = sul.step(input);
                self.steps += 1;
                let diverged = hyp_out != &sul_out;
                outputs.push(sul_out);
                if diverged {
                    divergence = Some(idx);
                    break;
                }
                state = next;
            }

            if let Some(idx) = divergence {
                sul.post();
                let cex = word[..=idx].to_vec();
                trace!("suite word diverged, counterexample {:?}", cex);
                return Ok(Some(cex));
            }
            if self.add_to_tree {
                tree.insert_observation(&word, &outputs)?;
            }
            self.cache.insert(word);
        }
        sul.post();
        Ok(None)
    }

    fn stats(&self) -> (usize, usize) {
        (self.resets, self.steps)
    }
}

/// Computes a characterization set for `hypothesis`: a set of input words
/// that pairwise distinguishes all its states. Iterative block refinement:
/// while some block holds two states, find a word distinguishing them and
/// split every block by it and all its suffixes. A single-state hypothesis
/// short-circuits to the single-input words.
fn characterization_set<I: Symbol, O: Symbol>(
    hypothesis: &MealyMachine<I, O>,
    alphabet: &[I],
) -> Result<Vec<Vec<I>>, LearningError> {
    if hypothesis.size() == 1 {
        return Ok(alphabet.iter().map(|input| vec![input.clone()]).collect());
    }

    let mut blocks: Vec<Vec<StateIndex>> = vec![hypothesis.state_indices().collect()];
    let mut char_set: Vec<Vec<I>> = Vec::new();
    while let Some(pos) = blocks.iter().position(|block| block.len() > 1) {
        let (s1, s2) = (blocks[pos][0], blocks[pos][1]);
        let word = hypothesis
            .distinguishing_sequence(s1, s2)
            .ok_or(LearningError::NonCanonicalHypothesis)?;
        // online suffix closure, shortest suffix first
        for start in (0..word.len()).rev() {
            let suffix = word[start..].to_vec();
            if char_set.contains(&suffix) {
                continue;
            }
            blocks = split_blocks(hypothesis, blocks, &suffix);
            char_set.push(suffix);
        }
    }
    Ok(char_set)
}

/// Splits every block into the groups of states that answer the same output
/// word on `suffix`.
fn split_blocks<I: Symbol, O: Symbol>(
    hypothesis: &MealyMachine<I, O>,
    blocks: Vec<Vec<StateIndex>>,
    suffix: &[I],
) -> Vec<Vec<StateIndex>> {
    let mut refined = Vec::with_capacity(blocks.len());
    for block in blocks {
        let mut groups: IndexMap<Vec<O>, Vec<StateIndex>> = IndexMap::new();
        for state in block {
            let answer = hypothesis
                .trace_from(state, suffix)
                .expect("hypothesis must be complete on its own alphabet");
            groups.entry(answer).or_default().push(state);
        }
        refined.extend(groups.into_values());
    }
    refined
}

/// Oracle with perfect knowledge of the system under learning: it holds the
/// reference machine and answers equivalence queries by an exhaustive
/// product search, without touching the system under learning at all.
pub struct PerfectKnowledgeOracle<I, O> {
    reference: MealyMachine<I, O>,
}

impl<I: Symbol, O: Symbol> PerfectKnowledgeOracle<I, O> {
    pub fn new(reference: MealyMachine<I, O>) -> Self {
        Self { reference }
    }
}

impl<I: Symbol, O: Symbol> EquivalenceOracle<I, O> for PerfectKnowledgeOracle<I, O> {
    fn find_cex<S>(
        &mut self,
        hypothesis: &MealyMachine<I, O>,
        _sul: &mut S,
        _tree: &mut ObservationTree<I, O>,
        _seed: Option<u64>,
    ) -> Result<Option<Vec<I>>, LearningError>
    where
        S: SystemUnderLearning<Input = I, Output = O>,
    {
        Ok(hypothesis.witness_inequivalence(&self.reference))
    }
}

#[cfg(test)]
mod tests {
    use super::{EquivalenceOracle, WMethodOracle, characterization_set};
    use crate::tree::ObservationTree;
    use mealy::{MealyMachine, MealySul};

    fn four_states() -> MealyMachine<char, u8> {
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

    #[test]
    fn characterization_set_distinguishes_all_states() {
        let mm = four_states();
        let w = characterization_set(&mm, &['a', 'b']).unwrap();
        for p in mm.state_indices() {
            for q in mm.state_indices().filter(|q| *q > p) {
                assert!(
                    w.iter()
                        .any(|word| mm.trace_from(p, word) != mm.trace_from(q, word)),
                    "states {p} and {q} not distinguished by {w:?}"
                );
            }
        }
    }

    #[test]
    fn recalls_injected_output_flip() {
        let reference = four_states();
        // flip the output of the transition (2, b): 0 becomes 1
        let mutated = MealyMachine::builder()
            .with_transitions([
                (0, 'a', 0, 1),
                (0, 'b', 0, 0),
                (1, 'a', 0, 2),
                (1, 'b', 1, 0),
                (2, 'a', 0, 3),
                (2, 'b', 1, 0),
                (3, 'a', 1, 3),
                (3, 'b', 0, 2),
            ])
            .into_mealy(0);

        let mut sul = MealySul::new(mutated.clone());
        let mut tree = ObservationTree::new(['a', 'b']);
        let mut oracle = WMethodOracle::new(['a', 'b'], 0);
        let cex = oracle
            .find_cex(&reference, &mut sul, &mut tree, None)
            .unwrap()
            .expect("the flipped transition must be caught with k = 0");
        // the counterexample ends in the input whose output was flipped
        assert_eq!(cex.last(), Some(&'b'));
        assert_ne!(reference.trace(&cex), mutated.trace(&cex));
    }

    #[test]
    fn accepts_equivalent_machines_and_caches_suite() {
        let reference = four_states();
        let mut sul = MealySul::new(reference.clone());
        let mut tree = ObservationTree::new(['a', 'b']);
        let mut oracle = WMethodOracle::new(['a', 'b'], 1).with_recorded_tests();
        assert_eq!(
            oracle
                .find_cex(&reference, &mut sul, &mut tree, Some(7))
                .unwrap(),
            None
        );
        let (resets, steps) =
            <WMethodOracle<char> as EquivalenceOracle<char, u8>>::stats(&oracle);
        assert!(resets > 0 && steps > 0);
        // consistent suite words were folded into the tree
        assert!(tree.size() > 1);
        // a second pass skips every cached word
        let steps_before = <WMethodOracle<char> as EquivalenceOracle<char, u8>>::stats(&oracle).1;
        assert_eq!(
            oracle
                .find_cex(&reference, &mut sul, &mut tree, Some(7))
                .unwrap(),
            None
        );
        assert_eq!(
            <WMethodOracle<char> as EquivalenceOracle<char, u8>>::stats(&oracle).1,
            steps_before
        );
    }
}
