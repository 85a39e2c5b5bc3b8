//! The apartness relation between observation-tree nodes. Two nodes are
//! *apart* when some input word is observed below both and the output words
//! diverge; such a word is a *witness*. Apartness is what entitles the
//! learner to treat two nodes as distinct states of the system.

use std::collections::VecDeque;

use mealy::{MealyMachine, Symbol};

use crate::tree::{NodeId, ObservationTree};

/// Decides whether a witness for `n1` and `n2` exists in the tree, by a
/// joint traversal of the inputs observed below both nodes.
pub fn states_are_apart<I: Symbol, O: Symbol>(
    tree: &ObservationTree<I, O>,
    n1: NodeId,
    n2: NodeId,
) -> bool {
    let mut stack = vec![(n1, n2)];
    while let Some((x, y)) = stack.pop() {
        for (input, out_x, succ_x) in tree.observed_edges(x) {
            let Some(out_y) = tree.output_of(y, input) else {
                continue;
            };
            if out_x != out_y {
                return true;
            }
            let succ_y = tree
                .successor_of(y, input)
                .expect("edge with an output always has a child");
            stack.push((succ_x, succ_y));
        }
    }
    false
}

/// Computes the canonical witness showing `n1` and `n2` apart: the shortest
/// input word on which their observed outputs diverge, preferring
/// alphabetically smaller inputs among words of equal length. `None` if the
/// nodes are not (yet) apart.
///
/// The canonical choice makes witnesses reproducible and safe to cache per
/// unordered node pair.
pub fn compute_witness<I: Symbol, O: Symbol>(
    tree: &ObservationTree<I, O>,
    n1: NodeId,
    n2: NodeId,
) -> Option<Vec<I>> {
    let mut queue = VecDeque::from([(n1, n2, Vec::new())]);
    while let Some((x, y, path)) = queue.pop_front() {
        for input in tree.alphabet() {
            let (Some(out_x), Some(out_y)) = (tree.output_of(x, input), tree.output_of(y, input))
            else {
                continue;
            };
            let mut word = path.clone();
            word.push(input.clone());
            if out_x != out_y {
                return Some(word);
            }
            let succ_x = tree.successor_of(x, input).expect("observed edge has a child");
            let succ_y = tree.successor_of(y, input).expect("observed edge has a child");
            queue.push_back((succ_x, succ_y, word));
        }
    }
    None
}

/// Searches the whole tree for an input word on which the observed outputs
/// disagree with the outputs `hypothesis` produces from its initial state.
/// Returns the shortest such word, or `None` when tree and hypothesis agree
/// on every observed trace.
pub fn witness_against_hypothesis<I: Symbol, O: Symbol>(
    tree: &ObservationTree<I, O>,
    hypothesis: &MealyMachine<I, O>,
) -> Option<Vec<I>> {
    let mut queue = VecDeque::from([(tree.root(), hypothesis.initial(), Vec::new())]);
    while let Some((node, state, path)) = queue.pop_front() {
        for input in tree.alphabet() {
            let Some(tree_out) = tree.output_of(node, input) else {
                continue;
            };
            let mut word = path.clone();
            word.push(input.clone());
            match hypothesis.transition(state, input) {
                Some((hyp_out, next_state)) if hyp_out == tree_out => {
                    let child = tree.successor_of(node, input).expect("observed edge has a child");
                    queue.push_back((child, next_state, word));
                }
                // missing transitions count as divergence just like wrong outputs
                _ => return Some(word),
            }
        }
    }
    None
}
