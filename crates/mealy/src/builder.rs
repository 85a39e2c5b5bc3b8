use indexmap::IndexMap;

use crate::{MealyMachine, MealyState, StateIndex, Symbol};

/// Helper for assembling a [`MealyMachine`] from a list of transition tuples.
/// States are numbered densely from zero; a tuple `(q, i, o, p)` adds the
/// transition reading `i` in state `q`, emitting `o` and moving to `p`.
///
/// # Example
///
/// ```
/// use mealy::MealyMachine;
///
/// let mm = MealyMachine::builder()
///     .with_transitions([(0, 'a', 0, 1), (0, 'b', 1, 0), (1, 'a', 1, 0), (1, 'b', 0, 1)])
///     .into_mealy(0);
/// assert_eq!(mm.size(), 2);
/// assert_eq!(mm.trace(&['a', 'a']), Some(vec![0, 1]));
/// ```
pub struct MealyBuilder<I, O> {
    edges: Vec<(usize, I, O, usize)>,
}

impl<I, O> Default for MealyBuilder<I, O> {
    fn default() -> Self {
        Self { edges: Vec::new() }
    }
}

impl<I: Symbol, O: Symbol> MealyBuilder<I, O> {
    /// Adds a list of transitions. The transitions are added in the order in
    /// which they are given.
    pub fn with_transitions<T: IntoIterator<Item = (usize, I, O, usize)>>(
        mut self,
        iter: T,
    ) -> Self {
        self.edges.extend(iter);
        self
    }

    /// Builds the machine with `initial` as the designated initial state.
    /// States are named `s0`, `s1`, … after their index.
    ///
    /// Panics if the transitions are non-deterministic (two tuples with the
    /// same source and input but different output or target) or if `initial`
    /// is not a known state.
    pub fn into_mealy(self, initial: usize) -> MealyMachine<I, O> {
        let num_states = self
            .edges
            .iter()
            .flat_map(|(q, _, _, p)| [*q, *p])
            .max()
            .map_or(0, |m| m + 1)
            .max(initial + 1);

        let mut tables: Vec<IndexMap<I, (O, StateIndex)>> = vec![IndexMap::new(); num_states];
        for (q, input, output, p) in self.edges {
            let entry = (output, p as StateIndex);
            if let Some(existing) = tables[q].get(&input) {
                assert!(
                    existing == &entry,
                    "non-deterministic transition from {q} on {input:?}"
                );
                continue;
            }
            tables[q].insert(input, entry);
        }

        let states = tables
            .into_iter()
            .enumerate()
            .map(|(idx, transitions)| {
                let mut state = MealyState::new(format!("s{idx}"));
                for (input, (output, target)) in transitions {
                    state.add_transition(input, output, target);
                }
                state
            })
            .collect();
        MealyMachine::new(initial as StateIndex, states)
    }
}

#[cfg(test)]
mod tests {
    use crate::MealyMachine;

    #[test]
    fn builds_named_states() {
        let mm = MealyMachine::builder()
            .with_transitions([(0, 'a', 1u8, 1), (1, 'a', 0, 0)])
            .into_mealy(0);
        assert_eq!(mm.state_name(0), "s0");
        assert_eq!(mm.state_name(1), "s1");
        assert_eq!(mm.input_alphabet(), vec!['a']);
    }

    #[test]
    #[should_panic(expected = "non-deterministic")]
    fn rejects_duplicate_edges() {
        MealyMachine::<char, u8>::builder()
            .with_transitions([(0, 'a', 0, 0), (0, 'a', 1, 0)])
            .into_mealy(0);
    }
}
