use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

use indexmap::IndexMap;
use itertools::Itertools;

/// Trait bound collecting everything we require of an input or output symbol.
/// It is blanket-implemented, so `char`, integers, `&'static str` and `String`
/// all qualify out of the box.
pub trait Symbol: Clone + Eq + Hash + Ord + Debug {}
impl<S: Clone + Eq + Hash + Ord + Debug> Symbol for S {}

/// States are addressed by plain scalar indices into the machine's state list.
pub type StateIndex = u32;

/// A single state of a [`MealyMachine`]: a display name and the transition
/// table mapping each input to the produced output and the successor state.
pub struct MealyState<I, O> {
    name: String,
    transitions: IndexMap<I, (O, StateIndex)>,
}

impl<I: Symbol, O: Symbol> Clone for MealyState<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            transitions: self.transitions.clone(),
        }
    }
}

impl<I: Symbol, O: Symbol> Debug for MealyState<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MealyState")
            .field("name", &self.name)
            .field("transitions", &self.transitions)
            .finish()
    }
}

impl<I: Symbol, O: Symbol> PartialEq for MealyState<I, O> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.transitions == other.transitions
    }
}

impl<I: Symbol, O: Symbol> Eq for MealyState<I, O> {}

impl<I: Symbol, O: Symbol> MealyState<I, O> {
    /// Creates a state with the given display name and no transitions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transitions: IndexMap::new(),
        }
    }

    /// Records that reading `input` in this state emits `output` and moves to
    /// `target`. An existing entry for `input` is overwritten.
    pub fn add_transition(&mut self, input: I, output: O, target: StateIndex) {
        self.transitions.insert(input, (output, target));
    }

    /// The display name of the state.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A deterministic Mealy machine: a designated initial state and a list of
/// states, each carrying its own transition table. Machines need not be
/// complete; operations that run input words return `None` when they fall off
/// a missing transition.
pub struct MealyMachine<I, O> {
    initial: StateIndex,
    states: Vec<MealyState<I, O>>,
}

impl<I: Symbol, O: Symbol> Clone for MealyMachine<I, O> {
    fn clone(&self) -> Self {
        Self {
            initial: self.initial,
            states: self.states.clone(),
        }
    }
}

impl<I: Symbol, O: Symbol> MealyMachine<I, O> {
    /// Creates a machine from its parts. Panics if `initial` is out of range.
    pub fn new(initial: StateIndex, states: Vec<MealyState<I, O>>) -> Self {
        assert!(
            (initial as usize) < states.len(),
            "initial state {initial} out of range for {} states",
            states.len()
        );
        Self { initial, states }
    }

    /// Returns a [`MealyBuilder`](crate::MealyBuilder) for assembling a
    /// machine from a list of transition tuples.
    pub fn builder() -> crate::MealyBuilder<I, O> {
        crate::MealyBuilder::default()
    }

    /// The number of states.
    pub fn size(&self) -> usize {
        self.states.len()
    }

    /// The designated initial state.
    pub fn initial(&self) -> StateIndex {
        self.initial
    }

    /// Iterates over all state indices in order.
    pub fn state_indices(&self) -> impl Iterator<Item = StateIndex> + use<I, O> {
        0..self.states.len() as StateIndex
    }

    /// The display name of state `q`. Panics if `q` is out of range.
    pub fn state_name(&self, q: StateIndex) -> &str {
        self.states[q as usize].name()
    }

    /// All inputs appearing on some transition, sorted and deduplicated.
    pub fn input_alphabet(&self) -> Vec<I> {
        let mut inputs: Vec<I> = self
            .states
            .iter()
            .flat_map(|s| s.transitions.keys().cloned())
            .collect();
        inputs.sort();
        inputs.dedup();
        inputs
    }

    /// The output and successor for reading `input` in state `q`, if defined.
    pub fn transition(&self, q: StateIndex, input: &I) -> Option<(&O, StateIndex)> {
        self.states[q as usize]
            .transitions
            .get(input)
            .map(|(o, p)| (o, *p))
    }

    /// The output emitted when reading `input` in state `q`, if defined.
    pub fn output(&self, q: StateIndex, input: &I) -> Option<&O> {
        self.transition(q, input).map(|(o, _)| o)
    }

    /// The state reached by reading `input` in state `q`, if defined.
    pub fn successor(&self, q: StateIndex, input: &I) -> Option<StateIndex> {
        self.transition(q, input).map(|(_, p)| p)
    }

    /// Iterates over the transitions leaving `q` as `(input, output, target)`.
    pub fn transitions_from(&self, q: StateIndex) -> impl Iterator<Item = (&I, &O, StateIndex)> {
        self.states[q as usize]
            .transitions
            .iter()
            .map(|(i, (o, p))| (i, o, *p))
    }

    /// Runs `word` from state `q` and returns the state reached, or `None` if
    /// some transition along the way is missing.
    pub fn reached_from<'w>(
        &self,
        q: StateIndex,
        word: impl IntoIterator<Item = &'w I>,
    ) -> Option<StateIndex>
    where
        I: 'w,
    {
        let mut current = q;
        for input in word {
            current = self.successor(current, input)?;
        }
        Some(current)
    }

    /// Runs `word` from the initial state and returns the state reached.
    pub fn reached<'w>(&self, word: impl IntoIterator<Item = &'w I>) -> Option<StateIndex>
    where
        I: 'w,
    {
        self.reached_from(self.initial, word)
    }

    /// The output word produced by reading `word` from state `q`, or `None`
    /// if the machine is incomplete on it.
    pub fn trace_from<'w>(
        &self,
        q: StateIndex,
        word: impl IntoIterator<Item = &'w I>,
    ) -> Option<Vec<O>>
    where
        I: 'w,
    {
        let mut current = q;
        let mut outputs = Vec::new();
        for input in word {
            let (output, next) = self.transition(current, input)?;
            outputs.push(output.clone());
            current = next;
        }
        Some(outputs)
    }

    /// The output word produced by reading `word` from the initial state.
    pub fn trace<'w>(&self, word: impl IntoIterator<Item = &'w I>) -> Option<Vec<O>>
    where
        I: 'w,
    {
        self.trace_from(self.initial, word)
    }

    /// Computes a shortest access sequence for every state reachable from the
    /// initial state, in BFS discovery order. Unreachable states are absent
    /// from the result.
    pub fn access_sequences(&self) -> IndexMap<StateIndex, Vec<I>> {
        let mut access = IndexMap::new();
        access.insert(self.initial, Vec::new());
        let mut queue = VecDeque::from([self.initial]);
        while let Some(q) = queue.pop_front() {
            let prefix = access[&q].clone();
            for (input, _, target) in self.transitions_from(q) {
                if access.contains_key(&target) {
                    continue;
                }
                let mut seq = prefix.clone();
                seq.push(input.clone());
                access.insert(target, seq);
                queue.push_back(target);
            }
        }
        access
    }

    /// Finds a shortest input word on which the states `p` and `q` produce
    /// different output words, preferring alphabetically smaller inputs among
    /// words of equal length. Returns `None` iff `p` and `q` are equivalent.
    pub fn distinguishing_sequence(&self, p: StateIndex, q: StateIndex) -> Option<Vec<I>> {
        if p == q {
            return None;
        }
        let alphabet = self.input_alphabet();
        let mut seen = HashSet::from([(p, q)]);
        let mut queue = VecDeque::from([(p, q, Vec::new())]);
        while let Some((x, y, path)) = queue.pop_front() {
            for input in &alphabet {
                match (self.transition(x, input), self.transition(y, input)) {
                    (Some((ox, xx)), Some((oy, yy))) => {
                        let mut word = path.clone();
                        word.push(input.clone());
                        if ox != oy {
                            return Some(word);
                        }
                        if seen.insert((xx, yy)) {
                            queue.push_back((xx, yy, word));
                        }
                    }
                    (None, None) => {}
                    // one-sided definedness already separates the states
                    _ => {
                        let mut word = path.clone();
                        word.push(input.clone());
                        return Some(word);
                    }
                }
            }
        }
        None
    }

    /// Searches for a shortest input word on which `self` and `other`
    /// disagree, starting both from their initial states. Returns `None` iff
    /// the machines are equivalent on all input words.
    pub fn witness_inequivalence(&self, other: &MealyMachine<I, O>) -> Option<Vec<I>> {
        let mut alphabet = self.input_alphabet();
        alphabet.extend(other.input_alphabet());
        alphabet.sort();
        alphabet.dedup();

        let mut seen = HashSet::from([(self.initial, other.initial)]);
        let mut queue = VecDeque::from([(self.initial, other.initial, Vec::new())]);
        while let Some((p, q, path)) = queue.pop_front() {
            for input in &alphabet {
                match (self.transition(p, input), other.transition(q, input)) {
                    (Some((o1, p2)), Some((o2, q2))) => {
                        let mut word = path.clone();
                        word.push(input.clone());
                        if o1 != o2 {
                            return Some(word);
                        }
                        if seen.insert((p2, q2)) {
                            queue.push_back((p2, q2, word));
                        }
                    }
                    (None, None) => {}
                    _ => {
                        let mut word = path.clone();
                        word.push(input.clone());
                        return Some(word);
                    }
                }
            }
        }
        None
    }
}

impl<I: Symbol, O: Symbol> Debug for MealyMachine<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "MealyMachine[initial {}]", self.initial)?;
        for (idx, state) in self.states.iter().enumerate() {
            writeln!(
                f,
                "  {} ({}): {}",
                idx,
                state.name,
                state
                    .transitions
                    .iter()
                    .map(|(i, (o, p))| format!("{i:?}/{o:?} -> {p}"))
                    .join(", ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::MealyMachine;

    fn toggle() -> MealyMachine<char, u8> {
        MealyMachine::builder()
            .with_transitions([(0, 'a', 0, 1), (1, 'a', 1, 0)])
            .into_mealy(0)
    }

    #[test]
    fn traces_and_reachability() {
        let mm = toggle();
        assert_eq!(mm.trace(&['a', 'a', 'a']), Some(vec![0, 1, 0]));
        assert_eq!(mm.reached(&['a']), Some(1));
        assert_eq!(mm.reached(&['a', 'a']), Some(0));
    }

    #[test]
    fn access_sequences_are_shortest() {
        let mm = MealyMachine::builder()
            .with_transitions([
                (0, 'a', 0, 1),
                (0, 'b', 0, 0),
                (1, 'a', 0, 2),
                (1, 'b', 1, 0),
                (2, 'a', 1, 2),
                (2, 'b', 0, 0),
            ])
            .into_mealy(0);
        let access = mm.access_sequences();
        assert_eq!(access[&0], Vec::<char>::new());
        assert_eq!(access[&1], vec!['a']);
        assert_eq!(access[&2], vec!['a', 'a']);
    }

    #[test]
    fn distinguishing_sequences() {
        let mm = toggle();
        assert_eq!(mm.distinguishing_sequence(0, 1), Some(vec!['a']));
        assert_eq!(mm.distinguishing_sequence(0, 0), None);
    }

    #[test]
    fn inequivalence_witness() {
        let mm = toggle();
        let flat = MealyMachine::builder()
            .with_transitions([(0, 'a', 0, 0)])
            .into_mealy(0);
        // flat answers 0 forever, the toggle flips on the second a
        assert_eq!(mm.witness_inequivalence(&flat), Some(vec!['a', 'a']));
        assert_eq!(mm.witness_inequivalence(&mm.clone()), None);
    }
}
