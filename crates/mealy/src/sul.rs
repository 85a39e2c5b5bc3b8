use crate::{MealyMachine, StateIndex, Symbol};

/// The black-box interface a learner drives: a session is opened with
/// [`pre`](Self::pre), advanced one input at a time with
/// [`step`](Self::step) and closed with [`post`](Self::post). Successive
/// steps within one session produce the outputs of the system from its
/// current state; `pre` re-establishes the initial state.
pub trait SystemUnderLearning {
    type Input: Symbol;
    type Output: Symbol;

    /// Begins a session, putting the system into its initial state.
    fn pre(&mut self);

    /// Ends the current session.
    fn post(&mut self);

    /// Advances the system by one input and returns the produced output.
    fn step(&mut self, input: &Self::Input) -> Self::Output;

    /// Runs a whole input word in a fresh session and returns the output
    /// word; its length equals the length of `inputs`.
    fn query(&mut self, inputs: &[Self::Input]) -> Vec<Self::Output> {
        self.pre();
        let outputs = inputs.iter().map(|input| self.step(input)).collect();
        self.post();
        outputs
    }
}

/// Reference simulator: a [`SystemUnderLearning`] backed by a complete
/// [`MealyMachine`], with query and step counters.
pub struct MealySul<I, O> {
    machine: MealyMachine<I, O>,
    current: StateIndex,
    num_queries: usize,
    num_steps: usize,
}

impl<I: Symbol, O: Symbol> Clone for MealySul<I, O> {
    fn clone(&self) -> Self {
        Self {
            machine: self.machine.clone(),
            current: self.current,
            num_queries: self.num_queries,
            num_steps: self.num_steps,
        }
    }
}

impl<I: Symbol, O: Symbol> std::fmt::Debug for MealySul<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MealySul")
            .field("machine", &self.machine)
            .field("current", &self.current)
            .field("num_queries", &self.num_queries)
            .field("num_steps", &self.num_steps)
            .finish()
    }
}

impl<I: Symbol, O: Symbol> MealySul<I, O> {
    pub fn new(machine: MealyMachine<I, O>) -> Self {
        let current = machine.initial();
        Self {
            machine,
            current,
            num_queries: 0,
            num_steps: 0,
        }
    }

    /// The machine backing the simulator.
    pub fn machine(&self) -> &MealyMachine<I, O> {
        &self.machine
    }

    /// Number of sessions opened so far.
    pub fn num_queries(&self) -> usize {
        self.num_queries
    }

    /// Number of individual steps taken so far.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }
}

impl<I: Symbol, O: Symbol> SystemUnderLearning for MealySul<I, O> {
    type Input = I;
    type Output = O;

    fn pre(&mut self) {
        self.current = self.machine.initial();
        self.num_queries += 1;
    }

    fn post(&mut self) {}

    fn step(&mut self, input: &I) -> O {
        let Some((output, next)) = self.machine.transition(self.current, input) else {
            panic!(
                "machine is not complete: no transition on {input:?} in state {}",
                self.current
            );
        };
        self.num_steps += 1;
        let output = output.clone();
        self.current = next;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::{MealySul, SystemUnderLearning};
    use crate::MealyMachine;

    #[test]
    fn query_resets_between_sessions() {
        let mm = MealyMachine::builder()
            .with_transitions([(0, 'a', 0u8, 1), (1, 'a', 1, 0)])
            .into_mealy(0);
        let mut sul = MealySul::new(mm);
        assert_eq!(sul.query(&['a', 'a']), vec![0, 1]);
        // fresh session starts over from the initial state
        assert_eq!(sul.query(&['a']), vec![0]);
        assert_eq!(sul.num_queries(), 2);
        assert_eq!(sul.num_steps(), 3);
    }
}
