//! Active learning of deterministic Mealy machines with the L# algorithm.
//!
//! The learner poses input words to a black-box [system under
//! learning](mealy::SystemUnderLearning), folds every response into an
//! [observation tree](tree::ObservationTree), maintains a basis of pairwise
//! [apart](apartness) tree nodes that back the states of a hypothesis
//! machine, and consults an [equivalence oracle](oracle::EquivalenceOracle)
//! for counterexamples until the hypothesis is accepted. Counterexamples are
//! folded back into the tree through a binary search that needs only
//! logarithmically many additional queries.

pub mod ads;
pub mod apartness;
pub mod error;
pub mod learner;
pub mod oracle;
pub mod tree;

pub use error::LearningError;
pub use learner::{ExtensionRule, LSharp, Learned, LearningStats, SeparationRule};
pub use oracle::{EquivalenceOracle, PerfectKnowledgeOracle, WMethodOracle};
pub use tree::{NodeId, ObservationTree};
