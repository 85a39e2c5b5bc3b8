use indexmap::IndexMap;
use mealy::Symbol;

use crate::LearningError;

/// Tree nodes are addressed by their index into the arena owned by the
/// [`ObservationTree`]. Identity is stable: nodes are created on first
/// observation and never deleted.
pub type NodeId = u32;

struct Node<I, O> {
    parent: Option<(NodeId, I)>,
    successors: IndexMap<I, (O, NodeId)>,
}

impl<I: Symbol, O: Symbol> Clone for Node<I, O> {
    fn clone(&self) -> Self {
        Self {
            parent: self.parent.clone(),
            successors: self.successors.clone(),
        }
    }
}

impl<I: Symbol, O: Symbol> std::fmt::Debug for Node<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("parent", &self.parent)
            .field("successors", &self.successors)
            .finish()
    }
}

impl<I, O> Node<I, O> {
    fn new(parent: Option<(NodeId, I)>) -> Self {
        Self {
            parent,
            successors: IndexMap::new(),
        }
    }
}

/// The prefix tree of all input/output observations made so far. Every path
/// from the root is the prefix of some word that was actually run on the
/// system under learning; the output on each edge is fixed by the first
/// observation and later observations must agree with it.
///
/// Children are strongly owned by the arena, parent links are plain
/// back-references, and the id counter is the arena length, so it is scoped
/// to this tree instance.
pub struct ObservationTree<I, O> {
    alphabet: Vec<I>,
    nodes: Vec<Node<I, O>>,
}

impl<I: Symbol, O: Symbol> Clone for ObservationTree<I, O> {
    fn clone(&self) -> Self {
        Self {
            alphabet: self.alphabet.clone(),
            nodes: self.nodes.clone(),
        }
    }
}

impl<I: Symbol, O: Symbol> std::fmt::Debug for ObservationTree<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationTree")
            .field("alphabet", &self.alphabet)
            .field("nodes", &self.nodes)
            .finish()
    }
}

impl<I: Symbol, O: Symbol> ObservationTree<I, O> {
    /// Creates a tree holding only the root, over the given input alphabet.
    pub fn new(alphabet: impl IntoIterator<Item = I>) -> Self {
        let mut alphabet: Vec<I> = alphabet.into_iter().collect();
        alphabet.sort();
        alphabet.dedup();
        Self {
            alphabet,
            nodes: vec![Node::new(None)],
        }
    }

    /// The root node, representing the empty word.
    pub fn root(&self) -> NodeId {
        0
    }

    /// The number of nodes in the tree.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// The input alphabet, sorted.
    pub fn alphabet(&self) -> &[I] {
        &self.alphabet
    }

    /// The output recorded for reading `input` at `node`, if observed.
    pub fn output_of(&self, node: NodeId, input: &I) -> Option<&O> {
        self.nodes[node as usize]
            .successors
            .get(input)
            .map(|(o, _)| o)
    }

    /// The child reached by reading `input` at `node`, if observed.
    pub fn successor_of(&self, node: NodeId, input: &I) -> Option<NodeId> {
        self.nodes[node as usize]
            .successors
            .get(input)
            .map(|(_, p)| *p)
    }

    /// Iterates over the observed edges of `node` as
    /// `(input, output, child)`, in first-observation order.
    pub fn observed_edges(&self, node: NodeId) -> impl Iterator<Item = (&I, &O, NodeId)> {
        self.nodes[node as usize]
            .successors
            .iter()
            .map(|(i, (o, p))| (i, o, *p))
    }

    /// Extends `node` with a single observation and returns the child. If the
    /// edge already exists the recorded output must match, otherwise the
    /// system under learning contradicted itself and
    /// [`OutputMismatch`](LearningError::OutputMismatch) is raised.
    pub fn extend(&mut self, node: NodeId, input: &I, output: &O) -> Result<NodeId, LearningError> {
        if let Some((recorded, child)) = self.nodes[node as usize].successors.get(input) {
            if recorded != output {
                return Err(LearningError::OutputMismatch {
                    input: format!("{input:?}"),
                    recorded: format!("{recorded:?}"),
                    observed: format!("{output:?}"),
                });
            }
            return Ok(*child);
        }
        let child = self.nodes.len() as NodeId;
        self.nodes.push(Node::new(Some((node, input.clone()))));
        self.nodes[node as usize]
            .successors
            .insert(input.clone(), (output.clone(), child));
        Ok(child)
    }

    /// Inserts a full observation, walking from the root and extending or
    /// following edges. Inputs are validated against the alphabet.
    pub fn insert_observation(&mut self, inputs: &[I], outputs: &[O]) -> Result<(), LearningError> {
        if inputs.len() != outputs.len() {
            return Err(LearningError::LengthMismatch {
                inputs: inputs.len(),
                outputs: outputs.len(),
            });
        }
        self.validate(inputs)?;
        let mut current = self.root();
        for (input, output) in inputs.iter().zip(outputs) {
            current = self.extend(current, input, output)?;
        }
        Ok(())
    }

    /// Reads the output word for `inputs` off the tree, or `None` if the
    /// path is not (entirely) observed.
    pub fn observation(&self, inputs: &[I]) -> Option<Vec<O>> {
        let mut current = self.root();
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let (output, child) = self.nodes[current as usize].successors.get(input)?;
            outputs.push(output.clone());
            current = *child;
        }
        Some(outputs)
    }

    /// The node reached from the root by `inputs`, if the path is observed.
    pub fn node_at(&self, inputs: &[I]) -> Option<NodeId> {
        self.successor_from(self.root(), inputs)
    }

    /// The node reached from `node` by `inputs`, if the path is observed.
    pub fn successor_from(&self, node: NodeId, inputs: &[I]) -> Option<NodeId> {
        let mut current = node;
        for input in inputs {
            current = self.successor_of(current, input)?;
        }
        Some(current)
    }

    /// The input word leading from the root to `node`.
    pub fn access_sequence(&self, node: NodeId) -> Vec<I> {
        self.transfer_sequence(self.root(), node)
            .expect("every node lies below the root")
    }

    /// The unique input word leading from `from` down to `to`, found by
    /// following parent links upward. `None` if `to` does not lie in the
    /// subtree rooted at `from`.
    pub fn transfer_sequence(&self, from: NodeId, to: NodeId) -> Option<Vec<I>> {
        let mut word = Vec::new();
        let mut current = to;
        while current != from {
            let (parent, input) = self.nodes[current as usize].parent.as_ref()?;
            word.push(input.clone());
            current = *parent;
        }
        word.reverse();
        Some(word)
    }

    fn validate(&self, inputs: &[I]) -> Result<(), LearningError> {
        for input in inputs {
            if self.alphabet.binary_search(input).is_err() {
                return Err(LearningError::InvalidInput(format!("{input:?}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ObservationTree;
    use crate::LearningError;

    fn tree() -> ObservationTree<char, u8> {
        ObservationTree::new(['a', 'b'])
    }

    #[test]
    fn observations_round_trip() {
        let mut t = tree();
        t.insert_observation(&['a', 'b', 'a'], &[0, 1, 0]).unwrap();
        assert_eq!(t.observation(&['a', 'b', 'a']), Some(vec![0, 1, 0]));
        assert_eq!(t.observation(&['a', 'b']), Some(vec![0, 1]));
        assert_eq!(t.observation(&['b']), None);
        assert_eq!(t.size(), 4);
    }

    #[test]
    fn conflicting_output_is_rejected() {
        let mut t = tree();
        t.insert_observation(&['a'], &[0]).unwrap();
        assert!(matches!(
            t.insert_observation(&['a'], &[1]),
            Err(LearningError::OutputMismatch { .. })
        ));
        // the agreeing observation still goes through
        t.insert_observation(&['a', 'a'], &[0, 1]).unwrap();
    }

    #[test]
    fn rejects_foreign_symbols_and_ragged_words() {
        let mut t = tree();
        assert!(matches!(
            t.insert_observation(&['c'], &[0]),
            Err(LearningError::InvalidInput(_))
        ));
        assert!(matches!(
            t.insert_observation(&['a'], &[]),
            Err(LearningError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn transfer_sequences_reconstruct_paths() {
        let mut t = tree();
        t.insert_observation(&['a', 'a', 'b'], &[0, 0, 1]).unwrap();
        t.insert_observation(&['b'], &[1]).unwrap();
        let deep = t.node_at(&['a', 'a', 'b']).unwrap();
        let mid = t.node_at(&['a']).unwrap();
        let sibling = t.node_at(&['b']).unwrap();

        assert_eq!(t.access_sequence(deep), vec!['a', 'a', 'b']);
        assert_eq!(t.transfer_sequence(mid, deep), Some(vec!['a', 'b']));
        assert_eq!(t.transfer_sequence(deep, deep), Some(vec![]));
        // sibling subtrees are not connected downward
        assert_eq!(t.transfer_sequence(sibling, deep), None);
    }
}
