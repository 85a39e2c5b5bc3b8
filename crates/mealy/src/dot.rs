//! Import and export of Mealy machines in the Graphviz DOT dialect used by
//! the benchmark model collections: nodes whose name starts with `__start`
//! are phantom sources whose single outgoing edge selects the initial state,
//! and edge labels `a/b` carry input `a` and output `b`. A label without a
//! slash is an input with the empty output.

use std::fmt::Display;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::trace;

use crate::{MealyMachine, MealyState, StateIndex, Symbol};

#[derive(Debug, Error)]
pub enum DotError {
    #[error("malformed edge on line {line}: \"{text}\"")]
    MalformedEdge { line: usize, text: String },
    #[error("transition from \"{state}\" on \"{input}\" redefined with a different output or target")]
    Nondeterministic { state: String, input: String },
    #[error("no transitions found in DOT input")]
    Empty,
}

/// Parses a Mealy machine from DOT source. States appear in the order they
/// are first mentioned; the initial state is the target of the `__start`
/// phantom edge, or the first mentioned state if there is none.
pub fn parse_dot(src: &str) -> Result<MealyMachine<String, String>, DotError> {
    let mut order: IndexMap<String, Vec<(String, String, String)>> = IndexMap::new();
    let mut initial_name: Option<String> = None;

    for (lineno, raw) in src.lines().enumerate() {
        let line = raw.trim().trim_end_matches(';').trim();
        if line.is_empty()
            || line.starts_with("//")
            || line.starts_with('#')
            || line.starts_with('{')
            || line.starts_with('}')
        {
            continue;
        }

        if let Some((lhs, rhs)) = line.split_once("->") {
            let source = unquote(lhs);
            let (target_part, attrs) = match rhs.split_once('[') {
                Some((t, a)) => (t, Some(a)),
                None => (rhs, None),
            };
            let target = unquote(target_part);
            if source.is_empty() || target.is_empty() {
                return Err(DotError::MalformedEdge {
                    line: lineno + 1,
                    text: raw.trim().to_string(),
                });
            }

            if source.starts_with("__start") {
                initial_name.get_or_insert(target);
                continue;
            }

            let label = attrs.and_then(edge_label).ok_or(DotError::MalformedEdge {
                line: lineno + 1,
                text: raw.trim().to_string(),
            })?;
            let (input, output) = match label.split_once('/') {
                Some((i, o)) => (i.to_string(), o.to_string()),
                None => (label, String::new()),
            };

            order.entry(target.clone()).or_default();
            order
                .entry(source)
                .or_default()
                .push((input, output, target));
            continue;
        }

        // plain node declaration: keep the state even if it has no edges
        if let Some(name) = node_name(line) {
            if !name.starts_with("__start") {
                order.entry(name).or_default();
            }
        }
    }

    if order.values().all(|edges| edges.is_empty()) {
        return Err(DotError::Empty);
    }
    trace!("parsed {} states from DOT input", order.len());

    let index_of: IndexMap<&String, StateIndex> = order
        .keys()
        .enumerate()
        .map(|(idx, name)| (name, idx as StateIndex))
        .collect();

    let mut states = Vec::with_capacity(order.len());
    for (name, edges) in &order {
        let mut state = MealyState::new(name.clone());
        let mut seen: IndexMap<&String, (&String, &String)> = IndexMap::new();
        for (input, output, target) in edges {
            if let Some(recorded) = seen.get(input) {
                if recorded != &(output, target) {
                    return Err(DotError::Nondeterministic {
                        state: name.clone(),
                        input: input.clone(),
                    });
                }
                continue;
            }
            seen.insert(input, (output, target));
            state.add_transition(input.clone(), output.clone(), index_of[target]);
        }
        states.push(state);
    }

    let initial = initial_name
        .and_then(|name| index_of.get(&name).copied())
        .unwrap_or(0);
    Ok(MealyMachine::new(initial, states))
}

/// Serializes `machine` in the same dialect [`parse_dot`] reads, including
/// the `__start0` phantom marking the initial state.
pub fn to_dot<I, O>(machine: &MealyMachine<I, O>) -> String
where
    I: Symbol + Display,
    O: Symbol + Display,
{
    let mut out = String::from("digraph g {\n");
    out.push_str("  __start0 [label=\"\" shape=\"none\"];\n");
    for q in machine.state_indices() {
        out.push_str(&format!(
            "  \"{}\" [shape=\"circle\" label=\"{}\"];\n",
            machine.state_name(q),
            machine.state_name(q)
        ));
    }
    out.push_str(&format!(
        "  __start0 -> \"{}\";\n",
        machine.state_name(machine.initial())
    ));
    for q in machine.state_indices() {
        for (input, output, target) in machine.transitions_from(q) {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}/{}\"];\n",
                machine.state_name(q),
                machine.state_name(target),
                input,
                output
            ));
        }
    }
    out.push_str("}\n");
    out
}

fn unquote(part: &str) -> String {
    part.trim().trim_matches('"').to_string()
}

/// Extracts the value of the `label` attribute from the text between `[` and
/// `]` of an edge statement.
fn edge_label(attrs: &str) -> Option<String> {
    let attrs = attrs.trim_end_matches(']');
    let after = attrs.split_once("label=")?.1.trim_start();
    if let Some(rest) = after.strip_prefix('"') {
        rest.split_once('"').map(|(label, _)| label.to_string())
    } else {
        Some(
            after
                .split([',', ' ', ']'])
                .next()
                .unwrap_or_default()
                .to_string(),
        )
    }
}

fn node_name(line: &str) -> Option<String> {
    let name = unquote(line.split(['[', ' ']).next()?);
    let reserved = ["digraph", "graph", "node", "edge"];
    // attribute assignments like rankdir=LR are not node declarations
    if name.is_empty() || name.contains('=') || reserved.contains(&name.as_str()) {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::{DotError, parse_dot, to_dot};

    const SMALL: &str = r#"digraph g {
        __start0 [label="" shape="none"];
        s0 [shape="circle" label="s0"];
        s1 [shape="circle" label="s1"];
        __start0 -> s0;
        s0 -> s1 [label="a/0"];
        s0 -> s0 [label="b/1"];
        s1 -> s0 [label="a/1"];
        s1 -> s1 [label="b/0"];
    }"#;

    #[test]
    fn parses_small_model() {
        let mm = parse_dot(SMALL).unwrap();
        assert_eq!(mm.size(), 2);
        assert_eq!(mm.state_name(mm.initial()), "s0");
        assert_eq!(
            mm.trace(&["a".to_string(), "a".to_string(), "b".to_string()]),
            Some(vec!["0".to_string(), "1".to_string(), "1".to_string()])
        );
    }

    #[test]
    fn label_without_slash_has_empty_output() {
        let src = r#"digraph g {
            __start0 -> q;
            q -> q [label="tick"];
        }"#;
        let mm = parse_dot(src).unwrap();
        assert_eq!(mm.trace(&["tick".to_string()]), Some(vec![String::new()]));
    }

    #[test_log::test]
    fn round_trips_through_dot() {
        let mm = parse_dot(SMALL).unwrap();
        let again = parse_dot(&to_dot(&mm)).unwrap();
        assert_eq!(mm.witness_inequivalence(&again), None);
        assert_eq!(mm.size(), again.size());
    }

    #[test]
    fn rejects_unlabeled_transition() {
        let src = "digraph g {\n  a -> b;\n}";
        assert!(matches!(
            parse_dot(src),
            Err(DotError::MalformedEdge { line: 2, .. })
        ));
    }

    #[test]
    fn rejects_conflicting_duplicate() {
        let src = r#"digraph g {
            s -> s [label="a/0"];
            s -> s [label="a/1"];
        }"#;
        assert!(matches!(parse_dot(src), Err(DotError::Nondeterministic { .. })));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(parse_dot("digraph g { }"), Err(DotError::Empty)));
    }
}
