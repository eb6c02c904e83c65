use ahash::AHashMap;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;

/// Pre-flight structure checks on the raw node/edge definitions, run once
/// at build time (or from an admin-triggered validate call), never per
/// request. `entry` and `terminal` are the start and end markers if the
/// definition has them. Returns a full list of problems rather than
/// stopping at the first one.
pub fn validate_structure(
    node_ids: &[&str],
    edges: &[(&str, &str)],
    entry: Option<&str>,
    terminal: Option<&str>,
) -> Vec<String> {
    let mut errors = Vec::new();

    if entry.is_none() {
        errors.push("graph must have a start node".to_string());
    }
    if terminal.is_none() {
        errors.push("graph must have an end node".to_string());
    }

    let mut indices: AHashMap<&str, NodeIndex> = AHashMap::new();
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    for &id in node_ids {
        indices.entry(id).or_insert_with(|| graph.add_node(id));
    }

    for &(from, to) in edges {
        if !indices.contains_key(from) {
            errors.push(format!("edge references non-existent node: {from}"));
        }
        if !indices.contains_key(to) {
            errors.push(format!("edge references non-existent node: {to}"));
        }
        if let (Some(&a), Some(&b)) = (indices.get(from), indices.get(to)) {
            graph.add_edge(a, b, ());
        }
    }

    if is_cyclic_directed(&graph) {
        errors.push("graph contains cycles which are not supported".to_string());
    }

    if let Some(entry) = entry {
        match indices.get(entry) {
            Some(&start) => {
                let mut reachable = 0usize;
                let mut bfs = Bfs::new(&graph, start);
                while bfs.next(&graph).is_some() {
                    reachable += 1;
                }
                if reachable != node_ids.len() {
                    errors.push(format!(
                        "graph is not fully connected: {reachable} of {} nodes reachable from '{entry}'",
                        node_ids.len()
                    ));
                }
            }
            None => errors.push(format!("entry node not found: {entry}")),
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_linear_chain() {
        let errors = validate_structure(
            &["start", "llm", "end"],
            &[("start", "llm"), ("llm", "end")],
            Some("start"),
            Some("end"),
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn reports_cycle_and_dangling_edge() {
        let errors = validate_structure(
            &["a", "b"],
            &[("a", "b"), ("b", "a"), ("b", "ghost")],
            Some("a"),
            Some("b"),
        );
        assert!(errors.iter().any(|e| e.contains("cycles")));
        assert!(errors.iter().any(|e| e.contains("ghost")));
    }

    #[test]
    fn reports_unreachable_nodes() {
        let errors = validate_structure(
            &["start", "llm", "island"],
            &[("start", "llm")],
            Some("start"),
            Some("llm"),
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not fully connected"));
    }

    #[test]
    fn reports_missing_start_and_end_markers() {
        let errors = validate_structure(&["llm"], &[], None, None);
        assert!(errors.iter().any(|e| e.contains("must have a start node")));
        assert!(errors.iter().any(|e| e.contains("must have an end node")));
    }
}
