//! Attack path search
//!
//! Unweighted breadth-first search over outgoing edges. Neighbours are
//! expanded in edge insertion order so results are deterministic.

use std::collections::VecDeque;

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::topology::Topology;
use crate::error::ScanError;
use crate::models::Endpoint;

/// One shortest path from `start` to `end`; empty when none exists
pub fn shortest_path(topology: &Topology, start: &str, end: &str) -> Result<Vec<Endpoint>, ScanError> {
    Ok(all_shortest_paths(topology, start, end, 1)?
        .into_iter()
        .next()
        .unwrap_or_default())
}

/// Every shortest path from `start` to `end`, at most `limit` of them.
///
/// `NodeNotFound` if either node is absent; no route yields an empty list.
pub fn all_shortest_paths(
    topology: &Topology,
    start: &str,
    end: &str,
    limit: usize,
) -> Result<Vec<Vec<Endpoint>>, ScanError> {
    let source = topology
        .node(start)
        .ok_or_else(|| ScanError::NodeNotFound(start.to_string()))?;
    let target = topology
        .node(end)
        .ok_or_else(|| ScanError::NodeNotFound(end.to_string()))?;

    if limit == 0 {
        return Ok(Vec::new());
    }
    if source == target {
        return Ok(vec![vec![start.to_string()]]);
    }

    let graph = &topology.graph;
    let mut dist: Vec<Option<usize>> = vec![None; graph.node_count()];
    let mut preds: Vec<Vec<NodeIndex>> = vec![Vec::new(); graph.node_count()];
    let mut queue = VecDeque::from([source]);
    dist[source.index()] = Some(0);

    while let Some(node) = queue.pop_front() {
        let d = dist[node.index()].unwrap_or(0);

        // Everything at the target's depth is already discovered
        if dist[target.index()].is_some_and(|t| d >= t) {
            break;
        }

        let mut out: Vec<(EdgeIndex, NodeIndex)> = graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        out.sort_by_key(|(id, _)| *id);

        for (_, next) in out {
            match dist[next.index()] {
                None => {
                    dist[next.index()] = Some(d + 1);
                    preds[next.index()].push(node);
                    queue.push_back(next);
                }
                Some(nd) if nd == d + 1 && !preds[next.index()].contains(&node) => {
                    preds[next.index()].push(node);
                }
                _ => {}
            }
        }
    }

    if dist[target.index()].is_none() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    let mut suffix = vec![target];
    unwind(source, &preds, &mut suffix, &mut paths, limit);

    Ok(paths
        .into_iter()
        .map(|path| path.into_iter().map(|idx| graph[idx].clone()).collect())
        .collect())
}

/// Walk predecessor lists back to `source`; `suffix` holds the path reversed
fn unwind(
    source: NodeIndex,
    preds: &[Vec<NodeIndex>],
    suffix: &mut Vec<NodeIndex>,
    out: &mut Vec<Vec<NodeIndex>>,
    limit: usize,
) {
    if out.len() >= limit {
        return;
    }

    let head = suffix[suffix.len() - 1];
    if head == source {
        out.push(suffix.iter().rev().copied().collect());
        return;
    }

    for &prev in &preds[head.index()] {
        suffix.push(prev);
        unwind(source, preds, suffix, out, limit);
        suffix.pop();
        if out.len() >= limit {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Connection;

    fn build(endpoints: &[&str], edges: &[(&str, &str)]) -> Topology {
        let endpoints: Vec<Endpoint> = endpoints.iter().map(|s| s.to_string()).collect();
        let connections: Vec<Connection> = edges.iter().map(|(a, b)| Connection::new(*a, *b)).collect();
        Topology::build(&endpoints, &connections)
    }

    #[test]
    fn test_chain() {
        let topology = build(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        assert_eq!(shortest_path(&topology, "a", "c").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_disconnected_is_empty() {
        let topology = build(&["a", "b"], &[]);
        assert!(shortest_path(&topology, "a", "b").unwrap().is_empty());
        assert!(all_shortest_paths(&topology, "a", "b", 8).unwrap().is_empty());
    }

    #[test]
    fn test_edges_are_directed() {
        let topology = build(&["a", "b"], &[("b", "a")]);
        assert!(shortest_path(&topology, "a", "b").unwrap().is_empty());
    }

    #[test]
    fn test_self_path() {
        let topology = build(&["a"], &[]);
        assert_eq!(shortest_path(&topology, "a", "a").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_missing_node() {
        let topology = build(&["a"], &[]);
        let err = shortest_path(&topology, "a", "z").unwrap_err();
        assert!(matches!(err, ScanError::NodeNotFound(ref n) if n == "z"));

        let empty = Topology::build(&[], &[]);
        assert!(shortest_path(&empty, "a", "a").is_err());
    }

    #[test]
    fn test_all_shortest_paths_diamond() {
        let topology = build(
            &["s", "x", "y", "t"],
            &[("s", "x"), ("s", "y"), ("x", "t"), ("y", "t"), ("s", "t")],
        );
        // Direct edge wins
        assert_eq!(all_shortest_paths(&topology, "s", "t", 8).unwrap(), vec![vec!["s", "t"]]);

        let topology = build(&["s", "x", "y", "t"], &[("s", "x"), ("s", "y"), ("x", "t"), ("y", "t")]);
        let paths = all_shortest_paths(&topology, "s", "t", 8).unwrap();
        assert_eq!(paths, vec![vec!["s", "x", "t"], vec!["s", "y", "t"]]);

        assert_eq!(all_shortest_paths(&topology, "s", "t", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_cycle_and_parallel_edges() {
        let topology = build(
            &["a", "b", "c"],
            &[("a", "b"), ("a", "b"), ("b", "a"), ("b", "c"), ("c", "a")],
        );
        assert_eq!(all_shortest_paths(&topology, "a", "c", 8).unwrap(), vec![vec!["a", "b", "c"]]);
    }
}
