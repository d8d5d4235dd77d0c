//! Endpoint topology graph
//!
//! Nodes and edges enumerate in insertion order. Connections that reference an
//! endpoint not in the declared list register it as a node on first sight.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::models::{Connection, Endpoint, NetworkSummary};

#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub(crate) graph: DiGraph<Endpoint, ()>,
    index: HashMap<Endpoint, NodeIndex>,
}

impl Topology {
    /// Build from declared endpoints and connections. Never fails.
    pub fn build(endpoints: &[Endpoint], connections: &[Connection]) -> Self {
        let mut topology = Self::default();

        for endpoint in endpoints {
            topology.ensure_node(endpoint);
        }

        for conn in connections {
            let source = topology.ensure_node(conn.source());
            let target = topology.ensure_node(conn.target());
            topology.graph.add_edge(source, target, ());
        }

        topology
    }

    fn ensure_node(&mut self, endpoint: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(endpoint) {
            return *idx;
        }
        let idx = self.graph.add_node(endpoint.to_string());
        self.index.insert(endpoint.to_string(), idx);
        idx
    }

    pub fn node(&self, endpoint: &str) -> Option<NodeIndex> {
        self.index.get(endpoint).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> Vec<Endpoint> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    pub fn edges(&self) -> Vec<Connection> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| Connection::new(self.graph[a].clone(), self.graph[b].clone()))
            .collect()
    }

    /// In + out edge count; 0 for unknown endpoints
    pub fn degree(&self, endpoint: &str) -> usize {
        self.node(endpoint)
            .map(|idx| {
                self.graph.edges_directed(idx, Direction::Outgoing).count()
                    + self.graph.edges_directed(idx, Direction::Incoming).count()
            })
            .unwrap_or(0)
    }

    pub fn summary(&self, synthesized: bool) -> NetworkSummary {
        NetworkSummary {
            nodes: self.nodes(),
            edges: self.edges(),
            synthesized,
        }
    }
}
