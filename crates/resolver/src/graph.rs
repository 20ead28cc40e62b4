//! Dependency graph and install ordering

use std::collections::{HashMap, HashSet};

/// Dependency graph keyed by package name
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    /// Adjacency list (package -> dependencies), in declaration order
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create new empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add node to graph
    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(name.to_string()).or_default();
    }

    /// Add edge from a package to one of its dependencies
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(to);
        let deps = self.edges.entry(from.to_string()).or_default();
        if !deps.iter().any(|d| d == to) {
            deps.push(to.to_string());
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Post-order walk from `roots`: every package after its dependencies
    ///
    /// Cycles are broken at the first revisit, so members of a cycle come
    /// out in discovery order.
    #[must_use]
    pub fn install_order(&self, roots: &[String]) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(self.edges.len());
        for root in roots {
            self.visit(root, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, name: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if !self.contains(name) || !visited.insert(name.to_string()) {
            return;
        }
        if let Some(dependencies) = self.edges.get(name) {
            for dep in dependencies {
                self.visit(dep, visited, order);
            }
        }
        order.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn dependencies_come_first() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("alpine-base", "busybox");
        graph.add_edge("alpine-base", "musl");
        graph.add_edge("busybox", "musl");
        graph.add_edge("zlib", "musl");

        assert_eq!(
            graph.install_order(&names(&["alpine-base", "zlib"])),
            names(&["musl", "busybox", "alpine-base", "zlib"])
        );
    }

    #[test]
    fn cycles_do_not_loop() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");
        graph.add_node("c");

        assert_eq!(graph.install_order(&names(&["a", "c", "missing"])), names(&["b", "a", "c"]));
        assert_eq!(graph.len(), 3);
    }
}
