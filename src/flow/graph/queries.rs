//! Structural queries over a node/edge set
//!
//! All functions are pure. Edges whose endpoint is missing from `nodes`
//! (dangling references left behind by deleted nodes) are ignored.

use std::collections::HashSet;

use super::types::{Edge, Graph, Node};

/// Distinct target nodes of edges leaving `node`, in edge order
pub fn outgoers<'a>(node: &Node, nodes: &'a [Node], edges: &[Edge]) -> Vec<&'a Node> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|e| e.source == node.id)
        .filter(|e| seen.insert(e.target.as_str()))
        .filter_map(|e| find(nodes, &e.target))
        .collect()
}

/// Distinct source nodes of edges entering `node`, in edge order
pub fn incomers<'a>(node: &Node, nodes: &'a [Node], edges: &[Edge]) -> Vec<&'a Node> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|e| e.target == node.id)
        .filter(|e| seen.insert(e.source.as_str()))
        .filter_map(|e| find(nodes, &e.source))
        .collect()
}

/// Nodes with no incoming edges, in node order
pub fn roots<'a>(nodes: &'a [Node], edges: &[Edge]) -> Vec<&'a Node> {
    nodes
        .iter()
        .filter(|n| incomers(n, nodes, edges).is_empty())
        .collect()
}

/// Edges leaving `node_id`, optionally restricted to one source handle
pub fn edges_from<'a>(node_id: &str, handle: Option<&str>, edges: &'a [Edge]) -> Vec<&'a Edge> {
    edges
        .iter()
        .filter(|e| e.source == node_id)
        .filter(|e| match handle {
            Some(h) => e.source_handle.as_deref() == Some(h),
            None => true,
        })
        .collect()
}

/// Distinct existing targets of the given edges, in order
pub fn targets<'a>(edges: &[&Edge], nodes: &'a [Node]) -> Vec<&'a Node> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|e| seen.insert(e.target.as_str()))
        .filter_map(|e| {
            let found = find(nodes, &e.target);
            if found.is_none() {
                log::warn!("Edge {} -> {} points at a missing node", e.source, e.target);
            }
            found
        })
        .collect()
}

fn find<'a>(nodes: &'a [Node], id: &str) -> Option<&'a Node> {
    nodes.iter().find(|n| n.id == id)
}

impl Graph {
    pub fn outgoers(&self, node: &Node) -> Vec<&Node> {
        outgoers(node, &self.nodes, &self.edges)
    }

    pub fn incomers(&self, node: &Node) -> Vec<&Node> {
        incomers(node, &self.nodes, &self.edges)
    }

    pub fn roots(&self) -> Vec<&Node> {
        roots(&self.nodes, &self.edges)
    }

    pub fn edges_from(&self, node_id: &str, handle: Option<&str>) -> Vec<&Edge> {
        edges_from(node_id, handle, &self.edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(nodes: &[&Node]) -> Vec<String> {
        nodes.iter().map(|n| n.id.clone()).collect()
    }

    fn diamond() -> Graph {
        Graph::new(
            vec![
                Node::new("a", "start"),
                Node::new("b", "display"),
                Node::new("c", "display"),
                Node::new("d", "merge"),
            ],
            vec![
                Edge::new("a", "b"),
                Edge::new("a", "c"),
                Edge::new("b", "d"),
                Edge::new("c", "d"),
            ],
        )
    }

    #[test]
    fn test_outgoers_in_edge_order() {
        let g = diamond();
        let a = g.node("a").unwrap();
        assert_eq!(ids(&g.outgoers(a)), vec!["b", "c"]);
    }

    #[test]
    fn test_incomers() {
        let g = diamond();
        let d = g.node("d").unwrap();
        assert_eq!(ids(&g.incomers(d)), vec!["b", "c"]);
        assert!(g.incomers(g.node("a").unwrap()).is_empty());
    }

    #[test]
    fn test_roots() {
        let g = diamond();
        assert_eq!(ids(&g.roots()), vec!["a"]);
    }

    #[test]
    fn test_outgoers_are_distinct() {
        let g = Graph::new(
            vec![Node::new("a", "start"), Node::new("b", "display")],
            vec![Edge::new("a", "b"), Edge::new("a", "b")],
        );
        assert_eq!(ids(&g.outgoers(g.node("a").unwrap())), vec!["b"]);
    }

    #[test]
    fn test_dangling_edges_are_ignored() {
        let g = Graph::new(
            vec![Node::new("a", "start"), Node::new("b", "display")],
            vec![Edge::new("a", "gone"), Edge::new("a", "b"), Edge::new("ghost", "b")],
        );
        assert_eq!(ids(&g.outgoers(g.node("a").unwrap())), vec!["b"]);
        assert_eq!(ids(&g.incomers(g.node("b").unwrap())), vec!["a"]);
        // A dangling incoming edge does not make "b" a root
        assert_eq!(ids(&g.roots()), vec!["a"]);
    }

    #[test]
    fn test_edges_from_handle_filter() {
        let g = Graph::new(
            vec![
                Node::new("cond", "condition"),
                Node::new("yes", "display"),
                Node::new("no", "display"),
            ],
            vec![
                Edge::new("cond", "yes").with_handle("true"),
                Edge::new("cond", "no").with_handle("false"),
            ],
        );
        assert_eq!(g.edges_from("cond", None).len(), 2);

        let t = g.edges_from("cond", Some("true"));
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].target, "yes");

        let f = g.edges_from("cond", Some("false"));
        assert_eq!(f[0].target, "no");
        assert!(g.edges_from("cond", Some("maybe")).is_empty());
    }

    #[test]
    fn test_targets_skip_missing() {
        let g = Graph::new(
            vec![Node::new("a", "start"), Node::new("b", "display")],
            vec![Edge::new("a", "gone"), Edge::new("a", "b"), Edge::new("a", "b")],
        );
        let edges = g.edges_from("a", None);
        assert_eq!(ids(&targets(&edges, &g.nodes)), vec!["b"]);
    }
}
