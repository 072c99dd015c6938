//! Undirected weighted graphs and the miss-network builders.
//!
//! Node and edge order is insertion order, which the builders keep equal to
//! taxonomy order (and subject order for bipartite graphs). Downstream
//! rendering relies on that order being stable across runs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ParamError;
use crate::misses::{Level, MissCounts};

/// What a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A student, or a student at one attempt.
    Subject,
    Criterion,
    Element,
    /// A per-student mean metric in a correlation graph.
    Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    /// Source table of a metric node ("assessment", "socratic").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Total miss count for miss-network nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            group: None,
            size: None,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphData {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// An undirected graph without self loops or parallel edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "GraphData", into = "GraphData")]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
    /// (low node index, high node index) → edge index
    edge_index: HashMap<(usize, usize), usize>,
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its index. A node whose id already exists is
    /// not added again; the existing index is returned.
    pub fn add_node(&mut self, node: Node) -> usize {
        if let Some(&i) = self.index.get(&node.id) {
            return i;
        }
        let i = self.nodes.len();
        self.index.insert(node.id.clone(), i);
        self.nodes.push(node);
        i
    }

    /// Add `weight` to the edge between nodes `a` and `b`, creating it if
    /// needed. Self loops and unknown indices are ignored.
    pub fn add_weight(&mut self, a: usize, b: usize, weight: f64) -> bool {
        if a == b || a >= self.nodes.len() || b >= self.nodes.len() {
            return false;
        }
        let key = (a.min(b), a.max(b));
        match self.edge_index.get(&key) {
            Some(&e) => self.edges[e].weight += weight,
            None => {
                self.edge_index.insert(key, self.edges.len());
                self.edges.push(Edge {
                    source: self.nodes[a].id.clone(),
                    target: self.nodes[b].id.clone(),
                    weight,
                });
            }
        }
        true
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Weight of the edge between `a` and `b`; symmetric.
    pub fn weight(&self, a: &str, b: &str) -> Option<f64> {
        let (a, b) = (self.node_index(a)?, self.node_index(b)?);
        self.edge_index
            .get(&(a.min(b), a.max(b)))
            .map(|&e| self.edges[e].weight)
    }

    pub fn degree(&self, id: &str) -> usize {
        self.neighbors(id).len()
    }

    /// Neighbour ids in edge insertion order.
    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter_map(|e| {
                if e.source == id {
                    Some(e.target.as_str())
                } else if e.target == id {
                    Some(e.source.as_str())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Neighbour indices per node, for traversal algorithms.
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for &(a, b) in self.edge_pairs().iter() {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        adjacency
    }

    fn edge_pairs(&self) -> Vec<(usize, usize)> {
        self.edges
            .iter()
            .filter_map(|e| Some((self.node_index(&e.source)?, self.node_index(&e.target)?)))
            .collect()
    }
}

impl From<GraphData> for Graph {
    fn from(data: GraphData) -> Self {
        let mut graph = Graph::new();
        for node in data.nodes {
            graph.add_node(node);
        }
        for edge in data.edges {
            if let (Some(a), Some(b)) = (graph.node_index(&edge.source), graph.node_index(&edge.target)) {
                graph.add_weight(a, b, edge.weight);
            }
        }
        graph
    }
}

impl From<Graph> for GraphData {
    fn from(graph: Graph) -> Self {
        GraphData {
            nodes: graph.nodes,
            edges: graph.edges,
        }
    }
}

fn column_kind(counts: &MissCounts) -> NodeKind {
    match counts.level {
        Level::Criterion => NodeKind::Criterion,
        Level::Element => NodeKind::Element,
    }
}

/// Focus subsets with at most this many columns link on a single miss.
pub const FOCUS_RELAXED_MAX_COLUMNS: usize = 4;

/// Edge threshold for a co-miss graph restricted to `columns` columns.
///
/// Small subsets rarely reach `min_misses` on several columns at once, so
/// they fall back to one miss.
pub fn focused_min_misses(columns: usize, min_misses: u32) -> u32 {
    if columns <= FOCUS_RELAXED_MAX_COLUMNS {
        1
    } else {
        min_misses
    }
}

/// Build the co-miss graph: columns are nodes, and each subject that misses
/// both A and B at least `min_misses` times adds 1 to weight(A, B).
pub fn build_co_miss_graph(counts: &MissCounts, min_misses: u32) -> Graph {
    let mut graph = Graph::new();
    let kind = column_kind(counts);
    for (column, total) in counts.columns.iter().zip(counts.column_totals()) {
        graph.add_node(Node::new(column.clone(), kind).with_size(total));
    }

    for row in &counts.rows {
        let hit: Vec<usize> = row
            .counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c >= min_misses)
            .map(|(i, _)| i)
            .collect();
        for (k, &a) in hit.iter().enumerate() {
            for &b in &hit[k + 1..] {
                graph.add_weight(a, b, 1.0);
            }
        }
    }

    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        min_misses,
        "built co-miss graph"
    );
    graph
}

/// Build the subject–column bipartite graph: an edge for every count that
/// reaches `min_misses`, weighted by the count.
///
/// Subjects and columns share one id space, so a column named like a
/// subject label is rejected.
pub fn build_bipartite_graph(counts: &MissCounts, min_misses: u32) -> Result<Graph, ParamError> {
    if let Some(row) = counts
        .rows
        .iter()
        .find(|row| counts.columns.contains(&row.subject()))
    {
        return Err(ParamError::NodeIdClash(row.subject()));
    }

    let mut graph = Graph::new();
    let subjects: Vec<usize> = counts
        .rows
        .iter()
        .map(|row| {
            let total: u32 = row.counts.iter().sum();
            graph.add_node(Node::new(row.subject(), NodeKind::Subject).with_size(total))
        })
        .collect();

    let kind = column_kind(counts);
    let columns: Vec<usize> = counts
        .columns
        .iter()
        .zip(counts.column_totals())
        .map(|(column, total)| graph.add_node(Node::new(column.clone(), kind).with_size(total)))
        .collect();

    for (row, &s) in counts.rows.iter().zip(&subjects) {
        for (&count, &c) in row.counts.iter().zip(&columns) {
            if count >= min_misses {
                graph.add_weight(s, c, f64::from(count));
            }
        }
    }

    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        min_misses,
        "built bipartite graph"
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::misses::{Grouping, MissCountRow};
    use proptest::prelude::*;

    fn counts(columns: &[&str], rows: &[(&str, Vec<u32>)]) -> MissCounts {
        MissCounts {
            grouping: Grouping::Student,
            level: Level::Criterion,
            threshold: 70.0,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|(id, c)| MissCountRow {
                    student_id: id.to_string(),
                    attempt: None,
                    counts: c.clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn small_focus_links_on_a_single_miss() {
        assert_eq!(focused_min_misses(4, 3), 1);
        assert_eq!(focused_min_misses(1, 0), 1);
        assert_eq!(focused_min_misses(5, 3), 3);

        let c = counts(&["a1", "a2", "a3"], &[("S01", vec![1, 1, 0])]);
        assert_eq!(build_co_miss_graph(&c, 2).edge_count(), 0);
        let relaxed = build_co_miss_graph(&c, focused_min_misses(c.columns.len(), 2));
        assert_eq!(relaxed.weight("a1", "a2"), Some(1.0));
    }

    #[test]
    fn two_students_sharing_two_misses_make_one_edge() {
        let c = counts(
            &["A", "B", "C"],
            &[("S01", vec![2, 3, 0]), ("S02", vec![2, 2, 1])],
        );
        let g = build_co_miss_graph(&c, 2);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.weight("A", "B"), Some(2.0));
        assert_eq!(g.weight("B", "A"), Some(2.0));
        assert_eq!(g.weight("A", "C"), None);
        // Isolated columns stay in the graph.
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.degree("C"), 0);
        assert_eq!(g.node("A").and_then(|n| n.size), Some(4));
    }

    #[test]
    fn node_order_follows_columns() {
        let c = counts(&["Z", "A", "M"], &[("S01", vec![1, 1, 1])]);
        let g = build_co_miss_graph(&c, 1);
        let ids: Vec<&str> = g.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["Z", "A", "M"]);
        let edges: Vec<(&str, &str)> = g
            .edges()
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert_eq!(edges, vec![("Z", "A"), ("Z", "M"), ("A", "M")]);
    }

    #[test]
    fn zero_min_misses_gives_complete_graph() {
        let c = counts(&["A", "B", "C", "D"], &[("S01", vec![0, 0, 0, 0])]);
        let g = build_co_miss_graph(&c, 0);
        assert_eq!(g.edge_count(), 6);
        assert!(g.nodes().iter().all(|n| g.degree(&n.id) == 3));
    }

    #[test]
    fn bipartite_links_subjects_to_columns() {
        let c = counts(&["A", "B"], &[("S01", vec![3, 1]), ("S02", vec![0, 2])]);
        let g = build_bipartite_graph(&c, 2).unwrap();
        let ids: Vec<&str> = g.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["S01", "S02", "A", "B"]);
        assert_eq!(g.node("S01").map(|n| n.kind), Some(NodeKind::Subject));
        assert_eq!(g.weight("S01", "A"), Some(3.0));
        assert_eq!(g.weight("S01", "B"), None);
        assert_eq!(g.weight("B", "S02"), Some(2.0));
        assert_eq!(g.neighbors("A"), vec!["S01"]);
    }

    #[test]
    fn bipartite_rejects_column_named_like_subject() {
        let c = counts(&["S01", "B"], &[("S01", vec![3, 3])]);
        assert_eq!(
            build_bipartite_graph(&c, 2),
            Err(ParamError::NodeIdClash("S01".into()))
        );
    }

    #[test]
    fn shared_misses_from_score_records_make_one_edge() {
        use crate::misses::{misses, Grouping};
        use crate::model::{ScoreRecord, ScoreTable};
        use crate::taxonomy::{Criterion, Taxonomy};

        let taxonomy = Taxonomy::new(vec![
            Criterion::new("A", &["a1"]),
            Criterion::new("B", &["b1"]),
            Criterion::new("C", &["c1"]),
        ])
        .unwrap();
        let mut records = Vec::new();
        for student in ["S01", "S02"] {
            for attempt in 1..=2 {
                for (element, score) in [("a1", 50.0), ("b1", 65.0), ("c1", 90.0)] {
                    records.push(ScoreRecord {
                        student_id: student.into(),
                        attempt,
                        element: element.into(),
                        score,
                    });
                }
            }
        }
        let scores = ScoreTable::from_records(taxonomy, records).unwrap();
        let counts = misses(&scores, 70.0)
            .unwrap()
            .counts(Grouping::Student, Level::Criterion);
        assert_eq!(counts.row("S01").unwrap().counts, vec![2, 2, 0]);

        let g = build_co_miss_graph(&counts, 2);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.weight("A", "B"), Some(2.0));
        assert_eq!(g.degree("C"), 0);
    }

    #[test]
    fn self_loops_are_ignored() {
        let mut g = Graph::new();
        let a = g.add_node(Node::new("a", NodeKind::Metric));
        assert!(!g.add_weight(a, a, 1.0));
        assert!(!g.add_weight(a, 7, 1.0));
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.add_node(Node::new("a", NodeKind::Metric)), a);
    }

    #[test]
    fn serde_roundtrip_rebuilds_lookups() {
        let c = counts(&["A", "B"], &[("S01", vec![1, 1])]);
        let g = build_co_miss_graph(&c, 1);
        let json = serde_json::to_string(&g).unwrap();
        let back: Graph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, g);
        assert_eq!(back.weight("B", "A"), Some(1.0));
    }

    proptest! {
        #[test]
        fn co_miss_graph_is_symmetric_without_self_edges(
            rows in prop::collection::vec(prop::collection::vec(0u32..5, 4), 1..10),
            min in 0u32..4,
        ) {
            let named: Vec<(String, Vec<u32>)> = rows
                .into_iter()
                .enumerate()
                .map(|(i, r)| (format!("S{:02}", i + 1), r))
                .collect();
            let borrowed: Vec<(&str, Vec<u32>)> =
                named.iter().map(|(id, r)| (id.as_str(), r.clone())).collect();
            let c = counts(&["A", "B", "C", "D"], &borrowed);
            let g = build_co_miss_graph(&c, min);
            for e in g.edges() {
                prop_assert_ne!(&e.source, &e.target);
                prop_assert_eq!(g.weight(&e.source, &e.target), g.weight(&e.target, &e.source));
                prop_assert!(e.weight >= 1.0 && e.weight <= c.rows.len() as f64);
            }
        }
    }
}
