//! Node centrality on unweighted hop distances.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::graph::Graph;

/// Centrality measures for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCentrality {
    pub id: String,
    /// degree / (n − 1).
    pub degree: f64,
    /// Closeness with Wasserman–Faust scaling for disconnected graphs.
    pub closeness: f64,
    /// Normalised shortest-path betweenness.
    pub betweenness: f64,
}

/// Compute degree, closeness and betweenness for every node, in node order.
pub fn centrality(graph: &Graph) -> Vec<NodeCentrality> {
    let n = graph.node_count();
    let adjacency = graph.adjacency();
    let betweenness = betweenness(&adjacency);

    graph
        .nodes()
        .iter()
        .enumerate()
        .map(|(v, node)| NodeCentrality {
            id: node.id.clone(),
            degree: if n > 1 {
                adjacency[v].len() as f64 / (n - 1) as f64
            } else {
                0.0
            },
            closeness: closeness(&adjacency, v),
            betweenness: betweenness[v],
        })
        .collect()
}

/// Hop distances from `source`; `None` for unreachable nodes.
fn bfs(adjacency: &[Vec<usize>], source: usize) -> Vec<Option<usize>> {
    let mut dist = vec![None; adjacency.len()];
    dist[source] = Some(0);
    let mut queue = VecDeque::from([source]);
    while let Some(v) = queue.pop_front() {
        let d = dist[v].unwrap_or(0);
        for &w in &adjacency[v] {
            if dist[w].is_none() {
                dist[w] = Some(d + 1);
                queue.push_back(w);
            }
        }
    }
    dist
}

fn closeness(adjacency: &[Vec<usize>], v: usize) -> f64 {
    let n = adjacency.len();
    if n <= 1 {
        return 0.0;
    }
    let dist = bfs(adjacency, v);
    let reachable = dist.iter().flatten().count();
    let total: usize = dist.iter().flatten().sum();
    if total == 0 {
        return 0.0;
    }
    let r = (reachable - 1) as f64;
    (r / total as f64) * (r / (n - 1) as f64)
}

/// Brandes' algorithm for unweighted undirected graphs.
fn betweenness(adjacency: &[Vec<usize>]) -> Vec<f64> {
    let n = adjacency.len();
    let mut scores = vec![0.0f64; n];

    for s in 0..n {
        let mut stack = Vec::with_capacity(n);
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist: Vec<i64> = vec![-1; n];
        sigma[s] = 1.0;
        dist[s] = 0;

        let mut queue = VecDeque::from([s]);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &adjacency[v] {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    preds[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &preds[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                scores[w] += delta[w];
            }
        }
    }

    // Every unordered pair was counted from both ends.
    let scale = if n > 2 {
        1.0 / ((n - 1) * (n - 2)) as f64
    } else {
        0.5
    };
    scores.iter_mut().for_each(|b| *b *= scale);
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, NodeKind};

    fn graph(ids: &[&str], edges: &[(usize, usize)]) -> Graph {
        let mut g = Graph::new();
        for id in ids {
            g.add_node(Node::new(*id, NodeKind::Criterion));
        }
        for &(a, b) in edges {
            g.add_weight(a, b, 1.0);
        }
        g
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn path_graph() {
        let c = centrality(&graph(&["a", "b", "c"], &[(0, 1), (1, 2)]));
        assert_eq!(c[1].id, "b");
        assert!(close(c[0].degree, 0.5));
        assert!(close(c[1].degree, 1.0));
        assert!(close(c[1].betweenness, 1.0));
        assert!(close(c[0].betweenness, 0.0));
        assert!(close(c[1].closeness, 1.0));
        assert!(close(c[0].closeness, 2.0 / 3.0));
    }

    #[test]
    fn star_centre_lies_on_every_path() {
        let c = centrality(&graph(
            &["hub", "x", "y", "z", "w"],
            &[(0, 1), (0, 2), (0, 3), (0, 4)],
        ));
        assert!(close(c[0].betweenness, 1.0));
        assert!(close(c[0].degree, 1.0));
        assert!(c[1..].iter().all(|n| close(n.betweenness, 0.0)));
    }

    #[test]
    fn disconnected_nodes_use_scaled_closeness() {
        let c = centrality(&graph(&["a", "b", "c"], &[(0, 1)]));
        assert!(close(c[0].closeness, 0.5));
        assert!(close(c[2].closeness, 0.0));
        assert!(close(c[2].degree, 0.0));
    }

    #[test]
    fn tiny_graphs_are_all_zero() {
        assert!(centrality(&Graph::new()).is_empty());
        let c = centrality(&graph(&["only"], &[]));
        assert_eq!(
            c,
            vec![NodeCentrality {
                id: "only".into(),
                degree: 0.0,
                closeness: 0.0,
                betweenness: 0.0
            }]
        );
    }

    #[test]
    fn cycle_splits_betweenness_evenly() {
        let c = centrality(&graph(
            &["a", "b", "c", "d"],
            &[(0, 1), (1, 2), (2, 3), (3, 0)],
        ));
        // Each node carries half of the one opposite pair: 0.5 / 3.
        for node in &c {
            assert!(close(node.betweenness, 0.5 / 3.0), "{node:?}");
        }
    }
}
