//! Fixture graphs shared by the benchmarks.

use mindcanvas_core::{AnchorSide, NodeId, Vec2};
use mindcanvas_graph::CanvasGraph;

/// `count` nodes on a tight grid (every neighbour overlaps), chained by connections.
pub fn crowded_chain(count: usize) -> (CanvasGraph, Vec<NodeId>) {
    let mut graph = CanvasGraph::new();
    let columns = (count as f32).sqrt().ceil().max(1.0) as usize;
    let ids: Vec<NodeId> = (0..count)
        .map(|i| {
            let col = (i % columns) as f32;
            let row = (i / columns) as f32;
            graph.create_node(Vec2::new(col * 50.0, row * 40.0))
        })
        .collect();
    for pair in ids.windows(2) {
        graph.create_connection(pair[0], pair[1], Some(AnchorSide::Right), None);
    }
    (graph, ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crowded_chain_shape() {
        let (graph, ids) = crowded_chain(10);
        assert_eq!(ids.len(), 10);
        assert_eq!(graph.node_count(), 10);
        assert_eq!(graph.connection_count(), 9);
    }
}
