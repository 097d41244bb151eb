//! Force-directed arrangement of a node selection.
//!
//! Nodes are point masses at their rectangle centres. Each iteration damps the
//! velocities, accumulates repulsion (boosted for pairs whose boxes plus margin would
//! overlap), spring attraction along connections inside the selection and a weak pull
//! toward each group's running centroid, caps the speed and integrates. Once the
//! simulation settles, separation passes push apart any boxes that still overlap, and a
//! packing fallback guarantees the result is overlap free.

use crate::store::CanvasGraph;
use indexmap::{IndexMap, IndexSet};
use mindcanvas_core::{GroupId, NodeId, Rect, Vec2};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const MAX_ITERATIONS: usize = 500;
/// Average per-node displacement below which the simulation counts as settled.
pub const CONVERGENCE_THRESHOLD: f32 = 0.05;
pub const DAMPING: f32 = 0.85;
pub const MAX_SPEED: f32 = 40.0;
pub const REPULSION: f32 = 20_000.0;
/// Repulsion multiplier for pairs closer than their combined half extents plus margin.
pub const OVERLAP_BOOST: f32 = 8.0;
pub const MARGIN: f32 = 40.0;
pub const SPRING_K: f32 = 0.02;
pub const REST_LENGTH: f32 = 300.0;
pub const GROUP_COHESION: f32 = 0.01;
/// Distances below this skip the pair's force contribution.
pub const EPSILON: f32 = 0.01;
pub const MAX_SEPARATION_PASSES: usize = 200;

/// Extra distance added when two boxes are separated, so they end up strictly apart.
const SEPARATION_SLACK: f32 = 1.0;
/// Selections at least this large compute repulsion on the rayon pool.
const PARALLEL_THRESHOLD: usize = 64;
const GOLDEN_ANGLE: f32 = 2.399_963;

/// Stop signal shared between whoever started a layout run and the thread running it.
/// The run checks it once per iteration and again before separating boxes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub trait Layouter {
    /// Arrange `input`. Returns `None` if `cancel` fired before the run finished.
    fn execute(&self, input: &LayoutInput, cancel: &CancellationToken) -> Option<LayoutOutcome>;
}

/// A self-contained copy of the selection, detached from the store so it can move to a
/// worker thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutInput {
    pub ids: Vec<NodeId>,
    /// Top-left corners.
    pub positions: Vec<Vec2>,
    pub sizes: Vec<Vec2>,
    /// Index pairs of connections with both ends in the selection.
    pub springs: Vec<(usize, usize)>,
    /// Index into the selection's group list, per node.
    pub groups: Vec<Option<usize>>,
}

impl LayoutInput {
    /// Snapshot `selection` from `graph`. Unknown and repeated ids are dropped.
    pub fn from_graph(graph: &CanvasGraph, selection: &[NodeId]) -> Self {
        let ids: IndexSet<NodeId> = selection
            .iter()
            .copied()
            .filter(|id| graph.contains_node(*id))
            .collect();

        let mut input = Self::default();
        let mut group_slots: IndexMap<GroupId, usize> = IndexMap::new();
        for node in ids.iter().filter_map(|id| graph.node(*id)) {
            input.ids.push(node.id);
            input.positions.push(node.position);
            input.sizes.push(node.size);
            input.groups.push(node.group_id.map(|group| {
                let next = group_slots.len();
                *group_slots.entry(group).or_insert(next)
            }));
        }

        input.springs = graph
            .connections()
            .filter_map(|conn| {
                let a = ids.get_index_of(&conn.from_node_id)?;
                let b = ids.get_index_of(&conn.to_node_id)?;
                Some((a, b))
            })
            .collect();
        input
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn group_count(&self) -> usize {
        self.groups
            .iter()
            .flatten()
            .max()
            .map_or(0, |max| max + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOutcome {
    /// New top-left corner per node, in selection order.
    pub positions: Vec<(NodeId, Vec2)>,
    pub iterations: usize,
    pub converged: bool,
    pub separation_passes: usize,
}

impl LayoutOutcome {
    fn unchanged(input: &LayoutInput) -> Self {
        Self {
            positions: input
                .ids
                .iter()
                .copied()
                .zip(input.positions.iter().copied())
                .collect(),
            iterations: 0,
            converged: true,
            separation_passes: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ForceLayouter;

impl Layouter for ForceLayouter {
    fn execute(&self, input: &LayoutInput, cancel: &CancellationToken) -> Option<LayoutOutcome> {
        let n = input.len();
        if n < 2 {
            return Some(LayoutOutcome::unchanged(input));
        }

        let sizes = &input.sizes;
        let masses: Vec<f32> = sizes
            .iter()
            .map(|s| ((s.x * s.y).sqrt() / 100.0).max(EPSILON))
            .collect();
        let mut centers: Vec<Vec2> = input
            .positions
            .iter()
            .zip(sizes)
            .map(|(p, s)| *p + *s * 0.5)
            .collect();
        nudge_coincident(&mut centers);

        let group_count = input.group_count();
        let mut centroids = group_centroids(&centers, &input.groups, group_count);
        let mut velocities = vec![Vec2::ZERO; n];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < MAX_ITERATIONS {
            if cancel.is_cancelled() {
                tracing::debug!("Layout cancelled after {} iterations", iterations);
                return None;
            }

            let mut forces = repulsion_forces(&centers, sizes);

            for &(a, b) in &input.springs {
                let delta = centers[b] - centers[a];
                let dist = delta.length();
                if dist < EPSILON {
                    continue;
                }
                let pull = delta / dist * (SPRING_K * (dist - REST_LENGTH));
                forces[a] += pull;
                forces[b] -= pull;
            }

            for (i, group) in input.groups.iter().enumerate() {
                if let Some(Some(centroid)) = group.map(|g| centroids[g]) {
                    forces[i] += (centroid - centers[i]) * GROUP_COHESION;
                }
            }

            let mut displacement = 0.0;
            for i in 0..n {
                let mut velocity = velocities[i] * DAMPING + forces[i] / masses[i];
                let speed = velocity.length();
                if speed > MAX_SPEED {
                    velocity = velocity * (MAX_SPEED / speed);
                }
                if !velocity.is_finite() {
                    velocity = Vec2::ZERO;
                }
                velocities[i] = velocity;
                centers[i] += velocity;
                displacement += velocity.length();
            }
            centroids = group_centroids(&centers, &input.groups, group_count);
            iterations += 1;

            if displacement / (n as f32) < CONVERGENCE_THRESHOLD {
                converged = true;
                break;
            }
        }

        if cancel.is_cancelled() {
            tracing::debug!("Layout cancelled before separation");
            return None;
        }

        let mut positions: Vec<Vec2> = centers
            .iter()
            .zip(sizes)
            .map(|(c, s)| *c - *s * 0.5)
            .collect();
        let separation_passes = separate(&mut positions, sizes);
        if has_overlap(&positions, sizes) {
            tracing::debug!(
                "Separation left overlaps after {} passes; packing",
                separation_passes
            );
            pack_overlapping(&mut positions, sizes);
        }

        Some(LayoutOutcome {
            positions: input.ids.iter().copied().zip(positions).collect(),
            iterations,
            converged,
            separation_passes,
        })
    }
}

/// Move any centre that sits on top of an earlier one off along a golden-angle spiral,
/// so the pair has a direction to repel along.
fn nudge_coincident(centers: &mut [Vec2]) {
    for j in 1..centers.len() {
        let mut attempt = 0;
        while attempt < 8 && (0..j).any(|i| centers[i].distance(centers[j]) < EPSILON) {
            let angle = (j + attempt) as f32 * GOLDEN_ANGLE;
            centers[j] += Vec2::new(angle.cos(), angle.sin());
            attempt += 1;
        }
    }
}

fn group_centroids(centers: &[Vec2], groups: &[Option<usize>], count: usize) -> Vec<Option<Vec2>> {
    let mut sums = vec![(Vec2::ZERO, 0usize); count];
    for (center, group) in centers.iter().zip(groups) {
        if let Some(g) = group {
            sums[*g].0 += *center;
            sums[*g].1 += 1;
        }
    }
    sums.into_iter()
        .map(|(sum, members)| (members > 1).then(|| sum / members as f32))
        .collect()
}

fn repulsion_on(i: usize, centers: &[Vec2], sizes: &[Vec2]) -> Vec2 {
    let mut force = Vec2::ZERO;
    for j in 0..centers.len() {
        if i == j {
            continue;
        }
        let delta = centers[i] - centers[j];
        let dist = delta.length();
        if dist < EPSILON {
            continue;
        }
        let min_x = (sizes[i].x + sizes[j].x) * 0.5 + MARGIN;
        let min_y = (sizes[i].y + sizes[j].y) * 0.5 + MARGIN;
        let mut magnitude = REPULSION / (dist * dist);
        if delta.x.abs() < min_x && delta.y.abs() < min_y {
            magnitude *= OVERLAP_BOOST;
        }
        force += delta / dist * magnitude;
    }
    force
}

fn repulsion_forces(centers: &[Vec2], sizes: &[Vec2]) -> Vec<Vec2> {
    let n = centers.len();
    if n >= PARALLEL_THRESHOLD {
        (0..n)
            .into_par_iter()
            .map(|i| repulsion_on(i, centers, sizes))
            .collect()
    } else {
        (0..n).map(|i| repulsion_on(i, centers, sizes)).collect()
    }
}

fn rect_at(positions: &[Vec2], sizes: &[Vec2], i: usize) -> Rect {
    Rect::from_pos_size(positions[i], sizes[i])
}

fn has_overlap(positions: &[Vec2], sizes: &[Vec2]) -> bool {
    let n = positions.len();
    (0..n).any(|i| {
        let a = rect_at(positions, sizes, i);
        (i + 1..n).any(|j| a.overlaps(&rect_at(positions, sizes, j)))
    })
}

/// Push overlapping pairs apart along their axis of least overlap, half each way.
/// Returns the number of passes run.
fn separate(positions: &mut [Vec2], sizes: &[Vec2]) -> usize {
    let n = positions.len();
    let mut passes = 0;
    while passes < MAX_SEPARATION_PASSES {
        passes += 1;
        let mut moved = false;
        for i in 0..n {
            for j in (i + 1)..n {
                let a = rect_at(positions, sizes, i);
                let b = rect_at(positions, sizes, j);
                if !a.overlaps(&b) {
                    continue;
                }
                moved = true;
                let overlap_x = a.max.x.min(b.max.x) - a.min.x.max(b.min.x);
                let overlap_y = a.max.y.min(b.max.y) - a.min.y.max(b.min.y);
                let delta = b.center() - a.center();
                if overlap_x <= overlap_y {
                    let shift = (overlap_x + SEPARATION_SLACK) * 0.5;
                    let sign = if delta.x < 0.0 { -1.0 } else { 1.0 };
                    positions[i].x -= shift * sign;
                    positions[j].x += shift * sign;
                } else {
                    let shift = (overlap_y + SEPARATION_SLACK) * 0.5;
                    let sign = if delta.y < 0.0 { -1.0 } else { 1.0 };
                    positions[i].y -= shift * sign;
                    positions[j].y += shift * sign;
                }
            }
        }
        if !moved {
            break;
        }
    }
    passes
}

/// Last resort: any box that still overlaps an earlier one moves to the right of
/// everything placed so far.
fn pack_overlapping(positions: &mut [Vec2], sizes: &[Vec2]) {
    let mut right_edge = f32::NEG_INFINITY;
    for i in 0..positions.len() {
        let rect = rect_at(positions, sizes, i);
        let collides = (0..i).any(|j| rect.overlaps(&rect_at(positions, sizes, j)));
        if collides {
            positions[i].x = right_edge + MARGIN;
        }
        right_edge = right_edge.max(positions[i].x + sizes[i].x);
    }
}
