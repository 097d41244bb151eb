//! Snapshot history for undo/redo.
//!
//! `past` is oldest-first, `future` is nearest-last (a stack). Snapshots are
//! `Arc<CanvasGraph>`; since the graph itself holds its entities behind `Arc`,
//! consecutive snapshots share every entity the mutation did not touch.

use crate::store::CanvasGraph;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct History {
    past: Vec<Arc<CanvasGraph>>,
    present: Arc<CanvasGraph>,
    future: Vec<Arc<CanvasGraph>>,
    limit: Option<usize>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(CanvasGraph::new())
    }
}

impl History {
    pub fn new(present: CanvasGraph) -> Self {
        Self {
            past: Vec::new(),
            present: Arc::new(present),
            future: Vec::new(),
            limit: None,
        }
    }

    /// Cap the number of undo steps. `None` keeps every snapshot.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.set_limit(limit);
        self
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
        self.enforce_limit();
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn present(&self) -> &CanvasGraph {
        &self.present
    }

    pub fn present_arc(&self) -> Arc<CanvasGraph> {
        Arc::clone(&self.present)
    }

    /// Push the current state onto `past`, make `next` current, drop the redo stack.
    pub fn commit(&mut self, next: CanvasGraph) {
        let previous = std::mem::replace(&mut self.present, Arc::new(next));
        self.past.push(previous);
        self.future.clear();
        self.enforce_limit();
    }

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push(current);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, next);
        self.past.push(current);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    /// Replace the present and forget both stacks.
    pub fn reset(&mut self, present: CanvasGraph) {
        self.present = Arc::new(present);
        self.past.clear();
        self.future.clear();
    }

    fn enforce_limit(&mut self) {
        if let Some(limit) = self.limit
            && self.past.len() > limit
        {
            let excess = self.past.len() - limit;
            self.past.drain(..excess);
        }
    }
}
