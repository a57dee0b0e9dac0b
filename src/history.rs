use std::collections::VecDeque;

use crate::ir::Diagram;

/// Bounded undo/redo stacks of whole-diagram snapshots.
///
/// Entries are owned clones, so nothing in the history can alias the live
/// diagram. When a stack exceeds `capacity` the oldest entry is evicted.
#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<Diagram>,
    redo: VecDeque<Diagram>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records the pre-mutation diagram and drops the redo branch.
    pub fn record(&mut self, previous: Diagram) {
        self.redo.clear();
        push_bounded(&mut self.undo, previous, self.capacity);
    }

    /// Swaps `current` with the newest undo entry. Returns false when empty.
    pub fn undo(&mut self, current: &mut Diagram) -> bool {
        let Some(previous) = self.undo.pop_back() else {
            return false;
        };
        let replaced = std::mem::replace(current, previous);
        push_bounded(&mut self.redo, replaced, self.capacity);
        true
    }

    pub fn redo(&mut self, current: &mut Diagram) -> bool {
        let Some(next) = self.redo.pop_back() else {
            return false;
        };
        let replaced = std::mem::replace(current, next);
        push_bounded(&mut self.undo, replaced, self.capacity);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

fn push_bounded(stack: &mut VecDeque<Diagram>, entry: Diagram, capacity: usize) {
    if capacity == 0 {
        return;
    }
    stack.push_back(entry);
    while stack.len() > capacity {
        stack.pop_front();
    }
}
