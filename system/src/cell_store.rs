use crate::message::{Cell, CellId, CellSnapshot};
use std::collections::HashMap;

/// Every drawn cell, keyed by cell id. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct CellStore {
    cells: HashMap<CellId, Cell>,
}

impl CellStore {
    pub fn new() -> Self {
        Self {
            cells: HashMap::new(),
        }
    }

    pub fn upsert(&mut self, cell: Cell) {
        self.cells.insert(cell.id.clone(), cell);
    }

    /// Returns the removed cell, or `None` when nothing was stored under `id`.
    pub fn delete(&mut self, id: &str) -> Option<Cell> {
        self.cells.remove(id)
    }

    pub fn snapshot(&self) -> CellSnapshot {
        self.cells.clone()
    }

    pub fn get(&self, id: &str) -> Option<&Cell> {
        self.cells.get(id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
