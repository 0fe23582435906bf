use std::collections::HashMap;

/// Sparse set of burning cells: global flat index -> current intensity.
///
/// Iteration order is unspecified and never feeds back into the
/// simulation; `snapshot` sorts so callers get a stable view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FireFront {
    cells: HashMap<usize, u8>,
}

impl FireFront {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a cell. Zero intensity removes it.
    pub fn insert(&mut self, index: usize, intensity: u8) {
        if intensity == 0 {
            self.cells.remove(&index);
        } else {
            self.cells.insert(index, intensity);
        }
    }

    /// Keeps the larger of the stored and the offered intensity.
    pub fn merge_max(&mut self, index: usize, intensity: u8) {
        if intensity == 0 {
            return;
        }
        let entry = self.cells.entry(index).or_insert(intensity);
        *entry = (*entry).max(intensity);
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.cells.get(&index).copied()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.cells.contains_key(&index)
    }

    pub fn remove(&mut self, index: usize) -> Option<u8> {
        self.cells.remove(&index)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Active cell indices for one update pass, sorted ascending.
    pub fn snapshot(&self) -> Vec<usize> {
        let mut keys: Vec<usize> = self.cells.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.cells.iter().map(|(&k, &v)| (k, v))
    }
}
