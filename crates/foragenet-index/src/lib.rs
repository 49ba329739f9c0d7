//! Toroidal geometry and spatial occupancy indexing for cell-resident agents.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted by spatial index construction.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., zero width).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// A cell coordinate on the wrapped grid.
pub type Cell = (u32, u32);

/// Square torus of side `width`; all coordinate and distance math wraps per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Torus {
    width: u32,
}

impl Torus {
    /// Create a torus with the provided side length.
    pub fn new(width: u32) -> Result<Self, IndexError> {
        if width == 0 {
            return Err(IndexError::InvalidConfig("torus width must be non-zero"));
        }
        Ok(Self { width })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of cells on the torus.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        (self.width as usize) * (self.width as usize)
    }

    /// Flat index for a cell, row-major.
    #[inline]
    #[must_use]
    pub const fn index(&self, cell: Cell) -> usize {
        (cell.0 as usize) * (self.width as usize) + (cell.1 as usize)
    }

    /// Wrap a signed coordinate onto the torus.
    #[inline]
    #[must_use]
    pub fn wrap(&self, value: i64) -> u32 {
        let width = i64::from(self.width);
        (value.rem_euclid(width)) as u32
    }

    /// The cell reached from `cell` by the signed offset `(dx, dy)`.
    #[must_use]
    pub fn offset(&self, cell: Cell, dx: i64, dy: i64) -> Cell {
        (
            self.wrap(i64::from(cell.0) + dx),
            self.wrap(i64::from(cell.1) + dy),
        )
    }

    /// Shortest per-axis separation under wraparound.
    #[inline]
    fn axis_delta(&self, a: u32, b: u32) -> u32 {
        let d = a.abs_diff(b);
        d.min(self.width - d)
    }

    /// Squared toroidal Euclidean distance between two cells.
    #[must_use]
    pub fn distance_squared(&self, a: Cell, b: Cell) -> f64 {
        let dx = f64::from(self.axis_delta(a.0, b.0));
        let dy = f64::from(self.axis_delta(a.1, b.1));
        dx * dx + dy * dy
    }

    /// Toroidal Euclidean distance between two cells.
    #[must_use]
    pub fn distance(&self, a: Cell, b: Cell) -> f64 {
        self.distance_squared(a, b).sqrt()
    }
}

/// Dense per-cell occupancy buckets over a torus.
///
/// Keys are caller-defined handles; a key may legitimately appear in at most
/// one bucket. Removal drops the first matching occurrence, preserving the
/// insertion order of the remaining occupants.
#[derive(Debug, Clone)]
pub struct OccupancyGrid<K> {
    torus: Torus,
    buckets: Vec<Vec<K>>,
}

impl<K: Copy + PartialEq> OccupancyGrid<K> {
    /// Create an empty occupancy grid over `torus`.
    #[must_use]
    pub fn new(torus: Torus) -> Self {
        let mut buckets = Vec::with_capacity(torus.cell_count());
        buckets.resize_with(torus.cell_count(), Vec::new);
        Self { torus, buckets }
    }

    #[must_use]
    pub const fn torus(&self) -> Torus {
        self.torus
    }

    /// Register `key` as resident at `cell`.
    pub fn insert(&mut self, cell: Cell, key: K) {
        let idx = self.torus.index(cell);
        self.buckets[idx].push(key);
    }

    /// Remove the first occurrence of `key` at `cell`. Returns whether a
    /// matching occupant was found.
    pub fn remove(&mut self, cell: Cell, key: K) -> bool {
        let idx = self.torus.index(cell);
        let bucket = &mut self.buckets[idx];
        match bucket.iter().position(|k| *k == key) {
            Some(pos) => {
                bucket.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Relocate `key` from `old` to `new`.
    pub fn relocate(&mut self, old: Cell, new: Cell, key: K) {
        self.remove(old, key);
        self.insert(new, key);
    }

    /// Occupants of a single cell, in insertion order.
    #[must_use]
    pub fn occupants(&self, cell: Cell) -> &[K] {
        &self.buckets[self.torus.index(cell)]
    }

    /// Visit every occupant of every cell within the circular toroidal
    /// radius of `center` (cells with `dx^2 + dy^2 <= radius^2`), in cell
    /// scan order. Callers shuffle the collected keys when order bias
    /// matters.
    pub fn visit_within(&self, center: Cell, radius: i64, visitor: &mut dyn FnMut(K)) {
        let r_squared = radius * radius;
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                if dx * dx + dy * dy > r_squared {
                    continue;
                }
                let cell = self.torus.offset(center, dx, dy);
                for key in self.occupants(cell) {
                    visitor(*key);
                }
            }
        }
    }

    /// Drop all occupants from all cells.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}
