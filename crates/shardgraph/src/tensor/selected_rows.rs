//! Sparse row-indexed tensor: a logical height, an ordered row-id list, and dense row values.

use super::dense::DenseTensor;
use crate::device::Place;

/// Sparse matrix made of `rows.len()` dense rows out of a logical `height`.
///
/// `rows[i]` names the logical row stored at physical row `i` of `value`. Row ids may repeat and
/// need not be sorted. `height > max(rows)` is expected but only checked by consumers.
#[derive(Debug, Clone)]
pub struct SelectedRows {
    height: i64,
    rows: Vec<i64>,
    value: DenseTensor,
}

impl Default for SelectedRows {
    fn default() -> Self {
        SelectedRows {
            height: 0,
            rows: Vec::new(),
            value: DenseTensor::empty(Place::default()),
        }
    }
}

impl SelectedRows {
    pub fn new(height: i64, rows: Vec<i64>, value: DenseTensor) -> Self {
        SelectedRows {
            height,
            rows,
            value,
        }
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    pub fn set_height(&mut self, height: i64) {
        self.height = height;
    }

    pub fn rows(&self) -> &[i64] {
        &self.rows
    }

    pub fn set_rows(&mut self, rows: Vec<i64>) {
        self.rows = rows;
    }

    pub fn value(&self) -> &DenseTensor {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut DenseTensor {
        &mut self.value
    }

    pub fn set_value(&mut self, value: DenseTensor) {
        self.value = value;
    }

    /// Whether the value buffer holds exactly one row per row id.
    pub fn rows_match_value(&self) -> bool {
        self.value.shape().rows() == self.rows.len()
    }

    /// Whether every row id falls inside `0..height`.
    pub fn rows_within_height(&self) -> bool {
        self.rows.iter().all(|&row| row >= 0 && row < self.height)
    }
}
