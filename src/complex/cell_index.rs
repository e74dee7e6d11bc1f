use fixedbitset as fb;
use std::collections::HashMap;

use crate::{
    khalimsky::{Cell, SignedCell},
    DecError,
};

/// Dense indexing of the cells of one dimension of a complex.
///
/// Indices are assigned in insertion order and never change.
/// Cells inserted with negative orientation are stored unsigned
/// with a flip bit, and their weight carries the flipped sign.
#[derive(Clone, Debug, Default)]
pub struct CellIndex<const DIM: usize> {
    cells: Vec<Cell<DIM>>,
    indices: HashMap<Cell<DIM>, usize>,
    weights: Vec<f64>,
    dual_measures: Vec<f64>,
    flipped: fb::FixedBitSet,
}

impl<const DIM: usize> CellIndex<DIM> {
    /// Number of indexed cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cells have been indexed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Index a cell with the given primal and dual measures.
    ///
    /// Only the magnitudes of the measures are used;
    /// the sign of the stored weight comes from the orientation of `cell`.
    pub fn insert(
        &mut self,
        cell: SignedCell<DIM>,
        primal_measure: f64,
        dual_measure: f64,
    ) -> Result<usize, DecError> {
        for measure in [primal_measure, dual_measure] {
            if !measure.is_finite() || measure == 0. {
                return Err(DecError::InvalidMeasure(measure));
            }
        }
        if self.indices.contains_key(&cell.cell) {
            return Err(DecError::DuplicateCell {
                coords: cell.cell.coords().to_vec(),
            });
        }
        if !cell.positive {
            log::debug!("{} indexed with flipped orientation", cell.cell);
        }
        Ok(self.push(cell.cell, !cell.positive, primal_measure, dual_measure))
    }

    /// Append a cell known not to be indexed yet.
    pub(crate) fn push(
        &mut self,
        cell: Cell<DIM>,
        flipped: bool,
        primal_measure: f64,
        dual_measure: f64,
    ) -> usize {
        let idx = self.cells.len();
        self.cells.push(cell);
        self.indices.insert(cell, idx);
        let weight = primal_measure.abs();
        self.weights.push(if flipped { -weight } else { weight });
        self.dual_measures.push(dual_measure.abs());
        self.flipped.grow(idx + 1);
        self.flipped.set(idx, flipped);
        idx
    }

    /// Index of an unsigned cell, if present.
    #[inline]
    pub fn index_of(&self, cell: &Cell<DIM>) -> Option<usize> {
        self.indices.get(cell).copied()
    }

    /// Whether the cell is indexed.
    #[inline]
    pub fn contains(&self, cell: &Cell<DIM>) -> bool {
        self.indices.contains_key(cell)
    }

    /// All indexed cells in index order.
    #[inline]
    pub fn cells(&self) -> &[Cell<DIM>] {
        &self.cells
    }

    /// The cell at an index with the orientation it was inserted with.
    pub fn cell(&self, idx: usize) -> Option<SignedCell<DIM>> {
        let cell = *self.cells.get(idx)?;
        Some(cell.signed(!self.flipped.contains(idx)))
    }

    /// Signed primal measure of the cell at an index.
    ///
    /// Panics if the index is out of bounds.
    #[inline]
    pub fn weight(&self, idx: usize) -> f64 {
        self.weights[idx]
    }

    /// Signed primal measures of all cells in index order.
    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Measure of the dual cell at an index.
    ///
    /// Panics if the index is out of bounds.
    #[inline]
    pub fn dual_measure(&self, idx: usize) -> f64 {
        self.dual_measures[idx]
    }

    /// Dual measures of all cells in index order.
    #[inline]
    pub fn dual_measures(&self) -> &[f64] {
        &self.dual_measures
    }

    /// Whether the cell at an index was inserted with negative orientation.
    #[inline]
    pub fn is_flipped(&self, idx: usize) -> bool {
        self.flipped.contains(idx)
    }

    /// `-1.` for flipped cells, `1.` otherwise.
    #[inline]
    pub(crate) fn orientation(&self, idx: usize) -> f64 {
        if self.flipped.contains(idx) {
            -1.
        } else {
            1.
        }
    }
}
