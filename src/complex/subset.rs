use fixedbitset as fb;

use super::{CubicalComplex, FormKind};
use crate::DecError;

/// A subset of the cells of one dimension and primality in a complex.
///
/// Can be used to restrict operations to certain parts of the complex,
/// e.g. with [`LinearOperator::exclude_subset`][crate::LinearOperator::exclude_subset],
/// useful for boundary conditions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subset {
    kind: FormKind,
    /// A bitset containing the indices of cells present in the subset.
    ///
    /// Iterate over the indices with `indices.ones()`.
    pub indices: fb::FixedBitSet,
}

impl Subset {
    #[inline]
    pub(crate) fn new(kind: FormKind, indices: fb::FixedBitSet) -> Self {
        Self { kind, indices }
    }

    /// Create a subset from an iterator of cell indices.
    pub fn from_indices(kind: FormKind, indices: impl IntoIterator<Item = usize>) -> Self {
        Self::new(kind, indices.into_iter().collect())
    }

    /// Create an empty subset.
    ///
    /// Handy as a starting point when taking unions of many subsets.
    pub fn new_empty(kind: FormKind) -> Self {
        Self::new(kind, fb::FixedBitSet::new())
    }

    /// Create a subset containing every cell of the given kind in the complex.
    pub fn new_full<const DIM: usize>(
        complex: &CubicalComplex<DIM>,
        kind: FormKind,
    ) -> Result<Self, DecError> {
        let count = complex.cell_index(kind.dim, kind.primality)?.len();
        let mut indices = fb::FixedBitSet::with_capacity(count);
        indices.set_range(.., true);
        Ok(Self::new(kind, indices))
    }

    /// The kind of cells this subset contains.
    #[inline]
    pub fn kind(&self) -> FormKind {
        self.kind
    }

    /// Whether the cell at an index is in the subset.
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.indices.contains(idx)
    }

    /// Get the number of cells in this subset.
    #[inline]
    pub fn count(&self) -> usize {
        self.indices.count_ones(..)
    }

    /// Take the complement of a subset, i.e. the cells not in that subset.
    pub fn complement<const DIM: usize>(
        &self,
        complex: &CubicalComplex<DIM>,
    ) -> Result<Self, DecError> {
        let mut indices = Self::new_full(complex, self.kind)?.indices;
        indices.difference_with(&self.indices);
        Ok(Self::new(self.kind, indices))
    }

    /// Create a subset containing the dual cells of this one.
    ///
    /// Dual cells share indices with their primal counterparts,
    /// so only the kind changes.
    /// Fails if the subset's dimension doesn't exist in the complex.
    pub fn dual<const DIM: usize>(&self, _complex: &CubicalComplex<DIM>) -> Result<Self, DecError> {
        let kind = self.kind.hodge_dual(DIM).ok_or(DecError::InvalidDimension {
            dim: self.kind.dim,
            mesh_dim: DIM,
        })?;
        Ok(Self::new(kind, self.indices.clone()))
    }

    fn check_kind(&self, other: &Self) -> Result<(), DecError> {
        if self.kind != other.kind {
            return Err(DecError::KindMismatch {
                expected: self.kind,
                found: other.kind,
            });
        }
        Ok(())
    }

    /// Take the intersection (i.e. set of cells that are in both)
    /// of this subset with another of the same kind.
    pub fn intersection(&self, other: &Self) -> Result<Self, DecError> {
        self.check_kind(other)?;
        // fixedbitset's in-place operations avoid collecting from an iterator
        let mut indices = self.indices.clone();
        indices.intersect_with(&other.indices);
        Ok(Self::new(self.kind, indices))
    }

    /// Take the union (i.e. set of cells that are in one or the other)
    /// of this subset with another of the same kind.
    pub fn union(&self, other: &Self) -> Result<Self, DecError> {
        self.check_kind(other)?;
        let mut indices = self.indices.clone();
        indices.union_with(&other.indices);
        Ok(Self::new(self.kind, indices))
    }

    /// Take the difference (i.e. set of cells that are in `self` but not in `other`)
    /// of this subset with another of the same kind.
    pub fn difference(&self, other: &Self) -> Result<Self, DecError> {
        self.check_kind(other)?;
        let mut indices = self.indices.clone();
        indices.difference_with(&other.indices);
        Ok(Self::new(self.kind, indices))
    }
}
