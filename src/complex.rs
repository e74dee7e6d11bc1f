//! The cubical cell complex and the operators built from it.

mod cell_index;
pub use cell_index::CellIndex;

mod subset;
pub use subset::Subset;

use fixedbitset as fb;
use itertools::izip;
use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{
    khalimsky::{Cell, SignedCell},
    operator::{compose, LinearOperator},
    DecError, Form,
};

/// Marker for whether a form lives on the primal or the dual complex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primality {
    /// Cells of the complex itself.
    Primal,
    /// Cells of the dual complex.
    /// Dual `k`-cells are identified with primal `DIM - k`-cells.
    Dual,
}

impl Primality {
    /// The other primality.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Primal => Dual,
            Dual => Primal,
        }
    }
}

use Primality::{Dual, Primal};

impl std::fmt::Display for Primality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Primal => write!(f, "primal"),
            Dual => write!(f, "dual"),
        }
    }
}

/// The dimension and primality of a form,
/// carried by forms, operators, subsets and solvers
/// to keep incompatible values apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FormKind {
    /// Dimension of the cells the form's values live on.
    pub dim: usize,
    /// Whether the cells are primal or dual.
    pub primality: Primality,
}

impl FormKind {
    /// Kind with the given dimension and primality.
    #[inline]
    pub fn new(dim: usize, primality: Primality) -> Self {
        Self { dim, primality }
    }

    /// Primal `dim`-form.
    #[inline]
    pub fn primal(dim: usize) -> Self {
        Self::new(dim, Primal)
    }

    /// Dual `dim`-form.
    #[inline]
    pub fn dual(dim: usize) -> Self {
        Self::new(dim, Dual)
    }

    /// The kind a Hodge star maps this kind to in a `mesh_dim`-dimensional complex,
    /// or `None` if the dimension exceeds `mesh_dim`.
    #[inline]
    pub fn hodge_dual(self, mesh_dim: usize) -> Option<Self> {
        let dim = mesh_dim.checked_sub(self.dim)?;
        Some(Self::new(dim, self.primality.opposite()))
    }
}

impl std::fmt::Display for FormKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}-form", self.primality, self.dim)
    }
}

/// A cubical cell complex embedded in `Z^DIM`.
///
/// Cells are added one by one with [`insert`][Self::insert]
/// or from a set of digital points with [`from_spels`][Self::from_spels].
/// Each dimension has its own dense [`CellIndex`];
/// dual `k`-cells share the index of the primal `DIM - k`-cells
/// with the same coordinates.
///
/// Forms and operators built from the complex are snapshots
/// of the index spaces at the time of construction.
#[derive(Clone, Debug)]
pub struct CubicalComplex<const DIM: usize> {
    indices: Vec<CellIndex<DIM>>,
}

impl<const DIM: usize> Default for CubicalComplex<DIM> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DIM: usize> CubicalComplex<DIM> {
    /// Create an empty complex.
    pub fn new() -> Self {
        Self {
            indices: (0..=DIM).map(|_| CellIndex::default()).collect(),
        }
    }

    /// Create a complex from a set of digital points.
    ///
    /// Each point contributes its spel and every face of it,
    /// all with positive orientation and unit measures.
    /// Faces shared between neighboring spels are indexed once,
    /// in the order they are first encountered.
    pub fn from_spels(points: impl IntoIterator<Item = [i32; DIM]>) -> Self {
        let mut complex = Self::new();
        for point in points {
            for cell in Cell::spel(point).closure() {
                let index = &mut complex.indices[cell.dim()];
                if !index.contains(&cell) {
                    index.push(cell, false, 1., 1.);
                }
            }
        }
        log::debug!(
            "built complex with cell counts {:?}",
            complex.indices.iter().map(|i| i.len()).collect::<Vec<_>>()
        );
        complex
    }

    /// Insert a signed cell with the given primal measure and unit dual measure.
    ///
    /// Returns the index assigned to the cell.
    /// See [`insert_with_measures`][Self::insert_with_measures].
    #[inline]
    pub fn insert(&mut self, cell: SignedCell<DIM>, weight: f64) -> Result<usize, DecError> {
        self.insert_with_measures(cell, weight, 1.)
    }

    /// Insert a signed cell with the given primal and dual measures.
    ///
    /// Negatively oriented cells are stored with a flip bit
    /// and a negated weight;
    /// operators built afterwards express values in the flipped orientation.
    /// Inserting a cell that is already present fails
    /// with [`DecError::DuplicateCell`] and leaves the complex unchanged.
    pub fn insert_with_measures(
        &mut self,
        cell: SignedCell<DIM>,
        primal_measure: f64,
        dual_measure: f64,
    ) -> Result<usize, DecError> {
        let dim = cell.cell.dim();
        self.indices[dim].insert(cell, primal_measure, dual_measure)
    }

    /// Whether the cell is part of the complex.
    #[inline]
    pub fn contains(&self, cell: &Cell<DIM>) -> bool {
        self.indices[cell.dim()].contains(cell)
    }

    /// Index of a cell in its primal index space.
    ///
    /// The same index is the cell's index as a dual `DIM - k`-cell.
    #[inline]
    pub fn index_of(&self, cell: &Cell<DIM>) -> Option<usize> {
        self.indices[cell.dim()].index_of(cell)
    }

    /// Number of cells of the given dimension and primality.
    ///
    /// Returns zero for dimensions that don't exist in the complex.
    pub fn size(&self, dim: usize, primality: Primality) -> usize {
        self.primal_dim(FormKind::new(dim, primality))
            .map_or(0, |primal_dim| self.indices[primal_dim].len())
    }

    /// The index space of cells of the given dimension and primality.
    pub fn cell_index(&self, dim: usize, primality: Primality) -> Result<&CellIndex<DIM>, DecError> {
        let primal_dim = self.primal_dim(FormKind::new(dim, primality))?;
        Ok(&self.indices[primal_dim])
    }

    /// The cells of the given dimension and primality in index order.
    ///
    /// Dual cells are given as their primal counterparts.
    pub fn cells(&self, dim: usize, primality: Primality) -> Result<&[Cell<DIM>], DecError> {
        Ok(self.cell_index(dim, primality)?.cells())
    }

    /// The signed cell at an index.
    pub fn cell(&self, dim: usize, primality: Primality, idx: usize) -> Option<SignedCell<DIM>> {
        self.cell_index(dim, primality).ok()?.cell(idx)
    }

    /// Convert a form kind to the dimension of the primal index space it lives on.
    pub(crate) fn primal_dim(&self, kind: FormKind) -> Result<usize, DecError> {
        if kind.dim > DIM {
            return Err(DecError::InvalidDimension {
                dim: kind.dim,
                mesh_dim: DIM,
            });
        }
        Ok(match kind.primality {
            Primal => kind.dim,
            Dual => DIM - kind.dim,
        })
    }

    #[inline]
    pub(crate) fn index_space(&self, kind: FormKind) -> &CellIndex<DIM> {
        match kind.primality {
            Primal => &self.indices[kind.dim],
            Dual => &self.indices[DIM - kind.dim],
        }
    }

    /// Create a form with a value of zero for each cell
    /// of the given dimension and primality.
    pub fn new_zero_form(&self, dim: usize, primality: Primality) -> Result<Form, DecError> {
        let kind = FormKind::new(dim, primality);
        let primal_dim = self.primal_dim(kind)?;
        Ok(Form::zeros(kind, self.indices[primal_dim].len()))
    }

    /// Iterate over the values of a form paired with the cells they belong to.
    pub fn form_entries<'a>(
        &'a self,
        form: &'a Form,
    ) -> Result<impl 'a + Iterator<Item = (Cell<DIM>, f64)>, DecError> {
        let primal_dim = self.primal_dim(form.kind())?;
        let cells = self.indices[primal_dim].cells();
        if cells.len() != form.len() {
            return Err(DecError::SizeMismatch {
                expected: cells.len(),
                found: form.len(),
            });
        }
        Ok(izip!(cells.iter().copied(), form.values().iter().copied()))
    }

    //
    // operators
    //

    /// Primal coboundary matrix from `k`-cells to `k + 1`-cells,
    /// in the orientation each cell was inserted with.
    fn primal_coboundary(&self, k: usize) -> nas::CsrMatrix<f64> {
        let rows = &self.indices[k + 1];
        let cols = &self.indices[k];
        let mut coo = nas::CooMatrix::new(rows.len(), cols.len());
        for (row_idx, row_cell) in rows.cells().iter().enumerate() {
            let row_sign = rows.orientation(row_idx);
            for (face, incidence) in row_cell.lower_incident() {
                // partial complexes may lack some faces
                let Some(col_idx) = cols.index_of(&face) else {
                    continue;
                };
                coo.push(
                    row_idx,
                    col_idx,
                    incidence as f64 * row_sign * cols.orientation(col_idx),
                );
            }
        }
        nas::CsrMatrix::from(&coo)
    }

    /// Construct an exterior derivative operator
    /// from `k`-forms to `k + 1`-forms of the given primality.
    ///
    /// The dual derivative is the transpose of the primal one
    /// times `(-1)^(DIM - 1 - k)`,
    /// which makes `star d star d` on 0-forms positive semidefinite
    /// for both primalities.
    pub fn d(&self, k: usize, primality: Primality) -> Result<LinearOperator, DecError> {
        if k >= DIM {
            return Err(DecError::InvalidDimension {
                dim: k + 1,
                mesh_dim: DIM,
            });
        }
        let input = FormKind::new(k, primality);
        let output = FormKind::new(k + 1, primality);
        let mat = match primality {
            Primal => self.primal_coboundary(k),
            Dual => {
                let mut mat = self.primal_coboundary(DIM - k - 1).transpose();
                if (DIM - 1 - k) % 2 != 0 {
                    mat *= -1.;
                }
                mat
            }
        };
        log::debug!(
            "built d from {input} to {output}: {}x{}, {} entries",
            mat.nrows(),
            mat.ncols(),
            mat.nnz()
        );
        Ok(LinearOperator::new(input, output, mat))
    }

    /// Construct a Hodge star operator from `k`-forms of the given primality
    /// to `DIM - k`-forms of the opposite primality.
    ///
    /// The primal star scales by dual measure over primal measure
    /// and the dual star by the inverse,
    /// with a sign on the dual star such that applying both
    /// gives `(-1)^(k * (DIM - k))` times identity.
    pub fn star(&self, k: usize, primality: Primality) -> Result<LinearOperator, DecError> {
        let input = FormKind::new(k, primality);
        let primal_dim = self.primal_dim(input)?;
        let index = &self.indices[primal_dim];
        let pairs = izip!(index.weights(), index.dual_measures());
        let diag: Vec<f64> = match primality {
            Primal => pairs.map(|(w, dual)| dual / w.abs()).collect(),
            Dual => {
                let sign = if primal_dim * (DIM - primal_dim) % 2 == 0 {
                    1.
                } else {
                    -1.
                };
                pairs.map(|(w, dual)| sign * w.abs() / dual).collect()
            }
        };
        // primal_dim has checked the dimension
        let output = input.hodge_dual(DIM).ok_or(DecError::InvalidDimension {
            dim: k,
            mesh_dim: DIM,
        })?;
        Ok(LinearOperator::from_diagonal(input, output, diag))
    }

    /// Identity operator on forms of the given dimension and primality.
    pub fn identity(&self, k: usize, primality: Primality) -> Result<LinearOperator, DecError> {
        let kind = FormKind::new(k, primality);
        let primal_dim = self.primal_dim(kind)?;
        Ok(LinearOperator::new(
            kind,
            kind,
            nas::CsrMatrix::identity(self.indices[primal_dim].len()),
        ))
    }

    /// Construct the codifferential `star d star`
    /// from `k`-forms to `k - 1`-forms of the same primality.
    ///
    /// Requires `1 <= k <= DIM`.
    pub fn codifferential(&self, k: usize, primality: Primality) -> Result<LinearOperator, DecError> {
        if k == 0 || k > DIM {
            return Err(DecError::InvalidDimension { dim: k, mesh_dim: DIM });
        }
        let dual = primality.opposite();
        let star_in = self.star(k, primality)?;
        let d = self.d(DIM - k, dual)?;
        let star_out = self.star(DIM - k + 1, dual)?;
        compose(&star_out, &compose(&d, &star_in)?)
    }

    /// Construct the Laplacian `star d star d` on 0-forms of the given primality.
    pub fn laplacian(&self, primality: Primality) -> Result<LinearOperator, DecError> {
        compose(&self.codifferential(1, primality)?, &self.d(0, primality)?)
    }

    //
    // subsets
    //

    /// Get the set of primal `k`-cells on the boundary of the complex.
    ///
    /// These are the faces of the `DIM - 1`-cells
    /// that bound exactly one indexed `DIM`-cell.
    /// The highest-dimensional cells have no boundary subset.
    pub fn boundary(&self, k: usize) -> Result<Subset, DecError> {
        if k >= DIM {
            return Err(DecError::InvalidDimension { dim: k, mesh_dim: DIM });
        }
        let top = &self.indices[DIM];
        let target = &self.indices[k];
        let mut indices = fb::FixedBitSet::with_capacity(target.len());
        for facet in self.indices[DIM - 1].cells() {
            let coface_count = facet
                .upper_incident()
                .filter(|(coface, _)| top.contains(coface))
                .count();
            if coface_count != 1 {
                continue;
            }
            for face in facet.closure() {
                if let Some(idx) = target.index_of(&face) {
                    indices.insert(idx);
                }
            }
        }
        Ok(Subset::new(FormKind::primal(k), indices))
    }

    /// Positions of the 0-cells of the given primality,
    /// i.e. pointels for primal and spels for dual.
    pub fn vertices(&self, primality: Primality) -> impl '_ + Iterator<Item = na::SVector<f64, DIM>> {
        self.index_space(FormKind::new(0, primality))
            .cells()
            .iter()
            .map(|c| c.center())
    }
}

/// A complex made of every spel in the box `[0, size)`.
#[doc(hidden)]
pub fn grid_complex<const DIM: usize>(size: [i32; DIM]) -> CubicalComplex<DIM> {
    let count: i32 = size.iter().product();
    CubicalComplex::from_spels((0..count).map(|mut flat| {
        let mut point = [0; DIM];
        for (coord, extent) in izip!(point.iter_mut(), size) {
            *coord = flat % extent;
            flat /= extent;
        }
        point
    }))
}

/// A square of `size x size` spels with a square hole
/// covering `hole` along both axes.
#[doc(hidden)]
pub fn ring_complex(size: i32, hole: std::ops::Range<i32>) -> CubicalComplex<2> {
    let points = (0..size)
        .flat_map(|y| (0..size).map(move |x| [x, y]))
        .filter(|[x, y]| !(hole.contains(x) && hole.contains(y)));
    CubicalComplex::from_spels(points.collect::<Vec<_>>())
}

/// The closed surface around a set of spels,
/// made of the boundary cells of the solid they form.
/// Every other 1- and 2-cell is inserted with negative orientation.
#[doc(hidden)]
pub fn shell_complex(
    points: impl IntoIterator<Item = [i32; 3]>,
) -> Result<CubicalComplex<3>, DecError> {
    let solid = CubicalComplex::from_spels(points);
    let mut shell = CubicalComplex::new();
    for dim in 0..3 {
        let cells = solid.cells(dim, Primal)?;
        for (count, idx) in solid.boundary(dim)?.indices.ones().enumerate() {
            shell.insert(cells[idx].signed(dim == 0 || count % 2 == 0), 1.)?;
        }
    }
    Ok(shell)
}
