//! Cells of a cubical complex in Khalimsky coordinates.
//!
//! Every cell of the cubical subdivision of `Z^DIM` is identified by
//! an integer vector whose odd entries mark the axes the cell spans.
//! A digital point `p` corresponds to the spel `2p + 1`
//! and to the pointel `2p`.

use nalgebra as na;

/// An unsigned cell of the `DIM`-dimensional Khalimsky space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell<const DIM: usize> {
    coords: [i32; DIM],
}

impl<const DIM: usize> Cell<DIM> {
    /// Cell with the given Khalimsky coordinates.
    #[inline]
    pub fn new(coords: [i32; DIM]) -> Self {
        Self { coords }
    }

    /// The top-dimensional cell of a digital point.
    #[inline]
    pub fn spel(point: [i32; DIM]) -> Self {
        Self::new(point.map(|p| 2 * p + 1))
    }

    /// The 0-cell at a digital point.
    #[inline]
    pub fn pointel(point: [i32; DIM]) -> Self {
        Self::new(point.map(|p| 2 * p))
    }

    /// Khalimsky coordinates of the cell.
    #[inline]
    pub fn coords(&self) -> [i32; DIM] {
        self.coords
    }

    /// Whether the cell spans the given axis.
    #[inline]
    pub fn is_open(&self, axis: usize) -> bool {
        self.coords[axis].rem_euclid(2) == 1
    }

    /// Topological dimension, i.e. the number of spanned axes.
    pub fn dim(&self) -> usize {
        self.open_axes().count()
    }

    /// Axes spanned by the cell, in increasing order.
    pub fn open_axes(self) -> impl Iterator<Item = usize> {
        (0..DIM).filter(move |&axis| self.is_open(axis))
    }

    /// Axes not spanned by the cell, in increasing order.
    pub fn closed_axes(self) -> impl Iterator<Item = usize> {
        (0..DIM).filter(move |&axis| !self.is_open(axis))
    }

    /// Geometric center of the cell in the unit-spaced digital grid.
    pub fn center(&self) -> na::SVector<f64, DIM> {
        na::SVector::from_fn(|axis, _| self.coords[axis] as f64 / 2.)
    }

    /// The cell moved by `delta` steps along `axis`.
    #[inline]
    pub fn offset(mut self, axis: usize, delta: i32) -> Self {
        self.coords[axis] += delta;
        self
    }

    /// This cell with the given orientation.
    #[inline]
    pub fn signed(self, positive: bool) -> SignedCell<DIM> {
        SignedCell {
            cell: self,
            positive,
        }
    }

    /// This cell with positive orientation.
    #[inline]
    pub fn positive(self) -> SignedCell<DIM> {
        self.signed(true)
    }

    /// This cell with negative orientation.
    #[inline]
    pub fn negative(self) -> SignedCell<DIM> {
        self.signed(false)
    }

    /// Faces of codimension one together with their incidence signs.
    ///
    /// Along the `j`th open axis `a` (counting from zero),
    /// the face at `+e_a` has sign `(-1)^j` and the face at `-e_a` the opposite sign.
    /// Applying this twice cancels out, i.e. the boundary of a boundary is empty.
    pub fn lower_incident(self) -> impl Iterator<Item = (Self, i8)> {
        self.open_axes().enumerate().flat_map(move |(j, axis)| {
            let sign = alternating(j);
            [(self.offset(axis, 1), sign), (self.offset(axis, -1), -sign)]
        })
    }

    /// Cofaces of dimension one higher together with
    /// the incidence sign of `self` in the boundary of each.
    pub fn upper_incident(self) -> impl Iterator<Item = (Self, i8)> {
        self.closed_axes().flat_map(move |axis| {
            let preceding_open = self.open_axes().take_while(|&a| a < axis).count();
            let sign = alternating(preceding_open);
            // self is the lower face of self + e_a and the upper face of self - e_a
            [(self.offset(axis, 1), -sign), (self.offset(axis, -1), sign)]
        })
    }

    /// The cell and all of its faces of every dimension.
    pub fn closure(self) -> Vec<Self> {
        let mut cells = vec![self];
        for axis in self.open_axes() {
            let count = cells.len();
            for i in 0..count {
                let cell = cells[i];
                cells.push(cell.offset(axis, -1));
                cells.push(cell.offset(axis, 1));
            }
        }
        cells
    }
}

impl<const DIM: usize> std::fmt::Display for Cell<DIM> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-cell {:?}", self.dim(), self.coords)
    }
}

#[inline]
fn alternating(j: usize) -> i8 {
    if j % 2 == 0 {
        1
    } else {
        -1
    }
}

/// A cell with an orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SignedCell<const DIM: usize> {
    /// The underlying unsigned cell.
    pub cell: Cell<DIM>,
    /// Whether the cell has its canonical orientation.
    pub positive: bool,
}

impl<const DIM: usize> SignedCell<DIM> {
    /// `1.` for positive orientation, `-1.` for negative.
    #[inline]
    pub fn sign(&self) -> f64 {
        if self.positive {
            1.
        } else {
            -1.
        }
    }
}

impl<const DIM: usize> std::ops::Neg for SignedCell<DIM> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            cell: self.cell,
            positive: !self.positive,
        }
    }
}
