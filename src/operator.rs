//! Linear operators between forms and the algebra to combine them.

use fixedbitset as fb;
use nalgebra_sparse as nas;

use crate::{complex::FormKind, DecError, Form, Subset};

/// A sparse linear map from forms of one kind to forms of another.
///
/// Operators are constructed with methods on
/// [`CubicalComplex`][crate::CubicalComplex]
/// (e.g. [`d`][crate::CubicalComplex::d] and [`star`][crate::CubicalComplex::star])
/// and combined with [`compose`] and [`combine`].
/// Both the input and output kinds are checked at every step,
/// so operators can only be chained in mathematically meaningful ways.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearOperator {
    input: FormKind,
    output: FormKind,
    mat: nas::CsrMatrix<f64>,
}

impl LinearOperator {
    #[inline]
    pub(crate) fn new(input: FormKind, output: FormKind, mat: nas::CsrMatrix<f64>) -> Self {
        Self { input, output, mat }
    }

    /// Build a diagonal operator.
    pub(crate) fn from_diagonal(input: FormKind, output: FormKind, diagonal: Vec<f64>) -> Self {
        // easiest way to get the diagonal pattern is to start from an identity matrix
        let mut mat = nas::CsrMatrix::identity(diagonal.len());
        for (mat_val, diag_val) in mat.values_mut().iter_mut().zip(diagonal) {
            *mat_val = diag_val;
        }
        Self::new(input, output, mat)
    }

    /// The kind of form this operator accepts.
    #[inline]
    pub fn input(&self) -> FormKind {
        self.input
    }

    /// The kind of form this operator produces.
    #[inline]
    pub fn output(&self) -> FormKind {
        self.output
    }

    /// The underlying sparse matrix.
    #[inline]
    pub fn matrix(&self) -> &nas::CsrMatrix<f64> {
        &self.mat
    }

    /// Consume the operator and return the underlying matrix.
    #[inline]
    pub fn into_csr(self) -> nas::CsrMatrix<f64> {
        self.mat
    }

    /// Number of explicitly stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.mat.nnz()
    }

    /// Whether the operator maps a form space to itself.
    pub fn is_square(&self) -> bool {
        self.input == self.output && self.mat.nrows() == self.mat.ncols()
    }

    /// Largest absolute value among the stored entries.
    pub fn max_abs_entry(&self) -> f64 {
        self.mat.values().iter().fold(0., |acc: f64, v| acc.max(v.abs()))
    }

    /// Apply this operator to a form.
    pub fn apply(&self, form: &Form) -> Result<Form, DecError> {
        if form.kind() != self.input {
            return Err(DecError::KindMismatch {
                expected: self.input,
                found: form.kind(),
            });
        }
        if form.len() != self.mat.ncols() {
            return Err(DecError::SizeMismatch {
                expected: self.mat.ncols(),
                found: form.len(),
            });
        }
        Ok(Form::from_values(self.output, &self.mat * form.values()))
    }

    /// Multiply every entry by a scalar.
    pub fn scale(mut self, s: f64) -> Self {
        self.mat *= s;
        self
    }

    /// Set a subset of elements in the output form to zero
    /// when this operator is applied
    /// (i.e. set a subset of rows in the operator matrix to zero).
    /// Useful for boundary conditions.
    ///
    /// The subset must be of the operator's output kind.
    pub fn exclude_subset(mut self, set: &Subset) -> Result<Self, DecError> {
        if set.kind() != self.output {
            return Err(DecError::KindMismatch {
                expected: self.output,
                found: set.kind(),
            });
        }
        self.mat = drop_csr_rows(self.mat, &set.indices);
        Ok(self)
    }
}

/// Compose two operators, giving an operator that applies `r` first and then `l`.
///
/// `l`'s input kind must equal `r`'s output kind.
pub fn compose(l: &LinearOperator, r: &LinearOperator) -> Result<LinearOperator, DecError> {
    if l.input != r.output {
        return Err(DecError::KindMismatch {
            expected: l.input,
            found: r.output,
        });
    }
    if l.mat.ncols() != r.mat.nrows() {
        return Err(DecError::SizeMismatch {
            expected: l.mat.ncols(),
            found: r.mat.nrows(),
        });
    }
    Ok(LinearOperator::new(r.input, l.output, &l.mat * &r.mat))
}

/// Compute `alpha * a + beta * b` for two operators of identical kinds and shapes.
pub fn combine(
    a: &LinearOperator,
    b: &LinearOperator,
    alpha: f64,
    beta: f64,
) -> Result<LinearOperator, DecError> {
    for (expected, found) in [(a.input, b.input), (a.output, b.output)] {
        if expected != found {
            return Err(DecError::KindMismatch { expected, found });
        }
    }
    for (expected, found) in [
        (a.mat.nrows(), b.mat.nrows()),
        (a.mat.ncols(), b.mat.ncols()),
    ] {
        if expected != found {
            return Err(DecError::SizeMismatch { expected, found });
        }
    }
    let mut lhs = a.mat.clone();
    lhs *= alpha;
    let mut rhs = b.mat.clone();
    rhs *= beta;
    Ok(LinearOperator::new(a.input, a.output, &lhs + &rhs))
}

/// Remove entries on the given rows of a CSR matrix.
fn drop_csr_rows(mat: nas::CsrMatrix<f64>, set_to_drop: &fb::FixedBitSet) -> nas::CsrMatrix<f64> {
    let num_rows = mat.nrows();
    let num_cols = mat.ncols();
    // disassemble to reuse allocated memory
    let (mut row_offsets, mut col_indices, mut values) = mat.disassemble();

    // compact the retained entries to the left,
    // rebuilding row_offsets as we go
    let mut retained_value_idx = 0;
    // row_offsets[row_idx + 1] is overwritten during the loop
    let mut prev_row_offset = 0;
    for row_idx in 0..num_rows {
        let old_row_range = prev_row_offset..row_offsets[row_idx + 1];
        prev_row_offset = row_offsets[row_idx + 1];

        if !set_to_drop.contains(row_idx) {
            for old_val_idx in old_row_range {
                col_indices[retained_value_idx] = col_indices[old_val_idx];
                values[retained_value_idx] = values[old_val_idx];
                retained_value_idx += 1;
            }
        }
        row_offsets[row_idx + 1] = retained_value_idx;
    }

    col_indices.truncate(retained_value_idx);
    values.truncate(retained_value_idx);

    // removing whole rows keeps the column order within the remaining rows intact
    nas::CsrMatrix::try_from_csr_data(num_rows, num_cols, row_offsets, col_indices, values)
        .expect("dropping rows preserves CSR invariants")
}

impl std::ops::Mul<LinearOperator> for f64 {
    type Output = LinearOperator;

    fn mul(self, rhs: LinearOperator) -> Self::Output {
        rhs.scale(self)
    }
}

impl std::ops::Mul<&LinearOperator> for f64 {
    type Output = LinearOperator;

    fn mul(self, rhs: &LinearOperator) -> Self::Output {
        rhs.clone().scale(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        complex::{grid_complex, CubicalComplex},
        khalimsky::Cell,
        Dual, Primal, Primality,
    };
    use approx::assert_relative_eq;
    use itertools::izip;
    use nalgebra as na;

    /// Copy of a complex where some cells are flipped and measures vary.
    fn perturbed<const DIM: usize>(complex: &CubicalComplex<DIM>) -> CubicalComplex<DIM> {
        let mut perturbed = CubicalComplex::new();
        for dim in 0..=DIM {
            for (i, cell) in complex.cells(dim, Primal).unwrap().iter().enumerate() {
                let flip = cell.coords().iter().sum::<i32>() % 3 == 0;
                perturbed
                    .insert_with_measures(
                        cell.signed(!flip),
                        1. + 0.1 * (i % 4) as f64,
                        0.5 + 0.2 * (i % 3) as f64,
                    )
                    .unwrap();
            }
        }
        perturbed
    }

    fn operators<const DIM: usize>(complex: &CubicalComplex<DIM>) -> Vec<LinearOperator> {
        let mut ops = Vec::new();
        for primality in [Primal, Dual] {
            for k in 0..=DIM {
                if k < DIM {
                    ops.push(complex.d(k, primality).unwrap());
                }
                ops.push(complex.star(k, primality).unwrap());
                ops.push(complex.identity(k, primality).unwrap());
            }
        }
        ops
    }

    #[test]
    fn exterior_derivative_works_in_2d() {
        let complex = grid_complex([2, 1]);
        let mut c0 = complex.new_zero_form(0, Primal).unwrap();
        for (i, val) in c0.values_mut().iter_mut().enumerate() {
            *val = i as f64;
        }
        let d0 = complex.d(0, Primal).unwrap();
        let c1 = d0.apply(&c0).unwrap();
        assert_eq!(c1.kind(), FormKind::primal(1));

        // each edge gets the difference between its endpoints
        for (edge, value) in complex.form_entries(&c1).unwrap() {
            let axis = edge.open_axes().next().unwrap();
            let end = complex.index_of(&edge.offset(axis, 1)).unwrap();
            let start = complex.index_of(&edge.offset(axis, -1)).unwrap();
            assert_eq!(value, c0[end] - c0[start]);
        }

        let c2 = complex.d(1, Primal).unwrap().apply(&c1).unwrap();
        assert!(
            c2.values().iter().all(|v| *v == 0.),
            "d twice should always be zero"
        );

        // a primal 1-form can't be given to d_0
        assert_eq!(
            d0.apply(&c1),
            Err(DecError::KindMismatch {
                expected: FormKind::primal(0),
                found: FormKind::primal(1),
            })
        );
    }

    fn assert_dd_vanishes<const DIM: usize>(complex: &CubicalComplex<DIM>) {
        for primality in [Primal, Dual] {
            for k in 0..DIM - 1 {
                let dd = compose(
                    &complex.d(k + 1, primality).unwrap(),
                    &complex.d(k, primality).unwrap(),
                )
                .unwrap();
                assert_eq!(dd.input(), FormKind::new(k, primality));
                assert_eq!(dd.output(), FormKind::new(k + 2, primality));
                assert_eq!(
                    dd.max_abs_entry(),
                    0.,
                    "{primality} d_{} d_{k} should be zero",
                    k + 1
                );
            }
        }
    }

    #[test]
    fn dd_vanishes() {
        let complex_2d = grid_complex([4, 3]);
        assert_dd_vanishes(&complex_2d);
        assert_dd_vanishes(&perturbed(&complex_2d));

        let complex_3d = grid_complex([3, 2, 2]);
        assert_dd_vanishes(&complex_3d);
        let perturbed_3d = perturbed(&complex_3d);
        assert!((0..3).any(|i| perturbed_3d.cell_index(1, Primal).unwrap().is_flipped(i)));
        assert_dd_vanishes(&perturbed_3d);
    }

    #[test]
    fn dual_d_is_signed_transpose() {
        let complex = perturbed(&grid_complex([3, 3]));
        assert_eq!(
            complex.d(0, Dual).unwrap().into_csr(),
            complex.d(1, Primal).unwrap().scale(-1.).into_csr().transpose(),
        );
        assert_eq!(
            complex.d(1, Dual).unwrap().into_csr(),
            complex.d(0, Primal).unwrap().into_csr().transpose(),
        );

        let complex = grid_complex([2, 2, 2]);
        for k in 0..3 {
            let sign = if (2 - k) % 2 == 0 { 1. } else { -1. };
            assert_eq!(
                complex.d(k, Dual).unwrap().into_csr(),
                complex.d(2 - k, Primal).unwrap().scale(sign).into_csr().transpose(),
            );
        }
    }

    #[test]
    fn star_star_is_signed_identity() {
        fn check<const DIM: usize>(complex: &CubicalComplex<DIM>) {
            for primality in [Primal, Dual] {
                for k in 0..=DIM {
                    let star = complex.star(k, primality).unwrap();
                    let back = complex.star(DIM - k, primality.opposite()).unwrap();
                    let star_star = compose(&back, &star).unwrap();
                    assert_eq!(star_star.input(), star_star.output());
                    let sign = if k * (DIM - k) % 2 == 0 { 1. } else { -1. };
                    for (row, col, val) in star_star.matrix().triplet_iter() {
                        assert_eq!(row, col);
                        assert_relative_eq!(*val, sign, epsilon = 1e-12);
                    }
                    assert_eq!(star_star.nnz(), complex.size(k, primality));
                }
            }
        }
        check(&perturbed(&grid_complex([3, 2])));
        check(&perturbed(&grid_complex([2, 2, 2])));
    }

    #[test]
    fn composition_checks_every_kind_pair() {
        let complex = grid_complex([3, 2]);
        let ops = operators(&complex);
        for l in &ops {
            for r in &ops {
                let result = compose(l, r);
                if l.input() == r.output() {
                    let composed = result.unwrap();
                    assert_eq!(composed.input(), r.input());
                    assert_eq!(composed.output(), l.output());
                } else {
                    assert_eq!(
                        result,
                        Err(DecError::KindMismatch {
                            expected: l.input(),
                            found: r.output(),
                        })
                    );
                }
            }
        }
    }

    #[test]
    fn stale_operators_are_detected() {
        let mut complex = grid_complex([2, 2]);
        let d0 = complex.d(0, Primal).unwrap();
        let old_d1 = complex.d(1, Primal).unwrap();
        for cell in Cell::spel([2, 0]).closure() {
            if !complex.contains(&cell) {
                complex.insert(cell.positive(), 1.).unwrap();
            }
        }
        let form = complex.new_zero_form(0, Primal).unwrap();
        assert!(matches!(
            d0.apply(&form),
            Err(DecError::SizeMismatch { expected: 9, found: 11 })
        ));
        let new_d0 = complex.d(0, Primal).unwrap();
        assert!(matches!(
            compose(&old_d1, &new_d0),
            Err(DecError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn linear_combinations() {
        let complex = grid_complex([3, 3]);
        let lap = complex.laplacian(Dual).unwrap();
        let id = complex.identity(0, Dual).unwrap();
        let shifted = combine(&lap, &id, 2., 0.5).unwrap();

        let mut form = complex.new_zero_form(0, Dual).unwrap();
        for (i, v) in form.values_mut().iter_mut().enumerate() {
            *v = (i as f64 * 0.7).cos();
        }
        let expected = Form::linear_combination(
            2.,
            &lap.apply(&form).unwrap(),
            0.5,
            &form,
        )
        .unwrap();
        let result = shifted.apply(&form).unwrap();
        for (r, e) in izip!(result.values().iter(), expected.values().iter()) {
            assert_relative_eq!(*r, *e, epsilon = 1e-12);
        }

        assert_eq!((3. * &id).max_abs_entry(), 3.);
        assert!(matches!(
            combine(&lap, &complex.identity(0, Primal).unwrap(), 1., 1.),
            Err(DecError::KindMismatch { .. })
        ));
    }

    fn assert_laplacian_is_symmetric_psd<const DIM: usize>(
        complex: &CubicalComplex<DIM>,
        primality: Primality,
    ) {
        let lap = complex.laplacian(primality).unwrap();
        assert!(lap.is_square());
        assert_eq!(lap.input(), FormKind::new(0, primality));
        let dense = na::DMatrix::from(lap.matrix());
        assert_eq!(dense, dense.transpose());
        let eigenvalues = dense.symmetric_eigenvalues();
        assert!(
            eigenvalues.iter().all(|&ev| ev > -1e-10),
            "{primality} Laplacian has negative eigenvalues: {eigenvalues}"
        );
    }

    #[test]
    fn laplacians_are_positive_semidefinite() {
        for primality in [Primal, Dual] {
            assert_laplacian_is_symmetric_psd(&grid_complex([4, 3]), primality);
            assert_laplacian_is_symmetric_psd(&grid_complex([2, 3, 2]), primality);
        }

        // constants are in the kernel of the primal Laplacian
        let complex = grid_complex([4, 4]);
        let mut ones = complex.new_zero_form(0, Primal).unwrap();
        ones.values_mut().fill(1.);
        let lap_ones = complex.laplacian(Primal).unwrap().apply(&ones).unwrap();
        assert_eq!(lap_ones.norm(), 0.);
    }

    #[test]
    fn exclude_subsets() {
        let complex = grid_complex([3, 3]);

        let d0_full = complex.d(0, Primal).unwrap();
        let boundary = complex.boundary(1).unwrap();
        let d0_excluded = d0_full.clone().exclude_subset(&boundary).unwrap();
        for (row_idx, (full_row, excluded_row)) in
            izip!(d0_full.matrix().row_iter(), d0_excluded.matrix().row_iter()).enumerate()
        {
            if boundary.indices.contains(row_idx) {
                assert!(excluded_row.nnz() == 0);
            } else {
                assert_eq!(full_row, excluded_row);
            }
        }

        // dual 1-cells share the indices of primal 1-cells in 2D
        let dual_boundary = boundary.dual(&complex).unwrap();
        let star = complex.star(1, Primal).unwrap();
        let star_excluded = star.exclude_subset(&dual_boundary).unwrap();
        for (idx, row) in star_excluded.matrix().row_iter().enumerate() {
            assert_eq!(row.nnz() == 0, boundary.indices.contains(idx));
        }

        assert!(matches!(
            d0_full.exclude_subset(&complex.boundary(0).unwrap()),
            Err(DecError::KindMismatch { .. })
        ));
    }
}
