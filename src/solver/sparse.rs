//! Sparse direct factorizations of square CSR matrices.
//!
//! Factors are stored column by column (rows for QR)
//! as sorted lists of `(index, value)` pairs,
//! so memory grows with the fill-in rather than the square of the size.

use itertools::{EitherOrBoth, Itertools};
use nalgebra as na;
use nalgebra_sparse as nas;

use super::SolverFailure;

/// A sparse vector as sorted `(index, value)` pairs.
type SparseVec = Vec<(usize, f64)>;

/// Fraction of the largest candidate a diagonal pivot may have
/// and still be preferred over it.
const DIAGONAL_PREFERENCE: f64 = 0.1;

fn largest_entry(mat: &nas::CsrMatrix<f64>) -> f64 {
    mat.values().iter().fold(0., |acc: f64, v| acc.max(v.abs()))
}

/// Magnitude at or below which a pivot counts as zero.
fn zero_pivot_threshold(mat: &nas::CsrMatrix<f64>) -> f64 {
    f64::EPSILON * mat.nrows() as f64 * largest_entry(mat)
}

//
// LU
//

/// `P A = L U` with threshold partial pivoting,
/// computed column by column with sparse triangular solves.
#[derive(Clone, Debug)]
pub(super) struct SparseLu {
    /// Strictly lower part of the unit lower factor, rows in pivot order.
    l: Vec<SparseVec>,
    /// Strictly upper part of the upper factor.
    u: Vec<SparseVec>,
    u_diag: Vec<f64>,
    /// Pivot position of each original row.
    pinv: Vec<usize>,
}

impl SparseLu {
    pub fn factor(mat: &nas::CsrMatrix<f64>) -> Result<Self, SolverFailure> {
        let n = mat.nrows();
        let csc = nas::CscMatrix::from(mat);
        let threshold = zero_pivot_threshold(mat);

        let mut pinv: Vec<Option<usize>> = vec![None; n];
        // rows in original numbering until every row has a pivot
        let mut l: Vec<SparseVec> = Vec::with_capacity(n);
        let mut u: Vec<SparseVec> = Vec::with_capacity(n);
        let mut u_diag = Vec::with_capacity(n);

        let mut x = vec![0.; n];
        let mut marked = vec![false; n];
        let mut stack: Vec<(usize, usize)> = Vec::new();
        let mut postorder: Vec<usize> = Vec::new();

        for k in 0..n {
            let col = csc.col(k);

            // rows reachable from the column's pattern through the columns of L
            postorder.clear();
            for &start in col.row_indices() {
                if marked[start] {
                    continue;
                }
                marked[start] = true;
                stack.push((start, 0));
                while let Some((node, child)) = stack.pop() {
                    let successors: &[(usize, f64)] = match pinv[node] {
                        Some(j) => &l[j],
                        None => &[],
                    };
                    match successors[child..].iter().position(|&(r, _)| !marked[r]) {
                        Some(offset) => {
                            let next = successors[child + offset].0;
                            stack.push((node, child + offset + 1));
                            marked[next] = true;
                            stack.push((next, 0));
                        }
                        None => postorder.push(node),
                    }
                }
            }

            for (&row, &val) in col.row_indices().iter().zip(col.values()) {
                x[row] = val;
            }
            for &row in postorder.iter().rev() {
                if let Some(j) = pinv[row] {
                    let xj = x[row];
                    for &(r, lv) in &l[j] {
                        x[r] -= lv * xj;
                    }
                }
            }

            let mut best: Option<(usize, f64)> = None;
            for &row in &postorder {
                if pinv[row].is_none() && best.map_or(true, |(_, b)| x[row].abs() > b) {
                    best = Some((row, x[row].abs()));
                }
            }
            let pivot_row = match best {
                Some((_, largest)) if largest <= threshold => None,
                Some((_, largest))
                    if pinv[k].is_none()
                        && marked[k]
                        && x[k].abs() >= DIAGONAL_PREFERENCE * largest =>
                {
                    Some(k)
                }
                Some((row, _)) => Some(row),
                None => None,
            };
            let Some(pivot_row) = pivot_row else {
                log::debug!("zero pivot in column {k} of sparse LU");
                return Err(SolverFailure::Singular);
            };
            let pivot = x[pivot_row];

            let mut u_col = SparseVec::new();
            let mut l_col = SparseVec::new();
            for &row in &postorder {
                let val = x[row];
                match pinv[row] {
                    Some(j) if val != 0. => u_col.push((j, val)),
                    None if row != pivot_row && val != 0. => l_col.push((row, val / pivot)),
                    _ => {}
                }
                x[row] = 0.;
                marked[row] = false;
            }
            u_col.sort_unstable_by_key(|&(j, _)| j);
            pinv[pivot_row] = Some(k);
            u.push(u_col);
            u_diag.push(pivot);
            l.push(l_col);
        }

        // every column claimed a distinct row
        let pinv: Vec<usize> = pinv
            .into_iter()
            .collect::<Option<_>>()
            .ok_or(SolverFailure::Singular)?;
        for col in &mut l {
            for entry in col.iter_mut() {
                entry.0 = pinv[entry.0];
            }
            col.sort_unstable_by_key(|&(r, _)| r);
        }

        Ok(Self {
            l,
            u,
            u_diag,
            pinv,
        })
    }

    /// Number of stored entries in both factors.
    pub fn nnz(&self) -> usize {
        self.l.iter().chain(&self.u).map(Vec::len).sum::<usize>() + self.u_diag.len()
    }

    pub fn solve(&self, b: &na::DVector<f64>) -> na::DVector<f64> {
        let mut y = na::DVector::zeros(b.len());
        for (row, &pos) in self.pinv.iter().enumerate() {
            y[pos] = b[row];
        }
        for (j, col) in self.l.iter().enumerate() {
            let yj = y[j];
            for &(r, lv) in col {
                y[r] -= lv * yj;
            }
        }
        for j in (0..y.len()).rev() {
            y[j] /= self.u_diag[j];
            let yj = y[j];
            for &(r, uv) in &self.u[j] {
                y[r] -= uv * yj;
            }
        }
        y
    }
}

//
// LDLT
//

/// `A = L D L^T` of a symmetric matrix without pivoting,
/// computed row by row along the elimination tree.
///
/// Only the upper triangle of the matrix is read.
#[derive(Clone, Debug)]
pub(super) struct SparseLdlt {
    /// Strictly lower part of the unit lower factor by columns.
    l: Vec<SparseVec>,
    d: Vec<f64>,
}

impl SparseLdlt {
    pub fn factor(mat: &nas::CsrMatrix<f64>) -> Result<Self, SolverFailure> {
        let n = mat.nrows();
        let csc = nas::CscMatrix::from(mat);
        let threshold = zero_pivot_threshold(mat);

        // elimination tree
        let mut parent: Vec<Option<usize>> = vec![None; n];
        let mut flag: Vec<usize> = (0..n).collect();
        for k in 0..n {
            for &row in csc.col(k).row_indices().iter().filter(|&&r| r < k) {
                let mut i = row;
                while flag[i] != k {
                    if parent[i].is_none() {
                        parent[i] = Some(k);
                    }
                    flag[i] = k;
                    let Some(next) = parent[i] else { break };
                    i = next;
                }
            }
        }

        let mut l: Vec<SparseVec> = vec![SparseVec::new(); n];
        let mut d = vec![0.; n];
        let mut y = vec![0.; n];
        let mut flag = vec![usize::MAX; n];
        let mut path: Vec<usize> = Vec::new();
        let mut pattern: Vec<usize> = Vec::new();

        for k in 0..n {
            // nonzero pattern of row k of L, in topological order
            pattern.clear();
            flag[k] = k;
            let col = csc.col(k);
            for (&row, &val) in col.row_indices().iter().zip(col.values()) {
                if row > k {
                    continue;
                }
                y[row] += val;
                path.clear();
                let mut i = row;
                while flag[i] != k {
                    path.push(i);
                    flag[i] = k;
                    match parent[i] {
                        Some(next) => i = next,
                        None => break,
                    }
                }
                pattern.extend(path.iter().rev());
            }

            d[k] = y[k];
            y[k] = 0.;
            for &i in pattern.iter().rev() {
                let yi = y[i];
                y[i] = 0.;
                for &(r, lv) in &l[i] {
                    y[r] -= lv * yi;
                }
                let l_ki = yi / d[i];
                d[k] -= l_ki * yi;
                l[i].push((k, l_ki));
            }
            if d[k].abs() <= threshold {
                log::debug!("zero pivot in row {k} of sparse LDLT");
                return Err(SolverFailure::Singular);
            }
        }

        Ok(Self { l, d })
    }

    pub fn nnz(&self) -> usize {
        self.l.iter().map(Vec::len).sum::<usize>() + self.d.len()
    }

    pub fn solve(&self, b: &na::DVector<f64>) -> na::DVector<f64> {
        let mut y = b.clone();
        for (j, col) in self.l.iter().enumerate() {
            let yj = y[j];
            for &(r, lv) in col {
                y[r] -= lv * yj;
            }
        }
        for (yj, dj) in y.iter_mut().zip(&self.d) {
            *yj /= dj;
        }
        for (j, col) in self.l.iter().enumerate().rev() {
            let dot: f64 = col.iter().map(|&(r, lv)| lv * y[r]).sum();
            y[j] -= dot;
        }
        y
    }
}

//
// QR
//

/// Rank-revealing `Q R` by Givens rotations, merging one row at a time.
///
/// `Q` is not stored; solves go through the corrected seminormal equations
/// `R^T R x = A^T b`.
/// Columns whose pivot falls below the rank tolerance are dead:
/// their unknowns are fixed at zero, giving a basic solution
/// for rank-deficient systems.
#[derive(Clone, Debug)]
pub(super) struct SparseQr {
    /// Row `c` of `R`, starting at its diagonal entry, if column `c` is live.
    r: Vec<Option<SparseVec>>,
    rank: usize,
}

/// Rotate `row` into `pivot`, both starting at the same column,
/// so that the leading entry of `row` vanishes.
/// Returns the new pivot row and what remains of `row`.
fn givens_merge(pivot: &[(usize, f64)], row: &[(usize, f64)]) -> (SparseVec, SparseVec) {
    let a = pivot[0].1;
    let b = row[0].1;
    let rho = a.hypot(b);
    let (c, s) = (a / rho, b / rho);

    let mut new_pivot = Vec::with_capacity(pivot.len() + row.len());
    let mut rest = Vec::with_capacity(pivot.len() + row.len());
    new_pivot.push((pivot[0].0, rho));
    for entry in pivot[1..]
        .iter()
        .merge_join_by(&row[1..], |p, r| p.0.cmp(&r.0))
    {
        let (col, p, r) = match entry {
            EitherOrBoth::Both(&(col, p), &(_, r)) => (col, p, r),
            EitherOrBoth::Left(&(col, p)) => (col, p, 0.),
            EitherOrBoth::Right(&(col, r)) => (col, 0., r),
        };
        let np = c * p + s * r;
        let nr = c * r - s * p;
        if np != 0. {
            new_pivot.push((col, np));
        }
        if nr != 0. {
            rest.push((col, nr));
        }
    }
    (new_pivot, rest)
}

impl SparseQr {
    /// The default rank tolerance:
    /// `20 (m + n) eps` times the largest column norm.
    pub fn default_tolerance(mat: &nas::CsrMatrix<f64>) -> f64 {
        let mut col_sq = vec![0.; mat.ncols()];
        for (&col, &val) in mat.col_indices().iter().zip(mat.values()) {
            col_sq[col] += val * val;
        }
        let largest = col_sq.iter().fold(0., |acc: f64, &v| acc.max(v)).sqrt();
        20. * (mat.nrows() + mat.ncols()) as f64 * f64::EPSILON * largest
    }

    pub fn factor(mat: &nas::CsrMatrix<f64>, tolerance: f64) -> Self {
        let mut r: Vec<Option<SparseVec>> = vec![None; mat.ncols()];
        for row in mat.row_iter() {
            let mut w: SparseVec = row
                .col_indices()
                .iter()
                .zip(row.values())
                .filter(|(_, v)| **v != 0.)
                .map(|(&c, &v)| (c, v))
                .collect();
            while let Some(&(col, value)) = w.first() {
                match &r[col] {
                    Some(pivot) => {
                        let (new_pivot, rest) = givens_merge(pivot, &w);
                        r[col] = Some(new_pivot);
                        w = rest;
                    }
                    None if value.abs() > tolerance => {
                        r[col] = Some(w);
                        break;
                    }
                    // negligible leftovers of dependent rows
                    None => {
                        w.remove(0);
                    }
                }
            }
        }
        let rank = r.iter().filter(|row| row.is_some()).count();
        Self { r, rank }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn nnz(&self) -> usize {
        self.r.iter().flatten().map(Vec::len).sum()
    }

    /// Least-squares solution of `R^T R x = A^T b` over the live columns.
    fn seminormal(&self, mat: &nas::CsrMatrix<f64>, b: &na::DVector<f64>) -> na::DVector<f64> {
        let n = self.r.len();
        let mut y = na::DVector::zeros(n);
        for (row_idx, row) in mat.row_iter().enumerate() {
            for (&col, &val) in row.col_indices().iter().zip(row.values()) {
                y[col] += val * b[row_idx];
            }
        }

        // R^T z = y
        for c in 0..n {
            match &self.r[c] {
                Some(r_row) => {
                    y[c] /= r_row[0].1;
                    let zc = y[c];
                    for &(j, v) in &r_row[1..] {
                        y[j] -= v * zc;
                    }
                }
                None => y[c] = 0.,
            }
        }
        // R x = z
        for c in (0..n).rev() {
            if let Some(r_row) = &self.r[c] {
                let dot: f64 = r_row[1..]
                    .iter()
                    .filter(|(j, _)| self.r[*j].is_some())
                    .map(|&(j, v)| v * y[j])
                    .sum();
                y[c] = (y[c] - dot) / r_row[0].1;
            }
        }
        y
    }

    /// Solve with one step of iterative refinement.
    pub fn solve(&self, mat: &nas::CsrMatrix<f64>, b: &na::DVector<f64>) -> na::DVector<f64> {
        let x = self.seminormal(mat, b);
        let residual = b - mat * &x;
        x + self.seminormal(mat, &residual)
    }
}
